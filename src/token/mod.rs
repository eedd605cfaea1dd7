//! Quadreum, the fixed-supply token bound to a Squarrin ledger.
//!
//! Only the read surface and a minimal send/operator-send path are modelled;
//! the interesting part is construction, which performs the one-time
//! bootstrap call into the ledger.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::address::{Address, Amount};
use crate::ledger::LedgerError;

pub const TOKEN_NAME: &str = "Quadreum";
pub const TOKEN_SYMBOL: &str = "QUAD";
pub const TOKEN_DECIMALS: u8 = 18;
/// 80 billion tokens with 18 decimals (80 × 10^27 base units).
pub const TOTAL_SUPPLY: Amount = 80_000_000_000 * 10u128.pow(TOKEN_DECIMALS as u32);

/// The ledger side of the bootstrap handshake.
pub trait BootstrapTarget {
    fn address(&self) -> Address;
    fn set_token_address(&self, caller: &Address, token: Address) -> Result<(), LedgerError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("Quadreum: Only one default operator is allowed")]
    InvalidOperatorCount { count: usize },
    #[error("Quadreum: Default operator {operator} is not the bound ledger {ledger}")]
    OperatorMismatch { operator: Address, ledger: Address },
    #[error("Quadreum: insufficient balance in {account}")]
    InsufficientBalance { account: Address },
    #[error("Quadreum: {operator} is not an operator for {holder}")]
    NotOperator { operator: Address, holder: Address },
    #[error(transparent)]
    Bootstrap(#[from] LedgerError),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Quadreum {
    address: Address,
    owner: Address,
    default_operators: Vec<Address>,
    balances: BTreeMap<Address, Amount>,
}

impl Quadreum {
    /// Builds the token at `address`, registers it with `ledger` and mints the
    /// whole supply to `owner`. Nothing is minted if the ledger refuses.
    pub fn new(
        address: Address,
        owner: Address,
        operators: Vec<Address>,
        ledger: &dyn BootstrapTarget,
    ) -> Result<Self, TokenError> {
        if operators.len() != 1 {
            return Err(TokenError::InvalidOperatorCount {
                count: operators.len(),
            });
        }
        let ledger_address = ledger.address();
        if operators[0] != ledger_address {
            return Err(TokenError::OperatorMismatch {
                operator: operators[0],
                ledger: ledger_address,
            });
        }
        ledger.set_token_address(&address, address)?;

        let mut balances = BTreeMap::new();
        balances.insert(owner, TOTAL_SUPPLY);
        Ok(Self {
            address,
            owner,
            default_operators: operators,
            balances,
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn name(&self) -> &'static str {
        TOKEN_NAME
    }

    pub fn symbol(&self) -> &'static str {
        TOKEN_SYMBOL
    }

    pub fn decimals(&self) -> u8 {
        TOKEN_DECIMALS
    }

    pub fn total_supply(&self) -> Amount {
        TOTAL_SUPPLY
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn default_operators(&self) -> &[Address] {
        &self.default_operators
    }

    pub fn balance_of(&self, account: &Address) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    /// Default operators act for every holder; holders act for themselves.
    pub fn is_operator_for(&self, operator: &Address, holder: &Address) -> bool {
        operator == holder || self.default_operators.contains(operator)
    }

    pub fn send(&mut self, from: &Address, to: &Address, amount: Amount) -> Result<(), TokenError> {
        self.move_balance(from, to, amount)
    }

    pub fn operator_send(
        &mut self,
        operator: &Address,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), TokenError> {
        if !self.is_operator_for(operator, from) {
            return Err(TokenError::NotOperator {
                operator: *operator,
                holder: *from,
            });
        }
        self.move_balance(from, to, amount)
    }

    fn move_balance(&mut self, from: &Address, to: &Address, amount: Amount) -> Result<(), TokenError> {
        let available = self.balance_of(from);
        if available < amount {
            return Err(TokenError::InsufficientBalance { account: *from });
        }
        if amount == 0 {
            return Ok(());
        }
        if available == amount {
            self.balances.remove(from);
        } else {
            self.balances.insert(*from, available - amount);
        }
        *self.balances.entry(*to).or_insert(0) += amount;
        Ok(())
    }
}
