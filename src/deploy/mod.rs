use std::sync::Arc;

use crate::address::Address;
use crate::clock::Clock;
use crate::config::LedgerConfig;
use crate::ledger::LedgerError;
use crate::service::SquarrinHandle;
use crate::token::{Quadreum, TokenError};

pub const LEDGER_LABEL: &str = "squarrin";
pub const TOKEN_LABEL: &str = "quadreum";

#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("ledger deployment failed: {0}")]
    Ledger(#[from] LedgerError),
    #[error("token deployment failed: {0}")]
    Token(#[from] TokenError),
}

/// A ledger and the token bound to it.
pub struct Deployment {
    pub ledger: SquarrinHandle,
    pub token: Quadreum,
}

/// Creates components in order, deriving each address from the deployer and
/// a creation nonce. The nonce advances on every attempt, failed or not.
#[derive(Debug)]
pub struct Deployer {
    address: Address,
    nonce: u64,
}

impl Deployer {
    pub fn new(address: Address) -> Self {
        Self { address, nonce: 0 }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    fn next_address(&mut self, label: &str) -> Address {
        let address = Address::derive(label, &self.address, self.nonce);
        self.nonce += 1;
        address
    }

    pub fn deploy_ledger(
        &mut self,
        config: &LedgerConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<SquarrinHandle, LedgerError> {
        let address = self.next_address(LEDGER_LABEL);
        SquarrinHandle::from_config(address, config, clock)
    }

    pub fn deploy_token(
        &mut self,
        owner: Address,
        operators: Vec<Address>,
        ledger: &SquarrinHandle,
    ) -> Result<Quadreum, TokenError> {
        let address = self.next_address(TOKEN_LABEL);
        Quadreum::new(address, owner, operators, ledger)
    }

    /// Ledger first, then the token with the ledger as its only operator.
    pub fn deploy(
        &mut self,
        config: &LedgerConfig,
        owner: Address,
        clock: Arc<dyn Clock>,
    ) -> Result<Deployment, DeployError> {
        let ledger = self.deploy_ledger(config, clock)?;
        let token = self.deploy_token(owner, vec![ledger.address()], &ledger)?;
        Ok(Deployment { ledger, token })
    }
}
