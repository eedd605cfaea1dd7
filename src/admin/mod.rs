use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::address::Address;

/// Addresses allowed to mutate the ledger.
///
/// The ledger seeds this with a single admin and never changes it afterwards;
/// `grant`/`revoke` are kept on the set itself so a later admin policy can be
/// wired in without touching storage.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AdminRegistry {
    members: BTreeSet<Address>,
}

impl AdminRegistry {
    pub fn new(initial: Address) -> Self {
        let mut members = BTreeSet::new();
        members.insert(initial);
        Self { members }
    }

    pub fn is_admin(&self, address: &Address) -> bool {
        self.members.contains(address)
    }

    /// Returns `false` if the address was already an admin.
    pub fn grant(&mut self, address: Address) -> bool {
        self.members.insert(address)
    }

    /// Returns `false` if the address was not an admin.
    pub fn revoke(&mut self, address: &Address) -> bool {
        self.members.remove(address)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Address> {
        self.members.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_exactly_one_admin() {
        let admin = Address::random();
        let registry = AdminRegistry::new(admin);
        assert_eq!(registry.len(), 1);
        assert!(registry.is_admin(&admin));
        assert!(!registry.is_admin(&Address::random()));
    }

    #[test]
    fn grant_and_revoke_report_changes() {
        let admin = Address::random();
        let other = Address::random();
        let mut registry = AdminRegistry::new(admin);
        assert!(registry.grant(other));
        assert!(!registry.grant(other));
        assert!(registry.revoke(&other));
        assert!(!registry.revoke(&other));
        assert_eq!(registry.iter().copied().collect::<Vec<_>>(), vec![admin]);
    }
}
