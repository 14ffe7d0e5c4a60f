//! Sub-wallet registry
//!
//! All spending identities share one view key; each record keeps the
//! handle of the transfers container its subscription produced plus the
//! cached balances the accountant rewrites. Four views stay consistent
//! across every mutation: insertion order (index 0 is the change sink),
//! spend public key, container id, creation timestamp.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::crypto::{PublicKey, SecretKey};
use crate::sync::{ContainerId, TransfersContainer};

/// One spending identity plus its cached balances.
#[derive(Clone)]
pub struct WalletRecord {
    pub spend_public_key: PublicKey,
    pub spend_secret_key: SecretKey,
    pub creation_timestamp: u64,
    pub container_id: ContainerId,
    pub container: Arc<dyn TransfersContainer>,
    pub actual_balance: u64,
    pub pending_balance: u64,
}

/// Primary insertion-ordered store with auxiliary index maps; every
/// mutation goes through a helper that restores all of them.
#[derive(Default)]
pub struct WalletRegistry {
    records: Vec<WalletRecord>,
    by_spend_key: HashMap<PublicKey, usize>,
    by_container: HashMap<ContainerId, usize>,
    by_creation: BTreeMap<u64, Vec<PublicKey>>,
}

impl WalletRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&WalletRecord> {
        self.records.get(index)
    }

    pub fn get_by_spend_key(&self, key: &PublicKey) -> Option<&WalletRecord> {
        self.by_spend_key.get(key).map(|&index| &self.records[index])
    }

    pub fn get_by_container(&self, id: ContainerId) -> Option<&WalletRecord> {
        self.by_container.get(&id).map(|&index| &self.records[index])
    }

    /// The change sink: the oldest still-present sub-wallet.
    pub fn change_wallet(&self) -> Option<&WalletRecord> {
        self.records.first()
    }

    /// Earliest creation timestamp, usable as a sync-start hint.
    pub fn earliest_creation(&self) -> Option<u64> {
        self.by_creation.keys().next().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WalletRecord> {
        self.records.iter()
    }

    pub fn push(&mut self, record: WalletRecord) -> usize {
        debug_assert!(!self.by_spend_key.contains_key(&record.spend_public_key));
        let index = self.records.len();
        self.by_spend_key.insert(record.spend_public_key, index);
        self.by_container.insert(record.container_id, index);
        self.by_creation
            .entry(record.creation_timestamp)
            .or_default()
            .push(record.spend_public_key);
        self.records.push(record);
        index
    }

    /// Removes a record and restores every view in one step.
    pub fn remove_by_spend_key(&mut self, key: &PublicKey) -> Option<WalletRecord> {
        let index = self.by_spend_key.get(key).copied()?;
        let record = self.records.remove(index);
        self.rebuild_indices();
        Some(record)
    }

    pub fn set_balances(&mut self, container: ContainerId, actual: u64, pending: u64) -> bool {
        match self.by_container.get(&container).copied() {
            Some(index) => {
                self.records[index].actual_balance = actual;
                self.records[index].pending_balance = pending;
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.by_spend_key.clear();
        self.by_container.clear();
        self.by_creation.clear();
    }

    fn rebuild_indices(&mut self) {
        self.by_spend_key.clear();
        self.by_container.clear();
        self.by_creation.clear();
        for (index, record) in self.records.iter().enumerate() {
            self.by_spend_key.insert(record.spend_public_key, index);
            self.by_container.insert(record.container_id, index);
            self.by_creation
                .entry(record.creation_timestamp)
                .or_default()
                .push(record.spend_public_key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SecretKey;
    use crate::sync::{OutputFilter, TransactionOutputInfo, TransfersContainer};
    use crate::TxHash;

    struct StubContainer(ContainerId);

    impl TransfersContainer for StubContainer {
        fn id(&self) -> ContainerId {
            self.0
        }
        fn outputs(&self, _filter: OutputFilter) -> Vec<TransactionOutputInfo> {
            Vec::new()
        }
        fn balance(&self, _filter: OutputFilter) -> u64 {
            0
        }
        fn transaction_information(
            &self,
            _hash: &TxHash,
        ) -> Option<(crate::sync::TransactionInformation, i64)> {
            None
        }
    }

    fn record(key_byte: u8, container_id: ContainerId, created: u64) -> WalletRecord {
        WalletRecord {
            spend_public_key: [key_byte; 32],
            spend_secret_key: SecretKey::from_bytes([key_byte; 32]),
            creation_timestamp: created,
            container_id,
            container: Arc::new(StubContainer(container_id)),
            actual_balance: 0,
            pending_balance: 0,
        }
    }

    #[test]
    fn lookups_agree_across_views() {
        let mut registry = WalletRegistry::new();
        registry.push(record(1, 10, 100));
        registry.push(record(2, 20, 50));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(0).unwrap().spend_public_key, [1u8; 32]);
        assert_eq!(
            registry.get_by_spend_key(&[2u8; 32]).unwrap().container_id,
            20
        );
        assert_eq!(
            registry.get_by_container(10).unwrap().spend_public_key,
            [1u8; 32]
        );
        assert_eq!(registry.earliest_creation(), Some(50));
    }

    #[test]
    fn removal_rebuilds_every_view() {
        let mut registry = WalletRegistry::new();
        registry.push(record(1, 10, 100));
        registry.push(record(2, 20, 200));
        registry.push(record(3, 30, 300));

        let removed = registry.remove_by_spend_key(&[2u8; 32]).unwrap();
        assert_eq!(removed.container_id, 20);

        assert_eq!(registry.len(), 2);
        assert!(registry.get_by_spend_key(&[2u8; 32]).is_none());
        assert!(registry.get_by_container(20).is_none());
        assert_eq!(
            registry.get_by_container(30).unwrap().spend_public_key,
            [3u8; 32]
        );
        assert_eq!(registry.get(1).unwrap().spend_public_key, [3u8; 32]);
    }

    #[test]
    fn change_wallet_is_the_oldest_survivor() {
        let mut registry = WalletRegistry::new();
        registry.push(record(1, 10, 100));
        registry.push(record(2, 20, 200));

        assert_eq!(registry.change_wallet().unwrap().spend_public_key, [1u8; 32]);
        registry.remove_by_spend_key(&[1u8; 32]);
        assert_eq!(registry.change_wallet().unwrap().spend_public_key, [2u8; 32]);
        registry.remove_by_spend_key(&[2u8; 32]);
        assert!(registry.change_wallet().is_none());
    }

    #[test]
    fn set_balances_targets_one_container() {
        let mut registry = WalletRegistry::new();
        registry.push(record(1, 10, 100));
        assert!(registry.set_balances(10, 700, 30));
        assert!(!registry.set_balances(99, 1, 1));
        let record = registry.get(0).unwrap();
        assert_eq!(record.actual_balance, 700);
        assert_eq!(record.pending_balance, 30);
    }
}
