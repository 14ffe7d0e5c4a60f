//! Spent-output table
//!
//! Outputs the wallet has consumed whose spending transaction is not yet
//! confirmed. The balance accountant subtracts the per-wallet sums from
//! the synchronizer's unlocked balances, so just-spent outputs stop
//! funding further sends before the network ever sees them.
//!
//! Entries are unique on (source transaction hash, output index); the
//! owning wallet is keyed by its spend public key so registry reindexing
//! cannot dangle a reference.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::crypto::{PublicKey, TxHash};

/// One output consumed by an unconfirmed send.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpentOutput {
    pub amount: u64,
    pub transaction_hash: TxHash,
    pub output_in_transaction: u32,
    pub wallet_spend_key: PublicKey,
    pub spending_transaction_hash: TxHash,
}

type OutputKey = (TxHash, u32);

#[derive(Default)]
pub struct SpentOutputTable {
    by_output: HashMap<OutputKey, SpentOutput>,
    by_wallet: HashMap<PublicKey, HashSet<OutputKey>>,
    by_spending: HashMap<TxHash, HashSet<OutputKey>>,
}

impl SpentOutputTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.by_output.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_output.is_empty()
    }

    /// Inserts one entry. Selecting the same output twice is a pipeline
    /// bug, so a collision fails loudly instead of being dropped.
    pub fn insert(&mut self, entry: SpentOutput) {
        let key = (entry.transaction_hash, entry.output_in_transaction);
        self.by_wallet
            .entry(entry.wallet_spend_key)
            .or_default()
            .insert(key);
        self.by_spending
            .entry(entry.spending_transaction_hash)
            .or_default()
            .insert(key);
        let previous = self.by_output.insert(key, entry);
        assert!(
            previous.is_none(),
            "output {}:{} marked spent twice",
            hex::encode(key.0),
            key.1
        );
    }

    pub fn is_used(&self, transaction_hash: &TxHash, output_in_transaction: u32) -> bool {
        self.by_output
            .contains_key(&(*transaction_hash, output_in_transaction))
    }

    /// Drops every entry created by one send; returns how many went.
    pub fn delete_by_spending_hash(&mut self, spending_transaction_hash: &TxHash) -> usize {
        let Some(keys) = self.by_spending.remove(spending_transaction_hash) else {
            return 0;
        };
        let mut removed = 0;
        for key in keys {
            if let Some(entry) = self.by_output.remove(&key) {
                removed += 1;
                if let Some(owned) = self.by_wallet.get_mut(&entry.wallet_spend_key) {
                    owned.remove(&key);
                    if owned.is_empty() {
                        self.by_wallet.remove(&entry.wallet_spend_key);
                    }
                }
            }
        }
        removed
    }

    /// Unconfirmed deduction for one sub-wallet.
    pub fn sum_by_wallet(&self, wallet_spend_key: &PublicKey) -> u64 {
        self.by_wallet
            .get(wallet_spend_key)
            .map(|keys| {
                keys.iter()
                    .filter_map(|key| self.by_output.get(key))
                    .map(|entry| entry.amount)
                    .sum()
            })
            .unwrap_or(0)
    }

    /// Erases every entry owned by a deleted sub-wallet.
    pub fn remove_wallet(&mut self, wallet_spend_key: &PublicKey) {
        let Some(keys) = self.by_wallet.remove(wallet_spend_key) else {
            return;
        };
        for key in keys {
            if let Some(entry) = self.by_output.remove(&key) {
                if let Some(spending) = self.by_spending.get_mut(&entry.spending_transaction_hash)
                {
                    spending.remove(&key);
                    if spending.is_empty() {
                        self.by_spending.remove(&entry.spending_transaction_hash);
                    }
                }
            }
        }
    }

    pub fn entries(&self) -> Vec<SpentOutput> {
        self.by_output.values().cloned().collect()
    }

    pub fn from_entries(entries: Vec<SpentOutput>) -> Self {
        let mut table = Self::new();
        for entry in entries {
            table.insert(entry);
        }
        table
    }

    pub fn clear(&mut self) {
        self.by_output.clear();
        self.by_wallet.clear();
        self.by_spending.clear();
    }
}
