//! Transaction ledger and per-address transfers
//!
//! Rows are appended only, so the dense id handed out at insertion stays
//! valid for the wallet's whole life. A hash map gives the unique hash
//! view. Transfers live in one sequence sorted by transaction id;
//! incoming transfers are inserted at the upper bound so they follow the
//! outgoing ones written at send time.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::crypto::TxHash;
use crate::error::{WalletError, WalletResult};
use crate::sync::{TransactionInformation, UNCONFIRMED_HEIGHT};

/// Where a ledger row stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionState {
    Succeeded,
    Failed,
    Cancelled,
}

/// One observed or created transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletTransaction {
    pub state: TransactionState,
    pub creation_time: u64,
    /// Block timestamp; zero until the transaction is in a block.
    pub timestamp: u64,
    pub block_height: u32,
    pub unlock_time: u64,
    /// Negative for outgoing transactions.
    pub total_amount: i64,
    pub fee: u64,
    pub hash: TxHash,
    pub extra: Vec<u8>,
}

/// One per-address movement inside a transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletTransfer {
    pub address: String,
    pub amount: i64,
}

#[derive(Default)]
pub struct TransactionLedger {
    transactions: Vec<WalletTransaction>,
    by_hash: HashMap<TxHash, usize>,
    transfers: Vec<(usize, WalletTransfer)>,
}

impl TransactionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn get(&self, id: usize) -> Option<&WalletTransaction> {
        self.transactions.get(id)
    }

    pub fn exists(&self, hash: &TxHash) -> bool {
        self.by_hash.contains_key(hash)
    }

    pub fn id_of(&self, hash: &TxHash) -> Option<usize> {
        self.by_hash.get(hash).copied()
    }

    /// Appends a send-pipeline row; it stays `Failed` until relay succeeds.
    pub fn insert_outgoing(
        &mut self,
        hash: TxHash,
        total_amount: i64,
        fee: u64,
        extra: Vec<u8>,
        unlock_time: u64,
        creation_time: u64,
    ) -> usize {
        debug_assert!(!self.by_hash.contains_key(&hash));
        let id = self.transactions.len();
        self.transactions.push(WalletTransaction {
            state: TransactionState::Failed,
            creation_time,
            timestamp: 0,
            block_height: UNCONFIRMED_HEIGHT,
            unlock_time,
            total_amount,
            fee,
            hash,
            extra,
        });
        self.by_hash.insert(hash, id);
        id
    }

    /// Appends a synchronizer-observed row.
    pub fn insert_incoming(&mut self, info: &TransactionInformation, balance: i64) -> usize {
        debug_assert!(!self.by_hash.contains_key(&info.transaction_hash));
        let id = self.transactions.len();
        self.transactions.push(WalletTransaction {
            state: TransactionState::Succeeded,
            creation_time: info.timestamp,
            timestamp: info.timestamp,
            block_height: info.block_height,
            unlock_time: info.unlock_time,
            total_amount: balance,
            fee: info.total_amount_in.saturating_sub(info.total_amount_out),
            hash: info.transaction_hash,
            extra: info.extra.clone(),
        });
        self.by_hash.insert(info.transaction_hash, id);
        id
    }

    /// Confirms a known row at `block_height`. A row observed again after
    /// a transient delete flips back to `Succeeded`.
    pub fn update_height(&mut self, hash: &TxHash, block_height: u32) -> WalletResult<usize> {
        let id = self
            .id_of(hash)
            .ok_or(WalletError::InvalidArgument("unknown transaction hash"))?;
        let transaction = &mut self.transactions[id];
        transaction.block_height = block_height;
        transaction.state = TransactionState::Succeeded;
        Ok(id)
    }

    /// Returns the row id, or None when the hash was never recorded.
    pub fn mark_cancelled(&mut self, hash: &TxHash) -> Option<usize> {
        let id = self.id_of(hash)?;
        let transaction = &mut self.transactions[id];
        transaction.state = TransactionState::Cancelled;
        transaction.block_height = UNCONFIRMED_HEIGHT;
        Some(id)
    }

    pub fn set_state(&mut self, id: usize, state: TransactionState) {
        if let Some(transaction) = self.transactions.get_mut(id) {
            transaction.state = state;
        }
    }

    /// Records the outgoing side of a send; amounts are stored negated.
    pub fn append_outgoing_transfers(&mut self, id: usize, destinations: &[WalletTransfer]) {
        for destination in destinations {
            self.transfers.push((
                id,
                WalletTransfer {
                    address: destination.address.clone(),
                    amount: -destination.amount,
                },
            ));
        }
    }

    /// Inserts an incoming transfer after any outgoing ones of the row.
    pub fn insert_incoming_transfer(&mut self, id: usize, address: String, amount: i64) {
        let at = self.transfers.partition_point(|(tx_id, _)| *tx_id <= id);
        self.transfers.insert(at, (id, WalletTransfer { address, amount }));
    }

    pub fn transfers_of(&self, id: usize) -> &[(usize, WalletTransfer)] {
        let lower = self.transfers.partition_point(|(tx_id, _)| *tx_id < id);
        let upper = self.transfers.partition_point(|(tx_id, _)| *tx_id <= id);
        &self.transfers[lower..upper]
    }

    pub fn transfer_count(&self, id: usize) -> usize {
        self.transfers_of(id).len()
    }

    pub fn transfer(&self, id: usize, index: usize) -> Option<&WalletTransfer> {
        self.transfers_of(id).get(index).map(|(_, transfer)| transfer)
    }

    pub fn parts(&self) -> (Vec<WalletTransaction>, Vec<(usize, WalletTransfer)>) {
        (self.transactions.clone(), self.transfers.clone())
    }

    pub fn from_parts(
        transactions: Vec<WalletTransaction>,
        transfers: Vec<(usize, WalletTransfer)>,
    ) -> Self {
        let by_hash = transactions
            .iter()
            .enumerate()
            .map(|(id, transaction)| (transaction.hash, id))
            .collect();
        Self {
            transactions,
            by_hash,
            transfers,
        }
    }

    pub fn clear(&mut self) {
        self.transactions.clear();
        self.by_hash.clear();
        self.transfers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(hash_byte: u8, height: u32) -> TransactionInformation {
        TransactionInformation {
            transaction_hash: [hash_byte; 32],
            block_height: height,
            timestamp: 1_000,
            unlock_time: 0,
            total_amount_in: 110,
            total_amount_out: 100,
            extra: vec![1, 2],
        }
    }

    #[test]
    fn outgoing_rows_start_failed_and_unconfirmed() {
        let mut ledger = TransactionLedger::new();
        let id = ledger.insert_outgoing([1u8; 32], -610, 10, vec![7], 0, 42);
        assert_eq!(id, 0);

        let row = ledger.get(0).unwrap();
        assert_eq!(row.state, TransactionState::Failed);
        assert_eq!(row.block_height, UNCONFIRMED_HEIGHT);
        assert_eq!(row.timestamp, 0);
        assert_eq!(row.total_amount, -610);
        assert_eq!(ledger.id_of(&[1u8; 32]), Some(0));
    }

    #[test]
    fn incoming_rows_carry_observed_facts() {
        let mut ledger = TransactionLedger::new();
        let id = ledger.insert_incoming(&info(2, 500), 100);
        let row = ledger.get(id).unwrap();
        assert_eq!(row.state, TransactionState::Succeeded);
        assert_eq!(row.block_height, 500);
        assert_eq!(row.fee, 10);
        assert_eq!(row.total_amount, 100);
    }

    #[test]
    fn update_height_revives_cancelled_rows() {
        let mut ledger = TransactionLedger::new();
        ledger.insert_outgoing([1u8; 32], -10, 1, vec![], 0, 0);
        ledger.mark_cancelled(&[1u8; 32]);
        assert_eq!(ledger.get(0).unwrap().state, TransactionState::Cancelled);

        let id = ledger.update_height(&[1u8; 32], 77).unwrap();
        assert_eq!(id, 0);
        let row = ledger.get(0).unwrap();
        assert_eq!(row.state, TransactionState::Succeeded);
        assert_eq!(row.block_height, 77);
    }

    #[test]
    fn update_height_rejects_unknown_hash() {
        let mut ledger = TransactionLedger::new();
        assert!(matches!(
            ledger.update_height(&[9u8; 32], 1),
            Err(WalletError::InvalidArgument(_))
        ));
    }

    #[test]
    fn incoming_transfers_follow_outgoing_ones() {
        let mut ledger = TransactionLedger::new();
        ledger.insert_outgoing([1u8; 32], -100, 1, vec![], 0, 0);
        ledger.insert_outgoing([2u8; 32], -200, 1, vec![], 0, 0);

        ledger.append_outgoing_transfers(
            0,
            &[WalletTransfer {
                address: "a".into(),
                amount: 100,
            }],
        );
        ledger.append_outgoing_transfers(
            1,
            &[WalletTransfer {
                address: "b".into(),
                amount: 200,
            }],
        );
        ledger.insert_incoming_transfer(0, "c".into(), 40);

        let transfers = ledger.transfers_of(0);
        assert_eq!(transfers.len(), 2);
        assert_eq!(transfers[0].1.address, "a");
        assert_eq!(transfers[0].1.amount, -100);
        assert_eq!(transfers[1].1.address, "c");
        assert_eq!(transfers[1].1.amount, 40);

        assert_eq!(ledger.transfer_count(1), 1);
        assert_eq!(ledger.transfer(1, 0).unwrap().amount, -200);
        assert!(ledger.transfer(1, 1).is_none());
    }

    #[test]
    fn parts_round_trip_restores_the_hash_view() {
        let mut ledger = TransactionLedger::new();
        ledger.insert_outgoing([1u8; 32], -100, 1, vec![], 0, 0);
        ledger.insert_incoming(&info(2, 9), 50);
        ledger.append_outgoing_transfers(
            0,
            &[WalletTransfer {
                address: "a".into(),
                amount: 100,
            }],
        );

        let (transactions, transfers) = ledger.parts();
        let restored = TransactionLedger::from_parts(transactions, transfers);
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.id_of(&[2u8; 32]), Some(1));
        assert_eq!(restored.transfer_count(0), 1);
    }
}
