//! Network node interface
//!
//! The wallet consumes the node through [`NodeClient`]: transaction relay
//! and decoy sampling. An in-memory double with scriptable failures lives
//! below for tests and local runs.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;

use crate::crypto::PublicKey;
use crate::transaction::Transaction;

/// Errors surfaced by the node client.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum NodeError {
    /// The node refused the transaction.
    #[error("transaction rejected: {0}")]
    RelayFailed(String),
    /// Transport-level failure.
    #[error("request failed: {0}")]
    RequestFailed(String),
}

/// One candidate decoy output on the chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutEntry {
    pub global_amount_index: u32,
    pub out_key: PublicKey,
}

/// Decoy candidates the node returned for one amount.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutsForAmount {
    pub amount: u64,
    pub outs: Vec<OutEntry>,
}

/// Chain-facing operations the wallet consumes.
#[async_trait]
pub trait NodeClient: Send + Sync {
    async fn relay_transaction(&self, transaction: &Transaction) -> Result<(), NodeError>;

    /// Sample up to `count` decoy outputs for each exact amount.
    async fn random_outputs(
        &self,
        amounts: Vec<u64>,
        count: u64,
    ) -> Result<Vec<OutsForAmount>, NodeError>;
}

/// Node double recording relayed transactions; failures are scriptable.
#[derive(Default)]
pub struct InMemoryNode {
    relayed: Mutex<Vec<Transaction>>,
    relay_error: Mutex<Option<NodeError>>,
    decoys: Mutex<HashMap<u64, Vec<OutEntry>>>,
}

impl InMemoryNode {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn relayed(&self) -> Vec<Transaction> {
        self.relayed.lock().clone()
    }

    pub fn relayed_count(&self) -> usize {
        self.relayed.lock().len()
    }

    /// The next relay call fails with `error` instead of recording.
    pub fn fail_next_relay(&self, error: NodeError) {
        *self.relay_error.lock() = Some(error);
    }

    pub fn put_decoys(&self, amount: u64, outs: Vec<OutEntry>) {
        self.decoys.lock().insert(amount, outs);
    }
}

#[async_trait]
impl NodeClient for InMemoryNode {
    async fn relay_transaction(&self, transaction: &Transaction) -> Result<(), NodeError> {
        if let Some(error) = self.relay_error.lock().take() {
            return Err(error);
        }
        self.relayed.lock().push(transaction.clone());
        Ok(())
    }

    async fn random_outputs(
        &self,
        amounts: Vec<u64>,
        count: u64,
    ) -> Result<Vec<OutsForAmount>, NodeError> {
        let decoys = self.decoys.lock();
        Ok(amounts
            .into_iter()
            .map(|amount| OutsForAmount {
                amount,
                outs: decoys
                    .get(&amount)
                    .map(|entries| entries.iter().take(count as usize).copied().collect())
                    .unwrap_or_default(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_relay_failure_fires_once() {
        let node = InMemoryNode::new();
        node.fail_next_relay(NodeError::RelayFailed("busy".into()));

        let transaction = Transaction::default();
        assert!(node.relay_transaction(&transaction).await.is_err());
        assert!(node.relay_transaction(&transaction).await.is_ok());
        assert_eq!(node.relayed_count(), 1);
    }

    #[tokio::test]
    async fn random_outputs_respects_count() {
        let node = InMemoryNode::new();
        node.put_decoys(
            500,
            (0..10)
                .map(|i| OutEntry {
                    global_amount_index: i,
                    out_key: [i as u8; 32],
                })
                .collect(),
        );

        let result = node.random_outputs(vec![500, 700], 3).await.unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].outs.len(), 3);
        assert!(result[1].outs.is_empty());
    }
}
