//! Blockchain synchronizer interfaces
//!
//! The wallet consumes the synchronizer, its per-wallet transfers
//! containers, and its observer callbacks as traits. In-memory doubles
//! live at the bottom of the module; tests drive them by mutating
//! container contents and firing observer callbacks by hand.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::crypto::{PublicKey, SecretKey, TxHash};

/// Block height marking a transaction that is not in any block yet.
pub const UNCONFIRMED_HEIGHT: u32 = u32::MAX;

/// Opaque identity of a transfers container.
pub type ContainerId = u64;

/// Where a subscription starts scanning the chain.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct SyncStart {
    pub height: u32,
    pub timestamp: u64,
}

/// Key material shared with the synchronizer for one sub-wallet.
#[derive(Clone)]
pub struct AccountKeys {
    pub spend_public_key: PublicKey,
    pub view_public_key: PublicKey,
    pub spend_secret_key: SecretKey,
    pub view_secret_key: SecretKey,
}

/// Everything the synchronizer needs to track one spending identity.
#[derive(Clone)]
pub struct AccountSubscription {
    pub keys: AccountKeys,
    pub transaction_spendable_age: u32,
    pub sync_start: SyncStart,
}

/// Which outputs or balance a container query covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFilter {
    /// Unlocked outputs spendable with the wallet's own keys.
    IncludeKeyUnlocked,
    /// Every unlocked output.
    IncludeAllUnlocked,
    /// Every locked output.
    IncludeAllLocked,
}

/// One spendable output as the synchronizer sees it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOutputInfo {
    pub amount: u64,
    pub global_output_index: u32,
    pub output_in_transaction: u32,
    pub transaction_public_key: PublicKey,
    pub output_key: PublicKey,
    pub transaction_hash: TxHash,
}

/// Chain-side facts about one observed transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionInformation {
    pub transaction_hash: TxHash,
    pub block_height: u32,
    pub timestamp: u64,
    pub unlock_time: u64,
    pub total_amount_in: u64,
    pub total_amount_out: u64,
    pub extra: Vec<u8>,
}

/// Synchronizer-owned view of all outputs belonging to one sub-wallet.
pub trait TransfersContainer: Send + Sync {
    fn id(&self) -> ContainerId;

    fn outputs(&self, filter: OutputFilter) -> Vec<TransactionOutputInfo>;

    fn balance(&self, filter: OutputFilter) -> u64;

    /// Facts plus the signed balance delta this transaction caused for
    /// the owning sub-wallet.
    fn transaction_information(&self, hash: &TxHash) -> Option<(TransactionInformation, i64)>;
}

/// Callbacks the wallet registers to absorb synchronizer progress.
#[async_trait]
pub trait SynchronizerObserver: Send + Sync {
    async fn synchronization_progress(&self, current_height: u32);

    async fn transaction_updated(&self, container: ContainerId, transaction_hash: TxHash);

    async fn transaction_deleted(&self, container: ContainerId, transaction_hash: TxHash);
}

/// Driving interface of the blockchain synchronizer.
pub trait BlockchainSynchronizer: Send + Sync {
    fn start(&self);

    fn stop(&self);

    fn add_subscription(&self, subscription: AccountSubscription) -> Arc<dyn TransfersContainer>;

    /// Returns true when the subscription existed and was removed.
    fn remove_subscription(&self, spend_public_key: &PublicKey) -> bool;

    fn subscriptions(&self) -> Vec<PublicKey>;

    fn set_observer(&self, observer: Arc<dyn SynchronizerObserver>);

    fn clear_observer(&self);
}

/// Container double whose contents tests mutate directly.
pub struct InMemoryContainer {
    id: ContainerId,
    inner: Mutex<ContainerInner>,
}

#[derive(Default)]
struct ContainerInner {
    unlocked: Vec<TransactionOutputInfo>,
    locked_balance: u64,
    transactions: HashMap<TxHash, (TransactionInformation, i64)>,
}

impl InMemoryContainer {
    fn new(id: ContainerId) -> Arc<Self> {
        Arc::new(Self {
            id,
            inner: Mutex::new(ContainerInner::default()),
        })
    }

    pub fn add_unlocked_output(&self, output: TransactionOutputInfo) {
        self.inner.lock().unlocked.push(output);
    }

    pub fn set_unlocked_outputs(&self, outputs: Vec<TransactionOutputInfo>) {
        self.inner.lock().unlocked = outputs;
    }

    pub fn set_locked_balance(&self, amount: u64) {
        self.inner.lock().locked_balance = amount;
    }

    pub fn put_transaction(&self, info: TransactionInformation, balance: i64) {
        self.inner
            .lock()
            .transactions
            .insert(info.transaction_hash, (info, balance));
    }
}

impl TransfersContainer for InMemoryContainer {
    fn id(&self) -> ContainerId {
        self.id
    }

    fn outputs(&self, filter: OutputFilter) -> Vec<TransactionOutputInfo> {
        match filter {
            OutputFilter::IncludeKeyUnlocked | OutputFilter::IncludeAllUnlocked => {
                self.inner.lock().unlocked.clone()
            }
            OutputFilter::IncludeAllLocked => Vec::new(),
        }
    }

    fn balance(&self, filter: OutputFilter) -> u64 {
        let inner = self.inner.lock();
        match filter {
            OutputFilter::IncludeKeyUnlocked | OutputFilter::IncludeAllUnlocked => {
                inner.unlocked.iter().map(|output| output.amount).sum()
            }
            OutputFilter::IncludeAllLocked => inner.locked_balance,
        }
    }

    fn transaction_information(&self, hash: &TxHash) -> Option<(TransactionInformation, i64)> {
        self.inner.lock().transactions.get(hash).cloned()
    }
}

/// Synchronizer double: one container per subscription, callbacks fired
/// by the test driver.
#[derive(Default)]
pub struct InMemorySynchronizer {
    running: AtomicBool,
    next_container_id: AtomicU64,
    containers: Mutex<HashMap<PublicKey, Arc<InMemoryContainer>>>,
    observer: Mutex<Option<Arc<dyn SynchronizerObserver>>>,
}

impl InMemorySynchronizer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn container_for(&self, spend_public_key: &PublicKey) -> Option<Arc<InMemoryContainer>> {
        self.containers.lock().get(spend_public_key).cloned()
    }

    fn observer(&self) -> Option<Arc<dyn SynchronizerObserver>> {
        self.observer.lock().clone()
    }

    pub async fn fire_progress(&self, height: u32) {
        if let Some(observer) = self.observer() {
            observer.synchronization_progress(height).await;
        }
    }

    pub async fn fire_transaction_updated(&self, spend_public_key: &PublicKey, hash: TxHash) {
        let container = self.container_for(spend_public_key);
        if let (Some(container), Some(observer)) = (container, self.observer()) {
            observer.transaction_updated(container.id(), hash).await;
        }
    }

    pub async fn fire_transaction_deleted(&self, spend_public_key: &PublicKey, hash: TxHash) {
        let container = self.container_for(spend_public_key);
        if let (Some(container), Some(observer)) = (container, self.observer()) {
            observer.transaction_deleted(container.id(), hash).await;
        }
    }
}

impl BlockchainSynchronizer for InMemorySynchronizer {
    fn start(&self) {
        self.running.store(true, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn add_subscription(&self, subscription: AccountSubscription) -> Arc<dyn TransfersContainer> {
        let mut containers = self.containers.lock();
        let container = containers
            .entry(subscription.keys.spend_public_key)
            .or_insert_with(|| {
                let id = self.next_container_id.fetch_add(1, Ordering::SeqCst);
                InMemoryContainer::new(id)
            })
            .clone();
        container
    }

    fn remove_subscription(&self, spend_public_key: &PublicKey) -> bool {
        self.containers.lock().remove(spend_public_key).is_some()
    }

    fn subscriptions(&self) -> Vec<PublicKey> {
        self.containers.lock().keys().copied().collect()
    }

    fn set_observer(&self, observer: Arc<dyn SynchronizerObserver>) {
        *self.observer.lock() = Some(observer);
    }

    fn clear_observer(&self) {
        *self.observer.lock() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto;

    fn subscription(spend_public_key: PublicKey) -> AccountSubscription {
        let view = crypto::generate_keys();
        AccountSubscription {
            keys: AccountKeys {
                spend_public_key,
                view_public_key: view.public_key,
                spend_secret_key: SecretKey::from_bytes([1u8; 32]),
                view_secret_key: view.secret_key,
            },
            transaction_spendable_age: 10,
            sync_start: SyncStart::default(),
        }
    }

    #[test]
    fn subscriptions_reuse_their_container() {
        let synchronizer = InMemorySynchronizer::new();
        let first = synchronizer.add_subscription(subscription([1u8; 32]));
        let again = synchronizer.add_subscription(subscription([1u8; 32]));
        assert_eq!(first.id(), again.id());

        let other = synchronizer.add_subscription(subscription([2u8; 32]));
        assert_ne!(first.id(), other.id());
    }

    #[test]
    fn container_balance_tracks_outputs() {
        let synchronizer = InMemorySynchronizer::new();
        synchronizer.add_subscription(subscription([1u8; 32]));
        let container = synchronizer.container_for(&[1u8; 32]).unwrap();

        container.add_unlocked_output(TransactionOutputInfo {
            amount: 700,
            global_output_index: 0,
            output_in_transaction: 0,
            transaction_public_key: [0u8; 32],
            output_key: [0u8; 32],
            transaction_hash: [9u8; 32],
        });
        container.set_locked_balance(50);

        assert_eq!(container.balance(OutputFilter::IncludeAllUnlocked), 700);
        assert_eq!(container.balance(OutputFilter::IncludeAllLocked), 50);
        assert_eq!(container.outputs(OutputFilter::IncludeKeyUnlocked).len(), 1);
    }

    #[test]
    fn remove_subscription_drops_the_container() {
        let synchronizer = InMemorySynchronizer::new();
        synchronizer.add_subscription(subscription([1u8; 32]));
        assert!(synchronizer.remove_subscription(&[1u8; 32]));
        assert!(!synchronizer.remove_subscription(&[1u8; 32]));
        assert!(synchronizer.container_for(&[1u8; 32]).is_none());
    }
}
