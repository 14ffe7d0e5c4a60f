//! Wallet event mailbox

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::Notify;

/// State-change notification delivered through `Wallet::get_event`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WalletEvent {
    /// A transaction row appeared in the ledger.
    TransactionCreated { transaction_index: usize },
    /// An existing transaction row changed.
    TransactionUpdated { transaction_index: usize },
    /// Locked funds crossed their unlock height.
    BalanceUnlocked,
}

/// Single-consumer mailbox of wallet events.
#[derive(Default)]
pub struct EventQueue {
    queue: Mutex<VecDeque<WalletEvent>>,
    event_occurred: Notify,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: WalletEvent) {
        self.queue.lock().push_back(event);
        self.event_occurred.notify_one();
    }

    pub fn pop(&self) -> Option<WalletEvent> {
        self.queue.lock().pop_front()
    }

    /// Parks until the next `push` or `wake`. A permit stored by a push
    /// that raced the caller resolves the wait immediately.
    pub async fn wait(&self) {
        self.event_occurred.notified().await;
    }

    /// Wakes a parked consumer without enqueueing anything.
    pub fn wake(&self) {
        self.event_occurred.notify_one();
    }

    pub fn clear(&self) {
        self.queue.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}
