//! Wallet facade
//!
//! Single-dispatcher state engine behind one async gate. Operator calls
//! and synchronizer callbacks all acquire the gate, so every mutation of
//! the registry, ledger, spent-output table, unlock schedule, and
//! balances commits atomically from an outside observer's perspective.
//! The send pipeline holds the gate across its node round trips, which
//! keeps callbacks from interleaving with an in-flight transfer.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::address::{compose_address, parse_address};
use crate::config::WalletConfig;
use crate::crypto::{self, KeyPair, TxHash};
use crate::error::{WalletError, WalletResult};
use crate::events::{EventQueue, WalletEvent};
use crate::ledger::{TransactionLedger, TransactionState, WalletTransaction, WalletTransfer};
use crate::node::{NodeClient, OutsForAmount};
use crate::registry::{WalletRecord, WalletRegistry};
use crate::spent_outputs::{SpentOutput, SpentOutputTable};
use crate::storage::{self, SnapshotUnlockJob, WalletSnapshot, WalletSnapshotRecord};
use crate::sync::{
    AccountKeys, AccountSubscription, BlockchainSynchronizer, ContainerId, OutputFilter,
    SyncStart, SynchronizerObserver, TransfersContainer, UNCONFIRMED_HEIGHT,
};
use crate::transaction::{Transaction, TransactionComposer};
use crate::transfer::{
    check_enough_mixins, count_needed_money, prepare_inputs, select_transfers,
    split_destinations, validate_destinations, PreparedInput, ReceiverAmounts, SelectedOutput,
    WalletOuts,
};
use crate::unlock::{UnlockJob, UnlockSchedule};

/// Lifecycle state of the wallet core.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WalletState {
    NotInitialized,
    Initialized,
}

struct WalletCore {
    state: WalletState,
    view_keys: Option<KeyPair>,
    password: String,
    registry: WalletRegistry,
    ledger: TransactionLedger,
    spent_outputs: SpentOutputTable,
    unlock_schedule: UnlockSchedule,
    change: HashMap<TxHash, u64>,
    actual_balance: u64,
    pending_balance: u64,
}

impl WalletCore {
    fn new() -> Self {
        Self {
            state: WalletState::NotInitialized,
            view_keys: None,
            password: String::new(),
            registry: WalletRegistry::new(),
            ledger: TransactionLedger::new(),
            spent_outputs: SpentOutputTable::new(),
            unlock_schedule: UnlockSchedule::new(),
            change: HashMap::new(),
            actual_balance: 0,
            pending_balance: 0,
        }
    }

    fn ensure_initialized(&self) -> WalletResult<()> {
        if self.state != WalletState::Initialized {
            return Err(WalletError::NotInitialized);
        }
        Ok(())
    }

    fn view_keys(&self) -> &KeyPair {
        self.view_keys
            .as_ref()
            .expect("initialized wallet has view keys")
    }

    fn address_of(&self, record: &WalletRecord) -> String {
        compose_address(&record.spend_public_key, &self.view_keys().public_key)
    }

    fn account_keys(&self, record: &WalletRecord) -> AccountKeys {
        let view = self.view_keys();
        AccountKeys {
            spend_public_key: record.spend_public_key,
            view_public_key: view.public_key,
            spend_secret_key: record.spend_secret_key.clone(),
            view_secret_key: view.secret_key.clone(),
        }
    }

    fn record_for_address(&self, address: &str) -> WalletResult<&WalletRecord> {
        let parsed =
            parse_address(address).map_err(|_| WalletError::InvalidArgument("unknown address"))?;
        self.registry
            .get_by_spend_key(&parsed.spend_public_key)
            .ok_or(WalletError::InvalidArgument("unknown address"))
    }

    /// Re-derives one sub-wallet's cached balances from its container,
    /// the spent-output table, and (for the change sink) the change
    /// ledger, folding the deltas into the aggregates.
    fn update_balance(&mut self, container: ContainerId) {
        let Some(record) = self.registry.get_by_container(container) else {
            return;
        };
        let handle = record.container.clone();
        let spend_key = record.spend_public_key;
        let old_actual = record.actual_balance;
        let old_pending = record.pending_balance;
        let is_change_wallet =
            self.registry.change_wallet().map(|w| w.container_id) == Some(container);

        let unlocked = handle.balance(OutputFilter::IncludeAllUnlocked);
        let mut pending = handle.balance(OutputFilter::IncludeAllLocked);

        let reserved = self.spent_outputs.sum_by_wallet(&spend_key);
        debug_assert!(unlocked >= reserved);
        let actual = unlocked.saturating_sub(reserved);

        if is_change_wallet {
            pending += self.change.values().sum::<u64>();
        }

        if old_actual < actual {
            self.actual_balance += actual - old_actual;
        } else {
            self.actual_balance -= old_actual - actual;
        }
        if old_pending < pending {
            self.pending_balance += pending - old_pending;
        } else {
            self.pending_balance -= old_pending - pending;
        }

        self.registry.set_balances(container, actual, pending);
    }

    /// Recomputes the change sink plus every wallet that funded a send.
    fn update_used_balances(&mut self, selected: &[SelectedOutput]) {
        let mut containers = HashSet::new();
        if let Some(change_wallet) = self.registry.change_wallet() {
            containers.insert(change_wallet.container_id);
        }
        for input in selected {
            if let Some(record) = self.registry.get_by_spend_key(&input.wallet_spend_key) {
                containers.insert(record.container_id);
            }
        }
        for container in containers {
            self.update_balance(container);
        }
    }

    fn pick_wallets_with_money(&self) -> Vec<WalletOuts> {
        self.registry
            .iter()
            .filter(|record| record.actual_balance != 0)
            .map(|record| WalletOuts {
                wallet_spend_key: record.spend_public_key,
                outs: record.container.outputs(OutputFilter::IncludeKeyUnlocked),
            })
            .collect()
    }

    fn pick_wallet(&self, address: &str) -> WalletResult<WalletOuts> {
        let record = self.record_for_address(address)?;
        Ok(WalletOuts {
            wallet_spend_key: record.spend_public_key,
            outs: record.container.outputs(OutputFilter::IncludeKeyUnlocked),
        })
    }

    fn compose_transaction(
        &self,
        prepared: &[PreparedInput],
        decomposed: &[ReceiverAmounts],
        extra: &[u8],
        unlock_timestamp: u64,
    ) -> WalletResult<Transaction> {
        let mut composer = TransactionComposer::new();
        for receiver_amounts in decomposed {
            for amount in &receiver_amounts.amounts {
                composer.add_output(
                    *amount,
                    &receiver_amounts.receiver.view_public_key,
                    &receiver_amounts.receiver.spend_public_key,
                );
            }
        }
        composer.set_unlock_time(unlock_timestamp);
        composer.append_extra(extra);

        for input in prepared {
            let record = self
                .registry
                .get_by_spend_key(&input.wallet_spend_key)
                .ok_or_else(|| {
                    WalletError::Internal("selected output lost its sub-wallet".into())
                })?;
            composer.add_input(&self.account_keys(record), input.key_info.clone());
        }

        Ok(composer.finalize())
    }

    fn snapshot(&self, save_details: bool, save_cache: bool) -> WalletSnapshot {
        let view = self.view_keys();
        let wallets = self
            .registry
            .iter()
            .map(|record| WalletSnapshotRecord {
                spend_public_key: record.spend_public_key,
                spend_secret_key: record.spend_secret_key.clone(),
                creation_timestamp: record.creation_timestamp,
                actual_balance: if save_cache { record.actual_balance } else { 0 },
                pending_balance: if save_cache { record.pending_balance } else { 0 },
            })
            .collect();

        let (transactions, transfers) = if save_details {
            self.ledger.parts()
        } else {
            (Vec::new(), Vec::new())
        };

        let (spent_outputs, unlock_jobs, change) = if save_cache {
            let jobs = self
                .unlock_schedule
                .jobs()
                .into_iter()
                .filter_map(|job| {
                    let record = self.registry.get_by_container(job.container_id)?;
                    Some(SnapshotUnlockJob {
                        unlock_height: job.unlock_height,
                        wallet_spend_key: record.spend_public_key,
                        transaction_hash: job.transaction_hash,
                    })
                })
                .collect();
            (
                self.spent_outputs.entries(),
                jobs,
                self.change.iter().map(|(hash, amount)| (*hash, *amount)).collect(),
            )
        } else {
            (Vec::new(), Vec::new(), Vec::new())
        };

        WalletSnapshot {
            view_public_key: view.public_key,
            view_secret_key: view.secret_key.clone(),
            actual_balance: if save_cache { self.actual_balance } else { 0 },
            pending_balance: if save_cache { self.pending_balance } else { 0 },
            wallets,
            transactions,
            transfers,
            spent_outputs,
            unlock_jobs,
            change,
        }
    }

    fn clear(&mut self) {
        self.registry.clear();
        self.ledger.clear();
        self.spent_outputs.clear();
        self.unlock_schedule.clear();
        self.change.clear();
        self.actual_balance = 0;
        self.pending_balance = 0;
        self.view_keys = None;
        self.password.clear();
        self.state = WalletState::NotInitialized;
    }
}

/// Multi-address wallet core driven by a node client and a blockchain
/// synchronizer.
pub struct Wallet {
    core: Arc<Mutex<WalletCore>>,
    events: Arc<EventQueue>,
    stopped: Arc<AtomicBool>,
    node: Arc<dyn NodeClient>,
    synchronizer: Arc<dyn BlockchainSynchronizer>,
    config: WalletConfig,
}

impl Wallet {
    pub fn new(
        node: Arc<dyn NodeClient>,
        synchronizer: Arc<dyn BlockchainSynchronizer>,
        config: WalletConfig,
    ) -> Self {
        Self {
            core: Arc::new(Mutex::new(WalletCore::new())),
            events: Arc::new(EventQueue::new()),
            stopped: Arc::new(AtomicBool::new(false)),
            node,
            synchronizer,
            config,
        }
    }

    fn ensure_running(&self) -> WalletResult<()> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(WalletError::OperationCancelled);
        }
        Ok(())
    }

    fn observer(&self) -> Arc<dyn SynchronizerObserver> {
        Arc::new(SyncAdapter {
            core: self.core.clone(),
            events: self.events.clone(),
            softlock_blocks: self.config.softlock_blocks,
        })
    }

    /// Generates the shared view key pair and registers for synchronizer
    /// callbacks.
    pub async fn initialize(&self, password: &str) -> WalletResult<()> {
        let mut core = self.core.lock().await;
        if core.state != WalletState::NotInitialized {
            return Err(WalletError::AlreadyInitialized);
        }
        self.ensure_running()?;

        core.view_keys = Some(crypto::generate_keys());
        core.password = password.to_owned();
        core.state = WalletState::Initialized;

        self.synchronizer.set_observer(self.observer());
        info!("wallet initialized");
        Ok(())
    }

    /// Stops the synchronizer, drops every subscription, and clears all
    /// state including the event queue.
    pub async fn shutdown(&self) -> WalletResult<()> {
        let mut core = self.core.lock().await;
        core.ensure_initialized()?;

        self.synchronizer.stop();
        self.synchronizer.clear_observer();
        for spend_key in self.synchronizer.subscriptions() {
            self.synchronizer.remove_subscription(&spend_key);
        }
        core.clear();
        self.events.clear();
        info!("wallet shut down");
        Ok(())
    }

    /// Seals a snapshot of the whole state under the wallet password.
    /// The synchronizer is paused while the snapshot is taken.
    pub async fn save(&self, save_details: bool, save_cache: bool) -> WalletResult<Vec<u8>> {
        let core = self.core.lock().await;
        core.ensure_initialized()?;
        self.ensure_running()?;

        if !core.registry.is_empty() {
            self.synchronizer.stop();
        }
        let snapshot = core.snapshot(save_details, save_cache);
        let sealed = storage::seal_snapshot(&snapshot, &core.password);
        if !core.registry.is_empty() {
            self.synchronizer.start();
        }
        sealed
    }

    /// Restores a saved snapshot into a fresh wallet, re-adding one
    /// subscription per sub-wallet.
    pub async fn load(&self, bytes: &[u8], password: &str) -> WalletResult<()> {
        let mut guard = self.core.lock().await;
        let core = &mut *guard;
        if core.state != WalletState::NotInitialized {
            return Err(WalletError::WrongState);
        }
        self.ensure_running()?;

        let snapshot = storage::open_snapshot(bytes, password)?;

        core.view_keys = Some(KeyPair {
            public_key: snapshot.view_public_key,
            secret_key: snapshot.view_secret_key.clone(),
        });
        core.password = password.to_owned();
        core.actual_balance = snapshot.actual_balance;
        core.pending_balance = snapshot.pending_balance;
        core.ledger = TransactionLedger::from_parts(snapshot.transactions, snapshot.transfers);
        core.spent_outputs = SpentOutputTable::from_entries(snapshot.spent_outputs);
        core.change = snapshot.change.into_iter().collect();

        for record in &snapshot.wallets {
            let subscription = AccountSubscription {
                keys: AccountKeys {
                    spend_public_key: record.spend_public_key,
                    view_public_key: snapshot.view_public_key,
                    spend_secret_key: record.spend_secret_key.clone(),
                    view_secret_key: snapshot.view_secret_key.clone(),
                },
                transaction_spendable_age: self.config.transaction_spendable_age,
                sync_start: SyncStart {
                    height: 0,
                    timestamp: record
                        .creation_timestamp
                        .saturating_sub(self.config.sync_start_lookback_secs),
                },
            };
            let container = self.synchronizer.add_subscription(subscription);
            core.registry.push(WalletRecord {
                spend_public_key: record.spend_public_key,
                spend_secret_key: record.spend_secret_key.clone(),
                creation_timestamp: record.creation_timestamp,
                container_id: container.id(),
                container,
                actual_balance: record.actual_balance,
                pending_balance: record.pending_balance,
            });
        }

        core.unlock_schedule = UnlockSchedule::new();
        for job in snapshot.unlock_jobs {
            let Some(record) = core.registry.get_by_spend_key(&job.wallet_spend_key) else {
                continue;
            };
            let container_id = record.container_id;
            core.unlock_schedule.enqueue(UnlockJob {
                unlock_height: job.unlock_height,
                container_id,
                transaction_hash: job.transaction_hash,
            });
        }

        core.state = WalletState::Initialized;
        self.synchronizer.set_observer(self.observer());
        if !core.registry.is_empty() {
            self.synchronizer.start();
        }
        info!(addresses = core.registry.len(), "wallet loaded");
        Ok(())
    }

    pub async fn change_password(&self, old_password: &str, new_password: &str) -> WalletResult<()> {
        let mut core = self.core.lock().await;
        core.ensure_initialized()?;
        self.ensure_running()?;

        if core.password != old_password {
            return Err(WalletError::WrongPassword);
        }
        core.password = new_password.to_owned();
        Ok(())
    }

    /// Creates a fresh spending identity and subscribes it.
    pub async fn create_address(&self) -> WalletResult<String> {
        self.create_address_with_keys(crypto::generate_keys()).await
    }

    /// Adds a spending identity from caller-supplied keys.
    pub async fn create_address_with_keys(&self, spend_keys: KeyPair) -> WalletResult<String> {
        let mut guard = self.core.lock().await;
        let core = &mut *guard;
        core.ensure_initialized()?;
        self.ensure_running()?;

        if core
            .registry
            .get_by_spend_key(&spend_keys.public_key)
            .is_some()
        {
            return Err(WalletError::InvalidArgument("address already tracked"));
        }

        if !core.registry.is_empty() {
            self.synchronizer.stop();
        }

        let creation_timestamp = unix_now();
        let view = core.view_keys().clone();
        let subscription = AccountSubscription {
            keys: AccountKeys {
                spend_public_key: spend_keys.public_key,
                view_public_key: view.public_key,
                spend_secret_key: spend_keys.secret_key.clone(),
                view_secret_key: view.secret_key.clone(),
            },
            transaction_spendable_age: self.config.transaction_spendable_age,
            sync_start: SyncStart {
                height: 0,
                timestamp: creation_timestamp.saturating_sub(self.config.sync_start_lookback_secs),
            },
        };
        let container = self.synchronizer.add_subscription(subscription);
        core.registry.push(WalletRecord {
            spend_public_key: spend_keys.public_key,
            spend_secret_key: spend_keys.secret_key,
            creation_timestamp,
            container_id: container.id(),
            container,
            actual_balance: 0,
            pending_balance: 0,
        });

        self.synchronizer.start();

        let address = compose_address(&spend_keys.public_key, &view.public_key);
        info!(%address, "address created");
        Ok(address)
    }

    /// Deletes a spending identity: all four registry views, its spent
    /// outputs, its cached balances, and its subscription go together.
    pub async fn delete_address(&self, address: &str) -> WalletResult<()> {
        let mut guard = self.core.lock().await;
        let core = &mut *guard;
        core.ensure_initialized()?;
        self.ensure_running()?;

        let parsed =
            parse_address(address).map_err(|_| WalletError::InvalidArgument("unknown address"))?;
        let record = core
            .registry
            .remove_by_spend_key(&parsed.spend_public_key)
            .ok_or(WalletError::InvalidArgument("unknown address"))?;

        self.synchronizer.stop();

        core.actual_balance -= record.actual_balance;
        core.pending_balance -= record.pending_balance;
        self.synchronizer.remove_subscription(&record.spend_public_key);
        core.spent_outputs.remove_wallet(&record.spend_public_key);

        if !core.registry.is_empty() {
            self.synchronizer.start();
        }
        info!(%address, "address deleted");
        Ok(())
    }

    pub async fn address_count(&self) -> WalletResult<usize> {
        let core = self.core.lock().await;
        core.ensure_initialized()?;
        self.ensure_running()?;
        Ok(core.registry.len())
    }

    pub async fn address(&self, index: usize) -> WalletResult<String> {
        let core = self.core.lock().await;
        core.ensure_initialized()?;
        self.ensure_running()?;
        let record = core
            .registry
            .get(index)
            .ok_or(WalletError::InvalidArgument("address index out of range"))?;
        Ok(core.address_of(record))
    }

    pub async fn actual_balance(&self) -> WalletResult<u64> {
        let core = self.core.lock().await;
        core.ensure_initialized()?;
        self.ensure_running()?;
        Ok(core.actual_balance)
    }

    pub async fn actual_balance_of(&self, address: &str) -> WalletResult<u64> {
        let core = self.core.lock().await;
        core.ensure_initialized()?;
        self.ensure_running()?;
        Ok(core.record_for_address(address)?.actual_balance)
    }

    pub async fn pending_balance(&self) -> WalletResult<u64> {
        let core = self.core.lock().await;
        core.ensure_initialized()?;
        self.ensure_running()?;
        Ok(core.pending_balance)
    }

    pub async fn pending_balance_of(&self, address: &str) -> WalletResult<u64> {
        let core = self.core.lock().await;
        core.ensure_initialized()?;
        self.ensure_running()?;
        Ok(core.record_for_address(address)?.pending_balance)
    }

    pub async fn transaction_count(&self) -> WalletResult<usize> {
        let core = self.core.lock().await;
        core.ensure_initialized()?;
        self.ensure_running()?;
        Ok(core.ledger.len())
    }

    pub async fn transaction(&self, index: usize) -> WalletResult<WalletTransaction> {
        let core = self.core.lock().await;
        core.ensure_initialized()?;
        self.ensure_running()?;
        core.ledger
            .get(index)
            .cloned()
            .ok_or(WalletError::InvalidArgument("transaction index out of range"))
    }

    pub async fn transaction_transfer_count(&self, index: usize) -> WalletResult<usize> {
        let core = self.core.lock().await;
        core.ensure_initialized()?;
        self.ensure_running()?;
        Ok(core.ledger.transfer_count(index))
    }

    pub async fn transaction_transfer(
        &self,
        index: usize,
        transfer_index: usize,
    ) -> WalletResult<WalletTransfer> {
        let core = self.core.lock().await;
        core.ensure_initialized()?;
        self.ensure_running()?;
        core.ledger
            .transfer(index, transfer_index)
            .cloned()
            .ok_or(WalletError::InvalidArgument("transfer index out of range"))
    }

    /// Sends to one destination, funding from every sub-wallet.
    pub async fn transfer_to(
        &self,
        destination: WalletTransfer,
        fee: u64,
        mixin: u64,
        extra: Vec<u8>,
        unlock_timestamp: u64,
    ) -> WalletResult<usize> {
        self.transfer(
            std::slice::from_ref(&destination),
            fee,
            mixin,
            extra,
            unlock_timestamp,
        )
        .await
    }

    /// Sends to a list of destinations, funding from every sub-wallet
    /// with a non-zero actual balance. Returns the ledger id of the new
    /// row; on relay failure the row stays `Failed` and the error is
    /// re-raised after the TRANSACTION_CREATED event.
    pub async fn transfer(
        &self,
        destinations: &[WalletTransfer],
        fee: u64,
        mixin: u64,
        extra: Vec<u8>,
        unlock_timestamp: u64,
    ) -> WalletResult<usize> {
        let mut guard = self.core.lock().await;
        let core = &mut *guard;
        core.ensure_initialized()?;
        self.ensure_running()?;

        let wallets = core.pick_wallets_with_money();
        self.do_transfer(core, wallets, destinations, fee, mixin, extra, unlock_timestamp)
            .await
    }

    /// Sends funded from one named source address only.
    pub async fn transfer_from(
        &self,
        source_address: &str,
        destinations: &[WalletTransfer],
        fee: u64,
        mixin: u64,
        extra: Vec<u8>,
        unlock_timestamp: u64,
    ) -> WalletResult<usize> {
        let mut guard = self.core.lock().await;
        let core = &mut *guard;
        core.ensure_initialized()?;
        self.ensure_running()?;

        let wallet = core.pick_wallet(source_address)?;
        let wallets = if wallet.outs.is_empty() {
            Vec::new()
        } else {
            vec![wallet]
        };
        self.do_transfer(core, wallets, destinations, fee, mixin, extra, unlock_timestamp)
            .await
    }

    async fn do_transfer(
        &self,
        core: &mut WalletCore,
        wallets: Vec<WalletOuts>,
        destinations: &[WalletTransfer],
        fee: u64,
        mixin: u64,
        extra: Vec<u8>,
        unlock_timestamp: u64,
    ) -> WalletResult<usize> {
        if destinations.is_empty() {
            return Err(WalletError::ZeroDestination);
        }
        validate_destinations(destinations)?;
        let needed_money = count_needed_money(destinations, fee)?;

        let (found_money, selected) = select_transfers(
            needed_money,
            mixin == 0,
            self.config.dust_threshold,
            wallets,
            &core.spent_outputs,
        );
        if found_money < needed_money {
            debug!(needed_money, found_money, "transfer short of unlocked funds");
            return Err(WalletError::WrongAmount);
        }

        let mut mixin_result = Vec::new();
        if mixin != 0 {
            mixin_result = self.request_mixin_outs(&selected, mixin).await?;
        }

        let prepared = prepare_inputs(&selected, &mut mixin_result, mixin);

        let change_wallet = core
            .registry
            .change_wallet()
            .ok_or_else(|| WalletError::Internal("registry emptied mid-transfer".into()))?;
        let change_destination = WalletTransfer {
            address: core.address_of(change_wallet),
            amount: (found_money - needed_money) as i64,
        };

        let decomposed =
            split_destinations(destinations, &change_destination, self.config.dust_threshold)?;

        let transaction =
            core.compose_transaction(&prepared, &decomposed, &extra, unlock_timestamp)?;
        let transaction_hash = transaction.hash();

        let id = core.ledger.insert_outgoing(
            transaction_hash,
            -(needed_money as i64),
            fee,
            transaction.extra.clone(),
            unlock_timestamp,
            unix_now(),
        );
        core.ledger.append_outgoing_transfers(id, destinations);

        if let Err(error) = self.send_transaction(&transaction).await {
            warn!(id, %error, "relay failed, transaction row left failed");
            self.events
                .push(WalletEvent::TransactionCreated { transaction_index: id });
            return Err(error);
        }

        core.ledger.set_state(id, TransactionState::Succeeded);

        for input in &selected {
            core.spent_outputs.insert(SpentOutput {
                amount: input.out.amount,
                transaction_hash: input.out.transaction_hash,
                output_in_transaction: input.out.output_in_transaction,
                wallet_spend_key: input.wallet_spend_key,
                spending_transaction_hash: transaction_hash,
            });
        }
        core.change
            .insert(transaction_hash, change_destination.amount as u64);
        core.update_used_balances(&selected);

        self.events
            .push(WalletEvent::TransactionCreated { transaction_index: id });
        debug!(
            id,
            amount = needed_money,
            inputs = selected.len(),
            "transfer committed"
        );
        Ok(id)
    }

    async fn request_mixin_outs(
        &self,
        selected: &[SelectedOutput],
        mixin: u64,
    ) -> WalletResult<Vec<OutsForAmount>> {
        let amounts = selected.iter().map(|input| input.out.amount).collect();
        self.ensure_running()?;
        let mixin_result = self.node.random_outputs(amounts, mixin).await?;
        check_enough_mixins(&mixin_result, mixin)?;
        Ok(mixin_result)
    }

    async fn send_transaction(&self, transaction: &Transaction) -> WalletResult<()> {
        let bytes = transaction.to_bytes();
        if bytes.len() > self.config.max_transaction_size {
            return Err(WalletError::TransactionSizeTooBig {
                size: bytes.len(),
                limit: self.config.max_transaction_size,
            });
        }
        if Transaction::from_bytes(&bytes).is_err() {
            return Err(WalletError::Internal(
                "transaction failed wire round-trip".into(),
            ));
        }
        self.ensure_running()?;
        self.node.relay_transaction(transaction).await?;
        Ok(())
    }

    /// Clears the stop flag; blocking calls work again.
    pub fn start(&self) {
        self.stopped.store(false, Ordering::SeqCst);
    }

    /// Raises the stop flag and wakes the event-queue waiter.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.events.wake();
    }

    /// Blocks until an event is available. A raised stop flag resolves
    /// every waiter with `OperationCancelled`.
    pub async fn get_event(&self) -> WalletResult<WalletEvent> {
        {
            let core = self.core.lock().await;
            core.ensure_initialized()?;
        }
        loop {
            self.ensure_running()?;
            if let Some(event) = self.events.pop() {
                return Ok(event);
            }
            self.events.wait().await;
        }
    }
}

/// Forwards synchronizer callbacks into the wallet core. Every callback
/// re-enters through the dispatcher gate and is a no-op once the wallet
/// is shut down.
struct SyncAdapter {
    core: Arc<Mutex<WalletCore>>,
    events: Arc<EventQueue>,
    softlock_blocks: u32,
}

#[async_trait]
impl SynchronizerObserver for SyncAdapter {
    async fn synchronization_progress(&self, current_height: u32) {
        let mut guard = self.core.lock().await;
        let core = &mut *guard;
        if core.state != WalletState::Initialized {
            return;
        }

        let flushed = core.unlock_schedule.flush_up_to(current_height);
        let containers: HashSet<ContainerId> =
            flushed.iter().map(|job| job.container_id).collect();
        for container in containers {
            core.update_balance(container);
        }
        self.events.push(WalletEvent::BalanceUnlocked);
    }

    async fn transaction_updated(&self, container: ContainerId, transaction_hash: TxHash) {
        let mut guard = self.core.lock().await;
        let core = &mut *guard;
        if core.state != WalletState::Initialized {
            return;
        }

        // the confirmation that an earlier send of ours has committed
        core.spent_outputs.delete_by_spending_hash(&transaction_hash);

        let Some(record) = core.registry.get_by_container(container) else {
            warn!(container, "transaction update for an unknown container");
            return;
        };
        let handle = record.container.clone();
        let owner_address = core.address_of(record);

        let Some((info, balance)) = handle.transaction_information(&transaction_hash) else {
            warn!(
                transaction = %hex::encode(transaction_hash),
                "container has no information for a transaction it reported"
            );
            return;
        };

        let event = if core.ledger.exists(&info.transaction_hash) {
            let Ok(id) = core.ledger.update_height(&info.transaction_hash, info.block_height)
            else {
                return;
            };
            WalletEvent::TransactionUpdated { transaction_index: id }
        } else {
            let id = core.ledger.insert_incoming(&info, balance);
            core.ledger.insert_incoming_transfer(id, owner_address, balance);
            WalletEvent::TransactionCreated { transaction_index: id }
        };

        if info.block_height != UNCONFIRMED_HEIGHT {
            // TODO: unlock_time past the height horizon denotes a unix
            // timestamp; such values overshoot the schedule instead of
            // being clamped to a height.
            let unlock_height = info
                .block_height
                .wrapping_add(info.unlock_time as u32)
                .wrapping_add(self.softlock_blocks)
                .wrapping_add(1);
            core.change.remove(&transaction_hash);
            core.unlock_schedule.enqueue(UnlockJob {
                unlock_height,
                container_id: container,
                transaction_hash,
            });
        }

        core.update_balance(container);
        self.events.push(event);
    }

    async fn transaction_deleted(&self, container: ContainerId, transaction_hash: TxHash) {
        let mut guard = self.core.lock().await;
        let core = &mut *guard;
        if core.state != WalletState::Initialized {
            return;
        }

        let Some(id) = core.ledger.id_of(&transaction_hash) else {
            return;
        };

        core.unlock_schedule.dequeue_by_hash(&transaction_hash);
        core.change.remove(&transaction_hash);
        core.spent_outputs.delete_by_spending_hash(&transaction_hash);
        core.ledger.mark_cancelled(&transaction_hash);

        core.update_balance(container);
        self.events
            .push(WalletEvent::TransactionUpdated { transaction_index: id });
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
