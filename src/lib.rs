//! Specter Wallet Core
//!
//! In-memory state engine of a multi-address privacy wallet:
//! - Sub-wallet registry sharing one view key, indexed four ways
//! - Transaction and transfer ledger with stable dense ids
//! - Spent-output table and unlock schedule
//! - Balance accounting driven by blockchain synchronizer callbacks
//! - Ring-signature send pipeline with randomized output selection
//! - Event mailbox and password-sealed wallet files
//!
//! The blockchain synchronizer, network node, and per-wallet transfers
//! containers are consumed as traits; in-memory doubles for each ship
//! alongside the traits for tests and local runs.

pub mod address;
pub mod config;
pub mod crypto;
pub mod error;
pub mod events;
pub mod ledger;
pub mod node;
pub mod registry;
pub mod spent_outputs;
pub mod storage;
pub mod sync;
pub mod transaction;
pub mod transfer;
pub mod unlock;
pub mod wallet;

pub use address::{compose_address, parse_address, AccountAddress, ADDRESS_PREFIX};
pub use config::WalletConfig;
pub use crypto::{generate_keys, keys_from_secret, KeyPair, PublicKey, SecretKey, TxHash};
pub use error::{WalletError, WalletResult};
pub use events::{EventQueue, WalletEvent};
pub use ledger::{TransactionState, WalletTransaction, WalletTransfer};
pub use node::{InMemoryNode, NodeClient, NodeError, OutEntry, OutsForAmount};
pub use registry::{WalletRecord, WalletRegistry};
pub use spent_outputs::{SpentOutput, SpentOutputTable};
pub use storage::{WalletSnapshot, WalletSnapshotRecord};
pub use sync::{
    AccountKeys, AccountSubscription, BlockchainSynchronizer, ContainerId, InMemoryContainer,
    InMemorySynchronizer, OutputFilter, SyncStart, SynchronizerObserver, TransactionInformation,
    TransactionOutputInfo, TransfersContainer, UNCONFIRMED_HEIGHT,
};
pub use transaction::{
    GlobalOutput, InputKeyInfo, RealOutput, Transaction, TransactionComposer, TransactionInput,
    TransactionOutput,
};
pub use transfer::{SelectedOutput, WalletOuts};
pub use unlock::{UnlockJob, UnlockSchedule};
pub use wallet::{Wallet, WalletState};
