//! Wallet errors

use thiserror::Error;

use crate::node::NodeError;

/// Wallet result type
pub type WalletResult<T> = Result<T, WalletError>;

/// Wallet errors
#[derive(Debug, Error)]
pub enum WalletError {
    /// Operation invoked before initialize/load
    #[error("wallet is not initialized")]
    NotInitialized,

    /// Initialize invoked on an initialized wallet
    #[error("wallet is already initialized")]
    AlreadyInitialized,

    /// Load invoked on an initialized wallet
    #[error("operation is not permitted in the current wallet state")]
    WrongState,

    /// Password mismatch
    #[error("wrong password")]
    WrongPassword,

    /// Address string failed to parse
    #[error("failed to parse account address")]
    BadAddress,

    /// Destination list is empty or carries a zero amount
    #[error("destination list is empty or contains a zero amount")]
    ZeroDestination,

    /// Sum of destination amounts plus fee does not fit in 64 bits
    #[error("sum of destination amounts and fee overflows")]
    SumOverflow,

    /// Selection could not cover the requested amount
    #[error("not enough unlocked money")]
    WrongAmount,

    /// Node returned fewer decoys than the requested mixin count
    #[error("mixin count too big for the available decoy set")]
    MixinCountTooBig,

    /// Signed transaction exceeds the relay size limit
    #[error("transaction size {size} exceeds the limit {limit}")]
    TransactionSizeTooBig { size: usize, limit: usize },

    /// Internal consistency failure
    #[error("internal wallet error: {0}")]
    Internal(String),

    /// Stop flag observed
    #[error("operation cancelled")]
    OperationCancelled,

    /// Out-of-range index, unknown address, negative amount
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Node error
    #[error("node error: {0}")]
    Node(#[from] NodeError),

    /// Wallet file codec error
    #[error("serialization error: {0}")]
    Serialization(String),
}
