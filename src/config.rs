//! Wallet configuration

/// Protocol and policy constants for the wallet core.
#[derive(Clone, Debug)]
pub struct WalletConfig {
    /// Confirmations before a received output becomes spendable.
    pub transaction_spendable_age: u32,
    /// Extra confirmations past a transaction's declared unlock time.
    pub softlock_blocks: u32,
    /// Outputs at or below this amount count as dust.
    pub dust_threshold: u64,
    /// Upper bound on the serialized size of an outgoing transaction.
    pub max_transaction_size: usize,
    /// How far behind the wall clock a new subscription starts scanning.
    pub sync_start_lookback_secs: u64,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            transaction_spendable_age: 10,
            softlock_blocks: 1,
            dust_threshold: 10_000,
            max_transaction_size: 100_000, // tracks the block size carve-out
            sync_start_lookback_secs: 60 * 60 * 24,
        }
    }
}
