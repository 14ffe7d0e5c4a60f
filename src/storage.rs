//! Wallet file codec
//!
//! The core hands a [`WalletSnapshot`] of its whole state to this
//! module, which serializes it and seals it under the wallet password:
//! Argon2id key derivation, XChaCha20-Poly1305 sealing, layout
//! `version ‖ salt ‖ nonce ‖ ciphertext`.

use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::crypto::{PublicKey, SecretKey, TxHash};
use crate::error::{WalletError, WalletResult};
use crate::ledger::{WalletTransaction, WalletTransfer};
use crate::spent_outputs::SpentOutput;

const FORMAT_VERSION: u8 = 1;
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 24;
const KDF_MEM_KIB: u32 = 64 * 1024;
const KDF_TIME_COST: u32 = 2;

/// Persisted form of one sub-wallet.
#[derive(Clone, Serialize, Deserialize)]
pub struct WalletSnapshotRecord {
    pub spend_public_key: PublicKey,
    pub spend_secret_key: SecretKey,
    pub creation_timestamp: u64,
    pub actual_balance: u64,
    pub pending_balance: u64,
}

/// Persisted unlock job; the container handle is re-resolved on load.
#[derive(Clone, Serialize, Deserialize)]
pub struct SnapshotUnlockJob {
    pub unlock_height: u32,
    pub wallet_spend_key: PublicKey,
    pub transaction_hash: TxHash,
}

/// Everything the wallet core persists.
#[derive(Clone, Serialize, Deserialize)]
pub struct WalletSnapshot {
    pub view_public_key: PublicKey,
    pub view_secret_key: SecretKey,
    pub actual_balance: u64,
    pub pending_balance: u64,
    pub wallets: Vec<WalletSnapshotRecord>,
    pub transactions: Vec<WalletTransaction>,
    pub transfers: Vec<(usize, WalletTransfer)>,
    pub spent_outputs: Vec<SpentOutput>,
    pub unlock_jobs: Vec<SnapshotUnlockJob>,
    pub change: Vec<(TxHash, u64)>,
}

fn derive_key(password: &str, salt: &[u8]) -> WalletResult<[u8; 32]> {
    let params = Params::new(KDF_MEM_KIB, KDF_TIME_COST, 1, Some(32))
        .map_err(|error| WalletError::Serialization(error.to_string()))?;
    let mut key = [0u8; 32];
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password_into(password.as_bytes(), salt, &mut key)
        .map_err(|error| WalletError::Serialization(error.to_string()))?;
    Ok(key)
}

/// Serializes and seals a snapshot under the wallet password.
pub fn seal_snapshot(snapshot: &WalletSnapshot, password: &str) -> WalletResult<Vec<u8>> {
    let mut plaintext = bincode::serialize(snapshot)
        .map_err(|error| WalletError::Serialization(error.to_string()))?;

    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let mut key = derive_key(password, &salt)?;
    let cipher = XChaCha20Poly1305::new(Key::from_slice(&key));
    let ciphertext = cipher.encrypt(XNonce::from_slice(&nonce), plaintext.as_slice());
    key.zeroize();
    plaintext.zeroize();
    let ciphertext =
        ciphertext.map_err(|_| WalletError::Serialization("wallet sealing failed".into()))?;

    let mut out = Vec::with_capacity(1 + SALT_LEN + NONCE_LEN + ciphertext.len());
    out.push(FORMAT_VERSION);
    out.extend_from_slice(&salt);
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Opens a sealed snapshot; a bad password surfaces as
/// [`WalletError::WrongPassword`].
pub fn open_snapshot(bytes: &[u8], password: &str) -> WalletResult<WalletSnapshot> {
    if bytes.len() < 1 + SALT_LEN + NONCE_LEN {
        return Err(WalletError::Serialization("wallet file truncated".into()));
    }
    if bytes[0] != FORMAT_VERSION {
        return Err(WalletError::Serialization(format!(
            "unrecognized wallet file version {}",
            bytes[0]
        )));
    }
    let (salt, rest) = bytes[1..].split_at(SALT_LEN);
    let (nonce, ciphertext) = rest.split_at(NONCE_LEN);

    let mut key = derive_key(password, salt)?;
    let cipher = XChaCha20Poly1305::new(Key::from_slice(&key));
    let plaintext = cipher.decrypt(XNonce::from_slice(nonce), ciphertext);
    key.zeroize();
    let mut plaintext = plaintext.map_err(|_| WalletError::WrongPassword)?;

    let snapshot = bincode::deserialize(&plaintext)
        .map_err(|error| WalletError::Serialization(error.to_string()));
    plaintext.zeroize();
    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto;

    fn snapshot() -> WalletSnapshot {
        let view = crypto::keys_from_secret([3u8; 32]);
        WalletSnapshot {
            view_public_key: view.public_key,
            view_secret_key: view.secret_key,
            actual_balance: 700,
            pending_balance: 30,
            wallets: vec![WalletSnapshotRecord {
                spend_public_key: [1u8; 32],
                spend_secret_key: SecretKey::from_bytes([2u8; 32]),
                creation_timestamp: 1_700_000_000,
                actual_balance: 700,
                pending_balance: 30,
            }],
            transactions: Vec::new(),
            transfers: Vec::new(),
            spent_outputs: Vec::new(),
            unlock_jobs: vec![SnapshotUnlockJob {
                unlock_height: 42,
                wallet_spend_key: [1u8; 32],
                transaction_hash: [9u8; 32],
            }],
            change: vec![([9u8; 32], 390)],
        }
    }

    #[test]
    fn seal_open_round_trip() {
        let sealed = seal_snapshot(&snapshot(), "hunter2").unwrap();
        let opened = open_snapshot(&sealed, "hunter2").unwrap();

        assert_eq!(opened.actual_balance, 700);
        assert_eq!(opened.wallets.len(), 1);
        assert_eq!(opened.wallets[0].spend_public_key, [1u8; 32]);
        assert_eq!(opened.unlock_jobs[0].unlock_height, 42);
        assert_eq!(opened.change, vec![([9u8; 32], 390)]);
    }

    #[test]
    fn wrong_password_is_detected() {
        let sealed = seal_snapshot(&snapshot(), "hunter2").unwrap();
        assert!(matches!(
            open_snapshot(&sealed, "hunter3"),
            Err(WalletError::WrongPassword)
        ));
    }

    #[test]
    fn sealing_is_salted() {
        let first = seal_snapshot(&snapshot(), "hunter2").unwrap();
        let second = seal_snapshot(&snapshot(), "hunter2").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(
            open_snapshot(&[1, 2, 3], "pw"),
            Err(WalletError::Serialization(_))
        ));
        let mut sealed = seal_snapshot(&snapshot(), "pw").unwrap();
        sealed[0] = 99;
        assert!(matches!(
            open_snapshot(&sealed, "pw"),
            Err(WalletError::Serialization(_))
        ));
    }
}
