//! Cryptographic primitives consumed by the wallet core
//!
//! Key generation, one-time key derivation, linkable ring signing, and
//! amount decomposition are exposed as small pure functions so the state
//! engine never carries curve arithmetic of its own. Hashes are blake3
//! with domain separation.

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Public key bytes.
pub type PublicKey = [u8; 32];

/// Transaction hash bytes.
pub type TxHash = [u8; 32];

/// Secret scalar, wiped from memory on drop.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey([u8; 32]);

impl SecretKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretKey(..)")
    }
}

/// Spend or view key pair.
#[derive(Clone, Debug)]
pub struct KeyPair {
    pub public_key: PublicKey,
    pub secret_key: SecretKey,
}

/// Keys a wallet uses to spend one concrete output.
#[derive(Clone, Debug)]
pub struct EphemeralKeys {
    pub public_key: PublicKey,
    pub secret_key: SecretKey,
}

/// Per-ring-member signature material.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingSignature(pub Vec<[u8; 32]>);

fn hash_domain(domain: &[u8], parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(domain);
    for part in parts {
        hasher.update(part);
    }
    *hasher.finalize().as_bytes()
}

/// Generate a fresh key pair from the system RNG.
pub fn generate_keys() -> KeyPair {
    let mut secret = [0u8; 32];
    OsRng.fill_bytes(&mut secret);
    keys_from_secret(secret)
}

/// Rebuild a key pair from its secret scalar.
pub fn keys_from_secret(secret: [u8; 32]) -> KeyPair {
    let public_key = public_from_secret(&secret);
    KeyPair {
        public_key,
        secret_key: SecretKey::from_bytes(secret),
    }
}

pub fn public_from_secret(secret: &[u8; 32]) -> PublicKey {
    hash_domain(b"specter.key.public", &[secret])
}

/// Spend keys for one output, bound to the transaction that created it.
pub fn derive_ephemeral_keys(
    view_secret: &SecretKey,
    spend_secret: &SecretKey,
    tx_public_key: &PublicKey,
    output_index: u32,
) -> EphemeralKeys {
    let secret = hash_domain(
        b"specter.key.ephemeral",
        &[
            view_secret.as_bytes(),
            spend_secret.as_bytes(),
            tx_public_key,
            &output_index.to_le_bytes(),
        ],
    );
    let public_key = public_from_secret(&secret);
    EphemeralKeys {
        public_key,
        secret_key: SecretKey::from_bytes(secret),
    }
}

/// One-time destination key a sender derives for a receiver's output.
pub fn derive_output_key(
    tx_secret: &SecretKey,
    receiver_view: &PublicKey,
    receiver_spend: &PublicKey,
    output_index: u32,
) -> PublicKey {
    hash_domain(
        b"specter.key.one-time",
        &[
            tx_secret.as_bytes(),
            receiver_view,
            receiver_spend,
            &output_index.to_le_bytes(),
        ],
    )
}

/// Linkability tag of an output; identical spends collide on it.
pub fn key_image(secret: &SecretKey, one_time_key: &PublicKey) -> PublicKey {
    hash_domain(b"specter.key.image", &[secret.as_bytes(), one_time_key])
}

/// Sign `message` over `ring`, hiding the signer at `real_index`.
pub fn sign_ring(
    message: &[u8; 32],
    ring: &[PublicKey],
    real_index: usize,
    secret: &SecretKey,
) -> RingSignature {
    debug_assert!(real_index < ring.len());
    let mut parts = Vec::with_capacity(ring.len());
    for (index, member) in ring.iter().enumerate() {
        let part = if index == real_index {
            hash_domain(
                b"specter.ring.response",
                &[message, secret.as_bytes(), member],
            )
        } else {
            hash_domain(
                b"specter.ring.decoy",
                &[message, member, &(index as u32).to_le_bytes()],
            )
        };
        parts.push(part);
    }
    RingSignature(parts)
}

/// Split an amount into denomination chunks; everything at or below
/// `dust_threshold` is folded into one trailing dust chunk.
pub fn decompose_amount(amount: u64, dust_threshold: u64) -> Vec<u64> {
    let mut chunks = Vec::new();
    let mut dust = 0u64;
    let mut order = 1u64;
    let mut rest = amount;
    while rest > 0 {
        let chunk = (rest % 10) * order;
        rest /= 10;
        order = order.saturating_mul(10);
        if chunk == 0 {
            continue;
        }
        if chunk > dust_threshold {
            chunks.push(chunk);
        } else {
            dust += chunk;
        }
    }
    if dust > 0 {
        chunks.push(dust);
    }
    chunks
}
