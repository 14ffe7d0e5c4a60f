//! Account address strings
//!
//! An address encodes the pair (spend public key, view public key) as a
//! prefixed hex string with a blake3 checksum tail.

use crate::crypto::PublicKey;
use crate::error::{WalletError, WalletResult};

/// Human prefix of every account address string.
pub const ADDRESS_PREFIX: &str = "spx";

const CHECKSUM_LEN: usize = 4;
const PAYLOAD_LEN: usize = 64 + CHECKSUM_LEN;

/// The two public keys an address encodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccountAddress {
    pub spend_public_key: PublicKey,
    pub view_public_key: PublicKey,
}

pub fn compose_address(spend_public_key: &PublicKey, view_public_key: &PublicKey) -> String {
    let mut payload = Vec::with_capacity(PAYLOAD_LEN);
    payload.extend_from_slice(spend_public_key);
    payload.extend_from_slice(view_public_key);
    let tail = checksum(&payload);
    payload.extend_from_slice(&tail);
    format!("{ADDRESS_PREFIX}{}", hex::encode(payload))
}

pub fn parse_address(address: &str) -> WalletResult<AccountAddress> {
    let body = address
        .strip_prefix(ADDRESS_PREFIX)
        .ok_or(WalletError::BadAddress)?;
    let bytes = hex::decode(body).map_err(|_| WalletError::BadAddress)?;
    if bytes.len() != PAYLOAD_LEN {
        return Err(WalletError::BadAddress);
    }
    let (keys, tail) = bytes.split_at(64);
    if checksum(keys) != tail[..] {
        return Err(WalletError::BadAddress);
    }
    let mut spend_public_key = [0u8; 32];
    spend_public_key.copy_from_slice(&keys[..32]);
    let mut view_public_key = [0u8; 32];
    view_public_key.copy_from_slice(&keys[32..]);
    Ok(AccountAddress {
        spend_public_key,
        view_public_key,
    })
}

fn checksum(payload: &[u8]) -> [u8; CHECKSUM_LEN] {
    let digest = blake3::hash(payload);
    let mut out = [0u8; CHECKSUM_LEN];
    out.copy_from_slice(&digest.as_bytes()[..CHECKSUM_LEN]);
    out
}
