//! Transaction assembly
//!
//! Wire transaction plus the composer that builds one: decomposed
//! outputs with one-time destination keys, ring inputs with key images,
//! and per-input ring signatures over the prefix hash.

use serde::{Deserialize, Serialize};

use crate::crypto::{self, KeyPair, PublicKey, RingSignature, TxHash};
use crate::sync::AccountKeys;

const TRANSACTION_VERSION: u8 = 1;

/// One ring member referenced by an input.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalOutput {
    pub output_index: u32,
    pub target_key: PublicKey,
}

/// The real output hidden inside a ring.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RealOutput {
    pub transaction_public_key: PublicKey,
    /// Position of the real member; stable across the ring's life.
    pub index_in_ring: usize,
    pub output_in_transaction: u32,
}

/// Ring description for one input, before signing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputKeyInfo {
    pub amount: u64,
    pub ring: Vec<GlobalOutput>,
    pub real_output: RealOutput,
}

/// Signed input: ring, key image, per-member signatures.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionInput {
    pub amount: u64,
    pub key_image: PublicKey,
    pub ring: Vec<GlobalOutput>,
    pub signatures: RingSignature,
}

/// One denomination chunk headed to a one-time key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOutput {
    pub amount: u64,
    pub target_key: PublicKey,
}

/// A complete outgoing transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: u8,
    pub unlock_time: u64,
    pub inputs: Vec<TransactionInput>,
    pub outputs: Vec<TransactionOutput>,
    pub public_key: PublicKey,
    pub extra: Vec<u8>,
}

impl Transaction {
    pub fn to_bytes(&self) -> Vec<u8> {
        bincode::serialize(self).expect("transaction serializes")
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }

    pub fn hash(&self) -> TxHash {
        *blake3::hash(&self.to_bytes()).as_bytes()
    }

    pub fn size(&self) -> usize {
        self.to_bytes().len()
    }

    /// Hash over everything except the signatures; the signing message.
    pub fn prefix_hash(&self) -> TxHash {
        let mut prefix = self.clone();
        for input in &mut prefix.inputs {
            input.signatures = RingSignature::default();
        }
        *blake3::hash(&prefix.to_bytes()).as_bytes()
    }
}

struct StagedInput {
    real_index: usize,
    ephemeral_secret: crate::crypto::SecretKey,
}

/// Assembles and signs one outgoing transaction.
pub struct TransactionComposer {
    transaction: Transaction,
    tx_keys: KeyPair,
    staged: Vec<StagedInput>,
}

impl TransactionComposer {
    pub fn new() -> Self {
        let tx_keys = crypto::generate_keys();
        Self {
            transaction: Transaction {
                version: TRANSACTION_VERSION,
                unlock_time: 0,
                inputs: Vec::new(),
                outputs: Vec::new(),
                public_key: tx_keys.public_key,
                extra: Vec::new(),
            },
            tx_keys,
            staged: Vec::new(),
        }
    }

    pub fn add_output(&mut self, amount: u64, receiver_view: &PublicKey, receiver_spend: &PublicKey) {
        let index = self.transaction.outputs.len() as u32;
        let target_key = crypto::derive_output_key(
            &self.tx_keys.secret_key,
            receiver_view,
            receiver_spend,
            index,
        );
        self.transaction
            .outputs
            .push(TransactionOutput { amount, target_key });
    }

    pub fn set_unlock_time(&mut self, unlock_time: u64) {
        self.transaction.unlock_time = unlock_time;
    }

    pub fn append_extra(&mut self, extra: &[u8]) {
        self.transaction.extra.extend_from_slice(extra);
    }

    /// Stages one ring input, deriving the ephemeral spend keys and key
    /// image from the owning account's material.
    pub fn add_input(&mut self, account: &AccountKeys, key_info: InputKeyInfo) {
        let ephemeral = crypto::derive_ephemeral_keys(
            &account.view_secret_key,
            &account.spend_secret_key,
            &key_info.real_output.transaction_public_key,
            key_info.real_output.output_in_transaction,
        );
        let key_image = crypto::key_image(&ephemeral.secret_key, &ephemeral.public_key);
        self.transaction.inputs.push(TransactionInput {
            amount: key_info.amount,
            key_image,
            ring: key_info.ring,
            signatures: RingSignature::default(),
        });
        self.staged.push(StagedInput {
            real_index: key_info.real_output.index_in_ring,
            ephemeral_secret: ephemeral.secret_key,
        });
    }

    /// Signs every input in order and returns the finished transaction.
    pub fn finalize(mut self) -> Transaction {
        let prefix_hash = self.transaction.prefix_hash();
        for (input, staged) in self.transaction.inputs.iter_mut().zip(&self.staged) {
            let ring_keys: Vec<PublicKey> =
                input.ring.iter().map(|member| member.target_key).collect();
            input.signatures = crypto::sign_ring(
                &prefix_hash,
                &ring_keys,
                staged.real_index,
                &staged.ephemeral_secret,
            );
        }
        self.transaction
    }
}

impl Default for TransactionComposer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SecretKey;

    fn account() -> AccountKeys {
        let view = crypto::keys_from_secret([1u8; 32]);
        let spend = crypto::keys_from_secret([2u8; 32]);
        AccountKeys {
            spend_public_key: spend.public_key,
            view_public_key: view.public_key,
            spend_secret_key: spend.secret_key,
            view_secret_key: view.secret_key,
        }
    }

    fn key_info(real_index: usize, ring_len: usize) -> InputKeyInfo {
        InputKeyInfo {
            amount: 500,
            ring: (0..ring_len)
                .map(|i| GlobalOutput {
                    output_index: i as u32 * 10,
                    target_key: [i as u8; 32],
                })
                .collect(),
            real_output: RealOutput {
                transaction_public_key: [7u8; 32],
                index_in_ring: real_index,
                output_in_transaction: 0,
            },
        }
    }

    #[test]
    fn composed_transaction_signs_every_input() {
        let mut composer = TransactionComposer::new();
        composer.add_output(100, &[3u8; 32], &[4u8; 32]);
        composer.set_unlock_time(9);
        composer.append_extra(&[0xAA]);
        composer.add_input(&account(), key_info(1, 3));
        composer.add_input(&account(), key_info(0, 3));

        let transaction = composer.finalize();
        assert_eq!(transaction.unlock_time, 9);
        assert_eq!(transaction.extra, vec![0xAA]);
        assert_eq!(transaction.inputs.len(), 2);
        for input in &transaction.inputs {
            assert_eq!(input.signatures.0.len(), 3);
        }
    }

    #[test]
    fn wire_round_trip_keeps_the_hash() {
        let mut composer = TransactionComposer::new();
        composer.add_output(100, &[3u8; 32], &[4u8; 32]);
        composer.add_input(&account(), key_info(0, 2));
        let transaction = composer.finalize();

        let bytes = transaction.to_bytes();
        let restored = Transaction::from_bytes(&bytes).unwrap();
        assert_eq!(restored, transaction);
        assert_eq!(restored.hash(), transaction.hash());
    }

    #[test]
    fn signatures_do_not_move_the_prefix_hash() {
        let mut composer = TransactionComposer::new();
        composer.add_output(100, &[3u8; 32], &[4u8; 32]);
        composer.add_input(&account(), key_info(0, 2));

        let before = composer.transaction.prefix_hash();
        let transaction = composer.finalize();
        assert_eq!(transaction.prefix_hash(), before);
        assert_ne!(transaction.hash(), before);
    }

    #[test]
    fn outputs_get_distinct_one_time_keys() {
        let mut composer = TransactionComposer::new();
        composer.add_output(100, &[3u8; 32], &[4u8; 32]);
        composer.add_output(100, &[3u8; 32], &[4u8; 32]);
        let transaction = composer.finalize();
        assert_ne!(
            transaction.outputs[0].target_key,
            transaction.outputs[1].target_key
        );
    }

    #[test]
    fn distinct_accounts_give_distinct_key_images() {
        let mut composer = TransactionComposer::new();
        let other = {
            let view = crypto::keys_from_secret([8u8; 32]);
            AccountKeys {
                spend_public_key: [9u8; 32],
                view_public_key: view.public_key,
                spend_secret_key: SecretKey::from_bytes([9u8; 32]),
                view_secret_key: view.secret_key,
            }
        };
        composer.add_input(&account(), key_info(0, 2));
        composer.add_input(&other, key_info(0, 2));
        let transaction = composer.finalize();
        assert_ne!(
            transaction.inputs[0].key_image,
            transaction.inputs[1].key_image
        );
    }
}
