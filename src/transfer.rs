//! Send-pipeline stages
//!
//! The pure parts of a send: destination validation, randomized greedy
//! output selection, mixin sufficiency checks, ring preparation, and
//! denomination splitting. The wallet facade strings them together and
//! owns the node round trips.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::address::{parse_address, AccountAddress};
use crate::crypto::{decompose_amount, PublicKey};
use crate::error::{WalletError, WalletResult};
use crate::ledger::WalletTransfer;
use crate::node::OutsForAmount;
use crate::spent_outputs::SpentOutputTable;
use crate::sync::TransactionOutputInfo;
use crate::transaction::{GlobalOutput, InputKeyInfo, RealOutput};

/// Key-unlocked outputs of one sub-wallet, as selection candidates.
#[derive(Clone, Debug)]
pub struct WalletOuts {
    pub wallet_spend_key: PublicKey,
    pub outs: Vec<TransactionOutputInfo>,
}

/// One output chosen to fund a transaction.
#[derive(Clone, Debug)]
pub struct SelectedOutput {
    pub out: TransactionOutputInfo,
    pub wallet_spend_key: PublicKey,
}

/// A ring-ready input plus the wallet that owns its real member.
#[derive(Clone, Debug)]
pub struct PreparedInput {
    pub key_info: InputKeyInfo,
    pub wallet_spend_key: PublicKey,
}

/// Decomposed amounts headed to one receiver.
#[derive(Clone, Debug)]
pub struct ReceiverAmounts {
    pub receiver: AccountAddress,
    pub amounts: Vec<u64>,
}

pub fn validate_destinations(destinations: &[WalletTransfer]) -> WalletResult<()> {
    for destination in destinations {
        parse_address(&destination.address)?;
    }
    Ok(())
}

/// Sums destinations plus fee, rejecting zero, negative, and overflowing
/// amounts before any state is touched.
pub fn count_needed_money(destinations: &[WalletTransfer], fee: u64) -> WalletResult<u64> {
    let mut needed: u64 = 0;
    for destination in destinations {
        if destination.amount == 0 {
            return Err(WalletError::ZeroDestination);
        }
        if destination.amount < 0 {
            return Err(WalletError::InvalidArgument("negative destination amount"));
        }
        needed = needed
            .checked_add(destination.amount as u64)
            .ok_or(WalletError::SumOverflow)?;
    }
    needed.checked_add(fee).ok_or(WalletError::SumOverflow)
}

/// Randomized greedy selection: pick a random wallet, then a random
/// output inside it, take it unless reserved or dust, and drop every
/// inspected output from the working set. At most one dust output is
/// taken per pass, and one final dust sweep may top up an insufficient
/// total. The generator is seeded fresh for every call.
pub fn select_transfers(
    needed_money: u64,
    mut dust_allowed: bool,
    dust_threshold: u64,
    mut wallets: Vec<WalletOuts>,
    spent: &SpentOutputTable,
) -> (u64, Vec<SelectedOutput>) {
    wallets.retain(|wallet| !wallet.outs.is_empty());

    let mut found_money = 0u64;
    let mut selected = Vec::new();
    let mut rng = StdRng::from_entropy();

    while found_money < needed_money && !wallets.is_empty() {
        let wallet_index = rng.gen_range(0..wallets.len());
        let out_index = rng.gen_range(0..wallets[wallet_index].outs.len());
        let out = wallets[wallet_index].outs[out_index].clone();

        if !spent.is_used(&out.transaction_hash, out.output_in_transaction)
            && (out.amount > dust_threshold || dust_allowed)
        {
            if out.amount <= dust_threshold {
                dust_allowed = false;
            }
            found_money += out.amount;
            selected.push(SelectedOutput {
                out,
                wallet_spend_key: wallets[wallet_index].wallet_spend_key,
            });
        }

        wallets[wallet_index].outs.remove(out_index);
        if wallets[wallet_index].outs.is_empty() {
            wallets.remove(wallet_index);
        }
    }

    if !dust_allowed || found_money >= needed_money {
        return (found_money, selected);
    }

    // one last dust output may close the gap
    for wallet in &wallets {
        if let Some(out) = wallet.outs.iter().find(|out| {
            out.amount <= dust_threshold
                && !spent.is_used(&out.transaction_hash, out.output_in_transaction)
        }) {
            found_money += out.amount;
            selected.push(SelectedOutput {
                out: out.clone(),
                wallet_spend_key: wallet.wallet_spend_key,
            });
            break;
        }
    }

    (found_money, selected)
}

pub fn check_enough_mixins(mixin_result: &[OutsForAmount], mixin: u64) -> WalletResult<()> {
    if mixin == 0 && mixin_result.is_empty() {
        return Err(WalletError::MixinCountTooBig);
    }
    if mixin_result
        .iter()
        .any(|for_amount| (for_amount.outs.len() as u64) < mixin)
    {
        return Err(WalletError::MixinCountTooBig);
    }
    Ok(())
}

/// Builds one ring per selected output: decoys sorted by global index,
/// any decoy colliding with the real output dropped, the first `mixin`
/// kept, and the real output spliced into ascending position.
pub fn prepare_inputs(
    selected: &[SelectedOutput],
    mixin_result: &mut [OutsForAmount],
    mixin: u64,
) -> Vec<PreparedInput> {
    let mut prepared = Vec::with_capacity(selected.len());

    for (index, input) in selected.iter().enumerate() {
        let mut ring: Vec<GlobalOutput> = Vec::new();

        if let Some(for_amount) = mixin_result.get_mut(index) {
            for_amount
                .outs
                .sort_by_key(|entry| entry.global_amount_index);
            for decoy in &for_amount.outs {
                if decoy.global_amount_index == input.out.global_output_index {
                    continue;
                }
                ring.push(GlobalOutput {
                    output_index: decoy.global_amount_index,
                    target_key: decoy.out_key,
                });
                if ring.len() as u64 >= mixin {
                    break;
                }
            }
        }

        let insert_at = ring
            .iter()
            .position(|member| member.output_index >= input.out.global_output_index)
            .unwrap_or(ring.len());
        ring.insert(
            insert_at,
            GlobalOutput {
                output_index: input.out.global_output_index,
                target_key: input.out.output_key,
            },
        );

        prepared.push(PreparedInput {
            key_info: InputKeyInfo {
                amount: input.out.amount,
                ring,
                real_output: RealOutput {
                    transaction_public_key: input.out.transaction_public_key,
                    index_in_ring: insert_at,
                    output_in_transaction: input.out.output_in_transaction,
                },
            },
            wallet_spend_key: input.wallet_spend_key,
        });
    }

    prepared
}

/// Decomposes every destination plus the change bucket into standard
/// denominations, parsing receiver addresses along the way.
pub fn split_destinations(
    destinations: &[WalletTransfer],
    change: &WalletTransfer,
    dust_threshold: u64,
) -> WalletResult<Vec<ReceiverAmounts>> {
    let mut decomposed = Vec::with_capacity(destinations.len() + 1);
    for destination in destinations {
        decomposed.push(ReceiverAmounts {
            receiver: parse_address(&destination.address)?,
            amounts: decompose_amount(destination.amount as u64, dust_threshold),
        });
    }
    decomposed.push(ReceiverAmounts {
        receiver: parse_address(&change.address)?,
        amounts: decompose_amount(change.amount as u64, dust_threshold),
    });
    Ok(decomposed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::compose_address;
    use crate::node::OutEntry;
    use crate::spent_outputs::SpentOutput;

    fn output(amount: u64, hash_byte: u8, index: u32, global: u32) -> TransactionOutputInfo {
        TransactionOutputInfo {
            amount,
            global_output_index: global,
            output_in_transaction: index,
            transaction_public_key: [0u8; 32],
            output_key: [hash_byte; 32],
            transaction_hash: [hash_byte; 32],
        }
    }

    fn destination(amount: i64) -> WalletTransfer {
        WalletTransfer {
            address: compose_address(&[1u8; 32], &[2u8; 32]),
            amount,
        }
    }

    #[test]
    fn needed_money_rejects_zero_and_negative() {
        assert!(matches!(
            count_needed_money(&[destination(0)], 1),
            Err(WalletError::ZeroDestination)
        ));
        assert!(matches!(
            count_needed_money(&[destination(-5)], 1),
            Err(WalletError::InvalidArgument(_))
        ));
        assert_eq!(count_needed_money(&[destination(600)], 10).unwrap(), 610);
    }

    #[test]
    fn needed_money_rejects_overflow() {
        assert!(matches!(
            count_needed_money(&[destination(i64::MAX), destination(i64::MAX)], 0),
            Err(WalletError::SumOverflow)
        ));
        assert!(matches!(
            count_needed_money(&[destination(i64::MAX)], u64::MAX),
            Err(WalletError::SumOverflow)
        ));
    }

    #[test]
    fn selection_covers_the_need_without_reserved_outputs() {
        let mut spent = SpentOutputTable::new();
        spent.insert(SpentOutput {
            amount: 400,
            transaction_hash: [3u8; 32],
            output_in_transaction: 0,
            wallet_spend_key: [7u8; 32],
            spending_transaction_hash: [9u8; 32],
        });

        let wallets = vec![WalletOuts {
            wallet_spend_key: [7u8; 32],
            outs: vec![
                output(400, 3, 0, 0),
                output(300_000, 4, 0, 1),
                output(300_000, 5, 0, 2),
            ],
        }];

        let (found, selected) = select_transfers(500_000, false, 10_000, wallets, &spent);
        assert_eq!(found, 600_000);
        assert_eq!(selected.len(), 2);
        assert!(selected.iter().all(|s| s.out.transaction_hash != [3u8; 32]));
    }

    #[test]
    fn at_most_one_dust_output_per_pass() {
        let spent = SpentOutputTable::new();
        let wallets = vec![WalletOuts {
            wallet_spend_key: [7u8; 32],
            outs: vec![
                output(100, 1, 0, 0),
                output(100, 1, 1, 1),
                output(100, 1, 2, 2),
            ],
        }];

        let (found, selected) = select_transfers(1_000_000, true, 10_000, wallets, &spent);
        assert_eq!(found, 100);
        assert_eq!(selected.len(), 1);
    }

    #[test]
    fn dust_sweep_only_runs_short_of_funds() {
        let spent = SpentOutputTable::new();
        let wallets = vec![WalletOuts {
            wallet_spend_key: [7u8; 32],
            outs: vec![output(500_000, 1, 0, 0)],
        }];

        let (found, selected) = select_transfers(400_000, true, 10_000, wallets, &spent);
        assert_eq!(found, 500_000);
        assert_eq!(selected.len(), 1);
    }

    #[test]
    fn empty_wallets_produce_nothing() {
        let spent = SpentOutputTable::new();
        let (found, selected) = select_transfers(
            100,
            true,
            10_000,
            vec![WalletOuts {
                wallet_spend_key: [7u8; 32],
                outs: Vec::new(),
            }],
            &spent,
        );
        assert_eq!(found, 0);
        assert!(selected.is_empty());
    }

    #[test]
    fn mixin_check_flags_thin_decoy_sets() {
        let full = OutsForAmount {
            amount: 500,
            outs: vec![
                OutEntry {
                    global_amount_index: 1,
                    out_key: [1u8; 32],
                },
                OutEntry {
                    global_amount_index: 2,
                    out_key: [2u8; 32],
                },
            ],
        };
        let thin = OutsForAmount {
            amount: 600,
            outs: vec![OutEntry {
                global_amount_index: 1,
                out_key: [1u8; 32],
            }],
        };

        assert!(check_enough_mixins(&[full.clone()], 2).is_ok());
        assert!(matches!(
            check_enough_mixins(&[full, thin], 2),
            Err(WalletError::MixinCountTooBig)
        ));
        assert!(matches!(
            check_enough_mixins(&[], 0),
            Err(WalletError::MixinCountTooBig)
        ));
    }

    #[test]
    fn prepared_ring_is_sorted_with_the_real_output_spliced_in() {
        let selected = vec![SelectedOutput {
            out: output(500, 8, 0, 25),
            wallet_spend_key: [7u8; 32],
        }];
        let mut mixin_result = vec![OutsForAmount {
            amount: 500,
            outs: vec![
                OutEntry {
                    global_amount_index: 40,
                    out_key: [4u8; 32],
                },
                OutEntry {
                    global_amount_index: 10,
                    out_key: [1u8; 32],
                },
                OutEntry {
                    global_amount_index: 25,
                    out_key: [2u8; 32],
                },
                OutEntry {
                    global_amount_index: 30,
                    out_key: [3u8; 32],
                },
            ],
        }];

        let prepared = prepare_inputs(&selected, &mut mixin_result, 3);
        assert_eq!(prepared.len(), 1);

        let key_info = &prepared[0].key_info;
        // the colliding decoy at 25 is dropped, the real output replaces it
        assert_eq!(key_info.ring.len(), 4);
        let indices: Vec<u32> = key_info.ring.iter().map(|m| m.output_index).collect();
        assert_eq!(indices, vec![10, 25, 30, 40]);
        assert_eq!(key_info.real_output.index_in_ring, 1);
        assert_eq!(key_info.ring[1].target_key, [8u8; 32]);
    }

    #[test]
    fn zero_mixin_rings_hold_only_the_real_output() {
        let selected = vec![SelectedOutput {
            out: output(500, 8, 0, 25),
            wallet_spend_key: [7u8; 32],
        }];
        let prepared = prepare_inputs(&selected, &mut [], 0);
        assert_eq!(prepared[0].key_info.ring.len(), 1);
        assert_eq!(prepared[0].key_info.real_output.index_in_ring, 0);
    }

    #[test]
    fn split_appends_the_change_bucket() {
        let change = WalletTransfer {
            address: compose_address(&[9u8; 32], &[2u8; 32]),
            amount: 390,
        };
        let decomposed = split_destinations(&[destination(600)], &change, 100).unwrap();
        assert_eq!(decomposed.len(), 2);
        assert_eq!(decomposed[0].amounts.iter().sum::<u64>(), 600);
        assert_eq!(decomposed[1].amounts.iter().sum::<u64>(), 390);
        assert_eq!(decomposed[1].receiver.spend_public_key, [9u8; 32]);
    }

    #[test]
    fn split_rejects_bad_addresses() {
        let bad = WalletTransfer {
            address: "not-an-address".into(),
            amount: 10,
        };
        let change = WalletTransfer {
            address: compose_address(&[9u8; 32], &[2u8; 32]),
            amount: 0,
        };
        assert!(matches!(
            split_destinations(&[bad], &change, 100),
            Err(WalletError::BadAddress)
        ));
    }
}
