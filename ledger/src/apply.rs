//! Applying transactions and block bodies to a [`LedgerState`].
//!
//! These functions mutate the state they are given in place. Callers that
//! need all-or-nothing semantics apply to a clone and swap it in on success.

use rota_transactions::{Transaction, TxKind};
use rota_types::{Address, Amount, TxHash};
use rota_vm::{ExecutionEngine, Invocation, InvocationKind};

use crate::block::Block;
use crate::economy::Economy;
use crate::error::{ApplyError, ChainError};
use crate::state::{ContractMetadata, ContractRecord, LedgerState};

/// Apply one transaction. Returns its hash.
///
/// Contract execution failures are logged and do not undo the debit or the
/// nonce increment: the sender paid for a failed call.
pub fn apply_transaction(
    state: &mut LedgerState,
    tx: &Transaction,
    engine: &dyn ExecutionEngine,
) -> Result<TxHash, ApplyError> {
    let hash = tx.verify()?;

    if tx.kind == TxKind::ContractCall && state.contract(&tx.to).is_none() {
        return Err(ApplyError::MissingContract(tx.to.clone()));
    }

    if !tx.is_system() {
        let expected = state.nonce(&tx.from);
        if tx.nonce != expected {
            return Err(ApplyError::BadNonce {
                expected,
                got: tx.nonce,
            });
        }
        let balance = state.balance(&tx.from);
        let cost = tx
            .cost()
            .ok_or_else(|| ApplyError::Overflow(tx.from.clone()))?;
        let remaining = balance
            .checked_sub(cost)
            .ok_or(ApplyError::InsufficientBalance {
                need: cost,
                available: balance,
            })?;
        state.set_balance(&tx.from, remaining);
        state.set_nonce(&tx.from, expected + 1);
    }

    if tx.kind.credits_recipient() {
        let credited = state
            .balance(&tx.to)
            .checked_add(tx.amount)
            .ok_or_else(|| ApplyError::Overflow(tx.to.clone()))?;
        state.set_balance(&tx.to, credited);
    }

    match tx.kind {
        TxKind::ContractDeploy => deploy_contract(state, tx, &hash, engine),
        TxKind::ContractCall => call_contract(state, tx, &hash, engine),
        TxKind::Transfer | TxKind::Stake | TxKind::Reward => {}
    }

    Ok(hash)
}

fn deploy_contract(
    state: &mut LedgerState,
    tx: &Transaction,
    hash: &TxHash,
    engine: &dyn ExecutionEngine,
) {
    // Structure validation guarantees code on deploys.
    let Some(code) = tx.code.as_deref() else {
        return;
    };
    let empty = Default::default();
    let outcome = engine.execute(Invocation {
        kind: InvocationKind::Deploy,
        code,
        state: &empty,
        input: tx.input.as_ref(),
        sender: &tx.from,
        value: Amount::ZERO,
    });
    match outcome {
        Ok(initial) => {
            let address = Address::new(hash.to_hex());
            tracing::debug!(contract = %address.short(), creator = %tx.from.short(), "contract deployed");
            state.put_contract(
                address,
                ContractRecord {
                    code: code.to_string(),
                    state: initial,
                    metadata: ContractMetadata {
                        creator: tx.from.clone(),
                        timestamp: tx.timestamp,
                    },
                },
            );
        }
        Err(e) => {
            tracing::warn!(tx = %hash.short(), error = %e, "contract deploy failed");
        }
    }
}

fn call_contract(
    state: &mut LedgerState,
    tx: &Transaction,
    hash: &TxHash,
    engine: &dyn ExecutionEngine,
) {
    let Some(record) = state.contract(&tx.to) else {
        return;
    };
    let outcome = engine.execute(Invocation {
        kind: InvocationKind::Call,
        code: &record.code,
        state: &record.state,
        input: tx.input.as_ref(),
        sender: &tx.from,
        value: tx.amount,
    });
    match outcome {
        Ok(next) => state.set_contract_state(&tx.to, next),
        Err(e) => {
            tracing::warn!(tx = %hash.short(), contract = %tx.to.short(), error = %e, "contract call failed");
        }
    }
}

/// Apply every transaction of `block` and settle its reward.
///
/// Non-reward transactions go first in block order, then the embedded REWARD
/// (or, when the producer left it out, a synthesized one) is checked against
/// the entitlement and applied. Returns the hashes of everything applied.
/// Link, index, hash and validator checks are the caller's job.
pub fn apply_block_body(
    state: &mut LedgerState,
    block: &Block,
    economy: &Economy,
    engine: &dyn ExecutionEngine,
) -> Result<Vec<TxHash>, ChainError> {
    let mut rewards = block.rewards();
    let embedded = rewards.next();
    if rewards.next().is_some() {
        return Err(ChainError::MultipleRewards);
    }

    let mut applied = Vec::with_capacity(block.transactions.len() + 1);
    let mut fees = Amount::ZERO;
    for (position, tx) in block.transactions.iter().enumerate() {
        if tx.kind == TxKind::Reward {
            continue;
        }
        let hash = apply_transaction(state, tx, engine)
            .map_err(|source| ChainError::InvalidTransaction { position, source })?;
        fees = fees.checked_add(tx.fee).ok_or(ChainError::FeeOverflow)?;
        applied.push(hash);
    }

    let expected = economy.entitlement(block.index, fees);
    let synthesized;
    let reward = match embedded {
        Some(reward) => {
            if reward.amount != expected {
                return Err(ChainError::RewardMismatch {
                    expected,
                    got: reward.amount,
                });
            }
            if reward.to != block.validator {
                return Err(ChainError::RewardRecipient {
                    expected: block.validator.clone(),
                    got: reward.to.clone(),
                });
            }
            reward
        }
        None => {
            synthesized = Transaction::reward(block.validator.clone(), expected, block.timestamp);
            &synthesized
        }
    };
    let position = block
        .transactions
        .iter()
        .position(|tx| tx.kind == TxKind::Reward)
        .unwrap_or(0);
    let hash = apply_transaction(state, reward, engine)
        .map_err(|source| ChainError::InvalidTransaction { position, source })?;
    applied.push(hash);

    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rota_crypto::{address_from_public, keypair_from_seed};
    use rota_nullables::NullEngine;
    use rota_types::{BlockHash, ContractInput, KeyPair, Timestamp};
    use rota_vm::{ExecutionError, ScriptEngine};

    fn funded(seed: u8, balance: u128) -> (LedgerState, KeyPair, Address) {
        let kp = keypair_from_seed(&[seed; 32]);
        let addr = address_from_public(&kp.public);
        let mut state = LedgerState::new();
        state.set_balance(&addr, Amount::new(balance));
        (state, kp, addr)
    }

    fn signed(kp: &KeyPair, kind: TxKind, to: Address, amount: u128, nonce: u64, fee: u128) -> Transaction {
        let mut tx = Transaction::new(
            kind,
            address_from_public(&kp.public),
            to,
            Amount::new(amount),
            nonce,
            Amount::new(fee),
            Timestamp::from_millis(1_000 + nonce),
        );
        tx.sign(kp).unwrap();
        tx
    }

    #[test]
    fn transfer_moves_funds_and_bumps_nonce() {
        let (mut state, kp, alice) = funded(1, 1_000);
        let bob = Address::new("bob");
        let tx = signed(&kp, TxKind::Transfer, bob.clone(), 100, 0, 1);
        apply_transaction(&mut state, &tx, &NullEngine::new()).unwrap();
        assert_eq!(state.balance(&alice), Amount::new(899));
        assert_eq!(state.balance(&bob), Amount::new(100));
        assert_eq!(state.nonce(&alice), 1);
    }

    #[test]
    fn stake_burns_without_credit() {
        let (mut state, kp, alice) = funded(1, 1_000);
        let tx = signed(&kp, TxKind::Stake, Address::new("pool"), 300, 0, 2);
        apply_transaction(&mut state, &tx, &NullEngine::new()).unwrap();
        assert_eq!(state.balance(&alice), Amount::new(698));
        assert_eq!(state.balance(&Address::new("pool")), Amount::ZERO);
    }

    #[test]
    fn wrong_nonce_and_overdraft_leave_state_alone() {
        let (mut state, kp, _) = funded(1, 50);
        let before = state.clone();
        let gap = signed(&kp, TxKind::Transfer, Address::new("b"), 1, 3, 1);
        assert_eq!(
            apply_transaction(&mut state, &gap, &NullEngine::new()),
            Err(ApplyError::BadNonce { expected: 0, got: 3 })
        );
        let big = signed(&kp, TxKind::Transfer, Address::new("b"), 50, 0, 1);
        assert!(matches!(
            apply_transaction(&mut state, &big, &NullEngine::new()),
            Err(ApplyError::InsufficientBalance { .. })
        ));
        assert_eq!(state, before);
    }

    #[test]
    fn call_to_missing_contract_fails_before_debit() {
        let (mut state, kp, alice) = funded(1, 50);
        let mut tx = signed(&kp, TxKind::ContractCall, Address::new("nowhere"), 0, 0, 1)
            .with_input(ContractInput::new("x"));
        tx.sign(&kp).unwrap();
        assert_eq!(
            apply_transaction(&mut state, &tx, &NullEngine::new()),
            Err(ApplyError::MissingContract(Address::new("nowhere")))
        );
        assert_eq!(state.balance(&alice), Amount::new(50));
        assert_eq!(state.nonce(&alice), 0);
    }

    #[test]
    fn deploy_then_call_with_script_engine() {
        let (mut state, kp, alice) = funded(1, 100);
        let code = r#"{"init":[{"op":"set","key":"count","value":0}],
                       "methods":{"inc":[{"op":"add","key":"count","value":"$param.by"}]}}"#;
        let mut deploy = Transaction::new(
            TxKind::ContractDeploy,
            alice.clone(),
            Address::new(""),
            Amount::ZERO,
            0,
            Amount::new(1),
            Timestamp::from_millis(77),
        )
        .with_code(code);
        deploy.sign(&kp).unwrap();
        let hash = apply_transaction(&mut state, &deploy, &ScriptEngine).unwrap();
        let contract = Address::new(hash.to_hex());
        let record = state.contract(&contract).unwrap();
        assert_eq!(record.metadata.creator, alice);
        assert_eq!(record.metadata.timestamp, Timestamp::from_millis(77));

        let mut call = Transaction::new(
            TxKind::ContractCall,
            alice.clone(),
            contract.clone(),
            Amount::new(10),
            1,
            Amount::new(1),
            Timestamp::from_millis(78),
        )
        .with_input(ContractInput::new("inc").with_param("by", serde_json::json!(4)));
        call.sign(&kp).unwrap();
        apply_transaction(&mut state, &call, &ScriptEngine).unwrap();
        assert_eq!(state.contract(&contract).unwrap().state["count"], serde_json::json!(4));
        // The call value lands on the contract account.
        assert_eq!(state.balance(&contract), Amount::new(10));
        assert_eq!(state.balance(&alice), Amount::new(88));
    }

    #[test]
    fn failed_execution_still_charges_sender() {
        let (mut state, kp, alice) = funded(1, 100);
        let mut deploy = Transaction::new(
            TxKind::ContractDeploy,
            alice.clone(),
            Address::new(""),
            Amount::ZERO,
            0,
            Amount::new(5),
            Timestamp::from_millis(1),
        )
        .with_code("{}");
        deploy.sign(&kp).unwrap();
        let engine = NullEngine::failing(ExecutionError::StepLimit(1));
        let hash = apply_transaction(&mut state, &deploy, &engine).unwrap();
        assert!(state.contract(&Address::new(hash.to_hex())).is_none());
        assert_eq!(state.balance(&alice), Amount::new(95));
        assert_eq!(state.nonce(&alice), 1);
        assert_eq!(engine.invocations(), 1);
    }

    #[test]
    fn block_body_synthesizes_missing_reward() {
        let (mut state, kp, _) = funded(1, 1_000);
        let v = Address::new("validator");
        let tx = signed(&kp, TxKind::Transfer, Address::new("bob"), 10, 0, 4);
        let block = Block::new(1, BlockHash::ZERO, Timestamp::from_millis(5), vec![tx], v.clone());
        let applied = apply_block_body(&mut state, &block, &Economy::default(), &NullEngine::new()).unwrap();
        assert_eq!(applied.len(), 2);
        assert_eq!(state.balance(&v), Amount::new(2002));
    }

    #[test]
    fn block_body_rejects_inflated_reward() {
        let mut state = LedgerState::new();
        let v = Address::new("validator");
        let reward = Transaction::reward(v.clone(), Amount::new(2001), Timestamp::from_millis(5));
        let block = Block::new(1, BlockHash::ZERO, Timestamp::from_millis(5), vec![reward], v);
        assert_eq!(
            apply_block_body(&mut state, &block, &Economy::default(), &NullEngine::new()),
            Err(ChainError::RewardMismatch {
                expected: Amount::new(2000),
                got: Amount::new(2001)
            })
        );
    }

    #[test]
    fn block_body_rejects_reward_to_someone_else() {
        let mut state = LedgerState::new();
        let reward = Transaction::reward(Address::new("thief"), Amount::new(2000), Timestamp::from_millis(5));
        let block = Block::new(1, BlockHash::ZERO, Timestamp::from_millis(5), vec![reward], Address::new("v"));
        assert!(matches!(
            apply_block_body(&mut state, &block, &Economy::default(), &NullEngine::new()),
            Err(ChainError::RewardRecipient { .. })
        ));
    }

    #[test]
    fn block_body_rejects_two_rewards() {
        let mut state = LedgerState::new();
        let v = Address::new("v");
        let r1 = Transaction::reward(v.clone(), Amount::new(2000), Timestamp::from_millis(5));
        let r2 = Transaction::reward(v.clone(), Amount::new(2000), Timestamp::from_millis(6));
        let block = Block::new(1, BlockHash::ZERO, Timestamp::from_millis(5), vec![r1, r2], v);
        assert_eq!(
            apply_block_body(&mut state, &block, &Economy::default(), &NullEngine::new()),
            Err(ChainError::MultipleRewards)
        );
    }
}
