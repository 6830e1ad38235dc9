//! The chain state machine.
//!
//! [`Chain`] owns the block list, the [`LedgerState`] derived from it, the
//! [`Mempool`], the validator registry and the economy. Every mutation goes
//! through `&mut self`; the node serializes access with a single lock.
//!
//! Block application is copy-then-commit: a block (or a replacement chain)
//! is applied to a clone of the state, and the clone replaces the live state
//! only if every check passed. A rejected block leaves no trace.

use std::sync::Arc;

use rota_consensus::ValidatorRegistry;
use rota_store::SnapshotStore;
use rota_transactions::{Transaction, TxKind};
use rota_types::{Address, Amount, BlockHash, ChainParams, Clock, TxHash};
use rota_vm::ExecutionEngine;

use crate::apply::{apply_block_body, apply_transaction};
use crate::block::Block;
use crate::economy::Economy;
use crate::error::{AdmissionError, ApplyError, ChainError, LedgerError};
use crate::mempool::{InsertOutcome, Mempool};
use crate::snapshot::LedgerSnapshot;
use crate::state::{ContractRecord, LedgerState};

/// How many times a snapshot write is attempted before giving up.
pub const SAVE_ATTEMPTS: usize = 3;

/// Non-error outcomes of mempool admission.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdmissionStatus {
    Accepted,
    /// Already pending, or already confirmed (stale nonce). Nothing changed.
    Skipped,
}

/// Result of appending a block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockReceipt {
    pub index: u64,
    pub hash: BlockHash,
    /// Whether the resulting snapshot reached the store.
    pub durable: bool,
}

/// A block this node produced and appended.
#[derive(Clone, Debug)]
pub struct ProducedBlock {
    pub block: Block,
    pub receipt: BlockReceipt,
}

pub struct Chain {
    blocks: Vec<Block>,
    state: LedgerState,
    mempool: Mempool,
    validators: ValidatorRegistry,
    economy: Economy,
    params: ChainParams,
    genesis: Block,
    clock: Arc<dyn Clock>,
    store: Arc<dyn SnapshotStore>,
    engine: Arc<dyn ExecutionEngine>,
}

impl Chain {
    /// Load the last snapshot from `store`, or start at genesis.
    ///
    /// A snapshot whose chain does not verify is discarded (peers and node
    /// identity are kept) and the node starts over from genesis.
    pub fn open(
        params: ChainParams,
        clock: Arc<dyn Clock>,
        store: Arc<dyn SnapshotStore>,
        engine: Arc<dyn ExecutionEngine>,
    ) -> Result<Self, LedgerError> {
        let genesis = Block::genesis(&params);
        let (blocks, state) = match store.load()? {
            None => {
                tracing::info!(genesis = %genesis.hash.short(), "no snapshot found, starting from genesis");
                (vec![genesis.clone()], LedgerState::new())
            }
            Some(bytes) => match LedgerSnapshot::from_bytes(&bytes) {
                Ok(snapshot) => {
                    let (blocks, state) = snapshot.into_parts();
                    match validate_chain(&genesis, &blocks) {
                        Ok(()) => {
                            tracing::info!(height = blocks.len(), "ledger restored from snapshot");
                            (blocks, state)
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "stored chain is invalid, starting from genesis");
                            (vec![genesis.clone()], state.cleared())
                        }
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "stored snapshot is unreadable, starting from genesis");
                    (vec![genesis.clone()], LedgerState::new())
                }
            },
        };

        Ok(Self {
            blocks,
            state,
            mempool: Mempool::new(),
            validators: ValidatorRegistry::new(params.validator_timeout_ms),
            economy: Economy::new(&params),
            params,
            genesis,
            clock,
            store,
            engine,
        })
    }

    // ── Accessors ───────────────────────────────────────────────────────

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    pub fn economy(&self) -> &Economy {
        &self.economy
    }

    /// Number of blocks, genesis included.
    pub fn height(&self) -> u64 {
        self.blocks.len() as u64
    }

    pub fn tip(&self) -> &Block {
        // `blocks` always holds at least genesis.
        self.blocks.last().unwrap_or(&self.genesis)
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn block(&self, index: u64) -> Option<&Block> {
        usize::try_from(index).ok().and_then(|i| self.blocks.get(i))
    }

    pub fn genesis(&self) -> &Block {
        &self.genesis
    }

    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    pub fn mempool(&self) -> &Mempool {
        &self.mempool
    }

    pub fn balance(&self, address: &Address) -> Amount {
        self.state.balance(address)
    }

    pub fn nonce(&self, address: &Address) -> u64 {
        self.state.nonce(address)
    }

    pub fn contract(&self, address: &Address) -> Option<&ContractRecord> {
        self.state.contract(address)
    }

    /// Pending entries of `sender` that can still apply (nonce not yet confirmed).
    fn live_pending<'a>(&'a self, sender: &'a Address) -> impl Iterator<Item = &'a Transaction> {
        let confirmed = self.state.nonce(sender);
        self.mempool
            .filter_by_sender(sender)
            .filter(move |tx| tx.nonce >= confirmed)
    }

    /// Nonce the sender's next transaction must carry.
    pub fn pending_nonce(&self, sender: &Address) -> u64 {
        self.state.nonce(sender) + self.live_pending(sender).count() as u64
    }

    /// Confirmed balance minus everything the sender's pending entries spend.
    pub fn pending_balance(&self, sender: &Address) -> Amount {
        let spent: Amount = self
            .live_pending(sender)
            .map(|tx| tx.cost().unwrap_or(Amount::new(u128::MAX)))
            .fold(Amount::ZERO, Amount::saturating_add);
        self.state.balance(sender).saturating_sub(spent)
    }

    /// `1 + floor(mempool size / 5)`.
    pub fn min_fee(&self) -> Amount {
        Amount::new(1 + (self.mempool.len() / 5) as u128)
    }

    // ── Validators ──────────────────────────────────────────────────────

    pub fn register_validator(&mut self, validator: Address) {
        let now = self.clock.now();
        self.validators.register(validator, now);
    }

    pub fn valid_validators(&self) -> Vec<Address> {
        self.validators.valid_validators(self.clock.now())
    }

    pub fn select_validator(&self, seed: &BlockHash, must_include: Option<&Address>) -> Address {
        self.validators
            .select_validator(seed, must_include, self.clock.now())
    }

    // ── Transactions ────────────────────────────────────────────────────

    /// Mempool admission.
    pub fn add_transaction(&mut self, mut tx: Transaction) -> Result<AdmissionStatus, AdmissionError> {
        if tx.kind == TxKind::Reward {
            return Err(AdmissionError::RewardNotAdmissible);
        }
        let hash = tx.verify()?;
        if self.mempool.contains(&hash) {
            tracing::trace!(tx = %hash.short(), "already pending");
            return Ok(AdmissionStatus::Skipped);
        }

        let confirmed = self.state.nonce(&tx.from);
        if tx.nonce < confirmed {
            tracing::debug!(tx = %hash.short(), nonce = tx.nonce, confirmed, "stale nonce, skipping");
            return Ok(AdmissionStatus::Skipped);
        }

        let expected = self.pending_nonce(&tx.from);
        if tx.nonce != expected {
            return Err(AdmissionError::NonceGap {
                expected,
                got: tx.nonce,
            });
        }

        let min = self.min_fee();
        if tx.fee < min {
            return Err(AdmissionError::FeeTooLow { min, got: tx.fee });
        }

        let available = self.pending_balance(&tx.from);
        let need = tx.cost().ok_or(AdmissionError::InsufficientBalance {
            need: Amount::new(u128::MAX),
            available,
        })?;
        if need > available {
            return Err(AdmissionError::InsufficientBalance { need, available });
        }

        tx.hash = hash;
        let from = tx.from.clone();
        match self.mempool.add(tx) {
            InsertOutcome::Inserted => {
                tracing::debug!(tx = %hash.short(), from = %from.short(), pool = self.mempool.len(), "transaction admitted");
                Ok(AdmissionStatus::Accepted)
            }
            InsertOutcome::AlreadyPresent => Ok(AdmissionStatus::Skipped),
        }
    }

    /// Apply a transaction directly to the live state, bypassing blocks.
    ///
    /// Block processing never calls this; it exists for tooling that seeds a
    /// ledger (tests, local genesis allocations).
    pub fn apply_transaction(&mut self, tx: &Transaction) -> Result<TxHash, ApplyError> {
        apply_transaction(&mut self.state, tx, self.engine.as_ref())
    }

    // ── Blocks ──────────────────────────────────────────────────────────

    /// Produce the next block if `validator` holds the slot for the tip.
    ///
    /// Candidates are taken in fee order and trial-applied to a scratch
    /// state. A candidate whose nonce is ahead of its sender waits for a
    /// later pass, so a sender's entries are sequenced by nonce even when a
    /// later one pays more. Candidates that can never apply are evicted.
    pub fn create_block(&mut self, validator: &Address) -> Result<Option<ProducedBlock>, ChainError> {
        let tip_hash = self.tip().hash;
        if self.select_validator(&tip_hash, Some(validator)) != *validator {
            return Ok(None);
        }

        let cap = self.params.max_block_transactions;
        let mut scratch = self.state.clone();
        let mut selected: Vec<Transaction> = Vec::new();
        let mut toxic: Vec<TxHash> = Vec::new();
        let mut waiting: Vec<Transaction> = self.mempool.sorted();

        loop {
            let mut progressed = false;
            let mut deferred = Vec::new();
            for tx in waiting {
                if selected.len() >= cap {
                    deferred.push(tx);
                    continue;
                }
                match apply_transaction(&mut scratch, &tx, self.engine.as_ref()) {
                    Ok(_) => {
                        selected.push(tx);
                        progressed = true;
                    }
                    Err(ApplyError::BadNonce { expected, got }) if got > expected => deferred.push(tx),
                    Err(e) => {
                        tracing::debug!(tx = %tx.hash.short(), error = %e, "evicting toxic transaction");
                        toxic.push(tx.hash);
                    }
                }
            }
            waiting = deferred;
            if !progressed || selected.len() >= cap || waiting.is_empty() {
                break;
            }
        }
        // Anything still waiting with room left is stranded behind a gap.
        if selected.len() < cap {
            toxic.extend(waiting.iter().map(|tx| tx.hash));
        }
        if !toxic.is_empty() {
            let evicted = self.mempool.remove(&toxic);
            tracing::info!(evicted, "purged toxic transactions from mempool");
        }

        let fees = selected
            .iter()
            .try_fold(Amount::ZERO, |acc, tx| acc.checked_add(tx.fee))
            .ok_or(ChainError::FeeOverflow)?;
        let index = self.height();
        let timestamp = self.clock.now();
        let reward = Transaction::reward(
            validator.clone(),
            self.economy.entitlement(index, fees),
            timestamp,
        );
        let mut transactions = Vec::with_capacity(selected.len() + 1);
        transactions.push(reward);
        transactions.extend(selected);

        let block = Block::new(index, tip_hash, timestamp, transactions, validator.clone());
        let receipt = self.add_block(block.clone())?;
        Ok(Some(ProducedBlock { block, receipt }))
    }

    /// Validate and append `block`.
    pub fn add_block(&mut self, block: Block) -> Result<BlockReceipt, ChainError> {
        let tip = self.tip();
        let expected_index = self.height();
        if block.index != expected_index {
            return Err(ChainError::IndexMismatch {
                expected: expected_index,
                got: block.index,
            });
        }
        if block.last_hash != tip.hash {
            return Err(ChainError::LinkMismatch {
                expected: tip.hash,
                got: block.last_hash,
            });
        }
        let computed = block.compute_hash();
        if computed != block.hash {
            return Err(ChainError::HashMismatch {
                stored: block.hash,
                computed,
            });
        }
        let slot = self.select_validator(&tip.hash, Some(&block.validator));
        if slot != block.validator {
            return Err(ChainError::WrongValidator {
                expected: slot,
                got: block.validator.clone(),
            });
        }

        let mut scratch = self.state.clone();
        let applied = apply_block_body(&mut scratch, &block, &self.economy, self.engine.as_ref())?;

        self.state = scratch;
        let receipt_index = block.index;
        let receipt_hash = block.hash;
        let tx_count = block.transactions.len();
        let validator = block.validator.clone();
        self.blocks.push(block);
        self.mempool.remove(&applied);
        let durable = self.save();

        tracing::info!(
            index = receipt_index,
            hash = %receipt_hash.short(),
            validator = %validator.short(),
            txs = tx_count,
            durable,
            "block accepted"
        );
        Ok(BlockReceipt {
            index: receipt_index,
            hash: receipt_hash,
            durable,
        })
    }

    /// Structural validity of a foreign chain: canonical genesis, contiguous
    /// indices, intact links, reproducible hashes.
    pub fn is_valid_chain(&self, blocks: &[Block]) -> bool {
        validate_chain(&self.genesis, blocks).is_ok()
    }

    /// Replace the chain with `blocks`, replaying every block from genesis.
    ///
    /// Used for fork recovery. Replay runs on scratch state: if any block
    /// fails, the current chain stays in place. Validator slots are not
    /// re-checked, since the validator set that produced historical blocks
    /// is not known here.
    pub fn rebuild_from(&mut self, blocks: Vec<Block>) -> Result<BlockReceipt, ChainError> {
        validate_chain(&self.genesis, &blocks)?;

        let mut scratch = self.state.cleared();
        let mut applied = Vec::new();
        for block in blocks.iter().skip(1) {
            applied.extend(apply_block_body(&mut scratch, block, &self.economy, self.engine.as_ref())?);
        }

        let previous_height = self.height();
        self.state = scratch;
        self.blocks = blocks;
        self.mempool.remove(&applied);
        let durable = self.save();
        let tip = self.tip();
        tracing::warn!(
            from = previous_height,
            to = self.blocks.len(),
            tip = %tip.hash.short(),
            durable,
            "chain rebuilt"
        );
        Ok(BlockReceipt {
            index: tip.index,
            hash: tip.hash,
            durable,
        })
    }

    // ── Peers & identity ────────────────────────────────────────────────

    pub fn peers(&self) -> impl Iterator<Item = &str> {
        self.state.peers().iter().map(String::as_str)
    }

    /// Remember a peer address. Persists and returns `true` if it was new.
    pub fn add_peer(&mut self, addr: &str) -> bool {
        if self.state.add_peer(addr) {
            self.save();
            true
        } else {
            false
        }
    }

    pub fn node_id(&self) -> Option<&str> {
        self.state.node_id()
    }

    pub fn set_node_id(&mut self, node_id: &str) {
        self.state.set_node_id(node_id);
        self.save();
    }

    // ── Persistence ─────────────────────────────────────────────────────

    /// Write the snapshot, retrying up to [`SAVE_ATTEMPTS`] times.
    /// Returns whether it reached the store.
    pub fn save(&self) -> bool {
        let bytes = LedgerSnapshot::capture(&self.blocks, &self.state).to_bytes();
        for attempt in 1..=SAVE_ATTEMPTS {
            match self.store.save(&bytes) {
                Ok(()) => return true,
                Err(e) => {
                    tracing::error!(attempt, max = SAVE_ATTEMPTS, error = %e, "failed to persist ledger snapshot");
                }
            }
        }
        false
    }

    pub fn close(&self) -> Result<(), LedgerError> {
        self.store.close()?;
        Ok(())
    }
}

fn validate_chain(genesis: &Block, blocks: &[Block]) -> Result<(), ChainError> {
    let first = blocks.first().ok_or(ChainError::EmptyChain)?;
    if first != genesis {
        return Err(ChainError::GenesisMismatch);
    }
    for (position, pair) in blocks.windows(2).enumerate() {
        let (prev, block) = (&pair[0], &pair[1]);
        let expected = position as u64 + 1;
        if block.index != expected {
            return Err(ChainError::IndexMismatch {
                expected,
                got: block.index,
            });
        }
        if block.last_hash != prev.hash {
            return Err(ChainError::LinkMismatch {
                expected: prev.hash,
                got: block.last_hash,
            });
        }
        let computed = block.compute_hash();
        if computed != block.hash {
            return Err(ChainError::HashMismatch {
                stored: block.hash,
                computed,
            });
        }
    }
    Ok(())
}
