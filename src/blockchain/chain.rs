use chrono::Utc;
use log::{debug, info, warn};
use serde::Serialize;
use thiserror::Error;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::block::{Block, BlockError, MiningOptions};
use super::config::ChainConfig;
use super::crypto::Address;
use super::transaction::{Transaction, TransactionError};

/// Errors that can occur during blockchain operations
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("No pending transactions to mine")]
    EmptyPool,

    #[error("Transaction error: {0}")]
    TransactionError(#[from] TransactionError),

    #[error("Mining error: {0}")]
    MiningError(#[from] BlockError),
}

/// The chain of mined blocks plus the pool of transactions waiting for the
/// next block.
///
/// `blocks` is never empty: index 0 is the genesis block.
#[derive(Debug, Clone, Serialize)]
pub struct Chain {
    blocks: Vec<Block>,

    pending_transactions: Vec<Transaction>,

    config: ChainConfig,
}

impl Chain {
    /// Creates a chain holding only a genesis block, with difficulty 2 and a
    /// mining reward of 100
    pub fn new() -> Self {
        Self::with_config(ChainConfig::default())
    }

    pub fn with_config(config: ChainConfig) -> Self {
        Chain {
            blocks: vec![Block::genesis()],
            pending_transactions: Vec::new(),
            config,
        }
    }

    /// Queues a signed transfer for the next block.
    ///
    /// Both endpoints must be present, the amount must be finite and
    /// non-negative, and the signature must verify. Sender balance is not
    /// checked.
    pub fn add_transaction(&mut self, transaction: Transaction) -> Result<(), ChainError> {
        let has_sender = transaction.from.as_ref().is_some_and(|from| !from.is_empty());
        if !has_sender || transaction.to.is_empty() {
            return Err(ChainError::InvalidTransaction(
                "Transaction must include from and to addresses".to_string(),
            ));
        }

        if !transaction.amount.is_finite() || transaction.amount < 0.0 {
            return Err(ChainError::InvalidTransaction(format!(
                "Amount must be a non-negative number, got {}",
                transaction.amount
            )));
        }

        if !transaction.verify()? {
            return Err(ChainError::InvalidTransaction(
                "Signature does not verify".to_string(),
            ));
        }

        debug!(
            "Queued transfer of {} to {}",
            transaction.amount, transaction.to
        );
        self.pending_transactions.push(transaction);

        Ok(())
    }

    /// Gets the last block in the chain
    pub fn last_block(&self) -> &Block {
        // blocks always holds at least the genesis block
        &self.blocks[self.blocks.len() - 1]
    }

    /// Mines the pending pool plus a reward for `reward_address` into a new
    /// block, bounded by `max_mining_attempts` from the config.
    ///
    /// # Returns
    ///
    /// The newly appended block
    pub fn mine_pending_transactions(&mut self, reward_address: &Address) -> Result<Block, ChainError> {
        let mut options = MiningOptions::unbounded();
        options.max_attempts = self.config.max_mining_attempts;

        self.mine_pending_transactions_with(reward_address, &options)
    }

    /// Like `mine_pending_transactions`, with explicit mining bounds.
    ///
    /// If mining is stopped the chain and the pending pool are left as they
    /// were.
    pub fn mine_pending_transactions_with(
        &mut self,
        reward_address: &Address,
        options: &MiningOptions,
    ) -> Result<Block, ChainError> {
        if self.pending_transactions.is_empty() {
            return Err(ChainError::EmptyPool);
        }

        let mut transactions = self.pending_transactions.clone();
        transactions.push(Transaction::coinbase(
            reward_address.clone(),
            self.config.mining_reward,
        ));

        let mut block = Block::new(Utc::now(), transactions, self.last_block().hash().to_string());
        let attempts = block.mine_with(self.config.difficulty, options)?;

        info!(
            "Block {} mined with {} transactions after {} attempts: {}",
            self.blocks.len(),
            block.transactions().len(),
            attempts,
            block.hash()
        );

        self.blocks.push(block.clone());
        self.pending_transactions.clear();

        Ok(block)
    }

    /// Net amount received by `address` over the whole chain, coinbase
    /// rewards included. Pending transactions are not counted.
    pub fn balance_of(&self, address: &Address) -> f64 {
        let mut balance = 0.0;

        for block in &self.blocks {
            for transaction in block.transactions() {
                if transaction.from.as_ref() == Some(address) {
                    balance -= transaction.amount;
                }

                if &transaction.to == address {
                    balance += transaction.amount;
                }
            }
        }

        balance
    }

    /// Validates the blockchain
    ///
    /// # Returns
    ///
    /// true if every block after genesis has valid transactions, a hash
    /// matching its content and a link to its predecessor's hash
    pub fn is_valid(&self) -> bool {
        for (index, pair) in self.blocks.windows(2).enumerate() {
            let previous_block = &pair[0];
            let current_block = &pair[1];
            let index = index + 1;

            if !current_block.all_transactions_valid() {
                warn!("Block {} contains an invalid transaction", index);
                return false;
            }

            if current_block.hash() != current_block.content_hash() {
                warn!("Block {} hash does not match its content", index);
                return false;
            }

            if current_block.previous_hash() != previous_block.hash() {
                warn!("Block {} does not link to block {}", index, index - 1);
                return false;
            }

            if self.config.strict_coinbase && !self.has_valid_coinbase(current_block) {
                warn!("Block {} has an unexpected coinbase", index);
                return false;
            }
        }

        true
    }

    fn has_valid_coinbase(&self, block: &Block) -> bool {
        let mut coinbases = block.transactions().iter().filter(|t| t.is_coinbase());

        match (coinbases.next(), coinbases.next()) {
            (Some(reward), None) => reward.amount == self.config.mining_reward,
            _ => false,
        }
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn pending_transactions(&self) -> &[Transaction] {
        &self.pending_transactions
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn difficulty(&self) -> u8 {
        self.config.difficulty
    }

    pub fn mining_reward(&self) -> f64 {
        self.config.mining_reward
    }

    /// Mutable access to a stored block, bypassing every invariant.
    ///
    /// Used to demonstrate that `is_valid` catches tampering.
    pub fn tamper_block(&mut self, index: usize) -> Option<&mut Block> {
        self.blocks.get_mut(index)
    }
}

impl Default for Chain {
    fn default() -> Self {
        Self::new()
    }
}

/// A chain shared between threads.
///
/// Every operation takes one lock over the whole chain, so mining drains the
/// pending pool atomically with respect to concurrent submissions.
#[derive(Debug, Clone, Default)]
pub struct SharedChain {
    chain: Arc<Mutex<Chain>>,
}

impl SharedChain {
    pub fn new(chain: Chain) -> Self {
        SharedChain {
            chain: Arc::new(Mutex::new(chain)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Chain> {
        self.chain.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_transaction(&self, transaction: Transaction) -> Result<(), ChainError> {
        self.lock().add_transaction(transaction)
    }

    pub fn mine_pending_transactions(&self, reward_address: &Address) -> Result<Block, ChainError> {
        self.lock().mine_pending_transactions(reward_address)
    }

    pub fn mine_pending_transactions_with(
        &self,
        reward_address: &Address,
        options: &MiningOptions,
    ) -> Result<Block, ChainError> {
        self.lock().mine_pending_transactions_with(reward_address, options)
    }

    pub fn balance_of(&self, address: &Address) -> f64 {
        self.lock().balance_of(address)
    }

    pub fn is_valid(&self) -> bool {
        self.lock().is_valid()
    }

    pub fn pending_count(&self) -> usize {
        self.lock().pending_transactions().len()
    }

    /// A copy of the chain as it is now
    pub fn snapshot(&self) -> Chain {
        self.lock().clone()
    }
}
