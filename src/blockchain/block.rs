use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::transaction::Transaction;

/// A SHA-256 digest has 64 hex digits; no hash can have more leading zeros.
pub const MAX_DIFFICULTY: u8 = 64;

/// Hash recorded as the predecessor of the genesis block
pub const GENESIS_PREVIOUS_HASH: &str = "0";

/// Errors that can occur while mining a block
#[derive(Debug, Error)]
pub enum BlockError {
    #[error("Difficulty {0} exceeds the maximum of 64 hex digits")]
    DifficultyOutOfRange(u8),

    #[error("Mining cancelled after {attempts} attempts")]
    Cancelled { attempts: u64 },

    #[error("No valid nonce found within {attempts} attempts")]
    AttemptsExhausted { attempts: u64 },

    #[error("Nonce space exhausted")]
    NonceExhausted,
}

/// Bounds on a proof-of-work search. The default is unbounded.
#[derive(Debug, Clone, Default)]
pub struct MiningOptions {
    /// Maximum number of nonces to try before giving up
    pub max_attempts: Option<u64>,

    /// Set to `true` from another thread to stop the search
    pub cancel: Option<Arc<AtomicBool>>,
}

impl MiningOptions {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn with_max_attempts(mut self, max_attempts: u64) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(|flag| flag.load(Ordering::Relaxed))
            .unwrap_or(false)
    }
}

/// Represents a block in the blockchain.
///
/// Fields are only readable from outside; the cached `hash` always matches
/// the content unless the block was altered through `tamper_transactions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    /// Timestamp when the block was created
    timestamp: DateTime<Utc>,

    /// List of transactions included in this block
    transactions: Vec<Transaction>,

    /// Hash of the previous block
    previous_hash: String,

    /// Proof of work counter
    nonce: u64,

    /// Hash of the current block (calculated)
    hash: String,
}

impl Block {
    /// Creates a new block with `nonce = 0` and its hash already computed
    pub fn new(timestamp: DateTime<Utc>, transactions: Vec<Transaction>, previous_hash: String) -> Self {
        let mut block = Block {
            timestamp,
            transactions,
            previous_hash,
            nonce: 0,
            hash: String::new(),
        };

        block.hash = block.content_hash();
        block
    }

    /// Creates the first block of a chain
    pub fn genesis() -> Self {
        Block::new(Utc::now(), Vec::new(), GENESIS_PREVIOUS_HASH.to_string())
    }

    /// Calculates the hash of the block
    ///
    /// # Returns
    ///
    /// The SHA-256 hash of the block as a hexadecimal string
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();

        let block_data = serde_json::json!({
            "previous_hash": self.previous_hash,
            "timestamp": self.timestamp,
            "transactions": self.transactions,
            "nonce": self.nonce,
        });

        hasher.update(block_data.to_string().as_bytes());

        format!("{:x}", hasher.finalize())
    }

    /// Whether the cached hash starts with `difficulty` zero hex digits
    pub fn meets_difficulty(&self, difficulty: u8) -> bool {
        hash_meets_difficulty(&self.hash, difficulty)
    }

    /// Searches nonces until the hash meets `difficulty`, with no bound on
    /// the number of attempts.
    ///
    /// # Returns
    ///
    /// The number of hashes computed
    pub fn mine(&mut self, difficulty: u8) -> Result<u64, BlockError> {
        self.mine_with(difficulty, &MiningOptions::unbounded())
    }

    /// Searches nonces until the hash meets `difficulty` or `options` stops
    /// the search. On failure the block keeps the last nonce tried and a hash
    /// consistent with it.
    pub fn mine_with(&mut self, difficulty: u8, options: &MiningOptions) -> Result<u64, BlockError> {
        if difficulty > MAX_DIFFICULTY {
            return Err(BlockError::DifficultyOutOfRange(difficulty));
        }

        let mut attempts = 0u64;

        while !self.meets_difficulty(difficulty) {
            if options.is_cancelled() {
                warn!("Mining cancelled after {} attempts", attempts);
                return Err(BlockError::Cancelled { attempts });
            }

            if let Some(max) = options.max_attempts {
                if attempts >= max {
                    warn!("Mining gave up after {} attempts", attempts);
                    return Err(BlockError::AttemptsExhausted { attempts });
                }
            }

            self.nonce = self.nonce.checked_add(1).ok_or(BlockError::NonceExhausted)?;
            self.hash = self.content_hash();
            attempts += 1;
        }

        debug!(
            "Found hash {} at nonce {} after {} attempts",
            self.hash, self.nonce, attempts
        );

        Ok(attempts)
    }

    /// Returns false as soon as one transaction fails verification.
    ///
    /// A transaction whose verification errors (e.g. a missing signature)
    /// counts as invalid.
    pub fn all_transactions_valid(&self) -> bool {
        self.transactions.iter().all(|transaction| match transaction.verify() {
            Ok(valid) => valid,
            Err(err) => {
                debug!("Transaction failed verification: {}", err);
                false
            }
        })
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn previous_hash(&self) -> &str {
        &self.previous_hash
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Mutable access to the transactions, bypassing every invariant.
    ///
    /// The cached hash is left as is, so any change here is visible to
    /// `Chain::is_valid`.
    pub fn tamper_transactions(&mut self) -> &mut Vec<Transaction> {
        &mut self.transactions
    }
}

fn hash_meets_difficulty(hash: &str, difficulty: u8) -> bool {
    let difficulty = difficulty as usize;
    hash.len() >= difficulty && hash.bytes().take(difficulty).all(|b| b == b'0')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::crypto::{Address, Wallet};

    fn sample_transactions() -> Vec<Transaction> {
        vec![
            Transaction::coinbase(Address::from("recipient1"), 10.0),
            Transaction::coinbase(Address::from("recipient2"), 20.0),
        ]
    }

    #[test]
    fn test_new_block() {
        let block = Block::new(Utc::now(), sample_transactions(), "previous_hash".to_string());

        assert_eq!(block.nonce(), 0);
        assert_eq!(block.previous_hash(), "previous_hash");
        assert_eq!(block.transactions().len(), 2);
        assert_eq!(block.hash(), block.content_hash());
        assert_eq!(block.hash().len(), 64);
    }

    #[test]
    fn test_identical_content_hashes_identically() {
        let timestamp = Utc::now();
        let a = Block::new(timestamp, sample_transactions(), "prev".to_string());
        let b = Block::new(timestamp, sample_transactions(), "prev".to_string());
        let c = Block::new(timestamp, sample_transactions(), "other".to_string());

        assert_eq!(a.hash(), b.hash());
        assert_ne!(a.hash(), c.hash());
    }

    #[test]
    fn test_mine_meets_difficulty() {
        for difficulty in 0..=3 {
            let mut block = Block::new(Utc::now(), sample_transactions(), "prev".to_string());
            block.mine(difficulty).unwrap();

            assert!(block.hash().starts_with(&"0".repeat(difficulty as usize)));
            assert_eq!(block.hash(), block.content_hash());
        }
    }

    #[test]
    fn test_mine_at_zero_difficulty_does_no_work() {
        let mut block = Block::new(Utc::now(), sample_transactions(), "prev".to_string());
        let hash = block.hash().to_string();

        assert_eq!(block.mine(0).unwrap(), 0);
        assert_eq!(block.nonce(), 0);
        assert_eq!(block.hash(), hash);
    }

    #[test]
    fn test_difficulty_out_of_range() {
        let mut block = Block::genesis();
        assert!(matches!(
            block.mine(MAX_DIFFICULTY + 1),
            Err(BlockError::DifficultyOutOfRange(_))
        ));
    }

    #[test]
    fn test_mine_with_attempt_bound() {
        let mut block = Block::new(Utc::now(), sample_transactions(), "prev".to_string());
        let options = MiningOptions::unbounded().with_max_attempts(5);

        // 40 leading zeros will not turn up in five tries
        let err = block.mine_with(40, &options).unwrap_err();
        assert!(matches!(err, BlockError::AttemptsExhausted { attempts: 5 }));
        assert_eq!(block.nonce(), 5);
        assert_eq!(block.hash(), block.content_hash());
    }

    #[test]
    fn test_mine_with_cancel_flag() {
        let mut block = Block::new(Utc::now(), sample_transactions(), "prev".to_string());
        let cancel = Arc::new(AtomicBool::new(true));
        let options = MiningOptions::unbounded().with_cancel(cancel);

        let err = block.mine_with(40, &options).unwrap_err();
        assert!(matches!(err, BlockError::Cancelled { attempts: 0 }));
    }

    #[test]
    fn test_all_transactions_valid() {
        let sender = Wallet::new();
        let mut transfer = Transaction::new(Some(sender.address().clone()), Address::from("bob"), 4.0);
        transfer.sign(&sender).unwrap();

        let mut transactions = sample_transactions();
        transactions.push(transfer.clone());
        let block = Block::new(Utc::now(), transactions, "prev".to_string());
        assert!(block.all_transactions_valid());

        let mut forged = transfer.clone();
        forged.amount = 400.0;
        let block = Block::new(Utc::now(), vec![forged], "prev".to_string());
        assert!(!block.all_transactions_valid());

        let mut unsigned = transfer;
        unsigned.signature = None;
        let block = Block::new(Utc::now(), vec![unsigned], "prev".to_string());
        assert!(!block.all_transactions_valid());
    }

    #[test]
    fn test_tampering_desyncs_hash() {
        let mut block = Block::new(Utc::now(), sample_transactions(), "prev".to_string());
        block.mine(1).unwrap();

        block.tamper_transactions()[0].amount = 1_000.0;
        assert_ne!(block.hash(), block.content_hash());
    }
}
