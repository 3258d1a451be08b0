// Blockchain module
//
// This module contains the proof-of-work ledger:
// - Transaction structure (signed transfers and coinbase rewards)
// - Block structure and proof of work
// - Chain structure, pending pool and validation
// - Cryptography utilities
// - Chain configuration

pub mod block;
pub mod chain;
pub mod config;
pub mod crypto;
pub mod transaction;

// Re-export main components for easier access
pub use block::{Block, BlockError, MiningOptions};
pub use chain::{Chain, ChainError, SharedChain};
pub use config::{ChainConfig, ConfigError};
pub use crypto::{Address, DigitalSignature, Wallet};
pub use transaction::{Transaction, TransactionError};
