//! A minimal proof-of-work ledger: signed transactions, hash-linked blocks
//! mined by nonce search, and whole-chain validation.

pub mod blockchain;

pub use blockchain::{
    Address, Block, BlockError, Chain, ChainConfig, ChainError, MiningOptions, SharedChain,
    Transaction, TransactionError, Wallet,
};
