use log::debug;
use serde::{Deserialize, Serialize, Serializer};
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::crypto::{verify_signature, Address, DigitalSignature, Wallet};

/// Errors that can occur during transaction operations
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("Cannot sign a transaction on behalf of {sender}: signing key belongs to {signer}")]
    Authorization { sender: String, signer: String },

    #[error("Transaction from {0} carries no signature")]
    MissingSignature(String),
}

/// A transfer of `amount` from one address to another.
///
/// A transaction without a sender is a coinbase (mining reward) and is never
/// signed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Sender's address, `None` for minted value
    pub from: Option<Address>,

    /// Recipient's address
    pub to: Address,

    /// Amount being transferred
    #[serde(serialize_with = "serialize_amount")]
    pub amount: f64,

    /// Signature over `content_hash`, set by `sign`
    pub signature: Option<DigitalSignature>,
}

impl Transaction {
    /// Creates a new unsigned transaction. Nothing is validated here.
    pub fn new(from: Option<Address>, to: Address, amount: f64) -> Self {
        Transaction {
            from,
            to,
            amount,
            signature: None,
        }
    }

    /// Creates a coinbase transaction minting `amount` to `to`
    pub fn coinbase(to: Address, amount: f64) -> Self {
        Self::new(None, to, amount)
    }

    /// Checks if the transaction is a coinbase transaction
    pub fn is_coinbase(&self) -> bool {
        self.from.is_none()
    }

    /// SHA-256 over the canonical encoding of `(from, to, amount)`, hex-encoded.
    ///
    /// The encoding is a JSON object with sorted keys; the signature is not
    /// part of it.
    pub fn content_hash(&self) -> String {
        let data = serde_json::json!({
            "from": self.from.as_ref().map(Address::as_str),
            "to": self.to.as_str(),
            "amount": canonical_amount(self.amount),
        });

        hex::encode(Sha256::digest(data.to_string().as_bytes()))
    }

    /// Signs the transaction with a wallet.
    ///
    /// Fails with `Authorization` unless the wallet's address is the sender.
    /// Re-signing replaces any previous signature.
    pub fn sign(&mut self, wallet: &Wallet) -> Result<(), TransactionError> {
        if self.from.as_ref() != Some(wallet.address()) {
            return Err(TransactionError::Authorization {
                sender: self.from.as_ref().map(Address::to_string).unwrap_or_default(),
                signer: wallet.address().to_string(),
            });
        }

        let hash = self.content_hash();
        self.signature = Some(wallet.sign(hash.as_bytes()));

        Ok(())
    }

    /// Verifies the transaction's signature.
    ///
    /// Coinbase transactions are always valid. A sender-bearing transaction
    /// without a signature is an error; a non-finite amount or an undecodable
    /// sender key or signature is reported as `Ok(false)`.
    pub fn verify(&self) -> Result<bool, TransactionError> {
        let from = match &self.from {
            Some(from) => from,
            None => return Ok(true),
        };

        if !self.amount.is_finite() {
            debug!("Transaction from {} has non-finite amount {}", from, self.amount);
            return Ok(false);
        }

        let signature = match &self.signature {
            Some(sig) if !sig.is_empty() => sig,
            _ => return Err(TransactionError::MissingSignature(from.to_string())),
        };

        let public_key = match from.to_public_key() {
            Ok(key) => key,
            Err(err) => {
                debug!("Sender address {} is not a public key: {}", from, err);
                return Ok(false);
            }
        };

        match verify_signature(self.content_hash().as_bytes(), signature, &public_key) {
            Ok(valid) => Ok(valid),
            Err(err) => {
                debug!("Signature on transaction from {} does not decode: {}", from, err);
                Ok(false)
            }
        }
    }
}

/// JSON form of an amount used in every hash input.
///
/// serde_json writes NaN and both infinities as `null`; they are kept
/// distinct here as strings so no two amounts share an encoding.
fn canonical_amount(amount: f64) -> serde_json::Value {
    match serde_json::Number::from_f64(amount) {
        Some(number) => serde_json::Value::Number(number),
        None => serde_json::Value::String(amount.to_string()),
    }
}

fn serialize_amount<S: Serializer>(amount: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    canonical_amount(*amount).serialize(serializer)
}
