//! Core transaction types shared by the builder, the interpreter and the harness

use serde::{Deserialize, Serialize};

use crate::error::{ContractError, Result, ScriptFailure};

/// Hash type: 256-bit hash
pub type Hash = [u8; 32];

/// HASH160 digest: RIPEMD160(SHA256(x))
pub type Hash160 = [u8; 20];

/// Byte string type
pub type ByteString = Vec<u8>;

/// Reference to a transaction output: txid plus output index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    pub hash: Hash,
    pub index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionInput {
    pub prevout: OutPoint,
    pub script_sig: ByteString,
    pub sequence: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOutput {
    pub value: i64,
    pub script_pubkey: ByteString,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: i32,
    pub inputs: Vec<TransactionInput>,
    pub outputs: Vec<TransactionOutput>,
    pub lock_time: u32,
}

/// Result of evaluating an unlocking script against a locking script.
///
/// A rejection is an expected outcome (the losing party of a coin toss, an
/// early arbitration attempt) and therefore not an `Err`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    Accepted,
    Rejected(ScriptFailure),
}

impl VerifyOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, VerifyOutcome::Accepted)
    }

    /// Failure reason, if the scripts were rejected
    pub fn failure(&self) -> Option<&ScriptFailure> {
        match self {
            VerifyOutcome::Accepted => None,
            VerifyOutcome::Rejected(reason) => Some(reason),
        }
    }

    /// Turn a rejection into [`ContractError::VerificationFailure`]
    pub fn into_result(self) -> Result<()> {
        match self {
            VerifyOutcome::Accepted => Ok(()),
            VerifyOutcome::Rejected(reason) => Err(ContractError::VerificationFailure(reason)),
        }
    }
}

impl From<std::result::Result<(), ScriptFailure>> for VerifyOutcome {
    fn from(res: std::result::Result<(), ScriptFailure>) -> Self {
        match res {
            Ok(()) => VerifyOutcome::Accepted,
            Err(reason) => VerifyOutcome::Rejected(reason),
        }
    }
}
