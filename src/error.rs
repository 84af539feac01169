//! Error types for script construction and verification

use thiserror::Error;

use crate::opcodes::opcode_name;

#[derive(Error, Debug)]
pub enum ContractError {
    #[error("Script encoding failed: {0}")]
    Encoding(String),

    #[error("Signing failed: {0}")]
    Signature(String),

    #[error("Script verification failed: {0}")]
    VerificationFailure(ScriptFailure),

    #[error("Insufficient funds: need {needed} sats, have {available}")]
    InsufficientFunds { needed: i64, available: i64 },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Ledger client error: {0}")]
    Ledger(String),
}

/// Why the interpreter rejected a script pair
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScriptFailure {
    #[error("stack underflow at {}", opcode_name(*.0))]
    StackUnderflow(u8),

    #[error("OP_EQUALVERIFY failed")]
    EqualVerify,

    #[error("OP_VERIFY failed")]
    Verify,

    #[error("OP_CHECKSIGVERIFY failed")]
    CheckSigVerify,

    #[error("OP_CHECKMULTISIGVERIFY failed")]
    CheckMultiSigVerify,

    #[error("OP_NUMEQUALVERIFY failed")]
    NumEqualVerify,

    #[error("script evaluated to false")]
    EvalFalse,

    #[error("{0} items left on stack after evaluation")]
    CleanStack(usize),

    #[error("unsatisfied lock time: {0}")]
    UnsatisfiedLockTime(String),

    #[error("negative lock time {0}")]
    NegativeLockTime(i64),

    #[error("unbalanced conditional")]
    UnbalancedConditional,

    #[error("bad opcode {}", opcode_name(*.0))]
    BadOpcode(u8),

    #[error("disabled opcode {}", opcode_name(*.0))]
    DisabledOpcode(u8),

    #[error("OP_RETURN encountered")]
    OpReturn,

    #[error("operation limit exceeded")]
    OpCount,

    #[error("stack size limit exceeded")]
    StackSize,

    #[error("push of {0} bytes exceeds element size limit")]
    PushSize(usize),

    #[error("script of {0} bytes exceeds size limit")]
    ScriptSize(usize),

    #[error("numeric operand of {0} bytes is too large")]
    NumberOverflow(usize),

    #[error("numeric operand is not minimally encoded")]
    NonMinimalNumber,

    #[error("invalid public key count {0}")]
    PubKeyCount(i64),

    #[error("invalid signature count {0}")]
    SigCount(i64),

    #[error("multisig dummy element is not empty")]
    NullDummy,

    #[error("unlocking script is not push-only")]
    PushOnly,

    #[error("truncated push in script")]
    Truncated,

    #[error("no transaction context for {0}")]
    MissingContext(&'static str),
}

pub type Result<T> = std::result::Result<T, ContractError>;
