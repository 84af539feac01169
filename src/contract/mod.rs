//! Spending contracts
//!
//! A contract owns the keys (and, for the coin toss, the nonces) behind one
//! funded output and produces both halves of the spend: the locking script
//! attached to the output and the unlocking script that satisfies it. Both
//! scripts must come from the same instance.

mod coin_toss;
mod p2pk;
mod p2pkh;
mod time_lock;

pub use coin_toss::{CoinToss, CoinTossChoice, WinningPlayer};
pub use p2pk::PayToKey;
pub use p2pkh::PayToKeyHash;
pub use time_lock::{Cosigners, TimeLock};

use serde::{Deserialize, Serialize};

use crate::constants::{SEQUENCE_FINAL, SIGHASH_ALL};
use crate::error::Result;
use crate::keys::{KeyPair, KeyProvider};
use crate::script::Script;
use crate::sighash::signature_hash;
use crate::types::Transaction;

/// Lock time and input sequence the spending transaction must carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendTiming {
    pub lock_time: u32,
    pub sequence: u32,
}

impl Default for SpendTiming {
    fn default() -> Self {
        SpendTiming {
            lock_time: 0,
            sequence: SEQUENCE_FINAL,
        }
    }
}

/// Capability shared by every contract variant
pub trait SpendingContract {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    fn locking_script(&self) -> Result<Script>;

    /// Sign input `input_index` of `tx` and build the script that spends the
    /// output locked by [`SpendingContract::locking_script`]
    fn unlocking_script(
        &self,
        provider: &dyn KeyProvider,
        tx: &Transaction,
        input_index: usize,
    ) -> Result<Script>;

    fn timing(&self) -> SpendTiming {
        SpendTiming::default()
    }
}

/// Closed set of supported contracts
#[derive(Debug)]
pub enum Contract {
    PayToKey(PayToKey),
    PayToKeyHash(PayToKeyHash),
    CoinToss(CoinToss),
    TimeLock(TimeLock),
}

impl Contract {
    fn inner(&self) -> &dyn SpendingContract {
        match self {
            Contract::PayToKey(c) => c,
            Contract::PayToKeyHash(c) => c,
            Contract::CoinToss(c) => c,
            Contract::TimeLock(c) => c,
        }
    }
}

impl SpendingContract for Contract {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn locking_script(&self) -> Result<Script> {
        self.inner().locking_script()
    }

    fn unlocking_script(
        &self,
        provider: &dyn KeyProvider,
        tx: &Transaction,
        input_index: usize,
    ) -> Result<Script> {
        self.inner().unlocking_script(provider, tx, input_index)
    }

    fn timing(&self) -> SpendTiming {
        self.inner().timing()
    }
}

impl From<PayToKey> for Contract {
    fn from(c: PayToKey) -> Self {
        Contract::PayToKey(c)
    }
}

impl From<PayToKeyHash> for Contract {
    fn from(c: PayToKeyHash) -> Self {
        Contract::PayToKeyHash(c)
    }
}

impl From<CoinToss> for Contract {
    fn from(c: CoinToss) -> Self {
        Contract::CoinToss(c)
    }
}

impl From<TimeLock> for Contract {
    fn from(c: TimeLock) -> Self {
        Contract::TimeLock(c)
    }
}

/// Legacy SIGHASH_ALL signature: DER ECDSA followed by the sighash byte
pub fn sign_input(
    provider: &dyn KeyProvider,
    key: &KeyPair,
    tx: &Transaction,
    input_index: usize,
    script_code: &Script,
) -> Result<Vec<u8>> {
    let digest = signature_hash(tx, input_index, script_code.as_bytes(), SIGHASH_ALL)?;
    let mut signature = provider.sign(&digest, key)?;
    signature.push(SIGHASH_ALL);
    Ok(signature)
}
