//! Time-locked arbitration between Alice and Bob, with Eve as arbiter
//!
//! Alice and Bob can always spend together. Once the maturity time has
//! passed, either of them can spend together with Eve instead.
//!
//! ```text
//! OP_NOTIF
//!     OP_2 <alice> <bob> OP_2 OP_CHECKMULTISIG
//! OP_ELSE
//!     <maturity> OP_CHECKLOCKTIMEVERIFY OP_DROP
//!     OP_DUP OP_HASH160 <H(eve)> OP_EQUALVERIFY OP_CHECKSIGVERIFY
//!     OP_1 <alice> <bob> OP_2 OP_CHECKMULTISIG
//! OP_ENDIF
//! ```

use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use super::{sign_input, SpendTiming, SpendingContract};
use crate::constants::{ARBITRATION_MATURITY, SEQUENCE_LOCKTIME_ENABLED};
use crate::error::Result;
use crate::keys::{KeyPair, KeyProvider};
use crate::opcodes::*;
use crate::script::{Builder, Script};
use crate::types::Transaction;

/// Which pair of parties signs the spend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cosigners {
    /// Cooperative branch, valid at any time
    AliceAndBob,
    AliceAndEve,
    BobAndEve,
}

impl Cosigners {
    pub fn is_arbitrated(self) -> bool {
        !matches!(self, Cosigners::AliceAndBob)
    }
}

#[derive(Debug)]
pub struct TimeLock {
    alice: KeyPair,
    bob: KeyPair,
    eve: KeyPair,
    maturity: u32,
    cosigners: Cosigners,
    spend_lock_time: Option<u32>,
}

impl TimeLock {
    pub fn new<P: KeyProvider, R: RngCore + CryptoRng + ?Sized>(
        provider: &P,
        rng: &mut R,
        cosigners: Cosigners,
    ) -> Self {
        TimeLock {
            alice: provider.generate_key_pair(rng),
            bob: provider.generate_key_pair(rng),
            eve: provider.generate_key_pair(rng),
            maturity: ARBITRATION_MATURITY,
            cosigners,
            spend_lock_time: None,
        }
    }

    /// Replace the default maturity (2014-10-01T00:00:00Z)
    pub fn with_maturity(mut self, maturity: u32) -> Self {
        self.maturity = maturity;
        self
    }

    /// Spend with the given transaction lock time and a non-final sequence
    pub fn spend_at(mut self, lock_time: u32) -> Self {
        self.spend_lock_time = Some(lock_time);
        self
    }

    pub fn maturity(&self) -> u32 {
        self.maturity
    }

    pub fn cosigners(&self) -> Cosigners {
        self.cosigners
    }

    /// Whether the spending lock time has reached maturity
    pub fn is_matured(&self) -> bool {
        self.spend_lock_time
            .map_or(false, |lock_time| lock_time >= self.maturity)
    }
}

impl SpendingContract for TimeLock {
    fn name(&self) -> &'static str {
        "time-lock"
    }

    fn locking_script(&self) -> Result<Script> {
        let alice = self.alice.public_key();
        let bob = self.bob.public_key();
        Ok(Builder::new()
            .push_opcode(OP_NOTIF)?
            .push_int(2)?
            .push_slice(&alice)?
            .push_slice(&bob)?
            .push_int(2)?
            .push_opcode(OP_CHECKMULTISIG)?
            .push_opcode(OP_ELSE)?
            .push_int(self.maturity as i64)?
            .push_opcode(OP_CHECKLOCKTIMEVERIFY)?
            .push_opcode(OP_DROP)?
            .push_opcode(OP_DUP)?
            .push_opcode(OP_HASH160)?
            .push_slice(&self.eve.public_key_hash())?
            .push_opcode(OP_EQUALVERIFY)?
            .push_opcode(OP_CHECKSIGVERIFY)?
            .push_int(1)?
            .push_slice(&alice)?
            .push_slice(&bob)?
            .push_int(2)?
            .push_opcode(OP_CHECKMULTISIG)?
            .push_opcode(OP_ENDIF)?
            .into_script())
    }

    fn unlocking_script(
        &self,
        provider: &dyn KeyProvider,
        tx: &Transaction,
        input_index: usize,
    ) -> Result<Script> {
        let locking = self.locking_script()?;
        let sign = |key: &KeyPair| sign_input(provider, key, tx, input_index, &locking);

        // The leading OP_0 is the element OP_CHECKMULTISIG consumes beyond its arguments
        let builder = Builder::new().push_int(0)?;
        let builder = match self.cosigners {
            Cosigners::AliceAndBob => builder
                .push_slice(&sign(&self.alice)?)?
                .push_slice(&sign(&self.bob)?)?
                .push_int(0)?,
            Cosigners::AliceAndEve | Cosigners::BobAndEve => {
                let party = if self.cosigners == Cosigners::AliceAndEve {
                    &self.alice
                } else {
                    &self.bob
                };
                if !self.is_matured() {
                    log::warn!(
                        "{}: arbitrated spend before maturity {}",
                        self.name(),
                        self.maturity
                    );
                }
                builder
                    .push_slice(&sign(party)?)?
                    .push_slice(&sign(&self.eve)?)?
                    .push_slice(&self.eve.public_key())?
                    .push_int(1)?
            }
        };
        Ok(builder.into_script())
    }

    fn timing(&self) -> SpendTiming {
        match self.spend_lock_time {
            Some(lock_time) => SpendTiming {
                lock_time,
                sequence: SEQUENCE_LOCKTIME_ENABLED,
            },
            None => SpendTiming::default(),
        }
    }
}
