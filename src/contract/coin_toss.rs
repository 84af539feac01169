//! Commit-reveal coin toss between Alice and Bob
//!
//! Each player commits to HASH160 of a secret nonce whose length encodes
//! their choice: 16 bytes for zero, 17 bytes for one. The locking script
//! checks both reveals against the commitments, turns each length into a bit
//! (`len != 16`) and ORs the bits: false pays Alice, true pays Bob.
//!
//! ```text
//! OP_DUP OP_HASH160 <H(alice_nonce)> OP_EQUALVERIFY
//! OP_SWAP
//! OP_DUP OP_HASH160 <H(bob_nonce)> OP_EQUALVERIFY
//! OP_SIZE OP_16 OP_NUMNOTEQUAL OP_NIP
//! OP_SWAP
//! OP_SIZE OP_16 OP_NUMNOTEQUAL OP_NIP
//! OP_BOOLOR
//! OP_IF <bob_pubkey> OP_ELSE <alice_pubkey> OP_ENDIF
//! OP_CHECKSIG
//! ```
//!
//! Unlock: `<sig> <bob_nonce> <alice_nonce>`

use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use super::{sign_input, SpendingContract};
use crate::constants::COIN_TOSS_NONCE_LEN;
use crate::error::Result;
use crate::keys::{KeyPair, KeyProvider, Nonce};
use crate::opcodes::*;
use crate::script::{Builder, Script};
use crate::types::Transaction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoinTossChoice {
    Zero,
    One,
}

impl CoinTossChoice {
    /// Nonce length that encodes this choice
    pub fn nonce_len(self) -> usize {
        match self {
            CoinTossChoice::Zero => COIN_TOSS_NONCE_LEN,
            CoinTossChoice::One => COIN_TOSS_NONCE_LEN + 1,
        }
    }
}

/// Side whose key signs the unlocking script
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WinningPlayer {
    /// Alice
    Tail,
    /// Bob
    Head,
}

#[derive(Debug)]
pub struct CoinToss {
    alice: KeyPair,
    bob: KeyPair,
    alice_nonce: Nonce,
    bob_nonce: Nonce,
    winner: WinningPlayer,
}

impl CoinToss {
    pub fn new<P: KeyProvider, R: RngCore + CryptoRng + ?Sized>(
        provider: &P,
        rng: &mut R,
        alice_choice: CoinTossChoice,
        bob_choice: CoinTossChoice,
        winner: WinningPlayer,
    ) -> Self {
        let alice = provider.generate_key_pair(rng);
        let bob = provider.generate_key_pair(rng);
        let alice_nonce = Nonce::generate(rng, alice_choice.nonce_len());
        let bob_nonce = Nonce::generate(rng, bob_choice.nonce_len());
        log::debug!(
            "coin toss: alice {:?}, bob {:?}, claimed winner {:?}",
            alice_choice,
            bob_choice,
            winner
        );
        CoinToss {
            alice,
            bob,
            alice_nonce,
            bob_nonce,
            winner,
        }
    }

    /// Winner according to the rule the locking script enforces
    pub fn expected_winner(&self) -> WinningPlayer {
        let alice_bit = self.alice_nonce.len() != COIN_TOSS_NONCE_LEN;
        let bob_bit = self.bob_nonce.len() != COIN_TOSS_NONCE_LEN;
        if alice_bit || bob_bit {
            WinningPlayer::Head
        } else {
            WinningPlayer::Tail
        }
    }

    pub fn claimed_winner(&self) -> WinningPlayer {
        self.winner
    }

    fn winner_key(&self) -> &KeyPair {
        match self.winner {
            WinningPlayer::Tail => &self.alice,
            WinningPlayer::Head => &self.bob,
        }
    }
}

impl SpendingContract for CoinToss {
    fn name(&self) -> &'static str {
        "coin-toss"
    }

    fn locking_script(&self) -> Result<Script> {
        Ok(Builder::new()
            .push_opcode(OP_DUP)?
            .push_opcode(OP_HASH160)?
            .push_slice(&self.alice_nonce.commitment())?
            .push_opcode(OP_EQUALVERIFY)?
            .push_opcode(OP_SWAP)?
            .push_opcode(OP_DUP)?
            .push_opcode(OP_HASH160)?
            .push_slice(&self.bob_nonce.commitment())?
            .push_opcode(OP_EQUALVERIFY)?
            .push_opcode(OP_SIZE)?
            .push_int(COIN_TOSS_NONCE_LEN as i64)?
            .push_opcode(OP_NUMNOTEQUAL)?
            .push_opcode(OP_NIP)?
            .push_opcode(OP_SWAP)?
            .push_opcode(OP_SIZE)?
            .push_int(COIN_TOSS_NONCE_LEN as i64)?
            .push_opcode(OP_NUMNOTEQUAL)?
            .push_opcode(OP_NIP)?
            .push_opcode(OP_BOOLOR)?
            .push_opcode(OP_IF)?
            .push_slice(&self.bob.public_key())?
            .push_opcode(OP_ELSE)?
            .push_slice(&self.alice.public_key())?
            .push_opcode(OP_ENDIF)?
            .push_opcode(OP_CHECKSIG)?
            .into_script())
    }

    fn unlocking_script(
        &self,
        provider: &dyn KeyProvider,
        tx: &Transaction,
        input_index: usize,
    ) -> Result<Script> {
        if self.winner != self.expected_winner() {
            log::debug!(
                "coin toss: {:?} signs but the reveals favour {:?}",
                self.winner,
                self.expected_winner()
            );
        }
        let locking = self.locking_script()?;
        let signature = sign_input(provider, self.winner_key(), tx, input_index, &locking)?;
        Ok(Builder::new()
            .push_slice(&signature)?
            .push_slice(self.bob_nonce.as_bytes())?
            .push_slice(self.alice_nonce.as_bytes())?
            .into_script())
    }
}
