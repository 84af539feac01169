//! Pay-to-public-key-hash
//!
//! Lock: `OP_DUP OP_HASH160 <hash160(pubkey)> OP_EQUALVERIFY OP_CHECKSIG`
//! Unlock: `<sig> <pubkey>`

use rand::{CryptoRng, RngCore};

use super::{sign_input, SpendingContract};
use crate::error::Result;
use crate::keys::{KeyPair, KeyProvider};
use crate::opcodes::*;
use crate::script::{Builder, Script};
use crate::types::Transaction;

#[derive(Debug)]
pub struct PayToKeyHash {
    owner: KeyPair,
    /// Key that signs and is disclosed instead of the owner's
    spender: Option<KeyPair>,
}

impl PayToKeyHash {
    pub fn new<P: KeyProvider, R: RngCore + CryptoRng + ?Sized>(provider: &P, rng: &mut R) -> Self {
        PayToKeyHash::from_key(provider.generate_key_pair(rng))
    }

    pub fn from_key(owner: KeyPair) -> Self {
        PayToKeyHash { owner, spender: None }
    }

    /// Lock to `owner` but spend with `spender`. The resulting spend carries a
    /// valid signature under a key whose hash does not match, and is rejected.
    pub fn with_spender(owner: KeyPair, spender: KeyPair) -> Self {
        PayToKeyHash {
            owner,
            spender: Some(spender),
        }
    }

    pub fn public_key_hash(&self) -> [u8; 20] {
        self.owner.public_key_hash()
    }

    fn signer(&self) -> &KeyPair {
        self.spender.as_ref().unwrap_or(&self.owner)
    }
}

impl SpendingContract for PayToKeyHash {
    fn name(&self) -> &'static str {
        "pay-to-key-hash"
    }

    fn locking_script(&self) -> Result<Script> {
        Ok(Builder::new()
            .push_opcode(OP_DUP)?
            .push_opcode(OP_HASH160)?
            .push_slice(&self.owner.public_key_hash())?
            .push_opcode(OP_EQUALVERIFY)?
            .push_opcode(OP_CHECKSIG)?
            .into_script())
    }

    fn unlocking_script(
        &self,
        provider: &dyn KeyProvider,
        tx: &Transaction,
        input_index: usize,
    ) -> Result<Script> {
        let signer = self.signer();
        if self.spender.is_some() {
            log::warn!("{}: spending with a key other than the owner's", self.name());
        }
        let locking = self.locking_script()?;
        let signature = sign_input(provider, signer, tx, input_index, &locking)?;
        Ok(Builder::new()
            .push_slice(&signature)?
            .push_slice(&signer.public_key())?
            .into_script())
    }
}
