//! Pay-to-public-key: `<pubkey> OP_CHECKSIG`, spent with `<sig>`

use rand::{CryptoRng, RngCore};

use super::{sign_input, SpendingContract};
use crate::error::Result;
use crate::keys::{KeyPair, KeyProvider};
use crate::opcodes::OP_CHECKSIG;
use crate::script::{Builder, Script};
use crate::types::Transaction;

#[derive(Debug)]
pub struct PayToKey {
    key: KeyPair,
}

impl PayToKey {
    pub fn new<P: KeyProvider, R: RngCore + CryptoRng + ?Sized>(provider: &P, rng: &mut R) -> Self {
        PayToKey::from_key(provider.generate_key_pair(rng))
    }

    pub fn from_key(key: KeyPair) -> Self {
        PayToKey { key }
    }

    pub fn public_key(&self) -> Vec<u8> {
        self.key.public_key()
    }
}

impl SpendingContract for PayToKey {
    fn name(&self) -> &'static str {
        "pay-to-key"
    }

    fn locking_script(&self) -> Result<Script> {
        Ok(Builder::new()
            .push_slice(&self.key.public_key())?
            .push_opcode(OP_CHECKSIG)?
            .into_script())
    }

    fn unlocking_script(
        &self,
        provider: &dyn KeyProvider,
        tx: &Transaction,
        input_index: usize,
    ) -> Result<Script> {
        let locking = self.locking_script()?;
        let signature = sign_input(provider, &self.key, tx, input_index, &locking)?;
        log::debug!("{}: signed input {}", self.name(), input_index);
        Ok(Builder::new().push_slice(&signature)?.into_script())
    }
}
