//! Key/signature provider
//!
//! Private scalars never leave a [`KeyPair`]: signing goes through a
//! [`KeyProvider`], and the scalar is erased when the pair is dropped.

use std::fmt;

use rand::{CryptoRng, RngCore};
use secp256k1::{All, Message, PublicKey, Secp256k1, SecretKey};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{ContractError, Result};
use crate::hash::hash160;
use crate::types::{Hash, Hash160};

/// secp256k1 key pair owned by exactly one contract instance
pub struct KeyPair {
    secret: SecretKey,
    public: PublicKey,
}

impl KeyPair {
    fn from_secret(secp: &Secp256k1<All>, secret: &SecretKey) -> Self {
        KeyPair {
            secret: *secret,
            public: PublicKey::from_secret_key(secp, secret),
        }
    }

    /// Compressed SEC1 public key (33 bytes)
    pub fn public_key(&self) -> Vec<u8> {
        self.public.serialize().to_vec()
    }

    /// HASH160 of the compressed public key
    pub fn public_key_hash(&self) -> Hash160 {
        hash160(&self.public.serialize())
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &hex::encode(self.public.serialize()))
            .finish_non_exhaustive()
    }
}

/// Erasure is best effort: `SecretKey` is `Copy`, so callers that hold one
/// must erase their own copy, and copies made inside libsecp256k1 are not
/// tracked.
impl Drop for KeyPair {
    fn drop(&mut self) {
        self.secret.non_secure_erase();
    }
}

/// Key generation and signing capability
pub trait KeyProvider {
    /// Generate a fresh key pair from the given random source
    fn generate_key_pair<R: RngCore + CryptoRng + ?Sized>(&self, rng: &mut R) -> KeyPair
    where
        Self: Sized;

    /// Sign a 32-byte digest; returns a DER-encoded ECDSA signature
    fn sign(&self, digest: &Hash, key: &KeyPair) -> Result<Vec<u8>>;

    /// HASH160 of a serialized public key
    fn public_key_hash(&self, public_key: &[u8]) -> Result<Hash160> {
        PublicKey::from_slice(public_key)
            .map_err(|e| ContractError::Signature(format!("invalid public key: {}", e)))?;
        Ok(hash160(public_key))
    }
}

/// [`KeyProvider`] backed by libsecp256k1 (RFC6979 nonces, low-S signatures)
pub struct Secp256k1Provider {
    secp: Secp256k1<All>,
}

impl Secp256k1Provider {
    pub fn new() -> Self {
        Secp256k1Provider { secp: Secp256k1::new() }
    }

    /// Rebuild a key pair from a 32-byte secret scalar
    pub fn key_pair_from_secret(&self, secret: &[u8]) -> Result<KeyPair> {
        let mut secret = SecretKey::from_slice(secret)
            .map_err(|e| ContractError::Signature(format!("invalid secret key: {}", e)))?;
        let pair = KeyPair::from_secret(&self.secp, &secret);
        secret.non_secure_erase();
        Ok(pair)
    }
}

impl Default for Secp256k1Provider {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyProvider for Secp256k1Provider {
    fn generate_key_pair<R: RngCore + CryptoRng + ?Sized>(&self, rng: &mut R) -> KeyPair {
        // Out-of-range scalars are astronomically rare; redraw until valid
        let mut bytes = [0u8; 32];
        let mut secret = loop {
            rng.fill_bytes(&mut bytes);
            if let Ok(secret) = SecretKey::from_slice(&bytes) {
                break secret;
            }
        };
        bytes.zeroize();
        let pair = KeyPair::from_secret(&self.secp, &secret);
        secret.non_secure_erase();
        pair
    }

    fn sign(&self, digest: &Hash, key: &KeyPair) -> Result<Vec<u8>> {
        let message = Message::from_digest_slice(digest)
            .map_err(|e| ContractError::Signature(format!("invalid digest: {}", e)))?;
        let signature = self.secp.sign_ecdsa(&message, &key.secret);
        Ok(signature.serialize_der().to_vec())
    }
}

/// Secret random bytes whose length is part of the protocol
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Nonce(Vec<u8>);

impl Nonce {
    pub fn generate<R: RngCore + CryptoRng + ?Sized>(rng: &mut R, len: usize) -> Self {
        let mut bytes = vec![0u8; len];
        rng.fill_bytes(&mut bytes);
        Nonce(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// HASH160 commitment published before the reveal
    pub fn commitment(&self) -> Hash160 {
        hash160(&self.0)
    }
}

impl fmt::Debug for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Nonce({} bytes)", self.0.len())
    }
}
