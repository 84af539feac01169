//! Legacy signature hash
//!
//! The signable digest commits to every input outpoint and sequence, every
//! output, the lock time, and the script code of the output being spent.
//! Script signatures of all inputs are blanked; the signed input carries the
//! script code instead.

use crate::constants::SIGHASH_ALL;
use crate::error::{ContractError, Result};
use crate::hash::sha256d;
use crate::transaction::serialize_transaction;
use crate::types::*;

/// SignatureHash for SIGHASH_ALL
pub fn signature_hash(
    tx: &Transaction,
    input_index: usize,
    script_code: &[u8],
    sighash_type: u8,
) -> Result<Hash> {
    if input_index >= tx.inputs.len() {
        return Err(ContractError::Signature(format!(
            "input index {} out of range for {} inputs",
            input_index,
            tx.inputs.len()
        )));
    }
    if sighash_type != SIGHASH_ALL {
        return Err(ContractError::Signature(format!(
            "unsupported sighash type 0x{:02x}",
            sighash_type
        )));
    }

    let mut copy = tx.clone();
    for (i, input) in copy.inputs.iter_mut().enumerate() {
        input.script_sig = if i == input_index {
            script_code.to_vec()
        } else {
            Vec::new()
        };
    }

    let mut preimage = serialize_transaction(&copy);
    preimage.extend_from_slice(&(sighash_type as u32).to_le_bytes());
    Ok(sha256d(&preimage))
}
