//! Transaction structure checks and consensus serialization

use crate::constants::*;
use crate::error::{ContractError, Result};
use crate::hash::sha256d;
use crate::types::*;

/// CheckTransaction: structural validity of a transaction
///
/// A transaction tx = (v, ins, outs, lt) is well formed if and only if:
/// 1. |ins| > 0 ∧ |outs| > 0
/// 2. ∀o ∈ outs: 0 ≤ o.value ≤ M_max, and Σ o.value ≤ M_max
/// 3. |ins| ≤ M_max_inputs
/// 4. |outs| ≤ M_max_outputs
/// 5. |tx| ≤ M_max_tx_size
pub fn check_transaction(tx: &Transaction) -> Result<()> {
    // 1. Check inputs and outputs are not empty
    if tx.inputs.is_empty() || tx.outputs.is_empty() {
        return Err(ContractError::Encoding("Empty inputs or outputs".to_string()));
    }

    // 2. Check output values are valid
    let mut total: i64 = 0;
    for (i, output) in tx.outputs.iter().enumerate() {
        if output.value < 0 || output.value > MAX_MONEY {
            return Err(ContractError::Encoding(
                format!("Invalid output value {} at index {}", output.value, i)
            ));
        }
        total += output.value;
        if total > MAX_MONEY {
            return Err(ContractError::Encoding(
                format!("Total output value {} exceeds maximum", total)
            ));
        }
    }

    // 3. Check input count limit
    if tx.inputs.len() > MAX_INPUTS {
        return Err(ContractError::Encoding(
            format!("Too many inputs: {}", tx.inputs.len())
        ));
    }

    // 4. Check output count limit
    if tx.outputs.len() > MAX_OUTPUTS {
        return Err(ContractError::Encoding(
            format!("Too many outputs: {}", tx.outputs.len())
        ));
    }

    // 5. Check transaction size limit
    let tx_size = serialize_transaction(tx).len();
    if tx_size > MAX_TX_SIZE {
        return Err(ContractError::Encoding(
            format!("Transaction too large: {} bytes", tx_size)
        ));
    }

    Ok(())
}

/// Legacy (non-witness) consensus serialization
pub fn serialize_transaction(tx: &Transaction) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&tx.version.to_le_bytes());

    out.extend_from_slice(&encode_varint(tx.inputs.len() as u64));
    for input in &tx.inputs {
        out.extend_from_slice(&input.prevout.hash);
        out.extend_from_slice(&input.prevout.index.to_le_bytes());
        out.extend_from_slice(&encode_varint(input.script_sig.len() as u64));
        out.extend_from_slice(&input.script_sig);
        out.extend_from_slice(&input.sequence.to_le_bytes());
    }

    out.extend_from_slice(&encode_varint(tx.outputs.len() as u64));
    for output in &tx.outputs {
        out.extend_from_slice(&output.value.to_le_bytes());
        out.extend_from_slice(&encode_varint(output.script_pubkey.len() as u64));
        out.extend_from_slice(&output.script_pubkey);
    }

    out.extend_from_slice(&tx.lock_time.to_le_bytes());
    out
}

/// Transaction id: HASH256 of the serialization, in internal byte order
pub fn txid(tx: &Transaction) -> Hash {
    sha256d(&serialize_transaction(tx))
}

/// Encode a number as a Bitcoin varint
pub fn encode_varint(value: u64) -> Vec<u8> {
    if value < 0xfd {
        vec![value as u8]
    } else if value <= 0xffff {
        let mut result = vec![0xfd];
        result.extend_from_slice(&(value as u16).to_le_bytes());
        result
    } else if value <= 0xffffffff {
        let mut result = vec![0xfe];
        result.extend_from_slice(&(value as u32).to_le_bytes());
        result
    } else {
        let mut result = vec![0xff];
        result.extend_from_slice(&value.to_le_bytes());
        result
    }
}
