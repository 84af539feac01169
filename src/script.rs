//! Script assembly and wire format
//!
//! A [`Script`] is an immutable byte sequence alternating data pushes and
//! single-byte opcodes. [`Builder`] is the only way to produce one from
//! parts; it picks the shortest push encoding and rejects pushes the
//! interpreter would refuse to execute.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::constants::*;
use crate::error::{ContractError, Result};
use crate::opcodes::*;
use crate::scriptnum;

/// Immutable serialized script
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Script(Vec<u8>);

/// One parsed element of a script
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// Data push, including OP_0 (empty push)
    Push(Vec<u8>),
    /// Any non-push opcode, including OP_1NEGATE and OP_1..OP_16
    Op(u8),
}

impl Script {
    pub fn new() -> Self {
        Script(Vec::new())
    }

    /// Wrap raw wire bytes without validation
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Script(bytes.into())
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        hex::decode(s)
            .map(Script)
            .map_err(|e| ContractError::Encoding(format!("invalid hex script: {}", e)))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.clone()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse the wire format into instructions
    pub fn instructions(&self) -> Result<Vec<Instruction>> {
        let mut out = Vec::new();
        let mut pos = 0;
        while pos < self.0.len() {
            let (instruction, next) = read_instruction(&self.0, pos)?;
            out.push(instruction);
            pos = next;
        }
        Ok(out)
    }

    /// Whether the script only pushes data
    pub fn is_push_only(&self) -> bool {
        is_push_only(&self.0)
    }

    /// Canonical ASM rendering; truncated pushes render as `[error]`
    pub fn to_asm(&self) -> String {
        let mut parts = Vec::new();
        let mut pos = 0;
        while pos < self.0.len() {
            match read_instruction(&self.0, pos) {
                Ok((Instruction::Push(data), next)) => {
                    if data.is_empty() {
                        parts.push(opcode_name(OP_0));
                    } else {
                        parts.push(hex::encode(&data));
                    }
                    pos = next;
                }
                Ok((Instruction::Op(op), next)) => {
                    parts.push(opcode_name(op));
                    pos = next;
                }
                Err(_) => {
                    parts.push("[error]".to_string());
                    break;
                }
            }
        }
        parts.join(" ")
    }
}

/// Read one instruction starting at `pos`; returns it with the next offset
pub(crate) fn read_instruction(bytes: &[u8], pos: usize) -> Result<(Instruction, usize)> {
    let op = bytes[pos];
    let (len, start) = match op {
        0x01..=OP_PUSHBYTES_75 => (op as usize, pos + 1),
        OP_PUSHDATA1 => {
            let header = slice_at(bytes, pos + 1, 1)?;
            (header[0] as usize, pos + 2)
        }
        OP_PUSHDATA2 => {
            let header = slice_at(bytes, pos + 1, 2)?;
            (u16::from_le_bytes([header[0], header[1]]) as usize, pos + 3)
        }
        OP_PUSHDATA4 => {
            let header = slice_at(bytes, pos + 1, 4)?;
            let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
            (len as usize, pos + 5)
        }
        OP_0 => return Ok((Instruction::Push(Vec::new()), pos + 1)),
        _ => return Ok((Instruction::Op(op), pos + 1)),
    };
    let data = slice_at(bytes, start, len)?;
    Ok((Instruction::Push(data.to_vec()), start + len))
}

/// Whether raw script bytes consist solely of data pushes (OP_0..OP_16)
pub fn is_push_only(bytes: &[u8]) -> bool {
    let mut pos = 0;
    while pos < bytes.len() {
        match read_instruction(bytes, pos) {
            Ok((Instruction::Op(op), _)) if !is_push(op) => return false,
            Ok((_, next)) => pos = next,
            Err(_) => return false,
        }
    }
    true
}

fn slice_at(bytes: &[u8], start: usize, len: usize) -> Result<&[u8]> {
    start
        .checked_add(len)
        .and_then(|end| bytes.get(start..end))
        .ok_or_else(|| {
            ContractError::Encoding(format!(
                "push of {} bytes at offset {} runs past end of script",
                len, start
            ))
        })
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_asm())
    }
}

impl AsRef<[u8]> for Script {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Script> for Vec<u8> {
    fn from(script: Script) -> Self {
        script.0
    }
}

impl Serialize for Script {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Script {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Script::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Append-only script assembler
#[derive(Debug, Clone, Default)]
pub struct Builder {
    bytes: Vec<u8>,
}

impl Builder {
    pub fn new() -> Self {
        Builder { bytes: Vec::new() }
    }

    /// Push data with the shortest valid push prefix
    pub fn push_slice(mut self, data: &[u8]) -> Result<Self> {
        if data.len() > MAX_SCRIPT_ELEMENT_SIZE {
            return Err(ContractError::Encoding(format!(
                "push of {} bytes exceeds maximum element size {}",
                data.len(),
                MAX_SCRIPT_ELEMENT_SIZE
            )));
        }
        let len = data.len();
        if len <= OP_PUSHBYTES_75 as usize {
            self.bytes.push(len as u8);
        } else if len <= 0xff {
            self.bytes.push(OP_PUSHDATA1);
            self.bytes.push(len as u8);
        } else {
            self.bytes.push(OP_PUSHDATA2);
            self.bytes.extend_from_slice(&(len as u16).to_le_bytes());
        }
        self.bytes.extend_from_slice(data);
        Ok(self)
    }

    /// Push a number, using OP_0/OP_1NEGATE/OP_1..OP_16 where possible
    pub fn push_int(self, value: i64) -> Result<Self> {
        match value {
            0 => Ok(self.push_small(OP_0)),
            -1 => Ok(self.push_small(OP_1NEGATE)),
            1..=16 => Ok(self.push_small(OP_1 + (value as u8 - 1))),
            _ => self.push_slice(&scriptnum::encode(value)),
        }
    }

    /// Append a non-push opcode
    pub fn push_opcode(mut self, op: u8) -> Result<Self> {
        if (0x01..=OP_PUSHDATA4).contains(&op) {
            return Err(ContractError::Encoding(format!(
                "{} is a push prefix; use push_slice",
                opcode_name(op)
            )));
        }
        if !is_defined(op) {
            return Err(ContractError::Encoding(format!("unknown opcode 0x{:02x}", op)));
        }
        self.bytes.push(op);
        Ok(self)
    }

    fn push_small(mut self, op: u8) -> Self {
        self.bytes.push(op);
        self
    }

    pub fn into_script(self) -> Script {
        Script(self.bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_direct() {
        let script = Builder::new().push_slice(&[0xab; 20]).unwrap().into_script();
        assert_eq!(script.len(), 21);
        assert_eq!(script.as_bytes()[0], 20);
    }

    #[test]
    fn test_push_empty_is_op_0() {
        let script = Builder::new().push_slice(&[]).unwrap().into_script();
        assert_eq!(script.as_bytes(), &[OP_0]);
        assert_eq!(script.instructions().unwrap(), vec![Instruction::Push(vec![])]);
    }

    #[test]
    fn test_pushdata1_boundary() {
        let script = Builder::new().push_slice(&[1; 75]).unwrap().into_script();
        assert_eq!(script.as_bytes()[0], 75);

        let script = Builder::new().push_slice(&[1; 76]).unwrap().into_script();
        assert_eq!(&script.as_bytes()[..2], &[OP_PUSHDATA1, 76]);
        assert_eq!(script.len(), 78);
    }

    #[test]
    fn test_pushdata2_boundary() {
        let script = Builder::new().push_slice(&[1; 256]).unwrap().into_script();
        assert_eq!(&script.as_bytes()[..3], &[OP_PUSHDATA2, 0x00, 0x01]);
        assert_eq!(script.len(), 259);
    }

    #[test]
    fn test_push_max_element() {
        assert!(Builder::new().push_slice(&[0; MAX_SCRIPT_ELEMENT_SIZE]).is_ok());
        let err = Builder::new().push_slice(&[0; MAX_SCRIPT_ELEMENT_SIZE + 1]).unwrap_err();
        assert!(matches!(err, ContractError::Encoding(_)));
    }

    #[test]
    fn test_push_int_small() {
        let script = Builder::new()
            .push_int(0).unwrap()
            .push_int(1).unwrap()
            .push_int(16).unwrap()
            .push_int(-1).unwrap()
            .into_script();
        assert_eq!(script.as_bytes(), &[OP_0, OP_1, OP_16, OP_1NEGATE]);
    }

    #[test]
    fn test_push_int_large() {
        let script = Builder::new().push_int(17).unwrap().into_script();
        assert_eq!(script.as_bytes(), &[0x01, 0x11]);

        let script = Builder::new().push_int(ARBITRATION_MATURITY as i64).unwrap().into_script();
        assert_eq!(script.as_bytes(), &[0x04, 0x00, 0x44, 0x2b, 0x54]);
    }

    #[test]
    fn test_push_opcode_rejects_push_prefix() {
        assert!(Builder::new().push_opcode(0x14).is_err());
        assert!(Builder::new().push_opcode(OP_PUSHDATA4).is_err());
        assert!(Builder::new().push_opcode(OP_DUP).is_ok());
        assert!(Builder::new().push_opcode(OP_0).is_ok());
    }

    #[test]
    fn test_push_opcode_rejects_unknown() {
        assert!(Builder::new().push_opcode(OP_NOP10).is_ok());
        assert!(matches!(Builder::new().push_opcode(0xba), Err(ContractError::Encoding(_))));
        assert!(Builder::new().push_opcode(0xff).is_err());
    }

    #[test]
    fn test_instructions_p2pkh_shape() {
        let script = Builder::new()
            .push_opcode(OP_DUP).unwrap()
            .push_opcode(OP_HASH160).unwrap()
            .push_slice(&[0x11; 20]).unwrap()
            .push_opcode(OP_EQUALVERIFY).unwrap()
            .push_opcode(OP_CHECKSIG).unwrap()
            .into_script();

        assert_eq!(
            script.instructions().unwrap(),
            vec![
                Instruction::Op(OP_DUP),
                Instruction::Op(OP_HASH160),
                Instruction::Push(vec![0x11; 20]),
                Instruction::Op(OP_EQUALVERIFY),
                Instruction::Op(OP_CHECKSIG),
            ]
        );
        assert_eq!(
            script.to_asm(),
            format!("OP_DUP OP_HASH160 {} OP_EQUALVERIFY OP_CHECKSIG", "11".repeat(20))
        );
    }

    #[test]
    fn test_truncated_push() {
        let script = Script::from_bytes(vec![0x05, 0x01, 0x02]);
        assert!(matches!(script.instructions(), Err(ContractError::Encoding(_))));
        assert_eq!(script.to_asm(), "[error]");

        let script = Script::from_bytes(vec![OP_PUSHDATA2, 0x01]);
        assert!(script.instructions().is_err());
    }

    #[test]
    fn test_push_only() {
        let script = Builder::new()
            .push_int(0).unwrap()
            .push_slice(&[1, 2, 3]).unwrap()
            .push_int(1).unwrap()
            .into_script();
        assert!(script.is_push_only());

        let script = Builder::new().push_opcode(OP_DUP).unwrap().into_script();
        assert!(!script.is_push_only());
    }

    #[test]
    fn test_hex_roundtrip_and_serde() {
        let script = Script::from_hex("76a914").unwrap();
        assert_eq!(script.to_hex(), "76a914");
        assert!(Script::from_hex("zz").is_err());

        let json = serde_json::to_string(&script).unwrap();
        assert_eq!(json, "\"76a914\"");
        let back: Script = serde_json::from_str(&json).unwrap();
        assert_eq!(back, script);
    }
}
