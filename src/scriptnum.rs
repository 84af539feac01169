//! Script number encoding
//!
//! Numbers on the stack are little-endian byte arrays with the sign carried in
//! the most significant bit of the last byte. Zero is the empty array.

use crate::error::ScriptFailure;

/// Encode `value` in minimal script number form
pub fn encode(value: i64) -> Vec<u8> {
    if value == 0 {
        return vec![];
    }

    let negative = value < 0;
    let mut abs = value.unsigned_abs();
    let mut result = Vec::with_capacity(9);
    while abs > 0 {
        result.push((abs & 0xff) as u8);
        abs >>= 8;
    }

    // An extra byte carries the sign when the top bit is already in use
    let last = result.len() - 1;
    if result[last] & 0x80 != 0 {
        result.push(if negative { 0x80 } else { 0x00 });
    } else if negative {
        result[last] |= 0x80;
    }
    result
}

/// Decode a stack element as a script number of at most `max_len` bytes
pub fn decode(bytes: &[u8], max_len: usize, require_minimal: bool) -> Result<i64, ScriptFailure> {
    if bytes.len() > max_len {
        return Err(ScriptFailure::NumberOverflow(bytes.len()));
    }
    if bytes.is_empty() {
        return Ok(0);
    }
    if require_minimal && !is_minimal(bytes) {
        return Err(ScriptFailure::NonMinimalNumber);
    }

    let mut value: i64 = 0;
    for (i, &b) in bytes.iter().enumerate() {
        value |= (b as i64) << (8 * i);
    }

    let last = bytes.len() - 1;
    if bytes[last] & 0x80 != 0 {
        let mask = !(0x80_i64 << (8 * last));
        return Ok(-(value & mask));
    }
    Ok(value)
}

/// Whether `bytes` is the shortest encoding of its value
pub fn is_minimal(bytes: &[u8]) -> bool {
    match bytes {
        [] => true,
        [.., last] if last & 0x7f != 0 => true,
        // A trailing 0x00/0x80 is only allowed when it carries the sign bit
        [_] => false,
        [.., prev, _] => prev & 0x80 != 0,
    }
}

/// Truthiness of a stack element: any non-zero byte except a lone negative zero
pub fn cast_to_bool(bytes: &[u8]) -> bool {
    for (i, &b) in bytes.iter().enumerate() {
        if b != 0 {
            return !(i == bytes.len() - 1 && b == 0x80);
        }
    }
    false
}
