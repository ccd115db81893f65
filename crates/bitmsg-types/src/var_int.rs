//! Variable-length integer wire codec.
//!
//! Unsigned integers are encoded in 1, 3, 5, or 9 octets, big-endian,
//! with a one-octet discriminator for the multi-byte forms:
//!
//! ```text
//! value < 0xfd           → value as one octet
//! value ≤ 0xffff         → 0xfd ‖ u16 BE
//! value ≤ 0xffff_ffff    → 0xfe ‖ u32 BE
//! otherwise              → 0xff ‖ u64 BE
//! ```
//!
//! Decoding enforces minimal encoding: a value carried in a wider form
//! than necessary is rejected.

use crate::{BitmsgError, Result};

/// A decoded variable-length integer together with the number of
/// octets it occupied on the wire.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DecodedVarInt {
    /// The decoded value.
    pub value: u64,
    /// Octets consumed from the buffer.
    pub length: usize,
}

/// Encodes a value in its minimal variable-length form.
pub fn encode(value: u64) -> Vec<u8> {
    if value < 0xfd {
        vec![value as u8]
    } else if value <= 0xffff {
        let mut out = Vec::with_capacity(3);
        out.push(0xfd);
        out.extend_from_slice(&(value as u16).to_be_bytes());
        out
    } else if value <= 0xffff_ffff {
        let mut out = Vec::with_capacity(5);
        out.push(0xfe);
        out.extend_from_slice(&(value as u32).to_be_bytes());
        out
    } else {
        let mut out = Vec::with_capacity(9);
        out.push(0xff);
        out.extend_from_slice(&value.to_be_bytes());
        out
    }
}

/// Returns the encoded length of a value without allocating.
pub fn encoded_len(value: u64) -> usize {
    if value < 0xfd {
        1
    } else if value <= 0xffff {
        3
    } else if value <= 0xffff_ffff {
        5
    } else {
        9
    }
}

/// Decodes a variable-length integer from the front of `buf`.
///
/// # Errors
///
/// Returns [`BitmsgError::BadLength`] if the buffer is empty, is
/// truncated mid-integer, or carries a non-minimal encoding.
pub fn decode(buf: &[u8]) -> Result<DecodedVarInt> {
    let first = *buf.first().ok_or_else(|| BitmsgError::BadLength {
        reason: "empty buffer while decoding var_int".into(),
    })?;

    let (value, length) = match first {
        0xfd => {
            let bytes = take(buf, 2)?;
            let value = u64::from(u16::from_be_bytes([bytes[0], bytes[1]]));
            if value < 0xfd {
                return Err(non_minimal(value, 3));
            }
            (value, 3)
        }
        0xfe => {
            let bytes = take(buf, 4)?;
            let value = u64::from(u32::from_be_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3],
            ]));
            if value <= 0xffff {
                return Err(non_minimal(value, 5));
            }
            (value, 5)
        }
        0xff => {
            let bytes = take(buf, 8)?;
            let mut arr = [0u8; 8];
            arr.copy_from_slice(bytes);
            let value = u64::from_be_bytes(arr);
            if value <= 0xffff_ffff {
                return Err(non_minimal(value, 9));
            }
            (value, 9)
        }
        direct => (u64::from(direct), 1),
    };

    Ok(DecodedVarInt { value, length })
}

/// Returns the `len` octets following the discriminator, or a
/// truncation error.
fn take(buf: &[u8], len: usize) -> Result<&[u8]> {
    buf.get(1..1 + len).ok_or_else(|| BitmsgError::BadLength {
        reason: format!(
            "var_int truncated: need {} octets after discriminator, have {}",
            len,
            buf.len().saturating_sub(1),
        ),
    })
}

fn non_minimal(value: u64, length: usize) -> BitmsgError {
    BitmsgError::BadLength {
        reason: format!("non-minimal var_int: {value} encoded in {length} octets"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
