//! Core shared types for the bitmsg object codec.
//!
//! This crate defines all fundamental types used across the workspace.
//! No other crate should define shared types — everything lives here.

pub mod var_int;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// ObjectType
// ---------------------------------------------------------------------------

/// The four object payload types carried by the gossip network.
///
/// Encoded on the wire as a big-endian `u32` at a fixed offset inside
/// the object header.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum ObjectType {
    /// Request for an unknown public key.
    Getpubkey = 0,
    /// Publication of a sender's public keys.
    Pubkey = 1,
    /// Directed, encrypted, signed message.
    Msg = 2,
    /// Signed message broadcast to subscribers.
    Broadcast = 3,
}

impl ObjectType {
    /// Converts a wire-level `u32` into an [`ObjectType`], if known.
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Getpubkey),
            1 => Some(Self::Pubkey),
            2 => Some(Self::Msg),
            3 => Some(Self::Broadcast),
            _ => None,
        }
    }

    /// Returns the wire-level `u32` for this type.
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Getpubkey => write!(f, "getpubkey"),
            Self::Pubkey => write!(f, "pubkey"),
            Self::Msg => write!(f, "msg"),
            Self::Broadcast => write!(f, "broadcast"),
        }
    }
}

// ---------------------------------------------------------------------------
// Ripe
// ---------------------------------------------------------------------------

/// RIPEMD-160 digest of the concatenated signing and encryption public
/// keys; the address-identity fingerprint.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Ripe([u8; 20]);

impl Ripe {
    /// The fixed byte length of a RIPE digest.
    pub const LEN: usize = 20;

    /// Creates a new `Ripe` from raw bytes.
    pub fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Creates a `Ripe` from a slice, checking the length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::LEN {
            return Err(BitmsgError::BadLength {
                reason: format!("expected {} ripe bytes, got {}", Self::LEN, bytes.len()),
            });
        }
        let mut arr = [0u8; 20];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    /// Returns the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl From<[u8; 20]> for Ripe {
    fn from(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Ripe {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Ripe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for Ripe {
    type Err = BitmsgError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|_| BitmsgError::BadLength {
            reason: "invalid hex encoding for ripe".into(),
        })?;
        Self::from_slice(&bytes)
    }
}

// ---------------------------------------------------------------------------
// Tag
// ---------------------------------------------------------------------------

/// 32-octet identifier derived from an address; the stable routing key
/// for version-4-and-later addresses.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Tag([u8; 32]);

impl Tag {
    /// The fixed byte length of a tag.
    pub const LEN: usize = 32;

    /// Creates a new `Tag` from raw bytes.
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Creates a `Tag` from a slice, checking the length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::LEN {
            return Err(BitmsgError::BadLength {
                reason: format!("expected {} tag bytes, got {}", Self::LEN, bytes.len()),
            });
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    /// Returns the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<[u8; 32]> for Tag {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Tag {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for Tag {
    type Err = BitmsgError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|_| BitmsgError::BadLength {
            reason: "invalid hex encoding for tag".into(),
        })?;
        Self::from_slice(&bytes)
    }
}

// ---------------------------------------------------------------------------
// PubkeyBitfield
// ---------------------------------------------------------------------------

/// Four octets of feature flags advertised by a pubkey.
///
/// Bits are numbered per the protocol table: bit 0 is the most
/// significant bit of the first octet, bit 31 the least significant bit
/// of the last. The meaning of individual bits depends on the pubkey
/// version; only `DOES_ACK` is interpreted by this library.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct PubkeyBitfield([u8; 4]);

impl PubkeyBitfield {
    /// The fixed byte length of the bitfield.
    pub const LEN: usize = 4;

    /// The receiving node sends acknowledgements.
    pub const DOES_ACK: u8 = 31;

    /// Creates a bitfield from raw bytes.
    pub fn new(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Returns a bitfield with all flags cleared.
    pub fn empty() -> Self {
        Self([0u8; 4])
    }

    /// Returns whether the given bit (0..=31) is set.
    pub fn get(&self, bit: u8) -> bool {
        debug_assert!(bit < 32);
        let byte = (bit / 8) as usize;
        let mask = 0x80u8 >> (bit % 8);
        self.0[byte] & mask != 0
    }

    /// Sets the given bit (0..=31) and returns the updated bitfield.
    pub fn with(mut self, bit: u8) -> Self {
        debug_assert!(bit < 32);
        let byte = (bit / 8) as usize;
        let mask = 0x80u8 >> (bit % 8);
        self.0[byte] |= mask;
        self
    }

    /// Returns the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl Default for PubkeyBitfield {
    /// A freshly advertised pubkey acknowledges messages.
    fn default() -> Self {
        Self::empty().with(Self::DOES_ACK)
    }
}

impl From<[u8; 4]> for PubkeyBitfield {
    fn from(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for PubkeyBitfield {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// BitmsgError
// ---------------------------------------------------------------------------

/// Central error type for the bitmsg workspace.
///
/// All crates convert their internal failures into variants of this
/// enum, ensuring a unified error handling surface. Decode-side
/// candidate-trial loops swallow per-candidate failures and surface
/// only the aggregated [`DecryptFailed`](Self::DecryptFailed).
#[derive(Debug, Error)]
pub enum BitmsgError {
    /// The outer message envelope carries an unexpected command.
    #[error("bad command: expected \"object\", got {command:?}")]
    BadCommand {
        /// The command string found in the envelope.
        command: String,
    },

    /// The decoded object type does not match the called codec.
    #[error("wrong object type: expected {expected}, got {actual}")]
    WrongType {
        /// What the caller expected to decode.
        expected: String,
        /// The wire-level type value actually found.
        actual: u32,
    },

    /// Object or sender version outside the codec's allowed range.
    #[error("unsupported version {version}")]
    UnsupportedVersion {
        /// The offending version number.
        version: u64,
    },

    /// The payload is shorter than required by the parsed fields, or a
    /// wire integer is malformed.
    #[error("bad length: {reason}")]
    BadLength {
        /// Human-readable description of the structural failure.
        reason: String,
    },

    /// The object exceeds the maximum payload size before POW.
    #[error("payload too large: {size} bytes exceeds maximum {max}")]
    PayloadTooLarge {
        /// The object's actual size.
        size: usize,
        /// The maximum allowed size.
        max: usize,
    },

    /// The object's expiry time falls outside the acceptance window.
    #[error("expiry {expires} outside acceptance window around {now}")]
    ExpiresOutOfRange {
        /// The object's absolute expiry, Unix seconds.
        expires: u64,
        /// The receiver's current time, Unix seconds.
        now: u64,
    },

    /// No candidate address matches the object's routing tag.
    #[error("no candidate address matches tag {tag}")]
    NotInterested {
        /// The tag found in the object payload.
        tag: Tag,
    },

    /// No candidate key succeeded in decrypting the object.
    #[error("decryption failed after {attempts} candidate(s)")]
    DecryptFailed {
        /// How many candidate keys were tried.
        attempts: usize,
    },

    /// The cleartext ripe differs from the decrypting identity's ripe.
    #[error("ripe mismatch: cleartext {actual}, identity {expected}")]
    RipeMismatch {
        /// The decrypting identity's ripe.
        expected: Ripe,
        /// The ripe found in the cleartext.
        actual: Ripe,
    },

    /// The sender reconstructed from the cleartext is inconsistent with
    /// the outer object (ripe, tag, or stream).
    #[error("sender key mismatch: {reason}")]
    KeyMismatch {
        /// Human-readable description of the inconsistency.
        reason: String,
    },

    /// ECDSA signature verification failed.
    #[error("signature verification failed")]
    SignatureInvalid,

    /// A message-content encoding could not be interpreted.
    #[error("bad content encoding: {reason}")]
    BadEncoding {
        /// Human-readable description of the content failure.
        reason: String,
    },

    /// A cryptographic primitive failed (sign, encrypt, decrypt, key
    /// handling).
    #[error("crypto error: {reason}")]
    CryptoError {
        /// Human-readable description of the cryptographic failure.
        reason: String,
    },

    /// The proof-of-work search was cancelled before completion.
    #[error("proof-of-work cancelled")]
    PowCancelled,
}

// ---------------------------------------------------------------------------
// Result alias
// ---------------------------------------------------------------------------

/// Convenience result type using [`BitmsgError`].
pub type Result<T> = std::result::Result<T, BitmsgError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_type_u32_roundtrip() {
        for ty in [
            ObjectType::Getpubkey,
            ObjectType::Pubkey,
            ObjectType::Msg,
            ObjectType::Broadcast,
        ] {
            assert_eq!(ObjectType::from_u32(ty.as_u32()), Some(ty));
        }
        assert_eq!(ObjectType::from_u32(4), None);
        assert_eq!(ObjectType::from_u32(u32::MAX), None);
    }

    #[test]
    fn object_type_display() {
        assert_eq!(ObjectType::Getpubkey.to_string(), "getpubkey");
        assert_eq!(ObjectType::Broadcast.to_string(), "broadcast");
    }

    #[test]
    fn ripe_roundtrip_hex() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let ripe = Ripe::new([0xAB; 20]);
        let parsed: Ripe = ripe.to_string().parse()?;
        assert_eq!(ripe, parsed);
        Ok(())
    }

    #[test]
    fn ripe_from_slice_wrong_length() {
        assert!(Ripe::from_slice(&[0u8; 19]).is_err());
        assert!(Ripe::from_slice(&[0u8; 21]).is_err());
    }

    #[test]
    fn tag_roundtrip_hex() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let tag = Tag::new([0x42; 32]);
        let parsed: Tag = tag.to_string().parse()?;
        assert_eq!(tag, parsed);
        Ok(())
    }

    #[test]
    fn tag_serde_json_roundtrip() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let tag = Tag::new([0x11; 32]);
        let json = serde_json::to_string(&tag)?;
        let parsed: Tag = serde_json::from_str(&json)?;
        assert_eq!(tag, parsed);
        Ok(())
    }

    #[test]
    fn bitfield_does_ack_is_last_bit() {
        let field = PubkeyBitfield::default();
        assert_eq!(field.as_bytes(), &[0x00, 0x00, 0x00, 0x01]);
        assert!(field.get(PubkeyBitfield::DOES_ACK));
        assert!(!field.get(0));
    }

    #[test]
    fn bitfield_bit_zero_is_most_significant() {
        let field = PubkeyBitfield::empty().with(0);
        assert_eq!(field.as_bytes(), &[0x80, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn bitfield_empty_has_no_flags() {
        let field = PubkeyBitfield::empty();
        for bit in 0..32 {
            assert!(!field.get(bit));
        }
    }

    #[test]
    fn error_display_carries_context() {
        let err = BitmsgError::PayloadTooLarge {
            size: 300_000,
            max: 262_136,
        };
        let msg = err.to_string();
        assert!(msg.contains("300000"));
        assert!(msg.contains("262136"));
    }
}
