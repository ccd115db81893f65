//! secp256k1 key wrappers.
//!
//! Public keys travel on the wire in a 64-octet form: the uncompressed
//! 65-octet SEC encoding with the leading `0x04` stripped. [`PublicKey`]
//! converts between the two; the `0x04` is restored whenever a key is
//! parsed out of an object payload.

use bitmsg_types::{BitmsgError, Result};
use rand::rngs::OsRng;
use secp256k1::Secp256k1;

/// Length of an uncompressed SEC public key, prefix included.
pub const PUBLIC_KEY_LEN: usize = 65;

/// Length of a public key embedded in an object payload.
pub const WIRE_PUBLIC_KEY_LEN: usize = 64;

/// The uncompressed-point prefix octet.
pub const UNCOMPRESSED_PREFIX: u8 = 0x04;

// ---------------------------------------------------------------------------
// PublicKey
// ---------------------------------------------------------------------------

/// Uncompressed secp256k1 public key.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PublicKey(secp256k1::PublicKey);

impl PublicKey {
    /// Parses a 65-octet uncompressed SEC encoding (leading `0x04`).
    pub fn from_sec(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != PUBLIC_KEY_LEN {
            return Err(BitmsgError::CryptoError {
                reason: format!(
                    "expected {} public key octets, got {}",
                    PUBLIC_KEY_LEN,
                    bytes.len(),
                ),
            });
        }
        let key = secp256k1::PublicKey::from_slice(bytes).map_err(|e| {
            BitmsgError::CryptoError {
                reason: format!("invalid public key: {e}"),
            }
        })?;
        Ok(Self(key))
    }

    /// Parses the 64-octet wire form, restoring the stripped `0x04`.
    pub fn from_wire(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != WIRE_PUBLIC_KEY_LEN {
            return Err(BitmsgError::CryptoError {
                reason: format!(
                    "expected {} wire public key octets, got {}",
                    WIRE_PUBLIC_KEY_LEN,
                    bytes.len(),
                ),
            });
        }
        let mut sec = [0u8; PUBLIC_KEY_LEN];
        sec[0] = UNCOMPRESSED_PREFIX;
        sec[1..].copy_from_slice(bytes);
        Self::from_sec(&sec)
    }

    /// Returns the 65-octet uncompressed SEC encoding.
    pub fn to_sec(&self) -> [u8; PUBLIC_KEY_LEN] {
        self.0.serialize_uncompressed()
    }

    /// Returns the 64-octet wire form with the `0x04` stripped.
    pub fn to_wire(&self) -> [u8; WIRE_PUBLIC_KEY_LEN] {
        let sec = self.to_sec();
        let mut out = [0u8; WIRE_PUBLIC_KEY_LEN];
        out.copy_from_slice(&sec[1..]);
        out
    }

    pub(crate) fn inner(&self) -> &secp256k1::PublicKey {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// PrivateKey
// ---------------------------------------------------------------------------

/// secp256k1 secret scalar.
///
/// Does not implement `Debug` to prevent accidental leakage of key
/// material in logs.
#[derive(Clone)]
pub struct PrivateKey(secp256k1::SecretKey);

impl PrivateKey {
    /// Length of a raw secret scalar.
    pub const LEN: usize = 32;

    /// Generates a fresh random key from OS entropy.
    pub fn generate() -> Self {
        Self(secp256k1::SecretKey::new(&mut OsRng))
    }

    /// Creates a key from 32 raw octets.
    ///
    /// # Errors
    ///
    /// Returns [`BitmsgError::CryptoError`] if the octets are not a
    /// valid scalar (zero or at least the curve order).
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self> {
        let key = secp256k1::SecretKey::from_slice(bytes).map_err(|e| {
            BitmsgError::CryptoError {
                reason: format!("invalid secret key: {e}"),
            }
        })?;
        Ok(Self(key))
    }

    /// Derives the corresponding public key.
    pub fn public_key(&self) -> PublicKey {
        let secp = Secp256k1::new();
        PublicKey(secp256k1::PublicKey::from_secret_key(&secp, &self.0))
    }

    /// Returns the raw 32-octet scalar.
    ///
    /// The returned bytes are sensitive key material; callers must
    /// discard the copy as soon as it is no longer needed.
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.0.secret_bytes()
    }

    pub(crate) fn inner(&self) -> &secp256k1::SecretKey {
        &self.0
    }
}

/// Generates a random keypair from OS entropy.
pub fn generate_keypair() -> (PrivateKey, PublicKey) {
    let private = PrivateKey::generate();
    let public = private.public_key();
    (private, public)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
