//! SHA-2 hashing and the RIPEMD-160 identity digest.
//!
//! All object hashing uses SHA-512 (checksums, POW initial hashes, tag
//! derivation); signatures are computed over a SHA-256 digest. The
//! identity fingerprint of an address is RIPEMD-160 of the SHA-512 of
//! its concatenated public keys.

use ripemd::Ripemd160;
use sha2::{Digest, Sha256, Sha512};

/// Computes the SHA-256 hash of arbitrary data.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(data));
    out
}

/// Computes the SHA-512 hash of arbitrary data.
pub fn sha512(data: &[u8]) -> [u8; 64] {
    let mut out = [0u8; 64];
    out.copy_from_slice(&Sha512::digest(data));
    out
}

/// Computes the double SHA-512 hash: `SHA-512(SHA-512(data))`.
///
/// Used for tag derivation and for the proof-of-work trial value.
pub fn double_sha512(data: &[u8]) -> [u8; 64] {
    sha512(&sha512(data))
}

/// Computes the address-identity fingerprint:
/// `RIPEMD-160(SHA-512(sign_pub ‖ enc_pub))`.
///
/// Both keys are taken in their full 65-octet SEC form, leading `0x04`
/// included.
pub fn ripe160(sign_pub: &[u8; 65], enc_pub: &[u8; 65]) -> [u8; 20] {
    let mut sha = Sha512::new();
    sha.update(sign_pub);
    sha.update(enc_pub);
    let inner = sha.finalize();

    let mut out = [0u8; 20];
    out.copy_from_slice(&Ripemd160::digest(inner));
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
