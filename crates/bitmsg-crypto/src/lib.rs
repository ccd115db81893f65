//! Cryptographic primitives for the bitmsg object codec.
//!
//! This crate is the **sole** location for all cryptographic operations:
//!
//! - **secp256k1** key handling (uncompressed 65-octet SEC form; the
//!   64-octet wire form strips the leading `0x04`)
//! - **ECDSA** signing and verification (DER signatures over a SHA-256
//!   digest of the signed region)
//! - **ECIES** hybrid encryption (ephemeral ECDH → SHA-512 KDF →
//!   AES-256-CBC → HMAC-SHA256, encrypt-then-MAC)
//! - **SHA-512**, double-SHA-512, SHA-256, and the RIPEMD-160∘SHA-512
//!   identity digest
//! - **Address** identities: ripe and tag derivation, and the
//!   deterministic pubkey/broadcast encryption keypairs
//!
//! No other crate in the workspace should perform raw crypto operations.

pub mod address;
pub mod ecies;
pub mod hash;
pub mod keys;
pub mod signing;

pub use address::Address;
pub use keys::{PrivateKey, PublicKey};
