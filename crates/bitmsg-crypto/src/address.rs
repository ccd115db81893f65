//! Address identities.
//!
//! An [`Address`] bundles everything the object codecs need to know
//! about one identity: version, stream, the signing and encryption
//! keypairs, the advertised behavior bitfield, and optional per-address
//! proof-of-work difficulty parameters.
//!
//! Two derived quantities route objects to identities:
//!
//! - **ripe** — `RIPEMD-160(SHA-512(sign_pub ‖ enc_pub))`, the identity
//!   fingerprint, carried in cleartext by `getpubkey` (v2/v3) and `msg`;
//! - **tag** — the second half of
//!   `dSHA-512(var_int(version) ‖ var_int(stream) ‖ ripe)`, the routing
//!   key for v4+ addresses. The *first* half of the same digest is a
//!   deterministic secret scalar: anyone who knows the address can
//!   derive the keypair that encrypts its `pubkey` objects and
//!   broadcasts. [`Address::pubkey_keypair`] and
//!   [`Address::broadcast_keypair`] expose that construction.
//!
//! Addresses reconstructed from decoded objects carry only public
//! halves; requesting a missing private key reports a crypto error.
//! The textual (base58) address form is handled by the address-book
//! subsystem, not here.

use std::fmt;

use bitmsg_types::{var_int, BitmsgError, PubkeyBitfield, Result, Ripe, Tag};

use crate::hash::{double_sha512, ripe160};
use crate::keys::{generate_keypair, PrivateKey, PublicKey};

/// Network-default POW difficulty: nonce trials per payload octet.
pub const DEFAULT_NONCE_TRIALS_PER_BYTE: u64 = 1000;

/// Network-default POW difficulty: extra octets added to the payload
/// length, softening the difficulty jump for small payloads.
pub const DEFAULT_PAYLOAD_LENGTH_EXTRA_BYTES: u64 = 1000;

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// One identity on the network.
#[derive(Clone)]
pub struct Address {
    /// Address version, 2..=4. Versions before 4 route by ripe,
    /// version 4 routes by tag.
    pub version: u64,
    /// Stream the identity lives in.
    pub stream: u64,
    /// Feature flags advertised with the identity's pubkey.
    pub behavior: PubkeyBitfield,
    /// Uncompressed signing public key.
    pub signing_public: PublicKey,
    /// Uncompressed encryption public key.
    pub encryption_public: PublicKey,
    /// POW difficulty demanded of correspondents, if the identity
    /// advertises one. `None` falls back to the network default.
    pub nonce_trials_per_byte: Option<u64>,
    /// POW length padding demanded of correspondents, if advertised.
    pub payload_length_extra_bytes: Option<u64>,
    signing_private: Option<PrivateKey>,
    encryption_private: Option<PrivateKey>,
}

impl Address {
    /// Generates a fresh identity with random keys and default
    /// behavior and difficulty.
    pub fn generate(version: u64, stream: u64) -> Self {
        let (signing_private, signing_public) = generate_keypair();
        let (encryption_private, encryption_public) = generate_keypair();
        Self {
            version,
            stream,
            behavior: PubkeyBitfield::default(),
            signing_public,
            encryption_public,
            nonce_trials_per_byte: None,
            payload_length_extra_bytes: None,
            signing_private: Some(signing_private),
            encryption_private: Some(encryption_private),
        }
    }

    /// Reconstructs a full identity from its two secret scalars.
    pub fn from_secrets(
        version: u64,
        stream: u64,
        signing_private: PrivateKey,
        encryption_private: PrivateKey,
    ) -> Self {
        let signing_public = signing_private.public_key();
        let encryption_public = encryption_private.public_key();
        Self {
            version,
            stream,
            behavior: PubkeyBitfield::default(),
            signing_public,
            encryption_public,
            nonce_trials_per_byte: None,
            payload_length_extra_bytes: None,
            signing_private: Some(signing_private),
            encryption_private: Some(encryption_private),
        }
    }

    /// Builds a public-only identity, as reconstructed from a decoded
    /// object. Signing and decryption are unavailable on it.
    pub fn from_public_keys(
        version: u64,
        stream: u64,
        behavior: PubkeyBitfield,
        signing_public: PublicKey,
        encryption_public: PublicKey,
    ) -> Self {
        Self {
            version,
            stream,
            behavior,
            signing_public,
            encryption_public,
            nonce_trials_per_byte: None,
            payload_length_extra_bytes: None,
            signing_private: None,
            encryption_private: None,
        }
    }

    /// The identity fingerprint.
    pub fn ripe(&self) -> Ripe {
        Ripe::new(ripe160(
            &self.signing_public.to_sec(),
            &self.encryption_public.to_sec(),
        ))
    }

    /// The routing tag. Meaningful on the wire only for `version ≥ 4`,
    /// but derivable for any address.
    pub fn tag(&self) -> Tag {
        let material = self.tag_material();
        let mut tag = [0u8; 32];
        tag.copy_from_slice(&material[32..]);
        Tag::new(tag)
    }

    /// The keypair that encrypts this identity's `pubkey v4` objects.
    ///
    /// # Errors
    ///
    /// Returns [`BitmsgError::CryptoError`] in the astronomically
    /// unlikely case that the derived scalar is invalid.
    pub fn pubkey_keypair(&self) -> Result<(PrivateKey, PublicKey)> {
        self.derived_keypair()
    }

    /// The keypair that encrypts this identity's broadcasts.
    ///
    /// The construction is identical to [`Self::pubkey_keypair`]; any
    /// subscriber knowing the address can derive it.
    pub fn broadcast_keypair(&self) -> Result<(PrivateKey, PublicKey)> {
        self.derived_keypair()
    }

    /// The signing secret, if this identity carries one.
    pub fn signing_private(&self) -> Result<&PrivateKey> {
        self.signing_private
            .as_ref()
            .ok_or_else(|| BitmsgError::CryptoError {
                reason: "address has no signing private key".into(),
            })
    }

    /// The decryption secret, if this identity carries one.
    pub fn encryption_private(&self) -> Result<&PrivateKey> {
        self.encryption_private
            .as_ref()
            .ok_or_else(|| BitmsgError::CryptoError {
                reason: "address has no encryption private key".into(),
            })
    }

    /// Demanded nonce trials per octet, or the network default.
    pub fn nonce_trials(&self) -> u64 {
        self.nonce_trials_per_byte
            .unwrap_or(DEFAULT_NONCE_TRIALS_PER_BYTE)
    }

    /// Demanded payload length padding, or the network default.
    pub fn extra_bytes(&self) -> u64 {
        self.payload_length_extra_bytes
            .unwrap_or(DEFAULT_PAYLOAD_LENGTH_EXTRA_BYTES)
    }

    /// `dSHA-512(var_int(version) ‖ var_int(stream) ‖ ripe)`.
    fn tag_material(&self) -> [u8; 64] {
        let ripe = self.ripe();
        let mut preimage = Vec::with_capacity(18 + Ripe::LEN);
        preimage.extend_from_slice(&var_int::encode(self.version));
        preimage.extend_from_slice(&var_int::encode(self.stream));
        preimage.extend_from_slice(ripe.as_bytes());
        double_sha512(&preimage)
    }

    fn derived_keypair(&self) -> Result<(PrivateKey, PublicKey)> {
        let material = self.tag_material();
        let mut seed = [0u8; 32];
        seed.copy_from_slice(&material[..32]);
        let private = PrivateKey::from_bytes(&seed)?;
        let public = private.public_key();
        Ok((private, public))
    }
}

// Debug shows only public routing information, never key material.
impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Address")
            .field("version", &self.version)
            .field("stream", &self.stream)
            .field("ripe", &self.ripe().to_string())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
