//! The four object codecs and their shared parsing helpers.
//!
//! Every codec follows the same pipeline. Encode: build the cleartext
//! body, compose the object header without its nonce, sign, optionally
//! encrypt, then suspend on the proof-of-work search and prepend the
//! nonce. Decode: split header and payload, optionally decrypt with one
//! of several candidate keys, parse the cleartext, reconstruct the
//! signed region, and verify the signature.

pub mod broadcast;
pub mod getpubkey;
pub mod msg;
pub mod pubkey;

use bitmsg_crypto::keys::{PrivateKey, PublicKey, WIRE_PUBLIC_KEY_LEN};
use bitmsg_crypto::{ecies, Address};
use bitmsg_types::{var_int, BitmsgError, PubkeyBitfield, Result};

use crate::object::ObjectHeader;

// ---------------------------------------------------------------------------
// Wire reader
// ---------------------------------------------------------------------------

/// Forward-only reader over a wire buffer.
///
/// Keeps track of the consumed prefix so codecs can report the exact
/// number of octets a parse used and slice out signed regions.
pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Octets consumed so far.
    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    /// Takes `len` octets, or fails with the field name in the error.
    pub(crate) fn take(&mut self, len: usize, field: &str) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(len).filter(|&end| end <= self.buf.len());
        match end {
            Some(end) => {
                let out = &self.buf[self.pos..end];
                self.pos = end;
                Ok(out)
            }
            None => Err(BitmsgError::BadLength {
                reason: format!(
                    "buffer ends inside {field}: need {len} octets at offset {}, have {}",
                    self.pos,
                    self.buf.len() - self.pos,
                ),
            }),
        }
    }

    /// Decodes a `var_int` at the current position.
    pub(crate) fn var_int(&mut self) -> Result<u64> {
        let decoded = var_int::decode(&self.buf[self.pos..])?;
        self.pos += decoded.length;
        Ok(decoded.value)
    }

    /// Takes a `var_int`-length-prefixed byte run.
    pub(crate) fn var_bytes(&mut self, field: &str) -> Result<&'a [u8]> {
        let len = self.var_int()?;
        let len = usize::try_from(len).map_err(|_| BitmsgError::BadLength {
            reason: format!("{field} length {len} does not fit in memory"),
        })?;
        self.take(len, field)
    }
}

// ---------------------------------------------------------------------------
// Pubkey body extraction
// ---------------------------------------------------------------------------

/// The fixed 132-octet pubkey block shared by `pubkey`, `msg`, and
/// `broadcast` bodies, with the stripped `0x04` prefixes restored.
#[derive(Clone, Debug)]
pub struct ExtractedPubkey {
    /// Advertised feature flags.
    pub behavior: PubkeyBitfield,
    /// Signing public key, full SEC form.
    pub signing_key: PublicKey,
    /// Encryption public key, full SEC form.
    pub encryption_key: PublicKey,
    /// Octets consumed from the buffer (always 132).
    pub length: usize,
}

/// The extended pubkey block of version-3-and-later senders: the fixed
/// block followed by the two POW difficulty `var_int`s.
#[derive(Clone, Debug)]
pub struct ExtractedPubkeyV3 {
    /// The fixed block.
    pub base: ExtractedPubkey,
    /// Demanded nonce trials per octet.
    pub nonce_trials_per_byte: u64,
    /// Demanded payload length padding.
    pub payload_length_extra_bytes: u64,
    /// Octets consumed from the buffer.
    pub length: usize,
}

/// Parses `behavior(4) ‖ sign_pub(64) ‖ enc_pub(64)` from the front of
/// `buf`.
pub fn extract_pubkey(buf: &[u8]) -> Result<ExtractedPubkey> {
    let mut reader = Reader::new(buf);
    let extracted = read_pubkey(&mut reader)?;
    Ok(extracted)
}

/// Parses the extended block:
/// `behavior ‖ sign_pub ‖ enc_pub ‖ var_int(trials) ‖ var_int(extra)`.
pub fn extract_pubkey_v3(buf: &[u8]) -> Result<ExtractedPubkeyV3> {
    let mut reader = Reader::new(buf);
    let base = read_pubkey(&mut reader)?;
    let nonce_trials_per_byte = reader.var_int()?;
    let payload_length_extra_bytes = reader.var_int()?;
    Ok(ExtractedPubkeyV3 {
        base,
        nonce_trials_per_byte,
        payload_length_extra_bytes,
        length: reader.position(),
    })
}

pub(crate) fn read_pubkey(reader: &mut Reader<'_>) -> Result<ExtractedPubkey> {
    let start = reader.position();
    let mut behavior = [0u8; 4];
    behavior.copy_from_slice(reader.take(4, "behavior bitfield")?);
    let signing_key = PublicKey::from_wire(reader.take(WIRE_PUBLIC_KEY_LEN, "signing key")?)?;
    let encryption_key =
        PublicKey::from_wire(reader.take(WIRE_PUBLIC_KEY_LEN, "encryption key")?)?;
    Ok(ExtractedPubkey {
        behavior: PubkeyBitfield::new(behavior),
        signing_key,
        encryption_key,
        length: reader.position() - start,
    })
}

/// Appends the 132-octet pubkey block for an address.
pub(crate) fn write_pubkey(out: &mut Vec<u8>, address: &Address) {
    out.extend_from_slice(address.behavior.as_bytes());
    out.extend_from_slice(&address.signing_public.to_wire());
    out.extend_from_slice(&address.encryption_public.to_wire());
}

// ---------------------------------------------------------------------------
// Candidate trial decryption
// ---------------------------------------------------------------------------

/// Tries each candidate's key against an ECIES blob, in order,
/// committing to the first that decrypts.
///
/// Per-candidate failures — a missing private key as much as a MAC
/// mismatch — are swallowed; only the aggregated
/// [`BitmsgError::DecryptFailed`] surfaces when every candidate fails.
pub(crate) fn try_decrypt<'a, I, F>(
    candidates: I,
    key_for: F,
    blob: &[u8],
) -> Result<(&'a Address, Vec<u8>)>
where
    I: Iterator<Item = &'a Address>,
    F: Fn(&Address) -> Result<PrivateKey>,
{
    let mut attempts = 0usize;
    for candidate in candidates {
        attempts += 1;
        let key = match key_for(candidate) {
            Ok(key) => key,
            Err(error) => {
                tracing::debug!(%error, attempt = attempts, "candidate has no usable key");
                continue;
            }
        };
        match ecies::decrypt(&key, blob) {
            Ok(cleartext) => return Ok((candidate, cleartext)),
            Err(error) => {
                tracing::debug!(%error, attempt = attempts, "candidate decryption failed");
            }
        }
    }
    Err(BitmsgError::DecryptFailed { attempts })
}

// ---------------------------------------------------------------------------
// Envelope assertions
// ---------------------------------------------------------------------------

/// Asserts the decoded header carries the type the codec expects.
pub(crate) fn expect_type(
    header: &ObjectHeader,
    expected: bitmsg_types::ObjectType,
) -> Result<()> {
    if header.object_type != expected {
        return Err(BitmsgError::WrongType {
            expected: expected.to_string(),
            actual: header.object_type.as_u32(),
        });
    }
    Ok(())
}

/// Asserts an object or sender version lies in a codec's range.
pub(crate) fn expect_version(version: u64, range: std::ops::RangeInclusive<u64>) -> Result<()> {
    if !range.contains(&version) {
        return Err(BitmsgError::UnsupportedVersion { version });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
