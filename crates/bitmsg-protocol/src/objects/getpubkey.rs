//! `getpubkey` — request for an unknown public key.
//!
//! The requester knows only the target's address, so the payload is
//! the bare routing handle: the 20-octet ripe for address versions 2
//! and 3, the 32-octet tag for version 4. No signature, no encryption.

use bitmsg_crypto::Address;
use bitmsg_types::{BitmsgError, ObjectType, Result, Ripe, Tag};

use crate::message;
use crate::object::{self, DecodeOpts, ObjectHeader};
use crate::objects::{expect_type, expect_version};
use crate::pow::Difficulty;

// ---------------------------------------------------------------------------
// Encode
// ---------------------------------------------------------------------------

/// Options for encoding a `getpubkey` object.
#[derive(Clone, Debug)]
pub struct EncodeOpts<'a> {
    /// Seconds until the object expires.
    pub ttl: u64,
    /// The address whose pubkey is requested.
    pub to: &'a Address,
    /// Prepend a zero nonce instead of searching for one.
    pub skip_pow: bool,
}

/// Encodes a framed `getpubkey` message.
pub async fn encode(opts: &EncodeOpts<'_>) -> Result<Vec<u8>> {
    let payload = encode_payload(opts).await?;
    message::encode(message::OBJECT_COMMAND, &payload)
}

/// Encodes a `getpubkey` object payload, nonce included.
pub async fn encode_payload(opts: &EncodeOpts<'_>) -> Result<Vec<u8>> {
    let to = opts.to;
    expect_version(to.version, 2..=4)?;

    let expires = object::expires_from_ttl(opts.ttl);
    let mut obj =
        object::header_without_nonce(expires, ObjectType::Getpubkey, to.version, to.stream);
    if to.version >= 4 {
        obj.extend_from_slice(to.tag().as_bytes());
    } else {
        obj.extend_from_slice(to.ripe().as_bytes());
    }

    object::prepend_nonce(obj, opts.ttl, &Difficulty::default(), opts.skip_pow).await
}

// ---------------------------------------------------------------------------
// Decode
// ---------------------------------------------------------------------------

/// A decoded `getpubkey` request.
#[derive(Clone, Debug)]
pub struct Decoded {
    /// The common object header.
    pub header: ObjectHeader,
    /// The requested identity's ripe (versions 2 and 3).
    pub ripe: Option<Ripe>,
    /// The requested identity's tag (version 4).
    pub tag: Option<Tag>,
    /// Octets of type-specific payload consumed.
    pub length: usize,
}

/// Decodes a framed `getpubkey` message.
pub async fn decode(buf: &[u8], opts: &DecodeOpts) -> Result<Decoded> {
    let frame = message::decode(buf)?;
    if frame.command != message::OBJECT_COMMAND {
        return Err(BitmsgError::BadCommand {
            command: frame.command,
        });
    }
    decode_payload(&frame.payload, opts).await
}

/// Decodes a `getpubkey` object payload.
pub async fn decode_payload(buf: &[u8], opts: &DecodeOpts) -> Result<Decoded> {
    let (header, payload) = object::decode_payload(buf, opts)?;
    expect_type(&header, ObjectType::Getpubkey)?;
    expect_version(header.version, 2..=4)?;

    let (ripe, tag) = if header.version >= 4 {
        if payload.len() != Tag::LEN {
            return Err(BitmsgError::BadLength {
                reason: format!(
                    "getpubkey v4 expects a {}-octet tag, got {}",
                    Tag::LEN,
                    payload.len(),
                ),
            });
        }
        (None, Some(Tag::from_slice(payload)?))
    } else {
        if payload.len() != Ripe::LEN {
            return Err(BitmsgError::BadLength {
                reason: format!(
                    "getpubkey v{} expects a {}-octet ripe, got {}",
                    header.version,
                    Ripe::LEN,
                    payload.len(),
                ),
            });
        }
        (Some(Ripe::from_slice(payload)?), None)
    };

    Ok(Decoded {
        header,
        ripe,
        tag,
        length: payload.len(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
