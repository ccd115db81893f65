//! Object envelope: header codec and nonce handling.
//!
//! Every object payload begins with a common header:
//!
//! ```text
//! nonce(8) ‖ expires(8) ‖ type(4) ‖ var_int(version) ‖ var_int(stream) ‖ objectPayload
//! ```
//!
//! `header_length` counts the octets from `expires` up to (but not
//! including) `objectPayload`; signature verification reuses it
//! verbatim to reconstruct signed regions. The nonce is prepended last
//! on encode, once the proof-of-work search completes.

use bitmsg_types::{BitmsgError, ObjectType, Result};

use crate::pow::{self, Difficulty};

/// Maximum object payload length, nonce excluded.
pub const MAX_OBJECT_PAYLOAD: usize = 262_136;

/// Octets occupied by the POW nonce.
pub const NONCE_LEN: usize = 8;

/// Minimum framed-message length for [`object_type_hint`].
pub const TYPE_HINT_MIN_LEN: usize = 44;

/// Minimum payload length for [`payload_type_hint`].
pub const PAYLOAD_TYPE_HINT_MIN_LEN: usize = 20;

/// Default decode tolerance for objects already expired, in seconds.
pub const DEFAULT_PAST_TOLERANCE: u64 = 3 * 3600;

/// Default maximum accepted time-to-live, in seconds (28 days plus the
/// past tolerance, mirroring the relay acceptance rule).
pub const DEFAULT_MAX_FUTURE: u64 = 28 * 24 * 3600 + DEFAULT_PAST_TOLERANCE;

/// Current Unix time in seconds.
pub(crate) fn now() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

fn be_u64(bytes: &[u8]) -> u64 {
    let mut arr = [0u8; 8];
    arr.copy_from_slice(bytes);
    u64::from_be_bytes(arr)
}

fn be_u32(bytes: &[u8]) -> u32 {
    let mut arr = [0u8; 4];
    arr.copy_from_slice(bytes);
    u32::from_be_bytes(arr)
}

// ---------------------------------------------------------------------------
// Header encoding
// ---------------------------------------------------------------------------

/// Builds the object header without its nonce:
/// `expires(8) ‖ type(4) ‖ var_int(version) ‖ var_int(stream)`.
///
/// This exact byte sequence opens every signed region, so encoders
/// sign it and decoders reconstruct it from the wire.
pub fn header_without_nonce(
    expires: u64,
    object_type: ObjectType,
    version: u64,
    stream: u64,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(32);
    out.extend_from_slice(&expires.to_be_bytes());
    out.extend_from_slice(&object_type.as_u32().to_be_bytes());
    out.extend_from_slice(&bitmsg_types::var_int::encode(version));
    out.extend_from_slice(&bitmsg_types::var_int::encode(stream));
    out
}

/// Computes the absolute expiry for a time-to-live starting now.
pub fn expires_from_ttl(ttl: u64) -> u64 {
    now().saturating_add(ttl)
}

// ---------------------------------------------------------------------------
// Nonce
// ---------------------------------------------------------------------------

/// Prepends the POW nonce to a nonceless object payload.
///
/// With `skip_pow` the nonce is eight zero octets; otherwise the POW
/// driver searches for a valid nonce, which suspends the caller for
/// seconds to minutes depending on difficulty.
///
/// # Errors
///
/// - [`BitmsgError::PayloadTooLarge`] if the object exceeds
///   [`MAX_OBJECT_PAYLOAD`] — checked before any work is started.
/// - [`BitmsgError::PowCancelled`] if the search is cancelled.
pub async fn prepend_nonce(
    obj: Vec<u8>,
    ttl: u64,
    difficulty: &Difficulty,
    skip_pow: bool,
) -> Result<Vec<u8>> {
    if obj.len() > MAX_OBJECT_PAYLOAD {
        return Err(BitmsgError::PayloadTooLarge {
            size: obj.len(),
            max: MAX_OBJECT_PAYLOAD,
        });
    }

    let nonce = if skip_pow {
        0
    } else {
        let target = pow::target((obj.len() + NONCE_LEN) as u64, ttl, difficulty);
        pow::solve(target, &obj).await?
    };

    let mut out = Vec::with_capacity(NONCE_LEN + obj.len());
    out.extend_from_slice(&nonce.to_be_bytes());
    out.extend_from_slice(&obj);
    Ok(out)
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Acceptance options for [`decode_payload`].
#[derive(Clone, Debug)]
pub struct DecodeOpts {
    /// Object types the caller is interested in; `None` accepts all
    /// four known types.
    pub allowed_types: Option<Vec<ObjectType>>,
    /// How long after expiry an object is still accepted, seconds.
    pub past_tolerance: u64,
    /// How far into the future an expiry may lie, seconds.
    pub max_future: u64,
}

impl Default for DecodeOpts {
    fn default() -> Self {
        Self {
            allowed_types: None,
            past_tolerance: DEFAULT_PAST_TOLERANCE,
            max_future: DEFAULT_MAX_FUTURE,
        }
    }
}

/// The parsed common header of an object payload.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ObjectHeader {
    /// POW nonce, big-endian u64 on the wire.
    pub nonce: u64,
    /// Absolute expiry, Unix seconds.
    pub expires: u64,
    /// The object type.
    pub object_type: ObjectType,
    /// Object version (meaning depends on the type).
    pub version: u64,
    /// Stream the object gossips in.
    pub stream: u64,
    /// Octets from `expires` up to the type-specific payload.
    pub header_length: usize,
}

impl ObjectHeader {
    /// Offset of the type-specific payload within the full object
    /// payload buffer (nonce included).
    pub fn payload_offset(&self) -> usize {
        NONCE_LEN + self.header_length
    }

    /// Remaining time-to-live, negative once expired.
    pub fn ttl(&self) -> i64 {
        self.expires as i64 - now() as i64
    }
}

/// Parses the envelope of an object payload, delivering the
/// type-specific payload as a sub-slice of the input.
///
/// # Errors
///
/// - [`BitmsgError::BadLength`] if the buffer ends inside the header.
/// - [`BitmsgError::ExpiresOutOfRange`] if the expiry lies outside
///   `[now − past_tolerance, now + max_future]`.
/// - [`BitmsgError::WrongType`] if the type value is unknown, or known
///   but filtered out by `opts.allowed_types`.
pub fn decode_payload<'a>(buf: &'a [u8], opts: &DecodeOpts) -> Result<(ObjectHeader, &'a [u8])> {
    if buf.len() < PAYLOAD_TYPE_HINT_MIN_LEN {
        return Err(BitmsgError::BadLength {
            reason: format!(
                "object payload of {} octets ends inside the fixed header",
                buf.len(),
            ),
        });
    }

    let nonce = be_u64(&buf[0..8]);
    let expires = be_u64(&buf[8..16]);
    let type_value = be_u32(&buf[16..20]);

    let now = now();
    if expires < now.saturating_sub(opts.past_tolerance)
        || expires > now.saturating_add(opts.max_future)
    {
        return Err(BitmsgError::ExpiresOutOfRange { expires, now });
    }

    let object_type =
        ObjectType::from_u32(type_value).ok_or_else(|| BitmsgError::WrongType {
            expected: "a known object type".into(),
            actual: type_value,
        })?;
    if let Some(allowed) = &opts.allowed_types {
        if !allowed.contains(&object_type) {
            return Err(BitmsgError::WrongType {
                expected: allowed
                    .iter()
                    .map(ObjectType::to_string)
                    .collect::<Vec<_>>()
                    .join(" or "),
                actual: type_value,
            });
        }
    }

    let version_int = bitmsg_types::var_int::decode(&buf[20..])?;
    let stream_int = bitmsg_types::var_int::decode(&buf[20 + version_int.length..])?;
    let header_length = 8 + 4 + version_int.length + stream_int.length;

    let header = ObjectHeader {
        nonce,
        expires,
        object_type,
        version: version_int.value,
        stream: stream_int.value,
        header_length,
    };
    Ok((header, &buf[header.payload_offset()..]))
}

// ---------------------------------------------------------------------------
// Dispatch hints
// ---------------------------------------------------------------------------

/// Reads the object type out of a *framed* message without validating
/// anything. A fast dispatch hint; absent when the buffer is shorter
/// than [`TYPE_HINT_MIN_LEN`].
pub fn object_type_hint(framed: &[u8]) -> Option<u32> {
    if framed.len() < TYPE_HINT_MIN_LEN {
        return None;
    }
    Some(be_u32(&framed[40..44]))
}

/// Reads the object type out of a bare object payload without
/// validating anything; absent when shorter than
/// [`PAYLOAD_TYPE_HINT_MIN_LEN`].
pub fn payload_type_hint(payload: &[u8]) -> Option<u32> {
    if payload.len() < PAYLOAD_TYPE_HINT_MIN_LEN {
        return None;
    }
    Some(be_u32(&payload[16..20]))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
