//! Network message framing.
//!
//! Every object travels inside a fixed 24-octet frame:
//!
//! ```text
//! magic(4) ‖ command(12, NUL-padded ASCII) ‖ length(4 BE) ‖ checksum(4) ‖ payload
//! ```
//!
//! where the checksum is the first four octets of SHA-512(payload).
//! The frame is an opaque wrapper around object payloads; whether the
//! command is the one a codec expects is checked by the codec, which
//! knows what it is looking for.

use bitmsg_crypto::hash::sha512;
use bitmsg_types::{BitmsgError, Result};

/// Network magic announcing a frame boundary.
pub const MAGIC: u32 = 0xE9BE_B4D9;

/// Fixed length of the command field.
pub const COMMAND_LEN: usize = 12;

/// Total frame header length.
pub const HEADER_LEN: usize = 24;

/// The command under which all object payloads travel.
pub const OBJECT_COMMAND: &str = "object";

/// A decoded frame: the command and its freshly copied payload.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DecodedMessage {
    /// The frame command, trailing NULs stripped.
    pub command: String,
    /// The frame payload.
    pub payload: Vec<u8>,
}

/// Frames a payload under the given command.
///
/// # Errors
///
/// Returns [`BitmsgError::BadCommand`] if the command is longer than
/// [`COMMAND_LEN`] or not printable ASCII.
pub fn encode(command: &str, payload: &[u8]) -> Result<Vec<u8>> {
    if command.len() > COMMAND_LEN || !command.bytes().all(|b| b.is_ascii_graphic()) {
        return Err(BitmsgError::BadCommand {
            command: command.to_owned(),
        });
    }

    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&MAGIC.to_be_bytes());
    out.extend_from_slice(command.as_bytes());
    out.resize(4 + COMMAND_LEN, 0);
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(&sha512(payload)[..4]);
    out.extend_from_slice(payload);
    Ok(out)
}

/// Parses a frame, validating magic, length, and checksum.
///
/// # Errors
///
/// Returns [`BitmsgError::BadLength`] if the buffer is shorter than a
/// frame header, the declared length disagrees with the buffer, the
/// magic is wrong, or the checksum does not match.
pub fn decode(buf: &[u8]) -> Result<DecodedMessage> {
    if buf.len() < HEADER_LEN {
        return Err(BitmsgError::BadLength {
            reason: format!(
                "frame of {} octets is shorter than the {}-octet header",
                buf.len(),
                HEADER_LEN,
            ),
        });
    }

    let magic = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
    if magic != MAGIC {
        return Err(BitmsgError::BadLength {
            reason: format!("bad frame magic 0x{magic:08x}"),
        });
    }

    let command_bytes = &buf[4..4 + COMMAND_LEN];
    let command_end = command_bytes
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(COMMAND_LEN);
    let command = std::str::from_utf8(&command_bytes[..command_end])
        .map_err(|_| BitmsgError::BadCommand {
            command: String::from_utf8_lossy(command_bytes).into_owned(),
        })?
        .to_owned();

    let declared = u32::from_be_bytes([buf[16], buf[17], buf[18], buf[19]]) as usize;
    let payload = &buf[HEADER_LEN..];
    if payload.len() != declared {
        return Err(BitmsgError::BadLength {
            reason: format!(
                "frame declares {declared} payload octets but carries {}",
                payload.len(),
            ),
        });
    }

    let checksum = &buf[20..24];
    if checksum != &sha512(payload)[..4] {
        return Err(BitmsgError::BadLength {
            reason: "frame checksum mismatch".into(),
        });
    }

    Ok(DecodedMessage {
        command,
        payload: payload.to_vec(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
