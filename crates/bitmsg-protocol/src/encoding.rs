//! Message-content encodings.
//!
//! The `msg` and `broadcast` cleartexts carry a `var_int` encoding
//! discriminator ahead of the message bytes:
//!
//! - `IGNORE` (0) — no content; receivers discard the bytes.
//! - `TRIVIAL` (1) — plain UTF-8, no subject.
//! - `SIMPLE` (2) — UTF-8 of `Subject:<s>\nBody:<m>`.

use bitmsg_types::{BitmsgError, Result};
use serde::{Deserialize, Serialize};

const SUBJECT_PREFIX: &str = "Subject:";
const BODY_SEPARATOR: &str = "\nBody:";

// ---------------------------------------------------------------------------
// MsgEncoding
// ---------------------------------------------------------------------------

/// Content encoding of a message body.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[repr(u64)]
pub enum MsgEncoding {
    /// Content-free message; any bytes present are ignored.
    Ignore = 0,
    /// Plain UTF-8 message without a subject.
    #[default]
    Trivial = 1,
    /// UTF-8 message with a `Subject:`/`Body:` split.
    Simple = 2,
}

impl MsgEncoding {
    /// Converts a wire-level value into an encoding, if known.
    pub fn from_u64(value: u64) -> Option<Self> {
        match value {
            0 => Some(Self::Ignore),
            1 => Some(Self::Trivial),
            2 => Some(Self::Simple),
            _ => None,
        }
    }

    /// Returns the wire-level value for this encoding.
    pub fn as_u64(self) -> u64 {
        self as u64
    }
}

// ---------------------------------------------------------------------------
// Pack / unpack
// ---------------------------------------------------------------------------

/// Content of a decoded message body.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Content {
    /// Subject line; empty unless the encoding carries one.
    pub subject: String,
    /// Message text; empty for `IGNORE`.
    pub message: String,
}

/// Serializes message content under the given encoding.
///
/// An absent message is treated as empty. The subject only matters for
/// [`MsgEncoding::Simple`]; other encodings drop it.
pub fn pack(encoding: MsgEncoding, subject: Option<&str>, message: Option<&str>) -> Vec<u8> {
    let message = message.unwrap_or("");
    match encoding {
        MsgEncoding::Ignore => Vec::new(),
        MsgEncoding::Trivial => message.as_bytes().to_vec(),
        MsgEncoding::Simple => format!(
            "{SUBJECT_PREFIX}{}{BODY_SEPARATOR}{message}",
            subject.unwrap_or(""),
        )
        .into_bytes(),
    }
}

/// Parses raw message bytes under the given encoding.
///
/// For [`MsgEncoding::Simple`], the text splits at the first
/// `\nBody:` after a leading `Subject:`; without that prefix the whole
/// text becomes the message and the subject stays empty.
///
/// # Errors
///
/// Returns [`BitmsgError::BadEncoding`] if a textual encoding carries
/// invalid UTF-8.
pub fn unpack(encoding: MsgEncoding, raw: &[u8]) -> Result<Content> {
    match encoding {
        MsgEncoding::Ignore => Ok(Content::default()),
        MsgEncoding::Trivial => Ok(Content {
            subject: String::new(),
            message: text(raw)?,
        }),
        MsgEncoding::Simple => {
            let text = text(raw)?;
            match text
                .strip_prefix(SUBJECT_PREFIX)
                .and_then(|rest| rest.split_once(BODY_SEPARATOR))
            {
                Some((subject, message)) => Ok(Content {
                    subject: subject.to_owned(),
                    message: message.to_owned(),
                }),
                None => Ok(Content {
                    subject: String::new(),
                    message: text,
                }),
            }
        }
    }
}

fn text(raw: &[u8]) -> Result<String> {
    String::from_utf8(raw.to_vec()).map_err(|e| BitmsgError::BadEncoding {
        reason: format!("message is not valid UTF-8: {e}"),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
