//! Object codecs for the four peer-to-peer payload types.
//!
//! Each codec composes the shared building blocks — the network frame,
//! the object envelope, the ECIES/ECDSA pipeline from
//! [`bitmsg_crypto`], and the proof-of-work driver — into whole-object
//! encode and decode operations:
//!
//! - [`objects::getpubkey`] — request for an unknown public key
//! - [`objects::pubkey`] — publication of a sender's keys
//! - [`objects::msg`] — directed, encrypted, signed message
//! - [`objects::broadcast`] — signed message to subscribers
//!
//! All public codec operations are `async`; the proof-of-work search
//! runs on a blocking worker and is the long suspension point of every
//! encode. Objects are value-typed: decoders never mutate their input
//! and encoders return freshly allocated buffers.
//!
//! # Modules
//!
//! - [`message`] — network message framing (magic, command, checksum)
//! - [`object`] — object envelope: header codec and nonce handling
//! - [`pow`] — proof-of-work target, search, and validation
//! - [`encoding`] — message-content encodings (ignore/trivial/simple)
//! - [`candidates`] — candidate address sets for decode routing
//! - [`objects`] — the four object codecs

pub mod candidates;
pub mod encoding;
pub mod message;
pub mod object;
pub mod objects;
pub mod pow;

pub use candidates::Candidates;
pub use encoding::MsgEncoding;
pub use object::{DecodeOpts, ObjectHeader, MAX_OBJECT_PAYLOAD};
