//! `msg` — directed, encrypted, signed message.
//!
//! Only object version 1 exists. The whole type-specific payload is an
//! ECIES blob encrypted to the recipient's encryption key; the
//! cleartext carries the sender's identity block, the content, an
//! acknowledgement payload, and a signature over the object header and
//! the body.
//!
//! Receivers do not know which of their identities a `msg` targets
//! until one of them decrypts it, so decoding tries each candidate
//! identity in the caller's order and commits to the first success.

use bitmsg_crypto::{ecies, signing, Address};
use bitmsg_types::{var_int, BitmsgError, ObjectType, PubkeyBitfield, Result, Ripe};

use crate::candidates::Candidates;
use crate::encoding::{self, MsgEncoding};
use crate::message;
use crate::object::{self, ObjectHeader};
use crate::objects::{expect_type, expect_version, read_pubkey, try_decrypt, write_pubkey, Reader};
use crate::pow::Difficulty;

/// The only defined `msg` object version.
const MSG_VERSION: u64 = 1;

// ---------------------------------------------------------------------------
// Encode
// ---------------------------------------------------------------------------

/// Options for encoding a `msg` object.
#[derive(Clone, Debug)]
pub struct EncodeOpts<'a> {
    /// Seconds until the object expires.
    pub ttl: u64,
    /// The sending identity; must hold its signing private key.
    pub from: &'a Address,
    /// The recipient; only their public keys are needed.
    pub to: &'a Address,
    /// Message text. Absent is treated as empty.
    pub message: Option<&'a str>,
    /// Subject line, used by [`MsgEncoding::Simple`] only.
    pub subject: Option<&'a str>,
    /// Content encoding; defaults to [`MsgEncoding::Trivial`].
    pub encoding: MsgEncoding,
    /// Advertise network-default difficulty instead of the sender's
    /// own demands. Only meaningful for sender versions ≥ 3.
    pub friend: bool,
    /// Prepend a zero nonce instead of searching for one.
    pub skip_pow: bool,
}

/// Encodes a framed `msg` message.
pub async fn encode(opts: &EncodeOpts<'_>) -> Result<Vec<u8>> {
    let payload = encode_payload(opts).await?;
    message::encode(message::OBJECT_COMMAND, &payload)
}

/// Encodes a `msg` object payload, nonce included.
///
/// The proof-of-work target honors the recipient's advertised
/// difficulty parameters.
pub async fn encode_payload(opts: &EncodeOpts<'_>) -> Result<Vec<u8>> {
    let from = opts.from;
    expect_version(from.version, 2..=4)?;

    let expires = object::expires_from_ttl(opts.ttl);
    let header = object::header_without_nonce(
        expires,
        ObjectType::Msg,
        MSG_VERSION,
        opts.to.stream,
    );

    let body = build_body(opts)?;

    let mut signed = header.clone();
    signed.extend_from_slice(&body);
    let signature = signing::sign(from.signing_private()?, &signed)?;

    let mut cleartext = body;
    cleartext.extend_from_slice(&var_int::encode(signature.len() as u64));
    cleartext.extend_from_slice(&signature);

    let ciphertext = ecies::encrypt(&opts.to.encryption_public, &cleartext)?;

    let mut obj = header;
    obj.extend_from_slice(&ciphertext);

    let difficulty = Difficulty {
        nonce_trials_per_byte: opts.to.nonce_trials(),
        payload_length_extra_bytes: opts.to.extra_bytes(),
    };
    object::prepend_nonce(obj, opts.ttl, &difficulty, opts.skip_pow).await
}

/// Builds the cleartext body up to (and excluding) the signature.
fn build_body(opts: &EncodeOpts<'_>) -> Result<Vec<u8>> {
    let from = opts.from;

    let mut body = Vec::new();
    body.extend_from_slice(&var_int::encode(from.version));
    body.extend_from_slice(&var_int::encode(from.stream));
    write_pubkey(&mut body, from);
    if from.version >= 3 {
        let (trials, extra) = if opts.friend {
            (
                crate::pow::DEFAULT_NONCE_TRIALS_PER_BYTE,
                crate::pow::DEFAULT_PAYLOAD_LENGTH_EXTRA_BYTES,
            )
        } else {
            (from.nonce_trials(), from.extra_bytes())
        };
        body.extend_from_slice(&var_int::encode(trials));
        body.extend_from_slice(&var_int::encode(extra));
    }
    // The destination ripe guards against a message accidentally
    // decrypting under the wrong identity's key.
    body.extend_from_slice(opts.to.ripe().as_bytes());
    body.extend_from_slice(&var_int::encode(opts.encoding.as_u64()));

    let content = encoding::pack(opts.encoding, opts.subject, opts.message);
    body.extend_from_slice(&var_int::encode(content.len() as u64));
    body.extend_from_slice(&content);

    // TODO: carry a real acknowledgement object once the ack pipeline
    // exists; until then the ack is always empty.
    body.extend_from_slice(&var_int::encode(0));

    Ok(body)
}

// ---------------------------------------------------------------------------
// Decode
// ---------------------------------------------------------------------------

/// Options for decoding a `msg` object.
#[derive(Clone, Debug)]
pub struct MsgDecodeOpts<'a> {
    /// Envelope acceptance options.
    pub envelope: object::DecodeOpts,
    /// Candidate recipient identities, tried in order.
    pub identities: Candidates<'a>,
}

/// A decoded `msg` object.
#[derive(Clone, Debug)]
pub struct Decoded {
    /// The common object header.
    pub header: ObjectHeader,
    /// Sender address version, from the cleartext.
    pub sender_version: u64,
    /// Sender stream, from the cleartext.
    pub sender_stream: u64,
    /// Sender's advertised feature flags.
    pub behavior: PubkeyBitfield,
    /// Sender's signing public key, full SEC form.
    pub signing_key: bitmsg_crypto::PublicKey,
    /// Sender's encryption public key, full SEC form.
    pub encryption_key: bitmsg_crypto::PublicKey,
    /// Sender's demanded nonce trials (sender versions ≥ 3).
    pub nonce_trials_per_byte: Option<u64>,
    /// Sender's demanded payload padding (sender versions ≥ 3).
    pub payload_length_extra_bytes: Option<u64>,
    /// The recipient ripe from the cleartext; always equals the
    /// decrypting identity's ripe.
    pub ripe: Ripe,
    /// Content encoding.
    pub encoding: MsgEncoding,
    /// Subject line; empty unless the encoding carries one.
    pub subject: String,
    /// Message text.
    pub message: String,
    /// Raw acknowledgement payload. Neither validated nor POW-checked.
    pub ack: Vec<u8>,
    /// DER signature over header and body.
    pub signature: Vec<u8>,
    /// The identity that decrypted the object.
    pub identity: Address,
    /// Octets of type-specific payload consumed (the whole ECIES blob).
    pub length: usize,
}

/// Decodes a framed `msg` message.
pub async fn decode(buf: &[u8], opts: &MsgDecodeOpts<'_>) -> Result<Decoded> {
    let frame = message::decode(buf)?;
    if frame.command != message::OBJECT_COMMAND {
        return Err(BitmsgError::BadCommand {
            command: frame.command,
        });
    }
    decode_payload(&frame.payload, opts).await
}

/// Decodes a `msg` object payload.
///
/// Identities are tried in the caller's order; every per-identity
/// decryption failure is swallowed and only an aggregated
/// [`BitmsgError::DecryptFailed`] surfaces when none succeed.
pub async fn decode_payload(buf: &[u8], opts: &MsgDecodeOpts<'_>) -> Result<Decoded> {
    let (header, payload) = object::decode_payload(buf, &opts.envelope)?;
    expect_type(&header, ObjectType::Msg)?;
    expect_version(header.version, MSG_VERSION..=MSG_VERSION)?;

    let (identity, cleartext) = try_decrypt(
        opts.identities.iter(),
        |candidate| candidate.encryption_private().cloned(),
        payload,
    )?;

    let mut reader = Reader::new(&cleartext);
    let sender_version = reader.var_int()?;
    expect_version(sender_version, 2..=4)?;
    let sender_stream = reader.var_int()?;
    let keys = read_pubkey(&mut reader)?;
    let (nonce_trials_per_byte, payload_length_extra_bytes) = if sender_version >= 3 {
        (Some(reader.var_int()?), Some(reader.var_int()?))
    } else {
        (None, None)
    };

    let ripe = Ripe::from_slice(reader.take(Ripe::LEN, "recipient ripe")?)?;
    if ripe != identity.ripe() {
        return Err(BitmsgError::RipeMismatch {
            expected: identity.ripe(),
            actual: ripe,
        });
    }

    let encoding_value = reader.var_int()?;
    let encoding =
        MsgEncoding::from_u64(encoding_value).ok_or_else(|| BitmsgError::BadEncoding {
            reason: format!("unknown content encoding {encoding_value}"),
        })?;
    let content_raw = reader.var_bytes("message")?;
    let ack = reader.var_bytes("ack")?.to_vec();
    let body_len = reader.position();
    let signature = reader.var_bytes("signature")?.to_vec();

    let mut signed = buf[8..header.payload_offset()].to_vec();
    signed.extend_from_slice(&cleartext[..body_len]);
    signing::verify(&keys.signing_key, &signed, &signature)?;

    let content = encoding::unpack(encoding, content_raw)?;

    Ok(Decoded {
        header,
        sender_version,
        sender_stream,
        behavior: keys.behavior,
        signing_key: keys.signing_key,
        encryption_key: keys.encryption_key,
        nonce_trials_per_byte,
        payload_length_extra_bytes,
        ripe,
        encoding,
        subject: content.subject,
        message: content.message,
        ack,
        signature,
        identity: identity.clone(),
        length: payload.len(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use bitmsg_crypto::keys::PrivateKey;

    fn address(version: u64, seed: u8) -> Address {
        let signing = PrivateKey::from_bytes(&[seed; 32]).unwrap();
        let encryption = PrivateKey::from_bytes(&[seed.wrapping_add(1); 32]).unwrap();
        Address::from_secrets(version, 1, signing, encryption)
    }

    fn encode_opts<'a>(from: &'a Address, to: &'a Address) -> EncodeOpts<'a> {
        EncodeOpts {
            ttl: 300,
            from,
            to,
            message: Some("hello"),
            subject: None,
            encoding: MsgEncoding::default(),
            friend: false,
            skip_pow: true,
        }
    }

    fn decode_opts(identities: Candidates<'_>) -> MsgDecodeOpts<'_> {
        MsgDecodeOpts {
            envelope: object::DecodeOpts::default(),
            identities,
        }
    }

    #[tokio::test]
    async fn trivial_roundtrip() -> Result<()> {
        let from = address(4, 0x20);
        let to = address(4, 0x40);
        let payload = encode_payload(&encode_opts(&from, &to)).await?;

        let decoded = decode_payload(&payload, &decode_opts(Candidates::One(&to))).await?;

        assert_eq!(decoded.sender_version, 4);
        assert_eq!(decoded.sender_stream, from.stream);
        assert_eq!(decoded.signing_key, from.signing_public);
        assert_eq!(decoded.encryption_key, from.encryption_public);
        assert_eq!(decoded.ripe, to.ripe());
        assert_eq!(decoded.message, "hello");
        assert!(decoded.subject.is_empty());
        assert!(decoded.ack.is_empty());
        assert_eq!(decoded.encoding, MsgEncoding::Trivial);
        Ok(())
    }

    #[tokio::test]
    async fn object_stream_is_the_recipients_not_the_senders() -> Result<()> {
        let signing = PrivateKey::from_bytes(&[0x20; 32]).unwrap();
        let encryption = PrivateKey::from_bytes(&[0x21; 32]).unwrap();
        let from = Address::from_secrets(4, 3, signing, encryption);

        let signing = PrivateKey::from_bytes(&[0x40; 32]).unwrap();
        let encryption = PrivateKey::from_bytes(&[0x41; 32]).unwrap();
        let to = Address::from_secrets(4, 7, signing, encryption);

        let payload = encode_payload(&encode_opts(&from, &to)).await?;
        let decoded = decode_payload(&payload, &decode_opts(Candidates::One(&to))).await?;

        // The object gossips in the recipient's stream; the cleartext
        // still names the sender's own stream.
        assert_eq!(decoded.header.stream, to.stream);
        assert_eq!(decoded.header.stream, 7);
        assert_eq!(decoded.sender_stream, from.stream);
        assert_eq!(decoded.sender_stream, 3);
        Ok(())
    }

    #[tokio::test]
    async fn wrong_identity_fails_decrypt_after_all_candidates() -> Result<()> {
        let from = address(4, 0x20);
        let to = address(4, 0x40);
        let strangers = vec![address(4, 0x60), address(4, 0x80)];
        let payload = encode_payload(&encode_opts(&from, &to)).await?;

        assert!(matches!(
            decode_payload(&payload, &decode_opts(Candidates::Many(&strangers))).await,
            Err(BitmsgError::DecryptFailed { attempts: 2 }),
        ));
        Ok(())
    }

    #[tokio::test]
    async fn v2_sender_omits_difficulty() -> Result<()> {
        let from = address(2, 0x20);
        let to = address(4, 0x40);
        let payload = encode_payload(&encode_opts(&from, &to)).await?;

        let decoded = decode_payload(&payload, &decode_opts(Candidates::One(&to))).await?;
        assert_eq!(decoded.nonce_trials_per_byte, None);
        assert_eq!(decoded.payload_length_extra_bytes, None);
        Ok(())
    }

    #[tokio::test]
    async fn friend_advertises_default_difficulty() -> Result<()> {
        let mut from = address(3, 0x20);
        from.nonce_trials_per_byte = Some(5000);
        let to = address(4, 0x40);

        let mut opts = encode_opts(&from, &to);
        opts.friend = true;
        let payload = encode_payload(&opts).await?;

        let decoded = decode_payload(&payload, &decode_opts(Candidates::One(&to))).await?;
        assert_eq!(
            decoded.nonce_trials_per_byte,
            Some(crate::pow::DEFAULT_NONCE_TRIALS_PER_BYTE),
        );
        Ok(())
    }

    #[tokio::test]
    async fn tampered_ciphertext_fails_decrypt() -> Result<()> {
        let from = address(4, 0x20);
        let to = address(4, 0x40);
        let mut payload = encode_payload(&encode_opts(&from, &to)).await?;

        let last = payload.len() - 1;
        payload[last] ^= 0x01;

        assert!(matches!(
            decode_payload(&payload, &decode_opts(Candidates::One(&to))).await,
            Err(BitmsgError::DecryptFailed { attempts: 1 }),
        ));
        Ok(())
    }

    #[tokio::test]
    async fn framed_roundtrip() -> Result<()> {
        let from = address(4, 0x20);
        let to = address(4, 0x40);
        let framed = encode(&encode_opts(&from, &to)).await?;

        let decoded = decode(&framed, &decode_opts(Candidates::One(&to))).await?;
        assert_eq!(decoded.message, "hello");
        Ok(())
    }
}
