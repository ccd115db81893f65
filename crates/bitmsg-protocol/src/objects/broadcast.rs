//! `broadcast` — signed message to subscribers.
//!
//! The encryption key is derived from the sender's address itself, so
//! anyone subscribed to the address can decrypt without ever having
//! exchanged keys:
//!
//! - **wire v4** (sender address v2/v3) — the payload is one ECIES
//!   blob; receivers try the derived key of every subscription with
//!   `version < 4`.
//! - **wire v5** (sender address v4) — a 32-octet tag prefixes the
//!   blob; receivers route by tag and decrypt with that subscription's
//!   derived key.
//!
//! On decode, the sender identity is rebuilt from the cleartext keys
//! and cross-checked against the matched subscription (ripe for v4,
//! tag for v5), so a blob cannot masquerade as a different sender.

use bitmsg_crypto::{ecies, signing, Address};
use bitmsg_types::{var_int, BitmsgError, ObjectType, PubkeyBitfield, Result, Tag};

use crate::candidates::Candidates;
use crate::encoding::{self, MsgEncoding};
use crate::message;
use crate::object::{self, ObjectHeader};
use crate::objects::{expect_type, expect_version, read_pubkey, try_decrypt, write_pubkey, Reader};
use crate::pow::Difficulty;

/// Wire version for sender addresses below 4.
const BROADCAST_V4: u64 = 4;

/// Wire version for sender addresses 4 and later.
const BROADCAST_V5: u64 = 5;

// ---------------------------------------------------------------------------
// Encode
// ---------------------------------------------------------------------------

/// Options for encoding a `broadcast` object.
#[derive(Clone, Debug)]
pub struct EncodeOpts<'a> {
    /// Seconds until the object expires.
    pub ttl: u64,
    /// The broadcasting identity; must hold its signing private key.
    pub from: &'a Address,
    /// Message text. Absent is treated as empty.
    pub message: Option<&'a str>,
    /// Subject line, used by [`MsgEncoding::Simple`] only.
    pub subject: Option<&'a str>,
    /// Content encoding; defaults to [`MsgEncoding::Trivial`].
    pub encoding: MsgEncoding,
    /// Prepend a zero nonce instead of searching for one.
    pub skip_pow: bool,
}

/// Encodes a framed `broadcast` message.
pub async fn encode(opts: &EncodeOpts<'_>) -> Result<Vec<u8>> {
    let payload = encode_payload(opts).await?;
    message::encode(message::OBJECT_COMMAND, &payload)
}

/// Encodes a `broadcast` object payload, nonce included.
///
/// The wire version is 5 when `from.version ≥ 4`, else 4. The sender
/// is checked for self-consistency (its signing private key must match
/// its signing public key) before anything is signed.
pub async fn encode_payload(opts: &EncodeOpts<'_>) -> Result<Vec<u8>> {
    let from = opts.from;
    expect_version(from.version, 2..=4)?;
    if from.signing_private()?.public_key() != from.signing_public {
        return Err(BitmsgError::KeyMismatch {
            reason: "sender signing private key does not match its public key".into(),
        });
    }

    let wire_version = if from.version >= 4 {
        BROADCAST_V5
    } else {
        BROADCAST_V4
    };

    let expires = object::expires_from_ttl(opts.ttl);
    let header =
        object::header_without_nonce(expires, ObjectType::Broadcast, wire_version, from.stream);

    let mut body = Vec::new();
    body.extend_from_slice(&var_int::encode(from.version));
    body.extend_from_slice(&var_int::encode(from.stream));
    write_pubkey(&mut body, from);
    if from.version >= 3 {
        body.extend_from_slice(&var_int::encode(from.nonce_trials()));
        body.extend_from_slice(&var_int::encode(from.extra_bytes()));
    }
    body.extend_from_slice(&var_int::encode(opts.encoding.as_u64()));
    let content = encoding::pack(opts.encoding, opts.subject, opts.message);
    body.extend_from_slice(&var_int::encode(content.len() as u64));
    body.extend_from_slice(&content);

    let mut signed = header.clone();
    if wire_version == BROADCAST_V5 {
        signed.extend_from_slice(from.tag().as_bytes());
    }
    signed.extend_from_slice(&body);
    let signature = signing::sign(from.signing_private()?, &signed)?;

    let mut cleartext = body;
    cleartext.extend_from_slice(&var_int::encode(signature.len() as u64));
    cleartext.extend_from_slice(&signature);

    let (_, broadcast_public) = from.broadcast_keypair()?;
    let ciphertext = ecies::encrypt(&broadcast_public, &cleartext)?;

    let mut obj = header;
    if wire_version == BROADCAST_V5 {
        obj.extend_from_slice(from.tag().as_bytes());
    }
    obj.extend_from_slice(&ciphertext);

    object::prepend_nonce(obj, opts.ttl, &Difficulty::default(), opts.skip_pow).await
}

// ---------------------------------------------------------------------------
// Decode
// ---------------------------------------------------------------------------

/// Options for decoding a `broadcast` object.
#[derive(Clone, Debug)]
pub struct BroadcastDecodeOpts<'a> {
    /// Envelope acceptance options.
    pub envelope: object::DecodeOpts,
    /// Subscribed sender addresses. Wire v4 tries every subscription
    /// with `version < 4` in order; wire v5 routes by tag.
    pub subscriptions: Candidates<'a>,
}

/// A decoded `broadcast` object.
#[derive(Clone, Debug)]
pub struct Decoded {
    /// The common object header.
    pub header: ObjectHeader,
    /// Sender address version, from the cleartext.
    pub sender_version: u64,
    /// Sender stream, from the cleartext; equals `header.stream`.
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
    /// Content encoding.
    pub encoding: MsgEncoding,
    /// Subject line; empty unless the encoding carries one.
    pub subject: String,
    /// Message text.
    pub message: String,
    /// DER signature over header (and tag, for v5) and body.
    pub signature: Vec<u8>,
    /// The routing tag (wire v5 only).
    pub tag: Option<Tag>,
    /// The sender identity rebuilt from the cleartext keys.
    pub sender: Address,
    /// The subscription that matched.
    pub subscription: Address,
    /// Octets of type-specific payload consumed.
    pub length: usize,
}

/// Decodes a framed `broadcast` message.
pub async fn decode(buf: &[u8], opts: &BroadcastDecodeOpts<'_>) -> Result<Decoded> {
    let frame = message::decode(buf)?;
    if frame.command != message::OBJECT_COMMAND {
        return Err(BitmsgError::BadCommand {
            command: frame.command,
        });
    }
    decode_payload(&frame.payload, opts).await
}

/// Decodes a `broadcast` object payload.
pub async fn decode_payload(buf: &[u8], opts: &BroadcastDecodeOpts<'_>) -> Result<Decoded> {
    let (header, payload) = object::decode_payload(buf, &opts.envelope)?;
    expect_type(&header, ObjectType::Broadcast)?;
    expect_version(header.version, BROADCAST_V4..=BROADCAST_V5)?;

    let (tag, subscription, cleartext) = if header.version == BROADCAST_V5 {
        let mut reader = Reader::new(payload);
        let tag = Tag::from_slice(reader.take(Tag::LEN, "tag")?)?;
        let subscription = opts
            .subscriptions
            .find_by_tag(&tag)
            .ok_or(BitmsgError::NotInterested { tag })?;
        let (broadcast_private, _) = subscription.broadcast_keypair()?;
        let cleartext = ecies::decrypt(&broadcast_private, &payload[Tag::LEN..])?;
        (Some(tag), subscription, cleartext)
    } else {
        let (subscription, cleartext) = try_decrypt(
            opts.subscriptions.iter().filter(|a| a.version < 4),
            |candidate| candidate.broadcast_keypair().map(|(private, _)| private),
            payload,
        )?;
        (None, subscription, cleartext)
    };

    let mut reader = Reader::new(&cleartext);
    let sender_version = reader.var_int()?;
    if header.version == BROADCAST_V5 {
        expect_version(sender_version, 4..=4)?;
    } else {
        expect_version(sender_version, 2..=3)?;
    }
    let sender_stream = reader.var_int()?;
    if sender_stream != header.stream {
        return Err(BitmsgError::KeyMismatch {
            reason: format!(
                "cleartext sender stream {sender_stream} differs from object stream {}",
                header.stream,
            ),
        });
    }

    let keys = read_pubkey(&mut reader)?;
    let (nonce_trials_per_byte, payload_length_extra_bytes) = if sender_version >= 3 {
        (Some(reader.var_int()?), Some(reader.var_int()?))
    } else {
        (None, None)
    };

    let encoding_value = reader.var_int()?;
    let content_encoding =
        MsgEncoding::from_u64(encoding_value).ok_or_else(|| BitmsgError::BadEncoding {
            reason: format!("unknown content encoding {encoding_value}"),
        })?;
    let content_raw = reader.var_bytes("message")?;
    let body_len = reader.position();
    let signature = reader.var_bytes("signature")?.to_vec();

    // Rebuild the sender from the transported keys and require it to
    // be the identity the receiver matched on.
    let sender = Address::from_public_keys(
        sender_version,
        sender_stream,
        keys.behavior,
        keys.signing_key,
        keys.encryption_key,
    );
    match tag {
        Some(tag) => {
            if sender.tag() != tag {
                return Err(BitmsgError::KeyMismatch {
                    reason: format!(
                        "reconstructed sender tag {} differs from object tag {tag}",
                        sender.tag(),
                    ),
                });
            }
        }
        None => {
            if sender.ripe() != subscription.ripe() {
                return Err(BitmsgError::KeyMismatch {
                    reason: format!(
                        "reconstructed sender ripe {} differs from subscription ripe {}",
                        sender.ripe(),
                        subscription.ripe(),
                    ),
                });
            }
        }
    }

    let signed_wire_end = header.payload_offset() + tag.map_or(0, |_| Tag::LEN);
    let mut signed = buf[8..signed_wire_end].to_vec();
    signed.extend_from_slice(&cleartext[..body_len]);
    signing::verify(&keys.signing_key, &signed, &signature)?;

    let content = encoding::unpack(content_encoding, content_raw)?;

    Ok(Decoded {
        header,
        sender_version,
        sender_stream,
        behavior: keys.behavior,
        signing_key: keys.signing_key,
        encryption_key: keys.encryption_key,
        nonce_trials_per_byte,
        payload_length_extra_bytes,
        encoding: content_encoding,
        subject: content.subject,
        message: content.message,
        signature,
        tag,
        sender,
        subscription: subscription.clone(),
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

    fn encode_opts(from: &Address) -> EncodeOpts<'_> {
        EncodeOpts {
            ttl: 300,
            from,
            message: Some("to all subscribers"),
            subject: None,
            encoding: MsgEncoding::default(),
            skip_pow: true,
        }
    }

    fn decode_opts(subscriptions: Candidates<'_>) -> BroadcastDecodeOpts<'_> {
        BroadcastDecodeOpts {
            envelope: object::DecodeOpts::default(),
            subscriptions,
        }
    }

    #[tokio::test]
    async fn v5_roundtrip_by_tag() -> Result<()> {
        let from = address(4, 0x20);
        let payload = encode_payload(&encode_opts(&from)).await?;

        // The tag sits right behind the object header.
        let decoded = decode_payload(&payload, &decode_opts(Candidates::One(&from))).await?;
        let offset = decoded.header.payload_offset();
        assert_eq!(&payload[offset..offset + Tag::LEN], from.tag().as_bytes());

        assert_eq!(decoded.header.version, BROADCAST_V5);
        assert_eq!(decoded.sender_version, 4);
        assert_eq!(decoded.tag, Some(from.tag()));
        assert_eq!(decoded.sender.tag(), from.tag());
        assert_eq!(decoded.message, "to all subscribers");
        Ok(())
    }

    #[tokio::test]
    async fn v4_roundtrip_by_trial_decryption() -> Result<()> {
        let from = address(3, 0x20);
        let payload = encode_payload(&encode_opts(&from)).await?;

        // Subscriptions carry only public halves; the broadcast key is
        // derivable from them alone.
        let subscriptions = vec![
            Address::from_public_keys(
                3,
                1,
                from.behavior,
                address(3, 0x60).signing_public,
                address(3, 0x60).encryption_public,
            ),
            Address::from_public_keys(
                3,
                1,
                from.behavior,
                from.signing_public,
                from.encryption_public,
            ),
        ];

        let decoded =
            decode_payload(&payload, &decode_opts(Candidates::Many(&subscriptions))).await?;
        assert_eq!(decoded.header.version, BROADCAST_V4);
        assert_eq!(decoded.tag, None);
        assert_eq!(decoded.sender.ripe(), from.ripe());
        assert_eq!(decoded.subscription.ripe(), from.ripe());
        Ok(())
    }

    #[tokio::test]
    async fn v5_unmatched_tag_is_not_interested() -> Result<()> {
        let from = address(4, 0x20);
        let stranger = address(4, 0x40);
        let payload = encode_payload(&encode_opts(&from)).await?;

        assert!(matches!(
            decode_payload(&payload, &decode_opts(Candidates::One(&stranger))).await,
            Err(BitmsgError::NotInterested { tag }) if tag == from.tag(),
        ));
        Ok(())
    }

    #[tokio::test]
    async fn v4_no_matching_subscription_fails_decrypt() -> Result<()> {
        let from = address(3, 0x20);
        let strangers = vec![address(3, 0x40), address(2, 0x60)];
        let payload = encode_payload(&encode_opts(&from)).await?;

        assert!(matches!(
            decode_payload(&payload, &decode_opts(Candidates::Many(&strangers))).await,
            Err(BitmsgError::DecryptFailed { attempts: 2 }),
        ));
        Ok(())
    }

    #[tokio::test]
    async fn v4_skips_high_version_subscriptions() -> Result<()> {
        let from = address(3, 0x20);
        let payload = encode_payload(&encode_opts(&from)).await?;

        // A v4 subscription is never tried for a wire-v4 broadcast,
        // even if it is the only candidate.
        let v4_only = vec![address(4, 0x40)];
        assert!(matches!(
            decode_payload(&payload, &decode_opts(Candidates::Many(&v4_only))).await,
            Err(BitmsgError::DecryptFailed { attempts: 0 }),
        ));
        Ok(())
    }

    #[tokio::test]
    async fn inconsistent_sender_rejected_on_encode() {
        let mut from = address(4, 0x20);
        from.signing_public = address(4, 0x60).signing_public;

        assert!(matches!(
            encode_payload(&encode_opts(&from)).await,
            Err(BitmsgError::KeyMismatch { .. }),
        ));
    }

    #[tokio::test]
    async fn framed_roundtrip() -> Result<()> {
        let from = address(4, 0x20);
        let framed = encode(&encode_opts(&from)).await?;

        let decoded = decode(&framed, &decode_opts(Candidates::One(&from))).await?;
        assert_eq!(decoded.message, "to all subscribers");
        Ok(())
    }
}
