//! `pubkey` — publication of a sender's keys.
//!
//! Three on-wire shapes, by address version:
//!
//! - **v2** — cleartext `behavior(4) ‖ sign_pub(64) ‖ enc_pub(64)`;
//!   neither signed nor encrypted.
//! - **v3** — the v2 block plus the two difficulty `var_int`s, then a
//!   signature over the object header and the unsigned body.
//! - **v4** — only the 32-octet tag travels in cleartext; the v3-style
//!   body and signature are ECIES-encrypted to the keypair anyone can
//!   derive from the address, so only parties who already know the
//!   address can read the keys.

use bitmsg_crypto::{ecies, signing, Address};
use bitmsg_types::{var_int, BitmsgError, ObjectType, PubkeyBitfield, Result, Tag};

use crate::candidates::Candidates;
use crate::message;
use crate::object::{self, ObjectHeader};
use crate::objects::{expect_type, expect_version, read_pubkey, write_pubkey, Reader};
use crate::pow::Difficulty;

// ---------------------------------------------------------------------------
// Encode
// ---------------------------------------------------------------------------

/// Options for encoding a `pubkey` object.
#[derive(Clone, Debug)]
pub struct EncodeOpts<'a> {
    /// Seconds until the object expires.
    pub ttl: u64,
    /// The identity whose keys are published. Must hold its signing
    /// private key for versions 3 and 4.
    pub from: &'a Address,
    /// Prepend a zero nonce instead of searching for one.
    pub skip_pow: bool,
}

/// Encodes a framed `pubkey` message.
pub async fn encode(opts: &EncodeOpts<'_>) -> Result<Vec<u8>> {
    let payload = encode_payload(opts).await?;
    message::encode(message::OBJECT_COMMAND, &payload)
}

/// Encodes a `pubkey` object payload, nonce included.
pub async fn encode_payload(opts: &EncodeOpts<'_>) -> Result<Vec<u8>> {
    let from = opts.from;
    expect_version(from.version, 2..=4)?;

    let expires = object::expires_from_ttl(opts.ttl);
    let header =
        object::header_without_nonce(expires, ObjectType::Pubkey, from.version, from.stream);

    let mut body = Vec::new();
    write_pubkey(&mut body, from);
    if from.version >= 3 {
        body.extend_from_slice(&var_int::encode(from.nonce_trials()));
        body.extend_from_slice(&var_int::encode(from.extra_bytes()));
    }

    let obj = match from.version {
        2 => {
            let mut obj = header;
            obj.extend_from_slice(&body);
            obj
        }
        3 => {
            let mut signed = header.clone();
            signed.extend_from_slice(&body);
            let signature = signing::sign(from.signing_private()?, &signed)?;

            let mut obj = header;
            obj.extend_from_slice(&body);
            obj.extend_from_slice(&var_int::encode(signature.len() as u64));
            obj.extend_from_slice(&signature);
            obj
        }
        _ => {
            let tag = from.tag();
            let mut signed = header.clone();
            signed.extend_from_slice(tag.as_bytes());
            signed.extend_from_slice(&body);
            let signature = signing::sign(from.signing_private()?, &signed)?;

            let mut cleartext = body;
            cleartext.extend_from_slice(&var_int::encode(signature.len() as u64));
            cleartext.extend_from_slice(&signature);

            let (_, pubkey_public) = from.pubkey_keypair()?;
            let ciphertext = ecies::encrypt(&pubkey_public, &cleartext)?;

            let mut obj = header;
            obj.extend_from_slice(tag.as_bytes());
            obj.extend_from_slice(&ciphertext);
            obj
        }
    };

    object::prepend_nonce(obj, opts.ttl, &Difficulty::default(), opts.skip_pow).await
}

// ---------------------------------------------------------------------------
// Decode
// ---------------------------------------------------------------------------

/// Options for decoding a `pubkey` object.
#[derive(Clone, Debug)]
pub struct PubkeyDecodeOpts<'a> {
    /// Envelope acceptance options.
    pub envelope: object::DecodeOpts,
    /// Candidate addresses for v4 tag routing. Unused for v2 and v3.
    pub needed: Candidates<'a>,
}

/// A decoded `pubkey` object.
#[derive(Clone, Debug)]
pub struct Decoded {
    /// The common object header.
    pub header: ObjectHeader,
    /// Advertised feature flags.
    pub behavior: PubkeyBitfield,
    /// Signing public key, full SEC form.
    pub signing_key: bitmsg_crypto::PublicKey,
    /// Encryption public key, full SEC form.
    pub encryption_key: bitmsg_crypto::PublicKey,
    /// Demanded nonce trials per octet (versions 3 and 4).
    pub nonce_trials_per_byte: Option<u64>,
    /// Demanded payload length padding (versions 3 and 4).
    pub payload_length_extra_bytes: Option<u64>,
    /// DER signature over the object (versions 3 and 4).
    pub signature: Option<Vec<u8>>,
    /// The routing tag (version 4).
    pub tag: Option<Tag>,
    /// Octets of type-specific payload consumed. For v4 this is the
    /// whole payload, since everything past the tag is ciphertext.
    pub length: usize,
}

/// Decodes a framed `pubkey` message.
pub async fn decode(buf: &[u8], opts: &PubkeyDecodeOpts<'_>) -> Result<Decoded> {
    let frame = message::decode(buf)?;
    if frame.command != message::OBJECT_COMMAND {
        return Err(BitmsgError::BadCommand {
            command: frame.command,
        });
    }
    decode_payload(&frame.payload, opts).await
}

/// Decodes a `pubkey` object payload.
pub async fn decode_payload(buf: &[u8], opts: &PubkeyDecodeOpts<'_>) -> Result<Decoded> {
    let (header, payload) = object::decode_payload(buf, &opts.envelope)?;
    expect_type(&header, ObjectType::Pubkey)?;
    expect_version(header.version, 2..=4)?;

    match header.version {
        2 => decode_v2(header, payload),
        3 => decode_v3(buf, header, payload),
        _ => decode_v4(buf, header, payload, &opts.needed),
    }
}

fn decode_v2(header: ObjectHeader, payload: &[u8]) -> Result<Decoded> {
    let mut reader = Reader::new(payload);
    let keys = read_pubkey(&mut reader)?;
    Ok(Decoded {
        header,
        behavior: keys.behavior,
        signing_key: keys.signing_key,
        encryption_key: keys.encryption_key,
        nonce_trials_per_byte: None,
        payload_length_extra_bytes: None,
        signature: None,
        tag: None,
        length: keys.length,
    })
}

fn decode_v3(buf: &[u8], header: ObjectHeader, payload: &[u8]) -> Result<Decoded> {
    let mut reader = Reader::new(payload);
    let keys = read_pubkey(&mut reader)?;
    let nonce_trials_per_byte = reader.var_int()?;
    let payload_length_extra_bytes = reader.var_int()?;
    let body_len = reader.position();
    let signature = reader.var_bytes("signature")?.to_vec();

    // The signed region runs from `expires` through the unsigned body,
    // contiguous in the wire buffer.
    let signed = &buf[8..header.payload_offset() + body_len];
    signing::verify(&keys.signing_key, signed, &signature)?;

    Ok(Decoded {
        header,
        behavior: keys.behavior,
        signing_key: keys.signing_key,
        encryption_key: keys.encryption_key,
        nonce_trials_per_byte: Some(nonce_trials_per_byte),
        payload_length_extra_bytes: Some(payload_length_extra_bytes),
        signature: Some(signature),
        tag: None,
        length: reader.position(),
    })
}

fn decode_v4(
    buf: &[u8],
    header: ObjectHeader,
    payload: &[u8],
    needed: &Candidates<'_>,
) -> Result<Decoded> {
    let mut reader = Reader::new(payload);
    let tag = Tag::from_slice(reader.take(Tag::LEN, "tag")?)?;

    let address = needed
        .find_by_tag(&tag)
        .ok_or(BitmsgError::NotInterested { tag })?;
    let (pubkey_private, _) = address.pubkey_keypair()?;
    let cleartext = ecies::decrypt(&pubkey_private, &payload[Tag::LEN..])?;

    let mut reader = Reader::new(&cleartext);
    let keys = read_pubkey(&mut reader)?;
    let nonce_trials_per_byte = reader.var_int()?;
    let payload_length_extra_bytes = reader.var_int()?;
    let body_len = reader.position();
    let signature = reader.var_bytes("signature")?.to_vec();

    // Header and tag are contiguous on the wire; the body is not, so
    // the signed region is reassembled.
    let mut signed = buf[8..header.payload_offset() + Tag::LEN].to_vec();
    signed.extend_from_slice(&cleartext[..body_len]);
    signing::verify(&keys.signing_key, &signed, &signature)?;

    Ok(Decoded {
        header,
        behavior: keys.behavior,
        signing_key: keys.signing_key,
        encryption_key: keys.encryption_key,
        nonce_trials_per_byte: Some(nonce_trials_per_byte),
        payload_length_extra_bytes: Some(payload_length_extra_bytes),
        signature: Some(signature),
        tag: Some(tag),
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

    fn decode_opts<'a>(needed: Candidates<'a>) -> PubkeyDecodeOpts<'a> {
        PubkeyDecodeOpts {
            envelope: object::DecodeOpts::default(),
            needed,
        }
    }

    async fn encode_for(from: &Address) -> Result<Vec<u8>> {
        encode_payload(&EncodeOpts {
            ttl: 300,
            from,
            skip_pow: true,
        })
        .await
    }

    #[tokio::test]
    async fn v2_roundtrip_has_no_signature() -> Result<()> {
        let from = address(2, 0x20);
        let payload = encode_for(&from).await?;

        let empty: Vec<Address> = Vec::new();
        let decoded = decode_payload(&payload, &decode_opts(Candidates::Many(&empty))).await?;

        assert_eq!(decoded.signing_key, from.signing_public);
        assert_eq!(decoded.encryption_key, from.encryption_public);
        assert_eq!(decoded.signature, None);
        assert_eq!(decoded.nonce_trials_per_byte, None);
        assert_eq!(decoded.length, 132);
        Ok(())
    }

    #[tokio::test]
    async fn v3_roundtrip_verifies_signature() -> Result<()> {
        let mut from = address(3, 0x20);
        from.nonce_trials_per_byte = Some(2000);
        let payload = encode_for(&from).await?;

        let empty: Vec<Address> = Vec::new();
        let decoded = decode_payload(&payload, &decode_opts(Candidates::Many(&empty))).await?;

        assert_eq!(decoded.nonce_trials_per_byte, Some(2000));
        assert!(decoded.signature.is_some());
        assert_eq!(decoded.signing_key, from.signing_public);
        Ok(())
    }

    #[tokio::test]
    async fn v3_flipped_body_bit_fails_signature() -> Result<()> {
        let from = address(3, 0x20);
        let mut payload = encode_for(&from).await?;

        // Flip a bit inside the behavior bitfield.
        let offset = 8 + 8 + 4 + 1 + 1;
        payload[offset] ^= 0x01;

        let empty: Vec<Address> = Vec::new();
        assert!(matches!(
            decode_payload(&payload, &decode_opts(Candidates::Many(&empty))).await,
            Err(BitmsgError::SignatureInvalid),
        ));
        Ok(())
    }

    #[tokio::test]
    async fn v4_roundtrip_by_tag() -> Result<()> {
        let from = address(4, 0x20);
        let payload = encode_for(&from).await?;

        let decoded = decode_payload(&payload, &decode_opts(Candidates::One(&from))).await?;

        assert_eq!(decoded.tag, Some(from.tag()));
        assert_eq!(decoded.signing_key, from.signing_public);
        assert_eq!(decoded.encryption_key, from.encryption_public);
        assert!(decoded.signature.is_some());
        // Consumed length covers the entire payload.
        assert_eq!(
            decoded.length,
            payload.len() - decoded.header.payload_offset(),
        );
        Ok(())
    }

    #[tokio::test]
    async fn v4_unmatched_tag_is_not_interested() -> Result<()> {
        let from = address(4, 0x20);
        let stranger = address(4, 0x40);
        let payload = encode_for(&from).await?;

        assert!(matches!(
            decode_payload(&payload, &decode_opts(Candidates::One(&stranger))).await,
            Err(BitmsgError::NotInterested { tag }) if tag == from.tag(),
        ));
        Ok(())
    }

    #[tokio::test]
    async fn framed_roundtrip() -> Result<()> {
        let from = address(4, 0x20);
        let framed = encode(&EncodeOpts {
            ttl: 300,
            from: &from,
            skip_pow: true,
        })
        .await?;

        let decoded = decode(&framed, &decode_opts(Candidates::One(&from))).await?;
        assert_eq!(decoded.tag, Some(from.tag()));
        Ok(())
    }
}
