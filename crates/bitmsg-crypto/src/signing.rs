//! ECDSA signing and verification over secp256k1.
//!
//! Signatures cover the SHA-256 digest of the signed region and are
//! DER-encoded on the wire, so their length varies (70–72 octets) and
//! is always carried behind a `var_int` length prefix.

use bitmsg_types::{BitmsgError, Result};
use secp256k1::ecdsa::Signature;
use secp256k1::{Message, Secp256k1};

use crate::hash::sha256;
use crate::keys::{PrivateKey, PublicKey};

/// Signs `data` and returns the DER-encoded ECDSA signature.
///
/// The signature is deterministic (RFC 6979): the same key and data
/// always produce the same DER bytes.
pub fn sign(private: &PrivateKey, data: &[u8]) -> Result<Vec<u8>> {
    let secp = Secp256k1::new();
    let digest = Message::from_digest(sha256(data));
    let signature = secp.sign_ecdsa(&digest, private.inner());
    Ok(signature.serialize_der().to_vec())
}

/// Verifies a DER-encoded ECDSA signature over `data`.
///
/// # Errors
///
/// Returns [`BitmsgError::SignatureInvalid`] if the DER bytes do not
/// parse or the signature does not verify against `public`.
pub fn verify(public: &PublicKey, data: &[u8], signature_der: &[u8]) -> Result<()> {
    let secp = Secp256k1::new();
    let digest = Message::from_digest(sha256(data));
    let signature =
        Signature::from_der(signature_der).map_err(|_| BitmsgError::SignatureInvalid)?;
    secp.verify_ecdsa(&digest, &signature, public.inner())
        .map_err(|_| BitmsgError::SignatureInvalid)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::generate_keypair;

    #[test]
    fn sign_verify_roundtrip() -> Result<()> {
        let (private, public) = generate_keypair();
        let data = b"object header and body";
        let sig = sign(&private, data)?;
        verify(&public, data, &sig)
    }

    #[test]
    fn signature_is_deterministic() -> Result<()> {
        let private = PrivateKey::from_bytes(&[0x42u8; 32])?;
        let data = b"determinism";
        assert_eq!(sign(&private, data)?, sign(&private, data)?);
        Ok(())
    }

    #[test]
    fn wrong_data_fails_verification() -> Result<()> {
        let (private, public) = generate_keypair();
        let sig = sign(&private, b"signed data")?;
        assert!(matches!(
            verify(&public, b"other data", &sig),
            Err(BitmsgError::SignatureInvalid),
        ));
        Ok(())
    }

    #[test]
    fn wrong_key_fails_verification() -> Result<()> {
        let (private, _) = generate_keypair();
        let (_, other_public) = generate_keypair();
        let sig = sign(&private, b"data")?;
        assert!(verify(&other_public, b"data", &sig).is_err());
        Ok(())
    }

    #[test]
    fn garbage_der_rejected() {
        let (_, public) = generate_keypair();
        assert!(matches!(
            verify(&public, b"data", &[0xDE, 0xAD, 0xBE, 0xEF]),
            Err(BitmsgError::SignatureInvalid),
        ));
    }

    #[test]
    fn flipped_bit_in_data_fails_verification() -> Result<()> {
        let (private, public) = generate_keypair();
        let mut data = b"sensitive signed region".to_vec();
        let sig = sign(&private, &data)?;

        data[5] ^= 0x01;
        assert!(verify(&public, &data, &sig).is_err());
        Ok(())
    }
}
