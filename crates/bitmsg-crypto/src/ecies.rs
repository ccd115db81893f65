//! ECIES hybrid encryption over secp256k1.
//!
//! Every encryption generates a fresh ephemeral secp256k1 keypair,
//! performs Diffie-Hellman against the recipient's public key, derives
//! the symmetric keys with a SHA-512 KDF, encrypts with AES-256-CBC,
//! and authenticates with HMAC-SHA256 (encrypt-then-MAC).
//!
//! # Blob layout
//!
//! ```text
//! IV(16) ‖ curve(2)=0x02CA ‖ x_len(2)=32 ‖ x(32) ‖ y_len(2)=32 ‖ y(32)
//!        ‖ ciphertext ‖ MAC(32)
//! ```
//!
//! where `x`/`y` are the affine coordinates of the ephemeral public key
//! and the MAC covers `IV ‖ curve..y ‖ ciphertext`.
//!
//! # Key derivation
//!
//! ```text
//! shared_x ← x-coordinate of ECDH(ephemeral, recipient)
//! key      ← SHA-512(shared_x)
//! key_e    ← key[0..32]   (AES-256-CBC)
//! key_m    ← key[32..64]  (HMAC-SHA256)
//! ```

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use bitmsg_types::{BitmsgError, Result};
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::hash::sha512;
use crate::keys::{generate_keypair, PrivateKey, PublicKey};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type HmacSha256 = Hmac<Sha256>;

/// Wire identifier of the secp256k1 curve.
const CURVE_SECP256K1: u16 = 0x02CA;

/// AES-256-CBC initialisation vector length.
const IV_LEN: usize = 16;

/// Encoded ephemeral public key length: curve(2) + 2×(len(2) + 32).
const EPHEM_KEY_LEN: usize = 70;

/// HMAC-SHA256 tag length.
const MAC_LEN: usize = 32;

/// Smallest possible blob: IV + ephemeral key + one cipher block + MAC.
const MIN_BLOB_LEN: usize = IV_LEN + EPHEM_KEY_LEN + 16 + MAC_LEN;

// ---------------------------------------------------------------------------
// Encrypt
// ---------------------------------------------------------------------------

/// Encrypts `plaintext` to the holder of `recipient`'s private key.
///
/// A fresh ephemeral keypair is generated per call, so repeated
/// encryptions of the same plaintext produce unrelated blobs.
pub fn encrypt(recipient: &PublicKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let (ephemeral_private, ephemeral_public) = generate_keypair();
    let (mut key_e, key_m) = derive_keys(&ephemeral_private, recipient);

    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);

    let ciphertext =
        Aes256CbcEnc::new(&key_e.into(), &iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext);
    key_e.zeroize();

    let mut blob = Vec::with_capacity(IV_LEN + EPHEM_KEY_LEN + ciphertext.len() + MAC_LEN);
    blob.extend_from_slice(&iv);
    append_ephemeral_key(&mut blob, &ephemeral_public);
    blob.extend_from_slice(&ciphertext);

    let mac = compute_mac(&key_m, &blob)?;
    blob.extend_from_slice(&mac);
    Ok(blob)
}

// ---------------------------------------------------------------------------
// Decrypt
// ---------------------------------------------------------------------------

/// Decrypts an ECIES blob with `recipient`'s private key.
///
/// The MAC is verified in constant time before any decryption is
/// attempted.
///
/// # Errors
///
/// - [`BitmsgError::BadLength`] if the blob is structurally truncated.
/// - [`BitmsgError::CryptoError`] if the curve identifier or ephemeral
///   key is invalid, the MAC does not verify, or unpadding fails
///   (wrong key or tampered ciphertext).
pub fn decrypt(recipient: &PrivateKey, blob: &[u8]) -> Result<Vec<u8>> {
    if blob.len() < MIN_BLOB_LEN {
        return Err(BitmsgError::BadLength {
            reason: format!(
                "ECIES blob of {} octets is shorter than minimum {}",
                blob.len(),
                MIN_BLOB_LEN,
            ),
        });
    }

    let iv: [u8; IV_LEN] = blob[..IV_LEN]
        .try_into()
        .map_err(|_| BitmsgError::BadLength {
            reason: "ECIES blob truncated before IV end".into(),
        })?;
    let ephemeral_public = parse_ephemeral_key(&blob[IV_LEN..IV_LEN + EPHEM_KEY_LEN])?;
    let ciphertext = &blob[IV_LEN + EPHEM_KEY_LEN..blob.len() - MAC_LEN];
    let mac = &blob[blob.len() - MAC_LEN..];

    let (mut key_e, key_m) = derive_keys(recipient, &ephemeral_public);
    verify_mac(&key_m, &blob[..blob.len() - MAC_LEN], mac)?;

    let plaintext = Aes256CbcDec::new(&key_e.into(), &iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| BitmsgError::CryptoError {
            reason: "AES-256-CBC unpadding failed".into(),
        });
    key_e.zeroize();
    plaintext
}

// ---------------------------------------------------------------------------
// Key derivation
// ---------------------------------------------------------------------------

/// Derives the cipher and MAC keys from an ECDH exchange.
///
/// ECDH is symmetric, so (ephemeral secret, recipient public) on the
/// sender side and (recipient secret, ephemeral public) on the receiver
/// side yield the same keys.
fn derive_keys(private: &PrivateKey, public: &PublicKey) -> ([u8; 32], [u8; 32]) {
    let mut point = secp256k1::ecdh::shared_secret_point(public.inner(), private.inner());
    let mut kdf = sha512(&point[..32]);
    point.zeroize();

    let mut key_e = [0u8; 32];
    let mut key_m = [0u8; 32];
    key_e.copy_from_slice(&kdf[..32]);
    key_m.copy_from_slice(&kdf[32..]);
    kdf.zeroize();
    (key_e, key_m)
}

// ---------------------------------------------------------------------------
// Ephemeral key encoding
// ---------------------------------------------------------------------------

fn append_ephemeral_key(blob: &mut Vec<u8>, key: &PublicKey) {
    let sec = key.to_sec();
    blob.extend_from_slice(&CURVE_SECP256K1.to_be_bytes());
    blob.extend_from_slice(&32u16.to_be_bytes());
    blob.extend_from_slice(&sec[1..33]);
    blob.extend_from_slice(&32u16.to_be_bytes());
    blob.extend_from_slice(&sec[33..65]);
}

fn parse_ephemeral_key(encoded: &[u8]) -> Result<PublicKey> {
    debug_assert_eq!(encoded.len(), EPHEM_KEY_LEN);

    let curve = u16::from_be_bytes([encoded[0], encoded[1]]);
    if curve != CURVE_SECP256K1 {
        return Err(BitmsgError::CryptoError {
            reason: format!("unexpected curve identifier 0x{curve:04x}"),
        });
    }
    let x_len = u16::from_be_bytes([encoded[2], encoded[3]]);
    let y_len = u16::from_be_bytes([encoded[36], encoded[37]]);
    if x_len != 32 || y_len != 32 {
        return Err(BitmsgError::CryptoError {
            reason: format!("unexpected coordinate lengths x={x_len}, y={y_len}"),
        });
    }

    let mut sec = [0u8; 65];
    sec[0] = 0x04;
    sec[1..33].copy_from_slice(&encoded[4..36]);
    sec[33..65].copy_from_slice(&encoded[38..70]);
    PublicKey::from_sec(&sec)
}

// ---------------------------------------------------------------------------
// MAC
// ---------------------------------------------------------------------------

fn compute_mac(key_m: &[u8; 32], data: &[u8]) -> Result<[u8; MAC_LEN]> {
    let mut mac = HmacSha256::new_from_slice(key_m).map_err(|e| BitmsgError::CryptoError {
        reason: format!("HMAC-SHA256 key init failed: {e}"),
    })?;
    mac.update(data);

    let mut out = [0u8; MAC_LEN];
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

/// Verifies the blob MAC in constant time.
fn verify_mac(key_m: &[u8; 32], data: &[u8], expected: &[u8]) -> Result<()> {
    let mut mac = HmacSha256::new_from_slice(key_m).map_err(|e| BitmsgError::CryptoError {
        reason: format!("HMAC-SHA256 key init failed: {e}"),
    })?;
    mac.update(data);
    mac.verify_slice(expected).map_err(|_| BitmsgError::CryptoError {
        reason: "ECIES MAC verification failed".into(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_roundtrip() -> Result<()> {
        let (private, public) = generate_keypair();
        let plaintext = b"directed encrypted signed message";

        let blob = encrypt(&public, plaintext)?;
        let decrypted = decrypt(&private, &blob)?;
        assert_eq!(decrypted.as_slice(), plaintext.as_slice());
        Ok(())
    }

    #[test]
    fn empty_plaintext_roundtrip() -> Result<()> {
        let (private, public) = generate_keypair();
        let blob = encrypt(&public, b"")?;
        // One full padding block.
        assert_eq!(blob.len(), MIN_BLOB_LEN);
        assert!(decrypt(&private, &blob)?.is_empty());
        Ok(())
    }

    #[test]
    fn blobs_are_unlinkable() -> Result<()> {
        let (_, public) = generate_keypair();
        let a = encrypt(&public, b"same plaintext")?;
        let b = encrypt(&public, b"same plaintext")?;
        assert_ne!(a, b);
        Ok(())
    }

    #[test]
    fn wrong_recipient_fails() -> Result<()> {
        let (_, public) = generate_keypair();
        let (other_private, _) = generate_keypair();

        let blob = encrypt(&public, b"secret")?;
        assert!(decrypt(&other_private, &blob).is_err());
        Ok(())
    }

    #[test]
    fn tampered_ciphertext_fails_mac() -> Result<()> {
        let (private, public) = generate_keypair();
        let mut blob = encrypt(&public, b"secret")?;

        let index = blob.len() - MAC_LEN - 1;
        blob[index] ^= 0xFF;
        assert!(decrypt(&private, &blob).is_err());
        Ok(())
    }

    #[test]
    fn tampered_mac_fails() -> Result<()> {
        let (private, public) = generate_keypair();
        let mut blob = encrypt(&public, b"secret")?;

        let index = blob.len() - 1;
        blob[index] ^= 0x01;
        assert!(decrypt(&private, &blob).is_err());
        Ok(())
    }

    #[test]
    fn truncated_blob_rejected() {
        let (private, _) = generate_keypair();
        assert!(matches!(
            decrypt(&private, &[0u8; 40]),
            Err(BitmsgError::BadLength { .. }),
        ));
    }

    #[test]
    fn wrong_curve_identifier_rejected() -> Result<()> {
        let (private, public) = generate_keypair();
        let mut blob = encrypt(&public, b"secret")?;
        blob[IV_LEN] = 0x01; // clobber the curve id
        assert!(matches!(
            decrypt(&private, &blob),
            Err(BitmsgError::CryptoError { .. }),
        ));
        Ok(())
    }
}
