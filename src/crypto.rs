//! AES-256-GCM encryption for upstream credential secrets.
//!
//! Format: `base64(nonce(12 bytes) || ciphertext)`, authenticated with the
//! owning user's id as associated data so a ciphertext cannot be replayed
//! under a different user's row.

use crate::error::{Error, Result};
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

/// Encrypt `plaintext`, binding the ciphertext to `user_id` as associated data.
///
/// # Errors
/// Returns [`Error::Crypto`] if `plaintext` is empty.
pub fn encrypt(key: &[u8; 32], plaintext: &str, user_id: &str) -> Result<String> {
    if plaintext.is_empty() {
        return Err(Error::Crypto {
            reason: "plaintext must not be empty".to_string(),
        });
    }

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(
            &nonce,
            aes_gcm::aead::Payload {
                msg: plaintext.as_bytes(),
                aad: user_id.as_bytes(),
            },
        )
        .map_err(|e| Error::Crypto {
            reason: format!("encryption failed: {e}"),
        })?;

    let mut combined = Vec::with_capacity(nonce.len() + ciphertext.len());
    combined.extend_from_slice(&nonce);
    combined.extend_from_slice(&ciphertext);
    Ok(BASE64.encode(combined))
}

/// Decrypt a value produced by [`encrypt`], verifying it was sealed for `user_id`.
///
/// # Errors
/// Returns [`Error::Crypto`] if the payload is malformed, too short, or the
/// authentication tag does not verify (wrong key, wrong `user_id`, or the
/// ciphertext was tampered with).
pub fn decrypt(key: &[u8; 32], encoded: &str, user_id: &str) -> Result<String> {
    let raw = BASE64.decode(encoded).map_err(|e| Error::Crypto {
        reason: format!("invalid base64: {e}"),
    })?;

    if raw.len() < 12 {
        return Err(Error::Crypto {
            reason: "payload shorter than the 12-byte nonce".to_string(),
        });
    }
    let (nonce_bytes, ciphertext) = raw.split_at(12);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let plaintext = cipher
        .decrypt(
            nonce_bytes.into(),
            aes_gcm::aead::Payload {
                msg: ciphertext,
                aad: user_id.as_bytes(),
            },
        )
        .map_err(|e| Error::Crypto {
            reason: format!("decryption failed: {e}"),
        })?;

    String::from_utf8(plaintext).map_err(|e| Error::Crypto {
        reason: format!("decrypted payload was not valid UTF-8: {e}"),
    })
}
