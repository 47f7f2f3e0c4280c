//! Decryption of uploaded packages.
//!
//! An upload is `nonce || ciphertext` sealed with AES-256-GCM. Decryption is a
//! pure function: a failure is the client's fault and is never retried.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};

use crate::config::EncryptionKey;
use crate::error::IngestError;

/// Length of the nonce prefix (96 bits for AES-GCM).
pub const NONCE_LEN: usize = 12;

/// Open an uploaded blob and return the plaintext archive.
pub fn decrypt(payload: &[u8], key: &EncryptionKey) -> Result<Vec<u8>, IngestError> {
    if payload.len() < NONCE_LEN {
        return Err(IngestError::MalformedInput {
            len: payload.len(),
            nonce_len: NONCE_LEN,
        });
    }

    // Key length is fixed by EncryptionKey, so this cannot fail in practice
    let cipher = Aes256Gcm::new_from_slice(key.expose())
        .map_err(|_| IngestError::AuthenticationFailed)?;

    let (nonce, ciphertext) = payload.split_at(NONCE_LEN);
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| IngestError::AuthenticationFailed)
}
