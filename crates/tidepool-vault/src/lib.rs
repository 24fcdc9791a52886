// crates/tidepool-vault/src/lib.rs
// ============================================================================
// Module: Tidepool Credential Vault
// Description: AES-256-GCM sealing for tenant database passwords.
// Purpose: Keep credentials opaque at rest with fail-closed decryption.
// Dependencies: aes-gcm, base64, rand, thiserror
// ============================================================================

//! ## Overview
//! The vault seals tenant database passwords with AES-256-GCM. Envelopes
//! are text of the form `iv:tag:ciphertext` (base64 segments) with a
//! random 96-bit nonce per call. Decryption fails closed: a tag mismatch,
//! a malformed segment, or the wrong number of segments yields
//! [`VaultError::InvalidEnvelope`], never a corrupted plaintext. The key
//! is process-wide and loaded once at startup; a missing or wrong-length
//! key is a configuration error, not a runtime condition this crate
//! handles.

// ============================================================================
// SECTION: Imports
// ============================================================================

use aes_gcm::Aes256Gcm;
use aes_gcm::Key;
use aes_gcm::KeyInit;
use aes_gcm::Nonce;
use aes_gcm::aead::Aead;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand::RngCore;
use rand::rngs::OsRng;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Vault key length in bytes (AES-256).
pub const KEY_LEN: usize = 32;
/// Nonce length in bytes (GCM standard 96-bit).
const NONCE_LEN: usize = 12;
/// Authentication tag length in bytes.
const TAG_LEN: usize = 16;
/// Envelope segment separator.
const SEGMENT_SEPARATOR: char = ':';

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Vault errors.
///
/// # Invariants
/// - `InvalidEnvelope` covers every decrypt failure; callers treat it as
///   data corruption and abort the enclosing operation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VaultError {
    /// Key material has the wrong length.
    #[error("vault key must be {KEY_LEN} bytes, got {0}")]
    InvalidKeyLength(usize),
    /// Envelope is malformed or failed integrity verification.
    #[error("vault envelope invalid")]
    InvalidEnvelope,
    /// Encryption failed.
    #[error("vault seal failure")]
    Seal,
}

// ============================================================================
// SECTION: Vault
// ============================================================================

/// Process-wide credential vault.
///
/// # Invariants
/// - The key is fixed for the vault's lifetime.
pub struct CredentialVault {
    /// AEAD cipher initialized from the process key.
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never expose key material through Debug output.
        f.debug_struct("CredentialVault").finish_non_exhaustive()
    }
}

impl CredentialVault {
    /// Creates a vault from a 32-byte key.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidKeyLength`] when the key is not
    /// exactly [`KEY_LEN`] bytes.
    pub fn new(key: &[u8]) -> Result<Self, VaultError> {
        if key.len() != KEY_LEN {
            return Err(VaultError::InvalidKeyLength(key.len()));
        }
        let key = Key::<Aes256Gcm>::from_slice(key);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    /// Seals a plaintext into an `iv:tag:ciphertext` envelope.
    ///
    /// A fresh random nonce is drawn per call, so sealing the same
    /// plaintext twice yields different envelopes.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Seal`] when encryption fails.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, VaultError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let sealed = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| VaultError::Seal)?;
        // aes-gcm appends the tag to the ciphertext; split it back out so
        // the stored form keeps the iv:tag:ciphertext segment contract.
        if sealed.len() < TAG_LEN {
            return Err(VaultError::Seal);
        }
        let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LEN);
        Ok(format!(
            "{}{SEGMENT_SEPARATOR}{}{SEGMENT_SEPARATOR}{}",
            BASE64.encode(nonce_bytes),
            BASE64.encode(tag),
            BASE64.encode(ciphertext),
        ))
    }

    /// Opens an envelope produced by [`CredentialVault::encrypt`].
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidEnvelope`] on a wrong segment count,
    /// undecodable segments, or tag mismatch. No partial plaintext is
    /// ever returned.
    pub fn decrypt(&self, envelope: &str) -> Result<String, VaultError> {
        let mut segments = envelope.split(SEGMENT_SEPARATOR);
        let (Some(nonce_b64), Some(tag_b64), Some(ciphertext_b64), None) =
            (segments.next(), segments.next(), segments.next(), segments.next())
        else {
            return Err(VaultError::InvalidEnvelope);
        };
        let nonce_raw =
            BASE64.decode(nonce_b64).map_err(|_| VaultError::InvalidEnvelope)?;
        if nonce_raw.len() != NONCE_LEN {
            return Err(VaultError::InvalidEnvelope);
        }
        let tag = BASE64.decode(tag_b64).map_err(|_| VaultError::InvalidEnvelope)?;
        if tag.len() != TAG_LEN {
            return Err(VaultError::InvalidEnvelope);
        }
        let mut sealed =
            BASE64.decode(ciphertext_b64).map_err(|_| VaultError::InvalidEnvelope)?;
        sealed.extend_from_slice(&tag);
        let nonce = Nonce::from_slice(&nonce_raw);
        let plaintext = self
            .cipher
            .decrypt(nonce, sealed.as_ref())
            .map_err(|_| VaultError::InvalidEnvelope)?;
        String::from_utf8(plaintext).map_err(|_| VaultError::InvalidEnvelope)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only panic-based assertions are permitted."
    )]

    use super::BASE64;
    use super::CredentialVault;
    use super::KEY_LEN;
    use super::VaultError;
    use base64::Engine;

    fn vault() -> CredentialVault {
        CredentialVault::new(&[7u8; KEY_LEN]).expect("vault")
    }

    #[test]
    fn round_trip_recovers_plaintext() {
        let vault = vault();
        let envelope = vault.encrypt("s3cret-pa55").expect("encrypt");
        assert_eq!(vault.decrypt(&envelope).expect("decrypt"), "s3cret-pa55");
    }

    #[test]
    fn sealing_twice_produces_distinct_envelopes() {
        let vault = vault();
        let first = vault.encrypt("same").expect("encrypt");
        let second = vault.encrypt("same").expect("encrypt");
        assert_ne!(first, second, "nonce must be fresh per call");
    }

    #[test]
    fn wrong_segment_count_fails_closed() {
        let vault = vault();
        assert_eq!(vault.decrypt("onlyonesegment"), Err(VaultError::InvalidEnvelope));
        assert_eq!(vault.decrypt("a:b"), Err(VaultError::InvalidEnvelope));
        assert_eq!(vault.decrypt("a:b:c:d"), Err(VaultError::InvalidEnvelope));
    }

    #[test]
    fn corrupted_ciphertext_fails_closed() {
        let vault = vault();
        let envelope = vault.encrypt("payload").expect("encrypt");
        let mut segments: Vec<String> =
            envelope.split(':').map(str::to_string).collect();
        let mut raw = BASE64.decode(&segments[2]).expect("decode");
        raw[0] ^= 0x01;
        segments[2] = BASE64.encode(raw);
        let tampered = segments.join(":");
        assert_eq!(vault.decrypt(&tampered), Err(VaultError::InvalidEnvelope));
    }

    #[test]
    fn corrupted_tag_fails_closed() {
        let vault = vault();
        let envelope = vault.encrypt("payload").expect("encrypt");
        let mut segments: Vec<String> =
            envelope.split(':').map(str::to_string).collect();
        let mut raw = BASE64.decode(&segments[1]).expect("decode");
        raw[0] ^= 0x80;
        segments[1] = BASE64.encode(raw);
        let tampered = segments.join(":");
        assert_eq!(vault.decrypt(&tampered), Err(VaultError::InvalidEnvelope));
    }

    #[test]
    fn wrong_key_length_is_rejected() {
        assert_eq!(
            CredentialVault::new(&[0u8; 16]).err(),
            Some(VaultError::InvalidKeyLength(16))
        );
    }

    #[test]
    fn decrypting_with_a_different_key_fails_closed() {
        let envelope = vault().encrypt("payload").expect("encrypt");
        let other = CredentialVault::new(&[9u8; KEY_LEN]).expect("vault");
        assert_eq!(other.decrypt(&envelope), Err(VaultError::InvalidEnvelope));
    }
}
