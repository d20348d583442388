// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Vloo Labs

//! Passphrase envelope for gift private keys.
//!
//! A gift's private key is sealed under a passphrase known only to giver
//! and receiver: Argon2id derives a 256-bit key from the passphrase and a
//! fresh random salt, then XChaCha20-Poly1305 encrypts the key material
//! with a fresh random nonce. The resulting [`SealedBlob`] is
//! self-describing — it carries the algorithm identifier, KDF parameters,
//! salt and nonce, so [`open`] needs nothing beyond the blob and the
//! passphrase.
//!
//! Every failure mode of [`open`] (wrong passphrase, corrupted blob,
//! tag mismatch) collapses into [`EnvelopeError::DecryptionFailed`].
//! Callers get no oracle for "almost right" passphrases and never see
//! partial plaintext.

use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use rand::rngs::OsRng;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Algorithm identifier stored in every blob.
///
/// Bump the suffix if the construction ever changes; [`open`] refuses
/// blobs with an unknown identifier.
const ALG_ID: &str = "argon2id.xchacha20poly1305.v1";

/// Salt length in bytes. Public, stored in the blob.
const SALT_LEN: usize = 16;

/// XChaCha20-Poly1305 nonce length in bytes (192-bit).
const NONCE_LEN: usize = 24;

/// Derived symmetric key length in bytes.
const KEY_LEN: usize = 32;

/// Errors from sealing and opening envelopes.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    /// The caller supplied KDF parameters the Argon2 implementation
    /// rejects (seal-time only).
    #[error("invalid KDF parameters: {0}")]
    InvalidParams(String),

    /// The AEAD cipher rejected the encryption inputs (seal-time only,
    /// not reachable with well-formed keys and nonces).
    #[error("encryption failed")]
    EncryptionFailed,

    /// Wrong passphrase, corrupted blob, or failed tag verification.
    /// Deliberately carries no detail distinguishing the three.
    #[error("decryption failed")]
    DecryptionFailed,
}

/// Argon2id tuning parameters, stored alongside the ciphertext.
///
/// | Parameter | Default | Meaning |
/// |-----------|---------|---------|
/// | `m_cost`  | 19 456  | Memory usage in KiB (19 MiB) |
/// | `t_cost`  | 2       | Number of passes |
/// | `p_cost`  | 1       | Degree of parallelism |
///
/// Defaults are calibrated to finish well under 200 ms on phone-class
/// hardware, since derivation runs on the receiver's device at claim time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB.
    pub m_cost: u32,
    /// Time cost (number of passes).
    pub t_cost: u32,
    /// Parallelism degree.
    pub p_cost: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            m_cost: 19_456,
            t_cost: 2,
            p_cost: 1,
        }
    }
}

/// The sealed envelope persisted inside a gift record.
///
/// All fields except `ciphertext` (which includes the 16-byte Poly1305
/// tag) are public and may be stored or transmitted in the clear.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SealedBlob {
    /// Construction identifier (see [`ALG_ID`]).
    pub alg: String,
    /// Argon2id parameters used to derive the key.
    pub kdf: KdfParams,
    /// Random per-seal salt.
    #[serde(with = "b64")]
    pub salt: Vec<u8>,
    /// Random per-seal 192-bit nonce.
    #[serde(with = "b64")]
    pub nonce: Vec<u8>,
    /// Encrypted key material with the Poly1305 tag appended.
    #[serde(with = "b64")]
    pub ciphertext: Vec<u8>,
}

/// 256-bit key derived by Argon2id. Zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
struct DerivedKey([u8; KEY_LEN]);

/// Normalize a passphrase to NFC before key derivation.
///
/// The same passphrase typed on the giver's and the receiver's device
/// can arrive in different Unicode normal forms; deriving from the NFC
/// form makes both sides agree.
fn normalize_passphrase(passphrase: &str) -> Zeroizing<String> {
    Zeroizing::new(passphrase.nfc().collect())
}

/// Derive the symmetric key from a normalized passphrase and salt.
fn derive_key(passphrase: &str, salt: &[u8], params: &KdfParams) -> Result<DerivedKey, String> {
    let argon2_params = Params::new(params.m_cost, params.t_cost, params.p_cost, Some(KEY_LEN))
        .map_err(|e| format!("invalid Argon2id params: {e}"))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);

    let mut key = [0u8; KEY_LEN];
    argon2
        .hash_password_into(passphrase.as_bytes(), salt, &mut key)
        .map_err(|e| format!("Argon2id derivation failed: {e}"))?;

    Ok(DerivedKey(key))
}

/// Seal a secret under a passphrase.
///
/// Non-deterministic: salt and nonce are drawn fresh from OS entropy on
/// every call, so sealing the same secret twice yields different blobs.
pub fn seal(
    secret: &SecretString,
    passphrase: &str,
    params: &KdfParams,
) -> Result<SealedBlob, EnvelopeError> {
    let mut salt = vec![0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    let mut nonce = vec![0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let normalized = normalize_passphrase(passphrase);
    let key = derive_key(&normalized, &salt, params).map_err(EnvelopeError::InvalidParams)?;

    let cipher = XChaCha20Poly1305::new(Key::from_slice(&key.0));
    let ciphertext = cipher
        .encrypt(
            XNonce::from_slice(&nonce),
            secret.expose_secret().as_bytes(),
        )
        .map_err(|_| EnvelopeError::EncryptionFailed)?;

    Ok(SealedBlob {
        alg: ALG_ID.to_string(),
        kdf: *params,
        salt,
        nonce,
        ciphertext,
    })
}

/// Open a sealed blob with a passphrase.
///
/// Re-derives the key from the stored KDF parameters and salt, decrypts,
/// and verifies the Poly1305 tag. Any mismatch — wrong passphrase,
/// bit-flipped ciphertext, truncated fields, unknown algorithm — returns
/// [`EnvelopeError::DecryptionFailed`] with no further detail.
pub fn open(blob: &SealedBlob, passphrase: &str) -> Result<SecretString, EnvelopeError> {
    if blob.alg != ALG_ID || blob.nonce.len() != NONCE_LEN {
        return Err(EnvelopeError::DecryptionFailed);
    }

    let normalized = normalize_passphrase(passphrase);
    let key = derive_key(&normalized, &blob.salt, &blob.kdf)
        .map_err(|_| EnvelopeError::DecryptionFailed)?;

    let cipher = XChaCha20Poly1305::new(Key::from_slice(&key.0));
    let plaintext = cipher
        .decrypt(XNonce::from_slice(&blob.nonce), blob.ciphertext.as_slice())
        .map_err(|_| EnvelopeError::DecryptionFailed)?;

    let plaintext = Zeroizing::new(plaintext);
    let secret = std::str::from_utf8(&plaintext).map_err(|_| EnvelopeError::DecryptionFailed)?;
    Ok(SecretString::from(secret.to_string()))
}

/// Base64 (de)serialization for the blob's binary fields.
mod b64 {
    use base64ct::{Base64, Encoding};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&Base64::encode_string(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Base64::decode_vec(&encoded).map_err(serde::de::Error::custom)
    }
}
