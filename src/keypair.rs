// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Vloo Labs

//! Custodial keypair generation.
//!
//! Every gift carries exactly one fresh secp256k1 keypair, generated here
//! and never regenerated. The public address is safe to display anywhere;
//! the private key exists in plaintext only between generation and sealing
//! (and again, briefly, when a claim succeeds).

use k256::ecdsa::SigningKey;
use k256::elliptic_curve::rand_core::OsRng;
use secrecy::SecretString;

/// A freshly generated custodial keypair.
///
/// The private key is hex-encoded (`0x` + 64 hex chars) and wrapped in
/// [`SecretString`] so it is redacted from `Debug` output and zeroized
/// on drop. It must never be persisted outside a sealed envelope.
pub struct Keypair {
    /// Ethereum-format public address (`0x` + 40 hex chars).
    pub public_address: String,
    /// Hex-encoded private key.
    pub private_key: SecretString,
}

/// Generate a secp256k1 keypair and derive its Ethereum-style address.
///
/// Addresses are derived by:
/// 1. Generate secp256k1 private key from OS entropy
/// 2. Get uncompressed public key (65 bytes: 0x04 || x || y)
/// 3. Take keccak256 of the public key without the 0x04 prefix (64 bytes)
/// 4. Take the last 20 bytes of the hash
/// 5. Encode as hex with 0x prefix (42 characters total)
///
/// Entropy comes from the OS CSPRNG on every call; collisions between
/// generated addresses are treated as impossible for this system's
/// purposes.
pub fn generate() -> Keypair {
    use alloy::primitives::keccak256;

    let signing_key = SigningKey::random(&mut OsRng);
    let verifying_key = signing_key.verifying_key();

    // Uncompressed public key bytes (0x04 prefix + 64 bytes of x,y coordinates)
    let public_key_uncompressed = verifying_key.to_encoded_point(false);
    let public_key_bytes = public_key_uncompressed.as_bytes();

    // Hash the coordinates (skip the 0x04 prefix)
    let hash = keccak256(&public_key_bytes[1..]);

    // Last 20 bytes of the hash are the address
    let address_bytes = &hash[12..];
    let public_address = format!("0x{}", alloy::hex::encode(address_bytes));

    let private_key = SecretString::from(format!(
        "0x{}",
        alloy::hex::encode(signing_key.to_bytes())
    ));

    Keypair {
        public_address,
        private_key,
    }
}
