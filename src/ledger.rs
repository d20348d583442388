// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Vloo Labs

//! Gift lifecycle ledger.
//!
//! The ledger owns the state machine `Locked → Ready → Claimed` and is
//! the only component that mutates a gift. It composes keypair
//! generation, the passphrase envelope, and the embedded store:
//!
//! - `create_gift` — validate, generate a keypair, seal the private key,
//!   persist gift + token binding atomically.
//! - `resolve_token` — pure lookup from a scanned card to its gift.
//! - `compute_status` — effective status as a function of the clock.
//!   `Locked → Ready` is never written to disk; it is re-derived on
//!   demand, so no background job exists anywhere in the system.
//! - `attempt_claim` — guarded decryption. The `Claimed` status is
//!   persisted via compare-and-set *before* the plaintext key is
//!   returned, so a crash after the write can lose the secret in
//!   transit but never the fact that it was released.
//!
//! Caller identity is an explicit parameter on every owner-scoped
//! operation; the ledger reads no ambient session state.

use chrono::{DateTime, Duration, Utc};
use secrecy::SecretString;

use crate::envelope::{self, EnvelopeError, KdfParams};
use crate::keypair;
use crate::storage::{Gift, GiftDatabase, GiftDbError, GiftStatus, TokenBinding};

/// Errors from gift creation and lookups.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("unlock instant must be strictly in the future")]
    UnlockNotInFuture,

    #[error("passphrase must not be empty")]
    EmptyPassphrase,

    #[error("token id must not be empty")]
    EmptyTokenId,

    #[error("token {0} is already bound to a gift")]
    TokenAlreadyBound(String),

    #[error("no gift bound to token {0}")]
    TokenNotFound(String),

    #[error("gift not found: {0}")]
    GiftNotFound(String),

    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    #[error("store error: {0}")]
    Store(#[from] GiftDbError),
}

/// Every claim attempt resolves to exactly one of these outcomes.
#[derive(Debug, thiserror::Error)]
pub enum ClaimError {
    #[error("gift not found: {0}")]
    NotFound(String),

    /// The gift's key was already released; terminal for every caller,
    /// passphrase-correct or not.
    #[error("gift already claimed")]
    AlreadyClaimed,

    /// The unlock instant has not passed yet.
    #[error("gift is still locked for {remaining}")]
    StillLocked { remaining: Duration },

    /// Wrong passphrase or corrupted envelope; the gift stays claimable
    /// and the caller may retry.
    #[error("decryption failed")]
    DecryptionFailed,

    #[error("store error: {0}")]
    Store(#[from] GiftDbError),
}

/// Inputs for creating a gift.
///
/// Does not implement `Debug`; the passphrase must never reach a log line.
#[derive(Clone)]
pub struct CreateGiftParams {
    /// Physical token (NFC card UID) to bind the gift to.
    pub token_id: String,
    /// Free-text note from giver to receiver.
    pub message: String,
    /// Passphrase shared out-of-band between giver and receiver.
    pub passphrase: String,
    /// Instant after which the gift becomes claimable.
    pub unlock_at: DateTime<Utc>,
    /// Optional display name for the intended receiver.
    pub receiver_label: Option<String>,
}

/// A successfully claimed private key.
///
/// Returned to the winning caller exactly once; the store already says
/// `Claimed` by the time this value exists.
pub struct ClaimedKey {
    /// The claimed gift's id.
    pub gift_id: String,
    /// Public address of the gifted keypair.
    pub public_address: String,
    /// The decrypted private key.
    pub private_key: SecretString,
}

/// Derive a gift's effective status from the clock.
///
/// Only `Claimed` requires a durable write; `Ready` is a pure function
/// of `now` versus `unlock_at`, recomputed on every call. Clients may
/// poll this at any cadence (a UI countdown ticks once per second);
/// polling has no effect on correctness.
pub fn compute_status(gift: &Gift, now: DateTime<Utc>) -> GiftStatus {
    match gift.status {
        GiftStatus::Claimed => GiftStatus::Claimed,
        _ if now >= gift.unlock_at => GiftStatus::Ready,
        _ => GiftStatus::Locked,
    }
}

/// The gift lifecycle orchestrator.
pub struct GiftLedger {
    db: GiftDatabase,
    kdf_params: KdfParams,
}

impl GiftLedger {
    /// Create a ledger over an open gift database, sealing with the
    /// default KDF parameters.
    pub fn new(db: GiftDatabase) -> Self {
        Self::with_kdf_params(db, KdfParams::default())
    }

    /// Create a ledger with explicit KDF parameters (lighter parameters
    /// keep tests fast).
    pub fn with_kdf_params(db: GiftDatabase, kdf_params: KdfParams) -> Self {
        Self { db, kdf_params }
    }

    /// Create a gift: generate a fresh keypair, seal its private key
    /// under the passphrase, and persist the gift together with its
    /// token binding in one atomic write.
    ///
    /// Validation happens before any side effect. A token that is
    /// already bound fails the whole operation; no unbound gift is ever
    /// left behind.
    pub fn create_gift(
        &self,
        owner_subject: &str,
        params: CreateGiftParams,
        now: DateTime<Utc>,
    ) -> Result<Gift, LedgerError> {
        if params.unlock_at <= now {
            return Err(LedgerError::UnlockNotInFuture);
        }
        if params.passphrase.is_empty() {
            return Err(LedgerError::EmptyPassphrase);
        }
        if params.token_id.is_empty() {
            return Err(LedgerError::EmptyTokenId);
        }

        let keypair = keypair::generate();
        let sealed_key = envelope::seal(&keypair.private_key, &params.passphrase, &self.kdf_params)?;

        let gift = Gift {
            gift_id: uuid::Uuid::new_v4().to_string(),
            owner_subject: owner_subject.to_string(),
            public_address: keypair.public_address,
            sealed_key,
            message: params.message,
            receiver_label: params.receiver_label,
            created_at: now,
            unlock_at: params.unlock_at,
            status: GiftStatus::Locked,
        };
        let binding = TokenBinding {
            token_id: params.token_id,
            gift_id: gift.gift_id.clone(),
            created_at: now,
        };

        self.db
            .insert_gift_with_binding(&gift, &binding)
            .map_err(|e| match e {
                GiftDbError::TokenAlreadyBound(token) => LedgerError::TokenAlreadyBound(token),
                other => LedgerError::Store(other),
            })?;

        tracing::info!(
            gift_id = %gift.gift_id,
            public_address = %gift.public_address,
            unlock_at = %gift.unlock_at,
            "Gift created and bound"
        );

        Ok(gift)
    }

    /// Resolve a scanned token to its bound gift. Pure lookup.
    pub fn resolve_token(&self, token_id: &str) -> Result<Gift, LedgerError> {
        let binding = self
            .db
            .get_token_binding(token_id)?
            .ok_or_else(|| LedgerError::TokenNotFound(token_id.to_string()))?;

        self.db
            .get_gift(&binding.gift_id)?
            .ok_or_else(|| LedgerError::GiftNotFound(binding.gift_id))
    }

    /// Fetch a gift by id.
    pub fn get_gift(&self, gift_id: &str) -> Result<Gift, LedgerError> {
        self.db
            .get_gift(gift_id)?
            .ok_or_else(|| LedgerError::GiftNotFound(gift_id.to_string()))
    }

    /// List an owner's gifts, newest first.
    pub fn list_gifts_by_owner(&self, owner_subject: &str) -> Result<Vec<Gift>, LedgerError> {
        Ok(self.db.list_gifts_by_owner(owner_subject)?)
    }

    /// Attempt to claim a gift.
    ///
    /// Guards run in a fixed order: existence, already-claimed,
    /// time-lock, decryption. On successful decryption the status is
    /// advanced `Locked → Claimed` by an atomic compare-and-set; losing
    /// a race against another claimer yields [`ClaimError::AlreadyClaimed`]
    /// even though this caller's passphrase was correct, so at most one
    /// caller ever receives the plaintext key.
    pub fn attempt_claim(
        &self,
        gift_id: &str,
        passphrase: &str,
        now: DateTime<Utc>,
    ) -> Result<ClaimedKey, ClaimError> {
        let gift = self
            .db
            .get_gift(gift_id)?
            .ok_or_else(|| ClaimError::NotFound(gift_id.to_string()))?;

        if gift.status == GiftStatus::Claimed {
            return Err(ClaimError::AlreadyClaimed);
        }

        if now < gift.unlock_at {
            return Err(ClaimError::StillLocked {
                remaining: gift.unlock_at - now,
            });
        }

        let private_key = envelope::open(&gift.sealed_key, passphrase)
            .map_err(|_| ClaimError::DecryptionFailed)?;

        // Persist the irreversible fact before releasing the secret.
        match self
            .db
            .compare_and_set_status(gift_id, GiftStatus::Locked, GiftStatus::Claimed)
        {
            Ok(_) => {}
            Err(GiftDbError::StaleWrite { .. }) => return Err(ClaimError::AlreadyClaimed),
            Err(GiftDbError::NotFound(id)) => return Err(ClaimError::NotFound(id)),
            Err(other) => return Err(ClaimError::Store(other)),
        }

        tracing::info!(gift_id = %gift.gift_id, "Gift claimed");

        Ok(ClaimedKey {
            gift_id: gift.gift_id,
            public_address: gift.public_address,
            private_key,
        })
    }
}
