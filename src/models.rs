// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Vloo Labs

//! # API Data Models
//!
//! This module defines the request and response data structures used by
//! the REST API. All types derive `Serialize`, `Deserialize`, and `ToSchema`
//! for automatic JSON handling and OpenAPI documentation.
//!
//! ## Token Id Type
//!
//! The [`TokenId`] newtype wraps physical token identifiers (NFC card
//! UIDs). It provides type safety and clear semantics.
//!
//! ## Secrecy Rule
//!
//! No response type in this module carries the sealed envelope or a
//! private key, with one deliberate exception: [`ClaimResponse`], which
//! exists precisely to hand the decrypted key to the winning claimer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::ledger;
use crate::storage::{Gift, GiftStatus};

// =============================================================================
// Token Id Type
// =============================================================================

/// Physical token identifier wrapper (e.g. an NFC card UID).
///
/// # Example
///
/// ```rust,ignore
/// let token = TokenId::from("04:a2:19:5c:77:80:01");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenId(pub String);

impl std::fmt::Display for TokenId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TokenId {
    fn from(value: String) -> Self {
        TokenId(value)
    }
}

impl From<&str> for TokenId {
    fn from(value: &str) -> Self {
        TokenId(value.to_string())
    }
}

impl From<TokenId> for String {
    fn from(value: TokenId) -> Self {
        value.0
    }
}

// =============================================================================
// Gift Models
// =============================================================================

/// Request to create a gift and bind it to a token.
#[derive(Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateGiftRequest {
    /// The physical token to bind (must not be bound already).
    pub token_id: TokenId,
    /// Free-text note shown to the receiver.
    pub message: String,
    /// Passphrase shared out-of-band with the receiver. Never stored.
    pub passphrase: String,
    /// Instant after which the gift becomes claimable (must be in the future).
    pub unlock_at: DateTime<Utc>,
    /// Optional display name for the intended receiver.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receiver_label: Option<String>,
}

// Manual Debug: the passphrase must never reach a log line.
impl std::fmt::Debug for CreateGiftRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreateGiftRequest")
            .field("token_id", &self.token_id)
            .field("message", &self.message)
            .field("passphrase", &"[REDACTED]")
            .field("unlock_at", &self.unlock_at)
            .field("receiver_label", &self.receiver_label)
            .finish()
    }
}

/// A gift as returned to API clients (never includes the sealed key).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GiftResponse {
    /// Unique gift identifier.
    pub gift_id: String,
    /// Public address of the gifted keypair.
    pub public_address: String,
    /// Note from the giver.
    pub message: String,
    /// Optional display name for the intended receiver.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receiver_label: Option<String>,
    /// When the gift was created.
    pub created_at: DateTime<Utc>,
    /// The unlock instant.
    pub unlock_at: DateTime<Utc>,
    /// Effective status at response time.
    pub status: GiftStatus,
}

impl GiftResponse {
    /// Build a response view with the status derived from `now`.
    pub fn from_gift(gift: &Gift, now: DateTime<Utc>) -> Self {
        Self {
            gift_id: gift.gift_id.clone(),
            public_address: gift.public_address.clone(),
            message: gift.message.clone(),
            receiver_label: gift.receiver_label.clone(),
            created_at: gift.created_at,
            unlock_at: gift.unlock_at,
            status: ledger::compute_status(gift, now),
        }
    }
}

/// Response after creating a gift.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateGiftResponse {
    /// The created gift details.
    pub gift: GiftResponse,
    /// The token the gift was bound to.
    pub token_id: TokenId,
    /// Message indicating success.
    pub message: String,
}

/// Response containing a list of gifts.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GiftListResponse {
    /// Gifts owned by the caller, newest first.
    pub gifts: Vec<GiftResponse>,
    /// Total count of gifts.
    pub total: usize,
}

// =============================================================================
// Token Resolution Models
// =============================================================================

/// Response for a resolved token (the receiver's scan).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenResolveResponse {
    /// The scanned token.
    pub token_id: TokenId,
    /// The gift the token unlocks.
    pub gift: GiftResponse,
}

// =============================================================================
// Status Poll Models
// =============================================================================

/// Response for the status poll (a UI countdown ticks against this).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GiftStatusResponse {
    /// The gift being polled.
    pub gift_id: String,
    /// Effective status at response time.
    pub status: GiftStatus,
    /// The unlock instant.
    pub unlock_at: DateTime<Utc>,
    /// Whole seconds until unlock (rounded up); absent once unlocked.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_seconds: Option<i64>,
}

impl GiftStatusResponse {
    /// Build a status view for `now`.
    pub fn from_gift(gift: &Gift, now: DateTime<Utc>) -> Self {
        let status = ledger::compute_status(gift, now);
        let remaining_seconds = match status {
            GiftStatus::Locked => {
                let millis = (gift.unlock_at - now).num_milliseconds();
                // Round up so a poll 1ms before unlock still reports 1.
                let q = millis / 1000;
                Some(if millis % 1000 > 0 { q + 1 } else { q })
            }
            _ => None,
        };
        Self {
            gift_id: gift.gift_id.clone(),
            status,
            unlock_at: gift.unlock_at,
            remaining_seconds,
        }
    }
}

// =============================================================================
// Claim Models
// =============================================================================

/// Request to claim a gift.
#[derive(Clone, Serialize, Deserialize, ToSchema)]
pub struct ClaimRequest {
    /// The passphrase shared by the giver.
    pub passphrase: String,
}

impl std::fmt::Debug for ClaimRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaimRequest")
            .field("passphrase", &"[REDACTED]")
            .finish()
    }
}

/// Response for a winning claim.
///
/// The only payload anywhere in the API that carries a plaintext private
/// key. It is produced at most once per gift.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ClaimResponse {
    /// The claimed gift's id.
    pub gift_id: String,
    /// Public address of the gifted keypair.
    pub public_address: String,
    /// The decrypted private key. Import it immediately; it is not
    /// retrievable again.
    pub private_key: String,
    /// Message indicating success.
    pub message: String,
}
