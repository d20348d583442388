// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Vloo Labs

//! Receiver-side endpoints: token resolution, countdown polling, and
//! the claim itself.
//!
//! None of these require authentication — the receiver holds no account.
//! Possession of the physical token plus knowledge of the passphrase are
//! the credentials. Responses never reveal the giver's subject id.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use secrecy::ExposeSecret;

use crate::{
    audit_log,
    error::ApiError,
    ledger::{ClaimError, LedgerError},
    models::{
        ClaimRequest, ClaimResponse, GiftResponse, GiftStatusResponse, TokenId,
        TokenResolveResponse,
    },
    state::AppState,
    storage::{AuditEvent, AuditEventType},
};

/// Resolve a scanned token to its bound gift.
///
/// This is the receiver's entry point: the NFC card UID read by the
/// device maps to exactly one gift. Pure lookup; nothing is mutated.
#[utoipa::path(
    get,
    path = "/v1/tokens/{token_id}",
    tag = "Claims",
    params(
        ("token_id" = String, Path, description = "Physical token identifier (NFC UID)")
    ),
    responses(
        (status = 200, description = "The gift bound to this token", body = TokenResolveResponse),
        (status = 404, description = "No gift bound to this token")
    )
)]
pub async fn resolve_token(
    State(state): State<AppState>,
    Path(token_id): Path<String>,
) -> Result<Json<TokenResolveResponse>, ApiError> {
    let now = Utc::now();

    let gift = state.ledger().resolve_token(&token_id).map_err(|e| match e {
        LedgerError::TokenNotFound(_) => {
            ApiError::not_found(format!("No gift bound to token {token_id}"))
        }
        other => {
            tracing::error!(error = %other, "Failed to resolve token");
            ApiError::internal("Failed to resolve token")
        }
    })?;

    audit_log!(
        state.audit(),
        AuditEvent::new(AuditEventType::TokenResolved)
            .with_resource("token", &token_id)
            .with_details(serde_json::json!({ "gift_id": gift.gift_id.clone() }))
    );

    Ok(Json(TokenResolveResponse {
        token_id: TokenId(token_id),
        gift: GiftResponse::from_gift(&gift, now),
    }))
}

/// Poll a gift's effective status.
///
/// Drives the receiver's countdown UI. The `Locked → Ready` transition
/// is computed from the clock on every call; polling cadence is the
/// client's choice and has no effect on correctness.
#[utoipa::path(
    get,
    path = "/v1/gifts/{gift_id}/status",
    tag = "Claims",
    params(
        ("gift_id" = String, Path, description = "Gift ID")
    ),
    responses(
        (status = 200, description = "Effective status", body = GiftStatusResponse),
        (status = 404, description = "Gift not found")
    )
)]
pub async fn gift_status(
    State(state): State<AppState>,
    Path(gift_id): Path<String>,
) -> Result<Json<GiftStatusResponse>, ApiError> {
    let now = Utc::now();

    let gift = state
        .ledger()
        .get_gift(&gift_id)
        .map_err(|_| ApiError::not_found(format!("Gift {gift_id} not found")))?;

    Ok(Json(GiftStatusResponse::from_gift(&gift, now)))
}

/// Attempt to claim a gift.
///
/// On success the decrypted private key is returned — once. The claimed
/// status is durably written before the key leaves the service, so a
/// crash mid-response can lose the key in transit but never release it
/// twice.
#[utoipa::path(
    post,
    path = "/v1/gifts/{gift_id}/claim",
    tag = "Claims",
    request_body = ClaimRequest,
    params(
        ("gift_id" = String, Path, description = "Gift ID")
    ),
    responses(
        (status = 200, description = "Claim succeeded; private key released", body = ClaimResponse),
        (status = 400, description = "Empty passphrase"),
        (status = 404, description = "Gift not found"),
        (status = 409, description = "Gift already claimed"),
        (status = 422, description = "Wrong passphrase or corrupted envelope"),
        (status = 423, description = "Gift is still time-locked")
    )
)]
pub async fn claim_gift(
    State(state): State<AppState>,
    Path(gift_id): Path<String>,
    Json(request): Json<ClaimRequest>,
) -> Result<Json<ClaimResponse>, ApiError> {
    let now = Utc::now();

    if request.passphrase.is_empty() {
        return Err(ApiError::bad_request("Passphrase must not be empty"));
    }

    match state.ledger().attempt_claim(&gift_id, &request.passphrase, now) {
        Ok(claimed) => {
            audit_log!(
                state.audit(),
                AuditEvent::new(AuditEventType::ClaimSucceeded)
                    .with_resource("gift", &claimed.gift_id)
            );

            Ok(Json(ClaimResponse {
                gift_id: claimed.gift_id,
                public_address: claimed.public_address,
                private_key: claimed.private_key.expose_secret().to_string(),
                message: "Gift claimed. Import this private key immediately; it cannot be retrieved again.".to_string(),
            }))
        }
        Err(e) => {
            audit_log!(
                state.audit(),
                AuditEvent::new(AuditEventType::ClaimRejected)
                    .with_resource("gift", &gift_id)
                    .failed(claim_rejection_reason(&e))
            );

            Err(match e {
                ClaimError::NotFound(_) => ApiError::not_found(format!("Gift {gift_id} not found")),
                ClaimError::AlreadyClaimed => {
                    ApiError::conflict("This gift has already been claimed")
                }
                ClaimError::StillLocked { remaining } => {
                    let millis = remaining.num_milliseconds();
                    let seconds = {
                        let q = millis / 1000;
                        if millis % 1000 > 0 { q + 1 } else { q }
                    };
                    ApiError::locked(format!("Gift unlocks in {seconds} seconds"))
                }
                ClaimError::DecryptionFailed => {
                    // Wrong passphrase and corrupted data are deliberately
                    // indistinguishable.
                    ApiError::unprocessable("Decryption failed")
                }
                ClaimError::Store(err) => {
                    tracing::error!(error = %err, "Claim failed on store error");
                    ApiError::internal("Failed to process claim")
                }
            })
        }
    }
}

/// Audit-trail label for a rejected claim. Never includes the passphrase.
fn claim_rejection_reason(error: &ClaimError) -> &'static str {
    match error {
        ClaimError::NotFound(_) => "not_found",
        ClaimError::AlreadyClaimed => "already_claimed",
        ClaimError::StillLocked { .. } => "still_locked",
        ClaimError::DecryptionFailed => "decryption_failed",
        ClaimError::Store(_) => "store_error",
    }
}
