// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Vloo Labs

//! Giver-side gift endpoints.
//!
//! These endpoints handle gift creation (including the token binding)
//! and the giver's dashboard listing. All of them require the
//! gateway-verified subject header and enforce ownership.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;

use crate::{
    audit_log,
    auth::Auth,
    error::ApiError,
    ledger::{CreateGiftParams, LedgerError},
    models::{CreateGiftRequest, CreateGiftResponse, GiftListResponse, GiftResponse},
    state::AppState,
    storage::{AuditEvent, AuditEventType},
};

/// Create a gift and bind it to a token.
///
/// Generates a fresh keypair, seals its private key under the supplied
/// passphrase, and persists the gift together with its token binding in
/// one atomic write. The passphrase is used for sealing only and never
/// stored or logged.
#[utoipa::path(
    post,
    path = "/v1/gifts",
    tag = "Gifts",
    request_body = CreateGiftRequest,
    responses(
        (status = 201, description = "Gift created and bound", body = CreateGiftResponse),
        (status = 400, description = "Invalid unlock instant, passphrase, or token"),
        (status = 401, description = "Unauthorized"),
        (status = 409, description = "Token is already bound to a gift"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn create_gift(
    Auth(user): Auth,
    State(state): State<AppState>,
    Json(request): Json<CreateGiftRequest>,
) -> Result<(StatusCode, Json<CreateGiftResponse>), ApiError> {
    let now = Utc::now();
    let token_id = request.token_id.clone();

    let params = CreateGiftParams {
        token_id: request.token_id.into(),
        message: request.message,
        passphrase: request.passphrase,
        unlock_at: request.unlock_at,
        receiver_label: request.receiver_label,
    };

    let gift = state
        .ledger()
        .create_gift(&user.subject, params, now)
        .map_err(|e| match e {
            LedgerError::UnlockNotInFuture
            | LedgerError::EmptyPassphrase
            | LedgerError::EmptyTokenId => ApiError::bad_request(e.to_string()),
            LedgerError::TokenAlreadyBound(token) => {
                ApiError::conflict(format!("Token {token} is already bound to a gift"))
            }
            other => {
                tracing::error!(error = %other, "Failed to create gift");
                ApiError::internal("Failed to create gift")
            }
        })?;

    audit_log!(
        state.audit(),
        AuditEvent::new(AuditEventType::GiftCreated)
            .with_subject(&user.subject)
            .with_resource("gift", &gift.gift_id)
            .with_details(serde_json::json!({ "token_id": token_id.0.clone() }))
    );

    let response = CreateGiftResponse {
        gift: GiftResponse::from_gift(&gift, now),
        token_id,
        message: "Gift created and bound successfully".to_string(),
    };

    Ok((StatusCode::CREATED, Json(response)))
}

/// List all gifts owned by the authenticated giver, newest first.
#[utoipa::path(
    get,
    path = "/v1/gifts",
    tag = "Gifts",
    responses(
        (status = 200, description = "List of gifts", body = GiftListResponse),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn list_gifts(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<Json<GiftListResponse>, ApiError> {
    let now = Utc::now();

    let gifts = state
        .ledger()
        .list_gifts_by_owner(&user.subject)
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to list gifts");
            ApiError::internal("Failed to list gifts")
        })?;

    let gift_responses: Vec<GiftResponse> = gifts
        .iter()
        .map(|gift| GiftResponse::from_gift(gift, now))
        .collect();
    let total = gift_responses.len();

    Ok(Json(GiftListResponse {
        gifts: gift_responses,
        total,
    }))
}

/// Get a specific gift by id.
///
/// Only returns gifts owned by the authenticated giver.
#[utoipa::path(
    get,
    path = "/v1/gifts/{gift_id}",
    tag = "Gifts",
    params(
        ("gift_id" = String, Path, description = "Gift ID")
    ),
    responses(
        (status = 200, description = "Gift details", body = GiftResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - not your gift"),
        (status = 404, description = "Gift not found")
    )
)]
pub async fn get_gift(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(gift_id): Path<String>,
) -> Result<Json<GiftResponse>, ApiError> {
    let now = Utc::now();

    let gift = state
        .ledger()
        .get_gift(&gift_id)
        .map_err(|_| ApiError::not_found(format!("Gift {gift_id} not found")))?;

    if gift.owner_subject != user.subject {
        audit_log!(
            state.audit(),
            AuditEvent::new(AuditEventType::PermissionDenied)
                .with_subject(&user.subject)
                .with_resource("gift", &gift.gift_id)
                .failed("not the owner")
        );
        return Err(ApiError::forbidden(
            "You don't have permission to access this gift",
        ));
    }

    audit_log!(
        state.audit(),
        AuditEvent::new(AuditEventType::GiftAccessed)
            .with_subject(&user.subject)
            .with_resource("gift", &gift.gift_id)
    );

    Ok(Json(GiftResponse::from_gift(&gift, now)))
}
