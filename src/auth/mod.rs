// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Vloo Labs

//! Caller identity extraction.
//!
//! Authentication itself lives outside this service: the fronting
//! gateway verifies the giver's session and forwards the canonical
//! subject id in the [`SUBJECT_HEADER`] header. This module turns that
//! header into an [`AuthenticatedUser`] via an axum extractor, so every
//! handler receives identity explicitly and no code path reads ambient
//! session state.
//!
//! Receiver-side endpoints (token resolution, status poll, claim) are
//! unauthenticated: the receiver holds no account — possession of the
//! token and knowledge of the passphrase are the credentials.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::ApiError;

/// Header carrying the gateway-verified subject id.
pub const SUBJECT_HEADER: &str = "x-vloo-subject";

/// The caller identity for owner-scoped operations.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthenticatedUser {
    /// Opaque canonical subject id of the giver.
    pub subject: String,
}

/// Extractor wrapper: `Auth(user): Auth` in a handler signature.
#[derive(Debug)]
pub struct Auth(pub AuthenticatedUser);

impl<S> FromRequestParts<S> for Auth
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let subject = parts
            .headers
            .get(SUBJECT_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|subject| !subject.is_empty());

        match subject {
            Some(subject) => Ok(Auth(AuthenticatedUser {
                subject: subject.to_string(),
            })),
            None => Err(ApiError::unauthorized(format!(
                "Missing or empty {SUBJECT_HEADER} header"
            ))),
        }
    }
}
