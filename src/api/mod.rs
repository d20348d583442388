// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Vloo Labs

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    models::{
        ClaimRequest, ClaimResponse, CreateGiftRequest, CreateGiftResponse, GiftListResponse,
        GiftResponse, GiftStatusResponse, TokenId, TokenResolveResponse,
    },
    state::AppState,
    storage::GiftStatus,
};

pub mod claims;
pub mod gifts;
pub mod health;

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route("/gifts", post(gifts::create_gift).get(gifts::list_gifts))
        .route("/gifts/{gift_id}", get(gifts::get_gift))
        .route("/gifts/{gift_id}/status", get(claims::gift_status))
        .route("/gifts/{gift_id}/claim", post(claims::claim_gift))
        .route("/tokens/{token_id}", get(claims::resolve_token));

    Router::new()
        .nest("/v1", v1_routes)
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        gifts::create_gift,
        gifts::list_gifts,
        gifts::get_gift,
        claims::resolve_token,
        claims::gift_status,
        claims::claim_gift,
        health::health,
        health::liveness
    ),
    components(
        schemas(
            TokenId,
            GiftStatus,
            CreateGiftRequest,
            CreateGiftResponse,
            GiftResponse,
            GiftListResponse,
            TokenResolveResponse,
            GiftStatusResponse,
            ClaimRequest,
            ClaimResponse
        )
    ),
    tags(
        (name = "Gifts", description = "Giver-side gift creation and dashboard"),
        (name = "Claims", description = "Receiver-side token resolution and claiming"),
        (name = "Health", description = "Liveness and readiness probes")
    )
)]
struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::SUBJECT_HEADER;
    use crate::envelope::KdfParams;
    use crate::ledger::GiftLedger;
    use crate::storage::{AuditRepository, GiftDatabase, StoragePaths};
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use chrono::{Duration, Utc};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn test_app() -> (Router, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let paths = StoragePaths::new(dir.path());
        let db = GiftDatabase::open(&paths.gift_db_file()).expect("Failed to open db");
        let ledger = GiftLedger::with_kdf_params(
            db,
            KdfParams {
                m_cost: 256,
                t_cost: 1,
                p_cost: 1,
            },
        );
        let state = AppState::new(ledger, AuditRepository::new(paths));
        (router(state), dir)
    }

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        subject: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(subject) = subject {
            builder = builder.header(SUBJECT_HEADER, subject);
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    fn create_body(token_id: &str, passphrase: &str, unlock_offset_ms: i64) -> Value {
        json!({
            "token_id": token_id,
            "message": "happy birthday",
            "passphrase": passphrase,
            "unlock_at": (Utc::now() + Duration::milliseconds(unlock_offset_ms)).to_rfc3339(),
            "receiver_label": "Ada",
        })
    }

    #[tokio::test]
    async fn router_builds_with_all_routes() {
        let (app, _dir) = test_app();
        let _ = app.into_make_service();
    }

    #[tokio::test]
    async fn health_endpoints_respond() {
        let (app, _dir) = test_app();

        let (status, body) = send(&app, Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["checks"]["store"], "ok");

        let (status, body) = send(&app, Method::GET, "/health/live", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn create_requires_subject_header() {
        let (app, _dir) = test_app();
        let (status, _) = send(
            &app,
            Method::POST,
            "/v1/gifts",
            None,
            Some(create_body("nfc-1", "pass", 60_000)),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn create_list_and_resolve_flow() {
        let (app, _dir) = test_app();

        let (status, body) = send(
            &app,
            Method::POST,
            "/v1/gifts",
            Some("giver-1"),
            Some(create_body("nfc-1", "pass", 60_000)),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["gift"]["status"], "locked");
        assert_eq!(body["token_id"], "nfc-1");
        let gift_id = body["gift"]["gift_id"].as_str().unwrap().to_string();

        // No secret material in the create response.
        let raw = body.to_string();
        assert!(!raw.contains("private_key"));
        assert!(!raw.contains("ciphertext"));

        // Dashboard listing.
        let (status, body) = send(&app, Method::GET, "/v1/gifts", Some("giver-1"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 1);
        assert_eq!(body["gifts"][0]["gift_id"], gift_id.as_str());

        // Another giver sees nothing.
        let (status, body) = send(&app, Method::GET, "/v1/gifts", Some("giver-2"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 0);

        // The receiver resolves the token without authentication.
        let (status, body) = send(&app, Method::GET, "/v1/tokens/nfc-1", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["gift"]["gift_id"], gift_id.as_str());
        assert!(body["gift"].get("owner_subject").is_none());

        // Unknown tokens are a 404.
        let (status, _) = send(&app, Method::GET, "/v1/tokens/nfc-unknown", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn duplicate_token_binding_conflicts() {
        let (app, _dir) = test_app();

        let (status, _) = send(
            &app,
            Method::POST,
            "/v1/gifts",
            Some("giver-1"),
            Some(create_body("nfc-1", "pass", 60_000)),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, _) = send(
            &app,
            Method::POST,
            "/v1/gifts",
            Some("giver-2"),
            Some(create_body("nfc-1", "other", 60_000)),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn create_rejects_invalid_input() {
        let (app, _dir) = test_app();

        let (status, _) = send(
            &app,
            Method::POST,
            "/v1/gifts",
            Some("giver-1"),
            Some(create_body("nfc-1", "pass", -1_000)),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            Method::POST,
            "/v1/gifts",
            Some("giver-1"),
            Some(create_body("nfc-1", "", 60_000)),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn ownership_is_enforced_on_get() {
        let (app, _dir) = test_app();

        let (_, body) = send(
            &app,
            Method::POST,
            "/v1/gifts",
            Some("giver-1"),
            Some(create_body("nfc-1", "pass", 60_000)),
        )
        .await;
        let gift_id = body["gift"]["gift_id"].as_str().unwrap().to_string();

        let (status, _) = send(
            &app,
            Method::GET,
            &format!("/v1/gifts/{gift_id}"),
            Some("giver-1"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(
            &app,
            Method::GET,
            &format!("/v1/gifts/{gift_id}"),
            Some("someone-else"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn status_poll_reports_countdown() {
        let (app, _dir) = test_app();

        let (_, body) = send(
            &app,
            Method::POST,
            "/v1/gifts",
            Some("giver-1"),
            Some(create_body("nfc-1", "pass", 60_000)),
        )
        .await;
        let gift_id = body["gift"]["gift_id"].as_str().unwrap().to_string();

        let (status, body) = send(
            &app,
            Method::GET,
            &format!("/v1/gifts/{gift_id}/status"),
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "locked");
        let remaining = body["remaining_seconds"].as_i64().unwrap();
        assert!(remaining > 0 && remaining <= 60);
    }

    #[tokio::test]
    async fn claim_before_unlock_is_locked() {
        let (app, _dir) = test_app();

        let (_, body) = send(
            &app,
            Method::POST,
            "/v1/gifts",
            Some("giver-1"),
            Some(create_body("nfc-1", "pass", 60_000)),
        )
        .await;
        let gift_id = body["gift"]["gift_id"].as_str().unwrap().to_string();

        let (status, _) = send(
            &app,
            Method::POST,
            &format!("/v1/gifts/{gift_id}/claim"),
            None,
            Some(json!({ "passphrase": "pass" })),
        )
        .await;
        assert_eq!(status, StatusCode::LOCKED);
    }

    #[tokio::test]
    async fn claim_lifecycle_over_http() {
        let (app, _dir) = test_app();

        // Unlock almost immediately so the test can wait it out.
        let (_, body) = send(
            &app,
            Method::POST,
            "/v1/gifts",
            Some("giver-1"),
            Some(create_body("nfc-1", "correct-horse", 200)),
        )
        .await;
        let gift_id = body["gift"]["gift_id"].as_str().unwrap().to_string();
        let claim_uri = format!("/v1/gifts/{gift_id}/claim");

        tokio::time::sleep(std::time::Duration::from_millis(400)).await;

        // Empty passphrase is rejected before any crypto runs.
        let (status, _) = send(
            &app,
            Method::POST,
            &claim_uri,
            None,
            Some(json!({ "passphrase": "" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        // Wrong passphrase: rejected, gift stays claimable.
        let (status, _) = send(
            &app,
            Method::POST,
            &claim_uri,
            None,
            Some(json!({ "passphrase": "wrong" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        // Correct passphrase: the key comes back exactly once.
        let (status, body) = send(
            &app,
            Method::POST,
            &claim_uri,
            None,
            Some(json!({ "passphrase": "correct-horse" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let key = body["private_key"].as_str().unwrap();
        assert!(key.starts_with("0x"));
        assert_eq!(key.len(), 66);

        // Repeat claim: already claimed, regardless of passphrase.
        let (status, _) = send(
            &app,
            Method::POST,
            &claim_uri,
            None,
            Some(json!({ "passphrase": "correct-horse" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        // The status poll agrees.
        let (_, body) = send(
            &app,
            Method::GET,
            &format!("/v1/gifts/{gift_id}/status"),
            None,
            None,
        )
        .await;
        assert_eq!(body["status"], "claimed");
    }
}
