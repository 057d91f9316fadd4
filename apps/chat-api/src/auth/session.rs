//! Session-token extraction for REST routes.

use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use crate::AppState;

/// Credentials carried by every authenticated REST request.
#[derive(Debug, Deserialize)]
struct SessionParams {
    id: i32,
    session_id: String,
}

/// Authenticated user extracted from the `id` + `session_id` query
/// parameters, validated against the credential store.
#[derive(Debug, Clone)]
pub struct SessionUser {
    pub user_id: i32,
}

/// Rejection returned when credentials are missing or invalid.
pub struct AuthError {
    message: &'static str,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": {
                "code": "UNAUTHORIZED",
                "message": self.message
            }
        });
        (StatusCode::UNAUTHORIZED, Json(body)).into_response()
    }
}

impl FromRequestParts<AppState> for SessionUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Query(params) =
            Query::<SessionParams>::try_from_uri(&parts.uri).map_err(|_| AuthError {
                message: "Missing id or session_id",
            })?;

        // Fail closed: a lookup error reads the same as a bad token.
        let valid = state
            .credentials
            .validate(params.id, &params.session_id)
            .await
            .unwrap_or(false);
        if !valid {
            return Err(AuthError {
                message: "Invalid credentials",
            });
        }

        Ok(SessionUser {
            user_id: params.id,
        })
    }
}
