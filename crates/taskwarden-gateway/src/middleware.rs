use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;

use taskwarden_core::config::GatewayConfig;

use crate::state::AppState;

/// Extractor that checks the `Authorization: Bearer` header against
/// `gateway.token`. Without a configured token every request passes.
pub struct Authenticated;

impl FromRequestParts<Arc<AppState>> for Authenticated {
    type Rejection = StatusCode;

    fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let bearer = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.strip_prefix("Bearer "));

        let allowed = validate_bearer(&state.config, bearer);

        async move {
            if allowed {
                Ok(Authenticated)
            } else {
                Err(StatusCode::UNAUTHORIZED)
            }
        }
    }
}

pub fn validate_bearer(config: &GatewayConfig, bearer: Option<&str>) -> bool {
    match config.token.as_deref() {
        None => true,
        Some(expected) => bearer == Some(expected),
    }
}
