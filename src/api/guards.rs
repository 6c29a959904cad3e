use async_trait::async_trait;
use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;

use crate::api::errors::ApiError;
use crate::core::state::AppState;

pub(crate) const ADMIN_KEY_HEADER: &str = "x-admin-key";

/// Caller presented the configured administrative key.
pub(crate) struct AdminKey;

#[async_trait]
impl FromRequestParts<AppState> for AdminKey {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let State(app_state) = State::<AppState>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to access application state"))?;

        let expected = app_state.settings().admin().api_key.as_str();
        if expected.is_empty() {
            return Err(ApiError::Forbidden("Administrative API is disabled"));
        }

        let presented = parts
            .headers
            .get(ADMIN_KEY_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or(ApiError::Unauthorized("Admin key required"))?;

        if keys_match(presented.as_bytes(), expected.as_bytes()) {
            Ok(AdminKey)
        } else {
            tracing::warn!(action = "admin_key_rejected", "Invalid admin key presented");
            Err(ApiError::Forbidden("Invalid admin key"))
        }
    }
}

fn keys_match(presented: &[u8], expected: &[u8]) -> bool {
    if presented.len() != expected.len() {
        return false;
    }
    presented.iter().zip(expected).fold(0u8, |acc, (a, b)| acc | (a ^ b)) == 0
}

#[cfg(test)]
mod tests {
    use super::keys_match;

    #[test]
    fn keys_must_match_exactly() {
        assert!(keys_match(b"secret", b"secret"));
        assert!(!keys_match(b"secret", b"secreT"));
        assert!(!keys_match(b"secret", b"secret-longer"));
        assert!(!keys_match(b"", b"secret"));
    }
}
