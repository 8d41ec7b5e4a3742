use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use sha2::{Digest, Sha256};

use crate::tournament::PrincipalId;
use crate::upstream::{AuthError, IdentityVerifier};

use super::error::ApiError;

pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers.get(AUTHORIZATION).ok_or(AuthError::Missing)?;
    let value = value.to_str().map_err(|_| AuthError::Malformed)?;
    value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .map(str::trim)
        .ok_or(AuthError::Malformed)
}

/// Verifies the bearer token and checks it belongs to `claimed`.
pub fn authorize_principal(
    headers: &HeaderMap,
    identity: &dyn IdentityVerifier,
    claimed: &str,
) -> Result<PrincipalId, ApiError> {
    let principal = identity.verify(bearer_token(headers)?)?;
    if principal != claimed.trim() {
        return Err(ApiError::PrincipalMismatch);
    }
    Ok(principal)
}

/// Internal routes are closed when no admin key is configured.
pub fn require_admin(headers: &HeaderMap, admin_key: Option<&str>) -> Result<(), ApiError> {
    let Some(expected) = admin_key.filter(|key| !key.is_empty()) else {
        return Err(ApiError::AdminRequired);
    };
    let provided = headers
        .get(ADMIN_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or(ApiError::AdminRequired)?;
    // Compare digests so the comparison time does not depend on the key.
    if Sha256::digest(provided.as_bytes()) != Sha256::digest(expected.as_bytes()) {
        return Err(ApiError::AdminRequired);
    }
    Ok(())
}
