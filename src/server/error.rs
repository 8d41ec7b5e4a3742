use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::{error, warn};

use crate::tournament::{ErrorClass, TournamentError};
use crate::upstream::AuthError;

const LOG_TARGET: &str = "server::error";

#[derive(Debug)]
pub enum ApiError {
    Domain(TournamentError),
    Unauthorized(AuthError),
    /// The token is valid but names a different principal than the request.
    PrincipalMismatch,
    AdminRequired,
    BadRequest(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            ApiError::Domain(err) => (
                status_for(err.class()),
                err.code(),
                err.public_message(),
            ),
            ApiError::Unauthorized(err) => {
                (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", err.to_string())
            }
            ApiError::PrincipalMismatch => (
                StatusCode::FORBIDDEN,
                "PRINCIPAL_MISMATCH",
                "token does not belong to this principal".to_string(),
            ),
            ApiError::AdminRequired => (
                StatusCode::UNAUTHORIZED,
                "ADMIN_REQUIRED",
                "missing or invalid admin key".to_string(),
            ),
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, "INVALID_REQUEST", message.clone())
            }
        }
    }
}

fn status_for(class: ErrorClass) -> StatusCode {
    StatusCode::from_u16(class.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

impl From<TournamentError> for ApiError {
    fn from(err: TournamentError) -> Self {
        ApiError::Domain(err)
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::Unauthorized(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        match &self {
            ApiError::Domain(err) if err.class().is_opaque() => {
                error!(target: LOG_TARGET, code, error = %err, "internal server error");
            }
            ApiError::Domain(_) | ApiError::BadRequest(_) => {}
            auth => warn!(target: LOG_TARGET, code, error = ?auth, "request rejected"),
        }
        let body = ErrorBody {
            error: ErrorDetail { code, message },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::UpstreamError;

    #[test]
    fn upstream_bodies_never_reach_the_client() {
        let err = ApiError::from(TournamentError::Upstream(UpstreamError::Status {
            service: "payout",
            status: 500,
            body: "stack trace at 10.1.2.3".into(),
        }));
        let (status, code, message) = err.parts();
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(code, "UPSTREAM_ERROR");
        assert!(!message.contains("10.1.2.3"));
    }

    #[test]
    fn auth_failures_map_to_401_and_403() {
        assert_eq!(
            ApiError::from(AuthError::Missing).parts().0,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ApiError::PrincipalMismatch.parts().0, StatusCode::FORBIDDEN);
    }
}
