use crate::upstream::UpstreamError;

use super::status::TournamentStatus;
use super::storage::StoreError;
use super::types::{TournamentId, VideoId};

/// Coarse error taxonomy; the HTTP layer maps each class to one status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Validation,
    Auth,
    Forbidden,
    Payment,
    NotFound,
    Conflict,
    Upstream,
    Internal,
}

impl ErrorClass {
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorClass::Validation => 400,
            ErrorClass::Auth => 401,
            ErrorClass::Payment => 402,
            ErrorClass::Forbidden => 403,
            ErrorClass::NotFound => 404,
            ErrorClass::Conflict => 409,
            ErrorClass::Internal => 500,
            ErrorClass::Upstream => 502,
        }
    }

    /// Classes whose message may carry internal detail and must not reach clients.
    pub fn is_opaque(&self) -> bool {
        matches!(self, ErrorClass::Upstream | ErrorClass::Internal)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TournamentError {
    #[error("{message}")]
    Validation { code: &'static str, message: String },
    #[error("tournament {0} not found")]
    TournamentNotFound(TournamentId),
    #[error("tournament is not open for registration (status: {0})")]
    TournamentNotOpen(TournamentStatus),
    #[error("already registered for this tournament")]
    AlreadyRegistered,
    #[error("tournament is not live (status: {0})")]
    TournamentNotLive(TournamentStatus),
    #[error("not registered for this tournament")]
    NotRegistered,
    #[error("no diamonds left")]
    NoDiamonds,
    #[error("already voted on this video")]
    DuplicateVote,
    #[error("video {0} not found in tournament")]
    VideoNotFound(VideoId),
    #[error("transition from {from} to {to} is not allowed")]
    TransitionNotAllowed {
        from: TournamentStatus,
        to: TournamentStatus,
    },
    #[error("tournament is still active (status: {0})")]
    TournamentStillActive(TournamentStatus),
    #[error("tournament {0} already exists")]
    TournamentExists(TournamentId),
    #[error("payment failed: {0}")]
    PaymentFailed(#[source] UpstreamError),
    #[error("upstream error: {0}")]
    Upstream(#[from] UpstreamError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl TournamentError {
    pub fn validation(code: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            code,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            TournamentError::Validation { code, .. } => code,
            TournamentError::TournamentNotFound(_) => "TOURNAMENT_NOT_FOUND",
            TournamentError::TournamentNotOpen(_) => "TOURNAMENT_NOT_OPEN",
            TournamentError::AlreadyRegistered => "ALREADY_REGISTERED",
            TournamentError::TournamentNotLive(_) => "TOURNAMENT_NOT_LIVE",
            TournamentError::NotRegistered => "NOT_REGISTERED",
            TournamentError::NoDiamonds => "NO_DIAMONDS",
            TournamentError::DuplicateVote => "DUPLICATE_VOTE",
            TournamentError::VideoNotFound(_) => "VIDEO_NOT_FOUND",
            TournamentError::TransitionNotAllowed { .. } => "TRANSITION_NOT_ALLOWED",
            TournamentError::TournamentStillActive(_) => "TOURNAMENT_STILL_ACTIVE",
            TournamentError::TournamentExists(_) => "TOURNAMENT_EXISTS",
            TournamentError::PaymentFailed(_) => "INSUFFICIENT_COINS",
            TournamentError::Upstream(_) => "UPSTREAM_ERROR",
            TournamentError::Store(StoreError::Conflict) => "STORE_CONTENTION",
            TournamentError::Store(_) => "INTERNAL",
            TournamentError::Internal(_) => "INTERNAL",
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            TournamentError::Validation { .. } => ErrorClass::Validation,
            TournamentError::NotRegistered | TournamentError::NoDiamonds => ErrorClass::Forbidden,
            TournamentError::TournamentNotFound(_) | TournamentError::VideoNotFound(_) => {
                ErrorClass::NotFound
            }
            TournamentError::TournamentNotOpen(_)
            | TournamentError::AlreadyRegistered
            | TournamentError::TournamentNotLive(_)
            | TournamentError::DuplicateVote
            | TournamentError::TransitionNotAllowed { .. }
            | TournamentError::TournamentStillActive(_)
            | TournamentError::TournamentExists(_) => ErrorClass::Conflict,
            TournamentError::PaymentFailed(_) => ErrorClass::Payment,
            TournamentError::Upstream(_) => ErrorClass::Upstream,
            TournamentError::Store(_) | TournamentError::Internal(_) => ErrorClass::Internal,
        }
    }

    /// Message safe to show a client.
    pub fn public_message(&self) -> String {
        match self {
            TournamentError::PaymentFailed(_) => {
                "failed to deduct entry fee; check your balance".to_string()
            }
            TournamentError::Upstream(_) => "an upstream service is unavailable".to_string(),
            TournamentError::Store(StoreError::Conflict) => {
                "the request conflicted with concurrent updates; retry".to_string()
            }
            TournamentError::Store(_) | TournamentError::Internal(_) => {
                "internal error".to_string()
            }
            other => other.to_string(),
        }
    }
}
