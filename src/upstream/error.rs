/// Failure of a remote collaborator.
///
/// Response bodies are kept for server-side logs only; `Display` never
/// includes them.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("{service} request failed: {source}")]
    Transport {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{service} request timed out")]
    Timeout { service: &'static str },
    #[error("{service} returned status {status}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },
    #[error("{service} returned an unreadable response: {message}")]
    Decode {
        service: &'static str,
        message: String,
    },
    #[error("{service} rejected the request")]
    Rejected {
        service: &'static str,
        reason: Option<String>,
    },
    #[error("price for {currency} is missing from the ticker")]
    MissingPrice { currency: String },
    #[error("invalid price {price} for {currency}")]
    InvalidPrice { currency: String, price: f64 },
    #[error("failed to dispatch task: {0}")]
    Dispatch(String),
    #[error("invalid client configuration: {0}")]
    Config(String),
}

impl UpstreamError {
    pub fn from_reqwest(service: &'static str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UpstreamError::Timeout { service }
        } else if err.is_decode() {
            UpstreamError::Decode {
                service,
                message: err.to_string(),
            }
        } else {
            UpstreamError::Transport {
                service,
                source: err,
            }
        }
    }

    pub fn service(&self) -> &'static str {
        match self {
            UpstreamError::Transport { service, .. }
            | UpstreamError::Timeout { service }
            | UpstreamError::Status { service, .. }
            | UpstreamError::Decode { service, .. }
            | UpstreamError::Rejected { service, .. } => service,
            UpstreamError::MissingPrice { .. } | UpstreamError::InvalidPrice { .. } => "ticker",
            UpstreamError::Dispatch(_) => "dispatcher",
            UpstreamError::Config(_) => "config",
        }
    }
}
