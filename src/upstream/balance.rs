use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::error::UpstreamError;
use crate::tournament::types::PrincipalId;

const LOG_TARGET: &str = "upstream::balance";
const SERVICE: &str = "balance";

/// Externally held spendable balance. Entry fees are deducted here and
/// refunds credited back.
#[async_trait]
pub trait BalanceGateway: Send + Sync {
    async fn update_balance(
        &self,
        principal_id: &PrincipalId,
        delta: i64,
    ) -> Result<(), UpstreamError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateBalanceRequest {
    /// Signed radix-10 integer, e.g. `"-100"`.
    pub delta: String,
    pub is_airdropped: bool,
}

impl UpdateBalanceRequest {
    pub fn new(delta: i64) -> Self {
        Self {
            delta: delta.to_string(),
            is_airdropped: false,
        }
    }
}

pub(crate) fn bearer(token: &str) -> String {
    if token.starts_with("Bearer ") {
        token.to_string()
    } else {
        format!("Bearer {token}")
    }
}

pub struct HttpBalanceGateway {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpBalanceGateway {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| UpstreamError::Config(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            token: token.into(),
        })
    }

    fn endpoint(&self, principal_id: &str) -> String {
        format!(
            "{}/update_balance/{}",
            self.base_url.trim_end_matches('/'),
            principal_id
        )
    }
}

#[async_trait]
impl BalanceGateway for HttpBalanceGateway {
    async fn update_balance(
        &self,
        principal_id: &PrincipalId,
        delta: i64,
    ) -> Result<(), UpstreamError> {
        let response = self
            .client
            .post(self.endpoint(principal_id))
            .header(reqwest::header::AUTHORIZATION, bearer(&self.token))
            .json(&UpdateBalanceRequest::new(delta))
            .send()
            .await
            .map_err(|err| UpstreamError::from_reqwest(SERVICE, err))?;

        let status = response.status();
        if status == reqwest::StatusCode::OK {
            debug!(target: LOG_TARGET, principal_id = %principal_id, delta, "balance updated");
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        warn!(
            target: LOG_TARGET,
            principal_id = %principal_id,
            delta,
            status = status.as_u16(),
            %body,
            "balance update rejected"
        );
        Err(UpstreamError::Status {
            service: SERVICE,
            status: status.as_u16(),
            body,
        })
    }
}
