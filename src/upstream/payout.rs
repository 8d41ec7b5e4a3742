use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::balance::bearer;
use super::error::UpstreamError;

const LOG_TARGET: &str = "upstream::payout";
const SERVICE: &str = "payout";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutRequest {
    /// Smallest unit of the payout currency.
    pub amount: u64,
    pub recipient_principal: String,
    pub memo_text: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct PayoutResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Transfers settlement currency to a winner.
#[async_trait]
pub trait PayoutGateway: Send + Sync {
    async fn transfer(&self, request: &PayoutRequest) -> Result<(), UpstreamError>;
}

pub struct HttpPayoutGateway {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpPayoutGateway {
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
}

#[async_trait]
impl PayoutGateway for HttpPayoutGateway {
    async fn transfer(&self, request: &PayoutRequest) -> Result<(), UpstreamError> {
        let url = format!("{}/transfer_ckbtc", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(url)
            .header(reqwest::header::AUTHORIZATION, bearer(&self.token))
            .json(request)
            .send()
            .await
            .map_err(|err| UpstreamError::from_reqwest(SERVICE, err))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                target: LOG_TARGET,
                recipient = %request.recipient_principal,
                status = status.as_u16(),
                %body,
                "payout request failed"
            );
            return Err(UpstreamError::Status {
                service: SERVICE,
                status: status.as_u16(),
                body,
            });
        }

        let parsed: PayoutResponse = response
            .json()
            .await
            .map_err(|err| UpstreamError::from_reqwest(SERVICE, err))?;
        if !parsed.success {
            warn!(
                target: LOG_TARGET,
                recipient = %request.recipient_principal,
                reason = parsed.error.as_deref().unwrap_or("unspecified"),
                "payout rejected"
            );
            return Err(UpstreamError::Rejected {
                service: SERVICE,
                reason: parsed.error,
            });
        }

        info!(
            target: LOG_TARGET,
            recipient = %request.recipient_principal,
            amount = request.amount,
            "payout sent"
        );
        Ok(())
    }
}
