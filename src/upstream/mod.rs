//! Remote collaborators: balance service, payout service, price ticker,
//! video oracle, transition dispatcher and identity tokens.

use std::sync::Arc;

use crate::config::UpstreamConfig;

pub mod balance;
pub mod dispatch;
pub mod error;
pub mod identity;
pub mod payout;
pub mod price;
pub mod video;

pub use balance::{BalanceGateway, HttpBalanceGateway};
pub use dispatch::{
    run_dispatch_loop, LocalDispatcher, TaskDispatcher, TransitionHandler, TransitionTask,
};
pub use error::UpstreamError;
pub use identity::{AuthError, IdentityVerifier, SharedSecretVerifier};
pub use payout::{HttpPayoutGateway, PayoutGateway, PayoutRequest};
pub use price::{HttpTickerOracle, PriceOracle};
pub use video::{analyze_batch, HttpVideoOracle, VideoAnalysis, VideoOracle};

/// The set of remote services a tournament service talks to.
#[derive(Clone)]
pub struct Upstreams {
    pub balance: Arc<dyn BalanceGateway>,
    pub payout: Arc<dyn PayoutGateway>,
    pub price: Arc<dyn PriceOracle>,
    pub video: Arc<dyn VideoOracle>,
    pub dispatcher: Arc<dyn TaskDispatcher>,
}

impl Upstreams {
    /// HTTP clients for every service, sharing the given dispatcher.
    pub fn http(
        config: &UpstreamConfig,
        dispatcher: Arc<dyn TaskDispatcher>,
    ) -> Result<Self, UpstreamError> {
        Ok(Self {
            balance: Arc::new(HttpBalanceGateway::new(
                config.balance_base_url.clone(),
                config.balance_token.clone(),
                config.balance_timeout,
            )?),
            payout: Arc::new(HttpPayoutGateway::new(
                config.payout_base_url.clone(),
                config.payout_token.clone(),
                config.payout_timeout,
            )?),
            price: Arc::new(HttpTickerOracle::new(
                config.ticker_url.clone(),
                config.ticker_timeout,
            )?),
            video: Arc::new(HttpVideoOracle::new(
                config.oracle_base_url.clone(),
                config.oracle_timeout,
            )?),
            dispatcher,
        })
    }
}
