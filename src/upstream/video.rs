use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::error::UpstreamError;
use crate::tournament::types::{OptionId, TournamentKind, Verdict, VideoId};

const LOG_TARGET: &str = "upstream::video";
const SERVICE: &str = "video_oracle";

pub const MAX_CANDIDATES: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoAnalysis {
    pub video_id: VideoId,
    pub verdict: Option<Verdict>,
    pub candidates: Vec<OptionId>,
    pub top_pick: Option<OptionId>,
}

impl VideoAnalysis {
    /// Empty analysis used when the oracle fails for a majority-mode video.
    pub fn empty(video_id: VideoId) -> Self {
        Self {
            video_id,
            verdict: None,
            candidates: Vec::new(),
            top_pick: None,
        }
    }
}

/// Video/AI oracle consulted once per video at creation time.
#[async_trait]
pub trait VideoOracle: Send + Sync {
    async fn analyze(
        &self,
        kind: TournamentKind,
        video_id: &VideoId,
    ) -> Result<VideoAnalysis, UpstreamError>;
}

/// Analyses every video with at most `concurrency` requests in flight.
/// Results come back in input order; failures are returned per video.
pub async fn analyze_batch(
    oracle: &dyn VideoOracle,
    kind: TournamentKind,
    video_ids: &[VideoId],
    concurrency: usize,
) -> Vec<(VideoId, Result<VideoAnalysis, UpstreamError>)> {
    stream::iter(video_ids.iter().cloned())
        .map(|video_id| async move {
            let result = oracle.analyze(kind, &video_id).await;
            if let Err(err) = &result {
                warn!(
                    target: LOG_TARGET,
                    video_id = %video_id,
                    error = %err,
                    "video analysis failed"
                );
            }
            (video_id, result)
        })
        .buffered(concurrency.max(1))
        .collect()
        .await
}

#[derive(Debug, Serialize)]
struct AnalyzeRequest<'a> {
    video_id: &'a str,
    mode: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct AnalyzeResponse {
    #[serde(default)]
    verdict: Option<String>,
    #[serde(default)]
    candidates: Vec<String>,
    #[serde(default)]
    top_pick: Option<String>,
}

fn into_analysis(
    kind: TournamentKind,
    video_id: &VideoId,
    response: AnalyzeResponse,
) -> Result<VideoAnalysis, UpstreamError> {
    match kind {
        TournamentKind::HotOrNot => {
            let verdict = response
                .verdict
                .as_deref()
                .and_then(Verdict::parse)
                .ok_or_else(|| UpstreamError::Decode {
                    service: SERVICE,
                    message: format!("missing verdict for video {video_id}"),
                })?;
            Ok(VideoAnalysis {
                video_id: video_id.clone(),
                verdict: Some(verdict),
                candidates: Vec::new(),
                top_pick: None,
            })
        }
        TournamentKind::Smiley => {
            let mut candidates = response.candidates;
            candidates.truncate(MAX_CANDIDATES);
            let top_pick = response
                .top_pick
                .filter(|pick| candidates.contains(pick))
                .or_else(|| candidates.first().cloned());
            Ok(VideoAnalysis {
                video_id: video_id.clone(),
                verdict: None,
                candidates,
                top_pick,
            })
        }
    }
}

pub struct HttpVideoOracle {
    client: reqwest::Client,
    base_url: String,
}

impl HttpVideoOracle {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| UpstreamError::Config(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl VideoOracle for HttpVideoOracle {
    async fn analyze(
        &self,
        kind: TournamentKind,
        video_id: &VideoId,
    ) -> Result<VideoAnalysis, UpstreamError> {
        let url = format!("{}/analyze", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(url)
            .json(&AnalyzeRequest {
                video_id,
                mode: kind.as_str(),
            })
            .send()
            .await
            .map_err(|err| UpstreamError::from_reqwest(SERVICE, err))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                service: SERVICE,
                status: status.as_u16(),
                body,
            });
        }
        let parsed: AnalyzeResponse = response
            .json()
            .await
            .map_err(|err| UpstreamError::from_reqwest(SERVICE, err))?;
        into_analysis(kind, video_id, parsed)
    }
}
