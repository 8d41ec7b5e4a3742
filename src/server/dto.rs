use serde::{Deserialize, Serialize};

use crate::tournament::{
    PrincipalId, TournamentId, TournamentStatus, TournamentSummary, VideoId, VoteRequest,
};

#[derive(Debug, Deserialize)]
pub struct PrincipalRequest {
    pub principal_id: PrincipalId,
}

#[derive(Debug, Deserialize)]
pub struct VoteBody {
    pub principal_id: PrincipalId,
    pub video_id: VideoId,
    /// Emoji id, or `hot` / `not`.
    #[serde(alias = "vote")]
    pub option_id: String,
}

impl VoteBody {
    pub fn into_request(self) -> (PrincipalId, VoteRequest) {
        (
            self.principal_id,
            VoteRequest {
                video_id: self.video_id,
                option_id: self.option_id,
            },
        )
    }
}

#[derive(Debug, Deserialize)]
pub struct TransitionBody {
    pub tournament_id: TournamentId,
    pub status: TournamentStatus,
}

#[derive(Debug, Serialize)]
pub struct TournamentListResponse {
    pub tournaments: Vec<TournamentSummary>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}
