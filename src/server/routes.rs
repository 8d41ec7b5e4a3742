use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, StatusCode},
    middleware,
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::tournament::{
    CreateTournament, CreatedTournament, LeaderboardView, ListQuery, PrincipalId,
    RegisterOutcome, SettlementResult, TournamentId, TournamentOps, TournamentStatusView,
    TransitionReport, VoteOutcome,
};
use crate::upstream::IdentityVerifier;

use super::auth::{authorize_principal, require_admin};
use super::dto::{
    HealthResponse, PrincipalRequest, TournamentListResponse, TransitionBody, VoteBody,
};
use super::error::ApiError;
use super::logging::log_requests;

/// Shared handles every handler needs.
pub struct ServerContext {
    pub ops: Arc<dyn TournamentOps>,
    pub identity: Arc<dyn IdentityVerifier>,
    /// `None` closes the internal routes.
    pub admin_key: Option<String>,
}

/// Axum server facade hosting the tournament APIs.
pub struct TournamentServer {
    router: Router<Arc<ServerContext>>,
    context: Arc<ServerContext>,
}

impl TournamentServer {
    pub fn new(context: Arc<ServerContext>) -> Self {
        let router: Router<Arc<ServerContext>> = Router::new()
            .route("/healthz", get(healthz))
            .route("/tournaments", post(list_tournaments))
            .route("/tournaments/:tournament_id/status", get(tournament_status))
            .route("/tournaments/:tournament_id/register", post(register))
            .route("/tournaments/:tournament_id/vote", post(vote))
            .route("/tournaments/:tournament_id/leaderboard", post(leaderboard))
            .route("/users/:principal_id/tournaments", post(my_tournaments))
            .route("/internal/tournaments", post(create_tournament))
            .route("/internal/tournaments/transition", post(transition))
            .route("/internal/tournaments/:tournament_id/settle", post(settle));

        Self { router, context }
    }

    pub fn router(&self) -> Router {
        Self::finish(self.router.clone(), Arc::clone(&self.context))
    }

    pub fn into_router(self) -> Router {
        Self::finish(self.router, self.context)
    }

    fn finish(router: Router<Arc<ServerContext>>, context: Arc<ServerContext>) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        router
            .with_state::<()>(context)
            .layer(middleware::from_fn(log_requests))
            .layer(TraceLayer::new_for_http())
            .layer(cors)
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn list_tournaments(
    State(ctx): State<Arc<ServerContext>>,
    body: Result<Json<ListQuery>, JsonRejection>,
) -> ApiResult<TournamentListResponse> {
    let query = match body {
        Ok(Json(query)) => query,
        // An empty POST lists today's tournaments.
        Err(JsonRejection::MissingJsonContentType(_)) => ListQuery::default(),
        Err(rejection) => return Err(rejection.into()),
    };
    let tournaments = ctx.ops.list(query).await?;
    Ok(Json(TournamentListResponse { tournaments }))
}

async fn tournament_status(
    State(ctx): State<Arc<ServerContext>>,
    Path(tournament_id): Path<TournamentId>,
) -> ApiResult<TournamentStatusView> {
    Ok(Json(ctx.ops.status(&tournament_id).await?))
}

async fn register(
    State(ctx): State<Arc<ServerContext>>,
    Path(tournament_id): Path<TournamentId>,
    headers: HeaderMap,
    body: Result<Json<PrincipalRequest>, JsonRejection>,
) -> ApiResult<RegisterOutcome> {
    let Json(body) = body?;
    let principal = authorize_principal(&headers, ctx.identity.as_ref(), &body.principal_id)?;
    Ok(Json(ctx.ops.register(&tournament_id, &principal).await?))
}

async fn vote(
    State(ctx): State<Arc<ServerContext>>,
    Path(tournament_id): Path<TournamentId>,
    headers: HeaderMap,
    body: Result<Json<VoteBody>, JsonRejection>,
) -> ApiResult<VoteOutcome> {
    let Json(body) = body?;
    let (claimed, request) = body.into_request();
    let principal = authorize_principal(&headers, ctx.identity.as_ref(), &claimed)?;
    Ok(Json(ctx.ops.vote(&tournament_id, &principal, request).await?))
}

async fn leaderboard(
    State(ctx): State<Arc<ServerContext>>,
    Path(tournament_id): Path<TournamentId>,
    headers: HeaderMap,
    body: Result<Json<PrincipalRequest>, JsonRejection>,
) -> ApiResult<LeaderboardView> {
    let Json(body) = body?;
    let principal = authorize_principal(&headers, ctx.identity.as_ref(), &body.principal_id)?;
    Ok(Json(ctx.ops.leaderboard(&tournament_id, &principal).await?))
}

async fn my_tournaments(
    State(ctx): State<Arc<ServerContext>>,
    Path(principal_id): Path<PrincipalId>,
    headers: HeaderMap,
) -> ApiResult<TournamentListResponse> {
    let principal = authorize_principal(&headers, ctx.identity.as_ref(), &principal_id)?;
    let tournaments = ctx.ops.my_tournaments(&principal).await?;
    Ok(Json(TournamentListResponse { tournaments }))
}

async fn create_tournament(
    State(ctx): State<Arc<ServerContext>>,
    headers: HeaderMap,
    body: Result<Json<CreateTournament>, JsonRejection>,
) -> Result<(StatusCode, Json<CreatedTournament>), ApiError> {
    require_admin(&headers, ctx.admin_key.as_deref())?;
    let Json(request) = body?;
    let created = ctx.ops.create(request).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn transition(
    State(ctx): State<Arc<ServerContext>>,
    headers: HeaderMap,
    body: Result<Json<TransitionBody>, JsonRejection>,
) -> ApiResult<TransitionReport> {
    require_admin(&headers, ctx.admin_key.as_deref())?;
    let Json(body) = body?;
    Ok(Json(
        ctx.ops
            .advance_status(&body.tournament_id, body.status)
            .await?,
    ))
}

async fn settle(
    State(ctx): State<Arc<ServerContext>>,
    Path(tournament_id): Path<TournamentId>,
    headers: HeaderMap,
) -> ApiResult<SettlementResult> {
    require_admin(&headers, ctx.admin_key.as_deref())?;
    Ok(Json(ctx.ops.settle(&tournament_id).await?))
}
