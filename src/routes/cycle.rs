use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use super::{reject, AppState, UserQuery};
use crate::models::{CycleEntry, NewCycleEntry, PhaseReading, UserId};

#[derive(Deserialize)]
pub struct EndCycle {
    pub user_id: Uuid,
    pub cycle_id: Uuid,
    pub end_date: NaiveDate,
}

#[derive(Deserialize)]
pub struct CyclesQuery {
    pub user_id: Uuid,
    #[serde(default)]
    pub limit: usize,
}

#[derive(Deserialize)]
pub struct RangeQuery {
    pub user_id: Uuid,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/cycle", get(get_current_phase).post(create_cycle))
        .route("/cycle/end", patch(end_cycle))
        .route("/cycles", get(list_cycles))
        .route("/cycles/range", get(cycles_in_range))
        .route("/cycles/refresh", post(refresh_predictions))
        .with_state(state)
}

async fn create_cycle(
    State(insights): State<AppState>,
    Json(body): Json<NewCycleEntry>,
) -> Result<(StatusCode, Json<CycleEntry>), (StatusCode, String)> {
    let entry = insights
        .log_cycle(body)
        .await
        .map_err(|e| reject("create_cycle", e))?;
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn end_cycle(
    State(insights): State<AppState>,
    Json(body): Json<EndCycle>,
) -> Result<Json<CycleEntry>, (StatusCode, String)> {
    insights
        .end_cycle(UserId::new(body.user_id), body.cycle_id, body.end_date)
        .await
        .map(Json)
        .map_err(|e| reject("end_cycle", e))
}

async fn get_current_phase(
    State(insights): State<AppState>,
    Query(params): Query<UserQuery>,
) -> Result<Json<PhaseReading>, (StatusCode, String)> {
    insights
        .current_phase(params.user())
        .await
        .map(Json)
        .map_err(|e| reject("get_current_phase", e))
}

async fn list_cycles(
    State(insights): State<AppState>,
    Query(params): Query<CyclesQuery>,
) -> Result<Json<Vec<CycleEntry>>, (StatusCode, String)> {
    insights
        .cycles(UserId::new(params.user_id), params.limit)
        .await
        .map(Json)
        .map_err(|e| reject("list_cycles", e))
}

async fn cycles_in_range(
    State(insights): State<AppState>,
    Query(params): Query<RangeQuery>,
) -> Result<Json<Vec<CycleEntry>>, (StatusCode, String)> {
    insights
        .cycles_in_range(UserId::new(params.user_id), params.start, params.end)
        .await
        .map(Json)
        .map_err(|e| reject("cycles_in_range", e))
}

async fn refresh_predictions(
    State(insights): State<AppState>,
    Query(params): Query<UserQuery>,
) -> Result<Json<crate::service::RefreshSummary>, (StatusCode, String)> {
    insights
        .refresh_predictions(params.user())
        .await
        .map(Json)
        .map_err(|e| reject("refresh_predictions", e))
}
