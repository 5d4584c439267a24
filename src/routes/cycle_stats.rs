use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};

use super::{reject, AppState, UserQuery};
use crate::abnormality::CycleReview;
use crate::models::CycleStatistics;
use crate::service::Dashboard;

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/cycle-stats", get(get_cycle_stats))
        .route("/cycle-review", get(get_cycle_review))
        .route("/dashboard", get(get_dashboard))
        .with_state(state)
}

/// `null` when the user has nothing logged in the statistics window.
pub async fn get_cycle_stats(
    State(insights): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Option<CycleStatistics>>, (StatusCode, String)> {
    insights
        .statistics(query.user())
        .await
        .map(Json)
        .map_err(|e| reject("get_cycle_stats", e))
}

pub async fn get_cycle_review(
    State(insights): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Vec<CycleReview>>, (StatusCode, String)> {
    insights
        .review_cycles(query.user())
        .await
        .map(Json)
        .map_err(|e| reject("get_cycle_review", e))
}

pub async fn get_dashboard(
    State(insights): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Dashboard>, (StatusCode, String)> {
    insights
        .dashboard(query.user())
        .await
        .map(Json)
        .map_err(|e| reject("get_dashboard", e))
}
