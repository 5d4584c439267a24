use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{reject, AppState, UserQuery};
use crate::models::{
    CycleForecast, CyclePrediction, FertileWindow, PredictionQuery, PredictionType, UserId,
};

#[derive(Deserialize)]
pub struct ListQuery {
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub prediction_type: Option<PredictionType>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct CalendarQuery {
    pub user_id: Uuid,
    pub year: i32,
    pub month: u32,
}

#[derive(Deserialize)]
pub struct ForecastQuery {
    pub user_id: Uuid,
    pub num_cycles: Option<usize>,
}

#[derive(Deserialize)]
pub struct ClearQuery {
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub prediction_type: Option<PredictionType>,
    pub older_than_days: Option<i64>,
}

#[derive(Serialize)]
pub struct NextPeriod {
    pub next_period: Option<NaiveDate>,
}

#[derive(Serialize)]
pub struct Cleared {
    pub deleted: u64,
}

#[derive(Serialize)]
pub struct Trained {
    pub sample_count: usize,
    pub next_cycle_length: Option<i64>,
}

const DEFAULT_RETENTION_DAYS: i64 = 30;

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/predictions", get(list_predictions))
        .route("/predictions/next-period", get(next_period))
        .route("/predictions/fertile-window", get(fertile_window))
        .route("/predictions/future", get(future_cycles))
        .route("/predictions/calendar", get(calendar))
        .route("/predictions/train", post(train_model))
        .route("/predictions/old", delete(clear_old))
        .with_state(state)
}

async fn list_predictions(
    State(insights): State<AppState>,
    Query(params): Query<ListQuery>,
) -> Result<Json<Vec<CyclePrediction>>, (StatusCode, String)> {
    let query = PredictionQuery {
        prediction_type: params.prediction_type,
        from: params.from,
        to: params.to,
        limit: params.limit,
    };
    insights
        .predictions()
        .get_user_predictions(UserId::new(params.user_id), &query)
        .await
        .map(Json)
        .map_err(|e| reject("list_predictions", e))
}

async fn next_period(
    State(insights): State<AppState>,
    Query(params): Query<UserQuery>,
) -> Result<Json<NextPeriod>, (StatusCode, String)> {
    let next_period = insights
        .predictor()
        .predict_next_period(params.user())
        .await
        .map_err(|e| reject("next_period", e))?;
    Ok(Json(NextPeriod { next_period }))
}

/// `null` until two cycles a plausible distance apart are logged.
async fn fertile_window(
    State(insights): State<AppState>,
    Query(params): Query<UserQuery>,
) -> Result<Json<Option<FertileWindow>>, (StatusCode, String)> {
    insights
        .predictor()
        .get_fertile_window(params.user())
        .await
        .map(Json)
        .map_err(|e| reject("fertile_window", e))
}

async fn future_cycles(
    State(insights): State<AppState>,
    Query(params): Query<ForecastQuery>,
) -> Result<Json<Vec<CycleForecast>>, (StatusCode, String)> {
    insights
        .predictor()
        .predict_future_cycles(
            UserId::new(params.user_id),
            params
                .num_cycles
                .unwrap_or(insights.settings().forecast_cycles),
        )
        .await
        .map(Json)
        .map_err(|e| reject("future_cycles", e))
}

async fn calendar(
    State(insights): State<AppState>,
    Query(params): Query<CalendarQuery>,
) -> Result<Json<Vec<CyclePrediction>>, (StatusCode, String)> {
    insights
        .predictions()
        .get_calendar_predictions(UserId::new(params.user_id), params.year, params.month)
        .await
        .map(Json)
        .map_err(|e| reject("calendar", e))
}

async fn train_model(
    State(insights): State<AppState>,
    Query(params): Query<UserQuery>,
) -> Result<Json<Trained>, (StatusCode, String)> {
    let user = params.user();
    let model = insights
        .predictor()
        .train_model(user)
        .await
        .map_err(|e| reject("train_model", e))?;
    let next_cycle_length = insights
        .predictor()
        .predict_next_cycle_length(user)
        .await
        .map_err(|e| reject("train_model", e))?;
    Ok(Json(Trained {
        sample_count: model.sample_count,
        next_cycle_length,
    }))
}

async fn clear_old(
    State(insights): State<AppState>,
    Query(params): Query<ClearQuery>,
) -> Result<Json<Cleared>, (StatusCode, String)> {
    let deleted = insights
        .predictions()
        .clear_old_predictions(
            UserId::new(params.user_id),
            params.prediction_type,
            params.older_than_days.unwrap_or(DEFAULT_RETENTION_DAYS),
        )
        .await
        .map_err(|e| reject("clear_old", e))?;
    Ok(Json(Cleared { deleted }))
}
