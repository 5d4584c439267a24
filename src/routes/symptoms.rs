use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::{reject, AppState};
use crate::models::{NewSymptomEntry, SymptomEntry, UserId};

#[derive(Deserialize)]
pub struct SymptomRange {
    pub user_id: Uuid,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Serialize)]
pub struct SymptomsByDate {
    pub date: NaiveDate,
    pub symptoms: Vec<String>,
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/symptom", post(log_symptom))
        .route("/symptoms", get(get_symptoms_grouped))
        .route("/symptom/all", get(get_symptoms_flat))
        .with_state(state)
}

async fn log_symptom(
    State(insights): State<AppState>,
    Json(body): Json<NewSymptomEntry>,
) -> Result<(StatusCode, Json<SymptomEntry>), (StatusCode, String)> {
    let entry = insights
        .log_symptom(body)
        .await
        .map_err(|e| reject("log_symptom", e))?;
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn get_symptoms_flat(
    State(insights): State<AppState>,
    Query(range): Query<SymptomRange>,
) -> Result<Json<Vec<SymptomEntry>>, (StatusCode, String)> {
    insights
        .symptoms_in_range(UserId::new(range.user_id), range.start, range.end)
        .await
        .map(Json)
        .map_err(|e| reject("get_symptoms_flat", e))
}

async fn get_symptoms_grouped(
    State(insights): State<AppState>,
    Query(range): Query<SymptomRange>,
) -> Result<Json<Vec<SymptomsByDate>>, (StatusCode, String)> {
    let entries = insights
        .symptoms_in_range(UserId::new(range.user_id), range.start, range.end)
        .await
        .map_err(|e| reject("get_symptoms_grouped", e))?;

    let mut map = BTreeMap::<NaiveDate, Vec<String>>::new();
    for entry in entries {
        map.entry(entry.date).or_default().extend(entry.symptoms);
    }

    let result = map
        .into_iter()
        .map(|(date, symptoms)| SymptomsByDate { date, symptoms })
        .collect();

    Ok(Json(result))
}
