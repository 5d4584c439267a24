use std::sync::Arc;

use axum::{http::StatusCode, routing::get, Router};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AnalyticsError;
use crate::models::UserId;
use crate::service::CycleInsights;

pub mod cycle;
pub mod cycle_stats;
pub mod predictions;
pub mod symptoms;

pub type AppState = Arc<CycleInsights>;

#[derive(Deserialize)]
pub struct UserQuery {
    pub user_id: Uuid,
}

impl UserQuery {
    pub fn user(&self) -> UserId {
        UserId::new(self.user_id)
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(cycle::routes(state.clone()))
        .merge(symptoms::routes(state.clone()))
        .merge(cycle_stats::routes(state.clone()))
        .merge(predictions::routes(state))
        .route("/health", get(|| async { "✅ Backend up" }))
}

/// Maps a core error onto a response, logging storage failures.
pub fn reject(context: &str, e: AnalyticsError) -> (StatusCode, String) {
    let status = match &e {
        AnalyticsError::CycleNotFound(_) => StatusCode::NOT_FOUND,
        AnalyticsError::CycleInProgress(_) => StatusCode::CONFLICT,
        AnalyticsError::InsufficientHistory { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        e if e.is_validation() => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        tracing::error!("❌ {} failed: {}", context, e);
    } else {
        tracing::info!("ℹ️ {} rejected: {}", context, e);
    }
    (status, e.to_string())
}
