//! Persistence of generated predictions.
//!
//! Each write supersedes the user's previous predictions of the same type:
//! rows created within the last day are deleted and anything older that is
//! still active is deactivated, so readers only ever see the latest batch.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{ensure_range, AnalyticsError, AnalyticsResult};
use crate::models::{
    CycleForecast, CyclePhase, CyclePrediction, FertileWindow, ModelUsed, PhaseWindow,
    PredictionQuery, PredictionType, UserId,
};
use crate::repository::PredictionRepository;

const SUPERSEDE_WINDOW_DAYS: i64 = 1;

pub struct PredictionStore {
    repo: Arc<dyn PredictionRepository>,
    clock: Arc<dyn Clock>,
}

struct Draft {
    phase: CyclePhase,
    window: PhaseWindow,
    features: serde_json::Value,
}

impl PredictionStore {
    pub fn new(repo: Arc<dyn PredictionRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { repo, clock }
    }

    /// One record per phase per forecast cycle.
    pub async fn store_calendar_predictions(
        &self,
        user: UserId,
        forecasts: &[CycleForecast],
        model_used: ModelUsed,
    ) -> AnalyticsResult<Vec<CyclePrediction>> {
        let drafts = forecasts
            .iter()
            .enumerate()
            .flat_map(|(index, forecast)| {
                forecast.phases().into_iter().map(move |(phase, window)| Draft {
                    phase,
                    window,
                    features: json!({
                        "cycle_index": index,
                        "cycle_length": forecast.cycle_length,
                    }),
                })
            })
            .collect();
        self.replace(user, PredictionType::Calendar, model_used, drafts)
            .await
    }

    pub async fn store_next_period(
        &self,
        user: UserId,
        date: NaiveDate,
        model_used: ModelUsed,
    ) -> AnalyticsResult<Vec<CyclePrediction>> {
        let draft = Draft {
            phase: CyclePhase::Menstrual,
            window: PhaseWindow::new(date, date),
            features: json!({}),
        };
        self.replace(user, PredictionType::NextPeriod, model_used, vec![draft])
            .await
    }

    pub async fn store_fertile_window(
        &self,
        user: UserId,
        window: FertileWindow,
        model_used: ModelUsed,
    ) -> AnalyticsResult<Vec<CyclePrediction>> {
        let draft = Draft {
            phase: CyclePhase::Ovulatory,
            window: PhaseWindow::new(window.fertile_start, window.ovulation_day),
            features: json!({ "ovulation_day": window.ovulation_day }),
        };
        self.replace(user, PredictionType::FertileWindow, model_used, vec![draft])
            .await
    }

    pub async fn get_user_predictions(
        &self,
        user: UserId,
        query: &PredictionQuery,
    ) -> AnalyticsResult<Vec<CyclePrediction>> {
        if let (Some(from), Some(to)) = (query.from, query.to) {
            ensure_range(from, to)?;
        }
        self.repo.find_predictions(user, query).await
    }

    /// Retires the user's active predictions of one type without replacing them.
    pub async fn deactivate(
        &self,
        user: UserId,
        prediction_type: PredictionType,
    ) -> AnalyticsResult<u64> {
        let retired = self
            .repo
            .deactivate(user, prediction_type, self.clock.now())
            .await?;
        tracing::debug!(
            %user,
            prediction_type = prediction_type.as_str(),
            retired,
            "deactivated predictions"
        );
        Ok(retired)
    }

    /// Active calendar predictions targeting a day in the given month.
    pub async fn get_calendar_predictions(
        &self,
        user: UserId,
        year: i32,
        month: u32,
    ) -> AnalyticsResult<Vec<CyclePrediction>> {
        let invalid = || AnalyticsError::InvalidMonth { year, month };
        let first = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid)?;
        let next_month = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)
        }
        .ok_or_else(invalid)?;

        let query = PredictionQuery {
            prediction_type: Some(PredictionType::Calendar),
            from: Some(first),
            to: Some(next_month - Duration::days(1)),
            limit: None,
        };
        self.repo.find_predictions(user, &query).await
    }

    /// Deletes predictions created more than `older_than_days` ago.
    pub async fn clear_old_predictions(
        &self,
        user: UserId,
        prediction_type: Option<PredictionType>,
        older_than_days: i64,
    ) -> AnalyticsResult<u64> {
        if older_than_days < 0 {
            return Err(AnalyticsError::InvalidRetention(older_than_days));
        }
        let cutoff = Duration::try_days(older_than_days)
            .and_then(|age| self.clock.now().checked_sub_signed(age))
            .ok_or(AnalyticsError::DateOutOfRange)?;
        let deleted = self
            .repo
            .delete_created_before(user, prediction_type, cutoff)
            .await?;
        tracing::debug!(%user, deleted, "cleared old predictions");
        Ok(deleted)
    }

    async fn replace(
        &self,
        user: UserId,
        prediction_type: PredictionType,
        model_used: ModelUsed,
        drafts: Vec<Draft>,
    ) -> AnalyticsResult<Vec<CyclePrediction>> {
        let now = self.clock.now();
        self.supersede(user, prediction_type, now).await?;

        let records: Vec<CyclePrediction> = drafts
            .into_iter()
            .map(|d| record(user, prediction_type, model_used, d, now))
            .collect();
        self.repo.insert_predictions(&records).await?;

        tracing::info!(
            %user,
            prediction_type = prediction_type.as_str(),
            model = model_used.as_str(),
            count = records.len(),
            "stored predictions"
        );
        Ok(records)
    }

    async fn supersede(
        &self,
        user: UserId,
        prediction_type: PredictionType,
        now: DateTime<Utc>,
    ) -> AnalyticsResult<()> {
        let deleted = self
            .repo
            .delete_created_since(user, prediction_type, now - Duration::days(SUPERSEDE_WINDOW_DAYS))
            .await?;
        let deactivated = self.repo.deactivate(user, prediction_type, now).await?;
        tracing::debug!(
            %user,
            prediction_type = prediction_type.as_str(),
            deleted,
            deactivated,
            "superseded predictions"
        );
        Ok(())
    }
}

fn record(
    user: UserId,
    prediction_type: PredictionType,
    model_used: ModelUsed,
    draft: Draft,
    now: DateTime<Utc>,
) -> CyclePrediction {
    CyclePrediction {
        id: Uuid::new_v4(),
        user_id: user,
        prediction_type,
        prediction_date: now,
        predicted_for_date: draft.window.start,
        phase: draft.phase,
        start_date: draft.window.start,
        end_date: draft.window.end,
        confidence_score: model_used.confidence(),
        model_used,
        features_used: draft.features,
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}
