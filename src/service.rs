//! Entry point tying storage, statistics, phase tracking and prediction
//! together for one deployment.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

use crate::abnormality::{self, CycleReview};
use crate::clock::Clock;
use crate::error::{ensure_range, AnalyticsError, AnalyticsResult};
use crate::model_store::{InMemoryModelStore, ModelStore};
use crate::models::{
    CycleEntry, CycleForecast, CyclePrediction, CycleStatistics, FertileWindow, ModelUsed,
    NewCycleEntry, NewSymptomEntry, PhaseReading, PredictionQuery, PredictionType, SymptomEntry,
    UserId,
};
use crate::phase::PhaseClassifier;
use crate::prediction_store::PredictionStore;
use crate::predictor::{fertile_window_before, Predictor};
use crate::repository::{CycleRepository, InMemoryStore, PredictionRepository};
use crate::stats::{default_statistics, StatisticsAggregator};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InsightSettings {
    /// Trailing window, in months, that statistics are computed over.
    pub window_months: u32,
    /// Cycles projected on every refresh.
    pub forecast_cycles: usize,
}

impl Default for InsightSettings {
    fn default() -> Self {
        Self {
            window_months: 12,
            forecast_cycles: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshSummary {
    pub forecasts: Vec<CycleForecast>,
    pub next_period: Option<NaiveDate>,
    pub fertile_window: Option<FertileWindow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub statistics: CycleStatistics,
    pub current_phase: PhaseReading,
    pub next_period: Option<NaiveDate>,
    pub fertile_window: Option<FertileWindow>,
    pub calendar: Vec<CyclePrediction>,
}

pub struct CycleInsights {
    cycles: Arc<dyn CycleRepository>,
    stats: Arc<StatisticsAggregator>,
    phases: PhaseClassifier,
    predictor: Predictor,
    predictions: Arc<PredictionStore>,
    clock: Arc<dyn Clock>,
    settings: InsightSettings,
}

impl CycleInsights {
    pub fn new(
        cycles: Arc<dyn CycleRepository>,
        predictions: Arc<dyn PredictionRepository>,
        models: Arc<dyn ModelStore>,
        clock: Arc<dyn Clock>,
        settings: InsightSettings,
    ) -> Self {
        let stats = Arc::new(StatisticsAggregator::new(cycles.clone(), clock.clone()));
        let store = Arc::new(PredictionStore::new(predictions, clock.clone()));
        let phases = PhaseClassifier::new(
            cycles.clone(),
            stats.clone(),
            clock.clone(),
            settings.window_months,
        );
        let predictor = Predictor::new(
            cycles.clone(),
            stats.clone(),
            models,
            store.clone(),
            clock.clone(),
            settings.window_months,
        );
        Self {
            cycles,
            stats,
            phases,
            predictor,
            predictions: store,
            clock,
            settings,
        }
    }

    /// Everything held in process memory; nothing survives a restart.
    pub fn in_memory(clock: Arc<dyn Clock>, settings: InsightSettings) -> Self {
        let store = Arc::new(InMemoryStore::new());
        Self::new(
            store.clone(),
            store,
            Arc::new(InMemoryModelStore::new()),
            clock,
            settings,
        )
    }

    pub fn predictor(&self) -> &Predictor {
        &self.predictor
    }

    pub fn predictions(&self) -> &PredictionStore {
        &self.predictions
    }

    pub fn settings(&self) -> InsightSettings {
        self.settings
    }

    pub async fn log_cycle(&self, new: NewCycleEntry) -> AnalyticsResult<CycleEntry> {
        new.validate()?;
        if new.end_date.is_none() {
            if let Some(open) = self.cycles.get_current_cycle(new.user_id).await? {
                return Err(AnalyticsError::CycleInProgress(open.start_date));
            }
        }

        let entry = new.into_entry(self.clock.now());
        self.cycles.insert_cycle(&entry).await?;
        tracing::info!(user = %entry.user_id, start = %entry.start_date, "logged cycle");

        self.refresh_after_write(entry.user_id).await;
        Ok(entry)
    }

    pub async fn end_cycle(
        &self,
        user: UserId,
        cycle_id: Uuid,
        end_date: NaiveDate,
    ) -> AnalyticsResult<CycleEntry> {
        let existing = self
            .cycles
            .get_cycles_for_user(user, 0)
            .await?
            .into_iter()
            .find(|c| c.id == cycle_id)
            .ok_or(AnalyticsError::CycleNotFound(cycle_id))?;
        ensure_range(existing.start_date, end_date)?;

        let updated = self
            .cycles
            .update_cycle_end(user, cycle_id, end_date, self.clock.now())
            .await?;
        tracing::info!(%user, %cycle_id, end = %end_date, "ended cycle");

        self.refresh_after_write(user).await;
        Ok(updated)
    }

    pub async fn log_symptom(&self, new: NewSymptomEntry) -> AnalyticsResult<SymptomEntry> {
        let entry = new.into_entry(self.clock.now());
        self.cycles.insert_symptom(&entry).await?;
        tracing::debug!(user = %entry.user_id, date = %entry.date, "logged symptoms");
        Ok(entry)
    }

    /// The write already succeeded, so a failed refresh is only logged.
    async fn refresh_after_write(&self, user: UserId) {
        if let Err(e) = self.refresh_predictions(user).await {
            tracing::warn!(%user, error = %e, "prediction refresh failed");
        }
    }

    /// Regenerates and stores every prediction type for the user.
    pub async fn refresh_predictions(&self, user: UserId) -> AnalyticsResult<RefreshSummary> {
        let forecasts = self
            .predictor
            .predict_future_cycles(user, self.settings.forecast_cycles)
            .await?;

        let next_period = self.predictor.predict_next_period(user).await?;
        let fertile_window = next_period.and_then(fertile_window_before);
        match next_period {
            Some(date) => {
                self.predictions
                    .store_next_period(user, date, ModelUsed::AverageBased)
                    .await?;
            }
            None => {
                self.predictions
                    .deactivate(user, PredictionType::NextPeriod)
                    .await?;
            }
        }
        match fertile_window {
            Some(window) => {
                self.predictions
                    .store_fertile_window(user, window, ModelUsed::AverageBased)
                    .await?;
            }
            None => {
                self.predictions
                    .deactivate(user, PredictionType::FertileWindow)
                    .await?;
            }
        }

        Ok(RefreshSummary {
            forecasts,
            next_period,
            fertile_window,
        })
    }

    pub async fn statistics(&self, user: UserId) -> AnalyticsResult<Option<CycleStatistics>> {
        self.stats
            .compute_statistics(user, self.settings.window_months)
            .await
    }

    pub async fn current_phase(&self, user: UserId) -> AnalyticsResult<PhaseReading> {
        self.phases.get_current_phase(user).await
    }

    pub async fn cycles(&self, user: UserId, limit: usize) -> AnalyticsResult<Vec<CycleEntry>> {
        self.cycles.get_cycles_for_user(user, limit).await
    }

    pub async fn cycles_in_range(
        &self,
        user: UserId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> AnalyticsResult<Vec<CycleEntry>> {
        self.cycles.get_cycles_overlapping_range(user, start, end).await
    }

    pub async fn symptoms_in_range(
        &self,
        user: UserId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> AnalyticsResult<Vec<SymptomEntry>> {
        self.cycles.get_symptoms_in_range(user, start, end).await
    }

    /// Every logged cycle, newest first, with its abnormality flags.
    pub async fn review_cycles(&self, user: UserId) -> AnalyticsResult<Vec<CycleReview>> {
        let cycles = self.cycles.get_cycles_for_user(user, 0).await?;
        let avg = self
            .statistics(user)
            .await?
            .map_or(0.0, |s| s.avg_cycle_length);
        Ok(abnormality::review(cycles, avg))
    }

    pub async fn dashboard(&self, user: UserId) -> AnalyticsResult<Dashboard> {
        let statistics = self
            .statistics(user)
            .await?
            .unwrap_or_else(default_statistics);
        let next_period = self.predictor.predict_next_period(user).await?;
        let calendar_query = PredictionQuery {
            prediction_type: Some(PredictionType::Calendar),
            ..Default::default()
        };

        Ok(Dashboard {
            statistics,
            current_phase: self.current_phase(user).await?,
            next_period,
            fertile_window: next_period.and_then(fertile_window_before),
            calendar: self
                .predictions
                .get_user_predictions(user, &calendar_query)
                .await?,
        })
    }
}
