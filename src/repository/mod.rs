//! Storage ports for cycle, symptom and prediction records.
//!
//! Every query is scoped by user. "No data" is always an empty result;
//! only storage failures surface as errors.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::error::AnalyticsResult;
use crate::models::{
    CycleEntry, CyclePrediction, PredictionQuery, PredictionType, SymptomEntry, UserId,
};

pub mod memory;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait CycleRepository: Send + Sync {
    /// Most recent start date first. `limit == 0` returns every cycle.
    async fn get_cycles_for_user(&self, user: UserId, limit: usize)
        -> AnalyticsResult<Vec<CycleEntry>>;

    /// The open-ended entry, if any.
    async fn get_current_cycle(&self, user: UserId) -> AnalyticsResult<Option<CycleEntry>>;

    async fn get_last_completed_cycle(&self, user: UserId)
        -> AnalyticsResult<Option<CycleEntry>>;

    /// Cycles whose `[start, end]` interval (open when in progress) meets the
    /// half-open range `[start, end)`, ascending by start.
    async fn get_cycles_overlapping_range(
        &self,
        user: UserId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> AnalyticsResult<Vec<CycleEntry>>;

    /// Symptom entries dated within `[start, end]`, ascending by date.
    async fn get_symptoms_in_range(
        &self,
        user: UserId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> AnalyticsResult<Vec<SymptomEntry>>;

    async fn insert_cycle(&self, cycle: &CycleEntry) -> AnalyticsResult<()>;

    /// Sets the end date of an existing cycle and returns the updated row.
    async fn update_cycle_end(
        &self,
        user: UserId,
        cycle_id: Uuid,
        end_date: NaiveDate,
        updated_at: DateTime<Utc>,
    ) -> AnalyticsResult<CycleEntry>;

    async fn insert_symptom(&self, symptom: &SymptomEntry) -> AnalyticsResult<()>;
}

#[async_trait]
pub trait PredictionRepository: Send + Sync {
    async fn insert_predictions(&self, predictions: &[CyclePrediction]) -> AnalyticsResult<()>;

    /// Active predictions matching the query, ascending by target date.
    async fn find_predictions(
        &self,
        user: UserId,
        query: &PredictionQuery,
    ) -> AnalyticsResult<Vec<CyclePrediction>>;

    /// Deletes predictions of a type created at or after `since`.
    async fn delete_created_since(
        &self,
        user: UserId,
        prediction_type: PredictionType,
        since: DateTime<Utc>,
    ) -> AnalyticsResult<u64>;

    /// Deletes predictions created strictly before `cutoff`.
    async fn delete_created_before(
        &self,
        user: UserId,
        prediction_type: Option<PredictionType>,
        cutoff: DateTime<Utc>,
    ) -> AnalyticsResult<u64>;

    /// Marks every active prediction of a type inactive.
    async fn deactivate(
        &self,
        user: UserId,
        prediction_type: PredictionType,
        updated_at: DateTime<Utc>,
    ) -> AnalyticsResult<u64>;
}

pub(crate) fn overlaps(cycle: &CycleEntry, start: NaiveDate, end: NaiveDate) -> bool {
    cycle.start_date < end && cycle.end_date.map_or(true, |e| e >= start)
}
