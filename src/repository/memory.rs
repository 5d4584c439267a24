use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{overlaps, CycleRepository, PredictionRepository};
use crate::error::{ensure_range, AnalyticsError, AnalyticsResult};
use crate::models::{
    CycleEntry, CyclePrediction, PredictionQuery, PredictionType, SymptomEntry, UserId,
};

#[derive(Default)]
struct Tables {
    cycles: Vec<CycleEntry>,
    symptoms: Vec<SymptomEntry>,
    predictions: Vec<CyclePrediction>,
}

/// Process-local store used when no database is configured.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first(mut cycles: Vec<CycleEntry>) -> Vec<CycleEntry> {
    cycles.sort_by(|a, b| b.start_date.cmp(&a.start_date));
    cycles
}

#[async_trait]
impl CycleRepository for InMemoryStore {
    async fn get_cycles_for_user(
        &self,
        user: UserId,
        limit: usize,
    ) -> AnalyticsResult<Vec<CycleEntry>> {
        let tables = self.tables.read().await;
        let owned = tables
            .cycles
            .iter()
            .filter(|c| c.user_id == user)
            .cloned()
            .collect();
        let mut cycles = newest_first(owned);
        if limit > 0 {
            cycles.truncate(limit);
        }
        Ok(cycles)
    }

    async fn get_current_cycle(&self, user: UserId) -> AnalyticsResult<Option<CycleEntry>> {
        let cycles = self.get_cycles_for_user(user, 0).await?;
        Ok(cycles.into_iter().find(|c| c.end_date.is_none()))
    }

    async fn get_last_completed_cycle(
        &self,
        user: UserId,
    ) -> AnalyticsResult<Option<CycleEntry>> {
        let cycles = self.get_cycles_for_user(user, 0).await?;
        Ok(cycles.into_iter().find(CycleEntry::is_completed))
    }

    async fn get_cycles_overlapping_range(
        &self,
        user: UserId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> AnalyticsResult<Vec<CycleEntry>> {
        ensure_range(start, end)?;
        let mut cycles: Vec<CycleEntry> = self
            .get_cycles_for_user(user, 0)
            .await?
            .into_iter()
            .filter(|c| overlaps(c, start, end))
            .collect();
        cycles.reverse();
        Ok(cycles)
    }

    async fn get_symptoms_in_range(
        &self,
        user: UserId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> AnalyticsResult<Vec<SymptomEntry>> {
        ensure_range(start, end)?;
        let tables = self.tables.read().await;
        let mut symptoms: Vec<SymptomEntry> = tables
            .symptoms
            .iter()
            .filter(|s| s.user_id == user && s.date >= start && s.date <= end)
            .cloned()
            .collect();
        symptoms.sort_by_key(|s| s.date);
        Ok(symptoms)
    }

    async fn insert_cycle(&self, cycle: &CycleEntry) -> AnalyticsResult<()> {
        self.tables.write().await.cycles.push(cycle.clone());
        Ok(())
    }

    async fn update_cycle_end(
        &self,
        user: UserId,
        cycle_id: Uuid,
        end_date: NaiveDate,
        updated_at: DateTime<Utc>,
    ) -> AnalyticsResult<CycleEntry> {
        let mut tables = self.tables.write().await;
        let cycle = tables
            .cycles
            .iter_mut()
            .find(|c| c.id == cycle_id && c.user_id == user)
            .ok_or(AnalyticsError::CycleNotFound(cycle_id))?;
        cycle.end_date = Some(end_date);
        cycle.updated_at = updated_at;
        Ok(cycle.clone())
    }

    async fn insert_symptom(&self, symptom: &SymptomEntry) -> AnalyticsResult<()> {
        self.tables.write().await.symptoms.push(symptom.clone());
        Ok(())
    }
}

fn matches_query(p: &CyclePrediction, user: UserId, query: &PredictionQuery) -> bool {
    p.user_id == user
        && p.is_active
        && query.prediction_type.map_or(true, |t| p.prediction_type == t)
        && query.from.map_or(true, |from| p.predicted_for_date >= from)
        && query.to.map_or(true, |to| p.predicted_for_date <= to)
}

#[async_trait]
impl PredictionRepository for InMemoryStore {
    async fn insert_predictions(&self, predictions: &[CyclePrediction]) -> AnalyticsResult<()> {
        self.tables
            .write()
            .await
            .predictions
            .extend_from_slice(predictions);
        Ok(())
    }

    async fn find_predictions(
        &self,
        user: UserId,
        query: &PredictionQuery,
    ) -> AnalyticsResult<Vec<CyclePrediction>> {
        let tables = self.tables.read().await;
        let mut found: Vec<CyclePrediction> = tables
            .predictions
            .iter()
            .filter(|p| matches_query(p, user, query))
            .cloned()
            .collect();
        found.sort_by_key(|p| p.predicted_for_date);
        if let Some(limit) = query.limit {
            found.truncate(limit);
        }
        Ok(found)
    }

    async fn delete_created_since(
        &self,
        user: UserId,
        prediction_type: PredictionType,
        since: DateTime<Utc>,
    ) -> AnalyticsResult<u64> {
        let mut tables = self.tables.write().await;
        let before = tables.predictions.len();
        tables.predictions.retain(|p| {
            !(p.user_id == user && p.prediction_type == prediction_type && p.created_at >= since)
        });
        Ok((before - tables.predictions.len()) as u64)
    }

    async fn delete_created_before(
        &self,
        user: UserId,
        prediction_type: Option<PredictionType>,
        cutoff: DateTime<Utc>,
    ) -> AnalyticsResult<u64> {
        let mut tables = self.tables.write().await;
        let before = tables.predictions.len();
        tables.predictions.retain(|p| {
            !(p.user_id == user
                && prediction_type.map_or(true, |t| p.prediction_type == t)
                && p.created_at < cutoff)
        });
        Ok((before - tables.predictions.len()) as u64)
    }

    async fn deactivate(
        &self,
        user: UserId,
        prediction_type: PredictionType,
        updated_at: DateTime<Utc>,
    ) -> AnalyticsResult<u64> {
        let mut tables = self.tables.write().await;
        let mut touched = 0;
        for p in tables
            .predictions
            .iter_mut()
            .filter(|p| p.user_id == user && p.prediction_type == prediction_type && p.is_active)
        {
            p.is_active = false;
            p.updated_at = updated_at;
            touched += 1;
        }
        Ok(touched)
    }
}
