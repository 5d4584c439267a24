use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{CycleRepository, PredictionRepository};
use crate::error::{ensure_range, AnalyticsError, AnalyticsResult};
use crate::models::{
    CycleEntry, CyclePrediction, PredictionQuery, PredictionType, SymptomEntry, UserId,
};

const CYCLE_COLUMNS: &str = "id, user_id, start_date, end_date, flow_intensity, pain_level, \
     mood, symptoms, notes, created_at, updated_at";

const SYMPTOM_COLUMNS: &str =
    "id, user_id, cycle_id, date, symptoms, mood, pain_level, severity, notes, created_at";

const PREDICTION_COLUMNS: &str = "id, user_id, prediction_type, prediction_date, \
     predicted_for_date, phase, start_date, end_date, confidence_score, model_used, \
     features_used, is_active, created_at, updated_at";

/// Postgres-backed store for cycles, symptoms and predictions.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct CycleRow {
    id: Uuid,
    user_id: Uuid,
    start_date: NaiveDate,
    end_date: Option<NaiveDate>,
    flow_intensity: String,
    pain_level: String,
    mood: String,
    symptoms: Vec<String>,
    notes: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CycleRow> for CycleEntry {
    type Error = AnalyticsError;

    fn try_from(row: CycleRow) -> Result<Self, Self::Error> {
        Ok(CycleEntry {
            id: row.id,
            user_id: UserId::new(row.user_id),
            start_date: row.start_date,
            end_date: row.end_date,
            flow_intensity: row.flow_intensity.parse()?,
            pain_level: row.pain_level.parse()?,
            mood: row.mood.parse()?,
            symptoms: row.symptoms,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SymptomRow {
    id: Uuid,
    user_id: Uuid,
    cycle_id: Option<Uuid>,
    date: NaiveDate,
    symptoms: Vec<String>,
    mood: Option<String>,
    pain_level: Option<String>,
    severity: String,
    notes: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<SymptomRow> for SymptomEntry {
    type Error = AnalyticsError;

    fn try_from(row: SymptomRow) -> Result<Self, Self::Error> {
        Ok(SymptomEntry {
            id: row.id,
            user_id: UserId::new(row.user_id),
            cycle_id: row.cycle_id,
            date: row.date,
            symptoms: row.symptoms,
            mood: row.mood.map(|m| m.parse()).transpose()?,
            pain_level: row.pain_level.map(|p| p.parse()).transpose()?,
            severity: row.severity.parse()?,
            notes: row.notes,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PredictionRow {
    id: Uuid,
    user_id: Uuid,
    prediction_type: String,
    prediction_date: DateTime<Utc>,
    predicted_for_date: NaiveDate,
    phase: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
    confidence_score: f64,
    model_used: String,
    features_used: serde_json::Value,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PredictionRow> for CyclePrediction {
    type Error = AnalyticsError;

    fn try_from(row: PredictionRow) -> Result<Self, Self::Error> {
        Ok(CyclePrediction {
            id: row.id,
            user_id: UserId::new(row.user_id),
            prediction_type: row.prediction_type.parse()?,
            prediction_date: row.prediction_date,
            predicted_for_date: row.predicted_for_date,
            phase: row.phase.parse()?,
            start_date: row.start_date,
            end_date: row.end_date,
            confidence_score: row.confidence_score,
            model_used: row.model_used.parse()?,
            features_used: row.features_used,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_entries<R, T>(rows: Vec<R>) -> AnalyticsResult<Vec<T>>
where
    T: TryFrom<R, Error = AnalyticsError>,
{
    rows.into_iter().map(T::try_from).collect()
}

#[async_trait]
impl CycleRepository for PgStore {
    async fn get_cycles_for_user(
        &self,
        user: UserId,
        limit: usize,
    ) -> AnalyticsResult<Vec<CycleEntry>> {
        // LIMIT NULL means no limit in Postgres
        let limit = (limit > 0).then_some(limit as i64);
        let rows = sqlx::query_as::<_, CycleRow>(&format!(
            "SELECT {CYCLE_COLUMNS} FROM menstrual_cycles \
             WHERE user_id = $1 ORDER BY start_date DESC LIMIT $2"
        ))
        .bind(user.as_uuid())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        into_entries(rows)
    }

    async fn get_current_cycle(&self, user: UserId) -> AnalyticsResult<Option<CycleEntry>> {
        let row = sqlx::query_as::<_, CycleRow>(&format!(
            "SELECT {CYCLE_COLUMNS} FROM menstrual_cycles \
             WHERE user_id = $1 AND end_date IS NULL ORDER BY start_date DESC LIMIT 1"
        ))
        .bind(user.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(CycleEntry::try_from).transpose()
    }

    async fn get_last_completed_cycle(
        &self,
        user: UserId,
    ) -> AnalyticsResult<Option<CycleEntry>> {
        let row = sqlx::query_as::<_, CycleRow>(&format!(
            "SELECT {CYCLE_COLUMNS} FROM menstrual_cycles \
             WHERE user_id = $1 AND end_date IS NOT NULL ORDER BY start_date DESC LIMIT 1"
        ))
        .bind(user.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(CycleEntry::try_from).transpose()
    }

    async fn get_cycles_overlapping_range(
        &self,
        user: UserId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> AnalyticsResult<Vec<CycleEntry>> {
        ensure_range(start, end)?;
        let rows = sqlx::query_as::<_, CycleRow>(&format!(
            "SELECT {CYCLE_COLUMNS} FROM menstrual_cycles \
             WHERE user_id = $1 AND start_date < $3 \
               AND (end_date IS NULL OR end_date >= $2) \
             ORDER BY start_date ASC"
        ))
        .bind(user.as_uuid())
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;
        into_entries(rows)
    }

    async fn get_symptoms_in_range(
        &self,
        user: UserId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> AnalyticsResult<Vec<SymptomEntry>> {
        ensure_range(start, end)?;
        let rows = sqlx::query_as::<_, SymptomRow>(&format!(
            "SELECT {SYMPTOM_COLUMNS} FROM cycle_symptoms \
             WHERE user_id = $1 AND date >= $2 AND date <= $3 \
             ORDER BY date ASC"
        ))
        .bind(user.as_uuid())
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;
        into_entries(rows)
    }

    async fn insert_cycle(&self, cycle: &CycleEntry) -> AnalyticsResult<()> {
        // RETURNING makes an unacknowledged insert fail with RowNotFound
        sqlx::query_scalar::<_, Uuid>(&format!(
            "INSERT INTO menstrual_cycles ({CYCLE_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING id"
        ))
        .bind(cycle.id)
        .bind(cycle.user_id.as_uuid())
        .bind(cycle.start_date)
        .bind(cycle.end_date)
        .bind(cycle.flow_intensity.as_str())
        .bind(cycle.pain_level.as_str())
        .bind(cycle.mood.as_str())
        .bind(&cycle.symptoms)
        .bind(&cycle.notes)
        .bind(cycle.created_at)
        .bind(cycle.updated_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_cycle_end(
        &self,
        user: UserId,
        cycle_id: Uuid,
        end_date: NaiveDate,
        updated_at: DateTime<Utc>,
    ) -> AnalyticsResult<CycleEntry> {
        let row = sqlx::query_as::<_, CycleRow>(&format!(
            "UPDATE menstrual_cycles SET end_date = $3, updated_at = $4 \
             WHERE id = $1 AND user_id = $2 RETURNING {CYCLE_COLUMNS}"
        ))
        .bind(cycle_id)
        .bind(user.as_uuid())
        .bind(end_date)
        .bind(updated_at)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AnalyticsError::CycleNotFound(cycle_id))?;
        row.try_into()
    }

    async fn insert_symptom(&self, symptom: &SymptomEntry) -> AnalyticsResult<()> {
        sqlx::query_scalar::<_, Uuid>(&format!(
            "INSERT INTO cycle_symptoms ({SYMPTOM_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING id"
        ))
        .bind(symptom.id)
        .bind(symptom.user_id.as_uuid())
        .bind(symptom.cycle_id)
        .bind(symptom.date)
        .bind(&symptom.symptoms)
        .bind(symptom.mood.map(|m| m.as_str()))
        .bind(symptom.pain_level.map(|p| p.as_str()))
        .bind(symptom.severity.as_str())
        .bind(&symptom.notes)
        .bind(symptom.created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl PredictionRepository for PgStore {
    async fn insert_predictions(&self, predictions: &[CyclePrediction]) -> AnalyticsResult<()> {
        let mut tx = self.pool.begin().await?;
        for p in predictions {
            sqlx::query_scalar::<_, Uuid>(&format!(
                "INSERT INTO cycle_predictions ({PREDICTION_COLUMNS}) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
                 RETURNING id"
            ))
            .bind(p.id)
            .bind(p.user_id.as_uuid())
            .bind(p.prediction_type.as_str())
            .bind(p.prediction_date)
            .bind(p.predicted_for_date)
            .bind(p.phase.as_str())
            .bind(p.start_date)
            .bind(p.end_date)
            .bind(p.confidence_score)
            .bind(p.model_used.as_str())
            .bind(&p.features_used)
            .bind(p.is_active)
            .bind(p.created_at)
            .bind(p.updated_at)
            .fetch_one(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn find_predictions(
        &self,
        user: UserId,
        query: &PredictionQuery,
    ) -> AnalyticsResult<Vec<CyclePrediction>> {
        let rows = sqlx::query_as::<_, PredictionRow>(&format!(
            "SELECT {PREDICTION_COLUMNS} FROM cycle_predictions \
             WHERE user_id = $1 AND is_active \
               AND ($2::TEXT IS NULL OR prediction_type = $2) \
               AND ($3::DATE IS NULL OR predicted_for_date >= $3) \
               AND ($4::DATE IS NULL OR predicted_for_date <= $4) \
             ORDER BY predicted_for_date ASC LIMIT $5"
        ))
        .bind(user.as_uuid())
        .bind(query.prediction_type.map(|t| t.as_str()))
        .bind(query.from)
        .bind(query.to)
        .bind(query.limit.map(|l| l as i64))
        .fetch_all(&self.pool)
        .await?;
        into_entries(rows)
    }

    async fn delete_created_since(
        &self,
        user: UserId,
        prediction_type: PredictionType,
        since: DateTime<Utc>,
    ) -> AnalyticsResult<u64> {
        let result = sqlx::query(
            "DELETE FROM cycle_predictions \
             WHERE user_id = $1 AND prediction_type = $2 AND created_at >= $3",
        )
        .bind(user.as_uuid())
        .bind(prediction_type.as_str())
        .bind(since)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_created_before(
        &self,
        user: UserId,
        prediction_type: Option<PredictionType>,
        cutoff: DateTime<Utc>,
    ) -> AnalyticsResult<u64> {
        let result = sqlx::query(
            "DELETE FROM cycle_predictions \
             WHERE user_id = $1 AND ($2::TEXT IS NULL OR prediction_type = $2) \
               AND created_at < $3",
        )
        .bind(user.as_uuid())
        .bind(prediction_type.map(|t| t.as_str()))
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn deactivate(
        &self,
        user: UserId,
        prediction_type: PredictionType,
        updated_at: DateTime<Utc>,
    ) -> AnalyticsResult<u64> {
        let result = sqlx::query(
            "UPDATE cycle_predictions SET is_active = FALSE, updated_at = $3 \
             WHERE user_id = $1 AND prediction_type = $2 AND is_active",
        )
        .bind(user.as_uuid())
        .bind(prediction_type.as_str())
        .bind(updated_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
