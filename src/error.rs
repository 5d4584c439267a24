use chrono::{Duration, NaiveDate};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum AnalyticsError {
    #[error("insufficient history: need {required} cycles, have {available}")]
    InsufficientHistory { required: usize, available: usize },
    #[error("invalid date range: {start} is after {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },
    #[error("invalid calendar month {year}-{month}")]
    InvalidMonth { year: i32, month: u32 },
    #[error("a cycle started on {0} is still in progress")]
    CycleInProgress(NaiveDate),
    #[error("cycle {0} not found")]
    CycleNotFound(Uuid),
    #[error("cannot forecast {requested} cycles, at most {max}")]
    ForecastTooLong { requested: usize, max: usize },
    #[error("retention must be a non-negative number of days, got {0}")]
    InvalidRetention(i64),
    #[error("date arithmetic out of range")]
    DateOutOfRange,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("model artifact error: {0}")]
    ModelArtifact(#[from] std::io::Error),
    #[error("model fit failed: {0}")]
    ModelFit(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("corrupt record: {0}")]
    CorruptRecord(String),
}

impl AnalyticsError {
    /// Errors the caller caused, as opposed to storage failures.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidDateRange { .. }
                | Self::InvalidMonth { .. }
                | Self::CycleInProgress(_)
                | Self::CycleNotFound(_)
                | Self::ForecastTooLong { .. }
                | Self::InvalidRetention(_)
                | Self::DateOutOfRange
        )
    }
}

pub type AnalyticsResult<T> = Result<T, AnalyticsError>;

/// `date` moved by a signed number of days, or `DateOutOfRange`.
pub fn shift_days(date: NaiveDate, days: i64) -> AnalyticsResult<NaiveDate> {
    Duration::try_days(days)
        .and_then(|d| date.checked_add_signed(d))
        .ok_or(AnalyticsError::DateOutOfRange)
}

/// Reject ranges whose end precedes their start.
pub fn ensure_range(start: NaiveDate, end: NaiveDate) -> AnalyticsResult<()> {
    if end < start {
        return Err(AnalyticsError::InvalidDateRange { start, end });
    }
    Ok(())
}
