//! Forward predictions: next period, fertile window and multi-cycle phase
//! calendars, from a per-user model when one can be had, otherwise from
//! historical averages.

use std::sync::Arc;

use chrono::{Duration, NaiveDate};

use crate::clock::Clock;
use crate::error::{shift_days, AnalyticsError, AnalyticsResult};
use crate::model_store::{CycleLengthModel, ModelStore};
use crate::models::{CycleEntry, CycleForecast, FertileWindow, ModelUsed, PhaseWindow, UserId};
use crate::prediction_store::PredictionStore;
use crate::repository::CycleRepository;
use crate::stats::{
    StatisticsAggregator, CYCLE_LENGTH_WINDOW, DEFAULT_CYCLE_LENGTH, DEFAULT_PERIOD_LENGTH,
};

/// Gaps outside this window are ignored by the next-period estimate.
const NEXT_PERIOD_GAP_WINDOW: (i64, i64) = (20, 45);
const NEXT_PERIOD_HISTORY: usize = 6;

const MIN_TRAINING_CYCLES: usize = 6;
const TRAINING_HISTORY: usize = 24;
const MODEL_SEED_HISTORY: usize = 10;

/// Upper bound on cycles projected by one forecast.
pub const MAX_FORECAST_CYCLES: usize = 24;

const OVULATION_BEFORE_PERIOD_DAYS: i64 = 14;
const FERTILE_DAYS_BEFORE_OVULATION: i64 = 4;

fn whole_days(days: f64) -> i64 {
    days.floor() as i64
}

/// Splits one cycle into contiguous, ordered phase windows.
///
/// The follicular and luteal windows are kept at least one day long, which
/// only matters when the period is long relative to the cycle.
pub fn phase_windows(
    start: NaiveDate,
    cycle_length: f64,
    period_length: f64,
) -> AnalyticsResult<CycleForecast> {
    let menstrual_end = shift_days(start, whole_days(period_length))?;
    let ovulation =
        shift_days(start, whole_days(cycle_length / 2.0))?.max(shift_days(menstrual_end, 2)?);
    let cycle_end =
        shift_days(start, whole_days(cycle_length) - 1)?.max(shift_days(ovulation, 2)?);

    Ok(CycleForecast {
        menstrual_phase: PhaseWindow::new(start, menstrual_end),
        follicular_phase: PhaseWindow::new(
            shift_days(menstrual_end, 1)?,
            shift_days(ovulation, -1)?,
        ),
        ovulatory_phase: PhaseWindow::new(ovulation, shift_days(ovulation, 1)?),
        luteal_phase: PhaseWindow::new(shift_days(ovulation, 2)?, cycle_end),
        cycle_length,
    })
}

/// Cycles of average length laid end to end after `last_start`.
pub fn average_forecasts(
    last_start: NaiveDate,
    avg_cycle_length: f64,
    avg_period_length: f64,
    num_cycles: usize,
) -> AnalyticsResult<Vec<CycleForecast>> {
    (0..num_cycles)
        .map(|i| {
            let start = shift_days(last_start, whole_days(avg_cycle_length * (i + 1) as f64))?;
            phase_windows(start, avg_cycle_length, avg_period_length)
        })
        .collect()
}

/// Chains model predictions: each predicted cycle becomes the previous cycle
/// of the next step. `starts` is newest first and needs at least two entries.
pub fn model_forecasts(
    model: &CycleLengthModel,
    starts: &[NaiveDate],
    avg_period_length: f64,
    num_cycles: usize,
) -> AnalyticsResult<Vec<CycleForecast>> {
    let mut chain: Vec<NaiveDate> = starts.to_vec();
    let mut forecasts = Vec::new();
    if chain.len() < 2 {
        return Ok(forecasts);
    }

    for _ in 0..num_cycles {
        let previous = (chain[0] - chain[1]).num_days();
        let (lo, hi) = CYCLE_LENGTH_WINDOW;
        let predicted = (model.predict(previous)?.round() as i64).clamp(lo, hi);
        let start = shift_days(chain[0], predicted)?;
        forecasts.push(phase_windows(start, predicted as f64, avg_period_length)?);
        chain.insert(0, start);
    }
    Ok(forecasts)
}

/// `(previous gap, next gap)` pairs from start dates sorted ascending.
pub fn training_samples(starts: &[NaiveDate]) -> Vec<(f64, f64)> {
    let gaps: Vec<f64> = starts
        .windows(2)
        .map(|w| (w[1] - w[0]).num_days() as f64)
        .collect();
    gaps.windows(2).map(|w| (w[0], w[1])).collect()
}

/// Average-gap estimate over cycles sorted newest first.
pub fn next_period_from(recent: &[CycleEntry]) -> Option<NaiveDate> {
    let (lo, hi) = NEXT_PERIOD_GAP_WINDOW;
    let gaps: Vec<i64> = recent
        .windows(2)
        .map(|w| (w[0].start_date - w[1].start_date).num_days())
        .filter(|gap| (lo..=hi).contains(gap))
        .collect();
    if gaps.is_empty() {
        return None;
    }
    let avg_cycle = gaps.iter().sum::<i64>() / gaps.len() as i64;
    recent[0]
        .start_date
        .checked_add_signed(Duration::days(avg_cycle))
}

/// `None` only when the window would fall before the earliest representable date.
pub fn fertile_window_before(next_period: NaiveDate) -> Option<FertileWindow> {
    let ovulation_day = shift_days(next_period, -OVULATION_BEFORE_PERIOD_DAYS).ok()?;
    Some(FertileWindow {
        fertile_start: shift_days(ovulation_day, -FERTILE_DAYS_BEFORE_OVULATION).ok()?,
        ovulation_day,
    })
}

pub struct Predictor {
    cycles: Arc<dyn CycleRepository>,
    stats: Arc<StatisticsAggregator>,
    models: Arc<dyn ModelStore>,
    store: Arc<PredictionStore>,
    clock: Arc<dyn Clock>,
    window_months: u32,
}

impl Predictor {
    pub fn new(
        cycles: Arc<dyn CycleRepository>,
        stats: Arc<StatisticsAggregator>,
        models: Arc<dyn ModelStore>,
        store: Arc<PredictionStore>,
        clock: Arc<dyn Clock>,
        window_months: u32,
    ) -> Self {
        Self {
            cycles,
            stats,
            models,
            store,
            clock,
            window_months,
        }
    }

    pub async fn predict_next_period(&self, user: UserId) -> AnalyticsResult<Option<NaiveDate>> {
        let recent = self
            .cycles
            .get_cycles_for_user(user, NEXT_PERIOD_HISTORY)
            .await?;
        Ok(next_period_from(&recent))
    }

    pub async fn get_fertile_window(&self, user: UserId) -> AnalyticsResult<Option<FertileWindow>> {
        Ok(self
            .predict_next_period(user)
            .await?
            .and_then(fertile_window_before))
    }

    /// Fits and persists a cycle-length model from the user's recent history.
    pub async fn train_model(&self, user: UserId) -> AnalyticsResult<CycleLengthModel> {
        let cycles = self.cycles.get_cycles_for_user(user, TRAINING_HISTORY).await?;
        if cycles.len() < MIN_TRAINING_CYCLES {
            return Err(AnalyticsError::InsufficientHistory {
                required: MIN_TRAINING_CYCLES,
                available: cycles.len(),
            });
        }

        let mut starts: Vec<NaiveDate> = cycles.iter().map(|c| c.start_date).collect();
        starts.sort();
        let samples = training_samples(&starts);
        let model = CycleLengthModel::fit(&samples, self.clock.now())?;
        self.models.save(user, &model).await?;
        tracing::info!(%user, samples = samples.len(), "trained cycle length model");
        Ok(model)
    }

    /// Loads the user's model, training one inline when none is stored yet.
    async fn load_or_train(&self, user: UserId) -> AnalyticsResult<Option<CycleLengthModel>> {
        if let Some(model) = self.models.load(user).await? {
            return Ok(Some(model));
        }
        match self.train_model(user).await {
            Ok(model) => Ok(Some(model)),
            Err(AnalyticsError::InsufficientHistory { required, available }) => {
                tracing::debug!(%user, required, available, "no model available");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn predict_next_cycle_length(&self, user: UserId) -> AnalyticsResult<Option<i64>> {
        let Some(model) = self.load_or_train(user).await? else {
            return Ok(None);
        };
        let recent = self.cycles.get_cycles_for_user(user, 3).await?;
        if recent.len() < 2 {
            return Ok(None);
        }
        let previous = (recent[0].start_date - recent[1].start_date).num_days();
        Ok(Some(model.predict(previous)?.round() as i64))
    }

    /// Averages from statistics, or the documented defaults when there are none.
    async fn averages(&self, user: UserId) -> AnalyticsResult<(f64, f64)> {
        let stats = self.stats.compute_statistics(user, self.window_months).await?;
        Ok(match stats {
            Some(s) if s.avg_cycle_length >= 1.0 => (s.avg_cycle_length, s.avg_period_length),
            _ => {
                tracing::debug!(%user, "using default cycle averages");
                (DEFAULT_CYCLE_LENGTH, DEFAULT_PERIOD_LENGTH)
            }
        })
    }

    /// Forecasts `num_cycles` cycles and stores them as the user's calendar.
    pub async fn predict_future_cycles(
        &self,
        user: UserId,
        num_cycles: usize,
    ) -> AnalyticsResult<Vec<CycleForecast>> {
        if num_cycles > MAX_FORECAST_CYCLES {
            return Err(AnalyticsError::ForecastTooLong {
                requested: num_cycles,
                max: MAX_FORECAST_CYCLES,
            });
        }

        let recent = self
            .cycles
            .get_cycles_for_user(user, MODEL_SEED_HISTORY)
            .await?;
        let Some(latest) = recent.first() else {
            return Ok(Vec::new());
        };

        let (avg_cycle, avg_period) = self.averages(user).await?;
        let model = self.load_or_train(user).await?;

        let (forecasts, model_used) = match model {
            Some(model) if recent.len() >= 2 => {
                let starts: Vec<NaiveDate> = recent.iter().map(|c| c.start_date).collect();
                (
                    model_forecasts(&model, &starts, avg_period, num_cycles)?,
                    ModelUsed::RandomForest,
                )
            }
            _ => (
                average_forecasts(latest.start_date, avg_cycle, avg_period, num_cycles)?,
                ModelUsed::AverageBased,
            ),
        };

        self.store
            .store_calendar_predictions(user, &forecasts, model_used)
            .await?;
        Ok(forecasts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::model_store::InMemoryModelStore;
    use crate::models::{PredictionQuery, PredictionType};
    use crate::repository::InMemoryStore;
    use crate::stats::tests::{cycle, date};
    use uuid::Uuid;

    struct Fixture {
        predictor: Predictor,
        store: Arc<PredictionStore>,
        models: Arc<InMemoryModelStore>,
    }

    async fn fixture(cycles: &[CycleEntry], today: &str) -> Fixture {
        let repo = Arc::new(InMemoryStore::new());
        for c in cycles {
            repo.insert_cycle(c).await.unwrap();
        }
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::on(date(today)));
        let stats = Arc::new(StatisticsAggregator::new(repo.clone(), clock.clone()));
        let models = Arc::new(InMemoryModelStore::new());
        let store = Arc::new(PredictionStore::new(repo.clone(), clock.clone()));
        let predictor = Predictor::new(repo, stats, models.clone(), store.clone(), clock, 12);
        Fixture {
            predictor,
            store,
            models,
        }
    }

    fn monthly(user: UserId) -> Vec<CycleEntry> {
        vec![
            cycle(user, "2024-01-01", Some("2024-01-05")),
            cycle(user, "2024-01-29", Some("2024-02-02")),
            cycle(user, "2024-02-26", Some("2024-03-01")),
        ]
    }

    fn assert_ordered(forecast: &CycleForecast) {
        let phases = forecast.phases();
        for (_, w) in &phases {
            assert!(w.start <= w.end, "{forecast:?}");
        }
        for pair in phases.windows(2) {
            assert_eq!(pair[0].1.end + Duration::days(1), pair[1].1.start, "{forecast:?}");
        }
    }

    #[test]
    fn next_period_averages_valid_gaps() {
        let u = UserId::new(Uuid::new_v4());
        let mut cycles = monthly(u);
        cycles.reverse();
        assert_eq!(next_period_from(&cycles), Some(date("2024-03-25")));
    }

    #[test]
    fn next_period_needs_a_gap() {
        let u = UserId::new(Uuid::new_v4());
        assert_eq!(next_period_from(&[cycle(u, "2024-01-01", Some("2024-01-05"))]), None);
        // a 60 day gap is outside the 20-45 window
        let far = vec![cycle(u, "2024-03-01", None), cycle(u, "2024-01-01", Some("2024-01-05"))];
        assert_eq!(next_period_from(&far), None);
    }

    #[test]
    fn fertile_window_is_five_days_ending_on_ovulation() {
        let w = fertile_window_before(date("2024-03-25")).unwrap();
        assert_eq!(w.ovulation_day, date("2024-03-11"));
        assert_eq!(w.fertile_start, date("2024-03-07"));
        assert_eq!((w.ovulation_day - w.fertile_start).num_days() + 1, 5);
    }

    #[test]
    fn average_windows_for_28_day_cycles() {
        let forecasts = average_forecasts(date("2024-02-26"), 28.0, 5.0, 2).unwrap();
        assert_eq!(forecasts.len(), 2);
        let first = &forecasts[0];
        assert_eq!(first.menstrual_phase, PhaseWindow::new(date("2024-03-25"), date("2024-03-30")));
        assert_eq!(first.follicular_phase, PhaseWindow::new(date("2024-03-31"), date("2024-04-07")));
        assert_eq!(first.ovulatory_phase, PhaseWindow::new(date("2024-04-08"), date("2024-04-09")));
        assert_eq!(first.luteal_phase, PhaseWindow::new(date("2024-04-10"), date("2024-04-21")));
        assert_eq!(forecasts[1].menstrual_phase.start, date("2024-04-22"));
        forecasts.iter().for_each(assert_ordered);
    }

    #[test]
    fn windows_stay_ordered_for_long_periods() {
        let forecast = phase_windows(date("2024-01-01"), 15.0, 14.0).unwrap();
        assert_ordered(&forecast);
    }

    #[test]
    fn projections_past_the_calendar_are_errors() {
        assert!(matches!(
            average_forecasts(NaiveDate::MAX, 28.0, 5.0, 1),
            Err(AnalyticsError::DateOutOfRange)
        ));
        assert!(matches!(
            phase_windows(date("2024-01-01"), 1e300, 5.0),
            Err(AnalyticsError::DateOutOfRange)
        ));
        assert_eq!(fertile_window_before(NaiveDate::MIN), None);
    }

    #[test]
    fn training_pairs_consecutive_gaps() {
        let starts: Vec<NaiveDate> = ["2024-01-01", "2024-01-29", "2024-02-28", "2024-03-25"]
            .iter()
            .map(|d| date(d))
            .collect();
        assert_eq!(training_samples(&starts), vec![(28.0, 30.0), (30.0, 26.0)]);
    }

    #[tokio::test]
    async fn new_user_gets_nothing() {
        let u = UserId::new(Uuid::new_v4());
        let f = fixture(&[], "2024-03-10").await;
        assert_eq!(f.predictor.predict_next_period(u).await.unwrap(), None);
        assert_eq!(f.predictor.get_fertile_window(u).await.unwrap(), None);
        assert!(f.predictor.predict_future_cycles(u, 3).await.unwrap().is_empty());
        assert_eq!(f.predictor.predict_next_cycle_length(u).await.unwrap(), None);
    }

    #[tokio::test]
    async fn oversized_forecasts_are_rejected() {
        let u = UserId::new(Uuid::new_v4());
        let f = fixture(&[cycle(u, "2024-02-26", Some("2024-03-01"))], "2024-03-10").await;

        let result = f.predictor.predict_future_cycles(u, 5_000_000).await;
        assert!(matches!(
            result,
            Err(AnalyticsError::ForecastTooLong { requested: 5_000_000, max: MAX_FORECAST_CYCLES })
        ));

        let longest = f
            .predictor
            .predict_future_cycles(u, MAX_FORECAST_CYCLES)
            .await
            .unwrap();
        assert_eq!(longest.len(), MAX_FORECAST_CYCLES);
    }

    #[tokio::test]
    async fn short_history_falls_back_to_averages() {
        let u = UserId::new(Uuid::new_v4());
        let f = fixture(&monthly(u), "2024-03-10").await;

        let forecasts = f.predictor.predict_future_cycles(u, 3).await.unwrap();
        assert_eq!(forecasts.len(), 3);
        assert_eq!(forecasts[0].menstrual_phase.start, date("2024-03-25"));
        forecasts.iter().for_each(assert_ordered);

        let query = PredictionQuery {
            prediction_type: Some(PredictionType::Calendar),
            ..Default::default()
        };
        let stored = f.store.get_user_predictions(u, &query).await.unwrap();
        assert_eq!(stored.len(), 12);
        assert!(stored.iter().all(|p| p.model_used == ModelUsed::AverageBased));
        assert!(stored.iter().all(|p| p.confidence_score == 0.6));
        assert!(f.models.load(u).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn training_requires_six_cycles() {
        let u = UserId::new(Uuid::new_v4());
        let f = fixture(&monthly(u), "2024-03-10").await;
        assert!(matches!(
            f.predictor.train_model(u).await,
            Err(AnalyticsError::InsufficientHistory { required: 6, available: 3 })
        ));
    }

    #[tokio::test]
    async fn regular_history_trains_and_chains_model() {
        let u = UserId::new(Uuid::new_v4());
        let start = date("2023-09-04");
        let history: Vec<CycleEntry> = (0..8)
            .map(|i| {
                let s = start + Duration::days(28 * i);
                let e = s + Duration::days(4);
                cycle(u, &s.to_string(), Some(e.to_string().as_str()))
            })
            .collect();
        let last_start = start + Duration::days(28 * 7);
        let f = fixture(&history, "2024-04-20").await;

        assert_eq!(f.predictor.predict_next_cycle_length(u).await.unwrap(), Some(28));
        assert!(f.models.load(u).await.unwrap().is_some());

        let forecasts = f.predictor.predict_future_cycles(u, 4).await.unwrap();
        assert_eq!(forecasts.len(), 4);
        for (i, forecast) in forecasts.iter().enumerate() {
            let expected = last_start + Duration::days(28 * (i as i64 + 1));
            assert_eq!(forecast.menstrual_phase.start, expected);
            assert_eq!(forecast.cycle_length, 28.0);
            assert_ordered(forecast);
        }

        let stored = f
            .store
            .get_user_predictions(u, &PredictionQuery::default())
            .await
            .unwrap();
        assert_eq!(stored.len(), 16);
        assert!(stored.iter().all(|p| p.model_used == ModelUsed::RandomForest));
    }
}
