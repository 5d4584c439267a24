//! Cycle statistics: length samples, averages, regularity and symptom ranking.
//!
//! Everything here is recomputed from stored records on each call.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, NaiveDate};

use crate::clock::Clock;
use crate::error::AnalyticsResult;
use crate::models::{CycleEntry, CycleStatistics, SymptomEntry, SymptomFrequency, UserId};
use crate::repository::CycleRepository;

/// Cycle lengths outside this window are treated as logging mistakes.
pub const CYCLE_LENGTH_WINDOW: (i64, i64) = (15, 60);

/// Period lengths outside this window are treated as logging mistakes.
pub const PERIOD_LENGTH_WINDOW: (i64, i64) = (1, 14);

pub const DEFAULT_CYCLE_LENGTH: f64 = 28.0;
pub const DEFAULT_PERIOD_LENGTH: f64 = 5.0;

/// Mean absolute deviation that maps to a regularity of zero.
const MAX_EXPECTED_DEVIATION: f64 = 14.0;

const MIN_REGULARITY_SAMPLES: usize = 3;
const HISTORY_LEN: usize = 6;
const TOP_SYMPTOMS: usize = 5;
const DAYS_PER_MONTH: i64 = 30;

fn within(value: i64, (lo, hi): (i64, i64)) -> bool {
    (lo..=hi).contains(&value)
}

pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn mean(values: &[i64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<i64>() as f64 / values.len() as f64)
}

/// Gaps between consecutive completed cycles, oldest first.
pub fn cycle_length_samples(completed: &[&CycleEntry]) -> Vec<i64> {
    completed
        .windows(2)
        .map(|w| (w[1].start_date - w[0].start_date).num_days())
        .filter(|len| within(*len, CYCLE_LENGTH_WINDOW))
        .collect()
}

pub fn period_length_samples(completed: &[&CycleEntry]) -> Vec<i64> {
    completed
        .iter()
        .filter_map(|c| c.period_length())
        .filter(|len| within(*len, PERIOD_LENGTH_WINDOW))
        .collect()
}

/// 0-100 consistency of cycle lengths. Zero below three samples.
pub fn regularity_score(cycle_lengths: &[i64]) -> f64 {
    if cycle_lengths.len() < MIN_REGULARITY_SAMPLES {
        return 0.0;
    }
    let Some(avg) = mean(cycle_lengths) else {
        return 0.0;
    };
    let mean_abs_dev = cycle_lengths
        .iter()
        .map(|len| (*len as f64 - avg).abs())
        .sum::<f64>()
        / cycle_lengths.len() as f64;

    let score = (100.0 - mean_abs_dev / MAX_EXPECTED_DEVIATION * 100.0).max(0.0);
    round1(score.min(100.0))
}

/// Top symptom tags by count. Ties go to the most recently seen tag, then by name.
pub fn symptom_frequency(entries: &[SymptomEntry]) -> Vec<SymptomFrequency> {
    let mut tally: HashMap<&str, (u32, NaiveDate)> = HashMap::new();
    for entry in entries {
        for tag in &entry.symptoms {
            let slot = tally.entry(tag.as_str()).or_insert((0, entry.date));
            slot.0 += 1;
            slot.1 = slot.1.max(entry.date);
        }
    }

    let mut ranked: Vec<SymptomFrequency> = tally
        .into_iter()
        .map(|(symptom, (count, last_occurrence))| SymptomFrequency {
            symptom: symptom.to_string(),
            count,
            last_occurrence,
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then(b.last_occurrence.cmp(&a.last_occurrence))
            .then(a.symptom.cmp(&b.symptom))
    });
    ranked.truncate(TOP_SYMPTOMS);
    ranked
}

/// Builds the statistics snapshot from cycles sorted by start date ascending.
pub fn summarize(
    cycles: &[CycleEntry],
    symptoms: &[SymptomEntry],
    today: NaiveDate,
) -> Option<CycleStatistics> {
    let latest = cycles.last()?;

    let completed: Vec<&CycleEntry> = cycles.iter().filter(|c| c.is_completed()).collect();
    let cycle_lengths = cycle_length_samples(&completed);
    let mut period_lengths = period_length_samples(&completed);

    // An ongoing period counts as a lower bound on period length.
    if !latest.is_completed() && cycles.len() > 1 {
        let days_since_start = (today - latest.start_date).num_days();
        if within(days_since_start, PERIOD_LENGTH_WINDOW) {
            period_lengths.push(days_since_start);
        }
    }

    let avg_cycle_length = mean(&cycle_lengths).map_or(DEFAULT_CYCLE_LENGTH, round1);
    let avg_period_length = mean(&period_lengths).map_or(DEFAULT_PERIOD_LENGTH, round1);

    let history_start = cycles.len().saturating_sub(HISTORY_LEN);

    Some(CycleStatistics {
        total_cycles: cycle_lengths.len(),
        avg_cycle_length,
        min_cycle_length: cycle_lengths
            .iter()
            .min()
            .map_or(avg_cycle_length, |v| *v as f64),
        max_cycle_length: cycle_lengths
            .iter()
            .max()
            .map_or(avg_cycle_length, |v| *v as f64),
        avg_period_length,
        cycle_regularity: regularity_score(&cycle_lengths),
        cycle_history: cycles[history_start..].to_vec(),
        symptom_frequency: symptom_frequency(symptoms),
    })
}

/// Placeholder shown to users without any history.
pub fn default_statistics() -> CycleStatistics {
    CycleStatistics {
        total_cycles: 0,
        avg_cycle_length: DEFAULT_CYCLE_LENGTH,
        min_cycle_length: DEFAULT_CYCLE_LENGTH,
        max_cycle_length: DEFAULT_CYCLE_LENGTH,
        avg_period_length: DEFAULT_PERIOD_LENGTH,
        cycle_regularity: 0.0,
        cycle_history: Vec::new(),
        symptom_frequency: Vec::new(),
    }
}

/// Computes [`CycleStatistics`] for a trailing window of a user's history.
pub struct StatisticsAggregator {
    cycles: Arc<dyn CycleRepository>,
    clock: Arc<dyn Clock>,
}

impl StatisticsAggregator {
    pub fn new(cycles: Arc<dyn CycleRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { cycles, clock }
    }

    /// `None` when the user has no cycle starting inside the window.
    pub async fn compute_statistics(
        &self,
        user: UserId,
        window_months: u32,
    ) -> AnalyticsResult<Option<CycleStatistics>> {
        let today = self.clock.today();
        let since = today - Duration::days(i64::from(window_months) * DAYS_PER_MONTH);

        let mut cycles: Vec<CycleEntry> = self
            .cycles
            .get_cycles_for_user(user, 0)
            .await?
            .into_iter()
            .filter(|c| c.start_date >= since)
            .collect();
        if cycles.is_empty() {
            tracing::debug!(%user, "no cycles in statistics window");
            return Ok(None);
        }
        cycles.sort_by_key(|c| c.start_date);

        let symptoms = self.cycles.get_symptoms_in_range(user, since, today).await?;
        Ok(summarize(&cycles, &symptoms, today))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::models::{NewCycleEntry, NewSymptomEntry};
    use crate::repository::InMemoryStore;
    use uuid::Uuid;

    pub(crate) fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    pub(crate) fn cycle(user: UserId, start: &str, end: Option<&str>) -> CycleEntry {
        let mut new = NewCycleEntry::new(user, date(start));
        if let Some(end) = end {
            new = new.ended(date(end));
        }
        new.into_entry(FixedClock::on(date(start)).0)
    }

    fn user() -> UserId {
        UserId::new(Uuid::new_v4())
    }

    #[test]
    fn three_monthly_cycles() {
        let u = user();
        let cycles = vec![
            cycle(u, "2024-01-01", Some("2024-01-05")),
            cycle(u, "2024-01-29", Some("2024-02-02")),
            cycle(u, "2024-02-26", Some("2024-03-02")),
        ];
        let stats = summarize(&cycles, &[], date("2024-03-10")).unwrap();
        assert_eq!(stats.avg_cycle_length, 28.0);
        assert_eq!(stats.min_cycle_length, 28.0);
        assert_eq!(stats.max_cycle_length, 28.0);
        // 5, 5 and 6 days (2024 is a leap year)
        assert_eq!(stats.avg_period_length, 5.3);
        // only two gaps, too few to score
        assert_eq!(stats.cycle_regularity, 0.0);
        assert_eq!(stats.total_cycles, 2);
    }

    #[test]
    fn identical_lengths_are_fully_regular() {
        assert_eq!(regularity_score(&[28, 28, 28]), 100.0);
        assert_eq!(regularity_score(&[28, 28]), 0.0);
        assert_eq!(regularity_score(&[]), 0.0);
    }

    #[test]
    fn regularity_stays_in_bounds() {
        // mean 36, deviations 11, 11, 22 -> mad 14.67 -> clamped to 0
        assert_eq!(regularity_score(&[25, 25, 58]), 0.0);
        // mean 29, deviations 1, 1, 2 -> mad 1.33 -> 90.5
        assert_eq!(regularity_score(&[28, 28, 31]), 90.5);
    }

    #[test]
    fn outliers_are_excluded_not_clamped() {
        let u = user();
        let cycles = vec![
            cycle(u, "2024-01-01", Some("2024-01-20")),
            cycle(u, "2024-01-10", Some("2024-01-12")),
            cycle(u, "2024-03-30", Some("2024-04-03")),
            cycle(u, "2024-04-27", Some("2024-05-01")),
        ];
        let completed: Vec<&CycleEntry> = cycles.iter().collect();
        // 9 and 80 fall outside the window
        assert_eq!(cycle_length_samples(&completed), vec![28]);
        // the 20 day bleed is dropped
        assert_eq!(period_length_samples(&completed), vec![3, 5, 5]);
    }

    #[test]
    fn ongoing_period_counts_as_sample() {
        let u = user();
        let cycles = vec![
            cycle(u, "2024-01-01", Some("2024-01-05")),
            cycle(u, "2024-01-29", None),
        ];
        let stats = summarize(&cycles, &[], date("2024-02-01")).unwrap();
        // 5 from the completed cycle, 3 days into the current one
        assert_eq!(stats.avg_period_length, 4.0);
        assert_eq!(stats.avg_cycle_length, DEFAULT_CYCLE_LENGTH);
    }

    #[test]
    fn single_completed_cycle_has_no_regularity() {
        let u = user();
        let cycles = vec![cycle(u, "2024-01-01", Some("2024-01-05"))];
        let stats = summarize(&cycles, &[], date("2024-01-20")).unwrap();
        assert_eq!(stats.cycle_regularity, 0.0);
        assert_eq!(stats.total_cycles, 0);
        assert_eq!(stats.avg_cycle_length, 28.0);
        assert_eq!(stats.avg_period_length, 5.0);
    }

    #[test]
    fn symptom_ranking_breaks_ties_by_recency() {
        let u = user();
        let tags = |t: &[&str]| t.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        let entries: Vec<SymptomEntry> = [
            ("2024-01-02", tags(&["cramps", "fatigue"])),
            ("2024-01-03", tags(&["cramps", "acne"])),
            ("2024-01-09", tags(&["bloating"])),
            ("2024-01-10", tags(&["headache", "backache", "nausea"])),
        ]
        .into_iter()
        .map(|(d, t)| NewSymptomEntry::new(u, date(d), t).into_entry(FixedClock::on(date(d)).0))
        .collect();

        let ranked = symptom_frequency(&entries);
        let names: Vec<&str> = ranked.iter().map(|f| f.symptom.as_str()).collect();
        assert_eq!(names, vec!["cramps", "backache", "headache", "nausea", "bloating"]);
        assert_eq!(ranked[0].count, 2);
        assert_eq!(ranked[0].last_occurrence, date("2024-01-03"));
    }

    #[tokio::test]
    async fn statistics_are_none_for_new_user() {
        let store = Arc::new(InMemoryStore::new());
        let aggregator =
            StatisticsAggregator::new(store, Arc::new(FixedClock::on(date("2024-03-10"))));
        assert!(aggregator.compute_statistics(user(), 12).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn window_excludes_old_cycles_and_is_repeatable() {
        let store = Arc::new(InMemoryStore::new());
        let u = user();
        for c in [
            cycle(u, "2022-01-01", Some("2022-01-05")),
            cycle(u, "2024-01-01", Some("2024-01-05")),
            cycle(u, "2024-01-30", Some("2024-02-03")),
            cycle(u, "2024-02-29", Some("2024-03-04")),
            cycle(u, "2024-03-28", Some("2024-04-01")),
        ] {
            store.insert_cycle(&c).await.unwrap();
        }
        let aggregator =
            StatisticsAggregator::new(store, Arc::new(FixedClock::on(date("2024-04-10"))));

        let first = aggregator.compute_statistics(u, 12).await.unwrap().unwrap();
        let second = aggregator.compute_statistics(u, 12).await.unwrap().unwrap();
        assert_eq!(first, second);

        // 29, 30, 28 -> the 2022 cycle is outside the window
        assert_eq!(first.cycle_history.len(), 4);
        assert_eq!(first.avg_cycle_length, 29.0);
        assert_eq!(first.min_cycle_length, 28.0);
        assert_eq!(first.max_cycle_length, 30.0);
        // deviations 0, 1, 1 -> mad 0.67 -> 95.2
        assert_eq!(first.cycle_regularity, 95.2);
    }
}
