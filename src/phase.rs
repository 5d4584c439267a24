use std::sync::Arc;

use chrono::{Duration, NaiveDate};

use crate::clock::Clock;
use crate::error::AnalyticsResult;
use crate::models::{CyclePhase, PhaseReading, UserId};
use crate::repository::CycleRepository;
use crate::stats::StatisticsAggregator;

/// Day boundaries of the phases within one cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseBounds {
    pub avg_cycle_length: f64,
    pub avg_period_length: f64,
    pub ovulation_day: i64,
    pub follicular_end: i64,
    pub ovulatory_end: i64,
}

impl PhaseBounds {
    pub fn new(avg_cycle_length: f64, avg_period_length: f64) -> Self {
        // halves round to even
        let ovulation_day = (avg_cycle_length / 2.0).round_ties_even() as i64;
        Self {
            avg_cycle_length,
            avg_period_length,
            ovulation_day,
            follicular_end: ovulation_day - 3,
            ovulatory_end: ovulation_day + 2,
        }
    }

    /// `None` once the day runs past the average cycle length.
    pub fn classify(&self, day_of_cycle: i64) -> Option<CyclePhase> {
        let day = day_of_cycle as f64;
        if day >= 1.0 && day <= self.avg_period_length {
            Some(CyclePhase::Menstrual)
        } else if day > self.avg_period_length && day_of_cycle <= self.follicular_end {
            Some(CyclePhase::Follicular)
        } else if day_of_cycle > self.follicular_end && day_of_cycle <= self.ovulatory_end {
            Some(CyclePhase::Ovulatory)
        } else if day_of_cycle > self.ovulatory_end && day <= self.avg_cycle_length {
            Some(CyclePhase::Luteal)
        } else {
            None
        }
    }
}

fn whole_days(days: f64) -> Duration {
    Duration::days(days.floor() as i64)
}

/// Projects forward from the last logged start by whole average cycles and
/// classifies `today` within the projected cycle.
pub fn project_phase(
    last_start: NaiveDate,
    today: NaiveDate,
    avg_cycle_length: f64,
    avg_period_length: f64,
) -> PhaseReading {
    let bounds = PhaseBounds::new(avg_cycle_length, avg_period_length);
    let elapsed = (today - last_start).num_days();
    let cycles_since = (elapsed as f64 / avg_cycle_length).floor().max(0.0);
    let projected_start = last_start + whole_days(cycles_since * avg_cycle_length);
    let day_of_cycle = (today - projected_start).num_days() + 1;

    if let Some(phase) = bounds.classify(day_of_cycle) {
        return PhaseReading::Known {
            phase,
            day_of_cycle,
        };
    }

    // Stale projection: assume exactly one unlogged cycle began.
    let next_start = last_start + whole_days((cycles_since + 1.0) * avg_cycle_length);
    let day_of_cycle = ((today - next_start).num_days() + 1).max(1);
    tracing::debug!(%projected_start, %next_start, "stale phase projection, assuming a new period");
    PhaseReading::Known {
        phase: CyclePhase::Menstrual,
        day_of_cycle,
    }
}

pub struct PhaseClassifier {
    cycles: Arc<dyn CycleRepository>,
    stats: Arc<StatisticsAggregator>,
    clock: Arc<dyn Clock>,
    window_months: u32,
}

impl PhaseClassifier {
    pub fn new(
        cycles: Arc<dyn CycleRepository>,
        stats: Arc<StatisticsAggregator>,
        clock: Arc<dyn Clock>,
        window_months: u32,
    ) -> Self {
        Self {
            cycles,
            stats,
            clock,
            window_months,
        }
    }

    pub async fn get_current_phase(&self, user: UserId) -> AnalyticsResult<PhaseReading> {
        let today = self.clock.today();

        // an open cycle always wins over projection
        if let Some(current) = self.cycles.get_current_cycle(user).await? {
            let day_of_cycle = ((today - current.start_date).num_days() + 1).max(1);
            return Ok(PhaseReading::Known {
                phase: CyclePhase::Menstrual,
                day_of_cycle,
            });
        }

        let Some(stats) = self.stats.compute_statistics(user, self.window_months).await? else {
            return Ok(PhaseReading::Unknown);
        };
        if stats.avg_cycle_length < 1.0 || stats.avg_period_length <= 0.0 {
            return Ok(PhaseReading::Unknown);
        }

        let Some(last) = self.cycles.get_last_completed_cycle(user).await? else {
            return Ok(PhaseReading::Unknown);
        };

        Ok(project_phase(
            last.start_date,
            today,
            stats.avg_cycle_length,
            stats.avg_period_length,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::repository::InMemoryStore;
    use crate::stats::tests::{cycle, date};
    use uuid::Uuid;

    async fn classifier_with(
        cycles: Vec<crate::models::CycleEntry>,
        today: &str,
    ) -> PhaseClassifier {
        let store = Arc::new(InMemoryStore::new());
        for c in &cycles {
            store.insert_cycle(c).await.unwrap();
        }
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::on(date(today)));
        let stats = Arc::new(StatisticsAggregator::new(store.clone(), clock.clone()));
        PhaseClassifier::new(store, stats, clock, 12)
    }

    #[test]
    fn bounds_for_a_28_day_cycle() {
        let b = PhaseBounds::new(28.0, 5.0);
        assert_eq!((b.ovulation_day, b.follicular_end, b.ovulatory_end), (14, 11, 16));
        assert_eq!(b.classify(1), Some(CyclePhase::Menstrual));
        assert_eq!(b.classify(5), Some(CyclePhase::Menstrual));
        assert_eq!(b.classify(6), Some(CyclePhase::Follicular));
        assert_eq!(b.classify(12), Some(CyclePhase::Ovulatory));
        assert_eq!(b.classify(16), Some(CyclePhase::Ovulatory));
        assert_eq!(b.classify(17), Some(CyclePhase::Luteal));
        assert_eq!(b.classify(28), Some(CyclePhase::Luteal));
        assert_eq!(b.classify(29), None);
    }

    #[test]
    fn ovulation_day_rounds_half_to_even() {
        assert_eq!(PhaseBounds::new(29.0, 5.0).ovulation_day, 14);
        assert_eq!(PhaseBounds::new(31.0, 5.0).ovulation_day, 16);
    }

    #[test]
    fn projection_skips_whole_elapsed_cycles() {
        // 40 days after the last start: one full 28-day cycle elapsed, day 13
        let reading = project_phase(date("2024-02-01"), date("2024-03-12"), 28.0, 5.0);
        assert_eq!(
            reading,
            PhaseReading::Known {
                phase: CyclePhase::Ovulatory,
                day_of_cycle: 13
            }
        );
    }

    #[test]
    fn stale_projection_defaults_to_menstrual() {
        // 28.5-day average: day 29 overruns the cycle
        let reading = project_phase(date("2024-02-01"), date("2024-02-29"), 28.5, 5.0);
        assert_eq!(
            reading,
            PhaseReading::Known {
                phase: CyclePhase::Menstrual,
                day_of_cycle: 1
            }
        );
    }

    #[tokio::test]
    async fn open_cycle_overrides_projection() {
        let u = UserId::new(Uuid::new_v4());
        let classifier = classifier_with(
            vec![
                cycle(u, "2024-01-01", Some("2024-01-05")),
                cycle(u, "2024-01-29", Some("2024-02-02")),
                cycle(u, "2024-03-08", None),
            ],
            "2024-03-10",
        )
        .await;
        let reading = classifier.get_current_phase(u).await.unwrap();
        assert_eq!(reading.phase(), Some(CyclePhase::Menstrual));
        assert_eq!(reading.day_of_cycle(), Some(3));
    }

    #[tokio::test]
    async fn projects_from_last_completed_cycle() {
        let u = UserId::new(Uuid::new_v4());
        let classifier = classifier_with(
            vec![
                cycle(u, "2024-01-01", Some("2024-01-05")),
                cycle(u, "2024-01-29", Some("2024-02-02")),
                cycle(u, "2024-02-26", Some("2024-03-02")),
            ],
            "2024-03-10",
        )
        .await;
        let reading = classifier.get_current_phase(u).await.unwrap();
        // 13 days after 2024-02-26 is day 14: 11 < 14 <= 16
        assert_eq!(reading.phase(), Some(CyclePhase::Ovulatory));
        assert_eq!(reading.day_of_cycle(), Some(14));
    }

    #[tokio::test]
    async fn unknown_without_history() {
        let u = UserId::new(Uuid::new_v4());
        let classifier = classifier_with(Vec::new(), "2024-03-10").await;
        assert_eq!(classifier.get_current_phase(u).await.unwrap(), PhaseReading::Unknown);
    }
}
