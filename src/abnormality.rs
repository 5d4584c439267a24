use serde::Serialize;

use crate::models::{CycleEntry, PainLevel};

const TYPICAL_CYCLE_LENGTH: (i64, i64) = (21, 35);
const MAX_DEVIATION_FROM_AVERAGE: f64 = 7.0;
const MAX_TYPICAL_PERIOD_LENGTH: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Abnormality {
    IrregularLength,
    LengthVariation,
    LongPeriod,
    SeverePain,
}

impl Abnormality {
    pub fn description(&self) -> &'static str {
        match self {
            Self::IrregularLength => "cycle length is outside the typical 21-35 day range",
            Self::LengthVariation => "cycle length deviates from your average by more than 7 days",
            Self::LongPeriod => "period lasted longer than the typical 7 days",
            Self::SeverePain => "severe pain was reported during this cycle",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleReview {
    pub cycle: CycleEntry,
    /// Days since the previous logged start.
    pub cycle_length: Option<i64>,
    pub period_length: Option<i64>,
    pub abnormalities: Vec<Abnormality>,
}

/// Flags for a single cycle. An `avg_cycle_length` of zero disables the
/// deviation check.
pub fn analyze(
    cycle: &CycleEntry,
    cycle_length: Option<i64>,
    avg_cycle_length: f64,
) -> Vec<Abnormality> {
    let mut found = Vec::new();

    if let Some(len) = cycle_length {
        let (lo, hi) = TYPICAL_CYCLE_LENGTH;
        if len < lo || len > hi {
            found.push(Abnormality::IrregularLength);
        } else if avg_cycle_length > 0.0
            && (len as f64 - avg_cycle_length).abs() > MAX_DEVIATION_FROM_AVERAGE
        {
            found.push(Abnormality::LengthVariation);
        }
    }

    if cycle
        .period_length()
        .is_some_and(|days| days > MAX_TYPICAL_PERIOD_LENGTH)
    {
        found.push(Abnormality::LongPeriod);
    }

    if cycle.pain_level == PainLevel::Severe {
        found.push(Abnormality::SeverePain);
    }

    found
}

/// Reviews cycles given newest first; the oldest has no cycle length.
pub fn review(cycles: Vec<CycleEntry>, avg_cycle_length: f64) -> Vec<CycleReview> {
    let lengths: Vec<Option<i64>> = (0..cycles.len())
        .map(|i| {
            cycles
                .get(i + 1)
                .map(|previous| (cycles[i].start_date - previous.start_date).num_days())
        })
        .collect();

    cycles
        .into_iter()
        .zip(lengths)
        .map(|(cycle, cycle_length)| CycleReview {
            abnormalities: analyze(&cycle, cycle_length, avg_cycle_length),
            period_length: cycle.period_length(),
            cycle_length,
            cycle,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserId;
    use crate::stats::tests::cycle;
    use uuid::Uuid;

    #[test]
    fn flags_each_rule() {
        let u = UserId::new(Uuid::new_v4());
        let mut painful = cycle(u, "2024-03-01", Some("2024-03-10"));
        painful.pain_level = PainLevel::Severe;

        let reviews = review(
            vec![
                painful,
                cycle(u, "2024-02-20", Some("2024-02-24")),
                cycle(u, "2024-01-01", Some("2024-01-05")),
                cycle(u, "2023-12-04", Some("2023-12-08")),
            ],
            28.0,
        );

        assert_eq!(reviews[0].cycle_length, Some(10));
        assert_eq!(
            reviews[0].abnormalities,
            vec![
                Abnormality::IrregularLength,
                Abnormality::LongPeriod,
                Abnormality::SeverePain
            ]
        );
        // 50 days
        assert_eq!(reviews[1].abnormalities, vec![Abnormality::IrregularLength]);
        assert_eq!(reviews[2].cycle_length, Some(28));
        assert!(reviews[2].abnormalities.is_empty());
        assert_eq!(reviews[3].cycle_length, None);
        assert!(reviews[3].abnormalities.is_empty());
    }

    #[test]
    fn variation_is_measured_against_the_average() {
        let u = UserId::new(Uuid::new_v4());
        let c = cycle(u, "2024-01-01", Some("2024-01-05"));
        assert_eq!(analyze(&c, Some(34), 24.0), vec![Abnormality::LengthVariation]);
        assert!(analyze(&c, Some(34), 28.0).is_empty());
        assert!(analyze(&c, Some(34), 0.0).is_empty());
    }

    #[test]
    fn open_cycle_has_no_period_flag() {
        let u = UserId::new(Uuid::new_v4());
        let c = cycle(u, "2024-01-01", None);
        assert_eq!(c.period_length(), None);
        assert!(analyze(&c, None, 28.0).is_empty());
    }
}
