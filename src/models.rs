use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{NaiveDate, DateTime, Utc};
use std::fmt;
use std::str::FromStr;

use crate::error::{ensure_range, AnalyticsError, AnalyticsResult};

/// Opaque owner of every record in the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Uuid);

impl UserId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl From<Uuid> for UserId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Declares a string-backed enum stored as TEXT.
macro_rules! text_enum {
    ($(#[$outer:meta])* $name:ident { $($(#[$inner:meta])* $variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$outer])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($(#[$inner])* $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = AnalyticsError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(AnalyticsError::CorruptRecord(format!(
                        "unknown {} '{}'",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }
    };
}

text_enum!(#[derive(Default)] FlowIntensity {
    Light => "light",
    #[default]
    Moderate => "moderate",
    Heavy => "heavy",
});

text_enum!(#[derive(Default)] PainLevel {
    #[default]
    None => "none",
    Mild => "mild",
    Moderate => "moderate",
    Severe => "severe",
});

text_enum!(#[derive(Default)] Mood {
    Happy => "happy",
    #[default]
    Normal => "normal",
    Sad => "sad",
    Irritable => "irritable",
    Anxious => "anxious",
});

text_enum!(#[derive(Default)] Severity {
    #[default]
    Mild => "mild",
    Moderate => "moderate",
    Severe => "severe",
});

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CycleEntry {
    pub id: Uuid,
    pub user_id: UserId,
    pub start_date: NaiveDate,
    /// `None` while the period is still in progress.
    pub end_date: Option<NaiveDate>,
    pub flow_intensity: FlowIntensity,
    pub pain_level: PainLevel,
    pub mood: Mood,
    pub symptoms: Vec<String>,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CycleEntry {
    pub fn is_completed(&self) -> bool {
        self.end_date.is_some()
    }

    /// Inclusive day count of the bleed, when the cycle has ended.
    pub fn period_length(&self) -> Option<i64> {
        self.end_date.map(|end| (end - self.start_date).num_days() + 1)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCycleEntry {
    pub user_id: UserId,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub flow_intensity: FlowIntensity,
    #[serde(default)]
    pub pain_level: PainLevel,
    #[serde(default)]
    pub mood: Mood,
    #[serde(default)]
    pub symptoms: Vec<String>,
    #[serde(default)]
    pub notes: String,
}

impl NewCycleEntry {
    pub fn new(user_id: UserId, start_date: NaiveDate) -> Self {
        Self {
            user_id,
            start_date,
            end_date: None,
            flow_intensity: FlowIntensity::default(),
            pain_level: PainLevel::default(),
            mood: Mood::default(),
            symptoms: Vec::new(),
            notes: String::new(),
        }
    }

    pub fn ended(mut self, end_date: NaiveDate) -> Self {
        self.end_date = Some(end_date);
        self
    }

    pub fn validate(&self) -> AnalyticsResult<()> {
        match self.end_date {
            Some(end) => ensure_range(self.start_date, end),
            None => Ok(()),
        }
    }

    pub fn into_entry(self, now: DateTime<Utc>) -> CycleEntry {
        CycleEntry {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            start_date: self.start_date,
            end_date: self.end_date,
            flow_intensity: self.flow_intensity,
            pain_level: self.pain_level,
            mood: self.mood,
            symptoms: self.symptoms,
            notes: self.notes,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SymptomEntry {
    pub id: Uuid,
    pub user_id: UserId,
    pub cycle_id: Option<Uuid>,
    pub date: NaiveDate,
    pub symptoms: Vec<String>,
    pub mood: Option<Mood>,
    pub pain_level: Option<PainLevel>,
    pub severity: Severity,
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewSymptomEntry {
    pub user_id: UserId,
    #[serde(default)]
    pub cycle_id: Option<Uuid>,
    pub date: NaiveDate,
    #[serde(default)]
    pub symptoms: Vec<String>,
    #[serde(default)]
    pub mood: Option<Mood>,
    #[serde(default)]
    pub pain_level: Option<PainLevel>,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub notes: String,
}

impl NewSymptomEntry {
    pub fn new(user_id: UserId, date: NaiveDate, symptoms: Vec<String>) -> Self {
        Self {
            user_id,
            cycle_id: None,
            date,
            symptoms,
            mood: None,
            pain_level: None,
            severity: Severity::default(),
            notes: String::new(),
        }
    }

    pub fn into_entry(self, now: DateTime<Utc>) -> SymptomEntry {
        SymptomEntry {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            cycle_id: self.cycle_id,
            date: self.date,
            symptoms: self.symptoms,
            mood: self.mood,
            pain_level: self.pain_level,
            severity: self.severity,
            notes: self.notes,
            created_at: now,
        }
    }
}

text_enum!(CyclePhase {
    Menstrual => "menstrual",
    Follicular => "follicular",
    Ovulatory => "ovulatory",
    Luteal => "luteal",
});

/// Phase tuple handed to the dashboard: a phase with its day, or unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseReading {
    Known { phase: CyclePhase, day_of_cycle: i64 },
    Unknown,
}

impl PhaseReading {
    pub fn phase(&self) -> Option<CyclePhase> {
        match self {
            Self::Known { phase, .. } => Some(*phase),
            Self::Unknown => None,
        }
    }

    pub fn day_of_cycle(&self) -> Option<i64> {
        match self {
            Self::Known { day_of_cycle, .. } => Some(*day_of_cycle),
            Self::Unknown => None,
        }
    }
}

impl Serialize for PhaseReading {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Wire {
            phase: &'static str,
            day_of_cycle: Option<i64>,
        }

        Wire {
            phase: self.phase().map_or("unknown", |p| p.as_str()),
            day_of_cycle: self.day_of_cycle(),
        }
        .serialize(serializer)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl PhaseWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }
}

/// One projected cycle split into its four phases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleForecast {
    pub menstrual_phase: PhaseWindow,
    pub follicular_phase: PhaseWindow,
    pub ovulatory_phase: PhaseWindow,
    pub luteal_phase: PhaseWindow,
    pub cycle_length: f64,
}

impl CycleForecast {
    pub fn phases(&self) -> [(CyclePhase, PhaseWindow); 4] {
        [
            (CyclePhase::Menstrual, self.menstrual_phase),
            (CyclePhase::Follicular, self.follicular_phase),
            (CyclePhase::Ovulatory, self.ovulatory_phase),
            (CyclePhase::Luteal, self.luteal_phase),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FertileWindow {
    pub fertile_start: NaiveDate,
    pub ovulation_day: NaiveDate,
}

text_enum!(PredictionType {
    Calendar => "calendar",
    NextPeriod => "next_period",
    FertileWindow => "fertile_window",
});

text_enum!(ModelUsed {
    RandomForest => "random_forest",
    AverageBased => "average_based",
    Default => "default",
});

impl ModelUsed {
    pub fn confidence(&self) -> f64 {
        match self {
            Self::RandomForest => 0.8,
            Self::AverageBased => 0.6,
            Self::Default => 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CyclePrediction {
    pub id: Uuid,
    pub user_id: UserId,
    pub prediction_type: PredictionType,
    pub prediction_date: DateTime<Utc>,
    pub predicted_for_date: NaiveDate,
    pub phase: CyclePhase,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub confidence_score: f64,
    pub model_used: ModelUsed,
    pub features_used: serde_json::Value,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Filters for reading stored predictions back. Only active rows are returned.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PredictionQuery {
    #[serde(rename = "type")]
    pub prediction_type: Option<PredictionType>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymptomFrequency {
    pub symptom: String,
    pub count: u32,
    pub last_occurrence: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleStatistics {
    /// Number of usable cycle-length measurements.
    pub total_cycles: usize,
    pub avg_cycle_length: f64,
    pub min_cycle_length: f64,
    pub max_cycle_length: f64,
    pub avg_period_length: f64,
    pub cycle_regularity: f64,
    pub cycle_history: Vec<CycleEntry>,
    pub symptom_frequency: Vec<SymptomFrequency>,
}
