//! Cycle statistics, phase tracking and period prediction for a menstrual
//! cycle tracker, with an HTTP surface in [`routes`].

pub mod abnormality;
pub mod clock;
pub mod config;
pub mod error;
pub mod model_store;
pub mod models;
pub mod phase;
pub mod prediction_store;
pub mod predictor;
pub mod repository;
pub mod routes;
pub mod service;
pub mod stats;

pub use error::{AnalyticsError, AnalyticsResult};
pub use service::{CycleInsights, InsightSettings};
