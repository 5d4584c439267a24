use std::collections::HashMap;
use std::fmt;
use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smartcore::ensemble::random_forest_regressor::{
    RandomForestRegressor, RandomForestRegressorParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;
use tokio::sync::RwLock;

use crate::error::{AnalyticsError, AnalyticsResult};
use crate::models::UserId;

const N_TREES: usize = 100;
const MIN_SAMPLES_SPLIT: usize = 2;
const SEED: u64 = 42;

type Forest = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

/// Per-user regressor mapping the last cycle length to the next one.
#[derive(Serialize, Deserialize)]
pub struct CycleLengthModel {
    pub trained_at: DateTime<Utc>,
    pub sample_count: usize,
    forest: Forest,
}

impl CycleLengthModel {
    /// Fits on `(previous length, next length)` pairs.
    pub fn fit(samples: &[(f64, f64)], trained_at: DateTime<Utc>) -> AnalyticsResult<Self> {
        if samples.is_empty() {
            return Err(AnalyticsError::InsufficientHistory {
                required: 1,
                available: 0,
            });
        }

        let records = DenseMatrix::from_2d_vec(&samples.iter().map(|s| vec![s.0]).collect());
        let targets: Vec<f64> = samples.iter().map(|s| s.1).collect();

        let params = RandomForestRegressorParameters::default()
            .with_n_trees(N_TREES)
            .with_min_samples_split(MIN_SAMPLES_SPLIT)
            .with_seed(SEED);
        let forest = RandomForestRegressor::fit(&records, &targets, params)
            .map_err(|e| AnalyticsError::ModelFit(e.to_string()))?;

        Ok(Self {
            trained_at,
            sample_count: samples.len(),
            forest,
        })
    }

    pub fn predict(&self, previous_cycle_length: i64) -> AnalyticsResult<f64> {
        let x = DenseMatrix::from_2d_vec(&vec![vec![previous_cycle_length as f64]]);
        let predicted = self
            .forest
            .predict(&x)
            .map_err(|e| AnalyticsError::ModelFit(e.to_string()))?;
        predicted
            .first()
            .copied()
            .ok_or_else(|| AnalyticsError::ModelFit("empty prediction".into()))
    }
}

impl fmt::Debug for CycleLengthModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CycleLengthModel")
            .field("trained_at", &self.trained_at)
            .field("sample_count", &self.sample_count)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait ModelStore: Send + Sync {
    async fn load(&self, user: UserId) -> AnalyticsResult<Option<CycleLengthModel>>;

    /// Overwrites any earlier artifact for the user.
    async fn save(&self, user: UserId, model: &CycleLengthModel) -> AnalyticsResult<()>;
}

/// JSON artifacts on disk, one file per user.
pub struct FsModelStore {
    dir: PathBuf,
}

impl FsModelStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, user: UserId) -> PathBuf {
        self.dir.join(format!("rf_cycle_model_{}.json", user))
    }
}

#[async_trait]
impl ModelStore for FsModelStore {
    async fn load(&self, user: UserId) -> AnalyticsResult<Option<CycleLengthModel>> {
        let bytes = match tokio::fs::read(self.path_for(user)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    async fn save(&self, user: UserId, model: &CycleLengthModel) -> AnalyticsResult<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let json = serde_json::to_vec(model)?;
        // readers only ever see a complete file
        let path = self.path_for(user);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

/// Keeps the same JSON artifact the file store writes, in memory.
#[derive(Default)]
pub struct InMemoryModelStore {
    artifacts: RwLock<HashMap<UserId, Vec<u8>>>,
}

impl InMemoryModelStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ModelStore for InMemoryModelStore {
    async fn load(&self, user: UserId) -> AnalyticsResult<Option<CycleLengthModel>> {
        match self.artifacts.read().await.get(&user) {
            Some(bytes) => Ok(Some(serde_json::from_slice(bytes)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, user: UserId, model: &CycleLengthModel) -> AnalyticsResult<()> {
        let json = serde_json::to_vec(model)?;
        self.artifacts.write().await.insert(user, json);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn model(samples: &[(f64, f64)]) -> CycleLengthModel {
        CycleLengthModel::fit(samples, Utc::now()).unwrap()
    }

    #[test]
    fn constant_history_predicts_constant() {
        let m = model(&[(27.0, 28.0), (28.0, 28.0), (29.0, 28.0), (30.0, 28.0)]);
        assert!((m.predict(28).unwrap() - 28.0).abs() < 1e-9);
        assert!((m.predict(45).unwrap() - 28.0).abs() < 1e-9);
    }

    #[test]
    fn predictions_stay_within_label_range() {
        let m = model(&[(26.0, 30.0), (30.0, 26.0), (26.0, 31.0), (31.0, 27.0), (27.0, 29.0)]);
        for x in [20, 26, 28, 31, 40] {
            let y = m.predict(x).unwrap();
            assert!((26.0..=31.0).contains(&y), "prediction {y} for {x}");
        }
    }

    #[test]
    fn seeded_fits_agree() {
        let samples = [(26.0, 30.0), (30.0, 26.0), (28.0, 28.0), (29.0, 27.0)];
        let (a, b) = (model(&samples), model(&samples));
        for x in [25, 28, 31] {
            assert_eq!(a.predict(x).unwrap(), b.predict(x).unwrap());
        }
    }

    #[test]
    fn empty_history_is_rejected() {
        assert!(matches!(
            CycleLengthModel::fit(&[], Utc::now()),
            Err(AnalyticsError::InsufficientHistory { .. })
        ));
    }

    #[tokio::test]
    async fn fs_store_round_trips_and_reports_absence() {
        let dir = std::env::temp_dir().join(format!("cycle-models-{}", Uuid::new_v4()));
        let store = FsModelStore::new(&dir);
        let user = UserId::new(Uuid::new_v4());

        assert!(store.load(user).await.unwrap().is_none());

        let saved = model(&[(27.0, 29.0), (29.0, 28.0), (28.0, 30.0)]);
        store.save(user, &saved).await.unwrap();
        let loaded = store.load(user).await.unwrap().unwrap();
        assert_eq!(loaded.sample_count, saved.sample_count);
        assert_eq!(loaded.trained_at, saved.trained_at);
        assert!((loaded.predict(28).unwrap() - saved.predict(28).unwrap()).abs() < 1e-9);

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn memory_store_keeps_models_per_user() {
        let store = InMemoryModelStore::new();
        let (a, b) = (UserId::new(Uuid::new_v4()), UserId::new(Uuid::new_v4()));
        store
            .save(a, &model(&[(28.0, 28.0), (28.0, 28.0)]))
            .await
            .unwrap();
        assert!(store.load(a).await.unwrap().is_some());
        assert!(store.load(b).await.unwrap().is_none());
    }
}
