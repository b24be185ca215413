// Price estimation: schema-bound feature encoding and banded point estimates.

pub mod artifact;
pub mod encoder;

pub use artifact::ModelArtifact;
pub use encoder::FeatureEncoder;

use crate::model::{EstimatorError, PriceEstimate, ValidationError, check_year};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

pub const DEFAULT_BAND_FRACTION: f64 = 0.10;

/// A user-described vehicle to price.
#[derive(Debug, Clone)]
pub struct EstimateQuery {
    pub brand: String,
    pub year: i32,
    pub distance: f64,
}

/// Loaded once and shared read-only; cloning only bumps the artifact refcount,
/// so one instance can serve concurrent callers without locking.
#[derive(Debug, Clone)]
pub struct PriceEstimator {
    artifact: Arc<ModelArtifact>,
    encoder: FeatureEncoder,
    band_fraction: f64,
}

impl PriceEstimator {
    pub fn load(path: impl AsRef<Path>, band_fraction: f64) -> Result<Self, EstimatorError> {
        let path = path.as_ref();
        let estimator = Self::new(ModelArtifact::load(path)?, band_fraction)?;
        info!(
            "Loaded price model from {} ({} features)",
            path.display(),
            estimator.encoder.width()
        );
        Ok(estimator)
    }

    pub fn new(artifact: ModelArtifact, band_fraction: f64) -> Result<Self, EstimatorError> {
        if !(0.0..1.0).contains(&band_fraction) {
            return Err(EstimatorError::InvalidBand(band_fraction));
        }
        let encoder = FeatureEncoder::from_schema(artifact.feature_names())?;
        Ok(Self {
            artifact: Arc::new(artifact),
            encoder,
            band_fraction,
        })
    }

    pub fn encode(&self, brand: &str, year: i32, distance: f64) -> Vec<f64> {
        self.encoder.encode(brand, year, distance)
    }

    /// Predicts from an already encoded vector and wraps the result in the
    /// `point × (1 ± k)` band. The band is a fixed heuristic, not a confidence
    /// interval. A non-positive prediction is an error, never a band.
    pub fn estimate(&self, vector: &[f64]) -> Result<PriceEstimate, EstimatorError> {
        let point = self.artifact.predict(vector)?;
        if !point.is_finite() || point <= 0.0 {
            warn!("Model produced a non-positive estimate: {:.2}", point);
            return Err(EstimatorError::NonPositiveEstimate(point));
        }
        Ok(PriceEstimate {
            point,
            lower: point * (1.0 - self.band_fraction),
            upper: point * (1.0 + self.band_fraction),
        })
    }

    /// Validates a user query, encodes it and estimates.
    pub fn estimate_query(&self, query: &EstimateQuery, current_year: i32) -> Result<PriceEstimate, EstimatorError> {
        check_year(query.year, current_year)?;
        if !query.distance.is_finite() || query.distance < 0.0 {
            return Err(ValidationError::NegativeDistance(query.distance).into());
        }
        if !self.encoder.knows_brand(&query.brand) {
            warn!("Brand `{}` is outside the model vocabulary; its brand term is zero", query.brand);
        }
        self.estimate(&self.encode(&query.brand, query.year, query.distance))
    }
}
