use crate::model::EstimatorError;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct ArtifactFile {
    feature_names: Vec<String>,
    coefficients: Vec<f64>,
    intercept: f64,
}

/// Trained linear regressor plus the ordered feature schema it was fitted on.
/// Immutable after load.
#[derive(Debug, Clone)]
pub struct ModelArtifact {
    feature_names: Vec<String>,
    coefficients: Vec<f64>,
    intercept: f64,
}

impl ModelArtifact {
    /// Reads a JSON artifact. Any failure to read or parse the schema is a
    /// `ModelSchemaMismatch`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, EstimatorError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            EstimatorError::ModelSchemaMismatch(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, EstimatorError> {
        let file: ArtifactFile = serde_json::from_str(content)
            .map_err(|e| EstimatorError::ModelSchemaMismatch(format!("unreadable artifact: {}", e)))?;
        Self::from_parts(file.feature_names, file.coefficients, file.intercept)
    }

    pub fn from_parts(
        feature_names: Vec<String>,
        coefficients: Vec<f64>,
        intercept: f64,
    ) -> Result<Self, EstimatorError> {
        if feature_names.is_empty() {
            return Err(EstimatorError::ModelSchemaMismatch("feature schema is empty".into()));
        }
        if feature_names.len() != coefficients.len() {
            return Err(EstimatorError::ModelSchemaMismatch(format!(
                "{} feature names but {} coefficients",
                feature_names.len(),
                coefficients.len()
            )));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = feature_names.iter().find(|n| !seen.insert(n.as_str())) {
            return Err(EstimatorError::ModelSchemaMismatch(format!("duplicate feature `{}`", dup)));
        }
        if !intercept.is_finite() || coefficients.iter().any(|c| !c.is_finite()) {
            return Err(EstimatorError::ModelSchemaMismatch("non-finite model parameter".into()));
        }

        Ok(Self {
            feature_names,
            coefficients,
            intercept,
        })
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn predict(&self, vector: &[f64]) -> Result<f64, EstimatorError> {
        if vector.len() != self.coefficients.len() {
            return Err(EstimatorError::ModelSchemaMismatch(format!(
                "vector has {} features, schema expects {}",
                vector.len(),
                self.coefficients.len()
            )));
        }
        Ok(self.intercept
            + self
                .coefficients
                .iter()
                .zip(vector)
                .map(|(c, x)| c * x)
                .sum::<f64>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_schema_fails_closed() {
        let err = ModelArtifact::from_json(r#"{"feature_names": [], "coefficients": [], "intercept": 1.0}"#)
            .unwrap_err();
        assert!(matches!(err, EstimatorError::ModelSchemaMismatch(_)));
    }

    #[test]
    fn coefficient_count_must_match_schema() {
        let err = ModelArtifact::from_parts(vec!["Year".into(), "Kms_Driven".into()], vec![1.0], 0.0).unwrap_err();
        assert!(matches!(err, EstimatorError::ModelSchemaMismatch(_)));
    }

    #[test]
    fn duplicate_columns_are_rejected() {
        let err = ModelArtifact::from_parts(vec!["Year".into(), "Year".into()], vec![1.0, 2.0], 0.0).unwrap_err();
        assert!(matches!(err, EstimatorError::ModelSchemaMismatch(_)));
    }

    #[test]
    fn missing_file_is_a_schema_mismatch() {
        let err = ModelArtifact::load("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, EstimatorError::ModelSchemaMismatch(_)));
    }

    #[test]
    fn loads_from_disk_and_predicts() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"feature_names": ["Year", "Kms_Driven"], "coefficients": [1000.0, -0.5], "intercept": 100.0}}"#
        )
        .unwrap();

        let artifact = ModelArtifact::load(file.path()).unwrap();
        assert_eq!(artifact.feature_names(), ["Year", "Kms_Driven"]);
        assert_eq!(artifact.predict(&[2.0, 100.0]).unwrap(), 2050.0);
        assert!(artifact.predict(&[2.0]).is_err());
    }
}
