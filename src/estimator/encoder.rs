use crate::model::EstimatorError;
use crate::normalizer::{BrandVocabulary, brand_key};
use std::collections::HashMap;

const YEAR_COLUMN: &str = "Year";
const DISTANCE_COLUMNS: [&str; 3] = ["Kms_Driven", "Distance Covered", "Distance_Covered"];
const BRAND_PREFIX: &str = "Brand_";

/// Positional encoder for one frozen feature schema.
///
/// Brand columns form the training vocabulary. A brand outside it encodes as
/// all-zero brand columns instead of failing; that keeps estimates available
/// for unseen brands but is not statistically grounded.
#[derive(Debug, Clone)]
pub struct FeatureEncoder {
    width: usize,
    year_index: usize,
    distance_index: usize,
    brand_columns: HashMap<String, usize>,
    brand_vocabulary: BrandVocabulary,
}

impl FeatureEncoder {
    pub fn from_schema(feature_names: &[String]) -> Result<Self, EstimatorError> {
        if feature_names.is_empty() {
            return Err(EstimatorError::ModelSchemaMismatch("feature schema is empty".into()));
        }

        let mut year_index = None;
        let mut distance_index = None;
        let mut brand_columns = HashMap::new();

        for (i, name) in feature_names.iter().enumerate() {
            if name == YEAR_COLUMN {
                year_index = Some(i);
            } else if DISTANCE_COLUMNS.contains(&name.as_str()) {
                if distance_index.replace(i).is_some() {
                    return Err(EstimatorError::ModelSchemaMismatch("more than one distance column".into()));
                }
            } else if let Some(brand) = name.strip_prefix(BRAND_PREFIX) {
                let key = brand_key(brand);
                if key.is_empty() || brand_columns.insert(key, i).is_some() {
                    return Err(EstimatorError::ModelSchemaMismatch(format!("ambiguous brand column `{}`", name)));
                }
            } else {
                return Err(EstimatorError::ModelSchemaMismatch(format!("unsupported feature `{}`", name)));
            }
        }

        let year_index = year_index
            .ok_or_else(|| EstimatorError::ModelSchemaMismatch(format!("missing `{}` column", YEAR_COLUMN)))?;
        let distance_index = distance_index
            .ok_or_else(|| EstimatorError::ModelSchemaMismatch("missing distance column".into()))?;

        let brand_vocabulary = BrandVocabulary::new(brand_columns.keys());
        Ok(Self {
            width: feature_names.len(),
            year_index,
            distance_index,
            brand_columns,
            brand_vocabulary,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Whether `brand` has a column in the training vocabulary.
    pub fn knows_brand(&self, brand: &str) -> bool {
        self.brand_index(brand).is_some()
    }

    /// Builds a vector aligned to the schema; its length always equals the schema width.
    pub fn encode(&self, brand: &str, year: i32, distance: f64) -> Vec<f64> {
        let mut vector = vec![0.0; self.width];
        vector[self.year_index] = year as f64;
        vector[self.distance_index] = distance;
        if let Some(i) = self.brand_index(brand) {
            vector[i] = 1.0;
        }
        vector
    }

    // Column labels go through the same alias rules as scraped brands, so
    // "Maruti" reaches "Brand_Maruti Suzuki". Canonical brands can also be
    // longer than the label ("maruti suzuki" vs "Brand_Maruti"), hence the
    // compact-form and first-word fallbacks on the query side.
    fn brand_index(&self, brand: &str) -> Option<usize> {
        let key = brand_key(brand);
        self.brand_vocabulary
            .canonicalize(&key)
            .or_else(|| self.brand_vocabulary.canonicalize(&key.replace(' ', "")))
            .or_else(|| key.split(' ').next().and_then(|first| self.brand_vocabulary.canonicalize(first)))
            .and_then(|column| self.brand_columns.get(column))
            .copied()
    }
}
