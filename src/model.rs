// Core structs: Listing, RawFieldMap, ScrapeRequest and the error taxonomy
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Keys used inside a [`RawFieldMap`].
pub mod field {
    pub const TITLE: &str = "title";
    pub const PRICE: &str = "price";
    pub const LOCATION: &str = "location";
    pub const LINK: &str = "link";
    pub const INFORMATION: &str = "information";
    pub const IMAGE: &str = "image";
    pub const BRAND: &str = "brand";
}

/// Earliest model year accepted for a listing.
pub const MIN_YEAR: i32 = 1900;

/// Unvalidated key/value bag produced by the extractor for one listing node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawFieldMap {
    fields: BTreeMap<String, String>,
}

impl RawFieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.fields.insert(key.to_string(), value.into());
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Returns the trimmed value for `key`, treating blank values as absent.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    #[cfg(test)]
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

/// Attribute values handed to [`Listing::new`] for validation.
#[derive(Debug, Clone)]
pub struct ListingFields {
    pub title: String,
    pub brand: String,
    pub year: i32,
    pub price: f64,
    pub distance_covered: f64,
    pub location: String,
    pub link: String,
    pub image: Option<String>,
    pub information: String,
}

/// One normalized vehicle listing. Only constructible through [`Listing::new`],
/// so every instance satisfies the price, distance and year invariants.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Listing {
    title: String,
    brand: String,
    year: i32,
    price: f64,
    distance_covered: f64,
    location: String,
    link: String,
    image: Option<String>,
    information: String,
    fetched_at: DateTime<Utc>,
}

impl Listing {
    /// Validates `fields` against the listing invariants. `current_year` bounds the
    /// accepted model year at `current_year + 1`.
    pub fn new(fields: ListingFields, current_year: i32) -> Result<Self, ValidationError> {
        Self::with_fetched_at(fields, current_year, Utc::now())
    }

    pub fn with_fetched_at(
        fields: ListingFields,
        current_year: i32,
        fetched_at: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        let title = required(fields.title, "title")?;
        let brand = required(fields.brand, "brand")?;
        let location = required(fields.location, "location")?;
        let link = required(fields.link, "link")?;

        if !fields.price.is_finite() || fields.price <= 0.0 {
            return Err(ValidationError::NonPositivePrice(fields.price));
        }
        if !fields.distance_covered.is_finite() || fields.distance_covered < 0.0 {
            return Err(ValidationError::NegativeDistance(fields.distance_covered));
        }
        check_year(fields.year, current_year)?;

        Ok(Self {
            title,
            brand,
            year: fields.year,
            price: fields.price,
            distance_covered: fields.distance_covered,
            location,
            link,
            image: fields.image.map(|i| i.trim().to_string()).filter(|i| !i.is_empty()),
            information: fields.information.trim().to_string(),
            fetched_at,
        })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn brand(&self) -> &str {
        &self.brand
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn price(&self) -> f64 {
        self.price
    }

    pub fn distance_covered(&self) -> f64 {
        self.distance_covered
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn link(&self) -> &str {
        &self.link
    }

    pub fn image(&self) -> Option<&str> {
        self.image.as_deref()
    }

    pub fn information(&self) -> &str {
        &self.information
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    /// True when both records carry the same attribute values, ignoring `fetched_at`.
    pub fn same_content(&self, other: &Listing) -> bool {
        self.title == other.title
            && self.brand == other.brand
            && self.year == other.year
            && self.price == other.price
            && self.distance_covered == other.distance_covered
            && self.location == other.location
            && self.link == other.link
            && self.image == other.image
            && self.information == other.information
    }
}

fn required(value: String, name: &'static str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingField(name));
    }
    Ok(trimmed.to_string())
}

/// Enforces `MIN_YEAR <= year <= current_year + 1`.
pub fn check_year(year: i32, current_year: i32) -> Result<(), ValidationError> {
    let max = current_year + 1;
    if year < MIN_YEAR || year > max {
        return Err(ValidationError::YearOutOfRange { year, min: MIN_YEAR, max });
    }
    Ok(())
}

/// One unit of fetch work: a brand query at a given page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeRequest {
    pub brand: String,
    pub page: u32,
}

/// Predicate applied by the dataset scan.
#[derive(Debug, Clone, Default)]
pub struct ListingFilter {
    pub brand: Option<String>,
    pub year_from: Option<i32>,
    pub year_to: Option<i32>,
    pub title_query: Option<String>,
}

impl ListingFilter {
    pub fn matches(&self, listing: &Listing) -> bool {
        if let Some(brand) = &self.brand {
            if !listing.brand().eq_ignore_ascii_case(brand.trim()) {
                return false;
            }
        }
        if self.year_from.is_some_and(|from| listing.year() < from) {
            return false;
        }
        if self.year_to.is_some_and(|to| listing.year() > to) {
            return false;
        }
        match self.title_query.as_deref().map(str::trim) {
            Some(q) if !q.is_empty() => listing.title().to_lowercase().contains(&q.to_lowercase()),
            _ => true,
        }
    }
}

/// Point estimate plus the fixed-fraction band around it.
///
/// The band is `point × (1 ± k)`. It is a heuristic approximation, not a
/// statistical confidence interval derived from model residuals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PriceEstimate {
    pub point: f64,
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("request timed out")]
    Timeout,
    #[error("unexpected HTTP status {0}")]
    Status(u16),
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
}

impl NetworkError {
    /// Whether another attempt may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            NetworkError::Http(_) | NetworkError::Timeout => true,
            NetworkError::Status(code) => *code == 429 || *code >= 500,
            NetworkError::Exhausted { .. } => false,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid selector: {0}")]
    Selector(String),
    #[error("missing mandatory field `{0}`")]
    MissingField(&'static str),
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("unparseable price `{0}`")]
    InvalidPrice(String),
    #[error("price must be positive, got {0}")]
    NonPositivePrice(f64),
    #[error("unparseable distance `{0}`")]
    InvalidDistance(String),
    #[error("distance must be non-negative, got {0}")]
    NegativeDistance(f64),
    #[error("unparseable year `{0}`")]
    InvalidYear(String),
    #[error("year {year} outside {min}..={max}")]
    YearOutOfRange { year: i32, min: i32, max: i32 },
    #[error("unknown brand `{0}`")]
    UnknownBrand(String),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

#[derive(Debug, Error)]
pub enum EstimatorError {
    #[error("model schema mismatch: {0}")]
    ModelSchemaMismatch(String),
    #[error("invalid estimate request: {0}")]
    InvalidQuery(#[from] ValidationError),
    #[error("band fraction must lie in [0, 1), got {0}")]
    InvalidBand(f64),
    #[error("model predicted a non-positive price ({0:.0}); the query is outside what it can price")]
    NonPositiveEstimate(f64),
}

#[derive(Debug, Error)]
pub enum ExternalServiceError {
    #[error("reasoning collaborator is disabled")]
    Disabled,
    #[error("reasoning call timed out after {0:?}")]
    Timeout(Duration),
    #[error("reasoning request failed: {0}")]
    Http(String),
    #[error("reasoning service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("reasoning service returned an empty answer")]
    EmptyResponse,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn listing(title: &str, link: &str, price: f64, distance: f64, year: i32) -> Listing {
        Listing::new(
            ListingFields {
                title: title.to_string(),
                brand: "hyundai".to_string(),
                year,
                price,
                distance_covered: distance,
                location: "Pune, Maharashtra".to_string(),
                link: link.to_string(),
                image: None,
                information: format!("{} - {} km", year, distance),
            },
            2026,
        )
        .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> ListingFields {
        ListingFields {
            title: " Hyundai Creta SX ".to_string(),
            brand: "hyundai".to_string(),
            year: 2019,
            price: 950000.0,
            distance_covered: 42000.0,
            location: "Delhi".to_string(),
            link: "https://www.olx.in/item/creta-iid-1".to_string(),
            image: Some("  ".to_string()),
            information: "2019 - 42,000 km".to_string(),
        }
    }

    #[test]
    fn valid_fields_build_a_listing() {
        let listing = Listing::new(fields(), 2026).unwrap();
        assert_eq!(listing.title(), "Hyundai Creta SX");
        assert_eq!(listing.image(), None);
    }

    #[test]
    fn non_positive_price_is_rejected() {
        let mut f = fields();
        f.price = 0.0;
        assert_eq!(Listing::new(f, 2026), Err(ValidationError::NonPositivePrice(0.0)));
    }

    #[test]
    fn year_bounds_follow_current_year() {
        let mut f = fields();
        f.year = 2027;
        assert!(Listing::new(f.clone(), 2026).is_ok());
        f.year = 2028;
        assert!(matches!(
            Listing::new(f.clone(), 2026),
            Err(ValidationError::YearOutOfRange { max: 2027, .. })
        ));
        f.year = 1899;
        assert!(Listing::new(f, 2026).is_err());
    }

    #[test]
    fn missing_link_is_rejected() {
        let mut f = fields();
        f.link = String::new();
        assert_eq!(Listing::new(f, 2026), Err(ValidationError::MissingField("link")));
    }

    #[test]
    fn filter_combines_brand_year_and_title() {
        let listing = Listing::new(fields(), 2026).unwrap();
        let filter = ListingFilter {
            brand: Some("Hyundai".into()),
            year_from: Some(2018),
            year_to: Some(2020),
            title_query: Some("creta".into()),
        };
        assert!(filter.matches(&listing));

        let other_title = ListingFilter { title_query: Some("i20".into()), ..filter.clone() };
        assert!(!other_title.matches(&listing));

        let too_new = ListingFilter { year_from: Some(2020), ..filter };
        assert!(!too_new.matches(&listing));
    }

    #[test]
    fn raw_field_map_treats_blank_as_absent() {
        let raw = RawFieldMap::new().with(field::IMAGE, "   ").with(field::TITLE, " Swift ");
        assert!(!raw.contains(field::IMAGE));
        assert_eq!(raw.get(field::TITLE), Some("Swift"));
    }
}
