use crate::model::{Listing, ListingFields, RawFieldMap, ValidationError, field};
use std::collections::HashMap;
#[cfg(test)]
use std::sync::Mutex;
use tracing::warn;

/// Receives every row the normalizer rejects.
pub trait ErrorSink {
    fn record_rejection(&self, raw: &RawFieldMap, error: &ValidationError);
}

/// In-process sink, handy when rejections only need to be counted or inspected.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemorySink {
    rejected: Mutex<Vec<(Option<String>, ValidationError)>>,
}

#[cfg(test)]
impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejections(&self) -> Vec<(Option<String>, ValidationError)> {
        self.rejected.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
impl ErrorSink for MemorySink {
    fn record_rejection(&self, raw: &RawFieldMap, error: &ValidationError) {
        if let Ok(mut rejected) = self.rejected.lock() {
            rejected.push((raw.get(field::LINK).map(str::to_string), error.clone()));
        }
    }
}

/// Fixed set of canonical brand tokens, plus first-word aliases
/// (`maruti` -> `maruti suzuki`) when the first word is unambiguous.
#[derive(Debug, Clone)]
pub struct BrandVocabulary {
    lookup: HashMap<String, String>,
}

impl BrandVocabulary {
    pub fn new<I, S>(brands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut canonical: Vec<String> = brands
            .into_iter()
            .map(|b| brand_key(b.as_ref()))
            .filter(|b| !b.is_empty())
            .collect();
        canonical.sort();
        canonical.dedup();

        let mut lookup = HashMap::new();
        let mut first_words: HashMap<String, Vec<String>> = HashMap::new();
        for brand in &canonical {
            lookup.insert(brand.clone(), brand.clone());
            lookup.insert(brand.replace(' ', ""), brand.clone());
            if let Some(first) = brand.split(' ').next() {
                first_words.entry(first.to_string()).or_default().push(brand.clone());
            }
        }
        for (word, owners) in first_words {
            if let [only] = owners.as_slice() {
                lookup.entry(word).or_insert_with(|| only.clone());
            }
        }

        Self { lookup }
    }

    pub fn canonicalize(&self, raw: &str) -> Option<&str> {
        self.lookup.get(&brand_key(raw)).map(String::as_str)
    }
}

pub(crate) fn brand_key(raw: &str) -> String {
    raw.to_lowercase()
        .replace(['-', '_'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub struct Normalizer {
    vocabulary: BrandVocabulary,
    current_year: i32,
}

impl Normalizer {
    pub fn new(vocabulary: BrandVocabulary, current_year: i32) -> Self {
        Self { vocabulary, current_year }
    }

    /// Coerces a raw field map into a validated [`Listing`].
    pub fn normalize(&self, raw: &RawFieldMap) -> Result<Listing, ValidationError> {
        let get = |key: &'static str| raw.get(key).ok_or(ValidationError::MissingField(key));

        let price = parse_price(get(field::PRICE)?)?;
        let information = get(field::INFORMATION)?;
        let (year, distance_covered) = parse_information(information)?;
        let raw_brand = get(field::BRAND)?;
        let brand = self
            .vocabulary
            .canonicalize(raw_brand)
            .ok_or_else(|| ValidationError::UnknownBrand(raw_brand.to_string()))?;

        Listing::new(
            ListingFields {
                title: get(field::TITLE)?.to_string(),
                brand: brand.to_string(),
                year,
                price,
                distance_covered,
                location: get(field::LOCATION)?.to_string(),
                link: get(field::LINK)?.to_string(),
                image: raw.get(field::IMAGE).map(str::to_string),
                information: information.to_string(),
            },
            self.current_year,
        )
    }

    /// Normalizes `raw`, handing any rejection to `sink` instead of returning it.
    pub fn normalize_or_reject(&self, raw: &RawFieldMap, sink: &dyn ErrorSink) -> Option<Listing> {
        match self.normalize(raw) {
            Ok(listing) => Some(listing),
            Err(e) => {
                warn!("Rejected row {}: {}", raw.get(field::LINK).unwrap_or("<no link>"), e);
                sink.record_rejection(raw, &e);
                None
            }
        }
    }
}

/// Parses marketplace price text such as `₹ 5,25,000` or `Rs. 5.25 Lakh`.
pub fn parse_price(text: &str) -> Result<f64, ValidationError> {
    let lower = text.to_lowercase();
    let multiplier = if lower.contains("crore") {
        10_000_000.0
    } else if lower.contains("lakh") || lower.contains("lac") {
        100_000.0
    } else {
        1.0
    };

    let value = leading_number(text).ok_or_else(|| ValidationError::InvalidPrice(text.to_string()))?;
    let price = value * multiplier;
    if !price.is_finite() || price <= 0.0 {
        return Err(ValidationError::NonPositivePrice(price));
    }
    Ok(price)
}

/// Parses distance text such as `80,000 km`.
pub fn parse_distance(text: &str) -> Result<f64, ValidationError> {
    leading_number(text).ok_or_else(|| ValidationError::InvalidDistance(text.to_string()))
}

/// Splits the `"<year> - <distance>"` summary line into its two numbers.
pub fn parse_information(text: &str) -> Result<(i32, f64), ValidationError> {
    let (year_part, distance_part) = text
        .split_once(" - ")
        .or_else(|| text.split_once('-'))
        .ok_or_else(|| ValidationError::InvalidYear(text.to_string()))?;

    let year = year_part
        .trim()
        .parse::<i32>()
        .map_err(|_| ValidationError::InvalidYear(year_part.trim().to_string()))?;
    let distance = parse_distance(distance_part)?;
    Ok((year, distance))
}

/// First number in `text`, with `,` treated as a digit-group separator.
fn leading_number(text: &str) -> Option<f64> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let digits: String = text[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .filter(|c| *c != ',')
        .collect();
    digits.trim_end_matches('.').parse::<f64>().ok()
}
