// Utility functions
use chrono::{Datelike, Utc};

/// Converts a string to kebab-case.
pub fn to_kebab_case(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .to_lowercase()
}

/// Current calendar year in UTC.
pub fn current_year() -> i32 {
    Utc::now().year()
}

/// Renders a price in lakhs, e.g. `525000.0` -> `₹5.25L`.
pub fn format_lakhs(price: f64) -> String {
    format!("₹{:.2}L", price / 100_000.0)
}
