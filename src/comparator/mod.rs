// Side-by-side listing comparison with a bounded external verdict and a
// rule-based fallback.

pub mod reasoning;

pub use reasoning::{DisabledReasoner, ReasoningClient, reasoner_from_config};

use crate::model::{ExternalServiceError, Listing};
use crate::utils::format_lakhs;
use serde::Serialize;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ComparedField {
    Brand,
    Year,
    Price,
    DistanceCovered,
    Location,
    Link,
}

impl ComparedField {
    pub const ALL: [ComparedField; 6] = [
        ComparedField::Brand,
        ComparedField::Year,
        ComparedField::Price,
        ComparedField::DistanceCovered,
        ComparedField::Location,
        ComparedField::Link,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ComparedField::Brand => "Brand",
            ComparedField::Year => "Year",
            ComparedField::Price => "Price",
            ComparedField::DistanceCovered => "Distance Covered (KM)",
            ComparedField::Location => "Location",
            ComparedField::Link => "Link",
        }
    }

    fn render(self, listing: &Listing) -> String {
        match self {
            ComparedField::Brand => listing.brand().to_string(),
            ComparedField::Year => listing.year().to_string(),
            ComparedField::Price => format_lakhs(listing.price()),
            ComparedField::DistanceCovered => format!("{:.0}", listing.distance_covered()),
            ComparedField::Location => listing.location().to_string(),
            ComparedField::Link => listing.link().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldDiff {
    pub field: ComparedField,
    pub car1: String,
    pub car2: String,
}

impl FieldDiff {
    pub fn differs(&self) -> bool {
        self.car1 != self.car2
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Pick {
    Car1,
    Car2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RecommendationSource {
    Reasoning,
    Fallback,
}

#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    pub text: String,
    pub source: RecommendationSource,
    /// Set only by the rule-based verdict; free-text answers are not interpreted.
    pub pick: Option<Pick>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Comparison {
    pub car1_title: String,
    pub car2_title: String,
    pub fields: Vec<FieldDiff>,
    pub recommendation: Recommendation,
}

pub fn diff_fields(car1: &Listing, car2: &Listing) -> Vec<FieldDiff> {
    ComparedField::ALL
        .iter()
        .map(|&field| FieldDiff {
            field,
            car1: field.render(car1),
            car2: field.render(car2),
        })
        .collect()
}

/// Deterministic verdict: cheaper-and-less-driven car1 wins, then
/// newer-and-cheaper car2 wins, otherwise a trade-off statement naming both.
pub fn fallback_recommendation(car1: &Listing, car2: &Listing) -> Recommendation {
    let (text, pick) = if car2.price() > car1.price() && car2.distance_covered() > car1.distance_covered() {
        (
            format!("{} may offer better value with a lower price and lower mileage.", car1.title()),
            Some(Pick::Car1),
        )
    } else if car2.year() > car1.year() && car2.price() < car1.price() {
        (format!("{} is newer and cheaper, a strong pick.", car2.title()), Some(Pick::Car2))
    } else {
        (
            format!(
                "Both cars have trade-offs. Prefer lower mileage? Go with {}. Want a newer model? Consider {}.",
                car1.title(),
                car2.title()
            ),
            None,
        )
    };

    Recommendation {
        text,
        source: RecommendationSource::Fallback,
        pick,
    }
}

pub fn build_prompt(car1: &Listing, car2: &Listing) -> String {
    let describe = |label: &str, car: &Listing| {
        format!(
            "{}:\nTitle: {}\nBrand: {}\nYear: {}\nPrice: ₹{:.0}\nDistance Covered: {:.0} KM\nLocation: {}\n",
            label,
            car.title(),
            car.brand(),
            car.year(),
            car.price(),
            car.distance_covered(),
            car.location()
        )
    };

    format!(
        "You are an assistant helping users compare two used cars. Be honest, helpful, and concise.\n\n{}\n{}\n\
         Which car offers better value and why?\nYou have to give a final decision to choose a car.",
        describe("Car 1", car1),
        describe("Car 2", car2)
    )
}

pub struct Comparator {
    reasoner: Box<dyn ReasoningClient>,
    timeout: Duration,
}

impl Comparator {
    pub fn new(reasoner: Box<dyn ReasoningClient>, timeout: Duration) -> Self {
        Self { reasoner, timeout }
    }

    /// Rule-based only.
    pub fn offline() -> Self {
        Self::new(Box::new(DisabledReasoner), Duration::ZERO)
    }

    /// Never fails: collaborator errors and timeouts resolve to the fallback verdict.
    pub async fn compare(&self, car1: &Listing, car2: &Listing) -> Comparison {
        let recommendation = match self.ask_reasoner(car1, car2).await {
            Ok(text) => {
                info!("Recommendation from reasoning collaborator");
                Recommendation {
                    text,
                    source: RecommendationSource::Reasoning,
                    pick: None,
                }
            }
            Err(ExternalServiceError::Disabled) => fallback_recommendation(car1, car2),
            Err(e) => {
                warn!("Reasoning collaborator failed, using fallback: {}", e);
                fallback_recommendation(car1, car2)
            }
        };

        Comparison {
            car1_title: car1.title().to_string(),
            car2_title: car2.title().to_string(),
            fields: diff_fields(car1, car2),
            recommendation,
        }
    }

    async fn ask_reasoner(&self, car1: &Listing, car2: &Listing) -> Result<String, ExternalServiceError> {
        let prompt = build_prompt(car1, car2);
        let answer = match timeout(self.timeout, self.reasoner.invoke(&prompt)).await {
            Ok(result) => result?,
            Err(_) => return Err(ExternalServiceError::Timeout(self.timeout)),
        };
        let answer = answer.trim();
        if answer.is_empty() {
            return Err(ExternalServiceError::EmptyResponse);
        }
        Ok(answer.to_string())
    }
}
