use crate::analyzer::market_indicators::{DistanceRange, MarketAnalyzer};
use crate::model::Listing;
use serde::Serialize;
use std::collections::BTreeMap;

/// Basic price statistics over a group of listings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PriceStats {
    pub count: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
}

/// Population mean and standard deviation; `None` for an empty group.
pub fn calculate_stats(prices: &[f64]) -> Option<PriceStats> {
    if prices.is_empty() {
        return None;
    }
    let count = prices.len() as f64;
    let mean = prices.iter().sum::<f64>() / count;
    let std_dev = (prices.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / count).sqrt();

    Some(PriceStats {
        count: prices.len(),
        mean,
        std_dev,
        min: prices.iter().copied().fold(f64::INFINITY, f64::min),
        max: prices.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct BrandSummary {
    pub brand: String,
    pub listings: usize,
    pub average_price: f64,
    /// Up to two most frequently listed titles with their counts.
    pub top_models: Vec<(String, usize)>,
}

/// Dataset-wide aggregates shown by the insights command.
#[derive(Debug, Clone, Serialize)]
pub struct MarketInsights {
    pub total_listings: usize,
    pub overall: Option<PriceStats>,
    /// Sorted by listing count, most listed first.
    pub brands: Vec<BrandSummary>,
    pub listings_by_year: Vec<(i32, usize)>,
    pub average_price_by_year: Vec<(i32, f64)>,
    pub price_by_distance: Vec<(DistanceRange, PriceStats)>,
}

impl MarketInsights {
    /// Brands ordered by average price, most expensive first.
    pub fn brands_by_average_price(&self) -> Vec<&BrandSummary> {
        let mut brands: Vec<&BrandSummary> = self.brands.iter().collect();
        brands.sort_by(|a, b| b.average_price.total_cmp(&a.average_price));
        brands
    }
}

pub trait Analyzer {
    fn calculate_stats(&self, listings: &[Listing]) -> Option<PriceStats>;
    fn insights(&self, listings: &[Listing]) -> MarketInsights;
}

pub struct AnalyzerImpl;

impl AnalyzerImpl {
    pub fn new() -> Self {
        Self
    }
}

impl Analyzer for AnalyzerImpl {
    fn calculate_stats(&self, listings: &[Listing]) -> Option<PriceStats> {
        let prices: Vec<f64> = listings.iter().map(|l| l.price()).collect();
        calculate_stats(&prices)
    }

    fn insights(&self, listings: &[Listing]) -> MarketInsights {
        let mut by_brand: BTreeMap<&str, Vec<&Listing>> = BTreeMap::new();
        for listing in listings {
            by_brand.entry(listing.brand()).or_default().push(listing);
        }

        let mut brands: Vec<BrandSummary> = by_brand
            .into_iter()
            .map(|(brand, rows)| {
                let average_price = rows.iter().map(|l| l.price()).sum::<f64>() / rows.len() as f64;
                BrandSummary {
                    brand: brand.to_string(),
                    listings: rows.len(),
                    average_price,
                    top_models: top_titles(&rows, 2),
                }
            })
            .collect();
        brands.sort_by(|a, b| b.listings.cmp(&a.listings).then_with(|| a.brand.cmp(&b.brand)));

        MarketInsights {
            total_listings: listings.len(),
            overall: self.calculate_stats(listings),
            brands,
            listings_by_year: MarketAnalyzer::listings_by_year(listings),
            average_price_by_year: MarketAnalyzer::average_price_by_year(listings),
            price_by_distance: MarketAnalyzer::price_by_distance(
                listings,
                MarketAnalyzer::DEFAULT_STEP,
                MarketAnalyzer::DEFAULT_CEILING,
            ),
        }
    }
}

fn top_titles(rows: &[&Listing], n: usize) -> Vec<(String, usize)> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for listing in rows {
        *counts.entry(listing.title()).or_default() += 1;
    }
    let mut titles: Vec<(String, usize)> = counts.into_iter().map(|(t, c)| (t.to_string(), c)).collect();
    // ties keep alphabetical order from the BTreeMap
    titles.sort_by(|a, b| b.1.cmp(&a.1));
    titles.truncate(n);
    titles
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Listing, ListingFields};

    fn row(brand: &str, title: &str, link: &str, price: f64) -> Listing {
        Listing::new(
            ListingFields {
                title: title.into(),
                brand: brand.into(),
                year: 2018,
                price,
                distance_covered: 30_000.0,
                location: "Chennai".into(),
                link: link.into(),
                image: None,
                information: String::new(),
            },
            2026,
        )
        .unwrap()
    }

    #[test]
    fn stats_of_empty_group_are_none() {
        assert!(calculate_stats(&[]).is_none());
    }

    #[test]
    fn stats_are_population_based() {
        let stats = calculate_stats(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert_eq!(stats.mean, 5.0);
        assert_eq!(stats.std_dev, 2.0);
        assert_eq!(stats.min, 2.0);
        assert_eq!(stats.max, 9.0);
    }

    #[test]
    fn insights_summarise_brands() {
        let listings = vec![
            row("hyundai", "Hyundai Creta", "1", 900_000.0),
            row("hyundai", "Hyundai Creta", "2", 1_000_000.0),
            row("hyundai", "Hyundai i20", "3", 500_000.0),
            row("hyundai", "Hyundai Venue", "4", 800_000.0),
            row("bmw", "BMW 3 Series", "5", 3_000_000.0),
        ];
        let insights = AnalyzerImpl::new().insights(&listings);

        assert_eq!(insights.total_listings, 5);
        assert_eq!(insights.brands[0].brand, "hyundai");
        assert_eq!(insights.brands[0].listings, 4);
        assert_eq!(insights.brands[0].average_price, 800_000.0);
        assert_eq!(
            insights.brands[0].top_models,
            vec![("Hyundai Creta".to_string(), 2), ("Hyundai Venue".to_string(), 1)]
        );
        assert_eq!(insights.brands_by_average_price()[0].brand, "bmw");
        assert_eq!(insights.listings_by_year, vec![(2018, 5)]);
    }
}
