use crate::analyzer::price_analysis::{PriceStats, calculate_stats};
use crate::model::Listing;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Half-open distance bucket `[lower, upper)` in kilometres.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DistanceRange(pub u32, pub u32);

impl fmt::Display for DistanceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}k-{}k", self.0 / 1000, self.1 / 1000)
    }
}

pub struct MarketAnalyzer;

impl MarketAnalyzer {
    pub const DEFAULT_STEP: u32 = 50_000;
    pub const DEFAULT_CEILING: u32 = 400_000;

    /// Price statistics per distance bucket. Listings at or above `ceiling`
    /// are left out; empty buckets are not reported.
    pub fn price_by_distance(listings: &[Listing], step: u32, ceiling: u32) -> Vec<(DistanceRange, PriceStats)> {
        let mut map: BTreeMap<DistanceRange, Vec<f64>> = BTreeMap::new();
        for listing in listings {
            if let Some(range) = Self::get_distance_range(listing.distance_covered(), step, ceiling) {
                map.entry(range).or_default().push(listing.price());
            }
        }
        map.into_iter()
            .filter_map(|(range, prices)| calculate_stats(&prices).map(|stats| (range, stats)))
            .collect()
    }

    /// Average price per model year, oldest first.
    pub fn average_price_by_year(listings: &[Listing]) -> Vec<(i32, f64)> {
        let mut map: BTreeMap<i32, Vec<f64>> = BTreeMap::new();
        for listing in listings {
            map.entry(listing.year()).or_default().push(listing.price());
        }
        map.into_iter()
            .map(|(year, prices)| (year, prices.iter().sum::<f64>() / prices.len() as f64))
            .collect()
    }

    /// Listing count per model year, oldest first.
    pub fn listings_by_year(listings: &[Listing]) -> Vec<(i32, usize)> {
        let mut map: BTreeMap<i32, usize> = BTreeMap::new();
        for listing in listings {
            *map.entry(listing.year()).or_default() += 1;
        }
        map.into_iter().collect()
    }

    pub fn get_distance_range(distance: f64, step: u32, ceiling: u32) -> Option<DistanceRange> {
        if step == 0 || !distance.is_finite() || distance < 0.0 || distance >= ceiling as f64 {
            return None;
        }
        let lower = (distance as u32) / step * step;
        Some(DistanceRange(lower, lower + step))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::listing;

    #[test]
    fn distance_buckets_are_half_open() {
        let step = MarketAnalyzer::DEFAULT_STEP;
        let ceiling = MarketAnalyzer::DEFAULT_CEILING;
        assert_eq!(MarketAnalyzer::get_distance_range(0.0, step, ceiling), Some(DistanceRange(0, 50_000)));
        assert_eq!(
            MarketAnalyzer::get_distance_range(50_000.0, step, ceiling),
            Some(DistanceRange(50_000, 100_000))
        );
        assert_eq!(MarketAnalyzer::get_distance_range(400_000.0, step, ceiling), None);
        assert_eq!(DistanceRange(50_000, 100_000).to_string(), "50k-100k");
    }

    #[test]
    fn prices_grouped_by_distance_and_year() {
        let listings = vec![
            listing("A", "l1", 400_000.0, 10_000.0, 2015),
            listing("B", "l2", 600_000.0, 20_000.0, 2015),
            listing("C", "l3", 300_000.0, 120_000.0, 2012),
            listing("D", "l4", 100_000.0, 500_000.0, 2005),
        ];

        let buckets = MarketAnalyzer::price_by_distance(&listings, 50_000, 400_000);
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].0, DistanceRange(0, 50_000));
        assert_eq!(buckets[0].1.mean, 500_000.0);
        assert_eq!(buckets[1].0, DistanceRange(100_000, 150_000));

        assert_eq!(
            MarketAnalyzer::average_price_by_year(&listings),
            vec![(2005, 100_000.0), (2012, 300_000.0), (2015, 500_000.0)]
        );
        assert_eq!(MarketAnalyzer::listings_by_year(&listings), vec![(2005, 1), (2012, 1), (2015, 2)]);
    }
}
