// Analyzer module: dataset aggregates for the insights view.

pub mod market_indicators;
pub mod price_analysis;

pub use price_analysis::{Analyzer, AnalyzerImpl, MarketInsights};
