mod analyzer;
mod comparator;
mod config;
mod estimator;
mod model;
mod normalizer;
mod parser;
mod pipeline;
mod scraper;
mod storage;
mod utils;

use analyzer::{Analyzer, AnalyzerImpl, MarketInsights};
use clap::{Parser, Subcommand};
use comparator::{Comparator, Comparison, reasoner_from_config};
use config::{AppConfig, load_config};
use estimator::{EstimateQuery, PriceEstimator};
use model::{Listing, ListingFilter};
use normalizer::{BrandVocabulary, Normalizer};
use parser::{ListingParser, OLX_SELECTORS_V1, OlxParser};
use pipeline::Pipeline;
use scraper::ScraperImpl;
use std::time::Duration;
use storage::{DatasetRepository, SqliteStorage};
use tracing::{error, info};
use utils::{current_year, format_lakhs};

#[derive(Parser)]
#[command(name = "auto-valuer", about = "Used-car listing scraper, price estimator and comparator")]
struct Cli {
    /// Path to the JSON config file
    #[arg(long, default_value = "config.json")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch listings for the configured brands into the dataset
    Scrape {
        /// Override the configured brand list (repeatable)
        #[arg(long = "brand")]
        brands: Vec<String>,
        #[arg(long)]
        max_pages: Option<u32>,
    },
    /// Filter stored listings by brand, year range and title
    Search {
        #[arg(long)]
        brand: Option<String>,
        #[arg(long)]
        from: Option<i32>,
        #[arg(long)]
        to: Option<i32>,
        #[arg(long)]
        query: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Estimate the price of a described car
    Estimate {
        #[arg(long)]
        brand: String,
        #[arg(long)]
        year: i32,
        #[arg(long)]
        km: f64,
    },
    /// Compare two stored listings by link
    Compare {
        link1: String,
        link2: String,
        /// Skip the reasoning service and use the rule-based verdict
        #[arg(long)]
        offline: bool,
        #[arg(long)]
        json: bool,
    },
    /// Dataset aggregates per brand, year and distance
    Insights {
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt::init();

    // Set panic hook to log details about any panic
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("😱 Panic occurred: {:?}", panic_info);
    }));

    let cli = Cli::parse();

    let config = match load_config(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Config load error ({}): {}", cli.config, e);
            return;
        }
    };

    match cli.command {
        Command::Scrape { brands, max_pages } => scrape(&config, brands, max_pages).await,
        Command::Search { brand, from, to, query, json } => {
            let filter = ListingFilter {
                brand,
                year_from: from,
                year_to: to,
                title_query: query,
            };
            search(&config, &filter, json)
        }
        Command::Estimate { brand, year, km } => estimate(&config, EstimateQuery { brand, year, distance: km }),
        Command::Compare {
            link1,
            link2,
            offline,
            json,
        } => compare(&config, &link1, &link2, offline, json).await,
        Command::Insights { json } => insights(&config, json),
    }
}

async fn scrape(config: &AppConfig, brand_override: Vec<String>, max_pages: Option<u32>) {
    let brands = if brand_override.is_empty() {
        config.brands.clone()
    } else {
        brand_override
    };

    let scraper = match ScraperImpl::new(config) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to build HTTP client: {}", e);
            return;
        }
    };
    let origin = match reqwest::Url::parse(&config.base_url) {
        Ok(url) => url.origin().ascii_serialization(),
        Err(e) => {
            error!("Invalid base_url {}: {}", config.base_url, e);
            return;
        }
    };
    let parser = match OlxParser::new(OLX_SELECTORS_V1, &origin) {
        Ok(p) => p,
        Err(e) => {
            error!("Failed to compile selectors: {}", e);
            return;
        }
    };
    let storage = match SqliteStorage::new(&config.database_path) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to initialize storage: {:?}", e);
            return;
        }
    };
    let vocabulary = BrandVocabulary::new(config.brands.iter().chain(brands.iter()));
    let normalizer = Normalizer::new(vocabulary, current_year());

    info!(
        "Scraping {} brands with selector set {}",
        brands.len(),
        parser.selector_version()
    );
    let report = Pipeline::new(&scraper, &parser, &normalizer, &storage)
        .max_pages(max_pages.unwrap_or(config.max_pages))
        .request_delay(config.request_delay())
        .debug_html_dir("logs/html")
        .run(&brands)
        .await;

    println!(
        "Fetched {} pages: {} new, {} replaced, {} unchanged, {} parse errors, {} rejected, {} storage errors",
        report.pages_fetched,
        report.inserted,
        report.replaced,
        report.unchanged,
        report.parse_errors,
        report.validation_errors,
        report.storage_errors
    );
    for unit in &report.failed_units {
        println!("  failed: {} page {} ({})", unit.brand, unit.page, unit.reason);
    }
    match (storage.count(), storage.rejection_count()) {
        (Ok(listings), Ok(rejections)) => {
            println!("Dataset holds {} listings; rejection log holds {} rows", listings, rejections)
        }
        (Err(e), _) | (_, Err(e)) => error!("Failed to count stored rows: {:?}", e),
    }
}

fn search(config: &AppConfig, filter: &ListingFilter, json: bool) {
    let repo = DatasetRepository::new(&config.database_path);
    let listings = match repo.search(filter) {
        Ok(l) => l,
        Err(e) => {
            error!("Search failed: {}", e);
            return;
        }
    };

    if json {
        print_json(&listings);
        return;
    }
    println!("Showing {} listings", listings.len());
    for listing in &listings {
        print_listing(listing);
    }
}

fn estimate(config: &AppConfig, query: EstimateQuery) {
    let estimator = match PriceEstimator::load(&config.model_artifact_path, config.band_fraction) {
        Ok(e) => e,
        Err(e) => {
            error!("Estimator unavailable: {}", e);
            return;
        }
    };

    match estimator.estimate_query(&query, current_year()) {
        Ok(estimate) => {
            println!("Estimated price: ₹{:.0}", estimate.point);
            println!(
                "Estimated range: ₹{:.0} – ₹{:.0} (±{:.0}% heuristic band, not a confidence interval)",
                estimate.lower,
                estimate.upper,
                config.band_fraction * 100.0
            );
        }
        Err(e) => error!("Estimate failed: {}", e),
    }
}

async fn compare(config: &AppConfig, link1: &str, link2: &str, offline: bool, json: bool) {
    let repo = DatasetRepository::new(&config.database_path);
    let (car1, car2) = match (repo.find_by_link(link1), repo.find_by_link(link2)) {
        (Ok(Some(a)), Ok(Some(b))) => (a, b),
        (Err(e), _) | (_, Err(e)) => {
            error!("Dataset unavailable: {}", e);
            return;
        }
        _ => {
            error!("Both links must refer to stored listings");
            return;
        }
    };
    if car1.link() == car2.link() {
        error!("Pick two different listings to compare");
        return;
    }

    let comparator = if offline {
        Comparator::offline()
    } else {
        Comparator::new(
            reasoner_from_config(&config.reasoning),
            Duration::from_secs(config.reasoning.timeout_seconds),
        )
    };
    let comparison = comparator.compare(&car1, &car2).await;

    if json {
        print_json(&comparison);
    } else {
        print_comparison(&comparison);
    }
}

fn insights(config: &AppConfig, json: bool) {
    let repo = DatasetRepository::new(&config.database_path);
    let listings = match repo.listings() {
        Ok(l) => l,
        Err(e) => {
            error!("Dataset unavailable: {}", e);
            return;
        }
    };
    let insights = AnalyzerImpl::new().insights(&listings);

    if json {
        print_json(&insights);
    } else {
        print_insights(&insights);
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => error!("Failed to serialize output: {}", e),
    }
}

fn print_listing(listing: &Listing) {
    println!("{}", listing.title());
    println!(
        "  📍 {} | 📅 {} | 🚗 {:.0} km | 💰 {}",
        listing.location(),
        listing.year(),
        listing.distance_covered(),
        format_lakhs(listing.price())
    );
    println!("  🔗 {}", listing.link());
}

fn print_comparison(comparison: &Comparison) {
    println!("{:<24} {:<40} {:<40}", "Attribute", comparison.car1_title, comparison.car2_title);
    for diff in &comparison.fields {
        let marker = if diff.differs() { "*" } else { " " };
        println!("{}{:<23} {:<40} {:<40}", marker, diff.field.label(), diff.car1, diff.car2);
    }
    println!();
    println!("Recommendation ({:?}): {}", comparison.recommendation.source, comparison.recommendation.text);
}

fn print_insights(insights: &MarketInsights) {
    println!("Listings: {}", insights.total_listings);
    if let Some(stats) = insights.overall {
        println!(
            "Price: mean {} | std-dev {} | min {} | max {}",
            format_lakhs(stats.mean),
            format_lakhs(stats.std_dev),
            format_lakhs(stats.min),
            format_lakhs(stats.max)
        );
    }

    println!("\nListings by brand:");
    for brand in &insights.brands {
        let top: Vec<String> = brand.top_models.iter().map(|(t, c)| format!("{} ({})", t, c)).collect();
        println!("  {:<16} {:>5}  top: {}", brand.brand, brand.listings, top.join(", "));
    }

    println!("\nAverage price by brand:");
    for brand in insights.brands_by_average_price() {
        println!("  {:<16} {}", brand.brand, format_lakhs(brand.average_price));
    }

    println!("\nBy year:");
    for ((year, count), (_, avg)) in insights.listings_by_year.iter().zip(&insights.average_price_by_year) {
        println!("  {}  {:>5} listings  avg {}", year, count, format_lakhs(*avg));
    }

    println!("\nPrice by distance covered:");
    for (range, stats) in &insights.price_by_distance {
        println!(
            "  {:<10} {:>5} listings  mean {}  min {}  max {}",
            range.to_string(),
            stats.count,
            format_lakhs(stats.mean),
            format_lakhs(stats.min),
            format_lakhs(stats.max)
        );
    }
}
