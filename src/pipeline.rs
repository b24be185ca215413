use crate::model::{ScrapeRequest, field};
use crate::normalizer::Normalizer;
use crate::parser::ListingParser;
use crate::scraper::Scraper;
use crate::storage::{SqliteStorage, UpsertOutcome};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// A `(brand, page)` fetch that was given up on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedUnit {
    pub brand: String,
    pub page: u32,
    pub reason: String,
}

/// Run-level counters. Row and page failures land here instead of aborting the run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub brands_processed: usize,
    pub pages_fetched: usize,
    pub parse_errors: usize,
    pub validation_errors: usize,
    pub storage_errors: usize,
    pub inserted: usize,
    pub replaced: usize,
    pub unchanged: usize,
    pub failed_units: Vec<FailedUnit>,
}

impl RunReport {
    pub fn stored(&self) -> usize {
        self.inserted + self.replaced + self.unchanged
    }
}

/// Sequential batch runner: one brand at a time, one request at a time, with
/// a fixed delay between outbound requests.
pub struct Pipeline<'a> {
    scraper: &'a dyn Scraper,
    parser: &'a dyn ListingParser,
    normalizer: &'a Normalizer,
    storage: &'a SqliteStorage,
    max_pages: u32,
    request_delay: Duration,
    debug_html_dir: Option<PathBuf>,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        scraper: &'a dyn Scraper,
        parser: &'a dyn ListingParser,
        normalizer: &'a Normalizer,
        storage: &'a SqliteStorage,
    ) -> Self {
        Self {
            scraper,
            parser,
            normalizer,
            storage,
            max_pages: 1,
            request_delay: Duration::ZERO,
            debug_html_dir: None,
        }
    }

    pub fn max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    pub fn request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    /// Pages that yield no listing nodes are dumped here for selector debugging.
    pub fn debug_html_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.debug_html_dir = Some(dir.into());
        self
    }

    pub async fn run(&self, brands: &[String]) -> RunReport {
        let mut report = RunReport::default();
        let mut requests_sent = 0usize;

        for brand in brands {
            info!("Processing brand: {}", brand);
            self.process_brand(brand, &mut report, &mut requests_sent).await;
            report.brands_processed += 1;
        }

        info!(
            "Run finished: {} stored ({} new, {} replaced, {} unchanged), {} parse errors, {} rejected, {} failed pages",
            report.stored(),
            report.inserted,
            report.replaced,
            report.unchanged,
            report.parse_errors,
            report.validation_errors,
            report.failed_units.len()
        );
        report
    }

    async fn process_brand(&self, brand: &str, report: &mut RunReport, requests_sent: &mut usize) {
        for page in 1..=self.max_pages {
            if *requests_sent > 0 && !self.request_delay.is_zero() {
                sleep(self.request_delay).await;
            }
            *requests_sent += 1;

            let request = ScrapeRequest {
                brand: brand.to_string(),
                page,
            };
            let html = match self.scraper.fetch_page(&request).await {
                Ok(html) => html,
                Err(e) => {
                    warn!("Giving up on {} page {}: {}", brand, page, e);
                    report.failed_units.push(FailedUnit {
                        brand: brand.to_string(),
                        page,
                        reason: e.to_string(),
                    });
                    return;
                }
            };
            report.pages_fetched += 1;

            let parsed = self.parser.parse_page(&html);
            report.parse_errors += parsed.errors.len();
            if parsed.nodes_seen == 0 {
                info!("No listings on {} page {}; moving on", brand, page);
                if page == 1 {
                    if let Some(dir) = &self.debug_html_dir {
                        save_debug_html(dir, &html, brand, page);
                    }
                }
                return;
            }

            for mut raw in parsed.listings {
                raw.insert(field::BRAND, brand);
                let Some(listing) = self.normalizer.normalize_or_reject(&raw, self.storage) else {
                    report.validation_errors += 1;
                    continue;
                };
                match self.storage.upsert(&listing) {
                    Ok(UpsertOutcome::Inserted) => report.inserted += 1,
                    Ok(UpsertOutcome::Replaced) => report.replaced += 1,
                    Ok(UpsertOutcome::Unchanged) => report.unchanged += 1,
                    Err(e) => {
                        warn!("DB save error for {}: {:?}", listing.link(), e);
                        report.storage_errors += 1;
                    }
                }
            }
        }
    }
}

/// Writes the page body to `dir` so selector drift can be inspected.
fn save_debug_html(dir: &Path, html: &str, brand: &str, page: u32) {
    if let Err(e) = fs::create_dir_all(dir) {
        warn!("Failed to create debug folder: {}", e);
        return;
    }
    let filename = dir.join(format!("debug-{}-p{}.html", brand.replace(' ', "_"), page));
    if let Err(e) = fs::write(&filename, html) {
        warn!("Failed to write debug HTML: {}", e);
    } else {
        info!("Saved debug HTML: {}", filename.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ListingFilter, NetworkError};
    use crate::normalizer::BrandVocabulary;
    use crate::parser::{OLX_SELECTORS_V1, OlxParser};
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct FakeScraper {
        pages: HashMap<(String, u32), String>,
        unreachable: Vec<String>,
        calls: Mutex<Vec<ScrapeRequest>>,
    }

    #[async_trait::async_trait]
    impl Scraper for FakeScraper {
        async fn fetch_page(&self, req: &ScrapeRequest) -> Result<String, NetworkError> {
            self.calls.lock().unwrap().push(req.clone());
            if self.unreachable.contains(&req.brand) {
                return Err(NetworkError::Exhausted { attempts: 3, last: "timed out".into() });
            }
            Ok(self
                .pages
                .get(&(req.brand.clone(), req.page))
                .cloned()
                .unwrap_or_else(|| "<html><body></body></html>".to_string()))
        }
    }

    fn card(title: &str, price: Option<&str>, info: &str, href: &str) -> String {
        let price = price
            .map(|p| format!(r#"<span class="_1zgtX">{p}</span>"#))
            .unwrap_or_default();
        format!(
            r#"<li class="_3V_Ww"><a href="{href}">{price}<div class="_21gnE">{info}</div>
               <div class="_2Gr10">{title}</div><div class="_3VRSm">Pune</div></a></li>"#
        )
    }

    fn page(cards: &[String]) -> String {
        format!("<html><body><ul>{}</ul></body></html>", cards.concat())
    }

    fn scraper() -> FakeScraper {
        let mut pages = HashMap::new();
        pages.insert(
            ("hyundai".to_string(), 1),
            page(&[
                card("Hyundai i20 Asta", Some("₹ 5,00,000"), "2016 - 80,000 km", "/item/i20-iid-1"),
                card("Hyundai Verna SX", Some("₹ 6,00,000"), "2016 - 90,000 km", "/item/verna-iid-2"),
                card("Hyundai Santro", None, "2010 - 1,20,000 km", "/item/santro-iid-3"),
                card("Hyundai Pony", Some("₹ 50,000"), "1850 - 10 km", "/item/pony-iid-4"),
            ]),
        );
        pages.insert(
            ("honda".to_string(), 1),
            page(&[card("Honda City VX", Some("₹ 7,00,000"), "2015 - 61,000 km", "/item/city-iid-5")]),
        );
        FakeScraper {
            pages,
            unreachable: vec!["kia".to_string()],
            calls: Mutex::new(Vec::new()),
        }
    }

    fn brands() -> Vec<String> {
        vec!["hyundai".into(), "kia".into(), "honda".into()]
    }

    #[tokio::test]
    async fn failed_brand_does_not_stop_the_run() {
        let scraper = scraper();
        let parser = OlxParser::new(OLX_SELECTORS_V1, "https://www.olx.in").unwrap();
        let normalizer = Normalizer::new(BrandVocabulary::new(brands()), 2026);
        let storage = SqliteStorage::in_memory().unwrap();

        let report = Pipeline::new(&scraper, &parser, &normalizer, &storage)
            .max_pages(2)
            .run(&brands())
            .await;

        assert_eq!(report.brands_processed, 3);
        assert_eq!(
            report.failed_units,
            vec![FailedUnit { brand: "kia".into(), page: 1, reason: "gave up after 3 attempts: timed out".into() }]
        );
        assert_eq!(report.pages_fetched, 4);
        assert_eq!(report.parse_errors, 1);
        assert_eq!(report.validation_errors, 1);
        assert_eq!(report.inserted, 3);
        assert_eq!(storage.count().unwrap(), 3);
        assert_eq!(storage.rejection_count().unwrap(), 1);

        let honda: Vec<_> = storage
            .scan(ListingFilter { brand: Some("honda".into()), ..Default::default() })
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(honda.len(), 1);

        // empty second pages end each brand; kia is attempted once
        let calls = scraper.calls.lock().unwrap();
        let pages: Vec<(String, u32)> = calls.iter().map(|r| (r.brand.clone(), r.page)).collect();
        assert_eq!(
            pages,
            vec![("hyundai".into(), 1), ("hyundai".into(), 2), ("kia".into(), 1), ("honda".into(), 1), ("honda".into(), 2)]
        );
    }

    #[tokio::test]
    async fn row_missing_price_never_reaches_the_store() {
        let scraper = scraper();
        let parser = OlxParser::new(OLX_SELECTORS_V1, "https://www.olx.in").unwrap();
        let normalizer = Normalizer::new(BrandVocabulary::new(brands()), 2026);
        let storage = SqliteStorage::in_memory().unwrap();

        let report = Pipeline::new(&scraper, &parser, &normalizer, &storage)
            .run(&["hyundai".to_string()])
            .await;

        assert_eq!(report.parse_errors, 1);
        assert!(storage.get("https://www.olx.in/item/santro-iid-3").unwrap().is_none());
        for listing in storage.scan(ListingFilter::default()) {
            let listing = listing.unwrap();
            assert!(listing.price() > 0.0);
            assert!((1900..=2027).contains(&listing.year()));
        }
    }

    #[tokio::test]
    async fn rerun_is_idempotent() {
        let scraper = scraper();
        let parser = OlxParser::new(OLX_SELECTORS_V1, "https://www.olx.in").unwrap();
        let normalizer = Normalizer::new(BrandVocabulary::new(brands()), 2026);
        let storage = SqliteStorage::in_memory().unwrap();
        let pipeline = Pipeline::new(&scraper, &parser, &normalizer, &storage);

        let first = pipeline.run(&brands()).await;
        let second = pipeline.run(&brands()).await;

        assert_eq!(first.inserted, 3);
        assert_eq!(second.inserted, 0);
        assert_eq!(second.unchanged, 3);
        assert_eq!(storage.count().unwrap(), 3);
    }

    #[tokio::test]
    async fn empty_first_page_is_saved_for_debugging() {
        let dir = tempfile::tempdir().unwrap();
        let scraper = scraper();
        let parser = OlxParser::new(OLX_SELECTORS_V1, "https://www.olx.in").unwrap();
        let normalizer = Normalizer::new(BrandVocabulary::new(["tata"]), 2026);
        let storage = SqliteStorage::in_memory().unwrap();

        Pipeline::new(&scraper, &parser, &normalizer, &storage)
            .debug_html_dir(dir.path())
            .run(&["tata".to_string()])
            .await;

        assert!(dir.path().join("debug-tata-p1.html").exists());
    }
}
