use crate::config::{AppConfig, RetryConfig};
use crate::model::{NetworkError, ScrapeRequest};
use crate::scraper::traits::Scraper;
use crate::utils::to_kebab_case;

use rand::Rng;
use reqwest::Client;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

pub struct ScraperImpl {
    client: Client,
    base_url: String,
    retry: RetryConfig,
}

impl ScraperImpl {
    pub fn new(config: &AppConfig) -> Result<Self, NetworkError> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| NetworkError::Http(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            retry: config.retry.clone(),
        })
    }

    fn build_url(&self, req: &ScrapeRequest) -> String {
        format!(
            "{}?filter=make_eq_{}&page={}",
            self.base_url,
            to_kebab_case(&req.brand),
            req.page
        )
    }

    async fn fetch_once(&self, url: &str) -> Result<String, NetworkError> {
        let response = self.client.get(url).send().await.map_err(map_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(NetworkError::Status(status.as_u16()));
        }

        response.text().await.map_err(map_reqwest)
    }
}

#[async_trait::async_trait]
impl Scraper for ScraperImpl {
    async fn fetch_page(&self, req: &ScrapeRequest) -> Result<String, NetworkError> {
        let url = self.build_url(req);
        debug!("GET {}", url);
        with_retry(&self.retry, &url, || self.fetch_once(&url)).await
    }
}

fn map_reqwest(e: reqwest::Error) -> NetworkError {
    if e.is_timeout() {
        NetworkError::Timeout
    } else {
        NetworkError::Http(e.to_string())
    }
}

/// Runs `op` until it succeeds, fails with a non-transient error, or
/// `policy.max_attempts` is reached. Transient failures sleep for an
/// exponentially growing, capped delay between attempts.
pub async fn with_retry<T, F, Fut>(policy: &RetryConfig, label: &str, mut op: F) -> Result<T, NetworkError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, NetworkError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_transient() => return Err(e),
            Err(e) if attempt >= policy.max_attempts => {
                return Err(NetworkError::Exhausted {
                    attempts: attempt,
                    last: e.to_string(),
                });
            }
            Err(e) => {
                let delay = retry_delay(policy, attempt);
                warn!(
                    "Attempt {}/{} for {} failed: {}; retrying in {:?}",
                    attempt, policy.max_attempts, label, e, delay
                );
                sleep(delay).await;
            }
        }
    }
}

fn retry_delay(policy: &RetryConfig, attempt: u32) -> Duration {
    let jitter = if policy.jitter_ms == 0 {
        0
    } else {
        rand::rng().random_range(0..=policy.jitter_ms)
    };
    policy.backoff(attempt) + Duration::from_millis(jitter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryConfig {
        RetryConfig { max_attempts, base_backoff_ms: 1, max_backoff_ms: 4, jitter_ms: 0 }
    }

    #[test]
    fn url_carries_kebab_brand_and_page() {
        let config = AppConfig {
            base_url: "https://www.olx.in/cars_c84/".to_string(),
            ..AppConfig::default()
        };
        let scraper = ScraperImpl::new(&config).unwrap();
        let url = scraper.build_url(&ScrapeRequest { brand: "Maruti Suzuki".into(), page: 2 });
        assert_eq!(url, "https://www.olx.in/cars_c84?filter=make_eq_maruti-suzuki&page=2");
    }

    #[tokio::test]
    async fn transient_failures_are_retried_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&fast_policy(3), "test", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(NetworkError::Status(503))
            } else {
                Ok("page")
            }
        })
        .await;
        assert_eq!(result.unwrap(), "page");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn attempts_are_bounded() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&fast_policy(3), "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(NetworkError::Timeout)
        })
        .await;
        assert!(matches!(result, Err(NetworkError::Exhausted { attempts: 3, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&fast_policy(5), "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(NetworkError::Status(404))
        })
        .await;
        assert!(matches!(result, Err(NetworkError::Status(404))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
