use crate::estimator::DEFAULT_BAND_FRACTION;
use crate::model::ConfigError;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_backoff_ms: 1_000,
            max_backoff_ms: 16_000,
            jitter_ms: 250,
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `attempt` (1-based), excluding jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let ms = self.base_backoff_ms.saturating_mul(1u64 << exp);
        Duration::from_millis(ms.min(self.max_backoff_ms))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReasoningConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub model: String,
    pub api_key_env: String,
    pub timeout_seconds: u64,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "https://api.groq.com/openai/v1/chat/completions".to_string(),
            model: "meta-llama/llama-4-scout-17b-16e-instruct".to_string(),
            api_key_env: "GROQ_API_KEY".to_string(),
            timeout_seconds: 15,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub brands: Vec<String>,
    pub base_url: String,
    pub user_agent: String,
    pub request_delay_ms: u64,
    pub max_pages: u32,
    pub retry: RetryConfig,
    pub database_path: String,
    pub model_artifact_path: String,
    pub band_fraction: f64,
    pub reasoning: ReasoningConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            brands: [
                "maruti suzuki",
                "hyundai",
                "honda",
                "toyota",
                "tata",
                "mahindra",
                "mercedes benz",
                "ford",
                "volkswagen",
                "audi",
                "nissan",
                "bmw",
                "kia",
            ]
            .iter()
            .map(|b| b.to_string())
            .collect(),
            base_url: "https://www.olx.in/cars_c84".to_string(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AutoValuerBot/0.1".to_string(),
            request_delay_ms: 2_000,
            max_pages: 1,
            retry: RetryConfig::default(),
            database_path: "data.db".to_string(),
            model_artifact_path: "model/price_model.json".to_string(),
            band_fraction: DEFAULT_BAND_FRACTION,
            reasoning: ReasoningConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.brands.is_empty() {
            return Err(ConfigError::Invalid("brand list is empty".into()));
        }
        if !(0.0..1.0).contains(&self.band_fraction) {
            return Err(ConfigError::Invalid(format!(
                "band_fraction must lie in [0, 1), got {}",
                self.band_fraction
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be at least 1".into()));
        }
        Ok(())
    }
}

pub fn load_config(path: impl AsRef<Path>) -> Result<AppConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<AppConfig, ConfigError> {
    let config: AppConfig = serde_json::from_str(content)?;
    config.validate()?;
    Ok(config)
}
