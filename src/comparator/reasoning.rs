use crate::config::ReasoningConfig;
use crate::model::ExternalServiceError;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use tracing::{info, warn};

/// Opaque free-text collaborator: prompt in, answer out. Any error is
/// treated by callers as a reason to fall back.
#[async_trait::async_trait]
pub trait ReasoningClient: Send + Sync {
    async fn invoke(&self, prompt: &str) -> Result<String, ExternalServiceError>;
}

/// Stand-in used when no collaborator is configured.
pub struct DisabledReasoner;

#[async_trait::async_trait]
impl ReasoningClient for DisabledReasoner {
    async fn invoke(&self, _prompt: &str) -> Result<String, ExternalServiceError> {
        Err(ExternalServiceError::Disabled)
    }
}

/// OpenAI-compatible chat-completions client.
pub struct ChatCompletionsClient {
    client: Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl ChatCompletionsClient {
    pub fn new(cfg: &ReasoningConfig, api_key: String) -> Result<Self, ExternalServiceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_seconds.max(1) * 2))
            .build()
            .map_err(|e| ExternalServiceError::Http(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: cfg.endpoint.clone(),
            model: cfg.model.clone(),
            api_key,
        })
    }
}

/// Picks the configured collaborator, or [`DisabledReasoner`] when it is
/// switched off, the API key variable is unset, or the client cannot be built.
pub fn reasoner_from_config(cfg: &ReasoningConfig) -> Box<dyn ReasoningClient> {
    if !cfg.enabled {
        info!("Reasoning collaborator disabled by config");
        return Box::new(DisabledReasoner);
    }
    let api_key = match env::var(&cfg.api_key_env) {
        Ok(key) if !key.trim().is_empty() => key,
        _ => {
            info!("{} not set; comparisons use the rule-based verdict", cfg.api_key_env);
            return Box::new(DisabledReasoner);
        }
    };
    match ChatCompletionsClient::new(cfg, api_key) {
        Ok(client) => Box::new(client),
        Err(e) => {
            warn!("Cannot build reasoning client: {}", e);
            Box::new(DisabledReasoner)
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[async_trait::async_trait]
impl ReasoningClient for ChatCompletionsClient {
    async fn invoke(&self, prompt: &str) -> Result<String, ExternalServiceError> {
        let body = ChatRequest {
            model: &self.model,
            temperature: 0.0,
            messages: vec![ChatMessage { role: "user", content: prompt }],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.trim())
            .json(&body)
            .send()
            .await
            .map_err(|e| ExternalServiceError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "unknown".into());
            return Err(ExternalServiceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ExternalServiceError::Http(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or(ExternalServiceError::EmptyResponse)
    }
}
