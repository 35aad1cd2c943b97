use std::env;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::GenerationError;

/// A fully assembled prompt: standing instructions plus the turn's content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

/// Capability boundary to an external text-generation service.
///
/// Output is non-deterministic and must never decide session state on its own.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Generate a completion for `prompt`.
    ///
    /// # Errors
    ///
    /// Returns `GenerationError::Unavailable` for transient failures and
    /// `GenerationError::Rejected` for everything else.
    async fn generate(&self, prompt: &Prompt) -> Result<String, GenerationError>;
}

//
// ─── OPENAI-COMPATIBLE HTTP CLIENT ─────────────────────────────────────────────
//

const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
const DEFAULT_MODEL: &str = "llama-3.1-8b-instant";
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const TEMPERATURE: f32 = 0.3;

#[derive(Clone, Debug)]
pub struct GenerationConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
}

impl GenerationConfig {
    /// Read `STUDY_AI_*` variables; `GROQ_API_KEY` is accepted as the key fallback.
    ///
    /// Returns `None` when no non-empty API key is set.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let api_key = env::var("STUDY_AI_API_KEY")
            .or_else(|_| env::var("GROQ_API_KEY"))
            .ok()?;
        if api_key.trim().is_empty() {
            return None;
        }
        let base_url = env::var("STUDY_AI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into());
        let model = env::var("STUDY_AI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.into());
        let timeout = env::var("STUDY_AI_TIMEOUT_SECS")
            .ok()
            .and_then(|raw| raw.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        Some(Self {
            base_url,
            api_key,
            model,
            timeout: Duration::from_secs(timeout),
        })
    }
}

/// Chat-completions client for OpenAI-compatible endpoints (Groq by default).
#[derive(Clone)]
pub struct OpenAiCompatClient {
    client: Client,
    config: Option<GenerationConfig>,
}

impl OpenAiCompatClient {
    /// Build a client from environment configuration.
    ///
    /// # Errors
    ///
    /// Returns `reqwest::Error` if the HTTP client cannot be initialised.
    pub fn from_env() -> Result<Self, reqwest::Error> {
        Self::new(GenerationConfig::from_env())
    }

    /// Build a client; `None` yields a client that rejects every request.
    ///
    /// # Errors
    ///
    /// Returns `reqwest::Error` if the HTTP client cannot be initialised.
    pub fn new(config: Option<GenerationConfig>) -> Result<Self, reqwest::Error> {
        let timeout = config
            .as_ref()
            .map_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS), |c| c.timeout);
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, config })
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.config.is_some()
    }
}

#[async_trait]
impl GenerationClient for OpenAiCompatClient {
    async fn generate(&self, prompt: &Prompt) -> Result<String, GenerationError> {
        let config = self
            .config
            .as_ref()
            .ok_or_else(|| GenerationError::Rejected("generation is not configured".into()))?;

        let url = format!(
            "{}/chat/completions",
            config.base_url.trim_end_matches('/')
        );
        let payload = ChatRequest {
            model: config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: prompt.system.clone(),
                },
                ChatMessage {
                    role: "user",
                    content: prompt.user.clone(),
                },
            ],
            temperature: TEMPERATURE,
        };

        debug!(model = %config.model, "sending generation request");
        let response = self
            .client
            .post(url)
            .bearer_auth(&config.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!(%status, "generation request failed");
            return Err(classify_status(status));
        }

        let body: ChatResponse = response.json().await?;
        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| GenerationError::Rejected("empty completion".into()))?;

        Ok(content)
    }
}

fn classify_status(status: StatusCode) -> GenerationError {
    if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        GenerationError::Unavailable(format!("status {status}"))
    } else {
        GenerationError::Rejected(format!("status {status}"))
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_statuses_are_unavailable() {
        for status in [
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::BAD_GATEWAY,
            StatusCode::SERVICE_UNAVAILABLE,
        ] {
            assert!(matches!(
                classify_status(status),
                GenerationError::Unavailable(_)
            ));
        }
    }

    #[test]
    fn client_errors_are_rejected() {
        for status in [StatusCode::BAD_REQUEST, StatusCode::UNAUTHORIZED] {
            assert!(matches!(classify_status(status), GenerationError::Rejected(_)));
        }
    }

    #[tokio::test]
    async fn unconfigured_client_rejects() {
        let client = OpenAiCompatClient::new(None).unwrap();
        assert!(!client.enabled());
        let prompt = Prompt {
            system: "s".into(),
            user: "u".into(),
        };
        let err = client.generate(&prompt).await.unwrap_err();
        assert!(matches!(err, GenerationError::Rejected(_)));
    }

    #[test]
    fn response_body_parses_first_choice() {
        let body: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":" hi "}}]}"#,
        )
        .unwrap();
        assert_eq!(body.choices[0].message.content.as_deref(), Some(" hi "));
    }
}
