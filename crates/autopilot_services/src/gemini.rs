//! Gemini classifier.
//!
//! Calls the Generative Language REST API and turns completions into the
//! structured results the agents expect.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use autopilot_agents::{AgentError, AgentResult, Classifier, TriageClassification};

use crate::error::{ServiceError, ServiceResult};

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const MAX_RETRIES: u32 = 3;

/// Gemini settings.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Accepts both `gemini-2.5-flash` and `models/gemini-2.5-flash`.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        self.model = model.strip_prefix("models/").unwrap_or(&model).to_string();
        self
    }
}

/// A model that can serve `generateContent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelInfo {
    pub name: String,
    pub display_name: Option<String>,
}

/// Gemini-backed [`Classifier`].
pub struct GeminiClassifier {
    config: GeminiConfig,
    client: reqwest::Client,
}

impl GeminiClassifier {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Send a prompt and return the text of the first candidate.
    ///
    /// Retries network errors, rate limits and 5xx responses with
    /// exponential backoff.
    pub async fn generate(&self, prompt: &str) -> ServiceResult<String> {
        let url = format!("{}/models/{}:generateContent", API_BASE, self.config.model);
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
        };

        let mut last_error = None;
        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // 2s, 4s
                let delay = Duration::from_secs(1 << attempt);
                tokio::time::sleep(delay).await;
            }

            let response = match self
                .client
                .post(&url)
                .query(&[("key", self.config.api_key.as_str())])
                .json(&request)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    warn!(attempt = attempt + 1, "Gemini request failed: {}", e);
                    last_error = Some(ServiceError::Http(e));
                    continue;
                }
            };

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let error = ServiceError::Api {
                    status: status.as_u16(),
                    body,
                };
                if error.is_transient() {
                    warn!(attempt = attempt + 1, %status, "Gemini transient error");
                    last_error = Some(error);
                    continue;
                }
                return Err(error);
            }

            let result: GenerateResponse = response
                .json()
                .await
                .map_err(|e| ServiceError::decode(format!("generateContent response: {}", e)))?;

            return result
                .first_text()
                .ok_or_else(|| ServiceError::decode("no candidates in Gemini response"));
        }

        Err(last_error.unwrap_or_else(|| ServiceError::decode("max retries exceeded")))
    }

    /// Models supporting `generateContent`, following pagination.
    pub async fn list_models(&self) -> ServiceResult<Vec<ModelInfo>> {
        let mut models = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .get(format!("{}/models", API_BASE))
                .query(&[("key", self.config.api_key.as_str())]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let response = request.send().await?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(ServiceError::Api {
                    status: status.as_u16(),
                    body,
                });
            }

            let page: ModelPage = response
                .json()
                .await
                .map_err(|e| ServiceError::decode(format!("models response: {}", e)))?;
            models.extend(page.generating_models());

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!(count = models.len(), "Models listed");
        Ok(models)
    }
}

#[async_trait]
impl Classifier for GeminiClassifier {
    async fn classify_triage(
        &self,
        summary: &str,
        description: &str,
    ) -> AgentResult<TriageClassification> {
        let raw = self
            .generate(&triage_prompt(summary, description))
            .await
            .map_err(|e| AgentError::classifier(e.to_string()))?;
        TriageClassification::parse(&raw)
    }

    async fn classify_sentiment(&self, text: &str) -> AgentResult<String> {
        self.generate(&sentiment_prompt(text))
            .await
            .map(|s| s.trim().to_string())
            .map_err(|e| AgentError::classifier(e.to_string()))
    }
}

pub fn triage_prompt(summary: &str, description: &str) -> String {
    format!(
        r#"You are triaging a new Jira ticket for a software team.

Summary: "{summary}"
Description: "{description}"

Reply with a single JSON object and nothing else, using exactly these keys:
- "issue_type": one of "Bug", "Story", "Task"
- "priority": one of "Highest", "High", "Medium", "Low", "Lowest"
- "specialization": one of "Frontend", "Backend", "DevOps", "FullStack""#
    )
}

pub fn sentiment_prompt(comment: &str) -> String {
    format!(
        r#"Analyze the following developer comment from a Jira ticket.
Determine the sentiment (Positive, Neutral, Negative) and whether the developer is blocked.

Comment: "{comment}"

Reply in exactly this form:
Blocked: yes or no
Sentiment: positive, neutral or negative
Summary: one line"#
    )
}

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

impl GenerateResponse {
    fn first_text(self) -> Option<String> {
        let content = self.candidates.into_iter().next()?.content?;
        let text: String = content.parts.into_iter().map(|p| p.text).collect();
        (!text.trim().is_empty()).then_some(text)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelPage {
    #[serde(default)]
    models: Vec<RawModel>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawModel {
    name: String,
    display_name: Option<String>,
    #[serde(default)]
    supported_generation_methods: Vec<String>,
}

impl ModelPage {
    fn generating_models(&self) -> Vec<ModelInfo> {
        self.models
            .iter()
            .filter(|m| m.supported_generation_methods.iter().any(|g| g == "generateContent"))
            .map(|m| ModelInfo {
                name: m.name.clone(),
                display_name: m.display_name.clone(),
            })
            .collect()
    }
}
