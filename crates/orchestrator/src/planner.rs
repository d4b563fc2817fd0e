//! Plan generation from a free-text description

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use stackforge_core::plan::{sanitize_service, DEFAULT_SERVICE};

use crate::config::GeminiConfig;
use crate::error::{OrchestratorError, Result};
use crate::prompts::PlannerPrompts;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedStep {
    pub title: String,
    pub details: String,
    pub service: String,
}

/// Turns a job description into a candidate step list.
#[async_trait]
pub trait PlanGenerator: Send + Sync {
    async fn generate_plan(&self, description: &str) -> Result<Vec<PlannedStep>>;
}

/// Parse a model response of the form `{"steps": [{title, details, service}]}`.
///
/// Steps with a blank title are dropped. Missing details become empty and
/// unknown services collapse to the coordinator service.
pub fn parse_plan_response(raw: &str) -> Result<Vec<PlannedStep>> {
    let parsed: Value = serde_json::from_str(raw)
        .map_err(|e| OrchestratorError::planner(format!("Unable to parse plan response: {e}")))?;
    let Some(candidates) = parsed.get("steps").and_then(Value::as_array) else {
        return Err(OrchestratorError::planner(
            "Unable to parse plan response: Response missing \"steps\" array.",
        ));
    };

    let steps: Vec<PlannedStep> = candidates
        .iter()
        .filter_map(|candidate| {
            let text = |key: &str| candidate.get(key).and_then(Value::as_str);
            let title = text("title")?.trim();
            if title.is_empty() {
                return None;
            }
            Some(PlannedStep {
                title: title.to_string(),
                details: text("details").unwrap_or_default().to_string(),
                service: sanitize_service(text("service").unwrap_or(DEFAULT_SERVICE)).to_string(),
            })
        })
        .collect();

    if steps.is_empty() {
        return Err(OrchestratorError::planner(
            "Unable to parse plan response: No valid steps returned from model.",
        ));
    }
    Ok(steps)
}

/// Gemini `generateContent` over HTTP.
pub struct GeminiPlanner {
    client: reqwest::Client,
    api_key: String,
    model_id: String,
    api_base: String,
}

impl GeminiPlanner {
    pub fn new(api_key: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model_id: model_id.into(),
            api_base: crate::config::DEFAULT_GEMINI_API_BASE.to_string(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// `None` without an API key.
    pub fn from_config(config: &GeminiConfig) -> Option<Self> {
        let api_key = config.api_key.as_deref()?;
        Some(Self::new(api_key, &config.model_id).with_api_base(&config.api_base))
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/{}:generateContent",
            self.api_base.trim_end_matches('/'),
            self.model_id
        )
    }
}

#[async_trait]
impl PlanGenerator for GeminiPlanner {
    async fn generate_plan(&self, description: &str) -> Result<Vec<PlannedStep>> {
        let body = json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": PlannerPrompts::plan(description) }],
            }],
            "generationConfig": {
                "temperature": 0.35,
                "maxOutputTokens": 2048,
                "responseMimeType": "application/json",
            },
        });

        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| OrchestratorError::planner(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(OrchestratorError::planner(format!(
                "Gemini request failed with status {status}: {text}"
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| OrchestratorError::planner(e.to_string()))?;
        let raw = response_text(&payload);
        if raw.trim().is_empty() {
            return Err(OrchestratorError::planner("Gemini returned an empty response."));
        }

        parse_plan_response(raw.trim())
    }
}

/// Concatenated text parts of the first candidate.
fn response_text(payload: &Value) -> String {
    payload
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect::<String>()
        })
        .unwrap_or_default()
}
