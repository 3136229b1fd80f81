//! Gemini API client (https://generativelanguage.googleapis.com/v1beta by default).
//! Non-streaming `generateContent`; the full history is sent on every call.

use crate::llm::{ChatProvider, ProviderError};
use crate::session::{Role, Turn};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Client for the Gemini HTTP API. Holds the API key; model is chosen per call.
#[derive(Clone)]
pub struct GeminiClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, base_url: Option<String>) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string());
        Self {
            base_url,
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Accepts both "gemini-2.0-flash" and "models/gemini-2.0-flash".
    fn model_url(&self, model: &str) -> String {
        let model = model.trim().trim_start_matches("models/");
        format!("{}/models/{}", self.base_url, model)
    }

    async fn error_from(res: reqwest::Response) -> ProviderError {
        let status = res.status().as_u16();
        let body = res.text().await.unwrap_or_default();
        ProviderError::Api { status, body }
    }
}

#[async_trait]
impl ChatProvider for GeminiClient {
    /// GET /models/{model}: succeeds only for an existing model and an accepted key.
    async fn check_model(&self, model: &str) -> Result<(), ProviderError> {
        let res = self
            .client
            .get(self.model_url(model))
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await?;
        if !res.status().is_success() {
            return Err(Self::error_from(res).await);
        }
        Ok(())
    }

    /// POST /models/{model}:generateContent
    async fn generate(&self, model: &str, history: &[Turn]) -> Result<String, ProviderError> {
        let url = format!("{}:generateContent", self.model_url(model));
        let body = GenerateRequest {
            contents: history.iter().map(Content::from).collect(),
        };
        let res = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            return Err(Self::error_from(res).await);
        }
        let data: GenerateResponse = res
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;
        data.reply_text()
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

impl From<&Turn> for Content {
    fn from(turn: &Turn) -> Self {
        let role = match turn.role {
            Role::User => "user",
            Role::Model => "model",
        };
        Self {
            role: Some(role.to_string()),
            parts: vec![Part {
                text: Some(turn.text.clone()),
            }],
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

impl GenerateResponse {
    /// Concatenated text parts of the first candidate.
    fn reply_text(self) -> Result<String, ProviderError> {
        if let Some(reason) = self.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(ProviderError::Malformed(format!("prompt blocked: {}", reason)));
        }
        let candidate = self
            .candidates
            .into_iter()
            .next()
            .ok_or(ProviderError::EmptyReply)?;
        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();
        if text.trim().is_empty() {
            log::debug!(
                "gemini: empty candidate (finish reason {:?})",
                candidate.finish_reason
            );
            return Err(ProviderError::EmptyReply);
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: serde_json::Value) -> GenerateResponse {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn joins_text_parts_of_first_candidate() {
        let res = parse(serde_json::json!({
            "candidates": [
                { "content": { "role": "model", "parts": [{ "text": "hi " }, { "text": "there" }] }, "finishReason": "STOP" },
                { "content": { "role": "model", "parts": [{ "text": "ignored" }] } }
            ]
        }));
        assert_eq!(res.reply_text().unwrap(), "hi there");
    }

    #[test]
    fn no_candidates_is_empty_reply() {
        let res = parse(serde_json::json!({ "candidates": [] }));
        assert!(matches!(res.reply_text(), Err(ProviderError::EmptyReply)));
    }

    #[test]
    fn whitespace_only_reply_is_empty() {
        let res = parse(serde_json::json!({
            "candidates": [{ "content": { "parts": [{ "text": "  \n" }] }, "finishReason": "SAFETY" }]
        }));
        assert!(matches!(res.reply_text(), Err(ProviderError::EmptyReply)));
    }

    #[test]
    fn blocked_prompt_is_malformed() {
        let res = parse(serde_json::json!({ "promptFeedback": { "blockReason": "SAFETY" } }));
        let err = res.reply_text().unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn turns_serialize_with_gemini_roles() {
        let turns = [Turn::user("hello"), Turn::model("hi")];
        let body = GenerateRequest {
            contents: turns.iter().map(Content::from).collect(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "contents": [
                    { "role": "user", "parts": [{ "text": "hello" }] },
                    { "role": "model", "parts": [{ "text": "hi" }] }
                ]
            })
        );
    }

    #[test]
    fn model_prefix_is_normalized() {
        let client = GeminiClient::new("k", Some("http://localhost:1/v1beta/".to_string()));
        assert_eq!(
            client.model_url("models/gemini-2.0-flash"),
            "http://localhost:1/v1beta/models/gemini-2.0-flash"
        );
    }
}
