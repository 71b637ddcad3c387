//! HTTP client for OpenAI-compatible chat completion endpoints.

use std::sync::Mutex;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::config::ApiConfig;
use crate::error::LlmError;
use crate::llm::{GenerationParams, TextGenerator};

/// Responses shorter than this (trimmed, in chars) are rejected as
/// degenerate rather than merged into the document.
const MIN_CONTENT_CHARS: usize = 100;

/// Ordered JSON-pointer paths tried against the response body. Different
/// gateway deployments of the same nominal API disagree on shape.
const EXTRACTION_PATHS: &[&str] = &[
    "/choices/0/message/content",
    "/choices/0/text",
    "/content",
    "/data",
    "/response",
];

/// Phrases that mark a reply as a policy refusal rather than story text.
const REFUSAL_PHRASES: &[&str] = &[
    "i cannot fulfill",
    "i can't assist",
    "i cannot assist",
    "i'm sorry, but i can",
    "as an ai language model",
    "i am unable to",
    "我不能协助",
    "无法完成这个请求",
    "抱歉，我不能",
];

/// Generation client for one remote endpoint.
///
/// The underlying `reqwest::Client` is created lazily on first use and
/// reused for connection pooling; if construction ever fails it is retried
/// on the next call.
pub struct HttpTextGenerator {
    base_url: String,
    api_key: SecretString,
    timeout: Duration,
    http: Mutex<Option<reqwest::Client>>,
}

impl HttpTextGenerator {
    pub fn new(api: &ApiConfig) -> Self {
        Self {
            base_url: api.base_url.clone(),
            api_key: api.api_key.clone(),
            timeout: api.request_timeout,
            http: Mutex::new(None),
        }
    }

    fn http(&self) -> Result<reqwest::Client, LlmError> {
        let mut guard = self
            .http
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(client) = guard.as_ref() {
            return Ok(client.clone());
        }
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| LlmError::Transport(e.to_string()))?;
        *guard = Some(client.clone());
        Ok(client)
    }

    async fn post(&self, body: Value) -> Result<Value, LlmError> {
        let response = self
            .http()?
            .post(&self.base_url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "generation endpoint returned error status");
            return Err(LlmError::Server {
                status: status.as_u16(),
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| LlmError::Parse {
                detail: e.to_string(),
            })
    }
}

#[async_trait::async_trait]
impl TextGenerator for HttpTextGenerator {
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String, LlmError> {
        let body = json!({
            "model": params.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": params.temperature,
            "top_p": params.top_p,
            "max_tokens": params.max_tokens,
            "presence_penalty": 0.3,
            "frequency_penalty": 0.3,
        });

        let response = self.post(body).await?;
        let text = extract_text(&response).ok_or_else(|| LlmError::Parse {
            detail: "no recognized text field in response".to_string(),
        })?;
        debug!(bytes = text.len(), "received generation response");
        classify(text)
    }

    async fn is_alive(&self) -> bool {
        let probe = json!({
            "model": "",
            "messages": [{"role": "user", "content": "ping"}],
            "max_tokens": 1,
        });
        // Any HTTP answer at all means the endpoint is reachable; only a
        // transport failure counts as dead.
        match self.post(probe).await {
            Ok(_) | Err(LlmError::Server { .. }) | Err(LlmError::Parse { .. }) => true,
            Err(_) => false,
        }
    }
}

/// Pull the response text out of whichever shape the endpoint used.
fn extract_text(response: &Value) -> Option<&str> {
    EXTRACTION_PATHS
        .iter()
        .find_map(|path| response.pointer(path)?.as_str())
}

/// Reject degenerate replies; return the raw text otherwise.
fn classify(text: &str) -> Result<String, LlmError> {
    let trimmed = text.trim();
    let len = trimmed.chars().count();
    if len < MIN_CONTENT_CHARS {
        return Err(LlmError::TooShort { len });
    }

    // Refusals open with the refusal, so only the head needs scanning.
    let head: String = trimmed.chars().take(300).collect::<String>().to_lowercase();
    if REFUSAL_PHRASES.iter().any(|p| head.contains(p)) {
        return Err(LlmError::Refusal);
    }

    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long_story() -> String {
        "The night wind came down from the pass and rattled every shutter on the street. "
            .repeat(5)
    }

    #[test]
    fn extracts_chat_completion_shape() {
        let body = json!({"choices": [{"message": {"content": "story text"}}]});
        assert_eq!(extract_text(&body), Some("story text"));
    }

    #[test]
    fn extracts_legacy_completion_shape() {
        let body = json!({"choices": [{"text": "story text"}]});
        assert_eq!(extract_text(&body), Some("story text"));
    }

    #[test]
    fn extracts_flat_shapes_in_order() {
        assert_eq!(extract_text(&json!({"content": "a"})), Some("a"));
        assert_eq!(extract_text(&json!({"data": "b"})), Some("b"));
        assert_eq!(extract_text(&json!({"response": "c"})), Some("c"));
        // The chat shape wins over a flat field when both exist.
        let both = json!({"content": "flat", "choices": [{"message": {"content": "chat"}}]});
        assert_eq!(extract_text(&both), Some("chat"));
    }

    #[test]
    fn unknown_shape_yields_none() {
        assert_eq!(extract_text(&json!({"result": {"output": "x"}})), None);
        assert_eq!(extract_text(&json!({"choices": []})), None);
    }

    #[test]
    fn short_reply_is_too_short() {
        match classify("Okay.") {
            Err(LlmError::TooShort { len }) => assert_eq!(len, 5),
            other => panic!("expected TooShort, got {other:?}"),
        }
    }

    #[test]
    fn refusal_phrases_detected() {
        let refusal = format!("I'm sorry, but I can't assist with that request. {}", long_story());
        assert!(matches!(classify(&refusal), Err(LlmError::Refusal)));
    }

    #[test]
    fn refusal_phrase_deep_in_story_is_fine() {
        let story = format!("{} \"As an AI language model,\" the robot recited flatly.", long_story());
        assert!(classify(&story).is_ok());
    }

    #[test]
    fn valid_story_text_passes_trimmed() {
        let story = format!("  {}  ", long_story());
        let out = classify(&story).unwrap();
        assert_eq!(out, long_story().trim());
    }
}
