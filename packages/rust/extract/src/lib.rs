//! Structured extraction of schema fields from page text.
//!
//! The [`Extractor`] trait is the seam the crawl orchestrator calls per
//! (field, page). [`OpenAiExtractor`] implements it against any
//! OpenAI-compatible chat-completions endpoint: scalar fields come back as
//! plain text, list fields as a JSON object with an `items` array that is
//! coerced to the field's item shape.

pub mod prompt;

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use orgscout_schema::{FieldKind, FieldSpec};
use orgscout_shared::{FieldValue, Result, ScoutError};

pub use prompt::{build_prompt, coerce_items};

/// Default timeout for one extraction call.
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Converts page text into a value of a field's declared shape.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, field: &FieldSpec, text: &str) -> Result<FieldValue>;
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

// ---------------------------------------------------------------------------
// OpenAiExtractor
// ---------------------------------------------------------------------------

/// Extractor backed by an OpenAI-compatible chat-completions API.
pub struct OpenAiExtractor {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiExtractor {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| ScoutError::Extraction(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    async fn complete(&self, user_prompt: &str, json_mode: bool) -> Result<String> {
        let start = Instant::now();
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                Message {
                    role: "system",
                    content: prompt::SYSTEM_PROMPT,
                },
                Message {
                    role: "user",
                    content: user_prompt,
                },
            ],
            temperature: 0.0,
            response_format: json_mode.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ScoutError::Extraction(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, error = %body, "extraction API error");
            return Err(ScoutError::Extraction(format!("HTTP {status}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ScoutError::Extraction(format!("malformed response: {e}")))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ScoutError::Extraction("no completion returned".into()))?;

        debug!(
            model = %self.model,
            duration_ms = start.elapsed().as_millis(),
            "chat completion"
        );
        Ok(content)
    }
}

#[async_trait]
impl Extractor for OpenAiExtractor {
    #[instrument(skip_all, fields(field = %field.name, chars = text.len()))]
    async fn extract(&self, field: &FieldSpec, text: &str) -> Result<FieldValue> {
        let user_prompt = build_prompt(field, text);

        match &field.kind {
            FieldKind::ScalarText => {
                let content = self.complete(&user_prompt, false).await?;
                let value = content.trim();
                if value.is_empty() {
                    return Err(ScoutError::Extraction(format!(
                        "{}: empty completion",
                        field.name
                    )));
                }
                Ok(FieldValue::Text(value.to_string()))
            }
            FieldKind::ListOfRecords(shape) => {
                let content = self.complete(&user_prompt, true).await?;
                let json = serde_json::from_str(prompt::strip_code_fence(&content)).map_err(
                    |e| ScoutError::Extraction(format!("{}: response is not JSON: {e}", field.name)),
                )?;
                let items = coerce_items(&field.name, shape, json)?;
                debug!(items = items.len(), "items extracted");
                Ok(FieldValue::Items(items))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orgscout_schema::{DomainSet, Schema};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn schema() -> Schema {
        Schema::parse(
            r#"{
                "professors": {"type": "array", "items": {"name": "string", "department": "string?"}},
                "admissionsFocus": {"type": "string"}
            }"#,
            DomainSet::new(),
        )
        .unwrap()
    }

    fn completion(content: &str) -> serde_json::Value {
        serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": content } }]
        })
    }

    #[tokio::test]
    async fn scalar_field_returns_trimmed_text() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer sk-test"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(completion("  Holistic review; test-optional.  ")),
            )
            .mount(&server)
            .await;

        let extractor =
            OpenAiExtractor::new(format!("{}/v1/", server.uri()), "sk-test", "gpt-4o").unwrap();
        let schema = schema();
        let value = extractor
            .extract(schema.field("admissionsFocus").unwrap(), "page text")
            .await
            .unwrap();

        assert_eq!(value, FieldValue::Text("Holistic review; test-optional.".into()));
    }

    #[tokio::test]
    async fn list_field_uses_json_mode_and_coerces() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-4o",
                "response_format": { "type": "json_object" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(
                r#"{"items": [{"name": "Ada Lovelace", "department": "Math"}, {"department": "CS"}]}"#,
            )))
            .mount(&server)
            .await;

        let extractor =
            OpenAiExtractor::new(format!("{}/v1", server.uri()), "sk-test", "gpt-4o").unwrap();
        let schema = schema();
        let value = extractor
            .extract(schema.field("professors").unwrap(), "faculty page")
            .await
            .unwrap();

        let FieldValue::Items(items) = value else {
            panic!("expected items");
        };
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["name"], "Ada Lovelace");
    }

    #[tokio::test]
    async fn api_error_is_extraction_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let extractor = OpenAiExtractor::new(server.uri(), "sk-test", "gpt-4o").unwrap();
        let schema = schema();
        let err = extractor
            .extract(schema.field("admissionsFocus").unwrap(), "text")
            .await
            .unwrap_err();
        assert!(matches!(err, ScoutError::Extraction(_)));
    }

    #[tokio::test]
    async fn non_json_list_response_fails() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("Sorry, no.")))
            .mount(&server)
            .await;

        let extractor = OpenAiExtractor::new(server.uri(), "sk-test", "gpt-4o").unwrap();
        let schema = schema();
        let err = extractor
            .extract(schema.field("professors").unwrap(), "text")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not JSON"));
    }

    #[tokio::test]
    async fn empty_scalar_completion_fails() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("   ")))
            .mount(&server)
            .await;

        let extractor = OpenAiExtractor::new(server.uri(), "sk-test", "gpt-4o").unwrap();
        let schema = schema();
        assert!(
            extractor
                .extract(schema.field("admissionsFocus").unwrap(), "text")
                .await
                .is_err()
        );
    }
}
