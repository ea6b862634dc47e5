use std::future::Future;
use std::pin::Pin;

use anyhow::{anyhow, Result};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, error, warn};

use crate::config::{
    ANALYSIS_PROMPT_TEMPLATE, ANALYSIS_SYSTEM_PROMPT, CONFIG, MISSING_FIELD_PLACEHOLDER,
    MISSING_TRAITS_PLACEHOLDER,
};
use crate::utils::http::get_http_client;
use crate::utils::timing::log_llm_timing;

/// A failed analysis. The message is for the logs only; callers show the
/// generic request-failure text instead.
#[derive(Debug, thiserror::Error)]
#[error("Analysis request failed: {0}")]
pub struct AnalysisError(pub String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub mime_type: String,
    pub encoded_image: String,
    pub name: String,
    pub age: String,
    pub traits: String,
}

impl AnalysisRequest {
    pub fn prompt(&self) -> String {
        build_analysis_prompt(&self.name, &self.age, &self.traits)
    }
}

pub type AnalysisFuture = Pin<Box<dyn Future<Output = Result<String, AnalysisError>> + Send>>;

pub trait AnalysisBackend: Send + Sync + 'static {
    fn analyze(&self, request: AnalysisRequest) -> AnalysisFuture;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    prompt_feedback: Option<GeminiPromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    parts: Option<Vec<GeminiPart>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
        #[serde(default)]
        thought: bool,
    },
    #[allow(dead_code)]
    Other(Value),
}

fn field_or_placeholder<'a>(value: &'a str, placeholder: &'a str) -> &'a str {
    if value.trim().is_empty() {
        placeholder
    } else {
        value
    }
}

pub fn build_analysis_prompt(name: &str, age: &str, traits: &str) -> String {
    ANALYSIS_PROMPT_TEMPLATE
        .replace("{name}", field_or_placeholder(name, MISSING_FIELD_PLACEHOLDER))
        .replace("{age}", field_or_placeholder(age, MISSING_FIELD_PLACEHOLDER))
        .replace(
            "{traits}",
            field_or_placeholder(traits, MISSING_TRAITS_PLACEHOLDER),
        )
}

fn build_analysis_payload(request: &AnalysisRequest) -> Value {
    json!({
        "systemInstruction": { "parts": [{ "text": ANALYSIS_SYSTEM_PROMPT }] },
        "contents": [{
            "role": "user",
            "parts": [
                {
                    "inlineData": {
                        "mimeType": request.mime_type,
                        "data": request.encoded_image
                    }
                },
                { "text": request.prompt() }
            ]
        }],
    })
}

fn redact_api_key(text: &str, key: &str) -> String {
    let key = key.trim();
    if key.is_empty() {
        return text.to_string();
    }
    text.replace(key, "[redacted]")
}

fn truncate_for_log(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let truncated: String = value.chars().take(limit).collect();
    format!("{truncated}... (truncated)")
}

fn summarize_payload(payload: &Value) -> Value {
    let parts = payload
        .pointer("/contents/0/parts")
        .and_then(|value| value.as_array())
        .map(|parts| {
            parts
                .iter()
                .map(|part| {
                    if let Some(text) = part.get("text").and_then(|value| value.as_str()) {
                        json!({ "text": truncate_for_log(text, 200) })
                    } else if let Some(inline_data) = part.get("inlineData") {
                        let mime_type = inline_data
                            .get("mimeType")
                            .and_then(|value| value.as_str())
                            .unwrap_or("unknown");
                        let data_len = inline_data
                            .get("data")
                            .and_then(|value| value.as_str())
                            .map(|value| value.len())
                            .unwrap_or(0);
                        json!({ "inlineData": { "mimeType": mime_type, "dataLen": data_len } })
                    } else {
                        json!({ "unknownPart": true })
                    }
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    let mut summary = Map::new();
    summary.insert(
        "systemInstruction".to_string(),
        Value::String("analysis_system_prompt".to_string()),
    );
    summary.insert("parts".to_string(), Value::Array(parts));
    Value::Object(summary)
}

fn summarize_error_body(body: &str) -> (Option<String>, String) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return (None, "empty response body".to_string());
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        let message = value
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .map(|v| v.to_string())
            .or_else(|| {
                value
                    .get("message")
                    .and_then(|v| v.as_str())
                    .map(|v| v.to_string())
            });
        return (message, truncate_for_log(&value.to_string(), 2000));
    }

    (None, truncate_for_log(trimmed, 2000))
}

/// Concatenates the visible text parts of the first candidate. Blocked or
/// text-less responses are errors.
fn extract_text_from_response(response: GeminiResponse) -> Result<String> {
    if let Some(reason) = response
        .prompt_feedback
        .and_then(|feedback| feedback.block_reason)
    {
        return Err(anyhow!("Gemini blocked the prompt: {reason}"));
    }

    let candidate = response
        .candidates
        .unwrap_or_default()
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("Gemini response contained no candidates"))?;
    let finish_reason = candidate.finish_reason.clone();

    let text: String = candidate
        .content
        .and_then(|content| content.parts)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|part| match part {
            GeminiPart::Text { text, thought } if !thought => Some(text),
            _ => None,
        })
        .collect();

    if text.trim().is_empty() {
        return Err(anyhow!(
            "Gemini response contained no text (finish_reason={})",
            finish_reason.unwrap_or_else(|| "unknown".to_string())
        ));
    }
    Ok(text)
}

#[derive(Debug, Clone)]
pub struct GeminiAnalyzer {
    api_base: String,
    api_key: String,
    model: String,
}

impl GeminiAnalyzer {
    pub fn new(api_base: &str, api_key: &str, model: &str) -> Self {
        GeminiAnalyzer {
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.trim().to_string(),
            model: model.to_string(),
        }
    }

    pub fn from_config() -> Self {
        Self::new(
            &CONFIG.gemini_api_base,
            &CONFIG.gemini_api_key,
            &CONFIG.gemini_model,
        )
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.api_base, self.model
        )
    }

    async fn call_gemini_api(&self, payload: &Value) -> Result<GeminiResponse> {
        if self.api_key.is_empty() {
            return Err(anyhow!("GEMINI_API_KEY is not configured"));
        }

        if tracing::enabled!(tracing::Level::DEBUG) {
            debug!(target: "llm.gemini", model = %self.model, payload = %summarize_payload(payload));
        }

        let response = get_http_client()
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(payload)
            .send()
            .await
            .map_err(|err| {
                let err_text = redact_api_key(&err.to_string(), &self.api_key);
                warn!(
                    "Gemini request failed to send: {} (timeout={}, connect={})",
                    err_text,
                    err.is_timeout(),
                    err.is_connect()
                );
                anyhow!("Gemini request failed: {}", err_text)
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let (message, body_summary) = summarize_error_body(&body);
            warn!("Gemini API error: status={}, body={}", status, body_summary);
            let detail = message.unwrap_or(body_summary);
            return Err(anyhow!(
                "Gemini request failed with status {}: {}",
                status,
                detail
            ));
        }

        let value = response
            .json::<GeminiResponse>()
            .await
            .map_err(|err| anyhow!("Gemini response could not be decoded: {err}"))?;
        Ok(value)
    }

    pub async fn generate(&self, request: &AnalysisRequest) -> Result<String> {
        let payload = build_analysis_payload(request);
        let metadata = json!({
            "mimeType": request.mime_type,
            "imageLen": request.encoded_image.len(),
        });

        log_llm_timing("gemini", &self.model, "analyze_photo", Some(metadata), || async {
            let response = self.call_gemini_api(&payload).await?;
            extract_text_from_response(response)
        })
        .await
    }
}

impl AnalysisBackend for GeminiAnalyzer {
    fn analyze(&self, request: AnalysisRequest) -> AnalysisFuture {
        let analyzer = self.clone();
        Box::pin(async move {
            analyzer.generate(&request).await.map_err(|err| {
                let detail = redact_api_key(&format!("{err:#}"), &analyzer.api_key);
                error!("Gemini analysis failed: {}", detail);
                AnalysisError(detail)
            })
        })
    }
}
