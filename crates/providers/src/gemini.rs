//! REST client for the Gemini `generateContent` endpoint.
//!
//! One client serves both the describe stage (text out, one image in) and
//! the render stage (image out via `responseModalities: ["IMAGE"]`). Images
//! travel as base64 `inlineData` parts in both directions.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::{json, Value};
use sparkit_core::request::Asset;

use crate::error::ProviderError;
use crate::generate::{ImageGenerator, ImageOptions, TextGenerator, TextOptions};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default model for the describe stage.
pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.5-flash";

/// Default model for rendering.
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";

/// Default per-call timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Candidate finish reasons that mean the output was withheld for policy reasons.
const BLOCKED_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "RECITATION",
    "PROHIBITED_CONTENT",
    "BLOCKLIST",
    "SPII",
    "IMAGE_SAFETY",
];

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Gemini client configuration.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: String,
    pub text_model: String,
    pub image_model: String,
    pub timeout_secs: u64,
}

impl GeminiConfig {
    /// Load configuration from environment variables.
    ///
    /// Returns `None` when `GEMINI_API_KEY` is unset or empty.
    ///
    /// | Env Var               | Default                                               |
    /// |-----------------------|-------------------------------------------------------|
    /// | `GEMINI_API_KEY`      | (required)                                            |
    /// | `GEMINI_BASE_URL`     | `https://generativelanguage.googleapis.com/v1beta`    |
    /// | `GEMINI_TEXT_MODEL`   | `gemini-2.5-flash`                                    |
    /// | `GEMINI_IMAGE_MODEL`  | `gemini-2.5-flash-image`                              |
    /// | `GEMINI_TIMEOUT_SECS` | `120`                                                 |
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())?;

        let timeout_secs: u64 = std::env::var("GEMINI_TIMEOUT_SECS")
            .unwrap_or_else(|_| DEFAULT_TIMEOUT_SECS.to_string())
            .parse()
            .expect("GEMINI_TIMEOUT_SECS must be a valid u64");

        Some(Self {
            api_key,
            base_url: std::env::var("GEMINI_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.into()),
            text_model: std::env::var("GEMINI_TEXT_MODEL")
                .unwrap_or_else(|_| DEFAULT_TEXT_MODEL.into()),
            image_model: std::env::var("GEMINI_IMAGE_MODEL")
                .unwrap_or_else(|_| DEFAULT_IMAGE_MODEL.into()),
            timeout_secs,
        })
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    text: Option<String>,
    #[serde(alias = "inline_data")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(alias = "mime_type")]
    mime_type: Option<String>,
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// HTTP client for the Gemini generative language API.
pub struct GeminiClient {
    client: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    fn endpoint(&self, model: &str) -> String {
        let model = model.trim();
        let path = if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{model}")
        };
        format!("{}/{path}:generateContent", self.config.base_url)
    }

    async fn generate_content(
        &self,
        model: &str,
        body: &Value,
    ) -> Result<GenerateContentResponse, ProviderError> {
        let response = self
            .client
            .post(self.endpoint(model))
            .header("x-goog-api-key", &self.config.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ProviderError::Decode(e.to_string()))
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate_text(
        &self,
        prompt: &str,
        image: Option<&Asset>,
        options: &TextOptions,
    ) -> Result<String, ProviderError> {
        let mut parts: Vec<Value> = image.into_iter().map(inline_part).collect();
        parts.push(json!({ "text": prompt }));

        let mut generation_config = serde_json::Map::new();
        if let Some(t) = options.temperature {
            generation_config.insert("temperature".into(), json!(t));
        }
        if let Some(n) = options.max_output_tokens {
            generation_config.insert("maxOutputTokens".into(), json!(n));
        }

        let body = json!({
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": generation_config,
        });

        let started = std::time::Instant::now();
        let response = self.generate_content(&self.config.text_model, &body).await?;
        tracing::debug!(
            model = %self.config.text_model,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Gemini text generation finished",
        );
        text_from_response(response)
    }
}

#[async_trait]
impl ImageGenerator for GeminiClient {
    async fn generate_image(
        &self,
        prompt: &str,
        images: &[Asset],
        options: &ImageOptions,
    ) -> Result<Asset, ProviderError> {
        let mut parts: Vec<Value> = images.iter().map(inline_part).collect();
        parts.push(json!({ "text": prompt }));

        let mut image_config = serde_json::Map::new();
        if let Some(ratio) = &options.aspect_ratio {
            image_config.insert("aspectRatio".into(), json!(ratio));
        }
        if let Some(size) = &options.resolution {
            image_config.insert("imageSize".into(), json!(size));
        }

        let body = json!({
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": {
                "responseModalities": ["IMAGE"],
                "imageConfig": image_config,
            },
        });

        let started = std::time::Instant::now();
        let response = self.generate_content(&self.config.image_model, &body).await?;
        tracing::debug!(
            model = %self.config.image_model,
            references = images.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Gemini image generation finished",
        );
        image_from_response(response)
    }
}

// ---------------------------------------------------------------------------
// Response handling
// ---------------------------------------------------------------------------

fn inline_part(asset: &Asset) -> Value {
    json!({
        "inlineData": {
            "mimeType": asset.media_type,
            "data": BASE64.encode(&asset.bytes),
        }
    })
}

/// Fail with `ContentBlocked` when the prompt or every candidate was blocked.
fn check_blocked(response: &GenerateContentResponse) -> Result<(), ProviderError> {
    if let Some(reason) = response
        .prompt_feedback
        .as_ref()
        .and_then(|f| f.block_reason.as_deref())
    {
        return Err(ProviderError::ContentBlocked {
            reason: reason.to_string(),
        });
    }

    let blocked = response.candidates.iter().find_map(|c| {
        c.finish_reason
            .as_deref()
            .filter(|r| BLOCKED_FINISH_REASONS.contains(r))
    });
    let has_content = response
        .candidates
        .iter()
        .any(|c| c.content.as_ref().is_some_and(|content| !content.parts.is_empty()));

    match blocked {
        Some(reason) if !has_content => Err(ProviderError::ContentBlocked {
            reason: reason.to_string(),
        }),
        _ => Ok(()),
    }
}

fn text_from_response(response: GenerateContentResponse) -> Result<String, ProviderError> {
    check_blocked(&response)?;

    let text: String = response
        .candidates
        .into_iter()
        .filter_map(|c| c.content)
        .flat_map(|c| c.parts)
        .filter_map(|p| p.text)
        .collect();

    if text.trim().is_empty() {
        return Err(ProviderError::EmptyResponse { expected: "text" });
    }
    Ok(text)
}

fn image_from_response(response: GenerateContentResponse) -> Result<Asset, ProviderError> {
    check_blocked(&response)?;

    let inline = response
        .candidates
        .into_iter()
        .filter_map(|c| c.content)
        .flat_map(|c| c.parts)
        .filter_map(|p| p.inline_data)
        .find(|d| !d.data.is_empty())
        .ok_or(ProviderError::EmptyResponse { expected: "image" })?;

    let bytes = BASE64
        .decode(inline.data.as_bytes())
        .map_err(|e| ProviderError::Decode(format!("image base64: {e}")))?;
    let media_type = inline.mime_type.unwrap_or_else(|| "image/png".to_string());
    Ok(Asset::new(bytes, media_type))
}
