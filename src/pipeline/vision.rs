//! Vision-model signature detector.
//!
//! Sends the page image to a vision-language model through `edgequake-llm`
//! and asks for signature boxes as JSON. All prompt text lives in
//! [`crate::prompts`].
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 503 errors from vision APIs are transient and frequent when a
//! batch of documents is analysed concurrently. Exponential backoff
//! (`retry_backoff_ms * 2^attempt`) spreads the retries: with 500 ms base and
//! 2 retries the wait sequence is 500 ms → 1 s. An answer that is not valid
//! JSON is not retried; the page simply gets no automatic boxes.

use super::detect::SignatureDetector;
use super::encode::{encode_page, MAX_MODEL_EDGE};
use crate::config::RedactConfig;
use crate::error::{DetectionError, RedactError};
use crate::geometry::PixelDetection;
use crate::prompts::{detection_request, SIGNATURE_DETECTION_PROMPT};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use image::DynamicImage;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

/// Model used when a provider is named without one.
pub const DEFAULT_VISION_MODEL: &str = "gpt-4.1-mini";

/// Confidence assumed when the model omits it.
const DEFAULT_CONFIDENCE: f64 = 0.5;

/// [`SignatureDetector`] backed by a vision-language model.
pub struct VisionDetector {
    provider: Arc<dyn LLMProvider>,
    temperature: f32,
    max_tokens: usize,
    max_retries: u32,
    retry_backoff_ms: u64,
}

impl std::fmt::Debug for VisionDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisionDetector")
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl VisionDetector {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &RedactConfig) -> Self {
        Self {
            provider,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
        }
    }

    /// Build a detector from the provider settings in `config`.
    pub fn from_config(config: &RedactConfig) -> Result<Self, RedactError> {
        let provider = resolve_provider(config)?;
        Ok(Self::new(provider, config))
    }

    fn build_options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }
}

#[async_trait]
impl SignatureDetector for VisionDetector {
    async fn detect(&self, image: &DynamicImage) -> Result<Vec<PixelDetection>, DetectionError> {
        let start = Instant::now();
        let encoded =
            encode_page(image, MAX_MODEL_EDGE).map_err(|e| DetectionError::Decode(e.to_string()))?;

        let request = detection_request(encoded.sent_width, encoded.sent_height);
        let messages = vec![
            ChatMessage::system(SIGNATURE_DETECTION_PROMPT),
            ChatMessage::user_with_images(&request, vec![encoded.data.clone()]),
        ];
        let options = self.build_options();

        let mut last_err: Option<String> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = backoff_ms(self.retry_backoff_ms, attempt);
                warn!(
                    "Vision detector: retry {}/{} after {}ms",
                    attempt, self.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match self.provider.chat(&messages, Some(&options)).await {
                Ok(response) => {
                    debug!(
                        "Vision detector: {} input tokens, {} output tokens, {:?}",
                        response.prompt_tokens,
                        response.completion_tokens,
                        start.elapsed()
                    );
                    let detections = parse_detections(&response.content)?;
                    return Ok(detections
                        .into_iter()
                        .map(|d| encoded.rescale(d))
                        .collect());
                }
                Err(e) => {
                    let err_msg = format!("{}", e);
                    warn!("Vision detector: attempt {} failed — {}", attempt + 1, err_msg);
                    last_err = Some(err_msg);
                }
            }
        }

        Err(DetectionError::Backend {
            retries: self.max_retries,
            detail: last_err.unwrap_or_else(|| "Unknown error".to_string()),
        })
    }

    fn name(&self) -> &str {
        "vision"
    }
}

/// Wait before retry number `attempt` (1-based), doubling from `base`.
/// Saturates instead of overflowing for large retry counts.
fn backoff_ms(base: u64, attempt: u32) -> u64 {
    base.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
}

// ── Answer parsing ───────────────────────────────────────────────────────────

static RE_CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[a-zA-Z]*\s*\n?(.*?)\n?```$").unwrap());

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Answer {
    Wrapped { signatures: Vec<RawDetection> },
    Bare(Vec<RawDetection>),
}

#[derive(Debug, Deserialize)]
struct RawDetection {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
    #[serde(default = "default_confidence")]
    confidence: f64,
}

fn default_confidence() -> f64 {
    DEFAULT_CONFIDENCE
}

/// Parse the model's answer into pixel detections.
///
/// Accepts `{"signatures": [...]}` or a bare array, optionally inside a
/// Markdown code fence.
pub fn parse_detections(answer: &str) -> Result<Vec<PixelDetection>, DetectionError> {
    let trimmed = answer.trim();
    let body = match RE_CODE_FENCE.captures(trimmed) {
        Some(caps) => caps.get(1).map_or("", |m| m.as_str()).trim(),
        None => trimmed,
    };

    let parsed: Answer =
        serde_json::from_str(body).map_err(|e| DetectionError::Parse(e.to_string()))?;
    let raw = match parsed {
        Answer::Wrapped { signatures } => signatures,
        Answer::Bare(list) => list,
    };

    Ok(raw
        .into_iter()
        .map(|r| PixelDetection {
            x1: r.x1,
            y1: r.y1,
            x2: r.x2,
            y2: r.y2,
            confidence: r.confidence,
        })
        .collect())
}

// ── Provider resolution ──────────────────────────────────────────────────────

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, RedactError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        RedactError::InvalidConfig(format!(
            "vision provider '{provider_name}' is not configured: {e}"
        ))
    })
}

/// Resolve the vision provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider + model** (`config.provider_name`); the factory reads
///    the matching API key (`OPENAI_API_KEY`, etc.) from the environment.
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`).
/// 4. **OpenAI** when `OPENAI_API_KEY` is set.
/// 5. **Full auto-detection** (`ProviderFactory::from_env`).
pub fn resolve_provider(config: &RedactConfig) -> Result<Arc<dyn LLMProvider>, RedactError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_VISION_MODEL);
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_VISION_MODEL);
            return create_vision_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) = ProviderFactory::from_env().map_err(|e| {
        RedactError::InvalidConfig(format!(
            "No vision provider could be auto-detected from environment. \
             Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider. Error: {e}"
        ))
    })?;

    Ok(llm_provider)
}
