//! Configuration types for the signature redaction pipeline.
//!
//! All pipeline behaviour is controlled through [`RedactConfig`], built via
//! its [`RedactConfigBuilder`]. One struct for every knob keeps the service
//! instance, the HTTP layer and the CLI in agreement about defaults.

use crate::error::RedactError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for a [`crate::service::Redactor`].
///
/// Built via [`RedactConfig::builder()`] or using [`RedactConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_sigredact::{CollisionPolicy, RedactConfig};
///
/// let config = RedactConfig::builder()
///     .dpi(200)
///     .workspace_ttl_secs(900)
///     .collision_policy(CollisionPolicy::Suffix)
///     .build()
///     .unwrap();
/// assert_eq!(config.dpi, 200);
/// ```
#[derive(Clone)]
pub struct RedactConfig {
    /// Rendering DPI used when rasterising each PDF page. Range: 72–400. Default: 150.
    ///
    /// The redacted output is made of these rasters, so this is also the
    /// resolution of the returned documents. 150 DPI keeps scanned text
    /// legible while a 20-page batch stays in the tens of megabytes.
    pub dpi: u32,

    /// Maximum rendered image dimension (width or height) in pixels. Default: 4000.
    ///
    /// A safety cap independent of DPI: a 300-DPI render of an A0 poster
    /// would otherwise produce a 10 000 × 14 000 px raster.
    pub max_rendered_pixels: u32,

    /// Documents processed concurrently within one batch. Default: 4.
    pub concurrency: usize,

    /// Parent directory for the workspace store. Default: system temp dir.
    pub workspace_root: Option<PathBuf>,

    /// Age after which an unconfirmed workspace is swept. Default: 3600.
    pub workspace_ttl_secs: u64,

    /// How often the server runs the expiry sweep. Default: 300.
    pub sweep_interval_secs: u64,

    /// Opaque RGB colour painted over confirmed regions. Default: black.
    pub fill_color: [u8; 3],

    /// What to do when two documents of a batch share a display name.
    pub collision_policy: CollisionPolicy,

    /// Detections scoring below this value are not reported. Default: 0.0.
    pub min_confidence: f64,

    /// Upper bound for a single detector call in seconds. Default: 60.
    pub detection_timeout_secs: u64,

    /// Maximum accepted request body for uploads, in bytes. Default: 100 MiB.
    pub max_upload_bytes: usize,

    /// Route prefix used to build each page's `image_reference`.
    /// Default: `/api/redact/pages`.
    pub image_route_prefix: String,

    /// PDF user password for encrypted uploads.
    pub password: Option<String>,

    /// Explicit path to the pdfium shared library. Falls back to
    /// `PDFIUM_LIB_PATH`, then to the system library.
    pub pdfium_lib_path: Option<PathBuf>,

    // ── Vision detector ───────────────────────────────────────────────────
    /// Vision model identifier, e.g. "gpt-4.1-mini". If None, uses provider default.
    pub model: Option<String>,

    /// Vision provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for detection prompts. Default: 0.0.
    pub temperature: f32,

    /// Maximum tokens the model may generate per page. Default: 1024.
    pub max_tokens: usize,

    /// Maximum retry attempts on a transient detector failure. Default: 2.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    pub retry_backoff_ms: u64,

    /// Optional progress callback for per-document events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for RedactConfig {
    fn default() -> Self {
        Self {
            dpi: 150,
            max_rendered_pixels: 4000,
            concurrency: 4,
            workspace_root: None,
            workspace_ttl_secs: 3600,
            sweep_interval_secs: 300,
            fill_color: [0, 0, 0],
            collision_policy: CollisionPolicy::default(),
            min_confidence: 0.0,
            detection_timeout_secs: 60,
            max_upload_bytes: 100 * 1024 * 1024,
            image_route_prefix: "/api/redact/pages".to_string(),
            password: None,
            pdfium_lib_path: None,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.0,
            max_tokens: 1024,
            max_retries: 2,
            retry_backoff_ms: 500,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for RedactConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedactConfig")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("concurrency", &self.concurrency)
            .field("workspace_root", &self.workspace_root)
            .field("workspace_ttl_secs", &self.workspace_ttl_secs)
            .field("fill_color", &self.fill_color)
            .field("collision_policy", &self.collision_policy)
            .field("min_confidence", &self.min_confidence)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl RedactConfig {
    /// Create a new builder for `RedactConfig`.
    pub fn builder() -> RedactConfigBuilder {
        RedactConfigBuilder {
            config: Self::default(),
        }
    }

    /// Check the constraints [`RedactConfigBuilder::build`] enforces.
    ///
    /// Needed for configurations written as struct literals, which never
    /// pass through the builder.
    pub fn validate(&self) -> Result<(), RedactError> {
        if self.dpi < 72 || self.dpi > 400 {
            return Err(RedactError::InvalidConfig(format!(
                "DPI must be 72–400, got {}",
                self.dpi
            )));
        }
        if self.concurrency == 0 {
            return Err(RedactError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(RedactError::InvalidConfig(format!(
                "min_confidence must be within 0–1, got {}",
                self.min_confidence
            )));
        }
        if self.workspace_ttl_secs == 0 {
            return Err(RedactError::InvalidConfig(
                "Workspace TTL must be ≥ 1 second".into(),
            ));
        }
        if self.detection_timeout_secs == 0 {
            return Err(RedactError::InvalidConfig(
                "Detection timeout must be ≥ 1 second".into(),
            ));
        }
        Ok(())
    }

    /// `image_reference` for page `index` of workspace `id`.
    pub fn image_reference(&self, id: impl fmt::Display, index: usize) -> String {
        format!(
            "{}/{}/{}",
            self.image_route_prefix.trim_end_matches('/'),
            id,
            index
        )
    }
}

/// Builder for [`RedactConfig`].
#[derive(Debug)]
pub struct RedactConfigBuilder {
    config: RedactConfig,
}

impl RedactConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn workspace_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.workspace_root = Some(path.into());
        self
    }

    pub fn workspace_ttl_secs(mut self, secs: u64) -> Self {
        self.config.workspace_ttl_secs = secs;
        self
    }

    pub fn sweep_interval_secs(mut self, secs: u64) -> Self {
        self.config.sweep_interval_secs = secs;
        self
    }

    pub fn fill_color(mut self, rgb: [u8; 3]) -> Self {
        self.config.fill_color = rgb;
        self
    }

    pub fn collision_policy(mut self, policy: CollisionPolicy) -> Self {
        self.config.collision_policy = policy;
        self
    }

    pub fn min_confidence(mut self, v: f64) -> Self {
        self.config.min_confidence = v;
        self
    }

    pub fn detection_timeout_secs(mut self, secs: u64) -> Self {
        self.config.detection_timeout_secs = secs;
        self
    }

    pub fn max_upload_bytes(mut self, bytes: usize) -> Self {
        self.config.max_upload_bytes = bytes;
        self
    }

    pub fn image_route_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.image_route_prefix = prefix.into();
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<RedactConfig, RedactError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Policy for two documents of one batch that sanitise to the same archive
/// entry name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPolicy {
    /// Later duplicates get ` (2)`, ` (3)`, … before the extension. (default)
    #[default]
    Suffix,
    /// The later document replaces the earlier entry.
    Overwrite,
}
