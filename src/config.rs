//! Configuration for the résumé pipeline.
//!
//! Every knob lives in [`PipelineConfig`], built once through
//! [`PipelineConfigBuilder`] and handed to component constructors. Nothing
//! reads the environment after construction except provider resolution,
//! which follows the same chain the CLI documents.

use crate::error::CvFlowError;
use crate::pacing::{CallPacer, FixedDelayPacer, NoPacing, TokenBucketPacer};
use crate::pipeline::render::RendererConfig;
use edgequake_llm::{LLMProvider, ProviderFactory};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Model used when only `GEMINI_API_KEY` is available.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
/// Model used when only `OPENAI_API_KEY` is available.
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4.1-nano";

/// Fetch retry policy: `max_attempts` tries in total, waiting
/// `initial_backoff * 2^(attempt-1)` after each failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    /// Wait after failed attempt number `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.initial_backoff
            .checked_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
            .unwrap_or(Duration::MAX)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1000),
        }
    }
}

/// Spacing policy for extraction-service calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Pacing {
    /// At least this many milliseconds between calls.
    FixedDelay { cooldown_ms: u64 },
    /// Token bucket with this many calls per minute.
    PerMinute(u32),
    None,
}

impl Default for Pacing {
    fn default() -> Self {
        Pacing::FixedDelay { cooldown_ms: 5000 }
    }
}

/// Configuration for a pipeline run.
///
/// # Example
/// ```rust
/// use edgequake_cvflow::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .min_text_chars(80)
///     .cooldown_ms(2000)
///     .build()
///     .unwrap();
/// assert_eq!(config.min_text_chars, 80);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Below this many non-whitespace characters the text layer is ignored
    /// and the first page is sent as an image. Default: 50.
    pub min_text_chars: usize,

    /// Scale factor for the first-page render in image mode. Range 0.5-4.0. Default: 2.0.
    pub render_scale: f32,

    /// LLM model identifier. If None, the provider default (or the chain default) is used.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "gemini").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Completion token cap. Default: 4096.
    pub max_tokens: usize,

    pub fetch_retry: RetryPolicy,

    /// Per-request download timeout in seconds. Default: 60.
    pub fetch_timeout_secs: u64,

    /// Per extraction-service call timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Overall budget for one submission in seconds. Default: 300.
    pub submission_timeout_secs: u64,

    pub pacing: Pacing,

    /// Bearer token sent with document downloads.
    pub credential: Option<String>,

    /// TrueType font with Turkish glyphs; without one output is transliterated.
    pub font_path: Option<PathBuf>,

    /// Output page size in points. Default: A4.
    pub page_width: f32,
    pub page_height: f32,

    /// pdfium shared library (file or directory). Default: system lookup.
    pub pdfium_library: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let page = RendererConfig::default();
        Self {
            min_text_chars: 50,
            render_scale: 2.0,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 4096,
            fetch_retry: RetryPolicy::default(),
            fetch_timeout_secs: 60,
            api_timeout_secs: 120,
            submission_timeout_secs: 300,
            pacing: Pacing::default(),
            credential: None,
            font_path: None,
            page_width: page.page_width,
            page_height: page.page_height,
            pdfium_library: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("min_text_chars", &self.min_text_chars)
            .field("render_scale", &self.render_scale)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("fetch_retry", &self.fetch_retry)
            .field("submission_timeout_secs", &self.submission_timeout_secs)
            .field("pacing", &self.pacing)
            .field("credential", &self.credential.as_ref().map(|_| "<redacted>"))
            .field("font_path", &self.font_path)
            .finish()
    }
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }

    pub fn submission_timeout(&self) -> Duration {
        Duration::from_secs(self.submission_timeout_secs)
    }

    pub fn renderer_config(&self) -> RendererConfig {
        RendererConfig {
            font_path: self.font_path.clone(),
            page_width: self.page_width,
            page_height: self.page_height,
            ..RendererConfig::default()
        }
    }

    /// Build the pacing policy object.
    pub fn pacer(&self) -> Arc<dyn CallPacer> {
        match self.pacing {
            Pacing::FixedDelay { cooldown_ms } => {
                Arc::new(FixedDelayPacer::new(Duration::from_millis(cooldown_ms)))
            }
            Pacing::PerMinute(n) => match NonZeroU32::new(n) {
                Some(n) => Arc::new(TokenBucketPacer::per_minute(n)),
                None => Arc::new(NoPacing),
            },
            Pacing::None => Arc::new(NoPacing),
        }
    }
}

/// Builder for [`PipelineConfig`].
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn min_text_chars(mut self, n: usize) -> Self {
        self.config.min_text_chars = n;
        self
    }

    pub fn render_scale(mut self, scale: f32) -> Self {
        self.config.render_scale = scale.clamp(0.5, 4.0);
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

    pub fn fetch_attempts(mut self, n: u32) -> Self {
        self.config.fetch_retry.max_attempts = n.clamp(1, 10);
        self
    }

    /// Initial fetch backoff, clamped to at most one minute.
    pub fn fetch_backoff_ms(mut self, ms: u64) -> Self {
        self.config.fetch_retry.initial_backoff = Duration::from_millis(ms.min(60_000));
        self
    }

    pub fn fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.config.fetch_timeout_secs = secs;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn submission_timeout_secs(mut self, secs: u64) -> Self {
        self.config.submission_timeout_secs = secs;
        self
    }

    /// Fixed gap between extraction-service calls.
    pub fn cooldown_ms(mut self, ms: u64) -> Self {
        self.config.pacing = Pacing::FixedDelay { cooldown_ms: ms };
        self
    }

    /// Token-bucket quota instead of a fixed gap.
    pub fn requests_per_minute(mut self, n: u32) -> Self {
        self.config.pacing = Pacing::PerMinute(n);
        self
    }

    pub fn pacing(mut self, pacing: Pacing) -> Self {
        self.config.pacing = pacing;
        self
    }

    pub fn credential(mut self, token: impl Into<String>) -> Self {
        self.config.credential = Some(token.into());
        self
    }

    pub fn font_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.font_path = Some(path.into());
        self
    }

    pub fn page_size(mut self, width: f32, height: f32) -> Self {
        self.config.page_width = width;
        self.config.page_height = height;
        self
    }

    pub fn pdfium_library(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library = Some(path.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, CvFlowError> {
        let c = &self.config;
        if c.fetch_timeout_secs == 0 || c.api_timeout_secs == 0 || c.submission_timeout_secs == 0 {
            return Err(CvFlowError::InvalidConfig("Timeouts must be at least 1 second".into()));
        }
        if c.max_tokens == 0 {
            return Err(CvFlowError::InvalidConfig("max_tokens must be at least 1".into()));
        }
        if c.pacing == Pacing::PerMinute(0) {
            return Err(CvFlowError::InvalidConfig(
                "requests_per_minute must be at least 1".into(),
            ));
        }
        // Header, one rule and a line of body text need roughly 200pt in each direction.
        if c.page_width < 200.0 || c.page_height < 200.0 {
            return Err(CvFlowError::InvalidConfig(format!(
                "Page size {}x{}pt is too small",
                c.page_width, c.page_height
            )));
        }
        Ok(self.config)
    }
}

// ── Provider resolution ──────────────────────────────────────────────────

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, CvFlowError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        CvFlowError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

fn env_set(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider + model** (`config.provider_name`).
/// 3. **Environment pair** `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`.
/// 4. **Gemini** when `GEMINI_API_KEY` is set, since the form backlog was
///    originally analysed with it.
/// 5. **OpenAI** when `OPENAI_API_KEY` is set.
/// 6. **Full auto-detection** via `ProviderFactory::from_env`.
pub fn resolve_provider(config: &PipelineConfig) -> Result<Arc<dyn LLMProvider>, CvFlowError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(match name.as_str() {
            "gemini" => DEFAULT_GEMINI_MODEL,
            _ => DEFAULT_OPENAI_MODEL,
        });
        return create_provider(name, model);
    }

    if let (Some(prov), Some(model)) = (env_set("EDGEQUAKE_LLM_PROVIDER"), env_set("EDGEQUAKE_MODEL")) {
        debug!("Provider from EDGEQUAKE_LLM_PROVIDER: {}/{}", prov, model);
        return create_provider(&prov, &model);
    }

    if env_set("GEMINI_API_KEY").is_some() {
        let model = config.model.as_deref().unwrap_or(DEFAULT_GEMINI_MODEL);
        return create_provider("gemini", model);
    }

    if env_set("OPENAI_API_KEY").is_some() {
        let model = config.model.as_deref().unwrap_or(DEFAULT_OPENAI_MODEL);
        return create_provider("openai", model);
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| CvFlowError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set GEMINI_API_KEY or OPENAI_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = PipelineConfig::default();
        assert_eq!(c.min_text_chars, 50);
        assert_eq!(c.fetch_retry.max_attempts, 3);
        assert_eq!(c.pacing, Pacing::FixedDelay { cooldown_ms: 5000 });
        assert_eq!(c.submission_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn backoff_doubles() {
        let p = RetryPolicy::default();
        assert_eq!(p.backoff_for(1), Duration::from_millis(1000));
        assert_eq!(p.backoff_for(2), Duration::from_millis(2000));
        assert_eq!(p.backoff_for(3), Duration::from_millis(4000));
    }

    #[test]
    fn backoff_saturates_instead_of_overflowing() {
        let p = RetryPolicy {
            max_attempts: 10,
            initial_backoff: Duration::from_secs(u64::MAX / 2),
        };
        assert_eq!(p.backoff_for(10), Duration::MAX);
        assert_eq!(p.backoff_for(u32::MAX), Duration::MAX);

        let c = PipelineConfig::builder().fetch_backoff_ms(u64::MAX).build().unwrap();
        assert_eq!(c.fetch_retry.initial_backoff, Duration::from_secs(60));
    }

    #[test]
    fn setters_clamp() {
        let c = PipelineConfig::builder()
            .render_scale(10.0)
            .temperature(-1.0)
            .fetch_attempts(0)
            .build()
            .unwrap();
        assert_eq!(c.render_scale, 4.0);
        assert_eq!(c.temperature, 0.0);
        assert_eq!(c.fetch_retry.max_attempts, 1);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(PipelineConfig::builder().api_timeout_secs(0).build().is_err());
        assert!(PipelineConfig::builder().requests_per_minute(0).build().is_err());
        assert!(PipelineConfig::builder().page_size(100.0, 100.0).build().is_err());
    }

    #[test]
    fn debug_hides_secrets() {
        let c = PipelineConfig::builder().credential("tfp_secret").build().unwrap();
        let s = format!("{:?}", c);
        assert!(!s.contains("tfp_secret"));
        assert!(s.contains("<redacted>"));
    }

    #[test]
    fn renderer_config_carries_page_and_font() {
        let c = PipelineConfig::builder()
            .font_path("/fonts/DejaVuSans.ttf")
            .page_size(612.0, 792.0)
            .build()
            .unwrap();
        let r = c.renderer_config();
        assert_eq!(r.page_width, 612.0);
        assert_eq!(r.font_path.as_deref(), Some(std::path::Path::new("/fonts/DejaVuSans.ttf")));
    }
}
