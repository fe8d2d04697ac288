//! Structured extraction: CV text (or a first-page image) in, profile out.
//!
//! ## Mode decision
//!
//! Text mode is cheap and accurate whenever the document has a real text
//! layer. It is skipped, in favour of sending the first page as an image,
//! when the extracted text has fewer than `min_text_chars` non-whitespace
//! characters (scanned CVs, image-only exports). A text-mode attempt that
//! fails for any reason also falls back to image mode once. There is no
//! other retry here; every service call waits on the injected
//! [`CallPacer`] first.
//!
//! ## Response handling
//!
//! Models frequently wrap JSON in markdown fences despite being told not
//! to. The fences are stripped, then the body must parse as a JSON object.
//! Anything else is an [`ExtractionFailure`].

use crate::error::{DocumentError, ExtractionFailure, ServiceError};
use crate::pacing::CallPacer;
use crate::pipeline::document::ExtractedText;
use crate::pipeline::encode::encode_page;
use crate::profile::CandidateProfile;
use crate::prompts::{extraction_system_prompt, text_payload, IMAGE_INSTRUCTION};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

// ── Service boundary ─────────────────────────────────────────────────────

/// What the service is asked to read.
#[derive(Debug, Clone)]
pub enum ServicePayload {
    Text(String),
    Image(ImageData),
}

#[derive(Debug, Clone)]
pub struct ServiceRequest {
    pub system_prompt: String,
    pub payload: ServicePayload,
}

/// Raw service answer plus token accounting.
#[derive(Debug, Clone, Default)]
pub struct ServiceReply {
    pub text: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// The external language-understanding service.
#[async_trait]
pub trait ExtractionService: Send + Sync {
    async fn call(&self, request: ServiceRequest) -> Result<ServiceReply, ServiceError>;
}

/// [`ExtractionService`] backed by an `edgequake_llm` provider.
pub struct LlmExtractionService {
    provider: Arc<dyn LLMProvider>,
    temperature: f32,
    max_tokens: usize,
    timeout: Duration,
}

impl LlmExtractionService {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        temperature: f32,
        max_tokens: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            temperature,
            max_tokens,
            timeout,
        }
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ExtractionService for LlmExtractionService {
    async fn call(&self, request: ServiceRequest) -> Result<ServiceReply, ServiceError> {
        let user = match request.payload {
            ServicePayload::Text(text) => ChatMessage::user(text),
            ServicePayload::Image(image) => ChatMessage::user_with_images(IMAGE_INSTRUCTION, vec![image]),
        };
        let messages = vec![ChatMessage::system(request.system_prompt), user];
        let options = self.options();

        let started = Instant::now();
        let response = tokio::time::timeout(self.timeout, self.provider.chat(&messages, Some(&options)))
            .await
            .map_err(|_| ServiceError::Timeout {
                secs: self.timeout.as_secs(),
            })?
            .map_err(|e| ServiceError::Api(format!("{}", e)))?;

        debug!(
            "Service call: {} input tokens, {} output tokens, {:?}",
            response.prompt_tokens,
            response.completion_tokens,
            started.elapsed()
        );
        Ok(ServiceReply {
            text: response.content,
            input_tokens: response.prompt_tokens,
            output_tokens: response.completion_tokens,
        })
    }
}

/// Stand-in used when no provider is configured; every call fails.
///
/// Lets redaction-only pipelines run without an API key.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableExtractionService;

#[async_trait]
impl ExtractionService for UnavailableExtractionService {
    async fn call(&self, _request: ServiceRequest) -> Result<ServiceReply, ServiceError> {
        Err(ServiceError::Api("no extraction provider configured".into()))
    }
}

// ── Extractor ────────────────────────────────────────────────────────────

/// Which payload produced the profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMode {
    Text,
    Image,
}

/// A parsed profile and how it was obtained.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub profile: CandidateProfile,
    pub mode: ExtractionMode,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

pub struct StructuredProfileExtractor {
    service: Arc<dyn ExtractionService>,
    pacer: Arc<dyn CallPacer>,
    min_text_chars: usize,
    system_prompt: String,
}

impl StructuredProfileExtractor {
    pub fn new(
        service: Arc<dyn ExtractionService>,
        pacer: Arc<dyn CallPacer>,
        min_text_chars: usize,
    ) -> Self {
        Self {
            service,
            pacer,
            min_text_chars,
            system_prompt: extraction_system_prompt(),
        }
    }

    /// Whether the text layer is too thin to be worth a text-mode call.
    pub fn needs_visual(&self, text: &ExtractedText) -> bool {
        text.content_chars() < self.min_text_chars
    }

    pub async fn extract_from_text(&self, text: &str) -> Result<Extraction, ExtractionFailure> {
        self.run(ServicePayload::Text(text_payload(text)), ExtractionMode::Text)
            .await
    }

    pub async fn extract_from_image(&self, image: &DynamicImage) -> Result<Extraction, ExtractionFailure> {
        let data = encode_page(image).map_err(|e| ServiceError::Request(format!("PNG encoding: {}", e)))?;
        self.run(ServicePayload::Image(data), ExtractionMode::Image).await
    }

    /// Text mode when the text layer allows it, otherwise (or on text-mode
    /// failure) image mode on the first page produced by `first_page`.
    ///
    /// `first_page` is only awaited when image mode is actually needed.
    pub async fn extract<F, Fut>(
        &self,
        text: &ExtractedText,
        first_page: F,
    ) -> Result<Extraction, ExtractionFailure>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<DynamicImage, DocumentError>>,
    {
        if self.needs_visual(text) {
            info!(
                "Text layer has {} chars (< {}), using image mode",
                text.content_chars(),
                self.min_text_chars
            );
        } else {
            match self.extract_from_text(&text.joined()).await {
                Ok(extraction) => return Ok(extraction),
                Err(e) => warn!("Text-mode extraction failed, falling back to image mode: {}", e),
            }
        }

        let image = first_page()
            .await
            .map_err(|e| ExtractionFailure::NoContent(format!("first page could not be rendered: {}", e)))?;
        self.extract_from_image(&image).await
    }

    async fn run(&self, payload: ServicePayload, mode: ExtractionMode) -> Result<Extraction, ExtractionFailure> {
        self.pacer.acquire().await;
        let reply = self
            .service
            .call(ServiceRequest {
                system_prompt: self.system_prompt.clone(),
                payload,
            })
            .await?;
        let profile = parse_response(&reply.text)?;
        debug!(
            "{:?}-mode extraction: {} categor(ies)",
            mode,
            profile.suggested_categories.len()
        );
        Ok(Extraction {
            profile,
            mode,
            input_tokens: reply.input_tokens,
            output_tokens: reply.output_tokens,
        })
    }
}

/// Strip ```json … ``` or ``` … ``` fences around a response body.
pub fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    let inner = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```JSON"))
        .or_else(|| text.strip_prefix("```"));
    match inner {
        Some(rest) => {
            let rest = rest.trim_start();
            rest.strip_suffix("```").map(str::trim).unwrap_or(rest)
        }
        None => text,
    }
}

/// Parse a raw service answer into a profile.
pub fn parse_response(raw: &str) -> Result<CandidateProfile, ExtractionFailure> {
    let body = strip_json_fences(raw);
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| ExtractionFailure::MalformedJson(e.to_string()))?;
    match value {
        serde_json::Value::Object(map) => Ok(CandidateProfile::from_service_object(&map)),
        other => Err(ExtractionFailure::NotAMapping(json_kind(&other).to_string())),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
