use std::collections::BTreeMap;
use std::env;
use std::error::Error as StdError;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::ImageFormat;
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use sizeup_contracts::analysis::{
    build_instruction, validate_response, Accuracy, AnalysisContext, AnalysisError,
    AnalysisResult, Estimate, ResponseSchema,
};
use sizeup_contracts::events::{AnalysisEvent, EventPayload, EventWriter};
use sizeup_contracts::models::{ModelSelection, ModelSelector};
use thiserror::Error;

const DEFAULT_REQUEST_TIMEOUT_S: f64 = 60.0;
const DEFAULT_TEMPERATURE: f64 = 0.2;
const MIN_REQUEST_TIMEOUT_S: f64 = 1.0;
const MAX_REQUEST_TIMEOUT_S: f64 = 300.0;
const ERROR_DETAIL_MAX_CHARS: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisImage {
    mime_type: &'static str,
    data_base64: String,
    sha256: String,
    byte_len: usize,
}

impl AnalysisImage {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AnalysisError> {
        if bytes.is_empty() {
            return Err(AnalysisError::UnsupportedImage {
                detail: "image payload is empty".to_string(),
            });
        }
        let mime_type = sniff_mime_type(bytes)?;
        Ok(Self {
            mime_type,
            data_base64: BASE64.encode(bytes),
            sha256: hex::encode(Sha256::digest(bytes)),
            byte_len: bytes.len(),
        })
    }

    pub fn from_base64(raw: &str) -> Result<Self, AnalysisError> {
        let trimmed = raw.trim();
        let encoded = match trimmed.strip_prefix("data:") {
            Some(rest) => {
                let Some((header, data)) = rest.split_once(',') else {
                    return Err(AnalysisError::UnsupportedImage {
                        detail: "data URL has no payload".to_string(),
                    });
                };
                if !header.ends_with(";base64") {
                    return Err(AnalysisError::UnsupportedImage {
                        detail: format!("data URL is not base64 encoded ({header})"),
                    });
                }
                data
            }
            None => trimmed,
        };
        let compact: String = encoded.chars().filter(|ch| !ch.is_whitespace()).collect();
        let bytes = BASE64
            .decode(compact.as_bytes())
            .map_err(|err| AnalysisError::UnsupportedImage {
                detail: format!("image base64 decode failed: {err}"),
            })?;
        Self::from_bytes(&bytes)
    }

    pub fn mime_type(&self) -> &'static str {
        self.mime_type
    }

    pub fn data_base64(&self) -> &str {
        &self.data_base64
    }

    pub fn sha256(&self) -> &str {
        &self.sha256
    }

    pub fn byte_len(&self) -> usize {
        self.byte_len
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data_base64)
    }
}

fn sniff_mime_type(bytes: &[u8]) -> Result<&'static str, AnalysisError> {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Png) => Ok("image/png"),
        Ok(ImageFormat::Jpeg) => Ok("image/jpeg"),
        Ok(ImageFormat::WebP) => Ok("image/webp"),
        Ok(other) => Err(AnalysisError::UnsupportedImage {
            detail: format!("unsupported image format {other:?}"),
        }),
        Err(err) => Err(AnalysisError::UnsupportedImage {
            detail: format!("unrecognized image bytes: {err}"),
        }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OracleOptions {
    request_timeout_s: f64,
    temperature: f64,
}

impl Default for OracleOptions {
    fn default() -> Self {
        Self {
            request_timeout_s: DEFAULT_REQUEST_TIMEOUT_S,
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

impl OracleOptions {
    /// Timeout is clamped to 1..=300 seconds and temperature to 0..=1;
    /// non-finite values fall back to the defaults.
    pub fn new(request_timeout_s: f64, temperature: f64) -> Self {
        Self {
            request_timeout_s: clamp_finite(
                request_timeout_s,
                DEFAULT_REQUEST_TIMEOUT_S,
                MIN_REQUEST_TIMEOUT_S,
                MAX_REQUEST_TIMEOUT_S,
            ),
            temperature: clamp_finite(temperature, DEFAULT_TEMPERATURE, 0.0, 1.0),
        }
    }

    pub fn from_map(options: &Map<String, Value>) -> Self {
        Self::new(
            value_as_f64(options.get("request_timeout")).unwrap_or(DEFAULT_REQUEST_TIMEOUT_S),
            value_as_f64(options.get("temperature")).unwrap_or(DEFAULT_TEMPERATURE),
        )
    }

    pub fn request_timeout_s(&self) -> f64 {
        self.request_timeout_s
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.request_timeout_s)
    }
}

#[derive(Debug, Clone)]
pub struct OracleRequest<'a> {
    pub model: String,
    pub image: &'a AnalysisImage,
    pub instruction: String,
    pub schema: ResponseSchema,
    pub options: OracleOptions,
}

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("{provider} credentials missing: set {vars}")]
    MissingApiKey {
        provider: &'static str,
        vars: &'static str,
    },
    #[error("{provider} request failed ({endpoint})")]
    Transport {
        provider: &'static str,
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{provider} request failed ({code}): {body}")]
    Status {
        provider: &'static str,
        code: u16,
        body: String,
    },
    #[error("{provider} reply envelope unusable: {detail}")]
    Envelope {
        provider: &'static str,
        detail: String,
    },
    #[error("no oracle registered for provider '{0}'")]
    UnknownProvider(String),
}

impl OracleError {
    pub fn into_analysis_error(self) -> AnalysisError {
        let detail = error_chain_text(&self, ERROR_DETAIL_MAX_CHARS);
        match self {
            Self::Envelope { .. } => AnalysisError::MalformedResponse { detail },
            Self::MissingApiKey { .. }
            | Self::Transport { .. }
            | Self::Status { .. }
            | Self::UnknownProvider(_) => AnalysisError::OracleUnavailable { detail },
        }
    }
}

pub trait Oracle: Send + Sync {
    fn name(&self) -> &str;
    fn generate(&self, request: &OracleRequest<'_>) -> Result<String, OracleError>;
}

#[derive(Default)]
pub struct OracleRegistry {
    oracles: BTreeMap<String, Box<dyn Oracle>>,
}

impl OracleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<O: Oracle + 'static>(&mut self, oracle: O) {
        self.oracles.insert(oracle.name().to_string(), Box::new(oracle));
    }

    pub fn get(&self, name: &str) -> Option<&dyn Oracle> {
        self.oracles.get(name).map(|oracle| oracle.as_ref())
    }

    pub fn names(&self) -> Vec<String> {
        self.oracles.keys().cloned().collect()
    }
}

pub fn default_oracle_registry() -> OracleRegistry {
    let mut oracles = OracleRegistry::new();
    oracles.register(DryrunOracle::from_env());
    oracles.register(GeminiOracle::from_env());
    oracles.register(OpenAiOracle::from_env());
    oracles
}

pub struct DryrunOracle {
    reply: String,
}

impl DryrunOracle {
    pub const DEFAULT_REPLY: &'static str =
        r#"{"analysisSuccess":true,"heightCm":175.0,"weightKg":70.0,"accuracy":"medium"}"#;

    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(
            non_empty_env("SIZEUP_DRYRUN_RESPONSE").unwrap_or_else(|| Self::DEFAULT_REPLY.to_string()),
        )
    }
}

impl Oracle for DryrunOracle {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn generate(&self, _request: &OracleRequest<'_>) -> Result<String, OracleError> {
        Ok(self.reply.clone())
    }
}

pub struct GeminiOracle {
    api_base: String,
    api_key: Option<String>,
    http: HttpClient,
}

impl GeminiOracle {
    pub fn new(api_base: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            api_base: api_base.into().trim().trim_end_matches('/').to_string(),
            api_key,
            http: HttpClient::new(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(
            non_empty_env("GEMINI_API_BASE")
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".to_string()),
            non_empty_env("GEMINI_API_KEY").or_else(|| non_empty_env("GOOGLE_API_KEY")),
        )
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    fn build_payload(request: &OracleRequest<'_>) -> Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": [
                    {
                        "inlineData": {
                            "mimeType": request.image.mime_type(),
                            "data": request.image.data_base64(),
                        }
                    },
                    { "text": request.instruction },
                ],
            }],
            "generationConfig": {
                "candidateCount": 1,
                "temperature": request.options.temperature(),
                "responseMimeType": "application/json",
                "responseSchema": request.schema.to_gemini_schema(),
            },
        })
    }

    fn extract_text(response_payload: &Value) -> Result<String, OracleError> {
        if let Some(block_reason) = response_payload
            .get("promptFeedback")
            .and_then(|feedback| feedback.get("blockReason"))
            .and_then(Value::as_str)
        {
            return Err(OracleError::Envelope {
                provider: "Gemini",
                detail: format!("prompt blocked ({block_reason})"),
            });
        }
        let Some(candidate) = response_payload
            .get("candidates")
            .and_then(Value::as_array)
            .and_then(|rows| rows.first())
        else {
            return Err(OracleError::Envelope {
                provider: "Gemini",
                detail: "reply has no candidates".to_string(),
            });
        };
        let text = candidate
            .get("content")
            .and_then(|content| content.get("parts"))
            .and_then(Value::as_array)
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|part| part.get("text").and_then(Value::as_str))
                    .collect::<String>()
            })
            .unwrap_or_default();
        if text.trim().is_empty() {
            let finish_reason = candidate
                .get("finishReason")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            return Err(OracleError::Envelope {
                provider: "Gemini",
                detail: format!("candidate has no text (finishReason {finish_reason})"),
            });
        }
        Ok(text)
    }
}

impl Oracle for GeminiOracle {
    fn name(&self) -> &str {
        "gemini"
    }

    fn generate(&self, request: &OracleRequest<'_>) -> Result<String, OracleError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(OracleError::MissingApiKey {
                provider: "Gemini",
                vars: "GEMINI_API_KEY or GOOGLE_API_KEY",
            });
        };
        let endpoint = self.endpoint_for_model(&request.model);
        let response = self
            .http
            .post(&endpoint)
            .header("x-goog-api-key", api_key)
            .timeout(request.options.timeout())
            .json(&Self::build_payload(request))
            .send()
            .map_err(|source| OracleError::Transport {
                provider: "Gemini",
                endpoint: endpoint.clone(),
                source,
            })?;
        let payload = response_json_or_error("Gemini", &endpoint, response)?;
        Self::extract_text(&payload)
    }
}

pub struct OpenAiOracle {
    api_base: String,
    api_key: Option<String>,
    http: HttpClient,
}

impl OpenAiOracle {
    const SCHEMA_NAME: &'static str = "height_weight_estimate";

    pub fn new(api_base: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            api_base: api_base.into().trim().trim_end_matches('/').to_string(),
            api_key,
            http: HttpClient::new(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(
            non_empty_env("OPENAI_API_BASE").unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            non_empty_env("OPENAI_API_KEY"),
        )
    }

    fn build_payload(request: &OracleRequest<'_>) -> Value {
        json!({
            "model": request.model,
            "temperature": request.options.temperature(),
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": request.instruction },
                    { "type": "image_url", "image_url": { "url": request.image.data_url() } },
                ],
            }],
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": Self::SCHEMA_NAME,
                    "strict": true,
                    "schema": request.schema.to_json_schema(),
                },
            },
        })
    }

    fn extract_text(response_payload: &Value) -> Result<String, OracleError> {
        let Some(message) = response_payload
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|rows| rows.first())
            .and_then(|choice| choice.get("message"))
        else {
            return Err(OracleError::Envelope {
                provider: "OpenAI",
                detail: "reply has no choices".to_string(),
            });
        };
        if let Some(refusal) = message.get("refusal").and_then(Value::as_str) {
            return Err(OracleError::Envelope {
                provider: "OpenAI",
                detail: format!("model refused: {}", truncate_text(refusal, 200)),
            });
        }
        match message.get("content").and_then(Value::as_str) {
            Some(text) if !text.trim().is_empty() => Ok(text.to_string()),
            _ => Err(OracleError::Envelope {
                provider: "OpenAI",
                detail: "message has no content".to_string(),
            }),
        }
    }
}

impl Oracle for OpenAiOracle {
    fn name(&self) -> &str {
        "openai"
    }

    fn generate(&self, request: &OracleRequest<'_>) -> Result<String, OracleError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(OracleError::MissingApiKey {
                provider: "OpenAI",
                vars: "OPENAI_API_KEY",
            });
        };
        let endpoint = format!("{}/chat/completions", self.api_base);
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(api_key)
            .timeout(request.options.timeout())
            .json(&Self::build_payload(request))
            .send()
            .map_err(|source| OracleError::Transport {
                provider: "OpenAI",
                endpoint: endpoint.clone(),
                source,
            })?;
        let payload = response_json_or_error("OpenAI", &endpoint, response)?;
        Self::extract_text(&payload)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisPlan {
    pub provider: String,
    pub model: String,
    pub fallback_reason: Option<String>,
}

pub struct Analyzer {
    selector: ModelSelector,
    oracles: OracleRegistry,
    model: Option<String>,
    options: OracleOptions,
    events: Option<EventWriter>,
}

impl Analyzer {
    pub fn new(model: Option<String>) -> Self {
        Self::with_oracles(default_oracle_registry(), model)
    }

    pub fn with_oracles(oracles: OracleRegistry, model: Option<String>) -> Self {
        Self {
            selector: ModelSelector::default(),
            oracles,
            model: model.or_else(|| non_empty_env("SIZEUP_MODEL")),
            options: OracleOptions::default(),
            events: None,
        }
    }

    pub fn with_selector(mut self, selector: ModelSelector) -> Self {
        self.selector = selector;
        self
    }

    pub fn with_options(mut self, options: OracleOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_events(mut self, events: EventWriter) -> Self {
        self.events = Some(events);
        self
    }

    pub fn plan(&self) -> Result<AnalysisPlan, AnalysisError> {
        let ModelSelection {
            model,
            fallback_reason,
            ..
        } = self
            .selector
            .select(self.model.as_deref())
            .map_err(|err| AnalysisError::OracleUnavailable {
                detail: err.to_string(),
            })?;
        Ok(AnalysisPlan {
            provider: model.provider,
            model: model.name,
            fallback_reason,
        })
    }

    pub fn build_request<'a>(
        &self,
        plan: &AnalysisPlan,
        image: &'a AnalysisImage,
        context: &AnalysisContext,
    ) -> Result<OracleRequest<'a>, AnalysisError> {
        context.validate()?;
        Ok(OracleRequest {
            model: plan.model.clone(),
            image,
            instruction: build_instruction(context),
            schema: ResponseSchema::for_variant(context.variant),
            options: self.options,
        })
    }

    pub fn estimate(
        &self,
        image: &AnalysisImage,
        context: &AnalysisContext,
    ) -> Result<Estimate, AnalysisError> {
        let started = Instant::now();
        let outcome = self.estimate_inner(image, context);
        self.record_outcome(started, &outcome, |estimate| {
            measurement_payload(estimate.height_cm, estimate.weight_kg, estimate.accuracy)
        });
        outcome
    }

    pub fn analyze(
        &self,
        image: &AnalysisImage,
        context: &AnalysisContext,
    ) -> Result<AnalysisResult, AnalysisError> {
        let started = Instant::now();
        let outcome = self
            .estimate_inner(image, context)
            .map(AnalysisResult::from_estimate);
        self.record_outcome(started, &outcome, |result| {
            let mut payload =
                measurement_payload(result.height_cm, result.weight_kg, result.accuracy);
            payload.insert("bmi".to_string(), json!(result.bmi));
            payload.insert("category".to_string(), json!(result.category));
            payload
        });
        outcome
    }

    // Every analysis_started is closed by exactly one succeeded or failed event.
    fn record_outcome<T>(
        &self,
        started: Instant,
        outcome: &Result<T, AnalysisError>,
        describe: impl FnOnce(&T) -> EventPayload,
    ) {
        let (event, mut payload) = match outcome {
            Ok(value) => (AnalysisEvent::Succeeded, describe(value)),
            Err(err) => {
                let mut payload = EventPayload::new();
                payload.insert("code".to_string(), json!(err.code()));
                payload.insert("detail".to_string(), json!(err.detail()));
                payload.insert("oracle_decision".to_string(), json!(err.is_oracle_decision()));
                (AnalysisEvent::Failed, payload)
            }
        };
        payload.insert("latency_ms".to_string(), json!(elapsed_ms(started)));
        self.emit(event, payload);
    }

    fn estimate_inner(
        &self,
        image: &AnalysisImage,
        context: &AnalysisContext,
    ) -> Result<Estimate, AnalysisError> {
        let plan = self.plan()?;
        let request = self.build_request(&plan, image, context)?;

        let mut payload = EventPayload::new();
        payload.insert("provider".to_string(), json!(plan.provider));
        payload.insert("model".to_string(), json!(plan.model));
        payload.insert("fallback_reason".to_string(), json!(plan.fallback_reason));
        payload.insert("variant".to_string(), json!(context.variant.as_str()));
        payload.insert(
            "has_reference_object".to_string(),
            json!(context.has_reference_object),
        );
        payload.insert(
            "estimation_method".to_string(),
            json!(context.estimation_method.map(|method| method.as_str())),
        );
        payload.insert("image_sha256".to_string(), json!(image.sha256()));
        payload.insert("image_bytes".to_string(), json!(image.byte_len()));
        payload.insert("mime_type".to_string(), json!(image.mime_type()));
        self.emit(AnalysisEvent::Started, payload);

        let Some(oracle) = self.oracles.get(&plan.provider) else {
            return Err(OracleError::UnknownProvider(plan.provider).into_analysis_error());
        };
        let raw = oracle
            .generate(&request)
            .map_err(OracleError::into_analysis_error)?;
        validate_response(&raw, context.variant)
    }

    fn emit(&self, event: AnalysisEvent, payload: EventPayload) {
        if let Some(events) = &self.events {
            // Diagnostics never change the outcome of an analysis.
            let _ = events.emit_analysis(event, payload);
        }
    }
}

fn measurement_payload(
    height_cm: f64,
    weight_kg: f64,
    accuracy: Option<Accuracy>,
) -> EventPayload {
    let mut payload = EventPayload::new();
    payload.insert("height_cm".to_string(), json!(height_cm));
    payload.insert("weight_kg".to_string(), json!(weight_kg));
    payload.insert("accuracy".to_string(), json!(accuracy));
    payload
}

fn response_json_or_error(
    provider: &'static str,
    endpoint: &str,
    response: HttpResponse,
) -> Result<Value, OracleError> {
    let status = response.status();
    let body = response.text().map_err(|source| OracleError::Transport {
        provider,
        endpoint: endpoint.to_string(),
        source,
    })?;
    if !status.is_success() {
        return Err(OracleError::Status {
            provider,
            code: status.as_u16(),
            body: truncate_text(&body, ERROR_DETAIL_MAX_CHARS),
        });
    }
    serde_json::from_str(&body).map_err(|err| OracleError::Envelope {
        provider,
        detail: format!("reply is not JSON: {err}"),
    })
}

fn error_chain_text(err: &(dyn StdError + 'static), max_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut current = Some(err);
    while let Some(cause) = current {
        let text = cause.to_string();
        let trimmed = text.trim();
        if !trimmed.is_empty() && parts.last().map(String::as_str) != Some(trimmed) {
            parts.push(trimmed.to_string());
        }
        current = cause.source();
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

fn value_as_f64(value: Option<&Value>) -> Option<f64> {
    value.and_then(|row| match row {
        Value::Number(num) => num.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    })
}

fn clamp_finite(value: f64, default: f64, min: f64, max: f64) -> f64 {
    if value.is_finite() {
        value.clamp(min, max)
    } else {
        default.clamp(min, max)
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
