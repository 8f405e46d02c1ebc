//! Verdict classification through a structured-output chat completion API.
//!
//! `CompletionBackend` is the transport seam (Groq's OpenAI-compatible
//! endpoint in production, fakes in tests). `VerdictClassifier` owns the
//! prompt and the parsing, and is fail-soft: any backend or parse fault
//! yields [`VerdictRecord::degraded`] for that claim only.

use crate::config::ClassifierConfig;
use crate::models::{clamp_score, Category, ClaimRecord, EvidenceDigest, Verdict, VerdictRecord};
use crate::rate_limit::RateGate;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;

/// Environment variable holding the classification service credential.
pub const GROQ_API_KEY_ENV: &str = "GROQ_API_KEY";

/// Substituted when the model returns an empty explanation.
pub const NO_EXPLANATION: &str = "The classifier gave no explanation for this verdict.";

const SYSTEM_PROMPT: &str = "You are a professional fact-checker. Judge the CLAIM against the CONTEXT, \
which lists headlines from trusted news outlets.
- If CONTEXT is \"NO_MATCHING_SOURCES\", no trusted outlet reported the claim: the claim is likely \"Fake\" or \"Unverified\".
- If CONTEXT says the search failed or was not performed, judge the claim on its own merits and prefer \"Unverified\" when unsure.
- truth_score and propaganda_score are integers from 0 to 100.
- Respond with a single valid JSON object and nothing else.";

const RESPONSE_SCHEMA: &str = r#"Return JSON: {
  "is_news": true | false,
  "verdict": "Real" | "Fake" | "Misleading" | "Satire" | "Unverified",
  "truth_score": number,
  "propaganda_score": number,
  "explanation": "Explain why (mention if sources are missing)",
  "category": "politics" | "economy" | "social" | "other"
}"#;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Abstraction over chat completion providers that can return a JSON object.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Returns the raw `content` of the first choice.
    async fn complete_json(&self, messages: &[ChatMessage]) -> Result<String, ClassifierError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Missing API key")]
    MissingApiKey,

    #[error("Malformed classifier output: {0}")]
    Malformed(String),
}

impl ClassifierError {
    pub fn is_transient(&self) -> bool {
        match self {
            ClassifierError::Http(_) => true,
            ClassifierError::Api { code, .. } => *code == 429 || *code >= 500,
            ClassifierError::MissingApiKey | ClassifierError::Malformed(_) => false,
        }
    }
}

// ============================================================================
// Groq API structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

// ============================================================================
// GroqClient
// ============================================================================

#[derive(Debug, Clone)]
pub struct GroqClient {
    client: Client,
    config: ClassifierConfig,
    api_key: String,
    retry_gate: Arc<RateGate>,
}

impl GroqClient {
    pub fn new(config: ClassifierConfig, api_key: String) -> Result<Self, ClassifierError> {
        if api_key.is_empty() {
            return Err(ClassifierError::MissingApiKey);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            config,
            api_key,
            retry_gate: Arc::new(RateGate::unlimited()),
        })
    }

    /// Share the classification service's gate. Retries acquire it; the
    /// first attempt is gated by the caller.
    pub fn with_rate_gate(mut self, gate: Arc<RateGate>) -> Self {
        self.retry_gate = gate;
        self
    }

    async fn complete_once(&self, messages: &[ChatMessage]) -> Result<String, ClassifierError> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));

        let request = ChatRequest {
            model: &self.config.model,
            messages,
            temperature: self.config.temperature,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorResponse>(&body)
                .ok()
                .and_then(|e| e.error)
                .map(|e| e.message)
                .unwrap_or(body);

            tracing::error!(code = status.as_u16(), message = %message, "Classification API error");

            return Err(ClassifierError::Api {
                code: status.as_u16(),
                message,
            });
        }

        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| ClassifierError::Malformed(format!("completion envelope: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ClassifierError::Malformed("completion had no content".to_string()))
    }
}

#[async_trait]
impl CompletionBackend for GroqClient {
    async fn complete_json(&self, messages: &[ChatMessage]) -> Result<String, ClassifierError> {
        let retry_strategy = ExponentialBackoff::from_millis(self.config.retry_delay_ms)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.config.max_retries);

        let attempts = AtomicUsize::new(0);
        let attempts = &attempts;
        RetryIf::spawn(
            retry_strategy,
            move || async move {
                if attempts.fetch_add(1, Ordering::Relaxed) > 0 {
                    self.retry_gate.acquire().await;
                }
                self.complete_once(messages).await
            },
            ClassifierError::is_transient,
        )
        .await
    }

    fn name(&self) -> &str {
        "groq"
    }
}

/// Backend used when no credential is configured; every call fails, so every
/// claim degrades.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableBackend;

#[async_trait]
impl CompletionBackend for UnavailableBackend {
    async fn complete_json(&self, _messages: &[ChatMessage]) -> Result<String, ClassifierError> {
        Err(ClassifierError::MissingApiKey)
    }

    fn name(&self) -> &str {
        "unavailable"
    }
}

// ============================================================================
// VerdictClassifier
// ============================================================================

#[derive(Clone)]
pub struct VerdictClassifier {
    backend: Arc<dyn CompletionBackend>,
}

impl VerdictClassifier {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self { backend }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Classify one claim. Never fails: faults become a degraded record.
    pub async fn classify(&self, claim: &ClaimRecord, evidence: &EvidenceDigest) -> VerdictRecord {
        match self.try_classify(claim, evidence).await {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(
                    claim = %claim.title,
                    backend = self.backend.name(),
                    error = %e,
                    "Classification failed, recording degraded verdict"
                );
                VerdictRecord::degraded(claim.title.clone(), claim.source_url.clone())
            }
        }
    }

    pub async fn try_classify(
        &self,
        claim: &ClaimRecord,
        evidence: &EvidenceDigest,
    ) -> Result<VerdictRecord, ClassifierError> {
        let messages = build_messages(claim, evidence);
        let content = self.backend.complete_json(&messages).await?;
        parse_verdict(&content, claim)
    }
}

/// Fixed system instruction, then the claim and its rendered evidence.
pub fn build_messages(claim: &ClaimRecord, evidence: &EvidenceDigest) -> Vec<ChatMessage> {
    let user = format!(
        "CLAIM: \"{}\"\nCONTEXT: \"{}\"\n\n{}",
        claim.title,
        evidence.render(),
        RESPONSE_SCHEMA
    );
    vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(user)]
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
    #[serde(default, alias = "isNews")]
    is_news: Option<bool>,
    #[serde(default)]
    verdict: Option<String>,
    #[serde(default, alias = "truthScore")]
    truth_score: Option<serde_json::Value>,
    #[serde(default, alias = "propagandaScore")]
    propaganda_score: Option<serde_json::Value>,
    #[serde(default)]
    explanation: Option<String>,
    #[serde(default)]
    category: Option<String>,
}

/// Parse the model's JSON object into a record for `claim`.
///
/// The verdict must be one of the known labels. Scores may be numbers or
/// numeric strings and are clamped; anything unreadable scores 0.
pub fn parse_verdict(content: &str, claim: &ClaimRecord) -> Result<VerdictRecord, ClassifierError> {
    let raw: RawVerdict = serde_json::from_str(strip_code_fence(content))
        .map_err(|e| ClassifierError::Malformed(e.to_string()))?;

    let verdict_text = raw
        .verdict
        .ok_or_else(|| ClassifierError::Malformed("missing verdict".to_string()))?;
    let verdict = Verdict::parse(&verdict_text).ok_or_else(|| {
        ClassifierError::Malformed(format!("unrecognised verdict {:?}", verdict_text))
    })?;

    let explanation = raw
        .explanation
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
        .unwrap_or_else(|| NO_EXPLANATION.to_string());

    Ok(VerdictRecord {
        claim: claim.title.clone(),
        is_news: raw.is_news.unwrap_or(true),
        verdict,
        truth_score: score_value(raw.truth_score.as_ref()),
        propaganda_score: score_value(raw.propaganda_score.as_ref()),
        explanation,
        category: raw.category.as_deref().map(Category::parse).unwrap_or_default(),
        source_link: claim.source_url.clone(),
    })
}

fn score_value(value: Option<&serde_json::Value>) -> u8 {
    match value {
        Some(serde_json::Value::Number(n)) => n.as_f64().map(clamp_score).unwrap_or(0),
        Some(serde_json::Value::String(s)) => s
            .trim()
            .trim_end_matches('%')
            .parse::<f64>()
            .map(clamp_score)
            .unwrap_or(0),
        _ => 0,
    }
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

/// Build the classifier from config. A missing `GROQ_API_KEY` degrades every
/// claim instead of failing startup.
pub fn create_classifier(
    config: &ClassifierConfig,
    gate: Arc<RateGate>,
) -> Result<VerdictClassifier, ClassifierError> {
    let api_key = std::env::var(GROQ_API_KEY_ENV).unwrap_or_default();
    if api_key.trim().is_empty() {
        tracing::warn!("{} not set, all verdicts will degrade to Error", GROQ_API_KEY_ENV);
        return Ok(VerdictClassifier::new(Arc::new(UnavailableBackend)));
    }
    let client = GroqClient::new(config.clone(), api_key)?.with_rate_gate(gate);
    Ok(VerdictClassifier::new(Arc::new(client)))
}

// ============================================================================
// TESTS
// ============================================================================
