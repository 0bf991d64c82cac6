//! Blocking HTTP client for the reasoning service (messages API).
//!
//! One request per document: the original PDF as a base64 document block
//! plus the cached system prompt. HTTP 429/529 map to
//! [`ReasoningError::Overloaded`] so the cycle driver can abort and retry
//! later; every other failure is permanent for this attempt.

use std::collections::VecDeque;
use std::sync::Mutex;

use base64::Engine;
use serde::{Deserialize, Serialize};

use super::pricing::calculate_cost;
use super::proposal::ClassificationProposal;
use super::ReasoningError;

/// Maximum document size accepted by the messages API.
const MAX_DOCUMENT_BYTES: usize = 32 * 1024 * 1024;

const API_VERSION: &str = "2023-06-01";

/// Token counts and computed cost for one request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_write_tokens: u64,
    pub cost_usd: f64,
}

/// Full result of one classification request.
#[derive(Debug, Clone)]
pub struct ClassifyResponse {
    pub proposal: ClassificationProposal,
    pub usage: TokenUsage,
    /// Model that actually answered.
    pub model: String,
    /// Raw answer text, persisted for audit.
    pub raw_answer: String,
    pub stop_reason: String,
}

/// Abstract reasoning operations used by the pipeline.
pub trait ReasoningClient: Send + Sync {
    fn classify(
        &self,
        pdf: &[u8],
        system_prompt: &str,
        model: &str,
    ) -> Result<ClassifyResponse, ReasoningError>;
}

// ──────────────────────────────────────────────
// HTTP implementation
// ──────────────────────────────────────────────

#[derive(Debug)]
pub struct HttpReasoningClient {
    base_url: String,
    api_key: String,
    max_answer_tokens: u32,
    client: reqwest::blocking::Client,
}

impl HttpReasoningClient {
    pub fn new(
        base_url: &str,
        api_key: &str,
        max_answer_tokens: u32,
        timeout_secs: u64,
    ) -> Result<Self, ReasoningError> {
        if api_key.is_empty() {
            return Err(ReasoningError::Config("API key is not set".into()));
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ReasoningError::Config(e.to_string()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            max_answer_tokens,
            client,
        })
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: Vec<SystemBlock<'a>>,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct SystemBlock<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
    cache_control: CacheControl,
}

#[derive(Serialize)]
struct CacheControl {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: Vec<ContentBlock<'a>>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ContentBlock<'a> {
    Document { source: DocumentSource },
    Text { text: &'a str },
}

#[derive(Serialize)]
struct DocumentSource {
    #[serde(rename = "type")]
    kind: &'static str,
    media_type: &'static str,
    data: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<AnswerBlock>,
    #[serde(default)]
    model: String,
    #[serde(default)]
    stop_reason: Option<String>,
    usage: ResponseUsage,
}

#[derive(Deserialize)]
struct AnswerBlock {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct ResponseUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
    #[serde(default)]
    cache_read_input_tokens: u64,
    #[serde(default)]
    cache_creation_input_tokens: u64,
}

impl ReasoningClient for HttpReasoningClient {
    fn classify(
        &self,
        pdf: &[u8],
        system_prompt: &str,
        model: &str,
    ) -> Result<ClassifyResponse, ReasoningError> {
        if pdf.len() > MAX_DOCUMENT_BYTES {
            return Err(ReasoningError::Config(format!(
                "document too large for the messages API: {} bytes",
                pdf.len()
            )));
        }

        let body = MessagesRequest {
            model,
            max_tokens: self.max_answer_tokens,
            system: vec![SystemBlock {
                kind: "text",
                text: system_prompt,
                cache_control: CacheControl { kind: "ephemeral" },
            }],
            messages: vec![Message {
                role: "user",
                content: vec![
                    ContentBlock::Document {
                        source: DocumentSource {
                            kind: "base64",
                            media_type: "application/pdf",
                            data: base64::engine::general_purpose::STANDARD.encode(pdf),
                        },
                    },
                    ContentBlock::Text {
                        text: "Classify this document.",
                    },
                ],
            }],
        };

        let url = format!("{}/v1/messages", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_connect() {
                    ReasoningError::Connection(self.base_url.clone())
                } else {
                    ReasoningError::Http(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if status == 429 || status == 529 {
            return Err(ReasoningError::Overloaded { status });
        }
        if !response.status().is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ReasoningError::Api { status, body });
        }

        let parsed: MessagesResponse = response
            .json()
            .map_err(|e| ReasoningError::MalformedResponse(e.to_string()))?;

        let raw_answer = parsed
            .content
            .first()
            .map(|b| b.text.clone())
            .unwrap_or_default();
        let proposal = ClassificationProposal::parse(&raw_answer)?;

        let answered_model = if parsed.model.is_empty() {
            model.to_string()
        } else {
            parsed.model
        };
        let usage = TokenUsage {
            input_tokens: parsed.usage.input_tokens,
            output_tokens: parsed.usage.output_tokens,
            cache_read_tokens: parsed.usage.cache_read_input_tokens,
            cache_write_tokens: parsed.usage.cache_creation_input_tokens,
            cost_usd: calculate_cost(
                &answered_model,
                parsed.usage.input_tokens,
                parsed.usage.output_tokens,
                parsed.usage.cache_read_input_tokens,
                parsed.usage.cache_creation_input_tokens,
            ),
        };

        Ok(ClassifyResponse {
            proposal,
            usage,
            model: answered_model,
            raw_answer,
            stop_reason: parsed.stop_reason.unwrap_or_default(),
        })
    }
}

// ──────────────────────────────────────────────
// Mock for tests
// ──────────────────────────────────────────────

/// Scripted reasoning client for tests. Each call pops the next scripted
/// result; the models used are recorded so tests can assert routing.
#[derive(Default)]
pub struct MockReasoningClient {
    script: Mutex<VecDeque<Result<ClassifyResponse, ReasoningError>>>,
    pub models_called: Mutex<Vec<String>>,
}

impl MockReasoningClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful answer parsed from raw proposal JSON.
    pub fn push_answer(&self, proposal_json: &str, cost_usd: f64) {
        let proposal =
            ClassificationProposal::parse(proposal_json).expect("mock proposal must parse");
        self.script
            .lock()
            .unwrap()
            .push_back(Ok(ClassifyResponse {
                proposal,
                usage: TokenUsage {
                    input_tokens: 1200,
                    output_tokens: 300,
                    cache_read_tokens: 0,
                    cache_write_tokens: 0,
                    cost_usd,
                },
                model: "mock-model".into(),
                raw_answer: proposal_json.to_string(),
                stop_reason: "end_turn".into(),
            }));
    }

    pub fn push_error(&self, error: ReasoningError) {
        self.script.lock().unwrap().push_back(Err(error));
    }

    pub fn call_count(&self) -> usize {
        self.models_called.lock().unwrap().len()
    }
}

impl ReasoningClient for MockReasoningClient {
    fn classify(
        &self,
        _pdf: &[u8],
        _system_prompt: &str,
        model: &str,
    ) -> Result<ClassifyResponse, ReasoningError> {
        self.models_called.lock().unwrap().push(model.to_string());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ReasoningError::Config("mock script exhausted".into())))
    }
}
