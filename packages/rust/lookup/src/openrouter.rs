//! OpenRouter-backed lookup and formatting collaborators.
//!
//! One HTTP client serves both stages against the chat-completions
//! endpoint: the search stage runs on a web-search-enabled model, the
//! format stage on a plain model instructed to answer in exactly three
//! lines. The API key comes from the environment at startup and is never
//! written anywhere.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, instrument};

use bomenrich_shared::{BomError, EnrichConfig, Result};

use crate::{PartLookup, ReplyFormat};

/// OpenRouter chat-completions endpoint.
const OPENROUTER_CHAT_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Model-id suffix that enables provider-side web search.
const ONLINE_SUFFIX: &str = ":online";

const SEARCH_SYSTEM_PROMPT: &str = "\
You are an electronics sourcing assistant analyzing Bill of Materials rows.
Given a component's part number and description, search for the component
and report everything you find: full electrical parameters, package and
mounting type, and direct product or datasheet URLs.
Use ONLY information that matches the vendor part number. Do NOT add
manufacturer names to descriptions. Prefer direct product pages over
search or category pages.";

const FORMAT_SYSTEM_PROMPT: &str = "\
You convert raw component findings into a fixed reply shape.
Reply with EXACTLY three lines and nothing else:
Line 1: the enriched component description.
Line 2: the primary product URL, starting with https://, or NO_SOURCE.
Line 3: a second source URL, starting with https://, or NO_SECOND_SOURCE.

Description rules (mandatory):
1. Never drop parameters present in the original description.
2. Add missing parameters found for the part number.
3. Units: UF -> MF (value unchanged), NF -> MF or PF (shortest form),
   OHM -> R, KOHM -> K, MOHM -> M, attached to the value (50 OHM -> 50R).
4. CER -> CRM for ceramic capacitors.
5. Name the mounting type (SMT or TH) when the package implies it.
If the findings identify nothing usable, line 1 is empty.";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, serde::Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, serde::Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, serde::Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, serde::Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, serde::Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// HTTP client for the OpenRouter chat-completions API, implementing both
/// collaborator traits.
pub struct OpenRouterClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    search_model: String,
    format_model: String,
    web_search: bool,
}

impl OpenRouterClient {
    /// Build a client from the runtime config. The per-call timeout bounds
    /// every request so a hung provider cannot stall a job.
    pub fn new(api_key: impl Into<String>, config: &EnrichConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| BomError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: OPENROUTER_CHAT_URL.to_string(),
            api_key: api_key.into(),
            search_model: config.search_model.clone(),
            format_model: config.format_model.clone(),
            web_search: config.web_search,
        })
    }

    /// Point the client at a mock server (for integration tests).
    #[cfg(test)]
    fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Model id for the search stage, with the web-search suffix applied.
    fn search_model_id(&self) -> String {
        if self.web_search {
            format!("{}{ONLINE_SUFFIX}", self.search_model)
        } else {
            self.search_model.clone()
        }
    }

    /// One chat completion round-trip.
    #[instrument(skip_all, fields(model = %model))]
    async fn chat(&self, model: &str, system: &str, user: &str) -> Result<String> {
        let request = ChatRequest {
            model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(map_transport_error)?;

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS
            || status == reqwest::StatusCode::PAYMENT_REQUIRED
            || (!status.is_success() && body.to_lowercase().contains("rate limit"))
        {
            return Err(BomError::RateLimited(format!(
                "HTTP {status}: {}",
                snippet(&body)
            )));
        }
        if !status.is_success() {
            return Err(BomError::Lookup(format!(
                "HTTP {status}: {}",
                snippet(&body)
            )));
        }

        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| BomError::Lookup(format!("malformed completion response: {e}")))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err(BomError::Lookup("completion had no content".into()));
        }

        debug!(chars = content.len(), "completion received");
        Ok(content)
    }
}

#[async_trait]
impl PartLookup for OpenRouterClient {
    async fn search(&self, description: &str, part_number: &str) -> Result<String> {
        let user = format!(
            "Find detailed information about this electronic component.\n\
             Part: {part_number}\n\
             Description: {description}\n\n\
             Report all parameters you can confirm and the product/datasheet URLs."
        );
        self.chat(&self.search_model_id(), SEARCH_SYSTEM_PROMPT, &user)
            .await
    }
}

#[async_trait]
impl ReplyFormat for OpenRouterClient {
    async fn format(
        &self,
        raw_text: &str,
        description: &str,
        part_number: &str,
    ) -> Result<String> {
        let user = format!(
            "Part: {part_number}\n\
             Original description: {description}\n\n\
             Findings:\n{raw_text}\n\n\
             Reply with the three lines now."
        );
        self.chat(&self.format_model, FORMAT_SYSTEM_PROMPT, &user)
            .await
    }
}

/// Classify a reqwest failure: timeouts and connection errors are the
/// transient class the retry policy may repeat; everything else is not.
fn map_transport_error(error: reqwest::Error) -> BomError {
    if error.is_timeout() || error.is_connect() {
        BomError::Transient(error.to_string())
    } else {
        BomError::Network(error.to_string())
    }
}

/// First 200 characters of an error body, for diagnostics.
fn snippet(body: &str) -> String {
    body.chars().take(200).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
