//! Text-generation collaborators for BOM enrichment.
//!
//! The enrichment pipeline talks to two collaborators per row: a lookup
//! that searches for component information and a formatter that compresses
//! the findings into a strict three-line reply (description, primary URL,
//! secondary URL). Both are expressed as traits so the pipeline can be
//! driven by mocks in tests; [`OpenRouterClient`] implements both against
//! the OpenRouter chat-completions API.

mod openrouter;

pub use openrouter::OpenRouterClient;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use bomenrich_shared::{BomError, Result};

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

/// Searches for information about one component.
#[async_trait]
pub trait PartLookup: Send + Sync {
    /// Look up a component, returning the raw findings text.
    async fn search(&self, description: &str, part_number: &str) -> Result<String>;
}

/// Compresses raw findings into the three-line reply contract.
#[async_trait]
pub trait ReplyFormat: Send + Sync {
    /// Format raw findings. A conforming reply is exactly three lines:
    /// enriched description, primary source URL, secondary source URL.
    async fn format(&self, raw_text: &str, description: &str, part_number: &str)
    -> Result<String>;
}

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Bounded fixed-delay retry for collaborator calls.
///
/// Only transient transport failures are retried; everything else, rate
/// limits included, propagates on the first attempt.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Fixed delay between attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Whether `error` is safe to retry as-is.
    pub fn is_retryable(&self, error: &BomError) -> bool {
        error.is_transient()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(500),
        }
    }
}

/// Run `operation` under `policy`, sleeping between retryable failures.
pub async fn with_retry<T, Op, Fut>(policy: &RetryPolicy, mut operation: Op) -> Result<T>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) if policy.is_retryable(&error) && attempt < policy.max_attempts => {
                warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    %error,
                    "transient failure, retrying"
                );
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
