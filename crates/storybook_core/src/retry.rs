//! crates/storybook_core/src/retry.rs
//!
//! Bounded retry with exponential backoff for outbound generative calls.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::ports::{
    ImageData, ImageGenerationService, OutputSchema, PortResult, TextGenerationService,
};

/// How often and how patiently a transient failure is retried.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Zero behaves like one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(retry.saturating_sub(1) as i32);
        let nanos = self.initial_backoff.as_nanos() as f64 * factor;
        Duration::from_nanos(nanos.min(u64::MAX as f64) as u64).min(self.max_backoff)
    }

    /// Runs `op` until it succeeds, fails permanently, or attempts run out.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> PortResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = PortResult<T>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Err(e) if e.is_retryable() && attempt < attempts => {
                    let delay = self.backoff(attempt);
                    warn!(
                        "{} failed (attempt {}/{}): {}. Retrying in {:?}",
                        label, attempt, attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

/// Wraps a generative service so that every call goes through a [`RetryPolicy`].
pub struct Retrying<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S> Retrying<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<S: TextGenerationService> TextGenerationService for Retrying<S> {
    async fn generate_structured(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        schema: &OutputSchema,
    ) -> PortResult<Option<serde_json::Value>> {
        self.policy
            .run("Structured text generation", || {
                self.inner
                    .generate_structured(system_prompt, user_prompt, schema)
            })
            .await
    }
}

#[async_trait]
impl<S: ImageGenerationService> ImageGenerationService for Retrying<S> {
    async fn generate_image(
        &self,
        prompt: &str,
        reference_image: Option<&ImageData>,
    ) -> PortResult<Option<ImageData>> {
        self.policy
            .run("Image generation", || {
                self.inner.generate_image(prompt, reference_image)
            })
            .await
    }
}
