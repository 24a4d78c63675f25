//! Retry-with-jitter and circuit breaking around a [`ModelProvider`] (§4.3).

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use tokio::sync::Mutex;
use tracing::warn;

use crate::message::Message;

use super::{InvokeOptions, ModelProvider, ProviderError, ProviderErrorKind, ProviderResponse};

const CIRCUIT_CLOSED: u8 = 0;
const CIRCUIT_OPEN: u8 = 1;
const CIRCUIT_HALF_OPEN: u8 = 2;

/// Per-provider circuit breaker. While open, calls fail immediately with a
/// permanent error; after `cool_down` it transitions half-open and lets the
/// next call probe the upstream.
pub struct CircuitBreaker {
    state: AtomicU8,
    consecutive_failures: AtomicU32,
    failure_threshold: u32,
    cool_down: Duration,
    opened_at: Mutex<Option<Instant>>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cool_down: Duration) -> Self {
        Self {
            state: AtomicU8::new(CIRCUIT_CLOSED),
            consecutive_failures: AtomicU32::new(0),
            failure_threshold,
            cool_down,
            opened_at: Mutex::new(None),
        }
    }

    /// Returns `Err` immediately if the circuit is open and the cool-down hasn't elapsed.
    async fn admit(&self) -> Result<(), ProviderError> {
        if self.state.load(Ordering::SeqCst) != CIRCUIT_OPEN {
            return Ok(());
        }
        let elapsed = self.opened_at.lock().await.map(|t| t.elapsed());
        match elapsed {
            Some(e) if e >= self.cool_down => {
                self.state.store(CIRCUIT_HALF_OPEN, Ordering::SeqCst);
                Ok(())
            }
            _ => Err(ProviderError::new(
                ProviderErrorKind::Unknown,
                "circuit breaker open",
            )),
        }
    }

    pub async fn record_result(&self, err: Option<&ProviderError>) {
        match err {
            None => {
                self.consecutive_failures.store(0, Ordering::SeqCst);
                self.state.store(CIRCUIT_CLOSED, Ordering::SeqCst);
            }
            Some(e) if e.is_retryable() || self.state.load(Ordering::SeqCst) == CIRCUIT_HALF_OPEN => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
                if failures >= self.failure_threshold {
                    self.state.store(CIRCUIT_OPEN, Ordering::SeqCst);
                    *self.opened_at.lock().await = Some(Instant::now());
                }
            }
            Some(_) => {}
        }
    }
}

/// Wraps a [`ModelProvider`] with exponential-backoff retry (jittered) and a
/// circuit breaker. Only `{rate_limited, overloaded, internal}` are retried.
pub struct ResilientProvider<P: ModelProvider> {
    inner: P,
    breaker: Arc<CircuitBreaker>,
    max_attempts: u32,
    max_delay: Duration,
}

impl<P: ModelProvider> ResilientProvider<P> {
    pub fn new(inner: P, max_attempts: u32, max_delay: Duration) -> Self {
        Self {
            inner,
            breaker: Arc::new(CircuitBreaker::new(5, Duration::from_secs(30))),
            max_attempts,
            max_delay,
        }
    }

    pub fn with_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = breaker;
        self
    }
}

#[async_trait]
impl<P: ModelProvider> ModelProvider for ResilientProvider<P> {
    async fn invoke_model(
        &self,
        model_name: &str,
        system_prompt: &str,
        messages: &[Message],
        mut opts: InvokeOptions,
    ) -> Result<ProviderResponse, ProviderError> {
        self.breaker.admit().await?;

        let mut backoff = ExponentialBackoff {
            max_elapsed_time: Some(self.max_delay),
            ..Default::default()
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            // `opts` carries a non-Clone callback; only the first attempt gets it streamed,
            // retries fall back to non-streaming (the model is re-asked from scratch anyway).
            let remaining_tools = opts.tools.clone();
            let remaining_profile = opts.model_profile.clone();
            let call_opts = std::mem::replace(
                &mut opts,
                InvokeOptions {
                    tools: remaining_tools,
                    on_chunk: None,
                    model_profile: remaining_profile,
                },
            );
            match self.inner.invoke_model(model_name, system_prompt, messages, call_opts).await {
                Ok(resp) => {
                    self.breaker.record_result(None).await;
                    return Ok(resp);
                }
                Err(err) => {
                    self.breaker.record_result(Some(&err)).await;
                    if !err.is_retryable() || attempt >= self.max_attempts {
                        return Err(err);
                    }
                    let delay = err
                        .retry_after
                        .or_else(|| backoff.next_backoff())
                        .unwrap_or(self.max_delay);
                    warn!(attempt, ?delay, kind = ?err.kind, "retrying provider call");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Usage;
    use crate::provider::MockProvider;
    use std::time::Duration;

    #[tokio::test]
    async fn retries_retryable_errors_up_to_max_attempts() {
        let provider = MockProvider::new(vec![
            Err(ProviderError::new(ProviderErrorKind::Overloaded, "busy")),
            Ok(ProviderResponse {
                content: vec![],
                usage: Usage::default(),
            }),
        ]);
        let resilient = ResilientProvider::new(provider, 3, Duration::from_millis(50));
        let result = resilient
            .invoke_model("m", "sys", &[], InvokeOptions::default())
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn does_not_retry_non_retryable_errors() {
        let provider = MockProvider::new(vec![Err(ProviderError::new(
            ProviderErrorKind::InvalidRequest,
            "bad request",
        ))]);
        let resilient = ResilientProvider::new(provider, 3, Duration::from_millis(50));
        let result = resilient
            .invoke_model("m", "sys", &[], InvokeOptions::default())
            .await;
        assert!(matches!(
            result.unwrap_err().kind,
            ProviderErrorKind::InvalidRequest
        ));
    }
}
