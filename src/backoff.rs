//! Exponential backoff with jitter.

use std::ops::ControlFlow;
use std::time::Duration;

use rand::prelude::*;
use thiserror::Error;
use tracing::info;

/// Exponential backoff with jitter
///
/// See <https://aws.amazon.com/blogs/architecture/exponential-backoff-and-jitter/>
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    pub init_backoff: Duration,
    pub max_backoff: Duration,
    pub base: f64,
    pub deadline: Option<Duration>,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            init_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(60),
            base: 2.,
            deadline: None,
        }
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BackoffError {
    #[error("Retry exceeded deadline of {deadline:?}. Source: {source}")]
    DeadlineExceeded {
        deadline: Duration,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

pub type BackoffResult<T> = Result<T, BackoffError>;

/// Error (which should increase backoff) or throttle for a specific duration
/// (as asked for by the broker).
#[derive(Debug)]
pub enum ErrorOrThrottle<E> {
    Error(E),
    Throttle(Duration),
}

/// [`Backoff`] can be created from a [`BackoffConfig`]
///
/// Consecutive calls to [`Backoff::next`] will return the next backoff interval
pub struct Backoff {
    init_backoff: f64,
    next_backoff_secs: f64,
    max_backoff_secs: f64,
    base: f64,
    total: f64,
    deadline: Option<f64>,
    rng: Option<Box<dyn RngCore + Sync + Send>>,
}

impl std::fmt::Debug for Backoff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backoff")
            .field("init_backoff", &self.init_backoff)
            .field("next_backoff_secs", &self.next_backoff_secs)
            .field("max_backoff_secs", &self.max_backoff_secs)
            .field("base", &self.base)
            .field("total", &self.total)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

impl Backoff {
    /// Create a new [`Backoff`] from the provided [`BackoffConfig`]
    pub fn new(config: &BackoffConfig) -> Self {
        Self::new_with_rng(config, None)
    }

    /// Creates a new `Backoff` with the optional `rng`
    ///
    /// Uses [`rand::thread_rng()`] if no rng is provided
    pub fn new_with_rng(
        config: &BackoffConfig,
        rng: Option<Box<dyn RngCore + Sync + Send>>,
    ) -> Self {
        let init_backoff = config.init_backoff.as_secs_f64();
        Self {
            init_backoff,
            next_backoff_secs: init_backoff,
            max_backoff_secs: config.max_backoff.as_secs_f64(),
            base: config.base,
            total: 0.0,
            deadline: config.deadline.map(|d| d.as_secs_f64()),
            rng,
        }
    }

    /// Starts over from the initial backoff.
    pub fn reset(&mut self) {
        self.next_backoff_secs = self.init_backoff;
        self.total = 0.0;
    }

    /// Returns the next backoff duration to wait for
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Duration {
        let range = self.init_backoff..(self.next_backoff_secs * self.base);

        let rand_backoff = match self.rng.as_mut() {
            Some(rng) => rng.gen_range(range),
            None => thread_rng().gen_range(range),
        };

        let next_backoff = self.max_backoff_secs.min(rand_backoff);
        let current = std::mem::replace(&mut self.next_backoff_secs, next_backoff);
        self.total += current;
        Duration::from_secs_f64(current)
    }

    /// Perform an async operation that retries with a backoff
    pub async fn retry_with_backoff<F, F1, B, E>(
        &mut self,
        request_name: &str,
        do_stuff: F,
    ) -> BackoffResult<B>
    where
        F: (Fn() -> F1) + Send + Sync,
        F1: std::future::Future<Output = ControlFlow<B, ErrorOrThrottle<E>>> + Send,
        E: std::error::Error + Send + Sync + 'static,
    {
        loop {
            // split match statement from `tokio::time::sleep`, because otherwise rustc requires `B: Send`
            let sleep_time = match do_stuff().await {
                ControlFlow::Break(r) => {
                    break Ok(r);
                }
                ControlFlow::Continue(ErrorOrThrottle::Error(e)) => {
                    let backoff = self.next();

                    if let Some(deadline) = self.deadline {
                        if self.total > deadline {
                            return Err(BackoffError::DeadlineExceeded {
                                deadline: Duration::from_secs_f64(deadline),
                                source: Box::new(e),
                            });
                        }
                    }

                    info!(
                        e=%e,
                        request_name,
                        backoff_secs = backoff.as_secs_f64(),
                        "request encountered non-fatal error - backing off",
                    );

                    backoff
                }
                ControlFlow::Continue(ErrorOrThrottle::Throttle(throttle)) => {
                    info!(
                        request_name,
                        throttle_secs = throttle.as_secs_f64(),
                        "broker asked us to throttle",
                    );

                    throttle
                }
            };

            tokio::time::sleep(sleep_time).await;
        }
    }
}
