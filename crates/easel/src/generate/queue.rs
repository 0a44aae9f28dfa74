//! Generation job queue with bounded concurrency and rate limiting.
//!
//! Two independent gates stand between a job and the provider:
//!
//! - a fair semaphore bounds how many jobs are logically in flight; its
//!   FIFO waiter queue is the pending list, and a retry that re-acquires
//!   lands at the tail (the re-queue);
//! - a shared "next allowed call" instant spaces successive provider
//!   calls by at least `60000 / rate_limit_per_minute` ms process-wide,
//!   independent of how many jobs hold permits.
//!
//! Jobs are in-memory only; a process restart loses whatever is in
//! flight. There is no cancellation — an admitted job runs to resolution.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Semaphore};
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, warn};

use crate::config::GenerationConfig;

use super::provider::{placeholder_url, ImageProvider};

pub struct GenerationQueue {
    provider: Arc<dyn ImageProvider>,
    concurrency: Semaphore,
    next_slot: Mutex<Instant>,
    min_interval: Duration,
    max_attempts: u32,
    fallback_delay: Duration,
}

impl GenerationQueue {
    /// Builds a queue over the given provider. Both limits are fixed for
    /// the life of the queue.
    pub fn new(provider: Arc<dyn ImageProvider>, config: &GenerationConfig) -> Self {
        Self {
            provider,
            concurrency: Semaphore::new(config.max_concurrent_jobs),
            next_slot: Mutex::new(Instant::now()),
            min_interval: config.min_call_interval(),
            max_attempts: config.max_attempts.max(1),
            fallback_delay: Duration::from_millis(config.fallback_delay_ms),
        }
    }

    /// Generates an image for the prompt and returns its URL.
    ///
    /// Never fails: provider errors re-queue the job up to `max_attempts`
    /// times, after which it resolves with the deterministic placeholder.
    /// Callers need no failure branch.
    pub async fn generate(&self, prompt: &str, is_batch: bool) -> String {
        for attempt in 1..=self.max_attempts {
            let permit = match self.concurrency.acquire().await {
                Ok(permit) => permit,
                // The semaphore is never closed; treat it like a final
                // provider failure if it ever is.
                Err(_) => break,
            };

            self.wait_for_rate_slot().await;

            debug!(attempt, is_batch, "Calling generation provider");
            match self.provider.generate(prompt).await {
                Ok(url) => return url,
                Err(e) => {
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "Provider call failed, re-queueing job"
                    );
                }
            }
            drop(permit);
        }

        warn!("Generation attempts exhausted, resolving with placeholder");
        sleep(self.fallback_delay).await;
        placeholder_url(prompt)
    }

    /// Claims the next provider-call slot and sleeps until it arrives.
    /// The shared instant is the serialization point for call timing.
    async fn wait_for_rate_slot(&self) {
        let deadline = {
            let mut next = self.next_slot.lock().await;
            let now = Instant::now();
            let deadline = if *next > now { *next } else { now };
            *next = deadline + self.min_interval;
            deadline
        };
        sleep_until(deadline).await;
    }
}
