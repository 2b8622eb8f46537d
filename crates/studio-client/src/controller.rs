//! Generation controller: runs one logical "generate" operation against the
//! API, retrying retryable failures with exponential backoff and staying
//! cancellable at every suspension point.
//!
//! ```text
//! Idle -> Attempting(0) -> Succeeded
//!                       -> Attempting(n + 1)   retryable and n < max_retries, after backoff
//!                       -> FailedFatal         anything else
//!                       -> Cancelled           abort() at any point
//! ```

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use studio_types::api::GenerationRecord;
use studio_types::models::{ImageMime, Style};

use crate::api::Session;
use crate::error::AttemptError;
use crate::retry::RetryPolicy;

/// Error state after a cancelled operation.
pub const CANCELLED_MESSAGE: &str = "Generation cancelled";

/// One upload plus its metadata. Built once per logical operation and
/// reused verbatim by every retry.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub image: Bytes,
    pub file_name: String,
    pub mime: ImageMime,
    pub prompt: String,
    pub style: Style,
}

impl GenerationRequest {
    pub fn new(
        image: impl Into<Bytes>,
        file_name: impl Into<String>,
        mime: ImageMime,
        prompt: impl Into<String>,
        style: Style,
    ) -> Self {
        Self {
            image: image.into(),
            file_name: file_name.into(),
            mime,
            prompt: prompt.into(),
            style,
        }
    }
}

/// Performs a single `POST /generations` attempt.
pub trait GenerationTransport: Send + Sync {
    fn create_generation(
        &self,
        session: &Session,
        request: &GenerationRequest,
    ) -> impl Future<Output = Result<GenerationRecord, AttemptError>> + Send;
}

/// What a UI observes. Every transition overwrites the fields it owns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationState {
    pub is_generating: bool,
    pub error: Option<String>,
    pub result: Option<GenerationRecord>,
    /// Index of the current (or last) attempt, 0 for the first try.
    pub retry_count: u32,
}

enum Outcome {
    Succeeded(GenerationRecord),
    Failed(AttemptError),
    Cancelled,
}

pub struct GenerationController<T> {
    transport: T,
    policy: RetryPolicy,
    state: watch::Sender<GenerationState>,
    /// Token of the operation in flight. Every state write and `abort()`
    /// happens under this lock, so once an operation is cancelled it can
    /// never publish again.
    inflight: Mutex<Option<CancellationToken>>,
}

impl<T: GenerationTransport> GenerationController<T> {
    pub fn new(transport: T) -> Self {
        Self::with_policy(transport, RetryPolicy::default())
    }

    pub fn with_policy(transport: T, policy: RetryPolicy) -> Self {
        let (state, _) = watch::channel(GenerationState::default());
        Self {
            transport,
            policy,
            state,
            inflight: Mutex::new(None),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn subscribe(&self) -> watch::Receiver<GenerationState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> GenerationState {
        self.state.borrow().clone()
    }

    pub fn is_generating(&self) -> bool {
        self.lock_inflight().is_some()
    }

    /// Run one logical generate operation to completion.
    ///
    /// Returns the record on success. Returns `None` on terminal failure or
    /// cancellation, with the reason in the observable `error`. A call made
    /// while another operation is in flight is rejected: it returns `None`
    /// at once and leaves the running operation's state untouched.
    ///
    /// Dropping the returned future before it settles cancels the operation.
    pub async fn generate(
        &self,
        session: &Session,
        request: GenerationRequest,
    ) -> Option<GenerationRecord> {
        let Some(token) = self.begin() else {
            warn!("Generation already in progress; rejecting concurrent request");
            return None;
        };
        let guard = CancelOnDrop {
            controller: self,
            token: token.clone(),
        };

        let outcome = self.run(&token, session, &request).await;
        let record = self.settle(&token, outcome);
        drop(guard);
        record
    }

    /// Cancel the in-flight attempt or pending backoff. No-op when idle.
    pub fn abort(&self) {
        let mut slot = self.lock_inflight();
        if let Some(token) = slot.take() {
            self.cancel_locked(&token);
            info!("Generation cancelled");
        }
    }

    /// Clear `error`, `result` and `retry_count`. Ignored while generating.
    pub fn reset(&self) {
        let slot = self.lock_inflight();
        if slot.is_some() {
            return;
        }
        self.state.send_replace(GenerationState::default());
    }

    fn begin(&self) -> Option<CancellationToken> {
        let mut slot = self.lock_inflight();
        if slot.is_some() {
            return None;
        }
        let token = CancellationToken::new();
        *slot = Some(token.clone());
        self.state.send_modify(|s| {
            s.is_generating = true;
            s.error = None;
            s.retry_count = 0;
        });
        Some(token)
    }

    async fn run(
        &self,
        token: &CancellationToken,
        session: &Session,
        request: &GenerationRequest,
    ) -> Outcome {
        let mut attempt: u32 = 0;
        loop {
            if !self.publish(token, |s| {
                s.retry_count = attempt;
                s.error = None;
            }) {
                return Outcome::Cancelled;
            }

            debug!("Generation attempt {}", attempt);
            let result = tokio::select! {
                biased;
                _ = token.cancelled() => return Outcome::Cancelled,
                result = self.transport.create_generation(session, request) => result,
            };

            let error = match result {
                Ok(record) => return Outcome::Succeeded(record),
                Err(error) => error,
            };

            if !self.policy.should_retry(attempt, &error) {
                return Outcome::Failed(error);
            }

            let delay = self.policy.backoff(attempt);
            warn!(
                "Attempt {} failed ({}); retrying in {:?}",
                attempt, error, delay
            );

            tokio::select! {
                biased;
                _ = token.cancelled() => return Outcome::Cancelled,
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }

    fn settle(&self, token: &CancellationToken, outcome: Outcome) -> Option<GenerationRecord> {
        let mut slot = self.lock_inflight();
        // Cancelled operations were already settled by whoever cancelled them
        if token.is_cancelled() {
            return None;
        }
        *slot = None;
        token.cancel();

        match outcome {
            Outcome::Succeeded(record) => {
                info!("Generation {} completed", record.id);
                self.state.send_modify(|s| {
                    s.is_generating = false;
                    s.error = None;
                    s.result = Some(record.clone());
                });
                Some(record)
            }
            Outcome::Failed(error) => {
                warn!("Generation failed: {}", error);
                self.state.send_modify(|s| {
                    s.is_generating = false;
                    s.error = Some(error.user_message());
                });
                None
            }
            Outcome::Cancelled => None,
        }
    }

    /// Apply `f` unless the operation owning `token` has been cancelled.
    fn publish(&self, token: &CancellationToken, f: impl FnOnce(&mut GenerationState)) -> bool {
        let _slot = self.lock_inflight();
        if token.is_cancelled() {
            return false;
        }
        self.state.send_modify(f);
        true
    }

    /// Cancel `token` and publish the cancelled state. Caller holds the lock.
    fn cancel_locked(&self, token: &CancellationToken) {
        token.cancel();
        self.state.send_modify(|s| {
            s.is_generating = false;
            s.error = Some(CANCELLED_MESSAGE.to_string());
        });
    }

    fn lock_inflight(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.inflight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Settles an abandoned operation as cancelled when `generate` is dropped
/// mid-flight.
struct CancelOnDrop<'a, T: GenerationTransport> {
    controller: &'a GenerationController<T>,
    token: CancellationToken,
}

impl<T: GenerationTransport> Drop for CancelOnDrop<'_, T> {
    fn drop(&mut self) {
        let mut slot = self.controller.lock_inflight();
        if self.token.is_cancelled() {
            return;
        }
        slot.take();
        self.controller.cancel_locked(&self.token);
        info!("Generation abandoned before settling");
    }
}
