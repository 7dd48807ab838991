//! Bounded fan-out of one send task per contact, with fan-in of the results.

use crate::contact::ContactRecord;
use crate::error::{ConfigError, ErrorKind, SendError};
use crate::mailer::Mailer;
use crate::rate_limiter::RateLimiter;
use crate::retry::RetryPolicy;
use futures::FutureExt;
use serde::Serialize;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Renders the message body for one record.
pub type RenderFn = dyn Fn(&ContactRecord) -> Result<String, SendError> + Send + Sync;

/// Terminal outcome for one record. Built once, never modified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendResult {
    index: usize,
    record: ContactRecord,
    success: bool,
    attempts: u32,
    final_error: Option<SendError>,
}

impl SendResult {
    #[must_use]
    pub const fn succeeded(index: usize, record: ContactRecord, attempts: u32) -> Self {
        Self {
            index,
            record,
            success: true,
            attempts,
            final_error: None,
        }
    }

    #[must_use]
    pub const fn failed(index: usize, record: ContactRecord, attempts: u32, error: SendError) -> Self {
        Self {
            index,
            record,
            success: false,
            attempts,
            final_error: Some(error),
        }
    }

    /// Position of the record in the dispatched input.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub const fn record(&self) -> &ContactRecord {
        &self.record
    }

    #[must_use]
    pub const fn success(&self) -> bool {
        self.success
    }

    /// Send attempts made; zero when the record never reached the transport.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    #[must_use]
    pub const fn final_error(&self) -> Option<&SendError> {
        self.final_error.as_ref()
    }

    #[must_use]
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.final_error.as_ref().map(|e| e.kind)
    }
}

struct Shared {
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    mailer: Arc<dyn Mailer>,
    render: Box<RenderFn>,
    cancel: CancellationToken,
    post_send_pause: Duration,
}

/// Worker pool that delivers each record at most `max_workers` at a time.
///
/// Every task takes a permit from the shared [`RateLimiter`] and wraps the
/// send in the [`RetryPolicy`]. One record's failure never affects another.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    max_workers: NonZeroUsize,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    cancel: CancellationToken,
    post_send_pause: Duration,
}

impl Dispatcher {
    /// # Errors
    ///
    /// Returns an error if `max_workers` is zero.
    pub fn new(
        max_workers: usize,
        limiter: Arc<RateLimiter>,
        retry: RetryPolicy,
    ) -> Result<Self, ConfigError> {
        let max_workers = NonZeroUsize::new(max_workers).ok_or(ConfigError::NotPositive {
            field: "max_workers",
        })?;
        Ok(Self {
            max_workers,
            limiter,
            retry,
            cancel: CancellationToken::new(),
            post_send_pause: Duration::ZERO,
        })
    }

    /// Keep a worker idle for `pause` after each successful send.
    ///
    /// The worker's slot stays taken for the pause; cancellation cuts it short.
    #[must_use]
    pub const fn with_post_send_pause(mut self, pause: Duration) -> Self {
        self.post_send_pause = pause;
        self
    }

    /// Use an externally owned token, e.g. one cancelled on Ctrl-C.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    #[must_use]
    pub const fn max_workers(&self) -> usize {
        self.max_workers.get()
    }

    /// Deliver every record and return one result per record, ordered by input position.
    ///
    /// Returns only once every record is terminal. After cancellation no new
    /// record is started; records that never started are reported as
    /// [`ErrorKind::Cancelled`] with zero attempts.
    pub async fn run<R>(
        &self,
        records: Vec<ContactRecord>,
        render: R,
        mailer: Arc<dyn Mailer>,
    ) -> Vec<SendResult>
    where
        R: Fn(&ContactRecord) -> Result<String, SendError> + Send + Sync + 'static,
    {
        let total = records.len();
        info!(
            total,
            max_workers = self.max_workers.get(),
            "Dispatching outreach emails"
        );

        let shared = Arc::new(Shared {
            limiter: Arc::clone(&self.limiter),
            retry: self.retry.clone(),
            mailer,
            render: Box::new(render),
            cancel: self.cancel.clone(),
            post_send_pause: self.post_send_pause,
        });

        let mut pending = records.into_iter().enumerate();
        let mut workers = JoinSet::new();
        let mut in_flight = InFlight::default();
        let mut results = Vec::with_capacity(total);

        loop {
            // Top the pool back up to max_workers before waiting on the next finisher.
            while workers.len() < self.max_workers.get() && !self.cancel.is_cancelled() {
                let Some((index, record)) = pending.next() else {
                    break;
                };
                debug!(index, email = %record.email(), "Submitting email task");
                in_flight.start(index, record.clone());
                workers.spawn(deliver(index, record, Arc::clone(&shared)));
            }

            match workers.join_next().await {
                Some(Ok(result)) => {
                    in_flight.finish(result.index());
                    results.push(result);
                }
                Some(Err(e)) => error!("Dispatch worker failed to complete: {e}"),
                None => break,
            }
        }
        results.extend(in_flight.lost());

        let skipped: Vec<_> = pending
            .map(|(index, record)| SendResult::failed(index, record, 0, SendError::cancelled()))
            .collect();
        if !skipped.is_empty() {
            warn!(skipped = skipped.len(), "Run cancelled before every record was started");
            results.extend(skipped);
        }

        results.sort_by_key(SendResult::index);
        results
    }
}

/// Records handed to a worker that have not reported back yet.
#[derive(Debug, Default)]
struct InFlight {
    records: HashMap<usize, ContactRecord>,
}

impl InFlight {
    fn start(&mut self, index: usize, record: ContactRecord) {
        self.records.insert(index, record);
    }

    fn finish(&mut self, index: usize) {
        self.records.remove(&index);
    }

    /// Failures for workers that ended without producing a result.
    fn lost(self) -> Vec<SendResult> {
        self.records
            .into_iter()
            .map(|(index, record)| {
                error!(index, email = %record.email(), "No result from send task");
                SendResult::failed(
                    index,
                    record,
                    0,
                    SendError::new(ErrorKind::Unclassified, "send task ended without a result"),
                )
            })
            .collect()
    }
}

async fn deliver(index: usize, record: ContactRecord, shared: Arc<Shared>) -> SendResult {
    let outcome = AssertUnwindSafe(attempt_delivery(&record, &shared))
        .catch_unwind()
        .await;

    let (attempts, result) = outcome.unwrap_or_else(|_| {
        (
            0,
            Err(SendError::new(ErrorKind::Unclassified, "send task panicked")),
        )
    });

    match result {
        Ok(()) => {
            info!(
                email = %record.email(),
                attempts,
                "Email sent successfully to {} ({}) after {attempts} attempts",
                record.name(),
                record.email()
            );
            if !shared.post_send_pause.is_zero() {
                tokio::select! {
                    () = shared.cancel.cancelled() => {}
                    () = tokio::time::sleep(shared.post_send_pause) => {}
                }
            }
            SendResult::succeeded(index, record, attempts)
        }
        Err(err) => {
            error!(
                email = %record.email(),
                attempts,
                kind = %err.kind,
                "Failed to send email to {} after {attempts} attempts: {}",
                record.email(),
                err.message
            );
            SendResult::failed(index, record, attempts, err)
        }
    }
}

async fn attempt_delivery(record: &ContactRecord, shared: &Shared) -> (u32, Result<(), SendError>) {
    let body = match (shared.render)(record) {
        Ok(body) => body,
        Err(err) => return (0, Err(err)),
    };

    tokio::select! {
        biased;
        () = shared.cancel.cancelled() => return (0, Err(SendError::cancelled())),
        () = shared.limiter.acquire() => {}
    }

    let mailer = shared.mailer.as_ref();
    let body = body.as_str();
    let outcome = shared
        .retry
        .execute(
            move |attempt| {
                debug!(email = %record.email(), attempt, "Sending email");
                mailer.send(record, body)
            },
            &shared.cancel,
        )
        .await;

    (outcome.attempts, outcome.result)
}
