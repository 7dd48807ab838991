use super::Mailer;
use crate::contact::ContactRecord;
use crate::error::{ErrorKind, SendError};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

/// A send attempt observed by the mock.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    pub email: String,
    pub at: Instant,
    pub outcome: Result<(), ErrorKind>,
}

/// Scripted mailer used for dry runs and tests.
///
/// Succeeds unless a failure has been scripted for the recipient, and records
/// every attempt with its (tokio) timestamp.
#[derive(Debug, Default)]
pub struct MockMailer {
    latency: Duration,
    always: Mutex<HashMap<String, ErrorKind>>,
    queued: Mutex<HashMap<String, VecDeque<ErrorKind>>>,
    attempts: Mutex<Vec<AttemptRecord>>,
    sent: Mutex<Vec<(String, String)>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MockMailer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate network time for every send.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Every send to `email` fails with `kind`.
    #[must_use]
    pub fn fail_always(self, email: &str, kind: ErrorKind) -> Self {
        self.always
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(email.to_string(), kind);
        self
    }

    /// The next `times` sends to `email` fail with `kind`, later ones succeed.
    #[must_use]
    pub fn fail_times(self, email: &str, kind: ErrorKind, times: usize) -> Self {
        self.queued
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(email.to_string())
            .or_default()
            .extend(std::iter::repeat(kind).take(times));
        self
    }

    #[must_use]
    pub fn attempts(&self) -> Vec<AttemptRecord> {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Timestamps of every attempt made for `email`, in order.
    #[must_use]
    pub fn attempt_times(&self, email: &str) -> Vec<Instant> {
        self.attempts()
            .into_iter()
            .filter(|a| a.email == email)
            .map(|a| a.at)
            .collect()
    }

    /// `(email, body)` of every delivered message.
    #[must_use]
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Highest number of sends that were in progress at the same time.
    #[must_use]
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn next_outcome(&self, email: &str) -> Result<(), ErrorKind> {
        if let Some(kind) = self
            .always
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(email)
        {
            return Err(*kind);
        }
        self.queued
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(email)
            .and_then(VecDeque::pop_front)
            .map_or(Ok(()), Err)
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send(&self, record: &ContactRecord, body: &str) -> Result<(), SendError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);

        let at = Instant::now();
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let outcome = self.next_outcome(record.email());
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(AttemptRecord {
                email: record.email().to_string(),
                at,
                outcome,
            });

        match outcome {
            Ok(()) => {
                info!(email = %record.email(), "Dry run: message accepted");
                self.sent
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push((record.email().to_string(), body.to_string()));
                Ok(())
            }
            Err(kind) => Err(SendError::new(kind, format!("scripted {kind} failure"))),
        }
    }
}
