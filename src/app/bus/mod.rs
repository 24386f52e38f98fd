pub mod message;

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{mpsc, Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::app::error::AppError;

pub use message::{Envelope, Message, MessageKind};

/// A local consumer of posted messages.
pub trait Subscriber: Send + Sync {
    fn name(&self) -> &str;

    /// Every kind this subscriber has a handler for.
    fn handles(&self) -> &[MessageKind];

    fn on_message(&self, message: &Message) -> Result<(), AppError>;
}

#[derive(Debug)]
pub enum TransportError {
    /// The typed channel can't take this envelope; the caller may retry with
    /// the JSON encoding.
    FastPathUnavailable(Envelope),
    Closed(String),
}

/// The single asynchronous channel to the external counterpart.
pub trait Transport: Send + Sync {
    fn send(&self, envelope: Envelope) -> Result<(), TransportError>;

    fn send_encoded(&self, encoded: String) -> Result<(), TransportError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PostReport {
    pub delivered: usize,
    pub failed: usize,
}

struct PendingRequest {
    correlation_id: String,
    expected: MessageKind,
    created_at: DateTime<Utc>,
    resolve: mpsc::Sender<Message>,
}

pub struct EventBus {
    subscribers: RwLock<Vec<Arc<dyn Subscriber>>>,
    pending: Mutex<VecDeque<PendingRequest>>,
    transport: RwLock<Option<Arc<dyn Transport>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            pending: Mutex::new(VecDeque::new()),
            transport: RwLock::new(None),
        }
    }

    pub fn register(&self, subscriber: Arc<dyn Subscriber>) {
        debug!(subscriber = subscriber.name(), "registering subscriber");
        match self.subscribers.write() {
            Ok(mut guard) => guard.push(subscriber),
            Err(poisoned) => poisoned.into_inner().push(subscriber),
        }
    }

    pub fn attach_transport(&self, transport: Arc<dyn Transport>) {
        match self.transport.write() {
            Ok(mut guard) => *guard = Some(transport),
            Err(poisoned) => *poisoned.into_inner() = Some(transport),
        }
    }

    /// Fails with the list of kinds nobody handles.
    pub fn verify_handlers(&self, kinds: &[MessageKind]) -> Result<(), AppError> {
        let subscribers = self.subscriber_snapshot();
        let unhandled: Vec<&'static str> = kinds
            .iter()
            .filter(|kind| {
                !subscribers
                    .iter()
                    .any(|subscriber| subscriber.handles().contains(kind))
            })
            .map(|kind| kind.as_str())
            .collect();
        if unhandled.is_empty() {
            Ok(())
        } else {
            Err(AppError::validation(
                format!("No subscriber handles: {}", unhandled.join(", ")),
                "",
            ))
        }
    }

    /// Delivers to local subscribers in registration order. A failing or
    /// panicking subscriber is logged and skipped.
    pub fn post(&self, message: &Message) -> PostReport {
        let kind = message.kind();
        let mut report = PostReport::default();
        for subscriber in self.subscriber_snapshot() {
            if !subscriber.handles().contains(&kind) {
                continue;
            }
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| subscriber.on_message(message)));
            match outcome {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(err)) => {
                    report.failed += 1;
                    warn!(
                        subscriber = subscriber.name(),
                        kind = %kind,
                        trace_id = %err.trace_id,
                        error = %err,
                        "subscriber failed"
                    );
                }
                Err(_) => {
                    report.failed += 1;
                    warn!(subscriber = subscriber.name(), kind = %kind, "subscriber panicked");
                }
            }
        }
        if report.delivered + report.failed == 0 {
            warn!(kind = %kind, "no subscriber handles message; dropped");
        }
        report
    }

    /// Sends a message to the counterpart. Falls back to the JSON encoding
    /// when the transport's fast path refuses the envelope.
    pub fn send(
        &self,
        message: &Message,
        correlation_id: Option<String>,
        trace_id: &str,
    ) -> Result<(), AppError> {
        let transport = self.transport_snapshot().ok_or_else(|| {
            AppError::transport("No transport attached to the event bus", trace_id)
        })?;
        let envelope = Envelope::wrap(message, correlation_id, trace_id)?;
        match transport.send(envelope) {
            Ok(()) => Ok(()),
            Err(TransportError::FastPathUnavailable(envelope)) => {
                debug!(
                    trace_id = %trace_id,
                    kind = %envelope.kind,
                    "fast path unavailable; sending encoded"
                );
                let encoded = envelope.to_json().map_err(|err| AppError {
                    trace_id: trace_id.to_string(),
                    ..err
                })?;
                transport.send_encoded(encoded).map_err(|err| transport_error(err, trace_id))
            }
            Err(err) => Err(transport_error(err, trace_id)),
        }
    }

    /// Sends `message` and blocks until a reply of `expected` kind carrying
    /// this request's correlation id arrives, or `timeout` elapses.
    pub fn post_and_wait_for_response(
        &self,
        message: &Message,
        expected: MessageKind,
        timeout: Duration,
        trace_id: &str,
    ) -> Result<Message, AppError> {
        let correlation_id = Uuid::new_v4().to_string();
        let (resolve, receiver) = mpsc::channel();
        self.lock_pending().push_back(PendingRequest {
            correlation_id: correlation_id.clone(),
            expected,
            created_at: Utc::now(),
            resolve,
        });
        debug!(
            trace_id = %trace_id,
            correlation_id = %correlation_id,
            kind = %message.kind(),
            expected = %expected,
            "awaiting correlated response"
        );

        if let Err(err) = self.send(message, Some(correlation_id.clone()), trace_id) {
            self.remove_pending(&correlation_id);
            return Err(err);
        }

        match receiver.recv_timeout(timeout) {
            Ok(response) => Ok(response),
            Err(mpsc::RecvTimeoutError::Timeout) => {
                self.remove_pending(&correlation_id);
                warn!(
                    trace_id = %trace_id,
                    correlation_id = %correlation_id,
                    expected = %expected,
                    timeout_ms = timeout.as_millis() as u64,
                    "correlated wait timed out"
                );
                Err(AppError::timeout(
                    format!("No {expected} within {}ms", timeout.as_millis()),
                    trace_id,
                ))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                self.remove_pending(&correlation_id);
                Err(AppError::transport(
                    format!("Pending {expected} was discarded before it resolved"),
                    trace_id,
                ))
            }
        }
    }

    /// Entry point for envelopes arriving from the counterpart.
    ///
    /// An envelope with a correlation id resolves exactly that pending
    /// request or is dropped as late. One without an id resolves the oldest
    /// waiter of its kind; if nobody waits it is posted to subscribers.
    pub fn receive(&self, envelope: Envelope) {
        let message = match envelope.open() {
            Ok(message) => message,
            Err(err) => {
                warn!(kind = %envelope.kind, error = %err, "dropping undecodable envelope");
                return;
            }
        };
        let kind = message.kind();

        let pending = {
            let mut guard = self.lock_pending();
            let position = match envelope.correlation_id.as_deref() {
                Some(id) => guard
                    .iter()
                    .position(|entry| entry.correlation_id == id && entry.expected == kind),
                None => guard.iter().position(|entry| entry.expected == kind),
            };
            position.and_then(|index| guard.remove(index))
        };

        match (pending, envelope.correlation_id) {
            (Some(entry), _) => {
                let waited_ms = (Utc::now() - entry.created_at).num_milliseconds();
                debug!(
                    correlation_id = %entry.correlation_id,
                    kind = %kind,
                    waited_ms,
                    "resolved pending request"
                );
                let _ = entry.resolve.send(message);
            }
            (None, Some(correlation_id)) => {
                debug!(
                    correlation_id = %correlation_id,
                    kind = %kind,
                    "no pending request for response; dropped"
                );
            }
            (None, None) => {
                self.post(&message);
            }
        }
    }

    pub fn pending_count(&self) -> usize {
        self.lock_pending().len()
    }

    fn remove_pending(&self, correlation_id: &str) -> Option<PendingRequest> {
        let mut guard = self.lock_pending();
        let index = guard
            .iter()
            .position(|entry| entry.correlation_id == correlation_id)?;
        guard.remove(index)
    }

    fn lock_pending(&self) -> MutexGuard<'_, VecDeque<PendingRequest>> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn subscriber_snapshot(&self) -> Vec<Arc<dyn Subscriber>> {
        match self.subscribers.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn transport_snapshot(&self) -> Option<Arc<dyn Transport>> {
        match self.transport.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

fn transport_error(err: TransportError, trace_id: &str) -> AppError {
    match err {
        TransportError::FastPathUnavailable(envelope) => AppError::transport(
            format!("Transport refused {} envelope", envelope.kind),
            trace_id,
        ),
        TransportError::Closed(reason) => {
            AppError::transport(format!("Transport closed: {reason}"), trace_id)
        }
    }
}
