//! Serialized, rate-limited delivery of outbound messages.
//!
//! The poller enqueues rendered messages on a [`DispatchQueue`]; a single
//! [`DispatchWorker`] drains them in arrival order, waits out the minimum
//! spacing between sends and hands each one to the session exactly once.
//! Failures are counted and logged, never retried.

use crate::error::SendError;
use crate::events::OutboundMessage;
use crate::session::SessionManager;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Where the worker delivers messages.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn deliver(&self, text: &str) -> Result<(), SendError>;
}

#[async_trait]
impl MessageSink for SessionManager {
    async fn deliver(&self, text: &str) -> Result<(), SendError> {
        self.send(text).await
    }
}

/// Delivery counters shared with the health reporter.
#[derive(Debug, Default)]
pub struct DispatchStats {
    enqueued: AtomicU64,
    sent: AtomicU64,
    dropped: AtomicU64,
}

/// Point-in-time copy of [`DispatchStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DispatchCounts {
    pub enqueued: u64,
    pub sent: u64,
    pub dropped: u64,
}

impl DispatchStats {
    #[must_use]
    pub fn snapshot(&self) -> DispatchCounts {
        DispatchCounts {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Producer side of the queue.
#[derive(Clone)]
pub struct DispatchQueue {
    tx: mpsc::UnboundedSender<OutboundMessage>,
    stats: Arc<DispatchStats>,
}

impl DispatchQueue {
    /// Create the queue and the worker that drains it into `sink`.
    pub fn new(sink: Arc<dyn MessageSink>, min_interval: Duration) -> (Self, DispatchWorker) {
        let (tx, rx) = mpsc::unbounded_channel();
        let stats = Arc::new(DispatchStats::default());
        let queue = Self {
            tx,
            stats: Arc::clone(&stats),
        };
        let worker = DispatchWorker {
            rx,
            sink,
            min_interval,
            stats,
            last_attempt: None,
        };
        (queue, worker)
    }

    /// Queue a message. If the worker has already stopped the message is
    /// dropped and counted.
    pub fn enqueue(&self, message: OutboundMessage) {
        self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
        if self.tx.send(message).is_err() {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            warn!("dispatch worker stopped; message dropped");
        }
    }

    #[must_use]
    pub fn stats(&self) -> Arc<DispatchStats> {
        Arc::clone(&self.stats)
    }
}

/// Consumer side of the queue.
pub struct DispatchWorker {
    rx: mpsc::UnboundedReceiver<OutboundMessage>,
    sink: Arc<dyn MessageSink>,
    min_interval: Duration,
    stats: Arc<DispatchStats>,
    last_attempt: Option<Instant>,
}

impl DispatchWorker {
    /// Drain until `cancel` fires or every producer is dropped.
    ///
    /// Cancellation is only observed between messages, so a send that has
    /// already started always runs to completion. Messages still queued at
    /// that point are dropped.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(
            "dispatch worker started (min interval {}ms)",
            self.min_interval.as_millis()
        );
        loop {
            let message = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                message = self.rx.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };

            if let Some(last) = self.last_attempt {
                let ready_at = last + self.min_interval;
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        self.drop_message(&message, "shutdown");
                        break;
                    }
                    _ = tokio::time::sleep_until(ready_at) => {}
                }
            }

            self.attempt(message).await;
        }

        self.rx.close();
        while let Ok(message) = self.rx.try_recv() {
            self.drop_message(&message, "shutdown");
        }
        info!("dispatch worker stopped");
    }

    async fn attempt(&mut self, message: OutboundMessage) {
        self.last_attempt = Some(Instant::now());
        match self.sink.deliver(&message.text).await {
            Ok(()) => {
                self.stats.sent.fetch_add(1, Ordering::Relaxed);
                debug!("message delivered");
            }
            Err(e) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "message dropped: {}", preview(&message.text));
            }
        }
    }

    fn drop_message(&self, message: &OutboundMessage, why: &str) {
        self.stats.dropped.fetch_add(1, Ordering::Relaxed);
        warn!("message dropped ({why}): {}", preview(&message.text));
    }
}

fn preview(text: &str) -> String {
    const MAX_CHARS: usize = 60;
    let first_line = text.lines().next().unwrap_or_default();
    if first_line.chars().count() > MAX_CHARS {
        let cut: String = first_line.chars().take(MAX_CHARS).collect();
        format!("{cut}…")
    } else {
        first_line.to_owned()
    }
}
