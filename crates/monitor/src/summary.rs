//! Live publish/subscribe feed for human-readable summaries.

use std::sync::Mutex;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;

/// Notice sent on idle connections so subscribers can tell the stream is
/// alive.
pub const KEEPALIVE_NOTICE: &str = "-- keepalive --";

struct Inner {
    subscribers: Vec<mpsc::Sender<String>>,
    last: Option<String>,
    last_activity: Instant,
}

/// Fan-out publisher with a bounded buffer per subscriber.
///
/// A full subscriber buffer drops the message for that subscriber only; a
/// closed receiver is reaped on the next publication. New subscribers
/// immediately receive the most recent summary.
pub struct SummaryPublisher {
    inner: Mutex<Inner>,
    buffer: usize,
}

impl SummaryPublisher {
    /// Creates a publisher whose subscribers buffer up to `buffer` messages.
    #[must_use]
    pub fn new(buffer: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                subscribers: Vec::new(),
                last: None,
                last_activity: Instant::now(),
            }),
            buffer: buffer.max(1),
        }
    }

    /// Registers a subscriber, seeding it with the most recent summary.
    pub fn subscribe(&self) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(self.buffer);
        let mut inner = self.inner.lock().expect("summary state poisoned");
        if let Some(last) = &inner.last {
            let _ = tx.try_send(last.clone());
        }
        inner.subscribers.push(tx);
        rx
    }

    /// Publishes a new summary to all live subscribers.
    pub fn publish(&self, text: String) {
        let mut inner = self.inner.lock().expect("summary state poisoned");
        inner.last = Some(text.clone());
        inner.last_activity = Instant::now();
        fan_out(&mut inner, &text);
    }

    /// Sends a keep-alive notice when nothing was published for `idle`.
    pub fn keepalive_if_idle(&self, idle: std::time::Duration) {
        let mut inner = self.inner.lock().expect("summary state poisoned");
        if inner.last_activity.elapsed() < idle {
            return;
        }
        inner.last_activity = Instant::now();
        fan_out(&mut inner, KEEPALIVE_NOTICE);
    }

    /// Number of currently registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().expect("summary state poisoned").subscribers.len()
    }
}

fn fan_out(inner: &mut Inner, message: &str) {
    inner.subscribers.retain(|tx| match tx.try_send(message.to_string()) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            debug!("dropping summary for slow subscriber");
            true
        }
        Err(TrySendError::Closed(_)) => false,
    });
}
