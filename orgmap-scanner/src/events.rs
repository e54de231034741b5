// Structured diagnostic events emitted while resolving sessions and crawling

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Default number of events retained by an [`EventLog`]
pub const EVENT_LOG_CAPACITY: usize = 400;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub ts: DateTime<Utc>,
    pub event: String,
    pub data: Value,
}

/// Receiver for diagnostic events.
///
/// Implementations must never fail or block for long: the crawl calls
/// `record` inline and does not look at the outcome.
pub trait EventSink: Send + Sync {
    fn record(&self, event: &str, data: Value);
}

pub type SharedSink = Arc<dyn EventSink>;

/// Sink that drops everything
pub struct NullSink;

impl EventSink for NullSink {
    fn record(&self, _event: &str, _data: Value) {}
}

/// Bounded ring buffer of the most recent events, mirrored to `tracing`
pub struct EventLog {
    entries: Mutex<VecDeque<Event>>,
    capacity: usize,
}

impl EventLog {
    pub fn new() -> Self {
        Self::with_capacity(EVENT_LOG_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(EVENT_LOG_CAPACITY))),
            capacity: capacity.max(1),
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn snapshot(&self) -> Vec<Event> {
        match self.entries.lock() {
            Ok(entries) => entries.iter().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().iter().cloned().collect(),
        }
    }

    /// Names of the recorded events, oldest first
    pub fn event_names(&self) -> Vec<String> {
        self.snapshot().into_iter().map(|e| e.event).collect()
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for EventLog {
    fn record(&self, event: &str, data: Value) {
        debug!(event, data = %data, "event");

        // A poisoned lock only means another recorder panicked; skip the entry
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };
        entries.push_back(Event {
            ts: Utc::now(),
            event: event.to_string(),
            data,
        });
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }
}

/// Mask a secret for display: first six and last four characters only
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 10 {
        return "********".to_string();
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}
