use std::collections::VecDeque;

use shared::domain::{LogEntry, Severity};
use tokio::sync::{broadcast, Mutex};
use tracing::{error, info, warn};

use crate::events::ConsoleEvent;

pub const DEFAULT_LOG_CAPACITY: usize = 100;

/// Most-recent-first log lines, bounded. Pushing past capacity drops the
/// oldest line.
#[derive(Debug, Clone)]
pub struct LogHistory {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl Default for LogHistory {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_LOG_CAPACITY)
    }
}

impl LogHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, entry: LogEntry) {
        self.entries.push_front(entry);
        self.entries.truncate(self.capacity);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&LogEntry> {
        self.entries.front()
    }

    pub fn to_vec(&self) -> Vec<LogEntry> {
        self.entries.iter().cloned().collect()
    }
}

/// The console's shared log: backend stream lines and command results land
/// here and are republished to subscribers.
pub struct LogBook {
    history: Mutex<LogHistory>,
    events: broadcast::Sender<ConsoleEvent>,
}

impl LogBook {
    pub fn new(capacity: usize, events: broadcast::Sender<ConsoleEvent>) -> Self {
        Self {
            history: Mutex::new(LogHistory::with_capacity(capacity)),
            events,
        }
    }

    pub async fn record(&self, entry: LogEntry) {
        match entry.severity {
            Severity::Error | Severity::Critical => error!(target: "console::log", "{}", entry.text),
            Severity::Warning => warn!(target: "console::log", "{}", entry.text),
            Severity::Info | Severity::Success => info!(target: "console::log", "{}", entry.text),
        }
        self.history.lock().await.push(entry.clone());
        let _ = self.events.send(ConsoleEvent::Log(entry));
    }

    pub async fn info(&self, text: impl Into<String>) {
        self.record(LogEntry::new(Severity::Info, text)).await;
    }

    pub async fn success(&self, text: impl Into<String>) {
        self.record(LogEntry::new(Severity::Success, text)).await;
    }

    pub async fn warning(&self, text: impl Into<String>) {
        self.record(LogEntry::new(Severity::Warning, text)).await;
    }

    pub async fn error(&self, text: impl Into<String>) {
        self.record(LogEntry::new(Severity::Error, text)).await;
    }

    pub async fn critical(&self, text: impl Into<String>) {
        self.record(LogEntry::new(Severity::Critical, text)).await;
    }

    pub async fn snapshot(&self) -> Vec<LogEntry> {
        self.history.lock().await.to_vec()
    }

    pub async fn len(&self) -> usize {
        self.history.lock().await.len()
    }
}
