//! Completion signals published while a run progresses.

use std::fmt;
use tokio::sync::broadcast;

pub const ALL: &str = "all";

/// Which unit a completion signal is about.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    Unit(String),
    /// Every unit of the phase
    All,
}

impl Target {
    pub fn unit(id: impl Into<String>) -> Self {
        Target::Unit(id.into())
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Unit(id) => f.write_str(id),
            Target::All => f.write_str(ALL),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionEvent {
    CheckComplete(Target),
    DownloadingComplete(Target),
    InstallComplete(Target),
}

impl CompletionEvent {
    pub fn target(&self) -> &Target {
        match self {
            CompletionEvent::CheckComplete(t)
            | CompletionEvent::DownloadingComplete(t)
            | CompletionEvent::InstallComplete(t) => t,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CompletionEvent::CheckComplete(_) => "checkComplete",
            CompletionEvent::DownloadingComplete(_) => "downloadingComplete",
            CompletionEvent::InstallComplete(_) => "installComplete",
        }
    }
}

impl fmt::Display for CompletionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.target())
    }
}

/// Fan-out of completion signals to any number of subscribers.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CompletionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CompletionEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: CompletionEvent) {
        log::debug!("Signal {}", event);
        // No subscribers is fine, the signal is informational
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
