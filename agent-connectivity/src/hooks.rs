//! Operator facing side channels: console output and agent self-update.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tracing::warn;

/// Destination for messages the operator must see even with logging turned down.
pub trait Console: Send + Sync {
    /// Emits one message.
    fn message(&self, text: &str);
}

/// Writes console messages to standard output.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdConsole;

impl Console for StdConsole {
    fn message(&self, text: &str) {
        println!("{text}");
    }
}

/// Buffers console messages in memory.
#[derive(Debug, Default)]
pub struct CollectingConsole {
    messages: Mutex<Vec<String>>,
}

impl CollectingConsole {
    /// Creates an empty console.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every message collected so far.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns and clears the collected messages.
    pub fn drain(&self) -> Vec<String> {
        std::mem::take(&mut *self.messages.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl Console for CollectingConsole {
    fn message(&self, text: &str) {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(text.to_owned());
    }
}

/// Replaces the running agent with a build the server accepts.
#[async_trait]
pub trait AgentUpdater: Send + Sync {
    /// Starts an update without waiting for it to finish.
    async fn update_agent_now(&self);
}

/// Updater for deployments that upgrade agents out of band.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManualUpdater;

#[async_trait]
impl AgentUpdater for ManualUpdater {
    async fn update_agent_now(&self) {
        warn!("agent update requested but automatic updates are unavailable; upgrade manually");
    }
}
