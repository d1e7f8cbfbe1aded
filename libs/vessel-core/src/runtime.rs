/// Container Runtime Client - capability seam
///
/// The lifecycle engine never talks to a container runtime directly. It goes
/// through [`RuntimeClient`], which has exactly four operations:
/// - resolve a container id to a handle
/// - inspect the handle's current state
/// - fetch raw log bytes for a stream selection
/// - fetch a structured, merged log representation
///
/// Handles are cheap and never cached by the engine, so every call observes
/// fresh runtime state.
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use vessel_common::RuntimeError;

/// Runtime statuses after which a container will produce no more output
pub const TERMINAL_STATES: [&str; 2] = ["exited", "dead"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    pub id: String,
}

impl ContainerHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Point-in-time view of a container's state.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerInspection {
    pub status: String,
    pub exit_code: Option<i64>,
    /// Full state object exactly as the runtime reported it
    pub raw_state: Value,
}

impl ContainerInspection {
    pub fn is_terminal(&self) -> bool {
        TERMINAL_STATES.contains(&self.status.as_str())
    }
}

/// Which streams to include when fetching raw logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogSelection {
    pub stdout: bool,
    pub stderr: bool,
    pub timestamps: bool,
}

impl LogSelection {
    pub const STDOUT: LogSelection = LogSelection {
        stdout: true,
        stderr: false,
        timestamps: true,
    };

    pub const STDERR: LogSelection = LogSelection {
        stdout: false,
        stderr: true,
        timestamps: true,
    };
}

#[async_trait]
pub trait RuntimeClient: Send + Sync {
    /// Resolve a container id; unknown ids are `RuntimeError::NotFound`
    async fn get_container(&self, container_id: &str) -> Result<ContainerHandle, RuntimeError>;

    async fn inspect(&self, handle: &ContainerHandle) -> Result<ContainerInspection, RuntimeError>;

    async fn logs(
        &self,
        handle: &ContainerHandle,
        selection: LogSelection,
    ) -> Result<Vec<u8>, RuntimeError>;

    /// stdout and stderr merged into one time-ordered JSON document
    async fn structured_logs(&self, handle: &ContainerHandle) -> Result<Value, RuntimeError>;
}

#[async_trait]
impl<T: RuntimeClient + ?Sized> RuntimeClient for Arc<T> {
    async fn get_container(&self, container_id: &str) -> Result<ContainerHandle, RuntimeError> {
        (**self).get_container(container_id).await
    }

    async fn inspect(&self, handle: &ContainerHandle) -> Result<ContainerInspection, RuntimeError> {
        (**self).inspect(handle).await
    }

    async fn logs(
        &self,
        handle: &ContainerHandle,
        selection: LogSelection,
    ) -> Result<Vec<u8>, RuntimeError> {
        (**self).logs(handle, selection).await
    }

    async fn structured_logs(&self, handle: &ContainerHandle) -> Result<Value, RuntimeError> {
        (**self).structured_logs(handle).await
    }
}

/// One line of the structured log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub time: String,
    pub stream: String,
    pub message: String,
}

/// Split a timestamped log chunk (`<RFC3339> <message>` per line) into entries
pub fn parse_timestamped_lines(stream: &str, chunk: &[u8]) -> Vec<LogEntry> {
    String::from_utf8_lossy(chunk)
        .lines()
        .filter(|line| !line.is_empty())
        .map(|line| {
            let (time, message) = match line.split_once(' ') {
                Some((ts, rest)) if DateTime::parse_from_rfc3339(ts).is_ok() => (ts, rest),
                _ => ("", line),
            };
            LogEntry {
                time: time.to_string(),
                stream: stream.to_string(),
                message: message.to_string(),
            }
        })
        .collect()
}

/// Stable sort by timestamp; entries without a timestamp keep their position
/// relative to their predecessor.
pub fn merge_log_entries(entries: Vec<LogEntry>) -> Vec<LogEntry> {
    let mut last: Option<DateTime<FixedOffset>> = None;
    let mut keyed: Vec<(Option<DateTime<FixedOffset>>, LogEntry)> = entries
        .into_iter()
        .map(|entry| {
            if let Ok(ts) = DateTime::parse_from_rfc3339(&entry.time) {
                last = Some(ts);
            }
            (last, entry)
        })
        .collect();
    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    keyed.into_iter().map(|(_, entry)| entry).collect()
}
