// In-memory runtime double for engine tests. Every operation yields first so
// overlapping checks interleave at each runtime call.
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use vessel_common::RuntimeError;

use crate::runtime::{ContainerHandle, ContainerInspection, LogSelection, RuntimeClient};

#[derive(Default)]
pub struct FakeRuntime {
    containers: Mutex<HashMap<String, ContainerInspection>>,
    pub get_calls: AtomicUsize,
    pub stdout_calls: AtomicUsize,
    pub stderr_calls: AtomicUsize,
    pub structured_calls: AtomicUsize,
    pub fail_structured: AtomicBool,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a container with a Docker-shaped state payload
    pub fn set_container(&self, id: &str, status: &str, exit_code: Option<i64>, error: &str) {
        let raw_state = json!({
            "Status": status,
            "Running": status == "running",
            "ExitCode": exit_code,
            "Error": error,
        });
        let inspection = ContainerInspection {
            status: status.to_string(),
            exit_code,
            raw_state,
        };
        self.containers
            .lock()
            .unwrap()
            .insert(id.to_string(), inspection);
    }

    pub fn remove_container(&self, id: &str) {
        self.containers.lock().unwrap().remove(id);
    }

    pub fn stdout_for(id: &str) -> Vec<u8> {
        format!("2024-05-01T10:00:00Z out from {}\n", id).into_bytes()
    }

    pub fn stderr_for(id: &str) -> Vec<u8> {
        format!("2024-05-01T10:00:01Z err from {}\n", id).into_bytes()
    }

    pub fn structured_for(id: &str) -> Value {
        json!([
            { "time": "2024-05-01T10:00:00Z", "stream": "stdout", "message": format!("out from {}", id) },
            { "time": "2024-05-01T10:00:01Z", "stream": "stderr", "message": format!("err from {}", id) },
        ])
    }

    pub fn fetch_count(&self) -> usize {
        self.stdout_calls.load(Ordering::SeqCst)
            + self.stderr_calls.load(Ordering::SeqCst)
            + self.structured_calls.load(Ordering::SeqCst)
    }

    fn lookup(&self, id: &str) -> Result<ContainerInspection, RuntimeError> {
        self.containers
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| RuntimeError::NotFound(id.to_string()))
    }
}

#[async_trait]
impl RuntimeClient for FakeRuntime {
    async fn get_container(&self, container_id: &str) -> Result<ContainerHandle, RuntimeError> {
        tokio::task::yield_now().await;
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.lookup(container_id)?;
        Ok(ContainerHandle::new(container_id))
    }

    async fn inspect(&self, handle: &ContainerHandle) -> Result<ContainerInspection, RuntimeError> {
        tokio::task::yield_now().await;
        self.lookup(&handle.id)
    }

    async fn logs(
        &self,
        handle: &ContainerHandle,
        selection: LogSelection,
    ) -> Result<Vec<u8>, RuntimeError> {
        tokio::task::yield_now().await;
        self.lookup(&handle.id)?;
        let mut bytes = Vec::new();
        if selection.stdout {
            self.stdout_calls.fetch_add(1, Ordering::SeqCst);
            bytes.extend(Self::stdout_for(&handle.id));
        }
        if selection.stderr {
            self.stderr_calls.fetch_add(1, Ordering::SeqCst);
            bytes.extend(Self::stderr_for(&handle.id));
        }
        Ok(bytes)
    }

    async fn structured_logs(&self, handle: &ContainerHandle) -> Result<Value, RuntimeError> {
        tokio::task::yield_now().await;
        self.lookup(&handle.id)?;
        if self.fail_structured.load(Ordering::SeqCst) {
            return Err(RuntimeError::Unavailable("log endpoint timed out".to_string()));
        }
        self.structured_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Self::structured_for(&handle.id))
    }
}
