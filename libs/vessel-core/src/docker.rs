/// Docker-backed [`RuntimeClient`] using Bollard
///
/// Read-only: inspects containers and reads their logs. Creating, starting
/// and removing containers belongs to whoever launches executions.
use async_trait::async_trait;
use bollard::container::{InspectContainerOptions, LogOutput, LogsOptions};
use bollard::errors::Error as BollardError;
use bollard::Docker;
use futures_util::stream::StreamExt;
use serde_json::Value;
use tracing::{debug, warn};

use vessel_common::RuntimeError;

use crate::runtime::{
    merge_log_entries, parse_timestamped_lines, ContainerHandle, ContainerInspection, LogEntry,
    LogSelection, RuntimeClient,
};

#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect using the local defaults (unix socket, or `DOCKER_HOST`)
    pub fn connect() -> Result<Self, RuntimeError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| RuntimeError::Unavailable(format!("Failed to connect to Docker daemon: {}", e)))?;
        Ok(Self { docker })
    }

    async fn collect_logs(
        &self,
        container_id: &str,
        selection: LogSelection,
    ) -> Result<Vec<LogOutput>, RuntimeError> {
        let options = Some(LogsOptions::<String> {
            stdout: selection.stdout,
            stderr: selection.stderr,
            timestamps: selection.timestamps,
            follow: false,
            ..Default::default()
        });

        let mut stream = self.docker.logs(container_id, options);
        let mut frames = Vec::new();
        while let Some(frame) = stream.next().await {
            frames.push(frame.map_err(|e| map_docker_error(container_id, e))?);
        }
        Ok(frames)
    }
}

fn map_docker_error(container_id: &str, err: BollardError) -> RuntimeError {
    match err {
        BollardError::DockerResponseServerError {
            status_code: 404, ..
        } => RuntimeError::NotFound(container_id.to_string()),
        other => RuntimeError::Unavailable(other.to_string()),
    }
}

#[async_trait]
impl RuntimeClient for DockerRuntime {
    async fn get_container(&self, container_id: &str) -> Result<ContainerHandle, RuntimeError> {
        let info = self
            .docker
            .inspect_container(container_id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| map_docker_error(container_id, e))?;

        Ok(ContainerHandle::new(
            info.id.unwrap_or_else(|| container_id.to_string()),
        ))
    }

    async fn inspect(&self, handle: &ContainerHandle) -> Result<ContainerInspection, RuntimeError> {
        let info = self
            .docker
            .inspect_container(&handle.id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| map_docker_error(&handle.id, e))?;

        let state = info.state.ok_or_else(|| {
            RuntimeError::Malformed(format!("container {} reported no state", handle.id))
        })?;

        let status = state
            .status
            .as_ref()
            .map(|s| s.to_string())
            .unwrap_or_default();
        let exit_code = state.exit_code;
        let raw_state = serde_json::to_value(&state).map_err(|e| {
            RuntimeError::Malformed(format!("container {} state: {}", handle.id, e))
        })?;

        debug!(container_id = %handle.id, status = %status, exit_code = ?exit_code, "Inspected container");

        Ok(ContainerInspection {
            status,
            exit_code,
            raw_state,
        })
    }

    async fn logs(
        &self,
        handle: &ContainerHandle,
        selection: LogSelection,
    ) -> Result<Vec<u8>, RuntimeError> {
        let frames = self.collect_logs(&handle.id, selection).await?;

        let mut bytes = Vec::new();
        for frame in frames {
            match frame {
                LogOutput::StdOut { message }
                | LogOutput::StdErr { message }
                | LogOutput::Console { message } => bytes.extend_from_slice(&message),
                LogOutput::StdIn { .. } => {}
            }
        }
        Ok(bytes)
    }

    async fn structured_logs(&self, handle: &ContainerHandle) -> Result<Value, RuntimeError> {
        let selection = LogSelection {
            stdout: true,
            stderr: true,
            timestamps: true,
        };
        let frames = self.collect_logs(&handle.id, selection).await?;

        let mut entries: Vec<LogEntry> = Vec::new();
        for frame in frames {
            match frame {
                LogOutput::StdOut { message } | LogOutput::Console { message } => {
                    entries.extend(parse_timestamped_lines("stdout", &message));
                }
                LogOutput::StdErr { message } => {
                    entries.extend(parse_timestamped_lines("stderr", &message));
                }
                LogOutput::StdIn { .. } => {
                    warn!(container_id = %handle.id, "Ignoring stdin frame in log stream");
                }
            }
        }

        serde_json::to_value(merge_log_entries(entries))
            .map_err(|e| RuntimeError::Malformed(format!("structured logs: {}", e)))
    }
}
