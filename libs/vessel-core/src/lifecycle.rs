/// Execution Lifecycle Engine
///
/// **Responsibility:**
/// Derive execution status, observe the container through a [`RuntimeClient`],
/// and capture the container's output exactly once after it terminates.
///
/// **Idempotency:**
/// `check_container_status` may run any number of times, from overlapping
/// pollers, or after a crash halfway through a capture:
/// - the terminal state is recorded through the store's set-once register
/// - each artifact is guarded only by its own file existing
/// A failed attempt leaves whatever it could not finish for the next call.
use serde_json::{Map, Value};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info, instrument};

use vessel_common::layout::ExecutionId;
use vessel_common::types::{CONTAINER_EXIT_CODE, CONTAINER_FINAL_STATE};
use vessel_common::{Artifact, ExecutionCreationData, ExecutionStatus, VesselError};

use crate::runtime::{ContainerHandle, LogSelection, RuntimeClient};
use crate::store::{Execution, ExecutionStore};
use crate::Result;

/// What a single `check_container_status` call observed and did
#[derive(Debug, Clone, PartialEq)]
pub enum CheckOutcome {
    /// No container id recorded yet
    NoContainer,
    /// Container exists but is still going
    NotTerminal { status: String },
    Terminal {
        /// This call found no final state on disk and wrote one. Overlapping
        /// checks can each see it absent, so more than one may report `true`.
        recorded_final_state: bool,
        /// Artifacts written by this call
        written: Vec<Artifact>,
    },
}

pub struct ExecutionEngine<R> {
    store: ExecutionStore,
    runtime: R,
}

impl<R: RuntimeClient> ExecutionEngine<R> {
    pub fn new(store: ExecutionStore, runtime: R) -> Self {
        Self { store, runtime }
    }

    pub fn store(&self) -> &ExecutionStore {
        &self.store
    }

    pub fn create(&self, data: ExecutionCreationData) -> Result<Execution> {
        self.store.create(data)
    }

    pub fn load(&self, id: &ExecutionId) -> Result<Execution> {
        self.store.load(id)
    }

    pub fn status(&self, execution: &Execution) -> ExecutionStatus {
        execution.status()
    }

    /// Record the container launched for this execution
    pub fn attach_container(&self, execution: &mut Execution, container_id: &str) -> Result<()> {
        self.store.attach_container(execution, container_id)
    }

    /// Live handle for the execution's container, fetched fresh on every call.
    ///
    /// `Ok(None)` means no container was recorded yet. An id the runtime does
    /// not know, or one that is not a string, is an error, not "queued".
    pub async fn container(&self, execution: &Execution) -> Result<Option<ContainerHandle>> {
        let Some(container_id) = execution.container_id()? else {
            return Ok(None);
        };
        let handle = self.runtime.get_container(container_id).await?;
        Ok(Some(handle))
    }

    #[instrument(skip(self, execution), fields(execution_id = %execution.id()))]
    pub async fn check_container_status(&self, execution: &mut Execution) -> Result<CheckOutcome> {
        self.store.refresh(execution)?;

        let Some(handle) = self.container(execution).await? else {
            return Ok(CheckOutcome::NoContainer);
        };

        let inspection = self.runtime.inspect(&handle).await?;
        if !inspection.is_terminal() {
            debug!(container_id = %handle.id, status = %inspection.status, "Container not terminal yet");
            return Ok(CheckOutcome::NotTerminal {
                status: inspection.status,
            });
        }

        let mut terminal = Map::new();
        terminal.insert(
            CONTAINER_EXIT_CODE.to_string(),
            inspection.exit_code.map(Value::from).unwrap_or(Value::Null),
        );
        terminal.insert(CONTAINER_FINAL_STATE.to_string(), inspection.raw_state);
        let recorded_final_state = self
            .store
            .set_once(execution, CONTAINER_FINAL_STATE, terminal)?;

        if recorded_final_state {
            info!(
                container_id = %handle.id,
                exit_code = ?inspection.exit_code,
                status = %execution.status(),
                "Recorded final container state"
            );
        }

        // Runs even when the final state was already recorded, so a capture
        // interrupted by a crash is completed here
        let mut written = Vec::new();
        for artifact in Artifact::ALL {
            if self.capture_artifact(execution, &handle, artifact).await? {
                written.push(artifact);
            }
        }

        Ok(CheckOutcome::Terminal {
            recorded_final_state,
            written,
        })
    }

    async fn capture_artifact(
        &self,
        execution: &Execution,
        handle: &ContainerHandle,
        artifact: Artifact,
    ) -> Result<bool> {
        let path = execution.artifact_path(artifact);
        if path.exists() {
            return Ok(false);
        }

        let content = match artifact {
            Artifact::Stdout => self.runtime.logs(handle, LogSelection::STDOUT).await?,
            Artifact::Stderr => self.runtime.logs(handle, LogSelection::STDERR).await?,
            Artifact::CombinedJson => {
                let logs = self.runtime.structured_logs(handle).await?;
                serde_json::to_vec_pretty(&logs).map_err(|e| VesselError::Corrupt {
                    path: path.clone(),
                    source: e,
                })?
            }
        };

        let wrote = self.store.write_artifact_once(execution, artifact, &content)?;
        if wrote {
            info!(
                execution_id = %execution.id(),
                artifact = %artifact,
                bytes = content.len(),
                path = %path.display(),
                "Wrote log artifact"
            );
        }
        Ok(wrote)
    }

    /// Captured structured log if present, otherwise live logs from the
    /// runtime, otherwise `None`.
    pub async fn get_logs(&self, execution: &Execution) -> Result<Option<Value>> {
        let path = execution.artifact_path(Artifact::CombinedJson);
        if path.exists() {
            let content = fs::read(&path).map_err(|e| VesselError::persistence(&path, e))?;
            let logs = serde_json::from_slice(&content).map_err(|e| VesselError::Corrupt {
                path: path.clone(),
                source: e,
            })?;
            return Ok(Some(logs));
        }

        let Some(handle) = self.container(execution).await? else {
            return Ok(None);
        };
        Ok(Some(self.runtime.structured_logs(&handle).await?))
    }

    pub fn outputs_path(&self, execution: &Execution) -> Result<PathBuf> {
        self.store.outputs_path(execution)
    }

    /// Final state recorded and every artifact on disk; nothing left to poll
    pub fn is_settled(&self, execution: &Execution) -> bool {
        execution.has_final_state()
            && Artifact::ALL
                .iter()
                .all(|artifact| execution.artifact_path(*artifact).exists())
    }
}
