//! Execution lifecycle tracking for containerized jobs.
//!
//! The [`ExecutionStore`] owns identity and metadata persistence, the
//! [`ExecutionEngine`] derives status and captures container output once the
//! container has terminated. Container access goes through [`RuntimeClient`].

pub mod docker;
pub mod lifecycle;
pub mod runtime;
pub mod store;

#[cfg(test)]
mod testing;

pub use docker::DockerRuntime;
pub use lifecycle::{CheckOutcome, ExecutionEngine};
pub use runtime::{ContainerHandle, ContainerInspection, LogEntry, LogSelection, RuntimeClient};
pub use store::{Execution, ExecutionStore};
pub use vessel_common::layout::ExecutionId;
pub use vessel_common::{Artifact, ExecutionCreationData, ExecutionStatus, RuntimeError, VesselError};

pub type Result<T> = std::result::Result<T, VesselError>;
