pub mod config;
pub mod error;
pub mod layout;
pub mod types;

pub use error::{RuntimeError, VesselError};
pub use types::{Artifact, ExecutionCreationData, ExecutionStatus, Metadata};
