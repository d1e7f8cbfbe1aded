use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failures reported by a container runtime client.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("container not found: {0}")]
    NotFound(String),
    #[error("container runtime unavailable: {0}")]
    Unavailable(String),
    #[error("malformed runtime response: {0}")]
    Malformed(String),
}

/// Error taxonomy of the execution store and lifecycle engine.
#[derive(Debug, Error)]
pub enum VesselError {
    /// Creation payload or id rejected before anything was persisted
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("execution not found: {0}")]
    NotFound(String),

    #[error("failed to create execution at {path}: {reason}")]
    Creation { path: PathBuf, reason: String },

    #[error("persistence failure at {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("corrupt document at {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl VesselError {
    pub fn persistence(path: impl Into<PathBuf>, source: io::Error) -> Self {
        VesselError::Persistence {
            path: path.into(),
            source,
        }
    }

    /// True for both an unknown execution and an unknown container
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            VesselError::NotFound(_) | VesselError::Runtime(RuntimeError::NotFound(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_covers_containers() {
        assert!(VesselError::NotFound("x".into()).is_not_found());
        assert!(VesselError::from(RuntimeError::NotFound("c".into())).is_not_found());
        assert!(!VesselError::from(RuntimeError::Unavailable("down".into())).is_not_found());
    }

    #[test]
    fn test_messages_carry_context() {
        let err = VesselError::persistence("/data/x", io::Error::new(io::ErrorKind::Other, "disk full"));
        let msg = err.to_string();
        assert!(msg.contains("/data/x"));
        assert!(msg.contains("disk full"));
    }
}
