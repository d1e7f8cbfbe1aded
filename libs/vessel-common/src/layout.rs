use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::VesselError;
use crate::types::Artifact;

/// On-disk layout semantics - defines only naming, not I/O
/// Keeps the store, the worker and the CLI agreeing on where things live.

pub const EXECUTIONS_DIR: &str = "executions";
pub const METADATA_FILE: &str = "metadata.json";
pub const OUTPUTS_DIR: &str = "outputs";
pub const EXECUTION_KIND: &str = "execution";

/// Characters per directory level when sharding an id
pub const PATH_GROUP_LEN: usize = 8;

/// Directory levels below `executions/` (32 hex digits per id)
pub const SHARD_DEPTH: usize = 32 / PATH_GROUP_LEN;

/// Time-ordered execution identifier (UUIDv7).
///
/// The canonical lowercase rendering sorts lexically in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionId(Uuid);

impl ExecutionId {
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }

    /// Directory segments for this id: the 32 hex digits split into groups
    pub fn shard_segments(&self) -> Vec<String> {
        let simple = self.0.simple().to_string();
        simple
            .as_bytes()
            .chunks(PATH_GROUP_LEN)
            .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
            .collect()
    }

    /// Rebuild an id from its shard segments, in order.
    ///
    /// Only the exact segments [`shard_segments`](Self::shard_segments) produces
    /// are accepted; anything else would map to a different directory.
    pub fn from_segments<S: AsRef<str>>(segments: &[S]) -> Result<Self, VesselError> {
        if segments.len() != SHARD_DEPTH || !segments.iter().all(|s| is_shard_segment(s.as_ref())) {
            let joined: Vec<&str> = segments.iter().map(|s| s.as_ref()).collect();
            return Err(VesselError::Validation(format!(
                "invalid shard path `{}`",
                joined.join("/")
            )));
        }
        let joined: String = segments.iter().map(|s| s.as_ref()).collect();
        joined.parse()
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for ExecutionId {
    type Err = VesselError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| VesselError::Validation(format!("invalid execution id `{}`: {}", s, e)))
    }
}

/// A directory name as produced by sharding: `PATH_GROUP_LEN` lowercase hex digits
pub fn is_shard_segment(name: &str) -> bool {
    name.len() == PATH_GROUP_LEN && name.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Root directory holding all execution shards
pub fn executions_root(data_dir: &Path) -> PathBuf {
    data_dir.join(EXECUTIONS_DIR)
}

/// Directory of a single execution
pub fn execution_dir(data_dir: &Path, id: &ExecutionId) -> PathBuf {
    let mut path = executions_root(data_dir);
    for segment in id.shard_segments() {
        path.push(segment);
    }
    path
}

pub fn metadata_path(execution_dir: &Path) -> PathBuf {
    execution_dir.join(METADATA_FILE)
}

pub fn artifact_path(execution_dir: &Path, artifact: Artifact) -> PathBuf {
    execution_dir.join(artifact.file_name())
}

pub fn outputs_path(execution_dir: &Path) -> PathBuf {
    execution_dir.join(OUTPUTS_DIR)
}
