/// Execution Store - Identity and Metadata Persistence
///
/// **Responsibility:**
/// Allocate execution ids, map them to sharded directories, and persist the
/// metadata document of each execution.
///
/// **Guarantees:**
/// - Metadata writes go through a temp file + rename, so a reader never
///   observes a half-written document
/// - Artifact writes are create-if-absent: an existing file is never replaced
/// - Different executions never share a directory, so they can be updated in
///   parallel without coordination
///
/// Concurrent updates of the *same* execution may race on read-then-write;
/// callers that need set-once semantics use [`ExecutionStore::set_once`].
use chrono::Utc;
use serde_json::Value;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use vessel_common::config::StoreConfig;
use vessel_common::layout::{self, ExecutionId, EXECUTION_KIND, SHARD_DEPTH};
use vessel_common::types::{is_truthy, CONTAINER_FINAL_STATE, CONTAINER_ID};
use vessel_common::{Artifact, ExecutionCreationData, ExecutionStatus, Metadata, VesselError};

use crate::Result;

/// Handle to one persisted execution.
///
/// Holds the last metadata snapshot read from disk; the status is derived
/// from that snapshot on every call.
#[derive(Debug, Clone)]
pub struct Execution {
    id: ExecutionId,
    path: PathBuf,
    metadata: Metadata,
}

impl Execution {
    pub fn id(&self) -> &ExecutionId {
        &self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn status(&self) -> ExecutionStatus {
        ExecutionStatus::derive(&self.metadata)
    }

    /// Container id recorded by whoever launched the container, if any.
    ///
    /// Follows the same truthiness as status derivation: a falsy value is no
    /// container, a truthy value that is not a string is rejected.
    pub fn container_id(&self) -> Result<Option<&str>> {
        match self.metadata.get(CONTAINER_ID) {
            None => Ok(None),
            Some(value) if !is_truthy(value) => Ok(None),
            Some(Value::String(id)) => Ok(Some(id.as_str())),
            Some(other) => Err(VesselError::Validation(format!(
                "execution {}: `{}` must be a string, found {}",
                self.id, CONTAINER_ID, other
            ))),
        }
    }

    pub fn has_final_state(&self) -> bool {
        !matches!(
            self.metadata.get(CONTAINER_FINAL_STATE),
            None | Some(Value::Null)
        )
    }

    pub fn artifact_path(&self, artifact: Artifact) -> PathBuf {
        layout::artifact_path(&self.path, artifact)
    }

    pub fn metadata_path(&self) -> PathBuf {
        layout::metadata_path(&self.path)
    }
}

/// Filesystem-backed store rooted at a data directory.
#[derive(Debug, Clone)]
pub struct ExecutionStore {
    data_dir: PathBuf,
}

impl ExecutionStore {
    pub fn new(config: &StoreConfig) -> Self {
        Self::open(&config.data_dir)
    }

    pub fn open(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Allocate an id and persist the creation payload as initial metadata.
    ///
    /// `data` is already typed, so nothing is allocated for a payload that
    /// failed [`ExecutionCreationData::from_json`].
    pub fn create(&self, data: ExecutionCreationData) -> Result<Execution> {
        let metadata = data.into_metadata()?;
        self.create_with_metadata(ExecutionId::generate(), metadata)
    }

    pub(crate) fn create_with_metadata(
        &self,
        id: ExecutionId,
        mut metadata: Metadata,
    ) -> Result<Execution> {
        let path = layout::execution_dir(&self.data_dir, &id);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| VesselError::Creation {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        }

        // create_dir (not create_dir_all) so an existing directory is detected
        match fs::create_dir(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(VesselError::Creation {
                    path,
                    reason: format!("execution id {} already exists", id),
                });
            }
            Err(e) => {
                return Err(VesselError::Creation {
                    path,
                    reason: e.to_string(),
                });
            }
        }

        metadata.insert("id".to_string(), Value::String(id.to_string()));
        metadata.insert("kind".to_string(), Value::String(EXECUTION_KIND.to_string()));
        metadata.insert(
            "created_at".to_string(),
            Value::String(Utc::now().to_rfc3339()),
        );

        let metadata_path = layout::metadata_path(&path);
        if let Err(e) = write_json_atomic(&metadata_path, &Value::Object(metadata.clone())) {
            // Leave no half-created execution behind
            if let Err(cleanup) = fs::remove_dir_all(&path) {
                warn!(
                    execution_id = %id,
                    error = %cleanup,
                    "Failed to remove directory of failed creation"
                );
            }
            return Err(VesselError::Creation {
                path,
                reason: e.to_string(),
            });
        }

        info!(execution_id = %id, path = %path.display(), "Execution created");

        Ok(Execution { id, path, metadata })
    }

    pub fn load(&self, id: &ExecutionId) -> Result<Execution> {
        let path = layout::execution_dir(&self.data_dir, id);
        let metadata = match read_metadata(&layout::metadata_path(&path)) {
            Ok(md) => md,
            Err(VesselError::Persistence { source, .. })
                if source.kind() == io::ErrorKind::NotFound =>
            {
                return Err(VesselError::NotFound(id.to_string()));
            }
            Err(e) => return Err(e),
        };
        Ok(Execution {
            id: *id,
            path,
            metadata,
        })
    }

    /// Re-read the metadata snapshot of `execution` from disk
    pub fn refresh(&self, execution: &mut Execution) -> Result<()> {
        execution.metadata = read_metadata(&execution.metadata_path())?;
        Ok(())
    }

    /// Shallow-merge `partial` into the persisted metadata and write it back atomically.
    pub fn update_metadata(&self, execution: &mut Execution, partial: Metadata) -> Result<()> {
        let metadata_path = execution.metadata_path();
        let mut current = read_metadata(&metadata_path)?;
        let keys: Vec<String> = partial.keys().cloned().collect();
        current.extend(partial);
        write_json_atomic(&metadata_path, &Value::Object(current.clone()))?;
        execution.metadata = current;

        debug!(execution_id = %execution.id, keys = ?keys, "Metadata updated");
        Ok(())
    }

    /// Merge `container_id` into the metadata; this is how a launcher hands
    /// the container over for tracking.
    pub fn attach_container(&self, execution: &mut Execution, container_id: &str) -> Result<()> {
        let container_id = container_id.trim();
        if container_id.is_empty() {
            return Err(VesselError::Validation(
                "container id must not be empty".to_string(),
            ));
        }
        let mut partial = Metadata::new();
        partial.insert(CONTAINER_ID.to_string(), Value::String(container_id.to_string()));
        self.update_metadata(execution, partial)?;

        info!(execution_id = %execution.id, container_id = %container_id, "Container attached");
        Ok(())
    }

    /// Set-once register: merge `partial` only if `guard_key` is not yet set on disk.
    ///
    /// Returns whether the write happened. The handle is refreshed either way.
    /// There is no lock: callers that overlap and both see `guard_key` absent
    /// both write, and the last rename wins. Once it is on disk it is never
    /// replaced.
    pub fn set_once(
        &self,
        execution: &mut Execution,
        guard_key: &str,
        partial: Metadata,
    ) -> Result<bool> {
        let metadata_path = execution.metadata_path();
        let mut current = read_metadata(&metadata_path)?;

        if !matches!(current.get(guard_key), None | Some(Value::Null)) {
            execution.metadata = current;
            return Ok(false);
        }

        current.extend(partial);
        write_json_atomic(&metadata_path, &Value::Object(current.clone()))?;
        execution.metadata = current;
        Ok(true)
    }

    /// Write an artifact unless it already exists.
    ///
    /// Content lands in a temp file first and is published with a no-clobber
    /// link, so concurrent writers cannot replace an existing artifact and
    /// readers never see a partial one. Returns whether this call wrote it.
    pub fn write_artifact_once(
        &self,
        execution: &Execution,
        artifact: Artifact,
        content: &[u8],
    ) -> Result<bool> {
        let path = execution.artifact_path(artifact);
        let dir = path.parent().unwrap_or(execution.path());
        fs::create_dir_all(dir).map_err(|e| VesselError::persistence(dir, e))?;

        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| VesselError::persistence(dir, e))?;
        tmp.write_all(content)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| VesselError::persistence(&path, e))?;

        match tmp.persist_noclobber(&path) {
            Ok(_) => Ok(true),
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                debug!(
                    execution_id = %execution.id,
                    artifact = %artifact,
                    "Artifact already written by a concurrent check"
                );
                Ok(false)
            }
            Err(e) => Err(VesselError::persistence(&path, e.error)),
        }
    }

    /// `<execution>/outputs`, created on first access
    pub fn outputs_path(&self, execution: &Execution) -> Result<PathBuf> {
        let path = layout::outputs_path(execution.path());
        fs::create_dir_all(&path).map_err(|e| VesselError::persistence(&path, e))?;
        Ok(path)
    }

    /// All persisted execution ids, oldest first.
    pub fn list(&self) -> Result<Vec<ExecutionId>> {
        let root = layout::executions_root(&self.data_dir);
        let mut ids = Vec::new();
        if !root.exists() {
            return Ok(ids);
        }

        let mut segments = Vec::with_capacity(SHARD_DEPTH);
        collect_ids(&root, SHARD_DEPTH, &mut segments, &mut ids)?;
        ids.sort();
        Ok(ids)
    }
}

fn collect_ids(
    dir: &Path,
    remaining: usize,
    segments: &mut Vec<String>,
    out: &mut Vec<ExecutionId>,
) -> Result<()> {
    if remaining == 0 {
        if layout::metadata_path(dir).is_file() {
            match ExecutionId::from_segments(segments) {
                Ok(id) => out.push(id),
                Err(e) => warn!(path = %dir.display(), error = %e, "Skipping unparseable shard"),
            }
        }
        return Ok(());
    }

    let entries = fs::read_dir(dir).map_err(|e| VesselError::persistence(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| VesselError::persistence(dir, e))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !layout::is_shard_segment(name) {
            continue;
        }
        if !entry.path().is_dir() {
            continue;
        }
        segments.push(name.to_string());
        collect_ids(&entry.path(), remaining - 1, segments, out)?;
        segments.pop();
    }
    Ok(())
}

fn read_metadata(path: &Path) -> Result<Metadata> {
    let content = fs::read_to_string(path).map_err(|e| VesselError::persistence(path, e))?;
    serde_json::from_str(&content).map_err(|e| VesselError::Corrupt {
        path: path.to_path_buf(),
        source: e,
    })
}

fn write_json_atomic(path: &Path, value: &Value) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| VesselError::persistence(path, io::Error::from(io::ErrorKind::InvalidInput)))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| VesselError::persistence(dir, e))?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        serde_json::to_writer_pretty(&mut writer, value)
            .map_err(io::Error::from)
            .and_then(|_| writer.flush())
            .map_err(|e| VesselError::persistence(path, e))?;
    }
    tmp.as_file()
        .sync_all()
        .map_err(|e| VesselError::persistence(path, e))?;
    tmp.persist(path)
        .map_err(|e| VesselError::persistence(path, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn creation_data() -> ExecutionCreationData {
        ExecutionCreationData::from_json(json!({
            "commit": "deadbeef",
            "project": "0190b6a4-9c4e-7a10-8000-000000000001",
            "inputs": { "dataset": "s3://bucket/train.csv" },
            "parameters": { "lr": 0.01 },
            "environment_variables": {},
            "step": "train",
            "image": "alpine:3",
            "title": "nightly",
            "environment": "0190b6a4-9c4e-7a10-8000-000000000002"
        }))
        .unwrap()
    }

    fn partial(value: Value) -> Metadata {
        match value {
            Value::Object(map) => map,
            _ => panic!("partial metadata must be an object"),
        }
    }

    #[test]
    fn test_create_persists_metadata() {
        let dir = TempDir::new().unwrap();
        let store = ExecutionStore::open(dir.path());

        let execution = store.create(creation_data()).unwrap();

        assert!(execution.path().is_dir());
        assert!(execution.metadata_path().is_file());
        assert_eq!(execution.metadata().get("image"), Some(&json!("alpine:3")));
        assert_eq!(execution.metadata().get("kind"), Some(&json!("execution")));
        assert_eq!(
            execution.metadata().get("id"),
            Some(&json!(execution.id().to_string()))
        );
        assert_eq!(execution.status(), ExecutionStatus::Queued);
    }

    #[test]
    fn test_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = ExecutionStore::open(dir.path());
        let created = store.create(creation_data()).unwrap();

        let loaded = store.load(created.id()).unwrap();
        assert_eq!(loaded.id(), created.id());
        assert_eq!(loaded.path(), created.path());
        assert_eq!(loaded.metadata(), created.metadata());
    }

    #[test]
    fn test_load_unknown_id_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = ExecutionStore::open(dir.path());

        let err = store.load(&ExecutionId::generate()).unwrap_err();
        assert!(matches!(err, VesselError::NotFound(_)));
    }

    #[test]
    fn test_create_rejects_collision() {
        let dir = TempDir::new().unwrap();
        let store = ExecutionStore::open(dir.path());
        let id = ExecutionId::generate();

        store.create_with_metadata(id, Metadata::new()).unwrap();
        let err = store.create_with_metadata(id, Metadata::new()).unwrap_err();
        assert!(matches!(err, VesselError::Creation { .. }));
    }

    #[test]
    fn test_create_accepts_empty_strings() {
        let dir = TempDir::new().unwrap();
        let store = ExecutionStore::open(dir.path());
        let mut data = creation_data();
        data.commit = String::new();
        data.image = String::new();

        let execution = store.create(data).unwrap();
        assert_eq!(execution.metadata().get("image"), Some(&json!("")));
        assert_eq!(store.list().unwrap(), vec![*execution.id()]);
    }

    #[test]
    fn test_distinct_creations_get_distinct_paths() {
        let dir = TempDir::new().unwrap();
        let store = ExecutionStore::open(dir.path());

        let a = store.create(creation_data()).unwrap();
        let b = store.create(creation_data()).unwrap();
        assert_ne!(a.id(), b.id());
        assert_ne!(a.path(), b.path());
    }

    #[test]
    fn test_update_metadata_merges_shallowly() {
        let dir = TempDir::new().unwrap();
        let store = ExecutionStore::open(dir.path());
        let mut execution = store.create(creation_data()).unwrap();

        store
            .update_metadata(&mut execution, partial(json!({ "container_id": "c1", "title": "renamed" })))
            .unwrap();

        let reloaded = store.load(execution.id()).unwrap();
        assert_eq!(reloaded.metadata().get("container_id"), Some(&json!("c1")));
        assert_eq!(reloaded.metadata().get("title"), Some(&json!("renamed")));
        assert_eq!(reloaded.metadata().get("step"), Some(&json!("train")));
        assert_eq!(reloaded.status(), ExecutionStatus::Running);
        assert_eq!(execution.metadata(), reloaded.metadata());
    }

    #[test]
    fn test_update_metadata_merges_with_disk_not_snapshot() {
        let dir = TempDir::new().unwrap();
        let store = ExecutionStore::open(dir.path());
        let mut first = store.create(creation_data()).unwrap();
        let mut stale = store.load(first.id()).unwrap();

        store
            .update_metadata(&mut first, partial(json!({ "container_id": "c1" })))
            .unwrap();
        store
            .update_metadata(&mut stale, partial(json!({ "note": "hello" })))
            .unwrap();

        let reloaded = store.load(first.id()).unwrap();
        assert_eq!(reloaded.metadata().get("container_id"), Some(&json!("c1")));
        assert_eq!(reloaded.metadata().get("note"), Some(&json!("hello")));
    }

    #[test]
    fn test_set_once_only_writes_first_time() {
        let dir = TempDir::new().unwrap();
        let store = ExecutionStore::open(dir.path());
        let mut execution = store.create(creation_data()).unwrap();

        let wrote = store
            .set_once(&mut execution, "container_exit_code", partial(json!({ "container_exit_code": 0 })))
            .unwrap();
        assert!(wrote);

        let wrote = store
            .set_once(&mut execution, "container_exit_code", partial(json!({ "container_exit_code": 1 })))
            .unwrap();
        assert!(!wrote);
        assert_eq!(execution.metadata().get("container_exit_code"), Some(&json!(0)));
    }

    #[test]
    fn test_write_artifact_once_never_overwrites() {
        let dir = TempDir::new().unwrap();
        let store = ExecutionStore::open(dir.path());
        let execution = store.create(creation_data()).unwrap();

        assert!(store.write_artifact_once(&execution, Artifact::Stdout, b"first").unwrap());
        assert!(!store.write_artifact_once(&execution, Artifact::Stdout, b"second").unwrap());

        let content = fs::read(execution.artifact_path(Artifact::Stdout)).unwrap();
        assert_eq!(content, b"first");
    }

    #[test]
    fn test_outputs_path_is_created_lazily_and_idempotently() {
        let dir = TempDir::new().unwrap();
        let store = ExecutionStore::open(dir.path());
        let execution = store.create(creation_data()).unwrap();

        let expected = execution.path().join("outputs");
        assert!(!expected.exists());
        assert_eq!(store.outputs_path(&execution).unwrap(), expected);
        assert_eq!(store.outputs_path(&execution).unwrap(), expected);
        assert!(expected.is_dir());
    }

    #[test]
    fn test_list_returns_ids_in_creation_order() {
        let dir = TempDir::new().unwrap();
        let store = ExecutionStore::open(dir.path());
        assert!(store.list().unwrap().is_empty());

        let created: Vec<ExecutionId> = (0..5)
            .map(|_| *store.create(creation_data()).unwrap().id())
            .collect();

        // Stray files and directories are ignored
        fs::write(dir.path().join("executions").join("README"), "x").unwrap();
        fs::create_dir_all(dir.path().join("executions").join("not-hex!")).unwrap();

        assert_eq!(store.list().unwrap(), created);
    }

    #[test]
    fn test_list_skips_uppercase_shards() {
        let dir = TempDir::new().unwrap();
        let store = ExecutionStore::open(dir.path());
        let id: ExecutionId = "0190b6a4-9c4e-7a10-8000-00000000beef".parse().unwrap();
        let execution = store.create_with_metadata(id, Metadata::new()).unwrap();

        // Same id, uppercase directory names: not where load() would look
        let mut shadow = dir.path().join("executions");
        for segment in execution.id().shard_segments() {
            shadow.push(segment.to_uppercase());
        }
        fs::create_dir_all(&shadow).unwrap();
        fs::copy(execution.metadata_path(), shadow.join("metadata.json")).unwrap();

        let ids = store.list().unwrap();
        assert_eq!(ids, vec![*execution.id()]);
        for id in ids {
            store.load(&id).unwrap();
        }
    }

    #[test]
    fn test_corrupt_metadata_is_reported() {
        let dir = TempDir::new().unwrap();
        let store = ExecutionStore::open(dir.path());
        let execution = store.create(creation_data()).unwrap();
        fs::write(execution.metadata_path(), "{ not json").unwrap();

        let err = store.load(execution.id()).unwrap_err();
        assert!(matches!(err, VesselError::Corrupt { .. }));
    }
}
