// CLI commands for inspecting and driving executions
use anyhow::{Context, Result};
use serde_json::Value;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::warn;
use vessel_core::{
    CheckOutcome, DockerRuntime, ExecutionCreationData, ExecutionEngine, ExecutionId,
    ExecutionStatus, ExecutionStore,
};

fn parse_id(id: &str) -> Result<ExecutionId> {
    id.parse::<ExecutionId>()
        .with_context(|| format!("'{}' is not a valid execution id", id))
}

fn engine(data_dir: &Path) -> Result<ExecutionEngine<DockerRuntime>> {
    let runtime = DockerRuntime::connect().context("Failed to connect to Docker daemon")?;
    Ok(ExecutionEngine::new(ExecutionStore::open(data_dir), runtime))
}

/// Read a creation payload from a file, or stdin when `source` is "-"
fn read_payload(source: &str) -> Result<Value> {
    let content = if source == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read payload from stdin")?;
        buf
    } else {
        fs::read_to_string(source).with_context(|| format!("Failed to read payload file '{}'", source))?
    };
    serde_json::from_str(&content).context("Payload is not valid JSON")
}

/// Create an execution from a JSON payload
pub fn create(data_dir: &Path, payload_source: &str) -> Result<ExecutionId> {
    let payload = read_payload(payload_source)?;
    let data = ExecutionCreationData::from_json(payload)?;

    let store = ExecutionStore::open(data_dir);
    let execution = store.create(data).context("Failed to create execution")?;

    println!("✅ Created execution {}", execution.id());
    println!("   Path:   {}", execution.path().display());
    println!("   Status: {}", execution.status());
    Ok(*execution.id())
}

pub fn status(data_dir: &Path, id: &str) -> Result<ExecutionStatus> {
    let execution = ExecutionStore::open(data_dir).load(&parse_id(id)?)?;
    let status = execution.status();
    println!("{}", status);
    Ok(status)
}

pub fn show(data_dir: &Path, id: &str) -> Result<()> {
    let execution = ExecutionStore::open(data_dir).load(&parse_id(id)?)?;
    let document = Value::Object(execution.metadata().clone());
    println!("{}", serde_json::to_string_pretty(&document)?);
    Ok(())
}

pub async fn logs(data_dir: &Path, id: &str) -> Result<()> {
    let engine = engine(data_dir)?;
    let execution = engine.load(&parse_id(id)?)?;

    match engine.get_logs(&execution).await? {
        Some(logs) => println!("{}", serde_json::to_string_pretty(&logs)?),
        None => println!("No logs available (no container yet)"),
    }
    Ok(())
}

pub async fn check(data_dir: &Path, id: &str) -> Result<()> {
    let engine = engine(data_dir)?;
    let mut execution = engine.load(&parse_id(id)?)?;

    let outcome = engine
        .check_container_status(&mut execution)
        .await
        .context("Status check failed; it is safe to retry")?;

    match outcome {
        CheckOutcome::NoContainer => println!("⏳ No container recorded yet"),
        CheckOutcome::NotTerminal { status } => println!("⏳ Container is {}", status),
        CheckOutcome::Terminal {
            recorded_final_state,
            written,
        } => {
            if recorded_final_state {
                println!("📝 Recorded final container state");
            }
            for artifact in &written {
                println!("📝 Wrote {}", execution.artifact_path(*artifact).display());
            }
            if !recorded_final_state && written.is_empty() {
                println!("✓ Already captured");
            }
        }
    }
    println!("Status: {}", execution.status());
    Ok(())
}

pub fn attach(data_dir: &Path, id: &str, container_id: &str) -> Result<()> {
    let store = ExecutionStore::open(data_dir);
    let mut execution = store.load(&parse_id(id)?)?;
    store.attach_container(&mut execution, container_id)?;

    println!("🔗 Attached container {} to {}", container_id.trim(), execution.id());
    println!("Status: {}", execution.status());
    Ok(())
}

pub fn outputs(data_dir: &Path, id: &str) -> Result<PathBuf> {
    let store = ExecutionStore::open(data_dir);
    let execution = store.load(&parse_id(id)?)?;
    let path = store.outputs_path(&execution)?;
    println!("{}", path.display());
    Ok(path)
}

pub fn list(data_dir: &Path) -> Result<Vec<(ExecutionId, ExecutionStatus)>> {
    let store = ExecutionStore::open(data_dir);
    let mut rows = Vec::new();
    for id in store.list()? {
        let execution = match store.load(&id) {
            Ok(execution) => execution,
            Err(e) => {
                warn!(execution_id = %id, error = %e, "Skipping unreadable execution");
                continue;
            }
        };
        let title = execution
            .metadata()
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or("");
        println!("{}  {:<8}  {}", id, execution.status(), title);
        rows.push((id, execution.status()));
    }
    if rows.is_empty() {
        println!("No executions in {}", data_dir.display());
    }
    Ok(rows)
}
