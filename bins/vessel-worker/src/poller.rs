/// Poller - drives `check_container_status` over every open execution
///
/// One sweep lists the store, skips settled executions, and checks the rest
/// with bounded concurrency. Failures are logged and counted; the next sweep
/// retries them from scratch.
use futures_util::stream::{self, StreamExt};
use tracing::{debug, info, warn};
use vessel_core::{CheckOutcome, ExecutionEngine, ExecutionId, RuntimeClient};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepStats {
    pub listed: usize,
    pub settled: usize,
    pub waiting: usize,
    pub captured: usize,
    pub failed: usize,
}

enum CheckResult {
    Settled,
    Waiting,
    Captured,
    Failed,
}

pub async fn sweep<R: RuntimeClient>(
    engine: &ExecutionEngine<R>,
    max_concurrent: usize,
) -> anyhow::Result<SweepStats> {
    let ids = engine.store().list()?;
    let mut stats = SweepStats {
        listed: ids.len(),
        ..Default::default()
    };

    let results: Vec<CheckResult> = stream::iter(ids)
        .map(|id| check_one(engine, id))
        .buffer_unordered(max_concurrent.max(1))
        .collect()
        .await;

    for result in results {
        match result {
            CheckResult::Settled => stats.settled += 1,
            CheckResult::Waiting => stats.waiting += 1,
            CheckResult::Captured => stats.captured += 1,
            CheckResult::Failed => stats.failed += 1,
        }
    }

    Ok(stats)
}

async fn check_one<R: RuntimeClient>(engine: &ExecutionEngine<R>, id: ExecutionId) -> CheckResult {
    let mut execution = match engine.load(&id) {
        Ok(execution) => execution,
        Err(e) => {
            warn!(execution_id = %id, error = %e, "Failed to load execution");
            return CheckResult::Failed;
        }
    };

    if engine.is_settled(&execution) {
        return CheckResult::Settled;
    }

    match engine.check_container_status(&mut execution).await {
        Ok(CheckOutcome::NoContainer) => {
            debug!(execution_id = %id, "No container yet");
            CheckResult::Waiting
        }
        Ok(CheckOutcome::NotTerminal { status }) => {
            debug!(execution_id = %id, container_status = %status, "Container still active");
            CheckResult::Waiting
        }
        Ok(CheckOutcome::Terminal {
            recorded_final_state,
            written,
        }) => {
            info!(
                execution_id = %id,
                status = %execution.status(),
                recorded_final_state = recorded_final_state,
                artifacts_written = written.len(),
                "Execution captured"
            );
            CheckResult::Captured
        }
        Err(e) => {
            warn!(execution_id = %id, error = %e, "Status check failed; will retry next sweep");
            CheckResult::Failed
        }
    }
}
