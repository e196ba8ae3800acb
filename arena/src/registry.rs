use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::runner::{RunTableResult, RunnerError};

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("table {0} already has a run in progress")]
    TableAlreadyRunning(String),
    #[error("table {0} has no run in progress")]
    TableNotRunning(String),
    #[error("runner for table {0} did not stop within the wait window")]
    StopTimeout(String),
    #[error("runner task failed: {0}")]
    TaskFailed(String),
}

struct RunningTable {
    cancel: CancellationToken,
    handle: JoinHandle<Result<RunTableResult, RunnerError>>,
}

/// Maps table ids to their running tasks. The mutex guards only registry
/// mutation; each table's run lives on its own task.
#[derive(Default)]
pub struct TableRegistry {
    tables: Mutex<HashMap<String, RunningTable>>,
}

fn lock_tables(registry: &TableRegistry) -> MutexGuard<'_, HashMap<String, RunningTable>> {
    registry.tables.lock().unwrap_or_else(|e| e.into_inner())
}

impl TableRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Launch a table run. `start` receives the run's cancellation token and
    /// returns the future that drives the runner to completion.
    pub fn launch<F, Fut>(self: &Arc<Self>, table_id: &str, start: F) -> Result<(), RegistryError>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<RunTableResult, RunnerError>> + Send + 'static,
    {
        let mut tables = lock_tables(self);
        if tables.contains_key(table_id) {
            return Err(RegistryError::TableAlreadyRunning(table_id.to_string()));
        }

        let cancel = CancellationToken::new();
        let future = start(cancel.clone());
        let registry = Arc::clone(self);
        let id = table_id.to_string();
        let handle = tokio::spawn(async move {
            let outcome = future.await;
            lock_tables(&registry).remove(&id);
            outcome
        });
        tables.insert(
            table_id.to_string(),
            RunningTable { cancel, handle },
        );
        info!(table_id, "table run registered");
        Ok(())
    }

    pub fn is_running(&self, table_id: &str) -> bool {
        lock_tables(self).contains_key(table_id)
    }

    /// Cancel a run and wait up to `wait` for the runner to acknowledge.
    /// The inner result is whatever the runner returned; a run stopped
    /// mid-flight reports `RunnerError::Cancelled` with its partial progress.
    pub async fn stop(
        &self,
        table_id: &str,
        wait: Duration,
    ) -> Result<Result<RunTableResult, RunnerError>, RegistryError> {
        let entry = lock_tables(self)
            .remove(table_id)
            .ok_or_else(|| RegistryError::TableNotRunning(table_id.to_string()))?;
        entry.cancel.cancel();

        match timeout(wait, entry.handle).await {
            Ok(Ok(outcome)) => {
                info!(table_id, "table run stopped");
                Ok(outcome)
            }
            Ok(Err(join_err)) => Err(RegistryError::TaskFailed(join_err.to_string())),
            // the task keeps draining in the background; the caller maps this
            // to a gateway timeout
            Err(_) => Err(RegistryError::StopTimeout(table_id.to_string())),
        }
    }
}
