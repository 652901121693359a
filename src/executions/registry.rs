//! Process-wide mapping `exec_id -> Execution`. No persistence across
//! restart and no eviction, per the design notes: lifetime equals process
//! lifetime, mutation is single-owner (the driving sweep), reads are
//! concurrent.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::executions::state::{Execution, ExecutionState, SimpleExecution};

#[derive(Debug, Clone, Default)]
pub struct ExecutionRegistry {
    inner: Arc<RwLock<HashMap<String, Execution>>>,
}

impl ExecutionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a fresh `RUNNING` execution under a new opaque id and
    /// inserts it, returning the id.
    pub async fn create(&self, model_name: String, output_file: String) -> String {
        let exec_id = Uuid::new_v4().to_string();
        let exec = Execution::new(exec_id.clone(), model_name, output_file, chrono::Utc::now());
        self.inner.write().await.insert(exec_id.clone(), exec);
        exec_id
    }

    pub async fn get_status(&self, exec_id: &str) -> Option<ExecutionState> {
        self.inner.read().await.get(exec_id).map(|e| e.state)
    }

    pub async fn get_result(&self, exec_id: &str) -> Option<Execution> {
        self.inner.read().await.get(exec_id).cloned()
    }

    pub async fn get_executions(&self) -> Vec<SimpleExecution> {
        self.inner
            .read()
            .await
            .values()
            .map(SimpleExecution::from)
            .collect()
    }

    /// Apply a mutation to an execution already in the registry. The
    /// caller is the owning sweep driver; no other writer touches the same
    /// entry concurrently.
    pub async fn mutate<F, R>(&self, exec_id: &str, f: F) -> Option<R>
    where
        F: FnOnce(&mut Execution) -> R,
    {
        let mut guard = self.inner.write().await;
        guard.get_mut(exec_id).map(f)
    }
}
