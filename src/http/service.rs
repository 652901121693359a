//! The concrete service backing `DssSurface`: wires the execution
//! registry, model registry, and sweep engine together the way `api.py`'s
//! background-task handler does — submission returns immediately and the
//! sweep runs to completion on a spawned task.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::error;

use crate::dispatch::Dispatcher;
use crate::error::SurfaceError;
use crate::executions::ExecutionRegistry;
use crate::registry::{DuplicatePolicy, ModelRegistry};
use crate::sweep::SweepEngine;

use super::{
    state_to_tag, DssSurface, ExecutionsResponse, ModelUploadResponse, ModelsResponse,
    NotCompletedResponse, StatusResponse, SubmitRequest, SubmitResponse,
};

pub struct DssService {
    registry: Arc<ModelRegistry>,
    executions: ExecutionRegistry,
    dispatcher: Arc<dyn Dispatcher>,
    num_parallel_execs: i64,
    best_runs_dir: PathBuf,
}

impl DssService {
    pub fn new(
        registry: Arc<ModelRegistry>,
        executions: ExecutionRegistry,
        dispatcher: Arc<dyn Dispatcher>,
        num_parallel_execs: i64,
        best_runs_dir: PathBuf,
    ) -> Self {
        Self { registry, executions, dispatcher, num_parallel_execs, best_runs_dir }
    }
}

#[async_trait]
impl DssSurface for DssService {
    async fn submit(&self, request: SubmitRequest) -> Result<SubmitResponse, SurfaceError> {
        let mut spec = request.input;
        if let Some(name) = request.model_name {
            spec.model_run.model_name = name;
        }
        spec.validate()?;

        let exec_id = self
            .executions
            .create(spec.model_run.model_name.clone(), spec.model_analysis.output_file.clone())
            .await;

        let engine = SweepEngine::new(Arc::clone(&self.dispatcher), self.num_parallel_execs);
        let executions = self.executions.clone();
        let best_runs_dir = self.best_runs_dir.clone();
        let exec_id_for_task = exec_id.clone();

        tokio::spawn(async move {
            engine.execute(&exec_id_for_task, &spec, &executions).await;
            persist_best_run(&executions, &exec_id_for_task, &best_runs_dir).await;
        });

        Ok(SubmitResponse { id: exec_id })
    }

    async fn status(&self, exec_id: &str) -> StatusResponse {
        let state = self.executions.get_status(exec_id).await;
        let result = match state {
            Some(_) => self.executions.get_result(exec_id).await.map(|e| e.result),
            None => None,
        };
        StatusResponse { id: exec_id.to_string(), status: state_to_tag(state), result }
    }

    async fn best_run(&self, exec_id: &str) -> Result<Vec<u8>, NotCompletedResponse> {
        let path = self.best_runs_dir.join(exec_id).join("best_run.zip");
        std::fs::read(&path).map_err(|_| NotCompletedResponse { exec_id: exec_id.to_string() })
    }

    async fn executions(&self) -> ExecutionsResponse {
        ExecutionsResponse { executions: self.executions.get_executions().await }
    }

    async fn models(&self) -> Result<ModelsResponse, SurfaceError> {
        Ok(ModelsResponse { models: self.registry.list()? })
    }

    async fn upload_model(&self, name: &str, bytes: &[u8]) -> Result<ModelUploadResponse, SurfaceError> {
        self.registry.add(name, bytes, DuplicatePolicy::Reject)?;
        Ok(ModelUploadResponse { model_name: name.to_string() })
    }

    async fn get_model(&self, name: &str) -> Result<Vec<u8>, SurfaceError> {
        Ok(self.registry.get(name)?)
    }
}

/// Writes the last run whose archive is attached to `<best_runs_dir>/<exec_id>/best_run.zip`,
/// matching the persisted layout in §6.
async fn persist_best_run(executions: &ExecutionRegistry, exec_id: &str, best_runs_dir: &PathBuf) {
    use crate::executions::IterationOutcome;

    let Some(exec) = executions.get_result(exec_id).await else { return };
    let Some(IterationOutcome::Success { best_run, .. }) = exec.result.last() else { return };
    let Some(run) = exec.runs.iter().find(|r| &r.run_id == best_run) else { return };
    let bytes = match run.require_result() {
        Ok(bytes) => bytes,
        Err(err) => {
            error!(exec_id, %err, "best run has no result attached, skipping persist");
            return;
        }
    };

    let dir = best_runs_dir.join(exec_id);
    if let Err(err) = std::fs::create_dir_all(&dir) {
        error!(exec_id, %err, dir = %dir.display(), "failed to create best-run directory");
        return;
    }
    if let Err(err) = std::fs::write(dir.join("best_run.zip"), bytes) {
        error!(exec_id, %err, dir = %dir.display(), "failed to write best-run archive");
    }
}
