//! In-process dispatcher: fetches the archive from the local registry,
//! runs `prepare -> exec -> package` on the local host. Concurrency comes
//! from the child process's wait yielding to the async scheduler.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::DispatchError;
use crate::registry::ModelRegistry;
use crate::sandbox;
use crate::sweep::permutation::Permutation;

use super::Dispatcher;

pub struct InProcessDispatcher {
    registry: Arc<ModelRegistry>,
    model_exe: PathBuf,
}

impl InProcessDispatcher {
    pub fn new(registry: Arc<ModelRegistry>, model_exe: PathBuf) -> Self {
        Self { registry, model_exe }
    }
}

#[async_trait]
impl Dispatcher for InProcessDispatcher {
    async fn dispatch(
        &self,
        model_name: &str,
        permutation: &Permutation,
        output_file: &str,
    ) -> Result<Vec<u8>, DispatchError> {
        let archive_bytes = self
            .registry
            .get(model_name)
            .map_err(|_| DispatchError::ModelNotFound(model_name.to_string()))?;

        let run_dir = sandbox::prepare(&archive_bytes, permutation, "wqdss-run-")?;

        sandbox::exec(run_dir.path(), &self.model_exe).await?;

        let mut files = permutation.files();
        files.push(output_file.to_string());
        files.sort();
        files.dedup();

        let packaged = sandbox::package(run_dir.path(), &files)?;
        Ok(packaged)
    }
}
