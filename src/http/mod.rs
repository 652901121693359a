//! The HTTP Surface (C6), specified as a contract: request/response DTOs
//! matching §6's endpoint table, and a `DssSurface` trait an HTTP
//! framework adapter implements. No web framework dependency is
//! introduced here; wiring a concrete framework on top of this trait is
//! left to the binary that embeds one.

pub mod service;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SurfaceError;
use crate::executions::{ExecutionState, IterationOutcome, SimpleExecution};
use crate::sweep::spec::SweepSpec;

pub use service::DssService;

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitRequest {
    pub input: SweepSpec,
    pub model_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitResponse {
    pub id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StatusTag {
    Running,
    Completed,
    NotFound,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub id: String,
    pub status: StatusTag,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Vec<IterationOutcome>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionsResponse {
    pub executions: Vec<SimpleExecution>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelsResponse {
    pub models: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelUploadResponse {
    pub model_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NotCompletedResponse {
    pub exec_id: String,
}

/// The operations a concrete HTTP adapter (axum, warp, or otherwise) wires
/// its routes to. Every method maps directly to one row of §6's endpoint
/// table.
#[async_trait]
pub trait DssSurface: Send + Sync {
    async fn submit(&self, request: SubmitRequest) -> Result<SubmitResponse, SurfaceError>;
    async fn status(&self, exec_id: &str) -> StatusResponse;
    async fn best_run(&self, exec_id: &str) -> Result<Vec<u8>, NotCompletedResponse>;
    async fn executions(&self) -> ExecutionsResponse;
    async fn models(&self) -> Result<ModelsResponse, SurfaceError>;
    async fn upload_model(&self, name: &str, bytes: &[u8]) -> Result<ModelUploadResponse, SurfaceError>;
    async fn get_model(&self, name: &str) -> Result<Vec<u8>, SurfaceError>;
}

pub fn state_to_tag(state: Option<ExecutionState>) -> StatusTag {
    match state {
        Some(ExecutionState::Running) => StatusTag::Running,
        Some(ExecutionState::Completed) => StatusTag::Completed,
        None => StatusTag::NotFound,
    }
}
