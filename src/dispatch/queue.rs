//! Queue dispatcher: submits a task to a Redis-backed broker and polls for
//! its result. Task acknowledgement is late and worker prefetch is one, so
//! a crashed worker requeues its task and a long-running task does not
//! starve its peers — mirrored here by storing in-flight tasks in a
//! `processing` list until the worker explicitly completes them.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::DispatchError;
use crate::sweep::permutation::{FileAssignment, Permutation};

use super::Dispatcher;

/// The wire shape of one dispatched task, matching
/// `ModelExecutionPermutation::as_dict()`'s `{files, columns, values}`
/// envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueTask {
    pub task_id: String,
    pub model_name: String,
    pub output_file: String,
    pub files: Vec<String>,
    pub columns: Vec<String>,
    pub values: Vec<f64>,
}

impl QueueTask {
    fn new(model_name: &str, permutation: &Permutation, output_file: &str) -> Self {
        Self {
            task_id: Uuid::new_v4().to_string(),
            model_name: model_name.to_string(),
            output_file: output_file.to_string(),
            files: permutation.files(),
            columns: permutation.columns(),
            values: permutation.values(),
        }
    }

    pub fn permutation(&self) -> Permutation {
        let assignments = self
            .files
            .iter()
            .zip(self.columns.iter())
            .zip(self.values.iter())
            .map(|((file_name, col_name), &value)| FileAssignment {
                file_name: file_name.clone(),
                col_name: col_name.clone(),
                value,
            })
            .collect();
        Permutation { assignments }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ResultEnvelope {
    /// base64-encoded packaged run archive, or absent on error.
    archive_b64: Option<String>,
    error: Option<String>,
}

/// A Redis-backed task queue, grounded on the same late-ack, prefetch-one
/// queue pattern used elsewhere in the corpus for reliable job dispatch.
pub struct JobQueue {
    conn: ConnectionManager,
    queue_name: String,
}

impl JobQueue {
    pub async fn connect(redis_url: &str, queue_name: &str) -> Result<Self, DispatchError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| DispatchError::QueueConnection(e.to_string()))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| DispatchError::QueueConnection(e.to_string()))?;
        Ok(Self { conn, queue_name: queue_name.to_string() })
    }

    fn pending_key(&self) -> String {
        self.queue_name.clone()
    }

    fn processing_key(&self) -> String {
        format!("{}:processing", self.queue_name)
    }

    fn result_key(&self, task_id: &str) -> String {
        format!("{}:results:{task_id}", self.queue_name)
    }

    pub async fn enqueue(&self, task: &QueueTask) -> Result<(), DispatchError> {
        let payload = serde_json::to_string(task).map_err(|e| DispatchError::Queue(e.to_string()))?;
        let mut conn = self.conn.clone();
        conn.lpush::<_, _, ()>(self.pending_key(), payload)
            .await
            .map_err(|e| DispatchError::Queue(e.to_string()))
    }

    /// Worker-side: pop the next task with late-ack semantics, moving it
    /// into the processing list atomically until `complete` removes it.
    pub async fn dequeue(&self, timeout: Duration) -> Result<Option<QueueTask>, DispatchError> {
        let mut conn = self.conn.clone();
        let secs = timeout.as_secs().max(1);
        let raw: Option<String> = redis::cmd("BRPOPLPUSH")
            .arg(self.pending_key())
            .arg(self.processing_key())
            .arg(secs)
            .query_async(&mut conn)
            .await
            .map_err(|e| DispatchError::Queue(e.to_string()))?;
        match raw {
            Some(payload) => {
                let task: QueueTask =
                    serde_json::from_str(&payload).map_err(|e| DispatchError::Queue(e.to_string()))?;
                Ok(Some(task))
            }
            None => Ok(None),
        }
    }

    /// Worker-side: record the result and remove the task from
    /// processing. A worker that dies before calling this leaves the task
    /// recoverable by a future `recover` pass (not implemented — crash
    /// recovery is out of scope per the design's Non-goals on persistence).
    pub async fn complete(&self, task: &QueueTask, payload: &str, raw_task: &str) -> Result<(), DispatchError> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(self.result_key(&task.task_id), payload, 604_800)
            .await
            .map_err(|e| DispatchError::Queue(e.to_string()))?;
        conn.lrem::<_, _, ()>(self.processing_key(), 1, raw_task)
            .await
            .map_err(|e| DispatchError::Queue(e.to_string()))
    }

    async fn get_result(&self, task_id: &str) -> Result<Option<String>, DispatchError> {
        let mut conn = self.conn.clone();
        let val: Option<String> = conn
            .get(self.result_key(task_id))
            .await
            .map_err(|e| DispatchError::Queue(e.to_string()))?;
        Ok(val)
    }

    async fn forget(&self, task_id: &str) -> Result<(), DispatchError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(self.result_key(task_id))
            .await
            .map_err(|e| DispatchError::Queue(e.to_string()))
    }
}

/// Submits tasks to a `JobQueue` and polls for their result with a fixed
/// interval, applying an optional overall timeout.
pub struct QueueDispatcher {
    queue: JobQueue,
    poll_interval: Duration,
    timeout: Option<Duration>,
}

impl QueueDispatcher {
    pub fn new(queue: JobQueue, poll_interval: Duration, timeout: Option<Duration>) -> Self {
        Self { queue, poll_interval, timeout }
    }
}

#[async_trait]
impl Dispatcher for QueueDispatcher {
    async fn dispatch(
        &self,
        model_name: &str,
        permutation: &Permutation,
        output_file: &str,
    ) -> Result<Vec<u8>, DispatchError> {
        let task = QueueTask::new(model_name, permutation, output_file);
        self.queue.enqueue(&task).await?;

        let started = Instant::now();
        loop {
            if let Some(raw) = self.queue.get_result(&task.task_id).await? {
                let envelope: ResultEnvelope =
                    serde_json::from_str(&raw).map_err(|e| DispatchError::DecodeError(e.to_string()))?;
                if let Some(error) = envelope.error {
                    self.queue.forget(&task.task_id).await?;
                    return Err(DispatchError::Queue(error));
                }
                let archive_b64 = envelope
                    .archive_b64
                    .ok_or_else(|| DispatchError::DecodeError("missing archive payload".to_string()))?;
                let bytes = BASE64
                    .decode(archive_b64)
                    .map_err(|e| DispatchError::DecodeError(e.to_string()))?;
                self.queue.forget(&task.task_id).await?;
                return Ok(bytes);
            }

            if let Some(timeout) = self.timeout {
                if started.elapsed() >= timeout {
                    self.queue.forget(&task.task_id).await?;
                    return Err(DispatchError::Timeout);
                }
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

/// The worker side of the contract: pop a task, run it through the
/// sandbox, and publish the base64-wrapped result. Driven by a standalone
/// worker process against the same Redis instance.
pub mod worker {
    use std::path::PathBuf;

    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;

    use crate::error::DispatchError;
    use crate::registry::client::ModelRegistryHttpClient;
    use crate::sandbox;

    use super::{JobQueue, ResultEnvelope};

    /// Processes one queued task to completion, if one is available within
    /// `timeout`. Returns `true` if a task was processed.
    pub async fn run_once(
        queue: &JobQueue,
        registry_client: &ModelRegistryHttpClient,
        model_exe: &PathBuf,
        timeout: std::time::Duration,
    ) -> Result<bool, DispatchError> {
        let Some(task) = queue.dequeue(timeout).await? else {
            return Ok(false);
        };
        let raw_task = serde_json::to_string(&task).map_err(|e| DispatchError::Queue(e.to_string()))?;

        let outcome = process(&task, registry_client, model_exe).await;
        let envelope = match outcome {
            Ok(bytes) => ResultEnvelope { archive_b64: Some(BASE64.encode(bytes)), error: None },
            Err(err) => ResultEnvelope { archive_b64: None, error: Some(err.to_string()) },
        };
        let payload = serde_json::to_string(&envelope).map_err(|e| DispatchError::Queue(e.to_string()))?;
        queue.complete(&task, &payload, &raw_task).await?;
        Ok(true)
    }

    async fn process(
        task: &super::QueueTask,
        registry_client: &ModelRegistryHttpClient,
        model_exe: &PathBuf,
    ) -> Result<Vec<u8>, DispatchError> {
        let archive_bytes = registry_client.get(&task.model_name).await?;
        let permutation = task.permutation();
        let run_dir = sandbox::prepare(&archive_bytes, &permutation, "wqdss-worker-")?;
        sandbox::exec(run_dir.path(), model_exe).await?;

        let mut files = permutation.files();
        files.push(task.output_file.clone());
        files.sort();
        files.dedup();
        Ok(sandbox::package(run_dir.path(), &files)?)
    }
}
