//! The `Execution` state machine: `RUNNING --execute ok/err--> COMPLETED`,
//! terminal, with no other transitions. `mark_complete` is invoked on every
//! exit path of `execute`, including errors, per the design's invariant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SweepError;
use crate::sweep::permutation::Permutation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExecutionState {
    Running,
    Completed,
}

/// One dispatched model run: its generating permutation and, once the
/// sandbox returns, the packaged output archive.
#[derive(Debug, Clone)]
pub struct Run {
    pub run_id: String,
    pub permutation: Permutation,
    pub iteration_index: usize,
    pub result_bytes: Option<Vec<u8>>,
}

impl Run {
    pub fn new(run_id: String, permutation: Permutation, iteration_index: usize) -> Self {
        Self {
            run_id,
            permutation,
            iteration_index,
            result_bytes: None,
        }
    }

    /// Returns the packaged run archive, or `RunNotCompleted` if the run
    /// has not produced a result yet.
    pub fn require_result(&self) -> Result<&[u8], SweepError> {
        self.result_bytes
            .as_deref()
            .ok_or_else(|| SweepError::RunNotCompleted(self.run_id.clone()))
    }
}

/// `params` in the `{files, columns, values}` envelope, per the decided
/// result shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermutationParams {
    pub files: Vec<String>,
    pub columns: Vec<String>,
    pub values: Vec<f64>,
}

impl From<&Permutation> for PermutationParams {
    fn from(p: &Permutation) -> Self {
        Self {
            files: p.files(),
            columns: p.columns(),
            values: p.values(),
        }
    }
}

/// The outcome of one sweep iteration: the winning run, or a failure
/// record when the iteration's slice raised an exception.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IterationOutcome {
    Success {
        best_run: String,
        params: PermutationParams,
        score: f64,
    },
    Failure {
        best_run: String,
        score: f64,
        error: String,
    },
}

impl IterationOutcome {
    pub fn failed(error: impl Into<String>) -> Self {
        IterationOutcome::Failure {
            best_run: "FAILED".to_string(),
            score: 0.0,
            error: error.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Execution {
    pub exec_id: String,
    pub state: ExecutionState,
    pub model_name: String,
    pub start_time: DateTime<Utc>,
    pub output_file: String,
    pub runs: Vec<Run>,
    pub result: Vec<IterationOutcome>,
}

impl Execution {
    pub fn new(exec_id: String, model_name: String, output_file: String, start_time: DateTime<Utc>) -> Self {
        Self {
            exec_id,
            state: ExecutionState::Running,
            model_name,
            start_time,
            output_file,
            runs: Vec::new(),
            result: Vec::new(),
        }
    }

    pub fn add_run(&mut self, run: Run) {
        self.runs.push(run);
    }

    pub fn push_iteration_result(&mut self, outcome: IterationOutcome) {
        self.result.push(outcome);
    }

    /// Invoked on every exit path of the driving sweep, success or failure.
    /// `COMPLETED` is terminal; calling this twice is a no-op.
    pub fn mark_complete(&mut self) {
        self.state = ExecutionState::Completed;
    }

    pub fn is_completed(&self) -> bool {
        self.state == ExecutionState::Completed
    }
}

/// Summary used by `GET /executions`, grounded on the prototype's
/// `simple_execution`/`get_executions` helpers.
#[derive(Debug, Clone, Serialize)]
pub struct SimpleExecution {
    pub id: String,
    pub model_name: String,
    pub start_time: DateTime<Utc>,
    pub result: Vec<IterationOutcome>,
}

impl From<&Execution> for SimpleExecution {
    fn from(exec: &Execution) -> Self {
        Self {
            id: exec.exec_id.clone(),
            model_name: exec.model_name.clone(),
            start_time: exec.start_time,
            result: exec.result.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_execution_starts_running() {
        let exec = Execution::new("e1".to_string(), "default".to_string(), "out.csv".to_string(), Utc::now());
        assert_eq!(exec.state, ExecutionState::Running);
        assert!(!exec.is_completed());
    }

    #[test]
    fn mark_complete_is_terminal_and_idempotent() {
        let mut exec = Execution::new("e1".to_string(), "default".to_string(), "out.csv".to_string(), Utc::now());
        exec.mark_complete();
        assert!(exec.is_completed());
        exec.mark_complete();
        assert!(exec.is_completed());
    }
}
