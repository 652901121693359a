//! The Execution Registry (C5): a process-wide map of execution id to its
//! state machine, and the `Execution` type itself.

mod registry;
pub mod state;

pub use registry::ExecutionRegistry;
pub use state::{Execution, ExecutionState, IterationOutcome, PermutationParams, Run, SimpleExecution};
