//! The Worker Dispatcher (C3): the single suspension point of the engine.
//! One contract, two implementations, injected at construction time.

pub mod in_process;
pub mod queue;

use async_trait::async_trait;

use crate::error::DispatchError;
use crate::sweep::permutation::Permutation;

/// `dispatch(model_name, permutation, output_file) -> output_archive_bytes`.
/// Implementations run one model at one permutation and return its
/// packaged output archive.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(
        &self,
        model_name: &str,
        permutation: &Permutation,
        output_file: &str,
    ) -> Result<Vec<u8>, DispatchError>;
}

pub use in_process::InProcessDispatcher;
pub use queue::QueueDispatcher;
