//! The Sweep Engine (C4): drives bounded-parallel dispatch across one or
//! more refinement iterations, scores every completed run, and selects
//! the optimum.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::dispatch::Dispatcher;
use crate::error::{DispatchError, SweepError};
use crate::executions::{Execution, ExecutionRegistry, IterationOutcome};
use crate::executions::state::{PermutationParams, Run};
use crate::sandbox;
use crate::sweep::permutation::{generate_permutations, generate_refined_permutations, Permutation};
use crate::sweep::scoring::{extract_values, score};
use crate::sweep::spec::SweepSpec;

pub struct SweepEngine {
    dispatcher: Arc<dyn Dispatcher>,
    num_parallel_execs: i64,
}

impl SweepEngine {
    pub fn new(dispatcher: Arc<dyn Dispatcher>, num_parallel_execs: i64) -> Self {
        Self { dispatcher, num_parallel_execs }
    }

    /// Runs the full sweep for `exec_id`, mutating its `Execution` through
    /// `registry` as each iteration completes, and calling
    /// `mark_complete` on every exit path.
    pub async fn execute(&self, exec_id: &str, spec: &SweepSpec, registry: &ExecutionRegistry) {
        let result = self.run_iterations(exec_id, spec, registry).await;
        if let Err(err) = result {
            registry
                .mutate(exec_id, |exec: &mut Execution| {
                    exec.push_iteration_result(IterationOutcome::failed(err.to_string()));
                })
                .await;
        }
        registry.mutate(exec_id, |exec: &mut Execution| exec.mark_complete()).await;
    }

    async fn run_iterations(
        &self,
        exec_id: &str,
        spec: &SweepSpec,
        registry: &ExecutionRegistry,
    ) -> Result<(), SweepError> {
        let iteration_count = spec.iteration_count()?;
        let model_name = &spec.model_run.model_name;
        let output_file = &spec.model_analysis.output_file;

        let mut previous_best: Option<Vec<f64>> = None;
        let mut prev_steps: Vec<f64> = Vec::new();

        for iteration in 0..iteration_count.max(1) {
            let permutations = match &previous_best {
                None => generate_permutations(&spec.model_run.input_files),
                Some(best) => {
                    let curr_steps: Vec<f64> = spec
                        .model_run
                        .input_files
                        .iter()
                        .map(|f| f.steps[iteration])
                        .collect();
                    let perms = generate_refined_permutations(
                        &spec.model_run.input_files,
                        best,
                        &prev_steps,
                        &curr_steps,
                    );
                    prev_steps = curr_steps;
                    perms
                }
            };

            if previous_best.is_none() {
                prev_steps = spec
                    .model_run
                    .input_files
                    .iter()
                    .map(|f| f.steps[0])
                    .collect();
            }

            if permutations.is_empty() {
                return Err(SweepError::EmptySweep);
            }

            let best = self
                .run_slices(exec_id, iteration, &permutations, model_name, output_file, spec, registry)
                .await?;

            previous_best = Some(best);
        }

        Ok(())
    }

    /// Dispatches `permutations` in contiguous slices of
    /// `num_parallel_execs` width (or all at once when unbounded), scores
    /// every completed run, selects the minimum, records the iteration's
    /// outcome, and returns the winning permutation's values for the next
    /// iteration's refinement window.
    #[allow(clippy::too_many_arguments)]
    async fn run_slices(
        &self,
        exec_id: &str,
        iteration: usize,
        permutations: &[Permutation],
        model_name: &str,
        output_file: &str,
        spec: &SweepSpec,
        registry: &ExecutionRegistry,
    ) -> Result<Vec<f64>, SweepError> {
        let slice_width = if self.num_parallel_execs > 0 {
            self.num_parallel_execs as usize
        } else {
            permutations.len()
        };

        let mut best: Option<(String, Permutation, f64)> = None;

        for chunk in permutations.chunks(slice_width.max(1)) {
            let semaphore = Arc::new(Semaphore::new(chunk.len().max(1)));
            let futures = chunk.iter().map(|permutation| {
                let dispatcher = Arc::clone(&self.dispatcher);
                let semaphore = Arc::clone(&semaphore);
                let permutation = permutation.clone();
                let model_name = model_name.to_string();
                let output_file = output_file.to_string();
                async move {
                    let _permit = semaphore.acquire().await.expect("semaphore not closed");
                    let run_id = Uuid::new_v4().to_string();
                    let archive = dispatcher.dispatch(&model_name, &permutation, &output_file).await;
                    (run_id, permutation, archive)
                }
            });

            let results = join_all(futures).await;

            for (run_id, permutation, archive_result) in results {
                let archive_bytes = match archive_result {
                    Ok(bytes) => bytes,
                    Err(DispatchError::ModelNotFound(name)) => {
                        return Err(SweepError::ModelDirMissing(name, "model not registered".to_string()));
                    }
                    Err(DispatchError::Sandbox(sandbox_err)) => {
                        return Err(SweepError::ModelDirMissing(model_name.to_string(), sandbox_err.to_string()));
                    }
                    Err(other) => return Err(SweepError::from(other)),
                };
                let lines = sandbox::parse_output(&archive_bytes, output_file)
                    .map_err(|e| SweepError::ScoreParse(e.to_string()))?;
                let values = extract_values(&lines, &spec.model_analysis.parameters)?;
                let run_score = score(&values, &spec.model_analysis.parameters);

                let mut run = Run::new(run_id.clone(), permutation.clone(), iteration);
                run.result_bytes = Some(archive_bytes);
                registry.mutate(exec_id, |exec| exec.add_run(run)).await;

                let replace = match &best {
                    None => true,
                    Some((_, _, best_score)) => run_score < *best_score,
                };
                if replace {
                    best = Some((run_id, permutation, run_score));
                }
            }
        }

        let (best_run_id, best_permutation, best_score) =
            best.ok_or(SweepError::EmptySweep)?;

        registry
            .mutate(exec_id, |exec| {
                exec.push_iteration_result(IterationOutcome::Success {
                    best_run: best_run_id.clone(),
                    params: PermutationParams::from(&best_permutation),
                    score: best_score,
                });
            })
            .await;

        Ok(best_permutation.values())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DispatchError;
    use async_trait::async_trait;

    struct FixedDispatcher;

    #[async_trait]
    impl Dispatcher for FixedDispatcher {
        async fn dispatch(
            &self,
            _model_name: &str,
            permutation: &Permutation,
            _output_file: &str,
        ) -> Result<Vec<u8>, DispatchError> {
            let v = permutation.assignments[0].value;
            let mut buf = Vec::new();
            {
                let cursor = std::io::Cursor::new(&mut buf);
                let mut writer = zip::ZipWriter::new(cursor);
                let options = zip::write::FileOptions::<()>::default();
                writer.start_file("out.csv", options).unwrap();
                use std::io::Write;
                writer.write_all(format!("val\n{v}\n").as_bytes()).unwrap();
                writer.finish().unwrap();
            }
            Ok(buf)
        }
    }

    fn spec() -> SweepSpec {
        use crate::sweep::spec::{InputFileSpec, ModelAnalysisSpec, ModelRunSpec, ParameterSpec};
        SweepSpec {
            model_run: ModelRunSpec {
                model_name: "default".to_string(),
                input_files: vec![InputFileSpec {
                    name: "f.csv".to_string(),
                    col_name: "v".to_string(),
                    min_val: 0.0,
                    max_val: 3.0,
                    steps: vec![1.0],
                }],
            },
            model_analysis: ModelAnalysisSpec {
                output_file: "out.csv".to_string(),
                parameters: vec![ParameterSpec {
                    name: "val".to_string(),
                    target: 1.0,
                    weight: 1.0,
                    score_step: 1.0,
                }],
            },
        }
    }

    #[tokio::test]
    async fn single_iteration_selects_exact_match() {
        let dispatcher: Arc<dyn Dispatcher> = Arc::new(FixedDispatcher);
        let engine = SweepEngine::new(dispatcher, -1);
        let registry = ExecutionRegistry::new();
        let spec = spec();
        let exec_id = registry.create(spec.model_run.model_name.clone(), spec.model_analysis.output_file.clone()).await;

        engine.execute(&exec_id, &spec, &registry).await;

        let exec = registry.get_result(&exec_id).await.unwrap();
        assert!(exec.is_completed());
        assert_eq!(exec.result.len(), 1);
        match &exec.result[0] {
            IterationOutcome::Success { score, .. } => assert_eq!(*score, 0.0),
            other => panic!("expected success, got {other:?}"),
        }
    }
}
