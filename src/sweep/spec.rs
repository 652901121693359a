//! The sweep specification: the JSON document a client submits with a
//! `/dss` request, and the validation that turns it into something the
//! engine can safely enumerate.

use serde::{Deserialize, Serialize};

use crate::error::SweepError;

/// Sentinel used when a sweep spec does not name a model explicitly.
pub const DEFAULT_MODEL_NAME: &str = "default";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SweepSpec {
    pub model_run: ModelRunSpec,
    pub model_analysis: ModelAnalysisSpec,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelRunSpec {
    #[serde(default = "default_model_name")]
    pub model_name: String,
    pub input_files: Vec<InputFileSpec>,
}

fn default_model_name() -> String {
    DEFAULT_MODEL_NAME.to_string()
}

/// One swept input file: a CSV inside the model archive whose `col_name`
/// column is overwritten with a value drawn from `[min_val, max_val)`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InputFileSpec {
    pub name: String,
    pub col_name: String,
    pub min_val: f64,
    pub max_val: f64,
    /// A single step size (single-iteration mode) or one step per
    /// refinement iteration (multi-iteration mode).
    pub steps: Vec<f64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelAnalysisSpec {
    pub output_file: String,
    pub parameters: Vec<ParameterSpec>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ParameterSpec {
    pub name: String,
    pub target: f64,
    pub weight: f64,
    pub score_step: f64,
}

impl SweepSpec {
    /// Number of refinement iterations implied by the `steps` sequences.
    /// All input files must agree; mismatch is a hard error per §3's
    /// invariant.
    pub fn iteration_count(&self) -> Result<usize, SweepError> {
        let counts: Vec<usize> = self
            .model_run
            .input_files
            .iter()
            .map(|f| f.steps.len())
            .collect();
        match counts.first() {
            None => Ok(0),
            Some(first) => {
                if counts.iter().all(|c| c == first) {
                    Ok(*first)
                } else {
                    Err(SweepError::NonEqualStepCount(counts))
                }
            }
        }
    }

    pub fn validate(&self) -> Result<(), SweepError> {
        self.iteration_count()?;
        for param in &self.model_analysis.parameters {
            if param.score_step <= 0.0 {
                return Err(SweepError::ScoreParse(format!(
                    "parameter '{}' has non-positive score_step",
                    param.name
                )));
            }
            if param.weight <= 0.0 {
                return Err(SweepError::ScoreParse(format!(
                    "parameter '{}' has non-positive weight",
                    param.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_spec(steps: Vec<Vec<f64>>) -> SweepSpec {
        SweepSpec {
            model_run: ModelRunSpec {
                model_name: DEFAULT_MODEL_NAME.to_string(),
                input_files: steps
                    .into_iter()
                    .enumerate()
                    .map(|(i, s)| InputFileSpec {
                        name: format!("file{i}.csv"),
                        col_name: format!("col{i}"),
                        min_val: 0.0,
                        max_val: 10.0,
                        steps: s,
                    })
                    .collect(),
            },
            model_analysis: ModelAnalysisSpec {
                output_file: "out.csv".to_string(),
                parameters: vec![],
            },
        }
    }

    #[test]
    fn iteration_count_matches_equal_step_lengths() {
        let spec = sample_spec(vec![vec![1.0, 0.5], vec![2.0, 1.0]]);
        assert_eq!(spec.iteration_count().unwrap(), 2);
    }

    #[test]
    fn iteration_count_rejects_mismatched_step_lengths() {
        let spec = sample_spec(vec![vec![1.0, 0.5], vec![2.0]]);
        assert!(spec.iteration_count().is_err());
    }

    #[test]
    fn default_model_name_applies() {
        let json = r#"{
            "model_run": {"input_files": []},
            "model_analysis": {"output_file": "out.csv", "parameters": []}
        }"#;
        let spec: SweepSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.model_run.model_name, DEFAULT_MODEL_NAME);
    }
}
