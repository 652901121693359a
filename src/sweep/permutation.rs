//! Permutation generation: the Cartesian product of per-file value ranges,
//! and the iterative-refinement window used by multi-iteration sweeps.

use crate::sweep::spec::InputFileSpec;

/// One drawn value for one swept input file.
#[derive(Debug, Clone, PartialEq)]
pub struct FileAssignment {
    pub file_name: String,
    pub col_name: String,
    pub value: f64,
}

/// One point in the sweep space: one assignment per input file, in
/// file-declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct Permutation {
    pub assignments: Vec<FileAssignment>,
}

impl Permutation {
    pub fn files(&self) -> Vec<String> {
        self.assignments.iter().map(|a| a.file_name.clone()).collect()
    }

    pub fn columns(&self) -> Vec<String> {
        self.assignments.iter().map(|a| a.col_name.clone()).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.assignments.iter().map(|a| a.value).collect()
    }
}

/// Values strictly below `max_val`, starting at `min_val` and advancing by
/// `step`. The upper bound is strict, uniformly, per the decided resolution
/// of the source ambiguity: `min_val + k*step < max_val`.
pub fn values_range(min_val: f64, max_val: f64, step: f64) -> Vec<f64> {
    if step <= 0.0 {
        return Vec::new();
    }
    let mut values = Vec::new();
    let mut k = 0u64;
    loop {
        let v = min_val + (k as f64) * step;
        if v >= max_val {
            break;
        }
        values.push(v);
        k += 1;
    }
    values
}

/// Iteration 0: the full range declared by the spec, swept at `steps[0]`.
pub fn generate_permutations(input_files: &[InputFileSpec]) -> Vec<Permutation> {
    let per_file_values: Vec<Vec<f64>> = input_files
        .iter()
        .map(|f| values_range(f.min_val, f.max_val, f.steps[0]))
        .collect();
    cartesian_product(input_files, &per_file_values)
}

/// Iteration `k > 0`: for each file, recentre the range around the value
/// chosen by the previous iteration's optimum, half the previous step wide
/// on either side, swept at the current step.
pub fn generate_refined_permutations(
    input_files: &[InputFileSpec],
    previous_best: &[f64],
    prev_steps: &[f64],
    curr_steps: &[f64],
) -> Vec<Permutation> {
    let per_file_values: Vec<Vec<f64>> = input_files
        .iter()
        .enumerate()
        .map(|(i, _)| {
            let best = previous_best[i];
            let prev_step = prev_steps[i];
            let curr_step = curr_steps[i];
            let min_val = best - prev_step / 2.0;
            let max_val = best + prev_step / 2.0;
            values_range(min_val, max_val, curr_step)
        })
        .collect();
    cartesian_product(input_files, &per_file_values)
}

fn cartesian_product(
    input_files: &[InputFileSpec],
    per_file_values: &[Vec<f64>],
) -> Vec<Permutation> {
    if per_file_values.is_empty() {
        return Vec::new();
    }
    let mut permutations: Vec<Vec<f64>> = vec![Vec::new()];
    for values in per_file_values {
        let mut next = Vec::with_capacity(permutations.len() * values.len());
        for prefix in &permutations {
            for &v in values {
                let mut combined = prefix.clone();
                combined.push(v);
                next.push(combined);
            }
        }
        permutations = next;
    }

    permutations
        .into_iter()
        .map(|combo| Permutation {
            assignments: combo
                .into_iter()
                .zip(input_files.iter())
                .map(|(value, f)| FileAssignment {
                    file_name: f.name.clone(),
                    col_name: f.col_name.clone(),
                    value,
                })
                .collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_range_is_strict_on_the_upper_bound() {
        assert_eq!(values_range(1.0, 2.0, 0.5), vec![1.0, 1.5]);
        assert_eq!(values_range(30.0, 40.0, 2.0).len(), 5);
    }

    #[test]
    fn permutation_count_matches_scenario_one() {
        let files = vec![
            InputFileSpec {
                name: "hangq01.csv".to_string(),
                col_name: "v_hangq".to_string(),
                min_val: 1.0,
                max_val: 2.0,
                steps: vec![0.5],
            },
            InputFileSpec {
                name: "qin_br8.csv".to_string(),
                col_name: "v_qin".to_string(),
                min_val: 30.0,
                max_val: 40.0,
                steps: vec![2.0],
            },
        ];
        let perms = generate_permutations(&files);
        assert_eq!(perms.len(), 2 * 5);
    }

    #[test]
    fn refinement_window_is_centred_on_previous_best() {
        let files = vec![InputFileSpec {
            name: "a.csv".to_string(),
            col_name: "v".to_string(),
            min_val: 0.0,
            max_val: 10.0,
            steps: vec![1.0, 0.2],
        }];
        let perms = generate_refined_permutations(&files, &[5.0], &[1.0], &[0.2]);
        for p in &perms {
            let v = p.assignments[0].value;
            assert!(v >= 4.5 && v < 5.5);
        }
    }
}
