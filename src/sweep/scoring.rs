//! Scoring: weighted L1 distance between a run's observed output values and
//! the target values declared in the sweep spec.

use crate::error::SweepError;
use crate::sweep::spec::ParameterSpec;

/// Build a two-row CSV from the run's output lines (header plus final data
/// row, leading whitespace stripped from header fields) and read the value
/// of each scored parameter.
pub fn extract_values(
    lines: &[String],
    parameters: &[ParameterSpec],
) -> Result<Vec<f64>, SweepError> {
    let header_line = lines
        .first()
        .ok_or_else(|| SweepError::ScoreParse("output has no header line".to_string()))?;
    let data_line = lines
        .last()
        .ok_or_else(|| SweepError::ScoreParse("output has no data rows".to_string()))?;

    let header: Vec<String> = header_line.split(',').map(|f| f.trim().to_string()).collect();
    let fields: Vec<&str> = data_line.split(',').map(|f| f.trim()).collect();

    parameters
        .iter()
        .map(|p| {
            let idx = header
                .iter()
                .position(|h| h == &p.name)
                .ok_or_else(|| SweepError::ScoreParse(format!("column '{}' not in output", p.name)))?;
            let raw = fields
                .get(idx)
                .ok_or_else(|| SweepError::ScoreParse(format!("row shorter than header for '{}'", p.name)))?;
            raw.parse::<f64>()
                .map_err(|_| SweepError::ScoreParse(format!("value '{raw}' for '{}' is not numeric", p.name)))
        })
        .collect()
}

/// Weighted L1 distance: `Σ |target_p − value_p| / score_step_p / weight_p`.
pub fn score(values: &[f64], parameters: &[ParameterSpec]) -> f64 {
    values
        .iter()
        .zip(parameters.iter())
        .map(|(value, p)| (p.target - value).abs() / p.score_step / p.weight)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> Vec<ParameterSpec> {
        vec![
            ParameterSpec { name: "NO3".to_string(), target: 3.7, weight: 4.0, score_step: 0.1 },
            ParameterSpec { name: "NH4".to_string(), target: 2.4, weight: 2.0, score_step: 0.2 },
            ParameterSpec { name: "DO".to_string(), target: 8.0, weight: 2.0, score_step: 0.5 },
        ]
    }

    #[test]
    fn scoring_matches_scenario_two() {
        let p = params();
        assert_eq!(score(&[3.7, 2.4, 8.0], &p), 0.0);
        assert_eq!(score(&[3.7, 2.4, 7.0], &p), 1.0);
        assert_eq!(score(&[3.8, 2.4, 7.0], &p), 1.25);
    }

    #[test]
    fn extract_values_strips_header_whitespace_and_reads_last_row() {
        let lines = vec![
            " NO3, NH4, DO".to_string(),
            "3.6,2.3,7.9".to_string(),
            "3.7,2.4,8.0".to_string(),
        ];
        let values = extract_values(&lines, &params()).unwrap();
        assert_eq!(values, vec![3.7, 2.4, 8.0]);
    }
}
