//! §4.5 RLE Length Model — re-estimates each consensus run's true length by
//! Bayesian argmax over the observed run-length histogram at that position,
//! using the learned substitution matrix `P(observed | true, base)`.

use std::collections::HashMap;

use crate::params::RleSubstitutionMatrix;
use crate::rle::Run;

/// For one consensus position with base `base` and observed-run histogram
/// `histogram` (observed run length -> accumulated weight), pick
///
/// ```text
/// argmax_i  log(prior(i)) + sum_j histogram[j] * log(P(j | i, base))
/// ```
///
/// i.e. the true run length maximising the posterior given every read's
/// observed run at this position, weighted by how much evidence it carried.
fn best_true_run(base: u8, histogram: &HashMap<u32, f64>, matrix: &RleSubstitutionMatrix) -> u32 {
    if histogram.is_empty() {
        return 1;
    }
    let mut best_run = 1u32;
    let mut best_score = f64::NEG_INFINITY;
    for true_run in 1..=matrix.max_run {
        let mut score = matrix.prior(true_run).max(f64::MIN_POSITIVE).ln();
        for (&observed, &weight) in histogram {
            let p = matrix.prob(base, true_run, observed as usize).max(f64::MIN_POSITIVE);
            score += weight * p.ln();
        }
        if score > best_score {
            best_score = score;
            best_run = true_run as u32;
        }
    }
    best_run
}

/// Re-estimate run lengths for an entire consensus sequence (§4.5). Bases
/// are left untouched; only `Run::length` is replaced by the Bayesian
/// argmax estimate.
pub fn reestimate(consensus: &[(Run, HashMap<u32, f64>)], matrix: &RleSubstitutionMatrix) -> Vec<Run> {
    consensus
        .iter()
        .map(|(run, histogram)| Run {
            base: run.base,
            length: best_true_run(run.base, histogram, matrix),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unanimous_observations_reestimate_to_that_length() {
        let matrix = RleSubstitutionMatrix::uniform(10);
        let mut histogram = HashMap::new();
        histogram.insert(4u32, 20.0);
        let consensus = vec![(Run { base: b'A', length: 4 }, histogram)];
        let refined = reestimate(&consensus, &matrix);
        assert_eq!(refined[0].length, 4);
    }

    #[test]
    fn empty_histogram_falls_back_to_length_one() {
        let matrix = RleSubstitutionMatrix::uniform(10);
        let consensus = vec![(Run { base: b'A', length: 4 }, HashMap::new())];
        let refined = reestimate(&consensus, &matrix);
        assert_eq!(refined[0].length, 1);
    }

    #[test]
    fn noisy_observations_still_favour_majority_length() {
        let matrix = RleSubstitutionMatrix::uniform(10);
        let mut histogram = HashMap::new();
        histogram.insert(5u32, 8.0);
        histogram.insert(4u32, 1.0);
        histogram.insert(6u32, 1.0);
        let consensus = vec![(Run { base: b'C', length: 5 }, histogram)];
        let refined = reestimate(&consensus, &matrix);
        assert_eq!(refined[0].length, 5);
    }
}
