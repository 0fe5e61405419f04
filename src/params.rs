//! The parameter document (§6): run-length/downsample/chunking toggles, the
//! RLE substitution matrix, and POA/phaser hyperparameters.
//!
//! Deserialised once at startup with `serde_json` into an immutable value
//! shared by reference (or `Arc`) with every worker (§5, §9).

use std::path::Path;

use ndarray::Array3;
use serde::{Deserialize, Serialize};

use crate::errors::{PolishError, PolishResult};

/// `P(observedRun = j | trueRun = i, base)`, up to `max_run`, one table per
/// base (A, C, G, T in that fixed order).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RleSubstitutionMatrix {
    /// Longest run length the matrix has entries for (runs above this are
    /// clamped down to `max_run`).
    pub max_run: usize,
    /// `table[[base_idx, true_run, observed_run]] = P(observed_run | true_run, base)`.
    /// `base_idx` is 0..4 for A, C, G, T; runs 0..=max_run (run length 0 is
    /// unused but kept so indices line up with 1-based run lengths).
    #[serde(with = "array3_serde")]
    pub table: Array3<f64>,
    /// `P(trueRun = i)` prior over true run length, shared across bases.
    pub run_length_prior: Vec<f64>,
}

impl RleSubstitutionMatrix {
    pub fn base_index(base: u8) -> Option<usize> {
        match base.to_ascii_uppercase() {
            b'A' => Some(0),
            b'C' => Some(1),
            b'G' => Some(2),
            b'T' => Some(3),
            _ => None,
        }
    }

    /// `P(observed_run | true_run, base)`, clamping both run lengths to the
    /// matrix's learned range.
    pub fn prob(&self, base: u8, true_run: usize, observed_run: usize) -> f64 {
        let base_idx = match Self::base_index(base) {
            Some(b) => b,
            None => return 1.0,
        };
        let i = true_run.min(self.max_run);
        let j = observed_run.min(self.max_run);
        self.table[[base_idx, i, j]]
    }

    pub fn prior(&self, true_run: usize) -> f64 {
        let i = true_run.min(self.run_length_prior.len().saturating_sub(1));
        self.run_length_prior.get(i).copied().unwrap_or(1e-9)
    }

    /// A flat (uninformative-ish but stable) matrix: `P(j|i) ~ exp(-|i-j|)`,
    /// used when no RLE matrix is supplied and as the basis for tests.
    pub fn uniform(max_run: usize) -> Self {
        let mut table = Array3::<f64>::zeros((4, max_run + 1, max_run + 1));
        for base_idx in 0..4 {
            for i in 0..=max_run {
                let mut row_sum = 0.0;
                for j in 0..=max_run {
                    let w = (-((i as f64) - (j as f64)).abs()).exp();
                    table[[base_idx, i, j]] = w;
                    row_sum += w;
                }
                if row_sum > 0.0 {
                    for j in 0..=max_run {
                        table[[base_idx, i, j]] /= row_sum;
                    }
                }
            }
        }
        let run_length_prior = (0..=max_run)
            .map(|i| (-(i as f64) * 0.05).exp())
            .collect::<Vec<_>>();
        let sum: f64 = run_length_prior.iter().sum();
        let run_length_prior = run_length_prior.into_iter().map(|x| x / sum).collect();
        RleSubstitutionMatrix {
            max_run,
            table,
            run_length_prior,
        }
    }
}

mod array3_serde {
    use ndarray::Array3;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    struct Shape3 {
        dim: (usize, usize, usize),
        data: Vec<f64>,
    }

    pub fn serialize<S: Serializer>(arr: &Array3<f64>, s: S) -> Result<S::Ok, S::Error> {
        let dim = arr.dim();
        let data = arr.iter().copied().collect();
        Shape3 { dim, data }.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Array3<f64>, D::Error> {
        let shaped = Shape3::deserialize(d)?;
        Array3::from_shape_vec(shaped.dim, shaped.data).map_err(serde::de::Error::custom)
    }
}

/// POA construction/realignment hyperparameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoaParams {
    pub match_score: f64,
    pub mismatch_score: f64,
    pub gap_open_score: f64,
    pub gap_extend_score: f64,
    /// Reads with insert support below this weight are not promoted to nodes.
    pub insertion_promotion_threshold: f64,
    pub max_realignment_iterations: usize,
    /// Stop realigning once the fraction of reads whose path changed drops
    /// below this threshold.
    pub realignment_convergence_threshold: f64,
    /// Half-width of the realignment band around the read's initial position.
    pub realignment_band_width: usize,
}

impl Default for PoaParams {
    fn default() -> Self {
        PoaParams {
            match_score: 4.0,
            mismatch_score: -4.0,
            gap_open_score: -8.0,
            gap_extend_score: -2.0,
            insertion_promotion_threshold: 2.0,
            max_realignment_iterations: 3,
            realignment_convergence_threshold: 0.01,
            realignment_band_width: 20,
        }
    }
}

/// Bubble/phasing hyperparameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaserParams {
    pub min_bubble_read_support: f64,
    pub prior_het_rate: f64,
    pub read_error_rate: f64,
    pub max_em_iterations: usize,
    /// A read whose |log-likelihood(h1) - log-likelihood(h2)| is below this
    /// is marked unphased.
    pub unphased_confidence_threshold: f64,
}

impl Default for PhaserParams {
    fn default() -> Self {
        PhaserParams {
            min_bubble_read_support: 2.0,
            prior_het_rate: 0.001,
            read_error_rate: 0.05,
            max_em_iterations: 20,
            unphased_confidence_threshold: 1.0,
        }
    }
}

/// Which feature tensor (if any) to dump per chunk, consumed by an external
/// ML post-processor. See §9 Polymorphism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FeatureDumpMode {
    None,
    SimpleWeight,
    SplitRleWeight,
    ChannelRleWeight,
    DiploidRleWeight,
}

impl Default for FeatureDumpMode {
    fn default() -> Self {
        FeatureDumpMode::None
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    pub use_run_length_encoding: bool,
    /// 0 disables downsampling.
    pub max_depth: u32,
    pub chunk_size: u64,
    pub chunk_boundary: u64,
    pub shuffle_chunks: bool,
    pub use_read_alleles: bool,
    pub use_read_alleles_in_phasing: bool,
    /// Optional boundary-at-match policy (§4.2): exclude reads whose first
    /// or last aligned op isn't a match.
    pub boundary_at_match_policy: bool,
    pub feature_dump_mode: FeatureDumpMode,
    pub rle_matrix: RleSubstitutionMatrix,
    pub poa: PoaParams,
    pub phaser: PhaserParams,
}

impl Default for Params {
    fn default() -> Self {
        Params {
            use_run_length_encoding: true,
            max_depth: 0,
            chunk_size: 100_000,
            chunk_boundary: 1_000,
            shuffle_chunks: false,
            use_read_alleles: true,
            use_read_alleles_in_phasing: true,
            boundary_at_match_policy: false,
            feature_dump_mode: FeatureDumpMode::None,
            rle_matrix: RleSubstitutionMatrix::uniform(10),
            poa: PoaParams::default(),
            phaser: PhaserParams::default(),
        }
    }
}

impl Params {
    pub fn load(path: impl AsRef<Path>) -> PolishResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            PolishError::InputUnavailable(format!(
                "could not read parameter document {}: {}",
                path.display(),
                e
            ))
        })?;
        let params: Params = serde_json::from_str(&text).map_err(|e| {
            PolishError::InputUnavailable(format!(
                "could not parse parameter document {}: {}",
                path.display(),
                e
            ))
        })?;
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> PolishResult<()> {
        if self.feature_dump_mode != FeatureDumpMode::None && !self.use_run_length_encoding {
            return Err(PolishError::ParameterInconsistent(
                "feature-dump mode requires useRunLengthEncoding to be enabled".to_string(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(PolishError::ParameterInconsistent(
                "chunkSize must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_params_validate() {
        assert!(Params::default().validate().is_ok());
    }

    #[test]
    fn feature_dump_without_rle_is_rejected() {
        let mut params = Params::default();
        params.use_run_length_encoding = false;
        params.feature_dump_mode = FeatureDumpMode::SimpleWeight;
        assert!(params.validate().is_err());
    }

    #[test]
    fn uniform_matrix_rows_sum_to_one() {
        let matrix = RleSubstitutionMatrix::uniform(5);
        for base_idx in 0..4 {
            for i in 0..=5 {
                let sum: f64 = (0..=5).map(|j| matrix.table[[base_idx, i, j]]).sum();
                assert!((sum - 1.0).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn matrix_round_trips_through_json() {
        let matrix = RleSubstitutionMatrix::uniform(3);
        let json = serde_json::to_string(&matrix).unwrap();
        let back: RleSubstitutionMatrix = serde_json::from_str(&json).unwrap();
        assert_eq!(back.table, matrix.table);
    }
}
