//! §4.3 Downsampler — caps per-chunk coverage depth by random read
//! retention, deterministically seeded by chunk index (§5 ordering
//! guarantees).

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::chunk::{Alignment, ReadSeq};

pub struct DownsampleOutcome {
    pub downsampled: bool,
    pub filtered_reads: Vec<ReadSeq>,
    pub filtered_alignments: Vec<Alignment>,
    pub discarded_reads: Vec<ReadSeq>,
    pub discarded_alignments: Vec<Alignment>,
}

/// Compute `d = sum(alignedRefLen) / chunk_len`, the approximate coverage
/// depth over the chunk.
fn approximate_depth(alignments: &[Alignment], chunk_len: u64) -> f64 {
    if chunk_len == 0 {
        return 0.0;
    }
    let total: usize = alignments.iter().map(|a| a.aligned_ref_len()).sum();
    total as f64 / chunk_len as f64
}

/// Retain each read independently with probability `target_depth / depth`
/// once `depth > target_depth`, seeded by `chunk_index` for reproducibility
/// (§4.3, §5).
pub fn downsample(
    chunk_index: usize,
    target_depth: u32,
    chunk_len: u64,
    reads: Vec<ReadSeq>,
    alignments: Vec<Alignment>,
) -> DownsampleOutcome {
    debug_assert_eq!(reads.len(), alignments.len());

    if target_depth == 0 {
        return DownsampleOutcome {
            downsampled: false,
            filtered_reads: reads,
            filtered_alignments: alignments,
            discarded_reads: Vec::new(),
            discarded_alignments: Vec::new(),
        };
    }

    let depth = approximate_depth(&alignments, chunk_len);
    if depth <= target_depth as f64 {
        return DownsampleOutcome {
            downsampled: false,
            filtered_reads: reads,
            filtered_alignments: alignments,
            discarded_reads: Vec::new(),
            discarded_alignments: Vec::new(),
        };
    }

    let retain_prob = target_depth as f64 / depth;
    let mut rng = SmallRng::seed_from_u64(chunk_index as u64);

    let mut filtered_reads = Vec::new();
    let mut filtered_alignments = Vec::new();
    let mut discarded_reads = Vec::new();
    let mut discarded_alignments = Vec::new();

    for (read, alignment) in reads.into_iter().zip(alignments.into_iter()) {
        if rng.random::<f64>() < retain_prob {
            filtered_reads.push(read);
            filtered_alignments.push(alignment);
        } else {
            discarded_reads.push(read);
            discarded_alignments.push(alignment);
        }
    }

    DownsampleOutcome {
        downsampled: true,
        filtered_reads,
        filtered_alignments,
        discarded_reads,
        discarded_alignments,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::AlignOp;

    fn read(name: &str) -> ReadSeq {
        ReadSeq {
            name: name.to_string(),
            strand_reverse: false,
            bases: b"ACGT".to_vec(),
            rle: None,
            start_soft_clip: 0,
            end_soft_clip: 0,
            ref_start: 0,
            ref_end: 100,
            owned: true,
        }
    }

    fn alignment_spanning(len: usize) -> Alignment {
        Alignment {
            ops: (0..len)
                .map(|i| AlignOp {
                    read_offset: Some(i),
                    ref_offset: Some(i),
                    weight: 1.0,
                })
                .collect(),
        }
    }

    #[test]
    fn below_target_depth_is_unchanged() {
        let reads = vec![read("r1"), read("r2")];
        let alignments = vec![alignment_spanning(50), alignment_spanning(50)];
        let outcome = downsample(0, 10, 100, reads, alignments);
        assert!(!outcome.downsampled);
        assert_eq!(outcome.filtered_reads.len(), 2);
        assert!(outcome.discarded_reads.is_empty());
    }

    #[test]
    fn zero_max_depth_disables_downsampling() {
        let reads: Vec<ReadSeq> = (0..50).map(|i| read(&format!("r{i}"))).collect();
        let alignments: Vec<Alignment> = (0..50).map(|_| alignment_spanning(100)).collect();
        let outcome = downsample(0, 0, 100, reads, alignments);
        assert!(!outcome.downsampled);
        assert_eq!(outcome.filtered_reads.len(), 50);
    }

    #[test]
    fn above_target_depth_is_thinned_deterministically() {
        let reads: Vec<ReadSeq> = (0..200).map(|i| read(&format!("r{i}"))).collect();
        let alignments: Vec<Alignment> = (0..200).map(|_| alignment_spanning(100)).collect();

        let a = downsample(7, 20, 100, reads.clone(), alignments.clone());
        let b = downsample(7, 20, 100, reads, alignments);

        assert!(a.downsampled);
        let names_a: Vec<&str> = a.filtered_reads.iter().map(|r| r.name.as_str()).collect();
        let names_b: Vec<&str> = b.filtered_reads.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names_a, names_b, "same chunk index must retain the same reads");
        assert!(a.filtered_reads.len() < 200);
    }

    #[test]
    fn different_chunk_indices_can_retain_different_reads() {
        let reads: Vec<ReadSeq> = (0..200).map(|i| read(&format!("r{i}"))).collect();
        let alignments: Vec<Alignment> = (0..200).map(|_| alignment_spanning(100)).collect();

        let a = downsample(1, 20, 100, reads.clone(), alignments.clone());
        let b = downsample(2, 20, 100, reads, alignments);

        let names_a: Vec<&str> = a.filtered_reads.iter().map(|r| r.name.as_str()).collect();
        let names_b: Vec<&str> = b.filtered_reads.iter().map(|r| r.name.as_str()).collect();
        assert_ne!(names_a, names_b);
    }
}
