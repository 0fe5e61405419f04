//! §4.4 POA Engine — builds a partial-order alignment graph from a
//! reference backbone and a set of reads, iteratively realigns reads
//! against the evolving consensus, and extracts the final consensus
//! sequence.

pub mod align;
pub mod graph;

use crate::chunk::{AlignOp, Alignment, ReadSeq};
use crate::params::PoaParams;
use crate::rle::{self, Run};

pub use graph::{PoaGraph, ReadWalk};

/// Result of running the POA engine once to convergence.
pub struct PoaResult {
    pub graph: PoaGraph,
    pub consensus: Vec<Run>,
    pub walks: Vec<ReadWalk>,
}

fn expanded_bases(read: &ReadSeq) -> Vec<u8> {
    match &read.rle {
        Some(rle) => rle::expand(rle),
        None => read.bases.clone(),
    }
}

/// Convert a [`align::Step`] traceback into RLE-coordinate [`AlignOp`]s
/// against `backbone_runs`, deduping consecutive ops that land in the same
/// `(read_run, ref_run, op_kind)` cell — the same collapsing rule the
/// chunk loader applies (§4.2), reused here for realigned reads.
fn steps_to_rle_alignment(steps: &[align::Step], read_rle: &rle::RleSequence, backbone_runs_len: usize, ref_pos_to_run: &[usize]) -> Alignment {
    let read_pos_to_run = {
        let mut table = vec![0usize; read_rle.expanded_len()];
        for (run_idx, &start) in read_rle.expansion.iter().enumerate() {
            let end = read_rle.expansion.get(run_idx + 1).copied().unwrap_or(table.len());
            for slot in table.iter_mut().take(end).skip(start) {
                *slot = run_idx;
            }
        }
        table
    };

    let mut ops = Vec::new();
    let mut last_key: Option<(Option<usize>, Option<usize>, bool)> = None;
    for step in steps {
        let (read_run, ref_run, is_match) = match *step {
            align::Step::Match { read_idx, ref_idx } => {
                let r = read_pos_to_run.get(read_idx).copied();
                let p = ref_pos_to_run.get(ref_idx).copied();
                (r, p, true)
            }
            align::Step::Ins { read_idx } => (read_pos_to_run.get(read_idx).copied(), None, false),
            align::Step::Del { ref_idx } => (None, ref_pos_to_run.get(ref_idx).copied(), false),
        };
        if ref_run.map(|p| p >= backbone_runs_len).unwrap_or(false) {
            continue;
        }
        let key = (read_run, ref_run, is_match);
        if last_key != Some(key) {
            ops.push(AlignOp {
                read_offset: read_run,
                ref_offset: ref_run,
                weight: 1.0,
            });
            last_key = Some(key);
        }
    }
    Alignment { ops }
}

fn pos_to_run_table(runs: &[Run]) -> Vec<usize> {
    let mut table = Vec::new();
    for (idx, run) in runs.iter().enumerate() {
        for _ in 0..run.length {
            table.push(idx);
        }
    }
    table
}

/// Build the POA graph from `backbone_runs`, thread every read through it,
/// promote well-supported insertions, then run up to
/// `params.max_realignment_iterations` realignment passes against the
/// evolving consensus (§4.4).
pub fn build_and_polish(backbone_runs: &[Run], reads: &[ReadSeq], alignments: &[Alignment], params: &PoaParams) -> PoaResult {
    let mut current_backbone = backbone_runs.to_vec();
    let (mut current_graph, mut walks) = seed_and_fill(&current_backbone, reads, alignments, params);
    let mut consensus = current_graph.consensus();

    if reads.is_empty() {
        return PoaResult { graph: current_graph, consensus, walks };
    }

    for _ in 0..params.max_realignment_iterations {
        if consensus == current_backbone {
            break;
        }
        current_backbone = consensus.clone();
        let ref_bases = rle::expand_runs(&current_backbone);
        let ref_pos_to_run = pos_to_run_table(&current_backbone);

        let mut new_alignments = Vec::with_capacity(reads.len());
        for read in reads {
            let bases = expanded_bases(read);
            let steps = align::banded_align(&bases, &ref_bases, params.realignment_band_width, params);
            let read_rle = read.rle.clone().unwrap_or_else(|| rle::compress(&bases));
            let aln = steps_to_rle_alignment(&steps, &read_rle, current_backbone.len(), &ref_pos_to_run);
            new_alignments.push(aln);
        }

        let (next_graph, next_walks) = seed_and_fill(&current_backbone, reads, &new_alignments, params);
        let next_consensus = next_graph.consensus();

        current_graph = next_graph;
        walks = next_walks;
        let converged = next_consensus == current_backbone;
        consensus = next_consensus;
        if converged {
            break;
        }
    }

    PoaResult { graph: current_graph, consensus, walks }
}

fn seed_and_fill(backbone_runs: &[Run], reads: &[ReadSeq], alignments: &[Alignment], params: &PoaParams) -> (PoaGraph, Vec<ReadWalk>) {
    let mut g = PoaGraph::seed_linear(backbone_runs);
    let walks = reads
        .iter()
        .zip(alignments.iter())
        .enumerate()
        .map(|(i, (read, aln))| g.add_read(i, read, aln, 1.0))
        .collect();
    g.promote_insertions(params.insertion_promotion_threshold);
    (g, walks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::AlignOp;

    fn read_with_rle(bases: &[u8]) -> ReadSeq {
        ReadSeq {
            name: "r".into(),
            strand_reverse: false,
            bases: bases.to_vec(),
            rle: Some(rle::compress(bases)),
            start_soft_clip: 0,
            end_soft_clip: 0,
            ref_start: 0,
            ref_end: bases.len() as u64,
            owned: true,
        }
    }

    fn match_alignment(len: usize) -> Alignment {
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
    fn empty_reads_return_reference_consensus_unchanged() {
        let runs = rle::compress(b"AAAACCCCGGTT").runs;
        let result = build_and_polish(&runs, &[], &[], &PoaParams::default());
        assert_eq!(result.consensus, runs);
    }

    #[test]
    fn unanimous_reads_converge_to_reference() {
        let seq = b"AAAACCCCGGTT";
        let runs = rle::compress(seq).runs;
        let reads: Vec<ReadSeq> = (0..6).map(|_| read_with_rle(seq)).collect();
        let alignments: Vec<Alignment> = reads
            .iter()
            .map(|r| match_alignment(r.rle.as_ref().unwrap().len()))
            .collect();
        let result = build_and_polish(&runs, &reads, &alignments, &PoaParams::default());
        assert_eq!(result.consensus, runs);
        assert_eq!(result.walks.len(), reads.len());
    }
}
