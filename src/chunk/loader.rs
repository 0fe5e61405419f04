//! §4.2 Read/Alignment Loader — materialises the reads and per-base
//! alignments intersecting a chunk, with soft-clip accounting and (when
//! enabled) RLE-coordinate remapping.

use crate::alignment::record::{CigarOp, RawAlignedRead};
use crate::rle::{self, RleSequence};

use super::{AlignOp, Alignment, Chunk, ReadSeq};

/// Bundles a chunk with the reference material its loader needs: the raw
/// boundary-window substring and (when RLE is enabled) its compression.
pub struct ChunkContext {
    pub chunk: Chunk,
    pub ref_substring: Vec<u8>,
    pub ref_rle: Option<RleSequence>,
}

impl ChunkContext {
    pub fn new(chunk: Chunk, ref_substring: Vec<u8>, use_rle: bool) -> Self {
        let ref_rle = if use_rle {
            Some(rle::compress(&ref_substring))
        } else {
            None
        };
        ChunkContext {
            chunk,
            ref_substring,
            ref_rle,
        }
    }
}

/// One base-level step of a walked CIGAR, in absolute (genome-wide / whole
/// read) coordinates.
#[derive(Debug, Clone, Copy)]
struct RawOp {
    ref_pos: Option<u64>,
    read_pos: Option<usize>,
    is_match: bool,
}

fn walk_cigar(read: &RawAlignedRead) -> Vec<RawOp> {
    let mut ops = Vec::new();
    let mut ref_cursor = read.ref_start;
    let mut read_cursor: usize = 0;

    for op in &read.cigar {
        match op {
            CigarOp::Match(n) | CigarOp::Equal(n) | CigarOp::Diff(n) => {
                for _ in 0..*n {
                    ops.push(RawOp {
                        ref_pos: Some(ref_cursor),
                        read_pos: Some(read_cursor),
                        is_match: true,
                    });
                    ref_cursor += 1;
                    read_cursor += 1;
                }
            }
            CigarOp::Ins(n) => {
                for _ in 0..*n {
                    ops.push(RawOp {
                        ref_pos: None,
                        read_pos: Some(read_cursor),
                        is_match: false,
                    });
                    read_cursor += 1;
                }
            }
            CigarOp::Del(n) | CigarOp::RefSkip(n) => {
                for _ in 0..*n {
                    ops.push(RawOp {
                        ref_pos: Some(ref_cursor),
                        read_pos: None,
                        is_match: false,
                    });
                    ref_cursor += 1;
                }
            }
            CigarOp::SoftClip(n) => {
                read_cursor += *n as usize;
            }
            CigarOp::HardClip(_) | CigarOp::Pad(_) => {}
        }
    }
    ops
}

/// Keep only ops whose effective reference position (the op's own, or the
/// nearest preceding one for an insertion) falls in `[start, end)`.
fn clip_to_window(ops: &[RawOp], start: u64, end: u64) -> Vec<RawOp> {
    let mut kept = Vec::new();
    let mut last_ref: Option<u64> = None;
    for op in ops {
        let effective = op.ref_pos.or(last_ref);
        if let Some(p) = op.ref_pos {
            last_ref = Some(p);
        }
        if let Some(p) = effective {
            if p >= start && p < end {
                kept.push(*op);
            }
        } else {
            // Leading insertion before any reference-consuming op: keep only
            // if the read's first reference position will land in-window.
            if let Some(next_ref) = ops.iter().filter_map(|o| o.ref_pos).next() {
                if next_ref >= start && next_ref < end {
                    kept.push(*op);
                }
            }
        }
    }
    kept
}

fn pos_to_run(rle: &RleSequence, len: usize) -> Vec<usize> {
    let mut table = vec![0usize; len];
    for (run_idx, &run_start) in rle.expansion.iter().enumerate() {
        let run_end = rle
            .expansion
            .get(run_idx + 1)
            .copied()
            .unwrap_or(len);
        for slot in table.iter_mut().take(run_end).skip(run_start) {
            *slot = run_idx;
        }
    }
    table
}

/// Materialise `(reads, alignments)` for one chunk (§4.2).
///
/// Includes every read whose aligned span intersects the chunk's boundary
/// window; `require_boundary_at_match` applies the optional policy that a
/// read's first and last aligned op must be a match.
pub fn load_chunk_reads(
    ctx: &ChunkContext,
    raw_reads: &[RawAlignedRead],
    use_rle: bool,
    require_boundary_at_match: bool,
) -> (Vec<ReadSeq>, Vec<Alignment>) {
    let boundary_start = ctx.chunk.boundary_start;
    let boundary_end = ctx.chunk.boundary_end;
    let inner_range = ctx.chunk.inner_range();

    let ref_pos_to_run = ctx
        .ref_rle
        .as_ref()
        .map(|rle| pos_to_run(rle, ctx.ref_substring.len()));

    let mut reads = Vec::new();
    let mut alignments = Vec::new();

    for read in raw_reads {
        if read.ref_end() <= boundary_start || read.ref_start >= boundary_end {
            continue;
        }
        if require_boundary_at_match && !read.boundary_at_match() {
            continue;
        }

        let raw_ops = walk_cigar(read);
        let kept = clip_to_window(&raw_ops, boundary_start, boundary_end);
        if kept.is_empty() {
            continue;
        }

        let local_read_bytes: Vec<u8> = kept
            .iter()
            .filter_map(|op| op.read_pos.map(|p| read.bases[p]))
            .collect();

        let (start_soft_clip, end_soft_clip) = read.soft_clips();
        let owned = inner_range.contains(&read.ref_midpoint());

        let alignment = if use_rle {
            let read_rle = rle::compress(&local_read_bytes);
            let read_pos_to_run = pos_to_run(&read_rle, local_read_bytes.len());
            let ref_pos_to_run = ref_pos_to_run.as_ref().expect("ref RLE present when use_rle");

            let mut ops = Vec::new();
            let mut local_read_idx = 0usize;
            let mut last_key: Option<(Option<usize>, Option<usize>, bool)> = None;
            for op in &kept {
                let read_run = op.read_pos.map(|_| {
                    let r = read_pos_to_run[local_read_idx];
                    local_read_idx += 1;
                    r
                });
                let ref_run = op
                    .ref_pos
                    .map(|p| ref_pos_to_run[(p - boundary_start) as usize]);
                let key = (read_run, ref_run, op.is_match);
                if last_key != Some(key) {
                    ops.push(AlignOp {
                        read_offset: read_run,
                        ref_offset: ref_run,
                        weight: 1.0,
                    });
                    last_key = Some(key);
                }
            }

            reads.push(ReadSeq {
                name: read.name.clone(),
                strand_reverse: read.strand_reverse,
                bases: local_read_bytes,
                rle: Some(read_rle),
                start_soft_clip,
                end_soft_clip,
                ref_start: read.ref_start,
                ref_end: read.ref_end(),
                owned,
            });

            Alignment { ops }
        } else {
            let mut ops = Vec::with_capacity(kept.len());
            let mut local_read_idx = 0usize;
            for op in &kept {
                let read_offset = op.read_pos.map(|_| {
                    let r = local_read_idx;
                    local_read_idx += 1;
                    r
                });
                let ref_offset = op.ref_pos.map(|p| (p - boundary_start) as usize);
                ops.push(AlignOp {
                    read_offset,
                    ref_offset,
                    weight: 1.0,
                });
            }

            reads.push(ReadSeq {
                name: read.name.clone(),
                strand_reverse: read.strand_reverse,
                bases: local_read_bytes,
                rle: None,
                start_soft_clip,
                end_soft_clip,
                ref_start: read.ref_start,
                ref_end: read.ref_end(),
                owned,
            });

            Alignment { ops }
        };

        alignments.push(alignment);
    }

    (reads, alignments)
}
