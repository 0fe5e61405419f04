//! §4.8 Chunk Stitcher — joins adjacent chunks' consensus sequences at a cut
//! point found in their overlapping boundary windows, and (in diploid mode)
//! resolves which haplotype label continues which strand across the join.

use std::collections::HashSet;

use crate::poa::align::{self, Step};
use crate::rle::{self, Run};

/// One chunk's polished output, ready to be stitched to its neighbours.
pub struct ChunkOutput {
    pub index: usize,
    pub contig: String,
    /// Haploid: one entry. Diploid: two (haplotype 0, haplotype 1).
    pub haplotypes: Vec<Vec<Run>>,
    /// Diploid only: the owned read names that were assigned to each
    /// haplotype, in the same order as `haplotypes`. Empty in haploid mode.
    /// Used to resolve the haplotype-label swap across chunk boundaries
    /// (§4.8) since the phaser's `0`/`1` labels are arbitrary per chunk.
    pub hap_read_names: Vec<HashSet<String>>,
}

/// Find the best cut point in the overlap between `left`'s tail and
/// `right`'s head by aligning them and taking the diagonal's midpoint in
/// each sequence's own coordinates — i.e. the position where the two
/// chunks agree, so neither chunk's bases are duplicated or dropped.
fn find_cut(left_tail: &[u8], right_head: &[u8], band: usize) -> (usize, usize) {
    if left_tail.is_empty() || right_head.is_empty() {
        return (left_tail.len(), 0);
    }
    let params = crate::params::PoaParams::default();
    let steps = align::banded_align(left_tail, right_head, band, &params);

    // Walk the alignment and cut at the longest run of consecutive matches,
    // preferring the one closest to the midpoint of the overlap.
    let mid = left_tail.len() / 2;
    let mut best: Option<(usize, usize, usize)> = None; // (left_pos, right_pos, distance_to_mid)
    for step in &steps {
        if let Step::Match { read_idx, ref_idx } = *step {
            let dist = (read_idx as i64 - mid as i64).unsigned_abs() as usize;
            let better = match best {
                None => true,
                Some((_, _, best_dist)) => dist < best_dist,
            };
            if better {
                best = Some((read_idx, ref_idx, dist));
            }
        }
    }
    match best {
        Some((l, r, _)) => (l, r),
        None => (left_tail.len(), 0),
    }
}

/// Stitch `chunks` (already ordered by chunk index within a contig) into one
/// sequence per haplotype. Each chunk contributes its inner window's worth
/// of consensus, trimmed at the cut point found against its neighbour's
/// overlapping boundary padding.
///
/// A single chunk stitches to itself as a no-op (idempotence, §4.8).
pub fn stitch(chunks: &[ChunkOutput], overlap_window: usize) -> Vec<Vec<u8>> {
    if chunks.is_empty() {
        return Vec::new();
    }
    let haplotype_count = chunks[0].haplotypes.len();
    let mut out = vec![Vec::new(); haplotype_count];

    for (i, chunk) in chunks.iter().enumerate() {
        for h in 0..haplotype_count {
            let bases = rle::expand_runs(&chunk.haplotypes[h]);
            if i == 0 {
                out[h].extend(bases);
                continue;
            }

            let prev_tail_start = out[h].len().saturating_sub(overlap_window);
            let left_tail = out[h][prev_tail_start..].to_vec();
            let right_head: Vec<u8> = bases.iter().take(overlap_window).copied().collect();

            let (cut_left, cut_right) = find_cut(&left_tail, &right_head, overlap_window.max(1));
            out[h].truncate(prev_tail_start + cut_left);
            out[h].extend(bases.into_iter().skip(cut_right));
        }
    }

    out
}

/// Count of owned read names shared between two haplotype sets, used as the
/// agreement score for a candidate haplotype-label orientation.
fn agreement(a: &HashSet<String>, b: &HashSet<String>) -> usize {
    a.intersection(b).count()
}

/// In diploid mode, chunk boundaries may have labelled haplotype 0 and 1
/// inconsistently (the phaser's labels are arbitrary per chunk, §4.8): a
/// read present in chunk N's boundary overlap and carried into chunk N+1
/// may end up on the opposite label there. For each chunk after the first,
/// compare its haplotype read sets against the (possibly already-resolved)
/// preceding chunk's, under both the straight and swapped orientation, and
/// keep whichever orientation shares more reads. Ties favour no swap.
pub fn resolve_haplotype_swaps(chunks: &mut [ChunkOutput]) {
    for i in 1..chunks.len() {
        let (prev, cur) = chunks.split_at_mut(i);
        let prev = &prev[prev.len() - 1];
        let cur = &mut cur[0];
        if prev.hap_read_names.len() != 2 || cur.hap_read_names.len() != 2 {
            continue;
        }
        let straight = agreement(&prev.hap_read_names[0], &cur.hap_read_names[0]) + agreement(&prev.hap_read_names[1], &cur.hap_read_names[1]);
        let swapped = agreement(&prev.hap_read_names[0], &cur.hap_read_names[1]) + agreement(&prev.hap_read_names[1], &cur.hap_read_names[0]);
        if swapped > straight {
            cur.haplotypes.swap(0, 1);
            cur.hap_read_names.swap(0, 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn haploid(index: usize, seq: &[u8]) -> ChunkOutput {
        ChunkOutput {
            index,
            contig: "tig1".to_string(),
            haplotypes: vec![rle::compress(seq).runs],
            hap_read_names: Vec::new(),
        }
    }

    fn diploid(index: usize, h1: &[u8], h2: &[u8], h1_reads: &[&str], h2_reads: &[&str]) -> ChunkOutput {
        ChunkOutput {
            index,
            contig: "tig1".to_string(),
            haplotypes: vec![rle::compress(h1).runs, rle::compress(h2).runs],
            hap_read_names: vec![
                h1_reads.iter().map(|s| s.to_string()).collect(),
                h2_reads.iter().map(|s| s.to_string()).collect(),
            ],
        }
    }

    #[test]
    fn resolve_haplotype_swaps_flips_mislabelled_chunk() {
        let mut chunks = vec![
            diploid(0, b"ACGT", b"AGGT", &["r1", "r2"], &["r3", "r4"]),
            // Chunk 1's hap0/hap1 are swapped relative to chunk 0: its
            // "hap0" shares reads with chunk 0's hap1, and vice versa.
            diploid(1, b"AGGT", b"ACGT", &["r3", "r4"], &["r1", "r2"]),
        ];
        resolve_haplotype_swaps(&mut chunks);
        assert_eq!(chunks[1].hap_read_names[0], chunks[0].hap_read_names[0]);
        assert_eq!(chunks[1].hap_read_names[1], chunks[0].hap_read_names[1]);
    }

    #[test]
    fn resolve_haplotype_swaps_leaves_agreeing_chunks_unchanged() {
        let mut chunks = vec![
            diploid(0, b"ACGT", b"AGGT", &["r1", "r2"], &["r3", "r4"]),
            diploid(1, b"ACGT", b"AGGT", &["r1", "r5"], &["r3", "r6"]),
        ];
        resolve_haplotype_swaps(&mut chunks);
        assert!(chunks[1].hap_read_names[0].contains("r1"));
        assert!(chunks[1].hap_read_names[1].contains("r3"));
    }

    #[test]
    fn single_chunk_stitches_to_itself_unchanged() {
        let chunks = vec![haploid(0, b"ACGTACGTACGT")];
        let stitched = stitch(&chunks, 4);
        assert_eq!(stitched[0], b"ACGTACGTACGT");
    }

    #[test]
    fn overlapping_chunks_stitch_without_duplicating_overlap() {
        // Chunk 0 covers "ACGTACGTAAAA", chunk 1 (with boundary overlap)
        // covers "GTAAAACCCCGG" i.e. shares the "GTAAAA" tail/head region.
        let chunks = vec![haploid(0, b"ACGTACGTAAAA"), haploid(1, b"GTAAAACCCCGG")];
        let stitched = stitch(&chunks, 6);
        // The result should not contain a duplicated "GTAAAA" and should
        // still contain both chunks' unique content.
        assert!(stitched[0].starts_with(b"ACGTACGTAAAA"));
        assert!(stitched[0].ends_with(b"CCCCGG"));
    }
}
