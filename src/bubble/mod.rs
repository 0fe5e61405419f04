//! §4.6 Bubble Graph — extracts variant sites (where read alleles diverge
//! and later reconverge) from the POA consensus backbone, for diploid
//! phasing.

use std::collections::{HashMap, HashSet};

use crate::poa::ReadWalk;

/// One distinct allele observed at a bubble: the concatenated bases reads
/// carry across the bubble's span, with the reads supporting it.
#[derive(Debug, Clone)]
pub struct Allele {
    pub bases: Vec<u8>,
    pub is_reference: bool,
    pub weight: f64,
    pub supporting_reads: Vec<usize>,
}

/// A variant site: `[start, end)` backbone positions where reads disagree,
/// flanked by positions where they reconverge.
#[derive(Debug, Clone)]
pub struct Bubble {
    pub start: usize,
    pub end: usize,
    pub alleles: Vec<Allele>,
}

/// Read `walk`'s allele string over `[start, end)`: bases at matched
/// positions (deletions contribute nothing), plus any insertion bases
/// recorded immediately after each position in the span.
fn read_allele(walk: &ReadWalk, start: usize, end: usize) -> Option<Vec<u8>> {
    if walk.covers.start > start || walk.covers.end < end {
        return None; // doesn't fully cover the bubble's span
    }
    let mut bases = Vec::new();
    for p in start..end {
        if let Some((base, _)) = walk.per_position[p] {
            bases.push(base);
        }
        if let Some(ins) = walk.insertions.get(&p) {
            bases.extend(ins);
        }
    }
    Some(bases)
}

/// Whether backbone position `p` shows disagreement among `walks` worth
/// promoting to a variant site: more than one distinct allele observed with
/// combined weight `>= min_support`, counting a deletion as its own allele.
fn position_is_variant(walks: &[&ReadWalk], p: usize, min_support: f64) -> bool {
    let mut tally: HashMap<Option<u8>, f64> = HashMap::new();
    let mut has_insertion = false;
    for walk in walks {
        if p < walk.covers.start || p >= walk.covers.end {
            continue;
        }
        let key = walk.per_position[p].map(|(b, _)| b);
        *tally.entry(key).or_insert(0.0) += 1.0;
        if walk.insertions.contains_key(&p) {
            has_insertion = true;
        }
    }
    let distinct_supported = tally.values().filter(|&&w| w >= min_support).count();
    distinct_supported > 1 || has_insertion
}

/// Tally, at a single backbone position, the weight each observed base (or
/// deletion, as `None`) accrues across `walks` that cover it.
fn position_tally(walks: &[&ReadWalk], p: usize) -> HashMap<Option<u8>, (f64, Vec<usize>)> {
    let mut tally: HashMap<Option<u8>, (f64, Vec<usize>)> = HashMap::new();
    for walk in walks {
        if p < walk.covers.start || p >= walk.covers.end {
            continue;
        }
        let key = walk.per_position[p].map(|(b, _)| b);
        let entry = tally.entry(key).or_insert_with(|| (0.0, Vec::new()));
        entry.0 += 1.0;
        entry.1.push(walk.read_idx);
    }
    tally
}

/// Synthesise allele strings for `[start, end)` from each position's own
/// base tally rather than from literal read substrings: one allele per
/// distinct base held at *every* position in the span by the same rank
/// (top choice, second choice, ...), up to the number of distinct bases
/// seen at the most heterogeneous position. This is the `useReadAlleles =
/// false` path (§4.6): alleles are stitched from per-position ("edge
/// label") winners instead of tracing a single read's actual path through
/// the bubble, so it can't represent a read whose alleles at two positions
/// don't correspond to the same rank — an acceptable approximation since
/// bubbles are short by construction.
fn synthesize_alleles(walks: &[&ReadWalk], start: usize, end: usize) -> Vec<(Vec<u8>, f64, Vec<usize>)> {
    let per_position: Vec<Vec<(u8, f64, Vec<usize>)>> = (start..end)
        .map(|p| {
            let mut ranked: Vec<(u8, f64, Vec<usize>)> = position_tally(walks, p)
                .into_iter()
                .filter_map(|(base, (w, reads))| base.map(|b| (b, w, reads)))
                .collect();
            ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap().then_with(|| a.0.cmp(&b.0)));
            ranked
        })
        .collect();

    let rank_count = per_position.iter().map(|r| r.len()).max().unwrap_or(0);
    let mut out = Vec::new();
    for rank in 0..rank_count {
        let mut bases = Vec::with_capacity(per_position.len());
        let mut weight = f64::INFINITY;
        let mut reads: Option<Vec<usize>> = None;
        for positions in &per_position {
            let slot = positions.get(rank).or_else(|| positions.first());
            let Some((base, w, rs)) = slot else { continue };
            bases.push(*base);
            weight = weight.min(*w);
            reads = Some(match reads {
                Some(prev) => prev.into_iter().filter(|r| rs.contains(r)).collect(),
                None => rs.clone(),
            });
        }
        if bases.len() == per_position.len() {
            out.push((bases, weight, reads.unwrap_or_default()));
        }
    }
    out
}

/// Extract bubbles from the backbone (§4.6). Consecutive variant positions
/// are merged into a single bubble; within each, distinct allele strings
/// with combined weight `>= min_support` are kept (reference allele, if one
/// of them, is marked).
///
/// `reference_bases` gives the consensus base at each backbone position, so
/// the reference allele can be identified among the enumerated alleles.
/// `use_read_alleles` selects between tracing each read's literal path
/// through the bubble (`true`) and synthesising alleles from per-position
/// winners (`false`, §4.6).
pub fn extract_bubbles(walks: &[ReadWalk], backbone_len: usize, reference_bases: &[u8], min_support: f64) -> Vec<Bubble> {
    extract_bubbles_with_mode(walks, backbone_len, reference_bases, min_support, true)
}

pub fn extract_bubbles_with_mode(
    walks: &[ReadWalk],
    backbone_len: usize,
    reference_bases: &[u8],
    min_support: f64,
    use_read_alleles: bool,
) -> Vec<Bubble> {
    let walk_refs: Vec<&ReadWalk> = walks.iter().collect();

    let variant_flags: Vec<bool> = (0..backbone_len)
        .map(|p| position_is_variant(&walk_refs, p, min_support))
        .collect();

    let mut bubbles = Vec::new();
    let mut p = 0;
    while p < backbone_len {
        if !variant_flags[p] {
            p += 1;
            continue;
        }
        let start = p;
        while p < backbone_len && variant_flags[p] {
            p += 1;
        }
        let end = p;

        let reference_allele_bases: Vec<u8> = reference_bases[start..end].to_vec();

        let mut allele_list: Vec<Allele> = if use_read_alleles {
            let mut alleles: HashMap<Vec<u8>, (f64, Vec<usize>)> = HashMap::new();
            for walk in walks {
                if let Some(bases) = read_allele(walk, start, end) {
                    let entry = alleles.entry(bases).or_insert_with(|| (0.0, Vec::new()));
                    entry.0 += 1.0;
                    entry.1.push(walk.read_idx);
                }
            }
            alleles
                .into_iter()
                .filter(|(_, (weight, _))| *weight >= min_support)
                .map(|(bases, (weight, reads))| Allele {
                    is_reference: bases == reference_allele_bases,
                    bases,
                    weight,
                    supporting_reads: reads,
                })
                .collect()
        } else {
            synthesize_alleles(&walk_refs, start, end)
                .into_iter()
                .filter(|(_, weight, _)| *weight >= min_support)
                .map(|(bases, weight, reads)| Allele {
                    is_reference: bases == reference_allele_bases,
                    bases,
                    weight,
                    supporting_reads: reads,
                })
                .collect()
        };

        allele_list.sort_by(|a, b| a.bases.cmp(&b.bases));
        allele_list.dedup_by(|a, b| a.bases == b.bases);

        if allele_list.len() > 1 {
            bubbles.push(Bubble {
                start,
                end,
                alleles: allele_list,
            });
        }
    }
    bubbles
}

/// Distinct read indices appearing in at least one bubble, for diagnostics.
pub fn covered_reads(bubbles: &[Bubble]) -> HashSet<usize> {
    bubbles
        .iter()
        .flat_map(|b| b.alleles.iter())
        .flat_map(|a| a.supporting_reads.iter().copied())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn walk(covers: std::ops::Range<usize>, per_position: Vec<Option<(u8, u32)>>, idx: usize) -> ReadWalk {
        ReadWalk {
            read_idx: idx,
            per_position,
            insertions: HashMap::new(),
            covers,
        }
    }

    #[test]
    fn homogeneous_reads_produce_no_bubbles() {
        let per_pos = vec![Some((b'A', 1)), Some((b'C', 1)), Some((b'G', 1))];
        let walks: Vec<ReadWalk> = (0..5).map(|i| walk(0..3, per_pos.clone(), i)).collect();
        let bubbles = extract_bubbles(&walks, 3, b"ACG", 2.0);
        assert!(bubbles.is_empty());
    }

    #[test]
    fn a_true_snp_site_produces_one_bubble_with_two_alleles() {
        let mut walks = Vec::new();
        for i in 0..4 {
            walks.push(walk(0..3, vec![Some((b'A', 1)), Some((b'C', 1)), Some((b'G', 1))], i));
        }
        for i in 4..8 {
            walks.push(walk(0..3, vec![Some((b'A', 1)), Some((b'T', 1)), Some((b'G', 1))], i));
        }
        let bubbles = extract_bubbles(&walks, 3, b"ACG", 2.0);
        assert_eq!(bubbles.len(), 1);
        assert_eq!(bubbles[0].start, 1);
        assert_eq!(bubbles[0].end, 2);
        assert_eq!(bubbles[0].alleles.len(), 2);
        assert!(bubbles[0].alleles.iter().any(|a| a.is_reference));
    }

    #[test]
    fn synthesized_alleles_match_read_alleles_for_a_simple_snp() {
        let mut walks = Vec::new();
        for i in 0..4 {
            walks.push(walk(0..3, vec![Some((b'A', 1)), Some((b'C', 1)), Some((b'G', 1))], i));
        }
        for i in 4..8 {
            walks.push(walk(0..3, vec![Some((b'A', 1)), Some((b'T', 1)), Some((b'G', 1))], i));
        }
        let synthesized = extract_bubbles_with_mode(&walks, 3, b"ACG", 2.0, false);
        assert_eq!(synthesized.len(), 1);
        assert_eq!(synthesized[0].alleles.len(), 2);
        let bases: std::collections::HashSet<Vec<u8>> = synthesized[0].alleles.iter().map(|a| a.bases.clone()).collect();
        assert!(bases.contains(&b"C".to_vec()));
        assert!(bases.contains(&b"T".to_vec()));
    }

    #[test]
    fn low_support_allele_is_dropped() {
        let mut walks = Vec::new();
        for i in 0..8 {
            walks.push(walk(0..1, vec![Some((b'A', 1))], i));
        }
        walks.push(walk(0..1, vec![Some((b'T', 1))], 8)); // single outlier read
        let bubbles = extract_bubbles(&walks, 1, b"A", 2.0);
        assert!(bubbles.is_empty(), "a single-read allele shouldn't create a bubble");
    }
}
