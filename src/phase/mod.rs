//! §4.7 Phaser — EM alternation between per-bubble genotype and per-read
//! haplotype assignment, for diploid chunks.

use std::collections::HashMap;

use crate::bubble::Bubble;
use crate::params::PhaserParams;
use crate::poa::ReadWalk;

/// `0` or `1`; which of the two haplotypes a read was assigned to.
pub type Haplotype = u8;

pub struct PhaseResult {
    /// `None` means the read's evidence didn't clearly favour either
    /// haplotype (below `unphasedConfidenceThreshold`).
    pub read_haplotype: HashMap<usize, Option<Haplotype>>,
    /// Per bubble, the allele index assigned to haplotype 0 and 1.
    pub bubble_genotypes: Vec<(usize, usize)>,
}

/// For each bubble, the observed allele index of `walk` under exact
/// read-substring tracing: the read's literal path through the bubble's
/// span must match one allele's bases exactly (`useReadAllelesInPhasing =
/// true`, §4.6/§4.7).
fn observed_allele_indices(walks: &[ReadWalk], bubbles: &[Bubble]) -> Vec<Vec<Option<usize>>> {
    walks
        .iter()
        .map(|walk| {
            bubbles
                .iter()
                .map(|bubble| {
                    if walk.covers.start > bubble.start || walk.covers.end < bubble.end {
                        return None;
                    }
                    let mut bases = Vec::new();
                    for p in bubble.start..bubble.end {
                        if let Some((base, _)) = walk.per_position[p] {
                            bases.push(base);
                        }
                        if let Some(ins) = walk.insertions.get(&p) {
                            bases.extend(ins);
                        }
                    }
                    bubble.alleles.iter().position(|a| a.bases == bases)
                })
                .collect()
        })
        .collect()
}

/// For each bubble, the allele whose bases agree with `walk` at the most
/// individually-covered positions (`useReadAllelesInPhasing = false`): a
/// per-position vote against each candidate allele rather than a single
/// exact-substring match, so reads that only partially span a bubble (or
/// whose path diverges from every synthesised allele at one position)
/// still contribute evidence.
fn observed_allele_indices_by_position_vote(walks: &[ReadWalk], bubbles: &[Bubble]) -> Vec<Vec<Option<usize>>> {
    walks
        .iter()
        .map(|walk| {
            bubbles
                .iter()
                .map(|bubble| {
                    let span = bubble.end - bubble.start;
                    let mut best: Option<(usize, usize)> = None; // (allele_idx, matches)
                    for (allele_idx, allele) in bubble.alleles.iter().enumerate() {
                        if allele.bases.len() != span {
                            continue;
                        }
                        let mut matches = 0usize;
                        let mut covered = 0usize;
                        for (offset, &allele_base) in allele.bases.iter().enumerate() {
                            let p = bubble.start + offset;
                            if p < walk.covers.start || p >= walk.covers.end {
                                continue;
                            }
                            if let Some((base, _)) = walk.per_position[p] {
                                covered += 1;
                                if base == allele_base {
                                    matches += 1;
                                }
                            }
                        }
                        if covered == 0 || matches != covered {
                            continue;
                        }
                        if best.map(|(_, bm)| matches > bm).unwrap_or(true) {
                            best = Some((allele_idx, matches));
                        }
                    }
                    best.map(|(idx, _)| idx)
                })
                .collect()
        })
        .collect()
}

/// k-means-style initialisation: pick the two reads whose allele-vote
/// vectors disagree the most as seed anchors, then assign every other read
/// to whichever anchor it agrees with more often.
fn initial_assignment(evidence: &[Vec<Option<usize>>]) -> Vec<Haplotype> {
    let n = evidence.len();
    if n < 2 {
        return vec![0; n];
    }

    let agreement = |a: &[Option<usize>], b: &[Option<usize>]| -> i64 {
        a.iter()
            .zip(b.iter())
            .filter_map(|(x, y)| match (x, y) {
                (Some(x), Some(y)) => Some(if x == y { 1 } else { -1 }),
                _ => None,
            })
            .sum()
    };

    let mut best_pair = (0usize, 1usize);
    let mut best_score = i64::MAX;
    for i in 0..n {
        for j in (i + 1)..n {
            let score = agreement(&evidence[i], &evidence[j]);
            if score < best_score {
                best_score = score;
                best_pair = (i, j);
            }
        }
    }

    let (anchor0, anchor1) = best_pair;
    (0..n)
        .map(|i| {
            let s0 = agreement(&evidence[i], &evidence[anchor0]);
            let s1 = agreement(&evidence[i], &evidence[anchor1]);
            if s1 > s0 {
                1
            } else {
                0
            }
        })
        .collect()
}

/// Given the current read->haplotype assignment, pick each bubble's two
/// genotype alleles by majority vote within each haplotype group.
///
/// This is a per-haplotype vote, not a tie-break over the joint unordered
/// pair `(a, b)`: haplotype 0's and haplotype 1's winning allele are each
/// picked independently against their own read group. That's deliberate —
/// `reassign_reads` depends on `h0`/`h1` staying tied to a stable haplotype
/// label across bubbles within one EM run, and collapsing to a canonical
/// `a <= b` per bubble would let the pair's members swap sides from bubble
/// to bubble, scrambling that correspondence. Within each haplotype's vote,
/// ties prefer the allele containing the reference, then index order.
fn reestimate_genotypes(
    evidence: &[Vec<Option<usize>>],
    bubbles: &[Bubble],
    assignment: &[Haplotype],
) -> Vec<(usize, usize)> {
    bubbles
        .iter()
        .enumerate()
        .map(|(bubble_idx, bubble)| {
            let mut votes = [HashMap::<usize, f64>::new(), HashMap::<usize, f64>::new()];
            for (read_idx, hap) in assignment.iter().enumerate() {
                if let Some(Some(allele_idx)) = evidence[read_idx].get(bubble_idx) {
                    *votes[*hap as usize].entry(*allele_idx).or_insert(0.0) += 1.0;
                }
            }
            let pick = |hap: usize, fallback: usize| -> usize {
                votes[hap]
                    .iter()
                    .max_by(|a, b| {
                        a.1.partial_cmp(b.1)
                            .unwrap()
                            .then_with(|| {
                                let ref_a = bubble.alleles[*a.0].is_reference;
                                let ref_b = bubble.alleles[*b.0].is_reference;
                                ref_a.cmp(&ref_b)
                            })
                            .then_with(|| b.0.cmp(a.0))
                    })
                    .map(|(idx, _)| *idx)
                    .unwrap_or(fallback)
            };
            let reference_idx = bubble.alleles.iter().position(|a| a.is_reference).unwrap_or(0);
            (pick(0, reference_idx), pick(1, reference_idx))
        })
        .collect()
}

/// Log-likelihood of a read's observed alleles given a candidate genotype,
/// treating each bubble as an independent observation with per-allele
/// mismatch probability `read_error_rate`.
fn log_likelihood(evidence: &[Option<usize>], genotype: &[usize], read_error_rate: f64) -> f64 {
    let match_p = (1.0 - read_error_rate).max(1e-9);
    let mismatch_p = read_error_rate.max(1e-9);
    evidence
        .iter()
        .zip(genotype.iter())
        .filter_map(|(obs, allele)| obs.map(|o| if o == *allele { match_p.ln() } else { mismatch_p.ln() }))
        .sum()
}

fn reassign_reads(
    evidence: &[Vec<Option<usize>>],
    genotypes: &[(usize, usize)],
    params: &PhaserParams,
) -> (Vec<Haplotype>, HashMap<usize, Option<Haplotype>>) {
    let h0: Vec<usize> = genotypes.iter().map(|(a, _)| *a).collect();
    let h1: Vec<usize> = genotypes.iter().map(|(_, b)| *b).collect();

    let mut assignment = Vec::with_capacity(evidence.len());
    let mut labels = HashMap::new();
    for (read_idx, obs) in evidence.iter().enumerate() {
        let ll0 = log_likelihood(obs, &h0, params.read_error_rate);
        let ll1 = log_likelihood(obs, &h1, params.read_error_rate);
        let hap = if ll1 > ll0 { 1 } else { 0 };
        assignment.push(hap);
        let confident = (ll0 - ll1).abs() >= params.unphased_confidence_threshold;
        labels.insert(read_idx, if confident { Some(hap) } else { None });
    }
    (assignment, labels)
}

/// Run the EM phaser to convergence or `max_em_iterations` (§4.7), tracing
/// each read's literal path through every bubble for its evidence vector.
pub fn phase(walks: &[ReadWalk], bubbles: &[Bubble], params: &PhaserParams) -> PhaseResult {
    phase_with_mode(walks, bubbles, params, true)
}

/// As [`phase`], but `use_read_alleles` selects whether evidence comes from
/// exact read-substring tracing (`true`) or per-position voting against
/// each bubble's enumerated alleles (`false`, `useReadAllelesInPhasing`).
pub fn phase_with_mode(walks: &[ReadWalk], bubbles: &[Bubble], params: &PhaserParams, use_read_alleles: bool) -> PhaseResult {
    if bubbles.is_empty() {
        return PhaseResult {
            read_haplotype: walks.iter().map(|w| (w.read_idx, None)).collect(),
            bubble_genotypes: Vec::new(),
        };
    }

    let evidence = if use_read_alleles {
        observed_allele_indices(walks, bubbles)
    } else {
        observed_allele_indices_by_position_vote(walks, bubbles)
    };
    let mut assignment = initial_assignment(&evidence);
    let mut genotypes = reestimate_genotypes(&evidence, bubbles, &assignment);
    let mut labels: HashMap<usize, Option<Haplotype>> = HashMap::new();

    for _ in 0..params.max_em_iterations {
        let (new_assignment, new_labels) = reassign_reads(&evidence, &genotypes, params);
        let converged = new_assignment == assignment;
        assignment = new_assignment;
        labels = new_labels;
        genotypes = reestimate_genotypes(&evidence, bubbles, &assignment);
        if converged {
            break;
        }
    }

    let read_haplotype = walks
        .iter()
        .enumerate()
        .map(|(i, w)| (w.read_idx, labels.get(&i).copied().flatten()))
        .collect();

    PhaseResult {
        read_haplotype,
        bubble_genotypes: genotypes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bubble::Allele;

    fn walk(idx: usize, per_position: Vec<Option<(u8, u32)>>) -> ReadWalk {
        let len = per_position.len();
        ReadWalk {
            read_idx: idx,
            per_position,
            insertions: HashMap::new(),
            covers: 0..len,
        }
    }

    fn snp_bubble() -> Bubble {
        Bubble {
            start: 0,
            end: 1,
            alleles: vec![
                Allele { bases: vec![b'A'], is_reference: true, weight: 4.0, supporting_reads: vec![] },
                Allele { bases: vec![b'T'], is_reference: false, weight: 4.0, supporting_reads: vec![] },
            ],
        }
    }

    #[test]
    fn reads_split_cleanly_into_two_haplotypes() {
        let bubbles = vec![snp_bubble()];
        let mut walks = Vec::new();
        for i in 0..4 {
            walks.push(walk(i, vec![Some((b'A', 1))]));
        }
        for i in 4..8 {
            walks.push(walk(i, vec![Some((b'T', 1))]));
        }
        let params = PhaserParams::default();
        let result = phase(&walks, &bubbles, &params);

        let hap_a: Vec<Option<u8>> = (0..4).map(|i| result.read_haplotype[&i]).collect();
        let hap_t: Vec<Option<u8>> = (4..8).map(|i| result.read_haplotype[&i]).collect();
        assert!(hap_a.iter().all(|h| h.is_some()));
        assert!(hap_t.iter().all(|h| h.is_some()));
        assert_ne!(hap_a[0], hap_t[0]);
        assert!(hap_a.iter().all(|h| *h == hap_a[0]));
        assert!(hap_t.iter().all(|h| *h == hap_t[0]));
    }

    #[test]
    fn position_vote_mode_still_splits_reads_into_two_haplotypes() {
        let bubbles = vec![snp_bubble()];
        let mut walks = Vec::new();
        for i in 0..4 {
            walks.push(walk(i, vec![Some((b'A', 1))]));
        }
        for i in 4..8 {
            walks.push(walk(i, vec![Some((b'T', 1))]));
        }
        let params = PhaserParams::default();
        let result = phase_with_mode(&walks, &bubbles, &params, false);

        let hap_a: Vec<Option<u8>> = (0..4).map(|i| result.read_haplotype[&i]).collect();
        let hap_t: Vec<Option<u8>> = (4..8).map(|i| result.read_haplotype[&i]).collect();
        assert!(hap_a.iter().all(|h| h.is_some()));
        assert!(hap_t.iter().all(|h| h.is_some()));
        assert_ne!(hap_a[0], hap_t[0]);
    }

    #[test]
    fn no_bubbles_means_every_read_unphased() {
        let walks = vec![walk(0, vec![Some((b'A', 1))])];
        let result = phase(&walks, &[], &PhaserParams::default());
        assert_eq!(result.read_haplotype[&0], None);
    }
}
