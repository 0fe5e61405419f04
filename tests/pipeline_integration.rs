//! End-to-end exercises of the per-chunk pipeline (§8): POA consensus
//! recovery from noisy reads, and a two-chunk diploid stitch.

use std::collections::HashMap;

use genopolish::bubble::{self, Allele, Bubble};
use genopolish::chunk::{AlignOp, Alignment, ReadSeq};
use genopolish::params::{PhaserParams, PoaParams};
use genopolish::phase;
use genopolish::poa::{self, ReadWalk};
use genopolish::rle;
use genopolish::stitch::{self, ChunkOutput};

fn read_with_rle(name: &str, bases: &[u8]) -> ReadSeq {
    ReadSeq {
        name: name.to_string(),
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

fn full_match_alignment(len: usize) -> Alignment {
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

/// A handful of reads unanimously supporting the reference, plus one with a
/// single substitution error, should still converge to the reference
/// consensus once RLE re-estimation picks the majority run length.
#[test]
fn noisy_reads_still_polish_to_the_reference_sequence() {
    let reference = b"AAACCCGGGTTTACGT";
    let runs = rle::compress(reference).runs;

    let mut reads = Vec::new();
    for i in 0..6 {
        reads.push(read_with_rle(&format!("good{i}"), reference));
    }
    let mut noisy = reference.to_vec();
    noisy[4] = b'T'; // one read mismatches inside a run
    reads.push(read_with_rle("noisy", &noisy));

    let alignments: Vec<Alignment> = reads.iter().map(|r| full_match_alignment(r.rle.as_ref().unwrap().len())).collect();

    let result = poa::build_and_polish(&runs, &reads, &alignments, &PoaParams::default());
    assert_eq!(result.consensus, runs);
    assert_eq!(result.walks.len(), reads.len());
}

fn walk(idx: usize, per_position: Vec<Option<(u8, u32)>>) -> ReadWalk {
    let len = per_position.len();
    ReadWalk {
        read_idx: idx,
        per_position,
        insertions: HashMap::new(),
        covers: 0..len,
    }
}

/// Build a synthetic two-chunk diploid scenario: both chunks carry the same
/// heterozygous site, phasing assigns reads consistently, and stitching
/// joins the two chunks' haplotype sequences without duplicating the
/// overlap.
#[test]
fn diploid_chunks_phase_and_stitch_into_two_haplotype_sequences() {
    let bubble = Bubble {
        start: 2,
        end: 3,
        alleles: vec![
            Allele {
                bases: vec![b'A'],
                is_reference: true,
                weight: 4.0,
                supporting_reads: vec![],
            },
            Allele {
                bases: vec![b'T'],
                is_reference: false,
                weight: 4.0,
                supporting_reads: vec![],
            },
        ],
    };

    let mut walks = Vec::new();
    for i in 0..4 {
        walks.push(walk(i, vec![Some((b'A', 1)), Some((b'C', 1)), Some((b'A', 1)), Some((b'G', 1))]));
    }
    for i in 4..8 {
        walks.push(walk(i, vec![Some((b'A', 1)), Some((b'C', 1)), Some((b'T', 1)), Some((b'G', 1))]));
    }

    let phase_result = phase::phase(&walks, &[bubble], &PhaserParams::default());
    let hap0_reads: Vec<usize> = (0..8).filter(|&i| phase_result.read_haplotype[&i] == Some(0)).collect();
    let hap1_reads: Vec<usize> = (0..8).filter(|&i| phase_result.read_haplotype[&i] == Some(1)).collect();
    assert_eq!(hap0_reads.len(), 4);
    assert_eq!(hap1_reads.len(), 4);
    assert_ne!(hap0_reads[0] < 4, hap1_reads[0] < 4);

    let chunk0 = ChunkOutput {
        index: 0,
        contig: "tig1".to_string(),
        haplotypes: vec![rle::compress(b"ACGTACGTAAAA").runs, rle::compress(b"ACGTACGTTTTT").runs],
        hap_read_names: Vec::new(),
    };
    let chunk1 = ChunkOutput {
        index: 1,
        contig: "tig1".to_string(),
        haplotypes: vec![rle::compress(b"GTAAAACCCCGG").runs, rle::compress(b"GTTTTTCCCCGG").runs],
        hap_read_names: Vec::new(),
    };

    let stitched = stitch::stitch(&[chunk0, chunk1], 6);
    assert_eq!(stitched.len(), 2);
    assert!(stitched[0].starts_with(b"ACGTACGTAAAA"));
    assert!(stitched[0].ends_with(b"CCCCGG"));
    assert!(stitched[1].starts_with(b"ACGTACGTTTTT"));
    assert!(stitched[1].ends_with(b"CCCCGG"));
}

/// Bubble extraction sees the same heterozygous site from POA walks derived
/// from real reads, not hand-built ones, closing the loop between POA and
/// phasing.
#[test]
fn bubble_extraction_from_poa_walks_feeds_the_phaser() {
    let backbone = rle::compress(b"AACCAAGG").runs;
    let mut reads = Vec::new();
    for i in 0..4 {
        reads.push(read_with_rle(&format!("ref{i}"), b"AACCAAGG"));
    }
    for i in 0..4 {
        reads.push(read_with_rle(&format!("alt{i}"), b"AACCTAGG"));
    }
    let alignments: Vec<Alignment> = reads.iter().map(|r| full_match_alignment(r.rle.as_ref().unwrap().len())).collect();

    let result = poa::build_and_polish(&backbone, &reads, &alignments, &PoaParams::default());
    let reference_bases = rle::expand_runs(&result.consensus);
    let bubbles = bubble::extract_bubbles(&result.walks, result.consensus.len(), &reference_bases, 2.0);
    assert_eq!(bubbles.len(), 1);
    assert_eq!(bubbles[0].alleles.len(), 2);

    let phase_result = phase::phase(&result.walks, &bubbles, &PhaserParams::default());
    let assigned: Vec<Option<u8>> = (0..8).map(|i| phase_result.read_haplotype[&i]).collect();
    assert!(assigned.iter().all(|h| h.is_some()));
}
