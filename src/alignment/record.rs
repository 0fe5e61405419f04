//! A CIGAR-bearing alignment record, decoupled from `rust-htslib` so that the
//! core loader logic (§4.2) can be unit-tested without real BAM files.

/// A single CIGAR element. Mirrors `rust_htslib::bam::record::Cigar` without
/// depending on it, so the loader's core algorithm stays testable in
/// isolation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CigarOp {
    Match(u32),
    Ins(u32),
    Del(u32),
    RefSkip(u32),
    SoftClip(u32),
    HardClip(u32),
    Pad(u32),
    Equal(u32),
    Diff(u32),
}

impl CigarOp {
    pub fn len(&self) -> u32 {
        match *self {
            CigarOp::Match(n)
            | CigarOp::Ins(n)
            | CigarOp::Del(n)
            | CigarOp::RefSkip(n)
            | CigarOp::SoftClip(n)
            | CigarOp::HardClip(n)
            | CigarOp::Pad(n)
            | CigarOp::Equal(n)
            | CigarOp::Diff(n) => n,
        }
    }

    /// Matches, deletions and ref-skips consume the reference (§4.2).
    pub fn consumes_reference(&self) -> bool {
        matches!(
            self,
            CigarOp::Match(_) | CigarOp::Del(_) | CigarOp::RefSkip(_) | CigarOp::Equal(_) | CigarOp::Diff(_)
        )
    }

    /// Matches, insertions and soft-clips consume the query (§4.2).
    pub fn consumes_query(&self) -> bool {
        matches!(
            self,
            CigarOp::Match(_)
                | CigarOp::Ins(_)
                | CigarOp::SoftClip(_)
                | CigarOp::Equal(_)
                | CigarOp::Diff(_)
        )
    }

    pub fn is_match_like(&self) -> bool {
        matches!(self, CigarOp::Match(_) | CigarOp::Equal(_) | CigarOp::Diff(_))
    }
}

/// An alignment record materialised from the indexed alignment file, fully
/// decoded and owned (no lifetime tied to the underlying reader), matching
/// the "iteration yielding records with CIGAR, sequence, quality, strand,
/// reference start, read name" contract of §6.
#[derive(Debug, Clone)]
pub struct RawAlignedRead {
    pub name: String,
    /// Query bases as stored (i.e. reverse-complemented already if the read
    /// mapped to the reverse strand), including soft-clipped bases.
    pub bases: Vec<u8>,
    pub strand_reverse: bool,
    /// 0-based leftmost reference position of the first cigar element that
    /// consumes the reference.
    pub ref_start: u64,
    pub cigar: Vec<CigarOp>,
}

impl RawAlignedRead {
    /// Reference span `[ref_start, ref_end)` consumed by this alignment.
    pub fn ref_end(&self) -> u64 {
        self.ref_start
            + self
                .cigar
                .iter()
                .filter(|op| op.consumes_reference())
                .map(|op| op.len() as u64)
                .sum::<u64>()
    }

    /// Soft-clip lengths at the start and end of the CIGAR (diagnostics per
    /// §4.2).
    pub fn soft_clips(&self) -> (u32, u32) {
        let start = match self.cigar.first() {
            Some(CigarOp::SoftClip(n)) => *n,
            _ => 0,
        };
        let end = match self.cigar.last() {
            Some(CigarOp::SoftClip(n)) => *n,
            _ => 0,
        };
        (start, end)
    }

    /// Whether the first and last cigar elements that consume either
    /// reference or query are matches (the "boundary-at-match" policy,
    /// §4.2).
    pub fn boundary_at_match(&self) -> bool {
        let first = self.cigar.iter().find(|op| op.len() > 0);
        let last = self.cigar.iter().rev().find(|op| op.len() > 0);
        match (first, last) {
            (Some(f), Some(l)) => f.is_match_like() && l.is_match_like(),
            _ => false,
        }
    }

    /// Alignment midpoint in reference coordinates, used to assign a read
    /// that spans a chunk boundary to exactly one chunk (§3 invariant).
    pub fn ref_midpoint(&self) -> u64 {
        (self.ref_start + self.ref_end()) / 2
    }
}
