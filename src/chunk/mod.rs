//! Coordinate-sharded work units (§3, §4.1) and the data types that flow
//! through the per-chunk pipeline.

pub mod chunker;
pub mod loader;

pub use chunker::Chunker;
pub use loader::{load_chunk_reads, ChunkContext};

use crate::rle::RleSequence;

/// `(contig, boundaryStart, innerStart, innerEnd, boundaryEnd)`.
///
/// `boundaryStart <= innerStart <= innerEnd <= boundaryEnd`. `[innerStart,
/// innerEnd)` is the window this chunk is authoritative for; the padding on
/// either side overlaps neighbouring chunks to allow stitching (§4.8).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    pub contig: String,
    pub boundary_start: u64,
    pub inner_start: u64,
    pub inner_end: u64,
    pub boundary_end: u64,
}

impl Chunk {
    pub fn boundary_len(&self) -> u64 {
        self.boundary_end - self.boundary_start
    }

    pub fn inner_len(&self) -> u64 {
        self.inner_end - self.inner_start
    }

    pub fn boundary_range(&self) -> std::ops::Range<u64> {
        self.boundary_start..self.boundary_end
    }

    pub fn inner_range(&self) -> std::ops::Range<u64> {
        self.inner_start..self.inner_end
    }
}

/// A single base-level alignment operation between a read and the reference,
/// in whatever coordinate system (raw or RLE) the chunk is currently using.
///
/// `read_offset` is `None` for a pure deletion (reference without read);
/// `ref_offset` is `None` for a pure insertion (read without reference).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlignOp {
    pub read_offset: Option<usize>,
    pub ref_offset: Option<usize>,
    pub weight: f64,
}

impl AlignOp {
    pub fn is_match(&self) -> bool {
        self.read_offset.is_some() && self.ref_offset.is_some()
    }

    pub fn is_insertion(&self) -> bool {
        self.read_offset.is_some() && self.ref_offset.is_none()
    }

    pub fn is_deletion(&self) -> bool {
        self.read_offset.is_none() && self.ref_offset.is_some()
    }
}

/// An ordered sequence of `(readOffset, refOffset, weight)` triples (§3).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Alignment {
    pub ops: Vec<AlignOp>,
}

impl Alignment {
    pub fn aligned_ref_len(&self) -> usize {
        self.ops.iter().filter(|o| o.ref_offset.is_some()).count()
    }
}

/// A read materialised for one chunk: owned bases (optionally RLE-compressed),
/// strand, and diagnostics from the loader.
#[derive(Debug, Clone)]
pub struct ReadSeq {
    pub name: String,
    pub strand_reverse: bool,
    /// Raw (non-RLE) bases, always populated.
    pub bases: Vec<u8>,
    /// Populated only when `useRunLengthEncoding` is on.
    pub rle: Option<RleSequence>,
    pub start_soft_clip: u32,
    pub end_soft_clip: u32,
    pub ref_start: u64,
    pub ref_end: u64,
    /// Whether this chunk is authoritative for this read (its alignment
    /// midpoint falls inside the chunk's inner window). Boundary-padding
    /// reads are loaded and contribute POA evidence but are not "owned" —
    /// downstream phasing/stitching bookkeeping must not double-count them
    /// across neighbouring chunks (§3 invariant).
    pub owned: bool,
}

impl ReadSeq {
    /// The sequence this read's alignment is actually expressed against:
    /// RLE runs if present, otherwise raw bases.
    pub fn working_len(&self) -> usize {
        match &self.rle {
            Some(rle) => rle.len(),
            None => self.bases.len(),
        }
    }
}
