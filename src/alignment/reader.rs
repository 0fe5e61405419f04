//! Thin adapter over `rust_htslib::bam::IndexedReader`. One handle is opened
//! per worker thread (§5); this type is deliberately cheap to reopen rather
//! than shared, since `htslib` file handles are not `Sync`.

use std::path::{Path, PathBuf};

use rust_htslib::bam::record::Cigar;
use rust_htslib::bam::{self, Read as BamRead};

use crate::errors::{PolishError, PolishResult};

use super::record::{CigarOp, RawAlignedRead};

fn convert_cigar(cigar: &rust_htslib::bam::record::CigarStringView) -> Vec<CigarOp> {
    cigar
        .iter()
        .map(|c| match c {
            Cigar::Match(n) => CigarOp::Match(*n),
            Cigar::Ins(n) => CigarOp::Ins(*n),
            Cigar::Del(n) => CigarOp::Del(*n),
            Cigar::RefSkip(n) => CigarOp::RefSkip(*n),
            Cigar::SoftClip(n) => CigarOp::SoftClip(*n),
            Cigar::HardClip(n) => CigarOp::HardClip(*n),
            Cigar::Pad(n) => CigarOp::Pad(*n),
            Cigar::Equal(n) => CigarOp::Equal(*n),
            Cigar::Diff(n) => CigarOp::Diff(*n),
        })
        .collect()
}

/// A per-worker handle onto an indexed BAM/CRAM alignment file.
pub struct AlignmentIndex {
    path: PathBuf,
    reader: bam::IndexedReader,
}

impl AlignmentIndex {
    /// Opens the alignment file and verifies an index exists (BAI/CSI),
    /// matching the "an index must exist; absence is a fatal error"
    /// contract of §6.
    pub fn open(path: impl AsRef<Path>) -> PolishResult<Self> {
        let path = path.as_ref().to_path_buf();
        let reader = bam::IndexedReader::from_path(&path).map_err(|e| {
            PolishError::InputUnavailable(format!(
                "alignment {} is not indexed (expected a .bai/.csi alongside it): {}",
                path.display(),
                e
            ))
        })?;
        Ok(AlignmentIndex { path, reader })
    }

    /// Open a fresh handle onto the same underlying file, for use by another
    /// worker thread.
    pub fn reopen(&self) -> PolishResult<Self> {
        Self::open(&self.path)
    }

    pub fn tid(&self, contig: &str) -> Option<u32> {
        self.reader.header().tid(contig.as_bytes())
    }

    /// Fetch every read whose alignment intersects `[start, end)` on
    /// `contig`, fully materialised as owned [`RawAlignedRead`]s.
    pub fn fetch_region(&mut self, contig: &str, start: u64, end: u64) -> PolishResult<Vec<RawAlignedRead>> {
        let tid = self.tid(contig).ok_or_else(|| {
            PolishError::InputMismatch(format!(
                "contig '{}' is not present in the alignment index",
                contig
            ))
        })?;

        self.reader.fetch((tid, start as i64, end as i64)).map_err(|e| {
            PolishError::InputUnavailable(format!(
                "could not seek {}:{}-{} in {}: {}",
                contig,
                start,
                end,
                self.path.display(),
                e
            ))
        })?;

        let mut out = Vec::new();
        let mut record = bam::Record::new();
        loop {
            match self.reader.read(&mut record) {
                None => break,
                Some(Ok(())) => {}
                Some(Err(e)) => {
                    return Err(PolishError::InputUnavailable(format!(
                        "corrupt record in {}: {}",
                        self.path.display(),
                        e
                    )))
                }
            }
            if record.is_unmapped() || record.is_secondary() || record.is_supplementary() {
                continue;
            }
            let name = String::from_utf8_lossy(record.qname()).to_string();
            let bases = record.seq().as_bytes();
            out.push(RawAlignedRead {
                name,
                bases,
                strand_reverse: record.is_reverse(),
                ref_start: record.pos().max(0) as u64,
                cigar: convert_cigar(&record.cigar()),
            });
        }
        Ok(out)
    }
}
