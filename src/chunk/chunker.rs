//! §4.1 Chunker — partitions one contig's (or one region's) coordinate space
//! into overlapping, ordered work units.

use crate::errors::{PolishError, PolishResult};
use crate::reference::ReferenceMap;

use super::Chunk;

/// A parsed `contig[:start-end]` region string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub contig: String,
    pub start: Option<u64>,
    pub end: Option<u64>,
}

impl Region {
    pub fn parse(raw: &str) -> PolishResult<Self> {
        match raw.split_once(':') {
            None => Ok(Region {
                contig: raw.to_string(),
                start: None,
                end: None,
            }),
            Some((contig, range)) => {
                let (start_str, end_str) = range.split_once('-').ok_or_else(|| {
                    PolishError::InputMismatch(format!("malformed region '{}'", raw))
                })?;
                let start: u64 = start_str
                    .parse()
                    .map_err(|_| PolishError::InputMismatch(format!("malformed region '{}'", raw)))?;
                let end: u64 = end_str
                    .parse()
                    .map_err(|_| PolishError::InputMismatch(format!("malformed region '{}'", raw)))?;
                if start > end {
                    return Err(PolishError::InputMismatch(format!(
                        "region '{}' has start > end",
                        raw
                    )));
                }
                Ok(Region {
                    contig: contig.to_string(),
                    start: Some(start),
                    end: Some(end),
                })
            }
        }
    }
}

/// Ordered, random-access list of chunks covering the requested region (or
/// every indexed contig).
#[derive(Debug, Clone)]
pub struct Chunker {
    chunks: Vec<Chunk>,
}

impl Chunker {
    /// Build chunks of inner length `chunk_size` at stride `chunk_size`,
    /// each padded by `boundary` on both sides (clamped to contig bounds).
    pub fn build(
        reference: &ReferenceMap,
        region: Option<&str>,
        chunk_size: u64,
        boundary: u64,
    ) -> PolishResult<Self> {
        let mut contigs: Vec<(String, u64, u64)> = Vec::new();

        match region {
            Some(raw) => {
                let region = Region::parse(raw)?;
                let contig_len = reference.len_of(&region.contig).ok_or_else(|| {
                    PolishError::InputMismatch(format!(
                        "region contig '{}' not present in reference",
                        region.contig
                    ))
                })? as u64;
                let start = region.start.unwrap_or(0);
                let end = region.end.unwrap_or(contig_len).min(contig_len);
                if start >= end {
                    return Err(PolishError::InputMismatch(format!(
                        "region '{}' is empty after clamping to contig length {}",
                        raw, contig_len
                    )));
                }
                contigs.push((region.contig, start, end));
            }
            None => {
                let mut names: Vec<&str> = reference.contig_names().collect();
                names.sort_unstable();
                for name in names {
                    let len = reference.len_of(name).unwrap() as u64;
                    if len > 0 {
                        contigs.push((name.to_string(), 0, len));
                    }
                }
            }
        }

        if contigs.is_empty() {
            return Err(PolishError::EmptyCoverage(
                "no valid reads: no contigs to chunk".to_string(),
            ));
        }

        let mut chunks = Vec::new();
        for (contig, region_start, region_end) in contigs {
            let mut inner_start = region_start;
            while inner_start < region_end {
                let inner_end = (inner_start + chunk_size).min(region_end);
                let boundary_start = if inner_start == region_start {
                    inner_start
                } else {
                    inner_start.saturating_sub(boundary).max(region_start)
                };
                let boundary_end = if inner_end == region_end {
                    inner_end
                } else {
                    (inner_end + boundary).min(region_end)
                };
                chunks.push(Chunk {
                    index: chunks.len(),
                    contig: contig.clone(),
                    boundary_start,
                    inner_start,
                    inner_end,
                    boundary_end,
                });
                inner_start = inner_end;
            }
        }

        if chunks.is_empty() {
            return Err(PolishError::EmptyCoverage(
                "no valid reads: chunking produced zero chunks".to_string(),
            ));
        }

        Ok(Chunker { chunks })
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Chunk> {
        self.chunks.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.iter()
    }

    pub fn chunks_for_contig<'a>(&'a self, contig: &'a str) -> impl Iterator<Item = &'a Chunk> {
        self.chunks.iter().filter(move |c| c.contig == contig)
    }
}
