//! Reference Map: contig name -> full nucleotide string.
//!
//! Headers are canonicalised to their first whitespace-delimited token
//! *before* insertion, fixing the key-leak defect flagged for the teacher's
//! in-memory FASTA parser (§9 Design Notes): a header carrying trailing
//! metadata must never produce a second, uncanonicalised key.

use std::collections::HashMap;
use std::path::Path;

use rust_htslib::faidx;

use crate::errors::{PolishError, PolishResult};

/// Take the first whitespace-delimited token of a FASTA header/record name.
pub fn canonicalise_name(raw: &str) -> String {
    raw.split_whitespace().next().unwrap_or(raw).to_string()
}

#[derive(Debug, Default, Clone)]
pub struct ReferenceMap {
    sequences: HashMap<String, Vec<u8>>,
}

impl ReferenceMap {
    pub fn from_records<I, S, B>(records: I) -> Self
    where
        I: IntoIterator<Item = (S, B)>,
        S: AsRef<str>,
        B: Into<Vec<u8>>,
    {
        let mut sequences = HashMap::new();
        for (name, bases) in records {
            let canonical = canonicalise_name(name.as_ref());
            sequences.insert(canonical, bases.into());
        }
        ReferenceMap { sequences }
    }

    /// Load every contig from an indexed FASTA (`.fai` must exist alongside
    /// `path`). Contigs are canonicalised at insertion, so a header like
    /// `>chr1 Homo sapiens chromosome 1` is keyed as `chr1`.
    pub fn load(path: impl AsRef<Path>) -> PolishResult<Self> {
        let path = path.as_ref();
        let reader = faidx::Reader::from_path(path).map_err(|e| {
            PolishError::InputUnavailable(format!(
                "could not open reference FASTA {} (is it indexed with samtools faidx?): {}",
                path.display(),
                e
            ))
        })?;

        let n_seqs = reader.n_seqs();
        let mut sequences = HashMap::with_capacity(n_seqs as usize);
        for i in 0..n_seqs {
            let raw_name = reader.seq_name(i as i32).map_err(|e| {
                PolishError::InputUnavailable(format!(
                    "could not read contig name {} from {}: {}",
                    i,
                    path.display(),
                    e
                ))
            })?;
            let canonical = canonicalise_name(&raw_name);
            let len = reader.fetch_seq_len(&raw_name) as usize;
            if len == 0 {
                continue;
            }
            let seq = reader.fetch_seq(&raw_name, 0, len - 1).map_err(|e| {
                PolishError::InputUnavailable(format!(
                    "could not fetch sequence for {}: {}",
                    canonical, e
                ))
            })?;
            sequences.insert(canonical, seq.to_vec());
        }

        Ok(ReferenceMap { sequences })
    }

    pub fn get(&self, contig: &str) -> Option<&[u8]> {
        self.sequences.get(contig).map(|v| v.as_slice())
    }

    pub fn len_of(&self, contig: &str) -> Option<usize> {
        self.sequences.get(contig).map(|v| v.len())
    }

    pub fn contig_names(&self) -> impl Iterator<Item = &str> {
        self.sequences.keys().map(|s| s.as_str())
    }

    pub fn contains(&self, contig: &str) -> bool {
        self.sequences.contains_key(contig)
    }

    pub fn substring(&self, contig: &str, start: usize, end: usize) -> PolishResult<&[u8]> {
        let seq = self.get(contig).ok_or_else(|| {
            PolishError::InputMismatch(format!("contig '{}' not present in reference", contig))
        })?;
        if start > end || end > seq.len() {
            return Err(PolishError::InputMismatch(format!(
                "chunk coordinates [{}, {}) exceed contig '{}' length {}",
                start,
                end,
                contig,
                seq.len()
            )));
        }
        Ok(&seq[start..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalises_header_with_metadata() {
        assert_eq!(canonicalise_name("chr1 Homo sapiens chromosome 1"), "chr1");
        assert_eq!(canonicalise_name("contig_00012"), "contig_00012");
        assert_eq!(canonicalise_name(""), "");
    }

    #[test]
    fn from_records_keys_on_canonical_name_only() {
        let map = ReferenceMap::from_records(vec![
            ("tig1 extra metadata here", b"ACGTACGT".to_vec()),
            ("tig2", b"TTTT".to_vec()),
        ]);
        assert!(map.contains("tig1"));
        assert!(!map.contains("tig1 extra metadata here"));
        assert_eq!(map.get("tig1"), Some(&b"ACGTACGT"[..]));
        assert_eq!(map.len_of("tig2"), Some(4));
    }

    #[test]
    fn substring_rejects_out_of_bounds_coordinates() {
        let map = ReferenceMap::from_records(vec![("tig1", b"ACGTACGT".to_vec())]);
        assert!(map.substring("tig1", 0, 4).is_ok());
        assert!(map.substring("tig1", 0, 100).is_err());
        assert!(map.substring("missing", 0, 1).is_err());
    }
}
