//! Output writers: haploid single-FASTA or diploid two-FASTA consensus, plus
//! optional side-channel diagnostic dumps.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::chunk::ReadSeq;
use crate::errors::{PolishError, PolishResult};
use crate::rle::{self, Run};

fn wrap_fasta(out: &mut impl Write, name: &str, bases: &[u8], width: usize) -> std::io::Result<()> {
    writeln!(out, ">{name}")?;
    for line in bases.chunks(width.max(1)) {
        out.write_all(line)?;
        out.write_all(b"\n")?;
    }
    Ok(())
}

fn open(path: &Path) -> PolishResult<std::io::BufWriter<std::fs::File>> {
    let file = std::fs::File::create(path)
        .map_err(|e| PolishError::InputUnavailable(format!("could not create output {}: {}", path.display(), e)))?;
    Ok(std::io::BufWriter::new(file))
}

/// Write a single polished FASTA (haploid mode): one record per contig.
pub fn write_haploid(output_prefix: &Path, contigs: &[(String, Vec<u8>)]) -> PolishResult<()> {
    let path = output_prefix.with_extension("fa");
    let mut out = open(&path)?;
    for (name, bases) in contigs {
        wrap_fasta(&mut out, name, bases, 80)
            .map_err(|e| PolishError::InputUnavailable(format!("could not write {}: {}", path.display(), e)))?;
    }
    Ok(())
}

/// Write `<prefix>.h1.fa` and `<prefix>.h2.fa` (diploid mode).
pub fn write_diploid(output_prefix: &Path, contigs_h1: &[(String, Vec<u8>)], contigs_h2: &[(String, Vec<u8>)]) -> PolishResult<()> {
    for (suffix, contigs) in [("h1", contigs_h1), ("h2", contigs_h2)] {
        let mut path: PathBuf = output_prefix.to_path_buf();
        let file_name = format!(
            "{}.{suffix}.fa",
            path.file_name().and_then(|n| n.to_str()).unwrap_or("output")
        );
        path.set_file_name(file_name);
        let mut out = open(&path)?;
        for (name, bases) in contigs {
            wrap_fasta(&mut out, name, bases, 80)
                .map_err(|e| PolishError::InputUnavailable(format!("could not write {}: {}", path.display(), e)))?;
        }
    }
    Ok(())
}

/// Dump per-run repeat counts as a TSV: `contig\tposition\tbase\tlength`.
pub fn write_repeat_counts(path: &Path, contig: &str, runs: &[Run]) -> PolishResult<()> {
    let mut out = open(path)?;
    let mut pos = 0usize;
    for run in runs {
        writeln!(out, "{contig}\t{pos}\t{}\t{}", run.base as char, run.length)
            .map_err(|e| PolishError::InputUnavailable(format!("could not write {}: {}", path.display(), e)))?;
        pos += run.length as usize;
    }
    Ok(())
}

/// Dump a POA graph as Graphviz DOT for visual debugging.
pub fn write_poa_dot(path: &Path, dot: &str) -> PolishResult<()> {
    std::fs::write(path, dot).map_err(|e| PolishError::InputUnavailable(format!("could not write {}: {}", path.display(), e)))
}

/// Dump a POA graph as a TSV table, the row-oriented counterpart to
/// `write_poa_dot`.
pub fn write_poa_table(path: &Path, table: &str) -> PolishResult<()> {
    std::fs::write(path, table).map_err(|e| PolishError::InputUnavailable(format!("could not write {}: {}", path.display(), e)))
}

/// Dump a read name -> haplotype-label TSV (diploid diagnostics).
pub fn write_read_haplotypes(path: &Path, assignments: &[(String, Option<u8>)]) -> PolishResult<()> {
    let mut out = open(path)?;
    for (name, hap) in assignments {
        let label = match hap {
            Some(0) => "h1",
            Some(1) => "h2",
            _ => "unphased",
        };
        writeln!(out, "{name}\t{label}")
            .map_err(|e| PolishError::InputUnavailable(format!("could not write {}: {}", path.display(), e)))?;
    }
    Ok(())
}

/// Expand a haplotype's run list to raw bases, for FASTA output.
pub fn expand(runs: &[Run]) -> Vec<u8> {
    rle::expand_runs(runs)
}

/// Re-emit a haplotype's assigned reads as a per-chunk FASTA, the "re-emitted
/// alignment" side channel of §6. `ReadSeq` drops the original CIGAR and
/// quality string (the chunk loader only keeps what the POA/phaser need), so
/// this dump carries each read's sequence and strand rather than a full
/// re-aligned BAM record.
pub fn write_haplotype_reads(path: &Path, reads: &[&ReadSeq]) -> PolishResult<()> {
    let mut out = open(path)?;
    for read in reads {
        let strand = if read.strand_reverse { '-' } else { '+' };
        writeln!(out, ">{} strand={strand} ref={}-{}", read.name, read.ref_start, read.ref_end)
            .map_err(|e| PolishError::InputUnavailable(format!("could not write {}: {}", path.display(), e)))?;
        for line in read.bases.chunks(80) {
            out.write_all(line)
                .and_then(|_| out.write_all(b"\n"))
                .map_err(|e| PolishError::InputUnavailable(format!("could not write {}: {}", path.display(), e)))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haploid_fasta_wraps_at_eighty_columns() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("out");
        let bases = vec![b'A'; 200];
        write_haploid(&prefix, &[("tig1".to_string(), bases)]).unwrap();
        let content = std::fs::read_to_string(prefix.with_extension("fa")).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], ">tig1");
        assert_eq!(lines[1].len(), 80);
        assert_eq!(lines[2].len(), 80);
        assert_eq!(lines[3].len(), 40);
    }

    #[test]
    fn diploid_fasta_writes_two_files() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("out");
        write_diploid(
            &prefix,
            &[("tig1".to_string(), b"ACGT".to_vec())],
            &[("tig1".to_string(), b"TGCA".to_vec())],
        )
        .unwrap();
        assert!(dir.path().join("out.h1.fa").exists());
        assert!(dir.path().join("out.h2.fa").exists());
    }

    #[test]
    fn poa_table_dump_writes_header_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chunk0.hap.poa.tsv");
        write_poa_table(&path, "node\tref_base\tconsensus\ttotal_weight\tdelete_weight\tout_edges\n0\tA\tAx4\t1.0\t0.0\t1:1.0\n").unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("node\tref_base\tconsensus"));
    }

    #[test]
    fn haplotype_reads_dump_writes_one_fasta_record_per_read() {
        use crate::rle;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chunk0.h1.reads.fa");
        let read = ReadSeq {
            name: "r1".to_string(),
            strand_reverse: true,
            bases: b"ACGTACGT".to_vec(),
            rle: Some(rle::compress(b"ACGTACGT")),
            start_soft_clip: 0,
            end_soft_clip: 0,
            ref_start: 10,
            ref_end: 18,
            owned: true,
        };
        write_haplotype_reads(&path, &[&read]).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with(">r1 strand=- ref=10-18\n"));
        assert!(content.contains("ACGTACGT"));
    }

    #[test]
    fn repeat_count_tsv_reports_run_start_positions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs.tsv");
        let runs = rle::compress(b"AAAACCCC").runs;
        write_repeat_counts(&path, "tig1", &runs).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "tig1\t0\tA\t4\ntig1\t4\tC\t4\n");
    }
}
