//! Top-level orchestration: reference + alignment in, polished FASTA(s) out.
//!
//! Wires the per-chunk pipeline (§4) together and drives it across the
//! `rayon` pool via [`scheduler::run_chunks`], then stitches each contig's
//! chunk outputs back into whole-genome sequences (§4.8).

use std::path::{Path, PathBuf};

use crate::alignment::reader::AlignmentIndex;
use crate::bubble::{self, Bubble};
use crate::chunk::{Alignment, Chunk, ChunkContext, ReadSeq};
use crate::errors::{PolishError, PolishResult};
use crate::features::{self, FeatureDump};
use crate::params::Params;
use crate::phase;
use crate::poa::{self, PoaGraph};
use crate::reference::ReferenceMap;
use crate::rle::{self, Run};
use crate::rle_model;
use crate::scheduler;
use crate::stitch::{self, ChunkOutput};

/// Everything a run needs: input paths, the region to cover, and the tuned
/// parameter document.
pub struct EngineConfig {
    pub reference_path: PathBuf,
    pub alignment_path: PathBuf,
    pub output_prefix: PathBuf,
    pub region: Option<String>,
    pub diploid: bool,
    pub params: Params,
    /// If set, per-chunk diagnostics (POA DOT, repeat-count TSVs, read
    /// haplotype labels, feature tensors) are written under this directory.
    pub dump_dir: Option<PathBuf>,
}

fn backbone_from_substring(ctx: &ChunkContext) -> Vec<Run> {
    match &ctx.ref_rle {
        Some(rle) => rle.runs.clone(),
        None => ctx.ref_substring.iter().map(|&base| Run { base, length: 1 }).collect(),
    }
}

/// Run the POA engine and, if run-length encoding is enabled, re-estimate
/// each emitted run's length from the graph's weight histograms rather than
/// trusting the greedy traversal's raw run length (§4.5).
fn polish_one_haplotype(backbone: &[Run], reads: &[ReadSeq], alignments: &[Alignment], params: &Params) -> (Vec<Run>, PoaGraph) {
    let result = poa::build_and_polish(backbone, reads, alignments, &params.poa);
    let consensus = if params.use_run_length_encoding {
        rle_model::reestimate(&result.graph.consensus_with_histograms(), &params.rle_matrix)
    } else {
        result.consensus
    };
    (consensus, result.graph)
}

/// A read belongs to haplotype `hap`'s POA pool if the phaser assigned it
/// there, or if the phaser left it unphased (unphased reads still support
/// both haplotypes' consensus).
fn belongs_to_haplotype(assigned: Option<Option<u8>>, haplotype: u8) -> bool {
    match assigned {
        Some(Some(h)) => h == haplotype,
        Some(None) | None => true,
    }
}

fn split_by_haplotype(
    reads: &[ReadSeq],
    alignments: &[Alignment],
    read_haplotype: &std::collections::HashMap<usize, Option<u8>>,
    haplotype: u8,
) -> (Vec<ReadSeq>, Vec<Alignment>) {
    reads
        .iter()
        .zip(alignments.iter())
        .enumerate()
        .filter(|(i, _)| belongs_to_haplotype(read_haplotype.get(i).copied(), haplotype))
        .map(|(_, (r, a))| (r.clone(), a.clone()))
        .unzip()
}

/// Write the POA-graph DOT dump, POA table TSV, and repeat-count TSV for
/// one haplotype, if `dump_dir` is configured.
fn dump_chunk_topology(config: &EngineConfig, chunk: &Chunk, label: &str, graph: &PoaGraph, runs: &[Run]) -> PolishResult<()> {
    let Some(dir) = &config.dump_dir else {
        return Ok(());
    };
    std::fs::create_dir_all(dir).map_err(|e| PolishError::InputUnavailable(format!("could not create dump dir {}: {}", dir.display(), e)))?;

    let dot_path = dir.join(format!("chunk{:05}.{}.poa.dot", chunk.index, label));
    crate::output::write_poa_dot(&dot_path, &graph.to_dot())?;

    let poa_tsv_path = dir.join(format!("chunk{:05}.{}.poa.tsv", chunk.index, label));
    crate::output::write_poa_table(&poa_tsv_path, &graph.to_table())?;

    let tsv_path = dir.join(format!("chunk{:05}.{}.runs.tsv", chunk.index, label));
    crate::output::write_repeat_counts(&tsv_path, &chunk.contig, runs)?;
    Ok(())
}

/// Emit the chunk's feature tensor (§9), one call per chunk using every
/// haplotype's graph together so `diploidRleWeight` sees both at once.
fn dump_chunk_features(config: &EngineConfig, chunk: &Chunk, graphs: &[&PoaGraph]) -> PolishResult<()> {
    let Some(dir) = &config.dump_dir else {
        return Ok(());
    };
    if config.params.feature_dump_mode == crate::params::FeatureDumpMode::None {
        return Ok(());
    }
    std::fs::create_dir_all(dir).map_err(|e| PolishError::InputUnavailable(format!("could not create dump dir {}: {}", dir.display(), e)))?;
    if let Some(dump) = features::compute(config.params.feature_dump_mode, graphs, config.params.rle_matrix.max_run) {
        write_feature_dump(dir, chunk.index, "chunk", dump)?;
    }
    Ok(())
}

fn write_feature_dump(dir: &Path, chunk_index: usize, label: &str, dump: FeatureDump) -> PolishResult<()> {
    let path = dir.join(format!("chunk{chunk_index:05}.{label}.features.json"));
    let json = match dump {
        FeatureDump::SimpleWeight(a) => serde_json::json!({ "dim": a.shape(), "data": a.iter().collect::<Vec<_>>() }),
        FeatureDump::SplitRleWeight(a) => serde_json::json!({ "dim": a.shape(), "data": a.iter().collect::<Vec<_>>() }),
        FeatureDump::ChannelRleWeight(a) => serde_json::json!({ "dim": a.shape(), "data": a.iter().collect::<Vec<_>>() }),
        FeatureDump::DiploidRleWeight(a, b) => serde_json::json!({
            "h1": { "dim": a.shape(), "data": a.iter().collect::<Vec<_>>() },
            "h2": { "dim": b.shape(), "data": b.iter().collect::<Vec<_>>() },
        }),
    };
    std::fs::write(&path, json.to_string()).map_err(|e| PolishError::InputUnavailable(format!("could not write {}: {}", path.display(), e)))
}

/// Process one chunk end to end: load reads, downsample, run POA, and (in
/// diploid mode) extract bubbles and phase reads into two haplotypes.
fn process_chunk(reference: &ReferenceMap, config: &EngineConfig, chunk: &Chunk) -> PolishResult<ChunkOutput> {
    let params = &config.params;
    let ref_substring = reference
        .substring(&chunk.contig, chunk.boundary_start as usize, chunk.boundary_end as usize)?
        .to_vec();
    let ctx = ChunkContext::new(chunk.clone(), ref_substring, params.use_run_length_encoding);

    let mut alignment_index = AlignmentIndex::open(&config.alignment_path)?;
    let raw_reads = alignment_index
        .fetch_region(&chunk.contig, chunk.boundary_start, chunk.boundary_end)
        .map_err(|e| PolishError::chunk_failure(chunk.index, &chunk.contig, chunk.boundary_start, chunk.boundary_end, e.to_string()))?;

    let (reads, alignments) = crate::chunk::load_chunk_reads(
        &ctx,
        &raw_reads,
        params.use_run_length_encoding,
        params.boundary_at_match_policy,
    );

    let outcome = crate::downsample::downsample(chunk.index, params.max_depth, chunk.boundary_len(), reads, alignments);
    let reads = outcome.filtered_reads;
    let alignments = outcome.filtered_alignments;

    let backbone = backbone_from_substring(&ctx);

    if !config.diploid {
        let (runs, graph) = polish_one_haplotype(&backbone, &reads, &alignments, params);
        dump_chunk_topology(config, chunk, "hap", &graph, &runs)?;
        dump_chunk_features(config, chunk, &[&graph])?;
        return Ok(ChunkOutput {
            index: chunk.index,
            contig: chunk.contig.clone(),
            haplotypes: vec![runs],
            hap_read_names: Vec::new(),
        });
    }

    let shared_result = poa::build_and_polish(&backbone, &reads, &alignments, &params.poa);
    let reference_bases = rle::expand_runs(&shared_result.consensus);
    let bubbles: Vec<Bubble> = bubble::extract_bubbles_with_mode(
        &shared_result.walks,
        shared_result.consensus.len(),
        &reference_bases,
        params.phaser.min_bubble_read_support,
        params.use_read_alleles,
    );
    let phase_result = phase::phase_with_mode(&shared_result.walks, &bubbles, &params.phaser, params.use_read_alleles_in_phasing);

    if let Some(dir) = &config.dump_dir {
        std::fs::create_dir_all(dir)
            .map_err(|e| PolishError::InputUnavailable(format!("could not create dump dir {}: {}", dir.display(), e)))?;
        let assignments: Vec<(String, Option<u8>)> = reads
            .iter()
            .enumerate()
            .map(|(i, r)| (r.name.clone(), phase_result.read_haplotype.get(&i).copied().flatten()))
            .collect();
        let path = dir.join(format!("chunk{:05}.read_haplotypes.tsv", chunk.index));
        crate::output::write_read_haplotypes(&path, &assignments)?;
    }

    let mut haplotypes = Vec::with_capacity(2);
    let mut graphs = Vec::with_capacity(2);
    let mut hap_read_names = Vec::with_capacity(2);
    for hap in 0..2u8 {
        let (hap_reads, hap_alignments) = split_by_haplotype(&reads, &alignments, &phase_result.read_haplotype, hap);
        let (runs, graph) = polish_one_haplotype(&shared_result.consensus, &hap_reads, &hap_alignments, params);
        dump_chunk_topology(config, chunk, &format!("h{}", hap + 1), &graph, &runs)?;
        if let Some(dir) = &config.dump_dir {
            let path = dir.join(format!("chunk{:05}.h{}.reads.fa", chunk.index, hap + 1));
            crate::output::write_haplotype_reads(&path, &hap_reads.iter().collect::<Vec<_>>())?;
        }
        haplotypes.push(runs);
        graphs.push(graph);
        // Only reads this chunk is authoritative for count toward
        // cross-chunk agreement — boundary-padding reads are also loaded by
        // the neighbouring chunk under a potentially different label.
        hap_read_names.push(hap_reads.iter().filter(|r| r.owned).map(|r| r.name.clone()).collect());
    }
    dump_chunk_features(config, chunk, &graphs.iter().collect::<Vec<_>>())?;

    Ok(ChunkOutput {
        index: chunk.index,
        contig: chunk.contig.clone(),
        haplotypes,
        hap_read_names,
    })
}

/// Run the full pipeline: chunk, polish every chunk in parallel, stitch each
/// contig back together, and write the polished FASTA(s).
pub fn run(config: EngineConfig) -> PolishResult<()> {
    let reference = ReferenceMap::load(&config.reference_path)?;
    // Opened once just to fail fast on a missing index before fanning out.
    AlignmentIndex::open(&config.alignment_path)?;

    let chunker = crate::chunk::Chunker::build(&reference, config.region.as_deref(), config.params.chunk_size, config.params.chunk_boundary)?;

    log::info!("polishing {} chunk(s)", chunker.len());

    let outputs: Vec<PolishResult<ChunkOutput>> =
        scheduler::run_chunks(chunker.len(), config.params.shuffle_chunks, |i| process_chunk(&reference, &config, chunker.get(i).unwrap()));

    let mut chunk_outputs: Vec<Option<ChunkOutput>> = Vec::with_capacity(outputs.len());
    for result in outputs {
        chunk_outputs.push(Some(result?));
    }

    let mut contig_names: Vec<&str> = reference.contig_names().collect();
    contig_names.sort_unstable();
    let contigs_with_chunks: Vec<&str> = contig_names
        .into_iter()
        .filter(|name| chunker.chunks_for_contig(name).next().is_some())
        .collect();

    let mut haploid_contigs = Vec::new();
    let mut h1_contigs = Vec::new();
    let mut h2_contigs = Vec::new();

    for contig in contigs_with_chunks {
        let indices: Vec<usize> = chunker.chunks_for_contig(contig).map(|c| c.index).collect();
        let mut per_contig: Vec<ChunkOutput> = indices
            .into_iter()
            .map(|idx| chunk_outputs[idx].take().expect("each chunk index belongs to exactly one contig"))
            .collect();
        per_contig.sort_by_key(|c| c.index);

        stitch::resolve_haplotype_swaps(&mut per_contig);

        let stitched = stitch::stitch(&per_contig, config.params.chunk_boundary as usize);
        if config.diploid {
            h1_contigs.push((contig.to_string(), stitched[0].clone()));
            h2_contigs.push((contig.to_string(), stitched.get(1).cloned().unwrap_or_default()));
        } else {
            haploid_contigs.push((contig.to_string(), stitched[0].clone()));
        }
    }

    if config.diploid {
        crate::output::write_diploid(&config.output_prefix, &h1_contigs, &h2_contigs)?;
    } else {
        crate::output::write_haploid(&config.output_prefix, &haploid_contigs)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backbone_from_non_rle_substring_is_all_length_one_runs() {
        let chunk = Chunk {
            index: 0,
            contig: "tig1".to_string(),
            boundary_start: 0,
            inner_start: 0,
            inner_end: 4,
            boundary_end: 4,
        };
        let ctx = ChunkContext::new(chunk, b"ACGT".to_vec(), false);
        let backbone = backbone_from_substring(&ctx);
        assert_eq!(backbone.len(), 4);
        assert!(backbone.iter().all(|r| r.length == 1));
    }

    #[test]
    fn backbone_from_rle_substring_collapses_runs() {
        let chunk = Chunk {
            index: 0,
            contig: "tig1".to_string(),
            boundary_start: 0,
            inner_start: 0,
            inner_end: 8,
            boundary_end: 8,
        };
        let ctx = ChunkContext::new(chunk, b"AAAACCCC".to_vec(), true);
        let backbone = backbone_from_substring(&ctx);
        assert_eq!(backbone.len(), 2);
    }
}
