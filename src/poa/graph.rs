//! Partial-order alignment graph (§4.4): a weighted DAG over RLE runs, built
//! by threading each read's alignment through a linear reference backbone
//! and promoting well-supported insertions into new nodes.

use std::collections::HashMap;
use std::fmt::Write as _;

use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::chunk::{Alignment, ReadSeq};
use crate::rle::Run;

/// Per-base, per-observed-run-length weight histogram. This is the same
/// shape the RLE length model (§4.5) consumes directly as its observation
/// vector `H`.
pub type RunWeights = HashMap<u8, HashMap<u32, f64>>;

fn add_run_weight(hist: &mut RunWeights, base: u8, run: u32, weight: f64) {
    *hist.entry(base).or_default().entry(run).or_insert(0.0) += weight;
}

fn total_weight(hist: &RunWeights) -> f64 {
    hist.values().flat_map(|m| m.values()).sum()
}

/// Best `(base, run_length)` by total weight, breaking ties by preferring
/// `prefer_base` (the node's original reference base, if any) then
/// lexicographically (§4.4 consensus tie-break rule).
fn argmax_run(hist: &RunWeights, prefer_base: Option<u8>) -> Option<(u8, u32)> {
    let mut best: Option<(u8, u32, f64)> = None;
    for (&base, runs) in hist {
        for (&run, &w) in runs {
            let better = match best {
                None => true,
                Some((bb, br, bw)) => {
                    if w != bw {
                        w > bw
                    } else if Some(base) == prefer_base && Some(bb) != prefer_base {
                        true
                    } else if Some(bb) == prefer_base && Some(base) != prefer_base {
                        false
                    } else if base != bb {
                        base < bb
                    } else {
                        run < br
                    }
                }
            };
            if better {
                best = Some((base, run, w));
            }
        }
    }
    best.map(|(b, r, _)| (b, r))
}

#[derive(Debug, Clone, Default)]
pub struct PoaNode {
    /// Base this node was seeded with from the reference backbone; `None`
    /// for nodes created by insertion promotion.
    pub ref_base: Option<u8>,
    pub base_run_weights: RunWeights,
    pub delete_weight: f64,
}

#[derive(Debug, Clone, Default)]
struct InsertionObservation {
    weight: f64,
    per_position: Vec<RunWeights>,
}

#[derive(Debug, Clone, Default)]
pub struct PoaEdge {
    pub weight: f64,
    pub is_reference_edge: bool,
    insertions: HashMap<Vec<u8>, InsertionObservation>,
}

/// One read's walk over the backbone, recorded alongside the weighted graph
/// so the bubble graph (§4.6) and phaser (§4.7) can query per-read alleles
/// without re-deriving them from the DAG.
#[derive(Debug, Clone)]
pub struct ReadWalk {
    pub read_idx: usize,
    /// `per_position[p]` is `Some((base, run))` if this read matches at
    /// backbone position `p`, `None` if deleted or not covered.
    pub per_position: Vec<Option<(u8, u32)>>,
    /// Backbone position -> inserted bases immediately following it, for
    /// this read.
    pub insertions: HashMap<usize, Vec<u8>>,
    pub covers: std::ops::Range<usize>,
}

/// The POA graph plus bookkeeping needed to run a realignment pass and
/// extract a consensus.
pub struct PoaGraph {
    graph: StableDiGraph<PoaNode, PoaEdge>,
    source: NodeIndex,
    sink: NodeIndex,
    /// Ordered backbone node indices, position `i` corresponds to RLE run
    /// `i` of the seed sequence.
    backbone: Vec<NodeIndex>,
}

const REFERENCE_PRIOR_WEIGHT: f64 = 1e-6;

impl PoaGraph {
    /// Seed a linear chain from `backbone_runs`, with a small prior weight
    /// on each node's reference base/run so that a chunk with zero reads
    /// yields the reference substring unchanged (§4.4 guarantee).
    pub fn seed_linear(backbone_runs: &[Run]) -> Self {
        let mut graph = StableDiGraph::new();
        let source = graph.add_node(PoaNode::default());
        let sink = graph.add_node(PoaNode::default());

        let mut backbone = Vec::with_capacity(backbone_runs.len());
        let mut prev = source;
        for run in backbone_runs {
            let mut node = PoaNode {
                ref_base: Some(run.base),
                ..Default::default()
            };
            add_run_weight(&mut node.base_run_weights, run.base, run.length, REFERENCE_PRIOR_WEIGHT);
            let idx = graph.add_node(node);
            graph.add_edge(
                prev,
                idx,
                PoaEdge {
                    weight: 0.0,
                    is_reference_edge: true,
                    insertions: HashMap::new(),
                },
            );
            backbone.push(idx);
            prev = idx;
        }
        graph.add_edge(
            prev,
            sink,
            PoaEdge {
                weight: 0.0,
                is_reference_edge: true,
                insertions: HashMap::new(),
            },
        );

        PoaGraph {
            graph,
            source,
            sink,
            backbone,
        }
    }

    pub fn backbone_len(&self) -> usize {
        self.backbone.len()
    }

    fn edge_between(&mut self, a: NodeIndex, b: NodeIndex) -> petgraph::stable_graph::EdgeIndex {
        if let Some(e) = self.graph.find_edge(a, b) {
            e
        } else {
            self.graph.add_edge(
                a,
                b,
                PoaEdge {
                    weight: 0.0,
                    is_reference_edge: false,
                    insertions: HashMap::new(),
                },
            )
        }
    }

    /// Thread one read's alignment ops (expressed in backbone/RLE-run
    /// coordinates) through the graph, incrementing node/edge weights and
    /// returning the read's walk for later bubble/phasing use.
    ///
    /// `read_idx` is the read's index in the chunk's read list (used only
    /// to label the returned walk); `weight` is the read's contribution
    /// weight (normally `1.0`).
    pub fn add_read(
        &mut self,
        read_idx: usize,
        read: &ReadSeq,
        alignment: &Alignment,
        weight: f64,
    ) -> ReadWalk {
        let read_runs: Vec<Run> = match &read.rle {
            Some(rle) => rle.runs.clone(),
            None => read.bases.iter().map(|&b| Run { base: b, length: 1 }).collect(),
        };

        let mut per_position = vec![None; self.backbone.len()];
        let mut insertions: HashMap<usize, Vec<u8>> = HashMap::new();
        let mut first_p: Option<usize> = None;
        let mut last_p: Option<usize> = None;

        let mut prev_node = self.source;
        let mut pending_insert_bases: Vec<u8> = Vec::new();
        let mut pending_insert_runs: Vec<RunWeights> = Vec::new();
        let mut pending_from: Option<NodeIndex> = None;

        let flush_insert = |graph: &mut Self, from: NodeIndex, to: NodeIndex, bases: &mut Vec<u8>, runs: &mut Vec<RunWeights>, weight: f64| {
            if bases.is_empty() {
                return;
            }
            let e = graph.edge_between(from, to);
            let obs = graph
                .graph
                .edge_weight_mut(e)
                .unwrap()
                .insertions
                .entry(bases.clone())
                .or_insert_with(|| InsertionObservation {
                    weight: 0.0,
                    per_position: vec![RunWeights::new(); bases.len()],
                });
            obs.weight += weight;
            for (slot, observed) in obs.per_position.iter_mut().zip(runs.iter()) {
                for (&b, m) in observed {
                    for (&r, &w) in m {
                        add_run_weight(slot, b, r, w);
                    }
                }
            }
            bases.clear();
            runs.clear();
        };

        for op in &alignment.ops {
            match (op.read_offset, op.ref_offset) {
                (Some(r), Some(p)) => {
                    // Flush any buffered insertion onto the edge leading here.
                    let target = self.backbone[p];
                    flush_insert(
                        self,
                        pending_from.unwrap_or(prev_node),
                        target,
                        &mut pending_insert_bases,
                        &mut pending_insert_runs,
                        weight,
                    );

                    let e = self.edge_between(prev_node, target);
                    self.graph.edge_weight_mut(e).unwrap().weight += op.weight * weight;

                    let run = read_runs.get(r).copied().unwrap_or(Run { base: b'N', length: 1 });
                    let node = self.graph.node_weight_mut(target).unwrap();
                    add_run_weight(&mut node.base_run_weights, run.base, run.length, op.weight * weight);

                    per_position[p] = Some((run.base, run.length));
                    first_p.get_or_insert(p);
                    last_p = Some(p);

                    prev_node = target;
                    pending_from = None;
                }
                (None, Some(p)) => {
                    let target = self.backbone[p];
                    flush_insert(
                        self,
                        pending_from.unwrap_or(prev_node),
                        target,
                        &mut pending_insert_bases,
                        &mut pending_insert_runs,
                        weight,
                    );

                    let e = self.edge_between(prev_node, target);
                    self.graph.edge_weight_mut(e).unwrap().weight += op.weight * weight;
                    self.graph.node_weight_mut(target).unwrap().delete_weight += op.weight * weight;

                    first_p.get_or_insert(p);
                    last_p = Some(p);

                    prev_node = target;
                    pending_from = None;
                }
                (Some(r), None) => {
                    let run = read_runs.get(r).copied().unwrap_or(Run { base: b'N', length: 1 });
                    pending_insert_bases.push(run.base);
                    let mut hist = RunWeights::new();
                    add_run_weight(&mut hist, run.base, run.length, op.weight * weight);
                    pending_insert_runs.push(hist);
                    pending_from.get_or_insert(prev_node);
                    if let Some(p) = last_p {
                        insertions.entry(p).or_default().push(run.base);
                    }
                }
                (None, None) => {}
            }
        }

        // A trailing insertion (after the last matched/deleted position)
        // flushes onto the edge into the sink.
        flush_insert(
            self,
            pending_from.unwrap_or(prev_node),
            self.sink,
            &mut pending_insert_bases,
            &mut pending_insert_runs,
            weight,
        );
        if prev_node != self.source {
            let e = self.edge_between(prev_node, self.sink);
            self.graph.edge_weight_mut(e).unwrap().weight += weight;
        }

        let covers = match (first_p, last_p) {
            (Some(a), Some(b)) => a..(b + 1),
            _ => 0..0,
        };

        ReadWalk {
            read_idx,
            per_position,
            insertions,
            covers,
        }
    }

    /// Promote insertion strings whose accumulated weight meets
    /// `threshold` into new backbone-adjacent nodes, splitting weight off
    /// the direct edge so the greedy consensus traversal doesn't
    /// double-count reads that took the insertion path.
    pub fn promote_insertions(&mut self, threshold: f64) {
        let mut to_promote: Vec<(NodeIndex, NodeIndex, Vec<u8>, InsertionObservation)> = Vec::new();
        for edge in self.graph.edge_indices() {
            let (a, b) = self.graph.edge_endpoints(edge).unwrap();
            let data = self.graph.edge_weight(edge).unwrap();
            for (bases, obs) in &data.insertions {
                if obs.weight >= threshold {
                    to_promote.push((a, b, bases.clone(), obs.clone()));
                }
            }
        }

        for (a, b, bases, obs) in to_promote {
            let e = self.graph.find_edge(a, b).expect("edge still present");
            if let Some(entry) = self.graph.edge_weight_mut(e) {
                entry.weight = (entry.weight - obs.weight).max(0.0);
                entry.insertions.remove(&bases);
            }

            let mut prev = a;
            for (i, &base) in bases.iter().enumerate() {
                let mut node = PoaNode {
                    ref_base: None,
                    ..Default::default()
                };
                node.base_run_weights = obs.per_position[i].clone();
                let idx = self.graph.add_node(node);
                self.graph.add_edge(
                    prev,
                    idx,
                    PoaEdge {
                        weight: obs.weight,
                        is_reference_edge: false,
                        insertions: HashMap::new(),
                    },
                );
                prev = idx;
            }
            self.graph.add_edge(
                prev,
                b,
                PoaEdge {
                    weight: obs.weight,
                    is_reference_edge: false,
                    insertions: HashMap::new(),
                },
            );
        }
    }

    /// Greedy highest-weight traversal from source to sink, yielding the
    /// node indices that are emitted (deletion nodes are skipped).
    fn traverse_emitted(&self) -> Vec<NodeIndex> {
        let mut out = Vec::new();
        let mut current = self.source;
        let mut visited = std::collections::HashSet::new();

        loop {
            if current == self.sink {
                break;
            }
            if !visited.insert(current) {
                break; // defensive: avoid any accidental cycle
            }

            if current != self.source {
                let node = &self.graph[current];
                let base_total = total_weight(&node.base_run_weights);
                if base_total > node.delete_weight {
                    out.push(current);
                }
            }

            let mut best: Option<(NodeIndex, f64, bool, u8)> = None;
            for edge in self.graph.edges_directed(current, Direction::Outgoing) {
                let target = edge.target();
                let data = edge.weight();
                let first_base = if target == self.sink {
                    0xff
                } else {
                    self.graph[target]
                        .base_run_weights
                        .keys()
                        .min()
                        .copied()
                        .unwrap_or(0xff)
                };
                let better = match best {
                    None => true,
                    Some((_, bw, bref, bbase)) => {
                        if data.weight != bw {
                            data.weight > bw
                        } else if data.is_reference_edge != bref {
                            data.is_reference_edge
                        } else {
                            first_base < bbase
                        }
                    }
                };
                if better {
                    best = Some((target, data.weight, data.is_reference_edge, first_base));
                }
            }

            match best {
                Some((next, _, _, _)) => current = next,
                None => break,
            }
        }

        out
    }

    /// The consensus sequence (§4.4): the highest-weight base/run at each
    /// emitted node along the greedy traversal.
    pub fn consensus(&self) -> Vec<Run> {
        self.traverse_emitted()
            .into_iter()
            .filter_map(|idx| {
                let node = &self.graph[idx];
                argmax_run(&node.base_run_weights, node.ref_base)
                    .map(|(base, run)| Run { base, length: run.max(1) })
            })
            .collect()
    }

    /// The consensus sequence alongside each emitted node's full observed
    /// run-length histogram for its chosen base — the `H[j]` input the RLE
    /// length model (§4.5) re-estimates against.
    pub fn consensus_with_histograms(&self) -> Vec<(Run, HashMap<u32, f64>)> {
        self.traverse_emitted()
            .into_iter()
            .filter_map(|idx| {
                let node = &self.graph[idx];
                let (base, run) = argmax_run(&node.base_run_weights, node.ref_base)?;
                let histogram = node.base_run_weights.get(&base).cloned().unwrap_or_default();
                Some((Run { base, length: run.max(1) }, histogram))
            })
            .collect()
    }

    /// Render the graph as Graphviz DOT, for diagnostic dumps (§10).
    pub fn to_dot(&self) -> String {
        let mut s = String::new();
        let _ = writeln!(s, "digraph poa {{");
        for idx in self.graph.node_indices() {
            let node = &self.graph[idx];
            let label = match (node.ref_base, argmax_run(&node.base_run_weights, node.ref_base)) {
                (_, Some((b, r))) => format!("{}x{}", b as char, r),
                (Some(b), None) => format!("{}", b as char),
                (None, None) => "-".to_string(),
            };
            let _ = writeln!(s, "  n{} [label=\"{}\"];", idx.index(), label);
        }
        for edge in self.graph.edge_indices() {
            let (a, b) = self.graph.edge_endpoints(edge).unwrap();
            let w = self.graph.edge_weight(edge).unwrap();
            let _ = writeln!(s, "  n{} -> n{} [label=\"{:.1}\"];", a.index(), b.index(), w.weight);
        }
        let _ = writeln!(s, "}}");
        s
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// The original backbone nodes in position order (excludes nodes added
    /// by insertion promotion), for feature-dump tensors that are indexed by
    /// fixed reference/RLE-run position rather than the greedy consensus
    /// path (§10 supplementary features).
    pub fn backbone_nodes(&self) -> Vec<&PoaNode> {
        self.backbone.iter().map(|&idx| &self.graph[idx]).collect()
    }

    /// Render the graph as a TSV table, one row per node: id, reference
    /// base (or `-`), argmax base/run, total observed weight, delete
    /// weight, and out-edge targets with their weights. A row-oriented
    /// complement to `to_dot`'s visual rendering, for tooling that would
    /// rather parse columns than Graphviz (§6 "POA table dump").
    pub fn to_table(&self) -> String {
        let mut s = String::new();
        let _ = writeln!(s, "node\tref_base\tconsensus\ttotal_weight\tdelete_weight\tout_edges");
        for idx in self.graph.node_indices() {
            let node = &self.graph[idx];
            let ref_base = node.ref_base.map(|b| b as char).unwrap_or('-');
            let consensus = match argmax_run(&node.base_run_weights, node.ref_base) {
                Some((b, r)) => format!("{}x{}", b as char, r),
                None => "-".to_string(),
            };
            let total = total_weight(&node.base_run_weights);
            let out_edges: Vec<String> = self
                .graph
                .edges_directed(idx, Direction::Outgoing)
                .map(|e| format!("{}:{:.1}", e.target().index(), e.weight().weight))
                .collect();
            let _ = writeln!(
                s,
                "{}\t{}\t{}\t{:.3}\t{:.3}\t{}",
                idx.index(),
                ref_base,
                consensus,
                total,
                node.delete_weight,
                out_edges.join(",")
            );
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::AlignOp;
    use crate::rle;

    fn backbone(seq: &[u8]) -> Vec<Run> {
        rle::compress(seq).runs
    }

    fn read_seq(bases: &[u8]) -> ReadSeq {
        ReadSeq {
            name: "r".into(),
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

    fn match_alignment(len: usize) -> Alignment {
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

    #[test]
    fn empty_chunk_consensus_matches_reference() {
        let runs = backbone(b"AAAACCCCGGTT");
        let graph = PoaGraph::seed_linear(&runs);
        let consensus = graph.consensus();
        assert_eq!(consensus, runs);
    }

    #[test]
    fn unanimous_reads_reinforce_reference_consensus() {
        let seq = b"AAAACCCCGGTT";
        let runs = backbone(seq);
        let mut graph = PoaGraph::seed_linear(&runs);
        for i in 0..5 {
            let read = read_seq(seq);
            let rle = read.rle.as_ref().unwrap();
            let aln = match_alignment(rle.len());
            graph.add_read(i, &read, &aln, 1.0);
        }
        assert_eq!(graph.consensus(), runs);
    }

    #[test]
    fn supported_insertion_is_promoted_past_threshold() {
        let refseq = b"AAAACCCC";
        let runs = backbone(refseq);
        let mut graph = PoaGraph::seed_linear(&runs);
        for i in 0..5 {
            let read = read_seq(b"AAAACCCCA");
            let rle = read.rle.as_ref().unwrap();
            assert_eq!(rle.len(), 3); // A4, C4, A1
            let aln = Alignment {
                ops: vec![
                    AlignOp { read_offset: Some(0), ref_offset: Some(0), weight: 1.0 },
                    AlignOp { read_offset: Some(1), ref_offset: Some(1), weight: 1.0 },
                    AlignOp { read_offset: Some(2), ref_offset: None, weight: 1.0 },
                ],
            };
            graph.add_read(i, &read, &aln, 1.0);
        }
        graph.promote_insertions(2.0);
        let consensus = graph.consensus();
        assert_eq!(consensus.last().unwrap().base, b'A');
    }

    #[test]
    fn low_support_insertion_is_not_promoted() {
        let refseq = b"AAAACCCC";
        let runs = backbone(refseq);
        let mut graph = PoaGraph::seed_linear(&runs);
        let read = read_seq(b"AAAACCCCA");
        let aln = Alignment {
            ops: vec![
                AlignOp { read_offset: Some(0), ref_offset: Some(0), weight: 1.0 },
                AlignOp { read_offset: Some(1), ref_offset: Some(1), weight: 1.0 },
                AlignOp { read_offset: Some(2), ref_offset: None, weight: 1.0 },
            ],
        };
        graph.add_read(0, &read, &aln, 1.0);
        graph.promote_insertions(2.0);
        assert_eq!(graph.consensus(), runs);
    }

    #[test]
    fn table_dump_has_one_row_per_node_plus_header() {
        let runs = backbone(b"AAAACCCC");
        let graph = PoaGraph::seed_linear(&runs);
        let table = graph.to_table();
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "node\tref_base\tconsensus\ttotal_weight\tdelete_weight\tout_edges");
        assert_eq!(lines.len() - 1, graph.node_count());
    }
}
