//! Feature-dump emitters for the `featureDumpMode` polymorphism (§9): each
//! variant renders the POA graph's node weights into a tensor an external
//! ML post-processor consumes, indexed by fixed backbone position.

use ndarray::{Array2, Array3};

use crate::params::FeatureDumpMode;
use crate::poa::PoaGraph;

const BASES: [u8; 4] = [b'A', b'C', b'G', b'T'];

fn weight_for(hist: &std::collections::HashMap<u32, f64>) -> f64 {
    hist.values().sum()
}

/// `[position, base]` total weight, collapsing run length (§9: `simpleWeight`).
pub fn simple_weight(graph: &PoaGraph) -> Array2<f64> {
    let nodes = graph.backbone_nodes();
    let mut arr = Array2::zeros((nodes.len(), BASES.len()));
    for (p, node) in nodes.iter().enumerate() {
        for (b_idx, &b) in BASES.iter().enumerate() {
            if let Some(runs) = node.base_run_weights.get(&b) {
                arr[[p, b_idx]] = weight_for(runs);
            }
        }
    }
    arr
}

/// `[position, base * (max_run + 1) + run]`, flattening the run-length axis
/// into the base axis (§9: `splitRleWeight`).
pub fn split_rle_weight(graph: &PoaGraph, max_run: usize) -> Array2<f64> {
    let nodes = graph.backbone_nodes();
    let width = BASES.len() * (max_run + 1);
    let mut arr = Array2::zeros((nodes.len(), width));
    for (p, node) in nodes.iter().enumerate() {
        for (b_idx, &b) in BASES.iter().enumerate() {
            if let Some(runs) = node.base_run_weights.get(&b) {
                for (&run, &w) in runs {
                    let r = (run as usize).min(max_run);
                    arr[[p, b_idx * (max_run + 1) + r]] += w;
                }
            }
        }
    }
    arr
}

/// `[position, base, run]`, keeping base and run as separate tensor axes
/// (§9: `channelRleWeight`).
pub fn channel_rle_weight(graph: &PoaGraph, max_run: usize) -> Array3<f64> {
    let nodes = graph.backbone_nodes();
    let mut arr = Array3::zeros((nodes.len(), BASES.len(), max_run + 1));
    for (p, node) in nodes.iter().enumerate() {
        for (b_idx, &b) in BASES.iter().enumerate() {
            if let Some(runs) = node.base_run_weights.get(&b) {
                for (&run, &w) in runs {
                    let r = (run as usize).min(max_run);
                    arr[[p, b_idx, r]] += w;
                }
            }
        }
    }
    arr
}

/// One `channelRleWeight` tensor per haplotype (§9: `diploidRleWeight`,
/// resolved as its own mode rather than aliasing `channelRleWeight` — see
/// `DESIGN.md`).
pub fn diploid_rle_weight(graph_h0: &PoaGraph, graph_h1: &PoaGraph, max_run: usize) -> (Array3<f64>, Array3<f64>) {
    (channel_rle_weight(graph_h0, max_run), channel_rle_weight(graph_h1, max_run))
}

pub enum FeatureDump {
    SimpleWeight(Array2<f64>),
    SplitRleWeight(Array2<f64>),
    ChannelRleWeight(Array3<f64>),
    DiploidRleWeight(Array3<f64>, Array3<f64>),
}

/// Dispatch on `mode`; `haplotype_graphs` holds one graph in haploid mode,
/// two in diploid mode.
pub fn compute(mode: FeatureDumpMode, haplotype_graphs: &[&PoaGraph], max_run: usize) -> Option<FeatureDump> {
    match mode {
        FeatureDumpMode::None => None,
        FeatureDumpMode::SimpleWeight => Some(FeatureDump::SimpleWeight(simple_weight(haplotype_graphs[0]))),
        FeatureDumpMode::SplitRleWeight => {
            Some(FeatureDump::SplitRleWeight(split_rle_weight(haplotype_graphs[0], max_run)))
        }
        FeatureDumpMode::ChannelRleWeight => {
            Some(FeatureDump::ChannelRleWeight(channel_rle_weight(haplotype_graphs[0], max_run)))
        }
        FeatureDumpMode::DiploidRleWeight => {
            let h1 = haplotype_graphs.get(1).copied().unwrap_or(haplotype_graphs[0]);
            let (a, b) = diploid_rle_weight(haplotype_graphs[0], h1, max_run);
            Some(FeatureDump::DiploidRleWeight(a, b))
        }
    }
}
