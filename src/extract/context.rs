use serde::Serialize;

use crate::bitmap::Bitmap;
use crate::cancel::CancelToken;
use crate::collab::{GlyphClassifier, LabelInterpreter};
use crate::config::ExtractConfig;
use crate::fragment::Interpretation;
use crate::geom::{Segment, Shape};
use crate::labels::LabelSet;
use crate::mol::MolecularGraph;
use crate::rings::Ring;
use crate::segments::SegmentSet;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeSummary {
    pub id: usize,
    pub x: f64,
    pub y: f64,
    pub element: &'static str,
    pub charge: i8,
    pub invented: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EdgeSummary {
    pub source: usize,
    pub target: usize,
    pub order: u8,
    pub wedge: bool,
    pub dashed: bool,
}

/// Serializable view of a graph for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphSummary {
    pub nodes: Vec<NodeSummary>,
    pub edges: Vec<EdgeSummary>,
    pub average_bond_length: f64,
}

impl GraphSummary {
    pub fn of(graph: &MolecularGraph) -> Self {
        let nodes = graph
            .nodes()
            .map(|n| {
                let node = graph.node(n);
                NodeSummary {
                    id: n.index(),
                    x: node.position.x,
                    y: node.position.y,
                    element: node.element.symbol(),
                    charge: node.charge,
                    invented: node.invented,
                }
            })
            .collect();
        let edges = graph
            .edges()
            .filter_map(|e| {
                let (a, b) = graph.endpoints(e)?;
                let edge = graph.edge(e);
                Some(EdgeSummary {
                    source: a.index(),
                    target: b.index(),
                    order: edge.order.value(),
                    wedge: edge.wedge,
                    dashed: edge.dashed,
                })
            })
            .collect();
        Self {
            nodes,
            edges,
            average_bond_length: graph.average_bond_length(),
        }
    }
}

/// Graph copy taken after a refinement step.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub step: String,
    #[serde(skip)]
    pub graph: MolecularGraph,
    pub summary: GraphSummary,
}

/// Everything the refinement passes share: inputs, the graph being built,
/// and the state that survives rebuilds (cutoffs, blacklisted and dashed
/// regions).
pub struct ReconstructionContext<'a> {
    pub config: &'a ExtractConfig,
    pub classifier: &'a dyn GlyphClassifier,
    pub interpreter: &'a dyn LabelInterpreter,
    pub cancel: &'a CancelToken,
    pub binary: &'a Bitmap,
    pub regions: &'a [Shape],
    pub segments: SegmentSet,
    pub labels: LabelSet,
    pub graph: MolecularGraph,
    /// Shortest line, in pixels, admitted to the graph.
    pub min_segment: f64,
    /// Longest line, in pixels, admitted to the graph.
    pub max_bond_length: f64,
    pub blacklist: Vec<Shape>,
    pub dash_regions: Vec<Shape>,
    pub dashed_lines: Vec<Segment>,
    pub snapshots: Vec<Snapshot>,
    pub restart: usize,
    rings: Option<Vec<Ring>>,
}

impl<'a> ReconstructionContext<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &'a ExtractConfig,
        classifier: &'a dyn GlyphClassifier,
        interpreter: &'a dyn LabelInterpreter,
        cancel: &'a CancelToken,
        binary: &'a Bitmap,
        regions: &'a [Shape],
        segments: SegmentSet,
        labels: LabelSet,
    ) -> Self {
        let mean = segments.mean_length();
        Self {
            config,
            classifier,
            interpreter,
            cancel,
            binary,
            regions,
            min_segment: mean * config.graph.min_segment_ratio,
            max_bond_length: if mean > 0.0 {
                mean * config.graph.max_bond_length_ratio
            } else {
                f64::INFINITY
            },
            segments,
            labels,
            graph: MolecularGraph::new(),
            blacklist: Vec::new(),
            dash_regions: Vec::new(),
            dashed_lines: Vec::new(),
            snapshots: Vec::new(),
            restart: 0,
            rings: None,
        }
    }

    pub fn abl(&self) -> f64 {
        self.graph.average_bond_length()
    }

    /// Lines that may vouch for a bond: every joined line plus label
    /// strokes.
    pub fn support_lines(&self) -> Vec<Segment> {
        let mut lines = self.segments.joined.clone();
        lines.extend_from_slice(&self.labels.strokes);
        lines
    }

    pub fn support_tolerance(&self) -> f64 {
        (self.abl() * self.config.graph.support_tolerance_ratio).max(1.0)
    }

    /// Rings of the current graph, cached until the next checkpoint.
    pub fn rings(&mut self) -> &[Ring] {
        if self.rings.is_none() {
            self.rings = Some(self.graph.rings(self.config.graph.max_ring_size));
        }
        self.rings.as_deref().unwrap_or(&[])
    }

    pub fn invalidate(&mut self) {
        self.rings = None;
    }

    pub fn interpretation(&self, group: usize) -> Option<Interpretation> {
        let token = self.labels.tokens.get(group)?;
        self.interpreter.interpret(&token.text)
    }

    /// Drops derived caches and records a snapshot when enabled.
    pub fn checkpoint(&mut self, step: &str) {
        self.invalidate();
        if self.config.debug_snapshots {
            self.snapshots.push(Snapshot {
                step: format!("{}:{}", self.restart, step),
                graph: self.graph.clone(),
                summary: GraphSummary::of(&self.graph),
            });
        }
    }

    pub fn in_blacklist(&self, seg: &Segment) -> bool {
        let mid = seg.midpoint();
        self.blacklist.iter().any(|s| s.contains(mid))
    }

    pub fn in_dash_region(&self, seg: &Segment) -> bool {
        let mid = seg.midpoint();
        self.dash_regions.iter().any(|s| s.contains(mid))
    }

    /// Whether the segment lies inside a label: its midpoint or both ends
    /// within a token shape.
    pub fn in_label(&self, seg: &Segment) -> bool {
        self.labels.tokens.iter().any(|t| {
            let shape = &t.shape;
            shape.contains(seg.midpoint()) || (shape.contains(seg.a) && shape.contains(seg.b))
        })
    }
}
