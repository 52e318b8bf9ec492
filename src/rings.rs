use petgraph::stable_graph::{EdgeIndex, NodeIndex};

use crate::geom::Point;
use crate::mol::MolecularGraph;

/// A chordless cycle: nodes in traversal order, edges between consecutive
/// nodes (the last edge closes the cycle).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ring {
    nodes: Vec<NodeIndex>,
    edges: Vec<EdgeIndex>,
}

impl Ring {
    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> &[NodeIndex] {
        &self.nodes
    }

    pub fn edges(&self) -> &[EdgeIndex] {
        &self.edges
    }

    pub fn contains_node(&self, node: NodeIndex) -> bool {
        self.nodes.contains(&node)
    }

    pub fn positions(&self, graph: &MolecularGraph) -> Vec<Point> {
        graph.positions(&self.nodes)
    }
}

/// Every chordless cycle of at most `max_size` nodes.
///
/// Each cycle is reported once, starting from its lowest-index node and
/// walking towards the smaller of that node's two ring neighbours.
pub fn find_rings(graph: &MolecularGraph, max_size: usize) -> Vec<Ring> {
    let mut rings = Vec::new();
    if max_size < 3 {
        return rings;
    }
    let mut starts: Vec<NodeIndex> = graph.nodes().collect();
    starts.sort();
    for s in starts {
        let mut firsts: Vec<NodeIndex> = graph.neighbors(s).filter(|&n| n > s).collect();
        firsts.sort();
        firsts.dedup();
        for p1 in firsts {
            let mut path = vec![s, p1];
            extend_path(graph, &mut path, max_size, &mut rings);
        }
    }
    rings.sort_by(|a, b| a.size().cmp(&b.size()).then_with(|| a.nodes.cmp(&b.nodes)));
    rings
}

fn extend_path(
    graph: &MolecularGraph,
    path: &mut Vec<NodeIndex>,
    max_size: usize,
    rings: &mut Vec<Ring>,
) {
    let s = path[0];
    let last = path[path.len() - 1];
    let mut next: Vec<NodeIndex> = graph.neighbors(last).collect();
    next.sort();
    next.dedup();
    for v in next {
        if v <= s || path.contains(&v) {
            continue;
        }
        let interior = &path[1..path.len() - 1];
        if interior.iter().any(|&p| graph.edge_between(p, v).is_some()) {
            continue;
        }
        if graph.edge_between(v, s).is_some() {
            if path[1] < v {
                path.push(v);
                if let Some(ring) = close_ring(graph, path) {
                    rings.push(ring);
                }
                path.pop();
            }
            continue;
        }
        if path.len() + 1 < max_size {
            path.push(v);
            extend_path(graph, path, max_size, rings);
            path.pop();
        }
    }
}

fn close_ring(graph: &MolecularGraph, path: &[NodeIndex]) -> Option<Ring> {
    let n = path.len();
    let edges = (0..n)
        .map(|i| graph.edge_between(path[i], path[(i + 1) % n]))
        .collect::<Option<Vec<_>>>()?;
    Some(Ring {
        nodes: path.to_vec(),
        edges,
    })
}

#[derive(Debug, Clone)]
pub struct RingInfo {
    rings: Vec<Ring>,
}

impl RingInfo {
    pub fn perceive(graph: &MolecularGraph, max_size: usize) -> Self {
        Self {
            rings: find_rings(graph, max_size),
        }
    }

    pub fn num_rings(&self) -> usize {
        self.rings.len()
    }

    pub fn rings(&self) -> &[Ring] {
        &self.rings
    }

    pub fn node_rings(&self, node: NodeIndex) -> Vec<&Ring> {
        self.rings.iter().filter(|r| r.contains_node(node)).collect()
    }

    /// Number of rings in `sizes` that contain `node`.
    pub fn ring_membership(&self, node: NodeIndex, sizes: std::ops::RangeInclusive<usize>) -> usize {
        self.rings
            .iter()
            .filter(|r| sizes.contains(&r.size()) && r.contains_node(node))
            .count()
    }
}
