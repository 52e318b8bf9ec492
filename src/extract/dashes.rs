//! Hashed bonds: runs of short pieces collapse into one dashed edge.

use std::collections::HashSet;

use petgraph::stable_graph::{EdgeIndex, NodeIndex};
use tracing::{debug, trace};

use crate::bond::Edge;
use crate::config::RepairConfig;
use crate::geom::{Point, Segment, Shape};
use crate::mol::MolecularGraph;

use super::context::ReconstructionContext;

#[derive(Debug, Clone, PartialEq)]
pub struct DashedBond {
    pub edge: EdgeIndex,
    pub line: Segment,
    /// Hull of the pieces the bond replaced.
    pub region: Shape,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DashOutcome {
    pub collapsed: usize,
    /// Raised min-segment cutoff, when collapsing changed the bond scale.
    pub new_min_segment: Option<f64>,
}

/// Mean length of the longer half of the solid edges.
fn reference_length(graph: &MolecularGraph) -> f64 {
    let mut lengths: Vec<f64> = graph
        .edges()
        .filter(|&e| !graph.edge(e).dashed)
        .map(|e| graph.edge_length(e))
        .collect();
    if lengths.is_empty() {
        return 0.0;
    }
    lengths.sort_by(|a, b| b.total_cmp(a));
    let half = lengths.len().div_ceil(2);
    lengths[..half].iter().sum::<f64>() / half as f64
}

fn segment_gap(a: &Segment, b: &Segment) -> f64 {
    if a.intersection(b).is_some() {
        return 0.0;
    }
    [
        a.distance_to_point(b.a),
        a.distance_to_point(b.b),
        b.distance_to_point(a.a),
        b.distance_to_point(a.b),
    ]
    .into_iter()
    .fold(f64::INFINITY, f64::min)
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

/// Groups short unlabeled edges that touch or nearly touch.
fn piece_clusters(graph: &MolecularGraph, max_piece: f64, max_gap: f64) -> Vec<Vec<EdgeIndex>> {
    let pieces: Vec<(EdgeIndex, Segment, NodeIndex, NodeIndex)> = graph
        .edges()
        .filter(|&e| !graph.edge(e).dashed && !graph.edge(e).invented)
        .filter_map(|e| {
            let (a, b) = graph.endpoints(e)?;
            let seg = graph.edge_segment(e)?;
            let labeled = graph.node(a).is_labeled() || graph.node(b).is_labeled();
            (seg.length() < max_piece && !labeled).then_some((e, seg, a, b))
        })
        .collect();

    let mut parent: Vec<usize> = (0..pieces.len()).collect();
    for i in 0..pieces.len() {
        for j in i + 1..pieces.len() {
            let (_, si, ai, bi) = pieces[i];
            let (_, sj, aj, bj) = pieces[j];
            let shared = ai == aj || ai == bj || bi == aj || bi == bj;
            if shared || segment_gap(&si, &sj) <= max_gap {
                let (ri, rj) = (find(&mut parent, i), find(&mut parent, j));
                parent[ri] = rj;
            }
        }
    }

    let mut clusters: Vec<Vec<EdgeIndex>> = Vec::new();
    let mut root_slot: Vec<Option<usize>> = vec![None; pieces.len()];
    for i in 0..pieces.len() {
        let r = find(&mut parent, i);
        match root_slot[r] {
            Some(slot) => clusters[slot].push(pieces[i].0),
            None => {
                root_slot[r] = Some(clusters.len());
                clusters.push(vec![pieces[i].0]);
            }
        }
    }
    clusters
}

/// Picks the node that anchors one end of a run: a run node that also
/// carries solid bonds, else an outside node near the end, else the
/// extreme run node itself.
fn pick_end(
    graph: &MolecularGraph,
    run_nodes: &HashSet<NodeIndex>,
    pieces: &HashSet<EdgeIndex>,
    extreme: NodeIndex,
    end: Point,
    reach: f64,
) -> NodeIndex {
    let has_solid = |n: NodeIndex| graph.edges_of(n).any(|e| !pieces.contains(&e));
    let near = |n: &NodeIndex| graph.position(*n).distance(end) <= reach;
    let by_distance = |a: &NodeIndex, b: &NodeIndex| {
        graph
            .position(*a)
            .distance(end)
            .total_cmp(&graph.position(*b).distance(end))
    };
    if let Some(n) = run_nodes
        .iter()
        .copied()
        .filter(|&n| has_solid(n))
        .filter(near)
        .min_by(by_distance)
    {
        return n;
    }
    graph
        .nodes()
        .filter(|n| !run_nodes.contains(n))
        .filter(near)
        .min_by(by_distance)
        .unwrap_or(extreme)
}

/// Collapses every qualifying run of short pieces into one dashed edge.
pub fn collapse_runs(graph: &mut MolecularGraph, cfg: &RepairConfig) -> Vec<DashedBond> {
    let reference = reference_length(graph);
    if reference <= 0.0 {
        return Vec::new();
    }
    let max_piece = reference * cfg.dash_piece_ratio;
    let max_gap = reference * cfg.dash_gap_ratio;
    let axis_tol = reference * cfg.dash_axis_tolerance;

    let mut bonds = Vec::new();
    for cluster in piece_clusters(graph, max_piece, max_gap) {
        if cluster.len() < cfg.dash_min_pieces {
            continue;
        }
        let segs: Vec<Segment> = cluster.iter().filter_map(|&e| graph.edge_segment(e)).collect();
        let mids: Vec<Point> = segs.iter().map(Segment::midpoint).collect();
        let Some(hull) = Shape::from_points(&mids) else {
            continue;
        };
        let (m0, m1) = hull.farthest_pair();
        let axis = Segment::new(m0, m1);
        if axis.length() <= 0.0 || mids.iter().any(|&m| axis.line_distance(m) > axis_tol) {
            continue;
        }

        let pieces: HashSet<EdgeIndex> = cluster.iter().copied().collect();
        let run_nodes: HashSet<NodeIndex> = cluster
            .iter()
            .filter_map(|&e| graph.endpoints(e))
            .flat_map(|(a, b)| [a, b])
            .collect();
        let dir = axis.direction();
        let proj = |n: &NodeIndex| (graph.position(*n) - m0).dot(dir);
        let by_proj = |a: &NodeIndex, b: &NodeIndex| proj(a).total_cmp(&proj(b));
        let (Some(lo), Some(hi)) = (
            run_nodes.iter().copied().min_by(by_proj),
            run_nodes.iter().copied().max_by(by_proj),
        ) else {
            continue;
        };
        let interior_solid = run_nodes
            .iter()
            .filter(|&&n| n != lo && n != hi)
            .filter(|&&n| graph.edges_of(n).any(|e| !pieces.contains(&e)))
            .count();
        if interior_solid > 0 {
            continue;
        }

        let lo_end = m0 + dir * proj(&lo);
        let hi_end = m0 + dir * proj(&hi);
        let start = pick_end(graph, &run_nodes, &pieces, lo, lo_end, max_gap);
        let end = pick_end(graph, &run_nodes, &pieces, hi, hi_end, max_gap);
        if start == end {
            continue;
        }

        let outline: Vec<Point> = segs.iter().flat_map(|s| [s.a, s.b]).collect();
        let Some(region) = Shape::from_points(&outline) else {
            continue;
        };
        for &e in &cluster {
            graph.remove_edge(e);
        }
        for &n in &run_nodes {
            if n != start && n != end && graph.degree(n) == 0 {
                graph.remove_node(n);
            }
        }
        let line = Segment::new(graph.position(start), graph.position(end));
        if let Some(edge) = graph.add_edge(start, end, Edge::dashed()) {
            trace!(pieces = cluster.len(), ?start, ?end, "collapsed dash run");
            bonds.push(DashedBond {
                edge,
                line,
                region: region.grow(1.0),
            });
        }
    }
    bonds
}

/// Collapses dash runs in the context graph and records them so rebuilds
/// keep the dashed bonds.
pub fn collapse(ctx: &mut ReconstructionContext<'_>) -> DashOutcome {
    let bonds = collapse_runs(&mut ctx.graph, &ctx.config.repair);
    let collapsed = bonds.len();
    for bond in bonds {
        ctx.dashed_lines.push(bond.line);
        ctx.dash_regions.push(bond.region);
    }
    let new_min_segment = if collapsed > 0 {
        let candidate = ctx.abl() * ctx.config.graph.min_segment_ratio;
        (candidate > ctx.min_segment).then_some(candidate)
    } else {
        None
    };
    debug!(collapsed, edges = ctx.graph.edge_count(), abl = ctx.abl(), "collapsed dashed bonds");
    DashOutcome {
        collapsed,
        new_min_segment,
    }
}
