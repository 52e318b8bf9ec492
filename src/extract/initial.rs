//! First graph from the detected bond lines.

use petgraph::stable_graph::{EdgeIndex, NodeIndex};
use tracing::{debug, trace};

use crate::atom::Node;
use crate::bond::{BondOrder, Edge};
use crate::geom::Segment;
use crate::mol::{MergePosition, MolecularGraph};

use super::context::ReconstructionContext;

/// Rebuilds `ctx.graph` from scratch.
///
/// Lines inside labels, blacklisted regions or collapsed dash regions are
/// skipped, as are lines outside the current length cutoffs. Dashed bonds
/// found by an earlier pass are re-added directly.
pub fn build(ctx: &mut ReconstructionContext<'_>) {
    let mut graph = MolecularGraph::new();
    let mut skipped = 0usize;

    let strokes = ctx.labels.strokes.iter().map(|s| (*s, 1u8));
    let lines = ctx
        .segments
        .bond_lines
        .iter()
        .map(|l| (l.segment, l.multiplicity))
        .chain(strokes);
    for (seg, multiplicity) in lines {
        let len = seg.length();
        if len < ctx.min_segment
            || len > ctx.max_bond_length
            || ctx.in_label(&seg)
            || ctx.in_blacklist(&seg)
            || ctx.in_dash_region(&seg)
        {
            skipped += 1;
            continue;
        }
        add_line(&mut graph, &seg, Edge::new(BondOrder::from_count(multiplicity as usize)));
    }
    for seg in &ctx.dashed_lines {
        add_line(&mut graph, seg, Edge::dashed());
    }
    ctx.graph = graph;

    let snap = ctx.config.graph.snap_ratio;
    let report = ctx.graph.merge_nodes_closer_than(snap, MergePosition::BestIntersection);
    let crossings = ctx.graph.create_nodes_on_intersecting_lines(
        ctx.config.graph.crossing_min_fraction,
        |e| !e.dashed,
        |_, _| {},
    );
    let attached = attach_dangling(&mut ctx.graph, ctx.config.graph.dangling_attach_ratio);
    ctx.graph.simple_clean();

    debug!(
        nodes = ctx.graph.node_count(),
        edges = ctx.graph.edge_count(),
        abl = ctx.abl(),
        skipped,
        merged = report.merged,
        crossings,
        attached,
        "built initial graph"
    );
}

fn add_line(graph: &mut MolecularGraph, seg: &Segment, edge: Edge) {
    let a = graph.add_node(Node::new(seg.a));
    let b = graph.add_node(Node::new(seg.b));
    graph.add_edge(a, b, edge);
}

/// Joins degree-one ends that stop just short of the middle of another
/// edge, splitting that edge into a T junction.
pub fn attach_dangling(graph: &mut MolecularGraph, ratio: f64) -> usize {
    let abl = graph.average_bond_length();
    if abl <= 0.0 {
        return 0;
    }
    let reach = abl * ratio;
    let ends: Vec<NodeIndex> = graph.nodes().filter(|&n| graph.degree(n) == 1).collect();
    let mut attached = 0;
    for n in ends {
        if !graph.contains_node(n) || graph.degree(n) != 1 {
            continue;
        }
        let p = graph.position(n);
        let target: Option<(EdgeIndex, f64)> = graph
            .edges()
            .filter(|&e| graph.endpoints(e).is_some_and(|(a, b)| a != n && b != n))
            .filter_map(|e| {
                let seg = graph.edge_segment(e)?;
                let t = seg.project(p);
                let d = seg.distance_to_point(p);
                (d <= reach && (0.1..=0.9).contains(&t)).then_some((e, d))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1));
        let Some((e, _)) = target else {
            continue;
        };
        let Some(at) = graph.edge_segment(e).map(|s| s.closest_point(p)) else {
            continue;
        };
        if let Some(mid) = graph.split_edge(e, at) {
            graph.coalesce(mid, n);
            trace!(?n, ?e, "attached dangling end");
            attached += 1;
        }
    }
    attached
}
