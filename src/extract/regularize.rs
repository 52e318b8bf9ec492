//! Final geometry cleanup: snapping observed atoms onto the drawing's bond
//! lattice and onto shared rows and columns.

use std::f64::consts::PI;

use petgraph::stable_graph::NodeIndex;
use tracing::{debug, warn};

use crate::geom::{AffineTransform, Point};
use crate::mol::MolecularGraph;

use super::context::ReconstructionContext;

/// Mean bond direction modulo 60 degrees.
pub fn dominant_angle(graph: &MolecularGraph) -> Option<f64> {
    let (sin, cos) = graph
        .edges()
        .filter(|&e| !graph.edge(e).invented)
        .filter_map(|e| graph.edge_segment(e))
        .filter(|s| s.length() > 0.0)
        .map(|s| 6.0 * s.vector().angle())
        .fold((0.0, 0.0), |(s, c), a| (s + a.sin(), c + a.cos()));
    if sin == 0.0 && cos == 0.0 {
        return None;
    }
    Some(sin.atan2(cos) / 6.0)
}

/// Atoms seen in the image whose position no late merge, split or refused
/// merge has settled.
fn observed(graph: &MolecularGraph) -> Vec<NodeIndex> {
    graph
        .nodes()
        .filter(|&n| {
            let node = graph.node(n);
            !node.invented && !node.too_close && !node.resolved
        })
        .collect()
}

/// Moves observed atoms within `tol` of a point of the triangular lattice
/// spanned by ABL-long vectors along the dominant bond direction.
pub fn snap_to_lattice(graph: &mut MolecularGraph, tol: f64) -> usize {
    let abl = graph.average_bond_length();
    let nodes = observed(graph);
    let (Some(rot), Some(&first)) = (dominant_angle(graph), nodes.first()) else {
        return 0;
    };
    if abl <= 0.0 {
        return 0;
    }
    let u = Point::new(rot.cos(), rot.sin()) * abl;
    let v = Point::new((rot + PI / 3.0).cos(), (rot + PI / 3.0).sin()) * abl;
    let lattice = AffineTransform::from_basis(graph.position(first), u, v);
    let Some(inverse) = lattice.inverse() else {
        warn!(abl, rot, "degenerate bond lattice; skipped lattice snapping");
        return 0;
    };

    let mut moved = 0;
    for n in nodes {
        let p = graph.position(n);
        let q = inverse.apply(p);
        let corners = [
            Point::new(q.x.floor(), q.y.floor()),
            Point::new(q.x.ceil(), q.y.floor()),
            Point::new(q.x.floor(), q.y.ceil()),
            Point::new(q.x.ceil(), q.y.ceil()),
        ];
        let target = corners
            .iter()
            .map(|&c| lattice.apply(c))
            .min_by(|a, b| a.distance(p).total_cmp(&b.distance(p)));
        if let Some(t) = target {
            let d = t.distance(p);
            if d > 0.0 && d <= tol {
                graph.set_position(n, t);
                moved += 1;
            }
        }
    }
    moved
}

/// Aligns observed atoms whose x (or y) coordinates agree within `tol`.
pub fn snap_axes(graph: &mut MolecularGraph, tol: f64) -> usize {
    let nodes = observed(graph);
    let mut moved = 0;
    for axis in [0usize, 1] {
        let coord = |p: Point| if axis == 0 { p.x } else { p.y };
        let mut sorted: Vec<(NodeIndex, f64)> = nodes.iter().map(|&n| (n, coord(graph.position(n)))).collect();
        sorted.sort_by(|a, b| a.1.total_cmp(&b.1));

        let mut start = 0;
        while start < sorted.len() {
            let mut end = start + 1;
            while end < sorted.len() && sorted[end].1 - sorted[end - 1].1 <= tol {
                end += 1;
            }
            let run = &sorted[start..end];
            if run.len() > 1 {
                let mean = run.iter().map(|r| r.1).sum::<f64>() / run.len() as f64;
                for &(n, value) in run {
                    if value != mean {
                        let p = graph.position(n);
                        let snapped = if axis == 0 { Point::new(mean, p.y) } else { Point::new(p.x, mean) };
                        graph.set_position(n, snapped);
                        moved += 1;
                    }
                }
            }
            start = end;
        }
    }
    moved
}

pub fn snap(ctx: &mut ReconstructionContext<'_>) -> usize {
    let tol = ctx.abl() * ctx.config.graph.regularize_snap_ratio;
    if tol <= 0.0 {
        return 0;
    }
    let lattice = snap_to_lattice(&mut ctx.graph, tol);
    let axes = snap_axes(&mut ctx.graph, tol);
    debug!(lattice, axes, "regularized geometry");
    lattice + axes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::Node;
    use crate::bond::Edge;

    #[test]
    fn near_lattice_atoms_snap() {
        let mut g = MolecularGraph::new();
        let n0 = g.add_node(Node::new(Point::new(0.0, 0.0)));
        let n1 = g.add_node(Node::new(Point::new(17.3205, 10.5)));
        let n2 = g.add_node(Node::new(Point::new(34.641, 0.0)));
        g.add_edge(n0, n1, Edge::single());
        g.add_edge(n1, n2, Edge::single());

        let tol = g.average_bond_length() * 0.08;
        assert_eq!(snap_to_lattice(&mut g, tol), 2);
        let angle = (g.position(n1) - g.position(n0)).angle().to_degrees();
        assert!((angle - 30.0).abs() < 1e-6, "angle = {angle}");
        assert_eq!(g.position(n0), Point::new(0.0, 0.0));
    }

    #[test]
    fn invented_atoms_stay_put() {
        let mut g = MolecularGraph::new();
        let n0 = g.add_node(Node::new(Point::new(0.0, 0.0)));
        let n1 = g.add_node(Node::new(Point::new(17.3205, 10.5)).invented());
        g.add_edge(n0, n1, Edge::single());
        snap_to_lattice(&mut g, 5.0);
        snap_axes(&mut g, 50.0);
        assert_eq!(g.position(n1), Point::new(17.3205, 10.5));
    }

    #[test]
    fn merged_and_crowded_atoms_stay_put() {
        let mut g = MolecularGraph::new();
        let n0 = g.add_node(Node::new(Point::new(0.0, 0.0)));
        let n1 = g.add_node(Node::new(Point::new(17.3205, 10.5)));
        let n2 = g.add_node(Node::new(Point::new(34.641, 0.6)));
        let spare = g.add_node(Node::new(Point::new(34.0, 0.0)));
        g.add_edge(n0, n1, Edge::single());
        g.add_edge(n1, n2, Edge::single());
        g.coalesce(n2, spare);
        g.node_mut(n1).too_close = true;

        snap_to_lattice(&mut g, 5.0);
        snap_axes(&mut g, 50.0);
        assert_eq!(g.position(n1), Point::new(17.3205, 10.5));
        assert_eq!(g.position(n2), Point::new(34.641, 0.6));

        g.clear_resolved();
        assert!(snap_axes(&mut g, 1.0) > 0);
        assert_eq!(g.position(n2).y, g.position(n0).y);
    }

    #[test]
    fn rows_and_columns_align() {
        let mut g = MolecularGraph::new();
        let a = g.add_node(Node::new(Point::new(0.0, 0.0)));
        let b = g.add_node(Node::new(Point::new(0.8, 40.0)));
        let c = g.add_node(Node::new(Point::new(40.0, 0.6)));
        assert_eq!(snap_axes(&mut g, 2.0), 4);
        assert_eq!(g.position(a), Point::new(0.4, 0.3));
        assert_eq!(g.position(b).x, 0.4);
        assert_eq!(g.position(c).y, 0.3);
    }

    #[test]
    fn degenerate_drawings_are_skipped() {
        let g = MolecularGraph::new();
        assert_eq!(dominant_angle(&g), None);
        let mut g = MolecularGraph::new();
        g.add_node(Node::new(Point::new(1.0, 1.0)));
        assert_eq!(snap_to_lattice(&mut g, 1.0), 0);
    }
}
