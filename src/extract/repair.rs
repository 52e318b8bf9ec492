//! Local topology repairs on the expanded graph.

use std::cmp::Ordering;

use petgraph::stable_graph::{EdgeIndex, NodeIndex};
use tracing::{debug, trace};

use crate::atom::Node;
use crate::bond::{BondOrder, Edge};
use crate::config::{RepairConfig, SegmentConfig};
use crate::geom::{Point, Segment};
use crate::mol::MolecularGraph;
use crate::rings::RingInfo;
use crate::segments::line_support;

use super::context::ReconstructionContext;

/// Triple-bond partner coverage at or above this fraction means the whole
/// edge really is a triple bond.
const FULL_TRIPLE_COVERAGE: f64 = 0.75;
/// Partner coverage closer than this to an edge end reaches that end.
const END_SLACK: f64 = 0.1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepairReport {
    pub cages: usize,
    pub triangles: usize,
    pub long_triples: usize,
    pub short_bonds: usize,
}

/// Resolves three-membered rings that are not drawn cyclopropanes. A very
/// short side means two atoms were split apart and get merged, unless both
/// long sides are backed by their own strokes. Otherwise the least
/// supported side goes unless the image backs it.
pub fn triangles(graph: &mut MolecularGraph, lines: &[Segment], tol: f64, cfg: &RepairConfig) -> usize {
    let abl = graph.average_bond_length();
    if abl <= 0.0 {
        return 0;
    }
    let mut fixed = 0;
    let mut kept: Vec<Vec<EdgeIndex>> = Vec::new();
    for _ in 0..graph.edge_count() {
        let Some(ring) = graph
            .rings(3)
            .into_iter()
            .find(|r| !kept.contains(&r.edges().to_vec()))
        else {
            break;
        };
        if ring.edges().iter().any(|&e| graph.edge(e).invented) {
            kept.push(ring.edges().to_vec());
            continue;
        }
        let support = |e: EdgeIndex| {
            graph
                .edge_segment(e)
                .map_or(0.0, |s| line_support(lines, s.a, s.b, tol))
        };
        let mut sides: Vec<(EdgeIndex, f64, f64)> = ring
            .edges()
            .iter()
            .map(|&e| (e, graph.edge_length(e), support(e)))
            .collect();

        sides.sort_by(|a, b| a.1.total_cmp(&b.1));
        let (shortest, shortest_len, _) = sides[0];
        let longest_len = sides[2].1;
        if shortest_len < abl * cfg.triangle_merge_ratio {
            let partners_drawn = sides[1..].iter().all(|&(_, _, s)| s >= cfg.triangle_support);
            match graph.endpoints(shortest) {
                Some((a, b)) if !partners_drawn => {
                    let keep = graph.pick_survivor(&[a, b]);
                    let other = if keep == a { b } else { a };
                    graph.coalesce(keep, other);
                    trace!(?keep, ?other, "merged triangle corner");
                    fixed += 1;
                }
                _ => kept.push(ring.edges().to_vec()),
            }
            continue;
        }
        if longest_len - shortest_len <= longest_len * cfg.triangle_equilateral_tolerance {
            trace!(shortest_len, longest_len, "kept equilateral triangle");
            kept.push(ring.edges().to_vec());
            continue;
        }

        sides.sort_by(|a, b| a.2.partial_cmp(&b.2).unwrap_or(Ordering::Equal));
        let (weakest, _, weakest_support) = sides[0];
        if weakest_support < cfg.triangle_support {
            graph.remove_edge(weakest);
            trace!(?weakest, support = weakest_support, "dropped unsupported triangle side");
            fixed += 1;
        } else {
            kept.push(ring.edges().to_vec());
        }
    }
    fixed
}

fn resolved_node(at: Point) -> Node {
    let mut node = Node::new(at);
    node.resolved = true;
    node
}

/// Splits triple bonds whose parallel strokes cover only part of the
/// line, as in a triple bond drawn collinear with its neighbours.
pub fn long_triples(
    graph: &mut MolecularGraph,
    partners: &[Segment],
    cfg: &RepairConfig,
    seg_cfg: &SegmentConfig,
) -> usize {
    let abl = graph.average_bond_length();
    if abl <= 0.0 {
        return 0;
    }
    let radius = abl * seg_cfg.parallel_offset_ratio;
    let long: Vec<EdgeIndex> = graph
        .edges()
        .filter(|&e| {
            let edge = graph.edge(e);
            edge.order == BondOrder::Triple && !edge.invented && graph.edge_length(e) > abl * cfg.long_triple_ratio
        })
        .collect();
    let mut split = 0;
    for e in long {
        let (Some(seg), Some((a, b))) = (graph.edge_segment(e), graph.endpoints(e)) else {
            continue;
        };
        let (lo, hi) = partners
            .iter()
            .filter(|p| seg.angle_to(p) <= seg_cfg.parallel_max_angle)
            .filter(|p| seg.signed_line_distance(p.midpoint()).abs() <= radius)
            .flat_map(|p| [seg.project(p.a), seg.project(p.b)])
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), t| (lo.min(t), hi.max(t)));
        let (lo, hi) = (lo.max(0.0), hi.min(1.0));
        if hi <= lo || hi - lo >= FULL_TRIPLE_COVERAGE {
            continue;
        }
        let Some(edge) = graph.remove_edge(e) else { continue };
        let start = if lo > END_SLACK {
            let n = graph.add_node(resolved_node(seg.point_at(lo)));
            graph.add_edge(a, n, Edge { order: BondOrder::Single, ..edge.clone() });
            n
        } else {
            a
        };
        let end = if hi < 1.0 - END_SLACK {
            let n = graph.add_node(resolved_node(seg.point_at(hi)));
            graph.add_edge(n, b, Edge { order: BondOrder::Single, ..edge.clone() });
            n
        } else {
            b
        };
        graph.add_edge(start, end, edge);
        trace!(?e, lo, hi, "split long triple bond");
        split += 1;
    }
    split
}

fn opening_angle(c: Point, a: Point, b: Point) -> f64 {
    let (u, v) = (a - c, b - c);
    let denom = u.norm() * v.norm();
    if denom <= 0.0 {
        return 0.0;
    }
    (u.dot(v) / denom).clamp(-1.0, 1.0).acos()
}

/// Removes carbons that are only the crossing point of two straight bonds
/// in a perspective drawing, joining each straight pair directly. A
/// crossing where no drawn line ends is always removed; one where lines do
/// end goes only if joining brings the bonds closer to ABL or the carbon
/// sits in several small rings.
pub fn cages(
    graph: &mut MolecularGraph,
    lines: &[Segment],
    tol: f64,
    cfg: &RepairConfig,
    max_ring_size: usize,
) -> usize {
    let abl = graph.average_bond_length();
    if abl <= 0.0 {
        return 0;
    }
    let mut removed = 0;
    let mut info = RingInfo::perceive(graph, max_ring_size);
    let candidates: Vec<NodeIndex> = graph
        .nodes()
        .filter(|&n| {
            let node = graph.node(n);
            graph.degree(n) == 4 && !node.is_labeled() && !node.invented
        })
        .collect();
    for c in candidates {
        if !graph.contains_node(c) || graph.degree(c) != 4 {
            continue;
        }
        if graph.edges_of(c).any(|e| graph.edge(e).is_stereo()) {
            continue;
        }
        let origin = graph.position(c);
        let mut nbs: Vec<NodeIndex> = graph.neighbors(c).collect();
        nbs.sort_by(|&a, &b| {
            (graph.position(a) - origin)
                .angle()
                .total_cmp(&(graph.position(b) - origin).angle())
        });
        let pairs = [(nbs[0], nbs[2]), (nbs[1], nbs[3])];
        let straight = pairs.iter().all(|&(a, b)| {
            opening_angle(origin, graph.position(a), graph.position(b)) >= cfg.cage_straight_angle
        });
        if !straight {
            continue;
        }
        let current: f64 = nbs
            .iter()
            .map(|&n| (graph.position(n).distance(origin) - abl).abs())
            .sum();
        let joined: f64 = pairs
            .iter()
            .map(|&(a, b)| (graph.position(a).distance(graph.position(b)) - abl).abs())
            .sum();
        let small_rings = info.ring_membership(c, 3..=5);
        let line_ends = lines
            .iter()
            .any(|l| l.a.distance(origin) <= tol || l.b.distance(origin) <= tol);
        if line_ends && joined >= current && small_rings < 2 {
            continue;
        }

        let orders: Vec<(NodeIndex, NodeIndex, BondOrder)> = pairs
            .iter()
            .map(|&(a, b)| {
                let order = [a, b]
                    .iter()
                    .filter_map(|&n| graph.edge_between(c, n))
                    .map(|e| graph.edge(e).order)
                    .max()
                    .unwrap_or_default();
                (a, b, order)
            })
            .collect();
        graph.remove_node(c);
        for (a, b, order) in orders {
            if graph.edge_between(a, b).is_none() {
                graph.add_edge(a, b, Edge::new(order));
            }
            graph.node_mut(a).resolved = true;
            graph.node_mut(b).resolved = true;
        }
        trace!(?c, small_rings, line_ends, "removed cage crossing");
        removed += 1;
        info = RingInfo::perceive(graph, max_ring_size);
    }
    removed
}

/// Merges the ends of edges far shorter than the average bond, unless a
/// short stroke of their own backs them or the merge would leave the
/// neighbouring bonds out of proportion.
pub fn short_bonds(graph: &mut MolecularGraph, lines: &[Segment], tol: f64, cfg: &RepairConfig) -> usize {
    let abl = graph.average_bond_length();
    if abl <= 0.0 {
        return 0;
    }
    let limit = abl * cfg.short_bond_ratio;
    let regular: Vec<f64> = graph
        .edges()
        .map(|e| graph.edge_length(e))
        .filter(|&l| l >= limit)
        .collect();
    let reference = if regular.is_empty() {
        abl
    } else {
        regular.iter().sum::<f64>() / regular.len() as f64
    };
    let candidates: Vec<EdgeIndex> = graph.edges().collect();
    let mut merged = 0;
    for e in candidates {
        if !graph.contains_edge(e) || graph.edge_length(e) >= limit || graph.edge(e).is_stereo() {
            continue;
        }
        let Some((a, b)) = graph.endpoints(e) else { continue };
        let (na, nb) = (graph.node(a), graph.node(b));
        if na.invented || nb.invented || (na.group.is_some() && nb.group.is_some() && na.group != nb.group) {
            continue;
        }
        let length = graph.edge_length(e);
        let strokes: Vec<Segment> = lines
            .iter()
            .filter(|l| l.length() <= length + 2.0 * tol)
            .copied()
            .collect();
        let support = line_support(&strokes, graph.position(a), graph.position(b), tol);
        if support >= cfg.short_bond_support {
            trace!(?e, support, "kept drawn short bond");
            continue;
        }
        let keep = match (na.is_labeled(), nb.is_labeled()) {
            (true, false) => a,
            (false, true) => b,
            _ if graph.degree(b) > graph.degree(a) => b,
            _ => a,
        };
        let other = if keep == a { b } else { a };
        let at = graph.position(keep);
        let proportionate = graph
            .neighbors(other)
            .filter(|&n| n != keep)
            .all(|n| (graph.position(n).distance(at) - reference).abs() <= reference * cfg.short_bond_tolerance);
        if !proportionate {
            trace!(?e, "short bond merge would distort neighbours");
            continue;
        }
        graph.coalesce(keep, other);
        trace!(?keep, ?other, "merged short bond");
        merged += 1;
    }
    merged
}

pub fn run(ctx: &mut ReconstructionContext<'_>) -> RepairReport {
    let lines = ctx.support_lines();
    let tol = ctx.support_tolerance();
    let cfg = &ctx.config.repair;
    let triangles = triangles(&mut ctx.graph, &lines, tol, cfg);
    let long_triples = long_triples(&mut ctx.graph, &ctx.segments.rejected, cfg, &ctx.config.segments);
    let cages = cages(&mut ctx.graph, &lines, tol, cfg, ctx.config.graph.max_ring_size);
    let short_bonds = short_bonds(&mut ctx.graph, &lines, tol, cfg);
    let report = RepairReport {
        cages,
        triangles,
        long_triples,
        short_bonds,
    };
    ctx.graph.standard_clean_edges();
    debug!(
        cages = report.cages,
        triangles = report.triangles,
        long_triples = report.long_triples,
        short_bonds = report.short_bonds,
        nodes = ctx.graph.node_count(),
        edges = ctx.graph.edge_count(),
        "repaired topology"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(g: &mut MolecularGraph, x: f64, y: f64) -> NodeIndex {
        g.add_node(Node::new(Point::new(x, y)))
    }

    #[test]
    fn crossing_cage_carbon_is_removed() {
        let mut g = MolecularGraph::new();
        let corners = [
            node(&mut g, 10.0, 10.0),
            node(&mut g, -10.0, 10.0),
            node(&mut g, -10.0, -10.0),
            node(&mut g, 10.0, -10.0),
        ];
        for i in 0..4 {
            g.add_edge(corners[i], corners[(i + 1) % 4], Edge::single());
        }
        let c = node(&mut g, 0.0, 0.0);
        for &k in &corners {
            g.add_edge(c, k, Edge::single());
        }

        assert_eq!(cages(&mut g, &[], 2.0, &RepairConfig::default(), 7), 1);
        assert!(!g.contains_node(c));
        assert_eq!(g.node_count(), 4);
        assert_eq!(g.edge_count(), 6);
        assert!(g.edge_between(corners[0], corners[2]).is_some());
        assert!(g.edge_between(corners[1], corners[3]).is_some());
    }

    #[test]
    fn drawn_quaternary_carbon_stays() {
        let mut g = MolecularGraph::new();
        let c = node(&mut g, 0.0, 0.0);
        let mut lines = Vec::new();
        for (x, y) in [(20.0, 0.0), (0.0, 20.0), (-20.0, 0.0), (0.0, -20.0)] {
            let n = node(&mut g, x, y);
            g.add_edge(c, n, Edge::single());
            lines.push(Segment::new(Point::new(0.0, 0.0), Point::new(x, y)));
        }
        assert_eq!(cages(&mut g, &lines, 2.0, &RepairConfig::default(), 7), 0);
        assert!(g.contains_node(c));
    }

    #[test]
    fn crossing_of_two_long_bonds_is_split() {
        let mut g = MolecularGraph::new();
        let hexagon: Vec<NodeIndex> = (0..6)
            .map(|k| {
                let a = k as f64 * std::f64::consts::PI / 3.0;
                node(&mut g, 20.0 * a.cos(), 20.0 * a.sin())
            })
            .collect();
        for i in 0..6 {
            g.add_edge(hexagon[i], hexagon[(i + 1) % 6], Edge::single());
        }
        let a = node(&mut g, 100.0, 0.0);
        let b = node(&mut g, 140.0, 0.0);
        let c = node(&mut g, 120.0, -20.0);
        let d = node(&mut g, 120.0, 20.0);
        let x = node(&mut g, 120.0, 0.0);
        for n in [a, b, c, d] {
            g.add_edge(x, n, Edge::single());
        }
        let lines = [
            Segment::new(Point::new(100.0, 0.0), Point::new(140.0, 0.0)),
            Segment::new(Point::new(120.0, -20.0), Point::new(120.0, 20.0)),
        ];

        assert_eq!(cages(&mut g, &lines, 2.4, &RepairConfig::default(), 7), 1);
        assert!(!g.contains_node(x));
        assert!(g.edge_between(a, b).is_some());
        assert!(g.edge_between(c, d).is_some());
        assert!(g.edge_between(a, c).is_none());
    }

    #[test]
    fn unsupported_triangle_side_is_dropped() {
        let mut g = MolecularGraph::new();
        let a = node(&mut g, 0.0, 0.0);
        let b = node(&mut g, 30.0, 0.0);
        let c = node(&mut g, 15.0, 12.0);
        g.add_edge(a, b, Edge::single());
        g.add_edge(b, c, Edge::single());
        g.add_edge(c, a, Edge::single());
        let lines = [
            Segment::new(Point::new(0.0, 0.0), Point::new(30.0, 0.0)),
            Segment::new(Point::new(30.0, 0.0), Point::new(15.0, 12.0)),
        ];
        assert_eq!(triangles(&mut g, &lines, 2.0, &RepairConfig::default()), 1);
        assert!(g.edge_between(c, a).is_none());
        assert_eq!(g.edge_count(), 2);
    }

    #[test]
    fn supported_cyclopropane_is_kept() {
        let mut g = MolecularGraph::new();
        let pts = [Point::new(0.0, 0.0), Point::new(30.0, 0.0), Point::new(15.0, 26.0)];
        let nodes: Vec<NodeIndex> = pts.iter().map(|p| node(&mut g, p.x, p.y)).collect();
        let mut lines = Vec::new();
        for i in 0..3 {
            g.add_edge(nodes[i], nodes[(i + 1) % 3], Edge::single());
            lines.push(Segment::new(pts[i], pts[(i + 1) % 3]));
        }
        assert_eq!(triangles(&mut g, &lines, 2.0, &RepairConfig::default()), 0);
        assert_eq!(g.edge_count(), 3);
    }

    #[test]
    fn equilateral_triangle_is_left_alone() {
        let mut g = MolecularGraph::new();
        let nodes = [node(&mut g, 0.0, 0.0), node(&mut g, 30.0, 0.0), node(&mut g, 15.0, 26.0)];
        for i in 0..3 {
            g.add_edge(nodes[i], nodes[(i + 1) % 3], Edge::single());
        }
        assert_eq!(triangles(&mut g, &[], 2.0, &RepairConfig::default()), 0);
        assert_eq!(g.edge_count(), 3);
    }

    #[test]
    fn partial_triple_is_split() {
        let mut g = MolecularGraph::new();
        let a = node(&mut g, 0.0, 0.0);
        let b = node(&mut g, 100.0, 0.0);
        g.add_edge(a, b, Edge::new(BondOrder::Triple));
        let l = node(&mut g, -20.0, 30.0);
        let r = node(&mut g, 120.0, 30.0);
        g.add_edge(a, l, Edge::single());
        g.add_edge(b, r, Edge::single());
        let mut prev = node(&mut g, 0.0, 200.0);
        for i in 1..=4 {
            let next = node(&mut g, 30.0 * i as f64, 200.0);
            g.add_edge(prev, next, Edge::single());
            prev = next;
        }
        let partners = [
            Segment::new(Point::new(60.0, 4.0), Point::new(95.0, 4.0)),
            Segment::new(Point::new(60.0, -4.0), Point::new(95.0, -4.0)),
        ];
        let split = long_triples(&mut g, &partners, &RepairConfig::default(), &SegmentConfig::default());
        assert_eq!(split, 1);
        assert!(g.edge_between(a, b).is_none());
        let mid = g
            .neighbors(a)
            .find(|&n| g.position(n) == Point::new(60.0, 0.0))
            .unwrap();
        assert_eq!(g.edge(g.edge_between(a, mid).unwrap()).order, BondOrder::Single);
        assert_eq!(g.edge(g.edge_between(mid, b).unwrap()).order, BondOrder::Triple);
    }

    #[test]
    fn short_bond_collapses() {
        let mut g = MolecularGraph::new();
        let a = node(&mut g, 0.0, 0.0);
        let b = node(&mut g, 30.0, 0.0);
        let c = node(&mut g, 33.0, 1.0);
        let d = node(&mut g, 63.0, 1.0);
        g.add_edge(a, b, Edge::single());
        g.add_edge(b, c, Edge::single());
        g.add_edge(c, d, Edge::single());
        assert_eq!(short_bonds(&mut g, &[], 2.0, &RepairConfig::default()), 1);
        assert_eq!(g.node_count(), 3);
        assert_eq!(g.edge_count(), 2);
    }

    #[test]
    fn drawn_short_bond_stays() {
        let mut g = MolecularGraph::new();
        let a = node(&mut g, 0.0, 0.0);
        let b = node(&mut g, 30.0, 0.0);
        let c = node(&mut g, 33.0, 1.0);
        let d = node(&mut g, 63.0, 1.0);
        g.add_edge(a, b, Edge::single());
        g.add_edge(b, c, Edge::single());
        g.add_edge(c, d, Edge::single());
        let stroke = [Segment::new(Point::new(30.0, 0.0), Point::new(33.0, 1.0))];
        assert_eq!(short_bonds(&mut g, &stroke, 2.0, &RepairConfig::default()), 0);
        assert_eq!(g.node_count(), 4);
    }

    #[test]
    fn short_bond_that_would_stretch_its_neighbour_stays() {
        let mut g = MolecularGraph::new();
        let a = node(&mut g, 0.0, 0.0);
        let b = node(&mut g, 24.0, 0.0);
        let c = node(&mut g, 32.0, 0.0);
        let d = node(&mut g, 68.0, 0.0);
        g.add_edge(a, b, Edge::single());
        g.add_edge(b, c, Edge::single());
        g.add_edge(c, d, Edge::single());
        for k in 0..4 {
            let y = 100.0 + 50.0 * k as f64;
            let p = node(&mut g, 0.0, y);
            let q = node(&mut g, 30.0, y);
            g.add_edge(p, q, Edge::single());
        }
        assert_eq!(short_bonds(&mut g, &[], 2.0, &RepairConfig::default()), 0);
        assert!(g.edge_between(b, c).is_some());
    }
}
