use std::collections::HashSet;
use std::f64::consts::PI;

use petgraph::stable_graph::{EdgeIndex, NodeIndex};
use tracing::{debug, trace};

use crate::config::GraphConfig;
use crate::geom::{centroid, Point};
use crate::mol::MolecularGraph;
use crate::rings::{Ring, RingInfo};

use super::context::ReconstructionContext;

/// Regular polygon best matching `points`, given in cycle order. Returns
/// the ideal vertex for each input point.
pub fn fit_regular_polygon(points: &[Point]) -> Option<Vec<Point>> {
    let n = points.len();
    if n < 3 {
        return None;
    }
    let c = centroid(points)?;
    let radius = points.iter().map(|p| p.distance(c)).sum::<f64>() / n as f64;
    if radius <= 0.0 {
        return None;
    }
    let signed: f64 = (0..n).map(|i| points[i].cross(points[(i + 1) % n])).sum();
    let turn = if signed < 0.0 { -1.0 } else { 1.0 };
    let step = turn * 2.0 * PI / n as f64;

    let (sin, cos) = points
        .iter()
        .enumerate()
        .map(|(k, p)| (*p - c).angle() - step * k as f64)
        .fold((0.0, 0.0), |(s, co), a| (s + a.sin(), co + a.cos()));
    let phase = sin.atan2(cos);
    Some(
        (0..n)
            .map(|k| {
                let a = phase + step * k as f64;
                c + Point::new(a.cos(), a.sin()) * radius
            })
            .collect(),
    )
}

fn fitted(rings: &[Ring]) -> impl Iterator<Item = &Ring> {
    rings.iter().filter(|r| (5..=7).contains(&r.size()))
}

/// Folds stray nodes sitting on a ring atom into it. An edge from the
/// stray to the atom's ring neighbour duplicates the ring edge: it is
/// dropped and its order and stereo flags move onto the ring edge.
pub fn absorb_duplicates(graph: &mut MolecularGraph, rings: &[Ring], radius: f64) -> usize {
    let ring_nodes: HashSet<NodeIndex> = fitted(rings).flat_map(|r| r.nodes().iter().copied()).collect();
    let mut absorbed = 0;
    for ring in fitted(rings) {
        for &atom in ring.nodes() {
            if !graph.contains_node(atom) {
                continue;
            }
            let at = graph.position(atom);
            let strays: Vec<NodeIndex> = graph
                .nodes()
                .filter(|s| !ring_nodes.contains(s) && graph.position(*s).distance(at) <= radius)
                .collect();
            for stray in strays {
                let duplicates: Vec<(EdgeIndex, EdgeIndex)> = graph
                    .edges_of(stray)
                    .filter_map(|e| {
                        let other = graph.other_end(e, stray)?;
                        if !ring.contains_node(other) {
                            return None;
                        }
                        Some((e, graph.edge_between(atom, other)?))
                    })
                    .collect();
                if duplicates.is_empty() {
                    continue;
                }
                for (duplicate, ring_edge) in duplicates {
                    let Some(dup) = graph.remove_edge(duplicate) else {
                        continue;
                    };
                    let target = graph.edge_mut(ring_edge);
                    target.order = target.order.max(dup.order);
                    target.dashed |= dup.dashed;
                    target.wedge |= dup.wedge;
                    trace!(?ring_edge, "absorbed duplicate ring edge");
                }
                graph.coalesce(atom, stray);
                absorbed += 1;
            }
        }
    }
    absorbed
}

/// Snaps ring atoms that stray from their ring's fitted regular polygon.
/// Only 5 to 7 membered rings are fitted, and atoms shared between rings
/// stay put.
pub fn snap_ring_atoms(graph: &mut MolecularGraph, rings: &[Ring], tolerance_ratio: f64) -> usize {
    let abl = graph.average_bond_length();
    if abl <= 0.0 {
        return 0;
    }
    let tolerance = abl * tolerance_ratio;
    let info = RingInfo::perceive(graph, rings.iter().map(Ring::size).max().unwrap_or(0));
    let mut moved = 0;
    for ring in fitted(rings) {
        let Some(ideal) = fit_regular_polygon(&ring.positions(graph)) else {
            continue;
        };
        for (&n, &target) in ring.nodes().iter().zip(&ideal) {
            if graph.node(n).invented || info.node_rings(n).len() != 1 {
                continue;
            }
            let deviation = graph.position(n).distance(target);
            if deviation > tolerance && deviation < abl {
                trace!(?n, deviation, "snapped ring atom");
                graph.set_position(n, target);
                moved += 1;
            }
        }
    }
    moved
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RingRepair {
    pub absorbed: usize,
    pub moved: usize,
}

/// Absorbs duplicate edges around the rings, then snaps their atoms.
pub fn repair_rings(graph: &mut MolecularGraph, rings: &[Ring], cfg: &GraphConfig) -> RingRepair {
    let abl = graph.average_bond_length();
    if abl <= 0.0 {
        return RingRepair::default();
    }
    let absorbed = absorb_duplicates(graph, rings, abl * cfg.ring_absorb_ratio);
    let moved = snap_ring_atoms(graph, rings, cfg.ring_fit_tolerance);
    RingRepair { absorbed, moved }
}

pub fn repair(ctx: &mut ReconstructionContext<'_>) -> RingRepair {
    let rings = ctx.rings().to_vec();
    let repaired = repair_rings(&mut ctx.graph, &rings, &ctx.config.graph);
    debug!(
        rings = rings.len(),
        absorbed = repaired.absorbed,
        moved = repaired.moved,
        "repaired ring geometry"
    );
    repaired
}
