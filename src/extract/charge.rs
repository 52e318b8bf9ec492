//! Formal charges from drawn marks and from valence.

use std::collections::HashSet;

use petgraph::stable_graph::NodeIndex;
use tracing::{debug, trace};

use crate::bond::BondOrder;
use crate::config::RepairConfig;
use crate::element::Element;
use crate::geom::Point;
use crate::mol::MolecularGraph;
use crate::valence::{allowed_valences, exceeds_normal_valence, total_valence};

use super::context::ReconstructionContext;

/// Lines longer than this fraction of ABL are never minus signs.
const MARK_MAX_LENGTH_RATIO: f64 = 0.4;
/// Largest |dy/dx| of a minus sign.
const MARK_MAX_SLOPE: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChargeMark {
    pub position: Point,
    pub charge: i8,
}

fn nearest_heteroatom(graph: &MolecularGraph, p: Point, reach: f64) -> Option<NodeIndex> {
    graph
        .nodes()
        .filter(|&n| graph.node(n).element.is_heteroatom() && graph.node(n).charge == 0)
        .map(|n| (n, graph.position(n).distance(p)))
        .filter(|&(_, d)| d <= reach)
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(n, _)| n)
}

fn fits(element: Element, charge: i8, valence: u8) -> bool {
    allowed_valences(element, charge).contains(&valence)
}

/// Applies drawn charge marks to the nearest uncharged heteroatom, then
/// charges atoms whose bond count no neutral valence explains, and pairs
/// each new positive centre with a terminal singly bonded oxygen.
pub fn balance_charges(graph: &mut MolecularGraph, marks: &[ChargeMark], cfg: &RepairConfig) -> usize {
    let abl = graph.average_bond_length();
    let mut changed = 0;
    if abl > 0.0 {
        let reach = abl * cfg.charge_mark_ratio;
        for mark in marks {
            if let Some(n) = nearest_heteroatom(graph, mark.position, reach) {
                graph.node_mut(n).charge = mark.charge;
                trace!(?n, charge = mark.charge, "applied charge mark");
                changed += 1;
            }
        }
    }

    let mut raised: HashSet<NodeIndex> = HashSet::new();
    let odd: Vec<NodeIndex> = graph
        .nodes()
        .filter(|&n| {
            let node = graph.node(n);
            node.charge == 0
                && exceeds_normal_valence(graph, n)
                && !fits(node.element, 0, total_valence(graph, n))
        })
        .collect();
    for n in odd {
        let element = graph.node(n).element;
        let valence = total_valence(graph, n);
        let charge = [1i8, -1].into_iter().find(|&q| fits(element, q, valence));
        if let Some(q) = charge {
            graph.node_mut(n).charge = q;
            if q > 0 {
                raised.insert(n);
            }
            trace!(?n, charge = q, valence, "charged atom by valence");
            changed += 1;
        }
    }

    for centre in raised {
        let has_anion = graph.neighbors(centre).any(|o| graph.node(o).charge < 0);
        if has_anion {
            continue;
        }
        let oxygen = graph.edges_of(centre).find_map(|e| {
            let o = graph.other_end(e, centre)?;
            let node = graph.node(o);
            (node.element == Element::O
                && node.charge == 0
                && graph.degree(o) == 1
                && graph.edge(e).order == BondOrder::Single)
                .then_some(o)
        });
        if let Some(o) = oxygen {
            graph.node_mut(o).charge = -1;
            trace!(?centre, ?o, "balanced positive centre");
            changed += 1;
        }
    }
    changed
}

/// Charge marks found in the context: rejected "+"/"-" tokens and short
/// horizontal lines that no bond accounts for.
pub fn find_marks(ctx: &ReconstructionContext<'_>) -> Vec<ChargeMark> {
    let abl = ctx.abl();
    let mut marks: Vec<ChargeMark> = ctx
        .labels
        .rejected
        .iter()
        .filter_map(|t| {
            let charge = match t.text.as_str() {
                "+" => 1,
                "-" => -1,
                _ => return None,
            };
            Some(ChargeMark {
                position: t.shape.centroid(),
                charge,
            })
        })
        .collect();
    if abl <= 0.0 {
        return marks;
    }
    let tol = ctx.support_tolerance();
    let bonds: Vec<_> = ctx.graph.edges().filter_map(|e| ctx.graph.edge_segment(e)).collect();
    for line in &ctx.segments.joined {
        let v = line.vector();
        let horizontal = v.x.abs() > 0.0 && (v.y / v.x).abs() <= MARK_MAX_SLOPE;
        if !horizontal || line.length() > abl * MARK_MAX_LENGTH_RATIO || ctx.in_label(line) {
            continue;
        }
        let mid = line.midpoint();
        if bonds.iter().any(|b| b.distance_to_point(mid) <= tol) {
            continue;
        }
        marks.push(ChargeMark {
            position: mid,
            charge: -1,
        });
    }
    marks
}

pub fn balance(ctx: &mut ReconstructionContext<'_>) -> usize {
    let marks = find_marks(ctx);
    let changed = balance_charges(&mut ctx.graph, &marks, &ctx.config.repair);
    debug!(marks = marks.len(), changed, "balanced charges");
    changed
}
