use std::collections::HashMap;

use petgraph::stable_graph::{EdgeIndex, NodeIndex};
use tracing::{debug, trace};

use crate::bond::BondOrder;
use crate::config::SegmentConfig;
use crate::element::Element;
use crate::geom::Segment;
use crate::mol::MolecularGraph;
use crate::segments::parallel_support;
use crate::valence::valence_excess;

use super::context::ReconstructionContext;

/// Assigns each parallel partner line to the closest compatible edge.
fn claim(
    graph: &MolecularGraph,
    candidates: &[Segment],
    radius: f64,
    cfg: &SegmentConfig,
) -> HashMap<EdgeIndex, Vec<Segment>> {
    let edges: Vec<(EdgeIndex, Segment)> = graph
        .edges()
        .filter(|&e| {
            let edge = graph.edge(e);
            !edge.invented && !edge.is_stereo()
        })
        .filter_map(|e| graph.edge_segment(e).map(|s| (e, s)))
        .collect();
    let mut claims: HashMap<EdgeIndex, Vec<Segment>> = HashMap::new();
    for cand in candidates {
        let mid = cand.midpoint();
        let best = edges
            .iter()
            .filter(|(_, s)| s.angle_to(cand) <= cfg.parallel_max_angle)
            .filter(|(_, s)| s.overlap_fraction(cand) >= cfg.min_overlap)
            .map(|(e, s)| (*e, s.distance_to_point(mid)))
            .filter(|&(_, d)| d <= radius)
            .min_by(|a, b| a.1.total_cmp(&b.1));
        if let Some((e, _)) = best {
            claims.entry(e).or_default().push(*cand);
        }
    }
    claims
}

fn between_carbons(graph: &MolecularGraph, e: EdgeIndex) -> bool {
    graph
        .endpoints(e)
        .is_some_and(|(a, b)| graph.node(a).element == Element::C && graph.node(b).element == Element::C)
}

/// Re-derives every observed edge's order from the parallel lines lying
/// beside it. Only carbon-carbon bonds are demoted; heteroatom multiple
/// bonds keep their order without a drawn partner. Returns the number of edges whose order changed, plus the
/// support count per edge.
pub fn refine_orders(
    graph: &mut MolecularGraph,
    candidates: &[Segment],
    cfg: &SegmentConfig,
) -> (usize, HashMap<EdgeIndex, usize>) {
    let abl = graph.average_bond_length();
    let mut support = HashMap::new();
    if abl <= 0.0 {
        return (0, support);
    }
    let radius = abl * cfg.parallel_offset_ratio;
    let claims = claim(graph, candidates, radius, cfg);
    let targets: Vec<(EdgeIndex, usize)> = graph
        .edges()
        .filter(|&e| {
            let edge = graph.edge(e);
            !edge.invented && !edge.is_stereo()
        })
        .filter_map(|e| {
            let seg = graph.edge_segment(e)?;
            let partners = claims.get(&e).map_or(&[][..], Vec::as_slice);
            Some((e, parallel_support(partners, &seg, radius, cfg)))
        })
        .collect();
    let mut changed = 0;
    for (e, count) in targets {
        support.insert(e, count);
        let order = BondOrder::from_count(1 + count);
        if order < graph.edge(e).order && !between_carbons(graph, e) {
            continue;
        }
        let edge = graph.edge_mut(e);
        if edge.order != order {
            trace!(?e, from = ?edge.order, to = ?order, "re-ordered bond");
            edge.order = order;
            changed += 1;
        }
    }
    (changed, support)
}

/// Brings over-valent carbons back to four bonds by dropping a dashed bond
/// or demoting the least supported multiple bond.
pub fn fix_carbon_valence(graph: &mut MolecularGraph, support: &HashMap<EdgeIndex, usize>) -> usize {
    let carbons: Vec<NodeIndex> = graph
        .nodes()
        .filter(|&n| graph.node(n).element == Element::C && graph.node(n).charge == 0)
        .collect();
    let mut fixes = 0;
    for c in carbons {
        for _ in 0..graph.degree(c) * 3 {
            if valence_excess(graph, c) == 0 {
                break;
            }
            let dashed = graph.edges_of(c).find(|&e| graph.edge(e).dashed);
            if let Some(dashed) = dashed {
                graph.remove_edge(dashed);
                trace!(?c, "dropped dashed bond on over-valent carbon");
                fixes += 1;
                continue;
            }
            let weakest = graph
                .edges_of(c)
                .filter(|&e| graph.edge(e).order > BondOrder::Single)
                .min_by(|&a, &b| {
                    let sa = support.get(&a).copied().unwrap_or(0);
                    let sb = support.get(&b).copied().unwrap_or(0);
                    sa.cmp(&sb)
                        .then(graph.edge_length(b).total_cmp(&graph.edge_length(a)))
                });
            let Some(e) = weakest else { break };
            let edge = graph.edge_mut(e);
            edge.order = edge.order.demoted();
            trace!(?c, ?e, "demoted bond on over-valent carbon");
            fixes += 1;
        }
    }
    fixes
}

pub fn refine(ctx: &mut ReconstructionContext<'_>) -> usize {
    let (changed, support) = refine_orders(&mut ctx.graph, &ctx.segments.rejected, &ctx.config.segments);
    let fixes = fix_carbon_valence(&mut ctx.graph, &support);
    debug!(changed, fixes, "refined bond orders");
    changed + fixes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::Node;
    use crate::bond::Edge;
    use crate::geom::Point;

    fn line(g: &mut MolecularGraph, a: (f64, f64), b: (f64, f64), order: BondOrder) -> EdgeIndex {
        let na = g.add_node(Node::new(Point::new(a.0, a.1)));
        let nb = g.add_node(Node::new(Point::new(b.0, b.1)));
        g.add_edge(na, nb, Edge::new(order)).unwrap()
    }

    #[test]
    fn partner_promotes_and_missing_partner_demotes() {
        let mut g = MolecularGraph::new();
        let promoted = line(&mut g, (0.0, 0.0), (40.0, 0.0), BondOrder::Single);
        let demoted = line(&mut g, (0.0, 100.0), (40.0, 100.0), BondOrder::Double);
        let partners = [Segment::new(Point::new(4.0, 6.0), Point::new(36.0, 6.0))];
        let (changed, support) = refine_orders(&mut g, &partners, &SegmentConfig::default());
        assert_eq!(changed, 2);
        assert_eq!(g.edge(promoted).order, BondOrder::Double);
        assert_eq!(g.edge(demoted).order, BondOrder::Single);
        assert_eq!(support[&promoted], 1);
    }

    #[test]
    fn carbonyl_keeps_its_double_bond() {
        let mut g = MolecularGraph::new();
        let c = g.add_node(Node::new(Point::new(0.0, 0.0)));
        let o = g.add_node(Node::new(Point::new(40.0, 0.0)).with_element(Element::O));
        let carbonyl = g.add_edge(c, o, Edge::new(BondOrder::Double)).unwrap();
        let (changed, support) = refine_orders(&mut g, &[], &SegmentConfig::default());
        assert_eq!(changed, 0);
        assert_eq!(support[&carbonyl], 0);
        assert_eq!(g.edge(carbonyl).order, BondOrder::Double);
    }

    #[test]
    fn five_bonded_carbon_loses_its_double_bond() {
        let mut g = MolecularGraph::new();
        let c = g.add_node(Node::new(Point::new(0.0, 0.0)));
        let mut double = None;
        for (i, (x, y)) in [(20.0, 0.0), (0.0, 20.0), (-20.0, 0.0), (0.0, -20.0)].into_iter().enumerate() {
            let n = g.add_node(Node::new(Point::new(x, y)));
            let order = if i == 0 { BondOrder::Double } else { BondOrder::Single };
            let e = g.add_edge(c, n, Edge::new(order)).unwrap();
            if i == 0 {
                double = Some(e);
            }
        }
        assert_eq!(fix_carbon_valence(&mut g, &HashMap::new()), 1);
        assert_eq!(g.edge(double.unwrap()).order, BondOrder::Single);
        assert_eq!(valence_excess(&g, c), 0);
    }
}
