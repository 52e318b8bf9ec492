use petgraph::stable_graph::NodeIndex;

use crate::element::Element;
use crate::mol::MolecularGraph;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValenceError {
    pub node: NodeIndex,
    pub element: Element,
    pub actual_valence: u8,
    pub allowed_valences: Vec<u8>,
}

impl std::fmt::Display for ValenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "node {} ({}): valence {} not in {:?}",
            self.node.index(),
            self.element.symbol(),
            self.actual_valence,
            self.allowed_valences,
        )
    }
}

impl std::error::Error for ValenceError {}

/// Sum of incident bond orders. Hydrogens are never drawn as nodes here, so
/// they do not count.
pub fn total_valence(graph: &MolecularGraph, node: NodeIndex) -> u8 {
    graph.bond_order_sum(node)
}

/// Valences an element may take at the given formal charge.
///
/// Cations of the nitrogen and oxygen groups gain a bond, anions lose one;
/// charged carbon and boron follow their isoelectronic neighbours.
pub fn allowed_valences(element: Element, charge: i8) -> Vec<u8> {
    let base = element.default_valences();
    if charge == 0 || base.is_empty() {
        return base.to_vec();
    }
    match element {
        Element::C | Element::Si => vec![3],
        Element::B => {
            if charge < 0 {
                vec![4]
            } else {
                vec![2]
            }
        }
        _ => base
            .iter()
            .filter_map(|&v| {
                let adjusted = v as i16 + charge as i16;
                (adjusted >= 0).then_some(adjusted as u8)
            })
            .collect(),
    }
}

/// How far the node's valence exceeds the largest allowed value. Zero for
/// metals and for nodes within bounds.
pub fn valence_excess(graph: &MolecularGraph, node: NodeIndex) -> u8 {
    let n = graph.node(node);
    let allowed = allowed_valences(n.element, n.charge);
    match allowed.iter().max() {
        Some(&max) => total_valence(graph, node).saturating_sub(max),
        None => 0,
    }
}

/// Whether the node sits above its lowest normal valence, i.e. could carry a
/// positive charge to be balanced.
pub fn exceeds_normal_valence(graph: &MolecularGraph, node: NodeIndex) -> bool {
    let n = graph.node(node);
    match n.element.normal_valence() {
        Some(v) => total_valence(graph, node) > v,
        None => false,
    }
}

pub fn check_valence(graph: &MolecularGraph) -> Result<(), Vec<ValenceError>> {
    let errors: Vec<ValenceError> = graph
        .nodes()
        .filter_map(|idx| {
            let node = graph.node(idx);
            let allowed = allowed_valences(node.element, node.charge);
            if allowed.is_empty() {
                return None;
            }
            let v = total_valence(graph, idx);
            if v <= *allowed.iter().max()? {
                return None;
            }
            Some(ValenceError {
                node: idx,
                element: node.element,
                actual_valence: v,
                allowed_valences: allowed,
            })
        })
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::Node;
    use crate::bond::{BondOrder, Edge};
    use crate::geom::Point;

    fn star(center: Element, orders: &[BondOrder]) -> (MolecularGraph, NodeIndex) {
        let mut g = MolecularGraph::new();
        let c = g.add_node(Node::new(Point::new(0.0, 0.0)).with_element(center));
        for (i, &order) in orders.iter().enumerate() {
            let t = i as f64;
            let leaf = g.add_node(Node::new(Point::new(t.cos(), t.sin())));
            g.add_edge(c, leaf, Edge::new(order));
        }
        (g, c)
    }

    #[test]
    fn methyl_carbon_within_bounds() {
        let (g, c) = star(Element::C, &[BondOrder::Single; 4]);
        assert_eq!(total_valence(&g, c), 4);
        assert_eq!(valence_excess(&g, c), 0);
        assert!(check_valence(&g).is_ok());
    }

    #[test]
    fn pentavalent_carbon_reported() {
        let (g, c) = star(
            Element::C,
            &[BondOrder::Double, BondOrder::Single, BondOrder::Single, BondOrder::Single],
        );
        assert_eq!(valence_excess(&g, c), 1);
        let errs = check_valence(&g).unwrap_err();
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].node, c);
        assert_eq!(errs[0].allowed_valences, vec![4]);
    }

    #[test]
    fn ammonium_needs_charge() {
        let (mut g, n) = star(Element::N, &[BondOrder::Single; 4]);
        assert!(exceeds_normal_valence(&g, n));
        assert_eq!(valence_excess(&g, n), 0);
        g.node_mut(n).charge = 1;
        assert_eq!(allowed_valences(Element::N, 1), vec![4, 6]);
        assert_eq!(valence_excess(&g, n), 0);
    }

    #[test]
    fn charged_oxygen() {
        assert_eq!(allowed_valences(Element::O, -1), vec![1]);
        assert_eq!(allowed_valences(Element::O, 1), vec![3]);
        assert_eq!(allowed_valences(Element::C, -1), vec![3]);
    }

    #[test]
    fn metals_skipped() {
        let (g, c) = star(Element::Fe, &[BondOrder::Single; 6]);
        assert_eq!(valence_excess(&g, c), 0);
        assert!(check_valence(&g).is_ok());
    }
}
