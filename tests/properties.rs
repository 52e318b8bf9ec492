use proptest::prelude::*;

use crabsketch::{BondOrder, Edge, MergePosition, MolecularGraph, Node, Point};

fn order(k: u8) -> BondOrder {
    match k % 3 {
        0 => BondOrder::Single,
        1 => BondOrder::Double,
        _ => BondOrder::Triple,
    }
}

fn arb_graph() -> impl Strategy<Value = MolecularGraph> {
    (
        prop::collection::vec((0.0f64..200.0, 0.0f64..200.0), 2..14),
        prop::collection::vec((any::<prop::sample::Index>(), any::<prop::sample::Index>(), any::<u8>()), 0..24),
    )
        .prop_map(|(points, edges)| {
            let mut g = MolecularGraph::new();
            let nodes: Vec<_> = points
                .iter()
                .map(|&(x, y)| g.add_node(Node::new(Point::new(x, y))))
                .collect();
            for (a, b, k) in edges {
                let (a, b) = (*a.get(&nodes), *b.get(&nodes));
                g.add_edge(a, b, Edge::new(order(k)));
            }
            g
        })
}

fn shape(g: &MolecularGraph) -> (usize, usize, Vec<(usize, usize, u8)>) {
    let mut edges: Vec<(usize, usize, u8)> = g
        .edges()
        .filter_map(|e| {
            let (a, b) = g.endpoints(e)?;
            let (a, b) = (a.index().min(b.index()), a.index().max(b.index()));
            Some((a, b, g.edge(e).order.value()))
        })
        .collect();
    edges.sort();
    (g.node_count(), g.edge_count(), edges)
}

proptest! {
    #[test]
    fn standard_clean_is_idempotent(mut g in arb_graph()) {
        g.standard_clean_edges();
        let once = shape(&g);
        prop_assert_eq!(g.standard_clean_edges(), 0);
        prop_assert_eq!(shape(&g), once);
    }

    #[test]
    fn simple_clean_is_idempotent(mut g in arb_graph()) {
        g.simple_clean();
        let once = shape(&g);
        let abl = g.average_bond_length();
        prop_assert_eq!(g.simple_clean(), 0);
        prop_assert_eq!(shape(&g), once);
        prop_assert_eq!(g.average_bond_length(), abl);
    }

    #[test]
    fn edges_stay_well_formed(mut g in arb_graph()) {
        g.merge_nodes_closer_than(0.2, MergePosition::Centroid);
        g.simple_clean();
        for e in g.edges() {
            let (a, b) = g.endpoints(e).unwrap();
            prop_assert_ne!(a, b);
            prop_assert!(g.contains_node(a) && g.contains_node(b));
            prop_assert!((1..=3).contains(&g.edge(e).order.value()));
        }
    }

    #[test]
    fn merge_removes_all_but_one_per_cluster(
        k in 2usize..6,
        jitter in prop::collection::vec((-0.5f64..0.5, -0.5f64..0.5), 6),
    ) {
        let mut g = MolecularGraph::new();
        let hub: Vec<_> = jitter[..k]
            .iter()
            .map(|&(dx, dy)| g.add_node(Node::new(Point::new(100.0 + dx, 100.0 + dy))))
            .collect();
        let spokes: Vec<_> = (0..k)
            .map(|i| {
                let a = i as f64 * std::f64::consts::TAU / k as f64;
                g.add_node(Node::new(Point::new(100.0 + 40.0 * a.cos(), 100.0 + 40.0 * a.sin())))
            })
            .collect();
        for (&h, &s) in hub.iter().zip(&spokes) {
            g.add_edge(h, s, Edge::single());
        }
        let before = g.node_count();

        let report = g.merge_nodes_closer_than(0.1, MergePosition::Centroid);
        prop_assert_eq!(report.merged, k - 1);
        prop_assert_eq!(g.node_count(), before - (k - 1));
        let survivor = report.survivors[0];
        prop_assert_eq!(g.degree(survivor), k);
        for s in spokes {
            prop_assert!(g.edge_between(survivor, s).is_some());
        }
    }
}
