use petgraph::stable_graph::NodeIndex;
use petgraph::visit::NodeIndexable;

use crate::geom::{Bounds, Point};
use crate::mol::MolecularGraph;

pub fn connected_components(graph: &MolecularGraph) -> Vec<Vec<NodeIndex>> {
    let mut visited = vec![false; graph.graph().node_bound()];
    let mut components = Vec::new();
    for node in graph.nodes() {
        if visited[node.index()] {
            continue;
        }
        let mut component = Vec::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            if visited[current.index()] {
                continue;
            }
            visited[current.index()] = true;
            component.push(current);
            for neighbor in graph.neighbors(current) {
                if !visited[neighbor.index()] {
                    stack.push(neighbor);
                }
            }
        }
        component.sort();
        components.push(component);
    }
    components
}

pub fn component_bounds(graph: &MolecularGraph, component: &[NodeIndex]) -> Option<Bounds> {
    let pts: Vec<Point> = graph.positions(component);
    Bounds::from_points(&pts)
}

pub fn component_edge_count(graph: &MolecularGraph, component: &[NodeIndex]) -> usize {
    component
        .iter()
        .map(|&n| graph.degree(n))
        .sum::<usize>()
        / 2
}

/// Mean length of the edges inside `component`, if it has any.
pub fn component_average_bond_length(graph: &MolecularGraph, component: &[NodeIndex]) -> Option<f64> {
    let edges = component_edge_count(graph, component);
    if edges == 0 {
        return None;
    }
    let total: f64 = component
        .iter()
        .flat_map(|&n| graph.edges_of(n))
        .map(|e| graph.edge_length(e))
        .sum();
    Some(total / 2.0 / edges as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::Node;
    use crate::bond::Edge;

    fn two_fragments() -> (MolecularGraph, Vec<NodeIndex>) {
        let mut g = MolecularGraph::new();
        let pts = [(0.0, 0.0), (1.0, 0.0), (2.0, 0.0), (10.0, 0.0), (13.0, 0.0)];
        let n: Vec<NodeIndex> = pts
            .iter()
            .map(|&(x, y)| g.add_node(Node::new(Point::new(x, y))))
            .collect();
        g.add_edge(n[0], n[1], Edge::single());
        g.add_edge(n[1], n[2], Edge::single());
        g.add_edge(n[3], n[4], Edge::single());
        (g, n)
    }

    #[test]
    fn components_after_removal() {
        let (mut g, n) = two_fragments();
        assert_eq!(connected_components(&g).len(), 2);
        g.remove_node(n[1]);
        let comps = connected_components(&g);
        assert_eq!(comps.len(), 3);
        assert!(comps.contains(&vec![n[3], n[4]]));
    }

    #[test]
    fn component_extent_and_edges() {
        let (g, n) = two_fragments();
        let comps = connected_components(&g);
        let small = comps.iter().find(|c| c.contains(&n[3])).unwrap();
        assert_eq!(component_edge_count(&g, small), 1);
        let b = component_bounds(&g, small).unwrap();
        assert_eq!(b.width(), 3.0);
        assert_eq!(component_average_bond_length(&g, small), Some(3.0));
    }
}
