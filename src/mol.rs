use std::collections::HashMap;

use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableUnGraph};
use petgraph::visit::EdgeRef;
use tracing::trace;

use crate::atom::Node;
use crate::bond::Edge;
use crate::geom::{centroid, Point, Segment, Shape};
use crate::graph_ops;
use crate::rings::{self, Ring};

/// Clusters whose spread exceeds this multiple of the merge threshold are
/// refused rather than collapsed.
pub const DEFAULT_SPREAD_LIMIT: f64 = 2.0;

/// Two edges closer than this (in pixels) are treated as zero-length.
const ZERO_LENGTH: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePosition {
    Centroid,
    /// Intersection of the incident bond lines that the most lines agree
    /// on, falling back to the centroid.
    BestIntersection,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeReport {
    pub merged: usize,
    pub survivors: Vec<NodeIndex>,
    pub refused: Vec<Vec<NodeIndex>>,
}

/// The mutable atom/bond graph with image positions.
///
/// Backed by a `StableUnGraph` so node and edge ids survive removals; the
/// reconstruction passes hold ids across many mutations.
#[derive(Clone, Default)]
pub struct MolecularGraph {
    graph: StableUnGraph<Node, Edge>,
}

impl MolecularGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn graph(&self) -> &StableUnGraph<Node, Edge> {
        &self.graph
    }

    pub fn node(&self, idx: NodeIndex) -> &Node {
        &self.graph[idx]
    }

    pub fn node_mut(&mut self, idx: NodeIndex) -> &mut Node {
        &mut self.graph[idx]
    }

    pub fn edge(&self, idx: EdgeIndex) -> &Edge {
        &self.graph[idx]
    }

    pub fn edge_mut(&mut self, idx: EdgeIndex) -> &mut Edge {
        &mut self.graph[idx]
    }

    pub fn contains_node(&self, idx: NodeIndex) -> bool {
        self.graph.contains_node(idx)
    }

    pub fn contains_edge(&self, idx: EdgeIndex) -> bool {
        self.graph.edge_weight(idx).is_some()
    }

    pub fn add_node(&mut self, node: Node) -> NodeIndex {
        self.graph.add_node(node)
    }

    /// Refuses self loops and dead endpoints.
    pub fn add_edge(&mut self, a: NodeIndex, b: NodeIndex, edge: Edge) -> Option<EdgeIndex> {
        if a == b || !self.contains_node(a) || !self.contains_node(b) {
            return None;
        }
        Some(self.graph.add_edge(a, b, edge))
    }

    /// Removes the node and every incident edge.
    pub fn remove_node(&mut self, idx: NodeIndex) -> Option<Node> {
        self.graph.remove_node(idx)
    }

    pub fn remove_edge(&mut self, idx: EdgeIndex) -> Option<Edge> {
        self.graph.remove_edge(idx)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn nodes(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.node_indices()
    }

    pub fn edges(&self) -> impl Iterator<Item = EdgeIndex> + '_ {
        self.graph.edge_indices()
    }

    pub fn neighbors(&self, idx: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.neighbors(idx)
    }

    pub fn edges_of(&self, idx: NodeIndex) -> impl Iterator<Item = EdgeIndex> + '_ {
        self.graph.edges(idx).map(|e| e.id())
    }

    pub fn degree(&self, idx: NodeIndex) -> usize {
        self.graph.edges(idx).count()
    }

    pub fn edge_between(&self, a: NodeIndex, b: NodeIndex) -> Option<EdgeIndex> {
        self.graph.find_edge(a, b)
    }

    pub fn endpoints(&self, idx: EdgeIndex) -> Option<(NodeIndex, NodeIndex)> {
        self.graph.edge_endpoints(idx)
    }

    pub fn other_end(&self, edge: EdgeIndex, node: NodeIndex) -> Option<NodeIndex> {
        let (a, b) = self.endpoints(edge)?;
        if a == node {
            Some(b)
        } else if b == node {
            Some(a)
        } else {
            None
        }
    }

    pub fn position(&self, idx: NodeIndex) -> Point {
        self.graph[idx].position
    }

    pub fn set_position(&mut self, idx: NodeIndex, p: Point) {
        self.graph[idx].position = p;
    }

    /// Segment from the first to the second endpoint.
    pub fn edge_segment(&self, idx: EdgeIndex) -> Option<Segment> {
        let (a, b) = self.endpoints(idx)?;
        Some(Segment::new(self.position(a), self.position(b)))
    }

    pub fn edge_length(&self, idx: EdgeIndex) -> f64 {
        self.edge_segment(idx).map(|s| s.length()).unwrap_or(0.0)
    }

    /// Sum of bond orders over incident edges.
    pub fn bond_order_sum(&self, idx: NodeIndex) -> u8 {
        self.graph
            .edges(idx)
            .map(|e| e.weight().order.value())
            .sum()
    }

    /// Mean edge length, recomputed from the live edge set on every call.
    pub fn average_bond_length(&self) -> f64 {
        let n = self.edge_count();
        if n == 0 {
            return 0.0;
        }
        let total: f64 = self.edges().map(|e| self.edge_length(e)).sum();
        total / n as f64
    }

    /// Forgets which nodes earlier merges and splits touched.
    pub fn clear_resolved(&mut self) {
        for node in self.graph.node_weights_mut() {
            node.resolved = false;
        }
    }

    /// Re-adds the edge with its endpoints swapped. Returns the new id.
    pub fn reverse_edge(&mut self, idx: EdgeIndex) -> Option<EdgeIndex> {
        let (a, b) = self.endpoints(idx)?;
        let edge = self.graph.remove_edge(idx)?;
        self.add_edge(b, a, edge)
    }

    /// Replaces `idx` with two edges meeting at a new node placed at `at`.
    pub fn split_edge(&mut self, idx: EdgeIndex, at: Point) -> Option<NodeIndex> {
        let (a, b) = self.endpoints(idx)?;
        let edge = self.graph.remove_edge(idx)?;
        let mut node = Node::new(at);
        node.resolved = true;
        let mid = self.add_node(node);
        self.add_edge(a, mid, edge.clone());
        self.add_edge(mid, b, edge);
        Some(mid)
    }

    /// Moves every edge of `other` onto `keep` and removes `other`.
    ///
    /// Edges that would become self loops are dropped; when `keep` already
    /// has an edge to the same neighbour the higher order wins. Label
    /// information moves to `keep` if it has none of its own.
    pub fn coalesce(&mut self, keep: NodeIndex, other: NodeIndex) {
        if keep == other || !self.contains_node(keep) || !self.contains_node(other) {
            return;
        }
        // Orientation comes from the stored endpoints; undirected edge
        // references always report the queried node as source.
        let moved: Vec<(NodeIndex, bool, Edge)> = self
            .edges_of(other)
            .filter_map(|e| {
                let (a, b) = self.endpoints(e)?;
                let other_is_source = a == other;
                let nb = if other_is_source { b } else { a };
                Some((nb, other_is_source, self.graph[e].clone()))
            })
            .collect();

        for (nb, other_is_source, edge) in moved {
            if nb == keep {
                continue;
            }
            match self.edge_between(keep, nb) {
                Some(existing) => {
                    if edge.order > self.graph[existing].order {
                        self.graph[existing] = edge;
                    }
                }
                None => {
                    if other_is_source {
                        self.add_edge(keep, nb, edge);
                    } else {
                        self.add_edge(nb, keep, edge);
                    }
                }
            }
        }

        if let Some(removed) = self.graph.remove_node(other) {
            let survivor = &mut self.graph[keep];
            if !survivor.is_labeled() && removed.is_labeled() {
                survivor.element = removed.element;
                survivor.charge = removed.charge;
                survivor.group = removed.group;
            }
            survivor.invented &= removed.invented;
            survivor.resolved = true;
        }
        trace!(?keep, ?other, "coalesced nodes");
    }

    pub fn merge_nodes_closer_than(&mut self, ratio: f64, position: MergePosition) -> MergeReport {
        self.merge_nodes_closer_than_with(ratio, position, DEFAULT_SPREAD_LIMIT)
    }

    /// Collapses every cluster of nodes lying within `ratio * ABL` of each
    /// other. Clusters whose spread exceeds `spread_limit` times that
    /// threshold are left alone and flagged `too_close`.
    pub fn merge_nodes_closer_than_with(
        &mut self,
        ratio: f64,
        position: MergePosition,
        spread_limit: f64,
    ) -> MergeReport {
        let mut report = MergeReport::default();
        let abl = self.average_bond_length();
        if abl <= 0.0 || ratio <= 0.0 {
            return report;
        }
        let threshold = abl * ratio;

        for cluster in self.proximity_clusters(threshold) {
            let spread = self.max_pairwise_distance(&cluster);
            if spread > spread_limit * threshold {
                for &n in &cluster {
                    self.graph[n].too_close = true;
                }
                trace!(size = cluster.len(), spread, "refused cluster merge");
                report.refused.push(cluster);
                continue;
            }
            let target = match position {
                MergePosition::Centroid => self.cluster_centroid(&cluster),
                MergePosition::BestIntersection => self
                    .best_intersection(&cluster, threshold)
                    .unwrap_or_else(|| self.cluster_centroid(&cluster)),
            };
            let keep = self.pick_survivor(&cluster);
            for &n in &cluster {
                if n != keep {
                    self.coalesce(keep, n);
                }
            }
            self.set_position(keep, target);
            report.merged += cluster.len() - 1;
            report.survivors.push(keep);
        }
        report
    }

    /// Fuses every node within `max_dist` of `shape` that satisfies
    /// `predicate` into one node placed by `picker`.
    pub fn merge_all_nodes_inside<P, F>(
        &mut self,
        shape: &Shape,
        max_dist: f64,
        predicate: P,
        picker: F,
    ) -> Option<NodeIndex>
    where
        P: Fn(NodeIndex, &Node) -> bool,
        F: FnOnce(&MolecularGraph, &[NodeIndex]) -> Point,
    {
        let inside: Vec<NodeIndex> = self
            .nodes()
            .filter(|&n| {
                let node = &self.graph[n];
                shape.distance_to(node.position) <= max_dist && predicate(n, node)
            })
            .collect();
        if inside.is_empty() {
            return None;
        }
        let target = picker(self, &inside);
        let keep = self.pick_survivor(&inside);
        for &n in &inside {
            if n != keep {
                self.coalesce(keep, n);
            }
        }
        self.set_position(keep, target);
        Some(keep)
    }

    /// Splits pairs of edges that properly cross, creating a node at each
    /// crossing. A crossing counts only when it lies at least
    /// `min_fraction` of each edge's length away from that edge's ends.
    pub fn create_nodes_on_intersecting_lines<F, C>(
        &mut self,
        min_fraction: f64,
        filter: F,
        mut on_create: C,
    ) -> usize
    where
        F: Fn(&Edge) -> bool,
        C: FnMut(&mut MolecularGraph, NodeIndex),
    {
        let mut created = 0;
        let budget = self.edge_count() * self.edge_count() + 1;
        for _ in 0..budget {
            let Some((e1, e2, p)) = self.find_crossing(min_fraction, &filter) else {
                break;
            };
            let (Some((a1, b1)), Some((a2, b2))) = (self.endpoints(e1), self.endpoints(e2)) else {
                break;
            };
            let (Some(w1), Some(w2)) = (self.remove_edge(e1), self.remove_edge(e2)) else {
                break;
            };
            let mid = self.add_node(Node::new(p));
            self.add_edge(a1, mid, w1.clone());
            self.add_edge(mid, b1, w1);
            self.add_edge(a2, mid, w2.clone());
            self.add_edge(mid, b2, w2);
            on_create(self, mid);
            created += 1;
        }
        created
    }

    pub fn rings(&self, max_size: usize) -> Vec<Ring> {
        rings::find_rings(self, max_size)
    }

    pub fn disconnected_components(&self) -> Vec<Vec<NodeIndex>> {
        graph_ops::connected_components(self)
    }

    /// Drops zero-length edges (merging their endpoints) and duplicate
    /// edges, keeping the highest order. Returns the number of edges removed.
    pub fn standard_clean_edges(&mut self) -> usize {
        let mut removed = 0;

        loop {
            let zero = self
                .edges()
                .find(|&e| self.edge_length(e) < ZERO_LENGTH);
            let Some(e) = zero else { break };
            let Some((a, b)) = self.endpoints(e) else { break };
            self.coalesce(a, b);
            removed += 1;
        }

        let mut by_pair: HashMap<(NodeIndex, NodeIndex), Vec<EdgeIndex>> = HashMap::new();
        for e in self.edges() {
            if let Some((a, b)) = self.endpoints(e) {
                let key = if a.index() < b.index() { (a, b) } else { (b, a) };
                by_pair.entry(key).or_default().push(e);
            }
        }
        let mut groups: Vec<Vec<EdgeIndex>> =
            by_pair.into_values().filter(|v| v.len() > 1).collect();
        groups.sort_by_key(|g| g[0].index());
        for mut group in groups {
            group.sort_by_key(|&e| (std::cmp::Reverse(self.graph[e].order), e.index()));
            for &dup in &group[1..] {
                self.remove_edge(dup);
                removed += 1;
            }
        }
        removed
    }

    /// `standard_clean_edges` plus removal of unlabeled, observed orphans.
    pub fn simple_clean(&mut self) -> usize {
        let mut removed = self.standard_clean_edges();
        let orphans: Vec<NodeIndex> = self
            .nodes()
            .filter(|&n| {
                let node = &self.graph[n];
                self.degree(n) == 0 && !node.is_labeled() && !node.invented
            })
            .collect();
        for n in orphans {
            self.remove_node(n);
            removed += 1;
        }
        removed
    }

    pub fn positions(&self, nodes: &[NodeIndex]) -> Vec<Point> {
        nodes.iter().map(|&n| self.position(n)).collect()
    }

    pub fn cluster_centroid(&self, nodes: &[NodeIndex]) -> Point {
        centroid(&self.positions(nodes)).unwrap_or_default()
    }

    /// Labeled beats unlabeled, observed beats invented, then lowest id.
    pub fn pick_survivor(&self, nodes: &[NodeIndex]) -> NodeIndex {
        *nodes
            .iter()
            .min_by_key(|&&n| {
                let node = &self.graph[n];
                (!node.is_labeled(), node.invented, n.index())
            })
            .unwrap_or(&nodes[0])
    }

    fn max_pairwise_distance(&self, nodes: &[NodeIndex]) -> f64 {
        let pts = self.positions(nodes);
        let mut best = 0.0f64;
        for (i, p) in pts.iter().enumerate() {
            for q in &pts[i + 1..] {
                best = best.max(p.distance(*q));
            }
        }
        best
    }

    fn proximity_clusters(&self, threshold: f64) -> Vec<Vec<NodeIndex>> {
        let nodes: Vec<NodeIndex> = self.nodes().collect();
        let mut parent: Vec<usize> = (0..nodes.len()).collect();

        fn find(parent: &mut [usize], mut i: usize) -> usize {
            while parent[i] != i {
                parent[i] = parent[parent[i]];
                i = parent[i];
            }
            i
        }

        for i in 0..nodes.len() {
            for j in i + 1..nodes.len() {
                if self.position(nodes[i]).distance(self.position(nodes[j])) < threshold {
                    let (ri, rj) = (find(&mut parent, i), find(&mut parent, j));
                    if ri != rj {
                        parent[rj] = ri;
                    }
                }
            }
        }

        let mut clusters: HashMap<usize, Vec<NodeIndex>> = HashMap::new();
        for i in 0..nodes.len() {
            let root = find(&mut parent, i);
            clusters.entry(root).or_default().push(nodes[i]);
        }
        let mut out: Vec<Vec<NodeIndex>> =
            clusters.into_values().filter(|c| c.len() > 1).collect();
        out.sort_by_key(|c| c[0].index());
        out
    }

    fn best_intersection(&self, cluster: &[NodeIndex], threshold: f64) -> Option<Point> {
        let lines: Vec<Segment> = cluster
            .iter()
            .flat_map(|&n| {
                self.graph.edges(n).filter_map(move |e| {
                    let other = if e.source() == n { e.target() } else { e.source() };
                    if cluster.contains(&other) {
                        None
                    } else {
                        Some(Segment::new(self.position(other), self.position(n)))
                    }
                })
            })
            .collect();
        if lines.len() < 2 {
            return None;
        }
        let center = self.cluster_centroid(cluster);
        let reach = self.max_pairwise_distance(cluster) + threshold;
        let tolerance = threshold * 0.5;

        let mut best: Option<(usize, f64, Point)> = None;
        for (i, l1) in lines.iter().enumerate() {
            for l2 in &lines[i + 1..] {
                if l1.angle_to(l2) < 0.25 {
                    continue;
                }
                let Some((p, _, _)) = l1.line_intersection(l2) else {
                    continue;
                };
                let d = p.distance(center);
                if d > reach {
                    continue;
                }
                let support = lines
                    .iter()
                    .filter(|l| l.line_distance(p) <= tolerance)
                    .count();
                let better = match best {
                    None => true,
                    Some((s, bd, _)) => support > s || (support == s && d < bd),
                };
                if better {
                    best = Some((support, d, p));
                }
            }
        }
        best.map(|(_, _, p)| p)
    }

    fn find_crossing<F>(&self, min_fraction: f64, filter: &F) -> Option<(EdgeIndex, EdgeIndex, Point)>
    where
        F: Fn(&Edge) -> bool,
    {
        let edges: Vec<(EdgeIndex, NodeIndex, NodeIndex, Segment)> = self
            .edges()
            .filter(|&e| filter(&self.graph[e]))
            .filter_map(|e| {
                let (a, b) = self.endpoints(e)?;
                Some((e, a, b, self.edge_segment(e)?))
            })
            .collect();
        for (i, (e1, a1, b1, s1)) in edges.iter().enumerate() {
            for (e2, a2, b2, s2) in &edges[i + 1..] {
                if a1 == a2 || a1 == b2 || b1 == a2 || b1 == b2 {
                    continue;
                }
                let Some((p, t, u)) = s1.line_intersection(s2) else {
                    continue;
                };
                let lo = min_fraction;
                let hi = 1.0 - min_fraction;
                if t >= lo && t <= hi && u >= lo && u <= hi {
                    return Some((*e1, *e2, p));
                }
            }
        }
        None
    }
}

impl std::fmt::Debug for MolecularGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MolecularGraph")
            .field("node_count", &self.node_count())
            .field("edge_count", &self.edge_count())
            .field("average_bond_length", &self.average_bond_length())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bond::BondOrder;
    use crate::element::Element;

    fn path(points: &[(f64, f64)]) -> (MolecularGraph, Vec<NodeIndex>) {
        let mut g = MolecularGraph::new();
        let nodes: Vec<NodeIndex> = points
            .iter()
            .map(|&(x, y)| g.add_node(Node::new(Point::new(x, y))))
            .collect();
        for w in nodes.windows(2) {
            g.add_edge(w[0], w[1], Edge::single());
        }
        (g, nodes)
    }

    #[test]
    fn add_edge_refuses_self_loop() {
        let mut g = MolecularGraph::new();
        let a = g.add_node(Node::new(Point::new(0.0, 0.0)));
        assert!(g.add_edge(a, a, Edge::single()).is_none());
        assert_eq!(g.edge_count(), 0);
    }

    #[test]
    fn remove_node_cascades_edges() {
        let (mut g, n) = path(&[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0)]);
        g.remove_node(n[1]);
        assert_eq!(g.node_count(), 2);
        assert_eq!(g.edge_count(), 0);
    }

    #[test]
    fn average_bond_length_tracks_mutations() {
        let (mut g, n) = path(&[(0.0, 0.0), (1.0, 0.0), (3.0, 0.0)]);
        assert!((g.average_bond_length() - 1.5).abs() < 1e-9);
        g.set_position(n[2], Point::new(2.0, 0.0));
        assert!((g.average_bond_length() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn merge_cluster_reduces_count_by_k_minus_one() {
        let mut g = MolecularGraph::new();
        let hub: Vec<NodeIndex> = [(10.0, 10.0), (10.1, 10.0), (10.0, 10.1)]
            .iter()
            .map(|&(x, y)| g.add_node(Node::new(Point::new(x, y))))
            .collect();
        let far: Vec<NodeIndex> = [(0.0, 10.0), (20.0, 10.0), (10.0, 0.0)]
            .iter()
            .map(|&(x, y)| g.add_node(Node::new(Point::new(x, y))))
            .collect();
        for (&h, &f) in hub.iter().zip(&far) {
            g.add_edge(h, f, Edge::single());
        }
        g.add_edge(hub[0], hub[1], Edge::single());

        let before = g.node_count();
        let report = g.merge_nodes_closer_than(0.2, MergePosition::Centroid);
        assert_eq!(report.merged, 2);
        assert_eq!(g.node_count(), before - 2);
        let keep = report.survivors[0];
        let mut nbrs: Vec<NodeIndex> = g.neighbors(keep).collect();
        nbrs.sort();
        let mut expected = far.clone();
        expected.sort();
        assert_eq!(nbrs, expected);
    }

    #[test]
    fn merge_keeps_higher_order_duplicate() {
        let mut g = MolecularGraph::new();
        let a = g.add_node(Node::new(Point::new(0.0, 0.0)));
        let b = g.add_node(Node::new(Point::new(0.05, 0.0)));
        let c = g.add_node(Node::new(Point::new(5.0, 0.0)));
        g.add_edge(a, c, Edge::single());
        g.add_edge(b, c, Edge::new(BondOrder::Double));
        g.merge_nodes_closer_than(0.1, MergePosition::Centroid);
        assert_eq!(g.edge_count(), 1);
        let e = g.edges().next().unwrap();
        assert_eq!(g.edge(e).order, BondOrder::Double);
    }

    #[test]
    fn spread_out_cluster_is_refused() {
        let (mut g, _) = path(&[
            (0.0, 0.0),
            (0.9, 0.0),
            (1.8, 0.0),
            (2.7, 0.0),
            (3.6, 0.0),
        ]);
        g.add_node(Node::new(Point::new(50.0, 0.0)));
        let far = g.add_node(Node::new(Point::new(60.0, 0.0)));
        let near = g.add_node(Node::new(Point::new(50.0, 10.0)));
        g.add_edge(far, near, Edge::single());
        let report = g.merge_nodes_closer_than_with(0.5, MergePosition::Centroid, 2.0);
        assert_eq!(report.merged, 0);
        assert_eq!(report.refused.len(), 1);
        assert!(report.refused[0].iter().all(|&n| g.node(n).too_close));
    }

    #[test]
    fn best_intersection_lands_on_crossing_lines() {
        let mut g = MolecularGraph::new();
        let a = g.add_node(Node::new(Point::new(-10.0, 0.0)));
        let b = g.add_node(Node::new(Point::new(10.0, 0.0)));
        let c = g.add_node(Node::new(Point::new(0.0, 10.0)));
        let m1 = g.add_node(Node::new(Point::new(-0.5, 0.0)));
        let m2 = g.add_node(Node::new(Point::new(0.5, 0.0)));
        let m3 = g.add_node(Node::new(Point::new(0.0, 0.8)));
        g.add_edge(a, m1, Edge::single());
        g.add_edge(b, m2, Edge::single());
        g.add_edge(c, m3, Edge::single());
        let report = g.merge_nodes_closer_than(0.2, MergePosition::BestIntersection);
        assert_eq!(report.merged, 2);
        let p = g.position(report.survivors[0]);
        assert!(p.distance(Point::new(0.0, 0.0)) < 1e-6, "{p:?}");
    }

    #[test]
    fn merge_all_inside_shape() {
        let (mut g, n) = path(&[(0.0, 0.0), (10.0, 0.0), (10.5, 0.5), (20.0, 0.0)]);
        let shape = Shape::circle(Point::new(10.2, 0.2), 1.0, 12);
        let keep = g
            .merge_all_nodes_inside(&shape, 0.0, |_, _| true, |_, _| Point::new(10.2, 0.2))
            .unwrap();
        assert!(keep == n[1] || keep == n[2]);
        assert_eq!(g.node_count(), 3);
        assert_eq!(g.degree(keep), 2);
        assert_eq!(g.position(keep), Point::new(10.2, 0.2));
    }

    #[test]
    fn crossing_lines_get_a_node() {
        let (mut g, _) = path(&[(0.0, 0.0), (10.0, 10.0)]);
        let c = g.add_node(Node::new(Point::new(0.0, 10.0)));
        let d = g.add_node(Node::new(Point::new(10.0, 0.0)));
        g.add_edge(c, d, Edge::single());
        let mut created = Vec::new();
        let n = g.create_nodes_on_intersecting_lines(0.1, |_| true, |_, idx| created.push(idx));
        assert_eq!(n, 1);
        assert_eq!(g.degree(created[0]), 4);
        assert_eq!(g.edge_count(), 4);
        assert!(g.position(created[0]).distance(Point::new(5.0, 5.0)) < 1e-9);
    }

    #[test]
    fn clean_is_idempotent_and_removes_duplicates() {
        let (mut g, n) = path(&[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0)]);
        g.add_edge(n[1], n[0], Edge::new(BondOrder::Triple));
        g.add_node(Node::new(Point::new(9.0, 9.0)));
        g.add_node(Node::new(Point::new(9.0, 0.0)).with_element(Element::Na));
        g.simple_clean();
        let edges_once = g.edge_count();
        let nodes_once = g.node_count();
        assert_eq!(edges_once, 2);
        assert_eq!(nodes_once, 4);
        assert_eq!(g.simple_clean(), 0);
        assert_eq!(g.edge_count(), edges_once);
        let e = g.edge_between(n[0], n[1]).unwrap();
        assert_eq!(g.edge(e).order, BondOrder::Triple);
    }

    #[test]
    fn zero_length_edge_is_collapsed() {
        let (mut g, _) = path(&[(0.0, 0.0), (0.0, 0.0), (1.0, 0.0)]);
        g.standard_clean_edges();
        assert_eq!(g.node_count(), 2);
        assert_eq!(g.edge_count(), 1);
    }

    #[test]
    fn reverse_edge_swaps_endpoints() {
        let (mut g, n) = path(&[(0.0, 0.0), (1.0, 0.0)]);
        let e = g.edges().next().unwrap();
        let r = g.reverse_edge(e).unwrap();
        assert_eq!(g.endpoints(r), Some((n[1], n[0])));
    }
}
