//! Joining labels to the line graph: grounding tokens as atoms, recovering
//! bonds that stop at a label, and expanding abbreviations into atoms.

use std::collections::HashSet;
use std::f64::consts::PI;

use petgraph::stable_graph::NodeIndex;
use tracing::{debug, trace};

use crate::atom::Node;
use crate::bond::Edge;
use crate::config::GraphConfig;
use crate::fragment::{Fragment, Interpretation};
use crate::geom::{Point, Shape};
use crate::mol::MolecularGraph;
use crate::segments::line_support;

use super::context::ReconstructionContext;

const CLIP_STEPS: usize = 24;

/// Fuses the bond ends around every interpretable token into one labeled
/// node at the token centre. Tokens no bond reaches become isolated nodes.
pub fn ground_labels(ctx: &mut ReconstructionContext<'_>) -> usize {
    let abl = ctx.abl();
    let reach = abl * ctx.config.graph.label_capture_ratio;
    let mut grounded = 0;
    for (k, token) in ctx.labels.tokens.iter().enumerate() {
        let Some(interpretation) = ctx.interpreter.interpret(&token.text) else {
            continue;
        };
        let (element, charge) = match &interpretation {
            Interpretation::Atom { element, charge } => (*element, *charge),
            Interpretation::Fragment(f) => (f.root().element, f.root().charge),
        };
        let centre = token.shape.centroid();
        let node = ctx
            .graph
            .merge_all_nodes_inside(
                &token.shape,
                reach,
                |_, n| n.group.is_none() || n.group == Some(k),
                |_, _| centre,
            )
            .unwrap_or_else(|| ctx.graph.add_node(Node::new(centre)));
        let n = ctx.graph.node_mut(node);
        n.element = element;
        n.charge = charge;
        n.group = Some(k);
        trace!(text = %token.text, ?node, "grounded label");
        grounded += 1;
    }
    ctx.graph.standard_clean_edges();
    debug!(grounded, nodes = ctx.graph.node_count(), edges = ctx.graph.edge_count(), "grounded labels");
    grounded
}

/// First point on the way from `from` to `to` that lies outside `shape`.
fn leave(shape: &Shape, from: Point, to: Point) -> Point {
    (0..=CLIP_STEPS)
        .map(|i| from.lerp(to, i as f64 / CLIP_STEPS as f64))
        .find(|&p| !shape.contains(p))
        .unwrap_or(to)
}

/// The bond a gap with this line coverage stands for: solid when well
/// covered, dashed when only broken strokes cross it.
pub fn missing_bond(support: f64, cfg: &GraphConfig) -> Option<Edge> {
    if support >= cfg.missing_bond_support {
        Some(Edge::single())
    } else if support >= cfg.missing_bond_dashed_support {
        Some(Edge::dashed())
    } else {
        None
    }
}

/// Adds bonds between a labeled node and nearby atoms when detected lines
/// cover enough of the gap between them. Bond lines often stop short of a
/// label and are lost to the capture radius.
pub fn add_missing_bonds(ctx: &mut ReconstructionContext<'_>) -> usize {
    let abl = ctx.abl();
    if abl <= 0.0 {
        return 0;
    }
    let lines = ctx.support_lines();
    let tol = ctx.support_tolerance();
    let cfg = &ctx.config.graph;
    let max_dist = abl * cfg.missing_bond_max_ratio;

    let labeled: Vec<(NodeIndex, usize)> = ctx
        .graph
        .nodes()
        .filter_map(|n| ctx.graph.node(n).group.map(|g| (n, g)))
        .collect();
    let mut added = 0;
    for (l, group) in labeled {
        let Some(shape) = ctx.labels.tokens.get(group).map(|t| t.shape.clone()) else {
            continue;
        };
        let origin = ctx.graph.position(l);
        let candidates: Vec<NodeIndex> = ctx
            .graph
            .nodes()
            .filter(|&n| n != l && ctx.graph.node(n).group != Some(group))
            .filter(|&n| ctx.graph.edge_between(l, n).is_none())
            .filter(|&n| ctx.graph.position(n).distance(origin) <= max_dist)
            .collect();
        for n in candidates {
            let target = ctx.graph.position(n);
            let start = leave(&shape, origin, target);
            let end = match ctx.graph.node(n).group.and_then(|g| ctx.labels.tokens.get(g)) {
                Some(other) => leave(&other.shape, target, origin),
                None => target,
            };
            let support = line_support(&lines, start, end, tol);
            let Some(edge) = missing_bond(support, cfg) else {
                continue;
            };
            let dashed = edge.dashed;
            if ctx.graph.add_edge(l, n, edge).is_some() {
                trace!(?l, ?n, support, dashed, "added missing bond");
                added += 1;
            }
        }
    }
    debug!(added, edges = ctx.graph.edge_count(), "added missing bonds");
    added
}

/// Expands every grounded abbreviation into invented atoms and bonds.
pub fn expand_fragments(ctx: &mut ReconstructionContext<'_>) -> usize {
    let abl = ctx.abl();
    let mut seen = HashSet::new();
    let anchors: Vec<(NodeIndex, usize)> = ctx
        .graph
        .nodes()
        .filter(|&n| !ctx.graph.node(n).invented)
        .filter_map(|n| ctx.graph.node(n).group.map(|g| (n, g)))
        .filter(|&(_, g)| seen.insert(g))
        .collect();
    let mut expanded = 0;
    for (anchor, group) in anchors {
        let Some(Interpretation::Fragment(fragment)) = ctx.interpretation(group) else {
            continue;
        };
        let step = if abl > 0.0 {
            abl
        } else {
            ctx.labels
                .tokens
                .get(group)
                .map_or(1.0, |t| t.shape.bounds().height().max(1.0))
        };
        materialize(&mut ctx.graph, anchor, &fragment, group, step);
        expanded += 1;
    }
    debug!(expanded, nodes = ctx.graph.node_count(), edges = ctx.graph.edge_count(), "expanded fragments");
    expanded
}

/// Unit direction pointing away from the drawn neighbours of `anchor`.
fn outward(graph: &MolecularGraph, anchor: NodeIndex, drawn: &[NodeIndex]) -> Point {
    let origin = graph.position(anchor);
    let pull = drawn
        .iter()
        .map(|&n| (graph.position(n) - origin).normalize())
        .fold(Point::default(), |acc, d| acc + d);
    if pull.norm() > 1e-6 {
        (pull * -1.0).normalize()
    } else if let Some(&first) = drawn.first() {
        (graph.position(first) - origin).normalize().perpendicular()
    } else {
        Point::new(1.0, 0.0)
    }
}

/// Tree layout fanning children out around their parent's direction, then
/// regular polygons for ring closures.
fn layout(fragment: &Fragment, origin: Point, base: Point, step: f64) -> Vec<Point> {
    let atoms = fragment.atoms();
    let mut pos = vec![origin; atoms.len()];
    let mut dir = vec![base; atoms.len()];
    for i in 1..atoms.len() {
        let Some(p) = atoms[i].parent else { continue };
        let siblings: Vec<usize> = (1..atoms.len()).filter(|&j| atoms[j].parent == Some(p)).collect();
        let rank = siblings.iter().position(|&j| j == i).unwrap_or(0) as f64;
        let spread = (rank - (siblings.len() as f64 - 1.0) / 2.0) * PI / 3.0;
        dir[i] = dir[p].rotate(spread);
        pos[i] = pos[p] + dir[i] * step;
    }

    for (i, atom) in atoms.iter().enumerate() {
        let Some(r) = atom.ring_closure else { continue };
        let mut path = vec![i];
        let mut cur = i;
        while cur != r {
            match atoms[cur].parent {
                Some(p) => {
                    path.push(p);
                    cur = p;
                }
                None => break,
            }
        }
        if cur != r {
            continue;
        }
        path.reverse();
        let n = path.len() as f64;
        let radius = step / (2.0 * (PI / n).sin());
        let centre = pos[r] + dir[r] * radius;
        let back = dir[r] * -1.0;
        for (k, &atom_idx) in path.iter().enumerate().skip(1) {
            pos[atom_idx] = centre + back.rotate(k as f64 * 2.0 * PI / n) * radius;
        }
    }
    pos
}

/// Adds the fragment's atoms around `anchor`, which becomes the root. A
/// chain fragment between two drawn neighbours hands the second neighbour
/// to its last atom.
pub fn materialize(
    graph: &mut MolecularGraph,
    anchor: NodeIndex,
    fragment: &Fragment,
    group: usize,
    step: f64,
) -> Vec<NodeIndex> {
    let atoms = fragment.atoms();
    {
        let root = graph.node_mut(anchor);
        root.element = atoms[0].element;
        root.charge = atoms[0].charge;
        root.group = Some(group);
    }
    let drawn: Vec<NodeIndex> = graph.neighbors(anchor).collect();
    let origin = graph.position(anchor);
    let mut pos = layout(fragment, origin, outward(graph, anchor, &drawn), step);

    let absorb = fragment.chain_end().filter(|&end| end > 0 && drawn.len() >= 2);
    let receiver = absorb.and_then(|_| {
        drawn
            .iter()
            .copied()
            .max_by(|&a, &b| graph.position(a).x.total_cmp(&graph.position(b).x))
    });
    if let (Some(end), Some(nb)) = (absorb, receiver) {
        let target = graph.position(nb);
        for (k, p) in pos.iter_mut().enumerate().take(end + 1).skip(1) {
            *p = origin.lerp(target, k as f64 / (end + 1) as f64);
        }
    }

    let mut ids = Vec::with_capacity(atoms.len());
    ids.push(anchor);
    for (i, atom) in atoms.iter().enumerate().skip(1) {
        let mut node = Node::new(pos[i])
            .with_element(atom.element)
            .with_charge(atom.charge)
            .invented();
        node.group = Some(group);
        ids.push(graph.add_node(node));
    }
    for (i, atom) in atoms.iter().enumerate().skip(1) {
        let Some(p) = atom.parent else { continue };
        let edge = Edge {
            order: atom.order,
            wedge: atom.wedge,
            dashed: atom.dashed,
            aromatic: false,
            invented: true,
        };
        graph.add_edge(ids[p], ids[i], edge);
    }
    for (i, atom) in atoms.iter().enumerate() {
        if let Some(r) = atom.ring_closure {
            let edge = Edge {
                invented: true,
                ..Edge::single()
            };
            graph.add_edge(ids[i], ids[r], edge);
        }
    }

    if let (Some(end), Some(nb)) = (absorb, receiver) {
        if let Some(e) = graph.edge_between(anchor, nb) {
            if let Some(edge) = graph.remove_edge(e) {
                graph.add_edge(ids[end], nb, edge);
                trace!(?anchor, ?nb, "chain absorbed second neighbour");
            }
        }
    }
    ids
}
