use petgraph::stable_graph::NodeIndex;
use tracing::debug;

use crate::element::Element;
use crate::geom::Point;
use crate::labels::rescue::{rescue_glyphs, rescue_terminals, Terminal};
use crate::labels::LabelToken;
use crate::mol::MolecularGraph;

use super::context::ReconstructionContext;

/// Unlabeled carbon ends of the graph, pointing away from their neighbour.
pub fn terminals(graph: &MolecularGraph) -> Vec<Terminal> {
    graph
        .nodes()
        .filter(|&n| {
            let node = graph.node(n);
            graph.degree(n) == 1 && !node.is_labeled() && !node.invented && node.element == Element::C
        })
        .filter_map(|n| {
            let nb = graph.neighbors(n).next()?;
            let position = graph.position(n);
            let direction = (position - graph.position(nb)).normalize();
            Some(Terminal { position, direction })
        })
        .collect()
}

/// Ends of edges short enough to be strokes of a character.
fn stroke_endpoints(graph: &MolecularGraph, max_len: f64) -> Vec<Point> {
    let mut ends: Vec<NodeIndex> = graph
        .edges()
        .filter(|&e| !graph.edge(e).invented && graph.edge_length(e) <= max_len)
        .filter_map(|e| graph.endpoints(e))
        .flat_map(|(a, b)| [a, b])
        .filter(|&n| !graph.node(n).is_labeled())
        .collect();
    ends.sort();
    ends.dedup();
    graph.positions(&ends)
}

/// Second OCR pass over regions or grown capture windows next to unlabeled
/// terminals, and over compact clusters of stroke ends. New tokens are
/// appended to the label set; returns how many were found.
pub fn rescue_unlabeled(ctx: &mut ReconstructionContext<'_>) -> usize {
    let abl = ctx.abl();
    if abl <= 0.0 {
        return 0;
    }
    let cfg = &ctx.config.labels;
    let endpoints = stroke_endpoints(&ctx.graph, abl * cfg.max_glyph_size_ratio);
    let mut found: Vec<LabelToken> = rescue_terminals(
        &terminals(&ctx.graph),
        ctx.regions,
        &endpoints,
        &ctx.labels,
        ctx.classifier,
        ctx.interpreter,
        ctx.binary,
        abl,
        cfg,
    );

    for glyph in rescue_glyphs(&endpoints, ctx.classifier, ctx.binary, abl, cfg) {
        if ctx.labels.covers(&glyph.shape) || found.iter().any(|t| t.shape.contains(glyph.shape.centroid())) {
            continue;
        }
        if ctx.interpreter.interpret(&glyph.ch().to_string()).is_none() {
            continue;
        }
        found.extend(LabelToken::from_glyphs(&[&glyph]));
        ctx.labels.glyphs.push(glyph);
    }

    let count = found.len();
    ctx.labels.tokens.extend(found);
    debug!(rescued = count, tokens = ctx.labels.tokens.len(), "rescued unlabeled atoms");
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::Node;
    use crate::bond::Edge;

    #[test]
    fn terminals_point_outward() {
        let mut g = MolecularGraph::new();
        let a = g.add_node(Node::new(Point::new(0.0, 0.0)));
        let b = g.add_node(Node::new(Point::new(20.0, 0.0)));
        let c = g.add_node(Node::new(Point::new(40.0, 0.0)).with_element(Element::O));
        g.add_edge(a, b, Edge::single());
        g.add_edge(b, c, Edge::single());
        let ts = terminals(&g);
        assert_eq!(ts.len(), 1);
        assert_eq!(ts[0].position, Point::new(0.0, 0.0));
        assert_eq!(ts[0].direction, Point::new(-1.0, 0.0));
    }
}
