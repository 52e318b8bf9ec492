use petgraph::stable_graph::NodeIndex;
use tracing::{debug, trace};

use crate::config::RepairConfig;
use crate::geom::Shape;
use crate::graph_ops::{component_average_bond_length, component_bounds, component_edge_count};
use crate::mol::MolecularGraph;

use super::context::ReconstructionContext;

fn unlabeled(graph: &MolecularGraph, component: &[NodeIndex]) -> bool {
    component.iter().all(|&n| {
        let node = graph.node(n);
        !node.is_labeled() && !node.invented
    })
}

/// Unlabeled minority components that are either specks, far smaller than
/// a bond, or drawn at a bond length the main structure does not share:
/// stray strokes, bits of arrows, frames.
pub fn noise_components(graph: &MolecularGraph, cfg: &RepairConfig) -> Vec<Vec<NodeIndex>> {
    let abl = graph.average_bond_length();
    let components = graph.disconnected_components();
    if abl <= 0.0 || components.len() < 2 {
        return Vec::new();
    }
    let Some(dominant) = components
        .iter()
        .enumerate()
        .max_by_key(|(_, c)| (component_edge_count(graph, c), c.len()))
        .map(|(i, _)| i)
    else {
        return Vec::new();
    };
    let reference = component_average_bond_length(graph, &components[dominant]).unwrap_or(abl);
    let max_extent = abl * cfg.noise_extent_ratio;
    let (low, high) = (reference * cfg.noise_abl_min, reference * cfg.noise_abl_max);
    components
        .into_iter()
        .enumerate()
        .filter(|&(i, _)| i != dominant)
        .map(|(_, c)| c)
        .filter(|c| unlabeled(graph, c))
        .filter(|c| {
            let speck = c.len() <= cfg.noise_max_nodes
                && component_bounds(graph, c).is_some_and(|b| b.width().hypot(b.height()) < max_extent);
            let off_scale = component_average_bond_length(graph, c).is_some_and(|l| l < low || l > high);
            if off_scale {
                trace!(size = c.len(), reference, "component drawn at another scale");
            }
            speck || off_scale
        })
        .collect()
}

/// Removes noise components. Their regions are returned when they carried
/// edges, since those edges skewed every ABL-relative threshold.
pub fn remove_noise(graph: &mut MolecularGraph, cfg: &RepairConfig) -> (usize, Vec<Shape>) {
    let mut removed = 0;
    let mut regions = Vec::new();
    for component in noise_components(graph, cfg) {
        if component_edge_count(graph, &component) > 0 {
            if let Some(shape) = Shape::from_points(&graph.positions(&component)) {
                regions.push(shape.grow(1.0));
            }
        }
        trace!(size = component.len(), "pruned noise component");
        for n in component {
            graph.remove_node(n);
            removed += 1;
        }
    }
    (removed, regions)
}

/// Prunes noise and blacklists its regions. Returns whether a rebuild is
/// needed.
pub fn prune_noise(ctx: &mut ReconstructionContext<'_>) -> bool {
    let (removed, regions) = remove_noise(&mut ctx.graph, &ctx.config.repair);
    let restart = !regions.is_empty();
    ctx.blacklist.extend(regions);
    debug!(removed, restart, blacklisted = ctx.blacklist.len(), "pruned noise");
    restart
}
