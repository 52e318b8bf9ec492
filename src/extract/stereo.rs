//! Wedge detection from stroke thickness, and stereo bond orientation.

use petgraph::stable_graph::EdgeIndex;
use tracing::{debug, trace};

use crate::bitmap::Bitmap;
use crate::bond::BondOrder;
use crate::config::StereoConfig;
use crate::geom::{Point, Segment, Shape};
use crate::mol::MolecularGraph;

use super::context::ReconstructionContext;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThicknessProfile {
    /// Correlation between position along the edge and stroke thickness.
    /// Positive when the stroke widens towards the second endpoint.
    pub correlation: f64,
    /// Wide-end over narrow-end mean thickness.
    pub ratio: f64,
    /// Share of samples that found ink.
    pub fill: f64,
}

fn pearson(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len() as f64;
    let (mx, my) = (xs.iter().sum::<f64>() / n, ys.iter().sum::<f64>() / n);
    let mut cov = 0.0;
    let mut vx = 0.0;
    let mut vy = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        cov += (x - mx) * (y - my);
        vx += (x - mx).powi(2);
        vy += (y - my).powi(2);
    }
    if vx <= 0.0 || vy <= 0.0 {
        return 0.0;
    }
    cov / (vx * vy).sqrt()
}

/// Samples stroke thickness across `seg` away from its ends. `None` when
/// too few samples land on ink.
pub fn thickness_profile(binary: &Bitmap, seg: &Segment, reach: f64, samples: usize) -> Option<ThicknessProfile> {
    let samples = samples.max(3);
    let normal = seg.direction().perpendicular();
    let ts: Vec<f64> = (0..samples)
        .map(|i| 0.15 + 0.7 * i as f64 / (samples - 1) as f64)
        .collect();
    let widths: Vec<f64> = ts
        .iter()
        .map(|&t| binary.stroke_thickness(seg.point_at(t), normal, reach))
        .collect();
    let inked = widths.iter().filter(|&&w| w > 0.0).count();
    if inked * 2 < samples {
        return None;
    }
    let correlation = pearson(&ts, &widths);
    let third = (samples / 3).max(1);
    let head = widths[..third].iter().sum::<f64>() / third as f64;
    let tail = widths[samples - third..].iter().sum::<f64>() / third as f64;
    let (narrow, wide) = if correlation >= 0.0 { (head, tail) } else { (tail, head) };
    Some(ThicknessProfile {
        correlation,
        ratio: if narrow > 0.0 { wide / narrow } else { 0.0 },
        fill: inked as f64 / samples as f64,
    })
}

const CLIP_STEPS: usize = 20;

/// The part of `seg` outside every label shape. `None` when the middle of
/// the segment is inside a label.
fn outside_labels(seg: &Segment, labels: &[Shape]) -> Option<Segment> {
    if labels.iter().any(|l| l.contains(seg.midpoint())) {
        return None;
    }
    let clip = |from: Point, to: Point| {
        match labels.iter().find(|l| l.contains(from)) {
            Some(label) => (1..=CLIP_STEPS)
                .map(|i| from.lerp(to, 0.5 * i as f64 / CLIP_STEPS as f64))
                .find(|&p| !label.contains(p))
                .unwrap_or(from),
            None => from,
        }
    };
    Some(Segment::new(clip(seg.a, seg.b), clip(seg.b, seg.a)))
}

/// Marks widening single bonds outside labels as wedges, then orients
/// every stereo bond so its first endpoint is the narrow end or the
/// stereocentre. Label ink is kept out of the thickness samples.
pub fn assign_stereo(graph: &mut MolecularGraph, binary: &Bitmap, labels: &[Shape], cfg: &StereoConfig) -> usize {
    let abl = graph.average_bond_length();
    if abl <= 0.0 {
        return 0;
    }
    let reach = abl * cfg.thickness_reach_ratio;
    let candidates: Vec<EdgeIndex> = graph
        .edges()
        .filter(|&e| {
            let edge = graph.edge(e);
            edge.order == BondOrder::Single && !edge.invented && !edge.is_stereo()
        })
        .collect();
    let mut wedges = 0;
    for e in candidates {
        let Some(seg) = graph.edge_segment(e).and_then(|s| outside_labels(&s, labels)) else {
            continue;
        };
        let Some(profile) = thickness_profile(binary, &seg, reach, cfg.samples) else {
            continue;
        };
        if profile.correlation.abs() < cfg.wedge_min_correlation
            || profile.ratio < cfg.wedge_min_ratio
            || profile.fill < cfg.wedge_min_fill
        {
            continue;
        }
        graph.edge_mut(e).wedge = true;
        if profile.correlation < 0.0 {
            graph.reverse_edge(e);
        }
        trace!(?e, ratio = profile.ratio, "found wedge bond");
        wedges += 1;
    }

    let dashed: Vec<EdgeIndex> = graph.edges().filter(|&e| graph.edge(e).dashed).collect();
    for e in dashed {
        let Some((a, b)) = graph.endpoints(e) else { continue };
        if graph.degree(a) == 1 && graph.degree(b) > 1 {
            graph.reverse_edge(e);
            trace!(?e, "oriented dashed bond from its stereocentre");
        }
    }
    wedges
}

pub fn assign(ctx: &mut ReconstructionContext<'_>) -> usize {
    let labels: Vec<Shape> = ctx.labels.tokens.iter().map(|t| t.shape.clone()).collect();
    let wedges = assign_stereo(&mut ctx.graph, ctx.binary, &labels, &ctx.config.stereo);
    debug!(wedges, "assigned stereo bonds");
    wedges
}
