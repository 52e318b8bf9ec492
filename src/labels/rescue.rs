//! Second-chance OCR for labels the first pass missed.

use tracing::{debug, trace};

use crate::bitmap::Bitmap;
use crate::collab::{GlyphClassifier, LabelInterpreter};
use crate::config::LabelConfig;
use crate::geom::{Bounds, Point, Shape};

use super::classify::classify_shape;
use super::{Glyph, LabelSet, LabelToken};

/// Widening factor for a capture window that has not settled yet.
const CAPTURE_GROWTH: f64 = 1.3;
/// Width over height of the widest single glyph.
const MAX_GLYPH_ASPECT: f64 = 1.5;

/// An unlabeled degree-one node and the unit direction pointing away from
/// its only neighbour.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Terminal {
    pub position: Point,
    pub direction: Point,
}

fn single_link_clusters(points: &[Point], radius: f64) -> Vec<Vec<Point>> {
    let mut cluster_of: Vec<Option<usize>> = vec![None; points.len()];
    let mut clusters: Vec<Vec<Point>> = Vec::new();
    for i in 0..points.len() {
        if cluster_of[i].is_some() {
            continue;
        }
        let id = clusters.len();
        let mut members = Vec::new();
        let mut stack = vec![i];
        cluster_of[i] = Some(id);
        while let Some(cur) = stack.pop() {
            members.push(points[cur]);
            for j in 0..points.len() {
                if cluster_of[j].is_none() && points[cur].distance(points[j]) <= radius {
                    cluster_of[j] = Some(id);
                    stack.push(j);
                }
            }
        }
        clusters.push(members);
    }
    clusters
}

/// Re-classifies dense, compact clusters of unmatched line endpoints.
/// Characters drawn with strokes ("N", "H") often vectorize into short
/// lines that end close together.
pub fn rescue_glyphs(
    endpoints: &[Point],
    classifier: &dyn GlyphClassifier,
    binary: &Bitmap,
    abl: f64,
    cfg: &LabelConfig,
) -> Vec<Glyph> {
    if abl <= 0.0 {
        return Vec::new();
    }
    let radius = abl * cfg.rescue_radius_ratio;
    let max_area = abl * abl * cfg.rescue_max_area_ratio;
    let mut rescued = Vec::new();
    for cluster in single_link_clusters(endpoints, radius) {
        if cluster.len() < cfg.rescue_min_endpoints {
            continue;
        }
        let Some(hull) = Shape::from_points(&cluster) else {
            continue;
        };
        if hull.area() > max_area || hull.area() <= 0.0 {
            continue;
        }
        let region = hull.grow(abl * 0.05);
        let height = region.bounds().height();
        if let Some(glyph) = classify_shape(classifier, &region, binary, height, cfg) {
            if glyph.tag.is_text() && glyph.ch().is_ascii_alphabetic() {
                rescued.push(glyph);
            }
        }
    }
    debug!(rescued = rescued.len(), "rescued glyphs from endpoint clusters");
    rescued
}

/// Grows a window ahead of `terminal` over the stroke `endpoints` it
/// catches, re-centring on them each round, until their extent settles on
/// something glyph-sized.
pub fn grow_capture(terminal: &Terminal, endpoints: &[Point], abl: f64, cfg: &LabelConfig) -> Option<Shape> {
    if abl <= 0.0 {
        return None;
    }
    let (min_size, max_size) = (abl * cfg.capture_min_glyph_ratio, abl * cfg.max_glyph_size_ratio);
    let ahead: Vec<Point> = endpoints
        .iter()
        .copied()
        .filter(|&p| (p - terminal.position).dot(terminal.direction) > 1.0)
        .collect();
    let mut centre = terminal.position + terminal.direction * (abl * cfg.capture_ratio);
    let mut half = abl * cfg.capture_ratio * 0.5;
    for round in 0..cfg.capture_max_rounds {
        let window = Bounds {
            min_x: centre.x - half,
            min_y: centre.y - half,
            max_x: centre.x + half,
            max_y: centre.y + half,
        };
        let caught: Vec<Point> = ahead.iter().copied().filter(|&p| window.contains(p)).collect();
        if let Some(extent) = Bounds::from_points(&caught) {
            let size = extent.width().max(extent.height());
            let glyph_like = caught.len() >= cfg.rescue_min_endpoints
                && (min_size..=max_size).contains(&size)
                && extent.width() <= extent.height().max(1.0) * MAX_GLYPH_ASPECT;
            if glyph_like && extent.center().distance(centre) <= 1.0 {
                return Some(Shape::rectangle(extent).grow(abl * 0.05));
            }
            centre = extent.center();
        }
        half *= CAPTURE_GROWTH;
        trace!(round, x = centre.x, y = centre.y, half, "grew capture window");
    }
    None
}

/// Looks for an unread region just beyond each unlabeled terminal and
/// classifies it as a one-glyph label. Terminals with no such region fall
/// back to a capture window grown over nearby stroke endpoints.
#[allow(clippy::too_many_arguments)]
pub fn rescue_terminals(
    terminals: &[Terminal],
    regions: &[Shape],
    endpoints: &[Point],
    labels: &LabelSet,
    classifier: &dyn GlyphClassifier,
    interpreter: &dyn LabelInterpreter,
    binary: &Bitmap,
    abl: f64,
    cfg: &LabelConfig,
) -> Vec<LabelToken> {
    if abl <= 0.0 {
        return Vec::new();
    }
    let reach = abl * cfg.capture_ratio;
    let max_size = abl * cfg.max_glyph_size_ratio;
    let mut used = vec![false; regions.len()];
    let mut tokens = Vec::new();
    for t in terminals {
        let candidate = regions
            .iter()
            .enumerate()
            .filter(|(i, r)| {
                let b = r.bounds();
                !used[*i]
                    && b.width().max(b.height()) <= max_size
                    && r.distance_to(t.position) <= reach
                    && (r.centroid() - t.position).dot(t.direction) > 0.0
                    && !labels.covers(r)
            })
            .min_by(|(_, a), (_, b)| {
                a.distance_to(t.position)
                    .total_cmp(&b.distance_to(t.position))
            });
        let readable = |shape: &Shape| {
            let height = shape.bounds().height();
            classify_shape(classifier, shape, binary, height, cfg)
                .filter(|g| g.tag.is_text() && interpreter.interpret(&g.ch().to_string()).is_some())
        };
        let mut glyph = None;
        if let Some((i, region)) = candidate {
            glyph = readable(region);
            used[i] = glyph.is_some();
        }
        if glyph.is_none() {
            glyph = grow_capture(t, endpoints, abl, cfg)
                .filter(|shape| {
                    !labels.covers(shape) && !tokens.iter().any(|k: &LabelToken| k.shape.contains(shape.centroid()))
                })
                .and_then(|shape| readable(&shape));
        }
        let Some(glyph) = glyph else {
            continue;
        };
        tokens.extend(LabelToken::from_glyphs(&[&glyph]));
    }
    debug!(terminals = terminals.len(), rescued = tokens.len(), "rescued terminal labels");
    tokens
}
