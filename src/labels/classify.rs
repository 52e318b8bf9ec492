use rayon::prelude::*;
use tracing::{debug, trace};

use crate::bitmap::Bitmap;
use crate::cancel::CancelToken;
use crate::collab::GlyphClassifier;
use crate::config::LabelConfig;
use crate::error::ExtractError;
use crate::geom::{Bounds, Shape};

use super::glyph::{is_box_like, rerank, tag};
use super::Glyph;

struct Outcome {
    glyph: Option<Glyph>,
    /// Two glyphs that each beat the whole region's best match.
    split: Option<[Glyph; 2]>,
}

fn pixel_size(b: &Bounds) -> (f64, f64) {
    (b.width() + 1.0, b.height() + 1.0)
}

pub(crate) fn median(mut values: Vec<f64>) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(f64::total_cmp);
    values[values.len() / 2]
}

fn halves(shape: &Shape) -> (Shape, Shape) {
    let b = shape.bounds();
    let mid = (b.min_x + b.max_x) / 2.0;
    let left = Bounds { max_x: mid, ..b };
    let right = Bounds { min_x: mid, ..b };
    (Shape::rectangle(left), Shape::rectangle(right))
}

pub(crate) fn classify_shape(
    classifier: &dyn GlyphClassifier,
    shape: &Shape,
    binary: &Bitmap,
    median_height: f64,
    cfg: &LabelConfig,
) -> Option<Glyph> {
    let pixels = binary.crop(&shape.bounds());
    let mut matches = classifier.best_matches(shape, &pixels, cfg.top_k);
    if matches.is_empty() {
        return None;
    }
    rerank(&mut matches, is_box_like(shape, &pixels, cfg), cfg);
    matches.truncate(cfg.top_k.max(1));
    if matches[0].confidence < cfg.min_confidence {
        return None;
    }
    let tag = tag(matches[0].glyph, shape, median_height, cfg);
    Some(Glyph {
        shape: shape.clone(),
        matches,
        tag,
    })
}

fn classify_region(
    classifier: &dyn GlyphClassifier,
    shape: &Shape,
    binary: &Bitmap,
    median_height: f64,
    cfg: &LabelConfig,
) -> Outcome {
    let glyph = classify_shape(classifier, shape, binary, median_height, cfg);
    let (w, h) = pixel_size(&shape.bounds());
    let split = if w / h > cfg.split_aspect_ratio {
        let whole = glyph.as_ref().map_or(0.0, |g| g.best().confidence);
        let (l, r) = halves(shape);
        match (
            classify_shape(classifier, &l, binary, median_height, cfg),
            classify_shape(classifier, &r, binary, median_height, cfg),
        ) {
            (Some(l), Some(r)) if l.best().confidence > whole && r.best().confidence > whole => {
                Some([l, r])
            }
            _ => None,
        }
    } else {
        None
    };
    Outcome { glyph, split }
}

/// Classifies every glyph-sized region in parallel. Splits proposed by
/// individual regions are applied once all regions are done.
pub fn classify_regions(
    classifier: &dyn GlyphClassifier,
    regions: &[Shape],
    binary: &Bitmap,
    scale: f64,
    cfg: &LabelConfig,
    cancel: &CancelToken,
) -> Result<Vec<Glyph>, ExtractError> {
    let max_size = if scale > 0.0 {
        scale * cfg.max_glyph_size_ratio
    } else {
        f64::INFINITY
    };
    let candidates: Vec<&Shape> = regions
        .iter()
        .filter(|s| {
            let (w, h) = pixel_size(&s.bounds());
            w * h >= cfg.min_region_area && w.max(h) <= max_size
        })
        .collect();
    let median_height = median(candidates.iter().map(|s| pixel_size(&s.bounds()).1).collect());

    let outcomes: Vec<Option<Outcome>> = candidates
        .par_iter()
        .map(|shape| {
            if cancel.is_cancelled() {
                return None;
            }
            Some(classify_region(classifier, shape, binary, median_height, cfg))
        })
        .collect();
    cancel.check()?;

    let mut glyphs = Vec::with_capacity(outcomes.len());
    let mut splits = 0usize;
    for outcome in outcomes.into_iter().flatten() {
        match outcome.split {
            Some([l, r]) => {
                trace!(left = %l.ch(), right = %r.ch(), "split region into two glyphs");
                splits += 1;
                glyphs.push(l);
                glyphs.push(r);
            }
            None => glyphs.extend(outcome.glyph),
        }
    }
    debug!(
        candidates = candidates.len(),
        glyphs = glyphs.len(),
        splits,
        "classified regions"
    );
    Ok(glyphs)
}
