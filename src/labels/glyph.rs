use crate::bitmap::Bitmap;
use crate::collab::GlyphMatch;
use crate::config::LabelConfig;
use crate::geom::{Point, Segment, Shape};

use super::GlyphTag;

/// Glyphs that OCR produces from bond fragments far more often than they
/// appear in real labels.
const CONFUSABLE: [char; 6] = ['K', 'W', 'X', 'V', 'k', 'w'];
const COMMON: [char; 3] = ['C', 'O', 'N'];
const BOX_DEMOTED: [char; 2] = ['S', 'O'];
const VERTICAL_STROKES: [char; 4] = ['|', 'l', 'I', '1'];

/// Nearly rectangular and densely filled, like a box or a blot.
pub fn is_box_like(shape: &Shape, pixels: &Bitmap, cfg: &LabelConfig) -> bool {
    let b = shape.bounds();
    let bounds_area = b.width() * b.height();
    let total = pixels.width() * pixels.height();
    if bounds_area <= 0.0 || total == 0 {
        return false;
    }
    let rectangularity = shape.area() / bounds_area;
    let fill = pixels.count_on() as f64 / total as f64;
    rectangularity >= 0.9 && fill >= cfg.box_fill_ratio
}

/// Deterministic re-ranking of classifier output.
pub fn rerank(matches: &mut [GlyphMatch], box_like: bool, cfg: &LabelConfig) {
    for m in matches.iter_mut() {
        if CONFUSABLE.contains(&m.glyph) {
            m.confidence -= cfg.confusable_penalty;
        }
        if COMMON.contains(&m.glyph) {
            m.confidence += cfg.common_bonus;
        }
        if box_like && BOX_DEMOTED.contains(&m.glyph) {
            m.confidence -= cfg.box_penalty;
        }
        m.confidence = m.confidence.clamp(0.0, 1.0);
    }
    matches.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
}

pub fn tag(glyph: char, shape: &Shape, median_height: f64, cfg: &LabelConfig) -> GlyphTag {
    let b = shape.bounds();
    let (w, h) = (b.width().max(1.0), b.height().max(1.0));
    if glyph == '-' && w / h >= cfg.stroke_aspect_ratio && w >= cfg.stroke_length_ratio * median_height {
        return GlyphTag::BondStroke;
    }
    if VERTICAL_STROKES.contains(&glyph)
        && h / w >= cfg.stroke_aspect_ratio
        && h >= cfg.stroke_length_ratio * median_height
    {
        return GlyphTag::VerticalStroke;
    }
    if glyph.is_ascii_digit() {
        GlyphTag::Numeric
    } else {
        GlyphTag::Chemistry
    }
}

/// The line a stroke glyph stands for.
pub fn stroke_segment(shape: &Shape, tag: GlyphTag) -> Option<Segment> {
    let b = shape.bounds();
    let c = b.center();
    match tag {
        GlyphTag::BondStroke => Some(Segment::new(Point::new(b.min_x, c.y), Point::new(b.max_x, c.y))),
        GlyphTag::VerticalStroke => Some(Segment::new(Point::new(c.x, b.min_y), Point::new(c.x, b.max_y))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Bounds;

    fn rect(w: f64, h: f64) -> Shape {
        Shape::rectangle(Bounds {
            min_x: 0.0,
            min_y: 0.0,
            max_x: w,
            max_y: h,
        })
    }

    #[test]
    fn confusable_glyphs_lose_to_common_ones() {
        let mut m = vec![GlyphMatch::new('K', 0.62), GlyphMatch::new('N', 0.55)];
        rerank(&mut m, false, &LabelConfig::default());
        assert_eq!(m[0].glyph, 'N');
    }

    #[test]
    fn box_demotes_o() {
        let mut m = vec![GlyphMatch::new('O', 0.7), GlyphMatch::new('D', 0.6)];
        rerank(&mut m, true, &LabelConfig::default());
        assert_eq!(m[0].glyph, 'D');
    }

    #[test]
    fn box_detection() {
        let cfg = LabelConfig::default();
        let mut full = Bitmap::new(10, 10);
        for y in 0..10 {
            for x in 0..10 {
                full.set(x, y, true);
            }
        }
        assert!(is_box_like(&rect(9.0, 9.0), &full, &cfg));
        assert!(!is_box_like(&rect(9.0, 9.0), &Bitmap::new(10, 10), &cfg));
    }

    #[test]
    fn strokes_are_tagged() {
        let cfg = LabelConfig::default();
        assert_eq!(tag('-', &rect(30.0, 2.0), 10.0, &cfg), GlyphTag::BondStroke);
        assert_eq!(tag('-', &rect(6.0, 2.0), 10.0, &cfg), GlyphTag::Chemistry);
        assert_eq!(tag('l', &rect(2.0, 30.0), 10.0, &cfg), GlyphTag::VerticalStroke);
        assert_eq!(tag('2', &rect(6.0, 8.0), 10.0, &cfg), GlyphTag::Numeric);
        assert_eq!(tag('N', &rect(8.0, 10.0), 10.0, &cfg), GlyphTag::Chemistry);
        let seg = stroke_segment(&rect(30.0, 2.0), GlyphTag::BondStroke).unwrap();
        assert_eq!(seg.length(), 30.0);
    }
}
