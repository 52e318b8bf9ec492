use std::f64::consts::PI;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use crabsketch::geom::Bounds;
use crabsketch::{
    BasicLabelInterpreter, Binarization, Bitmap, Extractor, GlyphClassifier, GlyphMatch, Point,
    PreprocessError, RasterPreprocessor, Segment, Shape,
};

/// Vector drawing served as if it had been vectorized from pixels.
struct Drawing {
    width: usize,
    height: usize,
    lines: Vec<Segment>,
    glyphs: Vec<Shape>,
}

impl RasterPreprocessor for Drawing {
    type Image = ();

    fn binarize_and_clean(&self, _image: &(), _strategy: Binarization) -> Result<Bitmap, PreprocessError> {
        let mut bitmap = Bitmap::new(self.width, self.height);
        for line in &self.lines {
            let steps = (line.length() * 2.0).ceil() as usize + 1;
            for i in 0..=steps {
                let p = line.point_at(i as f64 / steps as f64);
                bitmap.set(p.x.round() as usize, p.y.round() as usize, true);
            }
        }
        Ok(bitmap)
    }

    fn thin(&self, bitmap: &Bitmap) -> Bitmap {
        Bitmap::new(bitmap.width(), bitmap.height())
    }

    fn connected_components(&self, _bitmap: &Bitmap) -> Result<Vec<Shape>, PreprocessError> {
        Ok(self.glyphs.clone())
    }

    fn line_segments(&self, bitmap: &Bitmap) -> Vec<Segment> {
        if bitmap.count_on() == 0 {
            Vec::new()
        } else {
            self.lines.clone()
        }
    }
}

struct Oxygen;

impl GlyphClassifier for Oxygen {
    fn best_matches(&self, _shape: &Shape, _pixels: &Bitmap, _k: usize) -> Vec<GlyphMatch> {
        vec![GlyphMatch::new('O', 0.9)]
    }
}

fn hexagon(centre: Point, side: f64) -> Vec<Segment> {
    let vertex = |k: usize| {
        let a = (k as f64 * 60.0 + 30.0) * PI / 180.0;
        centre + Point::new(a.cos(), a.sin()) * side
    };
    (0..6).map(|k| Segment::new(vertex(k), vertex(k + 1))).collect()
}

/// Three linearly fused rings with a hydroxyl on the last one.
fn anthracenol() -> Drawing {
    let side = 30.0;
    let w = side * 3f64.sqrt();
    let mut lines = Vec::new();
    for k in 0..3 {
        for seg in hexagon(Point::new(60.0 + k as f64 * w, 80.0), side) {
            let shared = lines.iter().any(|l: &Segment| {
                (l.a.distance(seg.b) < 1e-6 && l.b.distance(seg.a) < 1e-6)
                    || (l.a.distance(seg.a) < 1e-6 && l.b.distance(seg.b) < 1e-6)
            });
            if !shared {
                lines.push(seg);
            }
        }
    }
    let tip = Point::new(60.0 + 2.0 * w, 80.0 - side);
    lines.push(Segment::new(tip, tip + Point::new(0.0, -24.0)));
    let glyph = Shape::rectangle(Bounds {
        min_x: tip.x - 4.0,
        min_y: tip.y - 38.0,
        max_x: tip.x + 4.0,
        max_y: tip.y - 27.0,
    });
    Drawing {
        width: 320,
        height: 160,
        lines,
        glyphs: vec![glyph],
    }
}

fn bench_reconstruct(c: &mut Criterion) {
    let drawing = anthracenol();
    let interpreter = BasicLabelInterpreter::new();
    let extractor = Extractor::new(&drawing, &Oxygen, &interpreter);

    c.bench_function("reconstruct/anthracenol", |b| {
        b.iter(|| black_box(extractor.extract(black_box(&())).unwrap()))
    });
}

criterion_group!(benches, bench_reconstruct);
criterion_main!(benches);
