use std::f64::consts::PI;
use std::sync::Mutex;

use crabsketch::geom::Bounds;
use crabsketch::{
    BasicLabelInterpreter, Binarization, Bitmap, BondOrder, CancelToken, Element, ExtractConfig,
    ExtractError, Extractor, GlyphClassifier, GlyphMatch, Interpretation, LabelInterpreter,
    MolecularGraph, Point, PreprocessError, RasterPreprocessor, Segment, Shape,
};

// ---------------------------------------------------------------------------
// Mock collaborators
// ---------------------------------------------------------------------------

/// A drawing given directly as vectors. Binarization renders the lines;
/// thinning yields an empty image, so only the coarse pass sees lines.
struct Drawing {
    width: usize,
    height: usize,
    lines: Vec<Segment>,
    glyphs: Vec<Shape>,
    rejected: Vec<(Binarization, PreprocessError)>,
    calls: Mutex<Vec<Binarization>>,
}

impl Drawing {
    fn new(width: usize, height: usize, lines: Vec<Segment>) -> Self {
        Self {
            width,
            height,
            lines,
            glyphs: Vec::new(),
            rejected: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn with_glyph(mut self, shape: Shape) -> Self {
        self.glyphs.push(shape);
        self
    }

    fn rejecting(mut self, strategy: Binarization, error: PreprocessError) -> Self {
        self.rejected.push((strategy, error));
        self
    }

    fn calls(&self) -> Vec<Binarization> {
        self.calls.lock().unwrap().clone()
    }
}

impl RasterPreprocessor for Drawing {
    type Image = ();

    fn binarize_and_clean(&self, _image: &(), strategy: Binarization) -> Result<Bitmap, PreprocessError> {
        self.calls.lock().unwrap().push(strategy);
        if let Some((_, e)) = self.rejected.iter().find(|(s, _)| *s == strategy) {
            return Err(e.clone());
        }
        let mut bitmap = Bitmap::new(self.width, self.height);
        for line in &self.lines {
            let steps = (line.length() * 2.0).ceil() as usize + 1;
            let normal = line.direction().perpendicular();
            for i in 0..=steps {
                let p = line.point_at(i as f64 / steps as f64);
                for w in [-1.0, 0.0, 1.0] {
                    let q = p + normal * w;
                    if q.x >= 0.0 && q.y >= 0.0 {
                        bitmap.set(q.x.round() as usize, q.y.round() as usize, true);
                    }
                }
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

/// Reads every glyph as the same character.
struct Reads {
    glyph: char,
    cancel: Option<CancelToken>,
}

impl Reads {
    fn new(glyph: char) -> Self {
        Self { glyph, cancel: None }
    }
}

impl GlyphClassifier for Reads {
    fn best_matches(&self, _shape: &Shape, _pixels: &Bitmap, _k: usize) -> Vec<GlyphMatch> {
        if let Some(token) = &self.cancel {
            token.cancel();
        }
        vec![GlyphMatch::new(self.glyph, 0.9)]
    }
}

/// Reads "Q" as a carboxylic acid and defers everything else.
struct Abbreviations(BasicLabelInterpreter);

impl LabelInterpreter for Abbreviations {
    fn interpret(&self, token: &str) -> Option<Interpretation> {
        match token {
            "Q" => self.0.interpret("CO2H"),
            other => self.0.interpret(other),
        }
    }
}

// ---------------------------------------------------------------------------
// Drawings
// ---------------------------------------------------------------------------

fn hexagon(centre: Point, side: f64) -> Vec<Segment> {
    let vertex = |k: usize| {
        let a = k as f64 * PI / 3.0;
        centre + Point::new(a.cos(), a.sin()) * side
    };
    (0..6).map(|k| Segment::new(vertex(k), vertex(k + 1))).collect()
}

/// Hexagon of side 30 centred at (60, 60) with a bond from its rightmost
/// vertex ending just short of a glyph box.
fn substituted_hexagon() -> (Vec<Segment>, Shape) {
    let mut lines = hexagon(Point::new(60.0, 60.0), 30.0);
    lines.push(Segment::new(Point::new(90.0, 60.0), Point::new(116.0, 60.0)));
    let glyph = Shape::rectangle(Bounds {
        min_x: 119.0,
        min_y: 55.0,
        max_x: 127.0,
        max_y: 65.0,
    });
    (lines, glyph)
}

fn assert_well_formed(graph: &MolecularGraph) {
    for e in graph.edges() {
        let (a, b) = graph.endpoints(e).expect("live edge");
        assert_ne!(a, b);
        assert!(graph.contains_node(a) && graph.contains_node(b));
        assert!((1..=3).contains(&graph.edge(e).order.value()));
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn plain_hexagon_is_one_ring() {
    let drawing = Drawing::new(160, 120, hexagon(Point::new(60.0, 60.0), 30.0));
    let classifier = Reads::new('C');
    let interpreter = BasicLabelInterpreter::new();
    let extraction = Extractor::new(&drawing, &classifier, &interpreter).extract(&()).unwrap();

    let graph = &extraction.graph;
    assert_well_formed(graph);
    assert_eq!(graph.node_count(), 6);
    assert_eq!(graph.edge_count(), 6);
    let rings = graph.rings(7);
    assert_eq!(rings.len(), 1);
    assert_eq!(rings[0].size(), 6);
    assert!(graph.edges().all(|e| graph.edge(e).order == BondOrder::Single));
    assert!(extraction.snapshots.is_empty());
    assert_eq!(drawing.calls(), vec![Binarization::Default]);
}

#[test]
fn label_becomes_a_heteroatom() {
    let (lines, glyph) = substituted_hexagon();
    let drawing = Drawing::new(160, 120, lines).with_glyph(glyph);
    let classifier = Reads::new('O');
    let interpreter = BasicLabelInterpreter::new();
    let extraction = Extractor::new(&drawing, &classifier, &interpreter).extract(&()).unwrap();

    let graph = &extraction.graph;
    assert_well_formed(graph);
    assert_eq!(graph.node_count(), 7);
    assert_eq!(graph.edge_count(), 7);
    let oxygens: Vec<_> = graph.nodes().filter(|&n| graph.node(n).element == Element::O).collect();
    assert_eq!(oxygens.len(), 1);
    assert_eq!(graph.degree(oxygens[0]), 1);
    assert!(graph.position(oxygens[0]).x > 115.0);
    assert_eq!(graph.rings(7).len(), 1);
}

#[test]
fn abbreviation_expands_into_atoms() {
    let (lines, glyph) = substituted_hexagon();
    let drawing = Drawing::new(160, 120, lines).with_glyph(glyph);
    let classifier = Reads::new('Q');
    let interpreter = Abbreviations(BasicLabelInterpreter::new());
    let extraction = Extractor::new(&drawing, &classifier, &interpreter).extract(&()).unwrap();

    let graph = &extraction.graph;
    assert_well_formed(graph);
    assert_eq!(graph.node_count(), 9);
    assert_eq!(graph.edge_count(), 9);
    assert_eq!(graph.rings(7).len(), 1);

    let anchor = graph
        .nodes()
        .find(|&n| graph.node(n).group.is_some() && !graph.node(n).invented)
        .expect("grounded label");
    assert_eq!(graph.node(anchor).element, Element::C);
    let mut orders: Vec<BondOrder> = graph
        .neighbors(anchor)
        .filter(|&n| graph.node(n).element == Element::O)
        .map(|o| graph.edge(graph.edge_between(anchor, o).unwrap()).order)
        .collect();
    orders.sort();
    assert_eq!(orders, vec![BondOrder::Single, BondOrder::Double]);
    assert_eq!(graph.nodes().filter(|&n| graph.node(n).invented).count(), 2);
}

#[test]
fn snapshots_follow_the_stages() {
    let drawing = Drawing::new(160, 120, hexagon(Point::new(60.0, 60.0), 30.0));
    let classifier = Reads::new('C');
    let interpreter = BasicLabelInterpreter::new();
    let config = ExtractConfig {
        debug_snapshots: true,
        ..ExtractConfig::default()
    };
    let extraction = Extractor::new(&drawing, &classifier, &interpreter)
        .with_config(config)
        .extract(&())
        .unwrap();

    let steps: Vec<&str> = extraction.snapshots.iter().map(|s| s.step.as_str()).collect();
    assert_eq!(steps.first(), Some(&"0:initial"));
    assert_eq!(steps.last(), Some(&"0:regularize"));
    assert!(steps.contains(&"0:bond_order"));

    let json = serde_json::to_value(&extraction.snapshots[0]).unwrap();
    assert_eq!(json["step"], "0:initial");
    assert_eq!(json["summary"]["nodes"].as_array().map(Vec::len), Some(6));
    assert_eq!(extraction.summary().edges.len(), 6);
}

#[test]
fn spotty_default_falls_back_to_alternate() {
    let drawing = Drawing::new(160, 120, hexagon(Point::new(60.0, 60.0), 30.0))
        .rejecting(Binarization::Default, PreprocessError::TooSpotty);
    let classifier = Reads::new('C');
    let interpreter = BasicLabelInterpreter::new();
    let extraction = Extractor::new(&drawing, &classifier, &interpreter).extract(&()).unwrap();
    assert_eq!(extraction.graph.edge_count(), 6);
    assert_eq!(drawing.calls(), vec![Binarization::Default, Binarization::Alternate]);
}

#[test]
fn tiny_drawing_jumps_to_upscaling_then_fails() {
    let drawing = Drawing::new(40, 40, hexagon(Point::new(20.0, 20.0), 6.0));
    let classifier = Reads::new('C');
    let interpreter = BasicLabelInterpreter::new();
    let err = Extractor::new(&drawing, &classifier, &interpreter).extract(&()).unwrap_err();
    assert!(matches!(err, ExtractError::ImageTooSmall { average_bond_length } if average_bond_length < 10.0));
    assert_eq!(drawing.calls(), vec![Binarization::Default, Binarization::Upscaled(2.0)]);
}

#[test]
fn every_strategy_rejected_surfaces_the_last_error() {
    let (lines, glyph) = substituted_hexagon();
    let drawing = Drawing::new(160, 120, lines).with_glyph(glyph);
    let classifier = Reads::new('O');
    let interpreter = BasicLabelInterpreter::new();
    let mut config = ExtractConfig::default();
    config.limits.max_regions = 0;
    let err = Extractor::new(&drawing, &classifier, &interpreter)
        .with_config(config)
        .extract(&())
        .unwrap_err();
    assert_eq!(err, ExtractError::TooManyRegions { count: 1, limit: 0 });
    assert_eq!(drawing.calls().len(), 3);
}

#[test]
fn cancellation_during_classification_interrupts() {
    let (lines, glyph) = substituted_hexagon();
    let drawing = Drawing::new(160, 120, lines).with_glyph(glyph);
    let token = CancelToken::new();
    let classifier = Reads {
        glyph: 'O',
        cancel: Some(token.clone()),
    };
    let interpreter = BasicLabelInterpreter::new();
    let extractor = Extractor::new(&drawing, &classifier, &interpreter).with_cancel_token(token);
    assert_eq!(extractor.extract(&()).unwrap_err(), ExtractError::Interrupted);
    assert_eq!(drawing.calls(), vec![Binarization::Default]);
    assert!(extractor.cancel_token().is_cancelled());
}

#[test]
fn cancelled_before_start_never_binarizes() {
    let drawing = Drawing::new(160, 120, hexagon(Point::new(60.0, 60.0), 30.0));
    let classifier = Reads::new('C');
    let interpreter = BasicLabelInterpreter::new();
    let extractor = Extractor::new(&drawing, &classifier, &interpreter);
    extractor.cancel_token().cancel();
    assert_eq!(extractor.extract(&()).unwrap_err(), ExtractError::Interrupted);
    assert!(drawing.calls().is_empty());
}
