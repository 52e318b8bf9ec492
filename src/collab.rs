//! Contracts for the collaborators the reconstruction engine consumes.

use serde::{Deserialize, Serialize};

use crate::bitmap::Bitmap;
use crate::error::PreprocessError;
use crate::fragment::Interpretation;
use crate::geom::{Segment, Shape};

/// Binarization strategies, tried in order until one is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Binarization {
    Default,
    /// A more aggressive threshold for faint or noisy scans.
    Alternate,
    /// Resample by the factor before binarizing.
    Upscaled(f64),
}

/// Image cleanup and vectorization. Shared with the label workers.
pub trait RasterPreprocessor: Sync {
    type Image;

    fn binarize_and_clean(
        &self,
        image: &Self::Image,
        strategy: Binarization,
    ) -> Result<Bitmap, PreprocessError>;

    fn thin(&self, bitmap: &Bitmap) -> Bitmap;

    /// Outlines of the connected ink regions, as convex shapes.
    fn connected_components(&self, bitmap: &Bitmap) -> Result<Vec<Shape>, PreprocessError>;

    fn line_segments(&self, bitmap: &Bitmap) -> Vec<Segment>;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GlyphMatch {
    pub glyph: char,
    pub confidence: f64,
}

impl GlyphMatch {
    pub fn new(glyph: char, confidence: f64) -> Self {
        Self { glyph, confidence }
    }
}

/// Single-glyph OCR. Called from worker threads.
pub trait GlyphClassifier: Send + Sync {
    /// Up to `k` candidates for the glyph inside `shape`, best first.
    /// `pixels` is the binary crop of the shape's bounds.
    fn best_matches(&self, shape: &Shape, pixels: &Bitmap, k: usize) -> Vec<GlyphMatch>;
}

/// Maps a label token ("OMe", "CO2H", "N+") to an atom or fragment.
pub trait LabelInterpreter: Send + Sync {
    fn interpret(&self, token: &str) -> Option<Interpretation>;
}
