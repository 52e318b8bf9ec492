//! Label detection: glyph classification, re-ranking, token grouping and
//! rescue OCR.

pub mod classify;
pub mod glyph;
pub mod rescue;
pub mod token;

use serde::Serialize;
use tracing::debug;

use crate::bitmap::Bitmap;
use crate::cancel::CancelToken;
use crate::collab::{GlyphClassifier, GlyphMatch, LabelInterpreter};
use crate::config::LabelConfig;
use crate::error::ExtractError;
use crate::geom::{Segment, Shape};

pub use classify::classify_regions;
pub use token::group_tokens;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum GlyphTag {
    Chemistry,
    Numeric,
    /// A long dash that is really a bond drawn between labels.
    BondStroke,
    VerticalStroke,
}

impl GlyphTag {
    pub fn is_text(self) -> bool {
        matches!(self, GlyphTag::Chemistry | GlyphTag::Numeric)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Glyph {
    pub shape: Shape,
    /// Re-ranked candidates, best first. Never empty.
    pub matches: Vec<GlyphMatch>,
    pub tag: GlyphTag,
}

impl Glyph {
    pub fn best(&self) -> GlyphMatch {
        self.matches[0]
    }

    pub fn ch(&self) -> char {
        self.matches[0].glyph
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabelToken {
    /// Union hull of the constituent glyphs.
    pub shape: Shape,
    pub text: String,
    pub glyphs: Vec<Shape>,
}

impl LabelToken {
    pub fn from_glyphs(glyphs: &[&Glyph]) -> Option<LabelToken> {
        let first = glyphs.first()?;
        let shape = glyphs[1..]
            .iter()
            .fold(first.shape.clone(), |acc, g| acc.union(&g.shape));
        Some(LabelToken {
            shape,
            text: glyphs.iter().map(|g| g.ch()).collect(),
            glyphs: glyphs.iter().map(|g| g.shape.clone()).collect(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelSet {
    pub tokens: Vec<LabelToken>,
    /// Tokens whose text interprets to nothing.
    pub rejected: Vec<LabelToken>,
    /// Segments contributed by stroke-tagged glyphs.
    pub strokes: Vec<Segment>,
    /// Every accepted glyph, text and stroke alike.
    pub glyphs: Vec<Glyph>,
}

impl LabelSet {
    /// Whether `shape` was consumed by any accepted glyph or token.
    pub fn covers(&self, shape: &Shape) -> bool {
        let c = shape.centroid();
        self.glyphs.iter().any(|g| g.shape.contains(c))
            || self.tokens.iter().any(|t| t.glyphs.iter().any(|g| g.contains(c)))
    }
}

/// Runs classification and token grouping over the connected regions of
/// one binarized image.
pub struct LabelDetector<'a> {
    pub classifier: &'a dyn GlyphClassifier,
    pub interpreter: &'a dyn LabelInterpreter,
    pub config: &'a LabelConfig,
}

impl<'a> LabelDetector<'a> {
    pub fn new(
        classifier: &'a dyn GlyphClassifier,
        interpreter: &'a dyn LabelInterpreter,
        config: &'a LabelConfig,
    ) -> Self {
        Self {
            classifier,
            interpreter,
            config,
        }
    }

    /// `scale` is the best available bond length estimate; before the
    /// graph exists it is the mean detected line length.
    pub fn detect(
        &self,
        regions: &[Shape],
        binary: &Bitmap,
        scale: f64,
        cancel: &CancelToken,
    ) -> Result<LabelSet, ExtractError> {
        let glyphs = classify_regions(self.classifier, regions, binary, scale, self.config, cancel)?;
        let set = self.assemble(glyphs, scale);
        debug!(
            regions = regions.len(),
            glyphs = set.glyphs.len(),
            tokens = set.tokens.len(),
            rejected = set.rejected.len(),
            strokes = set.strokes.len(),
            "detected labels"
        );
        Ok(set)
    }

    /// Splits stroke glyphs off and groups the rest into interpreted tokens.
    pub fn assemble(&self, glyphs: Vec<Glyph>, scale: f64) -> LabelSet {
        let strokes: Vec<Segment> = glyphs
            .iter()
            .filter_map(|g| glyph::stroke_segment(&g.shape, g.tag))
            .collect();
        let text: Vec<&Glyph> = glyphs.iter().filter(|g| g.tag.is_text()).collect();
        let (tokens, rejected): (Vec<LabelToken>, Vec<LabelToken>) =
            group_tokens(&text, scale, self.config, self.interpreter)
                .into_iter()
                .partition(|t| self.interpreter.interpret(&t.text).is_some());
        LabelSet {
            tokens,
            rejected,
            strokes,
            glyphs,
        }
    }
}
