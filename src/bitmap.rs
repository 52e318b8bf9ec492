//! Binary raster produced by the preprocessor.
//!
//! Pixel `(x, y)` covers the unit square centred on integer coordinates, the
//! same convention the segment and glyph collaborators use.

use thiserror::Error;

use crate::geom::{Bounds, Point};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BitmapError {
    #[error("bitmap size mismatch: expected {expected} pixels, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Bitmap {
    width: usize,
    height: usize,
    data: Vec<bool>,
}

impl Bitmap {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![false; width * height],
        }
    }

    pub fn from_vec(width: usize, height: usize, data: Vec<bool>) -> Result<Self, BitmapError> {
        let expected = width.checked_mul(height).ok_or(BitmapError::SizeMismatch {
            expected: usize::MAX,
            actual: data.len(),
        })?;
        if data.len() != expected {
            return Err(BitmapError::SizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Out-of-range coordinates read as background.
    pub fn get(&self, x: i64, y: i64) -> bool {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return false;
        }
        self.data[y as usize * self.width + x as usize]
    }

    pub fn set(&mut self, x: usize, y: usize, on: bool) {
        if x < self.width && y < self.height {
            self.data[y * self.width + x] = on;
        }
    }

    pub fn is_on_at(&self, p: Point) -> bool {
        self.get(p.x.round() as i64, p.y.round() as i64)
    }

    pub fn count_on(&self) -> usize {
        self.data.iter().filter(|&&v| v).count()
    }

    pub fn crop(&self, bounds: &Bounds) -> Bitmap {
        let x0 = bounds.min_x.floor().max(0.0) as usize;
        let y0 = bounds.min_y.floor().max(0.0) as usize;
        let x1 = (bounds.max_x.ceil().max(0.0) as usize + 1).min(self.width);
        let y1 = (bounds.max_y.ceil().max(0.0) as usize + 1).min(self.height);
        if x0 >= x1 || y0 >= y1 {
            return Bitmap::new(0, 0);
        }
        let mut out = Bitmap::new(x1 - x0, y1 - y0);
        for y in y0..y1 {
            for x in x0..x1 {
                out.data[(y - y0) * out.width + (x - x0)] = self.data[y * self.width + x];
            }
        }
        out
    }

    /// Fraction of set pixels inside `bounds`.
    pub fn fill_ratio(&self, bounds: &Bounds) -> f64 {
        let crop = self.crop(bounds);
        let total = crop.width * crop.height;
        if total == 0 {
            return 0.0;
        }
        crop.count_on() as f64 / total as f64
    }

    /// Length of the ink run through `p` along `normal`, probing at most
    /// `max_half` pixels each way in half-pixel steps.
    pub fn stroke_thickness(&self, p: Point, normal: Point, max_half: f64) -> f64 {
        let n = normal.normalize();
        if !self.is_on_at(p) {
            return 0.0;
        }
        let step = 0.5;
        let run = |dir: f64| {
            let mut d = 0.0;
            while d + step <= max_half && self.is_on_at(p + n * (dir * (d + step))) {
                d += step;
            }
            d
        };
        let pos = run(1.0);
        let neg = run(-1.0);
        pos + neg + 1.0
    }
}
