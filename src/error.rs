use thiserror::Error;

/// Input rejections reported by the raster preprocessor. Both kinds make
/// the extractor retry with the next binarization strategy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreprocessError {
    /// The image has too few pixels to hold a structure.
    #[error("image is too small to preprocess")]
    TooSmall,

    /// Binarization produced mostly speckle noise.
    #[error("image is too spotty after binarization")]
    TooSpotty,
}

/// Errors that end a reconstruction.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExtractError {
    /// Connected-component count exceeded the configured limit.
    #[error("too many regions in image: {count} (limit {limit})")]
    TooManyRegions { count: usize, limit: usize },

    /// Reconstructed bonds are too short to trust; the image should be
    /// retried at a larger scale.
    #[error("average bond length {average_bond_length:.1}px is below the usable minimum")]
    ImageTooSmall { average_bond_length: f64 },

    #[error("preprocessing failed: {0}")]
    Preprocess(#[from] PreprocessError),

    /// The cancel token fired. Never retried.
    #[error("extraction interrupted")]
    Interrupted,
}

impl ExtractError {
    /// Whether another binarization strategy may succeed where this failed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExtractError::Preprocess(_)
                | ExtractError::ImageTooSmall { .. }
                | ExtractError::TooManyRegions { .. }
        )
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse extraction config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config value for `{field}`: {detail}")]
    Invalid { field: &'static str, detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        let e = ExtractError::TooManyRegions {
            count: 5000,
            limit: 3000,
        };
        assert_eq!(e.to_string(), "too many regions in image: 5000 (limit 3000)");
        let e: ExtractError = PreprocessError::TooSpotty.into();
        assert_eq!(
            e.to_string(),
            "preprocessing failed: image is too spotty after binarization"
        );
    }

    #[test]
    fn interruption_is_final() {
        assert!(!ExtractError::Interrupted.is_retryable());
        assert!(ExtractError::ImageTooSmall {
            average_bond_length: 3.0
        }
        .is_retryable());
    }
}
