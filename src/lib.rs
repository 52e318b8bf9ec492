pub mod atom;
pub mod bitmap;
pub mod bond;
pub mod cancel;
pub mod collab;
pub mod config;
pub mod element;
pub mod error;
pub mod extract;
pub mod fragment;
pub mod geom;
pub mod graph_ops;
pub mod labels;
pub mod mol;
pub mod rings;
pub mod segments;
pub mod valence;

pub use atom::Node;
pub use bitmap::{Bitmap, BitmapError};
pub use bond::{BondOrder, Edge};
pub use cancel::CancelToken;
pub use collab::{Binarization, GlyphClassifier, GlyphMatch, LabelInterpreter, RasterPreprocessor};
pub use config::{
    ExtractConfig, GraphConfig, LabelConfig, LimitsConfig, RepairConfig, SegmentConfig, StereoConfig,
};
pub use element::Element;
pub use error::{ConfigError, ExtractError, PreprocessError};
pub use extract::{Extraction, Extractor, GraphSummary, Snapshot};
pub use fragment::{BasicLabelInterpreter, Fragment, FragmentAtom, Interpretation};
pub use geom::{AffineTransform, Point, Segment, Shape};
pub use mol::{MergePosition, MolecularGraph};
pub use rings::{Ring, RingInfo};
