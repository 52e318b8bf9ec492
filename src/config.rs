//! Tunable constants for reconstruction.
//!
//! Every threshold that depends on drawing scale is a ratio of the average
//! bond length (or, before a graph exists, of the mean detected line length).
//! Absolute pixel values appear only where noted.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentConfig {
    /// Radians two pieces may differ by and still be stitched.
    pub stitch_max_angle: f64,
    /// Largest stitchable gap, as a fraction of the mean line length.
    pub stitch_gap_ratio: f64,
    /// Skeleton pieces within this fraction of a coarse line's length from
    /// it are fused along it.
    pub bridge_tolerance_ratio: f64,
    /// Lines longer than `outlier_ratio` times the mean are clamped to
    /// `longest_clamp` times the mean before sizing the grouping radius.
    pub outlier_ratio: f64,
    pub longest_clamp: f64,
    pub parallel_offset_ratio: f64,
    pub parallel_max_angle: f64,
    /// Fraction of a partner that must project onto the primary line.
    pub min_overlap: f64,
    /// Fraction of the primary an offset group must span to count.
    pub min_span_fraction: f64,
    /// Offsets closer than this fraction of the radius are one offset.
    pub offset_merge_ratio: f64,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            stitch_max_angle: 0.12,
            stitch_gap_ratio: 0.12,
            bridge_tolerance_ratio: 0.08,
            outlier_ratio: 2.0,
            longest_clamp: 1.4,
            parallel_offset_ratio: 0.3,
            parallel_max_angle: 0.2,
            min_overlap: 0.5,
            min_span_fraction: 0.35,
            offset_merge_ratio: 0.25,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelConfig {
    pub top_k: usize,
    pub min_confidence: f64,
    /// Regions smaller than this many square pixels are never classified.
    pub min_region_area: f64,
    /// Regions larger than this fraction of the mean line length are
    /// drawing, not text.
    pub max_glyph_size_ratio: f64,
    /// Width over height above which a region is tried as two glyphs.
    pub split_aspect_ratio: f64,
    pub confusable_penalty: f64,
    pub common_bonus: f64,
    /// A region filling at least this much of its bounds is box-like.
    pub box_fill_ratio: f64,
    pub box_penalty: f64,
    /// Aspect ratio above which a '-' or '|' shaped glyph is a stroke.
    pub stroke_aspect_ratio: f64,
    /// Stroke glyphs at least this many glyph heights long are bond lines.
    pub stroke_length_ratio: f64,
    pub spacing_ratio: f64,
    pub min_vertical_overlap: f64,
    pub relaxed_vertical_overlap: f64,
    /// Largest |dy/dx| of the line joining two glyph centres in one token.
    pub max_token_slope: f64,
    pub rescue_radius_ratio: f64,
    pub rescue_min_endpoints: usize,
    /// Hull area limit for a rescue cluster, as a fraction of ABL squared.
    pub rescue_max_area_ratio: f64,
    /// Capture radius around unlabeled terminals, as a fraction of ABL.
    pub capture_ratio: f64,
    /// Smallest glyph a grown capture region may settle on, as a fraction
    /// of ABL.
    pub capture_min_glyph_ratio: f64,
    pub capture_max_rounds: usize,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            min_confidence: 0.45,
            min_region_area: 6.0,
            max_glyph_size_ratio: 0.8,
            split_aspect_ratio: 1.6,
            confusable_penalty: 0.15,
            common_bonus: 0.05,
            box_fill_ratio: 0.8,
            box_penalty: 0.2,
            stroke_aspect_ratio: 3.0,
            stroke_length_ratio: 1.5,
            spacing_ratio: 0.35,
            min_vertical_overlap: 0.5,
            relaxed_vertical_overlap: 0.25,
            max_token_slope: 0.6,
            rescue_radius_ratio: 0.25,
            rescue_min_endpoints: 3,
            rescue_max_area_ratio: 0.2,
            capture_ratio: 0.35,
            capture_min_glyph_ratio: 0.25,
            capture_max_rounds: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Lines shorter than this fraction of the mean line length are ignored
    /// when building the initial graph.
    pub min_segment_ratio: f64,
    /// Initial longest accepted line, as a multiple of the mean line length.
    pub max_bond_length_ratio: f64,
    /// Edges longer than this multiple of ABL tighten the cutoff.
    pub long_bond_ratio: f64,
    /// Factor applied to the cutoff each time it tightens.
    pub tighten_factor: f64,
    pub snap_ratio: f64,
    /// Crossings closer than this fraction to an edge end are not split.
    pub crossing_min_fraction: f64,
    /// Dangling ends within this fraction of ABL of an edge are attached.
    pub dangling_attach_ratio: f64,
    /// Nodes within this fraction of ABL of a label shape are fused into it.
    pub label_capture_ratio: f64,
    pub missing_bond_max_ratio: f64,
    pub missing_bond_support: f64,
    /// Pairs supported below `missing_bond_support` but at least this much
    /// get a dashed bond.
    pub missing_bond_dashed_support: f64,
    /// Tolerance for line support tests, as a fraction of ABL.
    pub support_tolerance_ratio: f64,
    /// Ring atoms farther than this fraction of ABL from their fitted
    /// regular-polygon vertex are snapped onto it.
    pub ring_fit_tolerance: f64,
    /// Stray nodes within this fraction of ABL of a fitted ring atom are
    /// folded into it, along with their duplicate ring edges.
    pub ring_absorb_ratio: f64,
    /// Regularization snaps nodes within this fraction of ABL of a lattice
    /// point or shared axis.
    pub regularize_snap_ratio: f64,
    pub max_ring_size: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            min_segment_ratio: 0.15,
            max_bond_length_ratio: 3.0,
            long_bond_ratio: 2.2,
            tighten_factor: 0.85,
            snap_ratio: 0.22,
            crossing_min_fraction: 0.2,
            dangling_attach_ratio: 0.25,
            label_capture_ratio: 0.45,
            missing_bond_max_ratio: 1.6,
            missing_bond_support: 0.7,
            missing_bond_dashed_support: 0.35,
            support_tolerance_ratio: 0.12,
            ring_fit_tolerance: 0.3,
            ring_absorb_ratio: 0.2,
            regularize_snap_ratio: 0.08,
            max_ring_size: 7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairConfig {
    /// Dash pieces are shorter than this fraction of the reference length.
    pub dash_piece_ratio: f64,
    pub dash_min_pieces: usize,
    /// Allowed distance of a dash point from the dash axis, as a fraction
    /// of the reference length.
    pub dash_axis_tolerance: f64,
    /// Largest gap between consecutive collinear pieces, as a fraction of
    /// the reference length.
    pub dash_gap_ratio: f64,
    pub triangle_merge_ratio: f64,
    pub triangle_support: f64,
    /// Triangles whose shortest and longest sides differ by less than this
    /// fraction of the longest are drawn cyclopropanes and left alone.
    pub triangle_equilateral_tolerance: f64,
    pub long_triple_ratio: f64,
    /// Radians above which two opposite edges of a cage carbon are straight.
    pub cage_straight_angle: f64,
    pub short_bond_ratio: f64,
    /// A short bond is merged only if every bond it touches ends up within
    /// this fraction of the reference bond length.
    pub short_bond_tolerance: f64,
    /// Short bonds backed by a drawn stroke covering this fraction are real.
    pub short_bond_support: f64,
    /// Radius for charge marks around heteroatoms, as a fraction of ABL.
    pub charge_mark_ratio: f64,
    /// Components with no label whose extent is below this fraction of ABL
    /// are noise.
    pub noise_extent_ratio: f64,
    pub noise_max_nodes: usize,
    /// Minority components whose own ABL falls outside this band around
    /// the largest component's ABL are noise.
    pub noise_abl_min: f64,
    pub noise_abl_max: f64,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            dash_piece_ratio: 0.4,
            dash_min_pieces: 3,
            dash_axis_tolerance: 0.2,
            dash_gap_ratio: 0.45,
            triangle_merge_ratio: 0.55,
            triangle_support: 0.6,
            triangle_equilateral_tolerance: 0.15,
            long_triple_ratio: 1.8,
            cage_straight_angle: 160f64.to_radians(),
            short_bond_ratio: 0.3,
            short_bond_tolerance: 0.35,
            short_bond_support: 0.6,
            charge_mark_ratio: 0.6,
            noise_extent_ratio: 0.5,
            noise_max_nodes: 3,
            noise_abl_min: 0.7,
            noise_abl_max: 1.4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StereoConfig {
    pub samples: usize,
    /// Wide-end over narrow-end thickness needed for a wedge.
    pub wedge_min_ratio: f64,
    /// Minimum correlation between position and thickness along the edge.
    pub wedge_min_correlation: f64,
    /// Share of thickness samples that must land on ink for a wedge.
    pub wedge_min_fill: f64,
    /// Thickness probing reach, as a fraction of ABL.
    pub thickness_reach_ratio: f64,
}

impl Default for StereoConfig {
    fn default() -> Self {
        Self {
            samples: 9,
            wedge_min_ratio: 1.8,
            wedge_min_correlation: 0.8,
            wedge_min_fill: 0.85,
            thickness_reach_ratio: 0.35,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_regions: usize,
    pub max_restarts: usize,
    pub max_bond_length_rounds: usize,
    /// Smallest usable ABL in pixels.
    pub min_average_bond_length: f64,
    pub upscale_factor: f64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_regions: 3000,
            max_restarts: 4,
            max_bond_length_rounds: 4,
            min_average_bond_length: 10.0,
            upscale_factor: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    pub segments: SegmentConfig,
    pub labels: LabelConfig,
    pub graph: GraphConfig,
    pub repair: RepairConfig,
    pub stereo: StereoConfig,
    pub limits: LimitsConfig,
    /// Keep a graph copy after every refinement step.
    pub debug_snapshots: bool,
}

impl ExtractConfig {
    /// Parses a possibly partial JSON override; missing fields keep their
    /// defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: ExtractConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("graph.snap_ratio", self.graph.snap_ratio),
            ("graph.long_bond_ratio", self.graph.long_bond_ratio),
            ("limits.upscale_factor", self.limits.upscale_factor),
            ("segments.parallel_offset_ratio", self.segments.parallel_offset_ratio),
        ];
        for (field, value) in positive {
            if !(value > 0.0) {
                return Err(ConfigError::Invalid {
                    field,
                    detail: format!("must be positive, got {value}"),
                });
            }
        }
        if !(0.0 < self.graph.tighten_factor && self.graph.tighten_factor < 1.0) {
            return Err(ConfigError::Invalid {
                field: "graph.tighten_factor",
                detail: format!("must lie in (0, 1), got {}", self.graph.tighten_factor),
            });
        }
        if self.graph.max_ring_size < 3 {
            return Err(ConfigError::Invalid {
                field: "graph.max_ring_size",
                detail: "rings need at least three nodes".to_string(),
            });
        }
        Ok(())
    }
}
