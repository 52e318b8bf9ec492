//! Line extraction: stitching broken strokes, fusing skeleton pieces along
//! coarse lines, and grouping parallel lines into multi-bonds.

use tracing::debug;

use crate::config::SegmentConfig;
use crate::geom::{Point, Segment};

/// Lines off by more than this many radians do not support one another.
const SUPPORT_MAX_ANGLE: f64 = 0.26;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BondLine {
    pub segment: Segment,
    /// Number of parallel strokes drawn for this bond, capped at 3.
    pub multiplicity: u8,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SegmentSet {
    pub bond_lines: Vec<BondLine>,
    /// Parallel partners absorbed into a bond line. Kept for bond-order
    /// refinement and long-triple splitting.
    pub rejected: Vec<Segment>,
    /// Every joined line, before parallel grouping.
    pub joined: Vec<Segment>,
}

impl SegmentSet {
    pub fn mean_length(&self) -> f64 {
        mean_length(self.bond_lines.iter().map(|l| &l.segment))
    }
}

pub fn mean_length<'a>(lines: impl IntoIterator<Item = &'a Segment>) -> f64 {
    let (sum, n) = lines
        .into_iter()
        .fold((0.0, 0usize), |(s, n), l| (s + l.length(), n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

fn gap_between(a: &Segment, b: &Segment) -> f64 {
    [
        a.endpoint_distance(b),
        a.distance_to_point(b.a),
        a.distance_to_point(b.b),
        b.distance_to_point(a.a),
        b.distance_to_point(a.b),
    ]
    .into_iter()
    .fold(f64::INFINITY, f64::min)
}

fn farthest_span(points: &[Point]) -> Segment {
    let mut best = Segment::new(points[0], points[0]);
    for (i, &p) in points.iter().enumerate() {
        for &q in &points[i + 1..] {
            if p.distance_sq(q) > best.length().powi(2) {
                best = Segment::new(p, q);
            }
        }
    }
    best
}

/// Joins `a` and `b` into one line when they are near-collinear and close.
pub fn try_join(a: &Segment, b: &Segment, max_angle: f64, max_gap: f64) -> Option<Segment> {
    if a.length() > 0.0 && b.length() > 0.0 && a.angle_to(b) > max_angle {
        return None;
    }
    if gap_between(a, b) > max_gap {
        return None;
    }
    let pts = [a.a, a.b, b.a, b.b];
    let joined = farthest_span(&pts);
    let tolerance = (max_gap * 0.5).max(1.0);
    if pts.iter().all(|&p| joined.line_distance(p) <= tolerance) {
        Some(joined)
    } else {
        None
    }
}

/// Repeatedly joins pairs of near-collinear segments until none remain.
pub fn stitch(segments: &[Segment], max_angle: f64, max_gap: f64) -> Vec<Segment> {
    let mut lines: Vec<Segment> = segments.to_vec();
    'outer: loop {
        for i in 0..lines.len() {
            for j in i + 1..lines.len() {
                if let Some(joined) = try_join(&lines[i], &lines[j], max_angle, max_gap) {
                    lines[i] = joined;
                    lines.swap_remove(j);
                    continue 'outer;
                }
            }
        }
        break;
    }
    lines
}

/// Fuses skeleton pieces lying along one coarse line into a single line
/// spanning their extreme projections. Unfused pieces pass through.
fn bridge(coarse: &[Segment], skeleton: Vec<Segment>, cfg: &SegmentConfig) -> Vec<Segment> {
    let mut pieces: Vec<Option<Segment>> = skeleton.into_iter().map(Some).collect();
    let mut out = Vec::new();
    for line in coarse {
        let tol = (line.length() * cfg.bridge_tolerance_ratio).max(1.0);
        let along: Vec<usize> = pieces
            .iter()
            .enumerate()
            .filter_map(|(i, p)| {
                let p = p.as_ref()?;
                let near = line.distance_to_point(p.a) <= tol && line.distance_to_point(p.b) <= tol;
                let aligned = p.length() < tol || p.angle_to(line) <= cfg.stitch_max_angle * 2.0;
                (near && aligned).then_some(i)
            })
            .collect();
        if along.len() < 2 {
            continue;
        }
        let (mut lo, mut hi) = (f64::INFINITY, f64::NEG_INFINITY);
        for &i in &along {
            if let Some(p) = pieces[i].take() {
                for t in [line.project(p.a), line.project(p.b)] {
                    lo = lo.min(t);
                    hi = hi.max(t);
                }
            }
        }
        out.push(Segment::new(line.point_at(lo.max(0.0)), line.point_at(hi.min(1.0))));
    }
    out.extend(pieces.into_iter().flatten());
    out
}

/// Stitches both segment sources, bridges skeleton breaks and groups
/// parallel strokes.
pub fn extract(coarse: &[Segment], skeleton: &[Segment], cfg: &SegmentConfig) -> SegmentSet {
    let reference = if coarse.is_empty() {
        mean_length(skeleton)
    } else {
        mean_length(coarse)
    };
    let max_gap = reference * cfg.stitch_gap_ratio;
    let coarse_lines = stitch(coarse, cfg.stitch_max_angle, max_gap);
    let joined = if skeleton.is_empty() {
        coarse_lines
    } else {
        let skeleton_lines = stitch(skeleton, cfg.stitch_max_angle, max_gap);
        let bridged = bridge(&coarse_lines, skeleton_lines, cfg);
        stitch(&bridged, cfg.stitch_max_angle, max_gap)
    };
    let joined: Vec<Segment> = joined.into_iter().filter(|s| s.length() > 0.0).collect();
    let (bond_lines, rejected) = group_parallel(&joined, cfg);
    debug!(
        coarse = coarse.len(),
        skeleton = skeleton.len(),
        joined = joined.len(),
        bond_lines = bond_lines.len(),
        rejected = rejected.len(),
        "extracted segments"
    );
    SegmentSet {
        bond_lines,
        rejected,
        joined,
    }
}

/// Radius within which parallel lines belong to the same bond.
pub fn grouping_radius(lines: &[Segment], cfg: &SegmentConfig) -> f64 {
    let mean = mean_length(lines);
    let longest = lines.iter().map(|l| l.length()).fold(0.0, f64::max);
    let clamped = if longest > cfg.outlier_ratio * mean {
        cfg.longest_clamp * mean
    } else {
        longest
    };
    clamped * cfg.parallel_offset_ratio
}

fn is_partner(primary: &Segment, other: &Segment, radius: f64, cfg: &SegmentConfig) -> bool {
    other.length() > 0.0
        && primary.angle_to(other) <= cfg.parallel_max_angle
        && primary.signed_line_distance(other.midpoint()).abs() <= radius
        && primary.overlap_fraction(other) >= cfg.min_overlap
}

/// Counts distinct non-zero offsets among `partners` whose members span
/// enough of `primary`.
fn count_offsets(primary: &Segment, partners: &[&Segment], radius: f64, cfg: &SegmentConfig) -> usize {
    let merge = radius * cfg.offset_merge_ratio;
    let mut tagged: Vec<(f64, &Segment)> = partners
        .iter()
        .map(|p| (primary.signed_line_distance(p.midpoint()), *p))
        .filter(|(off, _)| off.abs() > merge)
        .collect();
    tagged.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut groups: Vec<Vec<&Segment>> = Vec::new();
    let mut last = f64::NEG_INFINITY;
    for (off, seg) in tagged {
        match groups.last_mut() {
            Some(g) if off - last <= merge => g.push(seg),
            _ => groups.push(vec![seg]),
        }
        last = off;
    }

    groups
        .iter()
        .filter(|g| {
            let intervals = g
                .iter()
                .map(|s| {
                    let (t0, t1) = (primary.project(s.a), primary.project(s.b));
                    (t0.min(t1), t0.max(t1))
                })
                .collect();
            covered_fraction(intervals) >= cfg.min_span_fraction
        })
        .count()
}

/// Visits lines longest first; parallel partners of each primary are moved
/// to the rejected pool and determine the primary's multiplicity.
pub fn group_parallel(lines: &[Segment], cfg: &SegmentConfig) -> (Vec<BondLine>, Vec<Segment>) {
    let radius = grouping_radius(lines, cfg);
    let mut order: Vec<usize> = (0..lines.len()).collect();
    order.sort_by(|&a, &b| lines[b].length().total_cmp(&lines[a].length()));

    let mut used = vec![false; lines.len()];
    let mut bond_lines = Vec::new();
    let mut rejected = Vec::new();
    for &i in &order {
        if used[i] {
            continue;
        }
        used[i] = true;
        let primary = lines[i];
        let partner_idx: Vec<usize> = order
            .iter()
            .copied()
            .filter(|&j| !used[j] && is_partner(&primary, &lines[j], radius, cfg))
            .collect();
        let partners: Vec<&Segment> = partner_idx.iter().map(|&j| &lines[j]).collect();
        let count = count_offsets(&primary, &partners, radius, cfg);
        for &j in &partner_idx {
            used[j] = true;
            rejected.push(lines[j]);
        }
        bond_lines.push(BondLine {
            segment: primary,
            multiplicity: (1 + count).min(3) as u8,
        });
    }
    (bond_lines, rejected)
}

/// Number of distinct parallel offsets among `candidates` supporting
/// `segment`.
pub fn parallel_support(candidates: &[Segment], segment: &Segment, radius: f64, cfg: &SegmentConfig) -> usize {
    let partners: Vec<&Segment> = candidates
        .iter()
        .filter(|c| is_partner(segment, c, radius, cfg))
        .collect();
    count_offsets(segment, &partners, radius, cfg)
}

/// Fraction of the path `a -> b` covered by `lines` lying along it within
/// `tol` pixels.
pub fn line_support(lines: &[Segment], a: Point, b: Point, tol: f64) -> f64 {
    let target = Segment::new(a, b);
    if target.length() == 0.0 {
        return 0.0;
    }
    let intervals = lines
        .iter()
        .filter(|l| l.length() > 0.0)
        .filter(|l| l.angle_to(&target) <= SUPPORT_MAX_ANGLE || l.length() <= tol)
        .filter(|l| target.line_distance(l.a) <= tol && target.line_distance(l.b) <= tol)
        .map(|l| {
            let (t0, t1) = (target.project(l.a), target.project(l.b));
            (t0.min(t1), t0.max(t1))
        })
        .collect();
    covered_fraction(intervals)
}

/// Length of the union of `intervals` clipped to `[0, 1]`.
pub fn covered_fraction(mut intervals: Vec<(f64, f64)>) -> f64 {
    intervals.retain(|&(lo, hi)| hi > 0.0 && lo < 1.0);
    intervals.sort_by(|a, b| a.0.total_cmp(&b.0));
    let mut covered = 0.0;
    let mut cursor = 0.0f64;
    for (lo, hi) in intervals {
        let lo = lo.max(cursor);
        let hi = hi.min(1.0);
        if hi > lo {
            covered += hi - lo;
            cursor = hi;
        }
    }
    covered
}
