//! Planar geometry used throughout reconstruction.
//!
//! Coordinates are image pixels with `y` pointing down. Nothing in this
//! module knows about bond lengths; callers scale their tolerances by the
//! current average bond length before asking geometric questions.

use std::f64::consts::PI;
use std::ops::{Add, Mul, Sub};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Point) -> f64 {
        self.distance_sq(other).sqrt()
    }

    pub fn distance_sq(self, other: Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    pub fn dot(self, other: Point) -> f64 {
        self.x * other.x + self.y * other.y
    }

    pub fn cross(self, other: Point) -> f64 {
        self.x * other.y - self.y * other.x
    }

    pub fn norm(self) -> f64 {
        self.dot(self).sqrt()
    }

    pub fn normalize(self) -> Point {
        let n = self.norm();
        if n == 0.0 {
            Point::default()
        } else {
            self * (1.0 / n)
        }
    }

    /// Counterclockwise rotation in a y-up frame (clockwise on screen).
    pub fn rotate(self, angle: f64) -> Point {
        let (s, c) = angle.sin_cos();
        Point::new(self.x * c - self.y * s, self.x * s + self.y * c)
    }

    pub fn perpendicular(self) -> Point {
        Point::new(-self.y, self.x)
    }

    pub fn lerp(self, other: Point, t: f64) -> Point {
        self + (other - self) * t
    }

    pub fn midpoint(self, other: Point) -> Point {
        self.lerp(other, 0.5)
    }

    pub fn angle(self) -> f64 {
        self.y.atan2(self.x)
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Add for Point {
    type Output = Point;

    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Point;

    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Point {
    type Output = Point;

    fn mul(self, rhs: f64) -> Point {
        Point::new(self.x * rhs, self.y * rhs)
    }
}

pub fn centroid(points: &[Point]) -> Option<Point> {
    if points.is_empty() {
        return None;
    }
    let sum = points.iter().fold(Point::default(), |acc, &p| acc + p);
    Some(sum * (1.0 / points.len() as f64))
}

/// Acute angle between two undirected directions, in `[0, PI/2]`.
pub fn line_angle_between(a: Point, b: Point) -> f64 {
    let mut d = (a.angle() - b.angle()).abs() % PI;
    if d > PI / 2.0 {
        d = PI - d;
    }
    d
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub a: Point,
    pub b: Point,
}

impl Segment {
    pub const fn new(a: Point, b: Point) -> Self {
        Self { a, b }
    }

    pub fn length(&self) -> f64 {
        self.a.distance(self.b)
    }

    pub fn midpoint(&self) -> Point {
        self.a.midpoint(self.b)
    }

    pub fn vector(&self) -> Point {
        self.b - self.a
    }

    pub fn direction(&self) -> Point {
        self.vector().normalize()
    }

    pub fn point_at(&self, t: f64) -> Point {
        self.a.lerp(self.b, t)
    }

    pub fn angle_to(&self, other: &Segment) -> f64 {
        line_angle_between(self.vector(), other.vector())
    }

    /// Parameter of the orthogonal projection of `p` on the supporting line.
    pub fn project(&self, p: Point) -> f64 {
        let v = self.vector();
        let len_sq = v.dot(v);
        if len_sq == 0.0 {
            return 0.0;
        }
        (p - self.a).dot(v) / len_sq
    }

    pub fn closest_point(&self, p: Point) -> Point {
        self.point_at(self.project(p).clamp(0.0, 1.0))
    }

    pub fn distance_to_point(&self, p: Point) -> f64 {
        self.closest_point(p).distance(p)
    }

    /// Distance from `p` to the infinite line through the segment.
    pub fn line_distance(&self, p: Point) -> f64 {
        self.signed_line_distance(p).abs()
    }

    pub fn signed_line_distance(&self, p: Point) -> f64 {
        let len = self.length();
        if len == 0.0 {
            return self.a.distance(p);
        }
        self.vector().cross(p - self.a) / len
    }

    pub fn endpoint_distance(&self, other: &Segment) -> f64 {
        [
            self.a.distance(other.a),
            self.a.distance(other.b),
            self.b.distance(other.a),
            self.b.distance(other.b),
        ]
        .into_iter()
        .fold(f64::INFINITY, f64::min)
    }

    /// Fraction of `other` whose projection falls inside this segment.
    pub fn overlap_fraction(&self, other: &Segment) -> f64 {
        let t0 = self.project(other.a);
        let t1 = self.project(other.b);
        let (lo, hi) = if t0 <= t1 { (t0, t1) } else { (t1, t0) };
        let span = hi - lo;
        if span <= 0.0 {
            return if (0.0..=1.0).contains(&lo) { 1.0 } else { 0.0 };
        }
        let covered = (hi.min(1.0) - lo.max(0.0)).max(0.0);
        covered / span
    }

    /// Intersection of the two infinite lines, with the parameters along
    /// `self` and `other`.
    pub fn line_intersection(&self, other: &Segment) -> Option<(Point, f64, f64)> {
        let r = self.vector();
        let s = other.vector();
        let denom = r.cross(s);
        if denom.abs() < 1e-12 {
            return None;
        }
        let qp = other.a - self.a;
        let t = qp.cross(s) / denom;
        let u = qp.cross(r) / denom;
        Some((self.point_at(t), t, u))
    }

    pub fn intersection(&self, other: &Segment) -> Option<Point> {
        let (p, t, u) = self.line_intersection(other)?;
        if (0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&u) {
            Some(p)
        } else {
            None
        }
    }

    pub fn bounds(&self) -> Bounds {
        Bounds::from_points(&[self.a, self.b]).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    pub fn from_points(points: &[Point]) -> Option<Bounds> {
        let first = points.first()?;
        let mut b = Bounds {
            min_x: first.x,
            min_y: first.y,
            max_x: first.x,
            max_y: first.y,
        };
        for p in &points[1..] {
            b.min_x = b.min_x.min(p.x);
            b.min_y = b.min_y.min(p.y);
            b.max_x = b.max_x.max(p.x);
            b.max_y = b.max_y.max(p.y);
        }
        Some(b)
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn center(&self) -> Point {
        Point::new(
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.min_x && p.x <= self.max_x && p.y >= self.min_y && p.y <= self.max_y
    }

    pub fn union(&self, other: &Bounds) -> Bounds {
        Bounds {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    pub fn grow(&self, amount: f64) -> Bounds {
        Bounds {
            min_x: self.min_x - amount,
            min_y: self.min_y - amount,
            max_x: self.max_x + amount,
            max_y: self.max_y + amount,
        }
    }

    /// Overlap of the two vertical extents divided by the smaller height.
    pub fn vertical_overlap(&self, other: &Bounds) -> f64 {
        let overlap = self.max_y.min(other.max_y) - self.min_y.max(other.min_y);
        let h = self.height().min(other.height());
        if h <= 0.0 {
            return if overlap >= 0.0 { 1.0 } else { 0.0 };
        }
        (overlap / h).max(0.0)
    }

    pub fn corners(&self) -> [Point; 4] {
        [
            Point::new(self.min_x, self.min_y),
            Point::new(self.max_x, self.min_y),
            Point::new(self.max_x, self.max_y),
            Point::new(self.min_x, self.max_y),
        ]
    }
}

/// A convex polygon with its derived metrics cached at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shape {
    vertices: Vec<Point>,
    bounds: Bounds,
    area: f64,
    centroid: Point,
    farthest: (Point, Point),
}

impl Shape {
    /// Builds the convex hull of `points`. Returns `None` for an empty input.
    pub fn from_points(points: &[Point]) -> Option<Shape> {
        let vertices = convex_hull(points);
        if vertices.is_empty() {
            return None;
        }
        let bounds = Bounds::from_points(&vertices)?;
        let area = polygon_area(&vertices);
        let centroid = polygon_centroid(&vertices, area);
        let farthest = farthest_pair(&vertices);
        Some(Shape {
            vertices,
            bounds,
            area,
            centroid,
            farthest,
        })
    }

    pub fn rectangle(bounds: Bounds) -> Shape {
        Shape::from_points(&bounds.corners()).unwrap_or_else(|| Shape::point(bounds.center()))
    }

    pub fn point(p: Point) -> Shape {
        Shape {
            vertices: vec![p],
            bounds: Bounds {
                min_x: p.x,
                min_y: p.y,
                max_x: p.x,
                max_y: p.y,
            },
            area: 0.0,
            centroid: p,
            farthest: (p, p),
        }
    }

    pub fn circle(center: Point, radius: f64, sides: usize) -> Shape {
        let sides = sides.max(3);
        let points: Vec<Point> = (0..sides)
            .map(|k| {
                let t = 2.0 * PI * k as f64 / sides as f64;
                center + Point::new(t.cos(), t.sin()) * radius
            })
            .collect();
        Shape::from_points(&points).unwrap_or_else(|| Shape::point(center))
    }

    pub fn vertices(&self) -> &[Point] {
        &self.vertices
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn area(&self) -> f64 {
        self.area
    }

    pub fn centroid(&self) -> Point {
        self.centroid
    }

    pub fn farthest_pair(&self) -> (Point, Point) {
        self.farthest
    }

    pub fn contains(&self, p: Point) -> bool {
        match self.vertices.len() {
            0 => false,
            1 => self.vertices[0].distance(p) < 1e-9,
            2 => Segment::new(self.vertices[0], self.vertices[1]).distance_to_point(p) < 1e-9,
            n => (0..n).all(|i| {
                let a = self.vertices[i];
                let b = self.vertices[(i + 1) % n];
                (b - a).cross(p - a) >= -1e-9
            }),
        }
    }

    /// Zero inside, otherwise the distance to the nearest boundary point.
    pub fn distance_to(&self, p: Point) -> f64 {
        if self.contains(p) {
            return 0.0;
        }
        self.edges()
            .map(|s| s.distance_to_point(p))
            .fold(f64::INFINITY, f64::min)
    }

    pub fn edges(&self) -> impl Iterator<Item = Segment> + '_ {
        let n = self.vertices.len();
        (0..n).map(move |i| Segment::new(self.vertices[i], self.vertices[(i + 1) % n]))
    }

    pub fn union(&self, other: &Shape) -> Shape {
        let mut pts = self.vertices.clone();
        pts.extend_from_slice(&other.vertices);
        Shape::from_points(&pts).unwrap_or_else(|| self.clone())
    }

    /// Minkowski growth approximated by an octagon around every vertex.
    pub fn grow(&self, amount: f64) -> Shape {
        if amount <= 0.0 {
            return self.clone();
        }
        let mut pts = Vec::with_capacity(self.vertices.len() * 8);
        for &v in &self.vertices {
            for k in 0..8 {
                let t = PI / 4.0 * k as f64;
                pts.push(v + Point::new(t.cos(), t.sin()) * amount);
            }
        }
        Shape::from_points(&pts).unwrap_or_else(|| self.clone())
    }
}

/// Andrew's monotone chain; returns vertices counterclockwise in a y-up frame.
pub fn convex_hull(points: &[Point]) -> Vec<Point> {
    let mut pts: Vec<Point> = points.iter().copied().filter(|p| p.is_finite()).collect();
    pts.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
    pts.dedup_by(|a, b| a.distance_sq(*b) < 1e-18);
    if pts.len() < 3 {
        return pts;
    }

    let mut lower: Vec<Point> = Vec::with_capacity(pts.len());
    for &p in &pts {
        while lower.len() >= 2 {
            let n = lower.len();
            if (lower[n - 1] - lower[n - 2]).cross(p - lower[n - 2]) <= 0.0 {
                lower.pop();
            } else {
                break;
            }
        }
        lower.push(p);
    }

    let mut upper: Vec<Point> = Vec::with_capacity(pts.len());
    for &p in pts.iter().rev() {
        while upper.len() >= 2 {
            let n = upper.len();
            if (upper[n - 1] - upper[n - 2]).cross(p - upper[n - 2]) <= 0.0 {
                upper.pop();
            } else {
                break;
            }
        }
        upper.push(p);
    }

    lower.pop();
    upper.pop();
    lower.extend(upper);
    lower
}

fn polygon_area(vertices: &[Point]) -> f64 {
    let n = vertices.len();
    if n < 3 {
        return 0.0;
    }
    let twice: f64 = (0..n)
        .map(|i| vertices[i].cross(vertices[(i + 1) % n]))
        .sum();
    twice.abs() / 2.0
}

fn polygon_centroid(vertices: &[Point], area: f64) -> Point {
    let n = vertices.len();
    if n < 3 || area < 1e-12 {
        return centroid(vertices).unwrap_or_default();
    }
    let mut cx = 0.0;
    let mut cy = 0.0;
    let mut signed = 0.0;
    for i in 0..n {
        let p = vertices[i];
        let q = vertices[(i + 1) % n];
        let c = p.cross(q);
        signed += c;
        cx += (p.x + q.x) * c;
        cy += (p.y + q.y) * c;
    }
    let k = 1.0 / (3.0 * signed);
    Point::new(cx * k, cy * k)
}

fn farthest_pair(vertices: &[Point]) -> (Point, Point) {
    let mut best = (vertices[0], vertices[0]);
    let mut best_d = 0.0;
    for (i, &p) in vertices.iter().enumerate() {
        for &q in &vertices[i + 1..] {
            let d = p.distance_sq(q);
            if d > best_d {
                best_d = d;
                best = (p, q);
            }
        }
    }
    best
}

/// Row-major 2x3 affine matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineTransform {
    pub m: [[f64; 3]; 2],
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl AffineTransform {
    pub const fn identity() -> Self {
        Self {
            m: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
        }
    }

    /// Basis change: maps lattice coordinates `(i, j)` to `origin + i*u + j*v`.
    pub fn from_basis(origin: Point, u: Point, v: Point) -> Self {
        Self {
            m: [[u.x, v.x, origin.x], [u.y, v.y, origin.y]],
        }
    }

    pub fn apply(&self, p: Point) -> Point {
        Point::new(
            self.m[0][0] * p.x + self.m[0][1] * p.y + self.m[0][2],
            self.m[1][0] * p.x + self.m[1][1] * p.y + self.m[1][2],
        )
    }

    pub fn determinant(&self) -> f64 {
        self.m[0][0] * self.m[1][1] - self.m[0][1] * self.m[1][0]
    }

    /// `None` when the linear part is singular.
    pub fn inverse(&self) -> Option<AffineTransform> {
        let det = self.determinant();
        if det.abs() < 1e-12 || !det.is_finite() {
            return None;
        }
        let [[a, b, tx], [c, d, ty]] = self.m;
        let ia = d / det;
        let ib = -b / det;
        let ic = -c / det;
        let id = a / det;
        Some(AffineTransform {
            m: [
                [ia, ib, -(ia * tx + ib * ty)],
                [ic, id, -(ic * tx + id * ty)],
            ],
        })
    }
}
