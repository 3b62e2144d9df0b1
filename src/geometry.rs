//! Bounding-polygon math shared by every stage.
//!
//! ## Coordinate spaces
//!
//! The two backends speak different coordinate languages. The cloud analyser
//! reports polygons in the page's own unit (inches or pixels) and the local
//! parser reports PDF points. Downstream consumers only ever see the unit
//! square `[0,1] × [0,1]`.
//!
//! A polygon that has been divided by the page size once must never be divided
//! again, and looking at the values cannot tell you whether that already
//! happened (a tiny page in inches is numerically "normalized"). The space is
//! therefore part of the type: [`RawPolygon`] lives in page space,
//! [`BoundingPolygon`] in the unit square, and [`normalize`] is the only way
//! from one to the other.
//!
//! All polygons carry exactly four corners in the order top-left, top-right,
//! bottom-right, bottom-left.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::marker::PhantomData;

/// Marker for polygons expressed in the backend's native page space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PageSpace {}

/// Marker for polygons rescaled into the unit square.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Normalized {}

/// A single polygon vertex.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Four-corner polygon tagged with its coordinate space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Polygon<S> {
    points: [Point; 4],
    #[serde(skip)]
    space: PhantomData<S>,
}

/// Polygon in page coordinates (points, inches or pixels).
pub type RawPolygon = Polygon<PageSpace>;

/// Polygon in unit-square coordinates.
pub type BoundingPolygon = Polygon<Normalized>;

impl<S> Polygon<S> {
    /// Build a polygon from four corners (TL, TR, BR, BL).
    pub fn from_points(points: [Point; 4]) -> Self {
        Self {
            points,
            space: PhantomData,
        }
    }

    /// Axis-aligned rectangle from its left/top/right/bottom edges.
    pub fn from_rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self::from_points([
            Point::new(x0, y0),
            Point::new(x1, y0),
            Point::new(x1, y1),
            Point::new(x0, y1),
        ])
    }

    /// Parse a flat `[x1, y1, x2, y2, x3, y3, x4, y4]` coordinate list.
    ///
    /// Returns `None` unless exactly eight finite numbers are supplied.
    pub fn from_flat(coords: &[f64]) -> Option<Self> {
        if coords.len() != 8 || coords.iter().any(|c| !c.is_finite()) {
            return None;
        }
        Some(Self::from_points([
            Point::new(coords[0], coords[1]),
            Point::new(coords[2], coords[3]),
            Point::new(coords[4], coords[5]),
            Point::new(coords[6], coords[7]),
        ]))
    }

    pub fn points(&self) -> &[Point; 4] {
        &self.points
    }

    pub fn min_x(&self) -> f64 {
        fold(&self.points, |p| p.x, f64::min)
    }

    pub fn max_x(&self) -> f64 {
        fold(&self.points, |p| p.x, f64::max)
    }

    pub fn min_y(&self) -> f64 {
        fold(&self.points, |p| p.y, f64::min)
    }

    pub fn max_y(&self) -> f64 {
        fold(&self.points, |p| p.y, f64::max)
    }

    /// Mean of the four corner `y` values; used for top-to-bottom ordering.
    pub fn mean_y(&self) -> f64 {
        self.points.iter().map(|p| p.y).sum::<f64>() / 4.0
    }

    /// Area of the axis-aligned rectangle spanned by the polygon.
    pub fn area(&self) -> f64 {
        (self.max_x() - self.min_x()) * (self.max_y() - self.min_y())
    }

    /// Whether `point` lies inside (or on) the axis-aligned extent.
    pub fn contains(&self, point: &Point) -> bool {
        point.x >= self.min_x()
            && point.x <= self.max_x()
            && point.y >= self.min_y()
            && point.y <= self.max_y()
    }
}

fn fold(points: &[Point; 4], axis: impl Fn(&Point) -> f64, pick: fn(f64, f64) -> f64) -> f64 {
    points.iter().map(axis).reduce(pick).unwrap_or(0.0)
}

/// Rescale a page-space polygon into the unit square.
///
/// Every `x` is divided by `width` and every `y` by `height`. With
/// `width == height == 1` this is the identity.
pub fn normalize(polygon: &RawPolygon, width: f64, height: f64) -> BoundingPolygon {
    let p = polygon.points();
    Polygon::from_points([
        scale(p[0], width, height),
        scale(p[1], width, height),
        scale(p[2], width, height),
        scale(p[3], width, height),
    ])
}

fn scale(point: Point, width: f64, height: f64) -> Point {
    Point::new(point.x / width, point.y / height)
}

/// Smallest axis-aligned polygon containing every input polygon.
///
/// Returns `None` for an empty input.
pub fn envelope<'a, S: 'a>(polygons: impl IntoIterator<Item = &'a Polygon<S>>) -> Option<Polygon<S>> {
    let mut iter = polygons.into_iter();
    let first = iter.next()?;
    let (mut x0, mut y0, mut x1, mut y1) = (first.min_x(), first.min_y(), first.max_x(), first.max_y());
    for polygon in iter {
        x0 = x0.min(polygon.min_x());
        y0 = y0.min(polygon.min_y());
        x1 = x1.max(polygon.max_x());
        y1 = y1.max(polygon.max_y());
    }
    Some(Polygon::from_rect(x0, y0, x1, y1))
}

/// Intersection area over the smaller of the two areas.
///
/// Returns `0.0` when the rectangles do not intersect or the smaller one has
/// no area.
pub fn overlap_ratio<S>(a: &Polygon<S>, b: &Polygon<S>) -> f64 {
    let x_left = a.min_x().max(b.min_x());
    let x_right = a.max_x().min(b.max_x());
    let y_top = a.min_y().max(b.min_y());
    let y_bottom = a.max_y().min(b.max_y());

    if x_right < x_left || y_bottom < y_top {
        return 0.0;
    }

    let min_area = a.area().min(b.area());
    if min_area <= 0.0 {
        return 0.0;
    }

    (x_right - x_left) * (y_bottom - y_top) / min_area
}

/// Total order on the mean vertical position; NaN sorts as equal.
pub fn cmp_mean_y<S>(a: &Polygon<S>, b: &Polygon<S>) -> Ordering {
    a.mean_y().partial_cmp(&b.mean_y()).unwrap_or(Ordering::Equal)
}
