//! Map shapes indexed by the geofence quad: road edges, circles, and grid
//! cells, plus the axis-aligned `Bounds` and oriented `Area` rectangles the
//! predicates are built from.
//!
//! Every indexable shape answers `touches(&Bounds)` (used with a node's fuzzy
//! bounds at insertion time) and `contains(&Point)` (the exact membership
//! test applied to whatever retrieval returns). Edges are containment-tested
//! through the oriented rectangle derived from their highway width.

use std::sync::Arc;

use thiserror::Error;

use crate::geodesy::{approx_eq, Point, GPS_EPSILON};
use crate::osm::Highway;

// ── Segment intersection ──────────────────────────────────────────────────────

/// Parametric segment-segment intersection for `a→b` against `c→d`.
///
/// Parallel and coincident segments report no intersection; overlapping
/// collinear geometry is instead caught by the endpoint-containment half of
/// the `touches` predicates.
pub fn segments_intersect(a: &Point, b: &Point, c: &Point, d: &Point) -> bool {
    let ab_dlat = b.lat - a.lat;
    let ab_dlon = b.lon - a.lon;
    let cd_dlat = d.lat - c.lat;
    let cd_dlon = d.lon - c.lon;

    let det = -cd_dlat * ab_dlon + ab_dlat * cd_dlon;
    if approx_eq(det, 0.0, GPS_EPSILON) {
        return false;
    }

    let x_dlat = a.lat - c.lat;
    let x_dlon = a.lon - c.lon;

    let s = (-ab_dlon * x_dlat + ab_dlat * x_dlon) / det;
    let t = (cd_dlat * x_dlon - cd_dlon * x_dlat) / det;

    (0.0..=1.0).contains(&s) && (0.0..=1.0).contains(&t)
}

// ── Bounds ────────────────────────────────────────────────────────────────────

/// An axis-aligned rectangle defined by its four corners. Unlike [`Area`]
/// it can never be angled.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Bounds {
    pub nw: Point,
    pub ne: Point,
    pub se: Point,
    pub sw: Point,
}

impl Bounds {
    /// Build a bounds from its southwest and northeast corners.
    pub fn new(sw: Point, ne: Point) -> Self {
        Self {
            nw: Point::new(ne.lat, sw.lon),
            ne,
            se: Point::new(sw.lat, ne.lon),
            sw,
        }
    }

    /// Closed-interval containment test.
    pub fn contains(&self, pt: &Point) -> bool {
        self.sw.lat <= pt.lat && pt.lat <= self.ne.lat && self.sw.lon <= pt.lon && pt.lon <= self.ne.lon
    }

    /// True when both edge endpoints are inside.
    pub fn contains_edge(&self, edge: &Edge) -> bool {
        self.contains(&edge.v1.point) && self.contains(&edge.v2.point)
    }

    /// True when all four cardinal points of the circle are inside.
    pub fn contains_circle(&self, circle: &Circle) -> bool {
        self.contains(&circle.north)
            && self.contains(&circle.south)
            && self.contains(&circle.east)
            && self.contains(&circle.west)
    }

    /// True when the edge crosses at least one of the four boundary segments.
    /// An edge fully inside the bounds does not intersect.
    pub fn intersects_edge(&self, edge: &Edge) -> bool {
        let (a, b) = (&edge.v1.point, &edge.v2.point);
        segments_intersect(a, b, &self.sw, &self.nw)
            || segments_intersect(a, b, &self.nw, &self.ne)
            || segments_intersect(a, b, &self.ne, &self.se)
            || segments_intersect(a, b, &self.sw, &self.se)
    }

    /// True when the segment `a→b` crosses at least one boundary segment.
    pub fn intersects_segment(&self, a: &Point, b: &Point) -> bool {
        segments_intersect(a, b, &self.sw, &self.nw)
            || segments_intersect(a, b, &self.nw, &self.ne)
            || segments_intersect(a, b, &self.ne, &self.se)
            || segments_intersect(a, b, &self.sw, &self.se)
    }

    /// True when any chord between consecutive cardinal points of the circle
    /// crosses the boundary.
    pub fn intersects_circle(&self, circle: &Circle) -> bool {
        self.intersects_segment(&circle.north, &circle.east)
            || self.intersects_segment(&circle.east, &circle.south)
            || self.intersects_segment(&circle.south, &circle.west)
            || self.intersects_segment(&circle.west, &circle.north)
    }

    pub fn contains_or_intersects_edge(&self, edge: &Edge) -> bool {
        self.contains(&edge.v1.point) || self.contains(&edge.v2.point) || self.intersects_edge(edge)
    }

    pub fn contains_or_intersects_circle(&self, circle: &Circle) -> bool {
        self.intersects_circle(circle) || self.contains_circle(circle)
    }

    pub fn west_midpoint(&self) -> Point {
        Point::new(self.sw.lat + self.height() / 2.0, self.sw.lon)
    }

    pub fn east_midpoint(&self) -> Point {
        Point::new(self.sw.lat + self.height() / 2.0, self.ne.lon)
    }

    pub fn north_midpoint(&self) -> Point {
        Point::new(self.ne.lat, self.sw.lon + self.width() / 2.0)
    }

    pub fn south_midpoint(&self) -> Point {
        Point::new(self.sw.lat, self.sw.lon + self.width() / 2.0)
    }

    pub fn center(&self) -> Point {
        Point::new(self.sw.lat + self.height() / 2.0, self.sw.lon + self.width() / 2.0)
    }

    /// East-west extent in longitude degrees.
    pub fn width(&self) -> f64 {
        self.ne.lon - self.sw.lon
    }

    /// North-south extent in latitude degrees.
    pub fn height(&self) -> f64 {
        self.ne.lat - self.sw.lat
    }
}

// ── Vertex ────────────────────────────────────────────────────────────────────

/// A map node: a point with the 64-bit OSM identifier it was loaded under.
///
/// Vertices are shared: every edge incident on a node holds an `Arc` to the
/// same instance, and the loader's id map is the canonical store.
#[derive(Debug, Clone, PartialEq)]
pub struct Vertex {
    pub uid: u64,
    pub point: Point,
}

impl Vertex {
    pub fn new(lat: f64, lon: f64, uid: u64) -> Self {
        Self { uid, point: Point::new(lat, lon) }
    }
}

// ── Edge ──────────────────────────────────────────────────────────────────────

/// Raised when an edge would expand to a rectangle of zero extent.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("edge-derived area has zero width")]
pub struct ZeroAreaError;

/// A road segment between two shared vertices.
///
/// Explicit edges come from map data and carry an OSM way type; implicit
/// edges are inferred from travel behavior off the map.
#[derive(Debug, Clone)]
pub struct Edge {
    pub v1: Arc<Vertex>,
    pub v2: Arc<Vertex>,
    uid: u64,
    way_type: Highway,
    explicit_edge: bool,
}

impl PartialEq for Edge {
    /// Spatial equivalence only: same endpoints in either orientation.
    /// Identifiers are not compared.
    fn eq(&self, other: &Self) -> bool {
        (self.v1.point == other.v1.point && self.v2.point == other.v2.point)
            || (self.v1.point == other.v2.point && self.v2.point == other.v1.point)
    }
}

impl Edge {
    pub fn new(v1: Arc<Vertex>, v2: Arc<Vertex>, way_type: Highway, uid: u64) -> Self {
        Self { v1, v2, uid, way_type, explicit_edge: true }
    }

    /// An edge inferred from trip behavior rather than map data.
    pub fn implicit(v1: Arc<Vertex>, v2: Arc<Vertex>, uid: u64) -> Self {
        Self { v1, v2, uid, way_type: Highway::Other, explicit_edge: false }
    }

    pub fn uid(&self) -> u64 {
        self.uid
    }

    pub fn way_type(&self) -> Highway {
        self.way_type
    }

    /// Corridor width of this segment in meters, from the way-type table.
    pub fn width(&self) -> f64 {
        self.way_type.width()
    }

    pub fn is_explicit(&self) -> bool {
        self.explicit_edge
    }

    pub fn is_implicit(&self) -> bool {
        !self.explicit_edge
    }

    pub fn dlat(&self) -> f64 {
        self.v2.point.lat - self.v1.point.lat
    }

    pub fn dlon(&self) -> f64 {
        self.v2.point.lon - self.v1.point.lon
    }

    /// Approximate segment length in meters.
    pub fn length(&self) -> f64 {
        self.v1.point.distance_to(&self.v2.point)
    }

    /// Haversine segment length in meters.
    pub fn length_haversine(&self) -> f64 {
        self.v1.point.haversine_to(&self.v2.point)
    }

    /// Great-circle bearing from `v1` to `v2`, in degrees.
    pub fn bearing(&self) -> f64 {
        self.v1.point.bearing_to(&self.v2.point)
    }

    /// Distance in meters from `pt` to the closest point on this segment.
    pub fn distance_to_point(&self, pt: &Point) -> f64 {
        let dlat = self.dlat();
        let dlon = self.dlon();
        let len_squared = dlat * dlat + dlon * dlon;

        if approx_eq(len_squared, 0.0, GPS_EPSILON) {
            return pt.distance_to(&self.v1.point);
        }

        let t = ((pt.lat - self.v1.point.lat) * dlat + (pt.lon - self.v1.point.lon) * dlon)
            / len_squared;

        if t <= 0.0 {
            return pt.distance_to(&self.v1.point);
        }
        if t >= 1.0 {
            return pt.distance_to(&self.v2.point);
        }

        let closest = Point::new(self.v1.point.lat + t * dlat, self.v1.point.lon + t * dlon);
        closest.distance_to(pt)
    }

    /// Whether this segment intersects `a→b`.
    pub fn intersects_segment(&self, a: &Point, b: &Point) -> bool {
        segments_intersect(&self.v1.point, &self.v2.point, a, b)
    }

    /// Whether this segment intersects `other`.
    pub fn intersects(&self, other: &Edge) -> bool {
        self.intersects_segment(&other.v1.point, &other.v2.point)
    }

    /// A shape touches a bounds when either endpoint is inside or the
    /// segment crosses the boundary.
    pub fn touches(&self, bounds: &Bounds) -> bool {
        bounds.contains_or_intersects_edge(self)
    }

    /// Expand this edge into its oriented rectangle using the way-type
    /// width, extended `extension` meters beyond each endpoint.
    pub fn to_area(&self, extension: f64) -> Result<Area, ZeroAreaError> {
        self.to_area_with_width(self.width(), extension)
    }

    /// Expand this edge into an oriented rectangle of total width
    /// `cap_width` meters, extended `extension` meters beyond each endpoint.
    pub fn to_area_with_width(&self, cap_width: f64, extension: f64) -> Result<Area, ZeroAreaError> {
        if cap_width <= 0.0 {
            return Err(ZeroAreaError);
        }

        let half_width = cap_width / 2.0;
        let ab_bearing = self.bearing();

        let (p1, p2) = if extension > 0.0 {
            (
                self.v1.point.project((ab_bearing - 180.0) % 360.0, extension),
                self.v2.point.project(ab_bearing, extension),
            )
        } else {
            (self.v1.point, self.v2.point)
        };

        let left_bearing = (ab_bearing - 90.0) % 360.0;
        let right_bearing = (ab_bearing + 90.0) % 360.0;

        Ok(Area::new(
            p1.project(left_bearing, half_width),
            p2.project(left_bearing, half_width),
            p2.project(right_bearing, half_width),
            p1.project(right_bearing, half_width),
        ))
    }
}

// ── Area ──────────────────────────────────────────────────────────────────────

/// An oriented rectangle, stored as four corner points in clockwise traversal
/// order. Derived transiently from an edge during geofence containment tests.
#[derive(Debug, Clone, PartialEq)]
pub struct Area {
    corners: [Point; 4],
}

impl Area {
    /// Corners must be given in clockwise traversal order.
    pub fn new(c0: Point, c1: Point, c2: Point, c3: Point) -> Self {
        Self { corners: [c0, c1, c2, c3] }
    }

    pub fn corners(&self) -> &[Point; 4] {
        &self.corners
    }

    /// Whether `pt` is to the left of (outside) the directed edge starting
    /// at corner `i`.
    fn outside_edge(&self, i: usize, pt: &Point) -> bool {
        let p1 = &self.corners[i];
        let p2 = &self.corners[(i + 1) % 4];

        let c = p1.lat * (p2.lon - p1.lon) - p1.lon * (p2.lat - p1.lat);
        let d = -pt.lat * (p2.lon - p1.lon) + pt.lon * (p2.lat - p1.lat) + c;

        d < 0.0
    }

    /// A point is inside iff it is to the right of (or on) every directed
    /// edge of the clockwise corner traversal. Constant time, valid for
    /// convex quadrilaterals.
    pub fn contains(&self, pt: &Point) -> bool {
        !(self.outside_edge(0, pt)
            || self.outside_edge(1, pt)
            || self.outside_edge(2, pt)
            || self.outside_edge(3, pt))
    }

    /// Corner-in-bounds, bounds-corner-in-area, or boundary crossing.
    pub fn touches(&self, bounds: &Bounds) -> bool {
        if self.corners.iter().any(|c| bounds.contains(c)) {
            return true;
        }

        if self.contains(&bounds.sw)
            || self.contains(&bounds.nw)
            || self.contains(&bounds.se)
            || self.contains(&bounds.ne)
        {
            return true;
        }

        bounds.intersects_segment(&self.corners[0], &self.corners[1])
            || bounds.intersects_segment(&self.corners[1], &self.corners[2])
            || bounds.intersects_segment(&self.corners[2], &self.corners[3])
            || bounds.intersects_segment(&self.corners[3], &self.corners[0])
    }
}

// ── Circle ────────────────────────────────────────────────────────────────────

/// A center point with a radius in meters. The four cardinal perimeter
/// points are precomputed; they carry the bounds interaction tests.
#[derive(Debug, Clone, PartialEq)]
pub struct Circle {
    pub center: Point,
    pub uid: u64,
    pub radius: f64,
    pub north: Point,
    pub south: Point,
    pub east: Point,
    pub west: Point,
}

impl Circle {
    pub fn new(lat: f64, lon: f64, uid: u64, radius: f64) -> Self {
        let center = Point::new(lat, lon);
        Self {
            center,
            uid,
            radius,
            north: center.project(0.0, radius),
            south: center.project(180.0, radius),
            east: center.project(90.0, radius),
            west: center.project(270.0, radius),
        }
    }

    /// Whether `pt` lies within the radius of the center.
    pub fn contains(&self, pt: &Point) -> bool {
        self.center.distance_to(pt) <= self.radius
    }

    /// A circle touches a bounds when its center or any cardinal point is
    /// inside the bounds, or any bounds corner is inside the circle (the
    /// bounds sits strictly within the circle).
    pub fn touches(&self, bounds: &Bounds) -> bool {
        if bounds.contains(&self.center)
            || bounds.contains(&self.north)
            || bounds.contains(&self.south)
            || bounds.contains(&self.east)
            || bounds.contains(&self.west)
        {
            return true;
        }

        self.contains(&bounds.nw)
            || self.contains(&bounds.ne)
            || self.contains(&bounds.se)
            || self.contains(&bounds.sw)
    }
}

// ── Grid ──────────────────────────────────────────────────────────────────────

/// One cell of a disjoint grid covering, addressed by row and column.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    pub bounds: Bounds,
    pub row: u32,
    pub col: u32,
}

impl Grid {
    pub fn new(sw: Point, ne: Point, row: u32, col: u32) -> Self {
        Self { bounds: Bounds::new(sw, ne), row, col }
    }

    pub fn contains(&self, pt: &Point) -> bool {
        self.bounds.contains(pt)
    }

    /// Any corner of either rectangle inside the other.
    pub fn touches(&self, bounds: &Bounds) -> bool {
        if bounds.contains(&self.bounds.sw)
            || bounds.contains(&self.bounds.ne)
            || bounds.contains(&self.bounds.se)
            || bounds.contains(&self.bounds.nw)
        {
            return true;
        }

        self.contains(&bounds.sw)
            || self.contains(&bounds.ne)
            || self.contains(&bounds.se)
            || self.contains(&bounds.nw)
    }

    /// Build a disjoint covering of grid cells anchored at `nw_point`,
    /// each roughly `grid_width` meters square, extending south to
    /// `lat_threshold` and east to `lon_threshold`.
    pub fn build_grid(
        nw_point: Point,
        grid_width: f64,
        lat_threshold: f64,
        lon_threshold: f64,
    ) -> Vec<Arc<Grid>> {
        let mut cells = Vec::new();
        let mut row = 0u32;

        let mut height_nw = nw_point;

        while height_nw.lat > lat_threshold {
            let mut col = 0u32;
            let mut width_nw = height_nw;
            let mut next_height_nw = None;

            while width_nw.lon < lon_threshold {
                let mut sw_node = width_nw.project(180.0, grid_width);
                let mut ne_node = width_nw.project(90.0, grid_width);
                // Keep the covering exactly aligned on the shared boundaries.
                sw_node.lon = width_nw.lon;
                ne_node.lat = width_nw.lat;

                cells.push(Arc::new(Grid::new(sw_node, ne_node, row, col)));

                if next_height_nw.is_none() {
                    next_height_nw = Some(Point::new(sw_node.lat, sw_node.lon));
                }

                width_nw = Point::new(ne_node.lat, ne_node.lon);
                col += 1;
            }

            match next_height_nw {
                Some(nw) => height_nw = nw,
                None => break,
            }
            row += 1;
        }

        cells
    }
}

// ── Shape ─────────────────────────────────────────────────────────────────────

/// The closed set of shapes the quad indexes. Cheap to clone: every variant
/// is an `Arc`.
#[derive(Debug, Clone)]
pub enum Shape {
    Edge(Arc<Edge>),
    Circle(Arc<Circle>),
    Grid(Arc<Grid>),
}

impl Shape {
    /// The insertion predicate: does this shape overlap the given bounds.
    pub fn touches(&self, bounds: &Bounds) -> bool {
        match self {
            Shape::Edge(e) => e.touches(bounds),
            Shape::Circle(c) => c.touches(bounds),
            Shape::Grid(g) => g.touches(bounds),
        }
    }
}
