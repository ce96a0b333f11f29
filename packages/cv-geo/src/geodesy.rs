//! Spherical geodesy primitives.
//!
//! Everything here works on decimal-degree lat/lon pairs. Distances use the
//! equirectangular approximation (fast, good to well under a metre at the
//! map-segment scale the quad operates on); a haversine variant exists for
//! the callers that want the slower reference formula. Projection is the
//! standard great-circle destination problem.

/// Earth radius in meters (WGS-84 equatorial).
pub const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Absolute tolerance used by every coordinate comparison in the crate.
pub const GPS_EPSILON: f64 = f64::EPSILON * 100.0;

/// Absolute-tolerance float comparison.
pub fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
    (a - b).abs() < epsilon
}

/// Normalize a longitude in degrees to the (-180, 180] wrap.
fn normalize_lon(lon: f64) -> f64 {
    (lon + 540.0) % 360.0 - 180.0
}

/// A 2D GPS coordinate in decimal degrees, e.g. (42.2791, -83.7392).
#[derive(Debug, Clone, Copy, Default)]
pub struct Point {
    pub lat: f64,
    pub lon: f64,
}

impl PartialEq for Point {
    /// Coordinate comparison within [`GPS_EPSILON`].
    fn eq(&self, other: &Self) -> bool {
        approx_eq(self.lat, other.lat, GPS_EPSILON) && approx_eq(self.lon, other.lon, GPS_EPSILON)
    }
}

impl Point {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    fn latr(&self) -> f64 {
        self.lat.to_radians()
    }

    fn lonr(&self) -> f64 {
        self.lon.to_radians()
    }

    /// Equirectangular-approximation distance to `other`, in meters.
    pub fn distance_to(&self, other: &Point) -> f64 {
        let x = (other.lonr() - self.lonr()) * ((self.latr() + other.latr()) / 2.0).cos();
        let y = other.latr() - self.latr();
        (x * x + y * y).sqrt() * EARTH_RADIUS_M
    }

    /// Haversine distance to `other`, in meters.
    pub fn haversine_to(&self, other: &Point) -> f64 {
        let x = ((other.lat - self.lat).to_radians() / 2.0).sin();
        let y = ((other.lon - self.lon).to_radians() / 2.0).sin();

        let a = x * x + self.latr().cos() * other.latr().cos() * y * y;
        2.0 * a.sqrt().asin() * EARTH_RADIUS_M
    }

    /// Initial great-circle bearing to `other`, in degrees normalized to
    /// [0, 360).
    pub fn bearing_to(&self, other: &Point) -> f64 {
        let dlon = other.lonr() - self.lonr();

        let x = dlon.sin() * other.latr().cos();
        let y = self.latr().cos() * other.latr().sin()
            - self.latr().sin() * other.latr().cos() * dlon.cos();

        (x.atan2(y).to_degrees() + 360.0) % 360.0
    }

    /// Great-circle midpoint between this point and `other`.
    pub fn midpoint(&self, other: &Point) -> Point {
        let dlon = other.lonr() - self.lonr();
        let bx = other.latr().cos() * dlon.cos();
        let by = other.latr().cos() * dlon.sin();

        let latr = (self.latr().sin() + other.latr().sin())
            .atan2(((self.latr().cos() + bx).powi(2) + by * by).sqrt());
        let lonr = self.lonr() + by.atan2(self.latr().cos() + bx);

        Point::new(latr.to_degrees(), normalize_lon(lonr.to_degrees()))
    }

    /// Destination point after travelling `distance` meters along the given
    /// bearing (degrees).
    pub fn project(&self, bearing: f64, distance: f64) -> Point {
        let d = distance / EARTH_RADIUS_M;
        let b = bearing.to_radians();

        let latr = (self.latr().sin() * d.cos() + self.latr().cos() * d.sin() * b.cos()).asin();
        let lonr = self.lonr()
            + (b.sin() * d.sin() * self.latr().cos()).atan2(d.cos() - self.latr().sin() * latr.sin());

        Point::new(latr.to_degrees(), normalize_lon(lonr.to_degrees()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Two points roughly 1.5 km apart in Ann Arbor, MI.
    const A: Point = Point { lat: 42.2791, lon: -83.7392 };
    const B: Point = Point { lat: 42.2891, lon: -83.7292 };

    #[test]
    fn distance_agrees_with_haversine_at_small_scale() {
        let d1 = A.distance_to(&B);
        let d2 = A.haversine_to(&B);
        assert!(d1 > 1000.0 && d1 < 2000.0);
        assert!((d1 - d2).abs() < 1.0, "equirect {d1} vs haversine {d2}");
    }

    #[test]
    fn distance_is_symmetric_and_zero_on_self() {
        assert!((A.distance_to(&B) - B.distance_to(&A)).abs() < 1e-9);
        assert!(A.distance_to(&A).abs() < 1e-9);
    }

    #[test]
    fn bearing_is_normalized() {
        let north = Point::new(43.0, -83.7392);
        let south = Point::new(41.0, -83.7392);
        assert!(A.bearing_to(&north).abs() < 1e-6);
        assert!((A.bearing_to(&south) - 180.0).abs() < 1e-6);

        let west = Point::new(42.2791, -84.5);
        let b = A.bearing_to(&west);
        assert!((0.0..360.0).contains(&b));
        assert!((b - 270.0).abs() < 1.0);
    }

    #[test]
    fn project_round_trips_bearing_and_distance() {
        // project(p, bearing(p, q), distance(p, q)) lands within 1 m of q for
        // points under 100 km apart.
        let cases = [
            (A, B),
            (A, Point::new(42.9, -83.0)),
            (Point::new(35.0, -120.0), Point::new(35.4, -119.6)),
        ];

        for (p, q) in cases {
            let r = p.project(p.bearing_to(&q), p.haversine_to(&q));
            assert!(
                r.haversine_to(&q) < 1.0,
                "round trip missed: ({}, {}) -> ({}, {})",
                q.lat,
                q.lon,
                r.lat,
                r.lon
            );
        }
    }

    #[test]
    fn project_normalizes_longitude_across_antimeridian() {
        let p = Point::new(0.0, 179.9);
        let q = p.project(90.0, 50_000.0);
        assert!(q.lon > -180.0 && q.lon <= 180.0);
        assert!(q.lon < 0.0, "expected wrap to the western hemisphere, got {}", q.lon);
    }

    #[test]
    fn midpoint_lies_between() {
        let m = A.midpoint(&B);
        assert!((m.lat - 42.2841).abs() < 1e-3);
        assert!((m.lon + 83.7342).abs() < 1e-3);
    }

    #[test]
    fn approx_point_equality() {
        let p = Point::new(42.0, -83.0);
        let q = Point::new(42.0 + f64::EPSILON * 10.0, -83.0);
        assert_eq!(p, q);
        assert_ne!(p, Point::new(42.0001, -83.0));
    }
}
