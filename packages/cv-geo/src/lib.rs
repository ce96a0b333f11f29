//! # cv-geo
//!
//! Geofence primitives for connected-vehicle privacy filtering.
//!
//! The crate covers the read-only spatial side of the privacy module:
//! - `geodesy`: lat/lon points and spherical math (equirectangular and
//!   haversine distance, bearing, great-circle projection)
//! - `shapes`: the map shapes a geofence is built from (road edges with
//!   OSM-typed widths, circles, grid cells) and their containment predicates
//! - `osm`: the highway-type table driving edge-to-corridor expansion
//! - `quad`: the fuzzy-insertion / crisp-retrieval spatial index
//! - `loader`: the shape CSV reader/writer feeding the index at startup
//!
//! Build order at startup: `loader::read_shapes` → `QuadTree::insert` each
//! shape → share the tree read-only across message workers.

pub mod geodesy;
pub mod loader;
pub mod osm;
pub mod quad;
pub mod shapes;

pub use geodesy::{Point, EARTH_RADIUS_M, GPS_EPSILON};
pub use loader::{read_shapes, write_shapes, ShapeFileError, ShapeSet};
pub use osm::Highway;
pub use quad::{QuadConfig, QuadTree};
pub use shapes::{Area, Bounds, Circle, Edge, Grid, Shape, Vertex, ZeroAreaError};
