//! Shape file reader and writer.
//!
//! The shape file is a CSV with header `type,id,geography,attributes`
//! carrying a heterogeneous mix of circles, edges, and grid cells:
//!
//! ```text
//! circle,<uid>,<lat>:<lon>:<radiusMeters>
//! edge,<uid>,<v1uid>;<v1lat>;<v1lon>:<v2uid>;<v2lat>;<v2lon>,way_type=<name>:way_id=<id>
//! grid,<row>_<col>,<swLat>:<swLon>:<neLat>:<neLon>
//! ```
//!
//! Malformed lines are reported and skipped; only an unreadable file or a
//! missing header aborts the load. Vertices are deduplicated by uid so that
//! edges sharing a map node share the same `Vertex` instance.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use crate::geodesy::{approx_eq, Point, GPS_EPSILON};
use crate::osm::Highway;
use crate::shapes::{Circle, Edge, Grid, Shape, Vertex};

/// Fatal shape-file problems.
#[derive(Debug, Error)]
pub enum ShapeFileError {
    #[error("could not open shape file {path}")]
    Open {
        path: String,
        #[source]
        source: csv::Error,
    },
    #[error("shape file {path} is missing its header")]
    MissingHeader { path: String },
    #[error("failed writing shape file {path}")]
    Write {
        path: String,
        #[source]
        source: csv::Error,
    },
}

/// Recoverable per-line problems; logged by the reader and skipped.
#[derive(Debug, Error)]
enum LineError {
    #[error("too few or too many fields in shape specification: {0}")]
    FieldCount(usize),
    #[error("unknown shape type: {0}")]
    UnknownType(String),
    #[error("malformed number: {0}")]
    Number(String),
    #[error("bad latitude: {0}")]
    BadLatitude(f64),
    #[error("bad longitude: {0}")]
    BadLongitude(f64),
    #[error("bad radius: {0}")]
    BadRadius(f64),
    #[error("way type {} is excluded from the geofence", .0.name())]
    Blacklisted(Highway),
    #[error("too many or too few points to define an edge: {0}")]
    EdgePointCount(usize),
    #[error("too many or too few elements to define a point: {0}")]
    PointComponentCount(usize),
    #[error("edge endpoints share vertex id {0}")]
    SameEndpoint(u64),
    #[error("grid id is missing row/col fields")]
    GridId,
    #[error("wrong number of elements for {what}: {count}")]
    ElementCount { what: &'static str, count: usize },
}

/// The shapes loaded from one file, ready for quad insertion.
#[derive(Debug, Default)]
pub struct ShapeSet {
    pub edges: Vec<Arc<Edge>>,
    pub circles: Vec<Arc<Circle>>,
    pub grids: Vec<Arc<Grid>>,
}

impl ShapeSet {
    pub fn len(&self) -> usize {
        self.edges.len() + self.circles.len() + self.grids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All shapes as quad-insertable values.
    pub fn shapes(&self) -> impl Iterator<Item = Shape> + '_ {
        self.edges
            .iter()
            .map(|e| Shape::Edge(Arc::clone(e)))
            .chain(self.circles.iter().map(|c| Shape::Circle(Arc::clone(c))))
            .chain(self.grids.iter().map(|g| Shape::Grid(Arc::clone(g))))
    }
}

/// Read a shape file, skipping malformed lines with a warning.
pub fn read_shapes(path: impl AsRef<Path>) -> Result<ShapeSet, ShapeFileError> {
    let path_str = path.as_ref().display().to_string();

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .has_headers(true)
        .from_path(path.as_ref())
        .map_err(|source| ShapeFileError::Open { path: path_str.clone(), source })?;

    let headers = reader
        .headers()
        .map_err(|source| ShapeFileError::Open { path: path_str.clone(), source })?;
    if headers.is_empty() || headers.get(0).map_or(true, str::is_empty) {
        return Err(ShapeFileError::MissingHeader { path: path_str });
    }

    let mut loader = Loader::default();

    for (index, record) in reader.records().enumerate() {
        // +2: one for the header, one for 1-based numbering.
        let line = index + 2;
        match record {
            Ok(record) => {
                if let Err(e) = loader.make_shape(&record) {
                    warn!(line, "skipping shape: {e}");
                }
            }
            Err(e) => warn!(line, "skipping unreadable record: {e}"),
        }
    }

    Ok(loader.shapes)
}

/// Write a shape set back out in the shape-file format.
pub fn write_shapes(path: impl AsRef<Path>, shapes: &ShapeSet) -> Result<(), ShapeFileError> {
    let path_str = path.as_ref().display().to_string();
    let wrap = |source: csv::Error| ShapeFileError::Write { path: path_str.clone(), source };

    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_path(path.as_ref())
        .map_err(wrap)?;

    writer.write_record(["type", "id", "geography", "attributes"]).map_err(wrap)?;

    for circle in &shapes.circles {
        writer
            .write_record(&[
                "circle".to_string(),
                circle.uid.to_string(),
                format!("{}:{}:{}", circle.center.lat, circle.center.lon, circle.radius),
            ])
            .map_err(wrap)?;
    }

    for edge in &shapes.edges {
        writer
            .write_record(&[
                "edge".to_string(),
                edge.uid().to_string(),
                format!(
                    "{};{};{}:{};{};{}",
                    edge.v1.uid,
                    edge.v1.point.lat,
                    edge.v1.point.lon,
                    edge.v2.uid,
                    edge.v2.point.lat,
                    edge.v2.point.lon
                ),
                format!("way_type={}:way_id={}", edge.way_type().name(), edge.uid()),
            ])
            .map_err(wrap)?;
    }

    for grid in &shapes.grids {
        writer
            .write_record(&[
                "grid".to_string(),
                format!("{}_{}", grid.row, grid.col),
                format!(
                    "{}:{}:{}:{}",
                    grid.bounds.sw.lat, grid.bounds.sw.lon, grid.bounds.ne.lat, grid.bounds.ne.lon
                ),
            ])
            .map_err(wrap)?;
    }

    writer.flush().map_err(|e| ShapeFileError::Write { path: path_str.clone(), source: e.into() })
}

/// Accumulates shapes and the canonical vertex store during a read.
#[derive(Default)]
struct Loader {
    vertices: HashMap<u64, Arc<Vertex>>,
    shapes: ShapeSet,
}

impl Loader {
    fn make_shape(&mut self, record: &csv::StringRecord) -> Result<(), LineError> {
        if record.len() < 3 || record.len() > 4 {
            return Err(LineError::FieldCount(record.len()));
        }

        match &record[0] {
            "circle" => self.make_circle(record),
            "edge" => self.make_edge(record),
            "grid" => self.make_grid(record),
            other => Err(LineError::UnknownType(other.to_string())),
        }
    }

    fn make_circle(&mut self, record: &csv::StringRecord) -> Result<(), LineError> {
        let uid = parse_u64(&record[1])?;

        let parts: Vec<&str> = record[2].split(':').collect();
        if parts.len() != 3 {
            return Err(LineError::ElementCount { what: "circle center", count: parts.len() });
        }

        let lat = parse_f64(parts[0])?;
        check_latitude(lat)?;
        let lon = parse_f64(parts[1])?;
        check_longitude(lon)?;

        let radius = parse_f64(parts[2])?;
        if radius < 0.0 {
            return Err(LineError::BadRadius(radius));
        }

        self.shapes.circles.push(Arc::new(Circle::new(lat, lon, uid, radius)));
        Ok(())
    }

    fn make_edge(&mut self, record: &csv::StringRecord) -> Result<(), LineError> {
        // Attributes come first so the blacklist can reject the line before
        // any vertex is interned.
        let mut way_type = Highway::Other;
        if let Some(atts) = record.get(3) {
            for att in atts.split(':') {
                if let Some((key, value)) = att.split_once('=') {
                    let (key, value) = (key.trim(), value.trim());
                    if key == "way_type" && !value.is_empty() {
                        way_type = Highway::from_name(value);
                    }
                }
            }
        }

        if way_type.is_blacklisted() {
            return Err(LineError::Blacklisted(way_type));
        }

        let edge_id = parse_u64(&record[1])?;

        let points: Vec<&str> = record[2].split(':').collect();
        if points.len() != 2 {
            return Err(LineError::EdgePointCount(points.len()));
        }

        let v1 = self.intern_vertex(points[0])?;
        let v2 = self.intern_vertex(points[1])?;

        if v1.uid == v2.uid {
            return Err(LineError::SameEndpoint(v1.uid));
        }

        self.shapes.edges.push(Arc::new(Edge::new(v1, v2, way_type, edge_id)));
        Ok(())
    }

    fn make_grid(&mut self, record: &csv::StringRecord) -> Result<(), LineError> {
        let (row, col) = record[1].split_once('_').ok_or(LineError::GridId)?;
        let row: u32 = row.parse().map_err(|_| LineError::Number(record[1].to_string()))?;
        let col: u32 = col.parse().map_err(|_| LineError::Number(record[1].to_string()))?;

        let parts: Vec<&str> = record[2].split(':').collect();
        if parts.len() != 4 {
            return Err(LineError::ElementCount { what: "grid bounds", count: parts.len() });
        }

        let sw_lat = parse_f64(parts[0])?;
        check_latitude(sw_lat)?;
        let sw_lon = parse_f64(parts[1])?;
        check_longitude(sw_lon)?;
        let ne_lat = parse_f64(parts[2])?;
        check_latitude(ne_lat)?;
        let ne_lon = parse_f64(parts[3])?;
        check_longitude(ne_lon)?;

        self.shapes.grids.push(Arc::new(Grid::new(
            Point::new(sw_lat, sw_lon),
            Point::new(ne_lat, ne_lon),
            row,
            col,
        )));
        Ok(())
    }

    /// Resolve a `<uid>;<lat>;<lon>` triple against the canonical vertex
    /// store, interning it on first sight.
    fn intern_vertex(&mut self, triple: &str) -> Result<Arc<Vertex>, LineError> {
        let parts: Vec<&str> = triple.split(';').collect();
        if parts.len() != 3 {
            return Err(LineError::PointComponentCount(parts.len()));
        }

        let uid = parse_u64(parts[0])?;
        let lat = parse_f64(parts[1])?;
        let lon = parse_f64(parts[2])?;

        if let Some(existing) = self.vertices.get(&uid) {
            if !approx_eq(existing.point.lat, lat, GPS_EPSILON)
                || !approx_eq(existing.point.lon, lon, GPS_EPSILON)
            {
                warn!(uid, "identical vertex id with different coordinates");
            }
            return Ok(Arc::clone(existing));
        }

        check_latitude(lat)?;
        check_longitude(lon)?;

        let vertex = Arc::new(Vertex::new(lat, lon, uid));
        self.vertices.insert(uid, Arc::clone(&vertex));
        Ok(vertex)
    }
}

fn parse_u64(s: &str) -> Result<u64, LineError> {
    s.trim().parse().map_err(|_| LineError::Number(s.to_string()))
}

fn parse_f64(s: &str) -> Result<f64, LineError> {
    s.trim().parse().map_err(|_| LineError::Number(s.to_string()))
}

fn check_latitude(lat: f64) -> Result<(), LineError> {
    if !(-84.0..=80.0).contains(&lat) {
        return Err(LineError::BadLatitude(lat));
    }
    Ok(())
}

fn check_longitude(lon: f64) -> Result<(), LineError> {
    if lon >= 180.0 || lon <= -180.0 {
        return Err(LineError::BadLongitude(lon));
    }
    Ok(())
}
