//! Area-of-interest polygons loaded from GeoJSON.
//!
//! Coordinates are taken as `(longitude, latitude)` in the same frame as the
//! geocoded reference pixels. Only `Polygon` and `MultiPolygon` geometries
//! contribute; everything else in the file is skipped.

use std::fs;
use std::path::{Path, PathBuf};

use georeg_core::GeoPoint;
use nalgebra::Point2;
use serde_json::Value;

#[derive(thiserror::Error, Debug)]
pub enum AoiError {
    #[error("cannot read AOI file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("AOI file {} is not valid JSON: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("AOI file {} is not GeoJSON: {reason}", .path.display())]
    NotGeoJson { path: PathBuf, reason: String },
}

/// A polygon with an exterior ring and optional holes.
///
/// Rings are stored open (the closing vertex of a GeoJSON ring is dropped).
#[derive(Clone, Debug, PartialEq)]
pub struct Polygon {
    exterior: Vec<Point2<f64>>,
    holes: Vec<Vec<Point2<f64>>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RingPosition {
    Inside,
    Boundary,
    Outside,
}

impl Polygon {
    pub fn new(exterior: Vec<Point2<f64>>, holes: Vec<Vec<Point2<f64>>>) -> Self {
        Self {
            exterior: open_ring(exterior),
            holes: holes.into_iter().map(open_ring).collect(),
        }
    }

    pub fn exterior(&self) -> &[Point2<f64>] {
        &self.exterior
    }

    pub fn holes(&self) -> &[Vec<Point2<f64>>] {
        &self.holes
    }

    /// Strict interior test: points on any ring, or inside a hole, are outside.
    pub fn contains(&self, p: &Point2<f64>) -> bool {
        ring_position(&self.exterior, p) == RingPosition::Inside
            && self
                .holes
                .iter()
                .all(|h| ring_position(h, p) == RingPosition::Outside)
    }
}

/// Union of polygons. A point is inside when some polygon contains it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AreaOfInterest {
    polygons: Vec<Polygon>,
}

impl AreaOfInterest {
    pub fn new(polygons: Vec<Polygon>) -> Self {
        Self { polygons }
    }

    pub fn polygons(&self) -> &[Polygon] {
        &self.polygons
    }

    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty()
    }

    pub fn contains(&self, point: &GeoPoint) -> bool {
        let p = point.to_point();
        self.polygons.iter().any(|poly| poly.contains(&p))
    }

    /// Parse a GeoJSON `FeatureCollection`, `Feature` or bare geometry.
    pub fn from_geojson_str(text: &str) -> Result<Self, serde_json::Error> {
        let root: Value = serde_json::from_str(text)?;
        let mut polygons = Vec::new();
        collect_polygons(&root, &mut polygons);
        Ok(Self { polygons })
    }
}

/// Load all polygons of a GeoJSON file.
pub fn load_polygons(path: impl AsRef<Path>) -> Result<AreaOfInterest, AoiError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| AoiError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let root: Value = serde_json::from_str(&text).map_err(|source| AoiError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    if root.get("type").and_then(Value::as_str).is_none() {
        return Err(AoiError::NotGeoJson {
            path: path.to_path_buf(),
            reason: "top-level object has no \"type\" member".to_string(),
        });
    }

    let mut polygons = Vec::new();
    collect_polygons(&root, &mut polygons);
    if polygons.is_empty() {
        log::warn!(
            "AOI {} contains no usable polygons; every point will be rejected",
            path.display()
        );
    } else {
        log::info!("AOI {}: {} polygon(s)", path.display(), polygons.len());
    }
    Ok(AreaOfInterest { polygons })
}

fn collect_polygons(node: &Value, out: &mut Vec<Polygon>) {
    match node.get("type").and_then(Value::as_str) {
        Some("FeatureCollection") => {
            for f in node.get("features").and_then(Value::as_array).into_iter().flatten() {
                collect_polygons(f, out);
            }
        }
        Some("Feature") => {
            if let Some(g) = node.get("geometry") {
                collect_polygons(g, out);
            }
        }
        Some("GeometryCollection") => {
            for g in node.get("geometries").and_then(Value::as_array).into_iter().flatten() {
                collect_polygons(g, out);
            }
        }
        Some("Polygon") => match node.get("coordinates").and_then(polygon_from_rings) {
            Some(p) => out.push(p),
            None => log::warn!("skipping malformed AOI polygon"),
        },
        Some("MultiPolygon") => {
            let Some(parts) = node.get("coordinates").and_then(Value::as_array) else {
                log::warn!("skipping malformed AOI multipolygon");
                return;
            };
            for part in parts {
                match polygon_from_rings(part) {
                    Some(p) => out.push(p),
                    None => log::warn!("skipping malformed AOI multipolygon part"),
                }
            }
        }
        Some(other) => log::debug!("ignoring AOI geometry of type {other}"),
        None => {}
    }
}

fn polygon_from_rings(rings: &Value) -> Option<Polygon> {
    let rings = rings.as_array()?;
    let (exterior, holes) = rings.split_first()?;
    let exterior = ring_from_value(exterior)?;
    let holes = holes.iter().map(ring_from_value).collect::<Option<Vec<_>>>()?;
    let poly = Polygon::new(exterior, holes);
    (poly.exterior.len() >= 3).then_some(poly)
}

fn ring_from_value(ring: &Value) -> Option<Vec<Point2<f64>>> {
    ring.as_array()?
        .iter()
        .map(|pos| {
            let pos = pos.as_array()?;
            let x = pos.first()?.as_f64()?;
            let y = pos.get(1)?.as_f64()?;
            Some(Point2::new(x, y))
        })
        .collect()
}

fn open_ring(mut ring: Vec<Point2<f64>>) -> Vec<Point2<f64>> {
    if ring.len() > 1 && ring.first() == ring.last() {
        ring.pop();
    }
    ring
}

fn on_segment(a: &Point2<f64>, b: &Point2<f64>, p: &Point2<f64>) -> bool {
    let cross = (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x);
    let scale = (b.x - a.x).abs() + (b.y - a.y).abs();
    if cross.abs() > 1e-12 * scale.max(f64::MIN_POSITIVE) {
        return false;
    }
    p.x >= a.x.min(b.x) && p.x <= a.x.max(b.x) && p.y >= a.y.min(b.y) && p.y <= a.y.max(b.y)
}

/// Even-odd ray casting with an explicit boundary check.
fn ring_position(ring: &[Point2<f64>], p: &Point2<f64>) -> RingPosition {
    let n = ring.len();
    if n < 3 {
        return RingPosition::Outside;
    }
    let mut inside = false;
    for i in 0..n {
        let a = &ring[i];
        let b = &ring[(i + 1) % n];
        if on_segment(a, b, p) {
            return RingPosition::Boundary;
        }
        if (a.y > p.y) != (b.y > p.y) {
            let x = a.x + (p.y - a.y) * (b.x - a.x) / (b.y - a.y);
            if p.x < x {
                inside = !inside;
            }
        }
    }
    if inside {
        RingPosition::Inside
    } else {
        RingPosition::Outside
    }
}
