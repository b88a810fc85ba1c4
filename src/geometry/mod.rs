//! Geometry values and the coordinate reference systems attached to them.
//!
//! The store treats geometry as opaque data. The only operations it needs
//! (CRS equivalence, reprojection and resampling) go through the
//! [`GeometryTransformer`] service so callers can plug in a real projection
//! library.

mod transform;

pub use transform::{Affine, AffineTransformer, GeometryTransformer};

use serde::{Deserialize, Serialize};
use std::fmt;

/// A coordinate reference system identified by its authority code,
/// e.g. `EPSG:4326`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Crs(String);

impl Crs {
    /// Codes are normalized to upper case without surrounding whitespace so
    /// `epsg:4326` and `EPSG:4326` compare equal.
    pub fn new(code: impl AsRef<str>) -> Self {
        Crs(code.as_ref().trim().to_ascii_uppercase())
    }

    pub fn code(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coord {
    pub x: f64,
    pub y: f64,
}

impl Coord {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Envelope {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x: min_x.min(max_x),
            min_y: min_y.min(max_y),
            max_x: min_x.max(max_x),
            max_y: min_y.max(max_y),
        }
    }

    fn of_point(c: Coord) -> Self {
        Self::new(c.x, c.y, c.x, c.y)
    }

    fn expand(&mut self, c: Coord) {
        self.min_x = self.min_x.min(c.x);
        self.min_y = self.min_y.min(c.y);
        self.max_x = self.max_x.max(c.x);
        self.max_y = self.max_y.max(c.y);
    }

    pub fn intersects(&self, other: &Envelope) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }

    pub fn contains(&self, c: Coord) -> bool {
        c.x >= self.min_x && c.x <= self.max_x && c.y >= self.min_y && c.y <= self.max_y
    }
}

/// Simple feature geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Geometry {
    Point(Coord),
    LineString(Vec<Coord>),
    /// Exterior ring first, then holes.
    Polygon(Vec<Vec<Coord>>),
}

impl Geometry {
    pub fn point(x: f64, y: f64) -> Self {
        Geometry::Point(Coord::new(x, y))
    }

    pub fn line(coords: &[(f64, f64)]) -> Self {
        Geometry::LineString(coords.iter().map(|&(x, y)| Coord::new(x, y)).collect())
    }

    pub fn polygon(exterior: &[(f64, f64)]) -> Self {
        Geometry::Polygon(vec![exterior
            .iter()
            .map(|&(x, y)| Coord::new(x, y))
            .collect()])
    }

    /// Bounding box, or `None` for an empty geometry.
    pub fn envelope(&self) -> Option<Envelope> {
        let mut coords = self.coords();
        let first = coords.next()?;
        let mut env = Envelope::of_point(first);
        for c in coords {
            env.expand(c);
        }
        Some(env)
    }

    pub fn coords(&self) -> Box<dyn Iterator<Item = Coord> + '_> {
        match self {
            Geometry::Point(c) => Box::new(std::iter::once(*c)),
            Geometry::LineString(coords) => Box::new(coords.iter().copied()),
            Geometry::Polygon(rings) => Box::new(rings.iter().flat_map(|r| r.iter().copied())),
        }
    }

    pub fn map_coords(&self, f: impl Fn(Coord) -> Coord) -> Geometry {
        match self {
            Geometry::Point(c) => Geometry::Point(f(*c)),
            Geometry::LineString(coords) => {
                Geometry::LineString(coords.iter().map(|c| f(*c)).collect())
            }
            Geometry::Polygon(rings) => Geometry::Polygon(
                rings
                    .iter()
                    .map(|ring| ring.iter().map(|c| f(*c)).collect())
                    .collect(),
            ),
        }
    }
}

/// A geometry together with the CRS its coordinates are expressed in.
///
/// `crs` is optional: a value without one is taken to be in the CRS its
/// attribute declares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryValue {
    pub geometry: Geometry,
    pub crs: Option<Crs>,
}

impl GeometryValue {
    pub fn new(geometry: Geometry) -> Self {
        Self {
            geometry,
            crs: None,
        }
    }

    pub fn with_crs(geometry: Geometry, crs: Crs) -> Self {
        Self {
            geometry,
            crs: Some(crs),
        }
    }
}
