use std::collections::HashMap;

use super::{Coord, Crs, Geometry};
use crate::error::StoreError;

/// Geometry service consumed by the reprojection and resampling cursors.
///
/// Implementations must be cheap to share: the pipeline holds one behind an
/// `Arc` for the lifetime of every cursor it builds.
pub trait GeometryTransformer: Send + Sync {
    /// Whether two CRS describe the same coordinate space.
    fn equivalent(&self, a: &Crs, b: &Crs) -> bool {
        a == b
    }

    /// Transform `geometry` from `from` into `to`.
    fn reproject(&self, geometry: &Geometry, from: &Crs, to: &Crs)
        -> Result<Geometry, StoreError>;

    /// Simplify `geometry` to the given resolution along each axis.
    fn resample(&self, geometry: &Geometry, res_x: f64, res_y: f64)
        -> Result<Geometry, StoreError>;
}

/// 2D affine transform: `x' = a*x + b*y + c`, `y' = d*x + e*y + f`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Affine {
    pub fn identity() -> Self {
        Self::scale_translate(1.0, 1.0, 0.0, 0.0)
    }

    pub fn scale_translate(sx: f64, sy: f64, tx: f64, ty: f64) -> Self {
        Self {
            a: sx,
            b: 0.0,
            c: tx,
            d: 0.0,
            e: sy,
            f: ty,
        }
    }

    pub fn apply(&self, p: Coord) -> Coord {
        Coord::new(
            self.a * p.x + self.b * p.y + self.c,
            self.d * p.x + self.e * p.y + self.f,
        )
    }

    /// `None` when the transform is singular.
    pub fn inverse(&self) -> Option<Affine> {
        let det = self.a * self.e - self.b * self.d;
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        let a = self.e / det;
        let b = -self.b / det;
        let d = -self.d / det;
        let e = self.a / det;
        Some(Affine {
            a,
            b,
            c: -(a * self.c + b * self.f),
            d,
            e,
            f: -(d * self.c + e * self.f),
        })
    }
}

/// A [`GeometryTransformer`] backed by registered affine transforms.
///
/// Transforms are registered per ordered CRS pair; the reverse direction is
/// derived from the inverse when it was not registered itself. Aliases make
/// two codes equivalent (for example `CRS:84` and `EPSG:4326` when axis
/// order is not a concern).
///
/// Resampling snaps every vertex to the resolution grid and drops vertices
/// that collapse onto their predecessor.
#[derive(Debug, Clone, Default)]
pub struct AffineTransformer {
    transforms: HashMap<(Crs, Crs), Affine>,
    aliases: HashMap<Crs, Crs>,
}

impl AffineTransformer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transform(mut self, from: Crs, to: Crs, transform: Affine) -> Self {
        let key = (self.canonical(&from).clone(), self.canonical(&to).clone());
        self.transforms.insert(key, transform);
        self
    }

    /// Declare `alias` to be the same space as `target`.
    pub fn with_alias(mut self, alias: Crs, target: Crs) -> Self {
        let target = self.canonical(&target).clone();
        if alias != target {
            self.aliases.insert(alias, target);
        }
        self
    }

    fn canonical<'a>(&'a self, crs: &'a Crs) -> &'a Crs {
        self.aliases.get(crs).unwrap_or(crs)
    }

    fn lookup(&self, from: &Crs, to: &Crs) -> Option<Affine> {
        let from = self.canonical(from).clone();
        let to = self.canonical(to).clone();
        if let Some(t) = self.transforms.get(&(from.clone(), to.clone())) {
            return Some(*t);
        }
        self.transforms.get(&(to, from)).and_then(Affine::inverse)
    }
}

impl GeometryTransformer for AffineTransformer {
    fn equivalent(&self, a: &Crs, b: &Crs) -> bool {
        self.canonical(a) == self.canonical(b)
    }

    fn reproject(
        &self,
        geometry: &Geometry,
        from: &Crs,
        to: &Crs,
    ) -> Result<Geometry, StoreError> {
        if self.equivalent(from, to) {
            return Ok(geometry.clone());
        }
        let transform = self
            .lookup(from, to)
            .ok_or_else(|| StoreError::Transform(format!("no transform from {} to {}", from, to)))?;
        Ok(geometry.map_coords(|c| transform.apply(c)))
    }

    fn resample(
        &self,
        geometry: &Geometry,
        res_x: f64,
        res_y: f64,
    ) -> Result<Geometry, StoreError> {
        if !(res_x > 0.0 && res_y > 0.0) {
            return Err(StoreError::Transform(format!(
                "resolution must be positive, got ({}, {})",
                res_x, res_y
            )));
        }
        let snap = |c: &Coord| Coord::new((c.x / res_x).round() * res_x, (c.y / res_y).round() * res_y);
        Ok(match geometry {
            Geometry::Point(c) => Geometry::Point(snap(c)),
            Geometry::LineString(coords) => Geometry::LineString(snap_path(coords, snap)),
            Geometry::Polygon(rings) => Geometry::Polygon(
                rings.iter().map(|ring| snap_path(ring, snap)).collect(),
            ),
        })
    }
}

fn snap_path(coords: &[Coord], snap: impl Fn(&Coord) -> Coord) -> Vec<Coord> {
    let mut out: Vec<Coord> = Vec::with_capacity(coords.len());
    for c in coords.iter().map(&snap) {
        if out.last() != Some(&c) {
            out.push(c);
        }
    }
    // A path that collapsed onto a single cell keeps two vertices.
    if out.len() == 1 && coords.len() > 1 {
        out.push(out[0]);
    }
    out
}
