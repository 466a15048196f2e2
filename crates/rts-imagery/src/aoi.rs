//! Area of interest geometry.

use crate::crs::{Epsg, Reprojector};
use crate::{ImageryError, Result};
use geo::{BoundingRect, Coord, LineString, MapCoords, Point, Polygon};
use std::f64::consts::PI;

/// Number of segments used to approximate a buffered point (16 per quarter circle).
pub const BUFFER_SEGMENTS: usize = 64;

/// Axis-aligned bounds in some CRS.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    /// West edge.
    pub min_x: f64,
    /// South edge.
    pub min_y: f64,
    /// East edge.
    pub max_x: f64,
    /// North edge.
    pub max_y: f64,
}

impl Bounds {
    /// Create bounds from edges.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Width in CRS units.
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Height in CRS units.
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Closed rectangle polygon covering these bounds.
    pub fn to_polygon(&self) -> Polygon<f64> {
        Polygon::new(
            LineString::from(vec![
                (self.min_x, self.min_y),
                (self.max_x, self.min_y),
                (self.max_x, self.max_y),
                (self.min_x, self.max_y),
                (self.min_x, self.min_y),
            ]),
            vec![],
        )
    }
}

/// A polygon bounding the pixel region to extract, tagged with its CRS.
#[derive(Debug, Clone, PartialEq)]
pub struct Aoi {
    polygon: Polygon<f64>,
    crs: Epsg,
}

impl Aoi {
    /// Wrap an existing polygon.
    pub fn new(polygon: Polygon<f64>, crs: Epsg) -> Self {
        Self { polygon, crs }
    }

    /// Rectangle AOI from bounds.
    pub fn from_bounds(bounds: Bounds, crs: Epsg) -> Self {
        Self::new(bounds.to_polygon(), crs)
    }

    /// Circle of `distance` CRS units around `center`.
    pub fn buffered_point(center: Point<f64>, distance: f64, crs: Epsg) -> Self {
        let mut ring: Vec<Coord<f64>> = (0..BUFFER_SEGMENTS)
            .map(|i| {
                let angle = 2.0 * PI * i as f64 / BUFFER_SEGMENTS as f64;
                Coord {
                    x: center.x() + distance * angle.cos(),
                    y: center.y() + distance * angle.sin(),
                }
            })
            .collect();
        ring.push(ring[0]);
        Self::new(Polygon::new(LineString::new(ring), vec![]), crs)
    }

    /// The AOI polygon.
    pub fn polygon(&self) -> &Polygon<f64> {
        &self.polygon
    }

    /// CRS of the polygon coordinates.
    pub fn crs(&self) -> Epsg {
        self.crs
    }

    /// Bounding box, or `None` for an empty polygon.
    pub fn bounds(&self) -> Option<Bounds> {
        self.polygon
            .bounding_rect()
            .map(|rect| Bounds::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y))
    }

    /// Reproject every vertex into `target`. Returns a clone when the CRS already matches.
    pub fn to_crs(&self, target: Epsg) -> Result<Self> {
        if self.crs == target {
            return Ok(self.clone());
        }
        let reprojector = Reprojector::new(self.crs, target)?;
        let polygon = self.polygon.try_map_coords(|coord| {
            reprojector
                .transform(coord.x, coord.y)
                .map(|(x, y)| Coord { x, y })
        })?;
        Ok(Self::new(polygon, target))
    }
}

impl TryFrom<(&geo::Geometry<f64>, Epsg)> for Aoi {
    type Error = ImageryError;

    /// Use a supplied geometry directly; non-polygonal geometries contribute their bounding box.
    fn try_from((geometry, crs): (&geo::Geometry<f64>, Epsg)) -> Result<Self> {
        match geometry {
            geo::Geometry::Polygon(polygon) => Ok(Self::new(polygon.clone(), crs)),
            other => other
                .bounding_rect()
                .map(|rect| {
                    Self::from_bounds(
                        Bounds::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y),
                        crs,
                    )
                })
                .ok_or_else(|| ImageryError::NotFound("AOI geometry is empty".to_string())),
        }
    }
}
