//! Coordinate reference systems and point reprojection.
//!
//! Projections are pure Rust (`proj4rs`), with PROJ strings looked up by EPSG
//! code in the `crs-definitions` database.

use crate::{ImageryError, Result};
use proj4rs::proj::Proj;
use std::fmt;

/// An EPSG coordinate reference system code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Epsg(pub u32);

/// Canonical CRS of the correspondence table: NSIDC Sea Ice Polar Stereographic North.
pub const CANONICAL_CRS: Epsg = Epsg(3413);

/// WGS84 longitude/latitude. GeoJSON without a `crs` member is in this CRS.
pub const WGS84: Epsg = Epsg(4326);

impl Epsg {
    /// The numeric EPSG code.
    pub fn code(self) -> u32 {
        self.0
    }

    /// Parse a CRS name such as `EPSG:3413`, `urn:ogc:def:crs:EPSG::3413`
    /// or `urn:ogc:def:crs:OGC:1.3:CRS84`.
    pub fn parse(name: &str) -> Option<Self> {
        let upper = name.trim().to_ascii_uppercase();
        if upper.ends_with("CRS84") {
            return Some(WGS84);
        }
        if !upper.contains("EPSG") {
            return None;
        }
        upper
            .rsplit(':')
            .next()
            .and_then(|code| code.trim().parse::<u32>().ok())
            .map(Epsg)
    }

    /// PROJ string for this code, if the definitions database knows it.
    pub fn proj_string(self) -> Option<&'static str> {
        u16::try_from(self.0)
            .ok()
            .and_then(crs_definitions::from_code)
            .map(|def| def.proj4)
    }

    /// Whether this CRS uses longitude/latitude degrees.
    pub fn is_geographic(self) -> bool {
        match self.proj_string() {
            Some(proj) => proj.contains("+proj=longlat"),
            None => self.0 == 4326 || (4000..5000).contains(&self.0),
        }
    }

    fn to_proj(self) -> Result<Proj> {
        let definition = self
            .proj_string()
            .ok_or_else(|| ImageryError::Projection(format!("{self} is not in the CRS database")))?;
        Proj::from_proj_string(definition)
            .map_err(|e| ImageryError::Projection(format!("Invalid projection {self}: {e:?}")))
    }
}

impl fmt::Display for Epsg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.0)
    }
}

/// Read the declared CRS from a GeoJSON `crs` member (`{"type": "name", "properties": {"name": ...}}`).
///
/// Returns `Ok(None)` when the member is absent.
pub fn declared_crs(foreign_members: Option<&geojson::JsonObject>) -> std::result::Result<Option<Epsg>, String> {
    let Some(crs) = foreign_members.and_then(|members| members.get("crs")) else {
        return Ok(None);
    };
    if crs.is_null() {
        return Ok(None);
    }
    let name = crs
        .get("properties")
        .and_then(|props| props.get("name"))
        .and_then(|name| name.as_str())
        .ok_or_else(|| format!("unsupported crs member: {crs}"))?;
    Epsg::parse(name)
        .map(Some)
        .ok_or_else(|| format!("unrecognized CRS name '{name}'"))
}

/// Transforms coordinates from one CRS to another.
///
/// Construction resolves both projections once; transforming between identical
/// codes is a no-op.
pub struct Reprojector {
    source: Epsg,
    target: Epsg,
    projections: Option<(Proj, Proj)>,
}

impl fmt::Debug for Reprojector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reprojector")
            .field("source", &self.source)
            .field("target", &self.target)
            .finish()
    }
}

impl Reprojector {
    /// Create a reprojector between two EPSG codes.
    pub fn new(source: Epsg, target: Epsg) -> Result<Self> {
        let projections = if source == target {
            None
        } else {
            Some((source.to_proj()?, target.to_proj()?))
        };
        Ok(Self {
            source,
            target,
            projections,
        })
    }

    /// Source CRS.
    pub fn source(&self) -> Epsg {
        self.source
    }

    /// Target CRS.
    pub fn target(&self) -> Epsg {
        self.target
    }

    /// Transform a single coordinate pair.
    pub fn transform(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        let Some((source_proj, target_proj)) = &self.projections else {
            return Ok((x, y));
        };

        // proj4rs works in radians for geographic systems
        let mut point = if self.source.is_geographic() {
            (x.to_radians(), y.to_radians(), 0.0)
        } else {
            (x, y, 0.0)
        };
        proj4rs::transform::transform(source_proj, target_proj, &mut point).map_err(|e| {
            ImageryError::Projection(format!(
                "Transform from {} to {} failed for ({x}, {y}): {e:?}",
                self.source, self.target
            ))
        })?;

        if self.target.is_geographic() {
            Ok((point.0.to_degrees(), point.1.to_degrees()))
        } else {
            Ok((point.0, point.1))
        }
    }
}
