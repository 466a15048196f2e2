//! UID to basemap image correspondence table.
//!
//! The table is a GeoJSON feature collection with one feature per
//! `(UID, image id, basemap year)` triple. Its coordinates are always treated
//! as [`CANONICAL_CRS`]; see [`CrsPolicy`] for how a different declared CRS is
//! handled.

use crate::crs::{declared_crs, Epsg, Reprojector, CANONICAL_CRS, WGS84};
use crate::{ImageryError, Result};
use geo::MapCoords;
use geojson::{Feature, GeoJson, JsonObject, JsonValue};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Property holding the feature identifier.
pub const UID_PROPERTY: &str = "UID";
/// Property holding the basemap image identifier.
pub const IMAGE_ID_PROPERTY: &str = "id";
/// Property holding the basemap year.
pub const YEAR_PROPERTY: &str = "planet_basemap_year";

/// What to do when the declared CRS differs from [`CANONICAL_CRS`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrsPolicy {
    /// Relabel the table as canonical without touching coordinates.
    ///
    /// The coordinates are assumed to already be in EPSG:3413 with a wrong
    /// label. If that assumption is ever false, coordinates are silently wrong.
    #[default]
    Override,
    /// Transform coordinates from the declared CRS into the canonical CRS.
    Reproject,
}

/// One candidate basemap tile for a feature in a given year.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrespondenceRecord {
    /// Feature identifier.
    pub uid: String,
    /// Basemap image identifier.
    pub image_id: String,
    /// Basemap year.
    pub year: i32,
    /// Footprint geometry in the table CRS, if present.
    pub geometry: Option<geo::Geometry<f64>>,
}

/// The loaded and CRS-normalized correspondence table.
#[derive(Debug, Clone)]
pub struct CorrespondenceTable {
    records: Vec<CorrespondenceRecord>,
    crs: Epsg,
    declared_crs: Option<Epsg>,
}

impl CorrespondenceTable {
    /// Load a correspondence GeoJSON using [`CrsPolicy::Override`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load_with_policy(path, CrsPolicy::default())
    }

    /// Load a correspondence GeoJSON with an explicit CRS policy.
    pub fn load_with_policy<P: AsRef<Path>>(path: P, policy: CrsPolicy) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ImageryError::NotFound(format!(
                "correspondence file {}",
                path.display()
            )));
        }

        let text = std::fs::read_to_string(path)?;
        let collection = match text.parse::<GeoJson>() {
            Ok(GeoJson::FeatureCollection(collection)) => collection,
            Ok(_) => return Err(load_error(path, "expected a FeatureCollection")),
            Err(e) => return Err(load_error(path, e)),
        };

        let declared = match declared_crs(collection.foreign_members.as_ref()) {
            Ok(crs) => Some(crs.unwrap_or(WGS84)),
            // An unknown label only matters when coordinates must be transformed
            Err(reason) if policy == CrsPolicy::Override => {
                warn!("Correspondence file {}: {}", path.display(), reason);
                None
            }
            Err(reason) => return Err(load_error(path, reason)),
        };

        let records = collection
            .features
            .into_iter()
            .enumerate()
            .map(|(index, feature)| parse_record(feature).map_err(|reason| load_error(path, format!("feature {index}: {reason}"))))
            .collect::<Result<Vec<_>>>()?;

        let table = match declared {
            Some(crs) => Self::from_records(records, crs).normalize(policy)?,
            None => {
                warn!("Overriding unrecognized CRS label to {} without reprojecting.", CANONICAL_CRS);
                Self {
                    records,
                    crs: CANONICAL_CRS,
                    declared_crs: None,
                }
            }
        };
        info!(
            "Correspondence file {} loaded: {} records, CRS {}",
            path.display(),
            table.records.len(),
            table.crs
        );
        Ok(table)
    }

    /// Build a table from records already in memory, declared in `crs`.
    ///
    /// The result is not normalized; call [`CorrespondenceTable::normalize`]
    /// to apply a CRS policy.
    pub fn from_records(records: Vec<CorrespondenceRecord>, crs: Epsg) -> Self {
        Self {
            records,
            crs,
            declared_crs: Some(crs),
        }
    }

    /// Bring the table into [`CANONICAL_CRS`] according to `policy`.
    pub fn normalize(mut self, policy: CrsPolicy) -> Result<Self> {
        if self.crs == CANONICAL_CRS {
            return Ok(self);
        }

        match policy {
            CrsPolicy::Override => {
                warn!(
                    "Correspondence CRS is {}. Overriding label to {} without reprojecting.",
                    self.crs, CANONICAL_CRS
                );
            }
            CrsPolicy::Reproject => {
                warn!(
                    "Correspondence CRS is {}. Reprojecting geometries to {}.",
                    self.crs, CANONICAL_CRS
                );
                let reprojector = Reprojector::new(self.crs, CANONICAL_CRS)?;
                for record in &mut self.records {
                    if let Some(geometry) = record.geometry.take() {
                        record.geometry = Some(geometry.try_map_coords(|coord| {
                            reprojector
                                .transform(coord.x, coord.y)
                                .map(|(x, y)| geo::Coord { x, y })
                        })?);
                    }
                }
            }
        }

        self.crs = CANONICAL_CRS;
        Ok(self)
    }

    /// All records.
    pub fn records(&self) -> &[CorrespondenceRecord] {
        &self.records
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the table has no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records for a feature.
    pub fn for_uid<'a>(&'a self, uid: &'a str) -> impl Iterator<Item = &'a CorrespondenceRecord> + 'a {
        self.records.iter().filter(move |record| record.uid == uid)
    }

    /// Records for a feature, image and year.
    pub fn records_matching<'a>(
        &'a self,
        uid: &'a str,
        image_id: &'a str,
        year: i32,
    ) -> impl Iterator<Item = &'a CorrespondenceRecord> + 'a {
        self.for_uid(uid)
            .filter(move |record| record.image_id == image_id && record.year == year)
    }

    /// CRS the coordinates are treated as being in.
    pub fn crs(&self) -> Epsg {
        self.crs
    }

    /// CRS declared by the source file, `None` if its label was not an EPSG code.
    pub fn declared_crs(&self) -> Option<Epsg> {
        self.declared_crs
    }
}

fn load_error(path: &Path, reason: impl ToString) -> ImageryError {
    ImageryError::Load {
        path: PathBuf::from(path),
        reason: reason.to_string(),
    }
}

fn parse_record(feature: Feature) -> std::result::Result<CorrespondenceRecord, String> {
    let properties = feature.properties.as_ref().ok_or("missing properties")?;
    let uid = string_property(properties, UID_PROPERTY)?;
    let image_id = string_property(properties, IMAGE_ID_PROPERTY)?;
    let year = year_property(properties, YEAR_PROPERTY)?;
    let geometry = feature
        .geometry
        .map(|geometry| geo::Geometry::<f64>::try_from(geometry.value))
        .transpose()
        .map_err(|e| format!("invalid geometry: {e}"))?;

    Ok(CorrespondenceRecord {
        uid,
        image_id,
        year,
        geometry,
    })
}

/// Read a property as a string; numbers are stringified.
pub(crate) fn string_property(properties: &JsonObject, key: &str) -> std::result::Result<String, String> {
    match properties.get(key) {
        Some(JsonValue::String(s)) => Ok(s.clone()),
        Some(JsonValue::Number(n)) => Ok(n.to_string()),
        Some(other) => Err(format!("property '{key}' is not a string: {other}")),
        None => Err(format!("missing property '{key}'")),
    }
}

/// Read a property as an integer year, accepting integral floats and numeric strings.
fn year_property(properties: &JsonObject, key: &str) -> std::result::Result<i32, String> {
    let value = properties
        .get(key)
        .ok_or_else(|| format!("missing property '{key}'"))?;
    let year = match value {
        JsonValue::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        JsonValue::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.fract() == 0.0).map(|f| f as i64))
        }
        _ => None,
    };
    year.and_then(|y| i32::try_from(y).ok())
        .ok_or_else(|| format!("property '{key}' is not an integer year: {value}"))
}
