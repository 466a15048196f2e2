//! Positive RTS features and per-feature context.

use crate::correspondence::{string_property, UID_PROPERTY};
use crate::crs::{declared_crs, Epsg, WGS84};
use crate::{ImageryError, Result};
use geo::{BooleanOps, Centroid, Geometry, GeometryCollection, MultiPolygon, Point};
use geojson::GeoJson;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Property classifying each training polygon.
pub const TRAIN_CLASS_PROPERTY: &str = "TrainClass";
/// `TrainClass` value of confirmed slumps.
pub const POSITIVE_CLASS: &str = "Positive";

/// One positive polygon.
#[derive(Debug, Clone, PartialEq)]
pub struct PositiveFeature {
    /// Feature identifier; a UID may have several polygons over the years.
    pub uid: String,
    /// Outline geometry.
    pub geometry: Geometry<f64>,
}

/// All positive features of a training dataset.
#[derive(Debug, Clone)]
pub struct PositiveFeatures {
    features: Vec<PositiveFeature>,
    crs: Epsg,
}

/// Geometries of one UID and the centroid of their union.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureContext {
    /// Every polygon recorded for the UID.
    pub geometries: Vec<Geometry<f64>>,
    /// Centroid of the combined footprint.
    pub centroid: Point<f64>,
    /// CRS of the geometries.
    pub crs: Epsg,
}

impl PositiveFeatures {
    /// Load a training GeoJSON and keep features with `TrainClass == "Positive"`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ImageryError::NotFound(format!("features file {}", path.display())));
        }

        let text = std::fs::read_to_string(path)?;
        let collection = match text.parse::<GeoJson>() {
            Ok(GeoJson::FeatureCollection(collection)) => collection,
            Ok(_) => return Err(load_error(path, "expected a FeatureCollection")),
            Err(e) => return Err(load_error(path, e)),
        };
        let crs = declared_crs(collection.foreign_members.as_ref())
            .map_err(|reason| load_error(path, reason))?
            .unwrap_or(WGS84);

        let total = collection.features.len();
        let has_class = collection.features.iter().any(|f| {
            f.properties
                .as_ref()
                .is_some_and(|p| p.contains_key(TRAIN_CLASS_PROPERTY))
        });
        if !has_class {
            return Err(load_error(path, format!("'{TRAIN_CLASS_PROPERTY}' column not found")));
        }

        let mut features = Vec::new();
        for (index, feature) in collection.features.into_iter().enumerate() {
            let Some(properties) = feature.properties.as_ref() else {
                continue;
            };
            let positive = properties
                .get(TRAIN_CLASS_PROPERTY)
                .and_then(|v| v.as_str())
                .is_some_and(|class| class == POSITIVE_CLASS);
            if !positive {
                continue;
            }

            let uid = string_property(properties, UID_PROPERTY)
                .map_err(|reason| load_error(path, format!("feature {index}: {reason}")))?;
            let Some(geometry) = feature.geometry else {
                debug!("Skipping positive feature {} without geometry", uid);
                continue;
            };
            let geometry = Geometry::<f64>::try_from(geometry.value)
                .map_err(|e| load_error(path, format!("feature {index}: invalid geometry: {e}")))?;
            features.push(PositiveFeature { uid, geometry });
        }

        info!(
            "Loaded {} polygon(s) from {}, {} marked '{}'",
            total,
            path.display(),
            features.len(),
            POSITIVE_CLASS
        );
        Ok(Self { features, crs })
    }

    /// Build from features already in memory.
    pub fn from_features(features: Vec<PositiveFeature>, crs: Epsg) -> Self {
        Self { features, crs }
    }

    /// All positive features.
    pub fn features(&self) -> &[PositiveFeature] {
        &self.features
    }

    /// Number of positive polygons.
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Whether there are no positive polygons.
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Declared CRS of the geometries (EPSG:4326 if undeclared).
    pub fn crs(&self) -> Epsg {
        self.crs
    }

    /// Distinct UIDs in first-seen order.
    pub fn unique_uids(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.features
            .iter()
            .filter(|f| seen.insert(f.uid.as_str()))
            .map(|f| f.uid.clone())
            .collect()
    }
}

/// Collect every polygon of `uid` and the centroid of their boolean union.
///
/// The union matters when polygons overlap: the mean of per-polygon
/// centroids over-weights the overlapping area.
pub fn feature_context(uid: &str, features: &PositiveFeatures) -> Result<FeatureContext> {
    let geometries: Vec<Geometry<f64>> = features
        .features
        .iter()
        .filter(|f| f.uid == uid)
        .map(|f| f.geometry.clone())
        .collect();
    if geometries.is_empty() {
        return Err(ImageryError::NotFound(format!("no feature found for UID {uid}")));
    }

    let centroid = union_centroid(&geometries)
        .ok_or_else(|| ImageryError::NotFound(format!("features of UID {uid} have no extent")))?;

    Ok(FeatureContext {
        geometries,
        centroid,
        crs: features.crs,
    })
}

/// Centroid of the union of polygonal geometries; falls back to the
/// collection centroid when nothing is polygonal.
fn union_centroid(geometries: &[Geometry<f64>]) -> Option<Point<f64>> {
    let mut union: Option<MultiPolygon<f64>> = None;
    for geometry in geometries {
        let polygons = match geometry {
            Geometry::Polygon(p) => MultiPolygon::new(vec![p.clone()]),
            Geometry::MultiPolygon(mp) => mp.clone(),
            _ => continue,
        };
        union = Some(match union {
            Some(acc) => acc.union(&polygons),
            None => polygons,
        });
    }

    match union {
        Some(area) => area.centroid(),
        None => GeometryCollection::from(geometries.to_vec()).centroid(),
    }
}

fn load_error(path: &Path, reason: impl ToString) -> ImageryError {
    ImageryError::Load {
        path: PathBuf::from(path),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use geo::{polygon, Area};

    fn square(x0: f64, y0: f64, size: f64) -> Geometry<f64> {
        Geometry::Polygon(polygon![
            (x: x0, y: y0),
            (x: x0 + size, y: y0),
            (x: x0 + size, y: y0 + size),
            (x: x0, y: y0 + size),
            (x: x0, y: y0),
        ])
    }

    fn features(items: Vec<(&str, Geometry<f64>)>) -> PositiveFeatures {
        PositiveFeatures::from_features(
            items
                .into_iter()
                .map(|(uid, geometry)| PositiveFeature {
                    uid: uid.to_string(),
                    geometry,
                })
                .collect(),
            Epsg(3413),
        )
    }

    #[test]
    fn test_single_polygon_centroid() {
        let set = features(vec![("a", square(0.0, 0.0, 2.0))]);
        let ctx = feature_context("a", &set).unwrap();
        assert_eq!(ctx.geometries.len(), 1);
        assert_abs_diff_eq!(ctx.centroid.x(), 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(ctx.centroid.y(), 1.0, epsilon = 1e-9);
        assert_eq!(ctx.crs, Epsg(3413));
    }

    #[test]
    fn test_union_centroid_differs_from_mean_of_centroids() {
        // A large square with two smaller squares overlapping its corner
        let geoms = vec![
            square(0.0, 0.0, 10.0),
            square(8.0, 8.0, 4.0),
            square(9.0, 9.0, 4.0),
        ];
        let set = features(vec![
            ("a", geoms[0].clone()),
            ("a", geoms[1].clone()),
            ("a", geoms[2].clone()),
            ("b", square(100.0, 100.0, 1.0)),
        ]);
        let ctx = feature_context("a", &set).unwrap();
        assert_eq!(ctx.geometries.len(), 3);

        // Union: 10x10 square plus the L-shaped spill outside it
        let big = MultiPolygon::new(vec![match &geoms[0] {
            Geometry::Polygon(p) => p.clone(),
            _ => unreachable!(),
        }]);
        let mut expected_union = big;
        for g in &geoms[1..] {
            if let Geometry::Polygon(p) = g {
                expected_union = expected_union.union(&MultiPolygon::new(vec![p.clone()]));
            }
        }
        let expected = expected_union.centroid().unwrap();
        assert_abs_diff_eq!(ctx.centroid.x(), expected.x(), epsilon = 1e-9);
        assert_abs_diff_eq!(ctx.centroid.y(), expected.y(), epsilon = 1e-9);
        assert_abs_diff_eq!(expected_union.unsigned_area(), 100.0 + 16.0 + 16.0 - 4.0 - 1.0 - 9.0 + 1.0, epsilon = 1e-9);

        let mean_x = geoms.iter().map(|g| g.centroid().unwrap().x()).sum::<f64>() / 3.0;
        assert!((ctx.centroid.x() - mean_x).abs() > 1.0);
    }

    #[test]
    fn test_unknown_uid_is_not_found() {
        let set = features(vec![("a", square(0.0, 0.0, 1.0))]);
        assert!(matches!(feature_context("zzz", &set), Err(ImageryError::NotFound(_))));
    }

    #[test]
    fn test_unique_uids_first_seen_order() {
        let set = features(vec![
            ("c", square(0.0, 0.0, 1.0)),
            ("a", square(0.0, 0.0, 1.0)),
            ("c", square(1.0, 1.0, 1.0)),
            ("b", square(0.0, 0.0, 1.0)),
        ]);
        assert_eq!(set.unique_uids(), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_point_only_feature_uses_collection_centroid() {
        let set = features(vec![("p", Geometry::Point(Point::new(3.0, 4.0)))]);
        let ctx = feature_context("p", &set).unwrap();
        assert_eq!(ctx.centroid, Point::new(3.0, 4.0));
    }
}
