//! Basemap year selection for a feature.
//!
//! A feature near a mosaic boundary is covered by several basemap images. We
//! prefer a single year available for all of them, so the tiles are
//! temporally consistent, and fall back to the most recent year available
//! anywhere.

use crate::correspondence::CorrespondenceTable;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{debug, warn};

/// A resolved `(year, image id)` pair to look up in the path index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CandidateImage {
    /// Basemap year.
    pub year: i32,
    /// Basemap image identifier.
    pub image_id: String,
}

impl CandidateImage {
    /// Create a candidate.
    pub fn new(year: i32, image_id: impl Into<String>) -> Self {
        Self {
            year,
            image_id: image_id.into(),
        }
    }
}

impl fmt::Display for CandidateImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.image_id, self.year)
    }
}

/// Select the basemap images and year to use for `uid`.
///
/// Returns one candidate per image id whose year set contains the selected
/// year, ordered by image id. A uid absent from the table yields an empty list.
pub fn resolve_candidates(uid: &str, table: &CorrespondenceTable) -> Vec<CandidateImage> {
    let mut years_by_image: BTreeMap<&str, BTreeSet<i32>> = BTreeMap::new();
    for record in table.for_uid(uid) {
        years_by_image
            .entry(record.image_id.as_str())
            .or_default()
            .insert(record.year);
    }

    if years_by_image.is_empty() {
        warn!("No basemap correspondence found for UID {}", uid);
        return Vec::new();
    }

    let Some(selected) = select_year(years_by_image.values()) else {
        warn!("No available years found for UID {}", uid);
        return Vec::new();
    };
    debug!("UID {}: selected basemap year {} across {} image(s)", uid, selected, years_by_image.len());

    years_by_image
        .into_iter()
        .filter(|(_, years)| years.contains(&selected))
        .map(|(image_id, _)| CandidateImage::new(selected, image_id))
        .collect()
}

/// Max of the intersection of all year sets, else max of their union.
fn select_year<'a, I>(year_sets: I) -> Option<i32>
where
    I: Iterator<Item = &'a BTreeSet<i32>> + Clone,
{
    let mut sets = year_sets.clone();
    let first = sets.next()?;
    let common = sets.fold(first.clone(), |acc, set| acc.intersection(set).copied().collect());

    common
        .last()
        .copied()
        .or_else(|| year_sets.flat_map(|set| set.iter().copied()).max())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correspondence::CorrespondenceRecord;
    use crate::crs::CANONICAL_CRS;

    fn table(rows: &[(&str, &str, i32)]) -> CorrespondenceTable {
        let records = rows
            .iter()
            .map(|(uid, image_id, year)| CorrespondenceRecord {
                uid: uid.to_string(),
                image_id: image_id.to_string(),
                year: *year,
                geometry: None,
            })
            .collect();
        CorrespondenceTable::from_records(records, CANONICAL_CRS)
    }

    #[test]
    fn test_common_year_preferred() {
        let t = table(&[
            ("u", "A", 2020),
            ("u", "A", 2021),
            ("u", "B", 2021),
            ("u", "B", 2022),
        ]);
        assert_eq!(
            resolve_candidates("u", &t),
            vec![CandidateImage::new(2021, "A"), CandidateImage::new(2021, "B")]
        );
    }

    #[test]
    fn test_no_common_year_falls_back_to_latest() {
        let t = table(&[("u", "A", 2019), ("u", "B", 2022)]);
        assert_eq!(resolve_candidates("u", &t), vec![CandidateImage::new(2022, "B")]);
    }

    #[test]
    fn test_max_of_several_common_years() {
        let t = table(&[
            ("u", "A", 2018),
            ("u", "A", 2019),
            ("u", "A", 2023),
            ("u", "B", 2018),
            ("u", "B", 2019),
            ("u", "C", 2019),
            ("u", "C", 2018),
            ("u", "C", 2024),
        ]);
        let candidates = resolve_candidates("u", &t);
        assert_eq!(candidates.len(), 3);
        assert!(candidates.iter().all(|c| c.year == 2019));
    }

    #[test]
    fn test_unknown_uid_is_empty() {
        let t = table(&[("u", "A", 2019)]);
        assert!(resolve_candidates("other", &t).is_empty());
    }

    #[test]
    fn test_other_uids_ignored() {
        let t = table(&[("u", "A", 2019), ("v", "A", 2024), ("v", "B", 2024)]);
        assert_eq!(resolve_candidates("u", &t), vec![CandidateImage::new(2019, "A")]);
    }

    #[test]
    fn test_duplicate_rows_collapse() {
        let t = table(&[("u", "A", 2020), ("u", "A", 2020)]);
        assert_eq!(resolve_candidates("u", &t), vec![CandidateImage::new(2020, "A")]);
    }

    #[test]
    fn test_selection_invariant_holds_for_generated_tables() {
        // Every image in 1..=4 gets a pseudo-random year subset; the selected
        // year must be max(intersection) if non-empty, else max(union).
        let mut state: u32 = 0x2545_f491;
        for _ in 0..200 {
            let mut rows = Vec::new();
            let mut sets: BTreeMap<String, BTreeSet<i32>> = BTreeMap::new();
            for image in 0..4 {
                let image_id = format!("img{image}");
                for year in 2017..2025 {
                    state ^= state << 13;
                    state ^= state >> 17;
                    state ^= state << 5;
                    if state % 3 == 0 {
                        rows.push(("u".to_string(), image_id.clone(), year));
                        sets.entry(image_id.clone()).or_default().insert(year);
                    }
                }
            }
            let t = CorrespondenceTable::from_records(
                rows.iter()
                    .map(|(uid, image_id, year)| CorrespondenceRecord {
                        uid: uid.clone(),
                        image_id: image_id.clone(),
                        year: *year,
                        geometry: None,
                    })
                    .collect(),
                CANONICAL_CRS,
            );

            let candidates = resolve_candidates("u", &t);
            if sets.is_empty() {
                assert!(candidates.is_empty());
                continue;
            }

            let mut iter = sets.values();
            let first = iter.next().unwrap().clone();
            let common: BTreeSet<i32> = iter.fold(first, |acc, s| acc.intersection(s).copied().collect());
            let expected = common
                .last()
                .copied()
                .unwrap_or_else(|| sets.values().flatten().copied().max().unwrap());

            assert!(!candidates.is_empty());
            for candidate in &candidates {
                assert_eq!(candidate.year, expected);
                assert!(sets[&candidate.image_id].contains(&expected));
            }
            let expected_ids: Vec<&String> = sets
                .iter()
                .filter(|(_, years)| years.contains(&expected))
                .map(|(id, _)| id)
                .collect();
            let got_ids: Vec<&String> = candidates.iter().map(|c| &c.image_id).collect();
            assert_eq!(got_ids, expected_ids);
        }
    }
}
