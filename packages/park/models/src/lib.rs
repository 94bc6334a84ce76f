#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Canonical park entity and geometry types.
//!
//! Every park data source normalizes its source-specific records into
//! [`Park`], the source-agnostic representation used by the upsert engine
//! and the map query surface.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// A WGS84 coordinate pair, stored `[longitude, latitude]` (GeoJSON order).
pub type Position = [f64; 2];

/// Provenance marker recording which upstream produced a park record.
///
/// Used for diagnostics only — display logic never branches on it.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SourceTag {
    /// Live open-data API.
    Primary,
    /// Static hosted mirror of the dataset.
    Fallback,
    /// Bundled on-disk seed file, the source of last resort.
    Seed,
}

/// Park boundary or marker geometry, following the GeoJSON
/// `type`/`coordinates` convention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    /// A single coordinate pair.
    Point(Position),
    /// One or more linear rings; the first ring is the outer boundary.
    Polygon(Vec<Vec<Position>>),
    /// A sequence of polygons, each a sequence of rings.
    MultiPolygon(Vec<Vec<Vec<Position>>>),
}

impl Geometry {
    /// Returns `true` if the geometry contains no coordinate pair.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Point(_) => false,
            Self::Polygon(rings) => rings.iter().all(Vec::is_empty),
            Self::MultiPolygon(polygons) => {
                polygons.iter().all(|rings| rings.iter().all(Vec::is_empty))
            }
        }
    }

    /// Closes every polygon ring in place: when the first and last vertex
    /// differ, the first vertex is appended. Points are untouched.
    pub fn close_rings(&mut self) {
        fn close(ring: &mut Vec<Position>) {
            if let (Some(first), Some(last)) = (ring.first().copied(), ring.last())
                && first != *last
            {
                ring.push(first);
            }
        }

        match self {
            Self::Point(_) => {}
            Self::Polygon(rings) => rings.iter_mut().for_each(close),
            Self::MultiPolygon(polygons) => polygons
                .iter_mut()
                .flat_map(|rings| rings.iter_mut())
                .for_each(close),
        }
    }

    /// Returns the outer boundary ring: the first ring of a polygon, or the
    /// first ring of the first polygon for multipolygons.
    #[must_use]
    pub fn outer_ring(&self) -> Option<&[Position]> {
        match self {
            Self::Point(_) => None,
            Self::Polygon(rings) => rings.first().map(Vec::as_slice),
            Self::MultiPolygon(polygons) => polygons
                .first()
                .and_then(|rings| rings.first())
                .map(Vec::as_slice),
        }
    }

    /// Computes the representative point used for map marker placement.
    ///
    /// For polygons this is the arithmetic mean of the outer-ring vertices
    /// (the duplicated closing vertex is excluded so it does not weight the
    /// first corner twice). This is not an area-weighted centroid — it is
    /// only used for marker placement, never analysis.
    ///
    /// Returns `None` when the geometry has no coordinates.
    #[must_use]
    pub fn centroid(&self) -> Option<Position> {
        match self {
            Self::Point(position) => Some(*position),
            Self::Polygon(_) | Self::MultiPolygon(_) => {
                let ring = self.outer_ring()?;
                let vertices = match ring {
                    [] => return None,
                    [first @ .., last] if first.first() == Some(last) => first,
                    all => all,
                };
                if vertices.is_empty() {
                    return None;
                }
                #[allow(clippy::cast_precision_loss)]
                let count = vertices.len() as f64;
                let (lon_sum, lat_sum) = vertices
                    .iter()
                    .fold((0.0, 0.0), |(x, y), p| (x + p[0], y + p[1]));
                Some([lon_sum / count, lat_sum / count])
            }
        }
    }
}

/// A park normalized to the canonical schema.
///
/// Created and updated exclusively by the ingestion pipeline; the visit
/// tracker references parks by `external_id` and never mutates them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Park {
    /// Stable identifier from whichever source produced this record; the
    /// unique key for upsert matching.
    pub external_id: String,
    /// Park name, never empty.
    pub name: String,
    /// Boundary or marker geometry with all rings closed.
    pub geometry: Geometry,
    /// Derived marker position, computed once at normalization time.
    pub centroid: Position,
    /// Schema-less scalar passthrough (address, acreage, type, ...);
    /// source-dependent, no required keys.
    pub attributes: BTreeMap<String, serde_json::Value>,
    /// Which upstream produced this record.
    pub source_tag: SourceTag,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Vec<Position> {
        vec![[0.0, 0.0], [2.0, 0.0], [2.0, 2.0], [0.0, 2.0]]
    }

    #[test]
    fn point_centroid_echoes_the_point() {
        let geometry = Geometry::Point([-122.35, 47.62]);
        assert_eq!(geometry.centroid(), Some([-122.35, 47.62]));
    }

    #[test]
    fn polygon_centroid_is_vertex_mean() {
        let geometry = Geometry::Polygon(vec![square()]);
        let [lon, lat] = geometry.centroid().unwrap();
        assert!((lon - 1.0).abs() < f64::EPSILON);
        assert!((lat - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn closed_ring_does_not_double_count_first_vertex() {
        let mut ring = square();
        ring.push([0.0, 0.0]);
        let geometry = Geometry::Polygon(vec![ring]);
        let [lon, lat] = geometry.centroid().unwrap();
        assert!((lon - 1.0).abs() < f64::EPSILON);
        assert!((lat - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn centroid_lies_within_bounding_box() {
        let ring = vec![[-122.4, 47.5], [-122.2, 47.5], [-122.2, 47.7], [-122.3, 47.8]];
        let geometry = Geometry::Polygon(vec![ring.clone()]);
        let [lon, lat] = geometry.centroid().unwrap();
        let lons: Vec<f64> = ring.iter().map(|p| p[0]).collect();
        let lats: Vec<f64> = ring.iter().map(|p| p[1]).collect();
        assert!(lon >= lons.iter().copied().fold(f64::INFINITY, f64::min));
        assert!(lon <= lons.iter().copied().fold(f64::NEG_INFINITY, f64::max));
        assert!(lat >= lats.iter().copied().fold(f64::INFINITY, f64::min));
        assert!(lat <= lats.iter().copied().fold(f64::NEG_INFINITY, f64::max));
    }

    #[test]
    fn multipolygon_uses_first_outer_ring() {
        let geometry = Geometry::MultiPolygon(vec![
            vec![square()],
            vec![vec![[10.0, 10.0], [12.0, 10.0], [12.0, 12.0]]],
        ]);
        let [lon, lat] = geometry.centroid().unwrap();
        assert!((lon - 1.0).abs() < f64::EPSILON);
        assert!((lat - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn close_rings_appends_first_vertex() {
        let mut geometry = Geometry::Polygon(vec![square()]);
        geometry.close_rings();
        let Geometry::Polygon(rings) = &geometry else {
            unreachable!()
        };
        assert_eq!(rings[0].len(), 5);
        assert_eq!(rings[0].first(), rings[0].last());

        // Already closed rings are left alone
        geometry.close_rings();
        let Geometry::Polygon(rings) = &geometry else {
            unreachable!()
        };
        assert_eq!(rings[0].len(), 5);
    }

    #[test]
    fn empty_polygon_has_no_centroid() {
        let geometry = Geometry::Polygon(vec![]);
        assert!(geometry.is_empty());
        assert_eq!(geometry.centroid(), None);
    }

    #[test]
    fn deserializes_geojson_geometry() {
        let value = serde_json::json!({
            "type": "Polygon",
            "coordinates": [[[-122.3, 47.6], [-122.29, 47.6], [-122.29, 47.61], [-122.3, 47.6]]]
        });
        let geometry: Geometry = serde_json::from_value(value).unwrap();
        assert!(matches!(geometry, Geometry::Polygon(_)));
    }

    #[test]
    fn source_tag_round_trips_as_string() {
        assert_eq!(SourceTag::Primary.as_ref(), "primary");
        assert_eq!("seed".parse::<SourceTag>().unwrap(), SourceTag::Seed);
    }
}
