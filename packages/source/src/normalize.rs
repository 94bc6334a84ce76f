//! Shared record normalizer.
//!
//! Converts one raw upstream record (a `GeoJSON` feature or a flat seed
//! record) into a canonical [`Park`]. Heterogeneous upstream schemas are
//! handled by per-source candidate-key lists in [`FieldMapping`] rather
//! than per-source normalizer implementations.

use std::collections::BTreeMap;

use parks_map_park_models::{Geometry, Park, SourceTag};
use serde_json::Value;

use crate::source_def::{BoundsConfig, FieldMapping};

/// Square feet per acre, for the acreage attribute conversion.
const SQFT_PER_ACRE: f64 = 43_560.0;

/// Errors that can occur while normalizing a single raw record.
///
/// A failing record is skipped by the caller (logged, counted), never
/// fatal for the rest of the batch.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NormalizeError {
    /// The record is not a JSON object.
    #[error("record is not a JSON object")]
    NotAnObject,

    /// No name candidate key resolved to a non-empty string.
    #[error("no name under any configured key")]
    MissingName,

    /// No external-id candidate key resolved to a value.
    #[error("no external id under any configured key")]
    MissingExternalId,

    /// The record has neither a geometry member nor flat coordinates.
    #[error("record has no geometry")]
    MissingGeometry,

    /// The geometry `type` is not Point, Polygon, or MultiPolygon.
    #[error("unsupported geometry type: {kind}")]
    UnsupportedGeometry {
        /// The unrecognized `type` value.
        kind: String,
    },

    /// The geometry member could not be parsed structurally.
    #[error("malformed geometry: {message}")]
    Malformed {
        /// Parse error description.
        message: String,
    },

    /// The geometry parsed but contains no coordinate pair.
    #[error("geometry has no coordinates")]
    EmptyGeometry,

    /// The derived centroid falls outside the source's configured bounds.
    #[error("centroid ({lon}, {lat}) outside configured bounds")]
    OutOfRange {
        /// Centroid longitude.
        lon: f64,
        /// Centroid latitude.
        lat: f64,
    },
}

/// Normalizes one raw record into a canonical [`Park`].
///
/// The record's property map is either its `properties` member (`GeoJSON`
/// feature) or the record itself (flat seed record). Name and external id
/// are resolved through the ordered candidate-key lists in `fields`; all
/// remaining scalar properties pass through into [`Park::attributes`].
///
/// # Errors
///
/// Returns [`NormalizeError`] when the record has no usable name, id, or
/// geometry, or when its centroid falls outside `bounds`.
pub fn normalize(
    record: &Value,
    fields: &FieldMapping,
    bounds: Option<&BoundsConfig>,
    tag: SourceTag,
) -> Result<Park, NormalizeError> {
    let Some(record_map) = record.as_object() else {
        return Err(NormalizeError::NotAnObject);
    };
    let props = record
        .get("properties")
        .and_then(Value::as_object)
        .unwrap_or(record_map);

    let name = fields
        .name
        .iter()
        .filter_map(|key| props.get(key).and_then(Value::as_str))
        .find(|s| !s.trim().is_empty())
        .map(str::to_string)
        .ok_or(NormalizeError::MissingName)?;

    let external_id =
        extract_external_id(props, &fields.external_id).ok_or(NormalizeError::MissingExternalId)?;

    let mut geometry = extract_geometry(record, props, fields)?;
    geometry.close_rings();
    if geometry.is_empty() {
        return Err(NormalizeError::EmptyGeometry);
    }
    let centroid = geometry.centroid().ok_or(NormalizeError::EmptyGeometry)?;

    if let Some(bounds) = bounds
        && !bounds.contains(centroid[0], centroid[1])
    {
        return Err(NormalizeError::OutOfRange {
            lon: centroid[0],
            lat: centroid[1],
        });
    }

    let mut attributes: BTreeMap<String, Value> = props
        .iter()
        .filter(|(key, _)| key.as_str() != "geometry" && !fields.consumes(key))
        .filter(|(_, value)| value.is_string() || value.is_number() || value.is_boolean())
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    // Convert the source's square-footage field to acres, matching the
    // attribute the visit tracker displays.
    if let Some(area_key) = &fields.area_sqft
        && let Some(sqft) = get_f64(props, area_key)
    {
        let acres = (sqft / SQFT_PER_ACRE * 100.0).round() / 100.0;
        attributes.insert("acres".to_string(), acres.into());
    }

    Ok(Park {
        external_id,
        name,
        geometry,
        centroid,
        attributes,
        source_tag: tag,
    })
}

/// Tries each candidate key in order and returns the first non-empty string
/// value. Falls back to converting numeric values to strings (`ArcGIS`
/// object ids are integers).
fn extract_external_id(
    props: &serde_json::Map<String, Value>,
    keys: &[String],
) -> Option<String> {
    for key in keys {
        if let Some(s) = props.get(key).and_then(Value::as_str)
            && !s.is_empty()
        {
            return Some(s.to_string());
        }
        if let Some(n) = props.get(key).and_then(Value::as_i64) {
            return Some(n.to_string());
        }
    }
    None
}

/// Extracts the record's geometry: a `GeoJSON`-style `geometry` member if
/// present, otherwise a flat lat/lon candidate-key pair for point-only
/// sources.
fn extract_geometry(
    record: &Value,
    props: &serde_json::Map<String, Value>,
    fields: &FieldMapping,
) -> Result<Geometry, NormalizeError> {
    if let Some(geom) = record.get("geometry").filter(|g| !g.is_null()) {
        let kind = geom
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| NormalizeError::Malformed {
                message: "geometry has no type".to_string(),
            })?;
        if !matches!(kind, "Point" | "Polygon" | "MultiPolygon") {
            return Err(NormalizeError::UnsupportedGeometry {
                kind: kind.to_string(),
            });
        }
        return serde_json::from_value(geom.clone()).map_err(|e| NormalizeError::Malformed {
            message: e.to_string(),
        });
    }

    let lat = fields.lat.iter().find_map(|key| get_f64(props, key));
    let lon = fields.lng.iter().find_map(|key| get_f64(props, key));
    match (lon, lat) {
        (Some(lon), Some(lat)) => Ok(Geometry::Point([lon, lat])),
        _ => Err(NormalizeError::MissingGeometry),
    }
}

/// Gets an f64 from a property map, accepting both JSON numbers and
/// numeric strings (Socrata-style sources quote their coordinates).
fn get_f64(props: &serde_json::Map<String, Value>, key: &str) -> Option<f64> {
    let value = props.get(key)?;
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}
