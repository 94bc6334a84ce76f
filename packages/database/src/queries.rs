//! The park upsert engine and read-only query surface.
//!
//! All mutation of the park table goes through [`apply`] — the single
//! writer. Both modes run inside one transaction, so a failed apply
//! leaves the previous park set intact and a concurrent reader never
//! observes an empty table mid-reload.

use std::collections::BTreeMap;

use parks_map_park_models::{Geometry, Park, SourceTag};
use rusqlite::{Connection, OptionalExtension as _, Transaction, params};
use serde_json::Value;

use crate::DbError;

/// How [`apply`] reconciles incoming parks with persisted rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertMode {
    /// Insert new parks and update changed ones; untouched rows keep their
    /// timestamps. The default.
    Merge,
    /// Delete every persisted park, then insert the incoming set.
    ClearAndReload,
}

/// What a clear does about visit rows referencing existing parks.
///
/// The original tracker cascade-deleted visit history silently; here the
/// choice is explicit and the operator must opt in to losing data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrphanPolicy {
    /// Fail the clear when any visit exists. The default.
    Reject,
    /// Delete visit rows along with their parks, in the same transaction.
    Cascade,
}

/// Counts of rows written by one [`apply`] call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UpsertReport {
    /// Rows inserted.
    pub inserted: u64,
    /// Rows overwritten because a field changed. Rows identical to the
    /// incoming park count as neither inserted nor updated.
    pub updated: u64,
}

/// Idempotently persists a batch of normalized parks.
///
/// Matching is exact-string on `external_id`. In [`UpsertMode::Merge`],
/// applying the same input twice leaves the second call a no-op (no
/// duplicate rows, no touched timestamps). In
/// [`UpsertMode::ClearAndReload`], the delete and the inserts share one
/// transaction; any failure rolls back fully.
///
/// # Errors
///
/// Returns [`DbError::VisitsPresent`] when a clear would orphan visit
/// history under [`OrphanPolicy::Reject`], or [`DbError::Sqlite`] when the
/// storage layer rejects a write.
pub fn apply(
    conn: &mut Connection,
    parks: &[Park],
    mode: UpsertMode,
    policy: OrphanPolicy,
) -> Result<UpsertReport, DbError> {
    let tx = conn.transaction()?;
    let mut report = UpsertReport::default();

    match mode {
        UpsertMode::ClearAndReload => {
            let visit_count: i64 =
                tx.query_row("SELECT COUNT(*) FROM visits", [], |row| row.get(0))?;
            if visit_count > 0 {
                match policy {
                    OrphanPolicy::Reject => {
                        return Err(DbError::VisitsPresent { count: visit_count });
                    }
                    OrphanPolicy::Cascade => {
                        log::warn!("Deleting {visit_count} visit(s) along with their parks");
                        tx.execute("DELETE FROM visits", [])?;
                    }
                }
            }
            tx.execute("DELETE FROM parks", [])?;
            for park in parks {
                insert_park(&tx, park)?;
                report.inserted += 1;
            }
        }
        UpsertMode::Merge => {
            for park in parks {
                let encoded = encode(park)?;
                let existing: Option<(String, String, f64, f64, String, String)> = tx
                    .query_row(
                        "SELECT name, geometry, centroid_lon, centroid_lat,
                                attributes, source_tag
                         FROM parks WHERE external_id = ?1",
                        [&park.external_id],
                        |row| {
                            Ok((
                                row.get(0)?,
                                row.get(1)?,
                                row.get(2)?,
                                row.get(3)?,
                                row.get(4)?,
                                row.get(5)?,
                            ))
                        },
                    )
                    .optional()?;

                match existing {
                    None => {
                        insert_park(&tx, park)?;
                        report.inserted += 1;
                    }
                    Some((name, geometry, lon, lat, attributes, tag)) => {
                        let unchanged = name == park.name
                            && geometry == encoded.geometry
                            && lon == park.centroid[0]
                            && lat == park.centroid[1]
                            && attributes == encoded.attributes
                            && tag == park.source_tag.as_ref();
                        if !unchanged {
                            tx.execute(
                                "UPDATE parks SET
                                     name = ?1, geometry = ?2, centroid_lon = ?3,
                                     centroid_lat = ?4, attributes = ?5, source_tag = ?6,
                                     updated_at = datetime('now')
                                 WHERE external_id = ?7",
                                params![
                                    park.name,
                                    encoded.geometry,
                                    park.centroid[0],
                                    park.centroid[1],
                                    encoded.attributes,
                                    park.source_tag.as_ref(),
                                    park.external_id,
                                ],
                            )?;
                            report.updated += 1;
                        }
                    }
                }
            }
        }
    }

    tx.commit()?;
    Ok(report)
}

/// JSON-encoded geometry and attribute columns for one park.
struct EncodedPark {
    geometry: String,
    attributes: String,
}

fn encode(park: &Park) -> Result<EncodedPark, DbError> {
    let geometry = serde_json::to_string(&park.geometry).map_err(|e| DbError::Conversion {
        message: format!("failed to encode geometry for {}: {e}", park.external_id),
    })?;
    let attributes = serde_json::to_string(&park.attributes).map_err(|e| DbError::Conversion {
        message: format!("failed to encode attributes for {}: {e}", park.external_id),
    })?;
    Ok(EncodedPark {
        geometry,
        attributes,
    })
}

fn insert_park(tx: &Transaction<'_>, park: &Park) -> Result<(), DbError> {
    let encoded = encode(park)?;
    tx.execute(
        "INSERT INTO parks (external_id, name, geometry, centroid_lon,
                            centroid_lat, attributes, source_tag)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            park.external_id,
            park.name,
            encoded.geometry,
            park.centroid[0],
            park.centroid[1],
            encoded.attributes,
            park.source_tag.as_ref(),
        ],
    )?;
    Ok(())
}

/// Decodes one persisted row back into a [`Park`].
fn row_to_park(
    external_id: String,
    name: String,
    geometry: &str,
    lon: f64,
    lat: f64,
    attributes: &str,
    tag: &str,
) -> Result<Park, DbError> {
    let geometry: Geometry =
        serde_json::from_str(geometry).map_err(|e| DbError::Conversion {
            message: format!("stored geometry for {external_id} is corrupt: {e}"),
        })?;
    let attributes: BTreeMap<String, Value> =
        serde_json::from_str(attributes).map_err(|e| DbError::Conversion {
            message: format!("stored attributes for {external_id} are corrupt: {e}"),
        })?;
    let source_tag: SourceTag = tag.parse().map_err(|_| DbError::Conversion {
        message: format!("unknown source tag {tag:?} on {external_id}"),
    })?;
    Ok(Park {
        external_id,
        name,
        geometry,
        centroid: [lon, lat],
        attributes,
        source_tag,
    })
}

/// Returns one park by its exact external id.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or the stored row is corrupt.
pub fn park_by_external_id(
    conn: &Connection,
    external_id: &str,
) -> Result<Option<Park>, DbError> {
    let row: Option<(String, String, String, f64, f64, String, String)> = conn
        .query_row(
            "SELECT external_id, name, geometry, centroid_lon, centroid_lat,
                    attributes, source_tag
             FROM parks WHERE external_id = ?1",
            [external_id],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                ))
            },
        )
        .optional()?;

    row.map(|(id, name, geometry, lon, lat, attributes, tag)| {
        row_to_park(id, name, &geometry, lon, lat, &attributes, &tag)
    })
    .transpose()
}

/// Returns all persisted parks ordered by name.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or a stored row is corrupt.
pub fn all_parks(conn: &Connection) -> Result<Vec<Park>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT external_id, name, geometry, centroid_lon, centroid_lat,
                attributes, source_tag
         FROM parks ORDER BY name",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, f64>(3)?,
            row.get::<_, f64>(4)?,
            row.get::<_, String>(5)?,
            row.get::<_, String>(6)?,
        ))
    })?;

    let mut parks = Vec::new();
    for row in rows {
        let (id, name, geometry, lon, lat, attributes, tag) = row?;
        parks.push(row_to_park(id, name, &geometry, lon, lat, &attributes, &tag)?);
    }
    Ok(parks)
}

/// Returns all persisted parks as a `GeoJSON` `FeatureCollection`, the
/// shape the map UI consumes.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or a stored row is corrupt.
pub fn feature_collection(conn: &Connection) -> Result<Value, DbError> {
    let features: Vec<Value> = all_parks(conn)?
        .into_iter()
        .map(|park| {
            let mut properties = serde_json::Map::new();
            properties.insert("externalId".to_string(), park.external_id.into());
            properties.insert("name".to_string(), park.name.into());
            properties.insert(
                "centroid".to_string(),
                serde_json::json!([park.centroid[0], park.centroid[1]]),
            );
            properties.insert("sourceTag".to_string(), park.source_tag.as_ref().into());
            properties.extend(park.attributes);

            serde_json::json!({
                "type": "Feature",
                "geometry": park.geometry,
                "properties": properties,
            })
        })
        .collect();

    Ok(serde_json::json!({
        "type": "FeatureCollection",
        "features": features,
    }))
}

/// Returns the number of persisted parks.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn count_parks(conn: &Connection) -> Result<i64, DbError> {
    Ok(conn.query_row("SELECT COUNT(*) FROM parks", [], |row| row.get(0))?)
}

/// Returns the number of persisted visits.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn count_visits(conn: &Connection) -> Result<i64, DbError> {
    Ok(conn.query_row("SELECT COUNT(*) FROM visits", [], |row| row.get(0))?)
}

#[cfg(test)]
mod tests {
    use parks_map_park_models::Geometry;

    use super::*;
    use crate::{open_in_memory, run_migrations};

    fn setup() -> Connection {
        let conn = open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    fn park(external_id: &str, name: &str) -> Park {
        Park {
            external_id: external_id.to_string(),
            name: name.to_string(),
            geometry: Geometry::Point([-122.33, 47.61]),
            centroid: [-122.33, 47.61],
            attributes: BTreeMap::from([(
                "neighborhood".to_string(),
                Value::from("Capitol Hill"),
            )]),
            source_tag: SourceTag::Seed,
        }
    }

    fn add_visit(conn: &Connection, external_id: &str) {
        conn.execute(
            "INSERT INTO visits (park_id, visit_date)
             SELECT id, '2025-07-04' FROM parks WHERE external_id = ?1",
            [external_id],
        )
        .unwrap();
    }

    #[test]
    fn merge_inserts_new_parks() {
        let mut conn = setup();
        let parks = vec![park("a", "Gas Works Park"), park("b", "Volunteer Park")];

        let report = apply(&mut conn, &parks, UpsertMode::Merge, OrphanPolicy::Reject).unwrap();
        assert_eq!(report, UpsertReport { inserted: 2, updated: 0 });
        assert_eq!(count_parks(&conn).unwrap(), 2);
    }

    #[test]
    fn merge_is_idempotent() {
        let mut conn = setup();
        let parks = vec![park("a", "Gas Works Park"), park("b", "Volunteer Park")];

        apply(&mut conn, &parks, UpsertMode::Merge, OrphanPolicy::Reject).unwrap();
        let second = apply(&mut conn, &parks, UpsertMode::Merge, OrphanPolicy::Reject).unwrap();

        assert_eq!(second, UpsertReport { inserted: 0, updated: 0 });
        assert_eq!(count_parks(&conn).unwrap(), 2);
        let names: Vec<String> = all_parks(&conn)
            .unwrap()
            .into_iter()
            .map(|p| (p.name))
            .collect();
        assert_eq!(names, vec!["Gas Works Park", "Volunteer Park"]);
    }

    #[test]
    fn merge_updates_changed_name_without_new_row() {
        let mut conn = setup();
        apply(
            &mut conn,
            &[park("a", "Gasworks Park")],
            UpsertMode::Merge,
            OrphanPolicy::Reject,
        )
        .unwrap();

        let report = apply(
            &mut conn,
            &[park("a", "Gas Works Park")],
            UpsertMode::Merge,
            OrphanPolicy::Reject,
        )
        .unwrap();

        assert_eq!(report, UpsertReport { inserted: 0, updated: 1 });
        assert_eq!(count_parks(&conn).unwrap(), 1);
        let stored = park_by_external_id(&conn, "a").unwrap().unwrap();
        assert_eq!(stored.name, "Gas Works Park");
    }

    #[test]
    fn merge_keeps_visits_attached_across_updates() {
        let mut conn = setup();
        apply(
            &mut conn,
            &[park("a", "Gasworks Park")],
            UpsertMode::Merge,
            OrphanPolicy::Reject,
        )
        .unwrap();
        add_visit(&conn, "a");

        apply(
            &mut conn,
            &[park("a", "Gas Works Park")],
            UpsertMode::Merge,
            OrphanPolicy::Reject,
        )
        .unwrap();
        assert_eq!(count_visits(&conn).unwrap(), 1);
    }

    #[test]
    fn clear_and_reload_replaces_all_rows() {
        let mut conn = setup();
        let old = vec![park("a", "A"), park("b", "B"), park("c", "C")];
        apply(&mut conn, &old, UpsertMode::Merge, OrphanPolicy::Reject).unwrap();

        let new = vec![park("d", "D"), park("e", "E")];
        let report = apply(
            &mut conn,
            &new,
            UpsertMode::ClearAndReload,
            OrphanPolicy::Reject,
        )
        .unwrap();

        assert_eq!(report, UpsertReport { inserted: 2, updated: 0 });
        assert_eq!(count_parks(&conn).unwrap(), 2);
        assert!(park_by_external_id(&conn, "a").unwrap().is_none());
        assert!(park_by_external_id(&conn, "d").unwrap().is_some());
    }

    #[test]
    fn clear_rejects_when_visits_exist() {
        let mut conn = setup();
        apply(
            &mut conn,
            &[park("a", "Seward Park")],
            UpsertMode::Merge,
            OrphanPolicy::Reject,
        )
        .unwrap();
        add_visit(&conn, "a");

        let err = apply(
            &mut conn,
            &[park("b", "New Park")],
            UpsertMode::ClearAndReload,
            OrphanPolicy::Reject,
        )
        .unwrap_err();

        assert!(matches!(err, DbError::VisitsPresent { count: 1 }));
        // Rolled back: prior state intact
        assert_eq!(count_parks(&conn).unwrap(), 1);
        assert_eq!(count_visits(&conn).unwrap(), 1);
        assert!(park_by_external_id(&conn, "a").unwrap().is_some());
    }

    #[test]
    fn clear_cascade_deletes_visits() {
        let mut conn = setup();
        apply(
            &mut conn,
            &[park("a", "Seward Park")],
            UpsertMode::Merge,
            OrphanPolicy::Reject,
        )
        .unwrap();
        add_visit(&conn, "a");

        apply(
            &mut conn,
            &[park("b", "New Park")],
            UpsertMode::ClearAndReload,
            OrphanPolicy::Cascade,
        )
        .unwrap();

        assert_eq!(count_parks(&conn).unwrap(), 1);
        assert_eq!(count_visits(&conn).unwrap(), 0);
    }

    #[test]
    fn failed_clear_leaves_prior_state_intact() {
        let mut conn = setup();
        apply(
            &mut conn,
            &[park("a", "Seward Park")],
            UpsertMode::Merge,
            OrphanPolicy::Reject,
        )
        .unwrap();

        // Duplicate external ids violate the unique constraint mid-insert
        let bad = vec![park("x", "X"), park("x", "X duplicate")];
        let err = apply(
            &mut conn,
            &bad,
            UpsertMode::ClearAndReload,
            OrphanPolicy::Reject,
        )
        .unwrap_err();
        assert!(matches!(err, DbError::Sqlite(_)));

        assert_eq!(count_parks(&conn).unwrap(), 1);
        assert!(park_by_external_id(&conn, "a").unwrap().is_some());
    }

    #[test]
    fn stored_parks_round_trip() {
        let mut conn = setup();
        let original = park("a", "Gas Works Park");
        apply(
            &mut conn,
            std::slice::from_ref(&original),
            UpsertMode::Merge,
            OrphanPolicy::Reject,
        )
        .unwrap();

        let stored = park_by_external_id(&conn, "a").unwrap().unwrap();
        assert_eq!(stored, original);
    }

    #[test]
    fn feature_collection_has_geojson_shape() {
        let mut conn = setup();
        apply(
            &mut conn,
            &[park("a", "Gas Works Park")],
            UpsertMode::Merge,
            OrphanPolicy::Reject,
        )
        .unwrap();

        let collection = feature_collection(&conn).unwrap();
        assert_eq!(collection["type"], "FeatureCollection");
        let features = collection["features"].as_array().unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0]["type"], "Feature");
        assert_eq!(features[0]["geometry"]["type"], "Point");
        assert_eq!(features[0]["properties"]["name"], "Gas Works Park");
        assert_eq!(features[0]["properties"]["neighborhood"], "Capitol Hill");
    }
}
