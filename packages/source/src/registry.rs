//! Source registry: loads all source definitions from embedded TOML
//! configs.
//!
//! Each `.toml` file in `packages/source/sources/` is baked into the binary
//! at compile time via [`include_str!`]. The list order is the fallback
//! priority order: live API first, static mirror next, bundled seed last.
//! Adding a fourth source is a new TOML file and one line below.

use crate::source_def::{SourceDefinition, parse_source_toml};

/// TOML configs embedded at compile time, in fallback priority order.
const SOURCE_TOMLS: &[(&str, &str)] = &[
    ("seattle_arcgis", include_str!("../sources/seattle_arcgis.toml")),
    (
        "seattle_geojson_mirror",
        include_str!("../sources/seattle_geojson_mirror.toml"),
    ),
    ("bundled_seed", include_str!("../sources/bundled_seed.toml")),
];

/// Total number of configured sources (used in tests).
#[cfg(test)]
const EXPECTED_SOURCE_COUNT: usize = 3;

/// Returns all configured source definitions in fallback priority order.
///
/// # Panics
///
/// Panics if any TOML config is malformed (this is a compile-time
/// guarantee since the configs are embedded).
#[must_use]
pub fn all_sources() -> Vec<SourceDefinition> {
    SOURCE_TOMLS
        .iter()
        .map(|(name, toml)| {
            parse_source_toml(toml).unwrap_or_else(|e| panic!("Failed to parse {name}.toml: {e}"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use parks_map_park_models::SourceTag;

    use super::*;

    #[test]
    fn loads_all_sources() {
        let sources = all_sources();
        assert_eq!(sources.len(), EXPECTED_SOURCE_COUNT);
    }

    #[test]
    fn source_ids_are_unique() {
        let sources = all_sources();
        let mut ids: Vec<&str> = sources.iter().map(|s| s.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), EXPECTED_SOURCE_COUNT);
    }

    #[test]
    fn sources_are_in_fallback_priority_order() {
        let tags: Vec<SourceTag> = all_sources().iter().map(|s| s.tag).collect();
        assert_eq!(
            tags,
            vec![SourceTag::Primary, SourceTag::Fallback, SourceTag::Seed]
        );
    }

    #[test]
    fn all_sources_have_required_fields() {
        for source in &all_sources() {
            assert!(!source.id.is_empty(), "source id is empty");
            assert!(!source.name.is_empty(), "source name is empty");
            assert!(
                !source.fields.name.is_empty(),
                "{}: no name candidate keys",
                source.id
            );
            assert!(
                !source.fields.external_id.is_empty(),
                "{}: no external_id candidate keys",
                source.id
            );
        }
    }
}
