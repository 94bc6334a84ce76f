//! Static dataset file fetcher.
//!
//! Downloads a single hosted `GeoJSON` `FeatureCollection` in one request.
//! Used by the fallback mirror source when the live API is unavailable.

use tokio::sync::mpsc;

use crate::{FetchOptions, RawPage, SourceError};

/// Configuration for a static file fetch.
pub struct StaticFileConfig<'a> {
    /// URL of the hosted dataset file.
    pub url: &'a str,
    /// Label for log messages.
    pub label: &'a str,
}

/// Extracts the dataset's features, truncated to `limit` when set.
fn dataset_features(
    body: &serde_json::Value,
    limit: Option<u64>,
) -> Result<RawPage, SourceError> {
    let features = body
        .get("features")
        .and_then(serde_json::Value::as_array)
        .ok_or_else(|| SourceError::Format {
            message: "no features array in dataset file".to_string(),
        })?;

    let mut page = features.clone();
    if let Some(limit) = limit {
        page.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
    }
    Ok(page)
}

/// Downloads the dataset file and sends its features as a single page.
/// Returns the number of features delivered to the receiver.
///
/// # Errors
///
/// Returns [`SourceError`] on connection failure, timeout, non-2xx status,
/// or an unparseable response body.
pub async fn fetch_static_file(
    config: &StaticFileConfig<'_>,
    options: &FetchOptions,
    tx: &mpsc::Sender<RawPage>,
) -> Result<u64, SourceError> {
    let client = reqwest::Client::builder().timeout(options.timeout).build()?;

    log::info!("{}: downloading {}", config.label, config.url);
    let response = client.get(config.url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(SourceError::Status { status });
    }

    let body: serde_json::Value = response.json().await?;
    let page = dataset_features(&body, options.limit)?;

    let count = page.len() as u64;
    if tx.send(page).await.is_err() {
        // Receiver dropped; nothing was delivered.
        return Ok(0);
    }

    log::info!("{}: download complete, {count} records", config.label);
    Ok(count)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn collection(count: u64) -> serde_json::Value {
        let features: Vec<serde_json::Value> = (0..count)
            .map(|i| {
                json!({
                    "type": "Feature",
                    "properties": { "OBJECTID": i, "NAME": format!("Park {i}") },
                    "geometry": { "type": "Point", "coordinates": [-122.3, 47.6] }
                })
            })
            .collect();
        json!({ "type": "FeatureCollection", "features": features })
    }

    #[test]
    fn extracts_all_features_without_a_limit() {
        let page = dataset_features(&collection(3), None).unwrap();
        assert_eq!(page.len(), 3);
        assert_eq!(page[0]["properties"]["NAME"], "Park 0");
    }

    #[test]
    fn truncates_to_the_fetch_limit() {
        let page = dataset_features(&collection(5), Some(2)).unwrap();
        assert_eq!(page.len(), 2);
    }

    #[test]
    fn missing_features_array_is_a_format_error() {
        let body = json!({ "type": "FeatureCollection" });
        let err = dataset_features(&body, None).unwrap_err();
        assert!(matches!(err, SourceError::Format { .. }));
    }
}
