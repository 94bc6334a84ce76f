//! Shared `ArcGIS` REST API fetcher.
//!
//! Handles paginated fetching from `ArcGIS` `FeatureServer` or `MapServer`
//! endpoints using `resultOffset`/`resultRecordCount`, with
//! `exceededTransferLimit` as the continuation signal. Used by the primary
//! Seattle park boundaries source.

use tokio::sync::mpsc;

use crate::{FetchOptions, RawPage, SourceError};

/// Configuration for an `ArcGIS` fetch operation.
pub struct ArcGisConfig<'a> {
    /// Layer query URL (ending in `/query`).
    pub query_url: &'a str,
    /// Label for log messages (e.g., `"Seattle Parks"`).
    pub label: &'a str,
    /// Max records per request (often 1000 or 2000).
    pub page_size: u64,
}

/// One parsed response page: its features and whether the server signalled
/// more pages.
#[derive(Debug)]
struct ArcGisPage {
    features: RawPage,
    more: bool,
}

/// Validates one response body and extracts its features.
///
/// `ArcGIS` reports request-level failures inside a 200 response
/// (`{"error": {"code": 400, "message": "..."}}`), so the envelope is
/// checked before looking for features. `exceededTransferLimit: true` is
/// the canonical more-pages signal; a short page is unreliable because
/// the server silently caps results at its own `maxRecordCount`.
fn parse_page(body: &serde_json::Value, offset: u64) -> Result<ArcGisPage, SourceError> {
    if let Some(error_obj) = body.get("error") {
        return Err(SourceError::Format {
            message: format!("ArcGIS error envelope: {error_obj}"),
        });
    }

    let features = body
        .get("features")
        .and_then(serde_json::Value::as_array)
        .ok_or_else(|| SourceError::Format {
            message: format!("no features array in response (offset={offset})"),
        })?;

    let more = body
        .get("exceededTransferLimit")
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false);

    Ok(ArcGisPage {
        features: features.clone(),
        more,
    })
}

/// Returns how many records to request next, or `None` when `fetch_limit`
/// has been reached. Never exceeds `page_size`.
const fn next_page_limit(fetch_limit: u64, total: u64, page_size: u64) -> Option<u64> {
    let remaining = fetch_limit.saturating_sub(total);
    if remaining == 0 {
        None
    } else if remaining < page_size {
        Some(remaining)
    } else {
        Some(page_size)
    }
}

/// Fetches all features from an `ArcGIS` REST endpoint with pagination,
/// streaming one page of `GeoJSON` features at a time through `tx`.
/// Returns the total number of features fetched.
///
/// # Errors
///
/// Returns [`SourceError`] on connection failure, timeout, non-2xx status,
/// or an unparseable response body.
pub async fn fetch_arcgis(
    config: &ArcGisConfig<'_>,
    options: &FetchOptions,
    tx: &mpsc::Sender<RawPage>,
) -> Result<u64, SourceError> {
    let client = reqwest::Client::builder().timeout(options.timeout).build()?;

    let mut total: u64 = 0;
    let mut offset: u64 = 0;
    let fetch_limit = options.limit.unwrap_or(u64::MAX);

    while let Some(page_limit) = next_page_limit(fetch_limit, total, config.page_size) {
        let url = format!(
            "{}?where=1%3D1&outFields=*&outSR=4326&f=geojson&resultRecordCount={page_limit}&resultOffset={offset}",
            config.query_url
        );

        log::info!("{}: offset={offset}, limit={page_limit}", config.label);
        let response = client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status { status });
        }

        let body: serde_json::Value = response.json().await?;
        let page = parse_page(&body, offset)?;

        let count = page.features.len() as u64;
        if count == 0 {
            break;
        }

        if tx.send(page.features).await.is_err() {
            // Receiver dropped; the caller stopped consuming.
            break;
        }

        total += count;
        offset += count;

        if !page.more {
            break;
        }

        // Courtesy delay between pages to avoid hammering the API
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }

    log::info!("{}: download complete, {total} records", config.label);
    Ok(total)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn feature(id: u64) -> serde_json::Value {
        json!({
            "type": "Feature",
            "properties": { "OBJECTID": id, "NAME": format!("Park {id}") },
            "geometry": { "type": "Point", "coordinates": [-122.3, 47.6] }
        })
    }

    #[test]
    fn error_envelope_in_200_body_is_a_format_error() {
        let body = json!({
            "error": { "code": 400, "message": "Invalid query parameters" }
        });
        let err = parse_page(&body, 0).unwrap_err();
        assert!(matches!(err, SourceError::Format { ref message }
            if message.contains("Invalid query parameters")));
    }

    #[test]
    fn missing_features_array_is_a_format_error() {
        let body = json!({ "type": "FeatureCollection" });
        let err = parse_page(&body, 2000).unwrap_err();
        assert!(matches!(err, SourceError::Format { ref message }
            if message.contains("offset=2000")));
    }

    #[test]
    fn exceeded_transfer_limit_signals_continuation() {
        let body = json!({
            "features": [feature(1), feature(2)],
            "exceededTransferLimit": true
        });
        let page = parse_page(&body, 0).unwrap();
        assert_eq!(page.features.len(), 2);
        assert!(page.more);
    }

    #[test]
    fn absent_or_false_transfer_limit_stops_pagination() {
        let body = json!({ "features": [feature(1)] });
        assert!(!parse_page(&body, 0).unwrap().more);

        let body = json!({
            "features": [feature(1)],
            "exceededTransferLimit": false
        });
        assert!(!parse_page(&body, 0).unwrap().more);
    }

    #[test]
    fn page_limit_caps_at_remaining_fetch_limit() {
        // Limit smaller than one page: first request asks for exactly it
        assert_eq!(next_page_limit(300, 0, 1000), Some(300));
        // Mid-pagination: only the remainder is requested
        assert_eq!(next_page_limit(1500, 1000, 1000), Some(500));
        // Limit reached: pagination stops
        assert_eq!(next_page_limit(1500, 1500, 1000), None);
        // No limit: full pages
        assert_eq!(next_page_limit(u64::MAX, 5000, 1000), Some(1000));
    }
}
