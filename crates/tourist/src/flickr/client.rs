use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use libs::{
    geo::{self, LAT_RANGE, LON_RANGE},
    search_settings::{SearchSettings, SharedSettings},
};

use super::{PhotoSource, SearchError, response::parse_search_response};
use crate::db::Pin;

const SEARCH_METHOD: &str = "flickr.photos.search";
const MEDIUM_URL_EXTRA: &str = "url_m";
const RESPONSE_FORMAT: &str = "json";

pub struct FlickrClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    settings: SharedSettings,
}

impl FlickrClient {
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
        settings: SharedSettings,
    ) -> Result<Self, SearchError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            api_url: api_url.into(),
            api_key: api_key.into(),
            settings,
        })
    }
}

/// Query parameters of a location search around `pin`.
pub fn search_params(
    api_key: &str,
    pin: &Pin,
    settings: &SearchSettings,
    page: u32,
) -> Vec<(&'static str, String)> {
    let bbox = geo::compute_bounding_box(
        pin.latitude,
        pin.longitude,
        settings.bbox_half_width,
        settings.bbox_half_height,
        LON_RANGE,
        LAT_RANGE,
    );
    let safe_search = if settings.safe_search { "1" } else { "3" };

    vec![
        ("method", SEARCH_METHOD.to_owned()),
        ("api_key", api_key.to_owned()),
        ("bbox", bbox.to_string()),
        ("safe_search", safe_search.to_owned()),
        ("extras", MEDIUM_URL_EXTRA.to_owned()),
        ("format", RESPONSE_FORMAT.to_owned()),
        ("per_page", settings.per_page.to_string()),
        ("page", page.to_string()),
        ("nojsoncallback", "1".to_owned()),
    ]
}

#[async_trait]
impl PhotoSource for FlickrClient {
    async fn search_by_location(&self, pin: &Pin) -> Result<Vec<String>, SearchError> {
        let settings = self.settings.get().await;
        // A random page keeps repeated searches of a busy spot from
        // returning the same photos every time.
        let page = rand::rng().random_range(1..=settings.max_page.max(1));
        let params = search_params(&self.api_key, pin, &settings, page);
        tracing::debug!(pin = %pin.id, page, "searching photos");

        let result = async {
            let response = self.http.get(&self.api_url).query(&params).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(SearchError::HttpStatus(status.as_u16()));
            }
            let body = response.bytes().await?;
            if body.is_empty() {
                return Err(SearchError::EmptyResponse);
            }
            parse_search_response(&body)
        }
        .await;

        match &result {
            Ok(urls) => {
                metrics::counter!("tourist_searches_total", "outcome" => "ok").increment(1);
                tracing::debug!(pin = %pin.id, found = urls.len(), "photo search finished");
            }
            Err(e) => {
                metrics::counter!("tourist_searches_total", "outcome" => "error").increment(1);
                tracing::warn!(pin = %pin.id, "photo search failed: {e}");
            }
        }
        result
    }

    async fn download_photo(&self, url: &str) -> Result<Vec<u8>, SearchError> {
        let download_error = |reason: String| SearchError::Download {
            url: url.to_owned(),
            reason,
        };

        let result = async {
            let response = self
                .http
                .get(url)
                .send()
                .await
                .map_err(|e| download_error(e.to_string()))?;
            let status = response.status();
            if !status.is_success() {
                return Err(download_error(format!("HTTP {status}")));
            }
            let bytes = response
                .bytes()
                .await
                .map_err(|e| download_error(e.to_string()))?;
            if bytes.is_empty() {
                return Err(download_error("no data was returned".to_owned()));
            }
            Ok(bytes.to_vec())
        }
        .await;

        let outcome = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!("tourist_downloads_total", "outcome" => outcome).increment(1);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::PinId;

    fn pin(latitude: f64, longitude: f64) -> Pin {
        Pin {
            id: PinId::new(),
            latitude,
            longitude,
            created_at: 0,
        }
    }

    #[test]
    fn test_search_params_carry_required_keys() {
        let params = search_params("key123", &pin(40.0, -74.0), &SearchSettings::default(), 4);
        let get = |k: &str| {
            params
                .iter()
                .find(|(name, _)| *name == k)
                .map(|(_, v)| v.as_str())
        };

        assert_eq!(get("method"), Some("flickr.photos.search"));
        assert_eq!(get("api_key"), Some("key123"));
        assert_eq!(get("bbox"), Some("-75,39,-73,41"));
        assert_eq!(get("safe_search"), Some("1"));
        assert_eq!(get("extras"), Some("url_m"));
        assert_eq!(get("format"), Some("json"));
        assert_eq!(get("per_page"), Some("21"));
        assert_eq!(get("page"), Some("4"));
        assert_eq!(get("nojsoncallback"), Some("1"));
    }

    #[test]
    fn test_search_params_bbox_clamped() {
        let settings = SearchSettings {
            bbox_half_width: 5.0,
            bbox_half_height: 5.0,
            ..SearchSettings::default()
        };
        let params = search_params("k", &pin(-88.0, 178.0), &settings, 1);
        let bbox = &params.iter().find(|(k, _)| *k == "bbox").unwrap().1;
        assert_eq!(bbox, "173,-90,180,-83");
    }
}
