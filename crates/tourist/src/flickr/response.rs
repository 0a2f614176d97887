use serde_json::Value;

use super::SearchError;

const STAT: &str = "stat";
const OK_STAT: &str = "ok";
const PHOTOS: &str = "photos";
const PHOTO: &str = "photo";
const MEDIUM_URL: &str = "url_m";

/// Pull the medium-size URLs out of a `flickr.photos.search` response.
///
/// Entries without a medium URL are skipped, but a non-empty page where no
/// entry has one means the `extras` request was not honoured.
pub(crate) fn parse_search_response(body: &[u8]) -> Result<Vec<String>, SearchError> {
    let parsed: Value = serde_json::from_slice(body)
        .map_err(|e| SearchError::Parse(format!("body is not valid JSON: {e}")))?;

    let stat = parsed
        .get(STAT)
        .and_then(Value::as_str)
        .ok_or_else(|| missing_key(STAT))?;
    if stat != OK_STAT {
        return Err(SearchError::RemoteApi {
            code: parsed.get("code").and_then(Value::as_i64),
            message: parsed
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_owned(),
        });
    }

    let photos = parsed
        .get(PHOTOS)
        .and_then(Value::as_object)
        .ok_or_else(|| missing_key(PHOTOS))?;
    let photo = photos
        .get(PHOTO)
        .and_then(Value::as_array)
        .ok_or_else(|| missing_key(PHOTO))?;

    let urls: Vec<String> = photo
        .iter()
        .filter_map(|p| p.get(MEDIUM_URL).and_then(Value::as_str))
        .map(str::to_owned)
        .collect();
    if urls.is_empty() && !photo.is_empty() {
        return Err(missing_key(MEDIUM_URL));
    }
    Ok(urls)
}

fn missing_key(key: &str) -> SearchError {
    SearchError::Parse(format!("cannot find key '{key}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_urls_in_order() {
        let body = br#"{
            "stat": "ok",
            "photos": {
                "page": 3,
                "photo": [
                    {"id": "1", "url_m": "https://live.staticflickr.com/1_m.jpg"},
                    {"id": "2", "title": "no url"},
                    {"id": "3", "url_m": "https://live.staticflickr.com/3_m.jpg"}
                ]
            }
        }"#;
        let urls = parse_search_response(body).unwrap();
        assert_eq!(
            urls,
            vec![
                "https://live.staticflickr.com/1_m.jpg",
                "https://live.staticflickr.com/3_m.jpg"
            ]
        );
    }

    #[test]
    fn test_parse_empty_page() {
        let body = br#"{"stat": "ok", "photos": {"photo": []}}"#;
        assert!(parse_search_response(body).unwrap().is_empty());
    }

    #[test]
    fn test_parse_remote_failure() {
        let body = br#"{"stat": "fail", "code": 100, "message": "Invalid API Key"}"#;
        match parse_search_response(body) {
            Err(SearchError::RemoteApi { code, message }) => {
                assert_eq!(code, Some(100));
                assert_eq!(message, "Invalid API Key");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_parse_missing_keys() {
        for body in [
            &br#"{"photos": {"photo": []}}"#[..],
            br#"{"stat": "ok"}"#,
            br#"{"stat": "ok", "photos": {"total": 0}}"#,
            br#"{"stat": "ok", "photos": {"photo": "none"}}"#,
            br#"{"stat": "ok", "photos": {"photo": [{"id": "1"}]}}"#,
        ] {
            assert!(
                matches!(parse_search_response(body), Err(SearchError::Parse(_))),
                "expected parse error for {}",
                String::from_utf8_lossy(body)
            );
        }
    }

    #[test]
    fn test_parse_invalid_json() {
        assert!(matches!(
            parse_search_response(b"jsonFlickrApi({})"),
            Err(SearchError::Parse(_))
        ));
    }
}
