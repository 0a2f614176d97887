use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{Value, json};
use tokio::net::TcpListener;

use libs::search_settings::{SearchSettings, SharedSettings};
use tourist::{
    album::AlbumSync,
    api,
    common::AppState,
    db::{LocalStore, Pin},
    flickr::{PhotoSource, SearchError},
};

const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00];

struct CannedSource;

#[async_trait]
impl PhotoSource for CannedSource {
    async fn search_by_location(&self, _pin: &Pin) -> Result<Vec<String>, SearchError> {
        Ok((0..4)
            .map(|i| format!("https://photos.example.com/{i}.jpg"))
            .collect())
    }

    async fn download_photo(&self, url: &str) -> Result<Vec<u8>, SearchError> {
        if url.ends_with("3.jpg") {
            return Err(SearchError::Download {
                url: url.to_owned(),
                reason: "HTTP 404 Not Found".to_owned(),
            });
        }
        Ok(JPEG.to_vec())
    }
}

async fn spawn_app() -> String {
    let store = Arc::new(LocalStore::open_in_memory().unwrap());
    let sync = Arc::new(AlbumSync::new(store, Arc::new(CannedSource)));
    let state = AppState {
        sync,
        settings: SharedSettings::in_memory(SearchSettings::default()),
    };

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, api::router(state)).await.unwrap();
    });
    format!("http://{addr}")
}

async fn add_pin(http: &reqwest::Client, base: &str) -> String {
    let res = http
        .post(format!("{base}/api/pins"))
        .json(&json!({"latitude": 48.85, "longitude": 2.35}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let pin: Value = res.json().await.unwrap();
    pin["id"].as_str().unwrap().to_owned()
}

fn photo_ids(album: &Value) -> Vec<String> {
    album["photos"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_str().unwrap().to_owned())
        .collect()
}

#[tokio::test]
async fn test_pin_and_album_flow() {
    let base = spawn_app().await;
    let http = reqwest::Client::new();
    let pin_id = add_pin(&http, &base).await;

    let pins: Value = http
        .get(format!("{base}/api/pins"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(pins.as_array().unwrap().len(), 1);

    let album: Value = http
        .get(format!("{base}/api/pins/{pin_id}/album"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(album["state"]["status"], "ready");
    assert_eq!(album["pin"]["id"], pin_id.as_str());
    let ids = photo_ids(&album);
    assert_eq!(ids.len(), 4);
    assert_eq!(album["photos"][0]["has_image"], false);

    // select two, then delete the selection with an empty body
    for id in &ids[..2] {
        let res: Value = http
            .post(format!("{base}/api/pins/{pin_id}/photos/{id}/select"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(res["selected"], true);
    }
    let album: Value = http
        .delete(format!("{base}/api/pins/{pin_id}/photos"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(photo_ids(&album), ids[2..].to_vec());
    assert!(album["selected"].as_array().unwrap().is_empty());

    // explicit ids
    let album: Value = http
        .delete(format!("{base}/api/pins/{pin_id}/photos"))
        .json(&json!({"ids": [ids[2]]}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(photo_ids(&album), vec![ids[3].clone()]);

    let album: Value = http
        .post(format!("{base}/api/pins/{pin_id}/album/new-collection"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let fresh = photo_ids(&album);
    assert_eq!(fresh.len(), 4);
    assert!(!fresh.contains(&ids[3]));
}

#[tokio::test]
async fn test_photo_image_lazy_load() {
    let base = spawn_app().await;
    let http = reqwest::Client::new();
    let pin_id = add_pin(&http, &base).await;

    let album: Value = http
        .get(format!("{base}/api/pins/{pin_id}/album"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let ids = photo_ids(&album);

    let res = http
        .get(format!("{base}/api/photos/{}/image", ids[0]))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["content-type"], "image/jpeg");
    assert_eq!(res.bytes().await.unwrap().as_ref(), JPEG);

    let res = http
        .get(format!("{base}/api/photos/{}/image", ids[3]))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let album: Value = http
        .get(format!("{base}/api/pins/{pin_id}/album"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(album["photos"][0]["has_image"], true);
    assert_eq!(album["photos"][3]["has_image"], false);
}

#[tokio::test]
async fn test_error_statuses() {
    let base = spawn_app().await;
    let http = reqwest::Client::new();
    let unknown = uuid::Uuid::new_v4();

    let res = http
        .post(format!("{base}/api/pins"))
        .json(&json!({"latitude": 91.0, "longitude": 0.0}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = http
        .get(format!("{base}/api/pins/{unknown}/album"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = http
        .get(format!("{base}/api/photos/{unknown}/image"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let pin_id = add_pin(&http, &base).await;
    let res = http
        .post(format!("{base}/api/pins/{pin_id}/photos/{unknown}/select"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_settings_roundtrip() {
    let base = spawn_app().await;
    let http = reqwest::Client::new();

    let res: Value = http
        .patch(format!("{base}/api/settings"))
        .json(&json!({"per_page": 12}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(res["per_page"], 12);

    let res: Value = http
        .get(format!("{base}/api/settings"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(res["per_page"], 12);
    assert_eq!(res["max_page"], 10);

    let res = http
        .patch(format!("{base}/api/settings"))
        .json(&json!({"max_page": 0}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}
