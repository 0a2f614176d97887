use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing,
};
use mime::{IMAGE_GIF, IMAGE_JPEG, IMAGE_PNG, Mime};
use serde::{Deserialize, Serialize};

use crate::{
    album::{Album, AlbumState},
    common::{ApiError, ApiResult, AppState},
    db::{Photo, PhotoId, Pin, PinId},
};

#[derive(Debug, Serialize)]
pub struct PhotoView {
    pub id: PhotoId,
    pub url: String,
    pub has_image: bool,
}

impl From<&Photo> for PhotoView {
    fn from(photo: &Photo) -> Self {
        Self {
            id: photo.id,
            url: photo.url.clone(),
            has_image: photo.has_image(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AlbumView {
    pub pin: Pin,
    pub state: AlbumState,
    pub photos: Vec<PhotoView>,
    pub selected: Vec<PhotoId>,
}

impl From<Album> for AlbumView {
    fn from(album: Album) -> Self {
        let photos: Vec<PhotoView> = album.photos.iter().map(PhotoView::from).collect();
        // Keep the selection in album order.
        let selected = album
            .photos
            .iter()
            .map(|p| p.id)
            .filter(|id| album.selected.contains(id))
            .collect();
        Self {
            pin: album.pin,
            state: album.state,
            photos,
            selected,
        }
    }
}

#[derive(Deserialize)]
pub struct NewPin {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Deserialize, Default)]
pub struct DeleteRequest {
    /// Absent or empty means the pin's current selection.
    #[serde(default)]
    pub ids: Option<Vec<PhotoId>>,
}

#[derive(Serialize)]
pub struct SelectResponse {
    pub selected: bool,
}

pub fn pin_routes() -> Router<AppState> {
    Router::new()
        .route("/api/pins", routing::get(list_pins).post(add_pin))
        .route("/api/pins/{id}/album", routing::get(open_album))
        .route(
            "/api/pins/{id}/album/new-collection",
            routing::post(new_collection),
        )
        .route("/api/pins/{id}/photos", routing::delete(delete_photos))
        .route(
            "/api/pins/{id}/photos/{photo_id}/select",
            routing::post(toggle_select),
        )
        .route("/api/photos/{id}/image", routing::get(photo_image))
}

async fn list_pins(State(state): State<AppState>) -> ApiResult<Json<Vec<Pin>>> {
    Ok(Json(state.sync.pins().await?))
}

async fn add_pin(
    State(state): State<AppState>,
    Json(new_pin): Json<NewPin>,
) -> ApiResult<impl IntoResponse> {
    let pin = state
        .sync
        .add_pin(new_pin.latitude, new_pin.longitude)
        .await?;
    Ok((StatusCode::CREATED, Json(pin)))
}

async fn open_album(
    State(state): State<AppState>,
    Path(id): Path<PinId>,
) -> ApiResult<Json<AlbumView>> {
    Ok(Json(state.sync.open_album(id).await?.into()))
}

async fn new_collection(
    State(state): State<AppState>,
    Path(id): Path<PinId>,
) -> ApiResult<Json<AlbumView>> {
    Ok(Json(state.sync.new_collection(id).await?.into()))
}

async fn delete_photos(
    State(state): State<AppState>,
    Path(id): Path<PinId>,
    body: Bytes,
) -> ApiResult<Json<AlbumView>> {
    let request: DeleteRequest = if body.is_empty() {
        DeleteRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(e.to_string()))?
    };

    let ids = match request.ids {
        Some(ids) if !ids.is_empty() => ids,
        _ => state.sync.selection(id).into_iter().collect(),
    };
    Ok(Json(state.sync.delete_selected(id, &ids).await?.into()))
}

async fn toggle_select(
    State(state): State<AppState>,
    Path((id, photo_id)): Path<(PinId, PhotoId)>,
) -> ApiResult<Json<SelectResponse>> {
    let selected = state.sync.toggle_select(id, photo_id).await?;
    Ok(Json(SelectResponse { selected }))
}

async fn photo_image(
    State(state): State<AppState>,
    Path(id): Path<PhotoId>,
) -> ApiResult<Response> {
    let Some(photo) = state.sync.load_image(id).await? else {
        return Ok(StatusCode::NO_CONTENT.into_response());
    };
    let Some(bytes) = photo.image else {
        return Ok(StatusCode::NO_CONTENT.into_response());
    };

    let content_type = sniff_image_type(&bytes);
    Ok(([(header::CONTENT_TYPE, content_type.to_string())], bytes).into_response())
}

/// Guess the media type from the leading magic bytes.
fn sniff_image_type(bytes: &[u8]) -> Mime {
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        IMAGE_PNG
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        IMAGE_GIF
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        IMAGE_JPEG
    } else {
        mime::APPLICATION_OCTET_STREAM
    }
}
