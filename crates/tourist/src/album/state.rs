use std::collections::HashSet;

use serde::Serialize;

use crate::db::{Photo, PhotoId, Pin, PinId};

pub const NO_PHOTOS_NOTICE: &str = "No photos found at this location.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadSource {
    Cache,
    Network,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AlbumState {
    #[default]
    Idle,
    Loading { source: LoadSource },
    /// `notice` is set when a search legitimately came back empty.
    Ready { notice: Option<String> },
    Failed { message: String },
}

/// Snapshot of one pin's album handed to the presentation layer.
#[derive(Debug, Clone)]
pub struct Album {
    pub pin: Pin,
    pub state: AlbumState,
    pub photos: Vec<Photo>,
    pub selected: HashSet<PhotoId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AlbumEvent {
    StateChanged { pin_id: PinId, state: AlbumState },
    ImageLoaded { pin_id: PinId, photo_id: PhotoId },
}
