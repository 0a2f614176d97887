//! Fetch-once album synchronisation.
//!
//! An album is loaded from the store when it has any photos and searched
//! on the network otherwise. Nothing refreshes an existing album except an
//! explicit new collection.

mod error;
mod state;

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard},
};

use tokio::{sync::broadcast, task::JoinHandle};

use crate::{
    db::{LocalStore, Photo, PhotoId, Pin, PinId, StoreError},
    flickr::PhotoSource,
};

pub use error::SyncError;
pub use state::{Album, AlbumEvent, AlbumState, LoadSource, NO_PHOTOS_NOTICE};

const EVENT_CAPACITY: usize = 64;

#[derive(Default)]
struct AlbumEntry {
    state: AlbumState,
    selected: HashSet<PhotoId>,
}

pub struct AlbumSync {
    store: Arc<LocalStore>,
    source: Arc<dyn PhotoSource>,
    albums: Mutex<HashMap<PinId, AlbumEntry>>,
    /// Serializes album operations per pin. Entries for removed pins are
    /// pruned.
    pin_locks: Mutex<HashMap<PinId, Arc<tokio::sync::Mutex<()>>>>,
    events: broadcast::Sender<AlbumEvent>,
}

impl AlbumSync {
    pub fn new(store: Arc<LocalStore>, source: Arc<dyn PhotoSource>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            store,
            source,
            albums: Mutex::new(HashMap::new()),
            pin_locks: Mutex::new(HashMap::new()),
            events,
        }
    }

    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    /// Album changes, published from whichever task made them.
    pub fn subscribe(&self) -> broadcast::Receiver<AlbumEvent> {
        self.events.subscribe()
    }

    pub async fn pins(&self) -> Result<Vec<Pin>, SyncError> {
        Ok(self.store.pins().await?)
    }

    pub async fn add_pin(&self, latitude: f64, longitude: f64) -> Result<Pin, SyncError> {
        let pin = self.store.create_pin(latitude, longitude)?;
        if let Err(e) = self.store.save().await {
            // Don't leave a half-added pin behind for the next save to pick up.
            self.store.delete(&pin)?;
            return Err(e.into());
        }
        tracing::info!(pin = %pin.id, latitude, longitude, "added pin");
        Ok(pin)
    }

    /// Drop every pin and photo along with all album state.
    pub async fn wipe(&self) -> Result<(), SyncError> {
        self.store.wipe().await?;
        self.albums().clear();
        self.pin_locks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        tracing::info!("wiped all albums");
        Ok(())
    }

    pub fn state(&self, pin_id: PinId) -> AlbumState {
        self.albums()
            .get(&pin_id)
            .map(|a| a.state.clone())
            .unwrap_or_default()
    }

    pub fn selection(&self, pin_id: PinId) -> HashSet<PhotoId> {
        self.albums()
            .get(&pin_id)
            .map(|a| a.selected.clone())
            .unwrap_or_default()
    }

    /// Show a pin's album, searching only when nothing is cached.
    pub async fn open_album(&self, pin_id: PinId) -> Result<Album, SyncError> {
        let pin = self.require_pin(pin_id).await?;
        let lock = self.pin_lock(pin_id);
        let _guard = lock.lock().await;

        self.set_state(pin_id, AlbumState::Loading {
            source: LoadSource::Cache,
        });
        let photos = self.on_store(pin_id, self.store.photos_for(pin_id).await)?;
        if !photos.is_empty() {
            tracing::debug!(pin = %pin_id, photos = photos.len(), "album loaded from store");
            self.set_state(pin_id, AlbumState::Ready { notice: None });
            return Ok(self.album(pin, photos));
        }

        self.fetch_from_network(pin).await
    }

    /// Throw the album away and search again.
    pub async fn new_collection(&self, pin_id: PinId) -> Result<Album, SyncError> {
        let pin = self.require_pin(pin_id).await?;
        let lock = self.pin_lock(pin_id);
        let _guard = lock.lock().await;

        let photos = self.on_store(pin_id, self.store.photos_for(pin_id).await)?;
        for photo in &photos {
            self.on_store(pin_id, self.store.delete(photo))?;
        }
        self.on_store(pin_id, self.store.save().await)?;
        if let Some(album) = self.albums().get_mut(&pin_id) {
            album.selected.clear();
        }
        tracing::info!(pin = %pin_id, removed = photos.len(), "cleared album for new collection");

        self.fetch_from_network(pin).await
    }

    /// Delete exactly the given photos of a pin's album.
    ///
    /// Ids that are not part of the album are ignored.
    pub async fn delete_selected(
        &self,
        pin_id: PinId,
        photo_ids: &[PhotoId],
    ) -> Result<Album, SyncError> {
        let pin = self.require_pin(pin_id).await?;
        let lock = self.pin_lock(pin_id);
        let _guard = lock.lock().await;

        let doomed: HashSet<PhotoId> = photo_ids.iter().copied().collect();
        let photos = self.on_store(pin_id, self.store.photos_for(pin_id).await)?;
        let mut removed = 0;
        for photo in photos.iter().filter(|p| doomed.contains(&p.id)) {
            self.on_store(pin_id, self.store.delete(photo))?;
            removed += 1;
        }
        self.on_store(pin_id, self.store.save().await)?;

        if let Some(album) = self.albums().get_mut(&pin_id) {
            album.selected.retain(|id| !doomed.contains(id));
        }
        tracing::info!(pin = %pin_id, removed, "deleted selected photos");

        let photos: Vec<Photo> = photos
            .into_iter()
            .filter(|p| !doomed.contains(&p.id))
            .collect();
        self.set_state(pin_id, AlbumState::Ready { notice: None });
        Ok(self.album(pin, photos))
    }

    /// Flip a photo's membership in the pin's selection.
    pub async fn toggle_select(&self, pin_id: PinId, photo_id: PhotoId) -> Result<bool, SyncError> {
        match self.store.photo(photo_id).await? {
            Some(photo) if photo.pin_id == pin_id => {}
            _ => return Err(SyncError::UnknownPhoto(photo_id)),
        }

        let mut albums = self.albums();
        let selected = &mut albums.entry(pin_id).or_default().selected;
        if selected.remove(&photo_id) {
            Ok(false)
        } else {
            selected.insert(photo_id);
            Ok(true)
        }
    }

    /// Make sure a photo has its image payload.
    ///
    /// Returns `Ok(None)` when the download failed or the photo was deleted
    /// while the download was running; neither is retried.
    pub async fn load_image(&self, photo_id: PhotoId) -> Result<Option<Photo>, SyncError> {
        let photo = self
            .store
            .photo(photo_id)
            .await?
            .ok_or(SyncError::UnknownPhoto(photo_id))?;
        if photo.has_image() {
            return Ok(Some(photo));
        }

        let bytes = match self.source.download_photo(&photo.url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(photo = %photo_id, "image download failed: {e}");
                return Ok(None);
            }
        };

        if !self.store.set_image(photo_id, bytes).await? {
            tracing::debug!(photo = %photo_id, "photo deleted during download, discarding image");
            return Ok(None);
        }
        self.store.save().await?;

        let _ = self.events.send(AlbumEvent::ImageLoaded {
            pin_id: photo.pin_id,
            photo_id,
        });
        Ok(self.store.photo(photo_id).await?)
    }

    /// [`load_image`](Self::load_image) on a background task. The task
    /// completes on an arbitrary runtime thread; watch [`subscribe`]
    /// for the result.
    ///
    /// [`subscribe`]: Self::subscribe
    pub fn spawn_image_load(
        self: &Arc<Self>,
        photo_id: PhotoId,
    ) -> JoinHandle<Result<Option<Photo>, SyncError>> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.load_image(photo_id).await })
    }

    async fn fetch_from_network(&self, pin: Pin) -> Result<Album, SyncError> {
        let pin_id = pin.id;
        self.set_state(pin_id, AlbumState::Loading {
            source: LoadSource::Network,
        });

        let urls = match self.source.search_by_location(&pin).await {
            Ok(urls) => urls,
            Err(e) => {
                self.set_state(pin_id, AlbumState::Failed {
                    message: e.to_string(),
                });
                return Ok(self.album(pin, Vec::new()));
            }
        };

        if urls.is_empty() {
            self.set_state(pin_id, AlbumState::Ready {
                notice: Some(NO_PHOTOS_NOTICE.to_owned()),
            });
            return Ok(self.album(pin, Vec::new()));
        }

        let mut photos = Vec::with_capacity(urls.len());
        for url in &urls {
            photos.push(self.on_store(pin_id, self.store.create_photo(&pin, url).await)?);
        }
        self.on_store(pin_id, self.store.save().await)?;
        tracing::info!(pin = %pin_id, photos = photos.len(), "stored new album");

        self.set_state(pin_id, AlbumState::Ready { notice: None });
        Ok(self.album(pin, photos))
    }

    async fn require_pin(&self, pin_id: PinId) -> Result<Pin, SyncError> {
        match self.store.pin(pin_id).await? {
            Some(pin) => Ok(pin),
            None => {
                // The pin may have been removed behind our back.
                self.forget(pin_id);
                Err(SyncError::UnknownPin(pin_id))
            }
        }
    }

    fn forget(&self, pin_id: PinId) {
        self.albums().remove(&pin_id);
        self.pin_locks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&pin_id);
    }

    /// Store failures mark the album failed before they propagate.
    fn on_store<T>(&self, pin_id: PinId, result: Result<T, StoreError>) -> Result<T, SyncError> {
        result.map_err(|e| {
            self.set_state(pin_id, AlbumState::Failed {
                message: e.to_string(),
            });
            SyncError::Store(e)
        })
    }

    fn album(&self, pin: Pin, photos: Vec<Photo>) -> Album {
        let (state, selected) = self
            .albums()
            .get(&pin.id)
            .map(|a| (a.state.clone(), a.selected.clone()))
            .unwrap_or_default();
        Album {
            pin,
            state,
            photos,
            selected,
        }
    }

    fn set_state(&self, pin_id: PinId, state: AlbumState) {
        self.albums().entry(pin_id).or_default().state = state.clone();
        let _ = self.events.send(AlbumEvent::StateChanged { pin_id, state });
    }

    fn albums(&self) -> MutexGuard<'_, HashMap<PinId, AlbumEntry>> {
        self.albums.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn pin_lock(&self, pin_id: PinId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.pin_locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(pin_id).or_default())
    }
}
