use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicBool, Ordering},
    },
};

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{OptionalExtension, Row, params, types::Type};
use tokio::{sync::RwLock, task};
use uuid::Uuid;

use libs::geo;

use super::{Photo, PhotoId, Pin, PinId, StoreError, schema};

type Result<T> = std::result::Result<T, StoreError>;

/// Anything [`LocalStore::delete`] can remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Pin(PinId),
    Photo(PhotoId),
}

impl From<PinId> for Entity {
    fn from(id: PinId) -> Self {
        Entity::Pin(id)
    }
}

impl From<PhotoId> for Entity {
    fn from(id: PhotoId) -> Self {
        Entity::Photo(id)
    }
}

impl From<&Pin> for Entity {
    fn from(pin: &Pin) -> Self {
        Entity::Pin(pin.id)
    }
}

impl From<&Photo> for Entity {
    fn from(photo: &Photo) -> Self {
        Entity::Photo(photo.id)
    }
}

/// Mutations staged since the last successful save.
#[derive(Debug, Default, Clone)]
struct ChangeSet {
    pins: Vec<Pin>,
    photos: Vec<Photo>,
    /// Payloads for photos that are already durable.
    images: HashMap<PhotoId, Vec<u8>>,
    deleted_pins: HashSet<PinId>,
    deleted_photos: HashSet<PhotoId>,
}

impl ChangeSet {
    fn is_empty(&self) -> bool {
        self.pins.is_empty()
            && self.photos.is_empty()
            && self.images.is_empty()
            && self.deleted_pins.is_empty()
            && self.deleted_photos.is_empty()
    }

    fn photo_hidden(&self, photo: &Photo) -> bool {
        self.deleted_photos.contains(&photo.id) || self.deleted_pins.contains(&photo.pin_id)
    }

    /// Forget everything `saved` wrote. Entries changed again while the save
    /// was running stay staged.
    fn settle(&mut self, saved: &ChangeSet) {
        let saved_pins: HashSet<PinId> = saved.pins.iter().map(|p| p.id).collect();
        self.pins.retain(|p| !saved_pins.contains(&p.id));

        let saved_photos: HashMap<PhotoId, &Photo> =
            saved.photos.iter().map(|p| (p.id, p)).collect();
        let mut promoted = Vec::new();
        self.photos.retain(|p| match saved_photos.get(&p.id) {
            None => true,
            Some(written) => {
                // The row exists now, so a newer payload becomes a plain update.
                if p.image != written.image {
                    if let Some(bytes) = &p.image {
                        promoted.push((p.id, bytes.clone()));
                    }
                }
                false
            }
        });
        self.images.extend(promoted);

        for (id, bytes) in &saved.images {
            if self.images.get(id) == Some(bytes) {
                self.images.remove(id);
            }
        }
        for id in &saved.deleted_pins {
            self.deleted_pins.remove(id);
        }
        for id in &saved.deleted_photos {
            self.deleted_photos.remove(id);
        }
    }
}

/// Ids of staged entities a running save is inserting.
#[derive(Debug, Default)]
struct InFlight {
    pins: HashSet<PinId>,
    photos: HashSet<PhotoId>,
}

impl InFlight {
    fn of(changes: &ChangeSet) -> Self {
        Self {
            pins: changes.pins.iter().map(|p| p.id).collect(),
            photos: changes.photos.iter().map(|p| p.id).collect(),
        }
    }
}

/// On-device store of pins and their photos.
///
/// Mutations are buffered in memory and only become durable on [`save`].
/// Reads see the durable rows overlaid with the staged changes. Saves are
/// serialized; readers never observe a half-applied save.
///
/// [`save`]: LocalStore::save
pub struct LocalStore {
    pool: Arc<Pool<SqliteConnectionManager>>,
    pending: Mutex<ChangeSet>,
    /// Only locked while `pending` is held.
    in_flight: Mutex<InFlight>,
    /// Held shared by readers and exclusively by the writer.
    write_gate: RwLock<()>,
    closed: AtomicBool,
    path: PathBuf,
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl LocalStore {
    /// Open or create the store file and bring its schema up to date.
    pub async fn open(path: &Path) -> Result<Self> {
        let path = path.to_path_buf();
        let manager = SqliteConnectionManager::file(&path).with_init(|conn| {
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
            conn.pragma_update(None, "synchronous", "NORMAL")?;
            conn.execute_batch("PRAGMA foreign_keys = ON;")
        });

        let open_path = path.clone();
        let pool = task::spawn_blocking(move || {
            let pool = Pool::builder()
                .max_size(4)
                .build(manager)
                .map_err(|source| StoreError::Open {
                    path: open_path,
                    source,
                })?;
            schema::migrate(&*pool.get()?)?;
            Ok::<_, StoreError>(pool)
        })
        .await??;

        tracing::info!("opened store at {}", path.display());
        Ok(Self::with_pool(pool, path))
    }

    /// A private in-memory database, mostly for tests.
    pub fn open_in_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory()
            .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
        // Every in-memory connection is its own database, so keep exactly one.
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|source| StoreError::Open {
                path: PathBuf::from(":memory:"),
                source,
            })?;
        schema::migrate(&*pool.get()?)?;
        Ok(Self::with_pool(pool, PathBuf::from(":memory:")))
    }

    fn with_pool(pool: Pool<SqliteConnectionManager>, path: PathBuf) -> Self {
        Self {
            pool: Arc::new(pool),
            pending: Mutex::new(ChangeSet::default()),
            in_flight: Mutex::new(InFlight::default()),
            write_gate: RwLock::new(()),
            closed: AtomicBool::new(false),
            path,
        }
    }

    /// Flush staged changes and refuse any further use.
    pub async fn close(&self) -> Result<()> {
        self.save().await?;
        self.closed.store(true, Ordering::SeqCst);
        tracing::info!("closed store at {}", self.path.display());
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    fn pending(&self) -> MutexGuard<'_, ChangeSet> {
        // A panic while holding the lock cannot leave the change set torn.
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn in_flight(&self) -> MutexGuard<'_, InFlight> {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn has_changes(&self) -> bool {
        !self.pending().is_empty()
    }

    pub fn create_pin(&self, latitude: f64, longitude: f64) -> Result<Pin> {
        self.ensure_open()?;
        if !geo::is_valid_coordinate(latitude, longitude) {
            return Err(StoreError::InvalidCoordinate {
                latitude,
                longitude,
            });
        }

        let pin = Pin {
            id: PinId::new(),
            latitude,
            longitude,
            created_at: chrono::Utc::now().timestamp_millis(),
        };
        self.pending().pins.push(pin.clone());
        Ok(pin)
    }

    pub async fn create_photo(&self, pin: &Pin, url: &str) -> Result<Photo> {
        self.ensure_open()?;
        if self.pin(pin.id).await?.is_none() {
            return Err(StoreError::UnknownPin(pin.id));
        }

        let photo = Photo {
            id: PhotoId::new(),
            pin_id: pin.id,
            url: url.to_owned(),
            image: None,
            created_at: chrono::Utc::now().timestamp_millis(),
        };
        let mut pending = self.pending();
        if pending.deleted_pins.contains(&pin.id) {
            return Err(StoreError::UnknownPin(pin.id));
        }
        pending.photos.push(photo.clone());
        Ok(photo)
    }

    pub async fn pins(&self) -> Result<Vec<Pin>> {
        self.ensure_open()?;
        let _gate = self.write_gate.read().await;
        let pool = self.pool.clone();
        let durable = task::spawn_blocking(move || {
            let conn = pool.get()?;
            let mut stmt = conn.prepare(
                r#"
                SELECT id, latitude, longitude, created_at
                FROM pins
                ORDER BY created_at, rowid
                "#,
            )?;
            let rows = stmt
                .query_map([], pin_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok::<_, StoreError>(rows)
        })
        .await??;

        let pending = self.pending();
        let mut pins: Vec<Pin> = durable
            .into_iter()
            .filter(|p| !pending.deleted_pins.contains(&p.id))
            .collect();
        for pin in &pending.pins {
            if !pins.iter().any(|p| p.id == pin.id) {
                pins.push(pin.clone());
            }
        }
        Ok(pins)
    }

    pub async fn pin(&self, id: PinId) -> Result<Option<Pin>> {
        self.ensure_open()?;
        let _gate = self.write_gate.read().await;
        let pool = self.pool.clone();
        let durable = task::spawn_blocking(move || {
            let conn = pool.get()?;
            conn.query_row(
                r#"
                SELECT id, latitude, longitude, created_at
                FROM pins
                WHERE id = ?1
                "#,
                params![id.0.to_string()],
                pin_from_row,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await??;

        let pending = self.pending();
        if pending.deleted_pins.contains(&id) {
            return Ok(None);
        }
        Ok(durable.or_else(|| pending.pins.iter().find(|p| p.id == id).cloned()))
    }

    /// All photos of a pin in creation order, staged changes included.
    pub async fn photos_for(&self, pin_id: PinId) -> Result<Vec<Photo>> {
        self.ensure_open()?;
        let _gate = self.write_gate.read().await;
        let pool = self.pool.clone();
        let durable = task::spawn_blocking(move || {
            let conn = pool.get()?;
            let mut stmt = conn.prepare(
                r#"
                SELECT id, pin_id, url, image, created_at
                FROM photos
                WHERE pin_id = ?1
                ORDER BY rowid
                "#,
            )?;
            let rows = stmt
                .query_map(params![pin_id.0.to_string()], photo_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok::<_, StoreError>(rows)
        })
        .await??;

        let pending = self.pending();
        if pending.deleted_pins.contains(&pin_id) {
            return Ok(Vec::new());
        }
        let mut photos: Vec<Photo> = durable
            .into_iter()
            .filter(|p| !pending.photo_hidden(p))
            .map(|mut p| {
                if let Some(bytes) = pending.images.get(&p.id) {
                    p.image = Some(bytes.clone());
                }
                p
            })
            .collect();
        for staged in pending.photos.iter().filter(|p| p.pin_id == pin_id) {
            match photos.iter_mut().find(|p| p.id == staged.id) {
                Some(existing) => *existing = staged.clone(),
                None => photos.push(staged.clone()),
            }
        }
        Ok(photos)
    }

    pub async fn photo(&self, id: PhotoId) -> Result<Option<Photo>> {
        self.ensure_open()?;
        let _gate = self.write_gate.read().await;
        let durable = self.durable_photo(id).await?;

        let pending = self.pending();
        if let Some(staged) = pending.photos.iter().find(|p| p.id == id) {
            return Ok(Some(staged.clone()));
        }
        Ok(durable.filter(|p| !pending.photo_hidden(p)).map(|mut p| {
            if let Some(bytes) = pending.images.get(&p.id) {
                p.image = Some(bytes.clone());
            }
            p
        }))
    }

    async fn durable_photo(&self, id: PhotoId) -> Result<Option<Photo>> {
        let pool = self.pool.clone();
        task::spawn_blocking(move || {
            let conn = pool.get()?;
            conn.query_row(
                r#"
                SELECT id, pin_id, url, image, created_at
                FROM photos
                WHERE id = ?1
                "#,
                params![id.0.to_string()],
                photo_from_row,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await?
    }

    /// Stage an image payload. Returns `false` and stages nothing when the
    /// photo no longer exists, so a late download cannot bring it back.
    pub async fn set_image(&self, id: PhotoId, bytes: Vec<u8>) -> Result<bool> {
        self.ensure_open()?;
        let _gate = self.write_gate.read().await;
        let durable = self.durable_photo(id).await?;

        let mut pending = self.pending();
        if let Some(staged) = pending.photos.iter_mut().find(|p| p.id == id) {
            staged.image = Some(bytes);
            return Ok(true);
        }
        match durable {
            Some(photo) if !pending.photo_hidden(&photo) => {
                pending.images.insert(id, bytes);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Mark a pin (with its whole album) or a single photo for removal.
    pub fn delete(&self, entity: impl Into<Entity>) -> Result<()> {
        self.ensure_open()?;
        let mut pending = self.pending();
        let in_flight = self.in_flight();
        // A staged entity that a running save is inserting needs a real
        // delete once that save lands.
        match entity.into() {
            Entity::Photo(id) => {
                pending.images.remove(&id);
                let staged = pending.photos.len();
                pending.photos.retain(|p| p.id != id);
                if pending.photos.len() == staged || in_flight.photos.contains(&id) {
                    pending.deleted_photos.insert(id);
                }
            }
            Entity::Pin(id) => {
                pending.photos.retain(|p| p.pin_id != id);
                let staged = pending.pins.len();
                pending.pins.retain(|p| p.id != id);
                if pending.pins.len() == staged || in_flight.pins.contains(&id) {
                    pending.deleted_pins.insert(id);
                }
            }
        }
        Ok(())
    }

    /// Write every staged change in one transaction.
    ///
    /// On failure the staged changes are kept so the caller can retry.
    pub async fn save(&self) -> Result<()> {
        self.ensure_open()?;
        let _gate = self.write_gate.write().await;

        let snapshot = {
            let pending = self.pending();
            if pending.is_empty() {
                return Ok(());
            }
            *self.in_flight() = InFlight::of(&pending);
            pending.clone()
        };

        let pool = self.pool.clone();
        let changes = snapshot.clone();
        let written = task::spawn_blocking(move || write_changes(&pool, &changes))
            .await
            .map_err(StoreError::from)
            .and_then(|r| r);

        let mut pending = self.pending();
        *self.in_flight() = InFlight::default();
        match written {
            Ok(()) => {
                pending.settle(&snapshot);
                tracing::debug!(
                    pins = snapshot.pins.len(),
                    photos = snapshot.photos.len(),
                    images = snapshot.images.len(),
                    deleted_pins = snapshot.deleted_pins.len(),
                    deleted_photos = snapshot.deleted_photos.len(),
                    "saved store changes"
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!("failed to save store changes: {e}");
                Err(StoreError::Persistence(Box::new(e)))
            }
        }
    }

    /// Remove every pin and photo, durable or staged.
    pub async fn wipe(&self) -> Result<()> {
        self.ensure_open()?;
        let _gate = self.write_gate.write().await;
        let pool = self.pool.clone();
        task::spawn_blocking(move || {
            let conn = pool.get()?;
            conn.execute_batch(
                r#"
                DELETE FROM photos;
                DELETE FROM pins;
                "#,
            )?;
            Ok::<_, StoreError>(())
        })
        .await??;
        *self.pending() = ChangeSet::default();
        tracing::info!("wiped store at {}", self.path.display());
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn raw_connection(
        &self,
    ) -> r2d2::PooledConnection<SqliteConnectionManager> {
        self.pool.get().unwrap()
    }
}

fn write_changes(pool: &Pool<SqliteConnectionManager>, changes: &ChangeSet) -> Result<()> {
    let mut conn = pool.get()?;
    let tx = conn.transaction()?;

    for pin in &changes.pins {
        tx.execute(
            "INSERT INTO pins (id, latitude, longitude, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                pin.id.0.to_string(),
                pin.latitude,
                pin.longitude,
                pin.created_at
            ],
        )?;
    }
    for photo in &changes.photos {
        tx.execute(
            "INSERT INTO photos (id, pin_id, url, image, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                photo.id.0.to_string(),
                photo.pin_id.0.to_string(),
                photo.url,
                photo.image,
                photo.created_at
            ],
        )?;
    }
    // Updates only: a row deleted in the meantime stays deleted.
    for (id, bytes) in &changes.images {
        tx.execute(
            "UPDATE photos SET image = ?1 WHERE id = ?2",
            params![bytes, id.0.to_string()],
        )?;
    }
    for id in &changes.deleted_photos {
        tx.execute("DELETE FROM photos WHERE id = ?1", params![id.0.to_string()])?;
    }
    for id in &changes.deleted_pins {
        tx.execute("DELETE FROM pins WHERE id = ?1", params![id.0.to_string()])?;
    }

    tx.commit()?;
    Ok(())
}

fn parse_uuid(idx: usize, raw: String) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn pin_from_row(row: &Row<'_>) -> rusqlite::Result<Pin> {
    Ok(Pin {
        id: PinId(parse_uuid(0, row.get(0)?)?),
        latitude: row.get(1)?,
        longitude: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn photo_from_row(row: &Row<'_>) -> rusqlite::Result<Photo> {
    Ok(Photo {
        id: PhotoId(parse_uuid(0, row.get(0)?)?),
        pin_id: PinId(parse_uuid(1, row.get(1)?)?),
        url: row.get(2)?,
        image: row.get(3)?,
        created_at: row.get(4)?,
    })
}
