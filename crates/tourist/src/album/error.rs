use thiserror::Error;

use crate::db::{PhotoId, PinId, StoreError};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("pin {0} does not exist")]
    UnknownPin(PinId),

    #[error("photo {0} does not exist")]
    UnknownPhoto(PhotoId),

    #[error(transparent)]
    Store(#[from] StoreError),
}
