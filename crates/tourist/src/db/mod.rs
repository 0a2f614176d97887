mod error;
mod photo;
mod pin;
mod schema;
mod store;

pub use error::StoreError;
pub use photo::{Photo, PhotoId};
pub use pin::{Pin, PinId};
pub use store::{Entity, LocalStore};
