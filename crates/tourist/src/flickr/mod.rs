//! Client for the Flickr location photo search.

mod client;
mod error;
mod response;

use async_trait::async_trait;

use crate::db::Pin;

pub use client::{FlickrClient, search_params};
pub use error::SearchError;

/// Where album photos come from.
///
/// Object safe, so the album controller can hold an `Arc<dyn PhotoSource>`.
#[async_trait]
pub trait PhotoSource: Send + Sync {
    /// Media URLs of one result page of photos around `pin`.
    async fn search_by_location(&self, pin: &Pin) -> Result<Vec<String>, SearchError>;

    /// Raw bytes behind a media URL.
    async fn download_photo(&self, url: &str) -> Result<Vec<u8>, SearchError>;
}
