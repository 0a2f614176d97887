use std::sync::Arc;

use libs::search_settings::SharedSettings;

use crate::album::AlbumSync;

#[derive(Clone)]
pub struct AppState {
    pub sync: Arc<AlbumSync>,
    pub settings: SharedSettings,
}
