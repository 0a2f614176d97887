pub mod geo;
pub mod search_settings;
pub mod util;
