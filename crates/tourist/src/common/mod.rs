mod error;
pub mod metrics;
mod state;

pub use error::{ApiError, ApiResult};
pub use state::AppState;
