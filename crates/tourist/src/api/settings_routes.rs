use axum::{Json, Router, extract::State, http::StatusCode, routing::get};
use serde::Deserialize;

use libs::search_settings::SearchSettings;

use crate::common::AppState;

#[derive(Deserialize)]
pub struct PartialSettings {
    pub per_page: Option<u32>,
    pub max_page: Option<u32>,
    pub bbox_half_width: Option<f64>,
    pub bbox_half_height: Option<f64>,
    pub safe_search: Option<bool>,
}

impl PartialSettings {
    /// Reject values the search cannot work with.
    fn validate(&self) -> Result<(), &'static str> {
        if self.per_page == Some(0) {
            return Err("per_page must be positive");
        }
        if self.max_page == Some(0) {
            return Err("max_page must be positive");
        }
        let positive = |v: Option<f64>| v.is_none_or(|v| v.is_finite() && v > 0.0);
        if !positive(self.bbox_half_width) || !positive(self.bbox_half_height) {
            return Err("bounding box half extents must be positive");
        }
        Ok(())
    }

    fn apply(self, s: &mut SearchSettings) {
        if let Some(v) = self.per_page {
            s.per_page = v;
        }
        if let Some(v) = self.max_page {
            s.max_page = v;
        }
        if let Some(v) = self.bbox_half_width {
            s.bbox_half_width = v;
        }
        if let Some(v) = self.bbox_half_height {
            s.bbox_half_height = v;
        }
        if let Some(v) = self.safe_search {
            s.safe_search = v;
        }
    }
}

pub fn settings_routes() -> Router<AppState> {
    Router::new().route("/api/settings", get(get_settings).patch(patch_settings))
}

async fn get_settings(State(state): State<AppState>) -> Json<SearchSettings> {
    Json(state.settings.get().await)
}

async fn patch_settings(
    State(state): State<AppState>,
    Json(chg): Json<PartialSettings>,
) -> Result<Json<SearchSettings>, (StatusCode, &'static str)> {
    chg.validate().map_err(|msg| (StatusCode::BAD_REQUEST, msg))?;
    state
        .settings
        .update(|s| chg.apply(s))
        .await
        .map(Json)
        .map_err(|e| {
            tracing::error!("failed to persist search settings: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to persist settings")
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partial(json: &str) -> PartialSettings {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_apply_only_touches_given_fields() {
        let mut s = SearchSettings::default();
        partial(r#"{"per_page": 30, "safe_search": false}"#).apply(&mut s);
        assert_eq!(s.per_page, 30);
        assert!(!s.safe_search);
        assert_eq!(s.max_page, SearchSettings::default().max_page);
    }

    #[test]
    fn test_validate_rejects_nonsense() {
        assert!(partial(r#"{"per_page": 0}"#).validate().is_err());
        assert!(partial(r#"{"max_page": 0}"#).validate().is_err());
        assert!(partial(r#"{"bbox_half_width": -1.0}"#).validate().is_err());
        assert!(partial(r#"{"bbox_half_height": 2.5}"#).validate().is_ok());
        assert!(partial("{}").validate().is_ok());
    }
}
