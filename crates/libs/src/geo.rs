use std::fmt;

use serde::{Deserialize, Serialize};

/// World longitude bounds accepted by the photo search API.
pub const LON_RANGE: (f64, f64) = (-180.0, 180.0);
/// World latitude bounds accepted by the photo search API.
pub const LAT_RANGE: (f64, f64) = (-90.0, 90.0);

pub const DEFAULT_HALF_WIDTH: f64 = 1.0;
pub const DEFAULT_HALF_HEIGHT: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

/// Box of `half_width` x `half_height` degrees around a coordinate, clamped to
/// the given world ranges. Degenerate input yields a degenerate box.
pub fn compute_bounding_box(
    lat: f64,
    lon: f64,
    half_width: f64,
    half_height: f64,
    lon_range: (f64, f64),
    lat_range: (f64, f64),
) -> BoundingBox {
    BoundingBox {
        min_lon: (lon - half_width).max(lon_range.0),
        min_lat: (lat - half_height).max(lat_range.0),
        max_lon: (lon + half_width).min(lon_range.1),
        max_lat: (lat + half_height).min(lat_range.1),
    }
}

/// Whether a coordinate lies inside the world ranges.
pub fn is_valid_coordinate(lat: f64, lon: f64) -> bool {
    lat.is_finite()
        && lon.is_finite()
        && (LAT_RANGE.0..=LAT_RANGE.1).contains(&lat)
        && (LON_RANGE.0..=LON_RANGE.1).contains(&lon)
}

// Rendered the way the `bbox` query parameter expects it.
impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.min_lon, self.min_lat, self.max_lon, self.max_lat
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_around_interior_point() {
        let bbox = compute_bounding_box(48.0, 11.0, 1.0, 1.0, LON_RANGE, LAT_RANGE);
        assert_eq!(
            bbox,
            BoundingBox {
                min_lon: 10.0,
                min_lat: 47.0,
                max_lon: 12.0,
                max_lat: 49.0,
            }
        );
    }

    #[test]
    fn test_box_clamped_at_world_edges() {
        let bbox = compute_bounding_box(89.5, -179.5, 1.0, 1.0, LON_RANGE, LAT_RANGE);
        assert_eq!(bbox.min_lon, -180.0);
        assert_eq!(bbox.max_lon, -178.5);
        assert_eq!(bbox.min_lat, 88.5);
        assert_eq!(bbox.max_lat, 90.0);
    }

    #[test]
    fn test_box_stays_within_world_ranges() {
        for lat in (-90..=90).step_by(15) {
            for lon in (-180..=180).step_by(30) {
                for half in [0.0, 0.5, 1.0, 10.0, 500.0] {
                    let b = compute_bounding_box(
                        lat as f64, lon as f64, half, half, LON_RANGE, LAT_RANGE,
                    );
                    assert!(b.min_lon >= LON_RANGE.0 && b.max_lon <= LON_RANGE.1);
                    assert!(b.min_lat >= LAT_RANGE.0 && b.max_lat <= LAT_RANGE.1);
                }
            }
        }
    }

    #[test]
    fn test_degenerate_input_is_not_rejected() {
        let bbox = compute_bounding_box(0.0, 0.0, -2.0, 0.0, LON_RANGE, LAT_RANGE);
        assert!(bbox.min_lon > bbox.max_lon);
        assert_eq!(bbox.min_lat, bbox.max_lat);
    }

    #[test]
    fn test_display_matches_query_format() {
        let bbox = compute_bounding_box(1.5, 2.0, 1.0, 0.5, LON_RANGE, LAT_RANGE);
        assert_eq!(bbox.to_string(), "1,1,3,2");
    }

    #[test]
    fn test_coordinate_validation() {
        assert!(is_valid_coordinate(90.0, -180.0));
        assert!(is_valid_coordinate(-45.2, 179.9));
        assert!(!is_valid_coordinate(90.1, 0.0));
        assert!(!is_valid_coordinate(0.0, 180.5));
        assert!(!is_valid_coordinate(f64::NAN, 0.0));
    }
}
