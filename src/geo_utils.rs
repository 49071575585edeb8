//! Geographic utilities: great-circle distance and bounds.

use geo::{BoundingRect, Coord, LineString};

use crate::{Bounds, GpsPoint};

/// Mean Earth radius in miles.
pub const EARTH_RADIUS_MILES: f64 = 3958.8;

/// Great-circle distance between two points in miles (Haversine formula).
///
/// # Example
/// ```
/// use path_tracker::{GpsPoint, geo_utils::haversine_miles};
/// let d = haversine_miles(&GpsPoint::new(40.0, -105.0), &GpsPoint::new(40.001, -105.0));
/// assert!((d - 0.0691).abs() < 0.001);
/// ```
pub fn haversine_miles(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    let lat1 = p1.latitude.to_radians();
    let lat2 = p2.latitude.to_radians();
    let dlat = (p2.latitude - p1.latitude).to_radians();
    let dlon = (p2.longitude - p1.longitude).to_radians();

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_MILES * c
}

/// Distance added by appending `next` after `last` (0 for the first point).
pub fn incremental_distance(last: Option<&GpsPoint>, next: &GpsPoint) -> f64 {
    last.map(|prev| haversine_miles(prev, next)).unwrap_or(0.0)
}

/// Sum of the pairwise distances of consecutive points, in miles.
pub fn path_distance(points: &[GpsPoint]) -> f64 {
    points
        .windows(2)
        .map(|w| haversine_miles(&w[0], &w[1]))
        .sum()
}

/// Bounding box of a point sequence. `None` when empty.
pub fn compute_bounds(points: &[GpsPoint]) -> Option<Bounds> {
    let line: LineString<f64> = points
        .iter()
        .map(|p| Coord {
            x: p.longitude,
            y: p.latitude,
        })
        .collect();

    line.bounding_rect().map(|rect| Bounds {
        min_lat: rect.min().y,
        max_lat: rect.max().y,
        min_lng: rect.min().x,
        max_lng: rect.max().x,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_zero() {
        let p = GpsPoint::new(40.0, -105.0);
        assert_eq!(haversine_miles(&p, &p), 0.0);
    }

    #[test]
    fn test_haversine_symmetric() {
        let a = GpsPoint::new(51.5074, -0.1278);
        let b = GpsPoint::new(48.8566, 2.3522);
        let d1 = haversine_miles(&a, &b);
        let d2 = haversine_miles(&b, &a);
        assert!((d1 - d2).abs() < 1e-9);
        // London to Paris is roughly 213 miles
        assert!((d1 - 213.0).abs() < 2.0);
    }

    #[test]
    fn test_incremental_first_point_is_zero() {
        let p = GpsPoint::new(40.0, -105.0);
        assert_eq!(incremental_distance(None, &p), 0.0);
    }

    #[test]
    fn test_path_distance_matches_increments() {
        let points = vec![
            GpsPoint::new(40.0000, -105.0000),
            GpsPoint::new(40.0010, -105.0000),
            GpsPoint::new(40.0020, -105.0000),
        ];
        let incremental: f64 = points
            .iter()
            .enumerate()
            .map(|(i, p)| incremental_distance(i.checked_sub(1).map(|j| &points[j]), p))
            .sum();
        assert!((incremental - path_distance(&points)).abs() < 1e-12);
        assert!((path_distance(&points) - 0.1378).abs() < 1e-3);
    }

    #[test]
    fn test_compute_bounds() {
        assert!(compute_bounds(&[]).is_none());

        let bounds = compute_bounds(&[
            GpsPoint::new(40.0, -105.0),
            GpsPoint::new(40.002, -105.003),
            GpsPoint::new(39.999, -104.998),
        ])
        .unwrap();
        assert_eq!(bounds.min_lat, 39.999);
        assert_eq!(bounds.max_lat, 40.002);
        assert_eq!(bounds.min_lng, -105.003);
        assert_eq!(bounds.max_lng, -104.998);
    }
}
