//! Read-only view model consumed by the map renderer.

use serde::Serialize;

use crate::geo_utils::compute_bounds;
use crate::paths::{PathRecord, PathSnapshot};
use crate::pins::PinRecord;
use crate::{Bounds, GpsPoint};

/// One recorded path to draw.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Polyline {
    pub path_id: String,
    pub points: Vec<GpsPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PinMarker {
    pub pin_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub label: String,
    pub details_pending: bool,
}

/// Ask the renderer to frame a path.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FitBoundsRequest {
    pub path_id: String,
    pub bounds: Bounds,
    pub edge_padding: f64,
    pub animated: bool,
}

impl FitBoundsRequest {
    /// Frame `record`. Needs at least two points to have an extent.
    pub fn for_path(record: &PathRecord, edge_padding: f64) -> Option<Self> {
        if record.points.len() < 2 {
            return None;
        }
        compute_bounds(&record.points).map(|bounds| Self {
            path_id: record.id.clone(),
            bounds,
            edge_padding,
            animated: true,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MapView {
    pub polylines: Vec<Polyline>,
    pub markers: Vec<PinMarker>,
    /// When set, only this path is drawn.
    pub focused_path_id: Option<String>,
    pub current_location: Option<GpsPoint>,
}

impl MapView {
    pub fn build(
        paths: &PathSnapshot,
        pins: &[PinRecord],
        focus: Option<&str>,
        current_location: Option<GpsPoint>,
    ) -> Self {
        let polylines = paths
            .iter()
            .filter(|r| match focus {
                Some(id) => r.id == id,
                None => r.visible,
            })
            .filter(|r| !r.points.is_empty())
            .map(|r| Polyline {
                path_id: r.id.clone(),
                points: r.points.clone(),
            })
            .collect();

        let markers = pins
            .iter()
            .map(|pin| PinMarker {
                pin_id: pin.id.clone(),
                latitude: pin.latitude,
                longitude: pin.longitude,
                label: pin_label(pin),
                details_pending: pin.details_pending,
            })
            .collect();

        Self {
            polylines,
            markers,
            focused_path_id: focus.map(str::to_string),
            current_location,
        }
    }
}

/// Pin name, or the drop time when the pin has none.
pub fn pin_label(pin: &PinRecord) -> String {
    if pin.name.is_empty() {
        format!("Pin @ {}", pin.timestamp.format("%H:%M:%S"))
    } else {
        pin.name.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::PersistenceGateway;
    use crate::store::MemoryStore;
    use crate::PathStore;
    use chrono::{DateTime, TimeZone, Utc};

    fn two_paths() -> (PathSnapshot, String, String) {
        let gateway = PersistenceGateway::new(Box::new(MemoryStore::new())).unwrap();
        let mut store = PathStore::new(gateway);
        let now = DateTime::<Utc>::UNIX_EPOCH;

        let (a, _) = store.open(now).unwrap();
        store.append(&a, GpsPoint::new(40.0, -105.0)).unwrap();
        store.append(&a, GpsPoint::new(40.002, -105.001)).unwrap();
        store.close(&a, now).unwrap();

        let (b, _) = store.open(now).unwrap();
        store.append(&b, GpsPoint::new(41.0, -106.0)).unwrap();
        store.close(&b, now).unwrap();
        store.toggle_visibility(&b).unwrap();

        (store.list(), a, b)
    }

    fn pin(name: &str) -> PinRecord {
        PinRecord {
            id: "pin-1".to_string(),
            latitude: 40.0,
            longitude: -105.0,
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 14, 3, 9).unwrap(),
            name: name.to_string(),
            category: String::new(),
            notes: String::new(),
            photos: Vec::new(),
            details_pending: name.is_empty(),
        }
    }

    #[test]
    fn test_hidden_paths_are_not_drawn() {
        let (paths, a, _) = two_paths();
        let view = MapView::build(&paths, &[], None, None);
        assert_eq!(view.polylines.len(), 1);
        assert_eq!(view.polylines[0].path_id, a);
    }

    #[test]
    fn test_focus_shows_only_focused_path() {
        let (paths, _, b) = two_paths();
        let view = MapView::build(&paths, &[], Some(&b), None);
        assert_eq!(view.polylines.len(), 1);
        assert_eq!(view.polylines[0].path_id, b);
        assert_eq!(view.focused_path_id.as_deref(), Some(b.as_str()));
    }

    #[test]
    fn test_fit_request_needs_two_points() {
        let (paths, a, b) = two_paths();
        let request = FitBoundsRequest::for_path(paths.get(&a).unwrap(), 50.0).unwrap();
        assert_eq!(request.bounds.min_lat, 40.0);
        assert_eq!(request.bounds.max_lat, 40.002);
        assert_eq!(request.edge_padding, 50.0);
        assert!(request.animated);

        assert!(FitBoundsRequest::for_path(paths.get(&b).unwrap(), 50.0).is_none());
    }

    #[test]
    fn test_pin_labels() {
        assert_eq!(pin_label(&pin("")), "Pin @ 14:03:09");
        assert_eq!(pin_label(&pin("Spring")), "Spring");

        let view = MapView::build(&PathSnapshot::default(), &[pin("")], None, None);
        assert_eq!(view.markers.len(), 1);
        assert!(view.markers[0].details_pending);
    }
}
