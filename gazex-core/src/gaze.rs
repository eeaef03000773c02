use serde::{Deserialize, Serialize};

/// One raw sample as delivered by a gaze source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GazeSample {
    /// Device clock, milliseconds.
    pub timestamp: u64,
    pub x: f32,
    pub y: f32,
    pub pupil_diameter: f32,
}

impl GazeSample {
    pub fn new(timestamp: u64, x: f32, y: f32, pupil_diameter: f32) -> Self {
        Self {
            timestamp,
            x,
            y,
            pupil_diameter,
        }
    }
}

/// Filtered gaze location in screen space. Replaces the raw sample for
/// every consumer downstream of the smoother.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SmoothedPoint {
    pub timestamp: u64,
    pub x: f32,
    pub y: f32,
}

impl SmoothedPoint {
    pub fn new(timestamp: u64, x: f32, y: f32) -> Self {
        Self { timestamp, x, y }
    }

    pub fn distance_to(&self, other: &SmoothedPoint) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Screen rectangle watched by the fixation gate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackedRegion {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

impl TrackedRegion {
    pub fn new(x_min: f32, y_min: f32, x_max: f32, y_max: f32) -> Self {
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    /// Builds a region from its lower-left corner and size.
    pub fn from_origin_size(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self::new(x, y, x + width, y + height)
    }

    /// Strict containment: points on the border are outside.
    pub fn contains(&self, point: &SmoothedPoint) -> bool {
        self.x_min < point.x && point.x < self.x_max && self.y_min < point.y && point.y < self.y_max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn border_points_are_outside() {
        let region = TrackedRegion::new(0.0, 0.0, 10.0, 10.0);
        assert!(region.contains(&SmoothedPoint::new(0, 5.0, 5.0)));
        assert!(!region.contains(&SmoothedPoint::new(0, 0.0, 5.0)));
        assert!(!region.contains(&SmoothedPoint::new(0, 5.0, 10.0)));
        assert!(!region.contains(&SmoothedPoint::new(0, 11.0, 5.0)));
    }

    #[test]
    fn origin_size_matches_corners() {
        let region = TrackedRegion::from_origin_size(-50.0, -25.0, 100.0, 50.0);
        assert_eq!(region, TrackedRegion::new(-50.0, -25.0, 50.0, 25.0));
    }

    #[test]
    fn distance_is_euclidean() {
        let a = SmoothedPoint::new(0, 0.0, 0.0);
        let b = SmoothedPoint::new(1, 3.0, 4.0);
        assert!((a.distance_to(&b) - 5.0).abs() < f32::EPSILON);
    }
}
