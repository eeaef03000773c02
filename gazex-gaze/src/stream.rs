use gazex_core::{GazeSample, SmoothedPoint};
use serde::{Deserialize, Serialize};

use crate::smoother::{Smoother, SmootherConfig};

/// Maps tracker coordinates into the presentation's screen space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ScreenMapping {
    /// Samples are already in screen space.
    #[default]
    Raw,
    /// Top-left-origin tracker pixels to a centered, y-up space, corrected
    /// for the window's offset on the physical display.
    Centered {
        width: f32,
        height: f32,
        offset_x: f32,
        offset_y: f32,
    },
}

impl ScreenMapping {
    pub fn map(&self, sample: GazeSample) -> GazeSample {
        match *self {
            Self::Raw => sample,
            Self::Centered {
                width,
                height,
                offset_x,
                offset_y,
            } => GazeSample {
                x: sample.x - width / 2.0 - offset_x,
                y: height / 2.0 - (sample.y - offset_y),
                ..sample
            },
        }
    }
}

/// Raw samples in, smoothed screen-space points out.
#[derive(Debug, Clone, Default)]
pub struct GazeStream {
    mapping: ScreenMapping,
    smoother: Smoother,
    last: Option<SmoothedPoint>,
    samples: u64,
}

impl GazeStream {
    pub fn new(mapping: ScreenMapping, smoothing: SmootherConfig) -> Self {
        Self {
            mapping,
            smoother: Smoother::new(smoothing),
            last: None,
            samples: 0,
        }
    }

    pub fn feed(&mut self, raw: GazeSample) -> SmoothedPoint {
        let point = self.smoother.feed(self.mapping.map(raw));
        self.last = Some(point);
        self.samples += 1;
        point
    }

    /// Latest smoothed location, if any sample arrived yet.
    pub fn location(&self) -> Option<SmoothedPoint> {
        self.last
    }

    pub fn samples_seen(&self) -> u64 {
        self.samples
    }

    pub fn reset(&mut self) {
        self.smoother.reset();
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centered_mapping_flips_y_and_removes_offset() {
        let mapping = ScreenMapping::Centered {
            width: 1920.0,
            height: 1080.0,
            offset_x: 100.0,
            offset_y: 17.0,
        };
        let mapped = mapping.map(GazeSample::new(5, 1060.0, 557.0, 6.0));
        assert_eq!(mapped, GazeSample::new(5, 0.0, 0.0, 6.0));

        let top_left = mapping.map(GazeSample::new(5, 100.0, 17.0, 6.0));
        assert_eq!((top_left.x, top_left.y), (-960.0, 540.0));
    }

    #[test]
    fn stream_smooths_mapped_points() {
        let mut stream = GazeStream::new(
            ScreenMapping::Centered {
                width: 200.0,
                height: 100.0,
                offset_x: 0.0,
                offset_y: 0.0,
            },
            SmootherConfig::default(),
        );
        assert_eq!(stream.location(), None);
        let point = stream.feed(GazeSample::new(0, 100.0, 50.0, 6.0));
        assert_eq!(point, SmoothedPoint::new(0, 0.0, 0.0));
        assert_eq!(stream.location(), Some(point));
        assert_eq!(stream.samples_seen(), 1);
    }
}
