pub mod gaze;
pub mod notification;
pub mod presentation;
pub mod state;

pub use gaze::{GazeSample, SmoothedPoint, TrackedRegion};
pub use notification::Notification;
pub use presentation::Presentation;
pub use state::TaskState;
