//! Gaze signal conditioning: screen mapping, two-regime smoothing, the
//! dwell-counting fixation gate and the sample sources feeding them.

pub mod gate;
pub mod smoother;
pub mod source;
pub mod stream;

pub use gate::{DwellPolicy, FixationGate, GateConfig};
pub use smoother::{Regime, Smoother, SmootherConfig};
pub use source::{GazeSource, JsonLineSource, SimulatedGaze, SimulatedGazeConfig, SourceError, spawn_source};
pub use stream::{GazeStream, ScreenMapping};
