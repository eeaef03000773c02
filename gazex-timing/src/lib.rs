pub mod clock;
pub mod scheduler;
pub mod sleep;

pub use clock::{Clock, SystemClock, TestClock, elapsed_ms};
pub use scheduler::{Fired, Scheduler, TimerId};
pub use sleep::precise_sleep;
