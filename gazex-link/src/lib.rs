//! Event-marker link to a clock-synchronized physiological recorder.
//!
//! The recorder speaks a tiny byte protocol over TCP: single-letter
//! commands, each acknowledged with one byte, plus a fixed-layout event
//! frame. All multi-byte integers are big-endian.

pub mod codec;
pub mod error;
pub mod link;
pub mod sink;
pub mod status;

pub use codec::{Label, Marker};
pub use error::{LinkError, VersionError};
pub use link::{Delivery, LinkConfig, MarkerLink, SyncHandle, SyncReport, SyncState, Transport};
pub use sink::{MarkerSink, MemorySink, OfflineSink};
pub use status::{LinkStatus, StatusSink};
