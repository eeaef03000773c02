use tracing::info;

use crate::error::LinkError;
use crate::link::{Delivery, MarkerLink, Transport};

/// Where the trial state machines send their markers.
pub trait MarkerSink {
    /// Sends `label` stamped with the current relative time.
    fn mark(&mut self, label: &str) -> Result<Delivery, LinkError>;

    fn begin(&mut self) -> Result<(), LinkError> {
        Ok(())
    }

    fn end(&mut self) -> Result<(), LinkError> {
        Ok(())
    }

    /// Ends recording and releases the recorder.
    fn disconnect(&mut self) -> Result<(), LinkError> {
        self.end()
    }

    fn timestamp_ms(&self) -> Option<f64> {
        None
    }
}

impl<S: Transport> MarkerSink for MarkerLink<S> {
    fn mark(&mut self, label: &str) -> Result<Delivery, LinkError> {
        self.send_marker(label)
    }

    fn begin(&mut self) -> Result<(), LinkError> {
        MarkerLink::begin(self)
    }

    fn end(&mut self) -> Result<(), LinkError> {
        MarkerLink::end(self)
    }

    fn disconnect(&mut self) -> Result<(), LinkError> {
        MarkerLink::disconnect(self)
    }

    fn timestamp_ms(&self) -> Option<f64> {
        MarkerLink::timestamp_ms(self)
    }
}

/// Used when no recorder is attached: markers are only logged.
#[derive(Debug, Default)]
pub struct OfflineSink;

impl MarkerSink for OfflineSink {
    fn mark(&mut self, label: &str) -> Result<Delivery, LinkError> {
        info!(label, "marker (offline)");
        Ok(Delivery::Dropped)
    }
}

/// Keeps every label in order; for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub labels: Vec<String>,
    pub recording: bool,
}

impl MemorySink {
    pub fn recording() -> Self {
        Self {
            labels: Vec::new(),
            recording: true,
        }
    }
}

impl MarkerSink for MemorySink {
    fn mark(&mut self, label: &str) -> Result<Delivery, LinkError> {
        if !self.recording {
            return Ok(Delivery::Dropped);
        }
        self.labels.push(label.to_string());
        Ok(Delivery::Sent {
            relative_ms: self.labels.len() as i32,
        })
    }

    fn begin(&mut self) -> Result<(), LinkError> {
        self.recording = true;
        Ok(())
    }

    fn end(&mut self) -> Result<(), LinkError> {
        self.recording = false;
        Ok(())
    }
}
