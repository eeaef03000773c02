use crossbeam_channel::Sender;
use tracing::debug;

/// Link state changes published for the operator display.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkStatus {
    NotConnected,
    Connecting { addr: String },
    Connected,
    FailedToConnect(String),
    VersionCheckFailed(String),
    UnsupportedVersion(String),
    Synchronizing,
    SyncFailed(String),
    Ready {
        low_accuracy: bool,
        round_trip_error_ms: f64,
    },
}

impl LinkStatus {
    pub fn message(&self) -> String {
        match self {
            LinkStatus::NotConnected => "not connected".into(),
            LinkStatus::Connecting { addr } => format!("connecting to {addr}..."),
            LinkStatus::Connected => "connected, checking version...".into(),
            LinkStatus::FailedToConnect(reason) => format!("failed to connect: {reason}"),
            LinkStatus::VersionCheckFailed(reason) | LinkStatus::UnsupportedVersion(reason) => {
                reason.clone()
            }
            LinkStatus::Synchronizing => "sync'ing".into(),
            LinkStatus::SyncFailed(reason) => format!("sync failed: {reason}"),
            LinkStatus::Ready {
                low_accuracy: false,
                ..
            } => "ready".into(),
            LinkStatus::Ready {
                low_accuracy: true, ..
            } => "ready (low sync accuracy)".into(),
        }
    }
}

/// Optional status channel. Publishing never fails; a closed receiver
/// only means nobody is watching any more.
#[derive(Debug, Clone, Default)]
pub struct StatusSink(Option<Sender<LinkStatus>>);

impl StatusSink {
    pub fn new(tx: Sender<LinkStatus>) -> Self {
        Self(Some(tx))
    }

    pub fn none() -> Self {
        Self(None)
    }

    pub fn publish(&self, status: LinkStatus) {
        debug!(status = %status.message(), "link status");
        if let Some(tx) = &self.0 {
            let _ = tx.send(status);
        }
    }
}
