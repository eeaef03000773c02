use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use gazex_timing::{Clock, elapsed_ms};
use tracing::{debug, info, warn};

use crate::codec::{
    self, ALIGN, BEGIN, DISCONNECT, END, Label, Marker, VERSION_INFO, VERSION_QUERY,
    VERSION_REFUSED,
};
use crate::error::{LinkError, VersionError};
use crate::status::{LinkStatus, StatusSink};

/// Byte stream the link runs over.
pub trait Transport: Read + Write {
    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Transport for TcpStream {
    fn close(&mut self) -> io::Result<()> {
        self.shutdown(Shutdown::Both)
    }
}

#[derive(Debug, Clone)]
pub struct LinkConfig {
    pub max_sync_iterations: u32,
    pub sync_limit_ms: f64,
    pub connect_timeout: Duration,
    /// Wait before `E`, so the last markers are not cut off.
    pub end_settle: Duration,
    /// Wait before `X`.
    pub disconnect_settle: Duration,
    /// Wait between `X` and closing the socket.
    pub close_settle: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            max_sync_iterations: 5,
            sync_limit_ms: 2.5,
            connect_timeout: Duration::from_secs(5),
            end_settle: Duration::from_millis(500),
            disconnect_settle: Duration::from_millis(1000),
            close_settle: Duration::from_millis(500),
        }
    }
}

impl LinkConfig {
    /// Same limits, no settle waits.
    pub fn without_settle(mut self) -> Self {
        self.end_settle = Duration::ZERO;
        self.disconnect_settle = Duration::ZERO;
        self.close_settle = Duration::ZERO;
        self
    }
}

/// Shared time base established by [`MarkerLink::synchronize`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncState {
    pub epoch: Instant,
    pub last_round_trip_error_ms: f64,
}

/// Read access to the sync state from other threads.
#[derive(Clone)]
pub struct SyncHandle {
    state: Arc<RwLock<Option<SyncState>>>,
    clock: Arc<dyn Clock>,
}

impl SyncHandle {
    fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(RwLock::new(None)),
            clock,
        }
    }

    pub fn state(&self) -> Option<SyncState> {
        *self.state.read().unwrap()
    }

    /// Milliseconds since the sync epoch, `None` before synchronization.
    pub fn timestamp_ms(&self) -> Option<f64> {
        self.state()
            .map(|s| elapsed_ms(self.clock.as_ref(), s.epoch))
    }

    fn set(&self, state: Option<SyncState>) {
        *self.state.write().unwrap() = state;
    }
}

impl std::fmt::Debug for SyncHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncHandle")
            .field("state", &self.state())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncReport {
    pub iterations: u32,
    pub round_trip_error_ms: f64,
    pub low_accuracy: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent { relative_ms: i32 },
    /// No recording session is active.
    Dropped,
}

pub struct MarkerLink<S: Transport> {
    stream: Option<S>,
    config: LinkConfig,
    clock: Arc<dyn Clock>,
    sync: SyncHandle,
    ready: bool,
    recording: bool,
    status: StatusSink,
}

impl MarkerLink<TcpStream> {
    /// Opens the TCP session. Failures are reported once and not retried.
    pub fn connect(
        host: &str,
        port: u16,
        config: LinkConfig,
        clock: Arc<dyn Clock>,
        status: StatusSink,
    ) -> Result<Self, LinkError> {
        let addr = format!("{host}:{port}");
        status.publish(LinkStatus::Connecting { addr: addr.clone() });
        info!(%addr, "NS: connecting");

        match open_tcp(host, port, config.connect_timeout) {
            Ok(stream) => {
                info!(%addr, "NS: socket connected");
                status.publish(LinkStatus::Connected);
                Ok(Self::from_stream(stream, config, clock).with_status(status))
            }
            Err(source) => {
                warn!(%addr, error = %source, "NS: failed to connect");
                status.publish(LinkStatus::FailedToConnect(source.to_string()));
                Err(LinkError::Connection { addr, source })
            }
        }
    }
}

fn open_tcp(host: &str, port: u16, timeout: Duration) -> io::Result<TcpStream> {
    let mut last_err = None;
    for addr in (host, port).to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses")
    }))
}

impl<S: Transport> MarkerLink<S> {
    pub fn from_stream(stream: S, config: LinkConfig, clock: Arc<dyn Clock>) -> Self {
        let sync = SyncHandle::new(clock.clone());
        Self {
            stream: Some(stream),
            config,
            clock,
            sync,
            ready: false,
            recording: false,
            status: StatusSink::none(),
        }
    }

    pub fn with_status(mut self, status: StatusSink) -> Self {
        self.status = status;
        self
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn sync_handle(&self) -> SyncHandle {
        self.sync.clone()
    }

    pub fn timestamp_ms(&self) -> Option<f64> {
        self.sync.timestamp_ms()
    }

    /// Version handshake followed by clock synchronization.
    pub fn open(&mut self) -> Result<SyncReport, LinkError> {
        self.check_protocol_version()?;
        self.synchronize()
    }

    /// Sends the version query. A refused or unknown version closes the
    /// connection; a new `connect` is needed afterwards.
    pub fn check_protocol_version(&mut self) -> Result<(), LinkError> {
        let result = self.query_version();
        if let Err(err) = &result {
            warn!(error = %err, "NS: version check failed");
            match err {
                LinkError::ProtocolVersion(VersionError::Unsupported(_)) => {
                    self.status.publish(LinkStatus::UnsupportedVersion(err.to_string()))
                }
                _ => self
                    .status
                    .publish(LinkStatus::VersionCheckFailed(err.to_string())),
            }
            self.abort();
        }
        result
    }

    fn query_version(&mut self) -> Result<(), LinkError> {
        match self.exchange(VERSION_QUERY)? {
            VERSION_REFUSED => Err(VersionError::Refused.into()),
            VERSION_INFO => {
                let version = self.read_byte()?;
                if codec::is_supported_version(version) {
                    debug!(version, "NS: protocol version accepted");
                    Ok(())
                } else {
                    Err(VersionError::Unsupported(version).into())
                }
            }
            other => Err(VersionError::UnexpectedReply(other).into()),
        }
    }

    /// Establishes the shared time base.
    ///
    /// Each round sends `A`, then `T` carrying the elapsed milliseconds
    /// since the new epoch, and measures how long the `T` acknowledgement
    /// took. Stops as soon as that round trip is within `sync_limit_ms`,
    /// or after `max_sync_iterations` rounds with a low-accuracy status.
    /// The time base is only published once every round succeeded; a
    /// failed exchange drops the connection.
    pub fn synchronize(&mut self) -> Result<SyncReport, LinkError> {
        if self.stream.is_none() {
            return Err(LinkError::NotConnected);
        }
        self.status.publish(LinkStatus::Synchronizing);

        self.ready = false;
        self.sync.set(None);
        let epoch = self.clock.now();

        let (iterations, error_ms) = match self.sync_rounds(epoch) {
            Ok(rounds) => rounds,
            Err(err) => {
                warn!(error = %err, "NS SYNC: synchronization failed");
                self.status.publish(LinkStatus::SyncFailed(err.to_string()));
                self.abort();
                return Err(err);
            }
        };

        let low_accuracy = error_ms > self.config.sync_limit_ms;
        if low_accuracy {
            warn!(
                limit_ms = self.config.sync_limit_ms,
                error_ms, iterations, "NS SYNC: synchronization did not reach the limit"
            );
        } else {
            info!(error_ms, iterations, "NS SYNC: synchronized");
        }

        self.sync.set(Some(SyncState {
            epoch,
            last_round_trip_error_ms: error_ms,
        }));
        self.ready = true;
        self.status.publish(LinkStatus::Ready {
            low_accuracy,
            round_trip_error_ms: error_ms,
        });

        Ok(SyncReport {
            iterations,
            round_trip_error_ms: error_ms,
            low_accuracy,
        })
    }

    fn sync_rounds(&mut self, epoch: Instant) -> Result<(u32, f64), LinkError> {
        let max_iterations = self.config.max_sync_iterations.max(1);
        let mut error_ms = f64::INFINITY;
        let mut iterations = 0;
        while error_ms > self.config.sync_limit_ms && iterations < max_iterations {
            iterations += 1;
            self.exchange(&[ALIGN])?;

            let sent = elapsed_ms(self.clock.as_ref(), epoch);
            self.exchange(&codec::timestamp_frame(sent as i32))?;
            let acked = elapsed_ms(self.clock.as_ref(), epoch);

            error_ms = acked - sent;
            debug!(iterations, error_ms, "NS SYNC: round");
        }
        Ok((iterations, error_ms))
    }

    pub fn begin(&mut self) -> Result<(), LinkError> {
        if self.recording {
            return Ok(());
        }
        if self.stream.is_none() {
            return Err(LinkError::NotConnected);
        }
        if !self.ready {
            return Err(LinkError::NotSynchronized);
        }
        self.exchange(&[BEGIN])?;
        self.recording = true;
        info!("NS: recording started");
        Ok(())
    }

    pub fn end(&mut self) -> Result<(), LinkError> {
        if !self.recording {
            return Ok(());
        }
        self.clock.sleep(self.config.end_settle);
        self.recording = false;
        self.exchange(&[END])?;
        info!("NS: recording ended");
        Ok(())
    }

    /// Ends recording, says goodbye and closes. Calling it again, or on a
    /// link that never connected, does nothing.
    pub fn disconnect(&mut self) -> Result<(), LinkError> {
        if self.stream.is_none() {
            return Ok(());
        }

        let ended = self.end();
        self.clock.sleep(self.config.disconnect_settle);
        let said_bye = self.exchange(&[DISCONNECT]).map(|_| ());
        self.clock.sleep(self.config.close_settle);

        self.abort();
        info!("NS: disconnected");
        ended.and(said_bye)
    }

    /// Stamps `label` with the current relative time and sends it.
    pub fn send_marker(&mut self, label: &str) -> Result<Delivery, LinkError> {
        if !self.recording {
            debug!(label, "NS: not recording, marker dropped");
            return Ok(Delivery::Dropped);
        }
        let relative_ms = self
            .sync
            .timestamp_ms()
            .ok_or(LinkError::NotSynchronized)? as i32;
        self.send_marker_at(label, relative_ms, 1)
    }

    /// Sends a marker with an explicit timestamp. Blocks until the
    /// recorder acknowledges; the timestamp is fixed before the write.
    pub fn send_marker_at(
        &mut self,
        label: &str,
        relative_ms: i32,
        duration_ms: u32,
    ) -> Result<Delivery, LinkError> {
        if !self.recording {
            debug!(label, "NS: not recording, marker dropped");
            return Ok(Delivery::Dropped);
        }
        let marker = Marker::new(Label::lossy(label), relative_ms, duration_ms);
        self.exchange(&marker.to_bytes())?;
        Ok(Delivery::Sent { relative_ms })
    }

    /// Drops the connection without the goodbye exchange.
    fn abort(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.close() {
                debug!(error = %e, "NS: close failed");
            }
        }
        self.ready = false;
        self.recording = false;
        self.sync.set(None);
        self.status.publish(LinkStatus::NotConnected);
    }

    fn exchange(&mut self, data: &[u8]) -> Result<u8, LinkError> {
        let stream = self.stream.as_mut().ok_or(LinkError::NotConnected)?;
        stream.write_all(data)?;
        stream.flush()?;
        debug!(sent = %hex(data), "NS: waiting for reply");
        self.read_byte()
    }

    fn read_byte(&mut self) -> Result<u8, LinkError> {
        let stream = self.stream.as_mut().ok_or(LinkError::NotConnected)?;
        let mut buf = [0u8; 1];
        stream.read_exact(&mut buf)?;
        Ok(buf[0])
    }
}

impl<S: Transport> Drop for MarkerLink<S> {
    fn drop(&mut self) {
        if let Err(e) = self.disconnect() {
            debug!(error = %e, "NS: disconnect on drop failed");
        }
    }
}

fn hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}
