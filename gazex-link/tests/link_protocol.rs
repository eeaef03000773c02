use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::thread;

use gazex_link::{
    Delivery, LinkConfig, LinkError, LinkStatus, MarkerLink, StatusSink, Transport, VersionError,
};
use gazex_timing::{Clock, SystemClock, TestClock};

const ACK: u8 = b'Z';

/// In-memory recorder: answers every command from a reply script (or with
/// a plain ack once the script is empty) and advances the test clock by a
/// per-read latency to simulate the network round trip.
struct ScriptedRecorder {
    written: Arc<Mutex<Vec<u8>>>,
    replies: VecDeque<u8>,
    latencies_ms: VecDeque<f64>,
    default_latency_ms: f64,
    clock: TestClock,
    broken: bool,
    writes_before_break: Option<usize>,
}

impl ScriptedRecorder {
    fn new(clock: &TestClock) -> Self {
        Self {
            written: Arc::new(Mutex::new(Vec::new())),
            replies: VecDeque::new(),
            latencies_ms: VecDeque::new(),
            default_latency_ms: 0.0,
            clock: clock.clone(),
            broken: false,
            writes_before_break: None,
        }
    }

    fn replies(mut self, bytes: &[u8]) -> Self {
        self.replies.extend(bytes.iter().copied());
        self
    }

    fn latencies(mut self, ms: &[f64]) -> Self {
        self.latencies_ms.extend(ms.iter().copied());
        self
    }

    fn latency(mut self, ms: f64) -> Self {
        self.default_latency_ms = ms;
        self
    }

    /// Accepts `writes` commands, then behaves like a dropped socket.
    fn breaks_after(mut self, writes: usize) -> Self {
        self.writes_before_break = Some(writes);
        self
    }

    fn log(&self) -> Arc<Mutex<Vec<u8>>> {
        self.written.clone()
    }
}

impl Read for ScriptedRecorder {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let latency = self
            .latencies_ms
            .pop_front()
            .unwrap_or(self.default_latency_ms);
        self.clock.advance_ms(latency);
        buf[0] = self.replies.pop_front().unwrap_or(ACK);
        Ok(1)
    }
}

impl Write for ScriptedRecorder {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.writes_before_break {
            Some(0) => self.broken = true,
            Some(left) => *left -= 1,
            None => {}
        }
        if self.broken {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "recorder went away"));
        }
        self.written.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Transport for ScriptedRecorder {}

fn link_over(recorder: ScriptedRecorder, clock: &TestClock) -> MarkerLink<ScriptedRecorder> {
    MarkerLink::from_stream(
        recorder,
        LinkConfig::default().without_settle(),
        Arc::new(clock.clone()),
    )
}

/// Splits the written bytes into commands: `A` rounds and `T` frames.
fn sync_commands(bytes: &[u8]) -> (usize, Vec<i32>) {
    let mut aligns = 0;
    let mut stamps = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'A' => {
                aligns += 1;
                i += 1;
            }
            b'T' => {
                let v = i32::from_be_bytes([bytes[i + 1], bytes[i + 2], bytes[i + 3], bytes[i + 4]]);
                stamps.push(v);
                i += 5;
            }
            other => panic!("unexpected command byte {other:#04x}"),
        }
    }
    (aligns, stamps)
}

#[test]
fn version_check_accepts_binary_and_ascii_one() {
    for version in [0x01, b'1'] {
        let clock = TestClock::new();
        let recorder = ScriptedRecorder::new(&clock).replies(&[b'I', version]);
        let log = recorder.log();
        let mut link = link_over(recorder, &clock);

        link.check_protocol_version().unwrap();

        assert!(link.is_connected());
        assert_eq!(log.lock().unwrap().as_slice(), b"QMAC-");
    }
}

#[test]
fn refused_version_aborts_the_session() {
    let clock = TestClock::new();
    let (tx, rx) = crossbeam_channel::unbounded();
    let recorder = ScriptedRecorder::new(&clock).replies(b"F");
    let mut link = link_over(recorder, &clock).with_status(StatusSink::new(tx));

    let err = link.check_protocol_version().unwrap_err();

    assert!(matches!(err, LinkError::ProtocolVersion(VersionError::Refused)));
    assert!(!link.is_connected());
    let statuses: Vec<_> = rx.try_iter().collect();
    assert!(matches!(statuses[0], LinkStatus::VersionCheckFailed(_)));
    assert_eq!(statuses.last(), Some(&LinkStatus::NotConnected));
}

#[test]
fn unknown_version_is_unsupported() {
    let clock = TestClock::new();
    let recorder = ScriptedRecorder::new(&clock).replies(&[b'I', b'2']);
    let mut link = link_over(recorder, &clock);

    let err = link.check_protocol_version().unwrap_err();

    assert!(matches!(
        err,
        LinkError::ProtocolVersion(VersionError::Unsupported(b'2'))
    ));
    assert!(!link.is_connected());
}

#[test]
fn unexpected_version_reply_is_a_protocol_error() {
    let clock = TestClock::new();
    let recorder = ScriptedRecorder::new(&clock).replies(b"?");
    let mut link = link_over(recorder, &clock);

    let err = link.check_protocol_version().unwrap_err();

    assert!(matches!(
        err,
        LinkError::ProtocolVersion(VersionError::UnexpectedReply(b'?'))
    ));
}

#[test]
fn sync_stops_after_first_accurate_round() {
    let clock = TestClock::new();
    let recorder = ScriptedRecorder::new(&clock).latency(1.0);
    let log = recorder.log();
    let mut link = link_over(recorder, &clock);

    let report = link.synchronize().unwrap();

    assert_eq!(report.iterations, 1);
    assert!(!report.low_accuracy);
    assert!((report.round_trip_error_ms - 1.0).abs() < 1e-6);
    // The align ack took 1 ms, so the timestamp frame carries 1.
    assert_eq!(log.lock().unwrap().as_slice(), &[b'A', b'T', 0, 0, 0, 1]);
    assert!(link.is_ready());
}

#[test]
fn sync_retries_until_the_round_trip_is_short_enough() {
    let clock = TestClock::new();
    let recorder = ScriptedRecorder::new(&clock).latencies(&[1.0, 10.0, 1.0, 2.0]);
    let log = recorder.log();
    let mut link = link_over(recorder, &clock);

    let report = link.synchronize().unwrap();

    assert_eq!(report.iterations, 2);
    assert!(!report.low_accuracy);
    let (aligns, stamps) = sync_commands(&log.lock().unwrap());
    assert_eq!(aligns, 2);
    assert_eq!(stamps, vec![1, 12]);
}

#[test]
fn sync_gives_up_at_the_iteration_cap_and_reports_low_accuracy_once() {
    let clock = TestClock::new();
    let (tx, rx) = crossbeam_channel::unbounded();
    let recorder = ScriptedRecorder::new(&clock).latency(10.0);
    let log = recorder.log();
    let mut link = link_over(recorder, &clock).with_status(StatusSink::new(tx));

    let report = link.synchronize().unwrap();

    assert_eq!(report.iterations, 5);
    assert!(report.low_accuracy);
    let (aligns, _) = sync_commands(&log.lock().unwrap());
    assert_eq!(aligns, 5);

    let low_accuracy_reports = rx
        .try_iter()
        .filter(|s| matches!(s, LinkStatus::Ready { low_accuracy: true, .. }))
        .count();
    assert_eq!(low_accuracy_reports, 1);
    // Low accuracy still leaves the link usable.
    assert!(link.is_ready());
}

#[test]
fn markers_are_dropped_silently_when_not_recording() {
    let clock = TestClock::new();
    let recorder = ScriptedRecorder::new(&clock);
    let log = recorder.log();
    let mut link = link_over(recorder, &clock);
    link.synchronize().unwrap();
    log.lock().unwrap().clear();

    assert_eq!(link.send_marker("AtGr").unwrap(), Delivery::Dropped);
    assert!(log.lock().unwrap().is_empty());
}

#[test]
fn recording_requires_synchronization() {
    let clock = TestClock::new();
    let mut link = link_over(ScriptedRecorder::new(&clock), &clock);
    assert!(matches!(link.begin(), Err(LinkError::NotSynchronized)));
}

#[test]
fn explicit_marker_is_framed_byte_exact() {
    let clock = TestClock::new();
    let recorder = ScriptedRecorder::new(&clock);
    let log = recorder.log();
    let mut link = link_over(recorder, &clock);
    link.synchronize().unwrap();
    link.begin().unwrap();
    log.lock().unwrap().clear();

    let delivery = link.send_marker_at("AtGr", 1234, 1).unwrap();

    assert_eq!(delivery, Delivery::Sent { relative_ms: 1234 });
    assert_eq!(
        log.lock().unwrap().as_slice(),
        &[
            0x44, 0x00, 0x0F, 0x00, 0x00, 0x04, 0xD2, 0x00, 0x00, 0x00, 0x01, 0x41, 0x74, 0x47,
            0x72, 0x00, 0x00, 0x00
        ]
    );
}

#[test]
fn marker_timestamp_is_taken_before_the_blocking_send() {
    let clock = TestClock::new();
    // Sync rounds and `B` ack instantly, the marker ack takes 50 ms.
    let recorder = ScriptedRecorder::new(&clock).latencies(&[0.0, 0.0, 0.0, 50.0]);
    let log = recorder.log();
    let mut link = link_over(recorder, &clock);
    link.synchronize().unwrap();
    link.begin().unwrap();
    log.lock().unwrap().clear();
    clock.advance_ms(1234.0);

    let delivery = link.send_marker("AtGr").unwrap();

    assert_eq!(delivery, Delivery::Sent { relative_ms: 1234 });
    assert_eq!(&log.lock().unwrap()[3..7], &1234i32.to_be_bytes());
    assert_eq!(link.timestamp_ms(), Some(1284.0));
}

#[test]
fn long_labels_are_truncated_on_the_wire() {
    let clock = TestClock::new();
    let recorder = ScriptedRecorder::new(&clock);
    let log = recorder.log();
    let mut link = link_over(recorder, &clock);
    link.synchronize().unwrap();
    link.begin().unwrap();
    log.lock().unwrap().clear();

    link.send_marker("OrPLs").unwrap();

    assert_eq!(&log.lock().unwrap()[11..15], b"OrPL");
}

#[test]
fn disconnect_ends_recording_and_is_idempotent() {
    let clock = TestClock::new();
    let recorder = ScriptedRecorder::new(&clock);
    let log = recorder.log();
    let mut link = link_over(recorder, &clock);
    link.synchronize().unwrap();
    link.begin().unwrap();
    log.lock().unwrap().clear();

    link.disconnect().unwrap();
    link.disconnect().unwrap();

    assert!(!link.is_connected());
    assert!(!link.is_recording());
    assert_eq!(link.timestamp_ms(), None);
    assert_eq!(log.lock().unwrap().as_slice(), b"EX");

    drop(link);
    assert_eq!(log.lock().unwrap().as_slice(), b"EX");
}

#[test]
fn settle_waits_use_the_link_clock() {
    let clock = TestClock::new();
    let mut link = MarkerLink::from_stream(
        ScriptedRecorder::new(&clock),
        LinkConfig::default(),
        Arc::new(clock.clone()),
    );
    link.synchronize().unwrap();
    link.begin().unwrap();
    let before = Clock::now(&clock);

    link.disconnect().unwrap();

    // 500 ms before E, 1000 ms before X, 500 ms before closing.
    assert_eq!(Clock::now(&clock) - before, std::time::Duration::from_millis(2000));
}

#[test]
fn io_failure_mid_session_surfaces_as_link_error() {
    let clock = TestClock::new();
    let mut recorder = ScriptedRecorder::new(&clock);
    recorder.broken = true;
    let mut link = link_over(recorder, &clock);

    assert!(matches!(link.synchronize(), Err(LinkError::Io(_))));
}

#[test]
fn failed_sync_leaves_no_time_base_and_reports_the_failure() {
    let clock = TestClock::new();
    let (tx, rx) = crossbeam_channel::unbounded();
    // Two full rounds at 10 ms, then the socket drops on the third `A`.
    let recorder = ScriptedRecorder::new(&clock).latency(10.0).breaks_after(4);
    let mut link = link_over(recorder, &clock).with_status(StatusSink::new(tx));

    assert!(matches!(link.synchronize(), Err(LinkError::Io(_))));

    assert_eq!(link.timestamp_ms(), None);
    assert_eq!(link.sync_handle().state(), None);
    assert!(!link.is_ready());
    assert!(!link.is_connected());
    let statuses: Vec<_> = rx.try_iter().collect();
    assert_eq!(statuses[0], LinkStatus::Synchronizing);
    assert!(matches!(statuses[1], LinkStatus::SyncFailed(_)));
    assert_eq!(statuses.last(), Some(&LinkStatus::NotConnected));
    assert!(matches!(link.begin(), Err(LinkError::NotConnected)));
}

#[test]
fn connect_failure_is_reported_and_not_retried() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let (tx, rx) = crossbeam_channel::unbounded();

    let result = MarkerLink::connect(
        "127.0.0.1",
        port,
        LinkConfig::default().without_settle(),
        Arc::new(SystemClock),
        StatusSink::new(tx),
    );

    assert!(matches!(result, Err(LinkError::Connection { .. })));
    let statuses: Vec<_> = rx.try_iter().collect();
    assert!(matches!(statuses[0], LinkStatus::Connecting { .. }));
    assert!(matches!(statuses[1], LinkStatus::FailedToConnect(_)));
    assert_eq!(statuses.len(), 2);
}

#[test]
fn full_session_over_tcp() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = thread::spawn(move || {
        let (mut socket, _) = listener.accept().unwrap();
        let mut commands = Vec::new();
        let mut labels = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            socket.read_exact(&mut byte).unwrap();
            commands.push(byte[0]);
            match byte[0] {
                b'Q' => {
                    let mut rest = [0u8; 4];
                    socket.read_exact(&mut rest).unwrap();
                    socket.write_all(b"I1").unwrap();
                    continue;
                }
                b'T' => {
                    let mut rest = [0u8; 4];
                    socket.read_exact(&mut rest).unwrap();
                }
                b'D' => {
                    let mut rest = [0u8; 17];
                    socket.read_exact(&mut rest).unwrap();
                    labels.push(String::from_utf8(rest[10..14].to_vec()).unwrap());
                }
                _ => {}
            }
            socket.write_all(&[ACK]).unwrap();
            if byte[0] == b'X' {
                break;
            }
        }
        (commands, labels)
    });

    let mut link = MarkerLink::connect(
        "127.0.0.1",
        port,
        LinkConfig::default().without_settle(),
        Arc::new(SystemClock),
        StatusSink::none(),
    )
    .unwrap();
    link.open().unwrap();
    link.begin().unwrap();
    link.send_marker("AtGr").unwrap();
    link.send_marker("Lp").unwrap();
    link.disconnect().unwrap();

    let (commands, labels) = server.join().unwrap();
    assert_eq!(commands.first(), Some(&b'Q'));
    assert!(commands.contains(&b'A'));
    assert_eq!(&commands[commands.len() - 5..], b"BDDEX");
    assert_eq!(labels, vec!["AtGr".to_string(), "Lp  ".to_string()]);
}
