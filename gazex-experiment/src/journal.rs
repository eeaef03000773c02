//! Tab-separated session journal.
//!
//! Plain lines are `relative_ts  gaze_ts  title  message`. Events that
//! happen between two gaze samples are held back and written on the next
//! sample row: `relative_ts  ts  x  y  pupil  events`.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use gazex_core::{GazeSample, Notification};
use tracing::debug;

const DELIMITER: &str = "\t";

pub struct SessionJournal<W: Write> {
    writer: W,
    pending: Vec<String>,
    gaze_ts: u64,
    closed: bool,
}

impl SessionJournal<BufWriter<File>> {
    /// Creates `log_<date>_<time>.txt` in `dir`.
    pub fn create(dir: impl AsRef<Path>) -> io::Result<(Self, PathBuf)> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let name = chrono::Local::now()
            .format("log_%Y-%m-%d_%H-%M-%S.txt")
            .to_string();
        let path = dir.join(name);
        let file = File::create(&path)?;
        debug!(path = %path.display(), "journal opened");
        Ok((Self::new(BufWriter::new(file)), path))
    }
}

impl<W: Write> SessionJournal<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            pending: Vec::new(),
            gaze_ts: 0,
            closed: false,
        }
    }

    /// Writes a line at once.
    pub fn line(&mut self, relative_ms: Option<f64>, title: &str, message: &str) -> io::Result<()> {
        let fields = [
            format_relative(relative_ms),
            self.gaze_ts.to_string(),
            title.to_string(),
            message.to_string(),
        ];
        writeln!(self.writer, "{}", fields.join(DELIMITER))
    }

    /// Holds `event` back for the next gaze row.
    pub fn push_event(&mut self, event: impl Into<String>) {
        self.pending.push(event.into());
    }

    pub fn pending_events(&self) -> &[String] {
        &self.pending
    }

    pub fn gaze(&mut self, relative_ms: Option<f64>, sample: &GazeSample) -> io::Result<()> {
        self.gaze_ts = sample.timestamp;
        let fields = [
            format_relative(relative_ms),
            sample.timestamp.to_string(),
            sample.x.to_string(),
            sample.y.to_string(),
            sample.pupil_diameter.to_string(),
            self.pending.join(", "),
        ];
        self.pending.clear();
        writeln!(self.writer, "{}", fields.join(DELIMITER))
    }

    /// Journals a notification: failures and session milestones as lines,
    /// trial events held for the next gaze row.
    pub fn record(&mut self, relative_ms: Option<f64>, notification: &Notification) -> io::Result<()> {
        match notification {
            Notification::SessionReady { .. }
            | Notification::TasksStarted
            | Notification::BaselineStarted
            | Notification::BaselineStopped
            | Notification::MarkerLost { .. } => {
                self.line(relative_ms, notification.title(), &notification.describe())
            }
            Notification::StateChanged { .. }
            | Notification::Present { .. }
            | Notification::SessionFinished => Ok(()),
            _ => {
                self.push_event(notification.describe());
                Ok(())
            }
        }
    }

    /// Writes held events, the closing line, and flushes. Idempotent.
    pub fn close(&mut self, relative_ms: Option<f64>) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        for event in std::mem::take(&mut self.pending) {
            self.line(relative_ms, &event, "")?;
        }
        self.line(relative_ms, "Finished", "")?;
        self.closed = true;
        self.writer.flush()
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

fn format_relative(relative_ms: Option<f64>) -> String {
    match relative_ms {
        Some(ms) => format!("{}", ms.round() as i64),
        None => "-".to_string(),
    }
}
