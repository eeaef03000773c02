//! Gaze sample producers. Each runs on its own thread and posts into the
//! control queue; the control thread never calls a source directly.

use std::io::{self, BufRead};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::Sender;
use gazex_core::GazeSample;
use gazex_timing::precise_sleep;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("line {line}: malformed gaze message")]
    Decode {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("gaze source I/O failed")]
    Io(#[from] io::Error),
}

pub trait GazeSource: Send {
    /// Next sample, or `None` once the source is exhausted.
    fn next_sample(&mut self) -> Result<Option<GazeSample>, SourceError>;

    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedGazeConfig {
    pub interval_ms: u64,
    pub jitter_px: f32,
    pub min_dwell_ms: u64,
    pub max_dwell_ms: u64,
    pub pupil_diameter: f32,
    /// Fixation targets, in the coordinates the source reports.
    pub targets: Vec<(f32, f32)>,
}

impl Default for SimulatedGazeConfig {
    fn default() -> Self {
        Self {
            interval_ms: 33,
            jitter_px: 4.0,
            min_dwell_ms: 400,
            max_dwell_ms: 1800,
            pupil_diameter: 6.0,
            targets: vec![(0.0, 0.0), (0.0, 200.0), (300.0, -200.0)],
        }
    }
}

/// Synthetic tracker: fixates a target with jitter for a random dwell,
/// then jumps to another one.
#[derive(Debug)]
pub struct SimulatedGaze {
    config: SimulatedGazeConfig,
    rng: StdRng,
    timestamp: u64,
    target: usize,
    remaining: u64,
}

impl SimulatedGaze {
    pub fn new(config: SimulatedGazeConfig) -> Self {
        Self::with_seed(config, rand::random())
    }

    pub fn with_seed(config: SimulatedGazeConfig, seed: u64) -> Self {
        Self {
            config,
            rng: StdRng::seed_from_u64(seed),
            timestamp: 0,
            target: 0,
            remaining: 0,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.config.interval_ms)
    }

    fn pick_target(&mut self) {
        let count = self.config.targets.len();
        if count > 1 {
            let step = self.rng.random_range(1..count);
            self.target = (self.target + step) % count;
        }
        let min = self.config.min_dwell_ms.min(self.config.max_dwell_ms);
        let dwell_ms = self.rng.random_range(min..=self.config.max_dwell_ms.max(min));
        self.remaining = (dwell_ms / self.config.interval_ms.max(1)).max(1);
    }
}

impl GazeSource for SimulatedGaze {
    fn next_sample(&mut self) -> Result<Option<GazeSample>, SourceError> {
        if self.remaining == 0 {
            self.pick_target();
        }
        self.remaining -= 1;
        self.timestamp += self.config.interval_ms;

        let (tx, ty) = self.config.targets.get(self.target).copied().unwrap_or((0.0, 0.0));
        let jitter = self.config.jitter_px.abs();
        let x = tx + self.rng.random_range(-jitter..=jitter);
        let y = ty + self.rng.random_range(-jitter..=jitter);

        Ok(Some(GazeSample::new(self.timestamp, x, y, self.config.pupil_diameter)))
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum Message {
    Sample {
        ts: u64,
        x: f32,
        y: f32,
        #[serde(default)]
        p: f32,
    },
    #[serde(other)]
    Other,
}

/// Newline-delimited JSON messages, as sent by tracker bridges:
/// `{"type":"sample","ts":..,"x":..,"y":..,"p":..}`. Other message types
/// are skipped.
#[derive(Debug)]
pub struct JsonLineSource<R> {
    reader: R,
    line: usize,
    buf: String,
}

impl<R: BufRead> JsonLineSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: 0,
            buf: String::new(),
        }
    }
}

impl<R: BufRead + Send> GazeSource for JsonLineSource<R> {
    fn next_sample(&mut self) -> Result<Option<GazeSample>, SourceError> {
        loop {
            self.buf.clear();
            if self.reader.read_line(&mut self.buf)? == 0 {
                return Ok(None);
            }
            self.line += 1;

            let text = self.buf.trim();
            if text.is_empty() {
                continue;
            }
            let message: Message = serde_json::from_str(text).map_err(|source| SourceError::Decode {
                line: self.line,
                source,
            })?;
            match message {
                Message::Sample { ts, x, y, p } => return Ok(Some(GazeSample::new(ts, x, y, p))),
                Message::Other => debug!(line = self.line, "gaze: non-sample message skipped"),
            }
        }
    }

    fn name(&self) -> &'static str {
        "json-lines"
    }
}

/// Runs `source` on its own thread, posting every sample to `tx`.
///
/// With `pace` set the thread sleeps between samples. The thread stops
/// when the source is exhausted, fails with I/O, or the receiver is gone.
/// Malformed messages are logged and skipped.
pub fn spawn_source<S>(
    mut source: S,
    tx: Sender<GazeSample>,
    pace: Option<Duration>,
) -> io::Result<JoinHandle<()>>
where
    S: GazeSource + 'static,
{
    let name = source.name();
    thread::Builder::new()
        .name(format!("gaze-{name}"))
        .spawn(move || {
            info!(source = name, "gaze source started");
            loop {
                match source.next_sample() {
                    Ok(Some(sample)) => {
                        if tx.send(sample).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(err @ SourceError::Decode { .. }) => {
                        warn!(source = name, error = %err, "gaze: message skipped");
                        continue;
                    }
                    Err(err) => {
                        error!(source = name, error = %err, "gaze source failed");
                        break;
                    }
                }
                if let Some(pace) = pace {
                    precise_sleep(pace);
                }
            }
            info!(source = name, "gaze source stopped");
        })
}
