use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::net::TcpStream;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use crossbeam_channel::{Receiver, Sender};
use gazex_core::GazeSample;
use gazex_experiment::{ControlEvent, Session, SessionJournal};
use gazex_gaze::{GazeStream, JsonLineSource, SimulatedGaze, spawn_source};
use gazex_link::{LinkStatus, MarkerLink, MarkerSink, OfflineSink, StatusSink};
use gazex_timing::{Clock, SystemClock};
use tracing::{info, warn};

use crate::config::{AppConfig, GazeSourceKind};
use crate::console;
use crate::presenter::HeadlessPresenter;

type Journal = SessionJournal<BufWriter<File>>;

pub struct App {
    config: AppConfig,
    clock: Arc<dyn Clock>,
}

impl App {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn run(self) -> Result<()> {
        info!(
            participant = self.config.tasks.participant,
            platform = std::env::consts::OS,
            "gazex starting"
        );

        let (control_tx, control_rx) = crossbeam_channel::unbounded();
        let (gaze_tx, gaze_rx) = crossbeam_channel::unbounded();
        self.spawn_gaze(gaze_tx)?;
        console::spawn(control_tx.clone()).context("start operator console")?;

        let journal = self.open_journal()?;
        if self.config.link.enabled {
            let link = self.connect()?;
            self.drive(link, journal, &control_rx, &gaze_rx)
        } else {
            warn!("recorder link disabled, markers are only logged");
            self.drive(OfflineSink, journal, &control_rx, &gaze_rx)
        }
    }

    fn drive<S: MarkerSink>(
        &self,
        sink: S,
        journal: Option<Journal>,
        control_rx: &Receiver<ControlEvent>,
        gaze_rx: &Receiver<GazeSample>,
    ) -> Result<()> {
        let stream = GazeStream::new(self.config.gaze.mapping, self.config.gaze.smoothing);
        let mut session = Session::load(
            self.config.session_config(),
            sink,
            self.clock.clone(),
            stream,
            journal,
        )
        .context("load trial orders")?;

        session.begin().context("start recording")?;
        let mut presenter = HeadlessPresenter::new(self.config.tasks.clips);
        session.run(control_rx, gaze_rx, self.config.tasks.tick(), &mut presenter)?;

        println!("\nExperiment completed.");
        Ok(())
    }

    fn connect(&self) -> Result<MarkerLink<TcpStream>> {
        let (status_tx, status_rx) = crossbeam_channel::unbounded();
        report_link_status(status_rx)?;

        let section = &self.config.link;
        let mut link = MarkerLink::connect(
            &section.host,
            section.port,
            section.link_config(),
            self.clock.clone(),
            StatusSink::new(status_tx),
        )
        .context("connect to the recorder")?;
        let report = link.open().context("open the recorder session")?;
        info!(
            iterations = report.iterations,
            error_ms = report.round_trip_error_ms,
            low_accuracy = report.low_accuracy,
            "recorder synchronized"
        );
        Ok(link)
    }

    fn open_journal(&self) -> Result<Option<Journal>> {
        if !self.config.journal.enabled {
            return Ok(None);
        }
        let dir = &self.config.journal.dir;
        let (journal, path) = SessionJournal::create(dir)
            .with_context(|| format!("create journal in {}", dir.display()))?;
        info!(path = %path.display(), "journal");
        Ok(Some(journal))
    }

    fn spawn_gaze(&self, tx: Sender<GazeSample>) -> Result<()> {
        let gaze = &self.config.gaze;
        let interval = Duration::from_millis(gaze.simulated.interval_ms);
        match gaze.source {
            GazeSourceKind::Simulated => {
                let source = SimulatedGaze::new(gaze.simulated.clone());
                spawn_source(source, tx, Some(interval))?;
            }
            GazeSourceKind::JsonTcp => {
                let stream = TcpStream::connect(&gaze.address)
                    .with_context(|| format!("connect to the gaze server at {}", gaze.address))?;
                spawn_source(JsonLineSource::new(BufReader::new(stream)), tx, None)?;
            }
            GazeSourceKind::File => {
                let Some(path) = gaze.path.as_ref() else {
                    bail!("gaze source `file` needs `gaze.path`");
                };
                let file = File::open(path)
                    .with_context(|| format!("open gaze recording {}", path.display()))?;
                spawn_source(JsonLineSource::new(BufReader::new(file)), tx, Some(interval))?;
            }
        }
        info!(source = ?gaze.source, "gaze source running");
        Ok(())
    }
}

/// Prints link state changes for the operator.
fn report_link_status(rx: Receiver<LinkStatus>) -> Result<()> {
    thread::Builder::new()
        .name("link-status".into())
        .spawn(move || {
            for status in rx {
                println!("recorder: {}", status.message());
            }
        })
        .context("start link status reporter")?;
    Ok(())
}
