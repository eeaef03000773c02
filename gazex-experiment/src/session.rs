//! Block-alternating session: playing-lady and orientation blocks take
//! turns with a pause in between, and the session ends after the last
//! orientation block.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, select};
use gazex_core::{GazeSample, Notification};
use gazex_gaze::{GateConfig, GazeStream};
use gazex_link::{LinkError, MarkerSink};
use gazex_timing::{Clock, Scheduler};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::journal::SessionJournal;
use crate::machine::{StateError, TaskInput, TaskStateMachine};
use crate::paradigm::{Orientation, OrientationConfig, Paradigm, PlayingLady, PlayingLadyConfig};
use crate::trials::{LoadError, TrialSequence};

pub const TASKS_MARKER: &str = "OrPL";
pub const BASELINE_START_MARKER: &str = "BL-s";
pub const BASELINE_STOP_MARKER: &str = "BL-e";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("recorder link failed")]
    Link(#[from] LinkError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error("cannot write the session journal")]
    Journal(#[source] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub participant: u32,
    pub order_dir: PathBuf,
    pub start_delay_ms: u64,
    pub pause_between_blocks_ms: u64,
    pub gate: GateConfig,
    pub orientation: OrientationConfig,
    pub playing_lady: PlayingLadyConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            participant: 1,
            order_dir: PathBuf::from("order"),
            start_delay_ms: 500,
            pause_between_blocks_ms: 2000,
            gate: GateConfig::default(),
            orientation: OrientationConfig::default(),
            playing_lady: PlayingLadyConfig::default(),
        }
    }
}

/// `<dir>/<participant>_order_<paradigm file>`.
pub fn order_path<P: Paradigm>(dir: &Path, participant: u32) -> PathBuf {
    dir.join(format!("{participant}_order_{}", P::ORDER_FILE))
}

/// Operator keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorCommand {
    Advance,
    Restart,
    Cancel,
    /// Starts or stops the baseline recording.
    Baseline,
    Quit,
}

impl OperatorCommand {
    /// Maps a console line: `s`/space advance, `r`/enter restart,
    /// `c` cancel, `b` baseline on/off, `q` quit.
    pub fn from_line(line: &str) -> Option<Self> {
        match line.trim_end_matches(['\r', '\n']) {
            "s" | " " => Some(Self::Advance),
            "r" | "" => Some(Self::Restart),
            "c" => Some(Self::Cancel),
            "b" => Some(Self::Baseline),
            "q" => Some(Self::Quit),
            _ => None,
        }
    }

    fn task_input(self) -> Option<TaskInput> {
        match self {
            Self::Advance => Some(TaskInput::Advance),
            Self::Restart => Some(TaskInput::Restart),
            Self::Cancel => Some(TaskInput::Cancel),
            Self::Baseline | Self::Quit => None,
        }
    }
}

/// Messages posted to the control thread.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlEvent {
    Operator(OperatorCommand),
    Gaze(GazeSample),
    /// The player finished the clip that is playing.
    MediaFinished,
}

/// The stimulus side: shows what the machines ask for and reports back.
pub trait Presenter {
    fn notify(&mut self, notification: &Notification, now: Instant);

    /// Signals raised since the last call, e.g. a clip reaching its end.
    fn poll(&mut self, _now: Instant) -> Vec<ControlEvent> {
        Vec::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Orders loaded, waiting for the operator to start the tasks.
    Ready,
    Running,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block {
    PlayingLady,
    Orientation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionTimer {
    Open(Block),
    Finish,
}

pub struct Session<S: MarkerSink, W: Write> {
    config: SessionConfig,
    clock: Arc<dyn Clock>,
    sink: S,
    stream: GazeStream,
    playing_lady: TaskStateMachine<PlayingLady>,
    orientation: TaskStateMachine<Orientation>,
    timers: Scheduler<SessionTimer>,
    journal: Option<SessionJournal<W>>,
    phase: SessionPhase,
    baseline: bool,
    active: Option<Block>,
    outbox: Vec<Notification>,
    /// Outbox entries already written to the journal.
    journaled: usize,
}

impl<S: MarkerSink, W: Write> Session<S, W> {
    /// Loads both order files. Nothing is usable unless both are valid.
    pub fn load(
        config: SessionConfig,
        sink: S,
        clock: Arc<dyn Clock>,
        stream: GazeStream,
        journal: Option<SessionJournal<W>>,
    ) -> Result<Self, SessionError> {
        let lady_path = order_path::<PlayingLady>(&config.order_dir, config.participant);
        let orientation_path = order_path::<Orientation>(&config.order_dir, config.participant);
        let lady_trials = TrialSequence::load_file(&lady_path, PlayingLady::BLOCK_SIZE)?;
        let orientation_trials = TrialSequence::load_file(&orientation_path, Orientation::BLOCK_SIZE)?;

        let mut session = Self::new(config, sink, clock, stream, journal, lady_trials, orientation_trials);
        for path in [&lady_path, &orientation_path] {
            let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
            session.journal_line("Loaded", &name)?;
        }
        Ok(session)
    }

    pub fn new(
        config: SessionConfig,
        sink: S,
        clock: Arc<dyn Clock>,
        stream: GazeStream,
        journal: Option<SessionJournal<W>>,
        lady_trials: TrialSequence<crate::paradigm::PlayingLadyTrial>,
        orientation_trials: TrialSequence<crate::paradigm::OrientationTrial>,
    ) -> Self {
        let playing_lady = TaskStateMachine::new(
            PlayingLady::new(config.playing_lady.clone()),
            lady_trials,
            config.gate,
        );
        let orientation = TaskStateMachine::new(
            Orientation::new(config.orientation.clone()),
            orientation_trials,
            config.gate,
        );
        let participant = config.participant;
        Self {
            config,
            clock,
            sink,
            stream,
            playing_lady,
            orientation,
            timers: Scheduler::new(),
            journal,
            phase: SessionPhase::Ready,
            baseline: false,
            active: None,
            outbox: vec![Notification::SessionReady { participant }],
            journaled: 0,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_finished(&self) -> bool {
        self.phase == SessionPhase::Finished
    }

    pub fn is_baseline_running(&self) -> bool {
        self.baseline
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Hands back the sink and the journal, e.g. after `finish`.
    pub fn into_parts(self) -> (S, Option<SessionJournal<W>>) {
        (self.sink, self.journal)
    }

    pub fn playing_lady(&self) -> &TaskStateMachine<PlayingLady> {
        &self.playing_lady
    }

    pub fn orientation(&self) -> &TaskStateMachine<Orientation> {
        &self.orientation
    }

    pub fn active_paradigm(&self) -> Option<&'static str> {
        self.active.map(|block| match block {
            Block::PlayingLady => PlayingLady::NAME,
            Block::Orientation => Orientation::NAME,
        })
    }

    /// Starts recording on the marker sink.
    pub fn begin(&mut self) -> Result<(), SessionError> {
        self.sink.begin()?;
        info!(participant = self.config.participant, "recording started");
        Ok(())
    }

    /// Baseline recording before the tasks: `BL-s` on start, `BL-e` on
    /// stop. Only available while the session is ready.
    pub fn start_baseline(&mut self, now: Instant) -> Result<(), SessionError> {
        if self.phase != SessionPhase::Ready || self.baseline {
            debug!(phase = ?self.phase, "baseline not started");
            return Ok(());
        }
        self.baseline = true;
        info!("baseline started");
        self.mark(BASELINE_START_MARKER);
        self.outbox.push(Notification::BaselineStarted);
        self.flush_notifications(now)
    }

    pub fn stop_baseline(&mut self, now: Instant) -> Result<(), SessionError> {
        if !self.baseline {
            return Ok(());
        }
        self.baseline = false;
        info!("baseline stopped");
        self.mark(BASELINE_STOP_MARKER);
        self.outbox.push(Notification::BaselineStopped);
        self.flush_notifications(now)
    }

    /// Sends the tasks marker and opens the first playing-lady block.
    /// A running baseline is stopped first.
    pub fn start_tasks(&mut self, now: Instant) -> Result<(), SessionError> {
        if self.phase != SessionPhase::Ready {
            return Ok(());
        }
        self.stop_baseline(now)?;
        self.phase = SessionPhase::Running;
        info!("tasks started");
        self.mark(TASKS_MARKER);
        self.outbox.push(Notification::TasksStarted);
        self.timers.schedule(
            now,
            Duration::from_millis(self.config.start_delay_ms),
            SessionTimer::Open(Block::PlayingLady),
        );
        self.flush_notifications(now)
    }

    /// Applies one control message. Returns `false` once the session should stop.
    pub fn handle(&mut self, event: ControlEvent, now: Instant) -> Result<bool, SessionError> {
        match event {
            ControlEvent::Gaze(sample) => self.on_gaze(sample, now)?,
            ControlEvent::Operator(OperatorCommand::Quit) => {
                info!("operator quit");
                self.finish(now)?;
                return Ok(false);
            }
            ControlEvent::Operator(OperatorCommand::Advance) if self.phase == SessionPhase::Ready => {
                self.start_tasks(now)?;
            }
            ControlEvent::Operator(OperatorCommand::Baseline) => {
                if self.baseline {
                    self.stop_baseline(now)?;
                } else {
                    self.start_baseline(now)?;
                }
            }
            ControlEvent::Operator(command) => {
                if let Some(input) = command.task_input() {
                    self.dispatch(input, now)?;
                }
            }
            ControlEvent::MediaFinished => self.dispatch(TaskInput::MediaFinished, now)?,
        }
        Ok(!self.is_finished())
    }

    pub fn on_gaze(&mut self, sample: GazeSample, now: Instant) -> Result<(), SessionError> {
        let point = self.stream.feed(sample);
        let relative = self.sink.timestamp_ms();
        if let Some(journal) = self.journal.as_mut() {
            journal.gaze(relative, &sample).map_err(SessionError::Journal)?;
        }
        match self.active {
            Some(Block::PlayingLady) => {
                self.playing_lady.on_gaze(&point, now, &mut self.sink)?;
            }
            Some(Block::Orientation) => {
                self.orientation.on_gaze(&point, now, &mut self.sink)?;
            }
            None => {}
        }
        self.flush_notifications(now)
    }

    /// Fires due session and task timers.
    pub fn tick(&mut self, now: Instant) -> Result<(), SessionError> {
        self.playing_lady.tick(now, &mut self.sink)?;
        self.orientation.tick(now, &mut self.sink)?;
        self.flush_notifications(now)?;

        while let Some(fired) = self.timers.poll_next(now) {
            match fired.action {
                SessionTimer::Open(block) => self.open_block(block),
                SessionTimer::Finish => self.finish(now)?,
            }
            self.flush_notifications(now)?;
        }
        Ok(())
    }

    /// Ends recording, closes the journal and disconnects. Idempotent.
    pub fn finish(&mut self, now: Instant) -> Result<(), SessionError> {
        if self.phase == SessionPhase::Finished {
            return Ok(());
        }
        self.stop_baseline(now)?;
        self.phase = SessionPhase::Finished;
        self.active = None;
        self.timers.cancel_all();
        self.outbox.push(Notification::SessionFinished);
        self.flush_notifications(now)?;

        let relative = self.sink.timestamp_ms();
        if let Some(journal) = self.journal.as_mut() {
            journal.close(relative).map_err(SessionError::Journal)?;
        }
        info!("session finished");
        self.sink.disconnect()?;
        Ok(())
    }

    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        self.journaled = 0;
        std::mem::take(&mut self.outbox)
    }

    /// Control loop: applies messages as they arrive and fires timers at
    /// least every `tick`. Returns when the session finishes, on quit, or
    /// when the control channel closes.
    pub fn run(
        &mut self,
        control_rx: &Receiver<ControlEvent>,
        gaze_rx: &Receiver<GazeSample>,
        tick: Duration,
        presenter: &mut dyn Presenter,
    ) -> Result<(), SessionError> {
        let mut gaze_rx = gaze_rx.clone();
        let mut gaze_closed = false;
        self.present_pending(presenter)?;

        loop {
            let timeout = crossbeam_channel::after(tick);
            let keep_going = select! {
                recv(control_rx) -> msg => match msg {
                    Ok(event) => self.handle(event, self.clock.now())?,
                    Err(_) => {
                        info!("control channel closed");
                        false
                    }
                },
                recv(gaze_rx) -> msg => match msg {
                    Ok(sample) => {
                        self.on_gaze(sample, self.clock.now())?;
                        true
                    }
                    Err(_) => {
                        warn!("gaze source disconnected");
                        gaze_closed = true;
                        true
                    }
                },
                recv(timeout) -> _ => true,
            };
            if !keep_going {
                break;
            }
            if gaze_closed {
                gaze_rx = crossbeam_channel::never();
                gaze_closed = false;
            }

            let now = self.clock.now();
            self.tick(now)?;
            self.present_pending(presenter)?;
            for event in presenter.poll(now) {
                if !self.handle(event, now)? {
                    break;
                }
            }
            self.present_pending(presenter)?;
            if self.is_finished() {
                break;
            }
        }

        self.finish(self.clock.now())?;
        self.present_pending(presenter)?;
        Ok(())
    }

    fn present_pending(&mut self, presenter: &mut dyn Presenter) -> Result<(), SessionError> {
        let now = self.clock.now();
        self.flush_notifications(now)?;
        for notification in self.drain_notifications() {
            presenter.notify(&notification, now);
        }
        Ok(())
    }

    fn dispatch(&mut self, input: TaskInput, now: Instant) -> Result<(), SessionError> {
        let changed = match self.active {
            Some(Block::PlayingLady) => self.playing_lady.handle(input, now, &mut self.sink)?,
            Some(Block::Orientation) => self.orientation.handle(input, now, &mut self.sink)?,
            None => false,
        };
        if !changed {
            debug!(input = input.as_str(), "input had no effect");
        }
        self.flush_notifications(now)
    }

    fn open_block(&mut self, block: Block) {
        self.active = Some(block);
        match block {
            Block::PlayingLady => self.playing_lady.enable_block(),
            Block::Orientation => self.orientation.enable_block(),
        }
    }

    /// Moves machine notifications to the journal and the outbox, and
    /// schedules the next block when one ends.
    fn flush_notifications(&mut self, now: Instant) -> Result<(), SessionError> {
        let mut notes = self.playing_lady.drain_notifications();
        notes.extend(self.orientation.drain_notifications());
        let pause = Duration::from_millis(self.config.pause_between_blocks_ms);

        for note in &notes {
            if let Notification::BlockFinished { paradigm, more_blocks } = note {
                self.active = None;
                let next = if *paradigm == PlayingLady::NAME {
                    SessionTimer::Open(Block::Orientation)
                } else if *more_blocks {
                    SessionTimer::Open(Block::PlayingLady)
                } else {
                    SessionTimer::Finish
                };
                self.timers.schedule(now, pause, next);
            }
        }

        self.outbox.extend(notes);
        let relative = self.sink.timestamp_ms();
        if let Some(journal) = self.journal.as_mut() {
            for note in &self.outbox[self.journaled..] {
                journal.record(relative, note).map_err(SessionError::Journal)?;
            }
        }
        self.journaled = self.outbox.len();
        Ok(())
    }

    fn mark(&mut self, label: &str) {
        match self.sink.mark(label) {
            Ok(_) => self.outbox.push(Notification::MarkerSent {
                label: label.to_string(),
            }),
            Err(err) => {
                warn!(label, error = %err, "marker lost");
                self.outbox.push(Notification::MarkerLost {
                    label: label.to_string(),
                    reason: err.to_string(),
                });
            }
        }
    }

    fn journal_line(&mut self, title: &str, message: &str) -> Result<(), SessionError> {
        let relative = self.sink.timestamp_ms();
        if let Some(journal) = self.journal.as_mut() {
            journal.line(relative, title, message).map_err(SessionError::Journal)?;
        }
        Ok(())
    }
}
