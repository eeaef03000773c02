//! Generic trial state machine driving one paradigm.
//!
//! Every trigger (operator input, gate focus, media end, timer) is applied
//! on the control thread through [`TaskStateMachine::handle`],
//! [`TaskStateMachine::on_gaze`] or [`TaskStateMachine::tick`]. Entering a
//! state invalidates every timer armed before it.

use std::time::Instant;

use gazex_core::{Notification, SmoothedPoint, TaskState};
use gazex_gaze::{FixationGate, GateConfig};
use gazex_link::MarkerSink;
use gazex_timing::Scheduler;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::paradigm::{Paradigm, RegionChange};
use crate::trials::{TrialRecord, TrialSequence};

pub const CANCEL_MARKER: &str = "Cncl";
pub const RESTART_MARKER: &str = "Rstr";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskInput {
    /// Operator's advance key.
    Advance,
    /// Focus signal raised outside the machine's own gate.
    Focused,
    MediaFinished,
    Cancel,
    Restart,
}

impl TaskInput {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Advance => "advance",
            Self::Focused => "focused",
            Self::MediaFinished => "media-finished",
            Self::Cancel => "cancel",
            Self::Restart => "restart",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerAction {
    Advance,
    NextTrial,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("{paradigm}: no state follows {state}")]
    NoSuccessor {
        paradigm: &'static str,
        state: &'static str,
    },
    #[error("{paradigm}: entered {state} without a trial")]
    NoTrial {
        paradigm: &'static str,
        state: &'static str,
    },
}

pub struct TaskStateMachine<P: Paradigm> {
    paradigm: P,
    trials: TrialSequence<P::Record>,
    state: P::State,
    trial: Option<P::Record>,
    gate: FixationGate,
    timers: Scheduler<TimerAction>,
    /// A block is open for this paradigm.
    enabled: bool,
    /// The operator started the open block.
    running: bool,
    outbox: Vec<Notification>,
}

impl<P: Paradigm> TaskStateMachine<P> {
    pub fn new(paradigm: P, trials: TrialSequence<P::Record>, gate: GateConfig) -> Self {
        Self {
            paradigm,
            trials,
            state: P::State::default(),
            trial: None,
            gate: FixationGate::new(gate),
            timers: Scheduler::new(),
            enabled: false,
            running: false,
            outbox: Vec::new(),
        }
    }

    pub fn paradigm(&self) -> &P {
        &self.paradigm
    }

    pub fn state(&self) -> P::State {
        self.state
    }

    pub fn trial(&self) -> Option<&P::Record> {
        self.trial.as_ref()
    }

    pub fn trials(&self) -> &TrialSequence<P::Record> {
        &self.trials
    }

    pub fn gate(&self) -> &FixationGate {
        &self.gate
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.pending()
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.timers.next_due()
    }

    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.outbox)
    }

    /// Opens the next block. It starts on the operator's first advance.
    pub fn enable_block(&mut self) {
        self.enabled = true;
        self.running = false;
        self.state = P::State::default();
        info!(paradigm = P::NAME, "block ready, waiting for the operator");
        self.outbox.push(Notification::BlockStarted { paradigm: P::NAME });
    }

    /// Applies one input. Returns whether it changed anything; inputs the
    /// current state does not accept are ignored.
    pub fn handle(
        &mut self,
        input: TaskInput,
        now: Instant,
        sink: &mut dyn MarkerSink,
    ) -> Result<bool, StateError> {
        if !self.enabled {
            debug!(paradigm = P::NAME, input = input.as_str(), "input ignored, block not open");
            return Ok(false);
        }

        let result = match input {
            TaskInput::Advance => self.operator_advance(now, sink),
            TaskInput::Focused if self.running => self.focus(now, sink).map(|_| true),
            TaskInput::MediaFinished
                if self.running && self.paradigm.advances_on_media_finished(self.state) =>
            {
                self.advance(now, sink).map(|_| true)
            }
            TaskInput::Cancel if self.is_abortable() => self.cancel_trial(now, sink).map(|_| true),
            TaskInput::Restart if self.is_abortable() => self.restart_trial(now, sink).map(|_| true),
            _ => {
                debug!(
                    paradigm = P::NAME,
                    state = self.state.name(),
                    input = input.as_str(),
                    "input ignored in this state"
                );
                Ok(false)
            }
        };
        self.log_failure(result)
    }

    /// Feeds one smoothed gaze point to the gate.
    pub fn on_gaze(
        &mut self,
        point: &SmoothedPoint,
        now: Instant,
        sink: &mut dyn MarkerSink,
    ) -> Result<bool, StateError> {
        if !self.running || !self.gate.on_sample(point) {
            return Ok(false);
        }
        self.outbox
            .push(Notification::FixationAchieved { paradigm: P::NAME });
        let result = self.focus(now, sink).map(|_| true);
        self.log_failure(result)
    }

    /// Fires due timers one at a time; returns how many took effect.
    pub fn tick(&mut self, now: Instant, sink: &mut dyn MarkerSink) -> Result<usize, StateError> {
        let mut fired_count = 0;
        while let Some(fired) = self.timers.poll_next(now) {
            if !self.timers.is_current(&fired) {
                continue;
            }
            fired_count += 1;
            let result = match fired.action {
                TimerAction::Advance => self.advance(now, sink),
                TimerAction::NextTrial => self.next_trial(now, sink),
            };
            self.log_failure(result)?;
        }
        Ok(fired_count)
    }

    fn operator_advance(&mut self, now: Instant, sink: &mut dyn MarkerSink) -> Result<bool, StateError> {
        if !self.running {
            self.running = true;
            self.state = P::State::default();
            match self.trials.start_block().cloned() {
                Some(trial) => self.load_trial(trial),
                None => {
                    self.finish_block();
                    return Ok(true);
                }
            }
        }
        if !self.paradigm.accepts_advance(self.state) {
            return Ok(false);
        }
        self.advance(now, sink)?;
        Ok(true)
    }

    fn advance(&mut self, now: Instant, sink: &mut dyn MarkerSink) -> Result<(), StateError> {
        let next = self.state.next().ok_or(StateError::NoSuccessor {
            paradigm: P::NAME,
            state: self.state.name(),
        })?;
        self.enter(next, now, sink)
    }

    fn enter(&mut self, state: P::State, now: Instant, sink: &mut dyn MarkerSink) -> Result<(), StateError> {
        self.timers.cancel_all();
        self.state = state;

        let trial = self.trial.as_ref().ok_or(StateError::NoTrial {
            paradigm: P::NAME,
            state: state.name(),
        })?;
        let description = trial.describe();
        let entry = self.paradigm.enter(state, trial);

        info!(paradigm = P::NAME, state = state.name(), trial = %description, "task state");
        self.outbox.push(Notification::StateChanged {
            paradigm: P::NAME,
            state: state.name(),
            trial: Some(description),
        });

        match entry.region {
            RegionChange::Keep => {}
            RegionChange::Track(region) => self.gate.set_tracked_region(Some(region)),
            RegionChange::Clear => self.gate.clear(),
        }
        for presentation in entry.presentations {
            self.outbox.push(Notification::Present {
                paradigm: P::NAME,
                presentation,
            });
        }
        if let Some(label) = entry.marker {
            self.mark(&label, sink);
        }
        if let Some(delay) = entry.advance_after {
            self.timers.schedule(now, delay, TimerAction::Advance);
        }

        if state.is_terminal() {
            if let Some(index) = self.trials.current_index() {
                self.outbox.push(Notification::TrialFinished {
                    paradigm: P::NAME,
                    index,
                });
            }
            self.timers
                .schedule(now, self.paradigm.inter_trial_interval(), TimerAction::NextTrial);
        }
        Ok(())
    }

    fn focus(&mut self, now: Instant, sink: &mut dyn MarkerSink) -> Result<(), StateError> {
        let reaction = self.paradigm.on_focus(self.state);
        self.gate.clear();
        debug!(paradigm = P::NAME, state = self.state.name(), "focus");

        if let Some(label) = reaction.marker {
            self.mark(label, sink);
        }
        if let Some(delay) = reaction.advance_after {
            self.timers
                .cancel_matching(|action| *action == TimerAction::Advance);
            self.timers.schedule(now, delay, TimerAction::Advance);
        }
        Ok(())
    }

    /// Takes the next trial of the block, or closes the block.
    fn next_trial(&mut self, now: Instant, sink: &mut dyn MarkerSink) -> Result<(), StateError> {
        match self.trials.next().cloned() {
            Some(trial) => {
                self.load_trial(trial);
                self.enter(P::State::default(), now, sink)
            }
            None => {
                self.finish_block();
                Ok(())
            }
        }
    }

    fn cancel_trial(&mut self, now: Instant, sink: &mut dyn MarkerSink) -> Result<(), StateError> {
        self.abort_trial();
        self.mark(CANCEL_MARKER, sink);
        if let Some(index) = self.trials.current_index() {
            self.outbox.push(Notification::TrialCancelled {
                paradigm: P::NAME,
                index,
            });
        }
        self.next_trial(now, sink)
    }

    fn restart_trial(&mut self, now: Instant, sink: &mut dyn MarkerSink) -> Result<(), StateError> {
        self.abort_trial();
        self.mark(RESTART_MARKER, sink);
        if let Some(index) = self.trials.current_index() {
            self.outbox.push(Notification::TrialRestarted {
                paradigm: P::NAME,
                index,
            });
        }
        self.enter(P::State::default(), now, sink)
    }

    /// Stops everything in flight. Timers go first so none can fire after.
    fn abort_trial(&mut self) {
        self.timers.cancel_all();
        self.gate.clear();
        for presentation in self.paradigm.abort(self.state) {
            self.outbox.push(Notification::Present {
                paradigm: P::NAME,
                presentation,
            });
        }
    }

    fn is_abortable(&self) -> bool {
        self.running && !self.state.is_initial() && !self.state.is_terminal()
    }

    fn load_trial(&mut self, trial: P::Record) {
        self.trial = Some(trial);
        if let Some(index) = self.trials.current_index() {
            self.outbox.push(Notification::TrialStarted {
                paradigm: P::NAME,
                index,
            });
        }
    }

    fn finish_block(&mut self) {
        self.timers.cancel_all();
        self.gate.clear();
        self.enabled = false;
        self.running = false;
        self.state = P::State::default();
        self.trial = None;

        let more_blocks = self.trials.has_more_blocks();
        info!(paradigm = P::NAME, more_blocks, "block finished");
        self.outbox.push(Notification::BlockFinished {
            paradigm: P::NAME,
            more_blocks,
        });
    }

    fn mark(&mut self, label: &str, sink: &mut dyn MarkerSink) {
        match sink.mark(label) {
            Ok(_) => self.outbox.push(Notification::MarkerSent {
                label: label.to_string(),
            }),
            Err(err) => {
                warn!(paradigm = P::NAME, label, error = %err, "marker lost, trial continues");
                self.outbox.push(Notification::MarkerLost {
                    label: label.to_string(),
                    reason: err.to_string(),
                });
            }
        }
    }

    fn log_failure<T>(&self, result: Result<T, StateError>) -> Result<T, StateError> {
        if let Err(err) = &result {
            error!(paradigm = P::NAME, error = %err, "state machine invariant violated");
        }
        result
    }
}
