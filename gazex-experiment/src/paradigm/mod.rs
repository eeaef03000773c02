//! Paradigm definitions plugged into [`crate::TaskStateMachine`].

pub mod orientation;
pub mod playing_lady;

use std::time::Duration;

use gazex_core::{Presentation, TaskState, TrackedRegion};

use crate::trials::TrialRecord;

pub use orientation::{Orientation, OrientationConfig, OrientationState, OrientationTrial};
pub use playing_lady::{PlayingLady, PlayingLadyConfig, PlayingLadyState, PlayingLadyTrial};

/// What entering a state does to the fixation gate.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum RegionChange {
    #[default]
    Keep,
    Track(TrackedRegion),
    Clear,
}

/// Side effects of entering a state, applied in field order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Entry {
    pub region: RegionChange,
    pub presentations: Vec<Presentation>,
    pub marker: Option<String>,
    /// Arms a timer that advances to the next state.
    pub advance_after: Option<Duration>,
}

/// Reaction to the gate's focused signal. The region is always cleared.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FocusReaction {
    pub marker: Option<&'static str>,
    /// Replaces any pending advance timer.
    pub advance_after: Option<Duration>,
}

pub trait Paradigm: Send {
    type State: TaskState;
    type Record: TrialRecord;

    const NAME: &'static str;
    const BLOCK_SIZE: usize;
    /// Order file name, after the participant prefix.
    const ORDER_FILE: &'static str;

    fn enter(&self, state: Self::State, trial: &Self::Record) -> Entry;

    /// States in which the operator's advance signal is honored.
    fn accepts_advance(&self, state: Self::State) -> bool;

    fn on_focus(&self, state: Self::State) -> FocusReaction;

    fn advances_on_media_finished(&self, _state: Self::State) -> bool {
        false
    }

    /// Presentations to take down when a trial is aborted in `state`.
    fn abort(&self, state: Self::State) -> Vec<Presentation>;

    fn inter_trial_interval(&self) -> Duration;
}

/// First character of a vocabulary token, as used in marker labels.
pub(crate) fn initial(token: &str) -> char {
    token.chars().next().unwrap_or('?')
}
