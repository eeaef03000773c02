//! Playing-lady paradigm: a two-part clip of a woman playing with a toy
//! car, with a pause in between that waits for the participant to look at
//! her face.

use std::time::Duration;

use gazex_core::{Presentation, TaskState, TrackedRegion};
use serde::{Deserialize, Serialize};

use super::{Entry, FocusReaction, Paradigm, RegionChange, initial};
use crate::trials::{ParseErrorKind, TrialRecord};

pub const SLIDES: [u8; 2] = [1, 2];
pub const CAR_RUNS: [u8; 3] = [1, 2, 3];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LadyGaze {
    Down,
    Averted,
    Straight,
}

impl LadyGaze {
    pub fn as_token(&self) -> &'static str {
        match self {
            Self::Down => "down",
            Self::Averted => "averted",
            Self::Straight => "straight",
        }
    }

    pub fn from_token(s: &str) -> Option<Self> {
        match s {
            "down" => Some(Self::Down),
            "averted" => Some(Self::Averted),
            "straight" => Some(Self::Straight),
            _ => None,
        }
    }

    fn marker_prefix(&self) -> &'static str {
        match self {
            Self::Straight => "Di",
            Self::Down => "Do",
            Self::Averted => "Av",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CarDirection {
    Left,
    Right,
}

impl CarDirection {
    pub fn as_token(&self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }

    pub fn from_token(s: &str) -> Option<Self> {
        match s {
            "left" => Some(Self::Left),
            "right" => Some(Self::Right),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CarColor {
    Red,
    Blue,
}

impl CarColor {
    pub fn as_token(&self) -> &'static str {
        match self {
            Self::Red => "red",
            Self::Blue => "blue",
        }
    }

    pub fn from_token(s: &str) -> Option<Self> {
        match s {
            "red" => Some(Self::Red),
            "blue" => Some(Self::Blue),
            _ => None,
        }
    }
}

/// `gaze_direction_slide_color_runs`, e.g. `straight_left_1_red_2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayingLadyTrial {
    pub gaze: LadyGaze,
    pub direction: CarDirection,
    pub slide: u8,
    pub color: CarColor,
    pub runs: u8,
}

impl PlayingLadyTrial {
    pub fn clip(&self) -> String {
        format!(
            "{}_{}_{}_{}_{}",
            self.gaze.as_token(),
            self.direction.as_token(),
            self.slide,
            self.color.as_token(),
            self.runs
        )
    }
}

fn unknown(column: &'static str, token: &str) -> ParseErrorKind {
    ParseErrorKind::UnknownToken {
        column,
        token: token.to_string(),
    }
}

fn number_in(column: &'static str, token: &str, allowed: &[u8]) -> Result<u8, ParseErrorKind> {
    token
        .parse::<u8>()
        .ok()
        .filter(|n| allowed.contains(n))
        .ok_or_else(|| unknown(column, token))
}

impl TrialRecord for PlayingLadyTrial {
    const FIELD_COUNT: usize = 5;

    fn from_fields(fields: &[&str]) -> Result<Self, ParseErrorKind> {
        Ok(Self {
            gaze: LadyGaze::from_token(fields[0]).ok_or_else(|| unknown("gaze direction", fields[0]))?,
            direction: CarDirection::from_token(fields[1]).ok_or_else(|| unknown("car direction", fields[1]))?,
            slide: number_in("slide", fields[2], &SLIDES)?,
            color: CarColor::from_token(fields[3]).ok_or_else(|| unknown("car color", fields[3]))?,
            runs: number_in("car run count", fields[4], &CAR_RUNS)?,
        })
    }

    fn describe(&self) -> String {
        self.clip()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayingLadyState {
    #[default]
    NotStarted,
    First,
    WaitingFaceGazed,
    Second,
    Finished,
}

impl TaskState for PlayingLadyState {
    fn next(&self) -> Option<Self> {
        match self {
            Self::NotStarted => Some(Self::First),
            Self::First => Some(Self::WaitingFaceGazed),
            Self::WaitingFaceGazed => Some(Self::Second),
            Self::Second => Some(Self::Finished),
            Self::Finished => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::NotStarted => "NotStarted",
            Self::First => "First",
            Self::WaitingFaceGazed => "WaitingFaceGazed",
            Self::Second => "Second",
            Self::Finished => "Finished",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayingLadyConfig {
    pub head_area: TrackedRegion,
    /// Longest pause before the second part starts without a face fixation.
    pub face_wait_ms: u64,
    /// Delay between the face fixation and the second part.
    pub face_dwell_ms: u64,
    pub inter_trial_ms: u64,
}

impl Default for PlayingLadyConfig {
    fn default() -> Self {
        Self {
            head_area: TrackedRegion::new(-150.0, 50.0, 150.0, 350.0),
            face_wait_ms: 5000,
            face_dwell_ms: 300,
            inter_trial_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PlayingLady {
    pub config: PlayingLadyConfig,
}

impl PlayingLady {
    pub fn new(config: PlayingLadyConfig) -> Self {
        Self { config }
    }
}

pub const FACE_FIXATION_MARKER: &str = "FAOI";

impl Paradigm for PlayingLady {
    type State = PlayingLadyState;
    type Record = PlayingLadyTrial;

    const NAME: &'static str = "PlayingLady";
    const BLOCK_SIZE: usize = 3;
    const ORDER_FILE: &'static str = "playinglady.txt";

    fn enter(&self, state: PlayingLadyState, trial: &PlayingLadyTrial) -> Entry {
        match state {
            PlayingLadyState::NotStarted => Entry::default(),
            PlayingLadyState::First => Entry {
                region: RegionChange::Keep,
                presentations: vec![Presentation::PlayFirstClip(trial.clip())],
                marker: Some(format!("Lst{}", trial.runs)),
                advance_after: None,
            },
            PlayingLadyState::WaitingFaceGazed => Entry {
                region: RegionChange::Track(self.config.head_area),
                presentations: Vec::new(),
                marker: Some("Lpau".to_string()),
                advance_after: Some(Duration::from_millis(self.config.face_wait_ms)),
            },
            // The head area stays tracked when the pause timed out, so a
            // late fixation is still marked.
            PlayingLadyState::Second => Entry {
                region: RegionChange::Keep,
                presentations: vec![Presentation::PlaySecondClip],
                marker: Some(format!(
                    "{}{}{}",
                    trial.gaze.marker_prefix(),
                    trial.slide,
                    initial(trial.direction.as_token())
                )),
                advance_after: None,
            },
            PlayingLadyState::Finished => Entry {
                region: RegionChange::Clear,
                presentations: vec![Presentation::StopClip],
                marker: None,
                advance_after: None,
            },
        }
    }

    fn accepts_advance(&self, state: PlayingLadyState) -> bool {
        state == PlayingLadyState::NotStarted
    }

    fn on_focus(&self, state: PlayingLadyState) -> FocusReaction {
        match state {
            PlayingLadyState::WaitingFaceGazed => FocusReaction {
                marker: Some(FACE_FIXATION_MARKER),
                advance_after: Some(Duration::from_millis(self.config.face_dwell_ms)),
            },
            PlayingLadyState::Second => FocusReaction {
                marker: Some(FACE_FIXATION_MARKER),
                advance_after: None,
            },
            _ => FocusReaction::default(),
        }
    }

    fn advances_on_media_finished(&self, state: PlayingLadyState) -> bool {
        matches!(state, PlayingLadyState::First | PlayingLadyState::Second)
    }

    fn abort(&self, state: PlayingLadyState) -> Vec<Presentation> {
        match state {
            PlayingLadyState::NotStarted => Vec::new(),
            _ => vec![Presentation::StopClip],
        }
    }

    fn inter_trial_interval(&self) -> Duration {
        Duration::from_millis(self.config.inter_trial_ms)
    }
}
