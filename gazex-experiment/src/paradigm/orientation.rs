//! Orientation paradigm: an attention grabber, then a face looking down
//! and up again, either straight at the participant or away.

use std::time::Duration;

use gazex_core::{Presentation, TaskState, TrackedRegion};
use serde::{Deserialize, Serialize};

use super::{Entry, FocusReaction, Paradigm, RegionChange, initial};
use crate::trials::{ParseErrorKind, TrialRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Anne,
    Jerita,
    Karoliina,
    OneClock,
    TwoClock,
    ThreeClock,
}

impl Actor {
    pub fn as_token(&self) -> &'static str {
        match self {
            Self::Anne => "anne",
            Self::Jerita => "jerita",
            Self::Karoliina => "karoliina",
            Self::OneClock => "1clock",
            Self::TwoClock => "2clock",
            Self::ThreeClock => "3clock",
        }
    }

    pub fn from_token(s: &str) -> Option<Self> {
        match s {
            "anne" => Some(Self::Anne),
            "jerita" => Some(Self::Jerita),
            "karoliina" => Some(Self::Karoliina),
            "1clock" => Some(Self::OneClock),
            "2clock" => Some(Self::TwoClock),
            "3clock" => Some(Self::ThreeClock),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadDirection {
    Left,
    Right,
}

impl HeadDirection {
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
pub enum GazeDirection {
    Straight,
    Averted,
    Forward,
    Backward,
}

impl GazeDirection {
    pub fn as_token(&self) -> &'static str {
        match self {
            Self::Straight => "straight",
            Self::Averted => "averted",
            Self::Forward => "forward",
            Self::Backward => "backward",
        }
    }

    pub fn from_token(s: &str) -> Option<Self> {
        match s {
            "straight" => Some(Self::Straight),
            "averted" => Some(Self::Averted),
            "forward" => Some(Self::Forward),
            "backward" => Some(Self::Backward),
            _ => None,
        }
    }

    /// Only a straight gaze meets the participant's eyes.
    pub fn is_direct(&self) -> bool {
        matches!(self, Self::Straight)
    }
}

/// `actor_head_gaze`, e.g. `anne_left_straight`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrientationTrial {
    pub actor: Actor,
    pub head: HeadDirection,
    pub gaze: GazeDirection,
}

impl OrientationTrial {
    fn face(&self) -> String {
        format!("{}-{}", self.actor.as_token(), self.head.as_token())
    }

    /// Actor initial (upper case) and head initial, e.g. `Al`.
    fn label_suffix(&self) -> String {
        format!(
            "{}{}",
            initial(self.actor.as_token()).to_ascii_uppercase(),
            initial(self.head.as_token())
        )
    }
}

fn unknown(column: &'static str, token: &str) -> ParseErrorKind {
    ParseErrorKind::UnknownToken {
        column,
        token: token.to_string(),
    }
}

impl TrialRecord for OrientationTrial {
    const FIELD_COUNT: usize = 3;

    fn from_fields(fields: &[&str]) -> Result<Self, ParseErrorKind> {
        Ok(Self {
            actor: Actor::from_token(fields[0]).ok_or_else(|| unknown("actor", fields[0]))?,
            head: HeadDirection::from_token(fields[1]).ok_or_else(|| unknown("head direction", fields[1]))?,
            gaze: GazeDirection::from_token(fields[2]).ok_or_else(|| unknown("gaze direction", fields[2]))?,
        })
    }

    fn describe(&self) -> String {
        format!(
            "{}_{}_{}",
            self.actor.as_token(),
            self.head.as_token(),
            self.gaze.as_token()
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrientationState {
    #[default]
    NotStarted,
    AttentionGrabber,
    GazeDown,
    GazeUp,
    Finished,
}

impl TaskState for OrientationState {
    fn next(&self) -> Option<Self> {
        match self {
            Self::NotStarted => Some(Self::AttentionGrabber),
            Self::AttentionGrabber => Some(Self::GazeDown),
            Self::GazeDown => Some(Self::GazeUp),
            Self::GazeUp => Some(Self::Finished),
            Self::Finished => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::NotStarted => "NotStarted",
            Self::AttentionGrabber => "AttentionGrabber",
            Self::GazeDown => "GazeDown",
            Self::GazeUp => "GazeUp",
            Self::Finished => "Finished",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrientationConfig {
    pub attention_grabber: TrackedRegion,
    /// Delay between fixating the grabber and the face appearing.
    pub grabber_dwell_ms: u64,
    pub gaze_down_ms: u64,
    pub gaze_up_ms: u64,
    pub inter_trial_ms: u64,
}

impl Default for OrientationConfig {
    fn default() -> Self {
        Self {
            attention_grabber: TrackedRegion::new(-100.0, -100.0, 100.0, 100.0),
            grabber_dwell_ms: 1000,
            gaze_down_ms: 2000,
            gaze_up_ms: 3000,
            inter_trial_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Orientation {
    pub config: OrientationConfig,
}

impl Orientation {
    pub fn new(config: OrientationConfig) -> Self {
        Self { config }
    }
}

impl Paradigm for Orientation {
    type State = OrientationState;
    type Record = OrientationTrial;

    const NAME: &'static str = "Orientation";
    const BLOCK_SIZE: usize = 3;
    const ORDER_FILE: &'static str = "orientation.txt";

    fn enter(&self, state: OrientationState, trial: &OrientationTrial) -> Entry {
        match state {
            OrientationState::NotStarted => Entry::default(),
            OrientationState::AttentionGrabber => Entry {
                region: RegionChange::Track(self.config.attention_grabber),
                presentations: vec![Presentation::ShowAttentionGrabber],
                marker: Some("AtGr".to_string()),
                advance_after: None,
            },
            OrientationState::GazeDown => Entry {
                region: RegionChange::Clear,
                presentations: vec![
                    Presentation::HideAttentionGrabber,
                    Presentation::ShowImage(format!("{}-down", trial.face())),
                ],
                marker: Some(format!("Do{}", trial.label_suffix())),
                advance_after: Some(Duration::from_millis(self.config.gaze_down_ms)),
            },
            OrientationState::GazeUp => {
                let prefix = if trial.gaze.is_direct() { "Di" } else { "Av" };
                Entry {
                    region: RegionChange::Keep,
                    presentations: vec![Presentation::ShowImage(format!(
                        "{}-up-{}",
                        trial.face(),
                        initial(trial.gaze.as_token())
                    ))],
                    marker: Some(format!("{prefix}{}", trial.label_suffix())),
                    advance_after: Some(Duration::from_millis(self.config.gaze_up_ms)),
                }
            }
            OrientationState::Finished => Entry {
                region: RegionChange::Clear,
                presentations: vec![Presentation::HideImage],
                marker: None,
                advance_after: None,
            },
        }
    }

    fn accepts_advance(&self, state: OrientationState) -> bool {
        matches!(
            state,
            OrientationState::NotStarted | OrientationState::AttentionGrabber
        )
    }

    fn on_focus(&self, state: OrientationState) -> FocusReaction {
        match state {
            OrientationState::AttentionGrabber => FocusReaction {
                marker: None,
                advance_after: Some(Duration::from_millis(self.config.grabber_dwell_ms)),
            },
            _ => FocusReaction::default(),
        }
    }

    fn abort(&self, state: OrientationState) -> Vec<Presentation> {
        match state {
            OrientationState::AttentionGrabber => vec![Presentation::HideAttentionGrabber],
            OrientationState::GazeDown | OrientationState::GazeUp => vec![Presentation::HideImage],
            _ => Vec::new(),
        }
    }

    fn inter_trial_interval(&self) -> Duration {
        Duration::from_millis(self.config.inter_trial_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trial(line: &str) -> OrientationTrial {
        let fields: Vec<&str> = line.split('_').collect();
        OrientationTrial::from_fields(&fields).unwrap()
    }

    #[test]
    fn parses_vocabulary() {
        let t = trial("1clock_right_backward");
        assert_eq!(t.actor, Actor::OneClock);
        assert_eq!(t.head, HeadDirection::Right);
        assert_eq!(t.gaze, GazeDirection::Backward);
        assert_eq!(t.describe(), "1clock_right_backward");
    }

    #[test]
    fn rejects_unknown_actor() {
        let err = OrientationTrial::from_fields(&["bob", "left", "straight"]).unwrap_err();
        assert_eq!(
            err,
            ParseErrorKind::UnknownToken {
                column: "actor",
                token: "bob".into()
            }
        );
    }

    #[test]
    fn marker_labels() {
        let paradigm = Orientation::default();
        let direct = trial("anne_left_straight");
        let averted = trial("karoliina_right_averted");
        let clock = trial("2clock_left_forward");

        let label = |state, t: &OrientationTrial| paradigm.enter(state, t).marker;
        assert_eq!(label(OrientationState::AttentionGrabber, &direct), Some("AtGr".into()));
        assert_eq!(label(OrientationState::GazeDown, &direct), Some("DoAl".into()));
        assert_eq!(label(OrientationState::GazeUp, &direct), Some("DiAl".into()));
        assert_eq!(label(OrientationState::GazeUp, &averted), Some("AvKr".into()));
        assert_eq!(label(OrientationState::GazeUp, &clock), Some("Av2l".into()));
        assert_eq!(label(OrientationState::NotStarted, &direct), None);
        assert_eq!(label(OrientationState::Finished, &direct), None);
    }

    #[test]
    fn images_follow_the_trial() {
        let paradigm = Orientation::default();
        let t = trial("jerita_right_averted");
        assert_eq!(
            paradigm.enter(OrientationState::GazeUp, &t).presentations,
            vec![Presentation::ShowImage("jerita-right-up-a".into())]
        );
    }

    #[test]
    fn state_graph() {
        let mut state = OrientationState::default();
        let mut names = vec![state.name()];
        while let Some(next) = state.next() {
            state = next;
            names.push(state.name());
        }
        assert_eq!(
            names,
            ["NotStarted", "AttentionGrabber", "GazeDown", "GazeUp", "Finished"]
        );
        assert!(state.is_terminal());
    }
}
