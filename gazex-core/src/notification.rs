use crate::presentation::Presentation;

/// Events produced for the display and journal collaborators.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// Order files loaded, recording may begin.
    SessionReady {
        participant: u32,
    },
    TasksStarted,
    BaselineStarted,
    BaselineStopped,
    SessionFinished,
    FixationAchieved {
        paradigm: &'static str,
    },
    StateChanged {
        paradigm: &'static str,
        state: &'static str,
        trial: Option<String>,
    },
    BlockStarted {
        paradigm: &'static str,
    },
    TrialStarted {
        paradigm: &'static str,
        index: usize,
    },
    TrialFinished {
        paradigm: &'static str,
        index: usize,
    },
    TrialCancelled {
        paradigm: &'static str,
        index: usize,
    },
    TrialRestarted {
        paradigm: &'static str,
        index: usize,
    },
    BlockFinished {
        paradigm: &'static str,
        more_blocks: bool,
    },
    Present {
        paradigm: &'static str,
        presentation: Presentation,
    },
    MarkerSent {
        label: String,
    },
    MarkerLost {
        label: String,
        reason: String,
    },
}

impl Notification {
    /// Short title used by the session journal.
    pub fn title(&self) -> &'static str {
        match self {
            Notification::SessionReady { .. } => "Ready",
            Notification::TasksStarted => "Tasks",
            Notification::BaselineStarted | Notification::BaselineStopped => "Baseline",
            Notification::SessionFinished => "Finished",
            Notification::FixationAchieved { .. } => "Fixation",
            Notification::StateChanged { .. } => "State",
            Notification::BlockStarted { .. } => "Block",
            Notification::TrialStarted { .. } => "Trial",
            Notification::TrialFinished { .. } => "TrialFinished",
            Notification::TrialCancelled { .. } => "Cancel",
            Notification::TrialRestarted { .. } => "Restart",
            Notification::BlockFinished { .. } => "BlockFinished",
            Notification::Present { .. } => "Present",
            Notification::MarkerSent { .. } => "HR",
            Notification::MarkerLost { .. } => "Error",
        }
    }

    /// Human-readable description used by the session journal.
    pub fn describe(&self) -> String {
        match self {
            Notification::SessionReady { participant } => format!("participant {participant}"),
            Notification::TasksStarted => "Tasks started".to_string(),
            Notification::BaselineStarted => "Baseline started".to_string(),
            Notification::BaselineStopped => "Baseline stopped".to_string(),
            Notification::SessionFinished => "Finished".to_string(),
            Notification::FixationAchieved { paradigm } => format!("{paradigm} focused"),
            Notification::StateChanged {
                paradigm,
                state,
                trial,
            } => match trial {
                Some(trial) => format!("{paradigm} {state} {trial}"),
                None => format!("{paradigm} {state}"),
            },
            Notification::BlockStarted { paradigm } => format!("Block {paradigm}"),
            Notification::TrialStarted { index, .. } => format!("Trial {}", index + 1),
            Notification::TrialFinished { index, .. } => format!("Trial {} finished", index + 1),
            Notification::TrialCancelled { index, .. } => format!("Trial {} cancelled", index + 1),
            Notification::TrialRestarted { index, .. } => format!("Trial {} restarted", index + 1),
            Notification::BlockFinished {
                paradigm,
                more_blocks,
            } => format!("{paradigm} block finished, more blocks: {more_blocks}"),
            Notification::Present {
                presentation,
                ..
            } => format!("{presentation:?}"),
            Notification::MarkerSent { label } => label.clone(),
            Notification::MarkerLost { label, reason } => format!("marker {label} lost: {reason}"),
        }
    }
}
