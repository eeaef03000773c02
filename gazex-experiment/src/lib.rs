pub mod journal;
pub mod machine;
pub mod paradigm;
pub mod session;
pub mod trials;

pub use journal::SessionJournal;
pub use machine::{CANCEL_MARKER, RESTART_MARKER, StateError, TaskInput, TaskStateMachine, TimerAction};
pub use session::{
    ControlEvent, OperatorCommand, Presenter, Session, SessionConfig, SessionError, SessionPhase,
    BASELINE_START_MARKER, BASELINE_STOP_MARKER, TASKS_MARKER, order_path,
};
pub use trials::{LoadError, ParseError, ParseErrorKind, TrialRecord, TrialSequence};
