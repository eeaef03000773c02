use std::time::{Duration, Instant};

use gazex_core::{Notification, Presentation};
use gazex_experiment::{ControlEvent, Presenter};
use tracing::{debug, info};

use crate::config::ClipDurations;

/// Stands in for the stimulus display: logs what would be shown and
/// reports clip ends after the configured durations.
pub struct HeadlessPresenter {
    clips: ClipDurations,
    clip_ends_at: Option<Instant>,
}

impl HeadlessPresenter {
    pub fn new(clips: ClipDurations) -> Self {
        Self {
            clips,
            clip_ends_at: None,
        }
    }

    pub fn clip_playing(&self) -> bool {
        self.clip_ends_at.is_some()
    }

    fn present(&mut self, presentation: &Presentation, now: Instant) {
        match presentation {
            Presentation::PlayFirstClip(_) => {
                self.clip_ends_at = Some(now + Duration::from_millis(self.clips.first_ms));
            }
            Presentation::PlaySecondClip => {
                self.clip_ends_at = Some(now + Duration::from_millis(self.clips.second_ms));
            }
            Presentation::StopClip => self.clip_ends_at = None,
            _ => {}
        }
        info!(?presentation, "present");
    }
}

impl Presenter for HeadlessPresenter {
    fn notify(&mut self, notification: &Notification, now: Instant) {
        match notification {
            Notification::Present { presentation, .. } => self.present(presentation, now),
            Notification::StateChanged { .. } | Notification::MarkerSent { .. } => {
                debug!(note = %notification.describe(), "session");
            }
            Notification::SessionReady { .. } => {
                println!("Ready, {}: press s to start the tasks.", notification.describe());
            }
            Notification::BlockStarted { .. } => {
                println!("{}: press s to start.", notification.describe());
            }
            _ => println!("{}", notification.describe()),
        }
    }

    fn poll(&mut self, now: Instant) -> Vec<ControlEvent> {
        match self.clip_ends_at {
            Some(due) if due <= now => {
                self.clip_ends_at = None;
                vec![ControlEvent::MediaFinished]
            }
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn present(presentation: Presentation) -> Notification {
        Notification::Present {
            paradigm: "PlayingLady",
            presentation,
        }
    }

    #[test]
    fn clip_end_is_reported_once() {
        let t0 = Instant::now();
        let mut presenter = HeadlessPresenter::new(ClipDurations {
            first_ms: 100,
            second_ms: 50,
        });
        presenter.notify(&present(Presentation::PlayFirstClip("clip".into())), t0);

        assert!(presenter.poll(t0 + Duration::from_millis(99)).is_empty());
        assert_eq!(
            presenter.poll(t0 + Duration::from_millis(100)),
            [ControlEvent::MediaFinished]
        );
        assert!(presenter.poll(t0 + Duration::from_millis(500)).is_empty());
    }

    #[test]
    fn stopped_clip_never_reports() {
        let t0 = Instant::now();
        let mut presenter = HeadlessPresenter::new(ClipDurations::default());
        presenter.notify(&present(Presentation::PlaySecondClip), t0);
        assert!(presenter.clip_playing());
        presenter.notify(&present(Presentation::StopClip), t0);

        assert!(!presenter.clip_playing());
        assert!(presenter.poll(t0 + Duration::from_secs(60)).is_empty());
    }
}
