/// What the stimulus collaborator should put on screen or play.
#[derive(Debug, Clone, PartialEq)]
pub enum Presentation {
    ShowAttentionGrabber,
    HideAttentionGrabber,
    ShowImage(String),
    HideImage,
    /// Loads the clip pair and starts the first part.
    PlayFirstClip(String),
    PlaySecondClip,
    StopClip,
}

impl Presentation {
    /// Whether the collaborator reports back with a media-finished signal.
    pub fn awaits_media_finished(&self) -> bool {
        matches!(self, Presentation::PlayFirstClip(_) | Presentation::PlaySecondClip)
    }
}
