use tracing::warn;

pub const VERSION_QUERY: &[u8] = b"QMAC-";
pub const VERSION_REFUSED: u8 = b'F';
pub const VERSION_INFO: u8 = b'I';

pub const BEGIN: u8 = b'B';
pub const END: u8 = b'E';
pub const DISCONNECT: u8 = b'X';
pub const ALIGN: u8 = b'A';
pub const TIMESTAMP: u8 = b'T';
pub const EVENT: u8 = b'D';

/// Size field carried by every event frame.
pub const EVENT_DATA_SIZE: i16 = 15;
/// Leading `D` plus the event body.
pub const MARKER_FRAME_LEN: usize = 18;

/// Accepted version bytes: binary one or ASCII `'1'`.
pub fn is_supported_version(version: u8) -> bool {
    version == 1 || version == b'1'
}

/// Four ASCII bytes, space-padded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label([u8; 4]);

impl Label {
    /// Encodes `text`, returning the label and whether it had to be cut.
    /// Non-ASCII characters become `?`.
    pub fn encode(text: &str) -> (Label, bool) {
        let mut bytes = [b' '; 4];
        let mut count = 0;
        for (slot, ch) in bytes.iter_mut().zip(text.chars()) {
            *slot = if ch.is_ascii() { ch as u8 } else { b'?' };
            count += 1;
        }
        let truncated = text.chars().count() > count;
        (Label(bytes), truncated)
    }

    /// Encodes `text`, logging a warning when it is longer than four characters.
    pub fn lossy(text: &str) -> Label {
        let (label, truncated) = Label::encode(text);
        if truncated {
            warn!(text, label = label.as_str(), "marker labels are 4 characters max, truncated");
        }
        label
    }

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("????")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Marker {
    pub relative_ms: i32,
    pub duration_ms: u32,
    pub label: Label,
}

impl Marker {
    pub fn new(label: Label, relative_ms: i32, duration_ms: u32) -> Self {
        Self {
            relative_ms,
            duration_ms,
            label,
        }
    }

    /// `D`, size, timestamp, duration, label, zero key count, zero terminator.
    pub fn to_bytes(&self) -> [u8; MARKER_FRAME_LEN] {
        let mut frame = [0u8; MARKER_FRAME_LEN];
        frame[0] = EVENT;
        frame[1..3].copy_from_slice(&EVENT_DATA_SIZE.to_be_bytes());
        frame[3..7].copy_from_slice(&self.relative_ms.to_be_bytes());
        frame[7..11].copy_from_slice(&self.duration_ms.to_be_bytes());
        frame[11..15].copy_from_slice(self.label.as_bytes());
        frame[15..17].copy_from_slice(&0i16.to_be_bytes());
        frame[17] = 0;
        frame
    }
}

/// `T` followed by the sender's elapsed milliseconds.
pub fn timestamp_frame(elapsed_ms: i32) -> [u8; 5] {
    let mut frame = [0u8; 5];
    frame[0] = TIMESTAMP;
    frame[1..].copy_from_slice(&elapsed_ms.to_be_bytes());
    frame
}
