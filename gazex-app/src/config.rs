use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use gazex_experiment::SessionConfig;
use gazex_experiment::paradigm::{OrientationConfig, PlayingLadyConfig};
use gazex_gaze::{GateConfig, ScreenMapping, SimulatedGazeConfig, SmootherConfig};
use gazex_link::LinkConfig;
use serde::{Deserialize, Serialize};

use crate::cli::Cli;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub link: LinkSection,
    pub gaze: GazeSection,
    pub gate: GateConfig,
    pub tasks: TasksSection,
    pub journal: JournalSection,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("parse config {}", path.display()))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Command-line flags win over the file.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(participant) = cli.participant {
            self.tasks.participant = participant;
        }
        if cli.simulate {
            self.gaze.source = GazeSourceKind::Simulated;
        }
        if cli.offline {
            self.link.enabled = false;
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            participant: self.tasks.participant,
            order_dir: self.tasks.order_dir.clone(),
            start_delay_ms: self.tasks.start_delay_ms,
            pause_between_blocks_ms: self.tasks.pause_between_blocks_ms,
            gate: self.gate,
            orientation: self.tasks.orientation.clone(),
            playing_lady: self.tasks.playing_lady.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkSection {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub connect_timeout_ms: u64,
    pub max_sync_iterations: u32,
    pub sync_limit_ms: f64,
    pub end_settle_ms: u64,
    pub disconnect_settle_ms: u64,
    pub close_settle_ms: u64,
}

impl Default for LinkSection {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "10.0.0.42".to_string(),
            port: 55513,
            connect_timeout_ms: 5000,
            max_sync_iterations: 5,
            sync_limit_ms: 2.5,
            end_settle_ms: 500,
            disconnect_settle_ms: 1000,
            close_settle_ms: 500,
        }
    }
}

impl LinkSection {
    pub fn link_config(&self) -> LinkConfig {
        LinkConfig {
            max_sync_iterations: self.max_sync_iterations,
            sync_limit_ms: self.sync_limit_ms,
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            end_settle: Duration::from_millis(self.end_settle_ms),
            disconnect_settle: Duration::from_millis(self.disconnect_settle_ms),
            close_settle: Duration::from_millis(self.close_settle_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum GazeSourceKind {
    #[default]
    Simulated,
    /// JSON lines from a tracker server.
    JsonTcp,
    /// A recorded JSON-lines stream, replayed at the simulated interval.
    File,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GazeSection {
    pub source: GazeSourceKind,
    pub address: String,
    pub path: Option<PathBuf>,
    /// Raw by default: the simulated targets and the task regions are
    /// both in tracker coordinates, so switching to `Centered` means
    /// moving the regions too.
    pub mapping: ScreenMapping,
    #[serde(flatten)]
    pub smoothing: SmootherConfig,
    pub simulated: SimulatedGazeConfig,
}

impl Default for GazeSection {
    fn default() -> Self {
        Self {
            source: GazeSourceKind::Simulated,
            address: "127.0.0.1:8887".to_string(),
            path: None,
            mapping: ScreenMapping::Raw,
            smoothing: SmootherConfig::default(),
            simulated: SimulatedGazeConfig::default(),
        }
    }
}

/// How long the headless player pretends each clip part lasts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClipDurations {
    pub first_ms: u64,
    pub second_ms: u64,
}

impl Default for ClipDurations {
    fn default() -> Self {
        Self {
            first_ms: 4000,
            second_ms: 3000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TasksSection {
    pub participant: u32,
    pub order_dir: PathBuf,
    pub start_delay_ms: u64,
    pub pause_between_blocks_ms: u64,
    pub tick_ms: u64,
    pub orientation: OrientationConfig,
    pub playing_lady: PlayingLadyConfig,
    pub clips: ClipDurations,
}

impl Default for TasksSection {
    fn default() -> Self {
        let session = SessionConfig::default();
        Self {
            participant: session.participant,
            order_dir: session.order_dir,
            start_delay_ms: session.start_delay_ms,
            pause_between_blocks_ms: session.pause_between_blocks_ms,
            tick_ms: 5,
            orientation: session.orientation,
            playing_lady: session.playing_lady,
            clips: ClipDurations::default(),
        }
    }
}

impl TasksSection {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalSection {
    pub enabled: bool,
    pub dir: PathBuf,
}

impl Default for JournalSection {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: PathBuf::from("log"),
        }
    }
}
