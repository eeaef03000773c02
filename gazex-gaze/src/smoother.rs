use std::collections::VecDeque;

use gazex_core::{GazeSample, SmoothedPoint};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmootherConfig {
    /// Displacement between consecutive raw points above which the
    /// saccade regime is entered.
    pub saccade_threshold_px: f32,
    /// Raw points older than this are dropped from the averaging window.
    pub time_window_ms: u64,
    /// Time constant of the fixation damping.
    pub damp_fixation_ms: f64,
}

impl Default for SmootherConfig {
    fn default() -> Self {
        Self {
            saccade_threshold_px: 30.0,
            time_window_ms: 150,
            damp_fixation_ms: 700.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Regime {
    Fixation,
    Saccade,
}

impl Regime {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fixation => "fixation",
            Self::Saccade => "saccade",
        }
    }
}

/// Saccade-aware smoothing filter.
///
/// A displacement strictly greater than the threshold is a saccade: the
/// raw point passes through and the window restarts from it. Anything
/// else, including a displacement exactly at the threshold, is fixation:
/// the output moves toward the window mean by `1 - exp(-dt / damp)`.
#[derive(Debug, Clone)]
pub struct Smoother {
    config: SmootherConfig,
    window: VecDeque<GazeSample>,
    last_raw: Option<GazeSample>,
    output: Option<SmoothedPoint>,
    regime: Regime,
}

impl Smoother {
    pub fn new(config: SmootherConfig) -> Self {
        Self {
            config,
            window: VecDeque::new(),
            last_raw: None,
            output: None,
            regime: Regime::Fixation,
        }
    }

    pub fn config(&self) -> &SmootherConfig {
        &self.config
    }

    pub fn regime(&self) -> Regime {
        self.regime
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    /// Feeds one raw point. Timestamps must not decrease.
    pub fn feed(&mut self, sample: GazeSample) -> SmoothedPoint {
        let raw = SmoothedPoint::new(sample.timestamp, sample.x, sample.y);

        let Some(previous) = self.last_raw.replace(sample) else {
            self.window.push_back(sample);
            self.output = Some(raw);
            return raw;
        };

        let displacement = ((sample.x - previous.x).powi(2) + (sample.y - previous.y).powi(2)).sqrt();
        if displacement > self.config.saccade_threshold_px {
            self.set_regime(Regime::Saccade, displacement);
            self.window.clear();
            self.window.push_back(sample);
            self.output = Some(raw);
            return raw;
        }
        self.set_regime(Regime::Fixation, displacement);

        self.window.push_back(sample);
        while let Some(oldest) = self.window.front() {
            if sample.timestamp.saturating_sub(oldest.timestamp) > self.config.time_window_ms {
                self.window.pop_front();
            } else {
                break;
            }
        }

        let n = self.window.len() as f32;
        let mean_x = self.window.iter().map(|s| s.x).sum::<f32>() / n;
        let mean_y = self.window.iter().map(|s| s.y).sum::<f32>() / n;

        let prev = self.output.unwrap_or(raw);
        let dt = sample.timestamp.saturating_sub(prev.timestamp) as f64;
        let alpha = if self.config.damp_fixation_ms <= 0.0 {
            1.0
        } else {
            (1.0 - (-dt / self.config.damp_fixation_ms).exp()) as f32
        };

        let point = SmoothedPoint::new(
            sample.timestamp,
            prev.x + alpha * (mean_x - prev.x),
            prev.y + alpha * (mean_y - prev.y),
        );
        self.output = Some(point);
        point
    }

    pub fn reset(&mut self) {
        self.window.clear();
        self.last_raw = None;
        self.output = None;
        self.regime = Regime::Fixation;
    }

    fn set_regime(&mut self, regime: Regime, displacement: f32) {
        if self.regime != regime {
            debug!(from = self.regime.as_str(), to = regime.as_str(), displacement, "gaze regime changed");
            self.regime = regime;
        }
    }
}

impl Default for Smoother {
    fn default() -> Self {
        Self::new(SmootherConfig::default())
    }
}
