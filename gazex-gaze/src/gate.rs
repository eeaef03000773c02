use gazex_core::{SmoothedPoint, TrackedRegion};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_THRESHOLD: u32 = 6;
/// Threshold of the slower, more conservative gate revision.
pub const EXTENDED_THRESHOLD: u32 = 18;

/// What an out-of-region sample does to the dwell counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DwellPolicy {
    /// Decrement, never below zero.
    #[default]
    Clamped,
    /// Decrement without bound; a run of `k` outside samples needs `k`
    /// extra inside samples to be paid back.
    Unclamped,
}

impl DwellPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clamped => "clamped",
            Self::Unclamped => "unclamped",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "clamped" => Some(Self::Clamped),
            "unclamped" => Some(Self::Unclamped),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub threshold: u32,
    pub policy: DwellPolicy,
    /// Count again after firing instead of waiting for a new region.
    pub rearm: bool,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            policy: DwellPolicy::Clamped,
            rearm: false,
        }
    }
}

/// Dwell counter over one tracked region.
#[derive(Debug, Clone, Default)]
pub struct FixationGate {
    config: GateConfig,
    region: Option<TrackedRegion>,
    count: i64,
    focused: bool,
}

impl FixationGate {
    pub fn new(config: GateConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Starts a new episode on `region`, or disables detection with `None`.
    /// Either way the counter and the focused flag are reset.
    pub fn set_tracked_region(&mut self, region: Option<TrackedRegion>) {
        self.region = region;
        self.count = 0;
        self.focused = false;
    }

    pub fn clear(&mut self) {
        self.set_tracked_region(None);
    }

    pub fn region(&self) -> Option<TrackedRegion> {
        self.region
    }

    pub fn is_tracking(&self) -> bool {
        self.region.is_some()
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    pub fn dwell_count(&self) -> i64 {
        self.count
    }

    /// Returns `true` exactly when this sample completes the dwell.
    pub fn on_sample(&mut self, point: &SmoothedPoint) -> bool {
        let Some(region) = self.region else {
            return false;
        };
        if self.focused {
            return false;
        }

        let next = self.count + if region.contains(point) { 1 } else { -1 };
        if next >= i64::from(self.config.threshold) {
            debug!(threshold = self.config.threshold, x = point.x, y = point.y, "fixation achieved");
            self.count = 0;
            self.focused = !self.config.rearm;
            return true;
        }

        self.count = match self.config.policy {
            DwellPolicy::Clamped => next.max(0),
            DwellPolicy::Unclamped => next,
        };
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INSIDE: SmoothedPoint = SmoothedPoint {
        timestamp: 0,
        x: 0.0,
        y: 0.0,
    };
    const OUTSIDE: SmoothedPoint = SmoothedPoint {
        timestamp: 0,
        x: 500.0,
        y: 0.0,
    };

    fn square_gate(policy: DwellPolicy, rearm: bool) -> FixationGate {
        let mut gate = FixationGate::new(GateConfig {
            threshold: DEFAULT_THRESHOLD,
            policy,
            rearm,
        });
        gate.set_tracked_region(Some(TrackedRegion::new(-100.0, -100.0, 100.0, 100.0)));
        gate
    }

    fn feed(gate: &mut FixationGate, point: SmoothedPoint, times: u32) -> u32 {
        (0..times).filter(|_| gate.on_sample(&point)).count() as u32
    }

    #[test]
    fn n_inside_samples_fire_once() {
        for policy in [DwellPolicy::Clamped, DwellPolicy::Unclamped] {
            let mut gate = square_gate(policy, false);
            assert_eq!(feed(&mut gate, INSIDE, DEFAULT_THRESHOLD - 1), 0);
            assert!(gate.on_sample(&INSIDE), "{}", policy.as_str());
            assert!(gate.is_focused());
            assert_eq!(feed(&mut gate, INSIDE, 50), 0);
        }
    }

    #[test]
    fn one_short_then_outside_never_fires() {
        for policy in [DwellPolicy::Clamped, DwellPolicy::Unclamped] {
            let mut gate = square_gate(policy, false);
            assert_eq!(feed(&mut gate, INSIDE, DEFAULT_THRESHOLD - 1), 0);
            assert!(!gate.on_sample(&OUTSIDE));
            assert_eq!(gate.dwell_count(), i64::from(DEFAULT_THRESHOLD) - 2);
            assert!(!gate.on_sample(&INSIDE));
            assert!(!gate.is_focused());
        }
    }

    #[test]
    fn clamped_counter_forgets_time_spent_outside() {
        let mut gate = square_gate(DwellPolicy::Clamped, false);
        feed(&mut gate, OUTSIDE, 10);
        assert_eq!(gate.dwell_count(), 0);
        assert_eq!(feed(&mut gate, INSIDE, DEFAULT_THRESHOLD), 1);
    }

    #[test]
    fn unclamped_counter_pays_back_time_spent_outside() {
        let mut gate = square_gate(DwellPolicy::Unclamped, false);
        feed(&mut gate, OUTSIDE, 3);
        assert_eq!(gate.dwell_count(), -3);
        assert_eq!(feed(&mut gate, INSIDE, DEFAULT_THRESHOLD + 2), 0);
        assert!(gate.on_sample(&INSIDE));
    }

    #[test]
    fn rearmed_gate_fires_every_n_samples() {
        let mut gate = square_gate(DwellPolicy::Clamped, true);
        assert_eq!(feed(&mut gate, INSIDE, DEFAULT_THRESHOLD * 3), 3);
        assert!(!gate.is_focused());
    }

    #[test]
    fn border_points_count_as_outside() {
        let mut gate = square_gate(DwellPolicy::Clamped, false);
        let border = SmoothedPoint::new(0, 100.0, 0.0);
        assert_eq!(feed(&mut gate, border, 20), 0);
    }

    #[test]
    fn no_region_means_no_detection() {
        let mut gate = FixationGate::new(GateConfig::default());
        assert_eq!(feed(&mut gate, INSIDE, 20), 0);

        let mut gate = square_gate(DwellPolicy::Clamped, false);
        feed(&mut gate, INSIDE, 3);
        gate.clear();
        assert_eq!(feed(&mut gate, INSIDE, 20), 0);
        assert!(!gate.is_tracking());
    }

    #[test]
    fn new_region_resets_the_episode() {
        let mut gate = square_gate(DwellPolicy::Clamped, false);
        feed(&mut gate, INSIDE, DEFAULT_THRESHOLD);
        assert!(gate.is_focused());

        gate.set_tracked_region(Some(TrackedRegion::new(-10.0, -10.0, 10.0, 10.0)));
        assert!(!gate.is_focused());
        assert_eq!(gate.dwell_count(), 0);
        assert_eq!(feed(&mut gate, INSIDE, DEFAULT_THRESHOLD), 1);
    }

    #[test]
    fn extended_threshold() {
        let mut gate = FixationGate::new(GateConfig {
            threshold: EXTENDED_THRESHOLD,
            ..GateConfig::default()
        });
        gate.set_tracked_region(Some(TrackedRegion::new(-1.0, -1.0, 1.0, 1.0)));
        assert_eq!(feed(&mut gate, INSIDE, EXTENDED_THRESHOLD - 1), 0);
        assert!(gate.on_sample(&INSIDE));
    }

    #[test]
    fn policy_names() {
        for policy in [DwellPolicy::Clamped, DwellPolicy::Unclamped] {
            assert_eq!(DwellPolicy::from_str(policy.as_str()), Some(policy));
        }
        assert_eq!(DwellPolicy::from_str("sticky"), None);
    }
}
