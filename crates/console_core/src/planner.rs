//! Volume planner: how long, and roughly how much in fees, until cumulative
//! traded volume reaches an operator target at the currently observed rate.
//!
//! Everything here is a pure projection. Nothing reads from or writes to the
//! backend, and the fee figure is an assumed flat rate rather than actual
//! fee data.

use std::fmt;

use shared::domain::TelemetrySnapshot;

/// Assumed fee rate (0.05%) applied to the whole target volume.
pub const DEFAULT_FEE_RATE: f64 = 0.0005;
pub const DEFAULT_TARGET_VOLUME: f64 = 1_000_000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlannerState {
    pub target_volume: f64,
    pub is_active: bool,
}

impl Default for PlannerState {
    fn default() -> Self {
        Self {
            target_volume: DEFAULT_TARGET_VOLUME,
            is_active: false,
        }
    }
}

impl PlannerState {
    pub fn set_target(&mut self, target_volume: f64) -> Result<(), String> {
        if !target_volume.is_finite() || target_volume < 0.0 {
            return Err(format!("target volume must be a non-negative number, got {target_volume}"));
        }
        self.target_volume = target_volume;
        Ok(())
    }

    pub fn toggle(&mut self) -> bool {
        self.is_active = !self.is_active;
        self.is_active
    }

    /// Projection for display, or `None` while the planner is switched off.
    /// Without a snapshot the session is treated as having no volume and no
    /// rate.
    pub fn projection(
        &self,
        snapshot: Option<&TelemetrySnapshot>,
        fee_rate: f64,
    ) -> Option<VolumeProjection> {
        if !self.is_active {
            return None;
        }
        let (volume, rate) = snapshot.map_or((0.0, 0.0), |s| (s.volume, s.volume_rate_min));
        Some(project(volume, rate, self.target_volume, fee_rate))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimeToTarget {
    Minutes(f64),
    /// No positive observed rate; the target cannot be projected.
    Unknown,
}

impl TimeToTarget {
    pub fn minutes(self) -> Option<f64> {
        match self {
            TimeToTarget::Minutes(m) => Some(m),
            TimeToTarget::Unknown => None,
        }
    }

    pub fn hours(self) -> Option<f64> {
        self.minutes().map(|m| m / 60.0)
    }
}

impl fmt::Display for TimeToTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.hours() {
            Some(hours) => write!(f, "{hours:.1} h"),
            None => write!(f, "unknown (start the strategy first)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeProjection {
    pub remaining: f64,
    pub time_to_target: TimeToTarget,
    pub estimated_fees: f64,
}

pub fn project(volume: f64, rate_per_minute: f64, target: f64, fee_rate: f64) -> VolumeProjection {
    let remaining = (target - volume).max(0.0);
    let time_to_target = if rate_per_minute.is_finite() && rate_per_minute > 0.0 {
        TimeToTarget::Minutes(remaining / rate_per_minute)
    } else {
        TimeToTarget::Unknown
    };
    VolumeProjection {
        remaining,
        time_to_target,
        estimated_fees: target * fee_rate,
    }
}
