//! Velocity plausibility filter.

use tracing::warn;

use crate::config::ConfigMap;

/// 5 mph in meters per second.
pub const DEFAULT_MIN_VELOCITY: f64 = 2.2352;
/// 80 mph in meters per second.
pub const DEFAULT_MAX_VELOCITY: f64 = 35.7632;

/// Suppresses messages whose speed falls outside the closed retention
/// interval `[min, max]`. Implausibly slow or fast vehicles make individual
/// trajectories easy to reconstruct.
#[derive(Debug, Clone)]
pub struct VelocityFilter {
    min: f64,
    max: f64,
}

impl Default for VelocityFilter {
    fn default() -> Self {
        Self { min: DEFAULT_MIN_VELOCITY, max: DEFAULT_MAX_VELOCITY }
    }
}

impl VelocityFilter {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Build from `privacy.filter.velocity.{min,max}`; either bound missing
    /// or unparsable keeps its default.
    pub fn from_config(conf: &ConfigMap) -> Self {
        let mut filter = Self::default();

        if let Some(value) = conf.get("privacy.filter.velocity.min") {
            match value.parse() {
                Ok(v) => filter.min = v,
                Err(_) => warn!(%value, "unparsable velocity filter minimum; keeping default"),
            }
        }

        if let Some(value) = conf.get("privacy.filter.velocity.max") {
            match value.parse() {
                Ok(v) => filter.max = v,
                Err(_) => warn!(%value, "unparsable velocity filter maximum; keeping default"),
            }
        }

        filter
    }

    pub fn set_min(&mut self, v: f64) {
        self.min = v;
    }

    pub fn set_max(&mut self, v: f64) {
        self.max = v;
    }

    /// true = suppress the message.
    pub fn suppress(&self, v: f64) -> bool {
        v < self.min || v > self.max
    }

    pub fn retain(&self, v: f64) -> bool {
        !self.suppress(v)
    }
}
