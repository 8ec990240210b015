//! Scenario model: declarative timelines of phases and per-signal
//! configuration, loaded from human-authored YAML files.
//!
//! A scenario names a set of signals with base configuration and an
//! ordered list of phases whose overrides merge shallowly over the
//! base. The merged result at a given elapsed time is the *effective*
//! configuration consumed by the signal generators.

pub mod engine;
pub mod loader;

pub use engine::Engine;
pub use loader::{default_scenario_dir, Registry};

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::MockError;

/// Scalar-or-3-vector field used for baselines and noise levels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarOrVec3 {
    Scalar(f64),
    Vector([f64; 3]),
}

impl ScalarOrVec3 {
    /// Collapse to a scalar, falling back to `default` for vectors.
    pub fn scalar_or(&self, default: f64) -> f64 {
        match self {
            ScalarOrVec3::Scalar(v) => *v,
            ScalarOrVec3::Vector(_) => default,
        }
    }

    /// Collapse to a 3-vector, falling back to `default` for scalars.
    pub fn vector_or(&self, default: [f64; 3]) -> [f64; 3] {
        match self {
            ScalarOrVec3::Vector(v) => *v,
            ScalarOrVec3::Scalar(_) => default,
        }
    }
}

/// Per-signal configuration.
///
/// Every field is optional; an absent field means "not set here".
/// Phase overrides replace exactly the fields they set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline: Option<ScalarOrVec3>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub noise: Option<ScalarOrVec3>,
    /// Emission rate, e.g. "1hz", "50hz"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Discrete value override for label signals, e.g. "on"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub add: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multiply: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ramp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ramp_to_baseline: Option<String>,
}

impl SignalConfig {
    /// Merge `overrides` over `self`: an override field replaces the
    /// base field iff the override sets it.
    pub fn merged(&self, overrides: &SignalConfig) -> SignalConfig {
        SignalConfig {
            baseline: overrides.baseline.or(self.baseline),
            noise: overrides.noise.or(self.noise),
            rate: overrides.rate.clone().or_else(|| self.rate.clone()),
            unit: overrides.unit.clone().or_else(|| self.unit.clone()),
            value: overrides.value.clone().or_else(|| self.value.clone()),
            add: overrides.add.or(self.add),
            multiply: overrides.multiply.or(self.multiply),
            ramp: overrides.ramp.clone().or_else(|| self.ramp.clone()),
            ramp_to_baseline: overrides
                .ramp_to_baseline
                .clone()
                .or_else(|| self.ramp_to_baseline.clone()),
        }
    }
}

/// A named, time-bounded slice of a scenario carrying signal overrides
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Phase {
    pub name: String,
    /// Duration string, e.g. "2m", "30s", "5m30s"
    pub duration: String,
    pub overrides: HashMap<String, SignalConfig>,
}

/// Total running time of a scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioDuration {
    Unlimited,
    Finite(Duration),
}

/// A complete scenario: signals plus an ordered phase timeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scenario {
    pub name: String,
    pub description: String,
    /// e.g. "8m" or "unlimited"; empty means unlimited
    pub duration: String,
    /// e.g. "50hz"
    pub default_rate: String,
    pub signals: HashMap<String, SignalConfig>,
    pub phases: Vec<Phase>,
}

impl Scenario {
    /// Parsed total duration.
    pub fn parsed_duration(&self) -> Result<ScenarioDuration, MockError> {
        parse_duration(&self.duration)
    }

    /// Effective configuration for `signal` at elapsed time, or `None`
    /// if the scenario does not define that signal.
    pub fn effective_config(&self, signal: &str, elapsed: Duration) -> Option<SignalConfig> {
        let base = self.signals.get(signal)?;

        if let Some(phase) = self.phase_at(elapsed) {
            if let Some(overrides) = phase.overrides.get(signal) {
                return Some(base.merged(overrides));
            }
        }

        Some(base.clone())
    }

    /// Phase containing the elapsed instant. Phases apply by cumulative
    /// duration; the last phase stays in effect past the end of the
    /// timeline.
    pub fn phase_at(&self, elapsed: Duration) -> Option<&Phase> {
        if self.phases.is_empty() {
            return None;
        }

        let mut cursor = Duration::ZERO;
        for phase in &self.phases {
            match parse_duration(&phase.duration) {
                Ok(ScenarioDuration::Unlimited) => return Some(phase),
                Ok(ScenarioDuration::Finite(d)) => {
                    if elapsed < cursor + d {
                        return Some(phase);
                    }
                    cursor += d;
                }
                // Zero-length on parse failure; the loader rejects these upfront.
                Err(_) => {}
            }
        }

        self.phases.last()
    }

    /// Whether the scenario has run its full duration.
    pub fn is_complete(&self, elapsed: Duration) -> bool {
        match self.parsed_duration() {
            Ok(ScenarioDuration::Finite(total)) => elapsed >= total,
            _ => false,
        }
    }

    /// Reject scenarios whose duration or rate strings do not parse.
    pub fn validate(&self) -> Result<(), MockError> {
        if self.name.is_empty() {
            return Err(MockError::Config("scenario name is required".to_string()));
        }
        self.parsed_duration()?;
        if !self.default_rate.is_empty() {
            parse_rate(&self.default_rate)?;
        }
        for (name, config) in &self.signals {
            if let Some(rate) = &config.rate {
                parse_rate(rate)
                    .map_err(|_| MockError::InvalidRate(format!("{name}: {rate}")))?;
            }
        }
        for phase in &self.phases {
            parse_duration(&phase.duration).map_err(|_| {
                MockError::InvalidDuration(format!("phase {}: {}", phase.name, phase.duration))
            })?;
        }
        Ok(())
    }
}

/// Parse duration strings like "8m", "30s", "5m30s", "unlimited".
///
/// An empty string also means unlimited.
pub fn parse_duration(s: &str) -> Result<ScenarioDuration, MockError> {
    let s = s.trim();
    if s.is_empty() || s == "unlimited" {
        return Ok(ScenarioDuration::Unlimited);
    }

    let mut total = Duration::ZERO;
    let mut number = String::new();
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c.is_ascii_digit() || c == '.' {
            number.push(c);
            continue;
        }

        let mut unit = String::new();
        unit.push(c);
        while let Some(&next) = chars.peek() {
            if next.is_ascii_alphabetic() {
                unit.push(next);
                chars.next();
            } else {
                break;
            }
        }

        let value: f64 = number
            .parse()
            .map_err(|_| MockError::InvalidDuration(s.to_string()))?;
        number.clear();

        let seconds = match unit.as_str() {
            "ms" => value / 1000.0,
            "s" => value,
            "m" => value * 60.0,
            "h" => value * 3600.0,
            _ => return Err(MockError::InvalidDuration(s.to_string())),
        };
        if seconds < 0.0 {
            return Err(MockError::InvalidDuration(s.to_string()));
        }
        total += Duration::from_secs_f64(seconds);
    }

    // A trailing number with no unit is malformed.
    if !number.is_empty() {
        return Err(MockError::InvalidDuration(s.to_string()));
    }

    Ok(ScenarioDuration::Finite(total))
}

/// Parse a rate string like "50hz" into the emission period.
pub fn parse_rate(s: &str) -> Result<Duration, MockError> {
    let trimmed = s.trim();
    let digits = trimmed
        .strip_suffix("hz")
        .or_else(|| trimmed.strip_suffix("Hz"))
        .ok_or_else(|| MockError::InvalidRate(s.to_string()))?;

    let hz: f64 = digits
        .trim()
        .parse()
        .map_err(|_| MockError::InvalidRate(s.to_string()))?;
    if hz <= 0.0 || !hz.is_finite() {
        return Err(MockError::InvalidRate(s.to_string()));
    }

    Ok(Duration::from_secs_f64(1.0 / hz))
}
