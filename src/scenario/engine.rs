//! Scenario engine: answers configuration queries as a function of
//! elapsed time. Callers own the clock, which keeps the engine pure
//! and lets tests drive it with simulated time.

use std::time::Duration;

use super::{Phase, Scenario, SignalConfig};

/// Evaluates a scenario's phase timeline
#[derive(Debug, Clone)]
pub struct Engine {
    scenario: Scenario,
}

impl Engine {
    pub fn new(scenario: Scenario) -> Self {
        Engine { scenario }
    }

    /// The underlying scenario.
    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    /// Merged configuration for `signal` at the elapsed instant, or
    /// `None` if the scenario does not define the signal.
    pub fn effective_config(&self, signal: &str, elapsed: Duration) -> Option<SignalConfig> {
        self.scenario.effective_config(signal, elapsed)
    }

    /// Phase in effect at the elapsed instant.
    pub fn current_phase(&self, elapsed: Duration) -> Option<&Phase> {
        self.scenario.phase_at(elapsed)
    }

    /// Whether the scenario has finished. Always false for unlimited
    /// scenarios.
    pub fn is_complete(&self, elapsed: Duration) -> bool {
        self.scenario.is_complete(elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::{ScalarOrVec3, ScenarioDuration};
    use std::collections::HashMap;

    #[test]
    fn test_engine_delegates_phase_and_completion() {
        let mut overrides = HashMap::new();
        overrides.insert(
            "eda.us".to_string(),
            SignalConfig {
                add: Some(6.0),
                ..Default::default()
            },
        );

        let mut signals = HashMap::new();
        signals.insert(
            "eda.us".to_string(),
            SignalConfig {
                baseline: Some(ScalarOrVec3::Scalar(2.0)),
                ..Default::default()
            },
        );

        let engine = Engine::new(Scenario {
            name: "short".to_string(),
            duration: "1m".to_string(),
            signals,
            phases: vec![
                super::super::Phase {
                    name: "first".to_string(),
                    duration: "30s".to_string(),
                    overrides: HashMap::new(),
                },
                super::super::Phase {
                    name: "second".to_string(),
                    duration: "30s".to_string(),
                    overrides,
                },
            ],
            ..Default::default()
        });

        assert_eq!(
            engine.current_phase(Duration::from_secs(10)).unwrap().name,
            "first"
        );
        assert_eq!(
            engine.current_phase(Duration::from_secs(45)).unwrap().name,
            "second"
        );

        let config = engine
            .effective_config("eda.us", Duration::from_secs(45))
            .unwrap();
        assert_eq!(config.add, Some(6.0));

        assert!(!engine.is_complete(Duration::from_secs(59)));
        assert!(engine.is_complete(Duration::from_secs(60)));
        assert_eq!(
            engine.scenario().parsed_duration().unwrap(),
            ScenarioDuration::Finite(Duration::from_secs(60))
        );
    }
}
