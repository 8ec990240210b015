//! Scenario registry: loads YAML scenario files from disk.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::MockError;

use super::Scenario;

/// Holds all loaded scenarios, keyed by name
#[derive(Debug, Default)]
pub struct Registry {
    scenarios: HashMap<String, Scenario>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    /// Load a single scenario file.
    pub fn load_from_file(&mut self, path: &Path) -> Result<(), MockError> {
        let data = fs::read_to_string(path)?;
        let scenario: Scenario =
            serde_yaml::from_str(&data).map_err(|source| MockError::ScenarioParse {
                path: path.display().to_string(),
                source,
            })?;
        scenario.validate()?;
        self.scenarios.insert(scenario.name.clone(), scenario);
        Ok(())
    }

    /// Load every `*.yaml` / `*.yml` file in `dir`.
    pub fn load_from_dir(&mut self, dir: &Path) -> Result<(), MockError> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                continue;
            }
            let is_yaml = matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("yaml") | Some("yml")
            );
            if is_yaml {
                self.load_from_file(&path)?;
            }
        }
        Ok(())
    }

    /// Look up a scenario by name.
    pub fn get(&self, name: &str) -> Result<&Scenario, MockError> {
        self.scenarios
            .get(name)
            .ok_or_else(|| MockError::UnknownScenario(name.to_string()))
    }

    /// All scenario names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.scenarios.keys().cloned().collect();
        names.sort();
        names
    }

    /// All scenarios as (name, description) pairs, sorted by name.
    pub fn list_with_descriptions(&self) -> Vec<(String, String)> {
        let mut entries: Vec<(String, String)> = self
            .scenarios
            .iter()
            .map(|(name, s)| (name.clone(), s.description.clone()))
            .collect();
        entries.sort();
        entries
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }
}

/// Resolve the scenario directory: `./scenarios` in the working
/// directory, else `scenarios/` next to the executable.
pub fn default_scenario_dir() -> PathBuf {
    let cwd_dir = PathBuf::from("scenarios");
    if cwd_dir.is_dir() {
        return cwd_dir;
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let exe_dir = parent.join("scenarios");
            if exe_dir.is_dir() {
                return exe_dir;
            }
        }
    }

    cwd_dir
}
