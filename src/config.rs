//! Configuration management for rundash.
//!
//! This module defines the structure of the `rundash.json` configuration file
//! and normalizes it into the shape the rest of the dashboard consumes. Two
//! legacy layouts are still accepted: a top-level `onDashboardStart` array and
//! a flat `beforeStartProcess` object keyed by launch identifier; both fold
//! into the `events` structures without behavior change.
//!
//! A malformed or missing file never aborts the dashboard: the whole file
//! falls back to defaults, and individual settings fall back per field when
//! absent or carrying an invalid value.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;

/// Directory scripts are launched from when the config does not name one.
pub const DEFAULT_SCRIPTS_DIR: &str = "./scripts";

/// Raw on-disk layout of `rundash.json`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawConfig {
    /// Ordered log path patterns, each optionally containing `{{latest}}`.
    pub logs: Vec<String>,
    /// Base directory for named script files.
    pub scripts_dir: Option<String>,
    /// Input key mapped to a script file or a detailed binding.
    pub key_bindings: BTreeMap<String, RawBinding>,
    /// Loosely-typed settings; validated per field in [`Settings::resolve`].
    pub settings: BTreeMap<String, Value>,
    /// Structured event hooks.
    pub events: RawEvents,
    /// Legacy flat mapping: launch identifier to action list.
    pub before_start_process: BTreeMap<String, Vec<RawAction>>,
    /// Legacy top-level startup action list.
    pub on_dashboard_start: Vec<RawAction>,
}

/// Structured event hooks (`events` object).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawEvents {
    /// Actions run once when the dashboard starts.
    pub on_dashboard_start: Vec<RawAction>,
    /// Per-launch action lists, matched by exact identifier equality.
    pub before_start_process: Vec<RawBeforeEntry>,
}

/// One `events.beforeStartProcess` entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBeforeEntry {
    pub script: String,
    #[serde(default)]
    pub actions: Vec<RawAction>,
}

/// A declarative cleanup action as it appears in the config file.
///
/// The `action` kind stays a string here; decoding into the closed
/// [`crate::actions::ActionDescriptor`] enum happens at execution time so an
/// unknown kind is reported and skipped instead of failing the whole file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawAction {
    pub action: String,
    #[serde(default)]
    pub parameters: Vec<String>,
}

/// Value side of a `keyBindings` entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawBinding {
    /// Shorthand: the script file to run.
    Script(String),
    /// Detailed form with an optional display label.
    Detailed {
        label: Option<String>,
        script: Option<String>,
        command: Option<String>,
    },
}

/// What a key binding launches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchTarget {
    /// A script file under `scriptsDir`.
    Script(String),
    /// A free-form command line.
    Command(String),
}

/// A normalized key binding shown in the sidebar.
#[derive(Debug, Clone)]
pub struct KeyBinding {
    pub key: String,
    pub label: String,
    pub target: LaunchTarget,
}

/// Validated runtime settings, every field defaulted when absent or invalid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub enable_command_history: bool,
    pub persist_logs: bool,
    pub notify_on_exit: bool,
    pub render_throttle_ms: u64,
    pub max_log_lines: usize,
    pub log_batch_size: usize,
    pub max_queued_log_lines: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enable_command_history: true,
            persist_logs: true,
            notify_on_exit: true,
            render_throttle_ms: 50,
            max_log_lines: 2_000,
            log_batch_size: 64,
            max_queued_log_lines: 1_000,
        }
    }
}

impl Settings {
    /// Resolves loose JSON settings against the defaults, field by field.
    pub fn resolve(raw: &BTreeMap<String, Value>) -> Self {
        let defaults = Settings::default();
        Self {
            enable_command_history: bool_setting(
                raw,
                "enableCommandHistory",
                defaults.enable_command_history,
            ),
            persist_logs: bool_setting(raw, "persistLogs", defaults.persist_logs),
            notify_on_exit: bool_setting(raw, "notifyOnExit", defaults.notify_on_exit),
            render_throttle_ms: positive_setting(
                raw,
                "renderThrottleMs",
                defaults.render_throttle_ms,
            ),
            max_log_lines: positive_setting(raw, "maxLogLines", defaults.max_log_lines as u64)
                as usize,
            log_batch_size: positive_setting(raw, "logBatchSize", defaults.log_batch_size as u64)
                as usize,
            max_queued_log_lines: positive_setting(
                raw,
                "maxQueuedLogLines",
                defaults.max_queued_log_lines as u64,
            ) as usize,
        }
    }
}

fn bool_setting(raw: &BTreeMap<String, Value>, key: &str, default: bool) -> bool {
    raw.get(key).and_then(Value::as_bool).unwrap_or(default)
}

fn positive_setting(raw: &BTreeMap<String, Value>, key: &str, default: u64) -> u64 {
    raw.get(key)
        .and_then(Value::as_u64)
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

/// Pre-launch actions for one launch identifier.
#[derive(Debug, Clone)]
pub struct PreLaunch {
    pub script: String,
    pub actions: Vec<RawAction>,
}

/// Normalized configuration consumed by the rest of the dashboard.
#[derive(Debug, Clone)]
pub struct Config {
    pub logs: Vec<String>,
    pub scripts_dir: PathBuf,
    pub bindings: Vec<KeyBinding>,
    pub settings: Settings,
    pub startup_actions: Vec<RawAction>,
    pub pre_launch: Vec<PreLaunch>,
}

impl Default for Config {
    fn default() -> Self {
        normalize(RawConfig::default())
    }
}

impl Config {
    /// Actions to run before launching `identifier`, matched exactly.
    pub fn pre_launch_actions(&self, identifier: &str) -> &[RawAction] {
        self.pre_launch
            .iter()
            .find(|entry| entry.script == identifier)
            .map(|entry| entry.actions.as_slice())
            .unwrap_or(&[])
    }
}

/// Loads `rundash.json`, falling back to defaults if it is missing or broken.
pub fn load_config(path: &Path) -> Config {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(_) => return Config::default(),
    };
    match serde_json::from_str::<RawConfig>(&raw) {
        Ok(parsed) => normalize(parsed),
        Err(_) => Config::default(),
    }
}

/// Folds raw config, including the legacy layouts, into [`Config`].
pub fn normalize(raw: RawConfig) -> Config {
    let settings = Settings::resolve(&raw.settings);

    let mut startup_actions = raw.events.on_dashboard_start;
    startup_actions.extend(raw.on_dashboard_start);

    let mut pre_launch: Vec<PreLaunch> = raw
        .events
        .before_start_process
        .into_iter()
        .map(|entry| PreLaunch {
            script: entry.script,
            actions: entry.actions,
        })
        .collect();
    for (script, actions) in raw.before_start_process {
        pre_launch.push(PreLaunch { script, actions });
    }

    let bindings = raw
        .key_bindings
        .into_iter()
        .filter_map(|(key, value)| normalize_binding(key, value))
        .collect();

    Config {
        logs: raw.logs,
        scripts_dir: PathBuf::from(
            raw.scripts_dir
                .unwrap_or_else(|| DEFAULT_SCRIPTS_DIR.to_string()),
        ),
        bindings,
        settings,
        startup_actions,
        pre_launch,
    }
}

fn normalize_binding(key: String, value: RawBinding) -> Option<KeyBinding> {
    match value {
        RawBinding::Script(file) => Some(KeyBinding {
            key,
            label: file.clone(),
            target: LaunchTarget::Script(file),
        }),
        RawBinding::Detailed {
            label,
            script,
            command,
        } => {
            let target = match (script, command) {
                (Some(file), _) => LaunchTarget::Script(file),
                (None, Some(cmd)) => LaunchTarget::Command(cmd),
                (None, None) => return None,
            };
            let label = label.unwrap_or_else(|| match &target {
                LaunchTarget::Script(file) => file.clone(),
                LaunchTarget::Command(cmd) => cmd.clone(),
            });
            Some(KeyBinding { key, label, target })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_file_content_yields_defaults() {
        let config = match serde_json::from_str::<RawConfig>("{ not json") {
            Ok(parsed) => normalize(parsed),
            Err(_) => Config::default(),
        };
        assert_eq!(config.settings, Settings::default());
        assert!(config.logs.is_empty());
        assert_eq!(config.scripts_dir, PathBuf::from(DEFAULT_SCRIPTS_DIR));
    }

    #[test]
    fn settings_fall_back_per_field_on_invalid_values() {
        let raw: RawConfig = serde_json::from_str(
            r#"{
                "settings": {
                    "enableCommandHistory": false,
                    "renderThrottleMs": 0,
                    "maxLogLines": "lots",
                    "logBatchSize": 8
                }
            }"#,
        )
        .unwrap();
        let settings = Settings::resolve(&raw.settings);
        assert!(!settings.enable_command_history);
        assert_eq!(settings.render_throttle_ms, 50);
        assert_eq!(settings.max_log_lines, 2_000);
        assert_eq!(settings.log_batch_size, 8);
        assert!(settings.persist_logs);
    }

    #[test]
    fn legacy_flat_before_start_process_normalizes() {
        let raw: RawConfig = serde_json::from_str(
            r#"{
                "beforeStartProcess": {
                    "build": [ { "action": "killProcess", "parameters": ["node"] } ]
                }
            }"#,
        )
        .unwrap();
        let config = normalize(raw);
        assert_eq!(config.pre_launch.len(), 1);
        assert_eq!(config.pre_launch[0].script, "build");
        assert_eq!(
            config.pre_launch[0].actions,
            vec![RawAction {
                action: "killProcess".to_string(),
                parameters: vec!["node".to_string()],
            }]
        );
        assert_eq!(config.pre_launch_actions("build").len(), 1);
        assert!(config.pre_launch_actions("deploy").is_empty());
    }

    #[test]
    fn legacy_top_level_startup_actions_append_after_structured() {
        let raw: RawConfig = serde_json::from_str(
            r#"{
                "events": {
                    "onDashboardStart": [ { "action": "closeTCPPorts", "parameters": ["3000"] } ]
                },
                "onDashboardStart": [ { "action": "killProcess", "parameters": ["vite"] } ]
            }"#,
        )
        .unwrap();
        let config = normalize(raw);
        assert_eq!(config.startup_actions.len(), 2);
        assert_eq!(config.startup_actions[0].action, "closeTCPPorts");
        assert_eq!(config.startup_actions[1].action, "killProcess");
    }

    #[test]
    fn bindings_accept_shorthand_and_detailed_forms() {
        let raw: RawConfig = serde_json::from_str(
            r#"{
                "keyBindings": {
                    "b": "build.sh",
                    "d": { "label": "dev server", "command": "npm run dev" },
                    "x": { "label": "broken" }
                }
            }"#,
        )
        .unwrap();
        let config = normalize(raw);
        assert_eq!(config.bindings.len(), 2);
        let build = config.bindings.iter().find(|b| b.key == "b").unwrap();
        assert_eq!(build.label, "build.sh");
        assert_eq!(build.target, LaunchTarget::Script("build.sh".to_string()));
        let dev = config.bindings.iter().find(|b| b.key == "d").unwrap();
        assert_eq!(dev.label, "dev server");
        assert_eq!(
            dev.target,
            LaunchTarget::Command("npm run dev".to_string())
        );
    }
}
