use std::collections::HashSet;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

const CASE_PLACEHOLDER: &str = "{case}";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Everything the show needs to know up front. Loaded once in `main` and
/// handed to each component.
#[derive(Debug, Clone)]
pub struct ShowConfig {
    pub cases: Vec<String>,
    pub tick_interval: Duration,
    pub chat_poll_interval: Duration,
    pub scenes: SceneNames,
    pub chart_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct SceneNames {
    pub selection_scene: String,
    pub opening_scene: String,
    pub opening_background: String,
    pub selection_source: String,
    pub staged_source: String,
    pub open_source: String,
}

impl SceneNames {
    /// Source showing the case on the selection board
    pub fn selection_source_for(&self, case: &str) -> String {
        self.selection_source.replace(CASE_PLACEHOLDER, case)
    }

    pub fn staged_source_for(&self, case: &str) -> String {
        self.staged_source.replace(CASE_PLACEHOLDER, case)
    }

    pub fn open_source_for(&self, case: &str) -> String {
        self.open_source.replace(CASE_PLACEHOLDER, case)
    }
}

impl ShowConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let cases_raw = get("SHOW_CASES").ok_or(ConfigError::Missing("SHOW_CASES"))?;
        let cases: Vec<String> = cases_raw
            .split(',')
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        if cases.is_empty() {
            return Err(ConfigError::Invalid {
                key: "SHOW_CASES",
                reason: "no case identifiers given".to_string(),
            });
        }
        let mut seen = HashSet::new();
        if let Some(dup) = cases.iter().find(|c| !seen.insert(c.as_str())) {
            return Err(ConfigError::Invalid {
                key: "SHOW_CASES",
                reason: format!("case {} listed twice", dup),
            });
        }

        let tick_interval = parse_millis("SHOW_TICK_MS", get("SHOW_TICK_MS"), 1000)?;
        let chat_poll_interval = parse_millis("SHOW_CHAT_POLL_MS", get("SHOW_CHAT_POLL_MS"), 250)?;

        let scenes = SceneNames {
            selection_scene: get("SHOW_SELECTION_SCENE").ok_or(ConfigError::Missing("SHOW_SELECTION_SCENE"))?,
            opening_scene: get("SHOW_OPENING_SCENE").ok_or(ConfigError::Missing("SHOW_OPENING_SCENE"))?,
            opening_background: get("SHOW_OPENING_BACKGROUND").unwrap_or_else(|| "Background".to_string()),
            selection_source: template("SHOW_SELECTION_SOURCE", get("SHOW_SELECTION_SOURCE"), "{case}")?,
            staged_source: template("SHOW_STAGED_SOURCE", get("SHOW_STAGED_SOURCE"), "{case} Staged")?,
            open_source: template("SHOW_OPEN_SOURCE", get("SHOW_OPEN_SOURCE"), "{case} Open")?,
        };

        let chart_path = get("SHOW_CHART_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("selection_chart.json"));

        Ok(Self {
            cases,
            tick_interval,
            chat_poll_interval,
            scenes,
            chart_path,
        })
    }
}

fn parse_millis(key: &'static str, raw: Option<String>, default: u64) -> Result<Duration, ConfigError> {
    let millis = match raw {
        Some(v) => v.parse::<u64>().map_err(|e| ConfigError::Invalid {
            key,
            reason: e.to_string(),
        })?,
        None => default,
    };
    if millis == 0 {
        return Err(ConfigError::Invalid {
            key,
            reason: "interval must be greater than zero".to_string(),
        });
    }
    Ok(Duration::from_millis(millis))
}

fn template(key: &'static str, raw: Option<String>, default: &str) -> Result<String, ConfigError> {
    let value = raw.unwrap_or_else(|| default.to_string());
    if !value.contains(CASE_PLACEHOLDER) {
        return Err(ConfigError::Invalid {
            key,
            reason: format!("template must contain {}", CASE_PLACEHOLDER),
        });
    }
    Ok(value)
}

#[cfg(test)]
pub(crate) fn test_config(cases: &[&str]) -> ShowConfig {
    ShowConfig {
        cases: cases.iter().map(|c| c.to_string()).collect(),
        tick_interval: Duration::from_millis(10),
        chat_poll_interval: Duration::from_millis(5),
        scenes: SceneNames {
            selection_scene: "Case Selection".to_string(),
            opening_scene: "Case Opening".to_string(),
            opening_background: "Background".to_string(),
            selection_source: "{case}".to_string(),
            staged_source: "{case} Staged".to_string(),
            open_source: "{case} Open".to_string(),
        },
        chart_path: std::env::temp_dir().join("trusty-caseshow-test-chart.json"),
    }
}
