use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use engine::{Settings, Value};
use serde::Deserialize;

/// CLI-side configuration: engine settings plus initial context variables.
///
/// ```toml
/// [settings]
/// late-rendering = true
/// max-depth = 10
///
/// [variables]
/// title = "Hello"
/// count = 3
/// draft = true
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    settings: SettingsSection,
    #[serde(default)]
    variables: BTreeMap<String, toml::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct SettingsSection {
    #[serde(default)]
    late_rendering: bool,
    #[serde(default = "default_max_depth")]
    max_depth: usize,
}

impl Default for SettingsSection {
    fn default() -> Self {
        SettingsSection {
            late_rendering: false,
            max_depth: default_max_depth(),
        }
    }
}

fn default_max_depth() -> usize {
    Settings::default().max_depth
}

impl Config {
    pub fn load(path: &Path) -> Result<Config, String> {
        let text = fs::read_to_string(path)
            .map_err(|error| format!("cannot read '{}': {}", path.display(), error))?;
        Config::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Config, String> {
        toml::from_str(text).map_err(|error| error.to_string())
    }

    pub fn settings(&self) -> Settings {
        Settings {
            late_rendering: self.settings.late_rendering,
            max_depth: self.settings.max_depth,
        }
    }

    /// Context variables in declaration order. Only scalar TOML values are
    /// accepted.
    pub fn variables(&self) -> Result<Vec<(String, Value)>, String> {
        let mut variables = Vec::new();
        for (name, value) in &self.variables {
            let value = match value {
                toml::Value::String(s) => Value::String(s.clone()),
                toml::Value::Integer(i) => Value::Number(*i as f64),
                toml::Value::Float(f) => Value::Number(*f),
                toml::Value::Boolean(b) => Value::Boolean(*b),
                other => {
                    return Err(format!(
                        "variable '{}' must be a string, number or boolean (got {})",
                        name,
                        other.type_str()
                    ));
                }
            };
            variables.push((name.clone(), value));
        }
        Ok(variables)
    }
}
