// Copyright (C) 2025  Tom Waddington
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published
// by the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Script document loading
//!
//! ```yaml
//! settings:
//!   defaultSpeed: 10
//!   loginCommand: bash --login
//! actions:
//!   - type: echo hello
//!   - key: enter
//!   - pause
//! ```

use serde_yaml::{Mapping, Value};
use shell_escape::unix::escape;
use std::borrow::Cow;
use std::path::Path;
use tracing::debug;

use crate::error::ConfigError;
use crate::parser::parse_actions;
use crate::types::{Script, Settings};

pub fn load(path: &Path) -> Result<Script, ConfigError> {
    let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let script = parse_script(&source)?;
    debug!(
        path = %path.display(),
        actions = script.actions.len(),
        "loaded script"
    );
    Ok(script)
}

pub fn parse_script(source: &str) -> Result<Script, ConfigError> {
    let document: Value =
        serde_yaml::from_str(source).map_err(|e| ConfigError::InvalidConfig(e.to_string()))?;
    script_from_value(&document)
}

pub fn script_from_value(document: &Value) -> Result<Script, ConfigError> {
    let Value::Mapping(root) = document else {
        return Err(ConfigError::InvalidConfig(
            "document must be a mapping".to_string(),
        ));
    };

    let settings = parse_settings(lookup(root, "settings"))?;

    let actions = match lookup(root, "actions") {
        Some(Value::Sequence(nodes)) => parse_actions(&settings, nodes)?,
        Some(_) => {
            return Err(ConfigError::InvalidConfig(
                "'actions' must be a list".to_string(),
            ));
        }
        None => {
            return Err(ConfigError::InvalidConfig(
                "'actions' is required".to_string(),
            ));
        }
    };

    Ok(Script { settings, actions })
}

// Keys match case-insensitively and null counts as absent
fn lookup<'a>(map: &'a Mapping, name: &str) -> Option<&'a Value> {
    map.iter()
        .find(|(k, _)| k.as_str().is_some_and(|k| k.eq_ignore_ascii_case(name)))
        .map(|(_, v)| v)
        .filter(|v| !v.is_null())
}

fn parse_settings(value: Option<&Value>) -> Result<Settings, ConfigError> {
    let mut settings = Settings::default();

    let map = match value {
        None => return Ok(settings),
        Some(Value::Mapping(map)) => map,
        Some(_) => {
            return Err(ConfigError::InvalidSettings(
                "'settings' must be a mapping".to_string(),
            ));
        }
    };

    if let Some(speed) = lookup(map, "defaultSpeed") {
        settings.default_speed_ms = speed.as_u64().ok_or_else(|| {
            ConfigError::InvalidSettings("'defaultSpeed' must be a non-negative integer".to_string())
        })?;
    }

    if let Some(command) = lookup(map, "loginCommand") {
        settings.login_command = login_command(command)?;
    }

    Ok(settings)
}

fn login_command(value: &Value) -> Result<String, ConfigError> {
    let invalid = || {
        ConfigError::InvalidSettings(
            "'loginCommand' must be a string or a list of strings".to_string(),
        )
    };

    let command = match value {
        Value::String(command) => command.clone(),
        // Quoted so the shell sees the same argument list
        Value::Sequence(parts) => parts
            .iter()
            .map(|part| {
                part.as_str()
                    .map(|part| escape(Cow::Borrowed(part)).into_owned())
                    .ok_or_else(invalid)
            })
            .collect::<Result<Vec<_>, _>>()?
            .join(" "),
        _ => return Err(invalid()),
    };

    if command.trim().is_empty() {
        return Err(ConfigError::InvalidSettings(
            "'loginCommand' is empty".to_string(),
        ));
    }
    Ok(command)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Action;
    use std::io::Write;

    #[test]
    fn test_parse_script() {
        let input = r#"
settings:
  defaultSpeed: 50
  loginCommand: zsh
actions:
  - type: hi
    count: 2
  - pause
  - sleep: 10
"#;
        let script = parse_script(input).unwrap();
        assert_eq!(script.settings.default_speed_ms, 50);
        assert_eq!(script.settings.login_command, "zsh");
        assert_eq!(script.actions.len(), 3);
        assert_eq!(
            script.actions[0],
            Action::Type {
                text: "hi".to_string(),
                count: 2,
                speed_ms: 50,
            }
        );
        assert_eq!(script.actions[1], Action::Pause);
        assert_eq!(script.actions[2], Action::Sleep { duration_ms: 10 });
    }

    #[test]
    fn test_settings_default_when_missing() {
        let script = parse_script("actions:\n  - key: enter\n").unwrap();
        assert_eq!(script.settings, Settings::default());
    }

    #[test]
    fn test_login_command_list() {
        let input = "settings:\n  loginCommand: [bash, --login]\nactions: []\n";
        let script = parse_script(input).unwrap();
        assert_eq!(script.settings.login_command, "bash --login");
    }

    #[cfg(unix)]
    #[test]
    fn test_login_command_list_keeps_arguments() {
        let input = "settings:\n  loginCommand: [sh, -c, \"echo 'a b'\"]\nactions: []\n";
        let script = parse_script(input).unwrap();

        let output = std::process::Command::new("sh")
            .arg("-c")
            .arg(&script.settings.login_command)
            .output()
            .unwrap();
        assert_eq!(String::from_utf8_lossy(&output.stdout), "a b\n");
    }

    #[test]
    fn test_invalid_config() {
        for input in ["", "- pause", "actions: pause", "settings: {}"] {
            let err = parse_script(input).unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidConfig(_)),
                "input: {input:?}, got {err:?}"
            );
        }
    }

    #[test]
    fn test_invalid_settings() {
        for input in [
            "settings: fast\nactions: []",
            "settings: {defaultSpeed: slow}\nactions: []",
            "settings: {loginCommand: 12}\nactions: []",
            "settings: {loginCommand: ''}\nactions: []",
        ] {
            let err = parse_script(input).unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidSettings(_)),
                "input: {input:?}, got {err:?}"
            );
        }
    }

    #[test]
    fn test_invalid_action_aborts_load() {
        let err = parse_script("actions:\n  - type: ok\n  - bogus: 1\n").unwrap_err();
        let ConfigError::InvalidAction(err) = err else {
            panic!("Expected InvalidAction");
        };
        assert_eq!(err.node(), &serde_yaml::from_str::<Value>("bogus: 1").unwrap());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "actions:\n  - type: echo hello\n  - key: enter").unwrap();

        let script = load(file.path()).unwrap();
        assert_eq!(script.actions.len(), 2);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(&dir.path().join("missing.yml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
