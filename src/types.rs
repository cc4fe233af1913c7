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

//! Core types for clive script execution

use std::fmt;

use crate::keys::{ControlChar, Key};

pub const DEFAULT_SPEED_MS: u64 = 10;
pub const DEFAULT_LOGIN_COMMAND: &str = "bash --login";

const DISPLAY_TEXT_WIDTH: usize = 37;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Type {
        text: String,
        count: u32,
        speed_ms: u64,
    },
    Key {
        key: Key,
        count: u32,
        speed_ms: u64,
    },
    Ctrl {
        ctrl: ControlChar,
        count: u32,
        speed_ms: u64,
    },
    Sleep {
        duration_ms: u64,
    },
    Pause,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Type { text, .. } => {
                write!(f, "Type: {}", truncate_string(text, DISPLAY_TEXT_WIDTH))
            }
            Action::Key { key, .. } => write!(f, "Key: {key}"),
            Action::Ctrl { ctrl, .. } => write!(f, "Ctrl+{ctrl}"),
            Action::Sleep { duration_ms } => write!(f, "Sleep: {duration_ms}ms"),
            Action::Pause => f.write_str("Pause: Press enter to continue"),
        }
    }
}

fn truncate_string(text: &str, width: usize) -> String {
    match text.char_indices().nth(width) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    // Delay between repetitions when an action gives no speed
    pub default_speed_ms: u64,
    // Run by the bridge as `sh -c <login_command>`
    pub login_command: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_speed_ms: DEFAULT_SPEED_MS,
            login_command: DEFAULT_LOGIN_COMMAND.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    pub settings: Settings,
    pub actions: Vec<Action>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_actions() {
        let key = Action::Key {
            key: Key::parse("enter").unwrap(),
            count: 1,
            speed_ms: 10,
        };
        let ctrl = Action::Ctrl {
            ctrl: ControlChar::parse("c").unwrap(),
            count: 1,
            speed_ms: 10,
        };

        assert_eq!(key.to_string(), "Key: enter");
        assert_eq!(ctrl.to_string(), "Ctrl+c");
        assert_eq!(Action::Sleep { duration_ms: 3000 }.to_string(), "Sleep: 3000ms");
        assert_eq!(Action::Pause.to_string(), "Pause: Press enter to continue");
    }

    #[test]
    fn test_display_truncates_long_text() {
        let short = Action::Type {
            text: "echo hello".to_string(),
            count: 1,
            speed_ms: 10,
        };
        assert_eq!(short.to_string(), "Type: echo hello");

        let long = Action::Type {
            text: "a".repeat(40),
            count: 1,
            speed_ms: 10,
        };
        assert_eq!(long.to_string(), format!("Type: {}...", "a".repeat(37)));
    }

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.default_speed_ms, 10);
        assert_eq!(settings.login_command, "bash --login");
    }
}
