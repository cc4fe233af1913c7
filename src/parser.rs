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

//! Action parser for clive scripts
//!
//! Each entry of `actions:` is either the bare token `pause` or a mapping
//! keyed by one of:
//! - `pause`
//! - `type` (with optional `count` and `speed`)
//! - `key` (with optional `count` and `speed`)
//! - `sleep`
//! - `ctrl` (with optional `count` and `speed`)

use serde_yaml::{Mapping, Value};

use crate::error::InvalidAction;
use crate::keys::{ControlChar, Key};
use crate::types::{Action, Settings};

const PAUSE_TOKEN: &str = "pause";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Pause,
    Type,
    Key,
    Sleep,
    Ctrl,
}

// Probed in this order and the first present key wins, so `{type, sleep}`
// is a Type action. Kept for compatibility with existing scripts.
const DISPATCH_ORDER: [Tag; 5] = [Tag::Pause, Tag::Type, Tag::Key, Tag::Sleep, Tag::Ctrl];

impl Tag {
    fn key(self) -> &'static str {
        match self {
            Tag::Pause => "pause",
            Tag::Type => "type",
            Tag::Key => "key",
            Tag::Sleep => "sleep",
            Tag::Ctrl => "ctrl",
        }
    }
}

fn dispatch(map: &Mapping) -> Option<Tag> {
    DISPATCH_ORDER
        .into_iter()
        .find(|tag| map.contains_key(tag.key()))
}

/// Case-insensitive view over a mapping's string keys.
struct Fields<'a> {
    node: &'a Value,
    map: &'a Mapping,
}

impl<'a> Fields<'a> {
    fn new(node: &'a Value, map: &'a Mapping) -> Self {
        Self { node, map }
    }

    // An exact-case key wins over other spellings of the same name
    fn get(&self, name: &str) -> Option<&'a Value> {
        self.map
            .get(name)
            .or_else(|| {
                self.map
                    .iter()
                    .find(|(k, _)| k.as_str().is_some_and(|k| k.eq_ignore_ascii_case(name)))
                    .map(|(_, v)| v)
            })
            .filter(|v| !v.is_null())
    }

    fn invalid(&self, reason: impl Into<String>) -> InvalidAction {
        InvalidAction::new(self.node, reason)
    }

    fn string(&self, name: &str) -> Result<&'a str, InvalidAction> {
        match self.get(name) {
            Some(Value::String(s)) => Ok(s),
            Some(_) => Err(self.invalid(format!("'{name}' must be a string"))),
            None => Err(self.invalid(format!("'{name}' is required"))),
        }
    }

    fn opt_u64(&self, name: &str) -> Result<Option<u64>, InvalidAction> {
        match self.get(name) {
            Some(value) => value
                .as_u64()
                .map(Some)
                .ok_or_else(|| self.invalid(format!("'{name}' must be a non-negative integer"))),
            None => Ok(None),
        }
    }

    fn count(&self) -> Result<u32, InvalidAction> {
        match self.opt_u64("count")? {
            None => Ok(1),
            Some(0) => Err(self.invalid("'count' must be at least 1")),
            Some(n) => u32::try_from(n).map_err(|_| self.invalid("'count' is too large")),
        }
    }

    fn speed(&self, settings: &Settings) -> Result<u64, InvalidAction> {
        Ok(self.opt_u64("speed")?.unwrap_or(settings.default_speed_ms))
    }
}

fn parse_pause(_fields: &Fields) -> Result<Action, InvalidAction> {
    // Any value, including none, is accepted
    Ok(Action::Pause)
}

fn parse_type(settings: &Settings, fields: &Fields) -> Result<Action, InvalidAction> {
    Ok(Action::Type {
        text: fields.string("type")?.to_string(),
        count: fields.count()?,
        speed_ms: fields.speed(settings)?,
    })
}

fn parse_key(settings: &Settings, fields: &Fields) -> Result<Action, InvalidAction> {
    let key = Key::parse(fields.string("key")?).map_err(|e| fields.invalid(e))?;
    Ok(Action::Key {
        key,
        count: fields.count()?,
        speed_ms: fields.speed(settings)?,
    })
}

fn parse_sleep(fields: &Fields) -> Result<Action, InvalidAction> {
    let duration_ms = fields
        .opt_u64("sleep")?
        .ok_or_else(|| fields.invalid("'sleep' is required"))?;
    Ok(Action::Sleep { duration_ms })
}

fn parse_ctrl(settings: &Settings, fields: &Fields) -> Result<Action, InvalidAction> {
    let ctrl = ControlChar::parse(fields.string("ctrl")?).map_err(|e| fields.invalid(e))?;
    Ok(Action::Ctrl {
        ctrl,
        count: fields.count()?,
        speed_ms: fields.speed(settings)?,
    })
}

pub fn parse_action(settings: &Settings, node: &Value) -> Result<Action, InvalidAction> {
    match node {
        Value::String(token) if token == PAUSE_TOKEN => Ok(Action::Pause),
        Value::Mapping(map) => {
            let fields = Fields::new(node, map);
            match dispatch(map) {
                Some(Tag::Pause) => parse_pause(&fields),
                Some(Tag::Type) => parse_type(settings, &fields),
                Some(Tag::Key) => parse_key(settings, &fields),
                Some(Tag::Sleep) => parse_sleep(&fields),
                Some(Tag::Ctrl) => parse_ctrl(settings, &fields),
                None => Err(fields.invalid("no recognized action key")),
            }
        }
        _ => Err(InvalidAction::new(
            node,
            "expected 'pause' or an action mapping",
        )),
    }
}

pub fn parse_actions(settings: &Settings, nodes: &[Value]) -> Result<Vec<Action>, InvalidAction> {
    nodes
        .iter()
        .map(|node| parse_action(settings, node))
        .collect()
}
