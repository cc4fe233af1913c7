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

//! Key names and control characters
//!
//! Resolves the key specs used by `key:` and `ctrl:` actions into the byte
//! sequences a terminal expects. Specs may carry modifiers:
//! - `enter`, `ArrowUp`, `F5`
//! - `alt+enter`, `ctrl-a`, `shift+tab`, `C-A-x`

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::tag_no_case,
    character::complete::one_of,
    combinator::value,
    multi::many0,
    sequence::terminated,
};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Modifier {
    Ctrl,
    Alt,
    Shift,
}

/// A resolved key: the spec as written plus the bytes it sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key {
    name: String,
    sequence: String,
}

impl Key {
    pub fn parse(spec: &str) -> Result<Self, String> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err("key name is empty".to_string());
        }

        let (modifiers, base) = split_modifiers(spec);
        let sequence = encode(&modifiers, base).ok_or_else(|| format!("unknown key '{spec}'"))?;

        Ok(Self {
            name: spec.to_string(),
            sequence,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sequence(&self) -> &str {
        &self.sequence
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A character sent with the control modifier held, e.g. `c` for Ctrl+C.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlChar(char);

impl ControlChar {
    pub fn parse(spec: &str) -> Result<Self, String> {
        let mut chars = spec.chars();
        let (Some(ch), None) = (chars.next(), chars.next()) else {
            return Err(format!("ctrl expects a single character, got '{spec}'"));
        };

        if control_byte(ch).is_none() {
            return Err(format!("'{ch}' has no control character"));
        }
        Ok(Self(ch))
    }

    pub fn char(self) -> char {
        self.0
    }

    pub fn byte(self) -> u8 {
        // Validated in `parse`
        control_byte(self.0).unwrap_or(0)
    }
}

impl fmt::Display for ControlChar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One injected key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEvent<'a> {
    Char(char),
    Key(&'a Key),
    Ctrl(ControlChar),
}

impl KeyEvent<'_> {
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            // Terminals expect a carriage return for Enter
            KeyEvent::Char('\n') => vec![b'\r'],
            KeyEvent::Char(c) => {
                let mut buf = [0u8; 4];
                c.encode_utf8(&mut buf).as_bytes().to_vec()
            }
            KeyEvent::Key(key) => key.sequence().as_bytes().to_vec(),
            KeyEvent::Ctrl(ctrl) => vec![ctrl.byte()],
        }
    }
}

impl fmt::Display for KeyEvent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyEvent::Char(c) => write!(f, "{c}"),
            KeyEvent::Key(key) => write!(f, "<{key}>"),
            KeyEvent::Ctrl(ctrl) => write!(f, "^{}", ctrl.char().to_ascii_uppercase()),
        }
    }
}

fn modifier(input: &str) -> IResult<&str, Modifier> {
    alt((
        value(
            Modifier::Ctrl,
            alt((tag_no_case("control"), tag_no_case("ctrl"), tag_no_case("c"))),
        ),
        value(
            Modifier::Alt,
            alt((
                tag_no_case("alt"),
                tag_no_case("meta"),
                tag_no_case("option"),
                tag_no_case("a"),
                tag_no_case("m"),
            )),
        ),
        value(Modifier::Shift, alt((tag_no_case("shift"), tag_no_case("s")))),
    ))
    .parse(input)
}

fn modifiers(input: &str) -> IResult<&str, Vec<Modifier>> {
    many0(terminated(modifier, one_of("+-"))).parse(input)
}

fn split_modifiers(spec: &str) -> (Vec<Modifier>, &str) {
    match modifiers(spec) {
        // A trailing separator means the key itself is `+` or `-`
        Ok((rest, mods)) if !rest.is_empty() => (mods, rest),
        _ => (Vec::new(), spec),
    }
}

fn named_sequence(name: &str) -> Option<&'static str> {
    let seq = match name.to_ascii_lowercase().as_str() {
        "esc" | "escape" => "\x1b",
        "space" => " ",
        "ret" | "return" | "enter" => "\r",
        "tab" => "\t",
        "backspace" | "bs" => "\x7f",
        "f1" => "\x1bOP",
        "f2" => "\x1bOQ",
        "f3" => "\x1bOR",
        "f4" => "\x1bOS",
        "f5" => "\x1b[15~",
        "f6" => "\x1b[17~",
        "f7" => "\x1b[18~",
        "f8" => "\x1b[19~",
        "f9" => "\x1b[20~",
        "f10" => "\x1b[21~",
        "f11" => "\x1b[23~",
        "f12" => "\x1b[24~",
        "up" | "arrowup" => "\x1b[A",
        "down" | "arrowdown" => "\x1b[B",
        "right" | "arrowright" => "\x1b[C",
        "left" | "arrowleft" => "\x1b[D",
        "home" => "\x1b[H",
        "end" => "\x1b[F",
        "pageup" | "pgup" => "\x1b[5~",
        "pagedown" | "pgdn" => "\x1b[6~",
        "insert" | "ins" => "\x1b[2~",
        "delete" | "del" => "\x1b[3~",
        _ => return None,
    };
    Some(seq)
}

fn single_char(key: &str) -> Option<char> {
    let mut chars = key.chars();
    match (chars.next(), chars.next()) {
        (Some(ch), None) => Some(ch),
        _ => None,
    }
}

fn control_byte(ch: char) -> Option<u8> {
    match ch.to_ascii_lowercase() {
        // Ctrl-letter maps to ASCII 1-26
        c @ 'a'..='z' => Some(c as u8 - b'a' + 1),
        ' ' | '@' => Some(0x00),
        '[' => Some(0x1b),
        '\\' => Some(0x1c),
        ']' => Some(0x1d),
        '^' => Some(0x1e),
        '_' => Some(0x1f),
        _ => None,
    }
}

fn encode(modifiers: &[Modifier], key: &str) -> Option<String> {
    let ctrl = modifiers.contains(&Modifier::Ctrl);
    let alt = modifiers.contains(&Modifier::Alt);
    let shift = modifiers.contains(&Modifier::Shift);

    let base = match (named_sequence(key), single_char(key)) {
        (Some(seq), _) => {
            if ctrl {
                // Only Ctrl-Space has a standard encoding among named keys
                if key.eq_ignore_ascii_case("space") && !shift {
                    "\x00".to_string()
                } else {
                    return None;
                }
            } else if shift {
                if key.eq_ignore_ascii_case("tab") {
                    "\x1b[Z".to_string()
                } else {
                    return None;
                }
            } else {
                seq.to_string()
            }
        }
        (None, Some(ch)) => {
            if ctrl {
                char::from(control_byte(ch)?).to_string()
            } else if shift {
                ch.to_uppercase().to_string()
            } else {
                ch.to_string()
            }
        }
        (None, None) => return None,
    };

    // Alt prefixes the key with ESC
    if alt {
        Some(format!("\x1b{base}"))
    } else {
        Some(base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(spec: &str) -> String {
        Key::parse(spec).unwrap().sequence().to_string()
    }

    #[test]
    fn test_named_keys() {
        assert_eq!(seq("enter"), "\r");
        assert_eq!(seq("Enter"), "\r");
        assert_eq!(seq("ArrowUp"), "\x1b[A");
        assert_eq!(seq("F5"), "\x1b[15~");
        assert_eq!(seq("Escape"), "\x1b");
    }

    #[test]
    fn test_key_keeps_original_name() {
        let key = Key::parse("ArrowUp").unwrap();
        assert_eq!(key.name(), "ArrowUp");
        assert_eq!(key.to_string(), "ArrowUp");
    }

    #[test]
    fn test_modifier_combos() {
        assert_eq!(seq("ctrl+c"), "\x03");
        assert_eq!(seq("C-c"), "\x03");
        assert_eq!(seq("alt+enter"), "\x1b\r");
        assert_eq!(seq("A-space"), "\x1b ");
        assert_eq!(seq("ctrl+space"), "\x00");
        assert_eq!(seq("shift+x"), "X");
        assert_eq!(seq("shift+tab"), "\x1b[Z");
        assert_eq!(seq("ctrl+alt+x"), "\x1b\x18");
    }

    #[test]
    fn test_single_characters() {
        assert_eq!(seq("a"), "a");
        assert_eq!(seq("c"), "c");
        assert_eq!(seq("-"), "-");
        assert_eq!(seq("+"), "+");
    }

    #[test]
    fn test_unencodable_keys_are_rejected() {
        assert!(Key::parse("ctrl+left").is_err());
        assert!(Key::parse("shift+enter").is_err());
        assert!(Key::parse("hyper").is_err());
        assert!(Key::parse("").is_err());
    }

    #[test]
    fn test_control_chars() {
        assert_eq!(ControlChar::parse("c").unwrap().byte(), 0x03);
        assert_eq!(ControlChar::parse("C").unwrap().byte(), 0x03);
        assert_eq!(ControlChar::parse("[").unwrap().byte(), 0x1b);
        assert_eq!(ControlChar::parse(" ").unwrap().byte(), 0x00);
        assert!(ControlChar::parse("cc").is_err());
        assert!(ControlChar::parse("").is_err());
        assert!(ControlChar::parse("1").is_err());
    }

    #[test]
    fn test_key_event_bytes() {
        let key = Key::parse("tab").unwrap();
        assert_eq!(KeyEvent::Char('h').to_bytes(), b"h");
        assert_eq!(KeyEvent::Char('\n').to_bytes(), b"\r");
        assert_eq!(KeyEvent::Char('é').to_bytes(), "é".as_bytes());
        assert_eq!(KeyEvent::Key(&key).to_bytes(), b"\t");
        assert_eq!(
            KeyEvent::Ctrl(ControlChar::parse("d").unwrap()).to_bytes(),
            vec![0x04]
        );
    }

    #[test]
    fn test_key_event_display() {
        let key = Key::parse("enter").unwrap();
        assert_eq!(KeyEvent::Char('h').to_string(), "h");
        assert_eq!(KeyEvent::Key(&key).to_string(), "<enter>");
        assert_eq!(KeyEvent::Ctrl(ControlChar::parse("c").unwrap()).to_string(), "^C");
    }
}
