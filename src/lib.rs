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

//! clive replays scripted keystrokes into a live terminal session served by
//! a ttyd bridge, for recording and demonstrating command-line sessions.

pub mod bridge;
pub mod config;
pub mod error;
pub mod input;
pub mod keys;
pub mod logging;
pub mod net;
pub mod orchestrator;
pub mod parser;
pub mod playback;
pub mod session;
pub mod status;
pub mod types;

pub use error::{ConfigError, RunError, SessionError};
pub use orchestrator::{Orchestrator, RunState, ScriptSource};
pub use types::{Action, Script, Settings};
