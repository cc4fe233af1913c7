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

//! Error types for script loading, session management and runs

use std::fmt;
use std::io;
use std::path::PathBuf;

use serde_yaml::Value;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// A script node that could not be parsed into an action.
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidAction {
    node: Value,
    reason: String,
}

impl InvalidAction {
    pub fn new(node: &Value, reason: impl Into<String>) -> Self {
        Self {
            node: node.clone(),
            reason: reason.into(),
        }
    }

    pub fn node(&self) -> &Value {
        &self.node
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl fmt::Display for InvalidAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let node = serde_json::to_string(&self.node).unwrap_or_else(|_| format!("{:?}", self.node));
        write!(f, "invalid action {node}: {}", self.reason)
    }
}

impl std::error::Error for InvalidAction {}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error(transparent)]
    InvalidAction(#[from] InvalidAction),
}

#[derive(Debug, Error)]
pub enum AllocationError {
    #[error("failed to open a listener")]
    Listen(#[source] io::Error),

    #[error("failed to read the listener address")]
    LocalAddr(#[source] io::Error),

    #[error("failed to close the listener")]
    Close(#[source] io::Error),

    #[error("the operating system assigned port 0")]
    Unassigned,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Allocation(#[from] AllocationError),

    #[error("failed to spawn {program}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("terminal bridge exited before accepting a connection ({status})")]
    BridgeExited { status: String },

    #[error("failed to connect to the terminal bridge on port {port}")]
    Connect {
        port: u16,
        #[source]
        source: Box<tungstenite::Error>,
    },

    #[error("terminal bridge on port {port} did not complete the connection in time")]
    ConnectTimeout { port: u16 },

    #[error("failed to send key to the terminal bridge")]
    Write(#[source] Box<tungstenite::Error>),

    #[error("terminal session is closed")]
    Closed,

    #[error("failed to inspect the terminal bridge process")]
    Process(#[source] io::Error),
}

impl SessionError {
    /// True when a fresh start on another port may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SessionError::BridgeExited { .. })
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to allocate a port for the terminal bridge")]
    Allocation(#[source] AllocationError),

    #[error("failed to start the terminal session")]
    SessionStart(#[source] SessionError),

    #[error("failed to inject keys into the terminal session")]
    KeyInjection(#[source] SessionError),

    #[error("cancelled")]
    Cancelled,
}

impl RunError {
    /// Errors raised while bringing a session up.
    pub fn starting(err: SessionError) -> Self {
        match err {
            SessionError::Allocation(err) => RunError::Allocation(err),
            other => RunError::SessionStart(other),
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            RunError::Cancelled => 130,
            _ => 1,
        }
    }
}
