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

//! Terminal session management
//!
//! Starts the terminal bridge on a freshly allocated port and hands out a
//! session that keys can be written to.

use std::future::Future;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, trace};

use crate::bridge::BridgeConnection;
use crate::error::SessionError;
use crate::keys::KeyEvent;
use crate::net::{Listen, PortAllocator, TcpNet};

const CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Anything keys can be injected into.
pub trait KeyWriter {
    fn write_key(&mut self, event: &KeyEvent<'_>) -> impl Future<Output = Result<(), SessionError>>;
}

pub trait TerminalSession: KeyWriter {
    fn port(&self) -> u16;

    /// Resolves once the bridge accepts connections.
    fn wait_ready(&mut self) -> impl Future<Output = Result<(), SessionError>>;

    /// Terminates the bridge. Calling it again is a no-op.
    fn stop(&mut self) -> impl Future<Output = Result<(), SessionError>>;
}

pub trait Launcher {
    type Session: TerminalSession;

    fn start(&self, login_command: &str) -> impl Future<Output = Result<Self::Session, SessionError>>;
}

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub program: String,
    // Passed to the bridge ahead of the generated arguments
    pub args: Vec<String>,
    pub size: (u16, u16),
    pub mirror_output: bool,
    pub connect_timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            program: "ttyd".to_string(),
            args: Vec::new(),
            size: (80, 24),
            mirror_output: true,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

pub struct SessionManager<N = TcpNet> {
    allocator: PortAllocator<N>,
    config: BridgeConfig,
}

impl SessionManager<TcpNet> {
    pub fn new(config: BridgeConfig) -> Self {
        Self::with_allocator(PortAllocator::new(), config)
    }
}

impl<N: Listen> SessionManager<N> {
    pub fn with_allocator(allocator: PortAllocator<N>, config: BridgeConfig) -> Self {
        Self { allocator, config }
    }

    fn bridge_command(&self, port: u16, login_command: &str) -> Command {
        let mut cmd = Command::new(&self.config.program);
        cmd.args(&self.config.args)
            .arg("--port")
            .arg(port.to_string())
            .arg("--writable")
            .arg("sh")
            .arg("-c")
            .arg(login_command)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        cmd
    }
}

impl<N: Listen> Launcher for SessionManager<N> {
    type Session = Session;

    async fn start(&self, login_command: &str) -> Result<Session, SessionError> {
        let port = self.allocator.allocate()?;

        let child = self
            .bridge_command(port, login_command)
            .spawn()
            .map_err(|source| SessionError::Spawn {
                program: self.config.program.clone(),
                source,
            })?;

        info!(
            port,
            pid = child.id(),
            program = %self.config.program,
            "terminal bridge started"
        );

        Ok(Session {
            port,
            child: Some(child),
            connection: None,
            config: self.config.clone(),
        })
    }
}

pub struct Session {
    port: u16,
    child: Option<Child>,
    connection: Option<BridgeConnection>,
    config: BridgeConfig,
}

impl Session {
    pub fn is_running(&self) -> bool {
        self.child.is_some()
    }
}

impl KeyWriter for Session {
    async fn write_key(&mut self, event: &KeyEvent<'_>) -> Result<(), SessionError> {
        if self.connection.is_none() {
            self.wait_ready().await?;
        }
        let connection = self.connection.as_mut().ok_or(SessionError::Closed)?;

        connection
            .send_input(&event.to_bytes())
            .await
            .map_err(|e| SessionError::Write(Box::new(e)))
    }
}

impl TerminalSession for Session {
    fn port(&self) -> u16 {
        self.port
    }

    async fn wait_ready(&mut self) -> Result<(), SessionError> {
        if self.connection.is_some() {
            return Ok(());
        }

        let deadline = Instant::now() + self.config.connect_timeout;
        let mut last_error = None;
        loop {
            let child = self.child.as_mut().ok_or(SessionError::Closed)?;
            if let Some(status) = child.try_wait().map_err(SessionError::Process)? {
                return Err(SessionError::BridgeExited {
                    status: status.to_string(),
                });
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(match last_error {
                    Some(e) => SessionError::Connect {
                        port: self.port,
                        source: Box::new(e),
                    },
                    None => SessionError::ConnectTimeout { port: self.port },
                });
            }

            // Bounded by the deadline and cut short if the bridge exits
            let attempt = tokio::select! {
                status = child.wait() => {
                    let status = status.map_err(SessionError::Process)?;
                    return Err(SessionError::BridgeExited {
                        status: status.to_string(),
                    });
                }
                attempt = timeout(
                    remaining,
                    BridgeConnection::connect(self.port, self.config.size, self.config.mirror_output),
                ) => attempt,
            };

            match attempt {
                Ok(Ok(connection)) => {
                    debug!(port = self.port, "connected to terminal bridge");
                    self.connection = Some(connection);
                    return Ok(());
                }
                Ok(Err(e)) => {
                    trace!(port = self.port, error = %e, "terminal bridge not ready");
                    last_error = Some(e);
                    sleep(CONNECT_RETRY_INTERVAL.min(remaining)).await;
                }
                Err(_) => return Err(SessionError::ConnectTimeout { port: self.port }),
            }
        }
    }

    async fn stop(&mut self) -> Result<(), SessionError> {
        if let Some(connection) = self.connection.take() {
            connection.close().await;
        }

        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        if child.try_wait().map_err(SessionError::Process)?.is_none() {
            child.kill().await.map_err(SessionError::Process)?;
        }

        info!(port = self.port, "terminal bridge stopped");
        Ok(())
    }
}
