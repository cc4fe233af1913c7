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

//! Run orchestration
//!
//! Drives one run from script loading to session teardown:
//!
//! ```text
//! Idle -> LoadingScript -> StartingSession -> Running <-> Paused -> Completed
//! ```
//!
//! Any non-terminal state may end in `Errored` or `Cancelled`. The session,
//! once started, is stopped before a terminal state is entered.

use std::fmt;
use std::path::PathBuf;
use tracing::{error, info, warn};

use crate::config;
use crate::error::{ConfigError, RunError};
use crate::playback::{Controls, ExecutionCursor, PlaybackEngine, PlaybackObserver, PlaybackOutcome};
use crate::session::{Launcher, TerminalSession};
use crate::types::{Action, Script};

const DEFAULT_START_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    LoadingScript,
    StartingSession,
    Running,
    Paused,
    Completed,
    Errored,
    Cancelled,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Completed | RunState::Errored | RunState::Cancelled)
    }

    pub fn can_transition_to(self, next: RunState) -> bool {
        use RunState::*;

        match (self, next) {
            (from, Errored | Cancelled) => !from.is_terminal(),
            (Idle, LoadingScript)
            | (LoadingScript, StartingSession)
            | (StartingSession, Running)
            | (Running, Paused)
            | (Paused, Running)
            | (Running, Completed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Notified as a run progresses.
pub trait RunObserver {
    fn state_changed(&mut self, _from: RunState, _to: RunState) {}

    fn action_started(&mut self, _index: usize, _total: usize, _action: &Action) {}
}

impl RunObserver for () {}

#[derive(Debug, Clone)]
pub enum ScriptSource {
    File(PathBuf),
    Text(String),
}

impl ScriptSource {
    pub fn load(&self) -> Result<Script, ConfigError> {
        match self {
            ScriptSource::File(path) => config::load(path),
            ScriptSource::Text(text) => config::parse_script(text),
        }
    }
}

struct StateMachine<O> {
    state: RunState,
    history: Vec<RunState>,
    observer: O,
}

impl<O: RunObserver> StateMachine<O> {
    fn new(observer: O) -> Self {
        Self {
            state: RunState::Idle,
            history: vec![RunState::Idle],
            observer,
        }
    }

    fn transition(&mut self, next: RunState) {
        let from = self.state;
        if !from.can_transition_to(next) {
            warn!(%from, to = %next, "ignoring invalid state transition");
            return;
        }

        info!(%from, to = %next, "run state changed");
        self.state = next;
        self.history.push(next);
        self.observer.state_changed(from, next);
    }
}

// Bridges playback hooks onto the state machine
struct Progress<'a, O> {
    machine: &'a mut StateMachine<O>,
    total: usize,
}

impl<O: RunObserver> PlaybackObserver for Progress<'_, O> {
    fn action_started(&mut self, index: usize, action: &Action) {
        self.machine
            .observer
            .action_started(index, self.total, action);
    }

    fn paused(&mut self) {
        self.machine.transition(RunState::Paused);
    }

    fn resumed(&mut self) {
        self.machine.transition(RunState::Running);
    }
}

pub struct Orchestrator<L, O = ()> {
    launcher: L,
    engine: PlaybackEngine,
    machine: StateMachine<O>,
    start_attempts: u32,
}

impl<L: Launcher> Orchestrator<L> {
    pub fn new(launcher: L, controls: Controls) -> Self {
        Self {
            launcher,
            engine: PlaybackEngine::new(controls),
            machine: StateMachine::new(()),
            start_attempts: DEFAULT_START_ATTEMPTS,
        }
    }
}

impl<L: Launcher, O: RunObserver> Orchestrator<L, O> {
    pub fn with_observer<P: RunObserver>(self, observer: P) -> Orchestrator<L, P> {
        Orchestrator {
            launcher: self.launcher,
            engine: self.engine,
            machine: StateMachine::new(observer),
            start_attempts: self.start_attempts,
        }
    }

    /// Attempts made when the bridge dies before accepting a connection.
    pub fn with_start_attempts(mut self, attempts: u32) -> Self {
        self.start_attempts = attempts.max(1);
        self
    }

    pub fn state(&self) -> RunState {
        self.machine.state
    }

    pub fn history(&self) -> &[RunState] {
        &self.machine.history
    }

    pub fn cursor(&self) -> &ExecutionCursor {
        self.engine.cursor()
    }

    pub fn observer(&self) -> &O {
        &self.machine.observer
    }

    pub async fn run(&mut self, source: &ScriptSource) -> Result<(), RunError> {
        self.machine.transition(RunState::LoadingScript);
        let script = match source.load() {
            Ok(script) => script,
            Err(e) => return self.finish(None, Err(e.into())).await,
        };

        if self.engine.is_cancelled() {
            return self.finish(None, Err(RunError::Cancelled)).await;
        }

        self.machine.transition(RunState::StartingSession);
        let mut session = match self.start_session(&script.settings.login_command).await {
            Ok(session) => session,
            Err(e) => return self.finish(None, Err(e)).await,
        };

        self.machine.transition(RunState::Running);
        let mut progress = Progress {
            machine: &mut self.machine,
            total: script.actions.len(),
        };
        let result = match self
            .engine
            .execute(&mut session, &script.actions, &mut progress)
            .await
        {
            Ok(PlaybackOutcome::Completed) => Ok(()),
            Ok(PlaybackOutcome::Cancelled) => Err(RunError::Cancelled),
            Err(e) => Err(RunError::KeyInjection(e)),
        };

        self.finish(Some(session), result).await
    }

    async fn start_session(&mut self, login_command: &str) -> Result<L::Session, RunError> {
        let cancel = self.engine.cancel_token();
        let mut attempt = 1;

        loop {
            let started = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RunError::Cancelled),
                started = self.launcher.start(login_command) => started,
            };
            let mut session = started.map_err(RunError::starting)?;

            let ready = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                ready = session.wait_ready() => Some(ready),
            };

            match ready {
                Some(Ok(())) => return Ok(session),
                None => {
                    stop_session(&mut session).await;
                    return Err(RunError::Cancelled);
                }
                Some(Err(e)) => {
                    stop_session(&mut session).await;
                    if e.is_retryable() && attempt < self.start_attempts {
                        warn!(
                            attempt,
                            port = session.port(),
                            error = %e,
                            "terminal bridge failed to start, retrying on a new port"
                        );
                        attempt += 1;
                        continue;
                    }
                    return Err(RunError::starting(e));
                }
            }
        }
    }

    async fn finish(
        &mut self,
        session: Option<L::Session>,
        result: Result<(), RunError>,
    ) -> Result<(), RunError> {
        if let Some(mut session) = session {
            stop_session(&mut session).await;
        }

        let terminal = match &result {
            Ok(()) => RunState::Completed,
            Err(RunError::Cancelled) => RunState::Cancelled,
            Err(e) => {
                error!(error = %e, "run failed");
                RunState::Errored
            }
        };
        self.machine.transition(terminal);
        result
    }
}

async fn stop_session<S: TerminalSession>(session: &mut S) {
    if let Err(e) = session.stop().await {
        warn!(port = session.port(), error = %e, "failed to stop terminal session");
    }
}
