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

//! Interactive controls for a running playback
//!
//! Enter resumes a paused script and Ctrl-C cancels the run. On a terminal
//! the keys are read in raw mode; otherwise every line on stdin resumes.

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::io::{BufRead, IsTerminal};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::debug;

use crate::playback::ControlHandle;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

// RAII guard for terminal raw mode - only enables if stdout is a TTY
struct RawModeGuard {
    enabled: bool,
}

impl RawModeGuard {
    fn new() -> Result<Self> {
        let enabled = if std::io::stdout().is_terminal() {
            enable_raw_mode().context("Failed to enable raw mode")?;
            true
        } else {
            false
        };
        Ok(RawModeGuard { enabled })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if self.enabled {
            let _ = disable_raw_mode();
        }
    }
}

/// Cancels the run on SIGINT.
pub fn install_interrupt_handler(handle: ControlHandle) -> Result<()> {
    ctrlc::set_handler(move || {
        eprintln!("\nReceived Ctrl-C, stopping playback...");
        handle.cancel();
    })
    .context("Failed to install Ctrl-C handler")
}

pub struct InputListener {
    stop: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
    _raw_mode_guard: Option<RawModeGuard>,
}

impl InputListener {
    pub fn spawn(handle: ControlHandle) -> Result<Self> {
        if std::io::stdin().is_terminal() {
            Self::spawn_terminal(handle)
        } else {
            Ok(Self::spawn_lines(handle))
        }
    }

    fn spawn_terminal(handle: ControlHandle) -> Result<Self> {
        let raw_mode_guard = RawModeGuard::new()?;
        let stop = Arc::new(AtomicBool::new(false));

        let flag = stop.clone();
        let thread = thread::Builder::new()
            .name("clive-input".to_string())
            .spawn(move || {
                while !flag.load(Ordering::SeqCst) {
                    match event::poll(POLL_INTERVAL) {
                        Ok(true) => match event::read() {
                            Ok(Event::Key(key)) => handle_key(&handle, key),
                            Ok(_) => {}
                            Err(_) => break,
                        },
                        Ok(false) => {}
                        Err(_) => break,
                    }
                }
                debug!("input listener stopped");
            })
            .context("Failed to spawn input thread")?;

        Ok(Self {
            stop,
            thread: Some(thread),
            _raw_mode_guard: Some(raw_mode_guard),
        })
    }

    fn spawn_lines(handle: ControlHandle) -> Self {
        // A blocking read cannot be interrupted, so this thread is detached
        let _ = thread::Builder::new()
            .name("clive-input".to_string())
            .spawn(move || {
                for line in std::io::stdin().lock().lines() {
                    if line.is_err() {
                        break;
                    }
                    handle.resume();
                }
            });

        Self {
            stop: Arc::new(AtomicBool::new(false)),
            thread: None,
            _raw_mode_guard: None,
        }
    }
}

impl Drop for InputListener {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        // _raw_mode_guard drops here, restoring terminal state
    }
}

fn handle_key(handle: &ControlHandle, key: event::KeyEvent) {
    if key.kind != KeyEventKind::Press {
        return;
    }

    match key.code {
        KeyCode::Enter => handle.resume(),
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => handle.cancel(),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::controls;

    #[test]
    fn test_enter_resumes() {
        let (handle, mut controls) = controls();
        handle_key(&handle, event::KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE));

        assert!(controls.take_resume());
        assert!(!handle.is_cancelled());
    }

    #[test]
    fn test_ctrl_c_cancels() {
        let (handle, mut controls) = controls();
        handle_key(
            &handle,
            event::KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL),
        );

        assert!(handle.is_cancelled());
        assert!(!controls.take_resume());
    }

    #[test]
    fn test_other_keys_are_ignored() {
        let (handle, mut controls) = controls();
        handle_key(&handle, event::KeyEvent::new(KeyCode::Char('c'), KeyModifiers::NONE));
        handle_key(&handle, event::KeyEvent::new(KeyCode::Esc, KeyModifiers::NONE));

        let mut release = event::KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE);
        release.kind = KeyEventKind::Release;
        handle_key(&handle, release);

        assert!(!handle.is_cancelled());
        assert!(!controls.take_resume());
    }
}
