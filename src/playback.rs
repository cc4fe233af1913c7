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

//! Playback engine for clive scripts
//!
//! Replays parsed actions against a terminal session. Delays, sleeps and
//! pauses all give way to cancellation.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::SessionError;
use crate::keys::KeyEvent;
use crate::session::KeyWriter;
use crate::types::Action;

const RESUME_BUFFER: usize = 8;

/// Sending side of the resume and cancel signals.
#[derive(Debug, Clone)]
pub struct ControlHandle {
    resume: mpsc::Sender<()>,
    cancel: CancellationToken,
}

impl ControlHandle {
    pub fn resume(&self) {
        // A full buffer already holds a resume
        let _ = self.resume.try_send(());
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Receiving side, owned by the playback engine.
#[derive(Debug)]
pub struct Controls {
    resume: mpsc::Receiver<()>,
    cancel: CancellationToken,
}

impl Controls {
    #[cfg(test)]
    pub(crate) fn take_resume(&mut self) -> bool {
        self.resume.try_recv().is_ok()
    }
}

pub fn controls() -> (ControlHandle, Controls) {
    let (tx, rx) = mpsc::channel(RESUME_BUFFER);
    let cancel = CancellationToken::new();
    (
        ControlHandle {
            resume: tx,
            cancel: cancel.clone(),
        },
        Controls { resume: rx, cancel },
    )
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionCursor {
    pub index: usize,
    pub paused: bool,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Completed,
    Cancelled,
}

/// Hooks called as playback moves through a script.
pub trait PlaybackObserver {
    fn action_started(&mut self, _index: usize, _action: &Action) {}

    fn paused(&mut self) {}

    fn resumed(&mut self) {}
}

impl PlaybackObserver for () {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Cancelled,
}

pub struct PlaybackEngine {
    controls: Controls,
    cursor: ExecutionCursor,
}

impl PlaybackEngine {
    pub fn new(controls: Controls) -> Self {
        Self {
            controls,
            cursor: ExecutionCursor::default(),
        }
    }

    pub fn cursor(&self) -> &ExecutionCursor {
        &self.cursor
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.controls.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.controls.cancel.is_cancelled()
    }

    fn mark_cancelled(&mut self) -> Flow {
        self.cursor.cancelled = true;
        Flow::Cancelled
    }

    async fn suspend(&mut self, duration: Duration) -> Flow {
        if self.is_cancelled() {
            return self.mark_cancelled();
        }
        if duration.is_zero() {
            return Flow::Continue;
        }

        let cancelled = tokio::select! {
            biased;
            _ = self.controls.cancel.cancelled() => true,
            _ = sleep(duration) => false,
        };

        if cancelled {
            self.mark_cancelled()
        } else {
            Flow::Continue
        }
    }

    async fn wait_for_resume(&mut self) -> Flow {
        // Only presses made while paused count
        while self.controls.resume.try_recv().is_ok() {}

        self.cursor.paused = true;
        let resumed = tokio::select! {
            biased;
            _ = self.controls.cancel.cancelled() => false,
            Some(()) = self.controls.resume.recv() => true,
        };
        self.cursor.paused = false;

        if resumed {
            Flow::Continue
        } else {
            self.mark_cancelled()
        }
    }

    async fn send<W: KeyWriter>(
        &mut self,
        writer: &mut W,
        event: &KeyEvent<'_>,
    ) -> Result<Flow, SessionError> {
        let result = tokio::select! {
            biased;
            _ = self.controls.cancel.cancelled() => None,
            result = writer.write_key(event) => Some(result),
        };

        match result {
            Some(result) => result.map(|()| Flow::Continue),
            None => Ok(self.mark_cancelled()),
        }
    }

    async fn repeat<W: KeyWriter>(
        &mut self,
        writer: &mut W,
        events: &[KeyEvent<'_>],
        count: u32,
        speed_ms: u64,
    ) -> Result<Flow, SessionError> {
        for repetition in 0..count {
            // Delay between repetitions only, never after the last
            if repetition > 0 && self.suspend(Duration::from_millis(speed_ms)).await == Flow::Cancelled {
                return Ok(Flow::Cancelled);
            }

            for event in events {
                if self.send(writer, event).await? == Flow::Cancelled {
                    return Ok(Flow::Cancelled);
                }
            }
        }
        Ok(Flow::Continue)
    }

    async fn execute_action<W: KeyWriter, O: PlaybackObserver>(
        &mut self,
        writer: &mut W,
        action: &Action,
        observer: &mut O,
    ) -> Result<Flow, SessionError> {
        match action {
            Action::Type {
                text,
                count,
                speed_ms,
            } => {
                let events: Vec<KeyEvent> = text.chars().map(KeyEvent::Char).collect();
                self.repeat(writer, &events, *count, *speed_ms).await
            }
            Action::Key {
                key,
                count,
                speed_ms,
            } => {
                self.repeat(writer, &[KeyEvent::Key(key)], *count, *speed_ms)
                    .await
            }
            Action::Ctrl {
                ctrl,
                count,
                speed_ms,
            } => {
                self.repeat(writer, &[KeyEvent::Ctrl(*ctrl)], *count, *speed_ms)
                    .await
            }
            Action::Sleep { duration_ms } => {
                Ok(self.suspend(Duration::from_millis(*duration_ms)).await)
            }
            Action::Pause => {
                observer.paused();
                let flow = self.wait_for_resume().await;
                if flow == Flow::Continue {
                    observer.resumed();
                }
                Ok(flow)
            }
        }
    }

    pub async fn execute<W: KeyWriter, O: PlaybackObserver>(
        &mut self,
        writer: &mut W,
        actions: &[Action],
        observer: &mut O,
    ) -> Result<PlaybackOutcome, SessionError> {
        self.cursor = ExecutionCursor::default();

        for (index, action) in actions.iter().enumerate() {
            self.cursor.index = index;
            if self.is_cancelled() {
                self.mark_cancelled();
                return Ok(PlaybackOutcome::Cancelled);
            }

            debug!(index, %action, "executing action");
            observer.action_started(index, action);

            if self.execute_action(writer, action, observer).await? == Flow::Cancelled {
                debug!(index, "playback cancelled");
                return Ok(PlaybackOutcome::Cancelled);
            }
        }

        self.cursor.index = actions.len();
        Ok(PlaybackOutcome::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{ControlChar, Key};
    use tokio::time::Instant;

    struct RecordingWriter {
        started: Instant,
        events: Vec<(String, Duration)>,
        fail_on: Option<usize>,
    }

    impl RecordingWriter {
        fn new() -> Self {
            Self {
                started: Instant::now(),
                events: Vec::new(),
                fail_on: None,
            }
        }

        fn keys(&self) -> Vec<&str> {
            self.events.iter().map(|(key, _)| key.as_str()).collect()
        }

        fn times(&self) -> Vec<u64> {
            self.events
                .iter()
                .map(|(_, at)| at.as_millis() as u64)
                .collect()
        }
    }

    impl KeyWriter for RecordingWriter {
        async fn write_key(&mut self, event: &KeyEvent<'_>) -> Result<(), SessionError> {
            if self.fail_on == Some(self.events.len()) {
                return Err(SessionError::Closed);
            }
            self.events.push((event.to_string(), self.started.elapsed()));
            Ok(())
        }
    }

    #[derive(Default)]
    struct Log(Vec<String>);

    impl PlaybackObserver for Log {
        fn action_started(&mut self, index: usize, action: &Action) {
            self.0.push(format!("{index}: {action}"));
        }

        fn paused(&mut self) {
            self.0.push("paused".to_string());
        }

        fn resumed(&mut self) {
            self.0.push("resumed".to_string());
        }
    }

    fn key(name: &str, count: u32, speed_ms: u64) -> Action {
        Action::Key {
            key: Key::parse(name).unwrap(),
            count,
            speed_ms,
        }
    }

    fn text(text: &str, count: u32, speed_ms: u64) -> Action {
        Action::Type {
            text: text.to_string(),
            count,
            speed_ms,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_key_repetitions_delay_between_only() {
        let (_handle, controls) = controls();
        let mut engine = PlaybackEngine::new(controls);
        let mut writer = RecordingWriter::new();

        let outcome = engine
            .execute(&mut writer, &[key("enter", 3, 100)], &mut ())
            .await
            .unwrap();

        assert_eq!(outcome, PlaybackOutcome::Completed);
        assert_eq!(writer.keys(), vec!["<enter>", "<enter>", "<enter>"]);
        assert_eq!(writer.times(), vec![0, 100, 200]);
        assert_eq!(writer.started.elapsed(), Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_type_repeats_whole_text() {
        let (_handle, controls) = controls();
        let mut engine = PlaybackEngine::new(controls);
        let mut writer = RecordingWriter::new();

        engine
            .execute(&mut writer, &[text("hi", 2, 50)], &mut ())
            .await
            .unwrap();

        assert_eq!(writer.keys(), vec!["h", "i", "h", "i"]);
        assert_eq!(writer.times(), vec![0, 0, 50, 50]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ctrl_and_sleep() {
        let (_handle, controls) = controls();
        let mut engine = PlaybackEngine::new(controls);
        let mut writer = RecordingWriter::new();

        let actions = [
            Action::Sleep { duration_ms: 250 },
            Action::Ctrl {
                ctrl: ControlChar::parse("c").unwrap(),
                count: 2,
                speed_ms: 0,
            },
        ];
        engine.execute(&mut writer, &actions, &mut ()).await.unwrap();

        assert_eq!(writer.keys(), vec!["^C", "^C"]);
        assert_eq!(writer.times(), vec![250, 250]);
        assert_eq!(engine.cursor().index, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_waits_for_resume() {
        let (handle, controls) = controls();
        let mut engine = PlaybackEngine::new(controls);
        let mut writer = RecordingWriter::new();
        let mut log = Log::default();

        tokio::spawn(async move {
            sleep(Duration::from_secs(5)).await;
            handle.resume();
        });

        let actions = [key("a", 1, 0), Action::Pause, key("b", 1, 0)];
        let outcome = engine.execute(&mut writer, &actions, &mut log).await.unwrap();

        assert_eq!(outcome, PlaybackOutcome::Completed);
        assert_eq!(writer.times(), vec![0, 5000]);
        assert_eq!(
            log.0,
            vec![
                "0: Key: a",
                "1: Pause: Press enter to continue",
                "paused",
                "resumed",
                "2: Key: b",
            ]
        );
        assert!(!engine.cursor().paused);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_before_pause_is_ignored() {
        let (handle, controls) = controls();
        let mut engine = PlaybackEngine::new(controls);
        let mut writer = RecordingWriter::new();

        handle.resume();
        let late = handle.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(1)).await;
            late.resume();
        });

        engine
            .execute(&mut writer, &[Action::Pause, key("x", 1, 0)], &mut ())
            .await
            .unwrap();

        assert_eq!(writer.times(), vec![1000]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_sleep() {
        let (handle, controls) = controls();
        let mut engine = PlaybackEngine::new(controls);
        let mut writer = RecordingWriter::new();

        tokio::spawn(async move {
            sleep(Duration::from_millis(100)).await;
            handle.cancel();
        });

        let actions = [Action::Sleep { duration_ms: 60_000 }, key("x", 1, 0)];
        let outcome = engine.execute(&mut writer, &actions, &mut ()).await.unwrap();

        assert_eq!(outcome, PlaybackOutcome::Cancelled);
        assert!(writer.events.is_empty());
        assert_eq!(writer.started.elapsed(), Duration::from_millis(100));
        assert_eq!(
            engine.cursor(),
            &ExecutionCursor {
                index: 0,
                paused: false,
                cancelled: true,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_repetition_delay() {
        let (handle, controls) = controls();
        let mut engine = PlaybackEngine::new(controls);
        let mut writer = RecordingWriter::new();

        tokio::spawn(async move {
            sleep(Duration::from_millis(150)).await;
            handle.cancel();
        });

        let outcome = engine
            .execute(&mut writer, &[key("tab", 10, 100)], &mut ())
            .await
            .unwrap();

        assert_eq!(outcome, PlaybackOutcome::Cancelled);
        assert_eq!(writer.times(), vec![0, 100]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_pause() {
        let (handle, controls) = controls();
        let mut engine = PlaybackEngine::new(controls);
        let mut writer = RecordingWriter::new();
        let mut log = Log::default();

        tokio::spawn(async move {
            sleep(Duration::from_secs(2)).await;
            handle.cancel();
        });

        let outcome = engine
            .execute(&mut writer, &[Action::Pause, key("x", 1, 0)], &mut log)
            .await
            .unwrap();

        assert_eq!(outcome, PlaybackOutcome::Cancelled);
        assert!(writer.events.is_empty());
        assert_eq!(log.0.last().map(String::as_str), Some("paused"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_error_aborts_remaining_actions() {
        let (_handle, controls) = controls();
        let mut engine = PlaybackEngine::new(controls);
        let mut writer = RecordingWriter::new();
        writer.fail_on = Some(1);

        let actions = [text("ab", 1, 0), key("enter", 1, 0)];
        let err = engine
            .execute(&mut writer, &actions, &mut ())
            .await
            .unwrap_err();

        assert!(matches!(err, SessionError::Closed));
        assert_eq!(writer.keys(), vec!["a"]);
        assert_eq!(engine.cursor().index, 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let (handle, controls) = controls();
        let mut engine = PlaybackEngine::new(controls);
        let mut writer = RecordingWriter::new();

        handle.cancel();
        let outcome = engine
            .execute(&mut writer, &[key("x", 1, 0)], &mut ())
            .await
            .unwrap();

        assert_eq!(outcome, PlaybackOutcome::Cancelled);
        assert!(writer.events.is_empty());
        assert!(engine.cursor().cancelled);
    }
}
