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

//! Status lines printed to stderr while a script plays

use crossterm::style::Stylize;
use std::io::Write;

use crate::orchestrator::{RunObserver, RunState};
use crate::types::Action;

pub struct StatusLine {
    // Print every action, not just pauses
    verbose: bool,
}

impl StatusLine {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    fn print(&self, line: &str) {
        // Raw mode needs an explicit carriage return
        let mut stderr = std::io::stderr();
        let _ = write!(stderr, "\r\n{line}\r\n");
        let _ = stderr.flush();
    }
}

fn describe(index: usize, total: usize, action: &Action) -> String {
    format!("[{}/{}] {}", index + 1, total, action)
}

impl RunObserver for StatusLine {
    fn state_changed(&mut self, _from: RunState, to: RunState) {
        if self.verbose && to.is_terminal() {
            self.print(&format!("{}", to.to_string().bold()));
        }
    }

    fn action_started(&mut self, index: usize, total: usize, action: &Action) {
        if self.verbose || matches!(action, Action::Pause) {
            self.print(&format!("{}", describe(index, total, action).dim()));
        }
    }
}
