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

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clive::input::{InputListener, install_interrupt_handler};
use clive::session::{BridgeConfig, SessionManager};
use clive::status::StatusLine;
use clive::{Orchestrator, RunError, ScriptSource, logging, playback};

/// Replay scripted keystrokes into a live terminal session
#[derive(Parser, Debug)]
#[command(name = "clive", version, about)]
struct Args {
    /// Script to play
    #[arg(short, long, default_value = "clive.yml")]
    config: PathBuf,

    /// Terminal bridge executable
    #[arg(long, env = "CLIVE_TTYD", default_value = "ttyd")]
    ttyd: String,

    /// Extra argument for the terminal bridge (repeatable)
    #[arg(long = "bridge-arg", value_name = "ARG", allow_hyphen_values = true)]
    bridge_args: Vec<String>,

    /// Do not mirror the session to this terminal
    #[arg(long)]
    no_mirror: bool,

    /// Seconds to wait for the bridge to accept a connection
    #[arg(long, default_value_t = 10)]
    connect_timeout: u64,

    /// Times to start the bridge if it exits before accepting a connection
    #[arg(long, default_value_t = 3)]
    start_attempts: u32,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

async fn play(args: Args) -> Result<()> {
    let (handle, controls) = playback::controls();
    install_interrupt_handler(handle.clone())?;

    let size = crossterm::terminal::size().unwrap_or((80, 24));
    let config = BridgeConfig {
        program: args.ttyd,
        args: args.bridge_args,
        size,
        mirror_output: !args.no_mirror,
        connect_timeout: Duration::from_secs(args.connect_timeout),
    };

    let mut orchestrator = Orchestrator::new(SessionManager::new(config), controls)
        .with_observer(StatusLine::new(args.no_mirror))
        .with_start_attempts(args.start_attempts);

    let listener = InputListener::spawn(handle)?;
    let result = orchestrator.run(&ScriptSource::File(args.config)).await;

    // Restore the terminal before anything is reported
    drop(listener);
    result?;
    Ok(())
}

fn run(args: Args) -> Result<()> {
    logging::init(args.log_file.as_deref())?;

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime.block_on(play(args))
}

fn main() -> ExitCode {
    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            let code = err.downcast_ref::<RunError>().map_or(1, RunError::exit_code);
            ExitCode::from(code)
        }
    }
}
