//! rundash: an interactive operator dashboard around one supervised process.
//!
//! This is the entry point of the application. It parses command-line
//! arguments, loads configuration, wires the supervisor, cleanup executor,
//! log ingestion pipeline, and render scheduler together, and runs the single
//! cooperative event loop that services user input, process output, tailed
//! log files, and timers.

mod actions;
mod app;
mod config;
mod control;
mod events;
mod pipeline;
mod ports;
mod render;
mod resolve;
mod supervisor;
mod tail;
mod terminator;
mod transcript;
mod tui;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::actions::ActionExecutor;
use crate::app::{App, AppAction};
use crate::config::Config;
use crate::events::{tool_line, Event};
use crate::pipeline::{FlushPump, Pipeline};
use crate::render::RenderScheduler;
use crate::resolve::{resolve_latest, LATEST_PLACEHOLDER};
use crate::supervisor::{ExitReport, LaunchKind, LaunchRequest, ProcessSupervisor};
use crate::tail::TailHandle;
use crate::transcript::Transcript;

/// How often templated log patterns are re-resolved against the directory.
const RERESOLVE_INTERVAL: Duration = Duration::from_secs(60);
/// Cadence for reaping the supervised process's exit.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(150);

/// Command-line interface definition.
#[derive(Debug, Parser)]
#[command(
    name = "rundash",
    version,
    about = "Interactive script-runner dashboard with live log panes"
)]
struct Cli {
    /// Path to the rundash.json configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Directory containing launchable script files.
    #[arg(long)]
    scripts_dir: Option<PathBuf>,
    /// Max retained lines per display pane.
    #[arg(long)]
    max_log_lines: Option<usize>,
    /// Redraw throttle in milliseconds.
    #[arg(long)]
    throttle_ms: Option<u64>,
    /// Disable the session transcript file.
    #[arg(long)]
    no_persist_logs: bool,
}

/// One configured log source and its live tail.
struct LogSource {
    pattern: String,
    current: String,
    handle: TailHandle,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from("rundash.json"));
    let mut config = config::load_config(&config_path);
    if let Some(dir) = &cli.scripts_dir {
        config.scripts_dir = dir.clone();
    }
    if let Some(max) = cli.max_log_lines {
        config.settings.max_log_lines = max.max(1);
    }
    if let Some(throttle) = cli.throttle_ms {
        config.settings.render_throttle_ms = throttle.max(1);
    }
    if cli.no_persist_logs {
        config.settings.persist_logs = false;
    }
    run(config).await
}

async fn run(config: Config) -> Result<()> {
    let (event_tx, mut event_rx) = mpsc::channel::<Event>(1024);

    let control = control::platform_control();
    let executor = ActionExecutor::new(control.clone(), event_tx.clone());
    let mut supervisor = ProcessSupervisor::new(control, executor.clone(), event_tx.clone());

    // Resolve each configured pattern and start tailing.
    let mut sources = Vec::new();
    let mut labels = Vec::new();
    for (slot, pattern) in config.logs.iter().enumerate() {
        let current = resolve_latest(pattern);
        labels.push(basename(&current));
        let handle = tail::spawn_tail(slot, PathBuf::from(&current), event_tx.clone());
        sources.push(LogSource {
            pattern: pattern.clone(),
            current,
            handle,
        });
    }

    let transcript = if config.settings.persist_logs {
        match Transcript::create(Path::new("logs")) {
            Ok(transcript) => Some(transcript),
            Err(err) => {
                let _ = event_tx
                    .try_send(Event::Notice(tool_line(&format!(
                        "transcript disabled: {}",
                        err
                    ))));
                None
            }
        }
    } else {
        None
    };

    let mut app = App::new(
        labels,
        config.bindings.clone(),
        config.settings.enable_command_history,
        transcript,
    );
    let slot_count = sources.len() + 1;
    let mut pipeline = Pipeline::new(
        slot_count,
        config.settings.max_queued_log_lines,
        config.settings.log_batch_size,
        config.settings.max_log_lines,
    );
    let mut pump = FlushPump::new();
    let mut scheduler = RenderScheduler::new(config.settings.render_throttle_ms);
    let mut render_deadline: Option<Instant> = None;

    // A templated pattern with no timestamped match fell back to the literal
    // "latest" file name; say so once in the affected pane.
    for (slot, source) in sources.iter().enumerate() {
        if source.pattern.contains(LATEST_PLACEHOLDER)
            && source.current == source.pattern.replace(LATEST_PLACEHOLDER, "latest")
        {
            ingest(
                &mut pipeline,
                &mut pump,
                slot,
                tool_line(&format!(
                    "no timestamped file matches {}; tailing {}",
                    source.pattern,
                    basename(&source.current)
                )),
            );
        }
    }

    // Startup cleanup runs in the background; its reports stream into the
    // output pane like any other notice.
    {
        let executor = executor.clone();
        let startup = config.startup_actions.clone();
        tokio::spawn(async move {
            executor.run(&startup).await;
        });
    }

    let mut terminal = tui::init_terminal()?;
    spawn_input_listener(event_tx.clone());
    spawn_signal_listener(event_tx.clone());

    let mut reresolve = tokio::time::interval(RERESOLVE_INTERVAL);
    let mut exit_poll = tokio::time::interval(EXIT_POLL_INTERVAL);

    tui::draw(&mut app, &mut terminal)?;

    let result = loop {
        tokio::select! {
            biased;
            maybe_event = event_rx.recv() => {
                let Some(event) = maybe_event else { break Ok(()) };
                if let Err(err) = handle_event(
                    event,
                    &config,
                    &mut app,
                    &mut supervisor,
                    &mut pipeline,
                    &mut pump,
                    &mut terminal,
                ) {
                    break Err(err);
                }
            }
            _ = sleep_until_deadline(render_deadline), if render_deadline.is_some() => {
                if let Err(err) = tui::draw(&mut app, &mut terminal) {
                    break Err(err.into());
                }
                scheduler.fired();
                render_deadline = None;
            }
            _ = exit_poll.tick() => {
                if let Some(report) = supervisor.poll_exit() {
                    report_exit(&report, &config, &mut app, &mut pipeline, &mut pump);
                }
            }
            _ = reresolve.tick() => {
                repoint_sources(&mut sources, &mut app, &mut pipeline, &mut pump, &event_tx);
            }
            _ = std::future::ready(()), if pump.has_work() => {
                if let Some(slot) = pump.next() {
                    if pipeline.flush_batch(slot, &mut app) {
                        pump.arm(slot);
                    }
                    if let Some(delay) = scheduler.request() {
                        render_deadline = Some(Instant::now() + delay);
                    }
                }
            }
        }

        if app.should_quit {
            break Ok(());
        }
    };

    // Exit always requests termination of the current process first; the
    // spawned kill task delivers the graceful signal before we tear down.
    supervisor.shutdown();
    tokio::time::sleep(Duration::from_millis(100)).await;
    for source in &sources {
        source.handle.detach();
    }
    tui::restore_terminal(terminal)?;
    result
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}

#[allow(clippy::too_many_arguments)]
fn handle_event(
    event: Event,
    config: &Config,
    app: &mut App,
    supervisor: &mut ProcessSupervisor,
    pipeline: &mut Pipeline,
    pump: &mut FlushPump,
    terminal: &mut tui::TuiTerminal,
) -> Result<()> {
    match event {
        Event::ProcessOutput { line, .. } => {
            ingest(pipeline, pump, app.output_slot, line);
        }
        Event::Notice(line) => {
            ingest(pipeline, pump, app.output_slot, line);
        }
        Event::TailLine { slot, line } => {
            ingest(pipeline, pump, slot, line);
        }
        Event::TailError { slot, message } => {
            ingest(pipeline, pump, slot, tool_line(&format!("tail error: {}", message)));
        }
        Event::ProcessSpawned { seq, process } => {
            supervisor.on_spawned(seq, process);
        }
        Event::LaunchFailed { seq, error } => {
            if supervisor.on_launch_failed(seq, &error) {
                app.set_output_label("no process");
            }
        }
        Event::Key(key) => {
            let action = app.handle_key(key);
            dispatch_action(action, config, app, supervisor, terminal)?;
        }
        Event::Resize { .. } => {
            let _ = terminal.autoresize();
            tui::draw(app, terminal)?;
        }
        Event::Shutdown => {
            app.should_quit = true;
        }
    }
    Ok(())
}

fn dispatch_action(
    action: AppAction,
    config: &Config,
    app: &mut App,
    supervisor: &mut ProcessSupervisor,
    terminal: &mut tui::TuiTerminal,
) -> Result<()> {
    match action {
        AppAction::None => {}
        AppAction::Quit => {
            app.should_quit = true;
        }
        AppAction::StopProcess => {
            if supervisor.stop() {
                app.set_output_label("no process");
                app.set_status("stop requested");
            }
            // Stop is latency-sensitive: render past the throttle.
            tui::draw(app, terminal)?;
        }
        AppAction::ReplayLast => match supervisor.replay_last() {
            Some(request) => launch(request, config, app, supervisor),
            None => {
                app.set_status("no previous command to repeat");
                tui::draw(app, terminal)?;
            }
        },
        AppAction::Launch(target) => {
            let request = LaunchRequest::from_target(&target, &config.scripts_dir);
            launch(request, config, app, supervisor);
        }
        AppAction::Submit(command) => {
            launch(LaunchRequest::custom(&command), config, app, supervisor);
        }
        AppAction::Redraw => {
            // Focus and scroll changes bypass the throttle.
            tui::draw(app, terminal)?;
        }
    }
    Ok(())
}

fn launch(
    request: LaunchRequest,
    config: &Config,
    app: &mut App,
    supervisor: &mut ProcessSupervisor,
) {
    let actions = config.pre_launch_actions(&request.identifier).to_vec();
    app.set_output_label(&request.identifier);
    app.set_status(format!("launching {}", request.identifier));
    supervisor.begin_launch(request, actions);
}

fn report_exit(
    report: &ExitReport,
    config: &Config,
    app: &mut App,
    pipeline: &mut Pipeline,
    pump: &mut FlushPump,
) {
    let what = match report.kind {
        LaunchKind::Script => "script",
        LaunchKind::CustomCommand => "command",
    };
    let runtime = format!("{:.1}s", report.runtime.as_secs_f64());
    let line = match report.code {
        Some(0) => format!("{} exited successfully after {}", what, runtime),
        Some(code) => format!("{} exited with code {} after {}", what, code, runtime),
        None => format!("{} terminated by signal after {}", what, runtime),
    };
    ingest(pipeline, pump, app.output_slot, tool_line(&line));
    if config.settings.notify_on_exit {
        ring_bell();
        ingest(pipeline, pump, app.output_slot, tool_line("[✓] done"));
    }
    app.set_output_label("no process");
}

/// Re-resolves templated patterns; on change, detaches the old tail, resets
/// the slot's queue, and attaches a fresh tail to the same pane.
fn repoint_sources(
    sources: &mut [LogSource],
    app: &mut App,
    pipeline: &mut Pipeline,
    pump: &mut FlushPump,
    event_tx: &mpsc::Sender<Event>,
) {
    for (slot, source) in sources.iter_mut().enumerate() {
        if !source.pattern.contains(LATEST_PLACEHOLDER) {
            continue;
        }
        let resolved = resolve_latest(&source.pattern);
        if resolved == source.current {
            continue;
        }
        source.handle.detach();
        pipeline.reset_slot(slot);
        app.set_slot_label(slot, basename(&resolved));
        ingest(
            pipeline,
            pump,
            slot,
            tool_line(&format!("now tailing {}", basename(&resolved))),
        );
        source.handle = tail::spawn_tail(slot, PathBuf::from(&resolved), event_tx.clone());
        source.current = resolved;
    }
}

fn ingest(pipeline: &mut Pipeline, pump: &mut FlushPump, slot: usize, line: String) {
    if pipeline.enqueue(slot, line) {
        pump.arm(slot);
    }
}

fn basename(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

fn ring_bell() {
    let mut stdout = std::io::stdout();
    let _ = stdout.write_all(b"\x07");
    let _ = stdout.flush();
}

fn spawn_input_listener(tx: mpsc::Sender<Event>) {
    std::thread::spawn(move || loop {
        if crossterm::event::poll(Duration::from_millis(100)).unwrap_or(false) {
            match crossterm::event::read() {
                Ok(crossterm::event::Event::Key(key)) => {
                    if tx.blocking_send(Event::Key(key)).is_err() {
                        break;
                    }
                }
                Ok(crossterm::event::Event::Resize(width, height)) => {
                    let _ = tx.blocking_send(Event::Resize { width, height });
                }
                _ => {}
            }
        }
    });
}

fn spawn_signal_listener(tx: mpsc::Sender<Event>) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(signal) => signal,
                Err(_) => return,
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    let _ = tx.send(Event::Shutdown).await;
                }
                _ = sigterm.recv() => {
                    let _ = tx.send(Event::Shutdown).await;
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            let _ = tx.send(Event::Shutdown).await;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basename_keeps_only_the_file_name() {
        assert_eq!(basename("logs/app-2024-01-02.log"), "app-2024-01-02.log");
        assert_eq!(basename("plain.log"), "plain.log");
    }
}
