mod app;
mod atlas;
mod cli;
mod config;
mod editor;
mod highlight;
mod input;
mod model;
mod output;
mod overlay;
mod ui;
mod watcher;
mod workflow;

use anyhow::{Context, Result};
use app::{App, AppCommand, UiMessage};
use atlas::{AtlasCli, CommandRunner, probe_docker, probe_login};
use config::{EnvOverlay, EnvironmentResolver, ProjectPaths, read_env_names};
use crossterm::event::{Event, EventStream, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use futures::StreamExt;
use model::SharedStatus;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use std::fs::OpenOptions;
use std::io::{self, Stdout};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use workflow::{StageOutcome, execute_command_line, execute_stage};

type TuiTerminal = Terminal<CrosstermBackend<Stdout>>;

/// Handles background tasks need; cloned into each spawned task.
#[derive(Clone)]
struct TaskContext {
    runner: Arc<dyn CommandRunner>,
    overlay: EnvOverlay,
    work_dir: PathBuf,
    status: SharedStatus,
    ui_tx: mpsc::UnboundedSender<UiMessage>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::parse();
    init_tracing(&args.log_filter, args.log_file.as_deref())?;

    let paths = ProjectPaths::discover()?;
    let overlay = EnvOverlay::default();
    let keys = overlay.reload_from(&paths.env_file);
    info!("loaded {keys} keys from {}", paths.env_file.display());

    let resolver = EnvironmentResolver::new(args.env.clone(), overlay.clone());
    let status = SharedStatus::default();
    let (ui_tx, mut ui_rx) = mpsc::unbounded_channel::<UiMessage>();
    let context = TaskContext {
        runner: Arc::new(AtlasCli::new(paths.work_dir.clone(), overlay.clone())),
        overlay: overlay.clone(),
        work_dir: paths.work_dir.clone(),
        status: status.clone(),
        ui_tx: ui_tx.clone(),
    };

    let mut app = App::new(resolver, paths.clone(), status);
    app.set_known_environments(read_env_names(&paths.atlas_config));

    let watch = watcher::spawn_env_watcher(&paths, overlay, ui_tx);
    let result = run(&mut app, &context, &mut ui_rx).await;
    if let Some(watch) = watch {
        watch.stop();
    }
    result
}

fn init_tracing(level_filter: &str, log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_new(level_filter)
        .or_else(|_| EnvFilter::try_new("info"))
        .context("failed to initialize tracing filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact();

    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            let _ = builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init();
        }
        None => {
            let _ = builder.with_writer(std::io::sink).try_init();
        }
    }

    Ok(())
}

async fn run(
    app: &mut App,
    context: &TaskContext,
    ui_rx: &mut mpsc::UnboundedReceiver<UiMessage>,
) -> Result<()> {
    let mut terminal = init_terminal()?;
    let run_result = run_loop(&mut terminal, app, context, ui_rx).await;
    let restore_result = restore_terminal(&mut terminal);

    match (run_result, restore_result) {
        (Err(run_error), Err(restore_error)) => Err(anyhow::anyhow!(
            "{run_error:#}\nterminal restore error: {restore_error:#}"
        )),
        (Err(error), _) => Err(error),
        (_, Err(error)) => Err(error),
        (Ok(()), Ok(())) => Ok(()),
    }
}

fn init_terminal() -> Result<TuiTerminal> {
    enable_raw_mode().context("failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("failed to create terminal backend")?;
    terminal.clear().context("failed to clear terminal")?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut TuiTerminal) -> Result<()> {
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("failed to leave alternate screen")?;
    terminal.show_cursor().context("failed to show cursor")?;
    Ok(())
}

async fn run_loop(
    terminal: &mut TuiTerminal,
    app: &mut App,
    context: &TaskContext,
    ui_rx: &mut mpsc::UnboundedReceiver<UiMessage>,
) -> Result<()> {
    let mut reader = EventStream::new();

    terminal
        .draw(|frame| ui::render(frame, app))
        .context("failed to render terminal frame")?;
    spawn_status_probes(context);
    let command = app.start();
    execute_app_command(context, command);

    loop {
        terminal
            .draw(|frame| ui::render(frame, app))
            .context("failed to render terminal frame")?;

        if !app.alive() {
            break;
        }

        tokio::select! {
            maybe_event = reader.next() => {
                match maybe_event {
                    Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                        if let Some(action) = input::map_key(app.input_mode(), key) {
                            let command = app.apply_action(action);
                            execute_app_command(context, command);
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(error)) => {
                        return Err(error).context("terminal event stream failed");
                    }
                    None => break,
                }
            }
            maybe_message = ui_rx.recv() => {
                if let Some(message) = maybe_message {
                    let command = app.handle_message(message);
                    execute_app_command(context, command);
                }
            }
        }
    }

    Ok(())
}

/// Starts the background work a command asks for. Never blocks; results come
/// back through the UI channel.
fn execute_app_command(context: &TaskContext, command: AppCommand) {
    match command {
        AppCommand::None => {}
        AppCommand::RunStage {
            ticket,
            stage,
            environment,
        } => {
            debug!("dispatch #{ticket}: {stage} on {environment}");
            spawn_run(context, ticket, move |runner| {
                execute_stage(stage, &environment, runner)
            });
        }
        AppCommand::RunCommandLine { ticket, args } => {
            debug!("dispatch #{ticket}: atlas {}", args.join(" "));
            spawn_run(context, ticket, move |runner| {
                execute_command_line(&args, runner)
            });
        }
        AppCommand::LoadConfigEditor { path } => {
            let ui_tx = context.ui_tx.clone();
            tokio::spawn(async move {
                let result = tokio::fs::read_to_string(&path)
                    .await
                    .map_err(|error| error.to_string());
                let _ = ui_tx.send(UiMessage::ConfigLoaded { path, result });
            });
        }
        AppCommand::SaveConfig { path, content } => {
            let ui_tx = context.ui_tx.clone();
            tokio::spawn(async move {
                let result = tokio::fs::write(&path, content.as_bytes())
                    .await
                    .map_err(|error| {
                        warn!("failed to write {}: {error}", path.display());
                        error.to_string()
                    });
                let _ = ui_tx.send(UiMessage::ConfigSaved { content, result });
            });
        }
        AppCommand::RefreshProbes => spawn_status_probes(context),
    }
}

/// Runs a subprocess job on the blocking pool. A result is always posted so
/// the running flag is released even if the job panics.
fn spawn_run<F>(context: &TaskContext, ticket: u64, job: F)
where
    F: FnOnce(&dyn CommandRunner) -> StageOutcome + Send + 'static,
{
    let runner = Arc::clone(&context.runner);
    let ui_tx = context.ui_tx.clone();
    tokio::spawn(async move {
        let outcome = match tokio::task::spawn_blocking(move || job(runner.as_ref())).await {
            Ok(outcome) => outcome,
            Err(error) => {
                warn!("command task #{ticket} failed: {error}");
                StageOutcome::failed(format!("command task failed: {error}"))
            }
        };
        let _ = ui_tx.send(UiMessage::StageFinished { ticket, outcome });
    });
}

fn spawn_status_probes(context: &TaskContext) {
    let status = context.status.clone();
    let ui_tx = context.ui_tx.clone();
    tokio::spawn(async move {
        let docker_ok = probe_docker().await;
        status.set_docker_ok(docker_ok);
        let _ = ui_tx.send(UiMessage::ProbesUpdated);
    });

    let status = context.status.clone();
    let ui_tx = context.ui_tx.clone();
    let work_dir = context.work_dir.clone();
    let overlay = context.overlay.clone();
    tokio::spawn(async move {
        let logged_in = probe_login(work_dir, overlay).await;
        status.set_logged_in(logged_in);
        let _ = ui_tx.send(UiMessage::ProbesUpdated);
    });
}
