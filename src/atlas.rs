use crate::config::{EnvOverlay, merged_environment};
use crate::model::{CommandResult, Stage};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tokio::process::Command as TokioCommand;
use tokio::time::{Duration, timeout};
use tracing::{debug, warn};

pub const ATLAS_PROGRAM: &str = "atlas";
pub const DOCKER_PROGRAM: &str = "docker";
pub const DOCKER_PROBE_TIMEOUT: Duration = Duration::from_secs(3);
pub const LOGIN_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Argument vectors a stage runs, in order.
pub fn stage_steps(stage: Stage, environment: &str) -> Vec<Vec<String>> {
    let migrate = |subcommand: &str, extra: &[&str]| {
        let mut args = vec![
            "migrate".to_string(),
            subcommand.to_string(),
            "--env".to_string(),
            environment.to_string(),
        ];
        args.extend(extra.iter().map(|arg| arg.to_string()));
        args
    };

    match stage {
        Stage::Status => vec![migrate("status", &[])],
        Stage::Diff => vec![migrate("diff", &[])],
        Stage::Lint => vec![migrate("hash", &[]), migrate("lint", &[])],
        Stage::DryRun => vec![migrate("apply", &["--dry-run"])],
        Stage::Apply => vec![migrate("apply", &[])],
    }
}

/// The command line shown for a stage before it runs.
pub fn projected_command(stage: Stage, environment: &str) -> String {
    stage_steps(stage, environment)
        .iter()
        .map(|args| command_line(args))
        .collect::<Vec<_>>()
        .join(" && ")
}

pub fn command_line(args: &[String]) -> String {
    if args.is_empty() {
        return ATLAS_PROGRAM.to_string();
    }
    format!("{ATLAS_PROGRAM} {}", args.join(" "))
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ParsedCommandLine {
    Empty,
    ForeignProgram,
    Args(Vec<String>),
}

/// Splits an operator-edited line; only `atlas ...` lines are runnable.
pub fn parse_command_line(text: &str) -> ParsedCommandLine {
    let mut words = text.split_whitespace();
    match words.next() {
        None => ParsedCommandLine::Empty,
        Some(ATLAS_PROGRAM) => ParsedCommandLine::Args(words.map(str::to_string).collect()),
        Some(_) => ParsedCommandLine::ForeignProgram,
    }
}

/// Runs the migration tool synchronously. Callers must be on a blocking
/// worker, never on the UI task.
pub trait CommandRunner: Send + Sync {
    fn run(&self, args: &[String]) -> CommandResult;
}

#[derive(Debug, Clone)]
pub struct AtlasCli {
    program: String,
    work_dir: PathBuf,
    overlay: EnvOverlay,
}

impl AtlasCli {
    pub fn new(work_dir: PathBuf, overlay: EnvOverlay) -> Self {
        Self {
            program: ATLAS_PROGRAM.to_string(),
            work_dir,
            overlay,
        }
    }

    fn child_environment(&self) -> BTreeMap<OsString, OsString> {
        merged_environment(std::env::vars_os(), &self.overlay.snapshot())
    }
}

impl CommandRunner for AtlasCli {
    fn run(&self, args: &[String]) -> CommandResult {
        debug!("running {}", command_line(args));
        let output = Command::new(&self.program)
            .args(args)
            .current_dir(&self.work_dir)
            .env_clear()
            .envs(self.child_environment())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output();

        match output {
            Ok(output) => {
                let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
                let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
                if output.status.success() {
                    CommandResult::success(stdout, stderr)
                } else {
                    CommandResult::failure(output.status.to_string(), stdout, stderr)
                }
            }
            Err(error) => {
                warn!("failed to spawn {}: {error}", self.program);
                CommandResult::failure(
                    format!("failed to start {}: {error}", self.program),
                    "",
                    "",
                )
            }
        }
    }
}

pub async fn probe_docker() -> bool {
    probe(DOCKER_PROGRAM, &["info"], DOCKER_PROBE_TIMEOUT, None).await
}

pub async fn probe_login(work_dir: PathBuf, overlay: EnvOverlay) -> bool {
    let environment = merged_environment(std::env::vars_os(), &overlay.snapshot());
    probe(
        ATLAS_PROGRAM,
        &["whoami"],
        LOGIN_PROBE_TIMEOUT,
        Some((work_dir, environment)),
    )
    .await
}

/// Exit status only; output is discarded. Timeouts and spawn errors read as
/// "unavailable".
async fn probe(
    program: &str,
    args: &[&str],
    limit: Duration,
    context: Option<(PathBuf, BTreeMap<OsString, OsString>)>,
) -> bool {
    let mut cmd = TokioCommand::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);
    if let Some((work_dir, environment)) = context {
        cmd.current_dir(work_dir).env_clear().envs(environment);
    }

    match timeout(limit, cmd.status()).await {
        Ok(Ok(status)) => status.success(),
        Ok(Err(error)) => {
            debug!("{program} probe failed to start: {error}");
            false
        }
        Err(_) => {
            warn!("{program} probe timed out after {}s", limit.as_secs());
            false
        }
    }
}
