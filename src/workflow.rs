use crate::atlas::{CommandRunner, command_line, stage_steps};
use crate::model::Stage;
use crate::output::{OutputBlock, render_result};

pub const DIFF_HINT: &str = "Tab to move to next stage.";
pub const APPLY_BANNER: &str = "Apply completed successfully.";

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum DispatchKind {
    Stage,
    CommandLine,
}

/// One in-flight command, identified by the ticket its result must carry.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Dispatch {
    pub ticket: u64,
    pub stage: Stage,
    pub kind: DispatchKind,
}

/// Current stage plus the at-most-one-in-flight guard.
#[derive(Debug, Clone)]
pub struct Workflow {
    stage: Stage,
    in_flight: Option<Dispatch>,
    next_ticket: u64,
}

impl Default for Workflow {
    fn default() -> Self {
        Self {
            stage: Stage::Status,
            in_flight: None,
            next_ticket: 1,
        }
    }
}

impl Workflow {
    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn running(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn next(&mut self) -> Stage {
        self.stage = self.stage.next();
        self.stage
    }

    pub fn previous(&mut self) -> Stage {
        self.stage = self.stage.previous();
        self.stage
    }

    /// Check-and-set of the running flag. `None` while another command runs.
    pub fn try_begin(&mut self, kind: DispatchKind) -> Option<Dispatch> {
        if self.in_flight.is_some() {
            return None;
        }
        let dispatch = Dispatch {
            ticket: self.next_ticket,
            stage: self.stage,
            kind,
        };
        self.next_ticket += 1;
        self.in_flight = Some(dispatch);
        Some(dispatch)
    }

    /// Clears the running flag if `ticket` is the in-flight one.
    pub fn finish(&mut self, ticket: u64) -> Option<Dispatch> {
        match self.in_flight {
            Some(dispatch) if dispatch.ticket == ticket => self.in_flight.take(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum StageOutcome {
    Output(Vec<OutputBlock>),
    Preview { command: String, text: String },
}

impl StageOutcome {
    pub fn failed(summary: impl Into<String>) -> Self {
        Self::Output(vec![OutputBlock::Failure {
            summary: summary.into(),
            stderr: String::new(),
            stdout: String::new(),
        }])
    }
}

/// Runs every step of `stage` through `runner` and shapes the result.
pub fn execute_stage(stage: Stage, environment: &str, runner: &dyn CommandRunner) -> StageOutcome {
    let steps = stage_steps(stage, environment);
    match (stage, steps.as_slice()) {
        (Stage::Lint, [hash, lint]) => execute_lint(hash, lint, runner),
        (Stage::DryRun, [args]) => {
            let result = runner.run(args);
            if result.is_success() {
                StageOutcome::Preview {
                    command: command_line(args),
                    text: result.combined(),
                }
            } else {
                StageOutcome::Output(render_result(&result))
            }
        }
        (Stage::Diff, [args]) => {
            let result = runner.run(args);
            let mut blocks = render_result(&result);
            if result.is_success() {
                blocks.push(OutputBlock::notice(DIFF_HINT));
            }
            StageOutcome::Output(blocks)
        }
        (Stage::Apply, [args]) => {
            let result = runner.run(args);
            let mut blocks = render_result(&result);
            if result.is_success() {
                blocks.insert(0, OutputBlock::Banner(APPLY_BANNER.to_string()));
            }
            StageOutcome::Output(blocks)
        }
        (_, steps) => StageOutcome::Output(
            steps
                .iter()
                .flat_map(|args| render_result(&runner.run(args)))
                .collect(),
        ),
    }
}

fn execute_lint(hash: &[String], lint: &[String], runner: &dyn CommandRunner) -> StageOutcome {
    let hashed = runner.run(hash);
    if !hashed.is_success() {
        return StageOutcome::Output(render_result(&hashed));
    }

    let linted = runner.run(lint);
    let mut blocks = vec![
        OutputBlock::Text(hashed.combined()),
        OutputBlock::CommandLine(command_line(lint)),
    ];
    blocks.extend(render_result(&linted));
    StageOutcome::Output(blocks)
}

pub fn execute_command_line(args: &[String], runner: &dyn CommandRunner) -> StageOutcome {
    StageOutcome::Output(render_result(&runner.run(args)))
}
