use crate::atlas::{ParsedCommandLine, parse_command_line, projected_command};
use crate::config::{
    EnvironmentResolver, EnvironmentSource, ProjectPaths, is_production_like, scan_env_names,
};
use crate::editor::LineEditor;
use crate::input::{Action, InputMode};
use crate::model::{ProbeStatus, SharedStatus, Stage};
use crate::output::{OutputBlock, OutputPane};
use crate::overlay::{
    ConfigEditor, ConfirmModal, HelpDialog, Overlay, OverlayEvent, PreviewPane,
};
use crate::workflow::{DispatchKind, StageOutcome, Workflow};
use chrono::{DateTime, Local};
use std::path::PathBuf;
use tracing::debug;

pub const RUNNING_MESSAGE: &str = "Running...";
pub const FOREIGN_PROGRAM_MESSAGE: &str =
    "Command must start with 'atlas' (e.g. atlas migrate status --env local)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCommand {
    None,
    RunStage {
        ticket: u64,
        stage: Stage,
        environment: String,
    },
    RunCommandLine {
        ticket: u64,
        args: Vec<String>,
    },
    LoadConfigEditor {
        path: PathBuf,
    },
    SaveConfig {
        path: PathBuf,
        content: String,
    },
    RefreshProbes,
}

/// Posted by background tasks; drained by the event loop only.
#[derive(Debug)]
pub enum UiMessage {
    StageFinished {
        ticket: u64,
        outcome: StageOutcome,
    },
    ConfigLoaded {
        path: PathBuf,
        result: Result<String, String>,
    },
    ConfigSaved {
        content: String,
        result: Result<(), String>,
    },
    EnvironmentReloaded,
    ProbesUpdated,
}

pub struct App {
    alive: bool,
    workflow: Workflow,
    edit_mode: bool,
    overlay: Option<Overlay>,
    output: OutputPane,
    command_line: LineEditor,
    resolver: EnvironmentResolver,
    paths: ProjectPaths,
    status: SharedStatus,
    known_environments: Vec<String>,
    last_result_at: Option<DateTime<Local>>,
}

impl App {
    pub fn new(resolver: EnvironmentResolver, paths: ProjectPaths, status: SharedStatus) -> Self {
        let mut app = Self {
            alive: true,
            workflow: Workflow::default(),
            edit_mode: false,
            overlay: None,
            output: OutputPane::default(),
            command_line: LineEditor::default(),
            resolver,
            paths,
            status,
            known_environments: Vec::new(),
            last_result_at: None,
        };
        app.refresh_command_line();
        app
    }

    pub fn alive(&self) -> bool {
        self.alive
    }

    pub fn stage(&self) -> Stage {
        self.workflow.stage()
    }

    pub fn running(&self) -> bool {
        self.workflow.running()
    }

    pub fn edit_mode(&self) -> bool {
        self.edit_mode
    }

    pub fn in_overlay(&self) -> bool {
        self.overlay.is_some()
    }

    pub fn overlay(&self) -> Option<&Overlay> {
        self.overlay.as_ref()
    }

    pub fn overlay_mut(&mut self) -> Option<&mut Overlay> {
        self.overlay.as_mut()
    }

    pub fn output(&self) -> &OutputPane {
        &self.output
    }

    pub fn command_line(&self) -> &LineEditor {
        &self.command_line
    }

    pub fn environment(&self) -> (String, EnvironmentSource) {
        self.resolver.resolve()
    }

    pub fn lookup(&self, key: &str) -> Option<String> {
        self.resolver.lookup(key)
    }

    pub fn probes(&self) -> ProbeStatus {
        self.status.snapshot()
    }

    pub fn last_result_at(&self) -> Option<DateTime<Local>> {
        self.last_result_at
    }

    pub fn known_environments(&self) -> &[String] {
        &self.known_environments
    }

    pub fn set_known_environments(&mut self, names: Vec<String>) {
        self.known_environments = names;
    }

    pub fn input_mode(&self) -> InputMode {
        if self.edit_mode {
            InputMode::Edit
        } else if self.overlay.is_some() {
            InputMode::Overlay
        } else {
            InputMode::Normal
        }
    }

    /// `content_rows` is the wrapped height the renderer measured for the
    /// output at the viewport width.
    pub fn set_output_viewport(&mut self, content_rows: usize, height: u16) {
        let hidden = content_rows.saturating_sub(height.max(1) as usize);
        self.output
            .clamp_scroll(u16::try_from(hidden).unwrap_or(u16::MAX));
    }

    /// Startup auto-run of the first stage.
    pub fn start(&mut self) -> AppCommand {
        self.dispatch_stage()
    }

    pub fn apply_action(&mut self, action: Action) -> AppCommand {
        debug!("action {action:?} in {:?} mode", self.input_mode());
        match action {
            Action::Quit => {
                self.alive = false;
                AppCommand::None
            }
            Action::NextStage => {
                if self.navigation_locked() {
                    return AppCommand::None;
                }
                self.workflow.next();
                self.on_stage_changed();
                AppCommand::None
            }
            Action::PrevStage => {
                if self.navigation_locked() {
                    return AppCommand::None;
                }
                self.workflow.previous();
                self.on_stage_changed();
                AppCommand::None
            }
            Action::ScrollDown => {
                if !self.navigation_locked() {
                    self.output.scroll_down();
                }
                AppCommand::None
            }
            Action::ScrollUp => {
                if !self.navigation_locked() {
                    self.output.scroll_up();
                }
                AppCommand::None
            }
            Action::Activate => self.activate(),
            Action::EnterEdit => {
                if !self.in_overlay() {
                    self.edit_mode = true;
                    self.command_line.end();
                }
                AppCommand::None
            }
            Action::ExitEdit => {
                self.edit_mode = false;
                self.refresh_command_line();
                AppCommand::None
            }
            Action::SubmitEdit => self.submit_command_line(),
            Action::InputChar(ch) => {
                self.command_line.insert(ch);
                AppCommand::None
            }
            Action::CursorLeft => {
                self.command_line.left();
                AppCommand::None
            }
            Action::CursorRight => {
                self.command_line.right();
                AppCommand::None
            }
            Action::CursorHome => {
                self.command_line.home();
                AppCommand::None
            }
            Action::CursorEnd => {
                self.command_line.end();
                AppCommand::None
            }
            Action::Backspace => {
                self.command_line.backspace();
                AppCommand::None
            }
            Action::Delete => {
                self.command_line.delete();
                AppCommand::None
            }
            Action::OpenEnvironment => {
                let (environment, source) = self.resolver.resolve();
                self.open_overlay(Overlay::Confirm(ConfirmModal::environment_info(
                    environment,
                    source,
                )));
                AppCommand::None
            }
            Action::OpenConfig => {
                if self.in_overlay() || self.edit_mode {
                    return AppCommand::None;
                }
                AppCommand::LoadConfigEditor {
                    path: self.paths.atlas_config.clone(),
                }
            }
            Action::OpenHelp => {
                self.open_overlay(Overlay::Help(HelpDialog::default()));
                AppCommand::None
            }
            Action::Overlay(key) => {
                let Some(overlay) = self.overlay.as_mut() else {
                    return AppCommand::None;
                };
                match overlay.handle_key(key) {
                    OverlayEvent::None => AppCommand::None,
                    OverlayEvent::Close => {
                        self.close_overlay();
                        AppCommand::None
                    }
                    OverlayEvent::ApplyConfirmed => {
                        self.close_overlay();
                        self.dispatch_stage()
                    }
                    OverlayEvent::SaveAndClose { path, content } => {
                        self.close_overlay();
                        AppCommand::SaveConfig { path, content }
                    }
                }
            }
        }
    }

    pub fn handle_message(&mut self, message: UiMessage) -> AppCommand {
        match message {
            UiMessage::StageFinished { ticket, outcome } => {
                self.deliver_result(ticket, outcome);
                AppCommand::None
            }
            UiMessage::ConfigLoaded { path, result } => {
                match result {
                    Ok(content) if !self.in_overlay() && !self.edit_mode => {
                        self.open_overlay(Overlay::Editor(ConfigEditor::new(path, &content)));
                    }
                    Ok(_) => debug!("config editor load ignored; another surface is active"),
                    Err(error) => self
                        .output
                        .show_message(format!("Could not read atlas.hcl: {error}")),
                }
                AppCommand::None
            }
            UiMessage::ConfigSaved { content, result } => match result {
                Ok(()) => {
                    self.output.show_message("atlas.hcl saved.");
                    self.known_environments = scan_env_names(&content);
                    AppCommand::RefreshProbes
                }
                Err(error) => {
                    self.output
                        .show_message(format!("Could not write atlas.hcl: {error}"));
                    AppCommand::None
                }
            },
            UiMessage::EnvironmentReloaded => {
                if !self.edit_mode {
                    self.refresh_command_line();
                }
                AppCommand::None
            }
            UiMessage::ProbesUpdated => AppCommand::None,
        }
    }

    fn navigation_locked(&self) -> bool {
        self.edit_mode || self.in_overlay()
    }

    fn on_stage_changed(&mut self) {
        self.output.clear();
        self.refresh_command_line();
    }

    fn refresh_command_line(&mut self) {
        let environment = self.resolver.current_name();
        self.command_line
            .set_text(projected_command(self.workflow.stage(), &environment));
    }

    fn open_overlay(&mut self, overlay: Overlay) {
        if self.overlay.is_some() {
            return;
        }
        debug!("open overlay {}", overlay.name());
        self.overlay = Some(overlay);
    }

    fn close_overlay(&mut self) {
        if let Some(overlay) = self.overlay.take() {
            debug!("close overlay {}", overlay.name());
        }
    }

    fn activate(&mut self) -> AppCommand {
        if self.running() || self.navigation_locked() {
            return AppCommand::None;
        }
        if self.workflow.stage() == Stage::Apply {
            let environment = self.resolver.current_name();
            let production = is_production_like(&environment);
            self.open_overlay(Overlay::Confirm(ConfirmModal::apply(environment, production)));
            return AppCommand::None;
        }
        self.dispatch_stage()
    }

    fn dispatch_stage(&mut self) -> AppCommand {
        let Some(dispatch) = self.workflow.try_begin(DispatchKind::Stage) else {
            return AppCommand::None;
        };
        self.output.show_message(RUNNING_MESSAGE);
        AppCommand::RunStage {
            ticket: dispatch.ticket,
            stage: dispatch.stage,
            environment: self.resolver.current_name(),
        }
    }

    fn submit_command_line(&mut self) -> AppCommand {
        self.edit_mode = false;
        if self.running() {
            return AppCommand::None;
        }
        match parse_command_line(self.command_line.text()) {
            ParsedCommandLine::Empty => AppCommand::None,
            ParsedCommandLine::ForeignProgram => {
                self.output.show_message(FOREIGN_PROGRAM_MESSAGE);
                AppCommand::None
            }
            ParsedCommandLine::Args(args) => {
                let Some(dispatch) = self.workflow.try_begin(DispatchKind::CommandLine) else {
                    return AppCommand::None;
                };
                self.output.show_message(RUNNING_MESSAGE);
                AppCommand::RunCommandLine {
                    ticket: dispatch.ticket,
                    args,
                }
            }
        }
    }

    fn deliver_result(&mut self, ticket: u64, outcome: StageOutcome) {
        let Some(dispatch) = self.workflow.finish(ticket) else {
            debug!("dropping result for unknown ticket {ticket}");
            return;
        };
        self.last_result_at = Some(Local::now());

        let mut blocks = match outcome {
            StageOutcome::Preview { command, text } => {
                if !self.in_overlay() && !self.edit_mode {
                    self.overlay = Some(Overlay::Preview(PreviewPane::new(command, &text)));
                    self.output
                        .show(vec![OutputBlock::notice("Dry-run preview opened.")]);
                    return;
                }
                vec![OutputBlock::CommandLine(command), OutputBlock::Text(text)]
            }
            StageOutcome::Output(blocks) => blocks,
        };

        if dispatch.kind == DispatchKind::Stage && dispatch.stage != self.workflow.stage() {
            blocks.insert(
                0,
                OutputBlock::notice(format!("Result of the {} stage:", dispatch.stage)),
            );
        }
        self.output.show(blocks);
    }
}
