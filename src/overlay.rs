use crate::config::EnvironmentSource;
use crate::editor::TextBuffer;
use crate::highlight::highlight;
use crate::model::{SchemaChange, summarize_schema_changes};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::text::Text;
use std::path::PathBuf;

pub const PREVIEW_PAGE: u16 = 10;

/// What the controller must do after an overlay consumed a key.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum OverlayEvent {
    None,
    Close,
    ApplyConfirmed,
    SaveAndClose { path: PathBuf, content: String },
}

/// The single modal surface drawn over the base screen.
#[derive(Debug, Clone)]
pub enum Overlay {
    Confirm(ConfirmModal),
    Preview(PreviewPane),
    Editor(ConfigEditor),
    Help(HelpDialog),
}

impl Overlay {
    pub fn handle_key(&mut self, key: KeyEvent) -> OverlayEvent {
        match self {
            Self::Confirm(modal) => modal.handle_key(key),
            Self::Preview(pane) => pane.handle_key(key),
            Self::Editor(editor) => editor.handle_key(key),
            Self::Help(help) => help.handle_key(key),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Confirm(modal) => match modal.purpose {
                ModalPurpose::ApplyChanges { .. } => "confirm-apply",
                ModalPurpose::EnvironmentInfo { .. } => "environment",
            },
            Self::Preview(_) => "preview",
            Self::Editor(_) => "config-editor",
            Self::Help(_) => "help",
        }
    }
}

fn is_ctrl_c(key: &KeyEvent) -> bool {
    key.modifiers.contains(KeyModifiers::CONTROL) && matches!(key.code, KeyCode::Char('c'))
}

fn is_quit_char(key: &KeyEvent) -> bool {
    matches!(key.code, KeyCode::Char('q') | KeyCode::Char('Q'))
        && !key.modifiers.contains(KeyModifiers::CONTROL)
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ModalPurpose {
    ApplyChanges {
        environment: String,
        production: bool,
    },
    EnvironmentInfo {
        environment: String,
        source: EnvironmentSource,
    },
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ConfirmModal {
    pub purpose: ModalPurpose,
    selected: usize,
}

impl ConfirmModal {
    pub fn apply(environment: impl Into<String>, production: bool) -> Self {
        Self {
            purpose: ModalPurpose::ApplyChanges {
                environment: environment.into(),
                production,
            },
            selected: 0,
        }
    }

    pub fn environment_info(environment: impl Into<String>, source: EnvironmentSource) -> Self {
        Self {
            purpose: ModalPurpose::EnvironmentInfo {
                environment: environment.into(),
                source,
            },
            selected: 0,
        }
    }

    pub fn buttons(&self) -> &'static [&'static str] {
        match self.purpose {
            ModalPurpose::ApplyChanges { .. } => &["Apply", "Cancel"],
            ModalPurpose::EnvironmentInfo { .. } => &["OK"],
        }
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn is_production(&self) -> bool {
        matches!(
            self.purpose,
            ModalPurpose::ApplyChanges {
                production: true,
                ..
            }
        )
    }

    pub fn message(&self) -> Vec<String> {
        match &self.purpose {
            ModalPurpose::ApplyChanges {
                environment,
                production,
            } => {
                let mut lines = vec![
                    "Apply changes to database?".to_string(),
                    format!("Environment: {environment}"),
                ];
                if *production {
                    lines.push(String::new());
                    lines.push("WARNING: this is a production environment.".to_string());
                }
                lines
            }
            ModalPurpose::EnvironmentInfo {
                environment,
                source,
            } => vec![
                format!("Current environment: {environment}"),
                String::new(),
                format!("(from {})", source.label()),
                "Edit .env to change.".to_string(),
            ],
        }
    }

    fn move_selection(&mut self, forward: bool) {
        let count = self.buttons().len();
        self.selected = if forward {
            (self.selected + 1) % count
        } else {
            (self.selected + count - 1) % count
        };
    }

    fn handle_key(&mut self, key: KeyEvent) -> OverlayEvent {
        if is_ctrl_c(&key) || is_quit_char(&key) {
            return OverlayEvent::Close;
        }
        match key.code {
            KeyCode::Esc => OverlayEvent::Close,
            KeyCode::Right | KeyCode::Tab => {
                self.move_selection(true);
                OverlayEvent::None
            }
            KeyCode::Left | KeyCode::BackTab => {
                self.move_selection(false);
                OverlayEvent::None
            }
            KeyCode::Enter => match self.purpose {
                ModalPurpose::ApplyChanges { .. } if self.selected == 0 => {
                    OverlayEvent::ApplyConfirmed
                }
                _ => OverlayEvent::Close,
            },
            _ => OverlayEvent::None,
        }
    }
}

/// Full-screen view of a successful dry run.
#[derive(Debug, Clone)]
pub struct PreviewPane {
    pub command: String,
    pub changes: Vec<SchemaChange>,
    pub text: Text<'static>,
    scroll: u16,
    max_scroll: Option<u16>,
}

impl PreviewPane {
    pub fn new(command: impl Into<String>, output: &str) -> Self {
        let command = command.into();
        let body = format!("-- {command}\n{output}");
        Self {
            changes: summarize_schema_changes(output),
            text: highlight("sql", &body),
            command,
            scroll: 0,
            max_scroll: None,
        }
    }

    pub fn scroll(&self) -> u16 {
        self.scroll
    }

    pub fn summary_lines(&self) -> Vec<String> {
        if self.changes.is_empty() {
            return vec!["No schema changes detected.".to_string()];
        }
        self.changes
            .iter()
            .map(|change| {
                format!(
                    "{} {} ({})",
                    change.marker(),
                    change.table(),
                    change.statement()
                )
            })
            .collect()
    }

    /// Records the wrapped row count measured at render time and clamps the
    /// scroll so the last row can still reach the bottom of the viewport.
    pub fn set_viewport(&mut self, content_rows: usize, height: u16) {
        let hidden = content_rows.saturating_sub(height.max(1) as usize);
        let max = u16::try_from(hidden).unwrap_or(u16::MAX);
        self.max_scroll = Some(max);
        self.scroll = self.scroll.min(max);
    }

    /// Unbounded until the first render has measured the content.
    fn max_scroll(&self) -> u16 {
        self.max_scroll.unwrap_or(u16::MAX)
    }

    fn handle_key(&mut self, key: KeyEvent) -> OverlayEvent {
        if is_ctrl_c(&key) || is_quit_char(&key) {
            return OverlayEvent::Close;
        }
        match key.code {
            KeyCode::Esc => return OverlayEvent::Close,
            KeyCode::Down => self.scroll = self.scroll.saturating_add(1),
            KeyCode::Up => self.scroll = self.scroll.saturating_sub(1),
            KeyCode::PageDown => self.scroll = self.scroll.saturating_add(PREVIEW_PAGE),
            KeyCode::PageUp => self.scroll = self.scroll.saturating_sub(PREVIEW_PAGE),
            KeyCode::Home => self.scroll = 0,
            KeyCode::End => self.scroll = self.max_scroll(),
            _ => {}
        }
        self.scroll = self.scroll.min(self.max_scroll());
        OverlayEvent::None
    }
}

/// Full-screen editor over the structured config file.
#[derive(Debug, Clone)]
pub struct ConfigEditor {
    pub path: PathBuf,
    pub buffer: TextBuffer,
}

impl ConfigEditor {
    pub fn new(path: PathBuf, content: &str) -> Self {
        Self {
            path,
            buffer: TextBuffer::from_text(content),
        }
    }

    fn handle_key(&mut self, key: KeyEvent) -> OverlayEvent {
        if is_ctrl_c(&key) {
            return OverlayEvent::Close;
        }
        match key.code {
            KeyCode::Esc => {
                return OverlayEvent::SaveAndClose {
                    path: self.path.clone(),
                    content: self.buffer.text(),
                };
            }
            KeyCode::Enter => self.buffer.newline(),
            KeyCode::Backspace => self.buffer.backspace(),
            KeyCode::Delete => self.buffer.delete(),
            KeyCode::Left => self.buffer.left(),
            KeyCode::Right => self.buffer.right(),
            KeyCode::Up => self.buffer.up(),
            KeyCode::Down => self.buffer.down(),
            KeyCode::Home => self.buffer.home(),
            KeyCode::End => self.buffer.end(),
            KeyCode::Tab => self.buffer.insert_tab(),
            KeyCode::Char(ch)
                if !key
                    .modifiers
                    .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) =>
            {
                self.buffer.insert(ch)
            }
            _ => {}
        }
        OverlayEvent::None
    }
}

pub const HELP_WIDTH: u16 = 80;

pub const HELP_LINES: &[(&str, &str)] = &[
    ("Tab / Shift-Tab", "Next / previous stage"),
    ("Enter", "Run the current stage (Apply asks first)"),
    ("Up / Down", "Scroll output"),
    ("i", "Edit the command line; Enter runs it, Esc cancels"),
    ("e", "Show the active environment"),
    ("c", "Edit atlas.hcl; Esc saves, Ctrl-C discards"),
    ("h", "This help"),
    ("q / Ctrl-C", "Quit"),
    ("", ""),
    ("Preview", "Up/Down/PgUp/PgDn/Home/End scroll, Esc or q closes"),
    ("Confirm", "Left/Right choose, Enter selects, Esc cancels"),
];

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct HelpDialog {
    scroll: u16,
}

impl HelpDialog {
    pub fn scroll(&self) -> u16 {
        self.scroll
    }

    fn handle_key(&mut self, key: KeyEvent) -> OverlayEvent {
        if is_ctrl_c(&key) || is_quit_char(&key) {
            return OverlayEvent::Close;
        }
        match key.code {
            KeyCode::Esc | KeyCode::Enter => OverlayEvent::Close,
            KeyCode::Down => {
                let max = u16::try_from(HELP_LINES.len()).unwrap_or(u16::MAX);
                self.scroll = self.scroll.saturating_add(1).min(max);
                OverlayEvent::None
            }
            KeyCode::Up => {
                self.scroll = self.scroll.saturating_sub(1);
                OverlayEvent::None
            }
            _ => OverlayEvent::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl_c() -> KeyEvent {
        KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)
    }

    #[test]
    fn apply_modal_confirms_only_on_apply_button() {
        let mut overlay = Overlay::Confirm(ConfirmModal::apply("dev", false));
        assert_eq!(overlay.handle_key(key(KeyCode::Enter)), OverlayEvent::ApplyConfirmed);

        let mut overlay = Overlay::Confirm(ConfirmModal::apply("dev", false));
        assert_eq!(overlay.handle_key(key(KeyCode::Right)), OverlayEvent::None);
        assert_eq!(overlay.handle_key(key(KeyCode::Enter)), OverlayEvent::Close);
    }

    #[test]
    fn apply_modal_swallows_vertical_keys_and_wraps_selection() {
        let mut modal = ConfirmModal::apply("dev", false);
        assert_eq!(modal.handle_key(key(KeyCode::Up)), OverlayEvent::None);
        assert_eq!(modal.handle_key(key(KeyCode::Down)), OverlayEvent::None);
        assert_eq!(modal.selected(), 0);
        modal.handle_key(key(KeyCode::Left));
        assert_eq!(modal.selected(), 1);
        modal.handle_key(key(KeyCode::Tab));
        assert_eq!(modal.selected(), 0);
    }

    #[test]
    fn every_dismiss_key_closes_modal() {
        for dismiss in [
            key(KeyCode::Esc),
            ctrl_c(),
            key(KeyCode::Char('q')),
            KeyEvent::new(KeyCode::Char('Q'), KeyModifiers::SHIFT),
        ] {
            let mut modal = ConfirmModal::apply("prod", true);
            assert_eq!(modal.handle_key(dismiss), OverlayEvent::Close);
        }
    }

    #[test]
    fn production_modal_carries_warning() {
        let modal = ConfirmModal::apply("prod", true);
        assert!(modal.is_production());
        assert!(modal.message().iter().any(|line| line.contains("production")));
        assert!(!ConfirmModal::apply("dev", false).is_production());
    }

    #[test]
    fn environment_modal_has_single_ok_button() {
        let mut modal = ConfirmModal::environment_info("staging", EnvironmentSource::EnvFile);
        assert_eq!(modal.buttons(), ["OK"]);
        assert!(modal.message()[0].ends_with("staging"));
        modal.handle_key(key(KeyCode::Right));
        assert_eq!(modal.selected(), 0);
        assert_eq!(modal.handle_key(key(KeyCode::Enter)), OverlayEvent::Close);
    }

    #[test]
    fn preview_scroll_is_bounded_by_measured_rows() {
        let mut pane = PreviewPane::new("atlas migrate apply --env dev --dry-run", "A;\nB;\n");
        assert_eq!(pane.text.lines.len(), 3);
        pane.set_viewport(12, 4);
        pane.handle_key(key(KeyCode::PageDown));
        assert_eq!(pane.scroll(), 8);
        pane.handle_key(key(KeyCode::Home));
        assert_eq!(pane.scroll(), 0);
        pane.handle_key(key(KeyCode::End));
        assert_eq!(pane.scroll(), 8);
        pane.handle_key(key(KeyCode::Up));
        assert_eq!(pane.scroll(), 7);
        pane.set_viewport(5, 4);
        assert_eq!(pane.scroll(), 1);
        assert_eq!(pane.handle_key(key(KeyCode::Char('q'))), OverlayEvent::Close);
    }

    #[test]
    fn preview_summarizes_schema_changes() {
        let pane = PreviewPane::new("atlas", "CREATE TABLE users (id int);\n");
        assert_eq!(pane.summary_lines(), ["+++ users (CREATE TABLE)"]);
        let empty = PreviewPane::new("atlas", "-- nothing\n");
        assert_eq!(empty.summary_lines(), ["No schema changes detected."]);
    }

    #[test]
    fn editor_escape_saves_and_ctrl_c_discards() {
        let path = PathBuf::from("atlas.hcl");
        let mut editor = Overlay::Editor(ConfigEditor::new(path.clone(), "env \"a\" {}"));
        editor.handle_key(key(KeyCode::End));
        editor.handle_key(key(KeyCode::Enter));
        editor.handle_key(key(KeyCode::Tab));
        editor.handle_key(key(KeyCode::Char('q')));
        assert_eq!(
            editor.handle_key(key(KeyCode::Esc)),
            OverlayEvent::SaveAndClose {
                path,
                content: "env \"a\" {}\n  q".to_string(),
            }
        );
        assert_eq!(editor.handle_key(ctrl_c()), OverlayEvent::Close);
    }

    #[test]
    fn help_closes_on_enter_and_scrolls() {
        let mut help = HelpDialog::default();
        help.handle_key(key(KeyCode::Up));
        assert_eq!(help.scroll(), 0);
        help.handle_key(key(KeyCode::Down));
        assert_eq!(help.scroll(), 1);
        assert_eq!(help.handle_key(key(KeyCode::Enter)), OverlayEvent::Close);
    }
}
