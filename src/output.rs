use crate::model::CommandResult;

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum OutputBlock {
    Text(String),
    Notice(String),
    CommandLine(String),
    Banner(String),
    Failure {
        summary: String,
        stderr: String,
        stdout: String,
    },
}

impl OutputBlock {
    pub fn notice(text: impl Into<String>) -> Self {
        Self::Notice(text.into())
    }

    /// Unstyled lines as they appear on screen.
    pub fn plain_lines(&self) -> Vec<String> {
        match self {
            Self::Text(text) | Self::Notice(text) | Self::Banner(text) => {
                text.lines().map(str::to_string).collect()
            }
            Self::CommandLine(line) => vec![format!("> {line}")],
            Self::Failure {
                summary,
                stderr,
                stdout,
            } => {
                let mut lines = vec![format!("Error: {summary}"), String::new()];
                lines.push("Stderr:".to_string());
                lines.extend(stderr.lines().map(str::to_string));
                lines.push("Stdout:".to_string());
                lines.extend(stdout.lines().map(str::to_string));
                lines
            }
        }
    }
}

/// Concatenated output on success, a structured error block otherwise.
pub fn render_result(result: &CommandResult) -> Vec<OutputBlock> {
    match &result.error {
        Some(error) => vec![OutputBlock::Failure {
            summary: error.summary.clone(),
            stderr: result.stderr.clone(),
            stdout: result.stdout.clone(),
        }],
        None => vec![OutputBlock::Text(result.combined())],
    }
}

/// Scrollable output region. Scrolling down is unbounded here; the renderer
/// clamps against the measured content height.
#[derive(Debug, Clone, Default)]
pub struct OutputPane {
    blocks: Vec<OutputBlock>,
    scroll: u16,
}

impl OutputPane {
    pub fn blocks(&self) -> &[OutputBlock] {
        &self.blocks
    }

    pub fn scroll(&self) -> u16 {
        self.scroll
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
        self.scroll = 0;
    }

    pub fn show(&mut self, blocks: Vec<OutputBlock>) {
        self.blocks = blocks;
        self.scroll = 0;
    }

    pub fn show_message(&mut self, message: impl Into<String>) {
        self.show(vec![OutputBlock::Text(message.into())]);
    }

    pub fn scroll_down(&mut self) {
        self.scroll = self.scroll.saturating_add(1);
    }

    pub fn scroll_up(&mut self) {
        self.scroll = self.scroll.saturating_sub(1);
    }

    pub fn clamp_scroll(&mut self, max: u16) {
        self.scroll = self.scroll.min(max);
    }

    pub fn plain_text(&self) -> String {
        self.blocks
            .iter()
            .flat_map(OutputBlock::plain_lines)
            .collect::<Vec<_>>()
            .join("\n")
    }
}
