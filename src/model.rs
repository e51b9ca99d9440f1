use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Stage {
    Status,
    Diff,
    Lint,
    DryRun,
    Apply,
}

impl Stage {
    pub const ALL: [Self; 5] = [
        Self::Status,
        Self::Diff,
        Self::Lint,
        Self::DryRun,
        Self::Apply,
    ];

    pub fn index(self) -> usize {
        match self {
            Self::Status => 0,
            Self::Diff => 1,
            Self::Lint => 2,
            Self::DryRun => 3,
            Self::Apply => 4,
        }
    }

    pub fn from_index(index: usize) -> Self {
        Self::ALL[index % Self::ALL.len()]
    }

    pub fn next(self) -> Self {
        Self::from_index(self.index() + 1)
    }

    pub fn previous(self) -> Self {
        Self::from_index(self.index() + Self::ALL.len() - 1)
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::Status => "Status",
            Self::Diff => "Diff",
            Self::Lint => "Lint",
            Self::DryRun => "Dry-Run",
            Self::Apply => "Apply",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Status => "Show applied vs pending",
            Self::Diff => "Generate migration file",
            Self::Lint => "Hash + safety checks",
            Self::DryRun => "Preview pending SQL",
            Self::Apply => "Apply pending changes",
        }
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.title())
    }
}

/// Why a subprocess did not succeed: non-zero exit or spawn failure.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ErrorInfo {
    pub summary: String,
}

impl ErrorInfo {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
        }
    }
}

impl Display for ErrorInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.summary)
    }
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub error: Option<ErrorInfo>,
}

impl CommandResult {
    pub fn success(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            error: None,
        }
    }

    pub fn failure(
        summary: impl Into<String>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            error: Some(ErrorInfo::new(summary)),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// stdout followed by stderr, never interleaved.
    pub fn combined(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct ProbeStatus {
    pub docker_ok: bool,
    pub logged_in: bool,
}

/// Probe booleans written by background tasks and read by the UI thread.
#[derive(Debug, Clone, Default)]
pub struct SharedStatus {
    inner: Arc<Mutex<ProbeStatus>>,
}

impl SharedStatus {
    pub fn snapshot(&self) -> ProbeStatus {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_docker_ok(&self, ok: bool) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .docker_ok = ok;
    }

    pub fn set_logged_in(&self, logged_in: bool) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .logged_in = logged_in;
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum SchemaChange {
    Create(String),
    Alter(String),
    Drop(String),
}

impl SchemaChange {
    pub fn marker(&self) -> &'static str {
        match self {
            Self::Create(_) => "+++",
            Self::Alter(_) => "~~~",
            Self::Drop(_) => "---",
        }
    }

    pub fn table(&self) -> &str {
        match self {
            Self::Create(table) | Self::Alter(table) | Self::Drop(table) => table,
        }
    }

    pub fn statement(&self) -> &'static str {
        match self {
            Self::Create(_) => "CREATE TABLE",
            Self::Alter(_) => "ALTER TABLE",
            Self::Drop(_) => "DROP TABLE",
        }
    }
}

/// Table-level changes found in planned SQL, ordered creates, alters, drops.
/// Repeated ALTERs on one table collapse into a single entry.
pub fn summarize_schema_changes(sql: &str) -> Vec<SchemaChange> {
    let mut creates = Vec::new();
    let mut alters: Vec<String> = Vec::new();
    let mut drops = Vec::new();

    for line in sql.lines() {
        let trimmed = line.trim();
        let upper = trimmed.to_ascii_uppercase();
        let Some(table) = trimmed
            .split_whitespace()
            .nth(2)
            .map(|token| token.trim_matches(|c: char| matches!(c, '"' | '(' | '`' | ';')))
            .filter(|token| !token.is_empty())
        else {
            continue;
        };

        if upper.starts_with("CREATE TABLE") {
            creates.push(table.to_string());
        } else if upper.starts_with("DROP TABLE") {
            drops.push(table.to_string());
        } else if upper.starts_with("ALTER TABLE") && !alters.iter().any(|seen| seen == table) {
            alters.push(table.to_string());
        }
    }

    creates
        .into_iter()
        .map(SchemaChange::Create)
        .chain(alters.into_iter().map(SchemaChange::Alter))
        .chain(drops.into_iter().map(SchemaChange::Drop))
        .collect()
}
