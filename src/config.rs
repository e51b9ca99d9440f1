use anyhow::{Context, Result};
use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::warn;

pub const ENV_FILE_NAME: &str = ".env";
pub const ATLAS_CONFIG_FILE_NAME: &str = "atlas.hcl";
pub const ENVIRONMENT_KEY: &str = "ENVIRONMENT";
pub const DB_URL_KEY: &str = "APP_DB_URL";
pub const DEFAULT_ENVIRONMENT: &str = "local";

/// Files the application reads, all relative to the launch directory.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ProjectPaths {
    pub work_dir: PathBuf,
    pub env_file: PathBuf,
    pub atlas_config: PathBuf,
}

impl ProjectPaths {
    pub fn discover() -> Result<Self> {
        let work_dir = std::env::current_dir().context("failed to resolve working directory")?;
        Ok(Self::in_dir(work_dir))
    }

    pub fn in_dir(work_dir: impl Into<PathBuf>) -> Self {
        let work_dir = work_dir.into();
        Self {
            env_file: work_dir.join(ENV_FILE_NAME),
            atlas_config: work_dir.join(ATLAS_CONFIG_FILE_NAME),
            work_dir,
        }
    }
}

/// Parses `KEY=VALUE` lines. Blank lines, `#` comments and lines without a
/// key before `=` are skipped; one layer of matching quotes is stripped.
pub fn parse_env_str(raw: &str) -> HashMap<String, String> {
    let mut values = HashMap::new();
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        values.insert(key.to_string(), unquote(value.trim()).to_string());
    }
    values
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2
            && let Some(inner) = value
                .strip_prefix(quote)
                .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}

pub fn read_env_file(path: &Path) -> io::Result<HashMap<String, String>> {
    match fs::read_to_string(path) {
        Ok(raw) => Ok(parse_env_str(&raw)),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(HashMap::new()),
        Err(error) => Err(error),
    }
}

/// Key/value snapshot of the env file layered over the process environment.
#[derive(Debug, Clone, Default)]
pub struct EnvOverlay {
    values: Arc<Mutex<HashMap<String, String>>>,
}

impl EnvOverlay {
    pub fn replace(&self, values: HashMap<String, String>) {
        *self.values.lock().unwrap_or_else(PoisonError::into_inner) = values;
    }

    /// Re-reads `path` and swaps the whole map in one step. Unreadable files
    /// produce an empty overlay. Returns the number of keys loaded.
    pub fn reload_from(&self, path: &Path) -> usize {
        let values = read_env_file(path).unwrap_or_else(|error| {
            warn!("failed to read env file {}: {error}", path.display());
            HashMap::new()
        });
        let count = values.len();
        self.replace(values);
        count
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn snapshot(&self) -> HashMap<String, String> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[derive(Debug, Clone)]
pub enum ProcessEnv {
    Inherited,
    Fixed(HashMap<String, String>),
}

impl ProcessEnv {
    pub fn var(&self, key: &str) -> Option<String> {
        match self {
            Self::Inherited => std::env::var(key).ok(),
            Self::Fixed(values) => values.get(key).cloned(),
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum EnvironmentSource {
    CommandLine,
    EnvFile,
    Process,
    Default,
}

impl EnvironmentSource {
    pub fn label(self) -> &'static str {
        match self {
            Self::CommandLine => "--env flag",
            Self::EnvFile => ".env ENVIRONMENT",
            Self::Process => "process ENVIRONMENT",
            Self::Default => "default",
        }
    }
}

/// Answers "which environment is active" from the live sources on every call.
#[derive(Debug, Clone)]
pub struct EnvironmentResolver {
    cli_override: Option<String>,
    overlay: EnvOverlay,
    process: ProcessEnv,
}

impl EnvironmentResolver {
    pub fn new(cli_override: Option<String>, overlay: EnvOverlay) -> Self {
        Self {
            cli_override,
            overlay,
            process: ProcessEnv::Inherited,
        }
    }

    pub fn with_process_env(mut self, process: ProcessEnv) -> Self {
        self.process = process;
        self
    }

    pub fn current_name(&self) -> String {
        self.resolve().0
    }

    pub fn resolve(&self) -> (String, EnvironmentSource) {
        if let Some(name) = self
            .cli_override
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
        {
            return (name.to_string(), EnvironmentSource::CommandLine);
        }
        if let Some(name) = self
            .overlay
            .get(ENVIRONMENT_KEY)
            .filter(|name| !name.is_empty())
        {
            return (name, EnvironmentSource::EnvFile);
        }
        if let Some(name) = self
            .process
            .var(ENVIRONMENT_KEY)
            .filter(|name| !name.is_empty())
        {
            return (name, EnvironmentSource::Process);
        }
        (DEFAULT_ENVIRONMENT.to_string(), EnvironmentSource::Default)
    }

    /// Overlay value first, then the process environment.
    pub fn lookup(&self, key: &str) -> Option<String> {
        self.overlay.get(key).or_else(|| self.process.var(key))
    }
}

pub fn is_production_like(environment: &str) -> bool {
    let environment = environment.trim();
    environment.eq_ignore_ascii_case("prod") || environment.eq_ignore_ascii_case("production")
}

/// Names declared as `env "<name>" {` blocks. A textual scan, not an HCL parse.
pub fn scan_env_names(hcl: &str) -> Vec<String> {
    const PREFIX: &str = "env \"";
    let mut names = Vec::new();
    let mut rest = hcl;
    while let Some(start) = rest.find(PREFIX) {
        let at_word_start = rest[..start]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_alphanumeric() && c != '_');
        rest = &rest[start + PREFIX.len()..];
        let Some(end) = rest.find('"') else {
            break;
        };
        let name = &rest[..end];
        rest = &rest[end + 1..];
        if at_word_start && !name.is_empty() && rest.trim_start().starts_with('{') {
            names.push(name.to_string());
        }
    }
    names
}

pub fn read_env_names(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .map(|raw| scan_env_names(&raw))
        .unwrap_or_default()
}

/// Process environment with overlay keys replacing same-named variables.
pub fn merged_environment(
    process: impl IntoIterator<Item = (OsString, OsString)>,
    overlay: &HashMap<String, String>,
) -> BTreeMap<OsString, OsString> {
    let mut merged = process.into_iter().collect::<BTreeMap<_, _>>();
    for (key, value) in overlay {
        merged.insert(OsString::from(key), OsString::from(value));
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::{
        DEFAULT_ENVIRONMENT, EnvOverlay, EnvironmentResolver, EnvironmentSource, ProcessEnv,
        is_production_like, merged_environment, parse_env_str, read_env_file, scan_env_names,
    };
    use std::collections::HashMap;
    use std::ffi::OsString;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn overlay_with(pairs: &[(&str, &str)]) -> EnvOverlay {
        let overlay = EnvOverlay::default();
        overlay.replace(
            pairs
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
        );
        overlay
    }

    #[test]
    fn quoted_value_keeps_inner_spaces() {
        let parsed = parse_env_str(r#"KEY="value with spaces""#);
        assert_eq!(parsed.get("KEY").map(String::as_str), Some("value with spaces"));
        assert_eq!(parsed.len(), 1);
    }

    #[test]
    fn comments_blank_and_malformed_lines_are_skipped() {
        let parsed = parse_env_str("# comment\n\nNOEQUALS\n=orphan\n  SPACED = ' x '  \n");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed.get("SPACED").map(String::as_str), Some(" x "));
    }

    #[test]
    fn value_splits_on_first_equals_only() {
        let parsed = parse_env_str("APP_DB_URL=postgres://u:p@h/db?sslmode=disable");
        assert_eq!(
            parsed.get("APP_DB_URL").map(String::as_str),
            Some("postgres://u:p@h/db?sslmode=disable")
        );
    }

    #[test]
    fn mismatched_quotes_are_left_alone() {
        let parsed = parse_env_str("A=\"open\nB='x\"\nC=\"\n");
        assert_eq!(parsed.get("A").map(String::as_str), Some("\"open"));
        assert_eq!(parsed.get("B").map(String::as_str), Some("'x\""));
        assert_eq!(parsed.get("C").map(String::as_str), Some("\""));
    }

    #[test]
    fn empty_input_yields_empty_map() {
        assert!(parse_env_str("").is_empty());
    }

    #[test]
    fn missing_file_is_an_empty_overlay() {
        let dir = tempfile::tempdir().expect("tempdir");
        let parsed = read_env_file(&dir.path().join(".env")).expect("missing file is not an error");
        assert!(parsed.is_empty());
    }

    #[test]
    fn reload_replaces_instead_of_merging() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(".env");
        let overlay = EnvOverlay::default();

        std::fs::write(&path, "OLD=1\nSHARED=a\n").expect("write env");
        assert_eq!(overlay.reload_from(&path), 2);

        std::fs::write(&path, "SHARED=b\n").expect("write env");
        assert_eq!(overlay.reload_from(&path), 1);
        assert_eq!(overlay.get("OLD"), None);
        assert_eq!(overlay.get("SHARED").as_deref(), Some("b"));
    }

    #[test]
    fn readers_never_observe_half_applied_reload() {
        let overlay = EnvOverlay::default();
        let snapshot_a = HashMap::from([
            ("A".to_string(), "1".to_string()),
            ("B".to_string(), "1".to_string()),
        ]);
        let snapshot_b = HashMap::from([
            ("A".to_string(), "2".to_string()),
            ("B".to_string(), "2".to_string()),
            ("C".to_string(), "2".to_string()),
        ]);
        overlay.replace(snapshot_a.clone());

        let done = Arc::new(AtomicBool::new(false));
        let writer = {
            let overlay = overlay.clone();
            let done = done.clone();
            std::thread::spawn(move || {
                for round in 0..2_000 {
                    let next = if round % 2 == 0 {
                        snapshot_b.clone()
                    } else {
                        snapshot_a.clone()
                    };
                    overlay.replace(next);
                }
                done.store(true, Ordering::SeqCst);
            })
        };

        while !done.load(Ordering::SeqCst) {
            let seen = overlay.snapshot();
            let a = seen.get("A").cloned();
            assert_eq!(seen.get("B").cloned(), a);
            match a.as_deref() {
                Some("1") => assert_eq!(seen.len(), 2),
                Some("2") => assert_eq!(seen.len(), 3),
                other => panic!("unexpected snapshot value {other:?}"),
            }
        }
        writer.join().expect("writer thread");
    }

    #[test]
    fn resolution_follows_override_overlay_process_default() {
        let process = ProcessEnv::Fixed(HashMap::from([(
            "ENVIRONMENT".to_string(),
            "ci".to_string(),
        )]));
        let overlay = overlay_with(&[("ENVIRONMENT", "staging")]);

        let with_flag = EnvironmentResolver::new(Some("prod".to_string()), overlay.clone())
            .with_process_env(process.clone());
        assert_eq!(with_flag.current_name(), "prod");
        assert_eq!(with_flag.resolve().1, EnvironmentSource::CommandLine);

        let without_flag =
            EnvironmentResolver::new(None, overlay.clone()).with_process_env(process.clone());
        assert_eq!(without_flag.current_name(), "staging");

        overlay.replace(HashMap::new());
        assert_eq!(without_flag.current_name(), "ci");
        assert_eq!(without_flag.resolve().1, EnvironmentSource::Process);

        let bare = EnvironmentResolver::new(None, overlay)
            .with_process_env(ProcessEnv::Fixed(HashMap::new()));
        assert_eq!(bare.current_name(), DEFAULT_ENVIRONMENT);
        assert_eq!(bare.resolve().1, EnvironmentSource::Default);
    }

    #[test]
    fn blank_override_and_empty_values_fall_through() {
        let overlay = overlay_with(&[("ENVIRONMENT", "")]);
        let resolver = EnvironmentResolver::new(Some("  ".to_string()), overlay)
            .with_process_env(ProcessEnv::Fixed(HashMap::new()));
        assert_eq!(resolver.current_name(), "local");
    }

    #[test]
    fn resolver_reads_live_overlay_on_every_call() {
        let overlay = EnvOverlay::default();
        let resolver = EnvironmentResolver::new(None, overlay.clone())
            .with_process_env(ProcessEnv::Fixed(HashMap::new()));
        assert_eq!(resolver.current_name(), "local");
        overlay.replace(HashMap::from([(
            "ENVIRONMENT".to_string(),
            "dev".to_string(),
        )]));
        assert_eq!(resolver.current_name(), "dev");
    }

    #[test]
    fn merged_environment_prefers_overlay_and_keeps_the_rest() {
        let process = vec![
            (OsString::from("FOO"), OsString::from("old")),
            (OsString::from("PATH"), OsString::from("/usr/bin")),
        ];
        let overlay = HashMap::from([
            ("FOO".to_string(), "new".to_string()),
            ("EXTRA".to_string(), "1".to_string()),
        ]);
        let merged = merged_environment(process, &overlay);

        assert_eq!(merged.keys().filter(|key| *key == "FOO").count(), 1);
        assert_eq!(merged.get(&OsString::from("FOO")), Some(&OsString::from("new")));
        assert_eq!(
            merged.get(&OsString::from("PATH")),
            Some(&OsString::from("/usr/bin"))
        );
        assert_eq!(merged.get(&OsString::from("EXTRA")), Some(&OsString::from("1")));
        assert_eq!(merged.len(), 3);
    }

    #[test]
    fn env_names_are_scanned_from_blocks() {
        let hcl = r#"
env "localdev" {
  url = env("APP_DB_URL")
}

env "prod" {
  dev = "docker://postgres/15"
}
"#;
        assert_eq!(scan_env_names(hcl), vec!["localdev", "prod"]);
        assert!(scan_env_names("variable \"x\" {}").is_empty());
        assert!(scan_env_names("label = env \"x\"\nmyenv \"y\" {}").is_empty());
    }

    #[test]
    fn production_detection_is_case_insensitive() {
        assert!(is_production_like("prod"));
        assert!(is_production_like("PRODUCTION"));
        assert!(!is_production_like("preprod"));
    }
}
