use clap::error::ErrorKind;
use clap::{Arg, ArgAction, CommandFactory, FromArgMatches, Parser};
use std::ffi::OsString;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "atlas9",
    version = concat!("v", env!("CARGO_PKG_VERSION")),
    disable_version_flag = true,
    about = "A terminal cockpit for the atlas schema-migration workflow."
)]
pub struct CliArgs {
    /// Environment name; overrides ENVIRONMENT from .env and the process
    #[arg(short, long)]
    pub env: Option<String>,

    /// tracing filter (for example: info,debug,trace)
    #[arg(long, default_value = "info")]
    pub log_filter: String,

    /// Append logs to this file instead of discarding them
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

/// `-v` is the version flag here, not clap's default `-V`.
pub fn command() -> clap::Command {
    CliArgs::command().arg(
        Arg::new("version")
            .short('v')
            .long("version")
            .help("Print version")
            .action(ArgAction::Version),
    )
}

pub fn try_parse_from<I, T>(args: I) -> Result<CliArgs, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = command().try_get_matches_from(args)?;
    CliArgs::from_arg_matches(&matches)
}

/// Help and version exit 0; any other parse failure prints usage to stderr
/// and exits 1.
pub fn parse() -> CliArgs {
    match try_parse_from(std::env::args_os()) {
        Ok(args) => args,
        Err(error) => {
            let code = match error.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            let _ = error.print();
            std::process::exit(code);
        }
    }
}
