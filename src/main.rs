pub mod cache;
pub mod hook;
pub mod select;
pub mod types;

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use crate::cache::{CacheError, ConfigCache, DEFAULT_CACHE_ROOT};
use crate::hook::{DEFAULT_PATH_KEY, include_configs};
use crate::select::{ConfigSelector, DEFAULT_PATTERN};
use crate::types::MaxAge;

/// Dynamic Condor Configuration Hook
#[derive(Parser, Debug)]
#[command(name = "condor-git-config", version)]
struct Cli {
    /// git repository URI to fetch files from
    #[arg(value_name = "GIT-URI", help_heading = "Source of configuration files")]
    git_uri: String,

    /// branch to fetch files from
    #[arg(
        short,
        long,
        default_value = "master",
        help_heading = "Source of configuration files"
    )]
    branch: String,

    /// path to cache configuration file sources
    #[arg(long, default_value = DEFAULT_CACHE_ROOT, help_heading = "Local configuration cache")]
    cache_path: PathBuf,

    /// seconds before a new update is pulled; use inf to disable updates
    /// [default: 300 ± 10]
    #[arg(long, value_name = "SECONDS", help_heading = "Local configuration cache")]
    max_age: Option<MaxAge>,

    /// regular expression(s) for configuration files
    #[arg(
        long,
        num_args = 0..,
        default_value = DEFAULT_PATTERN,
        help_heading = "Configuration selection"
    )]
    pattern: Vec<String>,

    /// regular expression(s) for ignoring configuration files
    #[arg(long, num_args = 0.., help_heading = "Configuration selection")]
    blacklist: Vec<String>,

    /// regular expression(s) for including ignored files
    #[arg(long, num_args = 0.., help_heading = "Configuration selection")]
    whitelist: Vec<String>,

    /// provide files beyond the top-level
    #[arg(long, help_heading = "Configuration selection")]
    recurse: bool,

    /// config key exposing the cache path
    #[arg(long, default_value = DEFAULT_PATH_KEY, help_heading = "Configuration integration")]
    path_key: String,
}

fn main() -> ExitCode {
    env_logger::init();

    let args = match expand_args(std::env::args_os()) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error: failed to read argument file: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let cli = Cli::parse_from(args);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            if matches!(
                e.downcast_ref::<CacheError>(),
                Some(CacheError::Conflict { .. })
            ) {
                eprintln!();
                eprintln!("Hint: give each repository its own --cache-path or --branch");
                return ExitCode::from(2);
            }
            ExitCode::FAILURE
        }
    }
}

/// Replace `@file` arguments with the file's lines, one argument per line.
fn expand_args(args: impl IntoIterator<Item = OsString>) -> std::io::Result<Vec<OsString>> {
    argfile::expand_args_from(args.into_iter(), argfile::parse_fromfile, argfile::PREFIX)
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    // Bad patterns fail before any lock is taken
    let selector = ConfigSelector::new(&cli.pattern, &cli.blacklist, &cli.whitelist, cli.recurse)?;

    let max_age = cli.max_age.unwrap_or_else(MaxAge::jittered_default);
    let cache = ConfigCache::new(&cli.git_uri, &cli.branch, &cli.cache_path, max_age)?;
    log::debug!(
        "using cache {} for {} (max age {})",
        cache.paths().work_dir().display(),
        cache.identity(),
        max_age
    );

    let stdout = std::io::stdout();
    include_configs(&cli.path_key, &cache, &selector, &mut stdout.lock())?;
    Ok(())
}
