//! Command line arguments.

use clap::{Parser, ValueEnum};

use crate::graph::Target;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "kumitate",
    version,
    about = "Build, validate and serve a single-page Angular application.",
    long_about = None
)]
pub struct Cli {
    /// Target to run. Without one, the production tree is rebuilt from
    /// scratch.
    #[arg(value_enum, value_name = "TARGET")]
    pub target: Option<Target>,

    /// Project root containing `app/`, `bower.json` and friends.
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub root: String,

    /// Configuration file. Default: `Kumitate.toml` in the project root,
    /// if present.
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// Logging level. If omitted, `KUMITATE_LOG` or `info` is used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Print the available targets and their prerequisites, then exit.
    #[arg(long)]
    pub list: bool,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["kumitate"]).unwrap();
        assert_eq!(cli.target, None);
        assert_eq!(cli.root, ".");
        assert!(!cli.list);
    }

    #[test]
    fn test_target_and_options() {
        let cli = Cli::try_parse_from([
            "kumitate",
            "watch-dev",
            "--root",
            "site",
            "--log-level",
            "debug",
        ])
        .unwrap();

        assert_eq!(cli.target, Some(Target::WatchDev));
        assert_eq!(cli.root, "site");
        assert_eq!(cli.log_level, Some(LogLevel::Debug));
    }

    #[test]
    fn test_unknown_target_is_rejected() {
        assert!(Cli::try_parse_from(["kumitate", "deploy"]).is_err());
    }

    #[test]
    fn test_devserver_spelling() {
        let cli = Cli::try_parse_from(["kumitate", "validate-devserver-scripts"]).unwrap();
        assert_eq!(cli.target, Some(Target::ValidateDevServerScripts));
    }
}
