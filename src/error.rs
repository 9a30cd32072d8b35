use camino::Utf8PathBuf;
use thiserror::Error;

use crate::graph::Target;
use crate::js::ScriptError;
use crate::lint::LintError;
use crate::html::MarkupError;
use crate::pipe::styles::StyleError;
use crate::pipe::vendor::VendorError;

#[derive(Debug, Error)]
pub enum KumitateError {
    #[error("Error while loading the configuration:\n{0}")]
    Config(#[from] ConfigError),

    #[error("Invalid task graph:\n{0}")]
    Graph(#[from] GraphError),

    #[error("Target '{target}' failed:\n{source}")]
    Step {
        target: Target,
        #[source]
        source: StepError,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Couldn't read '{path}'.\n{source}")]
    Read {
        path: Utf8PathBuf,
        source: std::io::Error,
    },

    #[error("Couldn't parse '{path}'.\n{source}")]
    Parse {
        path: Utf8PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("Task '{0}' is declared more than once")]
    Duplicate(String),

    #[error("Task '{task}' depends on '{prerequisite}', which is not declared")]
    Missing { task: String, prerequisite: String },

    #[error("Cycle detected in task graph at '{0}'")]
    Cycle(String),

    #[error("Task '{0}' not found")]
    Unknown(String),
}

#[derive(Debug, Error)]
#[error("Couldn't remove '{path}'.\n{source}")]
pub struct CleanError {
    pub path: Utf8PathBuf,
    pub source: std::io::Error,
}

/// Failure of a single pipe segment. Aborts the remaining chain of the
/// invoked target.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("Couldn't read '{path}'.\n{source}")]
    Read {
        path: Utf8PathBuf,
        source: std::io::Error,
    },

    #[error("Couldn't write to '{path}'.\n{source}")]
    Write {
        path: Utf8PathBuf,
        source: std::io::Error,
    },

    #[error("Couldn't compile glob pattern.\n{0}")]
    GlobPattern(#[from] glob::PatternError),

    #[error("Couldn't run glob.\n{0}")]
    Glob(#[from] glob::GlobError),

    #[error("Couldn't convert path to UTF-8.\n{0}")]
    PathFormat(#[from] camino::FromPathBufError),

    #[error("File not found with singular glob: '{0}'")]
    NotFound(String),

    #[error("Couldn't order scripts, module dependency cycle through '{0}'")]
    OrderCycle(Utf8PathBuf),

    #[error(transparent)]
    Clean(#[from] CleanError),

    #[error(transparent)]
    Lint(#[from] LintError),

    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error(transparent)]
    Style(#[from] StyleError),

    #[error("Invalid markup in '{file}':\n{source}")]
    Markup {
        file: Utf8PathBuf,
        source: MarkupError,
    },

    #[error(transparent)]
    Vendor(#[from] VendorError),

    #[cfg(feature = "live")]
    #[error("Error while watching for file changes:\n{0}")]
    Watch(#[from] WatchError),

    #[cfg(not(feature = "live"))]
    #[error("Watch targets require the `live` feature")]
    LiveDisabled,
}

#[cfg(feature = "live")]
#[derive(Debug, Error)]
pub enum WatchError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Notify(#[from] notify::Error),

    #[error(transparent)]
    Pattern(#[from] glob::PatternError),

    #[error("Couldn't bind the live reload port.\n{0}")]
    Bind(std::io::Error),
}
