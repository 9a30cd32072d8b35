#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

pub mod cli;
pub mod config;
mod error;
pub mod graph;
pub mod html;
pub mod io;
pub mod js;
pub mod lint;
pub mod logging;
pub mod output;
pub mod pipe;
#[cfg(feature = "live")]
pub mod reload;
#[cfg(feature = "live")]
pub mod supervisor;
pub mod task;
#[cfg(feature = "live")]
pub mod watch;

use camino::{Utf8Path, Utf8PathBuf};

pub use crate::cli::Cli;
pub use crate::config::{Config, Context, Profile};
pub use crate::error::*;
pub use crate::graph::{Target, TaskGraph};
pub use crate::output::Output;
pub use crate::task::Runner;

/// Entry point shared by the binary: resolves the project, loads its
/// configuration and runs the requested target.
pub fn run(cli: Cli) -> anyhow::Result<()> {
    let root = Utf8PathBuf::from(&cli.root)
        .canonicalize_utf8()
        .map_err(|e| anyhow::anyhow!("Project root '{}' is not accessible.\n{e}", cli.root))?;

    let config = Config::load(&root, cli.config.as_deref().map(Utf8Path::new))?;
    let ctx = Context::new(root, config);
    let runner = Runner::new(&ctx)?;

    if cli.list {
        print!("{}", runner.list());
        return Ok(());
    }

    let target = cli.target.unwrap_or(Target::Default);
    tracing::info!("running {target} in {}", ctx.root);
    runner.run(target)?;

    Ok(())
}
