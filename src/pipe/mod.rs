//! Pipe segments.
//!
//! Every segment re-reads its inputs from disk, transforms them and returns
//! the files it produced, paths relative to the profile's dist directory.
//! Segments share no state, so they can run side by side on the rayon pool.

pub mod app;
pub mod index;
pub mod order;
pub mod partials;
pub mod scripts;
pub mod styles;
pub mod vendor;

use camino::Utf8Path;
use rayon::prelude::*;

use crate::config::Context;
use crate::error::StepError;
use crate::io::{self, Source};
use crate::lint::{Finding, Report, Strictness};
use crate::output::{self, Output};

/// A source file loaded into memory.
#[derive(Debug, Clone)]
pub struct Asset {
    pub source: Source,
    pub text: String,
}

impl From<Asset> for Output {
    fn from(asset: Asset) -> Self {
        Output::new(asset.source.rel, asset.text)
    }
}

/// Reads every file matched by `patterns`, in match order.
pub fn read(ctx: &Context, patterns: &[String]) -> Result<Vec<Asset>, StepError> {
    io::resolve(&ctx.root, patterns)?
        .into_par_iter()
        .map(|source| {
            let text = source.read_to_string()?;
            Ok(Asset { source, text })
        })
        .collect()
}

/// Reads and lints files, printing a report of the findings.
pub fn validate<F>(
    ctx: &Context,
    patterns: &[String],
    lint: F,
    strictness: Strictness,
) -> Result<Vec<Asset>, StepError>
where
    F: Fn(&Asset) -> Vec<Finding> + Sync,
{
    let assets = read(ctx, patterns)?;

    let mut report = Report::new();
    report.extend(
        assets
            .par_iter()
            .flat_map_iter(|asset| lint(asset))
            .collect::<Vec<_>>(),
    );
    report.print();

    if report.errors() > 0 {
        tracing::warn!(
            "{} lint error(s) across {} checked file(s)",
            report.errors(),
            assets.len()
        );
    }

    report.enforce(strictness)?;
    Ok(assets)
}

/// Writes the outputs of a segment and hands them back for further use.
pub fn finish(segment: &str, dist: &Utf8Path, outputs: Vec<Output>) -> Result<Vec<Output>, StepError> {
    let changed = output::save(dist, &outputs)?;
    tracing::debug!(
        "{segment}: {} file(s), {changed} changed on disk",
        outputs.len()
    );
    Ok(outputs)
}
