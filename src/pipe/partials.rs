use std::fmt::Write;

use rayon::prelude::*;

use crate::config::{Context, Profile};
use crate::error::StepError;
use crate::lint::{self, Strictness, html::Rules};
use crate::output::Output;
use crate::{html, io, pipe};

use super::{Asset, finish};

fn lint_partial(asset: &Asset) -> Vec<lint::Finding> {
    lint::html::lint(&asset.source.file, &asset.text, Rules::partial())
}

pub fn validated_partials(ctx: &Context) -> Result<Vec<Asset>, StepError> {
    pipe::validate(ctx, &ctx.config.paths.partials, lint_partial, Strictness::Report)
}

pub fn build_partials_dev(ctx: &Context) -> Result<Vec<Output>, StepError> {
    let outputs = validated_partials(ctx)?
        .into_iter()
        .map(Output::from)
        .collect();

    finish("build-partials-dev", &ctx.dist(Profile::Dev), outputs)
}

/// Converts every partial into one script registering them with Angular's
/// template cache. Nothing is written; the result feeds the app bundle.
///
/// Any markup error fails the conversion.
pub fn scripted_partials(ctx: &Context) -> Result<Output, StepError> {
    let partials = pipe::validate(ctx, &ctx.config.paths.partials, lint_partial, Strictness::Fail)?;

    let entries = partials
        .par_iter()
        .map(|asset| {
            let markup = html::minify(&asset.text).map_err(|source| StepError::Markup {
                file: asset.source.file.clone(),
                source,
            })?;
            Ok((io::to_url(&asset.source.rel), markup))
        })
        .collect::<Result<Vec<_>, StepError>>()?;

    let partials = &ctx.config.partials;
    Ok(Output::new(
        partials.file_name.as_str(),
        template_cache(&partials.module, &entries),
    ))
}

fn js_string(s: &str) -> String {
    serde_json::Value::String(s.to_owned()).to_string()
}

/// Script putting each `(url, markup)` pair into `$templateCache` of
/// `module`. The module is looked up, and defined without dependencies
/// when nothing else defined it first.
pub fn template_cache(module: &str, entries: &[(String, String)]) -> String {
    let module = js_string(module);
    let mut out = format!(
        "(function (module) {{\n  try {{\n    module = angular.module({module});\n  }} catch (e) {{\n    module = angular.module({module}, []);\n  }}\n  module.run(['$templateCache', function ($templateCache) {{\n"
    );

    for (url, markup) in entries {
        let _ = writeln!(
            out,
            "    $templateCache.put({}, {});",
            js_string(url),
            js_string(markup)
        );
    }

    out.push_str("  }]);\n})();\n");
    out
}
