use crate::config::{Context, Profile};
use crate::error::StepError;
use crate::lint::{self, Strictness};
use crate::output::Output;
use crate::{js, pipe};

use super::{Asset, finish, order, partials};

pub const APP_BUNDLE: &str = "app.min.js";

pub fn validated_app_scripts(ctx: &Context) -> Result<Vec<Asset>, StepError> {
    pipe::validate(
        ctx,
        &ctx.config.paths.scripts,
        |asset| lint::js::lint(&asset.source.file, &asset.text),
        Strictness::Report,
    )
}

pub fn validated_dev_server_scripts(ctx: &Context) -> Result<Vec<Asset>, StepError> {
    pipe::validate(
        ctx,
        &ctx.config.paths.scripts_dev_server,
        |asset| lint::js::lint(&asset.source.file, &asset.text),
        Strictness::Report,
    )
}

/// Copies the app scripts as they are.
pub fn build_app_scripts_dev(ctx: &Context) -> Result<Vec<Output>, StepError> {
    let outputs = validated_app_scripts(ctx)?
        .into_iter()
        .map(Output::from)
        .collect();

    finish("build-app-scripts-dev", &ctx.dist(Profile::Dev), outputs)
}

/// Bundles the app scripts and the template cache into one minified file.
/// The template cache comes last, after the scripts defining its module.
pub fn build_app_scripts_prod(ctx: &Context) -> Result<Vec<Output>, StepError> {
    let (templates, scripts) = rayon::join(
        || partials::scripted_partials(ctx),
        || validated_app_scripts(ctx),
    );
    let templates = templates?;

    let mut files = order::angular_filesort(scripts?.into_iter().map(Output::from).collect())?;

    let module = &ctx.config.partials.module;
    if !order::defines(&files, module) {
        tracing::warn!("No app script defines module '{module}'; templates will register it without dependencies.");
    }
    files.push(templates);

    let texts: Vec<_> = files.iter().map(|file| (file.path.as_str(), file.text())).collect();
    let bundle = js::bundle(APP_BUNDLE, texts.iter().map(|(name, code)| (*name, &**code)))?;

    finish(
        "build-app-scripts-prod",
        &ctx.dist(Profile::Prod),
        vec![Output::new(APP_BUNDLE, bundle)],
    )
}

pub fn build_app_scripts(ctx: &Context, profile: Profile) -> Result<Vec<Output>, StepError> {
    match profile {
        Profile::Dev => build_app_scripts_dev(ctx),
        Profile::Prod => build_app_scripts_prod(ctx),
    }
}
