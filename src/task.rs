//! Running targets: plan the prerequisites, then execute each step in turn.

use std::fmt::Write;
use std::time::Instant;

use console::Style;
use indicatif::ProgressStyle;
use tracing::Level;
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::config::{Context, Profile};
use crate::error::{GraphError, KumitateError, StepError};
use crate::graph::{Target, TaskGraph};
use crate::io::{self, as_overhead};
use crate::pipe::{app, index, partials, scripts, styles, vendor};

const STYLE_TARGET: Style = Style::new().green();
const STYLE_PREREQUISITES: Style = Style::new().dim();

fn task_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.green} [{elapsed}] {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

/// Executes targets against one project.
pub struct Runner<'a> {
    ctx: &'a Context,
    graph: TaskGraph<Target>,
}

impl<'a> Runner<'a> {
    pub fn new(ctx: &'a Context) -> Result<Self, GraphError> {
        Ok(Self {
            ctx,
            graph: Target::graph()?,
        })
    }

    /// Runs `target` after its prerequisites. The first failing step aborts
    /// the rest of the plan.
    pub fn run(&self, target: Target) -> Result<(), KumitateError> {
        let plan = self.graph.plan(target)?;
        tracing::debug!(
            "plan for {target}: {}",
            plan.iter().map(|t| t.name()).collect::<Vec<_>>().join(", ")
        );

        for step in plan {
            self.execute(step)?;
        }

        Ok(())
    }

    fn execute(&self, target: Target) -> Result<(), KumitateError> {
        let span = tracing::span!(Level::INFO, "task", name = target.name());
        span.pb_set_style(&task_style());
        span.pb_set_message(&format!("Running {target}"));
        let _enter = span.enter();

        let s = Instant::now();
        run_target(self.ctx, target).map_err(|source| KumitateError::Step { target, source })?;
        tracing::info!("finished {target} {}", as_overhead(s));

        Ok(())
    }

    /// Every target with its prerequisites, one per line.
    pub fn list(&self) -> String {
        let mut out = String::new();

        for target in Target::ALL {
            let _ = write!(out, "{}", STYLE_TARGET.apply_to(target.name()));

            let prerequisites = target.prerequisites();
            if !prerequisites.is_empty() {
                let names: Vec<_> = prerequisites.iter().map(|t| t.name()).collect();
                let _ = write!(
                    out,
                    " {}",
                    STYLE_PREREQUISITES.apply_to(format!("(after {})", names.join(", ")))
                );
            }

            out.push('\n');
        }

        out
    }
}

fn clean(ctx: &Context, profile: Profile) -> Result<(), StepError> {
    io::clean(&ctx.dist(profile))?;
    Ok(())
}

/// The action of a single target, without its prerequisites.
pub fn run_target(ctx: &Context, target: Target) -> Result<(), StepError> {
    match target {
        Target::CleanDev => clean(ctx, Profile::Dev)?,
        Target::CleanProd => clean(ctx, Profile::Prod)?,
        Target::ValidatePartials => {
            partials::validated_partials(ctx)?;
        }
        Target::ValidateAppScripts => {
            scripts::validated_app_scripts(ctx)?;
        }
        Target::ValidateDevServerScripts => {
            scripts::validated_dev_server_scripts(ctx)?;
        }
        Target::BuildPartialsDev => {
            partials::build_partials_dev(ctx)?;
        }
        Target::ConvertPartialsToJs => {
            partials::scripted_partials(ctx)?;
        }
        Target::BuildAppScriptsDev => {
            scripts::build_app_scripts_dev(ctx)?;
        }
        Target::BuildAppScriptsProd => {
            scripts::build_app_scripts_prod(ctx)?;
        }
        Target::BuildStylesDev => {
            styles::build_styles_dev(ctx)?;
        }
        Target::BuildStylesProd => {
            styles::build_styles_prod(ctx)?;
        }
        Target::BuildVendorScriptsDev => {
            vendor::build_vendor_scripts_dev(ctx)?;
        }
        Target::BuildVendorScriptsProd => {
            vendor::build_vendor_scripts_prod(ctx)?;
        }
        Target::BuildIndexDev => {
            index::build_index_dev(ctx)?;
        }
        Target::BuildIndexProd => {
            index::build_index_prod(ctx)?;
        }
        Target::BuildAppDev | Target::CleanBuildAppDev => {
            app::build_app_dev(ctx)?;
        }
        Target::BuildAppProd | Target::CleanBuildAppProd | Target::Default => {
            app::build_app_prod(ctx)?;
        }
        Target::WatchDev => watch(ctx, Profile::Dev)?,
        Target::WatchProd => watch(ctx, Profile::Prod)?,
    }

    Ok(())
}

#[cfg(feature = "live")]
fn watch(ctx: &Context, profile: Profile) -> Result<(), StepError> {
    crate::watch::watch(ctx, profile)
}

#[cfg(not(feature = "live"))]
fn watch(_: &Context, _: Profile) -> Result<(), StepError> {
    Err(StepError::LiveDisabled)
}

#[cfg(test)]
mod tests {
    use camino::Utf8Path;

    use super::*;
    use crate::config::Config;

    #[test]
    fn test_list_mentions_every_target() {
        let ctx = Context::new("/project", Config::default());
        let runner = Runner::new(&ctx).unwrap();
        let list = runner.list();

        assert_eq!(list.lines().count(), Target::ALL.len());
        assert!(list.contains("watch-prod"));
        assert!(list.contains("(after clean-build-app-prod)"));
    }

    #[test]
    fn test_clean_missing_dir_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        let ctx = Context::new(root, Config::default());
        let runner = Runner::new(&ctx).unwrap();

        assert!(runner.run(Target::CleanDev).is_ok());
        assert!(runner.run(Target::CleanProd).is_ok());
    }

    #[test]
    fn test_failing_step_names_target() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        let ctx = Context::new(root, Config::default());
        let runner = Runner::new(&ctx).unwrap();

        let err = runner.run(Target::BuildIndexDev).unwrap_err();
        assert!(matches!(
            err,
            KumitateError::Step {
                target: Target::BuildIndexDev,
                source: StepError::NotFound(_)
            }
        ));
    }
}
