//! Third-party files installed with bower.
//!
//! The root manifest names the packages; each package manifest (or an
//! `overrides` entry in the root manifest) names its main files. Packages
//! are visited depth first so that dependencies come before dependents.

use std::collections::{BTreeMap, HashSet};
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use thiserror::Error;

use crate::config::{Context, Profile};
use crate::error::StepError;
use crate::io::{self, Source};
use crate::output::{self, Output};
use crate::{js, pipe};

use super::{finish, order};

pub const VENDOR_SCRIPTS: &str = "vendor.min.js";
pub const VENDOR_STYLES: &str = "vendor.min.css";

const BOWERRC: &str = ".bowerrc";
const DEFAULT_DIRECTORY: &str = "bower_components";

#[derive(Debug, Error)]
pub enum VendorError {
    #[error("Couldn't read '{path}'.\n{source}")]
    Read {
        path: Utf8PathBuf,
        source: std::io::Error,
    },

    #[error("Couldn't parse '{path}'.\n{source}")]
    Parse {
        path: Utf8PathBuf,
        source: serde_json::Error,
    },

    #[error("Package '{0}' is not installed, run `bower install`")]
    Missing(String),

    #[error("Main file '{file}' of package '{package}' does not exist")]
    MissingFile { package: String, file: String },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Main {
    One(String),
    Many(Vec<String>),
}

impl Main {
    fn files(&self) -> &[String] {
        match self {
            Main::One(file) => std::slice::from_ref(file),
            Main::Many(files) => files,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct Manifest {
    #[serde(default)]
    main: Option<Main>,
    #[serde(default)]
    dependencies: BTreeMap<String, String>,
    #[serde(default)]
    overrides: BTreeMap<String, Override>,
}

#[derive(Debug, Default, Deserialize)]
struct Override {
    #[serde(default)]
    main: Option<Main>,
    #[serde(default)]
    dependencies: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Default, Deserialize)]
struct Bowerrc {
    #[serde(default)]
    directory: Option<Utf8PathBuf>,
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Utf8Path) -> Result<T, VendorError> {
    let text = fs::read_to_string(path).map_err(|source| VendorError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_str(&text).map_err(|source| VendorError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Where packages are installed, relative to the project root.
fn component_dir(ctx: &Context) -> Result<Utf8PathBuf, VendorError> {
    if let Some(dir) = &ctx.config.vendor.directory {
        return Ok(dir.clone());
    }

    let bowerrc = ctx.path(BOWERRC);
    if bowerrc.is_file()
        && let Some(dir) = read_json::<Bowerrc>(&bowerrc)?.directory
    {
        return Ok(dir);
    }

    Ok(DEFAULT_DIRECTORY.into())
}

struct Resolver<'a> {
    ctx: &'a Context,
    dir: Utf8PathBuf,
    overrides: &'a BTreeMap<String, Override>,
    visited: HashSet<String>,
    files: Vec<Source>,
}

impl Resolver<'_> {
    fn visit(&mut self, package: &str) -> Result<(), StepError> {
        if !self.visited.insert(package.to_owned()) {
            return Ok(());
        }

        let package_dir = self.ctx.path(self.dir.join(package));
        if !package_dir.is_dir() {
            return Err(VendorError::Missing(package.to_owned()).into());
        }

        let manifest = ["bower.json", ".bower.json"]
            .iter()
            .map(|name| package_dir.join(name))
            .find(|path| path.is_file())
            .map(|path| read_json::<Manifest>(&path))
            .transpose()?
            .unwrap_or_default();

        let overridden = self.overrides.get(package);

        let dependencies = overridden
            .and_then(|o| o.dependencies.as_ref())
            .unwrap_or(&manifest.dependencies);
        for dependency in dependencies.keys() {
            self.visit(dependency)?;
        }

        let Some(main) = overridden
            .and_then(|o| o.main.as_ref())
            .or(manifest.main.as_ref())
        else {
            tracing::warn!("package '{package}' declares no main files, skipping");
            return Ok(());
        };

        for file in main.files() {
            let found = io::resolve(&package_dir, std::slice::from_ref(file))?;
            if found.is_empty() {
                return Err(VendorError::MissingFile {
                    package: package.to_owned(),
                    file: file.clone(),
                }
                .into());
            }

            for source in found {
                let file = source
                    .path
                    .strip_prefix(&self.ctx.root)
                    .unwrap_or(&source.path)
                    .to_path_buf();
                let rel = source.path.file_name().unwrap_or_default().into();
                self.files.push(Source { file, rel, ..source });
            }
        }

        Ok(())
    }
}

/// Main files of every installed dependency, dependencies first.
///
/// The `rel` of each source is its bare file name.
pub fn main_files(ctx: &Context) -> Result<Vec<Source>, StepError> {
    let manifest_path = ctx.path(&ctx.config.vendor.manifest);
    let manifest: Manifest = read_json(&manifest_path)?;

    let mut resolver = Resolver {
        ctx,
        dir: component_dir(ctx)?,
        overrides: &manifest.overrides,
        visited: HashSet::new(),
        files: Vec::new(),
    };

    for package in manifest.dependencies.keys() {
        resolver.visit(package)?;
    }

    Ok(resolver.files)
}

fn load(sources: Vec<Source>) -> Result<Vec<Output>, StepError> {
    sources
        .into_iter()
        .map(|source| Ok(Output::new(source.rel.clone(), source.read()?)))
        .collect()
}

/// Copies the main files flat into the vendor directory of the dev tree.
pub fn build_vendor_scripts_dev(ctx: &Context) -> Result<Vec<Output>, StepError> {
    let dev_dir = &ctx.config.vendor.dev_dir;

    let mut outputs: Vec<Output> = load(main_files(ctx)?)?
        .into_iter()
        .map(|output| Output::new(dev_dir.join(&output.path), output.data))
        .collect();
    order::by_patterns(&mut outputs, &ctx.config.vendor.order)?;

    finish("build-vendor-scripts-dev", &ctx.dist(Profile::Dev), outputs)
}

/// Concatenates and minifies the main files into one script and, when
/// there are any stylesheets, one stylesheet.
pub fn build_vendor_scripts_prod(ctx: &Context) -> Result<Vec<Output>, StepError> {
    let files = load(main_files(ctx)?)?;

    let (mut scripts, rest): (Vec<Output>, Vec<Output>) = files
        .into_iter()
        .partition(|file| file.extension() == Some("js"));
    let (styles, other): (Vec<Output>, Vec<Output>) = rest
        .into_iter()
        .partition(|file| file.extension() == Some("css"));

    for file in &other {
        tracing::debug!("not bundling vendor file {}", file.path);
    }

    order::by_patterns(&mut scripts, &ctx.config.vendor.order)?;

    let mut outputs = Vec::new();
    if !scripts.is_empty() {
        let code = js::minify(VENDOR_SCRIPTS, &output::concat(&scripts))?;
        outputs.push(Output::new(VENDOR_SCRIPTS, code));
    }
    if !styles.is_empty() {
        let css = pipe::styles::minify(Utf8Path::new(VENDOR_STYLES), &output::concat(&styles))?;
        outputs.push(Output::new(VENDOR_STYLES, css));
    }

    finish("build-vendor-scripts-prod", &ctx.dist(Profile::Prod), outputs)
}

pub fn build_vendor_scripts(ctx: &Context, profile: Profile) -> Result<Vec<Output>, StepError> {
    match profile {
        Profile::Dev => build_vendor_scripts_dev(ctx),
        Profile::Prod => build_vendor_scripts_prod(ctx),
    }
}
