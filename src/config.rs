//! Project configuration.
//!
//! Everything here is read once at startup from `Kumitate.toml` and then
//! shared immutably through [`Context`]. Every field has a default, so a
//! project following the conventional layout needs no config file at all.

use std::fmt::Display;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;

use crate::error::ConfigError;

pub const CONFIG_FILE: &str = "Kumitate.toml";

/// Selects the output tree and how hard the pipeline optimises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Profile {
    /// Pass-through output tuned for rebuild speed.
    Dev,
    /// Concatenated and minified output tuned for size.
    Prod,
}

impl Profile {
    pub fn as_str(self) -> &'static str {
        match self {
            Profile::Dev => "dev",
            Profile::Prod => "prod",
        }
    }

    /// Value of `NODE_ENV` handed to the supervised dev server.
    pub fn node_env(self) -> &'static str {
        match self {
            Profile::Dev => "development",
            Profile::Prod => "production",
        }
    }
}

impl Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub paths: Paths,
    pub vendor: VendorConfig,
    pub partials: PartialsConfig,
    pub server: ServerConfig,
    pub reload: ReloadConfig,
}

/// Glob patterns for every asset category, relative to the project root.
/// Patterns starting with `!` exclude files matched by the others.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Paths {
    pub scripts: Vec<String>,
    pub styles: Vec<String>,
    pub index: String,
    pub partials: Vec<String>,
    pub dist_dev: Utf8PathBuf,
    pub dist_prod: Utf8PathBuf,
    pub scripts_dev_server: Vec<String>,
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            scripts: vec!["app/**/*.js".into()],
            styles: vec!["app/**/*.css".into(), "app/**/*.scss".into()],
            index: "app/index.html".into(),
            partials: vec!["app/**/*.html".into(), "!app/index.html".into()],
            dist_dev: "dist.dev".into(),
            dist_prod: "dist.prod".into(),
            scripts_dev_server: vec!["devServer/**/*.js".into()],
        }
    }
}

impl Paths {
    pub fn dist(&self, profile: Profile) -> &Utf8Path {
        match profile {
            Profile::Dev => &self.dist_dev,
            Profile::Prod => &self.dist_prod,
        }
    }
}

/// Third-party dependencies installed by bower.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VendorConfig {
    pub manifest: Utf8PathBuf,
    /// Component directory. When unset, `.bowerrc` is consulted before
    /// falling back to `bower_components`.
    pub directory: Option<Utf8PathBuf>,
    /// File name patterns that must come first, in this order.
    pub order: Vec<String>,
    /// Sub-directory of the dev output receiving the vendor files.
    pub dev_dir: Utf8PathBuf,
}

impl Default for VendorConfig {
    fn default() -> Self {
        Self {
            manifest: "bower.json".into(),
            directory: None,
            order: vec!["jquery.js".into(), "angular.js".into()],
            dev_dir: "bower_components".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PartialsConfig {
    /// Angular module whose `$templateCache` receives the partials.
    pub module: String,
    pub file_name: String,
}

impl Default for PartialsConfig {
    fn default() -> Self {
        Self {
            module: "app".into(),
            file_name: "templates.js".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub enabled: bool,
    pub program: String,
    pub script: Utf8PathBuf,
    pub watch: Vec<Utf8PathBuf>,
    pub ext: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            program: "node".into(),
            script: "server.js".into(),
            watch: vec!["devServer".into()],
            ext: vec!["js".into()],
        }
    }
}

impl ServerConfig {
    /// Glob patterns covering every file whose change restarts the server.
    pub fn patterns(&self) -> Vec<String> {
        self.watch
            .iter()
            .flat_map(|dir| {
                self.ext
                    .iter()
                    .map(move |ext| format!("{}/**/*.{}", dir.as_str().trim_end_matches('/'), ext))
            })
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReloadConfig {
    pub port: u16,
    pub debounce_ms: u64,
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            port: 35729,
            debounce_ms: 250,
        }
    }
}

impl Config {
    /// Reads the configuration for the project at `root`.
    ///
    /// An explicit `path` must exist. Without one, `Kumitate.toml` in the
    /// project root is used when present and the defaults otherwise.
    pub fn load(root: &Utf8Path, path: Option<&Utf8Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let path = root.join(CONFIG_FILE);
                if !path.is_file() {
                    tracing::debug!("no {CONFIG_FILE} found, using defaults");
                    return Ok(Self::default());
                }
                path
            }
        };

        let text = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;

        Self::parse(&text, &path)
    }

    pub fn parse(text: &str, path: &Utf8Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Immutable state shared by every task: where the project lives and how it
/// is laid out.
#[derive(Debug, Clone)]
pub struct Context {
    pub root: Utf8PathBuf,
    pub config: Config,
}

impl Context {
    pub fn new(root: impl Into<Utf8PathBuf>, config: Config) -> Self {
        Self {
            root: root.into(),
            config,
        }
    }

    /// Absolute-or-root-relative path of a project file.
    pub fn path(&self, path: impl AsRef<Utf8Path>) -> Utf8PathBuf {
        self.root.join(path)
    }

    pub fn dist(&self, profile: Profile) -> Utf8PathBuf {
        self.root.join(self.config.paths.dist(profile))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.paths.scripts, vec!["app/**/*.js"]);
        assert_eq!(config.paths.partials[1], "!app/index.html");
        assert_eq!(config.paths.dist(Profile::Dev), "dist.dev");
        assert_eq!(config.paths.dist(Profile::Prod), "dist.prod");
        assert_eq!(config.reload.port, 35729);
    }

    #[test]
    fn test_parse_partial_override() {
        let text = r#"
            [paths]
            dist_prod = "public"

            [partials]
            module = "healthyGulpAngularApp"
        "#;

        let config = Config::parse(text, Utf8Path::new(CONFIG_FILE)).unwrap();
        assert_eq!(config.paths.dist_prod, "public");
        assert_eq!(config.paths.dist_dev, "dist.dev");
        assert_eq!(config.partials.module, "healthyGulpAngularApp");
        assert_eq!(config.partials.file_name, "templates.js");
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let text = "[paths]\nscript = \"app/*.js\"\n";
        let err = Config::parse(text, Utf8Path::new(CONFIG_FILE)).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        let config = Config::load(root, None).unwrap();
        assert_eq!(config.paths.index, "app/index.html");
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        let err = Config::load(root, Some(&root.join("nope.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_server_patterns() {
        let server = ServerConfig::default();
        assert_eq!(server.patterns(), vec!["devServer/**/*.js"]);
    }
}
