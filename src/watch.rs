//! Watch mode.
//!
//! Every watched file belongs to one or more categories. A debounced batch of
//! file system events is reduced to the set of affected categories, each
//! category rebuilds its segment once, and every successful rebuild is
//! announced to the browsers through LiveReload. Changes to dev server
//! sources restart the supervised server instead.

use std::collections::{BTreeSet, HashSet};
use std::fmt::Display;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use glob::Pattern;
use notify::{EventKind, RecursiveMode};
use notify_debouncer_full::new_debouncer;

use crate::config::{Context, Profile};
use crate::error::{StepError, WatchError};
use crate::io::{self, as_overhead};
use crate::output::Output;
use crate::pipe::{index, partials, scripts, styles};
use crate::reload::{self, LiveReload};
use crate::supervisor::Supervisor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Scripts,
    Styles,
    Index,
    Partials,
    DevServer,
}

impl Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Category::Scripts => "scripts",
            Category::Styles => "styles",
            Category::Index => "index",
            Category::Partials => "partials",
            Category::DevServer => "dev server",
        })
    }
}

struct Rule {
    category: Category,
    includes: Vec<Pattern>,
    excludes: Vec<Pattern>,
}

/// Maps changed paths to categories.
pub struct Classifier {
    rules: Vec<Rule>,
    roots: Vec<Utf8PathBuf>,
}

impl Classifier {
    /// Builds the classifier for the project at `root`, which must be the
    /// same form of path the watcher reports (canonical).
    pub fn new(ctx: &Context, root: &Utf8Path) -> Result<Self, WatchError> {
        let paths = &ctx.config.paths;

        let mut categories = vec![
            (Category::Scripts, paths.scripts.clone()),
            (Category::Styles, paths.styles.clone()),
            (Category::Index, vec![paths.index.clone()]),
            (Category::Partials, paths.partials.clone()),
        ];
        if ctx.config.server.enabled {
            let mut patterns = paths.scripts_dev_server.clone();
            patterns.extend(ctx.config.server.patterns());
            categories.push((Category::DevServer, patterns));
        }

        let mut rules = Vec::new();
        let mut watched = HashSet::new();

        for (category, patterns) in categories {
            let (includes, excludes) = io::compile(root, &patterns)?;
            rules.push(Rule {
                category,
                includes,
                excludes,
            });

            for pattern in patterns.iter().filter(|p| !p.starts_with('!')) {
                let (base, _) = io::split_glob(pattern);
                watched.insert(root.join(base));
            }
        }

        Ok(Self {
            rules,
            roots: collapse_watch_paths(watched),
        })
    }

    /// Directories to watch recursively.
    pub fn roots(&self) -> &[Utf8PathBuf] {
        &self.roots
    }

    pub fn classify(&self, path: &Utf8Path) -> impl Iterator<Item = Category> {
        self.rules
            .iter()
            .filter(move |rule| io::matches(&rule.includes, &rule.excludes, path))
            .map(|rule| rule.category)
    }

    /// Every category touched by a batch of changed paths.
    pub fn categories<'a>(&self, paths: impl IntoIterator<Item = &'a Utf8Path>) -> BTreeSet<Category> {
        paths
            .into_iter()
            .flat_map(|path| self.classify(path))
            .collect()
    }
}

/// Reduces a set of paths to the minimal set of watch roots.
///
/// If we watch `/a` and `/a/b`, we only need to watch `/a` because
/// the watcher is recursive.
fn collapse_watch_paths(paths: HashSet<Utf8PathBuf>) -> Vec<Utf8PathBuf> {
    let mut paths: Vec<_> = paths.into_iter().collect();
    paths.sort();

    let mut result: Vec<Utf8PathBuf> = Vec::new();
    for path in paths {
        if let Some(last) = result.last()
            && path.starts_with(last)
        {
            continue;
        }
        result.push(path);
    }

    result
}

/// Rebuilds the segment of one category. `Ok(Some(path))` asks for a
/// browser reload announcing `path`, `Ok(None)` for nothing.
pub trait Rebuild {
    fn rebuild(&mut self, category: Category) -> Result<Option<String>, StepError>;
}

/// Receives reload announcements.
pub trait Notify {
    fn reload(&self, path: &str);
}

impl Notify for LiveReload {
    fn reload(&self, path: &str) {
        self.send_reload(path);
    }
}

/// Rebuilds each category once, in a fixed order, announcing each success.
/// A failing rebuild is logged and the session keeps going.
pub fn dispatch<R, N>(categories: &BTreeSet<Category>, rebuild: &mut R, notify: &N)
where
    R: Rebuild,
    N: Notify,
{
    for &category in categories {
        let s = Instant::now();
        match rebuild.rebuild(category) {
            Ok(Some(path)) => {
                tracing::info!("rebuilt {category} {}", as_overhead(s));
                notify.reload(&path);
            }
            Ok(None) => {}
            Err(e) => tracing::error!("rebuilding {category} failed:\n{e}"),
        }
    }
}

/// The real pipe segments behind each category.
struct Segments<'a> {
    ctx: &'a Context,
    profile: Profile,
    server: Option<Supervisor>,
}

impl Segments<'_> {
    fn announce(&self, outputs: &[Output]) -> String {
        match outputs.first() {
            Some(output) => io::to_url(&output.path),
            None => Utf8Path::new(&self.ctx.config.paths.index)
                .file_name()
                .unwrap_or("index.html")
                .to_string(),
        }
    }
}

impl Rebuild for Segments<'_> {
    fn rebuild(&mut self, category: Category) -> Result<Option<String>, StepError> {
        let ctx = self.ctx;
        let outputs = match (category, self.profile) {
            (Category::Scripts, profile) => scripts::build_app_scripts(ctx, profile)?,
            (Category::Styles, profile) => styles::build_styles(ctx, profile)?,
            (Category::Index, profile) => index::build_index(ctx, profile)?,
            (Category::Partials, Profile::Dev) => partials::build_partials_dev(ctx)?,
            // Partials are compiled into the app bundle.
            (Category::Partials, Profile::Prod) => scripts::build_app_scripts_prod(ctx)?,
            (Category::DevServer, _) => {
                scripts::validated_dev_server_scripts(ctx)?;
                if let Some(server) = &self.server {
                    server.restart();
                }
                return Ok(None);
            }
        };

        Ok(Some(self.announce(&outputs)))
    }
}

/// Watches the project until the process is interrupted.
pub fn watch(ctx: &Context, profile: Profile) -> Result<(), StepError> {
    let root = ctx.root.canonicalize_utf8().map_err(WatchError::Io)?;
    let classifier = Classifier::new(ctx, &root)?;

    let live = reload::start(ctx.config.reload.port)?;
    let server = ctx
        .config
        .server
        .enabled
        .then(|| Supervisor::start(ctx, profile));

    let (tx, rx) = mpsc::channel();
    let debounce = Duration::from_millis(ctx.config.reload.debounce_ms);
    let mut debouncer = new_debouncer(debounce, None, tx).map_err(WatchError::Notify)?;

    for path in classifier.roots() {
        if !path.is_dir() {
            tracing::warn!("not watching {path}, directory does not exist");
            continue;
        }
        tracing::info!("watching {path}");
        debouncer
            .watch(path, RecursiveMode::Recursive)
            .map_err(WatchError::Notify)?;
    }

    let mut segments = Segments {
        ctx,
        profile,
        server,
    };

    tracing::info!("waiting for changes ({profile})...");

    for result in rx {
        match result {
            Ok(events) => {
                let categories = classifier.categories(
                    events
                        .iter()
                        .filter(|de| {
                            matches!(
                                de.event.kind,
                                EventKind::Create(..) | EventKind::Modify(..) | EventKind::Remove(..)
                            )
                        })
                        .flat_map(|de| &de.event.paths)
                        .filter_map(|path| Utf8Path::from_path(path)),
                );

                if categories.is_empty() {
                    continue;
                }

                tracing::debug!("change detected in {categories:?}");
                dispatch(&categories, &mut segments, &live);
            }
            Err(errors) => {
                for e in errors {
                    tracing::error!("watch error: {e}");
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::fs;

    use super::*;
    use crate::config::Config;

    #[derive(Default)]
    struct Recorder {
        rebuilt: Vec<Category>,
        fail: Option<Category>,
    }

    impl Rebuild for Recorder {
        fn rebuild(&mut self, category: Category) -> Result<Option<String>, StepError> {
            self.rebuilt.push(category);
            match category {
                c if Some(c) == self.fail => Err(StepError::NotFound("app/index.html".into())),
                Category::DevServer => Ok(None),
                Category::Styles => Ok(Some("styles/main.css".into())),
                _ => Ok(Some("index.html".into())),
            }
        }
    }

    #[derive(Default)]
    struct Browser {
        reloads: RefCell<Vec<String>>,
    }

    impl Notify for Browser {
        fn reload(&self, path: &str) {
            self.reloads.borrow_mut().push(path.to_owned());
        }
    }

    fn classifier() -> Classifier {
        let ctx = Context::new("/project", Config::default());
        Classifier::new(&ctx, Utf8Path::new("/project")).unwrap()
    }

    fn paths<'a>(paths: &'a [&'a str]) -> impl Iterator<Item = &'a Utf8Path> {
        paths.iter().map(|p| Utf8Path::new(*p))
    }

    #[test]
    fn test_classify() {
        let classifier = classifier();

        let categories = |path: &str| classifier.classify(Utf8Path::new(path)).collect::<Vec<_>>();

        assert_eq!(categories("/project/app/main.js"), vec![Category::Scripts]);
        assert_eq!(categories("/project/app/styles/main.scss"), vec![Category::Styles]);
        assert_eq!(categories("/project/app/index.html"), vec![Category::Index]);
        assert_eq!(categories("/project/app/views/home.html"), vec![Category::Partials]);
        assert_eq!(categories("/project/devServer/routes.js"), vec![Category::DevServer]);
        assert!(categories("/project/README.md").is_empty());
        assert!(categories("/project/dist.dev/app/main.js").is_empty());
    }

    #[test]
    fn test_roots_are_collapsed() {
        let classifier = classifier();
        assert_eq!(
            classifier.roots(),
            [Utf8PathBuf::from("/project/app"), Utf8PathBuf::from("/project/devServer")]
        );
    }

    #[test]
    fn test_collapse_nested() {
        let paths = HashSet::from([
            Utf8PathBuf::from("/a/b"),
            Utf8PathBuf::from("/a"),
            Utf8PathBuf::from("/ab"),
        ]);
        assert_eq!(
            collapse_watch_paths(paths),
            vec![Utf8PathBuf::from("/a"), Utf8PathBuf::from("/ab")]
        );
    }

    #[test]
    fn test_style_change_rebuilds_styles_once() {
        let classifier = classifier();
        let categories = classifier.categories(paths(&[
            "/project/app/styles/main.scss",
            "/project/app/styles/_colors.scss",
            "/project/notes.txt",
        ]));

        let mut recorder = Recorder::default();
        let browser = Browser::default();
        dispatch(&categories, &mut recorder, &browser);

        assert_eq!(recorder.rebuilt, vec![Category::Styles]);
        assert_eq!(*browser.reloads.borrow(), vec!["styles/main.css".to_string()]);
    }

    #[test]
    fn test_dev_server_change_does_not_reload() {
        let classifier = classifier();
        let categories = classifier.categories(paths(&["/project/devServer/api.js"]));

        let mut recorder = Recorder::default();
        let browser = Browser::default();
        dispatch(&categories, &mut recorder, &browser);

        assert_eq!(recorder.rebuilt, vec![Category::DevServer]);
        assert!(browser.reloads.borrow().is_empty());
    }

    #[test]
    fn test_failure_skips_reload_and_continues() {
        let classifier = classifier();
        let categories = classifier.categories(paths(&[
            "/project/app/index.html",
            "/project/app/main.js",
        ]));

        let mut recorder = Recorder {
            fail: Some(Category::Index),
            ..Default::default()
        };
        let browser = Browser::default();
        dispatch(&categories, &mut recorder, &browser);

        assert_eq!(recorder.rebuilt, vec![Category::Scripts, Category::Index]);
        assert_eq!(browser.reloads.borrow().len(), 1);
    }

    #[test]
    fn test_disabled_server_is_not_watched() {
        let mut config = Config::default();
        config.server.enabled = false;
        let ctx = Context::new("/project", config);
        let classifier = Classifier::new(&ctx, Utf8Path::new("/project")).unwrap();

        assert_eq!(
            classifier.categories(paths(&["/project/devServer/api.js"])),
            BTreeSet::new()
        );
    }

    fn project(profile: Profile) -> (tempfile::TempDir, Context) {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap().to_path_buf();
        fs::create_dir_all(root.join("app/styles")).unwrap();
        fs::create_dir_all(root.join("app/home")).unwrap();
        fs::write(root.join("app/index.html"), "<html><body></body></html>\n").unwrap();
        fs::write(root.join("app/app.js"), "angular.module('app', []);\n").unwrap();
        fs::write(root.join("app/home/home.html"), "<h1>Welcome</h1>\n").unwrap();
        fs::write(root.join("app/styles/main.scss"), ".home { color: #ff0000; }\n").unwrap();

        let mut config = Config::default();
        config.server.enabled = false;
        let ctx = Context::new(root, config);
        fs::create_dir_all(ctx.dist(profile)).unwrap();
        (dir, ctx)
    }

    fn written(root: &Utf8Path) -> Vec<String> {
        let mut files = Vec::new();
        let mut stack = vec![root.to_path_buf()];
        while let Some(dir) = stack.pop() {
            for entry in dir.read_dir_utf8().unwrap() {
                let path = entry.unwrap().into_path();
                if path.is_dir() {
                    stack.push(path);
                } else {
                    files.push(io::to_url(path.strip_prefix(root).unwrap()));
                }
            }
        }
        files.sort();
        files
    }

    #[test]
    fn test_style_rebuild_writes_only_styles() {
        let (_dir, ctx) = project(Profile::Dev);
        let dist = ctx.dist(Profile::Dev);
        let mut segments = Segments {
            ctx: &ctx,
            profile: Profile::Dev,
            server: None,
        };

        let reload = segments.rebuild(Category::Styles).unwrap();
        assert_eq!(reload.as_deref(), Some("styles/main.css"));
        assert_eq!(written(&dist), vec!["styles/main.css"]);

        fs::write(ctx.path("app/styles/main.scss"), ".home { color: #0000ff; }\n").unwrap();
        segments.rebuild(Category::Styles).unwrap();

        let css = fs::read_to_string(dist.join("styles/main.css")).unwrap();
        assert!(css.contains("#0000ff") || css.contains("blue"));
        assert!(!dist.join("app.js").exists());
        assert!(!dist.join("index.html").exists());
        assert!(!dist.join("home/home.html").exists());
    }

    #[test]
    fn test_prod_partial_rebuild_refreshes_bundle() {
        let (_dir, ctx) = project(Profile::Prod);
        let bundle = ctx.dist(Profile::Prod).join(scripts::APP_BUNDLE);
        let mut segments = Segments {
            ctx: &ctx,
            profile: Profile::Prod,
            server: None,
        };

        segments.rebuild(Category::Partials).unwrap();
        assert!(fs::read_to_string(&bundle).unwrap().contains("Welcome"));

        fs::write(ctx.path("app/home/home.html"), "<h1>Goodbye</h1>\n").unwrap();
        let reload = segments.rebuild(Category::Partials).unwrap();

        assert_eq!(reload.as_deref(), Some(scripts::APP_BUNDLE));
        let code = fs::read_to_string(&bundle).unwrap();
        assert!(code.contains("Goodbye"));
        assert!(!code.contains("Welcome"));
        assert!(!ctx.dist(Profile::Prod).join("home/home.html").exists());
    }
}
