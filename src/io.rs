use std::collections::HashSet;
use std::fmt::Display;
use std::fs;
use std::io::ErrorKind;
use std::time::Instant;

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use console::Style;
use glob::{MatchOptions, Pattern};

use crate::error::{CleanError, StepError};

const ANSI_BLUE: Style = Style::new().blue();

const MATCH: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

pub fn as_overhead(s: Instant) -> impl Display {
    let e = Instant::now();
    let f = format!("(+{}ms)", e.duration_since(s).as_millis());
    ANSI_BLUE.apply_to(f)
}

/// Delete an output directory. Returns `false` when there was nothing to
/// delete.
pub fn clean(dir: &Utf8Path) -> Result<bool, CleanError> {
    let s = Instant::now();

    match fs::remove_dir_all(dir) {
        Ok(()) => {
            tracing::info!("cleaned {dir} {}", as_overhead(s));
            Ok(true)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::debug!("{dir} does not exist, nothing to clean");
            Ok(false)
        }
        Err(source) => Err(CleanError {
            path: dir.to_path_buf(),
            source,
        }),
    }
}

/// A file matched by a glob pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    /// Location on disk.
    pub path: Utf8PathBuf,
    /// Path relative to the project root, used in reports.
    pub file: Utf8PathBuf,
    /// Path relative to the glob base, used as the output path.
    pub rel: Utf8PathBuf,
}

impl Source {
    pub fn read_to_string(&self) -> Result<String, StepError> {
        fs::read_to_string(&self.path).map_err(|source| StepError::Read {
            path: self.file.clone(),
            source,
        })
    }

    pub fn read(&self) -> Result<Vec<u8>, StepError> {
        fs::read(&self.path).map_err(|source| StepError::Read {
            path: self.file.clone(),
            source,
        })
    }
}

fn strip_dot(pattern: &str) -> &str {
    pattern.trim_start_matches("./")
}

fn is_wildcard(component: &str) -> bool {
    component.contains(['*', '?', '[', '{'])
}

/// Splits a glob into its static base and the wildcard suffix.
///
/// A pattern without wildcards names a single file, so its base is the
/// parent directory.
pub fn split_glob(pattern: &str) -> (Utf8PathBuf, Utf8PathBuf) {
    let path = Utf8Path::new(strip_dot(pattern));
    let components: Vec<_> = path.components().collect();
    let split = components
        .iter()
        .position(|c| is_wildcard(c.as_str()))
        .unwrap_or(components.len().saturating_sub(1));

    let base: Utf8PathBuf = components.iter().take(split).collect();
    let rest: Utf8PathBuf = components.iter().skip(split).collect();
    (base, rest)
}

fn rooted_pattern(root: &Utf8Path, pattern: &str) -> Result<Pattern, glob::PatternError> {
    Pattern::new(&format!(
        "{}/{}",
        Pattern::escape(root.as_str()),
        strip_dot(pattern)
    ))
}

/// Resolves glob patterns against the project root.
///
/// Negated patterns (`!…`) remove files from the result regardless of their
/// position. Files are returned once, in pattern order and alphabetically
/// within a pattern.
pub fn resolve(root: &Utf8Path, patterns: &[String]) -> Result<Vec<Source>, StepError> {
    let (negated, positive): (Vec<&str>, Vec<&str>) = patterns
        .iter()
        .map(String::as_str)
        .partition(|pattern| pattern.starts_with('!'));

    let excludes = negated
        .iter()
        .map(|pattern| rooted_pattern(root, &pattern[1..]))
        .collect::<Result<Vec<_>, _>>()?;

    let mut seen = HashSet::new();
    let mut sources = Vec::new();

    for pattern in positive {
        let (base, _) = split_glob(pattern);
        let base = root.join(base);

        for entry in glob::glob(rooted_pattern(root, pattern)?.as_str())? {
            let path = Utf8PathBuf::try_from(entry?)?;

            if !path.is_file() {
                continue;
            }

            if excludes
                .iter()
                .any(|ex| ex.matches_with(path.as_str(), MATCH))
            {
                continue;
            }

            if !seen.insert(path.clone()) {
                continue;
            }

            let rel = path.strip_prefix(&base).unwrap_or(&path).to_path_buf();
            let file = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
            sources.push(Source { path, file, rel });
        }
    }

    Ok(sources)
}

/// Checks a path against patterns produced by [`compile`].
pub fn matches(patterns: &[Pattern], excludes: &[Pattern], path: &Utf8Path) -> bool {
    patterns.iter().any(|p| p.matches_with(path.as_str(), MATCH))
        && !excludes.iter().any(|p| p.matches_with(path.as_str(), MATCH))
}

/// Compiles patterns anchored at `root` into (includes, excludes).
pub fn compile(
    root: &Utf8Path,
    patterns: &[String],
) -> Result<(Vec<Pattern>, Vec<Pattern>), glob::PatternError> {
    let mut includes = Vec::new();
    let mut excludes = Vec::new();

    for pattern in patterns {
        match pattern.strip_prefix('!') {
            Some(negated) => excludes.push(rooted_pattern(root, negated)?),
            None => includes.push(rooted_pattern(root, pattern)?),
        }
    }

    Ok((includes, excludes))
}

/// Path of `target` as seen from the directory `from`. Both paths must be
/// expressed relative to the same root.
pub fn relative_to(from: &Utf8Path, target: &Utf8Path) -> Utf8PathBuf {
    let from: Vec<_> = from
        .components()
        .filter(|c| !matches!(c, Utf8Component::CurDir))
        .collect();
    let target: Vec<_> = target
        .components()
        .filter(|c| !matches!(c, Utf8Component::CurDir))
        .collect();

    let common = from
        .iter()
        .zip(&target)
        .take_while(|(a, b)| a == b)
        .count();

    let mut path = Utf8PathBuf::new();
    for _ in common..from.len() {
        path.push("..");
    }
    for component in &target[common..] {
        path.push(component.as_str());
    }

    path
}

/// Forward-slash form of a path, as used in URLs and template names.
pub fn to_url(path: &Utf8Path) -> String {
    path.as_str().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(root: &Utf8Path, path: &str) {
        let path = root.join(path);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "").unwrap();
    }

    #[test]
    fn test_clean_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        assert!(!clean(&root.join("dist.dev")).unwrap());
    }

    #[test]
    fn test_clean_removes_tree() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        touch(root, "dist.prod/a/b/c.js");

        assert!(clean(&root.join("dist.prod")).unwrap());
        assert!(!root.join("dist.prod").exists());
    }

    #[test]
    fn test_split_glob() {
        assert_eq!(
            split_glob("app/**/*.js"),
            (Utf8PathBuf::from("app"), Utf8PathBuf::from("**/*.js"))
        );
        assert_eq!(
            split_glob("./app/index.html"),
            (Utf8PathBuf::from("app"), Utf8PathBuf::from("index.html"))
        );
        assert_eq!(
            split_glob("*.js"),
            (Utf8PathBuf::new(), Utf8PathBuf::from("*.js"))
        );
    }

    #[test]
    fn test_resolve_with_negation() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        touch(root, "app/index.html");
        touch(root, "app/home/home.html");
        touch(root, "app/about.html");

        let patterns = vec!["app/**/*.html".to_string(), "!app/index.html".to_string()];
        let sources = resolve(root, &patterns).unwrap();
        let rels: Vec<_> = sources.iter().map(|s| s.rel.as_str()).collect();

        assert_eq!(rels, vec!["about.html", "home/home.html"]);
        assert_eq!(sources[1].file, "app/home/home.html");
    }

    #[test]
    fn test_negation_applies_in_any_position() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        touch(root, "app/index.html");
        touch(root, "app/about.html");

        let patterns = vec!["!app/index.html".to_string(), "app/**/*.html".to_string()];
        let sources = resolve(root, &patterns).unwrap();
        let rels: Vec<_> = sources.iter().map(|s| s.rel.as_str()).collect();

        assert_eq!(rels, vec!["about.html"]);
    }

    #[test]
    fn test_resolve_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        touch(root, "app/index.html");

        let sources = resolve(root, &["./app/index.html".to_string()]).unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].rel, "index.html");
    }

    #[test]
    fn test_resolve_deduplicates() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        touch(root, "app/a.css");

        let patterns = vec!["app/**/*.css".to_string(), "app/*.css".to_string()];
        assert_eq!(resolve(root, &patterns).unwrap().len(), 1);
    }

    #[test]
    fn test_matches_compiled() {
        let root = Utf8Path::new("/project");
        let patterns = vec!["app/**/*.html".to_string(), "!app/index.html".to_string()];
        let (includes, excludes) = compile(root, &patterns).unwrap();

        assert!(matches(&includes, &excludes, Utf8Path::new("/project/app/a/b.html")));
        assert!(!matches(&includes, &excludes, Utf8Path::new("/project/app/index.html")));
        assert!(!matches(&includes, &excludes, Utf8Path::new("/project/app/a.js")));
    }

    #[test]
    fn test_relative_to() {
        assert_eq!(
            relative_to(Utf8Path::new(""), Utf8Path::new("styles/main.css")),
            "styles/main.css"
        );
        assert_eq!(
            relative_to(Utf8Path::new("pages"), Utf8Path::new("app.min.js")),
            "../app.min.js"
        );
        assert_eq!(
            relative_to(Utf8Path::new("a/b"), Utf8Path::new("a/c/d.js")),
            "../c/d.js"
        );
    }
}
