use camino::{Utf8Path, Utf8PathBuf};
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use parcel_sourcemap::SourceMap;
use rayon::prelude::*;
use thiserror::Error;

use crate::config::{Context, Profile};
use crate::error::StepError;
use crate::io::{self, Source};
use crate::output::{Output, min_suffix};

use super::finish;

/// Errors that can occur when compiling stylesheets.
#[derive(Debug, Error)]
pub enum StyleError {
    #[error("Sass compilation error in '{file}':\n{source}")]
    Sass {
        file: Utf8PathBuf,
        source: Box<grass::Error>,
    },

    #[error("Couldn't minify '{file}':\n{message}")]
    Minify { file: Utf8PathBuf, message: String },
}

/// Partials such as `_variables.scss` are only ever imported.
fn is_partial(source: &Source) -> bool {
    source.path.file_name().is_some_and(|name| name.starts_with('_'))
}

fn compile(source: &Source) -> Result<String, StyleError> {
    grass::from_path(&source.path, &grass::Options::default()).map_err(|source_error| {
        StyleError::Sass {
            file: source.file.clone(),
            source: source_error,
        }
    })
}

fn minify_into(
    file: &Utf8Path,
    css: &str,
    source_map: Option<&mut SourceMap>,
) -> Result<String, StyleError> {
    let fail = |message: String| StyleError::Minify {
        file: file.to_path_buf(),
        message,
    };

    let mut sheet =
        StyleSheet::parse(css, ParserOptions::default()).map_err(|e| fail(e.to_string()))?;
    sheet
        .minify(MinifyOptions::default())
        .map_err(|e| fail(e.to_string()))?;

    let printed = sheet
        .to_css(PrinterOptions {
            minify: true,
            source_map,
            ..PrinterOptions::default()
        })
        .map_err(|e| fail(e.to_string()))?;

    Ok(printed.code)
}

/// Minifies plain CSS.
pub fn minify(file: &Utf8Path, css: &str) -> Result<String, StyleError> {
    minify_into(file, css, None)
}

/// Minifies `css` and appends an inline source map that embeds it under
/// the name `source`.
pub fn minify_mapped(file: &Utf8Path, source: &str, css: &str) -> Result<String, StyleError> {
    let fail = |message: String| StyleError::Minify {
        file: file.to_path_buf(),
        message,
    };

    let mut map = SourceMap::new("/");
    let index = map.add_source(source);
    map.set_source_content(index as usize, css)
        .map_err(|e| fail(format!("{e:?}")))?;

    let mut code = minify_into(file, css, Some(&mut map))?;

    let json = map.to_json(None).map_err(|e| fail(format!("{e:?}")))?;
    let url = swc_sourcemap::SourceMap::from_slice(json.as_bytes())
        .and_then(|map| map.to_data_url())
        .map_err(|e| fail(e.to_string()))?;

    code.push_str("\n/*# sourceMappingURL=");
    code.push_str(&url);
    code.push_str(" */\n");
    Ok(code)
}

fn compiled(ctx: &Context) -> Result<Vec<(Source, String)>, StepError> {
    let sources: Vec<Source> = io::resolve(&ctx.root, &ctx.config.paths.styles)?
        .into_iter()
        .filter(|source| !is_partial(source))
        .collect();

    let compiled = sources
        .into_par_iter()
        .map(|source| {
            let css = compile(&source)?;
            Ok((source, css))
        })
        .collect::<Result<Vec<_>, StyleError>>()?;

    Ok(compiled)
}

pub fn build_styles_dev(ctx: &Context) -> Result<Vec<Output>, StepError> {
    let outputs = compiled(ctx)?
        .into_iter()
        .map(|(source, css)| Output::new(source.rel.with_extension("css"), css))
        .collect();

    finish("build-styles-dev", &ctx.dist(Profile::Dev), outputs)
}

pub fn build_styles_prod(ctx: &Context) -> Result<Vec<Output>, StepError> {
    let outputs = compiled(ctx)?
        .into_par_iter()
        .map(|(source, css)| {
            let compiled = source.rel.with_extension("css");
            let css = minify_mapped(&source.file, &io::to_url(&compiled), &css)?;
            let path = min_suffix(&compiled);
            Ok(Output::new(path, css))
        })
        .collect::<Result<Vec<_>, StyleError>>()?;

    finish("build-styles-prod", &ctx.dist(Profile::Prod), outputs)
}

pub fn build_styles(ctx: &Context, profile: Profile) -> Result<Vec<Output>, StepError> {
    match profile {
        Profile::Dev => build_styles_dev(ctx),
        Profile::Prod => build_styles_prod(ctx),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::config::Config;

    fn project() -> (tempfile::TempDir, Context) {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap().to_path_buf();
        fs::create_dir_all(root.join("app/styles")).unwrap();
        fs::write(root.join("app/styles/_colors.scss"), "$accent: #ff0000;\n").unwrap();
        fs::write(
            root.join("app/styles/main.scss"),
            "@import 'colors';\n.header {\n  .title { color: $accent; }\n}\n",
        )
        .unwrap();
        fs::write(root.join("app/plain.css"), "body {\n  margin: 0px;\n}\n").unwrap();
        (dir, Context::new(root, Config::default()))
    }

    #[test]
    fn test_minify() {
        let css = minify(Utf8Path::new("a.css"), "a {\n  color: #ff0000;\n}\n").unwrap();
        assert_eq!(css, "a{color:red}");
    }

    #[test]
    fn test_build_styles_dev() {
        let (_dir, ctx) = project();
        let outputs = build_styles_dev(&ctx).unwrap();
        let mut paths: Vec<_> = outputs.iter().map(|o| o.path.as_str()).collect();
        paths.sort();

        assert_eq!(paths, vec!["plain.css", "styles/main.css"]);
        let main = fs::read_to_string(ctx.dist(Profile::Dev).join("styles/main.css")).unwrap();
        assert!(main.contains(".header .title"));
        assert!(main.contains("#ff0000") || main.contains("red"));
    }

    #[test]
    fn test_build_styles_prod() {
        let (_dir, ctx) = project();
        build_styles_prod(&ctx).unwrap();

        let dist = ctx.dist(Profile::Prod);
        assert!(dist.join("plain.min.css").is_file());
        assert!(!dist.join("styles/_colors.min.css").exists());
        let main = fs::read_to_string(dist.join("styles/main.min.css")).unwrap();
        let (rules, map) = main.split_once("\n/*# sourceMappingURL=").unwrap();
        assert!(rules.contains(".header .title{color:red}"));
        assert!(!rules.contains('\n'));
        assert!(map.starts_with("data:application/json;charset=utf-8;base64,"));
        assert!(map.ends_with(" */\n"));
    }

    #[test]
    fn test_minify_mapped_embeds_source() {
        let css = minify_mapped(Utf8Path::new("a.css"), "styles/a.css", "a {\n  color: #ff0000;\n}\n").unwrap();
        let (rules, comment) = css.split_once('\n').unwrap();
        assert_eq!(rules, "a{color:red}");

        let url = comment
            .strip_prefix("/*# sourceMappingURL=")
            .and_then(|c| c.strip_suffix(" */\n"))
            .unwrap();
        let map = swc_sourcemap::decode_data_url(&url.replacen(";charset=utf-8", "", 1)).unwrap();
        let swc_sourcemap::DecodedMap::Regular(map) = map else {
            panic!("expected a regular source map");
        };
        assert!(map.get_source(0).unwrap().ends_with("a.css"));
        assert!(map.get_source_contents(0).unwrap().contains("#ff0000"));
    }

    #[test]
    fn test_sass_error() {
        let (_dir, ctx) = project();
        fs::write(ctx.path("app/broken.scss"), "a { color: $missing; }").unwrap();
        assert!(matches!(
            build_styles_dev(&ctx),
            Err(StepError::Style(StyleError::Sass { .. }))
        ));
    }
}
