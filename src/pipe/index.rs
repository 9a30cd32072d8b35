//! The index page and the asset references injected into it.

use camino::{Utf8Path, Utf8PathBuf};

use crate::config::{Context, Profile};
use crate::error::StepError;
use crate::lint::{self, Strictness, html::Rules};
use crate::output::Output;
use crate::{html, io, pipe};

use super::{Asset, finish, order, scripts, styles, vendor};

const END_MARKER: &str = "endinject";

/// Assets to reference from the index, paths relative to the dist root.
#[derive(Debug, Default, Clone)]
pub struct Injection {
    /// Go into the `bower:*` sections.
    pub vendor: Vec<Utf8PathBuf>,
    /// Go into the `inject:*` sections.
    pub app: Vec<Utf8PathBuf>,
}

impl Injection {
    fn section(&self, name: &str) -> Option<&[Utf8PathBuf]> {
        match name {
            "bower" => Some(&self.vendor),
            "inject" => Some(&self.app),
            _ => None,
        }
    }
}

/// The next `<!-- ... -->` at or after `from`: where it starts, where it
/// ends and its trimmed text.
fn next_comment(html: &str, from: usize) -> Option<(usize, usize, &str)> {
    let start = from + html[from..].find("<!--")?;
    let text_start = start + "<!--".len();
    let text_end = text_start + html[text_start..].find("-->")?;
    Some((start, text_end + "-->".len(), html[text_start..text_end].trim()))
}

/// Parses the text of a `<!-- name:ext -->` marker.
fn start_marker(text: &str) -> Option<(&str, &str)> {
    let (name, ext) = text.split_once(':')?;
    matches!(ext, "js" | "css").then_some((name, ext))
}

fn end_marker(html: &str, from: usize) -> Option<(usize, usize)> {
    let mut pos = from;
    while let Some((start, end, text)) = next_comment(html, pos) {
        if text == END_MARKER {
            return Some((start, end));
        }
        pos = end;
    }
    None
}

fn tag(ext: &str, url: &str) -> String {
    match ext {
        "css" => format!("<link rel=\"stylesheet\" href=\"{url}\">"),
        _ => format!("<script src=\"{url}\"></script>"),
    }
}

/// Replaces the content of every marker section with references to the
/// matching assets. A marker alone on its line gets one reference per line,
/// indented like the marker; a marker sharing its line with other markup
/// gets them inline.
///
/// `index_dir` is the directory of the index inside the dist tree; asset
/// URLs are made relative to it. Sections without an end marker are left
/// alone.
pub fn inject(html: &str, index_dir: &Utf8Path, injection: &Injection) -> String {
    let mut out = String::with_capacity(html.len());
    let mut copied = 0;
    let mut pos = 0;

    while let Some((start, open_end, text)) = next_comment(html, pos) {
        pos = open_end;

        let Some((name, ext)) = start_marker(text) else {
            continue;
        };
        let Some(files) = injection.section(name) else {
            continue;
        };
        let Some((close_start, close_end)) = end_marker(html, open_end) else {
            continue;
        };

        let line_start = html[..start].rfind('\n').map_or(0, |i| i + 1);
        let indent = &html[line_start..start];
        let own_line = indent.trim().is_empty();

        out.push_str(&html[copied..open_end]);
        for file in files.iter().filter(|f| f.extension() == Some(ext)) {
            let url = io::to_url(&io::relative_to(index_dir, file));
            if own_line {
                out.push('\n');
                out.push_str(indent);
            }
            out.push_str(&tag(ext, &url));
        }
        if own_line {
            out.push('\n');
            out.push_str(indent);
        }
        out.push_str(&html[close_start..close_end]);

        copied = close_end;
        pos = close_end;
    }

    out.push_str(&html[copied..]);
    out
}

pub fn validated_index(ctx: &Context) -> Result<Asset, StepError> {
    let pattern = ctx.config.paths.index.clone();

    let mut assets = pipe::validate(
        ctx,
        std::slice::from_ref(&pattern),
        |asset| lint::html::lint(&asset.source.file, &asset.text, Rules::default()),
        Strictness::Report,
    )?;

    if assets.is_empty() {
        return Err(StepError::NotFound(pattern));
    }
    Ok(assets.swap_remove(0))
}

fn paths(outputs: &[Output]) -> Vec<Utf8PathBuf> {
    outputs.iter().map(|o| o.path.clone()).collect()
}

/// Builds the vendor files, app scripts and styles of a profile side by
/// side, then writes the index referencing them.
pub fn build_index(ctx: &Context, profile: Profile) -> Result<Vec<Output>, StepError> {
    let index = validated_index(ctx)?;

    let ((vendor, scripts), styles) = rayon::join(
        || {
            rayon::join(
                || vendor::build_vendor_scripts(ctx, profile),
                || scripts::build_app_scripts(ctx, profile),
            )
        },
        || styles::build_styles(ctx, profile),
    );

    let vendor = vendor?;
    let scripts = order::angular_filesort(scripts?)?;
    let styles = styles?;

    let injection = Injection {
        vendor: paths(&vendor),
        app: paths(&scripts).into_iter().chain(paths(&styles)).collect(),
    };

    let index_dir = index.source.rel.parent().unwrap_or(Utf8Path::new(""));
    let mut page = inject(&index.text, index_dir, &injection);

    if profile == Profile::Prod {
        page = html::minify(&page).map_err(|source| StepError::Markup {
            file: index.source.file.clone(),
            source,
        })?;
    }

    let segment = match profile {
        Profile::Dev => "build-index-dev",
        Profile::Prod => "build-index-prod",
    };
    finish(segment, &ctx.dist(profile), vec![Output::new(index.source.rel, page)])
}

pub fn build_index_dev(ctx: &Context) -> Result<Vec<Output>, StepError> {
    build_index(ctx, Profile::Dev)
}

pub fn build_index_prod(ctx: &Context) -> Result<Vec<Output>, StepError> {
    build_index(ctx, Profile::Prod)
}
