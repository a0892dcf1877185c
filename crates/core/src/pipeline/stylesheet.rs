use std::path::Path;

use crate::book::{FileContent, GeneratedFile};
use crate::error::{ConfigError, ConvertError};

use super::{Artifact, JobContext, Stage};

pub const STYLESHEET_NAME: &str = "stylesheet.css";

const FONTS_DIR: &str = "OEBPS/fonts";
const VIGNETTES_DIR: &str = "OEBPS/vignettes";

const DEFAULT_STYLESHEET: &str = r#"body { margin: 0; padding: 0; text-align: justify; }
p { margin: 0; text-indent: 1.5em; }
a.anchor { vertical-align: super; font-size: 0.75em; text-decoration: none; }
div.h0 { margin: 2em 0 1em 0; text-align: center; font-size: 1.6em; font-weight: bold; }
h1, h2, h3, h4, h5, h6 { text-align: center; page-break-after: avoid; }
h1.title { font-size: 1.5em; margin: 1em 0 0.5em 0; }
h2.title { font-size: 1.3em; }
h3.title, h4.title, h5.title, h6.title { font-size: 1.1em; }
span.title { display: inline; }
div.emptyline { height: 1em; }
p.subtitle { text-align: center; font-weight: bold; text-indent: 0; margin: 0.5em 0; }
div.epigraph { margin: 1em 0 1em 30%; font-style: italic; }
div.cite { margin: 1em 2em; }
div.poem { margin: 1em 0 1em 2em; }
div.stanza { margin: 0.5em 0; }
p.v { text-indent: 0; }
p.text-author { text-align: right; font-style: italic; text-indent: 0; }
div.annotation { margin: 1em; font-style: italic; }
div.image { text-align: center; margin: 0.5em 0; }
div.image img { max-width: 100%; }
div.cover { text-align: center; height: 100%; }
div.cover img { height: 100%; max-width: 100%; }
span.inlinenote { font-size: 0.8em; }
div.blocknote { font-size: 0.8em; margin: 0.3em 0 0.3em 1em; }
span.notenum, p.notenum { font-weight: bold; }
aside.footnote { font-size: 0.8em; }
div.toc ul { list-style-type: none; }
a.pagemarker { text-decoration: none; }
table { border-collapse: collapse; margin: 0.5em auto; }
td, th { border: 1px solid; padding: 0.2em; }
"#;

/// Adds the book stylesheet plus any fonts and images it references.
pub struct StylesheetStage;

impl Stage for StylesheetStage {
    fn name(&self) -> &'static str {
        "stylesheet"
    }

    fn provides(&self) -> &'static [Artifact] {
        &[Artifact::Stylesheet]
    }

    fn run(&self, ctx: &mut JobContext) -> Result<(), ConvertError> {
        let (css, resources) = match &ctx.settings.config.stylesheet {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                })?;
                let base = path.parent().unwrap_or(Path::new("."));
                rewrite_urls(&text, base)
            }
            None => (DEFAULT_STYLESHEET.to_string(), Vec::new()),
        };

        tracing::debug!("Stylesheet: {} referenced resources", resources.len());
        ctx.book.files.extend(resources);
        ctx.book.files.push(GeneratedFile::support(
            "stylesheet",
            "OEBPS",
            STYLESHEET_NAME,
            "text/css",
            FileContent::Text(css),
        ));
        Ok(())
    }
}

/// Rewrite every local `url(...)` to a copy inside the book.
///
/// Fonts go to `OEBPS/fonts`, everything else to `OEBPS/vignettes`. Files that
/// cannot be read are reported and their url is left as is.
fn rewrite_urls(css: &str, base: &Path) -> (String, Vec<GeneratedFile>) {
    let mut out = String::with_capacity(css.len());
    let mut files: Vec<GeneratedFile> = Vec::new();
    let mut rest = css;

    while let Some(start) = rest.find("url(") {
        let after = &rest[start + 4..];
        let Some(end) = after.find(')') else { break };
        out.push_str(&rest[..start + 4]);
        let raw = &after[..end];
        let target = raw.trim().trim_matches(|c| c == '"' || c == '\'');

        match local_resource(target, base, &mut files) {
            Some(href) => out.push_str(&format!("\"{}\"", href)),
            None => out.push_str(raw),
        }
        out.push(')');
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    (out, files)
}

/// Register `target` as a book resource, returning its new href.
fn local_resource(target: &str, base: &Path, files: &mut Vec<GeneratedFile>) -> Option<String> {
    if target.is_empty() || target.starts_with('#') || target.contains(':') {
        return None;
    }
    let path = base.join(target);
    let name = path.file_name()?.to_string_lossy().to_string();
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    let (dir, media_type) = match ext.as_str() {
        "ttf" => (FONTS_DIR, "application/x-font-ttf"),
        "otf" => (FONTS_DIR, "application/vnd.ms-opentype"),
        "woff" => (FONTS_DIR, "application/font-woff"),
        "woff2" => (FONTS_DIR, "font/woff2"),
        "png" => (VIGNETTES_DIR, "image/png"),
        "jpg" | "jpeg" => (VIGNETTES_DIR, "image/jpeg"),
        "gif" => (VIGNETTES_DIR, "image/gif"),
        "svg" => (VIGNETTES_DIR, "image/svg+xml"),
        _ => (VIGNETTES_DIR, "application/octet-stream"),
    };

    if let Some(existing) = files.iter().find(|f| f.rel_dir == dir && f.name == name) {
        return Some(existing.href());
    }
    let data = match std::fs::read(&path) {
        Ok(d) => d,
        Err(e) => {
            tracing::warn!("Unable to load stylesheet resource '{}': {}", path.display(), e);
            return None;
        }
    };
    let prefix = if dir == FONTS_DIR { "font" } else { "vignette" };
    let id = format!("{}{}", prefix, files.len() + 1);
    let file = GeneratedFile::support(id, dir, name, media_type, FileContent::Bytes(data));
    let href = file.href();
    files.push(file);
    Some(href)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConvertConfig;
    use crate::format::OutputFormat;
    use crate::pipeline::testing::{context, NS};
    use pretty_assertions::assert_eq;

    #[test]
    fn builtin_stylesheet() {
        let mut ctx = context(&format!("<FictionBook {NS}/>"), OutputFormat::Epub, ConvertConfig::default());
        StylesheetStage.run(&mut ctx).unwrap();
        let css = ctx.book.file(STYLESHEET_NAME).unwrap();
        assert_eq!(css.rel_path(), "OEBPS/stylesheet.css");
        assert!(matches!(&css.content, FileContent::Text(t) if t.contains("div.h0")));
    }

    #[test]
    fn resources_are_copied_and_urls_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("fonts")).unwrap();
        std::fs::write(dir.path().join("fonts/Serif.ttf"), b"font").unwrap();
        std::fs::write(dir.path().join("dash.png"), b"png").unwrap();
        let css = r#"@font-face { src: url('fonts/Serif.ttf'); }
hr { background: url(dash.png); }
p { background: url("missing.png"); }
a { background: url(http://example.com/x.png); }
b { src: url(fonts/Serif.ttf); }"#;

        let (out, files) = rewrite_urls(css, dir.path());
        assert!(out.contains(r#"url("fonts/Serif.ttf")"#));
        assert!(out.contains(r#"url("vignettes/dash.png")"#));
        assert!(out.contains(r#"url("missing.png")"#));
        assert!(out.contains("url(http://example.com/x.png)"));

        let paths: Vec<_> = files.iter().map(|f| (f.rel_path(), f.media_type.as_str())).collect();
        assert_eq!(
            paths,
            vec![
                ("OEBPS/fonts/Serif.ttf".to_string(), "application/x-font-ttf"),
                ("OEBPS/vignettes/dash.png".to_string(), "image/png"),
            ]
        );
    }

    #[test]
    fn unreadable_custom_stylesheet_is_fatal() {
        let mut config = ConvertConfig::default();
        config.stylesheet = Some("/nonexistent/book.css".into());
        let mut ctx = context(&format!("<FictionBook {NS}/>"), OutputFormat::Epub, config);
        assert!(matches!(
            StylesheetStage.run(&mut ctx),
            Err(ConvertError::Config(ConfigError::Read { .. }))
        ));
    }
}
