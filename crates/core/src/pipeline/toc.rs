use crate::book::{FileRole, GeneratedFile, TocEntry};
use crate::config::{TocPlacement, TocType};
use crate::error::ConvertError;
use crate::xml::Element;

use super::{xhtml_page, Artifact, JobContext, Stage};

pub const TOC_PAGE: &str = "toc.xhtml";

/// Builds the visible table of contents page.
pub struct TocStage;

/// One entry of the shaped TOC tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocNode {
    pub title: String,
    pub href: String,
    pub children: Vec<TocNode>,
}

impl Stage for TocStage {
    fn name(&self) -> &'static str {
        "toc"
    }

    fn requires(&self) -> &'static [Artifact] {
        &[Artifact::Documents, Artifact::ResolvedLinks]
    }

    fn provides(&self) -> &'static [Artifact] {
        &[Artifact::TocPage]
    }

    fn run(&self, ctx: &mut JobContext) -> Result<(), ConvertError> {
        let placement = ctx.settings.toc_placement;
        if placement == TocPlacement::None {
            return Ok(());
        }
        if ctx.book.toc.is_empty() {
            tracing::debug!("No TOC entries, skipping TOC page");
            return Ok(());
        }

        let title = ctx.settings.config.toc.title.clone();
        let tree = toc_tree(&ctx.book.toc, ctx.settings.toc_type);

        let mut body = Element::new("body");
        let mut heading = Element::new("div").with_attr("class", "h0");
        heading.push_text(&title);
        body.push(heading);
        let mut list = Element::new("div").with_attr("class", "toc");
        list.push(toc_list(&tree));
        body.push(list);

        let page = GeneratedFile::page("toc", TOC_PAGE, FileRole::Toc, xhtml_page(&title, body));
        match placement {
            TocPlacement::Before => ctx.book.files.insert(0, page),
            _ => ctx.book.files.push(page),
        }
        Ok(())
    }
}

/// Shape flat entries into a tree according to `kind`.
///
/// `flat` puts everything on one level, `kindle` allows at most two, and a
/// level never jumps more than one below its predecessor.
pub fn toc_tree(entries: &[TocEntry], kind: TocType) -> Vec<TocNode> {
    let cap = match kind {
        TocType::Flat => 1,
        TocType::Kindle => 2,
        TocType::Normal => usize::MAX,
    };
    let mut prev = 0;
    let levels: Vec<usize> = entries
        .iter()
        .map(|e| {
            let level = e.level.max(1).min(cap).min(prev + 1);
            prev = level;
            level
        })
        .collect();

    let mut pos = 0;
    build_level(entries, &levels, &mut pos, 1)
}

fn build_level(entries: &[TocEntry], levels: &[usize], pos: &mut usize, level: usize) -> Vec<TocNode> {
    let mut nodes = Vec::new();
    while *pos < entries.len() && levels[*pos] >= level {
        let entry = &entries[*pos];
        *pos += 1;
        let children = build_level(entries, levels, pos, level + 1);
        nodes.push(TocNode {
            title: entry.title.clone(),
            href: entry.href.clone(),
            children,
        });
    }
    nodes
}

fn toc_list(nodes: &[TocNode]) -> Element {
    let mut ul = Element::new("ul");
    for node in nodes {
        let mut li = Element::new("li");
        let mut a = Element::new("a").with_attr("href", node.href.as_str());
        a.push_text(&node.title);
        li.push(a);
        if !node.children.is_empty() {
            li.push(toc_list(&node.children));
        }
        ul.push(li);
    }
    ul
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConvertConfig;
    use crate::format::OutputFormat;
    use crate::pipeline::testing::{context, NS};
    use crate::xml;
    use pretty_assertions::assert_eq;

    fn entry(title: &str, level: usize) -> TocEntry {
        TocEntry {
            title: title.into(),
            href: format!("index00000.xhtml#{}", title),
            level,
        }
    }

    fn shape(nodes: &[TocNode]) -> String {
        nodes
            .iter()
            .map(|n| {
                if n.children.is_empty() {
                    n.title.clone()
                } else {
                    format!("{}({})", n.title, shape(&n.children))
                }
            })
            .collect::<Vec<_>>()
            .join(",")
    }

    fn entries() -> Vec<TocEntry> {
        vec![entry("a", 1), entry("b", 2), entry("c", 3), entry("d", 1), entry("e", 4)]
    }

    #[test]
    fn normal_toc_nests_and_clamps_jumps() {
        assert_eq!(shape(&toc_tree(&entries(), TocType::Normal)), "a(b(c)),d(e)");
    }

    #[test]
    fn flat_and_kindle_shapes() {
        assert_eq!(shape(&toc_tree(&entries(), TocType::Flat)), "a,b,c,d,e");
        assert_eq!(shape(&toc_tree(&entries(), TocType::Kindle)), "a(b,c),d(e)");
    }

    fn ctx_with(placement: &str) -> JobContext {
        let mut config = ConvertConfig::default();
        config.toc.placement = placement.into();
        let mut ctx = context(&format!("<FictionBook {NS}/>"), OutputFormat::Epub, config);
        ctx.book.toc = vec![entry("One", 1), entry("Two", 2)];
        ctx.book.files.push(GeneratedFile::page(
            "index00000",
            "index00000.xhtml",
            FileRole::Text,
            xhtml_page("x", Element::new("body")),
        ));
        ctx
    }

    #[test]
    fn page_placement() {
        let mut ctx = ctx_with("before");
        TocStage.run(&mut ctx).unwrap();
        assert_eq!(ctx.book.files[0].name, TOC_PAGE);
        let html = xml::to_string(ctx.book.files[0].markup().unwrap());
        assert!(html.contains(
            r##"<ul><li><a href="index00000.xhtml#One">One</a><ul><li><a href="index00000.xhtml#Two">Two</a></li></ul></li></ul>"##
        ));
        assert!(html.contains(r#"<div class="h0">Contents</div>"#));

        let mut ctx = ctx_with("after");
        TocStage.run(&mut ctx).unwrap();
        assert_eq!(ctx.book.files[1].name, TOC_PAGE);

        let mut ctx = ctx_with("none");
        TocStage.run(&mut ctx).unwrap();
        assert_eq!(ctx.book.files.len(), 1);
    }
}
