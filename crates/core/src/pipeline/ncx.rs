use crate::book::{FileContent, FileRole, GeneratedFile};
use crate::config::TocPlacement;
use crate::error::ConvertError;
use crate::xml::Element;

use super::toc::{toc_tree, TocNode};
use super::{Artifact, JobContext, Stage};

pub const NCX_NAME: &str = "toc.ncx";
pub const NCX_MEDIA_TYPE: &str = "application/x-dtbncx+xml";

/// Writes the NCX navigation document.
pub struct NcxStage;

impl Stage for NcxStage {
    fn name(&self) -> &'static str {
        "ncx"
    }

    fn requires(&self) -> &'static [Artifact] {
        &[Artifact::Documents, Artifact::TocPage]
    }

    fn provides(&self) -> &'static [Artifact] {
        &[Artifact::Navigation]
    }

    fn run(&self, ctx: &mut JobContext) -> Result<(), ConvertError> {
        let book = &ctx.book;
        let mut nodes = toc_tree(&book.toc, ctx.settings.toc_type);

        if let Some(page) = book.files.iter().find(|f| f.role == FileRole::Toc) {
            let entry = TocNode {
                title: ctx.settings.config.toc.title.clone(),
                href: page.href(),
                children: Vec::new(),
            };
            match ctx.settings.toc_placement {
                TocPlacement::After => nodes.push(entry),
                _ => nodes.insert(0, entry),
            }
        }
        if nodes.is_empty() {
            // An empty navMap is invalid; point at the first text page instead.
            if let Some(first) = book.files.iter().find(|f| f.role == FileRole::Text) {
                nodes.push(TocNode {
                    title: book.title.clone(),
                    href: first.href(),
                    children: Vec::new(),
                });
            }
        }

        let mut ncx = Element::new("ncx")
            .with_attr("xmlns", "http://www.daisy.org/z3986/2005/ncx/")
            .with_attr("version", "2005-1")
            .with_attr("xml:lang", book.lang.as_str());

        let mut head = Element::new("head");
        let uid = format!("urn:uuid:{}", book.id);
        let depth = tree_depth(&nodes).to_string();
        for (name, content) in [
            ("dtb:uid", uid.as_str()),
            ("dtb:depth", depth.as_str()),
            ("dtb:totalPageCount", "0"),
            ("dtb:maxPageNumber", "0"),
        ] {
            head.push(Element::new("meta").with_attr("name", name).with_attr("content", content));
        }
        ncx.push(head);

        ncx.push(text_holder("docTitle", &book.title));
        for author in &book.authors {
            ncx.push(text_holder("docAuthor", author));
        }

        let mut nav_map = Element::new("navMap");
        let mut order = 0;
        for node in &nodes {
            nav_map.push(nav_point(node, &mut order));
        }
        ncx.push(nav_map);

        tracing::debug!("NCX: {} navigation points", order);
        ctx.book.files.push(GeneratedFile::support(
            "ncx",
            "OEBPS",
            NCX_NAME,
            NCX_MEDIA_TYPE,
            FileContent::Markup(ncx),
        ));
        Ok(())
    }
}

fn text_holder(name: &str, text: &str) -> Element {
    let mut holder = Element::new(name);
    let mut t = Element::new("text");
    t.push_text(text);
    holder.push(t);
    holder
}

fn nav_point(node: &TocNode, order: &mut usize) -> Element {
    *order += 1;
    let mut point = Element::new("navPoint")
        .with_attr("id", format!("navPoint-{}", order))
        .with_attr("playOrder", order.to_string());
    point.push(text_holder("navLabel", &node.title));
    point.push(Element::new("content").with_attr("src", node.href.as_str()));
    for child in &node.children {
        point.push(nav_point(child, order));
    }
    point
}

fn tree_depth(nodes: &[TocNode]) -> usize {
    nodes.iter().map(|n| 1 + tree_depth(&n.children)).max().unwrap_or(0)
}
