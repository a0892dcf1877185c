use crate::book::{FileContent, FileRole, GeneratedFile};
use crate::config::PageMapMode;
use crate::error::ConvertError;
use crate::xml::{Element, Node};

use super::{Artifact, JobContext, Stage};

pub const PAGE_MAP_NAME: &str = "page-map.xml";
pub const PAGE_MAP_ID: &str = "map";
pub const PAGE_MAP_MEDIA_TYPE: &str = "application/oebps-page-map+xml";

/// Inserts page markers into text pages and lists them in `page-map.xml`.
pub struct PageMapStage;

impl Stage for PageMapStage {
    fn name(&self) -> &'static str {
        "pagemap"
    }

    fn requires(&self) -> &'static [Artifact] {
        &[Artifact::Documents, Artifact::TocPage, Artifact::CoverPage]
    }

    fn provides(&self) -> &'static [Artifact] {
        &[Artifact::PageMap]
    }

    fn run(&self, ctx: &mut JobContext) -> Result<(), ConvertError> {
        let enabled = if ctx.settings.is_kindle() {
            ctx.settings.page_map != PageMapMode::None
        } else {
            ctx.settings.config.page_map.epub
        };
        if !enabled {
            return Ok(());
        }

        let chars_per_page = ctx.settings.config.page_map.chars_per_page.max(1);
        let mut pager = Pager::new(chars_per_page);
        for file in &mut ctx.book.files {
            if !matches!(file.role, FileRole::Text | FileRole::Notes | FileRole::Annotation) {
                continue;
            }
            let name = file.name.clone();
            if let Some(root) = file.markup_mut() {
                pager.paginate(root, &name);
            }
        }
        if pager.pages.is_empty() {
            tracing::debug!("Page map: no paragraphs, skipping");
            return Ok(());
        }

        let mut map = Element::new("page-map").with_attr("xmlns", "http://www.idpf.org/2007/opf");
        for (n, href) in pager.pages.iter().enumerate() {
            map.push(
                Element::new("page")
                    .with_attr("name", (n + 1).to_string())
                    .with_attr("href", href.as_str()),
            );
        }
        tracing::debug!("Page map: {} pages", pager.pages.len());
        ctx.book.files.push(GeneratedFile::support(
            PAGE_MAP_ID,
            "OEBPS",
            PAGE_MAP_NAME,
            PAGE_MAP_MEDIA_TYPE,
            FileContent::Markup(map),
        ));
        Ok(())
    }
}

struct Pager {
    chars_per_page: usize,
    /// Characters since the last marker.
    count: usize,
    /// `file#pageN` for every marker, in reading order.
    pages: Vec<String>,
}

impl Pager {
    fn new(chars_per_page: usize) -> Self {
        Self {
            chars_per_page,
            count: 0,
            pages: Vec::new(),
        }
    }

    fn paginate(&mut self, root: &mut Element, file: &str) {
        root.walk_mut(&mut |el: &mut Element| {
            if el.name != "p" {
                return;
            }
            if self.pages.is_empty() || self.count >= self.chars_per_page {
                let id = format!("page{}", self.pages.len() + 1);
                let marker = Element::new("a").with_attr("class", "pagemarker").with_attr("id", id.as_str());
                el.children.insert(0, Node::Element(marker));
                self.pages.push(format!("{}#{}", file, id));
                self.count = 0;
            }
            self.count += el.text().chars().filter(|c| *c != '\u{ad}').count();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConvertConfig;
    use crate::format::OutputFormat;
    use crate::pipeline::testing::{context, NS};
    use crate::pipeline::xhtml_page;
    use crate::xml;

    fn page_with(paragraphs: &[&str]) -> GeneratedFile {
        let mut body = Element::new("body");
        for text in paragraphs {
            let mut p = Element::new("p");
            p.push_text(text);
            body.push(p);
        }
        GeneratedFile::page("index00000", "index00000.xhtml", FileRole::Text, xhtml_page("t", body))
    }

    #[test]
    fn markers_every_n_characters() {
        let mut config = ConvertConfig::default();
        config.page_map.epub = true;
        config.page_map.chars_per_page = 10;
        let mut ctx = context(&format!("<FictionBook {NS}/>"), OutputFormat::Epub, config);
        ctx.book.files.push(page_with(&["0123456789", "abc", "defghijklmn", "z"]));

        PageMapStage.run(&mut ctx).unwrap();

        let html = xml::to_string(ctx.book.files[0].markup().unwrap());
        assert!(html.contains(r#"<p><a class="pagemarker" id="page1"></a>0123456789</p><p><a class="pagemarker" id="page2"></a>abc</p>"#));
        assert!(html.contains(r#"<p><a class="pagemarker" id="page3"></a>z</p>"#));

        let map = ctx.book.file(PAGE_MAP_NAME).unwrap();
        assert_eq!(map.media_type, PAGE_MAP_MEDIA_TYPE);
        let out = xml::to_string(map.markup().unwrap());
        assert!(out.contains(r##"<page name="3" href="index00000.xhtml#page3"/>"##));
    }

    #[test]
    fn disabled_by_default() {
        let mut ctx = context(&format!("<FictionBook {NS}/>"), OutputFormat::Mobi, ConvertConfig::default());
        ctx.book.files.push(page_with(&["text"]));
        PageMapStage.run(&mut ctx).unwrap();
        assert_eq!(ctx.book.files.len(), 1);
    }

    #[test]
    fn kindle_mode_enables_map() {
        let mut config = ConvertConfig::default();
        config.page_map.kindle = "eink".into();
        let mut ctx = context(&format!("<FictionBook {NS}/>"), OutputFormat::Mobi, config);
        ctx.book.files.push(page_with(&["text"]));
        PageMapStage.run(&mut ctx).unwrap();
        assert!(ctx.book.file(PAGE_MAP_NAME).is_some());
    }
}
