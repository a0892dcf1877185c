use crate::book::{Book, FileContent, FileRole, GeneratedFile};
use crate::error::ConvertError;
use crate::xml::Element;

use super::pagemap::PAGE_MAP_ID;
use super::{Artifact, JobContext, Stage};

pub const OPF_NAME: &str = "content.opf";
pub const OPF_MEDIA_TYPE: &str = "application/oebps-package+xml";

/// Writes the OPF 2.0 package document.
pub struct OpfStage;

impl Stage for OpfStage {
    fn name(&self) -> &'static str {
        "opf"
    }

    fn requires(&self) -> &'static [Artifact] {
        &[
            Artifact::Documents,
            Artifact::CoverResolved,
            Artifact::CoverPage,
            Artifact::TocPage,
            Artifact::Navigation,
            Artifact::Stylesheet,
            Artifact::PageMap,
        ]
    }

    fn provides(&self) -> &'static [Artifact] {
        &[Artifact::Manifest]
    }

    fn run(&self, ctx: &mut JobContext) -> Result<(), ConvertError> {
        let package = package(&ctx.book);
        ctx.book.files.push(GeneratedFile::support(
            "opf",
            "OEBPS",
            OPF_NAME,
            OPF_MEDIA_TYPE,
            FileContent::Markup(package),
        ));
        Ok(())
    }
}

/// Manifest id of an image: its file name without extension.
fn image_item_id(filename: &str) -> &str {
    filename.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(filename)
}

fn text_element(name: &str, text: &str) -> Element {
    let mut el = Element::new(name);
    el.push_text(text);
    el
}

fn package(book: &Book) -> Element {
    let mut package = Element::new("package")
        .with_attr("xmlns", "http://www.idpf.org/2007/opf")
        .with_attr("version", "2.0")
        .with_attr("unique-identifier", "BookId");

    package.push(metadata(book));

    let mut manifest = Element::new("manifest");
    for file in book.files.iter().filter(|f| f.rel_dir.starts_with("OEBPS")) {
        manifest.push(
            Element::new("item")
                .with_attr("id", file.id.as_str())
                .with_attr("href", file.href())
                .with_attr("media-type", file.media_type.as_str()),
        );
    }
    for img in &book.images {
        manifest.push(
            Element::new("item")
                .with_attr("id", image_item_id(&img.filename))
                .with_attr("href", img.href())
                .with_attr("media-type", img.target_mime_type()),
        );
    }
    package.push(manifest);

    let mut spine = Element::new("spine").with_attr("toc", "ncx");
    if book.files.iter().any(|f| f.id == PAGE_MAP_ID) {
        spine.set_attr("page-map", PAGE_MAP_ID);
    }
    for file in book.files.iter().filter(|f| f.in_spine) {
        let mut itemref = Element::new("itemref").with_attr("idref", file.id.as_str());
        if file.role == FileRole::Cover {
            itemref.set_attr("linear", "no");
        }
        spine.push(itemref);
    }
    package.push(spine);

    let mut guide = Element::new("guide");
    let references = [
        (FileRole::Cover, "cover", "Cover"),
        (FileRole::Toc, "toc", "Table of Contents"),
        (FileRole::Text, "text", "Beginning"),
    ];
    for (role, kind, title) in references {
        if let Some(file) = book.files.iter().find(|f| f.role == role) {
            guide.push(
                Element::new("reference")
                    .with_attr("type", kind)
                    .with_attr("title", title)
                    .with_attr("href", file.href()),
            );
        }
    }
    if !guide.is_empty() {
        package.push(guide);
    }
    package
}

fn metadata(book: &Book) -> Element {
    let mut meta = Element::new("metadata")
        .with_attr("xmlns:dc", "http://purl.org/dc/elements/1.1/")
        .with_attr("xmlns:opf", "http://www.idpf.org/2007/opf");

    meta.push(text_element("dc:title", &book.title));
    meta.push(text_element("dc:language", &book.lang));
    meta.push(
        text_element("dc:identifier", &format!("urn:uuid:{}", book.id))
            .with_attr("id", "BookId")
            .with_attr("opf:scheme", "uuid"),
    );
    for author in &book.authors {
        meta.push(text_element("dc:creator", author).with_attr("opf:role", "aut"));
    }
    for genre in &book.genres {
        meta.push(text_element("dc:subject", genre));
    }
    if !book.annotation.is_empty() {
        meta.push(text_element("dc:description", &book.annotation));
    }
    if !book.date.is_empty() {
        meta.push(text_element("dc:date", &book.date));
    }
    if !book.seq_name.is_empty() {
        meta.push(
            Element::new("meta")
                .with_attr("name", "calibre:series")
                .with_attr("content", book.seq_name.as_str()),
        );
        if let Some(n) = book.seq_num {
            meta.push(
                Element::new("meta")
                    .with_attr("name", "calibre:series_index")
                    .with_attr("content", n.to_string()),
            );
        }
    }
    if let Some(cover) = book.cover.as_deref().and_then(|id| book.image(id)) {
        meta.push(
            Element::new("meta")
                .with_attr("name", "cover")
                .with_attr("content", image_item_id(&cover.filename)),
        );
    }
    meta
}
