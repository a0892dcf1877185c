use crate::book::{FileContent, GeneratedFile};
use crate::error::ConvertError;
use crate::xml::Element;

use super::opf::{OPF_MEDIA_TYPE, OPF_NAME};
use super::{Artifact, JobContext, Stage};

pub const MIMETYPE_NAME: &str = "mimetype";
pub const EPUB_MIMETYPE: &str = "application/epub+zip";

/// Container descriptors: `mimetype` and `META-INF/container.xml`.
pub struct MetaStage;

impl Stage for MetaStage {
    fn name(&self) -> &'static str {
        "meta"
    }

    fn requires(&self) -> &'static [Artifact] {
        &[Artifact::Manifest]
    }

    fn provides(&self) -> &'static [Artifact] {
        &[Artifact::ContainerMeta]
    }

    fn run(&self, ctx: &mut JobContext) -> Result<(), ConvertError> {
        ctx.book.files.push(GeneratedFile::support(
            "mimetype",
            "",
            MIMETYPE_NAME,
            "text/plain",
            FileContent::Text(EPUB_MIMETYPE.to_string()),
        ));

        let mut container = Element::new("container")
            .with_attr("version", "1.0")
            .with_attr("xmlns", "urn:oasis:names:tc:opendocument:xmlns:container");
        let mut rootfiles = Element::new("rootfiles");
        rootfiles.push(
            Element::new("rootfile")
                .with_attr("full-path", format!("OEBPS/{}", OPF_NAME))
                .with_attr("media-type", OPF_MEDIA_TYPE),
        );
        container.push(rootfiles);

        ctx.book.files.push(GeneratedFile::support(
            "container",
            "META-INF",
            "container.xml",
            "application/xml",
            FileContent::Markup(container),
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConvertConfig;
    use crate::format::OutputFormat;
    use crate::pipeline::testing::{context, NS};

    #[test]
    fn container_points_at_package() {
        let mut ctx = context(&format!("<FictionBook {NS}/>"), OutputFormat::Epub, ConvertConfig::default());
        MetaStage.run(&mut ctx).unwrap();

        let mimetype = ctx.book.file(MIMETYPE_NAME).unwrap();
        assert_eq!(mimetype.rel_path(), "mimetype");
        assert!(matches!(&mimetype.content, FileContent::Text(t) if t == EPUB_MIMETYPE));

        let container = ctx.book.file("container.xml").unwrap();
        assert_eq!(container.rel_path(), "META-INF/container.xml");
        let out = crate::xml::to_string(container.markup().unwrap());
        assert!(out.contains(r#"<rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>"#));
    }
}
