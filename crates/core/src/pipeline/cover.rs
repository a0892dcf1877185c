use crate::book::{Book, FileRole, GeneratedFile};
use crate::cover::prepare_cover;
use crate::error::ConvertError;
use crate::xml::Element;

use super::{xhtml_page, Artifact, JobContext, Stage};

pub const COVER_PAGE: &str = "cover.xhtml";

/// Sizes and stamps the cover image and puts a cover page first in the spine.
pub struct CoverStage;

impl Stage for CoverStage {
    fn name(&self) -> &'static str {
        "cover"
    }

    fn requires(&self) -> &'static [Artifact] {
        &[Artifact::CoverResolved, Artifact::ResolvedLinks]
    }

    fn provides(&self) -> &'static [Artifact] {
        &[Artifact::CoverPage]
    }

    fn run(&self, ctx: &mut JobContext) -> Result<(), ConvertError> {
        let Some(cover_id) = ctx.book.cover.clone() else {
            return Ok(());
        };
        let settings = &ctx.settings;
        let Some(img) = ctx.book.images.iter_mut().find(|img| img.id == cover_id) else {
            tracing::warn!("Cover image '{}' disappeared, no cover page", cover_id);
            return Ok(());
        };

        let cfg = &settings.config.cover;
        let old_src = img.href();
        match prepare_cover(img, settings.cover_resize, cfg.width, cfg.height, settings.stamp) {
            Ok(true) => tracing::debug!("Cover '{}' prepared as {}", img.id, img.filename),
            Ok(false) => {}
            Err(e) => tracing::warn!("Unable to prepare cover '{}', using it as is: {}", img.id, e),
        }

        let src = img.href();
        if src != old_src {
            let n = relink_images(&mut ctx.book, &old_src, &src);
            tracing::debug!("Cover renamed to {}, {} page references updated", src, n);
        }

        let mut body = Element::new("body");
        let mut div = Element::new("div").with_attr("class", "cover");
        div.push(Element::new("img").with_attr("src", src).with_attr("alt", "Cover"));
        body.push(div);

        let title = ctx.book.title.clone();
        ctx.book.files.insert(
            0,
            GeneratedFile::page("cover", COVER_PAGE, FileRole::Cover, xhtml_page(&title, body)),
        );
        Ok(())
    }
}

/// Point every `<img src="from">` in generated pages at `to`.
pub fn relink_images(book: &mut Book, from: &str, to: &str) -> usize {
    let mut count = 0;
    for file in &mut book.files {
        let Some(root) = file.markup_mut() else {
            continue;
        };
        root.walk_mut(&mut |el: &mut Element| {
            if el.name == "img" && el.attr("src") == Some(from) {
                el.set_attr("src", to);
                count += 1;
            }
        });
    }
    count
}
