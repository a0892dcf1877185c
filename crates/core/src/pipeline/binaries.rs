use crate::error::ConvertError;
use crate::image::binary::IngestOptions;
use crate::image::BinaryImage;

use super::{Artifact, JobContext, Stage};

/// Decodes every `FictionBook/binary` into the book's image list.
pub struct BinariesStage;

impl Stage for BinariesStage {
    fn name(&self) -> &'static str {
        "binaries"
    }

    fn provides(&self) -> &'static [Artifact] {
        &[Artifact::Images]
    }

    fn run(&self, ctx: &mut JobContext) -> Result<(), ConvertError> {
        let cfg = &ctx.settings.config.images;
        let opts = IngestOptions {
            kindle: ctx.settings.is_kindle(),
            remove_png_transparency: cfg.remove_png_transparency,
            scale_factor: cfg.scale_factor,
            use_broken: cfg.use_broken,
            limits: ctx.limits.clone(),
        };

        let binaries = ctx
            .source
            .children_named("binary")
            .filter_map(|b| b.attr("id").map(str::trim).filter(|id| !id.is_empty()).map(|id| (id, b)));

        for (index, (id, binary)) in binaries.enumerate() {
            let declared = binary.attr("content-type").unwrap_or("");
            if let Some(img) = BinaryImage::ingest(id, declared, &binary.text(), index, &opts)? {
                ctx.book.images.push(img);
            }
        }
        tracing::debug!("Binaries: {} images kept", ctx.book.images.len());
        Ok(())
    }
}
