use crate::config::StampPlacement;
use crate::cover::default_cover;
use crate::error::ConvertError;
use crate::image::ProcessingFlags;

use super::{Artifact, JobContext, Stage};

/// Resolves the cover among the ingested images, synthesizing one when needed.
pub struct ImagesStage;

impl Stage for ImagesStage {
    fn name(&self) -> &'static str {
        "images"
    }

    fn requires(&self) -> &'static [Artifact] {
        &[Artifact::Images, Artifact::Metadata]
    }

    fn provides(&self) -> &'static [Artifact] {
        &[Artifact::CoverResolved]
    }

    fn run(&self, ctx: &mut JobContext) -> Result<(), ConvertError> {
        let book = &mut ctx.book;

        if let Some(cover_id) = book.cover.clone() {
            let mut found = false;
            let before = book.images.len();
            book.images.retain_mut(|img| {
                if img.id != cover_id {
                    return true;
                }
                if found {
                    return false;
                }
                found = true;
                // Covers are sized by the cover stage, never by the global factor.
                img.flags.remove(ProcessingFlags::RESCALE);
                img.scale_factor = 0.0;
                true
            });
            let removed = before - book.images.len();
            if removed > 0 {
                tracing::warn!("Removed {} duplicate image(s) with cover id '{}'", removed, cover_id);
            }
            if !found {
                tracing::warn!("Unable to find cover image '{}', book will have no cover", cover_id);
            }
            return Ok(());
        }

        if !ctx.settings.is_kindle() && !ctx.settings.config.cover.default {
            return Ok(());
        }

        let index = book.images.iter().map(|img| img.index + 1).max().unwrap_or(0);
        let cover = default_cover(&ctx.settings.config.cover, index)?;
        book.cover = Some(cover.id.clone());
        book.images.push(cover);
        if ctx.settings.stamp.is_none() {
            ctx.settings.stamp = Some(StampPlacement::Middle);
        }
        Ok(())
    }
}
