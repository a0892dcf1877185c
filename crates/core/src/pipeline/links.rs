use crate::book::Book;
use crate::error::ConvertError;
use crate::xml::Element;

use super::{Artifact, JobContext, Stage};

/// Points intra-book links at the file that holds their target.
pub struct LinksStage;

impl Stage for LinksStage {
    fn name(&self) -> &'static str {
        "links"
    }

    fn requires(&self) -> &'static [Artifact] {
        &[Artifact::Documents, Artifact::Annotation]
    }

    fn provides(&self) -> &'static [Artifact] {
        &[Artifact::ResolvedLinks]
    }

    fn run(&self, ctx: &mut JobContext) -> Result<(), ConvertError> {
        let rewritten = resolve_links(&mut ctx.book);
        tracing::debug!("Links: {} rewritten", rewritten);
        Ok(())
    }
}

/// Rewrite `#fragment` hrefs found in `link_targets` to `file#fragment`.
/// External links and unknown fragments are left alone. Returns the number
/// of rewritten links.
pub fn resolve_links(book: &mut Book) -> usize {
    let targets = &book.link_targets;
    let mut count = 0;
    for file in &mut book.files {
        let Some(root) = file.markup_mut() else { continue };
        root.walk_mut(&mut |el: &mut Element| {
            if el.name != "a" {
                return;
            }
            let Some(fragment) = el.attr("href").and_then(|h| h.strip_prefix('#')) else {
                return;
            };
            if let Some(target) = targets.get(fragment) {
                let href = format!("{}#{}", target, fragment);
                el.set_attr("href", href);
                count += 1;
            }
        });
    }
    count
}
