use crate::book::{derive_book_id, FileRole, GeneratedFile};
use crate::error::ConvertError;
use crate::language;
use crate::rename::{format_author, AuthorName};
use crate::transformer::TreeTransformer;
use crate::xml::Element;

use super::{xhtml_page, Artifact, JobContext, Stage};

pub const ANNOTATION_PAGE: &str = "annotation.xhtml";

/// Book metadata from `FictionBook/description`.
pub struct DescriptionStage;

impl Stage for DescriptionStage {
    fn name(&self) -> &'static str {
        "description"
    }

    fn provides(&self) -> &'static [Artifact] {
        &[Artifact::Metadata, Artifact::Annotation]
    }

    fn run(&self, ctx: &mut JobContext) -> Result<(), ConvertError> {
        let Some(desc) = ctx.source.child("description") else {
            tracing::warn!("Book has no description, using defaults");
            return Ok(());
        };
        let book = &mut ctx.book;

        if let Some(id) = desc.find("document-info/id") {
            let raw = id.text();
            if !raw.trim().is_empty() {
                book.id = derive_book_id(&raw);
            }
        }

        let Some(info) = desc.child("title-info") else {
            tracing::warn!("Book description has no title-info");
            return Ok(());
        };

        if let Some(title) = info.child("book-title").map(Element::text_fragment).filter(|t| !t.is_empty()) {
            book.title = title;
        }

        if let Some(lang) = info.child("lang") {
            book.lang = language::resolve(&lang.text())?;
        }

        if let Some(href) = info.find("coverpage/image").and_then(|img| img.attr("href")) {
            let id = href.trim().trim_start_matches('#');
            if !id.is_empty() {
                book.cover = Some(id.to_string());
            }
        }

        book.genres = info
            .children_named("genre")
            .map(Element::text_fragment)
            .filter(|g| !g.is_empty())
            .collect();

        let template = &ctx.settings.config.author_format;
        book.authors = info
            .children_named("author")
            .map(|a| {
                let part = |name: &str| a.child(name).map(Element::text_fragment).unwrap_or_default();
                AuthorName {
                    first: part("first-name"),
                    middle: part("middle-name"),
                    last: part("last-name"),
                    nick: part("nickname"),
                }
            })
            .filter(|a| !a.is_empty())
            .map(|a| format_author(template, &a))
            .filter(|a| !a.is_empty())
            .collect();

        if let Some(seq) = info.child("sequence") {
            book.seq_name = seq.attr("name").map(str::trim).unwrap_or("").to_string();
            if let Some(num) = seq.attr("number").map(str::trim).filter(|n| !n.is_empty()) {
                match num.parse::<i64>() {
                    Ok(n) => book.seq_num = Some(n),
                    Err(_) => tracing::warn!("Unable to parse sequence number '{}', ignoring", num),
                }
            }
        }

        if let Some(date) = info.child("date") {
            let text = date.text_fragment();
            book.date = if text.is_empty() {
                date.attr("value").unwrap_or("").trim().to_string()
            } else {
                text
            };
        }

        let Some(annotation) = info.child("annotation") else {
            return Ok(());
        };
        book.annotation = annotation.text_fragment();

        if ctx.settings.config.annotation.create {
            let title = ctx.settings.config.annotation.title.clone();
            let mut body = Element::new("body");
            let anchors = {
                let mut t = TreeTransformer::new(ctx.transfer_env());
                let mut heading = Element::new("div").with_attr("class", "h0");
                heading.push_text(&title);
                body.push(heading);
                t.transfer(annotation, &mut body, "div", &["annotation"]);
                t.take_anchors()
            };
            for anchor in &anchors {
                ctx.book.register_target(anchor, ANNOTATION_PAGE);
            }
            ctx.book.files.push(GeneratedFile::page(
                "annotation",
                ANNOTATION_PAGE,
                FileRole::Annotation,
                xhtml_page(&title, body),
            ));
        }
        Ok(())
    }
}
