use crate::book::{toc_safe_title, Note, NoteBodyTitle, NoteLink};
use crate::error::ConvertError;
use crate::transformer::TreeTransformer;
use crate::xml::{collapse_whitespace, Element, Node};

use super::{Artifact, JobContext, Stage};

/// Collects notes from the configured notes bodies.
pub struct NotesStage;

impl Stage for NotesStage {
    fn name(&self) -> &'static str {
        "notes"
    }

    fn provides(&self) -> &'static [Artifact] {
        &[Artifact::Notes]
    }

    fn run(&self, ctx: &mut JobContext) -> Result<(), ConvertError> {
        let mut titles: Vec<(String, NoteBodyTitle)> = Vec::new();
        let mut notes: Vec<(NoteLink, Note)> = Vec::new();

        {
            let mut t = TreeTransformer::new(ctx.transfer_env());
            for body in ctx.source.children_named("body") {
                let Some(name) = body.attr("name").filter(|n| ctx.settings.is_notes_body(n)) else {
                    continue;
                };
                for child in body.child_elements() {
                    match child.name.as_str() {
                        "title" => {
                            let title = toc_safe_title(&child.text());
                            if title.is_empty() {
                                continue;
                            }
                            let mut holder = Element::new("div");
                            t.push("div");
                            t.set_in_heading(true);
                            t.transfer(child, &mut holder, "div", &["h0"]);
                            t.set_in_heading(false);
                            t.pop();
                            if let Some(Node::Element(fragment)) = holder.children.pop() {
                                titles.push((name.to_string(), NoteBodyTitle { title, fragment }));
                            }
                        }
                        "section" => {
                            let Some(id) = child.attr("id").map(str::trim).filter(|id| !id.is_empty()) else {
                                continue;
                            };
                            let title = child
                                .child("title")
                                .map(|t| toc_safe_title(&t.text()))
                                .unwrap_or_default();
                            notes.push((
                                NoteLink {
                                    id: id.to_string(),
                                    body: name.to_string(),
                                },
                                Note {
                                    title,
                                    body: flatten_note(child),
                                },
                            ));
                        }
                        _ => {}
                    }
                }
            }
        }

        let book = &mut ctx.book;
        for (name, title) in titles {
            book.note_body_titles.insert(name, title);
        }
        for (link, note) in notes {
            book.notes.insert(link.id.clone(), note);
            book.notes_order.push(link);
        }
        tracing::debug!("Notes: {} registered", book.notes_order.len());
        Ok(())
    }
}

/// Everything but the title, whitespace collapsed, pieces joined with a space.
fn flatten_note(section: &Element) -> String {
    section
        .children
        .iter()
        .filter_map(|node| match node {
            Node::Text(t) => Some(collapse_whitespace(t)),
            Node::Element(e) if e.name == "title" => None,
            Node::Element(e) => Some(e.text_fragment()),
        })
        .filter(|piece| !piece.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConvertConfig;
    use crate::format::OutputFormat;
    use crate::pipeline::testing::{context, NS};
    use pretty_assertions::assert_eq;

    #[test]
    fn note_with_text_body() {
        let fb2 = format!(
            r#"<FictionBook {NS}><body><section><p>main</p></section></body><body name="notes"><section id="n1"><title>Note</title>Text here</section></body></FictionBook>"#
        );
        let mut ctx = context(&fb2, OutputFormat::Epub, ConvertConfig::default());
        NotesStage.run(&mut ctx).unwrap();
        assert_eq!(
            ctx.book.notes["n1"],
            Note {
                title: "Note".into(),
                body: "Text here".into()
            }
        );
        assert_eq!(
            ctx.book.notes_order,
            vec![NoteLink {
                id: "n1".into(),
                body: "notes".into()
            }]
        );
    }

    #[test]
    fn body_title_and_paragraph_notes() {
        let fb2 = format!(
            r#"<FictionBook {NS}><body name="comments"><title><p>Comments</p></title>
<section id="c1"><title><p>1.</p></title><p>First   line</p><p>second</p></section>
<section><p>no id</p></section>
<section id="c2"><p>Other</p></section>
<section id="c1"><p>Replaced</p></section>
</body></FictionBook>"#
        );
        let mut ctx = context(&fb2, OutputFormat::Epub, ConvertConfig::default());
        NotesStage.run(&mut ctx).unwrap();

        let title = &ctx.book.note_body_titles["comments"];
        assert_eq!(title.title, "Comments");
        assert_eq!(
            crate::xml::to_string(&title.fragment),
            r#"<div class="h0"><span class="title">Comments</span></div>"#
        );

        assert_eq!(ctx.book.notes.len(), 2);
        assert_eq!(ctx.book.notes["c1"].body, "Replaced");
        assert_eq!(ctx.book.notes["c2"].title, "");
        let ids: Vec<_> = ctx.book.notes_order.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2", "c1"]);
    }

    #[test]
    fn bodies_outside_allow_list_are_ignored() {
        let fb2 = format!(r#"<FictionBook {NS}><body name="extras"><section id="x"><p>t</p></section></body></FictionBook>"#);
        let mut ctx = context(&fb2, OutputFormat::Epub, ConvertConfig::default());
        NotesStage.run(&mut ctx).unwrap();
        assert!(ctx.book.notes.is_empty());
        assert!(ctx.book.notes_order.is_empty());
    }

    #[test]
    fn flatten_collapses_whitespace() {
        let section = crate::xml::parse(
            "<section id=\"a\"><title>T</title>\n  lead <p>one\n two</p><p/> tail </section>",
            &Default::default(),
        )
        .unwrap();
        assert_eq!(flatten_note(&section), "lead one two tail");
    }
}
