use crate::book::{toc_safe_title, FileRole, GeneratedFile, TocEntry};
use crate::config::NotesMode;
use crate::error::ConvertError;
use crate::transformer::{TocMark, TreeTransformer};
use crate::xml::{Element, Node};

use super::{xhtml_page, Artifact, JobContext, Stage};

/// Renders every body into XHTML pages.
pub struct BodiesStage;

/// A rendered page with the anchors and TOC marks found in it.
struct Rendered {
    file: GeneratedFile,
    anchors: Vec<String>,
    toc: Vec<TocMark>,
    /// Entry pointing at the page itself, for notes bodies.
    page_entry: Option<String>,
}

impl Stage for BodiesStage {
    fn name(&self) -> &'static str {
        "bodies"
    }

    fn requires(&self) -> &'static [Artifact] {
        &[Artifact::Notes, Artifact::Images, Artifact::Metadata]
    }

    fn provides(&self) -> &'static [Artifact] {
        &[Artifact::Documents]
    }

    fn run(&self, ctx: &mut JobContext) -> Result<(), ConvertError> {
        let mut rendered: Vec<Rendered> = Vec::new();
        let mut counter = 0usize;
        let mode = ctx.settings.notes_mode;

        {
            let book = &ctx.book;
            let mut t = TreeTransformer::new(ctx.transfer_env());
            for body in ctx.source.children_named("body") {
                let name = body.attr("name").unwrap_or("");
                if !name.is_empty() && ctx.settings.is_notes_body(name) {
                    let page = match mode {
                        NotesMode::Inline | NotesMode::Block => continue,
                        NotesMode::Default => notes_page(&mut t, body, name, book, counter),
                        NotesMode::Float => float_notes_page(&mut t, body, name, book, counter),
                    };
                    counter += 1;
                    rendered.push(page);
                    continue;
                }

                let nodes = &body.children;
                let first_section = nodes
                    .iter()
                    .position(|n| matches!(n, Node::Element(e) if e.name == "section"))
                    .unwrap_or(nodes.len());

                let lead = &nodes[..first_section];
                if lead.iter().any(has_content) {
                    rendered.push(text_page(&mut t, lead, &book.title, counter));
                    counter += 1;
                }
                for node in &nodes[first_section..] {
                    let Node::Element(el) = node else { continue };
                    if el.name != "section" {
                        tracing::debug!("Skipping <{}> between sections", el.name);
                        continue;
                    }
                    let title = el
                        .child("title")
                        .map(|t| toc_safe_title(&t.text()))
                        .filter(|t| !t.is_empty())
                        .unwrap_or_else(|| book.title.clone());
                    rendered.push(text_page(&mut t, std::slice::from_ref(node), &title, counter));
                    counter += 1;
                }
            }
        }

        let book = &mut ctx.book;
        for page in rendered {
            let file = page.file.name.clone();
            for anchor in &page.anchors {
                book.register_target(anchor, &file);
            }
            if let Some(title) = page.page_entry {
                book.toc.push(TocEntry {
                    title,
                    href: file.clone(),
                    level: 1,
                });
            }
            for mark in page.toc {
                book.toc.push(TocEntry {
                    title: mark.title,
                    href: format!("{}#{}", file, mark.anchor),
                    level: mark.level,
                });
            }
            book.files.push(page.file);
        }
        tracing::debug!("Bodies: {} pages, {} TOC entries", counter, book.toc.len());
        Ok(())
    }
}

fn page_name(counter: usize) -> (String, String) {
    (format!("index{:05}", counter), format!("index{:05}.xhtml", counter))
}

fn has_content(node: &Node) -> bool {
    match node {
        Node::Text(t) => !t.trim().is_empty(),
        Node::Element(_) => true,
    }
}

fn text_page(t: &mut TreeTransformer<'_>, nodes: &[Node], title: &str, counter: usize) -> Rendered {
    let (id, name) = page_name(counter);
    let mut body = Element::new("body");
    t.transfer_nodes(nodes, &mut body);
    Rendered {
        file: GeneratedFile::page(id, name, FileRole::Text, xhtml_page(title, body)),
        anchors: t.take_anchors(),
        toc: t.take_toc(),
        page_entry: None,
    }
}

/// Notes body as a regular page: its title, then every section.
fn notes_page(
    t: &mut TreeTransformer<'_>,
    src: &Element,
    name: &str,
    book: &crate::book::Book,
    counter: usize,
) -> Rendered {
    let (id, file) = page_name(counter);
    let mut body = Element::new("body");
    let title = book.note_body_titles.get(name);
    if let Some(title) = title {
        body.push(title.fragment.clone());
    }
    let sections: Vec<Node> = src
        .children
        .iter()
        .filter(|n| matches!(n, Node::Element(e) if e.name == "section"))
        .cloned()
        .collect();
    t.transfer_nodes(&sections, &mut body);
    // Note titles are not chapters.
    let _ = t.take_toc();

    let page_title = title.map(|t| t.title.clone()).unwrap_or_else(|| name.to_string());
    Rendered {
        file: GeneratedFile::page(id, file, FileRole::Notes, xhtml_page(&page_title, body)),
        anchors: t.take_anchors(),
        toc: Vec::new(),
        page_entry: Some(page_title),
    }
}

/// Notes body as footnote asides, one per note.
fn float_notes_page(
    t: &mut TreeTransformer<'_>,
    src: &Element,
    name: &str,
    book: &crate::book::Book,
    counter: usize,
) -> Rendered {
    let (id, file) = page_name(counter);
    let mut body = Element::new("body");
    let title = book.note_body_titles.get(name);
    if let Some(title) = title {
        body.push(title.fragment.clone());
    }

    let mut anchors = Vec::new();
    for section in src.children_named("section") {
        let Some(note_id) = section.attr("id").map(str::trim).filter(|i| !i.is_empty()) else {
            continue;
        };
        let mut aside = Element::new("aside")
            .with_attr("id", note_id)
            .with_attr("epub:type", "footnote")
            .with_attr("class", "footnote");
        if let Some(num) = book.note_number(note_id) {
            let mut label = Element::new("p").with_attr("class", "notenum");
            label.push_text(&num.to_string());
            aside.push(label);
        }
        let content: Vec<Node> = section
            .children
            .iter()
            .filter(|n| !matches!(n, Node::Element(e) if e.name == "title"))
            .cloned()
            .collect();
        t.transfer_nodes(&content, &mut aside);
        anchors.push(note_id.to_string());
        body.push(aside);
    }
    let _ = t.take_toc();
    anchors.extend(t.take_anchors());

    let page_title = title.map(|t| t.title.clone()).unwrap_or_else(|| name.to_string());
    Rendered {
        file: GeneratedFile::page(id, file, FileRole::Notes, xhtml_page(&page_title, body)),
        anchors,
        toc: Vec::new(),
        page_entry: Some(page_title),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConvertConfig;
    use crate::format::OutputFormat;
    use crate::pipeline::testing::{context, run_stages, NS};
    use crate::pipeline::{BinariesStage, DescriptionStage, NotesStage};
    use crate::xml;

    fn book_source() -> String {
        format!(
            r##"<FictionBook {NS}>
<description><title-info><book-title>Tales</book-title><lang>en</lang></title-info></description>
<body>
  <title><p>Tales</p></title>
  <epigraph><p>Quote</p></epigraph>
  <section id="ch1"><title><p>One</p></title><p>See<a l:href="#n1" type="note">1</a></p>
    <section><title><p>One.A</p></title><p>deeper</p></section>
  </section>
  <section><title><p>Two</p></title><p>text</p></section>
</body>
<body name="notes"><title><p>Notes</p></title><section id="n1"><title><p>1</p></title><p>Note one</p></section></body>
</FictionBook>"##
        )
    }

    fn rendered(mode: &str) -> crate::pipeline::JobContext {
        let mut config = ConvertConfig::default();
        config.notes.mode = mode.to_string();
        let mut ctx = context(&book_source(), OutputFormat::Epub, config);
        run_stages(&mut ctx, &[&NotesStage, &BinariesStage, &DescriptionStage, &BodiesStage]);
        ctx
    }

    #[test]
    fn bodies_split_into_pages() {
        let ctx = rendered("default");
        let names: Vec<_> = ctx.book.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["index00000.xhtml", "index00001.xhtml", "index00002.xhtml", "index00003.xhtml"]
        );
        assert_eq!(ctx.book.files[3].role, FileRole::Notes);

        let lead = xml::to_string(ctx.book.files[0].markup().unwrap());
        assert!(lead.contains(r#"<div class="h0"><span class="title">Tales</span></div>"#));
        assert!(lead.contains(r#"<div class="epigraph"><p>Quote</p></div>"#));

        assert_eq!(ctx.book.link_targets["ch1"], "index00001.xhtml");
        assert_eq!(ctx.book.link_targets["n1"], "index00003.xhtml");
    }

    #[test]
    fn toc_entries_carry_levels_and_hrefs() {
        let ctx = rendered("default");
        let toc: Vec<_> = ctx
            .book
            .toc
            .iter()
            .map(|e| (e.title.as_str(), e.href.as_str(), e.level))
            .collect();
        assert_eq!(
            toc,
            vec![
                ("One", "index00001.xhtml#ch1", 1),
                ("One.A", "index00001.xhtml#tocref1", 2),
                ("Two", "index00002.xhtml#tocref2", 1),
                ("Notes", "index00003.xhtml", 1),
            ]
        );
    }

    #[test]
    fn float_mode_renders_asides() {
        let ctx = rendered("float");
        let notes = xml::to_string(ctx.book.files[3].markup().unwrap());
        assert!(notes.contains(r#"<aside id="n1" epub:type="footnote" class="footnote"><p class="notenum">1</p><p>Note one</p></aside>"#));
        let chapter = xml::to_string(ctx.book.files[1].markup().unwrap());
        assert!(chapter.contains(r##"epub:type="noteref">1</a>"##));
        assert_eq!(ctx.book.link_targets["n1"], "index00003.xhtml");
    }

    #[test]
    fn inline_mode_skips_notes_body() {
        let ctx = rendered("inline");
        assert_eq!(ctx.book.files.len(), 3);
        assert!(ctx.book.files.iter().all(|f| f.role == FileRole::Text));
        let chapter = xml::to_string(ctx.book.files[1].markup().unwrap());
        assert!(chapter.contains(r#"<span class="inlinenote">Note one</span>"#));
    }
}
