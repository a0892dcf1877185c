//! FB2 -> XHTML tree copier.
//!
//! The transformer owns an explicit stack of output frames. Each frame records
//! the output tag it writes into and whether it is inside a heading; traversal
//! functions receive the destination element by `&mut` and never reach for
//! shared state. Anchors and TOC marks met on the way are collected for the
//! caller to register once the document has a file name.

use crate::book::{toc_safe_title, Book};
use crate::config::NotesMode;
use crate::hyphenation::{hyphenate_text, Hyphenator};
use crate::xml::{Element, Node};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub tag: String,
    pub in_heading: bool,
}

/// A section title met during transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocMark {
    pub title: String,
    pub anchor: String,
    pub level: usize,
}

/// Read-only inputs a transfer needs.
pub struct TransferEnv<'a> {
    pub book: &'a Book,
    pub notes_mode: NotesMode,
    pub hyphenator: Option<&'a dyn Hyphenator>,
}

/// Frame tags in which images are emitted inline.
const INLINE_CONTEXTS: &[&str] = &["p", "span", "a", "em", "strong", "del", "sub", "sup", "code", "td", "th"];

/// Block elements after which queued block notes are emitted.
const NOTE_FLUSH_POINTS: &[&str] = &["p", "v", "subtitle", "text-author"];

pub struct TreeTransformer<'a> {
    env: TransferEnv<'a>,
    frames: Vec<Frame>,
    section_depth: usize,
    /// Ids of the open sections, innermost last.
    section_ids: Vec<Option<String>>,
    toc_counter: usize,
    anchors: Vec<String>,
    toc: Vec<TocMark>,
    pending_notes: Vec<Element>,
}

impl<'a> TreeTransformer<'a> {
    pub fn new(env: TransferEnv<'a>) -> Self {
        Self {
            env,
            frames: Vec::new(),
            section_depth: 0,
            section_ids: Vec::new(),
            toc_counter: 0,
            anchors: Vec::new(),
            toc: Vec::new(),
            pending_notes: Vec::new(),
        }
    }

    /// Continue generated `tocref` numbering from a previous transformer.
    pub fn starting_at(mut self, toc_counter: usize) -> Self {
        self.toc_counter = toc_counter;
        self
    }

    pub fn toc_counter(&self) -> usize {
        self.toc_counter
    }

    /// Open a frame writing into `tag`. The heading flag is inherited.
    pub fn push(&mut self, tag: &str) {
        let in_heading = self.in_heading();
        self.frames.push(Frame {
            tag: tag.to_string(),
            in_heading,
        });
    }

    pub fn pop(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    pub fn set_in_heading(&mut self, value: bool) {
        if let Some(top) = self.frames.last_mut() {
            top.in_heading = value;
        }
    }

    pub fn in_heading(&self) -> bool {
        self.frames.last().map(|f| f.in_heading).unwrap_or(false)
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Copy `src` into a new `<tag class="...">` appended to `dst`.
    pub fn transfer(&mut self, src: &Element, dst: &mut Element, tag: &str, classes: &[&str]) {
        let mut out = Element::new(tag);
        if !classes.is_empty() {
            out.set_attr("class", classes.join(" "));
        }
        self.keep_id(src, &mut out);
        self.push(tag);
        self.copy_children(src, &mut out);
        self.pop();
        dst.push(out);
        self.flush_pending_notes(dst);
    }

    /// Copy the children of `src` straight into `dst`.
    pub fn transfer_children(&mut self, src: &Element, dst: &mut Element) {
        self.transfer_nodes(&src.children, dst);
    }

    /// Copy a run of sibling nodes into `dst`.
    pub fn transfer_nodes(&mut self, nodes: &[Node], dst: &mut Element) {
        let tag = dst.name.clone();
        self.push(&tag);
        for node in nodes {
            match node {
                Node::Text(text) => self.copy_text(text, dst),
                Node::Element(el) => self.copy_element(el, dst),
            }
        }
        self.pop();
        self.flush_pending_notes(dst);
    }

    /// Anchors met since the last call.
    pub fn take_anchors(&mut self) -> Vec<String> {
        std::mem::take(&mut self.anchors)
    }

    /// TOC marks met since the last call.
    pub fn take_toc(&mut self) -> Vec<TocMark> {
        std::mem::take(&mut self.toc)
    }

    fn copy_children(&mut self, src: &Element, dst: &mut Element) {
        for node in &src.children {
            match node {
                Node::Text(text) => self.copy_text(text, dst),
                Node::Element(el) => self.copy_element(el, dst),
            }
        }
    }

    fn copy_text(&self, text: &str, dst: &mut Element) {
        match self.env.hyphenator {
            Some(h) if !self.in_heading() => dst.push_text(&hyphenate_text(text, &self.env.book.lang, h)),
            _ => dst.push_text(text),
        }
    }

    fn copy_element(&mut self, src: &Element, dst: &mut Element) {
        match src.name.as_str() {
            "section" => self.copy_section(src, dst),
            "title" => self.copy_title(src, dst),
            "p" if self.in_heading() => {
                if dst.child_elements().any(|e| e.name == "span") {
                    dst.push(Element::new("br"));
                }
                self.wrap(src, dst, "span", Some("title"));
            }
            "p" => self.wrap(src, dst, "p", None),
            "empty-line" if self.in_heading() => dst.push(Element::new("br")),
            "empty-line" => dst.push(Element::new("div").with_attr("class", "emptyline")),
            "subtitle" => self.wrap(src, dst, "p", Some("subtitle")),
            "epigraph" | "cite" | "poem" | "stanza" | "annotation" => {
                let class = src.name.clone();
                self.wrap(src, dst, "div", Some(&class))
            }
            "v" | "text-author" => {
                let class = src.name.clone();
                self.wrap(src, dst, "p", Some(&class))
            }
            "emphasis" => self.wrap(src, dst, "em", None),
            "strong" => self.wrap(src, dst, "strong", None),
            "strikethrough" => self.wrap(src, dst, "del", None),
            "sub" => self.wrap(src, dst, "sub", None),
            "sup" => self.wrap(src, dst, "sup", None),
            "code" => self.wrap(src, dst, "code", None),
            "style" => {
                let class = src.attr("name").unwrap_or("").to_string();
                let class = (!class.is_empty()).then_some(class);
                self.wrap(src, dst, "span", class.as_deref())
            }
            "table" | "tr" | "td" | "th" => self.copy_table_part(src, dst),
            "a" => self.copy_link(src, dst),
            "image" => self.copy_image(src, dst),
            _ => {
                if let Some(id) = non_empty_attr(src, "id") {
                    self.anchors.push(id.to_string());
                    dst.push(Element::new("a").with_attr("id", id));
                }
                self.copy_children(src, dst);
            }
        }

        if NOTE_FLUSH_POINTS.contains(&src.name.as_str()) && !self.in_heading() {
            self.flush_pending_notes(dst);
        }
    }

    /// Copy `src` into a new `tag` element, optionally classed.
    fn wrap(&mut self, src: &Element, dst: &mut Element, tag: &str, class: Option<&str>) {
        let mut out = Element::new(tag);
        if let Some(c) = class {
            out.set_attr("class", c);
        }
        self.keep_id(src, &mut out);
        self.push(tag);
        self.copy_children(src, &mut out);
        self.pop();
        dst.push(out);
    }

    fn copy_section(&mut self, src: &Element, dst: &mut Element) {
        let mut out = Element::new("div").with_attr("class", "section");
        self.keep_id(src, &mut out);
        self.section_depth += 1;
        self.section_ids.push(out.attr("id").map(str::to_string));
        self.push("div");
        self.copy_children(src, &mut out);
        self.pop();
        self.section_ids.pop();
        self.section_depth -= 1;
        dst.push(out);
    }

    fn copy_title(&mut self, src: &Element, dst: &mut Element) {
        let (tag, class) = match self.section_depth {
            0 => ("div".to_string(), "h0"),
            n => (format!("h{}", n.min(6)), "title"),
        };
        let mut out = Element::new(tag.as_str()).with_attr("class", class);
        self.keep_id(src, &mut out);

        if self.section_depth > 0 {
            let title = toc_safe_title(&src.text());
            if !title.is_empty() {
                let own = out.attr("id").map(str::to_string);
                let section = self.section_ids.last().cloned().flatten();
                let anchor = match own.or(section) {
                    Some(id) => id,
                    None => {
                        self.toc_counter += 1;
                        let id = format!("tocref{}", self.toc_counter);
                        out.set_attr("id", id.as_str());
                        self.anchors.push(id.clone());
                        id
                    }
                };
                self.toc.push(TocMark {
                    title,
                    anchor,
                    level: self.section_depth,
                });
            }
        }

        self.push(&tag);
        self.set_in_heading(true);
        self.copy_children(src, &mut out);
        self.pop();
        dst.push(out);
    }

    fn copy_table_part(&mut self, src: &Element, dst: &mut Element) {
        let mut out = Element::new(src.name.as_str());
        for key in ["align", "valign", "colspan", "rowspan", "style"] {
            if let Some(v) = non_empty_attr(src, key) {
                out.set_attr(key, v);
            }
        }
        self.keep_id(src, &mut out);
        self.push(&src.name);
        self.copy_children(src, &mut out);
        self.pop();
        dst.push(out);
    }

    fn copy_link(&mut self, src: &Element, dst: &mut Element) {
        let Some(href) = non_empty_attr(src, "href") else {
            self.copy_children(src, dst);
            return;
        };
        let note_id = href.strip_prefix('#').filter(|id| {
            src.attr("type") == Some("note") && self.env.book.notes.contains_key(*id)
        });
        let Some(note_id) = note_id else {
            let mut out = Element::new("a").with_attr("href", href);
            self.keep_id(src, &mut out);
            self.push("a");
            self.copy_children(src, &mut out);
            self.pop();
            dst.push(out);
            return;
        };

        let book = self.env.book;
        let label = book
            .note_number(note_id)
            .map(|n| n.to_string())
            .unwrap_or_else(|| src.text_fragment());

        match self.env.notes_mode {
            NotesMode::Default => {
                let mut out = Element::new("a").with_attr("href", href).with_attr("class", "anchor");
                self.keep_id(src, &mut out);
                self.push("a");
                self.copy_children(src, &mut out);
                self.pop();
                dst.push(out);
            }
            NotesMode::Float => {
                let mut out = Element::new("a")
                    .with_attr("href", href)
                    .with_attr("class", "anchor")
                    .with_attr("epub:type", "noteref");
                self.keep_id(src, &mut out);
                out.push_text(&label);
                dst.push(out);
            }
            NotesMode::Inline => {
                let mut out = Element::new("span").with_attr("class", "inlinenote");
                if let Some(note) = book.notes.get(note_id) {
                    out.push_text(&note.body);
                }
                dst.push(out);
            }
            NotesMode::Block => {
                let mut out = Element::new("a").with_attr("href", href).with_attr("class", "anchor");
                self.keep_id(src, &mut out);
                out.push_text(&label);
                dst.push(out);

                if let Some(note) = book.notes.get(note_id) {
                    let mut block = Element::new("div").with_attr("class", "blocknote");
                    let mut num = Element::new("span").with_attr("class", "notenum");
                    num.push_text(&format!("{}.", label));
                    block.push(num);
                    block.push_text(&format!(" {}", note.body));
                    self.pending_notes.push(block);
                }
            }
        }
    }

    fn copy_image(&mut self, src: &Element, dst: &mut Element) {
        let Some(id) = src.attr("href").and_then(|h| h.strip_prefix('#')) else {
            tracing::warn!("Image without local reference, skipping");
            return;
        };
        let book = self.env.book;
        let Some(image) = book.image(id) else {
            tracing::warn!("Unable to find image '{}', skipping", id);
            return;
        };

        let alt = non_empty_attr(src, "alt").unwrap_or(id);
        let mut img = Element::new("img").with_attr("src", image.href()).with_attr("alt", alt);

        let inline = self
            .frames
            .last()
            .map(|f| INLINE_CONTEXTS.contains(&f.tag.as_str()))
            .unwrap_or(false);
        if inline {
            self.keep_id(src, &mut img);
            dst.push(img);
        } else {
            let mut wrapper = Element::new("div").with_attr("class", "image");
            self.keep_id(src, &mut wrapper);
            wrapper.push(img);
            dst.push(wrapper);
        }
    }

    fn keep_id(&mut self, src: &Element, out: &mut Element) {
        if let Some(id) = non_empty_attr(src, "id") {
            out.set_attr("id", id);
            self.anchors.push(id.to_string());
        }
    }

    fn flush_pending_notes(&mut self, dst: &mut Element) {
        for note in self.pending_notes.drain(..) {
            dst.push(note);
        }
    }
}

fn non_empty_attr<'e>(el: &'e Element, name: &str) -> Option<&'e str> {
    el.attr(name).map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::{Note, NoteLink};
    use crate::security::SecurityLimits;
    use crate::xml;
    use pretty_assertions::assert_eq;

    fn parse(s: &str) -> Element {
        xml::parse(s, &SecurityLimits::default()).unwrap()
    }

    fn book_with_note() -> Book {
        let mut book = Book::new("t.fb2");
        book.notes.insert(
            "n1".into(),
            Note {
                title: "1".into(),
                body: "Footnote text".into(),
            },
        );
        book.notes_order.push(NoteLink {
            id: "n1".into(),
            body: "notes".into(),
        });
        book
    }

    fn render(book: &Book, mode: NotesMode, src: &str) -> (String, Vec<String>, Vec<TocMark>) {
        let env = TransferEnv {
            book,
            notes_mode: mode,
            hyphenator: None,
        };
        let mut t = TreeTransformer::new(env);
        let mut body = Element::new("body");
        t.transfer_children(&parse(src), &mut body);
        assert_eq!(t.depth(), 0);
        (xml::to_string(&body), t.take_anchors(), t.take_toc())
    }

    #[test]
    fn sections_and_titles() {
        let book = Book::new("t.fb2");
        let (out, anchors, toc) = render(
            &book,
            NotesMode::Default,
            r#"<body><section id="c1"><title><p>Chapter 1.</p></title><p>Text <emphasis>here</emphasis></p></section></body>"#,
        );
        assert_eq!(
            out,
            r#"<body><div class="section" id="c1"><h1 class="title"><span class="title">Chapter 1.</span></h1><p>Text <em>here</em></p></div></body>"#
        );
        assert_eq!(anchors, vec!["c1"]);
        assert_eq!(
            toc,
            vec![TocMark {
                title: "Chapter 1".into(),
                anchor: "c1".into(),
                level: 1
            }]
        );
    }

    #[test]
    fn heading_paragraphs_are_joined_with_breaks() {
        let book = Book::new("t.fb2");
        let (out, _, toc) = render(
            &book,
            NotesMode::Default,
            "<body><section><section><title><p>Part</p><empty-line/><p>Two</p></title></section></section></body>",
        );
        assert!(out.contains(r#"<h2 class="title" id="tocref1"><span class="title">Part</span><br/><br/><span class="title">Two</span></h2>"#));
        assert_eq!(toc[0].level, 2);
    }

    #[test]
    fn explicit_heading_frame_for_body_titles() {
        let book = Book::new("t.fb2");
        let env = TransferEnv {
            book: &book,
            notes_mode: NotesMode::Default,
            hyphenator: None,
        };
        let mut t = TreeTransformer::new(env);
        let title = parse("<title><p>Notes</p></title>");
        let mut holder = Element::new("div");
        t.push("div");
        t.set_in_heading(true);
        t.transfer(&title, &mut holder, "div", &["h0"]);
        t.set_in_heading(false);
        t.pop();
        assert_eq!(
            xml::to_string(&holder),
            r#"<div><div class="h0"><span class="title">Notes</span></div></div>"#
        );
    }

    #[test]
    fn note_reference_modes() {
        let book = book_with_note();
        let src = r##"<body><p>See<a l:href="#n1" type="note">[1]</a>.</p></body>"##;

        let (out, _, _) = render(&book, NotesMode::Default, src);
        assert!(out.contains(r##"<a href="#n1" class="anchor">[1]</a>"##));

        let (out, _, _) = render(&book, NotesMode::Float, src);
        assert!(out.contains(r##"<a href="#n1" class="anchor" epub:type="noteref">1</a>"##));

        let (out, _, _) = render(&book, NotesMode::Inline, src);
        assert!(out.contains(r#"<p>See<span class="inlinenote">Footnote text</span>.</p>"#));

        let (out, _, _) = render(&book, NotesMode::Block, src);
        assert!(out.ends_with(
            r#".</p><div class="blocknote"><span class="notenum">1.</span> Footnote text</div></body>"#
        ));
    }

    #[test]
    fn plain_links_are_kept() {
        let book = Book::new("t.fb2");
        let (out, _, _) = render(
            &book,
            NotesMode::Float,
            r##"<body><p><a l:href="http://x">x</a><a l:href="#unknown" type="note">y</a></p></body>"##,
        );
        assert!(out.contains(r#"<a href="http://x">x</a>"#));
        assert!(out.contains(r##"<a href="#unknown">y</a>"##));
    }

    #[test]
    fn images_inline_and_block() {
        let mut book = Book::new("t.fb2");
        book.images.push(crate::image::BinaryImage {
            id: "pic".into(),
            declared_type: "image/png".into(),
            kind: crate::image::ImageKind::Png,
            filename: "bin00000000.png".into(),
            index: 0,
            flags: crate::image::ProcessingFlags::NONE,
            scale_factor: 0.0,
            data: vec![1],
            bitmap: None,
            untouched: false,
        });
        let (out, _, _) = render(
            &book,
            NotesMode::Default,
            r##"<body><image l:href="#pic"/><p>a<image l:href="#pic"/></p><image l:href="#missing"/></body>"##,
        );
        assert_eq!(
            out,
            r#"<body><div class="image"><img src="images/bin00000000.png" alt="pic"/></div><p>a<img src="images/bin00000000.png" alt="pic"/></p></body>"#
        );
    }

    #[test]
    fn unknown_elements_are_unwrapped_but_ids_survive() {
        let book = Book::new("t.fb2");
        let (out, anchors, _) = render(&book, NotesMode::Default, r#"<body><custom id="x"><p>t</p></custom></body>"#);
        assert_eq!(out, r#"<body><a id="x"></a><p>t</p></body>"#);
        assert_eq!(anchors, vec!["x"]);
    }

    struct Halves;

    impl Hyphenator for Halves {
        fn hyphenate(&self, word: &str, _lang: &str) -> Vec<usize> {
            vec![word.chars().count() / 2]
        }
    }

    #[test]
    fn text_outside_headings_is_hyphenated() {
        let book = Book::new("t.fb2");
        let env = TransferEnv {
            book: &book,
            notes_mode: NotesMode::Default,
            hyphenator: Some(&Halves),
        };
        let mut t = TreeTransformer::new(env);
        let mut body = Element::new("body");
        t.transfer_children(
            &parse("<body><section><title><p>Heading</p></title><p>Paragraph</p></section></body>"),
            &mut body,
        );
        let out = xml::to_string(&body);
        assert!(out.contains("<span class=\"title\">Heading</span>"));
        assert!(out.contains("<p>Para\u{ad}graph</p>"));
    }
}
