//! Minimal owned XML element tree used for both the FB2 source and generated XHTML.
//!
//! Parsing is event driven (quick-xml) with an explicit stack of open elements,
//! so document depth never turns into call-stack depth. Attribute names are kept
//! qualified (`l:href`), element names are stored by local name.

use std::fmt::Write as _;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader as XmlReader;

use crate::error::ParseError;
use crate::security::{self, SecurityLimits};

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

/// Elements written as `<x/>` when empty. Everything else always gets a closing tag,
/// some reading systems choke on `<div/>` or `<a/>`.
const VOID_ELEMENTS: &[&str] = &["br", "hr", "img", "meta", "link", "col", "content", "rootfile", "item", "itemref", "reference", "page"];

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(key, value);
        self
    }

    /// Look up an attribute by its local name, ignoring any namespace prefix.
    pub fn attr(&self, local: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == local || k.rsplit_once(':').map(|(_, l)| l == local).unwrap_or(false))
            .map(|(_, v)| v.as_str())
    }

    /// Set (or replace) an attribute with the exact qualified key.
    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.attrs.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.attrs.push((key, value)),
        }
    }

    pub fn push(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    /// Append text, merging with a trailing text node.
    pub fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(Node::Text(last)) = self.children.last_mut() {
            last.push_str(text);
        } else {
            self.children.push(Node::Text(text.to_string()));
        }
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.child_elements().find(|e| e.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.child_elements().filter(move |e| e.name == name)
    }

    /// Resolve a `/`-separated path of child names starting below `self`,
    /// returning every match in document order.
    pub fn find_all(&self, path: &str) -> Vec<&Element> {
        let mut current = vec![self];
        for step in path.split('/').filter(|s| !s.is_empty()) {
            current = current
                .into_iter()
                .flat_map(|e| e.child_elements().filter(move |c| c.name == step))
                .collect();
        }
        current
    }

    pub fn find(&self, path: &str) -> Option<&Element> {
        self.find_all(path).into_iter().next()
    }

    /// All descendant text concatenated, as-is.
    pub fn text(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }

    /// Descendant text with whitespace runs collapsed and trimmed.
    pub fn text_fragment(&self) -> String {
        collapse_whitespace(&self.text())
    }

    /// Visit every element of the subtree (including `self`) mutably, depth first.
    pub fn walk_mut<F: FnMut(&mut Element)>(&mut self, f: &mut F) {
        let mut stack: Vec<&mut Element> = vec![self];
        while let Some(el) = stack.pop() {
            f(el);
            for child in el.children.iter_mut().rev() {
                if let Node::Element(e) = child {
                    stack.push(e);
                }
            }
        }
    }

    /// Visit every element of the subtree immutably, depth first.
    pub fn walk<F: FnMut(&Element)>(&self, f: &mut F) {
        let mut stack: Vec<&Element> = vec![self];
        while let Some(el) = stack.pop() {
            f(el);
            for child in el.children.iter().rev() {
                if let Node::Element(e) = child {
                    stack.push(e);
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

fn collect_text(el: &Element, out: &mut String) {
    for child in &el.children {
        match child {
            Node::Text(t) => out.push_str(t),
            Node::Element(e) => collect_text(e, out),
        }
    }
}

pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse a complete XML document into its root element.
pub fn parse(source: &str, limits: &SecurityLimits) -> Result<Element, ParseError> {
    let mut reader = XmlReader::from_str(source);
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let position = reader.buffer_position();
        let event = reader.read_event().map_err(|e| ParseError::Xml {
            position,
            detail: e.to_string(),
        })?;
        match event {
            Event::Start(ref e) => {
                let el = element_from(e, position)?;
                stack.push(el);
                security::check_nesting_depth(stack.len() as u32, limits)?;
            }
            Event::Empty(ref e) => {
                security::check_nesting_depth(stack.len() as u32 + 1, limits)?;
                let el = element_from(e, position)?;
                attach(&mut stack, &mut root, el, position)?;
            }
            Event::End(_) => {
                let el = stack.pop().ok_or_else(|| ParseError::Xml {
                    position,
                    detail: "unexpected closing tag".into(),
                })?;
                attach(&mut stack, &mut root, el, position)?;
            }
            Event::Text(ref e) => {
                if let Some(top) = stack.last_mut() {
                    let text = e.unescape().map_err(|err| ParseError::Xml {
                        position,
                        detail: err.to_string(),
                    })?;
                    top.push_text(&text);
                }
            }
            Event::CData(e) => {
                if let Some(top) = stack.last_mut() {
                    let raw = e.into_inner();
                    top.push_text(&String::from_utf8_lossy(&raw));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(ParseError::Xml {
            position: reader.buffer_position(),
            detail: format!("unclosed element <{}>", stack[stack.len() - 1].name),
        });
    }
    root.ok_or(ParseError::Empty)
}

fn element_from(start: &BytesStart<'_>, position: u64) -> Result<Element, ParseError> {
    let mut el = Element::new(String::from_utf8_lossy(start.local_name().as_ref()).to_string());
    for attr in start.attributes() {
        let attr = attr.map_err(|e| ParseError::Xml {
            position,
            detail: e.to_string(),
        })?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        let value = attr.unescape_value().map_err(|e| ParseError::Xml {
            position,
            detail: e.to_string(),
        })?;
        el.attrs.push((key, value.to_string()));
    }
    Ok(el)
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    el: Element,
    position: u64,
) -> Result<(), ParseError> {
    match stack.last_mut() {
        Some(parent) => {
            parent.push(el);
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(el);
            Ok(())
        }
        None => Err(ParseError::Xml {
            position,
            detail: "multiple root elements".into(),
        }),
    }
}

/// Serialize an element subtree.
pub fn to_string(el: &Element) -> String {
    let mut out = String::new();
    write_element(el, &mut out);
    out
}

/// Serialize a generated XHTML page with declaration and doctype.
pub fn to_xhtml_document(root: &Element) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<!DOCTYPE html>\n");
    write_element(root, &mut out);
    out.push('\n');
    out
}

/// Serialize a generated XML document (OPF, NCX, page map) with declaration only.
pub fn to_xml_document(root: &Element) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    write_element(root, &mut out);
    out.push('\n');
    out
}

fn write_element(el: &Element, out: &mut String) {
    let _ = write!(out, "<{}", el.name);
    for (k, v) in &el.attrs {
        let _ = write!(out, " {}=\"{}\"", k, escape_attr(v));
    }
    if el.children.is_empty() && VOID_ELEMENTS.contains(&el.name.as_str()) {
        out.push_str("/>");
        return;
    }
    out.push('>');
    for child in &el.children {
        match child {
            Node::Text(t) => out.push_str(&escape_text(t)),
            Node::Element(e) => write_element(e, out),
        }
    }
    let _ = write!(out, "</{}>", el.name);
}

pub fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

pub fn escape_attr(s: &str) -> String {
    escape_text(s).replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse_str(s: &str) -> Element {
        parse(s, &SecurityLimits::default()).unwrap()
    }

    #[test]
    fn parses_nested_elements_and_text() {
        let root = parse_str(
            r#"<?xml version="1.0"?><FictionBook xmlns:l="http://www.w3.org/1999/xlink"><body><p>Hello &amp; <emphasis>bye</emphasis></p></body></FictionBook>"#,
        );
        assert_eq!(root.name, "FictionBook");
        let p = root.find("body/p").unwrap();
        assert_eq!(p.text(), "Hello & bye");
        assert_eq!(p.child("emphasis").unwrap().text(), "bye");
    }

    #[test]
    fn attribute_lookup_ignores_prefix() {
        let root = parse_str(r##"<image l:href="#cover"/>"##);
        assert_eq!(root.attr("href"), Some("#cover"));
        assert_eq!(root.attr("l:href"), Some("#cover"));
        assert_eq!(root.attr("id"), None);
    }

    #[test]
    fn find_all_keeps_document_order() {
        let root = parse_str(r#"<a><b id="1"/><c/><b id="2"/></a>"#);
        let ids: Vec<_> = root.find_all("b").iter().map(|e| e.attr("id").unwrap()).collect();
        assert_eq!(ids, vec!["1", "2"]);

        let root = parse_str(r#"<r><s><p n="1"/></s><x/><s><p n="2"/><p n="3"/></s></r>"#);
        let ns: Vec<_> = root.find_all("s/p").iter().map(|e| e.attr("n").unwrap()).collect();
        assert_eq!(ns, vec!["1", "2", "3"]);
    }

    #[test]
    fn malformed_documents_fail() {
        let limits = SecurityLimits::default();
        assert!(parse("<a><b></a>", &limits).is_err());
        assert!(parse("<a>", &limits).is_err());
        assert!(matches!(parse("", &limits), Err(ParseError::Empty)));
    }

    #[test]
    fn nesting_limit_is_enforced() {
        let limits = SecurityLimits {
            max_nesting_depth: 3,
            ..Default::default()
        };
        assert!(parse("<a><b><c/></b></a>", &limits).is_ok());
        assert!(parse("<a><b><c><d/></c></b></a>", &limits).is_err());
    }

    #[test]
    fn serializes_with_escaping() {
        let mut p = Element::new("p").with_attr("title", "a \"b\"");
        p.push_text("x < y");
        p.push(Element::new("br"));
        p.push(Element::new("span"));
        assert_eq!(
            to_string(&p),
            r#"<p title="a &quot;b&quot;">x &lt; y<br/><span></span></p>"#
        );
    }

    #[test]
    fn text_fragment_collapses_whitespace() {
        let root = parse_str("<t>\n  <p>Chapter\n one</p>  <p>  Start </p></t>");
        assert_eq!(root.text_fragment(), "Chapter one Start");
    }
}
