use std::collections::HashMap;

use uuid::Uuid;

use crate::image::BinaryImage;
use crate::xml::Element;

/// Namespace for ids derived from non-UUID `document-info/id` values.
pub const BOOK_ID_NAMESPACE: Uuid = Uuid::from_u128(0x09aa0c17_ca72_42d3_afef_75911e5d7646);

/// The book being converted. One per job, mutated in place by every stage.
#[derive(Debug, Clone)]
pub struct Book {
    pub id: Uuid,
    pub title: String,
    pub lang: String,
    /// Id of the cover image, at most one.
    pub cover: Option<String>,
    pub genres: Vec<String>,
    pub authors: Vec<String>,
    pub seq_name: String,
    pub seq_num: Option<i64>,
    pub annotation: String,
    pub date: String,

    pub notes: HashMap<String, Note>,
    pub note_body_titles: HashMap<String, NoteBodyTitle>,
    /// First-seen order of notes, drives footnote numbering.
    pub notes_order: Vec<NoteLink>,

    /// Ingestion order. Filenames and cover resolution depend on it.
    pub images: Vec<BinaryImage>,
    pub files: Vec<GeneratedFile>,
    /// Fragment id -> file name that contains it.
    pub link_targets: HashMap<String, String>,
    pub toc: Vec<TocEntry>,
    pub source_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteLink {
    pub id: String,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct NoteBodyTitle {
    /// TOC-safe title text.
    pub title: String,
    /// Rendered `div.h0` fragment.
    pub fragment: Element,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocEntry {
    pub title: String,
    pub href: String,
    /// 1 for top level sections.
    pub level: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileRole {
    Cover,
    Toc,
    Annotation,
    Text,
    Notes,
    Support,
}

#[derive(Debug, Clone)]
pub enum FileContent {
    Markup(Element),
    Text(String),
    Bytes(Vec<u8>),
}

/// A document produced by the pipeline, staged under the working root at flush time.
#[derive(Debug, Clone)]
pub struct GeneratedFile {
    pub id: String,
    pub name: String,
    /// Directory relative to the working root, e.g. `OEBPS`.
    pub rel_dir: String,
    pub media_type: String,
    pub role: FileRole,
    pub in_spine: bool,
    pub content: FileContent,
}

impl GeneratedFile {
    /// An XHTML page under `OEBPS/`, listed in the spine.
    pub fn page(id: impl Into<String>, name: impl Into<String>, role: FileRole, root: Element) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            rel_dir: "OEBPS".to_string(),
            media_type: "application/xhtml+xml".to_string(),
            role,
            in_spine: true,
            content: FileContent::Markup(root),
        }
    }

    /// A non-spine support file (CSS, NCX, OPF, fonts).
    pub fn support(
        id: impl Into<String>,
        rel_dir: impl Into<String>,
        name: impl Into<String>,
        media_type: impl Into<String>,
        content: FileContent,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            rel_dir: rel_dir.into(),
            media_type: media_type.into(),
            role: FileRole::Support,
            in_spine: false,
            content,
        }
    }

    /// Path relative to the working root.
    pub fn rel_path(&self) -> String {
        if self.rel_dir.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.rel_dir, self.name)
        }
    }

    /// Path relative to `OEBPS/`, as used by manifest hrefs.
    pub fn href(&self) -> String {
        match self.rel_dir.strip_prefix("OEBPS") {
            Some("") => self.name.clone(),
            Some(rest) => format!("{}/{}", rest.trim_start_matches('/'), self.name),
            None => self.rel_path(),
        }
    }

    pub fn markup(&self) -> Option<&Element> {
        match &self.content {
            FileContent::Markup(root) => Some(root),
            _ => None,
        }
    }

    pub fn markup_mut(&mut self) -> Option<&mut Element> {
        match &mut self.content {
            FileContent::Markup(root) => Some(root),
            _ => None,
        }
    }
}

impl Book {
    /// Fresh book with a random placeholder id.
    pub fn new(source_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: String::new(),
            lang: crate::language::DEFAULT_LANGUAGE.to_string(),
            cover: None,
            genres: Vec::new(),
            authors: Vec::new(),
            seq_name: String::new(),
            seq_num: None,
            annotation: String::new(),
            date: String::new(),
            notes: HashMap::new(),
            note_body_titles: HashMap::new(),
            notes_order: Vec::new(),
            images: Vec::new(),
            files: Vec::new(),
            link_targets: HashMap::new(),
            toc: Vec::new(),
            source_name: source_name.into(),
        }
    }

    pub fn image(&self, id: &str) -> Option<&BinaryImage> {
        self.images.iter().find(|img| img.id == id)
    }

    pub fn file(&self, name: &str) -> Option<&GeneratedFile> {
        self.files.iter().find(|f| f.name == name)
    }

    /// Register an anchor; the first file to claim a fragment keeps it.
    pub fn register_target(&mut self, fragment: &str, file: &str) {
        if fragment.is_empty() {
            return;
        }
        self.link_targets
            .entry(fragment.to_string())
            .or_insert_with(|| file.to_string());
    }

    /// 1-based footnote number of `id` within its notes body.
    pub fn note_number(&self, id: &str) -> Option<usize> {
        let link = self.notes_order.iter().find(|l| l.id == id)?;
        self.notes_order
            .iter()
            .filter(|l| l.body == link.body)
            .position(|l| l.id == id)
            .map(|p| p + 1)
    }
}

/// Two-path book id rule: a valid UUID is used as is, anything else is hashed
/// into a v5 UUID so the same raw id always maps to the same book id.
pub fn derive_book_id(raw: &str) -> Uuid {
    Uuid::parse_str(raw.trim()).unwrap_or_else(|_| Uuid::new_v5(&BOOK_ID_NAMESPACE, raw.as_bytes()))
}

/// Title text safe for TOC and note labels: whitespace collapsed, trailing
/// `.`, `,`, `;`, `:` removed.
pub fn toc_safe_title(raw: &str) -> String {
    let collapsed = crate::xml::collapse_whitespace(raw);
    collapsed
        .trim_end_matches(['.', ',', ';', ':'])
        .trim_end()
        .to_string()
}
