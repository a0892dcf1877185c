//! Ordered conversion stages with declared requirements.
//!
//! Each stage names the artifacts it needs and the ones it produces;
//! [`Pipeline::new`] rejects an order in which a stage would run before its
//! inputs exist.

mod binaries;
mod bodies;
mod cover;
mod description;
mod images;
mod links;
mod meta;
mod ncx;
mod notes;
mod opf;
mod pagemap;
mod stylesheet;
mod toc;

pub use binaries::BinariesStage;
pub use bodies::BodiesStage;
pub use cover::CoverStage;
pub use description::DescriptionStage;
pub use images::ImagesStage;
pub use links::{resolve_links, LinksStage};
pub use meta::{MetaStage, EPUB_MIMETYPE, MIMETYPE_NAME};
pub use ncx::NcxStage;
pub use notes::NotesStage;
pub use opf::{OpfStage, OPF_NAME};
pub use pagemap::PageMapStage;
pub use stylesheet::StylesheetStage;
pub use toc::TocStage;

use std::collections::HashSet;
use std::fmt;
use std::time::Instant;

use crate::book::Book;
use crate::config::Settings;
use crate::error::ConvertError;
use crate::hyphenation::Hyphenator;
use crate::progress::{report_stage, ProgressHandler};
use crate::security::SecurityLimits;
use crate::transformer::TransferEnv;
use crate::xml::Element;

/// Something a stage leaves behind for later stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Artifact {
    Notes,
    Images,
    Metadata,
    Annotation,
    Documents,
    ResolvedLinks,
    CoverResolved,
    TocPage,
    CoverPage,
    Navigation,
    Stylesheet,
    PageMap,
    Manifest,
    ContainerMeta,
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Everything one conversion job works on.
pub struct JobContext {
    /// Parsed `FictionBook` root.
    pub source: Element,
    pub book: Book,
    pub settings: Settings,
    pub hyphenator: Option<Box<dyn Hyphenator>>,
    pub limits: SecurityLimits,
}

impl JobContext {
    pub fn new(source: Element, book: Book, settings: Settings) -> Self {
        Self {
            source,
            book,
            settings,
            hyphenator: None,
            limits: SecurityLimits::default(),
        }
    }

    /// Borrow the pieces a tree transfer reads.
    pub fn transfer_env(&self) -> TransferEnv<'_> {
        TransferEnv {
            book: &self.book,
            notes_mode: self.settings.notes_mode,
            hyphenator: if self.settings.config.hyphenate {
                self.hyphenator.as_deref()
            } else {
                None
            },
        }
    }
}

/// One ordered step of the conversion.
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    fn requires(&self) -> &'static [Artifact] {
        &[]
    }

    fn provides(&self) -> &'static [Artifact];

    fn run(&self, ctx: &mut JobContext) -> Result<(), ConvertError>;
}

pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    /// Build a pipeline, checking every requirement is provided by an earlier stage.
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Result<Self, ConvertError> {
        let mut available: HashSet<Artifact> = HashSet::new();
        for stage in &stages {
            if let Some(missing) = stage.requires().iter().find(|a| !available.contains(a)) {
                return Err(ConvertError::StageOrder {
                    stage: stage.name().to_string(),
                    missing: missing.to_string(),
                });
            }
            available.extend(stage.provides().iter().copied());
        }
        Ok(Self { stages })
    }

    /// The fixed FB2 conversion sequence.
    pub fn standard() -> Result<Self, ConvertError> {
        Self::new(vec![
            Box::new(NotesStage),
            Box::new(BinariesStage),
            Box::new(DescriptionStage),
            Box::new(BodiesStage),
            Box::new(LinksStage),
            Box::new(ImagesStage),
            Box::new(TocStage),
            Box::new(CoverStage),
            Box::new(NcxStage),
            Box::new(StylesheetStage),
            Box::new(PageMapStage),
            Box::new(OpfStage),
            Box::new(MetaStage),
        ])
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run every stage in order; the first failure stops the run.
    pub fn run(&self, ctx: &mut JobContext, progress: Option<&dyn ProgressHandler>) -> Result<(), ConvertError> {
        let total = self.stages.len();
        for (i, stage) in self.stages.iter().enumerate() {
            tracing::debug!("Stage {} started", stage.name());
            let start = Instant::now();
            stage.run(ctx)?;
            tracing::debug!("Stage {} done in {:?}", stage.name(), start.elapsed());
            report_stage(progress, stage.name(), i + 1, total);
        }
        Ok(())
    }
}

/// Skeleton XHTML page: `html/head(title, stylesheet)/body`.
pub fn xhtml_page(title: &str, body: Element) -> Element {
    let mut html = Element::new("html")
        .with_attr("xmlns", "http://www.w3.org/1999/xhtml")
        .with_attr("xmlns:epub", "http://www.idpf.org/2007/ops");
    let mut head = Element::new("head");
    head.push(
        Element::new("meta")
            .with_attr("http-equiv", "Content-Type")
            .with_attr("content", "text/html; charset=utf-8"),
    );
    let mut t = Element::new("title");
    t.push_text(title);
    head.push(t);
    head.push(
        Element::new("link")
            .with_attr("rel", "stylesheet")
            .with_attr("type", "text/css")
            .with_attr("href", stylesheet::STYLESHEET_NAME),
    );
    html.push(head);
    html.push(body);
    html
}

/// Body element of a generated page.
pub fn page_body_mut(page: &mut Element) -> Option<&mut Element> {
    page.children.iter_mut().find_map(|n| match n {
        crate::xml::Node::Element(e) if e.name == "body" => Some(e),
        _ => None,
    })
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_order_is_valid() {
        let p = Pipeline::standard().unwrap();
        assert_eq!(
            p.stage_names(),
            vec![
                "notes",
                "binaries",
                "description",
                "bodies",
                "links",
                "images",
                "toc",
                "cover",
                "ncx",
                "stylesheet",
                "pagemap",
                "opf",
                "meta"
            ]
        );
    }

    #[test]
    fn misordered_stages_are_rejected() {
        let err = Pipeline::new(vec![Box::new(BodiesStage), Box::new(NotesStage)])
            .err()
            .unwrap();
        match err {
            ConvertError::StageOrder { stage, missing } => {
                assert_eq!(stage, "bodies");
                assert_eq!(missing, "Notes");
            }
            other => panic!("unexpected error {other}"),
        }

        let links_first = Pipeline::new(vec![
            Box::new(NotesStage),
            Box::new(BinariesStage),
            Box::new(DescriptionStage),
            Box::new(LinksStage),
        ]);
        assert!(links_first.is_err());
    }

    #[test]
    fn page_skeleton_has_body() {
        let mut page = xhtml_page("T", Element::new("body"));
        assert!(page_body_mut(&mut page).is_some());
        let s = crate::xml::to_string(&page);
        assert!(s.contains("<title>T</title>"));
        assert!(s.contains(r#"href="stylesheet.css""#));
    }
}
