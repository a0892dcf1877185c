//! Conversion configuration, read from `~/.config/fb2-converter/config.toml`.
//!
//! Enumerated options are kept as strings in the file format and resolved into
//! typed [`Settings`] once per job; unknown values fall back to a default with a
//! warning instead of failing the conversion.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::format::OutputFormat;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvertConfig {
    #[serde(default)]
    pub notes: NotesConfig,
    #[serde(default)]
    pub toc: TocConfig,
    #[serde(default)]
    pub cover: CoverConfig,
    #[serde(default)]
    pub page_map: PageMapConfig,
    #[serde(default)]
    pub images: ImagesConfig,
    #[serde(default)]
    pub annotation: AnnotationConfig,
    /// Insert soft hyphens into body text (needs a hyphenator).
    #[serde(default)]
    pub hyphenate: bool,
    /// Output file name template, e.g. `{author} - {title}`. Empty keeps the source name.
    #[serde(default)]
    pub file_name_format: String,
    #[serde(default = "default_author_format")]
    pub author_format: String,
    /// Custom stylesheet replacing the built-in one.
    pub stylesheet: Option<PathBuf>,
}

fn default_author_format() -> String {
    "{first} {middle} {last}".to_string()
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            notes: NotesConfig::default(),
            toc: TocConfig::default(),
            cover: CoverConfig::default(),
            page_map: PageMapConfig::default(),
            images: ImagesConfig::default(),
            annotation: AnnotationConfig::default(),
            hyphenate: false,
            file_name_format: String::new(),
            author_format: default_author_format(),
            stylesheet: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotesConfig {
    #[serde(default = "default_notes_mode")]
    pub mode: String,
    #[serde(default = "default_notes_bodies")]
    pub body_names: Vec<String>,
}

fn default_notes_mode() -> String {
    "default".to_string()
}
fn default_notes_bodies() -> Vec<String> {
    vec!["notes".to_string(), "comments".to_string()]
}

impl Default for NotesConfig {
    fn default() -> Self {
        Self {
            mode: default_notes_mode(),
            body_names: default_notes_bodies(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TocConfig {
    #[serde(default = "default_toc_type", rename = "type")]
    pub kind: String,
    #[serde(default = "default_toc_placement")]
    pub placement: String,
    #[serde(default = "default_toc_title")]
    pub title: String,
}

fn default_toc_type() -> String {
    "normal".to_string()
}
fn default_toc_placement() -> String {
    "before".to_string()
}
fn default_toc_title() -> String {
    "Contents".to_string()
}

impl Default for TocConfig {
    fn default() -> Self {
        Self {
            kind: default_toc_type(),
            placement: default_toc_placement(),
            title: default_toc_title(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverConfig {
    /// Supply a default cover when the book has none (always done for Kindle).
    #[serde(default)]
    pub default: bool,
    /// Image used as the default cover; a plain generated one otherwise.
    pub default_image: Option<PathBuf>,
    /// Stamp placement: `none`, `top`, `middle`, `bottom`. Empty means "not configured".
    #[serde(default)]
    pub placement: String,
    #[serde(default = "default_cover_resize")]
    pub resize: String,
    #[serde(default = "default_cover_width")]
    pub width: u32,
    #[serde(default = "default_cover_height")]
    pub height: u32,
}

fn default_cover_resize() -> String {
    "none".to_string()
}
fn default_cover_width() -> u32 {
    1264
}
fn default_cover_height() -> u32 {
    1680
}

impl Default for CoverConfig {
    fn default() -> Self {
        Self {
            default: false,
            default_image: None,
            placement: String::new(),
            resize: default_cover_resize(),
            width: default_cover_width(),
            height: default_cover_height(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageMapConfig {
    /// Kindle page map generation: `none`, `eink`, `app`.
    #[serde(default = "default_page_map_kindle")]
    pub kindle: String,
    /// Generate an Adobe page map for EPUB output.
    #[serde(default)]
    pub epub: bool,
    #[serde(default = "default_chars_per_page")]
    pub chars_per_page: usize,
}

fn default_page_map_kindle() -> String {
    "none".to_string()
}
fn default_chars_per_page() -> usize {
    2300
}

impl Default for PageMapConfig {
    fn default() -> Self {
        Self {
            kindle: default_page_map_kindle(),
            epub: false,
            chars_per_page: default_chars_per_page(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImagesConfig {
    #[serde(default)]
    pub remove_png_transparency: bool,
    /// Positive values rescale PNG and JPEG images by this factor.
    #[serde(default)]
    pub scale_factor: f64,
    /// Keep images that cannot be decoded instead of dropping them.
    #[serde(default)]
    pub use_broken: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationConfig {
    #[serde(default)]
    pub create: bool,
    #[serde(default = "default_annotation_title")]
    pub title: String,
}

fn default_annotation_title() -> String {
    "Annotation".to_string()
}

impl Default for AnnotationConfig {
    fn default() -> Self {
        Self {
            create: false,
            title: default_annotation_title(),
        }
    }
}

/// Load config from `path`, or from the default location when `None`.
/// A missing default file yields the default configuration; an explicit path must exist.
pub fn load_config(path: Option<&Path>) -> Result<ConvertConfig, ConfigError> {
    let (path, explicit) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => match config_path() {
            Some(p) => (p, false),
            None => return Ok(ConvertConfig::default()),
        },
    };

    let content = match std::fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) if !explicit && e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(ConvertConfig::default())
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.display().to_string(),
                source,
            })
        }
    };

    toml::from_str::<ConvertConfig>(&content).map_err(|e| ConfigError::Invalid {
        path: path.display().to_string(),
        detail: e.to_string(),
    })
}

/// Return the default config file path.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|mut p| {
        p.push("fb2-converter");
        p.push("config.toml");
        p
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotesMode {
    Default,
    Inline,
    Block,
    Float,
}

impl NotesMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "default" => Some(Self::Default),
            "inline" => Some(Self::Inline),
            "block" => Some(Self::Block),
            "float" => Some(Self::Float),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TocType {
    Normal,
    Flat,
    Kindle,
}

impl TocType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "normal" => Some(Self::Normal),
            "flat" => Some(Self::Flat),
            "kindle" => Some(Self::Kindle),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TocPlacement {
    None,
    Before,
    After,
}

impl TocPlacement {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "none" => Some(Self::None),
            "before" => Some(Self::Before),
            "after" => Some(Self::After),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageMapMode {
    None,
    Eink,
    App,
}

impl PageMapMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "none" => Some(Self::None),
            "eink" => Some(Self::Eink),
            "app" => Some(Self::App),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StampPlacement {
    None,
    Top,
    Middle,
    Bottom,
}

impl StampPlacement {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "none" => Some(Self::None),
            "top" => Some(Self::Top),
            "middle" => Some(Self::Middle),
            "bottom" => Some(Self::Bottom),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverResize {
    None,
    KeepAspect,
    Stretch,
}

impl CoverResize {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "none" => Some(Self::None),
            "keep_aspect" | "keepar" => Some(Self::KeepAspect),
            "stretch" => Some(Self::Stretch),
            _ => None,
        }
    }
}

/// Per-job snapshot of the configuration with enumerations resolved.
#[derive(Debug, Clone)]
pub struct Settings {
    pub format: OutputFormat,
    pub notes_mode: NotesMode,
    pub toc_type: TocType,
    pub toc_placement: TocPlacement,
    pub page_map: PageMapMode,
    /// `None` when no placement was configured.
    pub stamp: Option<StampPlacement>,
    pub cover_resize: CoverResize,
    pub config: ConvertConfig,
}

impl Settings {
    pub fn resolve(config: ConvertConfig, format: OutputFormat) -> Self {
        let notes_mode = NotesMode::parse(&config.notes.mode).unwrap_or_else(|| {
            tracing::warn!(mode = %config.notes.mode, "Unknown notes mode requested, switching to default");
            NotesMode::Default
        });
        let toc_type = TocType::parse(&config.toc.kind).unwrap_or_else(|| {
            tracing::warn!(kind = %config.toc.kind, "Unknown TOC type requested, switching to normal");
            TocType::Normal
        });
        let toc_placement = TocPlacement::parse(&config.toc.placement).unwrap_or_else(|| {
            tracing::warn!(placement = %config.toc.placement, "Unknown TOC page placement requested, turning off generation");
            TocPlacement::None
        });
        let page_map = if format.is_kindle() {
            PageMapMode::parse(&config.page_map.kindle).unwrap_or_else(|| {
                tracing::warn!(mode = %config.page_map.kindle, "Unknown page map generation option requested, turning off");
                PageMapMode::None
            })
        } else {
            PageMapMode::None
        };
        let stamp = if config.cover.placement.trim().is_empty() {
            None
        } else {
            let parsed = StampPlacement::parse(&config.cover.placement);
            if parsed.is_none() {
                tracing::warn!(placement = %config.cover.placement, "Unknown stamp placement requested, using default");
            }
            parsed
        };
        let cover_resize = CoverResize::parse(&config.cover.resize).unwrap_or_else(|| {
            tracing::warn!(resize = %config.cover.resize, "Unknown cover resize mode requested, not resizing");
            CoverResize::None
        });

        Self {
            format,
            notes_mode,
            toc_type,
            toc_placement,
            page_map,
            stamp,
            cover_resize,
            config,
        }
    }

    pub fn is_kindle(&self) -> bool {
        self.format.is_kindle()
    }

    pub fn is_notes_body(&self, name: &str) -> bool {
        self.config.notes.body_names.iter().any(|n| n == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_from_empty_toml() {
        let cfg: ConvertConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.notes.mode, "default");
        assert_eq!(cfg.notes.body_names, vec!["notes", "comments"]);
        assert_eq!(cfg.toc.placement, "before");
        assert_eq!(cfg.author_format, "{first} {middle} {last}");
        assert_eq!(cfg.page_map.chars_per_page, 2300);
    }

    #[test]
    fn default_matches_empty_file() {
        let parsed: ConvertConfig = toml::from_str("").unwrap();
        assert_eq!(ConvertConfig::default(), parsed);
    }

    #[test]
    fn default_survives_toml_round_trip() {
        let written = toml::to_string_pretty(&ConvertConfig::default()).unwrap();
        let parsed: ConvertConfig = toml::from_str(&written).unwrap();
        assert_eq!(parsed, ConvertConfig::default());
        assert_eq!(parsed.author_format, "{first} {middle} {last}");
    }

    #[test]
    fn partial_toml_overrides() {
        let cfg: ConvertConfig = toml::from_str(
            r#"
hyphenate = true
[toc]
type = "flat"
[images]
scale_factor = 0.5
"#,
        )
        .unwrap();
        assert!(cfg.hyphenate);
        assert_eq!(cfg.toc.kind, "flat");
        assert_eq!(cfg.toc.title, "Contents");
        assert_eq!(cfg.images.scale_factor, 0.5);
    }

    #[test]
    fn unknown_values_fall_back() {
        let mut cfg = ConvertConfig::default();
        cfg.notes.mode = "sideways".into();
        cfg.toc.kind = "weird".into();
        cfg.toc.placement = "middle".into();
        cfg.page_map.kindle = "paper".into();
        cfg.cover.placement = "left".into();
        let s = Settings::resolve(cfg, OutputFormat::Mobi);
        assert_eq!(s.notes_mode, NotesMode::Default);
        assert_eq!(s.toc_type, TocType::Normal);
        assert_eq!(s.toc_placement, TocPlacement::None);
        assert_eq!(s.page_map, PageMapMode::None);
        assert_eq!(s.stamp, None);
    }

    #[test]
    fn stamp_placement_unset_when_empty() {
        let s = Settings::resolve(ConvertConfig::default(), OutputFormat::Epub);
        assert_eq!(s.stamp, None);
        let mut cfg = ConvertConfig::default();
        cfg.cover.placement = "Bottom".into();
        let s = Settings::resolve(cfg, OutputFormat::Epub);
        assert_eq!(s.stamp, Some(StampPlacement::Bottom));
    }

    #[test]
    fn explicit_missing_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(load_config(Some(&missing)).is_err());
        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "hyphenate = \"maybe\"").unwrap();
        assert!(matches!(load_config(Some(&bad)), Err(ConfigError::Invalid { .. })));
    }
}
