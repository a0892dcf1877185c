//! Output container formats.

use serde::{Deserialize, Serialize};

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Epub,
    Mobi,
    Azw3,
}

impl OutputFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Epub => "application/epub+zip",
            OutputFormat::Mobi | OutputFormat::Azw3 => "application/x-mobipocket-ebook",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Epub => "epub",
            OutputFormat::Mobi => "mobi",
            OutputFormat::Azw3 => "azw3",
        }
    }

    /// Kindle targets get device specific image handling and always carry a cover.
    pub fn is_kindle(&self) -> bool {
        matches!(self, OutputFormat::Mobi | OutputFormat::Azw3)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "epub" => Some(OutputFormat::Epub),
            "mobi" => Some(OutputFormat::Mobi),
            "azw3" | "kf8" => Some(OutputFormat::Azw3),
            _ => None,
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.extension().to_uppercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_format() {
        assert_eq!(OutputFormat::parse("EPUB"), Some(OutputFormat::Epub));
        assert_eq!(OutputFormat::parse("mobi"), Some(OutputFormat::Mobi));
        assert_eq!(OutputFormat::parse("kf8"), Some(OutputFormat::Azw3));
        assert_eq!(OutputFormat::parse("pdf"), None);
    }

    #[test]
    fn test_format_display_and_kindle() {
        assert_eq!(format!("{}", OutputFormat::Azw3), "AZW3");
        assert!(OutputFormat::Mobi.is_kindle());
        assert!(!OutputFormat::Epub.is_kindle());
    }
}
