//! Document language resolution.
//!
//! FB2 producers put anything into `title-info/lang`: proper tags (`ru`, `en-US`),
//! underscored locales (`pt_BR`), or a language name (`Russian`, `русский`).
//! Tags are normalized; names are matched against a small table.

use crate::error::ConvertError;

pub const DEFAULT_LANGUAGE: &str = "en";

/// (tag, english name, self name)
const LANGUAGES: &[(&str, &str, &str)] = &[
    ("ar", "arabic", "العربية"),
    ("be", "belarusian", "беларуская"),
    ("bg", "bulgarian", "български"),
    ("cs", "czech", "čeština"),
    ("da", "danish", "dansk"),
    ("de", "german", "deutsch"),
    ("el", "greek", "ελληνικά"),
    ("en", "english", "english"),
    ("eo", "esperanto", "esperanto"),
    ("es", "spanish", "español"),
    ("et", "estonian", "eesti"),
    ("fi", "finnish", "suomi"),
    ("fr", "french", "français"),
    ("he", "hebrew", "עברית"),
    ("hr", "croatian", "hrvatski"),
    ("hu", "hungarian", "magyar"),
    ("hy", "armenian", "հայերեն"),
    ("it", "italian", "italiano"),
    ("ja", "japanese", "日本語"),
    ("ka", "georgian", "ქართული"),
    ("kk", "kazakh", "қазақ"),
    ("ko", "korean", "한국어"),
    ("la", "latin", "latina"),
    ("lt", "lithuanian", "lietuvių"),
    ("lv", "latvian", "latviešu"),
    ("nl", "dutch", "nederlands"),
    ("no", "norwegian", "norsk"),
    ("pl", "polish", "polski"),
    ("pt", "portuguese", "português"),
    ("ro", "romanian", "română"),
    ("ru", "russian", "русский"),
    ("sk", "slovak", "slovenčina"),
    ("sl", "slovenian", "slovenščina"),
    ("sr", "serbian", "српски"),
    ("sv", "swedish", "svenska"),
    ("tr", "turkish", "türkçe"),
    ("uk", "ukrainian", "українська"),
    ("zh", "chinese", "中文"),
];

/// Resolve the raw `lang` value into a language tag.
///
/// An empty value yields [`DEFAULT_LANGUAGE`]. Anything that is neither a
/// well-formed tag nor a known language name is fatal.
pub fn resolve(raw: &str) -> Result<String, ConvertError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(DEFAULT_LANGUAGE.to_string());
    }
    if let Some(tag) = parse_tag(raw) {
        return Ok(tag);
    }
    match lookup_name(raw) {
        Some(tag) => {
            tracing::debug!("Language '{}' matched by name as {}", raw, tag);
            Ok(tag.to_string())
        }
        None => Err(ConvertError::Language(raw.to_string())),
    }
}

/// Normalize a tag of the form `ll[-Script][-RR]...`; `_` is accepted as separator.
/// Primary subtag is lowercased, two-letter region uppercased, script titlecased.
fn parse_tag(raw: &str) -> Option<String> {
    let mut parts = raw.split(['-', '_']);
    let primary = parts.next()?;
    if !(2..=3).contains(&primary.len()) || !primary.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let mut out = primary.to_ascii_lowercase();
    for sub in parts {
        if sub.is_empty() || sub.len() > 8 || !sub.chars().all(|c| c.is_ascii_alphanumeric()) {
            return None;
        }
        out.push('-');
        match sub.len() {
            2 if sub.chars().all(|c| c.is_ascii_alphabetic()) => out.push_str(&sub.to_ascii_uppercase()),
            4 if sub.chars().all(|c| c.is_ascii_alphabetic()) => {
                let mut chars = sub.chars();
                if let Some(first) = chars.next() {
                    out.push(first.to_ascii_uppercase());
                    out.push_str(&chars.as_str().to_ascii_lowercase());
                }
            }
            _ => out.push_str(&sub.to_ascii_lowercase()),
        }
    }
    Some(out)
}

fn lookup_name(raw: &str) -> Option<&'static str> {
    let name = raw.to_lowercase();
    LANGUAGES
        .iter()
        .find(|(_, en, native)| *en == name || *native == name)
        .map(|(tag, _, _)| *tag)
}
