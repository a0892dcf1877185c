//! Source text decoding: byte-order marks, caller supplied charset labels,
//! and the XML declaration's `encoding` pseudo-attribute.

use encoding_rs::Encoding;

use crate::error::ParseError;

/// Decode FB2 source bytes into a UTF-8 string.
///
/// Resolution order: a byte-order mark always wins; without one the caller
/// supplied `charset` label is used (an unknown label is an error); without a
/// label the XML declaration is consulted; UTF-8 is the final default.
pub fn decode_source(bytes: &[u8], charset: Option<&str>) -> Result<String, ParseError> {
    let (encoding, body) = match Encoding::for_bom(bytes) {
        Some((enc, bom_len)) => (enc, &bytes[bom_len..]),
        None => {
            let enc = match charset {
                Some(label) => Encoding::for_label(label.trim().as_bytes())
                    .ok_or_else(|| ParseError::UnknownCharset(label.to_string()))?,
                None => declared_encoding(bytes)
                    .and_then(|label| Encoding::for_label(label.as_bytes()))
                    .unwrap_or(encoding_rs::UTF_8),
            };
            (enc, bytes)
        }
    };

    let (text, had_errors) = encoding.decode_without_bom_handling(body);
    if had_errors {
        return Err(ParseError::MalformedText {
            encoding: encoding.name().to_string(),
        });
    }
    tracing::debug!("Decoded source as {}", encoding.name());
    Ok(text.into_owned())
}

/// True when the input starts with any Unicode byte-order mark.
pub fn has_bom(bytes: &[u8]) -> bool {
    Encoding::for_bom(bytes).is_some()
}

/// Pull `encoding="..."` out of a leading `<?xml ...?>` declaration.
fn declared_encoding(bytes: &[u8]) -> Option<String> {
    let head = &bytes[..bytes.len().min(256)];
    let head = String::from_utf8_lossy(head);
    let decl_end = head.find("?>")?;
    let decl = head.get(..decl_end)?;
    if !decl.trim_start().starts_with("<?xml") {
        return None;
    }
    let pos = decl.find("encoding")?;
    let rest = decl[pos + "encoding".len()..].trim_start().strip_prefix('=')?.trim_start();
    let quote = rest.chars().next()?;
    if quote != '"' && quote != '\'' {
        return None;
    }
    let value = &rest[1..];
    let end = value.find(quote)?;
    Some(value[..end].to_string())
}
