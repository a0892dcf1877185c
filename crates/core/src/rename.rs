//! Name templating: author display names and output file names.
//! Format: `{keyword}` placeholders, e.g. `{author} - {title}` or `{last}, {first}`.

use std::path::Path;

use crate::book::Book;

/// Parts of an FB2 `author` element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorName {
    pub first: String,
    pub middle: String,
    pub last: String,
    pub nick: String,
}

impl AuthorName {
    pub fn is_empty(&self) -> bool {
        self.first.is_empty() && self.middle.is_empty() && self.last.is_empty() && self.nick.is_empty()
    }
}

/// Render an author with `{first}`, `{middle}`, `{last}`, `{nick}`.
/// Whitespace is collapsed; when the template renders to nothing the nickname is used.
pub fn format_author(template: &str, author: &AuthorName) -> String {
    let out = template
        .replace("{first}", &author.first)
        .replace("{middle}", &author.middle)
        .replace("{last}", &author.last)
        .replace("{nick}", &author.nick);
    let out = tidy(&out);
    if out.is_empty() {
        author.nick.trim().to_string()
    } else {
        out
    }
}

/// Render the output file stem from `template` and the book metadata.
/// Returns `None` when the template is empty or renders to nothing usable.
pub fn format_file_name(template: &str, book: &Book) -> Option<String> {
    if template.trim().is_empty() {
        return None;
    }
    let author = book.authors.first().map(String::as_str).unwrap_or("");
    let authors = book.authors.join(", ");
    let number = book.seq_num.map(|n| n.to_string()).unwrap_or_default();
    let id = book.id.to_string();

    let out = template
        .replace("{title}", &book.title)
        .replace("{authors}", &authors)
        .replace("{author}", author)
        .replace("{series}", &book.seq_name)
        .replace("{number}", &number)
        .replace("{lang}", &book.lang)
        .replace("{date}", &book.date)
        .replace("{id}", &id);

    let out = clean_file_name(&tidy(&out));
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

/// Strip characters that are not allowed in file names on common platforms.
pub fn clean_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*') && !c.is_control())
        .collect();
    cleaned.trim().trim_end_matches('.').trim().to_string()
}

/// Output file name: template result or the source stem, plus the format extension.
pub fn output_file_name(template: &str, book: &Book, ext: &str) -> String {
    let stem = format_file_name(template, book).unwrap_or_else(|| {
        let source = Path::new(&book.source_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("book");
        // "book.fb2.zip" style names keep a trailing ".fb2"
        source.strip_suffix(".fb2").unwrap_or(source).to_string()
    });
    format!("{}.{}", stem, ext)
}

/// Collapse whitespace runs and drop separators left dangling by empty keywords.
fn tidy(s: &str) -> String {
    let collapsed = s.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .trim_matches(|c: char| c == ',' || c == '-' || c.is_whitespace())
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn author(first: &str, middle: &str, last: &str, nick: &str) -> AuthorName {
        AuthorName {
            first: first.into(),
            middle: middle.into(),
            last: last.into(),
            nick: nick.into(),
        }
    }

    #[test]
    fn author_default_template() {
        let a = author("Lev", "", "Tolstoy", "");
        assert_eq!(format_author("{first} {middle} {last}", &a), "Lev Tolstoy");
    }

    #[test]
    fn author_reordered_template() {
        let a = author("Fyodor", "Mikhailovich", "Dostoevsky", "");
        assert_eq!(format_author("{last}, {first} {middle}", &a), "Dostoevsky, Fyodor Mikhailovich");
    }

    #[test]
    fn author_nick_fallback() {
        let a = author("", "", "", "anon42");
        assert_eq!(format_author("{first} {last}", &a), "anon42");
    }

    #[test]
    fn file_name_from_metadata() {
        let mut book = Book::new("in.fb2");
        book.title = "War: and Peace?".into();
        book.authors = vec!["Lev Tolstoy".into()];
        book.seq_name = "Classics".into();
        book.seq_num = Some(3);
        assert_eq!(
            format_file_name("{author} - {title} ({series} {number})", &book).unwrap(),
            "Lev Tolstoy - War and Peace (Classics 3)"
        );
    }

    #[test]
    fn empty_template_uses_source_stem() {
        let book = Book::new("/tmp/library/novel.fb2");
        assert_eq!(output_file_name("", &book, "epub"), "novel.epub");
        let book = Book::new("novel.fb2.zip");
        assert_eq!(output_file_name("{title}", &book, "mobi"), "novel.mobi");
    }

    #[test]
    fn clean_strips_illegal_characters() {
        assert_eq!(clean_file_name("a/b\\c:d*e?f\"g<h>i|j\u{7}"), "abcdefghij");
    }
}
