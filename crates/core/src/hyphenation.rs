//! Soft-hyphen insertion driven by an external syllable breaker.

/// Capability supplied by the caller: syllable break positions for a word.
///
/// Positions are char offsets into `word` before which a hyphen may go;
/// offsets of `0` or `>= word.chars().count()` are ignored.
pub trait Hyphenator: Send + Sync {
    fn hyphenate(&self, word: &str, lang: &str) -> Vec<usize>;
}

const SOFT_HYPHEN: char = '\u{00AD}';

/// Words shorter than this are left alone.
const MIN_WORD_CHARS: usize = 5;

/// Insert U+00AD at every break position the hyphenator reports for each word.
pub fn hyphenate_text(text: &str, lang: &str, hyphenator: &dyn Hyphenator) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 8);
    let mut word = String::new();
    for c in text.chars() {
        if c.is_alphabetic() {
            word.push(c);
        } else {
            flush_word(&mut word, lang, hyphenator, &mut out);
            out.push(c);
        }
    }
    flush_word(&mut word, lang, hyphenator, &mut out);
    out
}

fn flush_word(word: &mut String, lang: &str, hyphenator: &dyn Hyphenator, out: &mut String) {
    if word.is_empty() {
        return;
    }
    let len = word.chars().count();
    if len < MIN_WORD_CHARS {
        out.push_str(word);
        word.clear();
        return;
    }
    let mut breaks = hyphenator.hyphenate(word, lang);
    breaks.retain(|&b| b > 0 && b < len);
    breaks.sort_unstable();
    breaks.dedup();

    let mut next = breaks.iter().peekable();
    for (i, c) in word.chars().enumerate() {
        if next.peek().map(|&&b| b == i).unwrap_or(false) {
            out.push(SOFT_HYPHEN);
            next.next();
        }
        out.push(c);
    }
    word.clear();
}
