use std::borrow::Cow;

use scraper::Html;

/// Truncates a string to at most `max_chars` characters.
///
/// Counts Unicode scalar values, not bytes, so the cut never lands inside a
/// multi-byte character. No ellipsis is appended: a stored title that was cut
/// is exactly `max_chars` long.
///
/// Returns `Cow::Borrowed` when the string already fits.
///
/// # Examples
///
/// ```
/// use newswire::util::truncate_chars;
///
/// assert_eq!(truncate_chars("Short", 10), "Short");
/// assert_eq!(truncate_chars("Hello World", 5), "Hello");
/// assert_eq!(truncate_chars("日本語のタイトル", 3), "日本語");
/// ```
pub fn truncate_chars(s: &str, max_chars: usize) -> Cow<'_, str> {
    match s.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => Cow::Owned(s[..byte_idx].to_string()),
        None => Cow::Borrowed(s),
    }
}

/// Collapses every run of whitespace (including newlines) into a single
/// space and trims both ends.
pub fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for word in s.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}

/// Strips ASCII control characters (except tab, newline and carriage return)
/// and DEL from feed-supplied text.
///
/// Returns `Cow::Borrowed` when the input is already clean, which is the
/// common case.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    let is_control = |c: char| c == '\u{7f}' || (c < ' ' && !matches!(c, '\t' | '\n' | '\r'));

    if !s.chars().any(is_control) {
        return Cow::Borrowed(s);
    }
    Cow::Owned(s.chars().filter(|&c| !is_control(c)).collect())
}

/// Converts an HTML fragment (an RSS `<description>`, an Atom `<summary>`)
/// into plain text: tags dropped, entities decoded, whitespace collapsed.
///
/// Plain text passes through unchanged apart from whitespace collapsing.
pub fn html_to_text(fragment: &str) -> String {
    if !fragment.contains('<') && !fragment.contains('&') {
        return collapse_whitespace(fragment);
    }

    let parsed = Html::parse_fragment(fragment);
    let joined = parsed.root_element().text().collect::<Vec<_>>().join(" ");
    collapse_whitespace(&joined)
}
