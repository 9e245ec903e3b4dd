use scraper::{ElementRef, Html, Selector};

use crate::util::{collapse_whitespace, truncate_chars};

/// Cap on extracted article text, in characters.
pub const MAX_EXTRACTED_CHARS: usize = 10_000;

/// Containers that hold the main article text on common news and blog
/// platforms. Order matters: the first selector that yields text wins.
const CONTENT_SELECTORS: &[&str] = &[
    "article",
    ".article-content",
    ".article-body",
    ".post-content",
    ".entry-content",
    ".content",
    "[role=\"main\"]",
    "main",
];

/// Subtrees whose text is never article content.
const SKIPPED_ELEMENTS: &[&str] = &[
    "script", "style", "noscript", "nav", "header", "footer", "aside", "form", "template",
];

/// Extract a best-effort main-content text block from an HTML page.
///
/// Returns `None` when nothing but boilerplate (or nothing at all) remains.
/// Text longer than [`MAX_EXTRACTED_CHARS`] is cut and marked with `...`.
pub fn extract_main_text(html: &str) -> Option<String> {
    let document = Html::parse_document(html);

    let from_selectors = CONTENT_SELECTORS.iter().find_map(|raw| {
        let selector = Selector::parse(raw).ok()?;
        let text = document
            .select(&selector)
            .filter(|el| !has_matching_ancestor(*el, &selector))
            .map(visible_text)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        (!text.is_empty()).then_some(text)
    });

    let text = from_selectors.or_else(|| {
        let body = Selector::parse("body").ok()?;
        document
            .select(&body)
            .next()
            .map(visible_text)
            .filter(|t| !t.is_empty())
    })?;

    if text.chars().count() > MAX_EXTRACTED_CHARS {
        Some(format!("{}...", truncate_chars(&text, MAX_EXTRACTED_CHARS)))
    } else {
        Some(text)
    }
}

fn has_matching_ancestor(element: ElementRef<'_>, selector: &Selector) -> bool {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|ancestor| selector.matches(&ancestor))
}

/// Text under `root`, skipping boilerplate subtrees, whitespace-collapsed.
fn visible_text(root: ElementRef<'_>) -> String {
    let mut pieces = Vec::new();

    for node in root.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .ancestors()
            .take_while(|a| a.id() != root.id())
            .filter_map(ElementRef::wrap)
            .any(|el| SKIPPED_ELEMENTS.contains(&el.value().name()));
        if !hidden {
            pieces.push(&**text);
        }
    }

    collapse_whitespace(&pieces.join(" "))
}
