//! Page text extraction: title, meta description, and visible body text.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Node, Selector};

static TITLE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("valid title selector"));

static DESCRIPTION_SEL: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"meta[name="description"], meta[name="Description"]"#)
        .expect("valid meta selector")
});

static BODY_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("body").expect("valid body selector"));

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// Elements whose text is never visible.
const HIDDEN_TAGS: &[&str] = &["script", "style", "noscript", "template", "svg", "head"];

/// What one page fetch yields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageContent {
    /// Final URL after redirects.
    pub url: String,
    /// `<title>` text with newlines and tabs removed.
    pub title: Option<String>,
    /// `<meta name="description">` content.
    pub description: Option<String>,
    /// Visible body text, whitespace-collapsed and truncated.
    pub text: String,
}

/// Parse an HTML document into [`PageContent`], cutting text to `max_chars`.
pub fn parse_page(url: &str, html: &str, max_chars: usize) -> PageContent {
    let doc = Html::parse_document(html);

    let title = doc
        .select(&TITLE_SEL)
        .next()
        .map(|el| clean_title(&el.text().collect::<String>()))
        .filter(|t| !t.is_empty());

    let description = doc
        .select(&DESCRIPTION_SEL)
        .find_map(|el| el.value().attr("content"))
        .map(collapse_whitespace)
        .filter(|c| !c.is_empty());

    let text = truncate_chars(&visible_text(&doc), max_chars);

    PageContent {
        url: url.to_string(),
        title,
        description,
        text,
    }
}

fn clean_title(raw: &str) -> String {
    raw.replace(['\n', '\t', '\r'], "").trim().to_string()
}

/// Collapse runs of whitespace to one space and trim.
pub fn collapse_whitespace(s: &str) -> String {
    WHITESPACE.replace_all(s, " ").trim().to_string()
}

/// Keep at most `max_chars` characters (not bytes).
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// Concatenate text nodes under `<body>` that are not inside hidden elements.
fn visible_text(doc: &Html) -> String {
    let Some(body) = doc.select(&BODY_SEL).next() else {
        return String::new();
    };

    let mut out = String::new();
    for node in body.descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|el| HIDDEN_TAGS.contains(&el.name()))
        });
        if !hidden {
            out.push_str(text);
            out.push(' ');
        }
    }

    collapse_whitespace(&out)
}
