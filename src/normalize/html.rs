//! HTML to clean text, plus head metadata.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};

use crate::models::PageMetadata;

/// Elements whose content is never page text.
const SKIPPED_TAGS: &[&str] = &[
    "script", "style", "nav", "footer", "header", "noscript", "iframe", "svg", "form",
    "template", "head",
];

/// Elements that end a line of text.
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "br", "li", "ul", "ol", "h1", "h2", "h3", "h4", "h5", "h6", "tr", "table",
    "section", "article", "main", "aside", "blockquote", "dt", "dd", "figcaption", "address",
];

fn is_boilerplate(line: &str) -> bool {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(faq|careers?|newsletters?|privacy|cookies?|terms|legal|all rights reserved)\b",
        )
        .ok()
    })
    .as_ref()
    .is_some_and(|re| re.is_match(line))
}

fn walk(element: ElementRef<'_>, out: &mut String) {
    let name = element.value().name();
    if SKIPPED_TAGS.contains(&name) {
        return;
    }

    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(&text.replace('\n', " ")),
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    walk(child, out);
                }
            }
            _ => {}
        }
    }

    if BLOCK_TAGS.contains(&name) {
        out.push('\n');
    }
}

fn keep_char(c: char) -> bool {
    if c == '\n' {
        return true;
    }
    if c.is_control() {
        return false;
    }
    !matches!(c,
        '\u{200b}'..='\u{200f}' | '\u{feff}' | '\u{fffd}' | '\u{e000}'..='\u{f8ff}')
}

/// Collapse whitespace within lines and drop empty and boilerplate lines.
pub fn clean_text(raw: &str) -> String {
    let filtered: String = raw
        .chars()
        .map(|c| if c == '\t' || c == '\r' { ' ' } else { c })
        .filter(|c| keep_char(*c))
        .collect();

    filtered
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .filter(|line| line.split(' ').count() > 6 || !is_boilerplate(line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Visible page text with boilerplate elements removed.
pub fn visible_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut raw = String::new();
    walk(document.root_element(), &mut raw);
    clean_text(&raw)
}

/// Title, meta description and OpenGraph tags.
pub fn extract_metadata(html: &str) -> PageMetadata {
    let document = Html::parse_document(html);
    let mut metadata = PageMetadata::default();

    if let Ok(selector) = Selector::parse("title") {
        metadata.title = document
            .select(&selector)
            .next()
            .map(|t| clean_text(&t.text().collect::<String>()))
            .filter(|t| !t.is_empty());
    }

    if let Ok(selector) = Selector::parse("meta") {
        let mut open_graph = HashMap::new();
        for meta in document.select(&selector) {
            let attrs = meta.value();
            let Some(content) = attrs.attr("content").map(str::trim).filter(|c| !c.is_empty())
            else {
                continue;
            };

            if attrs
                .attr("name")
                .is_some_and(|n| n.eq_ignore_ascii_case("description"))
                && metadata.description.is_none()
            {
                metadata.description = Some(content.to_string());
            }

            if let Some(key) = attrs
                .attr("property")
                .and_then(|p| p.strip_prefix("og:"))
            {
                open_graph
                    .entry(key.to_string())
                    .or_insert_with(|| content.to_string());
            }
        }
        metadata.open_graph = open_graph;
    }

    metadata
}
