//! HTML text extraction via `scraper`: strip `<script>`/`<style>` content
//! and join the remaining text nodes, one line per block-level element.

use std::path::Path;

use anyhow::{Context, Result};
use scraper::{Html, Selector};

const BLOCK_TAGS: &[&str] = &[
    "p", "div", "br", "h1", "h2", "h3", "h4", "h5", "h6", "li", "tr", "section", "article",
];

pub fn extract(path: &Path) -> Result<String> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read HTML: {}", path.display()))?;
    Ok(extract_from_str(&raw))
}

pub fn extract_from_str(raw: &str) -> String {
    let document = Html::parse_document(raw);
    let noise = Selector::parse("script, style").unwrap();
    let block_selector = BLOCK_TAGS.join(", ");
    let blocks = Selector::parse(&block_selector).unwrap();

    let noisy_text: std::collections::HashSet<_> = document
        .select(&noise)
        .flat_map(|el| el.text())
        .map(|s| s.to_string())
        .collect();

    let mut lines = Vec::new();
    for el in document.select(&blocks) {
        let text: String = el
            .text()
            .filter(|t| !noisy_text.contains(*t))
            .collect::<Vec<_>>()
            .join(" ");
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            lines.push(trimmed.to_string());
        }
    }

    if lines.is_empty() {
        let root = document.root_element();
        return root
            .text()
            .filter(|t| !noisy_text.contains(*t))
            .collect::<Vec<_>>()
            .join(" ")
            .trim()
            .to_string();
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_script_and_style_content() {
        let html = "<html><head><style>.x{}</style><script>alert(1)</script></head>\
                     <body><p>Hello world.</p></body></html>";
        let text = extract_from_str(html);
        assert_eq!(text, "Hello world.");
    }

    #[test]
    fn joins_paragraphs_on_separate_lines() {
        let html = "<html><body><p>First.</p><p>Second.</p></body></html>";
        let text = extract_from_str(html);
        assert_eq!(text, "First.\nSecond.");
    }
}
