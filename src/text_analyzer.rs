//! Pure functions over `&str` operating on UTF-8 **character** offsets, not
//! byte offsets. Byte math is an internal detail, resolved at the edge of
//! every public function via [`char_slice`]/[`char_len`] — the same
//! `snap_to_char_boundary` discipline the Segmenter's fallback path uses
//! when it cuts windows mid-string.

use regex::Regex;
use std::sync::LazyLock;

/// A titled span detected by [`extract_sections`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub title: String,
    pub content: String,
    pub start: usize,
    pub end: usize,
}

/// A span detected by [`extract_paragraphs`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paragraph {
    pub content: String,
    pub start: usize,
    pub end: usize,
}

/// A span produced by [`create_semantic_chunks`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemanticChunk {
    pub content: String,
    pub start: usize,
    pub end: usize,
}

/// Number of `char`s in `text`.
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Slice `text` between char offsets `[start, end)`, clamped to bounds.
pub fn char_slice(text: &str, start: usize, end: usize) -> &str {
    let len = char_len(text);
    let start = start.min(len);
    let end = end.min(len).max(start);
    let byte_start = text
        .char_indices()
        .nth(start)
        .map(|(b, _)| b)
        .unwrap_or(text.len());
    let byte_end = text
        .char_indices()
        .nth(end)
        .map(|(b, _)| b)
        .unwrap_or(text.len());
    &text[byte_start..byte_end]
}

fn char_at(text: &str, pos: usize) -> Option<char> {
    text.chars().nth(pos)
}

static SETEXT_UNDERLINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[=\-]+\s*$").unwrap());
static BLANK_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n[ \t]*\n").unwrap());

/// True iff `text[pos]` is one of `. ! ?` and the following char is
/// whitespace or end-of-string. `pos` is a char offset.
pub fn is_sentence_boundary(text: &str, pos: usize) -> bool {
    match char_at(text, pos) {
        Some('.') | Some('!') | Some('?') => {}
        _ => return false,
    }
    match char_at(text, pos + 1) {
        None => true,
        Some(c) => c.is_whitespace(),
    }
}

/// Ordered char-offset positions of `\n[ \t]*\n` (start of the first
/// newline of each blank-line separator).
pub fn find_paragraph_boundaries(text: &str) -> Vec<usize> {
    let mut out = Vec::new();
    for m in BLANK_RUN.find_iter(text) {
        let char_pos = text[..m.start()].chars().count();
        out.push(char_pos);
    }
    out
}

/// Detects section headers and returns at most `max_sections` of them.
pub fn extract_sections(text: &str, max_sections: usize) -> Vec<Section> {
    if text.is_empty() || max_sections == 0 {
        return Vec::new();
    }

    let headers = detect_structural_headers(text);
    let sections = if headers.len() >= 3 {
        sections_from_headers(text, &headers)
    } else {
        let blanks = find_paragraph_boundaries(text);
        if blanks.len() + 1 >= 2 {
            sections_from_blank_runs(text, &blanks)
        } else {
            Vec::new()
        }
    };

    let sections = if sections.len() >= 2 {
        sections
    } else {
        equal_blocks(text, 3.max(1))
    };

    sections.into_iter().take(max_sections).collect()
}

/// A header's (char offset of title start, char offset just past the title line).
struct Header {
    title_start: usize,
    title_end: usize,
    title: String,
}

fn detect_structural_headers(text: &str) -> Vec<Header> {
    let chars: Vec<char> = text.chars().collect();
    let mut lines: Vec<(usize, usize)> = Vec::new(); // (start, end) char offsets, end exclusive of newline
    let mut line_start = 0usize;
    for (i, &c) in chars.iter().enumerate() {
        if c == '\n' {
            lines.push((line_start, i));
            line_start = i + 1;
        }
    }
    lines.push((line_start, chars.len()));

    let mut headers = Vec::new();
    for (idx, &(start, end)) in lines.iter().enumerate() {
        let line: String = chars[start..end].iter().collect();
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Some(title) = trimmed.strip_prefix('#') {
            let title = title.trim_start_matches('#').trim();
            if !title.is_empty() {
                headers.push(Header {
                    title_start: start,
                    title_end: end,
                    title: title.to_string(),
                });
            }
            continue;
        }

        if trimmed.len() <= 120 {
            if let Some(&(next_start, next_end)) = lines.get(idx + 1) {
                let next_line: String = chars[next_start..next_end].iter().collect();
                let next_trimmed = next_line.trim();
                if !next_trimmed.is_empty()
                    && SETEXT_UNDERLINE.is_match(next_trimmed)
                    && next_trimmed.len() >= trimmed.len()
                {
                    headers.push(Header {
                        title_start: start,
                        title_end: next_end,
                        title: trimmed.to_string(),
                    });
                }
            }
        }
    }
    headers
}

fn sections_from_headers(text: &str, headers: &[Header]) -> Vec<Section> {
    let len = char_len(text);
    let mut out = Vec::with_capacity(headers.len());
    for (i, h) in headers.iter().enumerate() {
        let end = headers.get(i + 1).map(|n| n.title_start).unwrap_or(len);
        let content = char_slice(text, h.title_end, end).trim().to_string();
        out.push(Section {
            title: h.title.clone(),
            content,
            start: h.title_start,
            end,
        });
    }
    out
}

fn sections_from_blank_runs(text: &str, blanks: &[usize]) -> Vec<Section> {
    let len = char_len(text);
    let mut bounds = vec![0usize];
    bounds.extend_from_slice(blanks);
    bounds.push(len);
    bounds.dedup();

    let mut out = Vec::new();
    for w in bounds.windows(2) {
        let (start, end) = (w[0], w[1]);
        let content = char_slice(text, start, end).trim().to_string();
        if content.is_empty() {
            continue;
        }
        let title = content.lines().next().unwrap_or("").trim().to_string();
        out.push(Section {
            title,
            content,
            start,
            end,
        });
    }
    out
}

fn equal_blocks(text: &str, n: usize) -> Vec<Section> {
    let len = char_len(text);
    if len == 0 {
        return Vec::new();
    }
    let n = n.max(1);
    let block = (len + n - 1) / n;
    let mut out = Vec::new();
    let mut start = 0usize;
    while start < len {
        let end = (start + block).min(len);
        let content = char_slice(text, start, end).trim().to_string();
        if !content.is_empty() {
            let title = content.chars().take(40).collect::<String>();
            out.push(Section {
                title,
                content,
                start,
                end,
            });
        }
        start = end;
    }
    out
}

/// Splits on blank-line separators; falls back to sentence splitting when
/// that yields fewer than two pieces; merges adjacent fragments shorter
/// than 80 chars. Offsets are translated by `base_offset`.
pub fn extract_paragraphs(
    text: &str,
    base_offset: usize,
    max_paragraphs: usize,
) -> Vec<Paragraph> {
    if text.is_empty() || max_paragraphs == 0 {
        return Vec::new();
    }

    let blanks = find_paragraph_boundaries(text);
    let len = char_len(text);

    let mut spans: Vec<(usize, usize)> = if blanks.len() + 1 >= 2 {
        let mut bounds = vec![0usize];
        bounds.extend_from_slice(&blanks);
        bounds.push(len);
        bounds.dedup();
        bounds.windows(2).map(|w| (w[0], w[1])).collect()
    } else {
        split_on_sentences(text)
    };

    spans.retain(|&(s, e)| !char_slice(text, s, e).trim().is_empty());

    let merged = merge_small_fragments(text, spans, 80);

    merged
        .into_iter()
        .take(max_paragraphs)
        .map(|(s, e)| Paragraph {
            content: char_slice(text, s, e).trim().to_string(),
            start: s + base_offset,
            end: e + base_offset,
        })
        .collect()
}

fn split_on_sentences(text: &str) -> Vec<(usize, usize)> {
    let len = char_len(text);
    let mut out = Vec::new();
    let mut start = 0usize;
    let mut pos = 0usize;
    while pos < len {
        if is_sentence_boundary(text, pos) {
            out.push((start, pos + 1));
            start = pos + 1;
        }
        pos += 1;
    }
    if start < len {
        out.push((start, len));
    }
    if out.is_empty() && len > 0 {
        out.push((0, len));
    }
    out
}

fn merge_small_fragments(
    text: &str,
    spans: Vec<(usize, usize)>,
    min_len: usize,
) -> Vec<(usize, usize)> {
    let mut out: Vec<(usize, usize)> = Vec::new();
    for (s, e) in spans {
        if let Some(last) = out.last_mut() {
            let last_len = char_slice(text, last.0, last.1).trim().len();
            if last_len < min_len {
                last.1 = e;
                continue;
            }
        }
        out.push((s, e));
    }
    out
}

/// Overlapping chunks targeting `max_length` chars, breaking preferentially
/// at sentence boundaries, then paragraph boundaries. Effective overlap is
/// clamped to `[min_overlap, max_length / 4]`. Offsets translated by
/// `base_offset`.
pub fn create_semantic_chunks(
    text: &str,
    max_length: usize,
    min_overlap: usize,
    base_offset: usize,
    max_chunks: usize,
) -> Vec<SemanticChunk> {
    if text.is_empty() || max_length == 0 || max_chunks == 0 {
        return Vec::new();
    }

    let len = char_len(text);
    let overlap = min_overlap.min(max_length / 4).max(min_overlap.min(max_length.saturating_sub(1)));
    let overlap = overlap.min(max_length.saturating_sub(1)).max(0);
    let paragraph_bounds = find_paragraph_boundaries(text);

    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < len && chunks.len() < max_chunks {
        let mut end = (start + max_length).min(len);

        if end < len {
            let window_start = end.saturating_sub(max_length / 10 + 1);
            let mut best: Option<usize> = None;
            for p in (window_start..=end).rev() {
                if is_sentence_boundary(text, p.saturating_sub(1)) {
                    best = Some(p);
                    break;
                }
            }
            if best.is_none() {
                best = paragraph_bounds
                    .iter()
                    .copied()
                    .filter(|&b| b > start && b <= end)
                    .max();
            }
            if let Some(b) = best {
                if b > start {
                    end = b;
                }
            }
        }

        let content = char_slice(text, start, end).trim().to_string();
        if !content.is_empty() {
            chunks.push(SemanticChunk {
                content,
                start: start + base_offset,
                end: end + base_offset,
            });
        }

        if end >= len {
            break;
        }
        let next_start = end.saturating_sub(overlap);
        start = if next_start > start { next_start } else { end };
    }

    chunks
}

const KEY_MARKERS: &[&str] = &[
    "clé",
    "cle",
    "essentiel",
    "important",
    "crucial",
    "key",
    "essential",
];

/// Concatenates the head, up to two sentences containing a "key" marker,
/// and the tail of `text`, truncated to `max_length` chars.
pub fn meaningful_preview(text: &str, max_length: usize) -> String {
    if text.is_empty() || max_length == 0 {
        return String::new();
    }

    let len = char_len(text);
    if len <= max_length {
        return text.to_string();
    }

    let head_len = (max_length / 3).max(1);
    let tail_len = (max_length / 3).max(1);
    let head = char_slice(text, 0, head_len.min(len));

    let sentences = split_on_sentences(text);
    let lower_markers: Vec<String> = KEY_MARKERS.iter().map(|m| m.to_lowercase()).collect();
    let mut key_sentences = Vec::new();
    for (s, e) in &sentences {
        if key_sentences.len() >= 2 {
            break;
        }
        let sentence = char_slice(text, *s, *e);
        let lower = sentence.to_lowercase();
        if lower_markers.iter().any(|m| lower.contains(m.as_str())) {
            key_sentences.push(sentence.trim().to_string());
        }
    }

    let tail_start = len.saturating_sub(tail_len);
    let tail = char_slice(text, tail_start, len);

    let mut out = String::new();
    out.push_str(head.trim());
    for s in &key_sentences {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(s);
    }
    if !out.is_empty() {
        out.push(' ');
    }
    out.push_str(tail.trim());

    if char_len(&out) > max_length {
        char_slice(&out, 0, max_length).to_string()
    } else {
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_empty_everywhere() {
        assert!(extract_sections("", 10).is_empty());
        assert!(extract_paragraphs("", 0, 10).is_empty());
        assert!(create_semantic_chunks("", 100, 10, 0, 10).is_empty());
        assert_eq!(meaningful_preview("", 100), "");
        assert!(find_paragraph_boundaries("").is_empty());
    }

    #[test]
    fn sentence_boundary_detection() {
        let text = "Hello. World!";
        assert!(is_sentence_boundary(text, 5));
        assert!(is_sentence_boundary(text, 12));
        assert!(!is_sentence_boundary(text, 0));
    }

    #[test]
    fn paragraph_boundaries_found_between_blank_lines() {
        let text = "Para one.\n\nPara two.\n\nPara three.";
        let bounds = find_paragraph_boundaries(text);
        assert_eq!(bounds.len(), 2);
    }

    #[test]
    fn markdown_headers_detected_as_sections() {
        let text = "# Intro\ntext a\n\n# Body\ntext b\n\n# Conclusion\ntext c";
        let sections = extract_sections(text, 10);
        assert!(sections.len() >= 3);
        assert_eq!(sections[0].title, "Intro");
    }

    #[test]
    fn paragraphs_merge_small_fragments() {
        let text = "Hi.\n\nThis is a slightly longer paragraph with real content in it.";
        let paragraphs = extract_paragraphs(text, 0, 10);
        assert!(paragraphs.iter().all(|p| !p.content.is_empty()));
    }

    #[test]
    fn semantic_chunks_respect_max_length_soft_target() {
        let text = "word ".repeat(500);
        let chunks = create_semantic_chunks(&text, 200, 20, 0, 100);
        assert!(!chunks.is_empty());
        for c in &chunks {
            assert!(c.end > c.start);
        }
    }

    #[test]
    fn preview_truncates_to_max_length() {
        let text = "a".repeat(1000);
        let preview = meaningful_preview(&text, 100);
        assert!(char_len(&preview) <= 100);
    }

    #[test]
    fn preview_shorter_than_max_returns_whole_text() {
        assert_eq!(meaningful_preview("short text", 100), "short text");
    }
}
