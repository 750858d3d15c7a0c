//! Emits the lazy, finite, non-restartable sequence of chunk records that
//! the Store consumes. Positions are carried as indices into an in-flight
//! arena (not object pointers), so a batch can be serialized without
//! resolving a graph — the Store resolves `parent_index` to a persistent
//! id only at insert time.

use crate::error::SegmenterError;
use crate::text_analyzer::{self, char_len, char_slice, is_sentence_boundary};
use crate::types::{HierarchyLevel, RawChunk};

pub const MAX_CHUNKS: usize = 5000;
pub const MAX_TEXT_LENGTH: usize = 20_000_000;
pub const MAX_CHUNK_SIZE: usize = 8000;
pub const MIN_LEVEL3_LENGTH: usize = 200;
pub const MAX_LEVEL3_CHUNKS_PER_PARAGRAPH: usize = 100;
pub const LARGE_THRESHOLD_BYTES: usize = 5_000_000;

const MAX_SECTIONS: usize = 20;
const MAX_PARAGRAPHS_PER_SECTION: usize = 20;

/// Picks `fallback_stream` when the semantic path would emit at most the
/// root chunk, `semantic_stream` otherwise.
pub fn segment(
    text: &str,
    max_length: usize,
) -> Result<Box<dyn Iterator<Item = Result<RawChunk, SegmenterError>>>, SegmenterError> {
    if char_len(text) > MAX_TEXT_LENGTH {
        return Err(SegmenterError::InputTooLarge {
            len: char_len(text),
            max: MAX_TEXT_LENGTH,
        });
    }

    let probe: Vec<_> = semantic_stream(text, max_length)?.collect();
    if probe.len() <= 1 {
        Ok(Box::new(fallback_stream(text, max_length)?.collect::<Vec<_>>().into_iter()))
    } else {
        Ok(Box::new(probe.into_iter()))
    }
}

/// Level 0 preview, up to 20 level-1 sections, up to 20 level-2 paragraphs
/// per section, and level-3 chunks for paragraphs at least
/// `MIN_LEVEL3_LENGTH` chars long. Stops emitting once `MAX_CHUNKS` chunks
/// have been produced. Duplicate content within the same parent is
/// suppressed.
///
/// The tree is built into an arena of records up front (bounded to
/// `MAX_CHUNKS` entries, each at most `MAX_CHUNK_SIZE` chars) rather than
/// walked lazily node-by-node; this keeps the ordering/parent-index
/// invariants easy to check while still bounding peak memory to a small
/// multiple of `MAX_CHUNK_SIZE * MAX_LEVEL3_CHUNKS_PER_PARAGRAPH`, never to
/// the size of the source text.
pub fn semantic_stream(
    text: &str,
    max_length: usize,
) -> Result<impl Iterator<Item = Result<RawChunk, SegmenterError>>, SegmenterError> {
    if char_len(text) > MAX_TEXT_LENGTH {
        return Err(SegmenterError::InputTooLarge {
            len: char_len(text),
            max: MAX_TEXT_LENGTH,
        });
    }

    Ok(build_semantic_arena(text, max_length).into_iter().map(Ok))
}

/// Clips `content`/`(start, end)` to at most `MAX_CHUNK_SIZE` chars,
/// keeping `end - start == content.len()` so the offset-span invariant
/// (§8: `end - start <= MAX_CHUNK_SIZE`) holds alongside the content-length
/// invariant (§3: chunk content `<= 8,000` chars). Only the emitted node's
/// own content is clipped — callers still derive children from the
/// original, unclipped span.
fn clip_to_max_chunk_size(content: String, start: usize, end: usize) -> (String, usize, usize) {
    if char_len(&content) <= MAX_CHUNK_SIZE {
        return (content, start, end);
    }
    let clipped = char_slice(&content, 0, MAX_CHUNK_SIZE).to_string();
    let clipped_len = char_len(&clipped);
    (clipped, start, start + clipped_len)
}

fn build_semantic_arena(text: &str, max_length: usize) -> Vec<RawChunk> {
    let mut out: Vec<RawChunk> = Vec::new();
    let len = char_len(text);

    let preview = text_analyzer::meaningful_preview(text, max_length.max(200));
    out.push(RawChunk {
        content: preview,
        start_char: 0,
        end_char: len,
        hierarchy_level: HierarchyLevel::Preview,
        parent_index: None,
    });
    let root_index = 0usize;

    if out.len() < MAX_CHUNKS {
        let sections = text_analyzer::extract_sections(text, MAX_SECTIONS);
        let mut seen_at_root: Vec<String> = Vec::new();

        'sections: for section in &sections {
            let trimmed = section.content.trim().to_string();
            if seen_at_root.contains(&trimmed) {
                continue;
            }
            seen_at_root.push(trimmed);

            let (content, start_char, end_char) =
                clip_to_max_chunk_size(section.content.clone(), section.start, section.end);
            out.push(RawChunk {
                content,
                start_char,
                end_char,
                hierarchy_level: HierarchyLevel::Section,
                parent_index: Some(root_index),
            });
            let section_index = out.len() - 1;
            if out.len() >= MAX_CHUNKS {
                break 'sections;
            }

            let section_text = char_slice(text, section.start, section.end);
            let paragraphs = text_analyzer::extract_paragraphs(
                section_text,
                section.start,
                MAX_PARAGRAPHS_PER_SECTION,
            );
            let mut seen_in_section: Vec<String> = Vec::new();

            for paragraph in &paragraphs {
                let ptrim = paragraph.content.trim().to_string();
                if seen_in_section.contains(&ptrim) {
                    continue;
                }
                seen_in_section.push(ptrim);

                let (content, start_char, end_char) =
                    clip_to_max_chunk_size(paragraph.content.clone(), paragraph.start, paragraph.end);
                out.push(RawChunk {
                    content,
                    start_char,
                    end_char,
                    hierarchy_level: HierarchyLevel::Paragraph,
                    parent_index: Some(section_index),
                });
                let paragraph_index = out.len() - 1;
                if out.len() >= MAX_CHUNKS {
                    break 'sections;
                }

                if char_len(&paragraph.content) >= MIN_LEVEL3_LENGTH {
                    let target_length = max_length.min(MAX_CHUNK_SIZE);
                    let overlap = (target_length / 10).max(50);
                    let para_text = char_slice(text, paragraph.start, paragraph.end);
                    let fine_chunks = text_analyzer::create_semantic_chunks(
                        para_text,
                        target_length,
                        overlap,
                        paragraph.start,
                        MAX_LEVEL3_CHUNKS_PER_PARAGRAPH,
                    );
                    let mut seen_in_paragraph: Vec<String> = Vec::new();
                    for fine in &fine_chunks {
                        let ftrim = fine.content.trim().to_string();
                        if seen_in_paragraph.contains(&ftrim) {
                            continue;
                        }
                        seen_in_paragraph.push(ftrim);

                        out.push(RawChunk {
                            content: fine.content.clone(),
                            start_char: fine.start,
                            end_char: fine.end,
                            hierarchy_level: HierarchyLevel::Fine,
                            parent_index: Some(paragraph_index),
                        });
                        if out.len() >= MAX_CHUNKS {
                            break 'sections;
                        }
                    }
                }
            }
        }
    }

    out.truncate(MAX_CHUNKS);
    out
}

/// Level 0 preview, then level-3 chunks from a sliding window over the
/// whole text (~10% overlap), snapping cut points to the nearest sentence
/// boundary within a ±10% window, else the nearest paragraph boundary,
/// else a hard cut.
pub fn fallback_stream(
    text: &str,
    max_length: usize,
) -> Result<impl Iterator<Item = Result<RawChunk, SegmenterError>>, SegmenterError> {
    if char_len(text) > MAX_TEXT_LENGTH {
        return Err(SegmenterError::InputTooLarge {
            len: char_len(text),
            max: MAX_TEXT_LENGTH,
        });
    }

    let target = (max_length * 2).min(MAX_CHUNK_SIZE).max(1);
    let len = char_len(text);
    let paragraph_bounds = text_analyzer::find_paragraph_boundaries(text);

    let mut chunks = Vec::new();
    chunks.push(RawChunk {
        content: text_analyzer::meaningful_preview(text, max_length.max(200)),
        start_char: 0,
        end_char: len,
        hierarchy_level: HierarchyLevel::Preview,
        parent_index: None,
    });
    let root_index = 0usize;

    if len == 0 {
        return Ok(chunks.into_iter().map(Ok));
    }

    let overlap = (target / 10).max(1).min(target.saturating_sub(1));
    let window = (target / 10).max(1);

    let mut start = 0usize;
    while start < len && chunks.len() < MAX_CHUNKS {
        let mut end = (start + target).min(len);

        if end < len {
            let lo = end.saturating_sub(window);
            let hi = (end + window).min(len);
            let mut snapped: Option<usize> = None;
            for p in lo..=hi {
                if p > start && is_sentence_boundary(text, p.saturating_sub(1)) {
                    snapped = Some(match snapped {
                        Some(prev) if (prev as isize - end as isize).abs() <= (p as isize - end as isize).abs() => prev,
                        _ => p,
                    });
                }
            }
            if snapped.is_none() {
                snapped = paragraph_bounds
                    .iter()
                    .copied()
                    .filter(|&b| b > start && b >= lo && b <= hi)
                    .min_by_key(|&b| (b as isize - end as isize).abs());
            }
            if let Some(s) = snapped {
                end = s;
            }
        }

        if end <= start {
            end = (start + 1).min(len);
        }

        let content = char_slice(text, start, end).to_string();
        if !content.trim().is_empty() {
            chunks.push(RawChunk {
                content,
                start_char: start,
                end_char: end,
                hierarchy_level: HierarchyLevel::Fine,
                parent_index: Some(root_index),
            });
        }

        if end >= len {
            break;
        }
        let next_start = end.saturating_sub(overlap);
        start = if next_start > start { next_start } else { end };
    }

    Ok(chunks.into_iter().map(Ok))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(it: impl Iterator<Item = Result<RawChunk, SegmenterError>>) -> Vec<RawChunk> {
        it.map(|r| r.unwrap()).collect()
    }

    #[test]
    fn empty_input_yields_single_root_chunk() {
        let chunks = collect(segment("", 200).unwrap());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].hierarchy_level, HierarchyLevel::Preview);
        assert_eq!(chunks[0].start_char, 0);
        assert_eq!(chunks[0].end_char, 0);
    }

    #[test]
    fn text_over_max_length_is_rejected() {
        let err = semantic_stream(&"a".repeat(MAX_TEXT_LENGTH + 1), 200).unwrap_err();
        assert!(matches!(err, SegmenterError::InputTooLarge { .. }));
    }

    #[test]
    fn every_chunk_has_valid_offsets_and_parent() {
        let text = "Intro\n\nSection A\n\nPara 1.\n\nPara 2.\n\nSection B\n\nPara 3.";
        let chunks = collect(segment(text, 200).unwrap());
        let len = char_len(text);
        for (i, c) in chunks.iter().enumerate() {
            assert!(c.start_char <= c.end_char);
            assert!(c.end_char <= len);
            if let Some(p) = c.parent_index {
                assert!(p < i);
                assert!(chunks[p].hierarchy_level < c.hierarchy_level);
            }
        }
    }

    #[test]
    fn scenario_ten_line_txt_produces_expected_shape() {
        let text = "Intro\n\nSection A\n\nPara 1.\n\nPara 2.\n\nSection B\n\nPara 3.";
        let chunks = collect(semantic_stream(text, 200).unwrap());
        let level1 = chunks
            .iter()
            .filter(|c| c.hierarchy_level == HierarchyLevel::Section)
            .count();
        let level2 = chunks
            .iter()
            .filter(|c| c.hierarchy_level == HierarchyLevel::Paragraph)
            .count();
        let level3 = chunks
            .iter()
            .filter(|c| c.hierarchy_level == HierarchyLevel::Fine)
            .count();
        assert!(level1 >= 1);
        assert!(level2 >= 1);
        assert_eq!(level3, 0, "short paragraphs stay below MIN_LEVEL3_LENGTH");
    }

    #[test]
    fn fallback_chunks_respect_max_chunk_size_target() {
        let text = "word ".repeat(20_000);
        let chunks = collect(fallback_stream(&text, 500).unwrap());
        assert!(chunks.len() > 1);
        for c in chunks.iter().skip(1) {
            assert!(c.end_char - c.start_char <= MAX_CHUNK_SIZE);
        }
    }

    #[test]
    fn total_emitted_chunks_never_exceeds_cap() {
        let text = "Para.\n\n".repeat(50_000);
        let chunks = collect(segment(&text, 100).unwrap());
        assert!(chunks.len() <= MAX_CHUNKS);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn arb_text() -> impl Strategy<Value = String> {
        proptest::collection::vec(
            prop_oneof![
                "[a-zA-Z0-9 ]{0,40}",
                Just("\n\n".to_string()),
                Just(".".to_string()),
                Just("# Heading\n".to_string()),
            ],
            0..60,
        )
        .prop_map(|parts| parts.concat())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Every chunk's offsets land on char boundaries and within bounds,
        /// and every parent_index strictly precedes its child with a
        /// shallower hierarchy level, for arbitrary input.
        #[test]
        fn chunks_have_valid_offsets_and_parent_chain(text in arb_text(), max_length in 50usize..600) {
            let chunks: Vec<RawChunk> = segment(&text, max_length)
                .unwrap()
                .map(|r| r.unwrap())
                .collect();
            let len = char_len(&text);

            prop_assert!(!chunks.is_empty());
            prop_assert!(chunks.len() <= MAX_CHUNKS);

            for (i, c) in chunks.iter().enumerate() {
                prop_assert!(c.start_char <= c.end_char);
                prop_assert!(c.end_char <= len);
                prop_assert_eq!(char_slice(&text, c.start_char, c.end_char).chars().count(), c.end_char - c.start_char);
                if let Some(p) = c.parent_index {
                    prop_assert!(p < i);
                    prop_assert!(chunks[p].hierarchy_level < c.hierarchy_level);
                }
            }
        }

        /// Segmenting never panics and never exceeds the chunk cap,
        /// regardless of how degenerate the input is.
        #[test]
        fn segmenting_never_exceeds_cap(text in arb_text(), max_length in 1usize..8000) {
            let chunks: Vec<_> = segment(&text, max_length).unwrap().collect();
            prop_assert!(chunks.len() <= MAX_CHUNKS);
        }
    }
}
