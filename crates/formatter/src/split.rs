//! Length-bounded splitting.
//!
//! Content is broken into pieces at the coarsest boundary that makes each piece
//! fit (section, then line, then markup-safe space, then character), and the
//! pieces are packed greedily into segments. Every piece remembers the separator
//! that preceded it, so the segments concatenate back to the exact input.

use crate::markup::Markup;
use crate::message::{Boundary, Segment};

/// Length as counted by the providers (UTF-16 code units).
pub fn text_len(text: &str) -> usize {
    text.encode_utf16().count()
}

struct Piece<'a> {
    text: &'a str,
    boundary: Boundary,
}

/// Split rendered sections into segments of at most `limit` units each.
///
/// `limit` must be at least 2 so a single character always fits.
pub fn split_sections(sections: &[String], limit: usize, markup: Markup) -> Vec<Segment> {
    let mut pieces = Vec::new();
    for (i, section) in sections.iter().enumerate() {
        let boundary = if i == 0 {
            Boundary::Start
        } else {
            Boundary::Section
        };
        break_section(section, boundary, limit, markup, &mut pieces);
    }
    pack(pieces, limit)
}

fn break_section<'a>(
    section: &'a str,
    boundary: Boundary,
    limit: usize,
    markup: Markup,
    out: &mut Vec<Piece<'a>>,
) {
    if text_len(section) <= limit {
        out.push(Piece {
            text: section,
            boundary,
        });
        return;
    }
    for (i, line) in section.split('\n').enumerate() {
        let boundary = if i == 0 { boundary } else { Boundary::Line };
        break_line(line, boundary, limit, markup, out);
    }
}

fn break_line<'a>(
    line: &'a str,
    boundary: Boundary,
    limit: usize,
    markup: Markup,
    out: &mut Vec<Piece<'a>>,
) {
    if text_len(line) <= limit {
        out.push(Piece {
            text: line,
            boundary,
        });
        return;
    }

    let mut start = 0;
    let mut first = true;
    let mut words = Vec::new();
    for at in markup.safe_breaks(line) {
        words.push(&line[start..at]);
        start = at + 1;
    }
    words.push(&line[start..]);

    for word in words {
        let boundary = if first { boundary } else { Boundary::Word };
        first = false;
        if text_len(word) <= limit {
            out.push(Piece {
                text: word,
                boundary,
            });
        } else {
            break_word(word, boundary, limit, markup, out);
        }
    }
}

/// Last resort: cut an oversized word at character boundaries. A Markdown
/// escape is never separated from the character it escapes.
fn break_word<'a>(
    word: &'a str,
    boundary: Boundary,
    limit: usize,
    markup: Markup,
    out: &mut Vec<Piece<'a>>,
) {
    let mut start = 0;
    let mut units = 0;
    let mut boundary = boundary;
    let mut pending_escape: Option<usize> = None;
    for (i, c) in word.char_indices() {
        let width = c.len_utf16();
        if units + width > limit {
            let cut = match pending_escape {
                Some(at) if at > start => at,
                _ => i,
            };
            out.push(Piece {
                text: &word[start..cut],
                boundary,
            });
            boundary = Boundary::Glue;
            start = cut;
            units = text_len(&word[cut..i]);
        }
        units += width;
        pending_escape = match (markup, c, pending_escape) {
            (Markup::Markdown, '\\', None) => Some(i),
            _ => None,
        };
    }
    out.push(Piece {
        text: &word[start..],
        boundary,
    });
}

fn pack(pieces: Vec<Piece<'_>>, limit: usize) -> Vec<Segment> {
    let mut segments: Vec<Segment> = Vec::new();
    let mut current: Option<(String, usize, Boundary)> = None;

    for piece in pieces {
        let piece_len = text_len(piece.text);
        match current.as_mut() {
            Some((text, len, _)) => {
                let sep = piece.boundary.separator();
                let joined = *len + text_len(sep) + piece_len;
                if joined <= limit {
                    text.push_str(sep);
                    text.push_str(piece.text);
                    *len = joined;
                    continue;
                }
                if let Some((text, _, boundary)) = current.take() {
                    segments.push(Segment { text, boundary });
                }
                current = Some((piece.text.to_string(), piece_len, piece.boundary));
            }
            None => current = Some((piece.text.to_string(), piece_len, piece.boundary)),
        }
    }

    if let Some((text, _, boundary)) = current {
        segments.push(Segment { text, boundary });
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reassemble(segments: &[Segment]) -> String {
        segments
            .iter()
            .map(|s| format!("{}{}", s.boundary.separator(), s.text))
            .collect()
    }

    #[test]
    fn test_fitting_content_is_one_segment() {
        let sections = vec!["header".to_string(), "body".to_string()];
        let segments = split_sections(&sections, 100, Markup::Plain);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].text, "header\n\nbody");
        assert_eq!(segments[0].boundary, Boundary::Start);
    }

    #[test]
    fn test_splits_between_sections_first() {
        let sections = vec!["a".repeat(30), "b".repeat(30), "c".repeat(30)];
        let segments = split_sections(&sections, 64, Markup::Plain);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].text, format!("{}\n\n{}", "a".repeat(30), "b".repeat(30)));
        assert_eq!(segments[1].boundary, Boundary::Section);
        assert_eq!(reassemble(&segments), sections.join("\n\n"));
    }

    #[test]
    fn test_oversized_section_splits_on_lines_then_words() {
        let long_line = vec!["word"; 30].join(" ");
        let section = format!("title\n{}\nend", long_line);
        let sections = vec![section.clone()];
        let segments = split_sections(&sections, 40, Markup::Plain);

        assert!(segments.len() > 1);
        for segment in &segments {
            assert!(text_len(&segment.text) <= 40);
            assert!(!segment.text.starts_with(' '));
        }
        assert!(segments.iter().any(|s| s.boundary == Boundary::Word));
        assert_eq!(reassemble(&segments), section);
    }

    #[test]
    fn test_markdown_spans_are_never_cut() {
        let line = format!("{} *bold words here* tail", "x ".repeat(10).trim_end());
        let segments = split_sections(&[line.clone()], 24, Markup::Markdown);
        assert!(segments.iter().any(|s| s.text == "*bold words here* tail"));
        assert_eq!(reassemble(&segments), line);
    }

    #[test]
    fn test_giant_word_is_glued_back() {
        let word = "é".repeat(25);
        let segments = split_sections(&[word.clone()], 10, Markup::Plain);
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[1].boundary, Boundary::Glue);
        assert_eq!(reassemble(&segments), word);
    }

    #[test]
    fn test_giant_word_keeps_markdown_escapes_whole() {
        let word = format!("{}\\_{}", "a".repeat(9), "b".repeat(20));
        let segments = split_sections(&[word.clone()], 10, Markup::Markdown);

        assert_eq!(segments[0].text, "a".repeat(9));
        assert!(segments[1].text.starts_with("\\_"));
        for segment in &segments {
            assert!(text_len(&segment.text) <= 10);
            assert!(!segment.text.ends_with('\\'));
        }
        assert_eq!(reassemble(&segments), word);

        // Plain text has no escapes and is cut at the limit.
        let plain = split_sections(&[word.clone()], 10, Markup::Plain);
        assert!(plain[0].text.ends_with('\\'));
    }
}
