//! Citation marker substitution for generated text.
//!
//! Each annotation's literal span is replaced by a positional marker `[i]`,
//! where `i` is the annotation's zero-based position in the list. Every
//! occurrence of the span is replaced, not just the first. Annotations that
//! cite a file also yield a citation entry carrying the same index, so the
//! numbering of citation lines follows the annotation list rather than being
//! renumbered among file citations.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::model::Annotation;

/// Text with markers substituted, plus the file IDs still to be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marked {
    pub text: String,
    /// `(annotation index, file ID)` for each annotation carrying a file citation.
    pub pending: Vec<(usize, String)>,
}

/// A resolved citation line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Citation {
    pub index: usize,
    pub filename: String,
}

impl fmt::Display for Citation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.index, self.filename)
    }
}

/// Substitute markers for annotation spans, in annotation order.
///
/// Empty spans are skipped for replacement (replacing `""` would insert a
/// marker between every character) but still contribute a citation entry.
pub fn mark(text: &str, annotations: &[Annotation]) -> Marked {
    let mut out = text.to_string();
    let mut pending = Vec::new();

    for (index, annotation) in annotations.iter().enumerate() {
        if !annotation.text.is_empty() {
            out = out.replace(&annotation.text, &format!("[{index}]"));
        }
        if let Some(citation) = &annotation.file_citation {
            pending.push((index, citation.file_id.clone()));
        }
    }

    Marked { text: out, pending }
}

/// Distinct file IDs in first-seen order.
pub fn distinct_file_ids(pending: &[(usize, String)]) -> Vec<&str> {
    let mut seen = Vec::new();
    for (_, id) in pending {
        if !seen.contains(&id.as_str()) {
            seen.push(id.as_str());
        }
    }
    seen
}

/// Attach filenames to pending citations. IDs missing from `filenames` are
/// shown as the raw file ID.
pub fn resolve(pending: &[(usize, String)], filenames: &HashMap<String, String>) -> Vec<Citation> {
    pending
        .iter()
        .map(|(index, file_id)| Citation {
            index: *index,
            filename: filenames
                .get(file_id)
                .cloned()
                .unwrap_or_else(|| file_id.clone()),
        })
        .collect()
}

/// Text followed by the newline-joined citation lines.
pub fn render(text: &str, citations: &[Citation]) -> String {
    if citations.is_empty() {
        return text.to_string();
    }
    let lines: Vec<String> = citations.iter().map(Citation::to_string).collect();
    format!("{}\n{}", text, lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FileCitation;

    fn ann(text: &str, file_id: Option<&str>) -> Annotation {
        Annotation {
            text: text.to_string(),
            file_citation: file_id.map(|id| FileCitation {
                file_id: id.to_string(),
            }),
            start_index: None,
            end_index: None,
        }
    }

    #[test]
    fn marks_spans_and_keeps_annotation_index() {
        let text = "Attention is all you need【4:0†source】. Results improve【4:1†source】.";
        let annotations = [ann("【4:0†source】", None), ann("【4:1†source】", Some("file-paper"))];
        let marked = mark(text, &annotations);
        assert_eq!(marked.text, "Attention is all you need[0]. Results improve[1].");
        assert_eq!(marked.pending, vec![(1, "file-paper".to_string())]);

        let names = HashMap::from([("file-paper".to_string(), "paper.pdf".to_string())]);
        let citations = resolve(&marked.pending, &names);
        assert_eq!(render("x", &citations), "x\n[1] paper.pdf");
    }

    #[test]
    fn citation_count_matches_file_citations() {
        let annotations = [
            ann("<a>", Some("f1")),
            ann("<b>", None),
            ann("<c>", Some("f2")),
            ann("<d>", Some("f1")),
        ];
        let marked = mark("<a> <b> <c> <d>", &annotations);
        let with_file = annotations.iter().filter(|a| a.file_citation.is_some()).count();
        assert_eq!(marked.pending.len(), with_file);
        assert_eq!(distinct_file_ids(&marked.pending), vec!["f1", "f2"]);
    }

    #[test]
    fn markers_increase_for_ordered_annotations() {
        let annotations: Vec<Annotation> = (0..12).map(|i| ann(&format!("<src{i}>"), None)).collect();
        let text: String = (0..12).map(|i| format!("claim {i} <src{i}> ")).collect();
        let marked = mark(&text, &annotations);

        let mut last = None;
        for i in 0..12 {
            let pos = marked.text.find(&format!("[{i}]")).expect("marker present");
            if let Some(prev) = last {
                assert!(pos > prev, "marker [{i}] out of order");
            }
            last = Some(pos);
        }
    }

    #[test]
    fn markers_follow_annotation_order_not_text_position() {
        let annotations = vec![ann("<late>", Some("f1")), ann("<early>", Some("f2"))];
        let marked = mark("first <early> then <late>", &annotations);
        assert_eq!(marked.text, "first [1] then [0]");
        assert_eq!(
            marked.pending,
            vec![(0, "f1".to_string()), (1, "f2".to_string())]
        );
    }

    #[test]
    fn repeated_span_is_replaced_everywhere() {
        let marked = mark("a†1 b†1 c", &[ann("†1", Some("f"))]);
        assert_eq!(marked.text, "a[0] b[0] c");
        assert_eq!(marked.pending.len(), 1);
    }

    #[test]
    fn rerun_on_processed_text_is_noop() {
        let annotations = [ann("【1】", Some("f")), ann("【2】", None)];
        let once = mark("x【1】 y【2】", &annotations);
        let twice = mark(&once.text, &annotations);
        assert_eq!(once.text, twice.text);
    }

    #[test]
    fn empty_span_is_not_substituted() {
        let marked = mark("abc", &[ann("", Some("f"))]);
        assert_eq!(marked.text, "abc");
        assert_eq!(marked.pending, vec![(0, "f".to_string())]);
    }

    #[test]
    fn unresolved_file_falls_back_to_id() {
        let citations = resolve(&[(3, "file-x".to_string())], &HashMap::new());
        assert_eq!(citations[0].to_string(), "[3] file-x");
    }

    #[test]
    fn render_without_citations_is_plain_text() {
        assert_eq!(render("summary", &[]), "summary");
    }
}
