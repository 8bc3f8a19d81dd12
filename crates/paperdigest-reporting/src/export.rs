use std::fs;
use std::io;
use std::path::Path;

use serde_json::json;

use crate::types::{ExportFormat, Report};

/// Byte-order mark prepended to text files so editors pick UTF-8 for Japanese output.
const UTF8_BOM: &str = "\u{feff}";

/// Render a report in the given format.
pub fn render(report: &Report<'_>, format: ExportFormat) -> Result<String, serde_json::Error> {
    match format {
        ExportFormat::Text => Ok(render_text(report)),
        ExportFormat::Json => render_json(report),
    }
}

fn render_text(report: &Report<'_>) -> String {
    let mut out = match report {
        Report::Summary(summary) => summary.rendered(),
        Report::Quick { reply, .. } => reply.text.clone(),
    };
    if let Some(usage) = report.usage() {
        out.push_str(&format!("\n\nTotal tokens: {}", usage.total_tokens));
    }
    out.push('\n');
    out
}

fn render_json(report: &Report<'_>) -> Result<String, serde_json::Error> {
    let value = match report {
        Report::Summary(summary) => serde_json::to_value(summary)?,
        Report::Quick { url, reply } => json!({
            "source_url": url,
            "text": reply.text,
            "usage": reply.usage,
        }),
    };
    serde_json::to_string_pretty(&value)
}

/// Write a report to `path`, creating parent directories as needed.
///
/// Text output starts with a UTF-8 byte-order mark; JSON does not.
pub fn write_summary(path: &Path, report: &Report<'_>, format: ExportFormat) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let body = render(report, format).map_err(io::Error::other)?;
    let contents = match format {
        ExportFormat::Text => format!("{UTF8_BOM}{body}"),
        ExportFormat::Json => body,
    };
    fs::write(path, contents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use paperdigest_core::{Citation, QuickReply, Summary, Usage};
    use std::time::Duration;

    fn summary() -> Summary {
        Summary {
            source_url: "https://arxiv.org/pdf/1902.10186".into(),
            text: "## 要約\n注意機構は説明にならない[0]。[1]".into(),
            citations: vec![Citation {
                index: 0,
                filename: "paper.pdf".into(),
            }],
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
            upload_time: Duration::from_millis(2500),
            run_time: Duration::from_secs(12),
        }
    }

    #[test]
    fn text_has_citations_and_usage() {
        let s = summary();
        let out = render(&Report::Summary(&s), ExportFormat::Text).unwrap();
        assert_eq!(
            out,
            "## 要約\n注意機構は説明にならない[0]。[1]\n[0] paper.pdf\n\nTotal tokens: 15\n"
        );
    }

    #[test]
    fn json_contains_fields() {
        let s = summary();
        let out = render(&Report::Summary(&s), ExportFormat::Json).unwrap();
        let v: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["citations"][0]["filename"], "paper.pdf");
        assert_eq!(v["citations"][0]["index"], 0);
        assert_eq!(v["usage"]["total_tokens"], 15);
        assert_eq!(v["upload_time"], 2.5);
    }

    #[test]
    fn quick_reply_renders_text() {
        let reply = QuickReply {
            text: "要点です".into(),
            usage: None,
        };
        let report = Report::Quick {
            url: "https://arxiv.org/abs/2205.00976",
            reply: &reply,
        };
        assert_eq!(render(&report, ExportFormat::Text).unwrap(), "要点です\n");
        let json = render(&report, ExportFormat::Json).unwrap();
        assert!(json.contains("2205.00976"));
    }

    #[test]
    fn text_file_starts_with_bom() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/summary.txt");
        let s = summary();
        write_summary(&path, &Report::Summary(&s), ExportFormat::Text).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..3], &[0xEF, 0xBB, 0xBF]);
        let text = String::from_utf8(bytes[3..].to_vec()).unwrap();
        assert!(text.starts_with("## 要約"));
    }

    #[test]
    fn json_file_has_no_bom() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.json");
        let s = summary();
        write_summary(&path, &Report::Summary(&s), ExportFormat::Json).unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.starts_with('{'));
    }
}
