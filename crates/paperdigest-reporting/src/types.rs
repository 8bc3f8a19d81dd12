use std::str::FromStr;

use paperdigest_core::{QuickReply, Summary, Usage};

/// Output format for a finished report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Text,
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Text => "txt",
            Self::Json => "json",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "txt" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown format '{other}' (expected text or json)")),
        }
    }
}

/// Anything the CLI can print or write.
#[derive(Debug, Clone, Copy)]
pub enum Report<'a> {
    Summary(&'a Summary),
    Quick { url: &'a str, reply: &'a QuickReply },
}

impl Report<'_> {
    pub fn usage(&self) -> Option<Usage> {
        match self {
            Report::Summary(s) => s.usage,
            Report::Quick { reply, .. } => reply.usage,
        }
    }
}
