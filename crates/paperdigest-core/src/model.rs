//! Wire types for the hosted assistants API.
//!
//! Only the fields the workflow reads are modelled; unknown fields are ignored.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Status of a vector store, or of a file attached to one.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexStatus {
    InProgress,
    Completed,
    Failed,
    Cancelled,
    Expired,
    #[serde(other)]
    Unknown,
}

impl IndexStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for IndexStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VectorStore {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub status: IndexStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VectorStoreList {
    pub data: Vec<VectorStore>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub last_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LastError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl LastError {
    pub fn describe(err: Option<&LastError>) -> String {
        match err {
            Some(LastError {
                code: Some(code),
                message: Some(message),
            }) => format!("{code}: {message}"),
            Some(LastError {
                message: Some(message),
                ..
            }) => message.clone(),
            Some(LastError {
                code: Some(code), ..
            }) => code.clone(),
            _ => "no error reported".to_string(),
        }
    }
}

/// A file attached to a vector store.
#[derive(Debug, Clone, Deserialize)]
pub struct VectorStoreFile {
    pub id: String,
    pub status: IndexStatus,
    #[serde(default)]
    pub last_error: Option<LastError>,
}

/// A file object held by the service.
#[derive(Debug, Clone, Deserialize)]
pub struct FileObject {
    pub id: String,
    pub filename: String,
    #[serde(default)]
    pub bytes: Option<u64>,
}

/// Acknowledgement returned by every DELETE endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Deletion {
    pub id: String,
    #[serde(default)]
    pub deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Tool {
    FileSearch,
    CodeInterpreter,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileSearchResources {
    #[serde(default)]
    pub vector_store_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolResources {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_search: Option<FileSearchResources>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Assistant {
    pub id: String,
    pub model: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tools: Vec<Tool>,
    #[serde(default)]
    pub tool_resources: Option<ToolResources>,
}

impl Assistant {
    /// Vector stores the assistant's file search tool is bound to.
    pub fn bound_stores(&self) -> &[String] {
        self.tool_resources
            .as_ref()
            .and_then(|r| r.file_search.as_ref())
            .map(|fs| fs.vector_store_ids.as_slice())
            .unwrap_or(&[])
    }
}

/// Parameters for creating an assistant.
#[derive(Debug, Clone, Serialize)]
pub struct AssistantSpec {
    pub model: String,
    pub name: String,
    pub instructions: String,
    pub tools: Vec<Tool>,
}

/// Lifecycle status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Incomplete,
    Expired,
    /// A status this client does not know; polled like a pending one.
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Cancelled | Self::Failed | Self::Completed | Self::Incomplete | Self::Expired
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::RequiresAction => "requires_action",
            Self::Cancelling => "cancelling",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
            Self::Completed => "completed",
            Self::Incomplete => "incomplete",
            Self::Expired => "expired",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Run {
    pub id: String,
    pub thread_id: String,
    pub assistant_id: String,
    pub status: RunStatus,
    #[serde(default)]
    pub cancelled_at: Option<u64>,
    #[serde(default)]
    pub last_error: Option<LastError>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileCitation {
    pub file_id: String,
}

/// A span of generated text pointing at a source.
#[derive(Debug, Clone, Deserialize)]
pub struct Annotation {
    pub text: String,
    #[serde(default)]
    pub file_citation: Option<FileCitation>,
    #[serde(default)]
    pub start_index: Option<usize>,
    #[serde(default)]
    pub end_index: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextContent {
    pub value: String,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text { text: TextContent },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: String,
    #[serde(default)]
    pub content: Vec<MessageContent>,
}

impl Message {
    /// The first text block of the message, if any.
    pub fn first_text(&self) -> Option<&TextContent> {
        self.content.iter().find_map(|c| match c {
            MessageContent::Text { text } => Some(text),
            MessageContent::Other => None,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageList {
    pub data: Vec<Message>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    pub message: ChatChoiceMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletion {
    pub choices: Vec<ChatChoice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}
