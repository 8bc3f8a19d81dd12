//! The hosted AI service, seen as an opaque collaborator.

use std::path::Path;

use crate::CoreError;
use crate::model::{
    Assistant, AssistantSpec, ChatCompletion, ChatRequest, Deletion, FileObject, MessageList, Run,
    VectorStore, VectorStoreFile, VectorStoreList,
};

/// Operations the workflow consumes from the hosted assistants API.
///
/// [`OpenAiClient`](crate::OpenAiClient) talks to the real service; tests
/// substitute an in-memory fake.
#[allow(async_fn_in_trait)]
pub trait HostedService {
    // Vector stores
    async fn create_vector_store(
        &self,
        name: &str,
        expiry_days: u32,
    ) -> Result<VectorStore, CoreError>;
    async fn list_vector_stores(&self, after: Option<&str>) -> Result<VectorStoreList, CoreError>;
    async fn delete_vector_store(&self, store_id: &str) -> Result<Deletion, CoreError>;

    // Files
    /// Upload the file at `path`, presenting it to the service as `filename`.
    async fn upload_file(&self, path: &Path, filename: &str) -> Result<FileObject, CoreError>;
    async fn attach_file(
        &self,
        store_id: &str,
        file_id: &str,
    ) -> Result<VectorStoreFile, CoreError>;
    async fn get_store_file(
        &self,
        store_id: &str,
        file_id: &str,
    ) -> Result<VectorStoreFile, CoreError>;
    async fn retrieve_file(&self, file_id: &str) -> Result<FileObject, CoreError>;
    async fn delete_file(&self, file_id: &str) -> Result<Deletion, CoreError>;

    // Assistants
    async fn create_assistant(&self, spec: &AssistantSpec) -> Result<Assistant, CoreError>;
    async fn bind_vector_store(
        &self,
        assistant_id: &str,
        store_id: &str,
    ) -> Result<Assistant, CoreError>;
    async fn delete_assistant(&self, assistant_id: &str) -> Result<Deletion, CoreError>;

    // Threads and runs
    async fn create_thread_and_run(
        &self,
        assistant_id: &str,
        prompt: &str,
    ) -> Result<Run, CoreError>;
    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run, CoreError>;
    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<Run, CoreError>;
    async fn list_messages(&self, thread_id: &str, run_id: &str)
    -> Result<MessageList, CoreError>;

    // Chat completions
    async fn chat_completion(&self, request: &ChatRequest) -> Result<ChatCompletion, CoreError>;
}
