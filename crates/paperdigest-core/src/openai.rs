//! [`HostedService`] implementation for the OpenAI assistants (v2) API.

use std::path::Path;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::model::{
    Assistant, AssistantSpec, ChatCompletion, ChatRequest, Deletion, FileObject, MessageList, Run,
    VectorStore, VectorStoreFile, VectorStoreList,
};
use crate::service::HostedService;
use crate::{Config, CoreError};

const ASSISTANTS_BETA: &str = "assistants=v2";

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiClient {
    pub fn new(config: &Config) -> Result<Self, CoreError> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, self.url(path))
            .bearer_auth(&self.api_key)
            .header("OpenAI-Beta", ASSISTANTS_BETA)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, CoreError> {
        send(self.request(reqwest::Method::GET, path)).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, CoreError> {
        send(self.request(reqwest::Method::POST, path).json(body)).await
    }

    async fn delete(&self, path: &str) -> Result<Deletion, CoreError> {
        send(self.request(reqwest::Method::DELETE, path)).await
    }
}

async fn send<T: DeserializeOwned>(req: reqwest::RequestBuilder) -> Result<T, CoreError> {
    let resp = req.send().await?;
    let status = resp.status();
    let body = resp.text().await?;
    if !status.is_success() {
        return Err(CoreError::Service {
            status: status.as_u16(),
            message: error_message(&body),
        });
    }
    Ok(serde_json::from_str(&body)?)
}

/// Pull `error.message` out of an API error body, falling back to the raw text.
pub fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                "empty response body".to_string()
            } else {
                trimmed.chars().take(500).collect()
            }
        })
}

impl HostedService for OpenAiClient {
    async fn create_vector_store(
        &self,
        name: &str,
        expiry_days: u32,
    ) -> Result<VectorStore, CoreError> {
        let body = json!({
            "name": name,
            "expires_after": { "anchor": "last_active_at", "days": expiry_days },
        });
        self.post("vector_stores", &body).await
    }

    async fn list_vector_stores(&self, after: Option<&str>) -> Result<VectorStoreList, CoreError> {
        match after {
            Some(cursor) => {
                self.get(&format!("vector_stores?limit=100&after={cursor}"))
                    .await
            }
            None => self.get("vector_stores?limit=100").await,
        }
    }

    async fn delete_vector_store(&self, store_id: &str) -> Result<Deletion, CoreError> {
        self.delete(&format!("vector_stores/{store_id}")).await
    }

    async fn upload_file(&self, path: &Path, filename: &str) -> Result<FileObject, CoreError> {
        let bytes = tokio::fs::read(path).await?;
        let part = Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str("application/pdf")?;
        let form = Form::new().text("purpose", "assistants").part("file", part);
        send(self.request(reqwest::Method::POST, "files").multipart(form)).await
    }

    async fn attach_file(
        &self,
        store_id: &str,
        file_id: &str,
    ) -> Result<VectorStoreFile, CoreError> {
        self.post(
            &format!("vector_stores/{store_id}/files"),
            &json!({ "file_id": file_id }),
        )
        .await
    }

    async fn get_store_file(
        &self,
        store_id: &str,
        file_id: &str,
    ) -> Result<VectorStoreFile, CoreError> {
        self.get(&format!("vector_stores/{store_id}/files/{file_id}"))
            .await
    }

    async fn retrieve_file(&self, file_id: &str) -> Result<FileObject, CoreError> {
        self.get(&format!("files/{file_id}")).await
    }

    async fn delete_file(&self, file_id: &str) -> Result<Deletion, CoreError> {
        self.delete(&format!("files/{file_id}")).await
    }

    async fn create_assistant(&self, spec: &AssistantSpec) -> Result<Assistant, CoreError> {
        self.post("assistants", spec).await
    }

    async fn bind_vector_store(
        &self,
        assistant_id: &str,
        store_id: &str,
    ) -> Result<Assistant, CoreError> {
        let body = json!({
            "tool_resources": { "file_search": { "vector_store_ids": [store_id] } },
        });
        self.post(&format!("assistants/{assistant_id}"), &body).await
    }

    async fn delete_assistant(&self, assistant_id: &str) -> Result<Deletion, CoreError> {
        self.delete(&format!("assistants/{assistant_id}")).await
    }

    async fn create_thread_and_run(
        &self,
        assistant_id: &str,
        prompt: &str,
    ) -> Result<Run, CoreError> {
        let body = json!({
            "assistant_id": assistant_id,
            "thread": { "messages": [ { "role": "user", "content": prompt } ] },
        });
        self.post("threads/runs", &body).await
    }

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run, CoreError> {
        self.get(&format!("threads/{thread_id}/runs/{run_id}")).await
    }

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<Run, CoreError> {
        self.post(
            &format!("threads/{thread_id}/runs/{run_id}/cancel"),
            &json!({}),
        )
        .await
    }

    async fn list_messages(
        &self,
        thread_id: &str,
        run_id: &str,
    ) -> Result<MessageList, CoreError> {
        self.get(&format!(
            "threads/{thread_id}/messages?run_id={run_id}&order=desc"
        ))
        .await
    }

    async fn chat_completion(&self, request: &ChatRequest) -> Result<ChatCompletion, CoreError> {
        self.post("chat/completions", request).await
    }
}
