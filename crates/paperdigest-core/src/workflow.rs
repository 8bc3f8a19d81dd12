//! One summarization invocation, from URL to cited summary.
//!
//! Every remote resource the workflow creates is recorded in a [`Held`]
//! ledger and released before [`Summarizer::summarize`] returns, whether the
//! main flow succeeded, failed, timed out, or was cancelled.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::citations::{self, Citation};
use crate::fetch::Fetcher;
use crate::model::{ChatMessage, ChatRequest, Usage};
use crate::service::HostedService;
use crate::{Config, CoreError, ProgressEvent, assistant, run, staging, store};

/// A finished summary ready for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub source_url: String,
    /// Generated text with citation markers substituted.
    pub text: String,
    pub citations: Vec<Citation>,
    pub usage: Option<Usage>,
    #[serde(serialize_with = "as_secs")]
    pub upload_time: Duration,
    #[serde(serialize_with = "as_secs")]
    pub run_time: Duration,
}

impl Summary {
    /// Text followed by the citation lines.
    pub fn rendered(&self) -> String {
        citations::render(&self.text, &self.citations)
    }
}

fn as_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

/// Reply from quick mode.
#[derive(Debug, Clone, Serialize)]
pub struct QuickReply {
    pub text: String,
    pub usage: Option<Usage>,
}

/// Remote resources created during one invocation.
#[derive(Debug, Default)]
struct Held {
    store: Option<String>,
    file: Option<String>,
    assistant: Option<String>,
}

impl Held {
    fn count(&self) -> usize {
        [&self.store, &self.file, &self.assistant]
            .iter()
            .filter(|r| r.is_some())
            .count()
    }

    /// Delete everything held. Every deletion is attempted; the first error is returned.
    async fn release<S: HostedService>(self, service: &S) -> Result<usize, CoreError> {
        let released = self.count();
        let mut first_err = None;

        if let Some(id) = &self.assistant {
            if let Err(e) = assistant::delete(service, id).await {
                log::warn!("cleanup: {}", e);
                first_err.get_or_insert(e);
            }
        }
        if let Some(id) = &self.store {
            if let Err(e) = store::delete_index(service, id).await {
                log::warn!("cleanup: {}", e);
                first_err.get_or_insert(e);
            }
        }
        if let Some(id) = &self.file {
            match service.delete_file(id).await {
                Ok(ack) if ack.deleted => log::info!("deleted file {}", id),
                Ok(_) => log::warn!("cleanup: service did not confirm deletion of file {}", id),
                Err(e) => log::warn!("cleanup: could not delete file {}: {}", id, e),
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(released),
        }
    }
}

/// Owns the service client and fetcher for a single invocation.
pub struct Summarizer<S, F> {
    service: S,
    fetcher: F,
    config: Config,
}

impl<S: HostedService, F: Fetcher> Summarizer<S, F> {
    pub fn new(service: S, fetcher: F, config: Config) -> Self {
        Self {
            service,
            fetcher,
            config,
        }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Fetch `url`, index it, summarize it, and clean up.
    ///
    /// Cleanup errors are surfaced only when the main flow succeeded;
    /// otherwise they are logged and the original error is returned.
    pub async fn summarize(
        &self,
        url: &str,
        cancel: &CancellationToken,
        progress: impl Fn(ProgressEvent),
    ) -> Result<Summary, CoreError> {
        let mut held = Held::default();
        let outcome = self.run_flow(url, cancel, &progress, &mut held).await;

        let released = held.release(&self.service).await;
        if let Ok(count @ 1..) = &released {
            progress(ProgressEvent::CleanedUp { released: *count });
        }

        match (outcome, released) {
            (Ok(summary), Ok(_)) => Ok(summary),
            (Ok(_), Err(cleanup)) => Err(cleanup),
            (Err(err), Err(cleanup)) => {
                progress(ProgressEvent::Warning {
                    message: format!("cleanup after failure also failed: {cleanup}"),
                });
                Err(err)
            }
            (Err(err), Ok(_)) => Err(err),
        }
    }

    async fn run_flow(
        &self,
        url: &str,
        cancel: &CancellationToken,
        progress: &impl Fn(ProgressEvent),
        held: &mut Held,
    ) -> Result<Summary, CoreError> {
        let cfg = &self.config;

        let document = self.fetcher.fetch(url).await?;
        progress(ProgressEvent::Fetched {
            url: document.url.clone(),
            bytes: document.bytes.len(),
        });

        let staged = staging::stage(&document.bytes, &cfg.scratch_dir)?;
        drop(document);
        progress(ProgressEvent::Staged {
            path: staged.path().to_path_buf(),
        });

        let created = store::create_index(
            &self.service,
            &cfg.store_name,
            cfg.store_expiry_days,
            |store_id| held.store = Some(store_id.to_string()),
        )
        .await;
        let index = match created {
            Ok(index) => index,
            Err(e) => {
                if let Err(rm) = staged.remove() {
                    log::warn!("{}", rm);
                }
                return Err(e);
            }
        };
        progress(ProgressEvent::IndexCreated {
            store_id: index.id.clone(),
        });

        let filename = display_filename(url);
        progress(ProgressEvent::Uploading {
            filename: filename.clone(),
        });
        let upload_started = Instant::now();
        let uploaded = store::upload(
            &self.service,
            &index.id,
            &staged,
            &filename,
            &cfg.poll,
            cancel,
            |file_id| held.file = Some(file_id.to_string()),
        )
        .await;
        // The staged copy goes away whether or not indexing succeeded.
        let removed = staged.remove();
        let indexed = uploaded?;
        removed?;
        let upload_time = upload_started.elapsed();
        progress(ProgressEvent::Uploaded {
            file_id: indexed.file_id.clone(),
            elapsed: upload_time,
        });

        let spec = assistant::spec_from_config(cfg);
        let created = assistant::create(&self.service, &spec, |assistant_id| {
            held.assistant = Some(assistant_id.to_string())
        })
        .await?;
        assistant::bind(&self.service, &created.id, &index.id).await?;
        progress(ProgressEvent::AssistantReady {
            assistant_id: created.id.clone(),
        });

        let run_started = Instant::now();
        let finished = run::start_and_wait(
            &self.service,
            &created.id,
            run::SUMMARY_PROMPT,
            &cfg.poll,
            cancel,
            |r| {
                progress(ProgressEvent::RunStarted {
                    run_id: r.id.clone(),
                    thread_id: r.thread_id.clone(),
                })
            },
        )
        .await?;
        let run_time = run_started.elapsed();
        progress(ProgressEvent::RunFinished {
            status: finished.status,
            elapsed: run_time,
        });
        let completed = run::require_completed(&self.service, finished).await?;

        let messages = self
            .service
            .list_messages(&completed.thread_id, &completed.id)
            .await?;
        let content = messages
            .data
            .iter()
            .filter(|m| m.role == "assistant")
            .find_map(|m| m.first_text())
            .ok_or_else(|| CoreError::RunNotCompleted {
                status: completed.status,
                reason: "run produced no assistant text".to_string(),
            })?;

        let marked = citations::mark(&content.value, &content.annotations);
        let filenames = self.resolve_filenames(&marked.pending).await?;
        let citations = citations::resolve(&marked.pending, &filenames);

        Ok(Summary {
            source_url: url.to_string(),
            text: marked.text,
            citations,
            usage: completed.usage,
            upload_time,
            run_time,
        })
    }

    async fn resolve_filenames(
        &self,
        pending: &[(usize, String)],
    ) -> Result<HashMap<String, String>, CoreError> {
        let mut names = HashMap::new();
        for file_id in citations::distinct_file_ids(pending) {
            let file = self.service.retrieve_file(file_id).await?;
            names.insert(file_id.to_string(), file.filename);
        }
        Ok(names)
    }

    /// Ask the chat model about `url` directly, without uploading anything.
    pub async fn quick_summary(&self, url: &str) -> Result<QuickReply, CoreError> {
        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: quick_prompt(url),
            }],
            max_tokens: self.config.quick_max_tokens,
            temperature: 0.0,
        };
        let completion = self.service.chat_completion(&request).await?;
        let text = completion
            .choices
            .into_iter()
            .find_map(|c| c.message.content)
            .unwrap_or_default();
        Ok(QuickReply {
            text,
            usage: completion.usage,
        })
    }

    /// Delete every vector store on the account.
    pub async fn purge_stores(&self, on_deleted: impl FnMut(&str)) -> Result<usize, CoreError> {
        store::purge_all(&self.service, on_deleted).await
    }
}

pub fn quick_prompt(url: &str) -> String {
    format!("この論文の要点をまとめてください: {url}")
}

/// Name to present the uploaded document under: the URL's last path segment,
/// with a `.pdf` extension added when missing.
pub fn display_filename(url: &str) -> String {
    let path = url
        .split(['?', '#'])
        .next()
        .unwrap_or(url)
        .trim_end_matches('/');
    let last = path
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty() && !s.contains(':'))
        .unwrap_or("document");
    if last.to_ascii_lowercase().ends_with(".pdf") {
        last.to_string()
    } else {
        format!("{last}.pdf")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_filename_from_arxiv_url() {
        assert_eq!(display_filename("https://arxiv.org/pdf/1902.10186"), "1902.10186.pdf");
        assert_eq!(display_filename("https://example.com/papers/paper.pdf?dl=1"), "paper.pdf");
        assert_eq!(display_filename("https://example.com/a/PAPER.PDF"), "PAPER.PDF");
        assert_eq!(display_filename("https://example.com/"), "example.com.pdf");
        assert_eq!(display_filename("https:"), "document.pdf");
    }

    #[test]
    fn quick_prompt_embeds_url() {
        assert_eq!(
            quick_prompt("https://arxiv.org/abs/2205.00976"),
            "この論文の要点をまとめてください: https://arxiv.org/abs/2205.00976"
        );
    }
}
