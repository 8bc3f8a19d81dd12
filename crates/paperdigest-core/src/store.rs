//! Vector store lifecycle: create, upload-and-wait, delete, purge.

use tokio_util::sync::CancellationToken;

use crate::model::{IndexStatus, LastError, VectorStore, VectorStoreFile};
use crate::poll::{Poll, PollPolicy, poll_until};
use crate::service::HostedService;
use crate::staging::StagedFile;
use crate::CoreError;

/// Create a vector store that expires after `expiry_days` of inactivity.
///
/// `on_created` receives the store ID before its status is checked, so a store
/// the service created in a dead state can still be deleted by the caller.
pub async fn create_index<S: HostedService>(
    service: &S,
    name: &str,
    expiry_days: u32,
    mut on_created: impl FnMut(&str),
) -> Result<VectorStore, CoreError> {
    let store = service
        .create_vector_store(name, expiry_days)
        .await
        .map_err(|e| CoreError::IndexCreation(e.to_string()))?;
    on_created(&store.id);

    if matches!(store.status, IndexStatus::Expired | IndexStatus::Failed) {
        return Err(CoreError::IndexCreation(format!(
            "store {} reported status {}",
            store.id, store.status
        )));
    }

    log::info!("created vector store {} ({})", store.id, store.status);
    Ok(store)
}

/// Identifiers of a file that finished indexing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedFile {
    pub file_id: String,
    pub filename: String,
}

/// Upload `staged` into the store and wait until indexing leaves `in_progress`.
///
/// `on_uploaded` is called with the new file ID as soon as the service has
/// accepted the bytes, so callers can track the remote file for cleanup even
/// when indexing later fails.
pub async fn upload<S: HostedService>(
    service: &S,
    store_id: &str,
    staged: &StagedFile,
    filename: &str,
    policy: &PollPolicy,
    cancel: &CancellationToken,
    mut on_uploaded: impl FnMut(&str),
) -> Result<IndexedFile, CoreError> {
    let file = service.upload_file(staged.path(), filename).await?;
    on_uploaded(&file.id);
    log::info!("uploaded {} as {}", filename, file.id);

    let attached = service.attach_file(store_id, &file.id).await?;
    let what = format!("indexing of {} in {}", file.id, store_id);
    let file_id = file.id.as_str();
    let finished = match attached.status {
        IndexStatus::InProgress => {
            poll_until(policy, cancel, &what, || async move {
                let current = service.get_store_file(store_id, file_id).await?;
                Ok(if current.status == IndexStatus::InProgress {
                    Poll::Pending
                } else {
                    Poll::Ready(current)
                })
            })
            .await?
        }
        _ => attached,
    };

    check_indexed(&finished)?;
    Ok(IndexedFile {
        file_id: file.id,
        filename: file.filename,
    })
}

fn check_indexed(file: &VectorStoreFile) -> Result<(), CoreError> {
    if file.status == IndexStatus::Completed {
        Ok(())
    } else {
        Err(CoreError::Upload {
            status: file.status.to_string(),
            reason: LastError::describe(file.last_error.as_ref()),
        })
    }
}

/// Delete a vector store; the service must confirm the deletion.
pub async fn delete_index<S: HostedService>(service: &S, store_id: &str) -> Result<(), CoreError> {
    let ack = service
        .delete_vector_store(store_id)
        .await
        .map_err(|e| CoreError::IndexDeletion(format!("{store_id}: {e}")))?;
    if !ack.deleted {
        return Err(CoreError::IndexDeletion(format!(
            "{store_id}: service did not confirm deletion"
        )));
    }
    log::info!("deleted vector store {}", store_id);
    Ok(())
}

/// Delete every vector store on the account. Returns the number deleted.
///
/// Stops at the first store that cannot be deleted.
pub async fn purge_all<S: HostedService>(
    service: &S,
    mut on_deleted: impl FnMut(&str),
) -> Result<usize, CoreError> {
    let mut ids = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let page = service.list_vector_stores(cursor.as_deref()).await?;
        ids.extend(page.data.iter().map(|s| s.id.clone()));
        match (page.has_more, page.last_id) {
            (true, Some(last)) => cursor = Some(last),
            _ => break,
        }
    }

    for id in &ids {
        delete_index(service, id).await?;
        on_deleted(id);
    }
    log::info!("purged {} vector stores", ids.len());
    Ok(ids.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_file(status: IndexStatus, last_error: Option<LastError>) -> VectorStoreFile {
        VectorStoreFile {
            id: "file-1".into(),
            status,
            last_error,
        }
    }

    #[test]
    fn completed_file_is_indexed() {
        assert!(check_indexed(&store_file(IndexStatus::Completed, None)).is_ok());
    }

    #[test]
    fn failed_file_reports_reason() {
        let err = check_indexed(&store_file(
            IndexStatus::Failed,
            Some(LastError {
                code: Some("unsupported_file".into()),
                message: Some("not a PDF".into()),
            }),
        ))
        .unwrap_err();
        match err {
            CoreError::Upload { status, reason } => {
                assert_eq!(status, "failed");
                assert_eq!(reason, "unsupported_file: not a PDF");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn cancelled_file_is_not_indexed() {
        assert!(matches!(
            check_indexed(&store_file(IndexStatus::Cancelled, None)),
            Err(CoreError::Upload { .. })
        ));
    }
}
