//! Thread-and-run orchestration: start, wait for a terminal state, cancel.

use tokio_util::sync::CancellationToken;

use crate::model::{LastError, Run, RunStatus};
use crate::poll::{Poll, PollPolicy, poll_until};
use crate::service::HostedService;
use crate::CoreError;

/// Summarization prompt sent as the first user message of every thread.
pub const SUMMARY_PROMPT: &str = "\
アップロードされた論文を読み、以下の項目ごとに日本語でまとめてください。\n\
\n\
## 要約\n\
論文全体の内容を簡潔に説明してください。\n\
\n\
## 長所\n\
この研究の優れている点を挙げてください。\n\
\n\
## 短所\n\
この研究の弱点や限界を挙げてください。\n\
\n\
## 技術的な新規性\n\
既存研究と比べて新しい技術や手法は何かを説明してください。\n\
\n\
## 実験による評価\n\
どのような実験で、どのように有効性を検証したかを説明してください。\n";

/// Create a thread seeded with `prompt`, start a run, and wait until it is terminal.
///
/// `on_started` receives the run as soon as the service has created it. If
/// waiting is cut short by a timeout or cancellation, a cancel request is sent
/// for the still-active run before the error is returned.
pub async fn start_and_wait<S: HostedService>(
    service: &S,
    assistant_id: &str,
    prompt: &str,
    policy: &PollPolicy,
    cancel: &CancellationToken,
    mut on_started: impl FnMut(&Run),
) -> Result<Run, CoreError> {
    let run = service.create_thread_and_run(assistant_id, prompt).await?;
    on_started(&run);
    log::info!(
        "started run {} on thread {} ({})",
        run.id,
        run.thread_id,
        run.status
    );

    if run.status.is_terminal() {
        return Ok(run);
    }

    let what = format!("run {}", run.id);
    let (thread_id, run_id) = (run.thread_id.as_str(), run.id.as_str());
    let waited = poll_until(policy, cancel, &what, || async move {
        let current = service.get_run(thread_id, run_id).await?;
        Ok(if current.status.is_terminal() {
            Poll::Ready(current)
        } else {
            Poll::Pending
        })
    })
    .await;

    match waited {
        Ok(done) => Ok(done),
        Err(err @ (CoreError::Timeout { .. } | CoreError::Cancelled(_))) => {
            if let Err(cancel_err) = service.cancel_run(thread_id, run_id).await {
                log::warn!("could not cancel abandoned run {}: {}", run_id, cancel_err);
            }
            Err(err)
        }
        Err(err) => Err(err),
    }
}

/// Cancel a run whose terminal status is not `completed`.
///
/// The service must report a cancellation timestamp; a run that already
/// carries one is not cancelled again.
pub async fn cancel<S: HostedService>(service: &S, run: &Run) -> Result<Run, CoreError> {
    if run.cancelled_at.is_some() {
        return Ok(run.clone());
    }
    let ack = service
        .cancel_run(&run.thread_id, &run.id)
        .await
        .map_err(|e| CoreError::RunCancellation(format!("{}: {e}", run.id)))?;
    if ack.cancelled_at.is_none() {
        return Err(CoreError::RunCancellation(format!(
            "{}: no cancellation timestamp (status {})",
            run.id, ack.status
        )));
    }
    log::info!("cancelled run {}", run.id);
    Ok(ack)
}

/// Accept a completed run; cancel anything else and report why it ended.
pub async fn require_completed<S: HostedService>(service: &S, run: Run) -> Result<Run, CoreError> {
    if run.status == RunStatus::Completed {
        return Ok(run);
    }
    log::warn!("run {} ended with status {}", run.id, run.status);
    cancel(service, &run).await?;
    Err(CoreError::RunNotCompleted {
        status: run.status,
        reason: LastError::describe(run.last_error.as_ref()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_requests_every_section() {
        for heading in ["要約", "長所", "短所", "技術的な新規性", "実験による評価"] {
            assert!(
                SUMMARY_PROMPT.contains(&format!("## {heading}")),
                "missing section {heading}"
            );
        }
    }
}
