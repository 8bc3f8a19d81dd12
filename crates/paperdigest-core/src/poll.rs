//! Bounded exponential-backoff polling shared by upload and run waiting.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::CoreError;

/// Outcome of a single probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Poll<T> {
    Pending,
    Ready(T),
}

/// How often and for how long to poll a remote job.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: u32,
    /// Upper bound on jitter added to each delay.
    pub jitter: Duration,
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(16),
            multiplier: 2,
            jitter: Duration::from_millis(250),
            timeout: Duration::from_secs(15 * 60),
        }
    }
}

impl PollPolicy {
    /// Delay before the probe numbered `attempt` (zero-based), without jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1).saturating_pow(attempt.min(16));
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    fn jittered(&self, attempt: u32) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let extra = if jitter_ms == 0 {
            0
        } else {
            fastrand::u64(0..=jitter_ms)
        };
        self.delay_for(attempt) + Duration::from_millis(extra)
    }
}

/// Call `probe` until it reports [`Poll::Ready`].
///
/// Sleeps between probes with bounded exponential backoff. Fails with
/// [`CoreError::Timeout`] once `policy.timeout` has elapsed, and with
/// [`CoreError::Cancelled`] as soon as `cancel` fires. Probe errors are
/// returned immediately; there are no retries.
pub async fn poll_until<T, F, Fut>(
    policy: &PollPolicy,
    cancel: &CancellationToken,
    what: &str,
    mut probe: F,
) -> Result<T, CoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Poll<T>, CoreError>>,
{
    let started = Instant::now();
    let mut attempt: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled(what.to_string()));
        }

        if let Poll::Ready(value) = probe().await? {
            return Ok(value);
        }

        let elapsed = started.elapsed();
        if elapsed >= policy.timeout {
            return Err(CoreError::Timeout {
                what: what.to_string(),
                elapsed,
            });
        }

        let delay = policy
            .jittered(attempt)
            .min(policy.timeout.saturating_sub(elapsed));
        log::debug!(
            "{}: still pending after {:.1}s, next probe in {:.1}s",
            what,
            elapsed.as_secs_f64(),
            delay.as_secs_f64()
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CoreError::Cancelled(what.to_string())),
            _ = tokio::time::sleep(delay) => {}
        }
        attempt = attempt.saturating_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn no_jitter(timeout: Duration) -> PollPolicy {
        PollPolicy {
            jitter: Duration::ZERO,
            timeout,
            ..PollPolicy::default()
        }
    }

    #[test]
    fn delay_grows_and_caps() {
        let policy = PollPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(8));
        assert_eq!(policy.delay_for(4), Duration::from_secs(16));
        assert_eq!(policy.delay_for(10), Duration::from_secs(16));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(16));
    }

    #[tokio::test(start_paused = true)]
    async fn returns_once_ready() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let value = poll_until(&no_jitter(Duration::from_secs(60)), &cancel, "job", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                Ok(if n < 3 { Poll::Pending } else { Poll::Ready(n) })
            }
        })
        .await
        .unwrap();
        assert_eq!(value, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_when_never_ready() {
        let cancel = CancellationToken::new();
        let err = poll_until(&no_jitter(Duration::from_secs(10)), &cancel, "run r1", || async {
            Ok(Poll::<()>::Pending)
        })
        .await
        .unwrap_err();
        match err {
            CoreError::Timeout { what, elapsed } => {
                assert_eq!(what, "run r1");
                assert!(elapsed >= Duration::from_secs(10));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_polling() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let calls = AtomicU32::new(0);
        let err = poll_until(&no_jitter(Duration::from_secs(600)), &cancel, "upload", || {
            if calls.fetch_add(1, Ordering::SeqCst) == 2 {
                trigger.cancel();
            }
            async { Ok(Poll::<()>::Pending) }
        })
        .await
        .unwrap_err();
        assert!(matches!(err, CoreError::Cancelled(ref w) if w == "upload"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn probe_error_is_not_retried() {
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);
        let err = poll_until(&no_jitter(Duration::from_secs(60)), &cancel, "job", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err::<Poll<()>, _>(CoreError::Service {
                    status: 500,
                    message: "boom".into(),
                })
            }
        })
        .await
        .unwrap_err();
        assert!(matches!(err, CoreError::Service { status: 500, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
