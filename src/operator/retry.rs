//! Retry and failure classification around a single UI operation.
//!
//! Transient faults are retried in place up to the budget and then re-tagged
//! as structural. Structural faults and `ConversationGone` pass straight
//! through: retrying a missing selector cannot succeed.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::error::Fault;

/// Retry budget for one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

/// Where an invocation stands within its retry budget. Scoped to one call of [`RetryPolicy::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryContext {
    /// 1-based attempt number.
    pub attempt: u32,
    pub max_attempts: u32,
}

impl RetryContext {
    pub fn is_last(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    /// Run `op` until it succeeds, fails non-transiently, or the budget runs out.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, Fault>
    where
        F: FnMut(RetryContext) -> Fut,
        Fut: Future<Output = Result<T, Fault>>,
    {
        let mut ctx = RetryContext {
            attempt: 1,
            max_attempts: self.max_attempts.max(1),
        };

        loop {
            match op(ctx).await {
                Ok(value) => {
                    if ctx.attempt > 1 {
                        debug!(operation, attempt = ctx.attempt, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(Fault::Transient { reason, .. }) if !ctx.is_last() => {
                    warn!(
                        operation,
                        attempt = ctx.attempt,
                        max_attempts = ctx.max_attempts,
                        %reason,
                        "Transient fault, retrying"
                    );
                    ctx.attempt += 1;
                }
                Err(Fault::Transient { reason, .. }) => {
                    error!(
                        operation,
                        attempts = ctx.max_attempts,
                        %reason,
                        "Retry budget exhausted, escalating"
                    );
                    return Err(Fault::structural(
                        operation,
                        format!(
                            "still failing after {} attempts: {reason}",
                            ctx.max_attempts
                        ),
                    ));
                }
                Err(fault) => return Err(fault),
            }
        }
    }
}

/// Await `fut` for at most `timeout`. Running out of time is a transient fault.
pub async fn bounded<T, Fut>(operation: &str, timeout: Duration, fut: Fut) -> Result<T, Fault>
where
    Fut: Future<Output = Result<T, Fault>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(Fault::transient(
            operation,
            format!("timed out after {timeout:?}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::conversation::ConversationId;

    #[tokio::test]
    async fn succeeds_on_third_attempt() {
        let calls = AtomicU32::new(0);
        let result = RetryPolicy::new(3)
            .run("read", |ctx| {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                assert_eq!(ctx.attempt, n);
                async move {
                    if n < 3 {
                        Err(Fault::transient("read", "stale element"))
                    } else {
                        Ok("ok")
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhaustion_escalates_to_structural() {
        let calls = AtomicU32::new(0);
        let result: Result<(), Fault> = RetryPolicy::new(3)
            .run("send", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(Fault::transient("send", "stale element")) }
            })
            .await;

        let fault = result.unwrap_err();
        assert!(fault.is_structural());
        assert_eq!(fault.operation(), Some("send"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn structural_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), Fault> = RetryPolicy::new(3)
            .run("poll", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(Fault::structural("poll", "no such element")) }
            })
            .await;
        assert!(result.unwrap_err().is_structural());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn conversation_gone_passes_through() {
        let result: Result<(), Fault> = RetryPolicy::default()
            .run("read", |_| async {
                Err(Fault::ConversationGone(ConversationId::from("c9")))
            })
            .await;
        assert_eq!(
            result.unwrap_err(),
            Fault::ConversationGone(ConversationId::from("c9"))
        );
    }

    #[tokio::test]
    async fn zero_budget_still_attempts_once() {
        let calls = AtomicU32::new(0);
        let _ = RetryPolicy { max_attempts: 0 }
            .run("read", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, Fault>(()) }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn bounded_timeout_is_transient() {
        let result: Result<(), Fault> = bounded(
            "poll",
            Duration::from_millis(10),
            std::future::pending(),
        )
        .await;
        assert!(result.unwrap_err().is_transient());
    }
}
