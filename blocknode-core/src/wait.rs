//! Bounded polling with cooperative cancellation
//!
//! Cluster state changes (a claim binding, a pod becoming ready, a pod going
//! away) are observed by polling. Every wait has a deadline and stops early
//! when its [`CancellationToken`] fires; it never retries past the deadline.

use crate::collaborators::CollaboratorError;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Default interval between polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Default deadline for cluster waits
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(300);

/// Calls `check` until it returns `Ok(true)`.
///
/// Returns [`CollaboratorError::Timeout`] once `timeout` has elapsed without
/// success, [`CollaboratorError::Cancelled`] as soon as `cancel` fires, and
/// propagates the first error `check` returns. A `timeout` too large to
/// represent as a deadline waits until success or cancellation.
pub async fn poll_until<F, Fut>(
    what: &str,
    timeout: Duration,
    interval: Duration,
    cancel: &CancellationToken,
    mut check: F,
) -> Result<(), CollaboratorError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, CollaboratorError>>,
{
    let deadline = Instant::now().checked_add(timeout);

    loop {
        if cancel.is_cancelled() {
            return Err(CollaboratorError::Cancelled(what.to_string()));
        }

        if check().await? {
            return Ok(());
        }

        let pause = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return Err(CollaboratorError::Timeout {
                        what: what.to_string(),
                        timeout,
                    });
                }
                log::debug!("waiting for {} ({}ms left)", what, (deadline - now).as_millis());
                interval.min(deadline - now)
            }
            None => {
                log::debug!("waiting for {}", what);
                interval
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => {
                return Err(CollaboratorError::Cancelled(what.to_string()));
            }
            _ = tokio::time::sleep(pause) => {}
        }
    }
}
