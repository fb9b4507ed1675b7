use std::future::Future;

use crate::{RemoteError, SyncOptions, remote::RemoteResult};

/// Run one remote call under the per-call deadline, retrying transient
/// failures with doubling backoff.
///
/// An expired deadline counts as a network failure.
pub(crate) async fn with_retry<T, F, Fut>(
    options: &SyncOptions,
    operation: &str,
    mut call: F,
) -> RemoteResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = RemoteResult<T>>,
{
    let deadline = options.remote_timeout();
    let mut attempt = 0;
    loop {
        let result = match tokio::time::timeout(deadline, call()).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Timeout(deadline)),
        };

        match result {
            Err(err) if err.is_transient() && attempt < options.max_retries => {
                attempt += 1;
                let delay = options.backoff(attempt);
                tracing::debug!(operation, attempt, ?delay, "retrying remote call: {err}");
                tokio::time::sleep(delay).await;
            }
            other => return other,
        }
    }
}
