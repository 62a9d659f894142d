//! Per-call deadline enforcement.
//!
//! The call runs on its own task and is raced against a timer. When the timer
//! wins the caller gets [`CallOutcome::TimedOut`] straight away, and a reaper
//! task takes ownership of the abandoned call: it waits for the response, reads
//! its body to the end so the connection goes back to the pool, and aborts the
//! call if that takes longer than the drain timeout.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::proxy::{ForwardError, ProxyResponse};

/// Result of racing a call against its deadline.
#[derive(Debug)]
pub enum CallOutcome {
    Completed(Result<ProxyResponse, ForwardError>),
    TimedOut,
}

/// Run `call` with a deadline. Never waits for the drain of a timed-out call.
pub async fn run_with_deadline<F>(call: F, deadline: Duration, drain_timeout: Duration) -> CallOutcome
where
    F: Future<Output = Result<ProxyResponse, ForwardError>> + Send + 'static,
{
    let mut handle = tokio::spawn(call);

    match tokio::time::timeout(deadline, &mut handle).await {
        Ok(Ok(result)) => CallOutcome::Completed(result),
        Ok(Err(join_error)) => CallOutcome::Completed(Err(ForwardError::Aborted(join_error.to_string()))),
        Err(_) => {
            tokio::spawn(reap(handle, drain_timeout));
            CallOutcome::TimedOut
        }
    }
}

async fn reap(mut handle: JoinHandle<Result<ProxyResponse, ForwardError>>, drain_timeout: Duration) {
    let drained = tokio::time::timeout(drain_timeout, async {
        match (&mut handle).await {
            Ok(Ok(response)) => match response.discard_body().await {
                Ok(bytes) => tracing::debug!(bytes, "Drained late response"),
                Err(e) => tracing::debug!(error = %e, "Late response body failed while draining"),
            },
            Ok(Err(e)) => tracing::debug!(error = %e, "Abandoned call failed"),
            Err(e) => tracing::debug!(error = %e, "Abandoned call aborted"),
        }
    })
    .await;

    if drained.is_err() {
        tracing::warn!(
            drain_timeout_ms = drain_timeout.as_millis() as u64,
            "Abandoned call did not finish draining, aborting"
        );
        handle.abort();
    }
}
