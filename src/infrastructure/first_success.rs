//! First-success race
//!
//! Runs several equivalent fallible tasks at once and returns the first
//! one that succeeds. The remaining tasks are aborted.

use std::future::Future;
use tokio::task::JoinSet;

/// Race `tasks`, returning the index and value of the first success.
///
/// If every task fails, all their errors are returned in completion order.
/// A task that panics counts as failed and is only logged. Losers are
/// aborted before this returns.
pub async fn first_success<I, F, T, E>(tasks: I) -> Result<(usize, T), Vec<E>>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    let mut set = JoinSet::new();
    for (index, task) in tasks.into_iter().enumerate() {
        set.spawn(async move { (index, task.await) });
    }

    let mut failures = Vec::new();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((index, Ok(value))) => {
                set.abort_all();
                return Ok((index, value));
            }
            Ok((_, Err(e))) => failures.push(e),
            Err(e) => tracing::warn!("raced task did not complete: {}", e),
        }
    }
    Err(failures)
}
