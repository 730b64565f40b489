// src/core/pool.rs — Bounded worker pool shared by all three orchestrators

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::infra::errors::PipelineError;

/// Map `task` over `items` with at most `workers` tasks in flight.
///
/// Each item's outcome is independent: a failing (or panicking) task becomes
/// an `Err` outcome and never aborts the batch, and every submitted task's
/// outcome is observed. `on_done` fires as each task completes, with a
/// running count against the total. Outcomes are returned in completion
/// order, not submission order — callers needing stable order must re-sort
/// by ID after collection.
pub async fn run_pool<T, R, F, Fut>(
    items: Vec<T>,
    workers: usize,
    task: F,
    mut on_done: impl FnMut(usize, usize, &Result<R, PipelineError>),
) -> Result<Vec<Result<R, PipelineError>>, PipelineError>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(usize, T) -> Fut,
    Fut: Future<Output = Result<R, PipelineError>> + Send + 'static,
{
    let workers = workers.max(1);
    let total = items.len();
    let sem = Arc::new(Semaphore::new(workers));
    let mut join_set = JoinSet::new();

    for (index, item) in items.into_iter().enumerate() {
        let permit = sem
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| anyhow::anyhow!("worker pool semaphore closed: {e}"))?;
        let fut = task(index, item);
        join_set.spawn(async move {
            let _permit = permit;
            fut.await
        });
    }

    let mut outcomes = Vec::with_capacity(total);
    while let Some(res) = join_set.join_next().await {
        let outcome = match res {
            Ok(r) => r,
            Err(e) => Err(PipelineError::Other(anyhow::anyhow!("task panicked: {e}"))),
        };
        on_done(outcomes.len() + 1, total, &outcome);
        outcomes.push(outcome);
    }

    Ok(outcomes)
}
