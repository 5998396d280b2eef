//! Bounded-concurrency part dispatch.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::Range;

/// Runs `process` over every range from `ranges`, at most `jobs` at a time.
///
/// `ranges` is pulled only from the calling task, in order, and only when a
/// worker slot is free. A failing range is logged with its range and is not
/// retried; sibling ranges keep running. Returns once every dispatched range
/// has finished. Failures are not reported to the caller: the owning
/// coordinator's final verification is what catches a missing or corrupt
/// part.
///
/// `jobs` is clamped to `1..=Semaphore::MAX_PERMITS`.
pub async fn dispatch<I, F, Fut, E>(operation: &'static str, jobs: usize, ranges: I, process: F)
where
    I: IntoIterator<Item = Range>,
    F: Fn(Range) -> Fut,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let limiter = Arc::new(Semaphore::new(jobs.clamp(1, Semaphore::MAX_PERMITS)));
    let mut tasks = JoinSet::new();
    let mut ranges = ranges.into_iter();

    loop {
        let Ok(permit) = limiter.clone().acquire_owned().await else {
            break;
        };
        let Some(range) = ranges.next() else {
            break;
        };

        let fut = process(range);
        tasks.spawn(async move {
            debug!(operation, %range, "start processing part");
            match fut.await {
                Ok(()) => debug!(operation, %range, "finish processing part"),
                Err(e) => warn!(operation, %range, error = %e, "error processing part"),
            }
            drop(permit);
        });

        while let Some(joined) = tasks.try_join_next() {
            log_join(operation, joined);
        }
    }

    while let Some(joined) = tasks.join_next().await {
        log_join(operation, joined);
    }
}

fn log_join(operation: &'static str, joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        error!(operation, error = %e, "part task did not complete");
    }
}
