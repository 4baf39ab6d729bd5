//! Concurrency scheduler for part uploads
//!
//! Parts are admitted in index order as permits free up, so at most
//! `concurrency` part tasks are in flight. The first failure is returned and
//! the remaining in-flight tasks are aborted when the `JoinSet` drops.
//!
//! Aborting siblings is deliberate: they are not left running to finish on
//! their own after the upload has already failed.

use super::plan::{PartBoundary, PartResult};
use super::progress::{ProgressReporter, ProgressTracker};
use super::UploadError;
use crate::config::UploadConfig;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Bounded runner for part tasks
#[derive(Debug, Clone)]
pub struct PartScheduler {
    concurrency: usize,
    progress_interval: Duration,
    show_progress: bool,
}

impl PartScheduler {
    pub fn new(concurrency: usize, progress_interval: Duration, show_progress: bool) -> Self {
        Self {
            concurrency: concurrency.max(1),
            progress_interval,
            show_progress,
        }
    }

    pub fn from_config(config: &UploadConfig) -> Self {
        Self::new(
            config.concurrent_parts,
            config.progress_interval(),
            config.show_progress,
        )
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run `task` for every part and collect the results in completion order.
    ///
    /// `task` receives the shared progress tracker to report bytes against.
    pub async fn run<F, Fut>(
        &self,
        parts: &[PartBoundary],
        task: F,
    ) -> Result<Vec<PartResult>, UploadError>
    where
        F: Fn(PartBoundary, Arc<ProgressTracker>) -> Fut,
        Fut: Future<Output = Result<PartResult, UploadError>> + Send + 'static,
    {
        let tracker = Arc::new(ProgressTracker::new(parts));
        let reporter =
            ProgressReporter::start(tracker.clone(), self.progress_interval, self.show_progress);

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        let mut pending = parts.iter().copied();
        let mut next = pending.next();
        let mut results = Vec::with_capacity(parts.len());

        loop {
            tokio::select! {
                permit = semaphore.clone().acquire_owned(), if next.is_some() => {
                    let permit = permit.map_err(|e| UploadError::Scheduler(e.to_string()))?;
                    if let Some(part) = next.take() {
                        tracing::debug!(part_number = part.part_number(), "Starting part");
                        let fut = task(part, tracker.clone());
                        tasks.spawn(async move {
                            let _permit = permit;
                            fut.await
                        });
                    }
                    next = pending.next();
                }
                Some(joined) = tasks.join_next() => {
                    match joined {
                        Ok(Ok(result)) => results.push(result),
                        Ok(Err(e)) => {
                            tracing::error!(
                                error = %e,
                                in_flight = tasks.len(),
                                "Part failed, abandoning remaining parts"
                            );
                            return Err(e);
                        }
                        Err(e) => return Err(UploadError::Scheduler(e.to_string())),
                    }
                }
                else => break,
            }
        }

        reporter.finish();
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::plan::part_boundaries;
    use crate::upload::RemoteError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn scheduler(concurrency: usize) -> PartScheduler {
        PartScheduler::new(concurrency, Duration::from_millis(10), false)
    }

    #[tokio::test]
    async fn test_runs_every_part() {
        let parts = part_boundaries(1000, 100).unwrap();
        let results = scheduler(3)
            .run(&parts, |part, progress| async move {
                progress.record(part.index, part.part_size);
                Ok::<_, UploadError>(PartResult::new(
                    part.part_number(),
                    format!("etag-{}", part.index),
                ))
            })
            .await
            .unwrap();

        let mut numbers: Vec<u32> = results.iter().map(|r| r.part_number).collect();
        numbers.sort_unstable();
        assert_eq!(numbers, (1..=10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_never_exceeds_limit() {
        let parts = part_boundaries(20, 1).unwrap();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        scheduler(4)
            .run(&parts, |part, _| {
                let in_flight = in_flight.clone();
                let peak = peak.clone();
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, UploadError>(PartResult::new(part.part_number(), "e"))
                }
            })
            .await
            .unwrap();

        assert!(peak.load(Ordering::SeqCst) <= 4);
        assert!(peak.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_admits_in_index_order() {
        let parts = part_boundaries(8, 1).unwrap();
        let started = Arc::new(Mutex::new(Vec::new()));

        scheduler(2)
            .run(&parts, |part, _| {
                started.lock().unwrap().push(part.index);
                async move {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    Ok::<_, UploadError>(PartResult::new(part.part_number(), "e"))
                }
            })
            .await
            .unwrap();

        let started = started.lock().unwrap();
        assert_eq!(*started, (0..8).collect::<Vec<usize>>());
    }

    #[tokio::test]
    async fn test_first_failure_propagates() {
        let parts = part_boundaries(5, 1).unwrap();
        let err = scheduler(5)
            .run(&parts, |part, _| async move {
                if part.index == 2 {
                    Err(UploadError::PartUploadFailed {
                        part_number: part.part_number(),
                        error: RemoteError::Raw {
                            status: 500,
                            body: "boom".into(),
                        },
                    })
                } else {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok::<_, UploadError>(PartResult::new(part.part_number(), "e"))
                }
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            UploadError::PartUploadFailed { part_number: 3, .. }
        ));
    }

    #[tokio::test]
    async fn test_panicking_task_is_scheduler_error() {
        let parts = part_boundaries(2, 1).unwrap();
        let err = scheduler(1)
            .run(&parts, |part, _| async move {
                if part.index == 0 {
                    panic!("part task blew up");
                }
                Ok::<_, UploadError>(PartResult::new(part.part_number(), "e"))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::Scheduler(_)));
    }
}
