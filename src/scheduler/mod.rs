//! Fixed-delay background jobs
//!
//! Plain thread loops: run the job, then sleep the configured delay before
//! the next run (delay counts from the end of one run to the start of the
//! next, so a slow run never stacks up behind the timer). Stop flags are
//! polled in short slices so shutdown stays prompt.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::cache::CacheAggregator;

const STOP_POLL_SLICE: Duration = Duration::from_millis(100);

/// Handle to a running fixed-delay job
pub struct JobHandle {
    name: String,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl JobHandle {
    /// Signal the job to stop and wait for the thread to finish
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!(job = %self.name, "job thread panicked");
            }
        }
        info!(job = %self.name, "job stopped");
    }
}

/// Spawn a named fixed-delay job thread
pub fn spawn_fixed_delay(
    name: &str,
    delay: Duration,
    mut job: impl FnMut() + Send + 'static,
) -> std::io::Result<JobHandle> {
    let stop = Arc::new(AtomicBool::new(false));
    let thread_stop = Arc::clone(&stop);

    let handle = thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            while !thread_stop.load(Ordering::SeqCst) {
                job();

                let deadline = Instant::now() + delay;
                loop {
                    if thread_stop.load(Ordering::SeqCst) {
                        return;
                    }
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    thread::sleep(STOP_POLL_SLICE.min(deadline - now));
                }
            }
        })?;

    Ok(JobHandle {
        name: name.to_string(),
        stop,
        handle: Some(handle),
    })
}

/// Periodic report of aggregate and per-store cache sizes
///
/// Each pass probes every routable store's key count, so runs are serialized
/// with a skip-if-running guard in case a pass outlasts the delay.
pub struct SizeReporter {
    aggregator: Arc<CacheAggregator>,
    in_progress: AtomicBool,
}

impl SizeReporter {
    pub fn new(aggregator: Arc<CacheAggregator>) -> Self {
        Self {
            aggregator,
            in_progress: AtomicBool::new(false),
        }
    }

    /// Log one size report unless a previous one is still running
    pub fn run_once(&self) -> bool {
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        let sizes = self.aggregator.store_sizes();
        info!(
            distinct_keys = self.aggregator.size(),
            stores = sizes.len(),
            "cache size report"
        );
        for (store, size) in sizes {
            match size {
                Some(size) => info!(store = %store, keys = size, "store size"),
                None => warn!(store = %store, "store size unavailable"),
            }
        }

        self.in_progress.store(false, Ordering::SeqCst);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheStore, InMemoryStore};
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_job_runs_repeatedly_and_stops() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);

        let job = spawn_fixed_delay("test-job", Duration::from_millis(10), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        while runs.load(Ordering::SeqCst) < 3 {
            thread::sleep(Duration::from_millis(5));
        }
        job.stop();

        let after_stop = runs.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(runs.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn test_size_reporter_runs() {
        let store = Arc::new(InMemoryStore::new("memory"));
        store.put("k", "v").unwrap();
        let stores: Vec<Arc<dyn CacheStore>> = vec![store];
        let aggregator = Arc::new(CacheAggregator::new(move || stores.clone()));

        let reporter = SizeReporter::new(aggregator);
        assert!(reporter.run_once());
    }

    #[test]
    fn test_size_reporter_skips_when_busy() {
        let stores: Vec<Arc<dyn CacheStore>> = Vec::new();
        let aggregator = Arc::new(CacheAggregator::new(move || stores.clone()));
        let reporter = SizeReporter::new(aggregator);

        reporter.in_progress.store(true, Ordering::SeqCst);
        assert!(!reporter.run_once());

        reporter.in_progress.store(false, Ordering::SeqCst);
        assert!(reporter.run_once());
    }
}
