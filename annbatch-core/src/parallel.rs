//! # Range Partitioner
//!
//! Splits `[begin, end)` into contiguous chunks and runs a worker over each
//! chunk on its own scoped thread. Threads are spawned per call and joined
//! before returning; there is no pool.
//!
//! ```text
//!   [0 ............................................ n)
//!    │ chunk 0 │ chunk 1 │ chunk 2 │ ... │ last (≤ grain)
//!        │         │         │               │
//!     thread    thread    thread          thread
//!        └─────────┴────┬────┴───────────────┘
//!                       ▼
//!          Vec<ChunkOutcome<T>> (chunk order)
//! ```
//!
//! A failing or panicking worker never unwinds into the caller. Its chunk
//! comes back as an `Err` outcome and the caller decides what that means.

use std::ops::Range;
use std::panic::{self, AssertUnwindSafe};
use std::thread;

use tracing::{trace, warn};

use crate::error::{Error, Result};

/// Result of running the worker over one chunk
#[derive(Debug)]
pub struct ChunkOutcome<T> {
    pub range: Range<usize>,
    pub result: Result<T>,
}

impl<T> ChunkOutcome<T> {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Compute the chunks `[begin, end)` is split into for `n_threads` workers.
///
/// With one thread the whole range is one chunk. When the length divides
/// evenly the grain is `length / n_threads`, otherwise `length / (n_threads - 1)`
/// so the remainder lands in a short last chunk instead of an extra one.
/// `grain_size` is a lower bound in both cases.
pub fn split_input_range(range: Range<usize>, n_threads: usize, grain_size: usize) -> Vec<Range<usize>> {
    let length = range.end.saturating_sub(range.start);
    let grain = if n_threads <= 1 {
        length
    } else if length % n_threads == 0 {
        (length / n_threads).max(grain_size)
    } else {
        (length / (n_threads - 1)).max(grain_size)
    }
    .max(1);

    let mut ranges = Vec::with_capacity(length / grain + 1);
    let mut begin = range.start;
    while begin < range.end {
        let end = (begin + grain).min(range.end);
        ranges.push(begin..end);
        begin = end;
    }
    ranges
}

/// Run `worker(chunk_begin, chunk_end)` over `[begin, end)`.
///
/// `n_threads == 0` runs the worker once over the whole range on the calling
/// thread. Otherwise one thread is spawned per chunk from
/// [`split_input_range`] and all are joined before returning.
pub fn parallel_for<T, F>(
    begin: usize,
    end: usize,
    n_threads: usize,
    grain_size: usize,
    worker: F,
) -> Vec<ChunkOutcome<T>>
where
    T: Send,
    F: Fn(usize, usize) -> Result<T> + Sync,
{
    if n_threads == 0 {
        let result = run_guarded(&worker, begin, end);
        return vec![ChunkOutcome { range: begin..end, result }];
    }

    let ranges = split_input_range(begin..end, n_threads, grain_size);
    trace!(begin, end, n_threads, chunks = ranges.len(), "Partitioned range");

    let worker = &worker;
    thread::scope(|s| {
        let handles: Vec<_> = ranges
            .into_iter()
            .map(|range| {
                let (b, e) = (range.start, range.end);
                (range, s.spawn(move || worker(b, e)))
            })
            .collect();

        handles
            .into_iter()
            .map(|(range, handle)| {
                let result = handle.join().unwrap_or_else(|_| {
                    Err(Error::WorkerPanicked {
                        start: range.start,
                        end: range.end,
                    })
                });
                if let Err(e) = &result {
                    warn!(start = range.start, end = range.end, error = %e, "Worker chunk failed");
                }
                ChunkOutcome { range, result }
            })
            .collect()
    })
}

fn run_guarded<T, F>(worker: &F, begin: usize, end: usize) -> Result<T>
where
    F: Fn(usize, usize) -> Result<T>,
{
    let result = panic::catch_unwind(AssertUnwindSafe(|| worker(begin, end)))
        .unwrap_or(Err(Error::WorkerPanicked { start: begin, end }));
    if let Err(e) = &result {
        warn!(start = begin, end, error = %e, "Worker chunk failed");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_split_even() {
        assert_eq!(split_input_range(0..8, 4, 1), vec![0..2, 2..4, 4..6, 6..8]);
    }

    #[test]
    fn test_split_uneven_reserves_slack() {
        // 10 / (4 - 1) = 3 -> chunks of 3, last one short
        assert_eq!(split_input_range(0..10, 4, 1), vec![0..3, 3..6, 6..9, 9..10]);
    }

    #[test]
    fn test_split_single_thread() {
        assert_eq!(split_input_range(5..17, 1, 1), vec![5..17]);
    }

    #[test]
    fn test_split_grain_is_lower_bound() {
        assert_eq!(split_input_range(0..8, 4, 3), vec![0..3, 3..6, 6..8]);
    }

    #[test]
    fn test_split_zero_grain_short_range() {
        // length / (n_threads - 1) == 0 and grain 0 must still make progress
        assert_eq!(split_input_range(0..2, 8, 0), vec![0..1, 1..2]);
    }

    #[test]
    fn test_split_empty() {
        assert!(split_input_range(3..3, 4, 1).is_empty());
    }

    #[test]
    fn test_sequential_runs_whole_range_once() {
        let calls = AtomicUsize::new(0);
        let outcomes = parallel_for(0, 10, 0, 1, |b, e| {
            calls.fetch_add(1, Ordering::Relaxed);
            Ok(e - b)
        });
        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].range, 0..10);
        assert_eq!(*outcomes[0].result.as_ref().unwrap(), 10);
    }

    #[test]
    fn test_threaded_visits_every_index_once() {
        let hits: Vec<AtomicUsize> = (0..103).map(|_| AtomicUsize::new(0)).collect();
        let outcomes = parallel_for(0, 103, 7, 1, |b, e| {
            for h in &hits[b..e] {
                h.fetch_add(1, Ordering::Relaxed);
            }
            Ok(())
        });
        assert!(outcomes.iter().all(ChunkOutcome::is_ok));
        assert!(hits.iter().all(|h| h.load(Ordering::Relaxed) == 1));
    }

    #[test]
    fn test_panic_is_absorbed_per_chunk() {
        let outcomes = parallel_for(0, 4, 4, 1, |b, _e| {
            if b == 2 {
                panic!("boom");
            }
            Ok(b)
        });
        assert_eq!(outcomes.len(), 4);
        assert!(matches!(
            outcomes[2].result,
            Err(Error::WorkerPanicked { start: 2, end: 3 })
        ));
        assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 3);
    }

    #[test]
    fn test_sequential_panic_is_absorbed() {
        let outcomes: Vec<ChunkOutcome<()>> = parallel_for(0, 4, 0, 1, |_, _| panic!("boom"));
        assert!(matches!(outcomes[0].result, Err(Error::WorkerPanicked { start: 0, end: 4 })));
    }

    #[test]
    fn test_worker_error_returned_as_outcome() {
        let outcomes = parallel_for(0, 6, 3, 1, |b, e| {
            if b == 0 {
                Err(Error::Internal { message: "nope".into() })
            } else {
                Ok(e - b)
            }
        });
        assert!(outcomes[0].result.is_err());
        assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), outcomes.len() - 1);
    }
}
