//! Bounded-parallel fan-out/fan-in over independent units of work.

use crate::error::Result;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

/// Default number of units of work in flight.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 8;

/// Runs units of work on a dedicated pool of `max_in_flight` threads.
///
/// Every call is a barrier: it returns only after all submitted work has
/// finished, so work for the same item never overlaps across calls.
#[derive(Debug)]
pub struct BoundedExecutor {
    pool: ThreadPool,
    max_in_flight: usize,
}

impl BoundedExecutor {
    pub fn new(max_in_flight: usize) -> Result<Self> {
        let max_in_flight = max_in_flight.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(max_in_flight)
            .thread_name(|i| format!("mosaic-worker-{i}"))
            .build()?;

        Ok(Self {
            pool,
            max_in_flight,
        })
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    /// Run every task and wait for all of them.
    pub fn run_all<'a, F>(&self, tasks: Vec<F>)
    where
        F: FnOnce() + Send + 'a,
    {
        self.pool.scope(|scope| {
            for task in tasks {
                scope.spawn(move |_| task());
            }
        });
    }

    /// Map shared items, keeping input order in the output.
    pub fn map<T, R, F>(&self, items: &[T], f: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(usize, &T) -> R + Send + Sync,
    {
        self.pool.install(|| {
            items
                .par_iter()
                .enumerate()
                .map(|(i, item)| f(i, item))
                .collect()
        })
    }

    /// Apply `f` to each item with exclusive access and wait for all of them.
    pub fn for_each_mut<T, F>(&self, items: &mut [T], f: F)
    where
        T: Send,
        F: Fn(usize, &mut T) + Send + Sync,
    {
        self.pool.install(|| {
            items
                .par_iter_mut()
                .enumerate()
                .for_each(|(i, item)| f(i, item))
        });
    }

    /// Map each item with exclusive access, keeping input order in the output.
    pub fn map_mut<T, R, F>(&self, items: &mut [T], f: F) -> Vec<R>
    where
        T: Send,
        R: Send,
        F: Fn(usize, &mut T) -> R + Send + Sync,
    {
        self.pool.install(|| {
            items
                .par_iter_mut()
                .enumerate()
                .map(|(i, item)| f(i, item))
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn never_exceeds_max_in_flight() {
        let executor = BoundedExecutor::new(3).unwrap();
        let running = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let done = AtomicUsize::new(0);
        let (running_ref, peak_ref, done_ref) = (&running, &peak, &done);

        let tasks: Vec<_> = (0..24)
            .map(|_| {
                move || {
                    let now = running_ref.fetch_add(1, Ordering::SeqCst) + 1;
                    peak_ref.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(5));
                    running_ref.fetch_sub(1, Ordering::SeqCst);
                    done_ref.fetch_add(1, Ordering::SeqCst);
                }
            })
            .collect();

        executor.run_all(tasks);

        assert_eq!(done.load(Ordering::SeqCst), 24);
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(running.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn map_keeps_order_and_mutates() {
        let executor = BoundedExecutor::new(2).unwrap();
        let mut items: Vec<usize> = (0..10).collect();

        let doubled = executor.map_mut(&mut items, |i, item| {
            *item += 1;
            i * 2
        });

        assert_eq!(doubled, (0..10).map(|i| i * 2).collect::<Vec<_>>());
        assert_eq!(items, (1..11).collect::<Vec<_>>());
    }

    #[test]
    fn for_each_reaches_every_item() {
        let executor = BoundedExecutor::new(DEFAULT_MAX_IN_FLIGHT).unwrap();
        let mut items = vec![0u32; 17];
        executor.for_each_mut(&mut items, |i, item| *item = i as u32);
        assert!(items.iter().enumerate().all(|(i, &v)| v == i as u32));
    }
}
