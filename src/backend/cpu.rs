//! CPU backend using Rayon for parallel search

use crossbeam_channel::{Receiver, Sender};
use log::debug;
use num_bigint::BigUint;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{GeneratorError, SearchResult};
use crate::x25519::{Walk, KEY_SIZE};

/// Candidates tested by a worker between two checks for cancellation
pub const DEFAULT_BATCH_SIZE: u64 = 4096;

/// CPU backend racing one walk per thread
#[derive(Debug, Clone)]
pub struct CpuBackend {
    thread_count: usize,
    batch_size: u64,
}

impl CpuBackend {
    /// Create a CPU backend with a specific thread count
    pub fn with_threads(thread_count: usize) -> Self {
        Self {
            thread_count: thread_count.max(1),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Set the number of candidates tested between cancellation checks
    pub fn with_batch_size(mut self, batch_size: u64) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Number of walks raced in parallel, at least one
    pub fn threads(&self) -> usize {
        self.thread_count
    }

    pub fn batch_size(&self) -> u64 {
        self.batch_size
    }

    /// Search for an offset whose public key satisfies `matches`.
    ///
    /// Blocks until some worker finds a match; there is no upper bound on the
    /// time this takes.
    pub fn search<F>(&self, base: &[u8; KEY_SIZE], matches: F) -> Result<SearchResult, GeneratorError>
    where
        F: Fn(&[u8]) -> bool + Sync,
    {
        let (_stop_tx, stop_rx) = crossbeam_channel::bounded(1);
        self.search_with_stop(base, matches, &stop_rx)
    }

    /// Like [`CpuBackend::search`], but also returns once a message arrives on
    /// `stop_rx`. A search stopped this way has no offset unless a worker
    /// found one first.
    pub fn search_with_stop<F>(
        &self,
        base: &[u8; KEY_SIZE],
        matches: F,
        stop_rx: &Receiver<()>,
    ) -> Result<SearchResult, GeneratorError>
    where
        F: Fn(&[u8]) -> bool + Sync,
    {
        let walks = (0..self.thread_count)
            .map(|_| Walk::new(base, rand::random()))
            .collect::<Result<Vec<_>, _>>()?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.thread_count)
            .build()?;

        // Write-once slot for the winning offset
        let (winner_tx, winner_rx) = crossbeam_channel::bounded(1);
        let cancelled = AtomicBool::new(false);

        debug!(
            "searching with {} threads, {} candidates per batch",
            self.thread_count, self.batch_size
        );

        let attempts = pool.install(|| {
            walks
                .into_par_iter()
                .with_max_len(1)
                .enumerate()
                .map(|(id, walk)| {
                    self.worker(id, walk, &matches, &cancelled, &winner_tx, stop_rx)
                })
                .sum::<u64>()
        });

        let offset = winner_rx.try_recv().ok();
        debug!(
            "search finished after {} attempts, offset found: {}",
            attempts,
            offset.is_some()
        );

        Ok(SearchResult { offset, attempts })
    }

    fn worker<F>(
        &self,
        id: usize,
        mut walk: Walk,
        matches: &F,
        cancelled: &AtomicBool,
        winner_tx: &Sender<BigUint>,
        stop_rx: &Receiver<()>,
    ) -> u64
    where
        F: Fn(&[u8]) -> bool + Sync,
    {
        let mut attempts = 0u64;

        loop {
            if cancelled.load(Ordering::Relaxed) {
                break;
            }

            if stop_rx.try_recv().is_ok() {
                debug!("worker {} received stop signal", id);
                cancelled.store(true, Ordering::SeqCst);
                break;
            }

            let probe = walk.probe(self.batch_size, matches);
            attempts += probe.attempts;

            if let Some(offset) = probe.found {
                // Only the first find fills the slot; later ones are dropped.
                if winner_tx.try_send(offset).is_ok() {
                    debug!("worker {} found a match after {} attempts", id, attempts);
                }
                cancelled.store(true, Ordering::SeqCst);
                break;
            }
        }

        attempts
    }
}

/// One walk per logical CPU
impl Default for CpuBackend {
    fn default() -> Self {
        Self::with_threads(num_cpus::get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::x25519::{add_offset, derive_public_key, has_prefix_bits, KeyPair};

    fn check_search(threads: usize) {
        let key = KeyPair::generate().unwrap();
        let matches = has_prefix_bits(&[0xa0], 4);

        let backend = CpuBackend::with_threads(threads).with_batch_size(64);
        let result = backend.search(key.public(), matches.clone()).unwrap();

        let offset = result.offset.expect("search without stop always finds a match");
        assert!(result.attempts >= 1);
        let secret = add_offset(key.secret(), &offset).unwrap();
        assert!(matches(&derive_public_key(&secret)));
    }

    #[test]
    fn test_search_single_thread() {
        check_search(1);
    }

    #[test]
    fn test_search_multi_thread() {
        check_search(4);
    }

    #[test]
    fn test_search_stopped() {
        let key = KeyPair::generate().unwrap();
        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
        stop_tx.send(()).unwrap();

        let backend = CpuBackend::with_threads(2).with_batch_size(16);
        let result = backend
            .search_with_stop(key.public(), |_: &[u8]| false, &stop_rx)
            .unwrap();
        assert_eq!(result.offset, None);
    }

    #[test]
    fn test_search_first_candidate() {
        let key = KeyPair::generate().unwrap();
        let backend = CpuBackend::with_threads(3);
        let result = backend.search(key.public(), |_: &[u8]| true).unwrap();
        assert!(result.offset.is_some());
        // Each worker stops at its first candidate at the latest
        assert!(result.attempts >= 1 && result.attempts <= 3);
    }

    #[test]
    fn test_settings_at_least_one() {
        let backend = CpuBackend::with_threads(0).with_batch_size(0);
        assert_eq!(backend.threads(), 1);
        assert_eq!(backend.batch_size(), 1);

        let backend = CpuBackend::default();
        assert_eq!(backend.threads(), num_cpus::get().max(1));
        assert_eq!(backend.batch_size(), DEFAULT_BATCH_SIZE);
    }
}
