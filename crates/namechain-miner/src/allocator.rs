//! Nonce range allocation.
//!
//! A single allocator thread owns the counter and pushes chunks into a
//! bounded channel shared by all workers, so no two workers receive
//! overlapping ranges and the counter needs no locking.

use crossbeam_channel::{select, Receiver, Sender};
use log::debug;
use namechain_core::NonceRange;

use crate::LOG_TARGET;

/// First nonce handed out.
pub const FIRST_NONCE: u128 = 1;

/// Hands out consecutive, disjoint chunks of the nonce space.
#[derive(Debug, Clone)]
pub struct NonceAllocator {
    next: u128,
    chunk_size: u128,
}

impl NonceAllocator {
    pub fn new(first_nonce: u128, chunk_size: u64) -> Self {
        NonceAllocator {
            next: first_nonce,
            chunk_size: u128::from(chunk_size.max(1)),
        }
    }

    /// Start of the next chunk to be handed out.
    pub fn position(&self) -> u128 {
        self.next
    }

    /// Claim the next chunk.
    ///
    /// Returns `None` once the `u128` space is used up. The last chunk is cut
    /// short at `u128::MAX`, which itself is never a candidate.
    pub fn next_range(&mut self) -> Option<NonceRange> {
        if self.next == u128::MAX {
            return None;
        }

        let start = self.next;
        let end = start.checked_add(self.chunk_size).unwrap_or(u128::MAX);
        self.next = end;
        Some(NonceRange::new(start, end))
    }
}

impl Iterator for NonceAllocator {
    type Item = NonceRange;

    fn next(&mut self) -> Option<NonceRange> {
        self.next_range()
    }
}

/// Feed ranges to workers until shutdown.
///
/// Blocks only while the range channel is full. Returns when `done` is
/// closed, when every worker has dropped its receiver, or when the nonce
/// space is exhausted (dropping `ranges` then tells workers there is no
/// more work).
pub(crate) fn run_allocator(
    mut allocator: NonceAllocator,
    ranges: Sender<NonceRange>,
    done: Receiver<()>,
) {
    while let Some(range) = allocator.next_range() {
        select! {
            send(ranges, range) -> res => {
                if res.is_err() {
                    debug!(target: LOG_TARGET, "allocator stopping: no workers left");
                    return;
                }
            }
            recv(done) -> _ => {
                debug!(target: LOG_TARGET, "allocator stopping at nonce {}", allocator.position());
                return;
            }
        }
    }
    debug!(target: LOG_TARGET, "allocator exhausted the nonce space");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;
    use std::thread;

    #[test]
    fn test_chunks_are_disjoint_and_increasing() {
        let mut allocator = NonceAllocator::new(FIRST_NONCE, 10_000_000);

        let first = allocator.next_range().unwrap();
        assert_eq!(first, NonceRange::new(1, 10_000_001));

        let mut previous = first;
        for _ in 0..100 {
            let range = allocator.next_range().unwrap();
            assert_eq!(range.start, previous.end);
            assert_eq!(range.len(), 10_000_000);
            previous = range;
        }
    }

    #[test]
    fn test_exhaustion_at_u128_max() {
        let mut allocator = NonceAllocator::new(u128::MAX - 25, 10);
        let ranges: Vec<_> = allocator.by_ref().collect();

        assert_eq!(
            ranges,
            vec![
                NonceRange::new(u128::MAX - 25, u128::MAX - 15),
                NonceRange::new(u128::MAX - 15, u128::MAX - 5),
                NonceRange::new(u128::MAX - 5, u128::MAX),
            ]
        );
        assert_eq!(allocator.next_range(), None);
        assert_eq!(allocator.next_range(), None);
    }

    #[test]
    fn test_exact_fit_at_u128_max() {
        let mut allocator = NonceAllocator::new(u128::MAX - 20, 10);
        assert_eq!(allocator.by_ref().count(), 2);
        assert_eq!(allocator.next_range(), None);
    }

    #[test]
    fn test_past_u64() {
        let mut allocator = NonceAllocator::new(u64::MAX as u128 - 5, 10);
        let range = allocator.next_range().unwrap();
        assert_eq!(range.end, u64::MAX as u128 + 5);
        assert_eq!(range.end.to_string(), "18446744073709551620");
    }

    #[test]
    fn test_run_allocator_stops_on_done() {
        let (ranges_tx, ranges_rx) = bounded(2);
        let (done_tx, done_rx) = bounded::<()>(0);

        let handle = thread::spawn(move || {
            run_allocator(NonceAllocator::new(FIRST_NONCE, 5), ranges_tx, done_rx)
        });

        assert_eq!(ranges_rx.recv().unwrap(), NonceRange::new(1, 6));
        assert_eq!(ranges_rx.recv().unwrap(), NonceRange::new(6, 11));

        drop(done_tx);
        handle.join().unwrap();

        // Whatever was queued before shutdown drains, then the channel closes.
        while ranges_rx.recv().is_ok() {}
    }

    #[test]
    fn test_run_allocator_stops_without_workers() {
        let (ranges_tx, ranges_rx) = bounded(1);
        let (_done_tx, done_rx) = bounded::<()>(0);
        drop(ranges_rx);

        run_allocator(NonceAllocator::new(FIRST_NONCE, 5), ranges_tx, done_rx);
    }

    #[test]
    fn test_run_allocator_closes_feed_when_exhausted() {
        let (ranges_tx, ranges_rx) = bounded(8);
        let (_done_tx, done_rx) = bounded::<()>(0);

        run_allocator(NonceAllocator::new(u128::MAX - 25, 10), ranges_tx, done_rx);

        let received: Vec<_> = ranges_rx.iter().collect();
        assert_eq!(received.len(), 3);
    }
}
