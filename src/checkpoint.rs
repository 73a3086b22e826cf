//! Per-partition resume position.
//!
//! The consumer reopens a partition from [`PartitionCursor::starting_position`]
//! after every restart. The cursor only moves past a batch once that batch
//! has been settled, so failed and interrupted batches are read again.

use azeventhubs::consumer::EventPosition;

use crate::error::BatchError;
use crate::batch::BatchReport;

/// What to do with a batch once [`crate::BatchProcessor`] has returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Move past the batch.
    Commit,
    /// Reopen the partition at the batch's first event.
    Redeliver,
    /// Failed on every allowed delivery; move past it anyway.
    Abandon,
}

#[derive(Debug, Clone, Default)]
pub struct PartitionCursor {
    /// Next sequence number to read, inclusive.
    next: Option<i64>,
    /// Consecutive failed deliveries starting at `next`.
    failures: usize,
    max_redeliveries: usize,
}

impl PartitionCursor {
    pub fn new(max_redeliveries: usize) -> Self {
        PartitionCursor {
            max_redeliveries,
            ..Default::default()
        }
    }

    /// Where to open the partition. Before the first delivery this is the
    /// end of the stream.
    pub fn starting_position(&self) -> EventPosition {
        match self.next {
            Some(sequence_number) => EventPosition::from_sequence_number(sequence_number, true),
            None => EventPosition::latest(),
        }
    }

    pub fn next_sequence_number(&self) -> Option<i64> {
        self.next
    }

    /// Settle the batch spanning sequence numbers `first..=last`.
    ///
    /// An unavailable graph never counts towards abandonment since nothing
    /// was consumed.
    pub fn settle(
        &mut self,
        first: i64,
        last: i64,
        result: &Result<BatchReport, BatchError>,
    ) -> Disposition {
        if self.next != Some(first) {
            self.next = Some(first);
            self.failures = 0;
        }

        match result {
            Ok(_) => {
                self.commit(last);
                Disposition::Commit
            }
            Err(BatchError::Unavailable(_)) => Disposition::Redeliver,
            Err(_) if self.failures < self.max_redeliveries => {
                self.failures += 1;
                Disposition::Redeliver
            }
            Err(_) => {
                self.commit(last);
                Disposition::Abandon
            }
        }
    }

    fn commit(&mut self, last: i64) {
        self.next = Some(last + 1);
        self.failures = 0;
    }
}
