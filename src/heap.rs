//! Binary min-heap of pending jobs, ordered by deadline.
//!
//! Built on [`std::collections::BinaryHeap`] the way the teacher's
//! `40-task-scheduler` lab reaches for it: `BinaryHeap` is a max-heap, so
//! entries compare in reverse of their natural deadline order to make the
//! earliest deadline sort to the top.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::error::CapacityExceeded;
use crate::job::{Deadline, Job};

struct Entry {
    deadline: Deadline,
    // Tiebreak only for a stable internal sift order; spec.md makes no
    // guarantee about which of two equal-deadline jobs fires first, and
    // this field exists purely so `Ord`/`Eq` have something total to key
    // on without comparing job callbacks.
    seq: u64,
    job: Job,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap, we want the earliest deadline on top.
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// A capacity-bounded binary min-heap of [`Job`]s.
///
/// `max_capacity == 0` means unbounded.
pub(crate) struct MinHeap {
    heap: BinaryHeap<Entry>,
    max_capacity: usize,
    next_seq: u64,
}

impl MinHeap {
    pub(crate) fn new(max_capacity: usize) -> Self {
        MinHeap {
            heap: BinaryHeap::new(),
            max_capacity,
            next_seq: 0,
        }
    }

    pub(crate) fn add(&mut self, job: Job) -> Result<(), CapacityExceeded> {
        if self.max_capacity > 0 && self.heap.len() >= self.max_capacity {
            return Err(CapacityExceeded);
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Entry {
            deadline: job.deadline,
            seq,
            job,
        });
        Ok(())
    }

    pub(crate) fn pop(&mut self) -> Option<Job> {
        self.heap.pop().map(|entry| entry.job)
    }

    pub(crate) fn peek(&self) -> Option<&Job> {
        self.heap.peek().map(|entry| &entry.job)
    }

    pub(crate) fn peek_deadline(&self) -> Option<Deadline> {
        self.heap.peek().map(|entry| entry.deadline)
    }

    pub(crate) fn size(&self) -> usize {
        self.heap.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::Callback;
    use std::time::Duration;

    fn job_at(ms: u64) -> Job {
        Job {
            deadline: Deadline::after(Duration::from_millis(ms)),
            cancel: None,
            callback: Box::new(|_| {}) as Callback,
        }
    }

    #[test]
    fn pops_in_deadline_order() {
        let mut heap = MinHeap::new(0);
        heap.add(job_at(300)).unwrap();
        heap.add(job_at(100)).unwrap();
        heap.add(job_at(200)).unwrap();

        let d1 = heap.pop().unwrap().deadline;
        let d2 = heap.pop().unwrap().deadline;
        let d3 = heap.pop().unwrap().deadline;
        assert!(d1 <= d2);
        assert!(d2 <= d3);
        assert!(heap.pop().is_none());
    }

    #[test]
    fn peek_does_not_remove() {
        let mut heap = MinHeap::new(0);
        heap.add(job_at(100)).unwrap();
        assert_eq!(heap.size(), 1);
        let peeked = heap.peek_deadline().unwrap();
        assert_eq!(heap.size(), 1);
        assert_eq!(heap.pop().unwrap().deadline, peeked);
    }

    #[test]
    fn empty_heap_peek_and_pop_are_none() {
        let mut heap = MinHeap::new(0);
        assert!(heap.peek().is_none());
        assert!(heap.pop().is_none());
        assert!(heap.is_empty());
    }

    #[test]
    fn capacity_bound_rejects_past_max() {
        let mut heap = MinHeap::new(2);
        heap.add(job_at(100)).unwrap();
        heap.add(job_at(200)).unwrap();
        let err = heap.add(job_at(300)).unwrap_err();
        assert_eq!(err, CapacityExceeded);
        assert_eq!(heap.size(), 2);
    }

    #[test]
    fn unbounded_heap_accepts_many() {
        let mut heap = MinHeap::new(0);
        for i in 0..1000u64 {
            heap.add(job_at(i)).unwrap();
        }
        assert_eq!(heap.size(), 1000);
    }
}
