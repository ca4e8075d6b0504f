//! Deferred work items executed one at a time in fixed priority order
//!
//! Interrupt handlers post work items, and a software interrupt later drains the queue by taking
//! one item at a time. Posting an item that is already queued merges with it. Items posted while
//! the queue is being drained are picked up by the same drain loop.
//!
//! # Examples
//!
//! ```
//! use rf_multimode::utils::work_queue::{WorkItem, WorkQueue};
//!
//! #[derive(Clone, Copy, Debug, PartialEq)]
//! enum Job {
//!     Urgent,
//!     Lazy,
//! }
//!
//! impl WorkItem for Job {
//!     const ALL: &'static [Self] = &[Job::Urgent, Job::Lazy];
//! }
//!
//! let mut queue = WorkQueue::new();
//! queue.post(Job::Lazy);
//! queue.post(Job::Urgent);
//! queue.post(Job::Lazy);
//!
//! assert_eq!(queue.take_next(), Some(Job::Urgent));
//! assert_eq!(queue.take_next(), Some(Job::Lazy));
//! assert_eq!(queue.take_next(), None);
//! ```

use core::marker::PhantomData;

/// Kind of work that can be queued in a [`WorkQueue`]
///
/// Items listed earlier in [`ALL`](WorkItem::ALL) are served first. At most 32 kinds are
/// supported.
pub trait WorkItem: Copy + PartialEq + 'static {
    /// Every kind of work, highest priority first
    const ALL: &'static [Self];

    /// Bit representing this kind in the queue
    fn bit(self) -> u32 {
        Self::ALL
            .iter()
            .position(|item| *item == self)
            .map_or(0, |pos| 1 << pos)
    }
}

/// Set of pending work items
#[derive(Debug)]
pub struct WorkQueue<W: WorkItem> {
    pending: u32,
    _kind: PhantomData<W>,
}

impl<W: WorkItem> WorkQueue<W> {
    /// Creates an empty queue
    pub const fn new() -> Self {
        Self {
            pending: 0,
            _kind: PhantomData,
        }
    }

    /// Queues `item`, merging it with an already queued one
    pub fn post(&mut self, item: W) {
        self.pending |= item.bit();
    }

    /// Whether `item` is queued
    pub fn is_pending(&self, item: W) -> bool {
        self.pending & item.bit() != 0
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.pending == 0
    }

    /// Removes and returns the highest priority queued item
    pub fn take_next(&mut self) -> Option<W> {
        let item = W::ALL.iter().copied().find(|item| self.is_pending(*item))?;
        self.pending &= !item.bit();
        Some(item)
    }

    /// Drops every queued item
    pub fn clear(&mut self) {
        self.pending = 0;
    }
}

impl<W: WorkItem> Default for WorkQueue<W> {
    fn default() -> Self {
        Self::new()
    }
}
