// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-term reassembly buffer (the "rebuilder").
//!
//! A [`TermRebuilder`] turns potentially out-of-order byte fragments landing
//! in one term into a contiguous run, tracked by a `tail` offset (the first
//! unfilled byte). Duplicate fragments are idempotent no-ops; the tail only
//! ever advances over bytes that are actually contiguous from the start of
//! the term.
//!
//! Single-writer discipline: only the receiver thread calls [`insert`]. The
//! backing buffer and the pending out-of-order list are wrapped in
//! `UnsafeCell` rather than a lock -- the tail/status atomics establish
//! happens-before for any other thread that later reads the committed
//! bytes.

use std::cell::UnsafeCell;
use std::ops::Range;
use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};

/// Cleaning handshake state for a term slot.
///
/// `CLEAN -> NEEDS_CLEANING -> IN_CLEANING -> CLEAN`. See
/// `core::connection::connection::Connection::clean_log_buffer`.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermStatus {
    Clean = 0,
    NeedsCleaning = 1,
    InCleaning = 2,
}

impl TermStatus {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => TermStatus::Clean,
            1 => TermStatus::NeedsCleaning,
            2 => TermStatus::InCleaning,
            other => unreachable!("invalid TermStatus encoding: {other}"),
        }
    }
}

/// Reassembly state for a single term slot in the three-term ring.
pub struct TermRebuilder {
    buffer: UnsafeCell<Box<[u8]>>,
    capacity: i32,
    tail: AtomicI64,
    /// Out-of-order fragments received ahead of `tail`, sorted and merged.
    /// Receiver-thread-exclusive, like `buffer`.
    pending: UnsafeCell<Vec<Range<i32>>>,
    status: AtomicU8,
}

// SAFETY: `buffer` and `pending` are only ever mutated by `insert`/`clean`,
// both of which are single-writer (receiver thread for `insert`, conductor
// thread for `clean`, serialized by the `status` CAS handshake so they never
// overlap on the same term). `tail`/`status` are atomics publishing the
// happens-before relationship any other reader relies on.
unsafe impl Send for TermRebuilder {}
unsafe impl Sync for TermRebuilder {}

impl TermRebuilder {
    /// Create a new, clean rebuilder for a term of `capacity` bytes.
    #[must_use]
    pub fn new(capacity: i32) -> Self {
        assert!(capacity > 0, "term capacity must be positive");
        Self {
            buffer: UnsafeCell::new(vec![0u8; capacity as usize].into_boxed_slice()),
            capacity,
            tail: AtomicI64::new(0),
            pending: UnsafeCell::new(Vec::new()),
            status: AtomicU8::new(TermStatus::Clean as u8),
        }
    }

    /// Current contiguous tail offset within this term (first unfilled byte).
    #[must_use]
    pub fn tail(&self) -> i32 {
        self.tail.load(Ordering::Acquire) as i32
    }

    /// Whether this term has been fully written (`tail == capacity`).
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.tail.load(Ordering::Acquire) == i64::from(self.capacity)
    }

    #[must_use]
    pub fn capacity(&self) -> i32 {
        self.capacity
    }

    #[must_use]
    pub fn status(&self) -> TermStatus {
        TermStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Receiver-thread-only: insert a fragment at `offset` in this term.
    ///
    /// Idempotent: a fragment fully covered by bytes already contiguous
    /// (`offset + data.len() <= tail`) or already pending is a silent no-op.
    /// Returns `true` if the term just became complete as a result of this
    /// insert (the caller should then run the rotation procedure).
    pub fn insert(&self, offset: i32, data: &[u8]) -> bool {
        let len = match i32::try_from(data.len()) {
            Ok(len) => len,
            Err(_) => return false,
        };
        if len == 0 {
            return false;
        }
        let end = offset.saturating_add(len);

        let tail = self.tail.load(Ordering::Relaxed);
        if i64::from(end) <= tail {
            // Fully covered by the contiguous tail already: duplicate, no-op.
            return false;
        }

        // SAFETY: single-writer (receiver thread) per the struct-level invariant.
        let buf = unsafe { &mut *self.buffer.get() };
        let start = offset.max(tail as i32).max(0) as usize;
        let copy_from = start.saturating_sub(offset as usize);
        if start < end as usize {
            buf[start..end as usize].copy_from_slice(&data[copy_from..]);
        }

        // SAFETY: single-writer (receiver thread).
        let pending = unsafe { &mut *self.pending.get() };
        insert_and_merge(pending, offset..end);

        let mut new_tail = tail;
        while let Some(front) = pending.first() {
            if i64::from(front.start) > new_tail {
                break;
            }
            if i64::from(front.end) > new_tail {
                new_tail = i64::from(front.end);
            }
            pending.remove(0);
        }

        if new_tail != tail {
            self.tail.store(new_tail, Ordering::Release);
        }

        new_tail == i64::from(self.capacity)
    }

    /// Conductor-only: transition `NEEDS_CLEANING -> IN_CLEANING` via CAS.
    ///
    /// Returns `true` if this caller won the race and should perform the
    /// zero-fill and call [`Self::clean`].
    pub fn try_begin_cleaning(&self) -> bool {
        self.status
            .compare_exchange(
                TermStatus::NeedsCleaning as u8,
                TermStatus::InCleaning as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Conductor-only: zero-fill the term and transition `IN_CLEANING -> CLEAN`.
    ///
    /// # Panics
    ///
    /// Panics if called while the term is not `IN_CLEANING` -- this would
    /// indicate the cleaning handshake was bypassed by the caller.
    pub fn clean(&self) {
        assert_eq!(
            self.status.load(Ordering::Acquire),
            TermStatus::InCleaning as u8,
            "clean() called outside the IN_CLEANING handshake"
        );

        // SAFETY: the IN_CLEANING state is only reachable via
        // `try_begin_cleaning`'s CAS, which is how the writer (receiver
        // thread, which only ever touches CLEAN terms) is kept from racing
        // this zero-fill.
        let buf = unsafe { &mut *self.buffer.get() };
        buf.fill(0);
        let pending = unsafe { &mut *self.pending.get() };
        pending.clear();

        self.tail.store(0, Ordering::Release);
        self.status
            .store(TermStatus::Clean as u8, Ordering::Release);
    }

    /// Receiver-thread-only: mark this slot dirty ahead of the writer
    /// reaching it (used during rotation, once the slot two behind the
    /// new active slot needs to be reclaimed).
    pub fn mark_needs_cleaning(&self) {
        self.status
            .store(TermStatus::NeedsCleaning as u8, Ordering::Release);
    }

    /// Read out the committed bytes `[0, tail)`. Any reader observing this
    /// slice via a prior `Acquire` load of `tail()` is guaranteed to see the
    /// writes that established that tail value.
    #[must_use]
    pub fn committed_bytes(&self) -> &[u8] {
        let tail = self.tail() as usize;
        // SAFETY: readers only ever look at `[0, tail)`, and `tail` was
        // published with `Release` after those bytes were written.
        let buf = unsafe { &*self.buffer.get() };
        &buf[..tail]
    }
}

/// Insert `range` into `pending` (sorted, merging adjacent/overlapping
/// ranges) over *received* byte ranges within the term.
fn insert_and_merge(pending: &mut Vec<Range<i32>>, range: Range<i32>) {
    if pending
        .iter()
        .any(|r| r.start <= range.start && range.end <= r.end)
    {
        return; // Fully-duplicate fragment already pending.
    }

    pending.push(range);
    pending.sort_by_key(|r| r.start);

    let mut merged: Vec<Range<i32>> = Vec::with_capacity(pending.len());
    for r in pending.drain(..) {
        match merged.last_mut() {
            Some(last) if r.start <= last.end => {
                last.end = last.end.max(r.end);
            }
            _ => merged.push(r),
        }
    }
    *pending = merged;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contiguous_insert_advances_tail() {
        let term = TermRebuilder::new(4096);
        assert!(!term.insert(0, &[1u8; 1024]));
        assert_eq!(term.tail(), 1024);
        assert!(!term.insert(1024, &[2u8; 1024]));
        assert_eq!(term.tail(), 2048);
    }

    #[test]
    fn test_out_of_order_fills_gap() {
        let term = TermRebuilder::new(4096);
        assert!(!term.insert(1024, &[2u8; 1024])); // arrives first, out of order
        assert_eq!(term.tail(), 0);
        assert!(!term.insert(0, &[1u8; 1024])); // fills the gap
        assert_eq!(term.tail(), 2048);
    }

    #[test]
    fn test_duplicate_insert_is_noop() {
        let term = TermRebuilder::new(4096);
        assert!(!term.insert(0, &[1u8; 1024]));
        assert_eq!(term.tail(), 1024);
        assert!(!term.insert(0, &[9u8; 1024])); // duplicate, ignored
        assert_eq!(term.tail(), 1024);
        assert_eq!(&term.committed_bytes()[..4], &[1, 1, 1, 1]);
    }

    #[test]
    fn test_completion_triggers_true() {
        let term = TermRebuilder::new(2048);
        assert!(!term.insert(0, &[1u8; 1024]));
        assert!(term.insert(1024, &[1u8; 1024]));
        assert!(term.is_complete());
    }

    #[test]
    fn test_cleaning_handshake() {
        let term = TermRebuilder::new(1024);
        assert!(term.insert(0, &[7u8; 1024]));
        assert!(term.is_complete());

        term.mark_needs_cleaning();
        assert_eq!(term.status(), TermStatus::NeedsCleaning);
        assert!(term.try_begin_cleaning());
        assert_eq!(term.status(), TermStatus::InCleaning);
        assert!(!term.try_begin_cleaning(), "second CAS must lose the race");

        term.clean();
        assert_eq!(term.status(), TermStatus::Clean);
        assert_eq!(term.tail(), 0);
        assert!(!term.is_complete());
    }

    #[test]
    #[should_panic(expected = "IN_CLEANING handshake")]
    fn test_clean_without_handshake_panics() {
        let term = TermRebuilder::new(1024);
        term.clean();
    }
}
