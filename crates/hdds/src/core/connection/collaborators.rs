// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Narrow trait contracts for everything a [`super::connection::Connection`]
//! treats as an external collaborator: loss detection, SM transport,
//! position publication, and the wall clock.
//!
//! Production code wires in real implementations, tests wire in fakes, and
//! the connection itself never depends on a concrete transport or
//! allocator.

/// Loss-detection helper (NAK generation, tail tracking). Out of scope to
/// implement here; the connection only calls through this contract.
pub trait LossHandler: Send {
    /// Scan for newly-detected gaps. Returns whether the scan advanced any
    /// internal state (used as the `scanForGaps` work-count).
    fn scan(&mut self) -> bool;

    /// The current contiguous tail position as tracked by the loss handler.
    /// Published as `contiguousReceivedPosition` after each accepted insert.
    fn tail_position(&self) -> i64;

    /// Offer a newly observed packet position as a candidate high-water
    /// mark; returns the new value to publish as `highestReceivedPosition`
    /// (which may be unchanged from the prior one).
    fn highest_position_candidate(&mut self, pos: i64) -> i64;
}

/// Non-blocking status-message transport. May silently drop under
/// congestion; the scheduler relies on its own retry-on-next-trigger logic,
/// not on transport-level delivery guarantees.
pub trait StatusMessageSender: Send {
    fn send(&mut self, term_id: i32, term_offset: i32, window_size: i32);
}

/// Write-side position publication (owned by the connection, closed at
/// `close()`).
pub trait PositionReporter: Send {
    fn set_ordered(&self, position: i64);
    fn close(&mut self);
}

/// Read-side position access (owned by the connection, closed at `close()`).
pub trait PositionIndicator: Send {
    fn position(&self) -> i64;
}

/// Wall-clock source, nanosecond resolution.
pub trait Clock: Send + Sync {
    fn now_ns(&self) -> i64;
}
