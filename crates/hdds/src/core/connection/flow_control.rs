// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Flow-control guard: the underrun/overrun predicates that bound which
//! frames `insert_into_term` accepts, plus the configuration-derived
//! window/gain quantities from `ConnectionConfig`.
//!
//! Both predicates are pure functions over already-computed positions so
//! they can be unit tested without a live [`super::term::TermRebuilder`] or
//! collaborator.

/// A duplicate or very late packet: its end lies at or behind the
/// contiguous tail already established for its term.
#[must_use]
pub fn is_underrun(packet_position: i64, current_position: i64) -> bool {
    packet_position < current_position
}

/// The sender is exceeding the credit last advertised to it. Should not
/// happen in a well-behaved sender; defensive only.
#[must_use]
pub fn is_overrun(
    packet_position: i64,
    length: i32,
    subscriber_position: i64,
    term_window_size: i32,
) -> bool {
    packet_position + i64::from(length) > subscriber_position + i64::from(term_window_size)
}
