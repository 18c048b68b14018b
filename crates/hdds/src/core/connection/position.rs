// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Position arithmetic for the term-based receive ring.
//!
//! A `Position` is the logical byte offset of a stream from its very first
//! byte, computed from a `(termId, termOffset)` pair and the connection's
//! `initialTermId`. Terms are fixed-capacity (`termCapacity`, a power of
//! two), so the conversion is a shift-and-mask rather than a division.

/// Number of rebuilders in the term ring (fixed; never generalize to N --
/// see `core::connection` module docs for the rationale).
pub const TERM_COUNT: i32 = 3;

/// Compute `log2(term_capacity)`.
///
/// # Panics
///
/// Panics if `term_capacity` is not a power of two. Callers validate this
/// once at `ConnectionConfig` construction time, so in practice this never
/// panics on the hot path.
#[must_use]
pub fn position_bits_to_shift(term_capacity: i32) -> u32 {
    assert!(
        term_capacity > 0 && term_capacity.is_power_of_two(),
        "term_capacity must be a positive power of two, got {term_capacity}"
    );
    term_capacity.trailing_zeros()
}

/// Compute the logical stream position for `(term_id, term_offset)`.
///
/// `position = ((term_id - initial_term_id) << position_bits_to_shift) | term_offset`
#[must_use]
pub fn compute_position(
    term_id: i32,
    term_offset: i32,
    initial_term_id: i32,
    position_bits_to_shift: u32,
) -> i64 {
    let term_delta = i64::from(term_id.wrapping_sub(initial_term_id));
    (term_delta << position_bits_to_shift) | i64::from(term_offset)
}

/// Recover `term_id` from a logical position (inverse of [`compute_position`]).
#[must_use]
pub fn term_id_from_position(
    position: i64,
    initial_term_id: i32,
    position_bits_to_shift: u32,
) -> i32 {
    let term_delta = (position >> position_bits_to_shift) as i32;
    initial_term_id.wrapping_add(term_delta)
}

/// Recover `term_offset` from a logical position (inverse of [`compute_position`]).
#[must_use]
pub fn term_offset_from_position(position: i64, position_bits_to_shift: u32) -> i32 {
    let mask = (1i64 << position_bits_to_shift) - 1;
    (position & mask) as i32
}

/// Map a `term_id` onto its ring slot: `(termId - initialTermId) mod 3`.
///
/// Uses `rem_euclid` rather than `%` because `term_id` can in principle lag
/// `initial_term_id` during construction bookkeeping, and Rust's `%` returns
/// a negative remainder for negative operands (unlike the mathematical "mod"
/// this mapping needs).
#[must_use]
pub fn term_id_to_ring_index(term_id: i32, initial_term_id: i32) -> usize {
    let delta = i64::from(term_id.wrapping_sub(initial_term_id));
    delta.rem_euclid(i64::from(TERM_COUNT)) as usize
}
