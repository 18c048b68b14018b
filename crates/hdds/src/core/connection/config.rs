// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Construction-time configuration for a [`super::connection::Connection`].
//!
//! A small, validated, `Copy` struct built once per connection, with the
//! derived window/gain quantities computed at construction instead of
//! recomputed per packet.

use crate::core::connection::position::position_bits_to_shift;
use crate::dds::{Error, Result};

/// Validated, immutable configuration for one connection's lifetime.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionConfig {
    term_capacity: i32,
    initial_term_id: i32,
    position_bits_to_shift: u32,
    term_window_size: i32,
    current_window_size: i32,
    current_gain: i32,
    status_message_timeout_ns: i64,
}

impl ConnectionConfig {
    /// Build and validate a configuration.
    ///
    /// `subscription_window` is the subscriber-advertised receive window;
    /// the effective term window is `min(term_capacity / 2, subscription_window)`.
    /// `initial_window_size` is the caller-supplied starting credit;
    /// `currentWindowSize = min(termWindowSize, initialWindowSize)`, and the
    /// initial SM gain is `min(currentWindowSize / 4, termCapacity / 4)`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidQos`] if `term_capacity` is not a positive
    /// power of two, or if `subscription_window`/`initial_window_size` is
    /// not positive.
    pub fn new(
        term_capacity: i32,
        initial_term_id: i32,
        subscription_window: i32,
        initial_window_size: i32,
        status_message_timeout_ns: i64,
    ) -> Result<Self> {
        if term_capacity <= 0 || !term_capacity.is_power_of_two() {
            return Err(Error::InvalidQos(format!(
                "term_capacity must be a positive power of two, got {term_capacity}"
            )));
        }
        if subscription_window <= 0 {
            return Err(Error::InvalidQos(format!(
                "subscription_window must be positive, got {subscription_window}"
            )));
        }
        if initial_window_size <= 0 {
            return Err(Error::InvalidQos(format!(
                "initial_window_size must be positive, got {initial_window_size}"
            )));
        }
        if status_message_timeout_ns <= 0 {
            return Err(Error::InvalidQos(format!(
                "status_message_timeout_ns must be positive, got {status_message_timeout_ns}"
            )));
        }

        let position_bits_to_shift = position_bits_to_shift(term_capacity);
        let term_window_size = (term_capacity / 2).min(subscription_window);
        let current_window_size = term_window_size.min(initial_window_size);
        let current_gain = (current_window_size / 4).min(term_capacity / 4);

        Ok(Self {
            term_capacity,
            initial_term_id,
            position_bits_to_shift,
            term_window_size,
            current_window_size,
            current_gain,
            status_message_timeout_ns,
        })
    }

    #[must_use]
    pub fn term_capacity(&self) -> i32 {
        self.term_capacity
    }

    #[must_use]
    pub fn initial_term_id(&self) -> i32 {
        self.initial_term_id
    }

    #[must_use]
    pub fn position_bits_to_shift(&self) -> u32 {
        self.position_bits_to_shift
    }

    #[must_use]
    pub fn term_window_size(&self) -> i32 {
        self.term_window_size
    }

    #[must_use]
    pub fn current_window_size(&self) -> i32 {
        self.current_window_size
    }

    #[must_use]
    pub fn current_gain(&self) -> i32 {
        self.current_gain
    }

    #[must_use]
    pub fn status_message_timeout_ns(&self) -> i64 {
        self.status_message_timeout_ns
    }
}
