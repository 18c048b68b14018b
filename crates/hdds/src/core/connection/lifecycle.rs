// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Connection lifecycle status and liveness bookkeeping.
//!
//! Status transitions (`ACTIVE -> INACTIVE -> LINGER`) are driven externally
//! by the conductor based on policy that lives outside this crate (liveness
//! timeouts, draining progress). This module only exposes the state
//! variable and the timestamps the conductor reads to make that decision.

use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};

/// Connection lifecycle status, numeric contract observable by the conductor.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Active = 1,
    Inactive = 2,
    Linger = 3,
}

impl ConnectionStatus {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => ConnectionStatus::Active,
            2 => ConnectionStatus::Inactive,
            3 => ConnectionStatus::Linger,
            other => unreachable!("invalid ConnectionStatus encoding: {other}"),
        }
    }
}

/// Lifecycle state: current status, time of last status change, and time of
/// last frame (accepted or dropped) from this source.
pub struct Lifecycle {
    status: AtomicU8,
    time_of_last_status_change: AtomicI64,
    time_of_last_frame: AtomicI64,
}

impl Lifecycle {
    #[must_use]
    pub fn new(now_ns: i64) -> Self {
        Self {
            status: AtomicU8::new(ConnectionStatus::Active as u8),
            time_of_last_status_change: AtomicI64::new(now_ns),
            time_of_last_frame: AtomicI64::new(now_ns),
        }
    }

    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Conductor-only: drive an externally-decided status transition.
    pub fn set_status(&self, status: ConnectionStatus, now_ns: i64) {
        self.status.store(status as u8, Ordering::Release);
        self.time_of_last_status_change.store(now_ns, Ordering::Release);
        log::debug!("connection status -> {status:?}");
    }

    #[must_use]
    pub fn time_of_last_status_change(&self) -> i64 {
        self.time_of_last_status_change.load(Ordering::Acquire)
    }

    /// Receiver-thread-only: record that a frame (accepted or dropped) just
    /// arrived from this source.
    pub fn record_frame(&self, now_ns: i64) {
        self.time_of_last_frame.store(now_ns, Ordering::Release);
    }

    #[must_use]
    pub fn time_of_last_frame(&self) -> i64 {
        self.time_of_last_frame.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_active() {
        let lifecycle = Lifecycle::new(100);
        assert_eq!(lifecycle.status(), ConnectionStatus::Active);
        assert_eq!(lifecycle.time_of_last_status_change(), 100);
        assert_eq!(lifecycle.time_of_last_frame(), 100);
    }

    #[test]
    fn test_status_transition_updates_timestamp() {
        let lifecycle = Lifecycle::new(100);
        lifecycle.set_status(ConnectionStatus::Linger, 500);
        assert_eq!(lifecycle.status(), ConnectionStatus::Linger);
        assert_eq!(lifecycle.time_of_last_status_change(), 500);
    }

    #[test]
    fn test_record_frame_updates_timestamp_only() {
        let lifecycle = Lifecycle::new(100);
        lifecycle.record_frame(999);
        assert_eq!(lifecycle.time_of_last_frame(), 999);
        assert_eq!(lifecycle.status(), ConnectionStatus::Active);
        assert_eq!(lifecycle.time_of_last_status_change(), 100);
    }
}
