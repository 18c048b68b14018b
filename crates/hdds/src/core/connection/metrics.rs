// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Metrics for the per-connection receive engine.
//!
//! Tracks flow-control drops and status-message emission, and snapshots
//! into the crate's telemetry frame shape for observability.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::telemetry::metrics::{DType, Field, Frame};

/// Tag for status messages sent counter
pub const TAG_STATUS_MESSAGES_SENT: u16 = 200;
/// Tag for flow-control underrun drops
pub const TAG_FLOW_CONTROL_UNDER_RUNS: u16 = 201;
/// Tag for flow-control overrun drops
pub const TAG_FLOW_CONTROL_OVER_RUNS: u16 = 202;

/// Connection-scoped metrics collector.
///
/// # Thread Safety
///
/// All methods use atomic operations (Relaxed ordering) for lock-free
/// updates; these counters are informational, not synchronization points.
#[derive(Debug, Default)]
pub struct ConnectionMetrics {
    status_messages_sent: AtomicU64,
    flow_control_under_runs: AtomicU64,
    flow_control_over_runs: AtomicU64,
}

impl ConnectionMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_status_messages_sent(&self) {
        self.status_messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_flow_control_under_runs(&self) {
        self.flow_control_under_runs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_flow_control_over_runs(&self) {
        self.flow_control_over_runs.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn status_messages_sent(&self) -> u64 {
        self.status_messages_sent.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn flow_control_under_runs(&self) -> u64 {
        self.flow_control_under_runs.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn flow_control_over_runs(&self) -> u64 {
        self.flow_control_over_runs.load(Ordering::Relaxed)
    }

    /// Snapshot current metrics into a Frame.
    #[must_use]
    pub fn snapshot(&self, ts_ns: u64) -> Frame {
        let mut frame = Frame::new(ts_ns);

        frame.push_field(Field {
            tag: TAG_STATUS_MESSAGES_SENT,
            dtype: DType::U64,
            value_u64: self.status_messages_sent.load(Ordering::Relaxed),
        });

        frame.push_field(Field {
            tag: TAG_FLOW_CONTROL_UNDER_RUNS,
            dtype: DType::U64,
            value_u64: self.flow_control_under_runs.load(Ordering::Relaxed),
        });

        frame.push_field(Field {
            tag: TAG_FLOW_CONTROL_OVER_RUNS,
            dtype: DType::U64,
            value_u64: self.flow_control_over_runs.load(Ordering::Relaxed),
        });

        frame
    }
}
