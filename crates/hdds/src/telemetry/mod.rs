// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Telemetry frame shape used by per-connection metrics snapshots.
//!
//! The global collector, exporter, and live-capture server this module used
//! to host served the full DDS participant; none of that is reachable from
//! `core::connection` and has been removed. What remains is the binary
//! frame shape (`metrics::{DType, Field, Frame}`) that
//! [`crate::core::connection::metrics::ConnectionMetrics::snapshot`] builds.

/// Telemetry frame field types (`DType`/`Field`/`Frame`).
pub mod metrics;

pub use metrics::{Field, Frame};
