// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # hdds — per-connection receive engine
//!
//! The server-side (subscriber) state machine for a single reliable,
//! UDP-delivered stream identified by `(sessionId, streamId)`: reassembles
//! datagrams into a rotating three-term ring, enforces flow-control credit,
//! schedules status-message feedback to the sender, and exposes the
//! lifecycle/liveness state an external conductor uses to decide when the
//! connection is done.
//!
//! ## Quick Start
//!
//! ```text
//! let config = ConnectionConfig::new(term_capacity, initial_term_id,
//!     subscription_window, initial_window_size, status_message_timeout_ns)?;
//! let conn = Connection::new(session_id, stream_id, receive_channel_endpoint,
//!     config, loss_handler, sm_sender, contiguous_reporter, highest_reporter,
//!     subscriber_indicator, clock);
//! conn.enable_status_messages();
//!
//! // receiver thread:
//! conn.insert_into_term(term_id, term_offset, length, payload);
//!
//! // conductor thread:
//! conn.clean_log_buffer();
//! conn.scan_for_gaps();
//! conn.send_pending_status_messages(now_ns);
//! ```
//!
//! See [`core::connection::Connection`] and
//! [`core::connection::collaborators`] for the concrete types.
//!
//! ## Modules
//!
//! - [`core::connection`] — the receive engine itself (start here)
//! - [`dds`] — the crate's error type
//! - [`telemetry`] — the binary telemetry frame shape metrics snapshot into
//!
//! ## Out of scope
//!
//! The conductor loop, the UDP channel endpoint, the loss-detection helper,
//! the status-message transport, and the shared-memory log buffer allocator
//! are external collaborators, modeled here as narrow traits
//! ([`core::connection::collaborators`]) rather than implemented. No
//! congestion control beyond fixed-window flow control, no encryption, no
//! multi-subscriber aggregation across a single connection, no reordering
//! above the term level.

/// Core RTPS-style per-connection receive engine.
pub mod core;
/// This crate's error type.
pub mod dds;
/// Telemetry frame shape used by [`core::connection::metrics::ConnectionMetrics`].
pub mod telemetry;

pub use core::connection::{Connection, ConnectionConfig, ConnectionStatus};
pub use dds::{Error, Result};
