// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # Per-stream receive engine
//!
//! Tracks a single reliable, UDP-delivered stream identified by
//! `(sessionId, streamId)` on the subscriber side: reassembles datagrams
//! into a rotating three-term ring, enforces flow-control credit, schedules
//! status-message feedback to the sender, and exposes the lifecycle/liveness
//! state the conductor uses to decide when the connection is done.
//!
//! ## Modules
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | `position` | Position/term-id/ring-index arithmetic |
//! | `term` | Per-term reassembly buffer (the rebuilder) and its cleaning handshake |
//! | `config` | Validated construction-time configuration |
//! | `flow_control` | Underrun/overrun predicates |
//! | `status_message` | SM emission scheduler (inverted work-count) |
//! | `lifecycle` | `ACTIVE`/`INACTIVE`/`LINGER` status and liveness timestamps |
//! | `metrics` | Connection-scoped atomic counters |
//! | `collaborators` | Trait contracts for loss detection, SM transport, position I/O, clock |
//! | `connection` | [`connection::Connection`], composing all of the above |
//!
//! ## Architecture
//!
//! ```text
//! receiver thread --insert_into_term--> Connection --rotate--> term ring (x3)
//!                                           |
//!                                           +--> contiguous/highest position counters
//! conductor thread --clean_log_buffer/scan_for_gaps/send_pending_status_messages-->
//! ```
//!
//! No locks on the hot insertion path beyond the collaborator trait objects
//! (loss handler, SM sender, reporters), which stand in for out-of-scope
//! infrastructure the real system implements lock-free; see `DESIGN.md` for
//! the specific simplification.

pub mod collaborators;
pub mod config;
pub mod connection;
pub mod flow_control;
pub mod lifecycle;
pub mod metrics;
pub mod position;
pub mod status_message;
pub mod term;

pub use connection::Connection;
pub use config::ConnectionConfig;
pub use lifecycle::ConnectionStatus;
