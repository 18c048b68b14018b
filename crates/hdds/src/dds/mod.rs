// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error type shared across the crate.
//!
//! `core::connection` is the only module left in this tree that returns a
//! `Result`: [`ConnectionConfig::new`](crate::core::connection::ConnectionConfig::new)
//! rejects an invalid construction-time configuration. The broader DDS API
//! this enum used to serve (participants, readers, writers, transport) is
//! out of scope for a per-connection receive engine and has been removed;
//! the error type keeps its original crate path rather than being moved,
//! since nothing else about its shape changed.

/// Errors returned by this crate's fallible operations.
#[derive(Debug)]
pub enum Error {
    /// A construction-time configuration value was invalid (e.g. a
    /// `term_capacity` that isn't a power of two, or a non-positive window).
    InvalidQos(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidQos(msg) => write!(f, "Invalid QoS: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

/// Convenient alias for this crate's fallible operations.
pub type Result<T> = core::result::Result<T, Error>;
