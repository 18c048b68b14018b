// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Status-message (SM) scheduler: decides when to emit flow-control
//! feedback to the sender.
//!
//! The scheduler returns a work-count of **0 when it emits an SM** and
//! **1 when it is idle** -- inverted relative to what most callers would
//! guess. This is deliberate: the outer conductor loop treats a returned
//! `0` as "useful work happened, poll again soon" and a `1` as "idle, back
//! off". Do not "fix" this.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicI64, Ordering};

use crate::core::connection::collaborators::StatusMessageSender;
use crate::core::connection::metrics::ConnectionMetrics;

/// Sentinel for "no SM has ever been sent on this connection".
const NO_SM_SENT: i64 = 0;

pub struct StatusMessageScheduler {
    current_window_size: i32,
    current_gain: i32,
    status_message_timeout_ns: i64,
    enabled: AtomicBool,
    last_sm_term_id: AtomicI32,
    last_sm_position: AtomicI64,
    last_sm_timestamp: AtomicI64,
}

impl StatusMessageScheduler {
    #[must_use]
    pub fn new(current_window_size: i32, current_gain: i32, status_message_timeout_ns: i64) -> Self {
        Self {
            current_window_size,
            current_gain,
            status_message_timeout_ns,
            enabled: AtomicBool::new(false),
            last_sm_term_id: AtomicI32::new(0),
            last_sm_position: AtomicI64::new(0),
            last_sm_timestamp: AtomicI64::new(NO_SM_SENT),
        }
    }

    /// Receiver-thread-only: called once the connection has been installed
    /// in the dispatcher and is eligible to advertise flow-control credit.
    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Relaxed);
    }

    /// Receiver-thread-only.
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Conductor-only: evaluate the four emission conditions and, if any
    /// hold, send an SM. Returns `0` if an SM was sent, `1` if idle.
    pub fn send_pending_status_message(
        &self,
        now_ns: i64,
        subscriber_term_id: i32,
        subscriber_term_offset: i32,
        subscriber_position: i64,
        sender: &mut dyn StatusMessageSender,
        metrics: &ConnectionMetrics,
    ) -> i32 {
        if !self.is_enabled() {
            return 1;
        }

        let last_timestamp = self.last_sm_timestamp.load(Ordering::Relaxed);
        let last_term_id = self.last_sm_term_id.load(Ordering::Relaxed);
        let last_position = self.last_sm_position.load(Ordering::Relaxed);

        let is_initial = last_timestamp == NO_SM_SENT;
        let term_rotated = subscriber_term_id != last_term_id;
        let progress_exceeds_gain = subscriber_position - last_position > i64::from(self.current_gain);
        let timed_out = now_ns - last_timestamp > self.status_message_timeout_ns;

        if is_initial || term_rotated || progress_exceeds_gain || timed_out {
            sender.send(subscriber_term_id, subscriber_term_offset, self.current_window_size);
            metrics.increment_status_messages_sent();

            self.last_sm_term_id.store(subscriber_term_id, Ordering::Relaxed);
            self.last_sm_position.store(subscriber_position, Ordering::Relaxed);
            self.last_sm_timestamp.store(now_ns, Ordering::Relaxed);

            log::debug!(
                "status message sent: term_id={subscriber_term_id} offset={subscriber_term_offset} \
                 window={} (initial={is_initial} rotated={term_rotated} gain={progress_exceeds_gain} \
                 timeout={timed_out})",
                self.current_window_size
            );
            0
        } else {
            1
        }
    }
}
