// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Per-handle invocation counters.

use std::time::Duration;

/// Cumulative counters for one [`Single`](crate::Single) handle.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct InvocationMetrics {
    /// Invocations that passed validation and reached the backend.
    pub accepted: u64,
    /// Backend calls that returned success.
    pub succeeded: u64,
    /// Backend calls that returned an error.
    pub failed: u64,
    /// Callers that stopped waiting before the backend finished.
    pub timed_out: u64,
    /// Calls rejected because another invocation was in flight.
    pub rejected_busy: u64,
    /// Late outputs handed back through the deferred-release path.
    pub late_outputs_released: u64,
    /// Duration of the most recent backend call.
    pub last_latency: Duration,
    /// Sum of all backend call durations.
    pub total_latency: Duration,
}

impl InvocationMetrics {
    pub(crate) fn record_completion(&mut self, ok: bool, latency: Duration) {
        if ok {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.last_latency = latency;
        self.total_latency += latency;
    }

    /// Mean backend latency over completed calls.
    pub fn mean_latency(&self) -> Duration {
        let done = self.succeeded + self.failed;
        if done == 0 {
            return Duration::ZERO;
        }
        let nanos = self.total_latency.as_nanos() / u128::from(done);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    /// One-line summary suitable for CLI output.
    pub fn summary(&self) -> String {
        format!(
            "{} accepted, {} ok, {} failed, {} timed out, {} busy, \
             {} late released, mean {:.3}ms, last {:.3}ms",
            self.accepted,
            self.succeeded,
            self.failed,
            self.timed_out,
            self.rejected_busy,
            self.late_outputs_released,
            self.mean_latency().as_secs_f64() * 1000.0,
            self.last_latency.as_secs_f64() * 1000.0,
        )
    }
}
