// SPDX-FileCopyrightText: 2026 Chorus Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Relay metric descriptions and recording helpers.
//!
//! Recorded through the metrics facade; without an installed recorder the
//! calls are no-ops.

use chorus_core::{FailureKind, RelayMode};
use metrics::describe_counter;

/// Registers the relay's metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn describe_metrics() {
    describe_counter!("chorus_relay_sent_total", "Messages delivered, by relay mode");
    describe_counter!("chorus_relay_failed_total", "Failed sends, by failure kind");
    describe_counter!(
        "chorus_relay_rate_limited_total",
        "Flood waits imposed by the platform"
    );
}

pub fn record_sent(mode: RelayMode) {
    metrics::counter!("chorus_relay_sent_total", "mode" => mode.to_string()).increment(1);
}

pub fn record_failure(kind: FailureKind) {
    metrics::counter!("chorus_relay_failed_total", "kind" => kind.to_string()).increment(1);
}

pub fn record_rate_limited() {
    metrics::counter!("chorus_relay_rate_limited_total").increment(1);
}
