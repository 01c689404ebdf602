use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Monotonic counters for one bridge.
#[derive(Debug, Default)]
pub struct DispatchStats {
    delivered: AtomicU64,
    malformed: AtomicU64,
    unknown_module: AtomicU64,
    unknown_channel: AtomicU64,
    shape_mismatch: AtomicU64,
    subscriber_failures: AtomicU64,
    sent: AtomicU64,
    send_failures: AtomicU64,
}

/// Point-in-time copy of [`DispatchStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub delivered: u64,
    pub malformed: u64,
    pub unknown_module: u64,
    pub unknown_channel: u64,
    pub shape_mismatch: u64,
    pub subscriber_failures: u64,
    pub sent: u64,
    pub send_failures: u64,
}

impl StatsSnapshot {
    pub fn dropped(&self) -> u64 {
        self.malformed + self.unknown_module + self.unknown_channel + self.shape_mismatch
    }
}

fn bump(counter: &AtomicU64, n: u64) {
    counter.fetch_add(n, Ordering::Relaxed);
}

impl DispatchStats {
    pub(crate) fn record_delivered(&self, subscriber_failures: usize) {
        bump(&self.delivered, 1);
        bump(&self.subscriber_failures, subscriber_failures as u64);
    }

    pub(crate) fn record_malformed(&self) {
        bump(&self.malformed, 1);
    }

    pub(crate) fn record_unknown_module(&self) {
        bump(&self.unknown_module, 1);
    }

    pub(crate) fn record_unknown_channel(&self) {
        bump(&self.unknown_channel, 1);
    }

    pub(crate) fn record_shape_mismatch(&self) {
        bump(&self.shape_mismatch, 1);
    }

    pub(crate) fn record_sent(&self) {
        bump(&self.sent, 1);
    }

    pub(crate) fn record_send_failure(&self) {
        bump(&self.send_failures, 1);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            delivered: get(&self.delivered),
            malformed: get(&self.malformed),
            unknown_module: get(&self.unknown_module),
            unknown_channel: get(&self.unknown_channel),
            shape_mismatch: get(&self.shape_mismatch),
            subscriber_failures: get(&self.subscriber_failures),
            sent: get(&self.sent),
            send_failures: get(&self.send_failures),
        }
    }
}
