//! Relay counters exposed through the health and metrics endpoints.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Process-lifetime counters. Increments are relaxed; readers only ever
/// see point-in-time snapshots.
pub struct RelayMetrics {
    chat_requests_started: AtomicU64,
    chat_requests_completed: AtomicU64,
    chat_requests_failed: AtomicU64,
    deltas_forwarded: AtomicU64,
    malformed_frames: AtomicU64,
    sessions_cleared: AtomicU64,
    start_time: Instant,
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self {
            chat_requests_started: AtomicU64::new(0),
            chat_requests_completed: AtomicU64::new(0),
            chat_requests_failed: AtomicU64::new(0),
            deltas_forwarded: AtomicU64::new(0),
            malformed_frames: AtomicU64::new(0),
            sessions_cleared: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_request_started(&self) {
        self.chat_requests_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_request_completed(&self) {
        self.chat_requests_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_request_failed(&self) {
        self.chat_requests_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delta_forwarded(&self) {
        self.deltas_forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed_frame(&self) {
        self.malformed_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_cleared(&self) {
        self.sessions_cleared.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.uptime_secs(),
            requests: RequestCounters {
                started: self.chat_requests_started.load(Ordering::Relaxed),
                completed: self.chat_requests_completed.load(Ordering::Relaxed),
                failed: self.chat_requests_failed.load(Ordering::Relaxed),
            },
            stream: StreamCounters {
                deltas_forwarded: self.deltas_forwarded.load(Ordering::Relaxed),
                malformed_frames: self.malformed_frames.load(Ordering::Relaxed),
            },
            sessions_cleared: self.sessions_cleared.load(Ordering::Relaxed),
        }
    }
}

impl Default for RelayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub requests: RequestCounters,
    pub stream: StreamCounters,
    pub sessions_cleared: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestCounters {
    pub started: u64,
    pub completed: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamCounters {
    pub deltas_forwarded: u64,
    pub malformed_frames: u64,
}

/// Payload for the health endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub database: String,
    pub uptime_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_into_the_snapshot() {
        let metrics = RelayMetrics::new();
        metrics.record_request_started();
        metrics.record_request_started();
        metrics.record_request_completed();
        metrics.record_request_failed();
        metrics.record_delta_forwarded();
        metrics.record_malformed_frame();
        metrics.record_session_cleared();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests.started, 2);
        assert_eq!(snapshot.requests.completed, 1);
        assert_eq!(snapshot.requests.failed, 1);
        assert_eq!(snapshot.stream.deltas_forwarded, 1);
        assert_eq!(snapshot.stream.malformed_frames, 1);
        assert_eq!(snapshot.sessions_cleared, 1);
    }

    #[test]
    fn snapshot_serializes_to_json() {
        let metrics = RelayMetrics::new();
        metrics.record_delta_forwarded();
        let json = serde_json::to_value(metrics.snapshot()).unwrap();
        assert_eq!(json["stream"]["deltas_forwarded"], 1);
        assert_eq!(json["requests"]["started"], 0);
    }
}
