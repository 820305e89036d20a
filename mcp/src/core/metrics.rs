//! In-process tool call metrics.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::Serialize;

/// Call counters and per-tool latency, updated lock-free.
pub struct ToolMetrics {
    total_calls: AtomicU64,
    successful_calls: AtomicU64,
    failed_calls: AtomicU64,
    active_calls: AtomicU64,

    per_tool: DashMap<String, ToolStats>,
}

impl ToolMetrics {
    pub fn new() -> Self {
        Self {
            total_calls: AtomicU64::new(0),
            successful_calls: AtomicU64::new(0),
            failed_calls: AtomicU64::new(0),
            active_calls: AtomicU64::new(0),
            per_tool: DashMap::new(),
        }
    }

    /// Mark a call as in flight until the returned guard drops.
    pub fn track_active(&self) -> ActiveCall<'_> {
        self.active_calls.fetch_add(1, Ordering::Relaxed);
        ActiveCall { metrics: self }
    }

    /// Record one completed call.
    pub fn record_call(&self, tool: &str, success: bool, duration_ms: u64) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successful_calls.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_calls.fetch_add(1, Ordering::Relaxed);
        }

        // Fast path avoids allocating the key once the tool has an entry.
        if let Some(stats) = self.per_tool.get(tool) {
            stats.record(success, duration_ms);
            return;
        }
        self.per_tool
            .entry(tool.to_string())
            .or_insert_with(ToolStats::new)
            .record(success, duration_ms);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_calls: self.total_calls.load(Ordering::Relaxed),
            successful_calls: self.successful_calls.load(Ordering::Relaxed),
            failed_calls: self.failed_calls.load(Ordering::Relaxed),
            active_calls: self.active_calls.load(Ordering::Relaxed),
        }
    }

    pub fn tool_stats(&self, tool: &str) -> Option<ToolStatsSnapshot> {
        self.per_tool.get(tool).map(|stats| stats.snapshot())
    }

    /// Stats for every tool seen so far, sorted by tool name.
    pub fn all_tool_stats(&self) -> Vec<(String, ToolStatsSnapshot)> {
        let mut all: Vec<_> = self
            .per_tool
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().snapshot()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    pub fn reset(&self) {
        self.total_calls.store(0, Ordering::Relaxed);
        self.successful_calls.store(0, Ordering::Relaxed);
        self.failed_calls.store(0, Ordering::Relaxed);
        // active_calls tracks in-flight work and survives a reset
        self.per_tool.clear();
    }
}

impl Default for ToolMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// In-flight marker returned by [`ToolMetrics::track_active`].
#[must_use = "the call stops counting as active when the guard drops"]
pub struct ActiveCall<'a> {
    metrics: &'a ToolMetrics,
}

impl Drop for ActiveCall<'_> {
    fn drop(&mut self) {
        self.metrics.active_calls.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Per-tool counters.
pub struct ToolStats {
    count: AtomicU64,
    errors: AtomicU64,
    total_ms: AtomicU64,
    min_ms: AtomicU64,
    max_ms: AtomicU64,
}

impl ToolStats {
    fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            total_ms: AtomicU64::new(0),
            min_ms: AtomicU64::new(u64::MAX),
            max_ms: AtomicU64::new(0),
        }
    }

    fn record(&self, success: bool, ms: u64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
        self.total_ms.fetch_add(ms, Ordering::Relaxed);

        let mut current_min = self.min_ms.load(Ordering::Relaxed);
        while ms < current_min {
            match self.min_ms.compare_exchange_weak(
                current_min,
                ms,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => current_min = actual,
            }
        }

        let mut current_max = self.max_ms.load(Ordering::Relaxed);
        while ms > current_max {
            match self.max_ms.compare_exchange_weak(
                current_max,
                ms,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => current_max = actual,
            }
        }
    }

    fn snapshot(&self) -> ToolStatsSnapshot {
        let count = self.count.load(Ordering::Relaxed);
        let total = self.total_ms.load(Ordering::Relaxed);
        let min = self.min_ms.load(Ordering::Relaxed);

        ToolStatsSnapshot {
            count,
            errors: self.errors.load(Ordering::Relaxed),
            total_ms: total,
            avg_ms: if count > 0 { total / count } else { 0 },
            min_ms: if min == u64::MAX { 0 } else { min },
            max_ms: self.max_ms.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub active_calls: u64,
}

impl MetricsSnapshot {
    /// Success rate as a percentage.
    pub fn success_rate(&self) -> f64 {
        let completed = self.successful_calls + self.failed_calls;
        if completed == 0 {
            100.0
        } else {
            (self.successful_calls as f64 / completed as f64) * 100.0
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolStatsSnapshot {
    pub count: u64,
    pub errors: u64,
    pub total_ms: u64,
    pub avg_ms: u64,
    pub min_ms: u64,
    pub max_ms: u64,
}
