//! In-process per-stage counters.
//!
//! Observation only: calls, errors, cumulative latency and token spend per
//! stage. Thread-safe and resettable; tests construct a fresh instance
//! instead of sharing process state.

use ahash::AHashMap;
use serde::Serialize;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
struct StageCounters {
    calls: AtomicU64,
    errors: AtomicU64,
    latency_ms_total: AtomicU64,
    tokens_total: AtomicU64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StageSnapshot {
    pub stage: String,
    pub calls: u64,
    pub errors: u64,
    pub latency_ms_total: u64,
    pub tokens_total: u64,
}

#[derive(Debug, Default)]
pub struct Metrics {
    stages: RwLock<AHashMap<String, StageCounters>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, stage: &str, success: bool, latency_ms: u64, tokens: u64) {
        {
            let stages = self.stages.read().expect("metrics lock poisoned");
            if let Some(counters) = stages.get(stage) {
                bump(counters, success, latency_ms, tokens);
                return;
            }
        }
        let mut stages = self.stages.write().expect("metrics lock poisoned");
        let counters = stages.entry(stage.to_string()).or_default();
        bump(counters, success, latency_ms, tokens);
    }

    pub fn snapshot(&self) -> Vec<StageSnapshot> {
        let stages = self.stages.read().expect("metrics lock poisoned");
        let mut out: Vec<StageSnapshot> = stages
            .iter()
            .map(|(stage, c)| StageSnapshot {
                stage: stage.clone(),
                calls: c.calls.load(Ordering::Relaxed),
                errors: c.errors.load(Ordering::Relaxed),
                latency_ms_total: c.latency_ms_total.load(Ordering::Relaxed),
                tokens_total: c.tokens_total.load(Ordering::Relaxed),
            })
            .collect();
        out.sort_by(|a, b| a.stage.cmp(&b.stage));
        out
    }

    pub fn reset(&self) {
        self.stages.write().expect("metrics lock poisoned").clear();
    }
}

fn bump(counters: &StageCounters, success: bool, latency_ms: u64, tokens: u64) {
    counters.calls.fetch_add(1, Ordering::Relaxed);
    if !success {
        counters.errors.fetch_add(1, Ordering::Relaxed);
    }
    counters.latency_ms_total.fetch_add(latency_ms, Ordering::Relaxed);
    counters.tokens_total.fetch_add(tokens, Ordering::Relaxed);
}
