//! Host health snapshots.
//!
//! A [`HostHealthStatus`] is derived fresh on every orchestrator tick
//! and reported best-effort; nothing here is stored historically.

use std::sync::Mutex;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use sysinfo::System;

use crate::session::unix_ms;

/// CPU usage above this marks the host degraded.
const CPU_DEGRADED_PCT: f32 = 90.0;
/// Memory usage above this marks the host degraded.
const MEM_DEGRADED_PCT: f32 = 95.0;

// ── HostHealthStatus ─────────────────────────────────────────────

/// Point-in-time health snapshot, regenerated each tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostHealthStatus {
    pub healthy: bool,
    /// Whole-machine CPU usage, percent.
    pub cpu_usage: f32,
    /// Memory usage, percent.
    pub mem_usage: f32,
    pub active_sessions: u32,
    pub uptime_secs: u64,
    pub reported_at_ms: u64,
}

// ── HealthMonitor ────────────────────────────────────────────────

/// Samples CPU and memory through `sysinfo`.
pub struct HealthMonitor {
    sys: Mutex<System>,
    started: Instant,
}

impl HealthMonitor {
    pub fn new() -> Self {
        Self {
            sys: Mutex::new(System::new()),
            started: Instant::now(),
        }
    }

    /// Produce a fresh snapshot.
    pub fn snapshot(&self, active_sessions: u32) -> HostHealthStatus {
        let (cpu_usage, mem_usage) = {
            let mut sys = self.sys.lock().unwrap();
            sys.refresh_cpu_usage();
            sys.refresh_memory();
            let cpu = sys.global_cpu_usage();
            let mem = if sys.total_memory() == 0 {
                0.0
            } else {
                sys.used_memory() as f32 / sys.total_memory() as f32 * 100.0
            };
            (cpu, mem)
        };

        HostHealthStatus {
            healthy: cpu_usage < CPU_DEGRADED_PCT && mem_usage < MEM_DEGRADED_PCT,
            cpu_usage,
            mem_usage,
            active_sessions,
            uptime_secs: self.started.elapsed().as_secs(),
            reported_at_ms: unix_ms(),
        }
    }
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ────────────────────────────────────────────────────────
