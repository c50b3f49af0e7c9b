//! Periodic cache sweeps and status reports

use std::{sync::Arc, time::Duration};

use num_format::{Locale, ToFormattedString};
use smartroute_common::internal;
use smartroute_routing::{CacheConfig, Router};
use smartroute_table::SessionGauge;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tokio::time::{Instant, MissedTickBehavior};

/// Resident memory of this process
struct ProcessMemory {
    system: System,
    pid: Option<Pid>,
}

impl ProcessMemory {
    fn new() -> Self {
        Self {
            system: System::new(),
            pid: sysinfo::get_current_pid().ok(),
        }
    }

    fn resident_bytes(&mut self) -> Option<u64> {
        let pid = self.pid?;
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing().with_memory(),
        );
        self.system.process(pid).map(sysinfo::Process::memory)
    }

    fn describe(&mut self) -> String {
        self.resident_bytes().map_or_else(
            || "unknown".to_string(),
            |bytes| format!("{} KiB", (bytes / 1024).to_formatted_string(&Locale::en)),
        )
    }
}

pub struct Housekeeping {
    router: Arc<Router>,
    sessions: SessionGauge,
    memory: ProcessMemory,
    stats_interval: Duration,
    sweep_interval: Duration,
    last_sweep: Instant,
}

impl Housekeeping {
    pub fn new(router: Arc<Router>, sessions: SessionGauge, cache: &CacheConfig) -> Self {
        Self {
            router,
            sessions,
            memory: ProcessMemory::new(),
            stats_interval: cache.stats_interval(),
            sweep_interval: cache.sweep_interval(),
            last_sweep: Instant::now(),
        }
    }

    /// Tick period: the report interval, or the sweep interval when reports
    /// are disabled. `None` when there is nothing to do at all.
    fn period(&self) -> Option<Duration> {
        [self.stats_interval, self.sweep_interval]
            .into_iter()
            .find(|interval| !interval.is_zero())
    }

    /// Run until the task is dropped
    pub async fn run(mut self) {
        let Some(period) = self.period() else {
            internal!(level = DEBUG, "Housekeeping disabled");
            return std::future::pending().await;
        };

        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.tick();
        }
    }

    /// One housekeeping pass, returning how many cache entries were swept
    pub fn tick(&mut self) -> usize {
        let cache = self.router.mx_cache();

        if !self.stats_interval.is_zero() {
            internal!(
                level = INFO,
                "Cache items: {}, Active connections: {}, Memory (RSS): {}",
                cache.len(),
                self.sessions.active(),
                self.memory.describe()
            );
        }

        if !cache.is_enabled()
            || self.sweep_interval.is_zero()
            || self.last_sweep.elapsed() < self.sweep_interval
        {
            return 0;
        }

        self.last_sweep = Instant::now();
        let removed = cache.sweep();
        internal!(
            level = INFO,
            "Cache sweep removed {removed} expired entries, new total {}",
            cache.len()
        );

        removed
    }
}
