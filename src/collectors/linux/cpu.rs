use std::fs;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::time::Duration;

use crate::collectors::io_error;
use crate::counter::{CounterKind, CounterSource};
use crate::error::{MetricError, Result};

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct CpuTimes {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
}

impl std::ops::Sub for CpuTimes {
    type Output = Self;

    fn sub(self, other: Self) -> Self::Output {
        Self {
            user: self.user.saturating_sub(other.user),
            nice: self.nice.saturating_sub(other.nice),
            system: self.system.saturating_sub(other.system),
            idle: self.idle.saturating_sub(other.idle),
            iowait: self.iowait.saturating_sub(other.iowait),
            irq: self.irq.saturating_sub(other.irq),
            softirq: self.softirq.saturating_sub(other.softirq),
            steal: self.steal.saturating_sub(other.steal),
        }
    }
}

impl CpuTimes {
    // guest and guest_nice are already accounted in user and nice.
    pub fn total(&self) -> u64 {
        self.user
            + self.nice
            + self.system
            + self.idle
            + self.iowait
            + self.irq
            + self.softirq
            + self.steal
    }

    pub fn busy_percent(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        let idle = self.idle + self.iowait;
        (total - idle) as f64 * 100.0 / total as f64
    }
}

/// Reads the aggregate `cpu` line of `/proc/stat`.
pub fn parse_aggregate<R: BufRead>(reader: R) -> io::Result<Option<CpuTimes>> {
    for line in reader.lines() {
        let line = line?;
        if !line.starts_with("cpu ") {
            continue;
        }
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 9 {
            return Ok(None);
        }
        let field = |i: usize| parts[i].parse().unwrap_or(0);
        return Ok(Some(CpuTimes {
            user: field(1),
            nice: field(2),
            system: field(3),
            idle: field(4),
            iowait: field(5),
            irq: field(6),
            softirq: field(7),
            steal: field(8),
        }));
    }
    Ok(None)
}

/// Total CPU utilization derived from consecutive `/proc/stat` samples. The
/// first read has nothing to diff against and reports 0.
pub struct ProcStatCpuCounter {
    path: PathBuf,
    last: Option<CpuTimes>,
}

impl ProcStatCpuCounter {
    pub fn new() -> Self {
        Self::with_path("/proc/stat")
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last: None,
        }
    }

    fn sample(&self) -> Result<CpuTimes> {
        let file = fs::File::open(&self.path).map_err(|e| io_error("cpu", e))?;
        parse_aggregate(BufReader::new(file))
            .map_err(|e| io_error("cpu", e))?
            .ok_or_else(|| MetricError::unavailable("cpu", "no aggregate cpu line in /proc/stat"))
    }

    fn update(&mut self, current: CpuTimes) -> f64 {
        let usage = match self.last {
            Some(last) => (current - last).busy_percent(),
            None => 0.0,
        };
        self.last = Some(current);
        usage
    }
}

impl CounterSource for ProcStatCpuCounter {
    fn kind(&self) -> CounterKind {
        CounterKind::Rate
    }

    fn next_value(&mut self) -> Result<f64> {
        let current = self.sample()?;
        Ok(self.update(current))
    }

    fn settle_interval(&self) -> Duration {
        sysinfo::MINIMUM_CPU_UPDATE_INTERVAL
    }
}
