#[cfg(not(target_os = "linux"))]
use std::time::Duration;

#[cfg(not(target_os = "linux"))]
use sysinfo::System;

use crate::counter::CounterSource;
#[cfg(not(target_os = "linux"))]
use crate::counter::CounterKind;
use crate::error::Result;

#[cfg(target_os = "linux")]
use super::linux;

/// Builds the total CPU utilization counter. Both implementations are rate
/// counters and get primed by the caller's `LazyCounter`.
pub fn open_counter() -> Result<Box<dyn CounterSource>> {
    #[cfg(target_os = "linux")]
    {
        Ok(Box::new(linux::cpu::ProcStatCpuCounter::new()))
    }

    #[cfg(not(target_os = "linux"))]
    {
        Ok(Box::new(SysinfoCpuCounter::new()))
    }
}

#[cfg(not(target_os = "linux"))]
pub struct SysinfoCpuCounter {
    system: System,
}

#[cfg(not(target_os = "linux"))]
impl SysinfoCpuCounter {
    pub fn new() -> Self {
        SysinfoCpuCounter {
            system: System::new(),
        }
    }
}

#[cfg(not(target_os = "linux"))]
impl CounterSource for SysinfoCpuCounter {
    fn kind(&self) -> CounterKind {
        CounterKind::Rate
    }

    fn next_value(&mut self) -> Result<f64> {
        self.system.refresh_cpu_usage();
        Ok(self.system.global_cpu_usage() as f64)
    }

    fn settle_interval(&self) -> Duration {
        sysinfo::MINIMUM_CPU_UPDATE_INTERVAL
    }
}
