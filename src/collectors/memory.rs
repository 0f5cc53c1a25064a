#[cfg(not(target_os = "linux"))]
use sysinfo::System;

use crate::counter::CounterSource;
#[cfg(not(target_os = "linux"))]
use crate::counter::CounterKind;
use crate::error::Result;

#[cfg(target_os = "linux")]
use super::linux;

/// Builds the available-memory counter (MB). Instantaneous on every
/// platform, so it is never primed.
pub fn open_counter() -> Result<Box<dyn CounterSource>> {
    #[cfg(target_os = "linux")]
    {
        Ok(Box::new(linux::memory::MeminfoCounter::new()))
    }

    #[cfg(not(target_os = "linux"))]
    {
        Ok(Box::new(SysinfoMemoryCounter::new()))
    }
}

#[cfg(not(target_os = "linux"))]
pub struct SysinfoMemoryCounter {
    system: System,
}

#[cfg(not(target_os = "linux"))]
impl SysinfoMemoryCounter {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

#[cfg(not(target_os = "linux"))]
impl CounterSource for SysinfoMemoryCounter {
    fn kind(&self) -> CounterKind {
        CounterKind::Instantaneous
    }

    fn next_value(&mut self) -> Result<f64> {
        self.system.refresh_memory();
        Ok(self.system.available_memory() as f64 / 1024.0 / 1024.0)
    }
}
