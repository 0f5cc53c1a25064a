#[cfg(target_os = "linux")]
pub mod linux;

pub mod cpu;
pub mod disk;
pub mod memory;
pub mod processor;
pub mod shutdown;
pub mod system;

use std::io;

use chrono::{DateTime, Utc};

use crate::counter::CounterFactory;
use crate::error::{MetricError, Result};

/// A mounted volume as seen at query time. Never cached.
#[derive(Debug, Clone, PartialEq)]
pub struct DriveInfo {
    pub name: String,
    pub is_ready: bool,
    pub total_free_bytes: u64,
}

/// One processor object (socket). Fields the OS does not report are `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessorRecord {
    pub max_clock_speed_mhz: Option<u64>,
    pub data_width: Option<u32>,
    pub name: Option<String>,
    pub manufacturer: Option<String>,
}

pub trait DriveSource: Send + Sync {
    fn drives(&self) -> Result<Vec<DriveInfo>>;
}

pub trait ProcessorSource: Send + Sync {
    fn processors(&self) -> Result<Vec<ProcessorRecord>>;
}

pub trait ShutdownSource: Send + Sync {
    fn last_shutdown(&self) -> Result<DateTime<Utc>>;
}

pub trait HostSource: Send + Sync {
    fn host_name(&self) -> Result<String>;
}

pub(crate) fn io_error(metric: &str, e: io::Error) -> MetricError {
    match e.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => {
            MetricError::unavailable(metric, e)
        }
        _ => MetricError::transient(metric),
    }
}

/// Everything the sampler reads from the operating system.
pub struct Sources {
    pub cpu: CounterFactory,
    pub memory: CounterFactory,
    pub uptime: CounterFactory,
    pub drives: Box<dyn DriveSource>,
    pub processors: Box<dyn ProcessorSource>,
    pub shutdown: Box<dyn ShutdownSource>,
    pub host: Box<dyn HostSource>,
}

impl Sources {
    pub fn platform(drive_filter: disk::DriveFilter) -> Self {
        Self {
            cpu: Box::new(cpu::open_counter),
            memory: Box::new(memory::open_counter),
            uptime: Box::new(system::open_uptime_counter),
            drives: Box::new(disk::SysinfoDriveSource::new(drive_filter)),
            processors: processor::platform_source(),
            shutdown: shutdown::platform_source(),
            host: Box::new(system::SysinfoHost),
        }
    }
}
