#[cfg(not(target_os = "linux"))]
use sysinfo::System;

#[cfg(not(target_os = "linux"))]
use crate::error::{MetricError, Result};

#[cfg(target_os = "linux")]
use super::linux;
use super::{ProcessorRecord, ProcessorSource};

pub const FIELD_DELIMITER: &str = " / ";

/// Renders processor records as `<max clock> / <data width> / <name> /
/// <manufacturer> / ` with absent fields skipped. Records are appended one
/// after another without any socket separator, so the boundary between two
/// sockets is not recoverable from the result.
pub fn describe(records: &[ProcessorRecord]) -> String {
    let mut report = String::new();
    for record in records {
        if let Some(speed) = record.max_clock_speed_mhz {
            report.push_str(&speed.to_string());
            report.push_str(FIELD_DELIMITER);
        }
        if let Some(width) = record.data_width {
            report.push_str(&width.to_string());
            report.push_str(FIELD_DELIMITER);
        }
        if let Some(name) = &record.name {
            report.push_str(name);
            report.push_str(FIELD_DELIMITER);
        }
        if let Some(manufacturer) = &record.manufacturer {
            report.push_str(manufacturer);
            report.push_str(FIELD_DELIMITER);
        }
    }
    report
}

pub fn platform_source() -> Box<dyn ProcessorSource> {
    #[cfg(target_os = "linux")]
    {
        Box::new(linux::cpuinfo::ProcCpuinfoSource::new())
    }

    #[cfg(not(target_os = "linux"))]
    {
        Box::new(SysinfoProcessorSource)
    }
}

/// sysinfo exposes logical cores only, so this reports a single record built
/// from the first core.
#[cfg(not(target_os = "linux"))]
pub struct SysinfoProcessorSource;

#[cfg(not(target_os = "linux"))]
impl ProcessorSource for SysinfoProcessorSource {
    fn processors(&self) -> Result<Vec<ProcessorRecord>> {
        let mut system = System::new();
        system.refresh_cpu_all();

        let cpu = system
            .cpus()
            .first()
            .ok_or_else(|| MetricError::unavailable("processor", "no cpu reported"))?;
        let non_empty = |s: &str| (!s.trim().is_empty()).then(|| s.trim().to_string());

        Ok(vec![ProcessorRecord {
            max_clock_speed_mhz: Some(cpu.frequency()).filter(|mhz| *mhz > 0),
            data_width: Some(if std::env::consts::ARCH.contains("64") { 64 } else { 32 }),
            name: non_empty(cpu.brand()),
            manufacturer: non_empty(cpu.vendor_id()),
        }])
    }
}
