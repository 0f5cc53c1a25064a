use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, TimeDelta};
use tokio::task::JoinHandle;
use tracing::warn;

use crate::collectors::{
    processor, DriveInfo, DriveSource, HostSource, ProcessorSource, ShutdownSource, Sources,
};
use crate::counter::{prime, CounterFactory, LazyCounter};
use crate::error::{MetricError, Result};
use crate::format::{bytes_to_display_gb, format_timestamp, format_value, UNAVAILABLE, UNKNOWN};

pub const CPU_ENTRY: &str = "CPU";
pub const RAM_ENTRY: &str = "RAM Frei MB";

pub fn drive_entry_name(drive: &str) -> String {
    format!("GB frei auf {}", drive)
}

/// Named, already formatted metric values from one collection pass, in
/// insertion order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MetricSnapshot {
    entries: Vec<(String, String)>,
}

impl MetricSnapshot {
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    #[cfg(test)]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    pub fn lines(&self) -> impl Iterator<Item = String> + '_ {
        self.entries
            .iter()
            .map(|(name, value)| format!("{}: {}", name, value))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SystemFacts {
    pub boot_time: Result<DateTime<Local>>,
    pub last_shutdown: Result<DateTime<Local>>,
    pub processor: Result<String>,
    pub machine_name: Result<String>,
}

impl SystemFacts {
    pub fn lines(&self) -> Vec<String> {
        fn or_unknown<T>(value: &Result<T>, render: impl Fn(&T) -> String) -> String {
            value.as_ref().map(render).unwrap_or_else(|_| UNKNOWN.to_string())
        }

        vec![
            format!("Systemstart: {}", or_unknown(&self.boot_time, format_timestamp)),
            format!("Last Shutdown: {}", or_unknown(&self.last_shutdown, format_timestamp)),
            format!("CPU: {}", or_unknown(&self.processor, String::clone)),
            format!("Name: {}", or_unknown(&self.machine_name, String::clone)),
        ]
    }
}

/// Point-in-time host metrics. Owns the CPU and memory counter handles for
/// its whole lifetime; every other query goes to the OS fresh.
pub struct MetricsSampler {
    cpu: LazyCounter,
    memory: LazyCounter,
    uptime: CounterFactory,
    drives: Box<dyn DriveSource>,
    processors: Box<dyn ProcessorSource>,
    shutdown: Box<dyn ShutdownSource>,
    host: Box<dyn HostSource>,
}

impl MetricsSampler {
    pub fn new(sources: Sources) -> Self {
        MetricsSampler {
            cpu: LazyCounter::new("cpu counter", sources.cpu),
            memory: LazyCounter::new("memory counter", sources.memory),
            uptime: sources.uptime,
            drives: sources.drives,
            processors: sources.processors,
            shutdown: sources.shutdown,
            host: sources.host,
        }
    }

    /// CPU utilization in percent since the previous call.
    pub fn cpu_usage(&self) -> Result<f64> {
        self.cpu.read()
    }

    /// Available memory in MB.
    pub fn memory_usage(&self) -> Result<f64> {
        self.memory.read()
    }

    /// `now - uptime`, from an uptime counter built and primed for this call.
    pub fn boot_time(&self) -> Result<DateTime<Local>> {
        let mut counter = (self.uptime)()
            .map_err(|e| MetricError::initialization("uptime counter", e))?;
        prime(counter.as_mut())?;
        let elapsed_secs = counter.next_value()?;

        let elapsed = TimeDelta::try_milliseconds((elapsed_secs * 1000.0) as i64)
            .ok_or_else(|| MetricError::unavailable("boot time", "uptime out of range"))?;
        Ok(Local::now() - elapsed)
    }

    pub fn last_shutdown_time(&self) -> Result<DateTime<Local>> {
        self.shutdown
            .last_shutdown()
            .map(|timestamp| timestamp.with_timezone(&Local))
    }

    pub fn processor_description(&self) -> Result<String> {
        let records = self.processors.processors()?;
        Ok(processor::describe(&records))
    }

    pub fn machine_name(&self) -> Result<String> {
        self.host.host_name()
    }

    pub fn drives(&self) -> Result<Vec<DriveInfo>> {
        self.drives.drives()
    }

    pub fn collect_snapshot(&self) -> MetricSnapshot {
        assemble_snapshot(self.cpu_usage(), self.memory_usage(), self.drives())
    }

    pub fn system_facts(&self) -> SystemFacts {
        SystemFacts {
            boot_time: self.boot_time(),
            last_shutdown: self.last_shutdown_time(),
            processor: self.processor_description(),
            machine_name: self.machine_name(),
        }
    }
}

fn render_metric(name: &str, value: Result<f64>) -> String {
    match value {
        Ok(value) => format_value(value),
        Err(e) => {
            warn!("{} not collected: {}", name, e);
            UNAVAILABLE.to_string()
        }
    }
}

/// CPU and RAM always get an entry; drives only when ready. A failed drive
/// enumeration contributes nothing.
fn assemble_snapshot(
    cpu: Result<f64>,
    memory: Result<f64>,
    drives: Result<Vec<DriveInfo>>,
) -> MetricSnapshot {
    let mut snapshot = MetricSnapshot::default();
    snapshot.push(CPU_ENTRY, render_metric(CPU_ENTRY, cpu));
    snapshot.push(RAM_ENTRY, render_metric(RAM_ENTRY, memory));

    match drives {
        Ok(drives) => {
            for drive in drives.into_iter().filter(|drive| drive.is_ready) {
                snapshot.push(
                    drive_entry_name(&drive.name),
                    format_value(bytes_to_display_gb(drive.total_free_bytes)),
                );
            }
        }
        Err(e) => warn!("Drive enumeration failed: {}", e),
    }

    snapshot
}

/// Starts one blocking sampler query on the blocking pool.
pub fn spawn_query<T, F>(sampler: &Arc<MetricsSampler>, f: F) -> JoinHandle<Result<T>>
where
    F: FnOnce(&MetricsSampler) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let sampler = sampler.clone();
    tokio::task::spawn_blocking(move || f(&sampler))
}

/// Waits up to `timeout` for a query started by `spawn_query`. A timeout or a
/// panicked query is a transient failure for this call only. On timeout the
/// task is still running and `task` can be polled again later.
pub async fn await_query<T>(
    task: &mut JoinHandle<Result<T>>,
    timeout: Duration,
    metric: &'static str,
) -> Result<T> {
    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => {
            warn!("{} query aborted: {}", metric, e);
            Err(MetricError::transient(metric))
        }
        Err(_) => {
            warn!("{} query timed out after {:?}", metric, timeout);
            Err(MetricError::transient(metric))
        }
    }
}

/// Runs one blocking sampler query bounded by `timeout`. A query that times
/// out is left to finish in the background.
pub async fn query<T, F>(
    sampler: &Arc<MetricsSampler>,
    timeout: Duration,
    metric: &'static str,
    f: F,
) -> Result<T>
where
    F: FnOnce(&MetricsSampler) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let mut task = spawn_query(sampler, f);
    await_query(&mut task, timeout, metric).await
}

/// `collect_snapshot` with every entry bounded by `timeout`.
pub async fn collect_snapshot_bounded(
    sampler: &Arc<MetricsSampler>,
    timeout: Duration,
) -> MetricSnapshot {
    let cpu = query(sampler, timeout, "cpu", |s| s.cpu_usage()).await;
    let memory = query(sampler, timeout, "memory", |s| s.memory_usage()).await;
    let drives = query(sampler, timeout, "drives", |s| s.drives()).await;
    assemble_snapshot(cpu, memory, drives)
}

/// `system_facts` with every fact bounded by `timeout`.
pub async fn system_facts_bounded(sampler: &Arc<MetricsSampler>, timeout: Duration) -> SystemFacts {
    SystemFacts {
        boot_time: query(sampler, timeout, "boot time", |s| s.boot_time()).await,
        last_shutdown: query(sampler, timeout, "last shutdown", |s| s.last_shutdown_time()).await,
        processor: query(sampler, timeout, "processor", |s| s.processor_description()).await,
        machine_name: query(sampler, timeout, "machine name", |s| s.machine_name()).await,
    }
}
