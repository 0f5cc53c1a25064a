use sysinfo::System;

use crate::counter::{CounterKind, CounterSource};
use crate::error::{MetricError, Result};

use super::HostSource;

/// Seconds since boot. Handled as an elapsed-time counter: primed with a
/// discarded read like every other duration counter before it is trusted.
pub struct UptimeCounter;

impl CounterSource for UptimeCounter {
    fn kind(&self) -> CounterKind {
        CounterKind::Rate
    }

    fn next_value(&mut self) -> Result<f64> {
        match System::uptime() {
            0 => Err(MetricError::unavailable("uptime", "system reported zero uptime")),
            uptime => Ok(uptime as f64),
        }
    }
}

pub fn open_uptime_counter() -> Result<Box<dyn CounterSource>> {
    Ok(Box::new(UptimeCounter))
}

pub struct SysinfoHost;

impl HostSource for SysinfoHost {
    fn host_name(&self) -> Result<String> {
        System::host_name()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| MetricError::unavailable("machine name", "host name is not set"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::prime;

    #[test]
    fn test_uptime_counter_reads_after_priming() {
        let mut counter = open_uptime_counter().unwrap();
        prime(counter.as_mut()).unwrap();
        assert!(counter.next_value().unwrap() > 0.0);
    }

    #[test]
    fn test_host_name_is_not_empty() {
        let name = SysinfoHost.host_name().unwrap();
        assert!(!name.is_empty());
    }
}
