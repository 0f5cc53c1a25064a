use std::collections::HashMap;
use std::fs;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;

use crate::collectors::io_error;
use crate::counter::{CounterKind, CounterSource};
use crate::error::{MetricError, Result};

pub fn parse_meminfo<R: BufRead>(reader: R) -> io::Result<HashMap<String, u64>> {
    let mut meminfo = HashMap::new();

    for line in reader.lines() {
        let line = line?;
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() >= 2 {
            let key = parts[0].trim_end_matches(':').to_string();
            let value = parts[1].parse().unwrap_or(0);
            meminfo.insert(key, value);
        }
    }

    Ok(meminfo)
}

/// Available memory in MB. Kernels before 3.14 lack `MemAvailable`; there
/// free + buffers + page cache is the closest estimate.
pub fn available_mb(meminfo: &HashMap<String, u64>) -> Option<f64> {
    let kb = match meminfo.get("MemAvailable") {
        Some(kb) => *kb,
        None => {
            let free = *meminfo.get("MemFree")?;
            free + meminfo.get("Buffers").copied().unwrap_or(0)
                + meminfo.get("Cached").copied().unwrap_or(0)
        }
    };
    Some(kb as f64 / 1024.0)
}

/// Instantaneous counter over `/proc/meminfo`.
pub struct MeminfoCounter {
    path: PathBuf,
}

impl MeminfoCounter {
    pub fn new() -> Self {
        Self::with_path("/proc/meminfo")
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CounterSource for MeminfoCounter {
    fn kind(&self) -> CounterKind {
        CounterKind::Instantaneous
    }

    fn next_value(&mut self) -> Result<f64> {
        let file = fs::File::open(&self.path).map_err(|e| io_error("memory", e))?;
        let meminfo = parse_meminfo(BufReader::new(file)).map_err(|e| io_error("memory", e))?;
        available_mb(&meminfo)
            .ok_or_else(|| MetricError::unavailable("memory", "no MemAvailable or MemFree in meminfo"))
    }
}
