use std::collections::HashMap;
use std::fs;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::collectors::{io_error, ProcessorRecord, ProcessorSource};
use crate::error::{MetricError, Result};

static FIELD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([^\t:]+?)\s*:\s*(.*)$").unwrap()
});

/// First logical processor seen for each physical package.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CpuinfoSocket {
    pub physical_id: String,
    pub first_processor: Option<u32>,
    pub model_name: Option<String>,
    pub vendor_id: Option<String>,
    pub mhz: Option<f64>,
    pub long_mode: Option<bool>,
}

pub fn parse_cpuinfo<R: BufRead>(reader: R) -> io::Result<Vec<CpuinfoSocket>> {
    let mut sockets = Vec::new();
    let mut block = HashMap::new();

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            flush_block(&mut sockets, &mut block);
            continue;
        }
        if let Some(caps) = FIELD_RE.captures(&line) {
            block.insert(caps[1].to_string(), caps[2].trim().to_string());
        }
    }
    flush_block(&mut sockets, &mut block);

    Ok(sockets)
}

fn flush_block(sockets: &mut Vec<CpuinfoSocket>, block: &mut HashMap<String, String>) {
    // Trailing blocks on ARM (Hardware, Revision, Serial) describe the board.
    if !block.contains_key("processor") {
        block.clear();
        return;
    }

    let physical_id = block
        .get("physical id")
        .cloned()
        .unwrap_or_else(|| "0".to_string());

    if !sockets.iter().any(|s: &CpuinfoSocket| s.physical_id == physical_id) {
        sockets.push(CpuinfoSocket {
            physical_id,
            first_processor: block.get("processor").and_then(|p| p.parse().ok()),
            model_name: block.get("model name").cloned(),
            vendor_id: block.get("vendor_id").cloned(),
            mhz: block.get("cpu MHz").and_then(|v| v.parse().ok()),
            long_mode: block
                .get("flags")
                .map(|flags| flags.split_whitespace().any(|flag| flag == "lm")),
        });
    }
    block.clear();
}

fn read_max_freq_mhz(cpu_root: &Path, processor: u32) -> Option<u64> {
    let path = cpu_root.join(format!("cpu{}/cpufreq/cpuinfo_max_freq", processor));
    let khz = fs::read_to_string(path).ok()?.trim().parse::<u64>().ok()?;
    Some(khz / 1000)
}

/// One processor record per physical package, from `/proc/cpuinfo` and the
/// cpufreq sysfs tree.
pub struct ProcCpuinfoSource {
    cpuinfo_path: PathBuf,
    cpu_root: PathBuf,
}

impl ProcCpuinfoSource {
    pub fn new() -> Self {
        Self::with_paths("/proc/cpuinfo", "/sys/devices/system/cpu")
    }

    pub fn with_paths(cpuinfo_path: impl Into<PathBuf>, cpu_root: impl Into<PathBuf>) -> Self {
        Self {
            cpuinfo_path: cpuinfo_path.into(),
            cpu_root: cpu_root.into(),
        }
    }

    fn record(&self, socket: CpuinfoSocket) -> ProcessorRecord {
        // Virtual machines often lack cpufreq; the reported current clock is
        // the best remaining figure.
        let max_clock_speed_mhz = socket
            .first_processor
            .and_then(|n| read_max_freq_mhz(&self.cpu_root, n))
            .or_else(|| socket.mhz.map(|mhz| mhz.round() as u64));

        ProcessorRecord {
            max_clock_speed_mhz,
            data_width: socket.long_mode.map(|lm| if lm { 64 } else { 32 }),
            name: socket.model_name,
            manufacturer: socket.vendor_id,
        }
    }
}

impl ProcessorSource for ProcCpuinfoSource {
    fn processors(&self) -> Result<Vec<ProcessorRecord>> {
        let file = fs::File::open(&self.cpuinfo_path).map_err(|e| io_error("processor", e))?;
        let sockets = parse_cpuinfo(BufReader::new(file)).map_err(|e| io_error("processor", e))?;
        if sockets.is_empty() {
            return Err(MetricError::unavailable("processor", "no processor entries in cpuinfo"));
        }
        Ok(sockets.into_iter().map(|socket| self.record(socket)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const TWO_SOCKET_CPUINFO: &str = "processor\t: 0
vendor_id\t: GenuineIntel
model name\t: Intel(R) Xeon(R) CPU E5-2680 v4 @ 2.40GHz
cpu MHz\t\t: 1200.000
physical id\t: 0
flags\t\t: fpu vme de pse tsc msr pae mce cx8 lm constant_tsc

processor\t: 1
vendor_id\t: GenuineIntel
model name\t: Intel(R) Xeon(R) CPU E5-2680 v4 @ 2.40GHz
cpu MHz\t\t: 1300.000
physical id\t: 0
flags\t\t: fpu vme de pse tsc msr pae mce cx8 lm constant_tsc

processor\t: 2
vendor_id\t: GenuineIntel
model name\t: Intel(R) Xeon(R) CPU E5-2680 v4 @ 2.40GHz
cpu MHz\t\t: 2399.812
physical id\t: 1
flags\t\t: fpu vme de pse tsc msr pae mce cx8 lm constant_tsc

";

    const ARM_CPUINFO: &str = "processor\t: 0
model name\t: ARMv7 Processor rev 4 (v7l)
BogoMIPS\t: 38.40
Features\t: half thumb fastmult vfp edsp neon

Hardware\t: BCM2835
Revision\t: a02082
";

    #[test]
    fn test_parse_cpuinfo_groups_by_physical_package() {
        let sockets = parse_cpuinfo(Cursor::new(TWO_SOCKET_CPUINFO)).unwrap();

        assert_eq!(sockets.len(), 2);
        assert_eq!(sockets[0].physical_id, "0");
        assert_eq!(sockets[0].first_processor, Some(0));
        assert_eq!(sockets[0].mhz, Some(1200.0));
        assert_eq!(sockets[0].long_mode, Some(true));
        assert_eq!(sockets[1].physical_id, "1");
        assert_eq!(sockets[1].first_processor, Some(2));
        assert_eq!(sockets[1].vendor_id.as_deref(), Some("GenuineIntel"));
    }

    #[test]
    fn test_parse_cpuinfo_skips_board_block() {
        let sockets = parse_cpuinfo(Cursor::new(ARM_CPUINFO)).unwrap();

        assert_eq!(sockets.len(), 1);
        assert_eq!(sockets[0].model_name.as_deref(), Some("ARMv7 Processor rev 4 (v7l)"));
        assert_eq!(sockets[0].vendor_id, None);
        assert_eq!(sockets[0].long_mode, None);
    }

    #[test]
    fn test_source_reads_max_freq_from_sysfs() {
        let dir = tempfile::tempdir().unwrap();
        let cpuinfo = dir.path().join("cpuinfo");
        fs::write(&cpuinfo, TWO_SOCKET_CPUINFO).unwrap();
        let cpu_root = dir.path().join("cpu");
        fs::create_dir_all(cpu_root.join("cpu0/cpufreq")).unwrap();
        fs::write(cpu_root.join("cpu0/cpufreq/cpuinfo_max_freq"), "3300000\n").unwrap();

        let records = ProcCpuinfoSource::with_paths(&cpuinfo, &cpu_root).processors().unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].max_clock_speed_mhz, Some(3300));
        assert_eq!(records[0].data_width, Some(64));
        assert_eq!(
            records[0].name.as_deref(),
            Some("Intel(R) Xeon(R) CPU E5-2680 v4 @ 2.40GHz")
        );
        // No cpufreq for cpu2, falls back to the reported clock.
        assert_eq!(records[1].max_clock_speed_mhz, Some(2400));
    }

    #[test]
    fn test_empty_cpuinfo_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let cpuinfo = dir.path().join("cpuinfo");
        fs::write(&cpuinfo, "").unwrap();

        let source = ProcCpuinfoSource::with_paths(&cpuinfo, dir.path());
        assert!(matches!(
            source.processors(),
            Err(MetricError::MetricUnavailable { .. })
        ));
    }
}
