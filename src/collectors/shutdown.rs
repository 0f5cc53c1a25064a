use chrono::{DateTime, Utc};

use crate::error::{MetricError, Result};

#[cfg(target_os = "linux")]
use super::linux;
use super::ShutdownSource;

/// 100 ns ticks between 1601-01-01 and the Unix epoch.
const FILETIME_UNIX_EPOCH: i64 = 116_444_736_000_000_000;
const FILETIME_TICKS_PER_SEC: i64 = 10_000_000;
/// 9999-12-31 23:59:59.9999999, the latest FILETIME Windows converts.
const FILETIME_MAX: i64 = 2_650_467_743_999_999_999;

pub fn platform_source() -> Box<dyn ShutdownSource> {
    #[cfg(target_os = "linux")]
    {
        Box::new(linux::wtmp::WtmpShutdownSource::new())
    }

    #[cfg(windows)]
    {
        Box::new(RegistryShutdownSource)
    }

    #[cfg(not(any(target_os = "linux", windows)))]
    {
        Box::new(UnsupportedShutdownSource)
    }
}

/// Decodes the little-endian 64-bit FILETIME at the start of a raw value.
#[cfg_attr(not(windows), allow(dead_code))]
pub fn filetime_from_bytes(bytes: &[u8]) -> Result<i64> {
    bytes
        .get(..8)
        .and_then(|raw| raw.try_into().ok())
        .map(i64::from_le_bytes)
        .ok_or_else(|| {
            MetricError::unavailable(
                "last shutdown",
                format!("expected 8 bytes of FILETIME, got {}", bytes.len()),
            )
        })
}

#[cfg_attr(not(windows), allow(dead_code))]
pub fn filetime_to_datetime(ticks: i64) -> Result<DateTime<Utc>> {
    if !(0..=FILETIME_MAX).contains(&ticks) {
        return Err(MetricError::unavailable(
            "last shutdown",
            format!("FILETIME {} out of range", ticks),
        ));
    }

    let since_epoch = ticks - FILETIME_UNIX_EPOCH;
    let secs = since_epoch.div_euclid(FILETIME_TICKS_PER_SEC);
    let nanos = (since_epoch.rem_euclid(FILETIME_TICKS_PER_SEC) * 100) as u32;
    DateTime::from_timestamp(secs, nanos).ok_or_else(|| {
        MetricError::unavailable("last shutdown", format!("FILETIME {} out of range", ticks))
    })
}

/// `ShutdownTime` as persisted by Windows on every orderly shutdown.
#[cfg(windows)]
pub struct RegistryShutdownSource;

#[cfg(windows)]
impl RegistryShutdownSource {
    const KEY: &'static str = r"System\CurrentControlSet\Control\Windows";
    const VALUE: &'static str = "ShutdownTime";
}

#[cfg(windows)]
impl ShutdownSource for RegistryShutdownSource {
    fn last_shutdown(&self) -> Result<DateTime<Utc>> {
        use winreg::enums::HKEY_LOCAL_MACHINE;
        use winreg::RegKey;

        let key = RegKey::predef(HKEY_LOCAL_MACHINE)
            .open_subkey(Self::KEY)
            .map_err(|e| super::io_error("last shutdown", e))?;
        let value = key
            .get_raw_value(Self::VALUE)
            .map_err(|e| super::io_error("last shutdown", e))?;

        filetime_to_datetime(filetime_from_bytes(&value.bytes)?)
    }
}

#[cfg(not(any(target_os = "linux", windows)))]
pub struct UnsupportedShutdownSource;

#[cfg(not(any(target_os = "linux", windows)))]
impl ShutdownSource for UnsupportedShutdownSource {
    fn last_shutdown(&self) -> Result<DateTime<Utc>> {
        Err(MetricError::unavailable(
            "last shutdown",
            "no persisted shutdown time on this platform",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_filetime_unix_epoch() {
        assert_eq!(
            filetime_to_datetime(FILETIME_UNIX_EPOCH).unwrap(),
            Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_filetime_keeps_sub_second_ticks() {
        // 2024-05-01 18:30:00 UTC plus 1234567 ticks.
        let ticks = FILETIME_UNIX_EPOCH + 1_714_588_200 * FILETIME_TICKS_PER_SEC + 1_234_567;
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 18, 30, 0).unwrap()
            + chrono::TimeDelta::nanoseconds(123_456_700);

        assert_eq!(filetime_to_datetime(ticks).unwrap(), expected);
    }

    #[test]
    fn test_filetime_before_unix_epoch() {
        assert_eq!(
            filetime_to_datetime(0).unwrap(),
            Utc.with_ymd_and_hms(1601, 1, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_filetime_out_of_range() {
        for ticks in [-1, FILETIME_MAX + 1, i64::MAX] {
            assert!(matches!(
                filetime_to_datetime(ticks),
                Err(MetricError::MetricUnavailable { .. })
            ));
        }
        assert!(filetime_to_datetime(FILETIME_MAX).is_ok());
    }

    #[test]
    fn test_filetime_from_bytes() {
        let ticks: i64 = 133_590_618_000_000_000;
        let mut raw = ticks.to_le_bytes().to_vec();
        assert_eq!(filetime_from_bytes(&raw), Ok(ticks));

        raw.push(0xff);
        assert_eq!(filetime_from_bytes(&raw), Ok(ticks));

        assert!(matches!(
            filetime_from_bytes(&raw[..7]),
            Err(MetricError::MetricUnavailable { .. })
        ));
        assert!(filetime_from_bytes(&[]).is_err());
    }
}
