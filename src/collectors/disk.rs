use globset::{Glob, GlobSet, GlobSetBuilder};
use sysinfo::Disks;
use tracing::warn;

use crate::config::DriveFilterConfig;
use crate::error::Result;

use super::{DriveInfo, DriveSource};

/// Include/exclude glob patterns over drive names (mount points).
pub struct DriveFilter {
    include: GlobSet,
    exclude: GlobSet,
}

impl DriveFilter {
    pub fn new(config: &DriveFilterConfig) -> Self {
        DriveFilter {
            include: build_globset("include", &config.include),
            exclude: build_globset("exclude", &config.exclude),
        }
    }

    pub fn allows(&self, name: &str) -> bool {
        if !self.include.is_empty() && !self.include.is_match(name) {
            return false;
        }
        !self.exclude.is_match(name)
    }
}

impl Default for DriveFilter {
    fn default() -> Self {
        DriveFilter {
            include: GlobSet::empty(),
            exclude: GlobSet::empty(),
        }
    }
}

fn build_globset(kind: &str, patterns: &[String]) -> GlobSet {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        match Glob::new(pattern) {
            Ok(glob) => {
                builder.add(glob);
            }
            Err(e) => {
                warn!("Invalid drive {} pattern '{}': {}", kind, pattern, e);
            }
        }
    }

    builder.build().unwrap_or_else(|e| {
        warn!("Error building drive {} globset: {}", kind, e);
        GlobSet::empty()
    })
}

/// Mounted volumes via sysinfo, enumerated fresh on every call.
pub struct SysinfoDriveSource {
    filter: DriveFilter,
}

impl SysinfoDriveSource {
    pub fn new(filter: DriveFilter) -> Self {
        SysinfoDriveSource { filter }
    }
}

impl DriveSource for SysinfoDriveSource {
    fn drives(&self) -> Result<Vec<DriveInfo>> {
        let disks = Disks::new_with_refreshed_list();

        let drives = disks
            .list()
            .iter()
            .map(|disk| DriveInfo {
                name: disk.mount_point().to_string_lossy().into_owned(),
                // A volume with no capacity is an empty or unmounted drive.
                is_ready: disk.total_space() > 0,
                total_free_bytes: disk.available_space(),
            })
            .filter(|drive| self.filter.allows(&drive.name))
            .collect();

        Ok(drives)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(include: &[&str], exclude: &[&str]) -> DriveFilter {
        DriveFilter::new(&DriveFilterConfig {
            include: include.iter().map(|s| s.to_string()).collect(),
            exclude: exclude.iter().map(|s| s.to_string()).collect(),
        })
    }

    #[test]
    fn test_default_filter_allows_everything() {
        let filter = DriveFilter::default();
        assert!(filter.allows("/"));
        assert!(filter.allows("C:\\"));
    }

    #[test]
    fn test_include_patterns() {
        let filter = filter(&["/", "/home*"], &[]);
        assert!(filter.allows("/"));
        assert!(filter.allows("/home"));
        assert!(!filter.allows("/boot/efi"));
    }

    #[test]
    fn test_exclude_wins_over_include() {
        let filter = filter(&["/*"], &["/snap/*", "/boot*"]);
        assert!(filter.allows("/data"));
        assert!(!filter.allows("/snap/core/123"));
        assert!(!filter.allows("/boot/efi"));
    }

    #[test]
    fn test_invalid_pattern_is_skipped() {
        let filter = filter(&["[", "/data"], &[]);
        assert!(filter.allows("/data"));
        assert!(!filter.allows("/"));
    }

    #[test]
    fn test_sysinfo_drives_respect_filter() {
        let source = SysinfoDriveSource::new(filter(&[], &["*"]));
        assert!(source.drives().unwrap().is_empty());
    }
}
