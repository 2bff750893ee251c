//! # procfs Samplers
//!
//! Linux memory counters read from `/proc`. On other platforms the files do
//! not exist, so these samplers report invalid and the monitor falls through
//! to the next candidate.

use std::fs;
use std::path::PathBuf;

use crate::sampler::{MemorySampler, SystemMemorySampler};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Resident set size from `/proc/self/statm`.
#[derive(Debug, Clone)]
pub struct ProcStatmSampler {
    path: PathBuf,
    page_size: u64,
}

impl ProcStatmSampler {
    /// Sampler for the current process, assuming 4 KiB pages.
    #[must_use]
    pub fn new() -> Self {
        Self::with_path("/proc/self/statm", 4096)
    }

    /// Sampler reading an arbitrary statm-formatted file.
    #[must_use]
    pub fn with_path(path: impl Into<PathBuf>, page_size: u64) -> Self {
        Self {
            path: path.into(),
            page_size,
        }
    }

    fn resident_pages(&self) -> Option<u64> {
        let contents = fs::read_to_string(&self.path).ok()?;
        contents.split_whitespace().nth(1)?.parse().ok()
    }
}

impl Default for ProcStatmSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySampler for ProcStatmSampler {
    fn name(&self) -> &str {
        "proc-statm-rss"
    }

    fn current_usage_mb(&mut self) -> Option<f64> {
        let bytes = self.resident_pages()?.checked_mul(self.page_size)?;
        Some(bytes as f64 / BYTES_PER_MB)
    }

    fn is_valid(&self) -> bool {
        self.page_size > 0 && self.resident_pages().is_some()
    }
}

/// Total physical memory from `/proc/meminfo`.
#[derive(Debug, Clone)]
pub struct MeminfoSystemSampler {
    path: PathBuf,
}

impl MeminfoSystemSampler {
    /// Sampler reading `/proc/meminfo`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_path("/proc/meminfo")
    }

    /// Sampler reading an arbitrary meminfo-formatted file.
    #[must_use]
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for MeminfoSystemSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemMemorySampler for MeminfoSystemSampler {
    fn total_system_memory_mb(&self) -> Option<f64> {
        let contents = fs::read_to_string(&self.path).ok()?;
        let line = contents.lines().find(|line| line.starts_with("MemTotal:"))?;
        let kb: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
        Some(kb as f64 / 1024.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_file(tag: &str, contents: &str) -> PathBuf {
        let id = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let path = std::env::temp_dir().join(format!("bulwark_{tag}_{id}"));
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_statm_resident_pages() {
        let path = scratch_file("statm", "9000 512 100 10 0 300 0\n");
        let mut sampler = ProcStatmSampler::with_path(&path, 4096);

        assert!(sampler.is_valid());
        assert_eq!(sampler.current_usage_mb(), Some(2.0));

        fs::remove_file(&path).ok();
        assert!(!sampler.is_valid());
        assert_eq!(sampler.current_usage_mb(), None);
    }

    #[test]
    fn test_statm_garbage_is_invalid() {
        let path = scratch_file("statm_bad", "not numbers\n");
        let sampler = ProcStatmSampler::with_path(&path, 4096);

        assert!(!sampler.is_valid());
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_meminfo_total() {
        let path = scratch_file(
            "meminfo",
            "MemTotal:       16777216 kB\nMemFree:         1048576 kB\n",
        );
        let sampler = MeminfoSystemSampler::with_path(&path);

        assert_eq!(sampler.total_system_memory_mb(), Some(16384.0));
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_missing_meminfo() {
        let sampler = MeminfoSystemSampler::with_path("/nonexistent/bulwark/meminfo");
        assert_eq!(sampler.total_system_memory_mb(), None);
    }
}
