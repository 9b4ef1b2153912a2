//! Tracks a worker's total and currently-reserved capacity, and decides
//! which tiers in the catalog this worker could ever run.

use std::collections::HashMap;
use std::sync::Mutex;

use rootcause::Report;
use tracing::debug;

use flowline_core::Result;

use crate::error::ResourceError;
use crate::tier::{GpuVendor, TierRequirement, STANDARD_TIER_MAP};

/// A GPU device this worker has detected, independent of any tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuInfo {
    pub vendor: GpuVendor,
    pub memory_mb: u64,
}

/// Specifies how a `ResourceManager` should size itself at construction.
#[derive(Debug, Clone, Default)]
pub struct ResourceManagerConfig {
    /// `None` means auto-detect from the host; `Some` overrides with an
    /// explicit core count.
    pub cpu: Option<f64>,
    /// `None` means auto-detect; `Some` is a unit string like `"8gb"`.
    pub memory: Option<String>,
    /// `None` means auto-detect; `Some` is a unit string like `"100gb"`.
    pub storage: Option<String>,
    /// GPUs this worker can offer. Empty unless explicitly configured —
    /// GPU auto-detection is host/driver specific and best-effort.
    pub gpus: Vec<GpuInfo>,
}

struct State {
    curr_memory_mb: u64,
    curr_storage_mb: u64,
}

/// Tracks how much of a worker's advertised capacity is currently reserved
/// by in-flight node executions, and which catalog tiers that capacity can
/// satisfy.
///
/// `reserve`/`release` only ever adjust memory and storage: CPU and GPU
/// counts are checked against the worker's static ceiling at admission time
/// but are not tracked as a depleting pool, matching the upstream resource
/// manager this was ported from.
pub struct ResourceManager {
    max_cpu: f64,
    max_memory_mb: u64,
    max_storage_mb: u64,
    gpus: Vec<GpuInfo>,
    state: Mutex<State>,
}

impl ResourceManager {
    /// Builds a manager from explicit or host-detected capacity.
    pub fn new(config: ResourceManagerConfig) -> Result<Self, ResourceError> {
        let max_cpu = config.cpu.unwrap_or_else(detect_host_cpu_cores);
        let max_memory_mb = match config.memory {
            Some(s) => parse_unit_string_to_mb(&s)?,
            None => detect_host_memory_mb(),
        };
        let max_storage_mb = match config.storage {
            Some(s) => parse_unit_string_to_mb(&s)?,
            None => detect_host_storage_mb(),
        };

        debug!(max_cpu, max_memory_mb, max_storage_mb, gpu_count = config.gpus.len(), "resource manager initialized");

        Ok(Self {
            max_cpu,
            max_memory_mb,
            max_storage_mb,
            gpus: config.gpus,
            state: Mutex::new(State {
                curr_memory_mb: 0,
                curr_storage_mb: 0,
            }),
        })
    }

    pub fn max_cpu(&self) -> f64 {
        self.max_cpu
    }

    pub fn max_memory_mb(&self) -> u64 {
        self.max_memory_mb
    }

    pub fn max_storage_mb(&self) -> u64 {
        self.max_storage_mb
    }

    pub fn gpus(&self) -> &[GpuInfo] {
        &self.gpus
    }

    /// Reserves the memory and storage a tier requires. CPU and GPU are
    /// validated statically (see `valid_tier_map`) but are not decremented
    /// here — a worker's CPU/GPU ceiling bounds how many containers of a
    /// given tier it will ever *accept*, not how many it can run
    /// concurrently, so repeated reservations of a GPU tier are allowed as
    /// long as memory and storage remain available.
    pub fn reserve(&self, tier_name: &str) -> Result<(), ResourceError> {
        let requirement = tier_requirement(tier_name)?;
        let mut state = self.state.lock().expect("resource manager state poisoned");

        let remaining_memory = self.max_memory_mb.saturating_sub(state.curr_memory_mb);
        if requirement.memory_mb > remaining_memory {
            return Err(ResourceError::InsufficientCapacity {
                tier: tier_name.to_string(),
                requested_mb: requirement.memory_mb,
                available_mb: remaining_memory,
                resource: "memory",
            }
            .into());
        }

        let remaining_storage = self.max_storage_mb.saturating_sub(state.curr_storage_mb);
        if requirement.storage_mb > remaining_storage {
            return Err(ResourceError::InsufficientCapacity {
                tier: tier_name.to_string(),
                requested_mb: requirement.storage_mb,
                available_mb: remaining_storage,
                resource: "storage",
            }
            .into());
        }

        state.curr_memory_mb += requirement.memory_mb;
        state.curr_storage_mb += requirement.storage_mb;
        Ok(())
    }

    /// Releases the memory and storage a tier had reserved. Safe to call
    /// even if the corresponding reservation never happened; accounting
    /// saturates at zero rather than underflowing.
    pub fn release(&self, tier_name: &str) {
        let Ok(requirement) = tier_requirement(tier_name) else {
            return;
        };
        let mut state = self.state.lock().expect("resource manager state poisoned");
        state.curr_memory_mb = state.curr_memory_mb.saturating_sub(requirement.memory_mb);
        state.curr_storage_mb = state.curr_storage_mb.saturating_sub(requirement.storage_mb);
    }

    /// Returns the set of tiers this worker's static capacity can ever
    /// satisfy, mapped to how many it could run at once if it dedicated
    /// its entire ceiling to that tier alone. Always includes the special
    /// `"worker"` tier with a fixed weight of 1, used for queue-subscription
    /// priority rather than resource accounting.
    pub fn valid_tier_map(&self) -> HashMap<String, u32> {
        let mut valid = HashMap::new();

        for (name, requirement) in STANDARD_TIER_MAP.iter() {
            if self.can_ever_satisfy(requirement) {
                let by_memory = self.max_memory_mb / requirement.memory_mb.max(1);
                let by_storage = self.max_storage_mb / requirement.storage_mb.max(1);
                let weight = by_memory.min(by_storage).max(1) as u32;
                valid.insert((*name).to_string(), weight);
            }
        }

        valid.insert("worker".to_string(), 1);
        valid
    }

    fn can_ever_satisfy(&self, requirement: &TierRequirement) -> bool {
        if requirement.cpu > self.max_cpu {
            return false;
        }
        if requirement.memory_mb > self.max_memory_mb {
            return false;
        }
        if requirement.storage_mb > self.max_storage_mb {
            return false;
        }
        match &requirement.gpu {
            None => true,
            Some(gpu_requirement) => {
                let matching = self
                    .gpus
                    .iter()
                    .filter(|g| gpu_requirement.vendor == GpuVendor::Any || g.vendor == gpu_requirement.vendor)
                    .filter(|g| g.memory_mb >= gpu_requirement.memory_mb)
                    .count();
                matching as u32 >= gpu_requirement.count
            }
        }
    }
}

fn tier_requirement(tier_name: &str) -> Result<TierRequirement, ResourceError> {
    STANDARD_TIER_MAP
        .get(tier_name)
        .copied()
        .ok_or_else(|| ResourceError::UnknownTier { tier: tier_name.to_string() }.into())
}

/// Parses strings like `"4gb"`, `"512mb"`, `"1tb"` into a megabyte count.
pub fn parse_unit_string_to_mb(input: &str) -> Result<u64, ResourceError> {
    let invalid = || -> Report<ResourceError> { ResourceError::InvalidUnitString { input: input.to_string() }.into() };

    let trimmed = input.trim().to_ascii_lowercase();
    let split_at = trimmed.find(|c: char| !c.is_ascii_digit()).ok_or_else(invalid)?;

    let (digits, suffix) = trimmed.split_at(split_at);
    let value: u64 = digits.parse().map_err(|_| invalid())?;

    match suffix {
        "kb" => Ok(value / 1024),
        "mb" => Ok(value),
        "gb" => Ok(value * 1024),
        "tb" => Ok(value * 1024 * 1024),
        _ => Err(invalid()),
    }
}

fn detect_host_cpu_cores() -> f64 {
    std::thread::available_parallelism().map(|n| n.get() as f64).unwrap_or(1.0)
}

fn detect_host_memory_mb() -> u64 {
    // Best-effort: without a platform crate like `sysinfo` in the stack,
    // fall back to a conservative default rather than failing construction.
    8 * 1024
}

fn detect_host_storage_mb() -> u64 {
    64 * 1024
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager_with(memory_mb: u64, storage_mb: u64) -> ResourceManager {
        ResourceManager::new(ResourceManagerConfig {
            cpu: Some(8.0),
            memory: Some(format!("{memory_mb}mb")),
            storage: Some(format!("{storage_mb}mb")),
            gpus: vec![],
        })
        .expect("manager should construct")
    }

    #[test]
    fn parses_unit_strings() {
        assert_eq!(parse_unit_string_to_mb("4gb").unwrap(), 4 * 1024);
        assert_eq!(parse_unit_string_to_mb("512mb").unwrap(), 512);
        assert_eq!(parse_unit_string_to_mb("1tb").unwrap(), 1024 * 1024);
    }

    #[test]
    fn rejects_malformed_unit_strings() {
        assert!(parse_unit_string_to_mb("lots").is_err());
        assert!(parse_unit_string_to_mb("4xb").is_err());
    }

    #[test]
    fn reserve_then_release_is_a_no_op_on_capacity() {
        let manager = manager_with(8 * 1024, 32 * 1024);
        manager.reserve("c-small").expect("should reserve");
        assert_eq!(manager.max_memory_mb(), 8 * 1024);
        manager.release("c-small");

        // A second identical reservation should succeed again after release.
        manager.reserve("c-small").expect("should reserve again");
    }

    #[test]
    fn reserve_fails_when_memory_exhausted() {
        let manager = manager_with(2 * 1024, 32 * 1024);
        manager.reserve("c-small").expect("first reservation fits");
        let err = manager.reserve("c-small").expect_err("second reservation should not fit");
        assert!(err.to_string().contains("memory"));
    }

    #[test]
    fn reserve_unknown_tier_errors() {
        let manager = manager_with(8 * 1024, 32 * 1024);
        let err = manager.reserve("not-a-tier").expect_err("unknown tier");
        assert!(err.to_string().contains("unknown resource tier"));
    }

    #[test]
    fn gpu_tier_requires_a_matching_gpu() {
        let manager = ResourceManager::new(ResourceManagerConfig {
            cpu: Some(16.0),
            memory: Some("64gb".to_string()),
            storage: Some("256gb".to_string()),
            gpus: vec![],
        })
        .expect("manager should construct");

        let tiers = manager.valid_tier_map();
        assert!(!tiers.contains_key("gn-large"));
        assert!(tiers.contains_key("c-large"));
        assert!(tiers.contains_key("worker"));
    }

    #[test]
    fn gpu_tier_becomes_valid_once_a_matching_gpu_is_present() {
        let manager = ResourceManager::new(ResourceManagerConfig {
            cpu: Some(16.0),
            memory: Some("64gb".to_string()),
            storage: Some("256gb".to_string()),
            gpus: vec![GpuInfo {
                vendor: GpuVendor::Nvidia,
                memory_mb: 24 * 1024,
            }],
        })
        .expect("manager should construct");

        assert!(manager.valid_tier_map().contains_key("gn-large"));
    }

    #[test]
    fn worker_tier_is_always_present() {
        let manager = manager_with(512, 512);
        assert_eq!(manager.valid_tier_map().get("worker").copied(), Some(1));
    }
}
