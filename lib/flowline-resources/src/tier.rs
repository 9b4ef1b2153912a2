//! The standard tier catalog: named (cpu, memory, storage, gpu) bundles that
//! a `NodeDef` references by name instead of spelling out raw quantities.
//!
//! Mirrors the original `StandardTierMap` — a C-series of CPU-optimized
//! tiers, an M-series of memory-optimized tiers, and G/GN/GA series for
//! generic, NVIDIA, and AMD GPU workloads respectively.

use std::collections::HashMap;
use std::sync::LazyLock;

/// GPU vendor a tier requires. `Any` matches whatever GPU the worker has
/// detected, `Nvidia`/`Amd` pin to a specific vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum GpuVendor {
    Any,
    Nvidia,
    Amd,
}

/// GPU portion of a tier's requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct GpuRequirement {
    pub vendor: GpuVendor,
    pub count: u32,
    pub memory_mb: u64,
}

/// Resource quantities a tier demands from the worker that runs it.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TierRequirement {
    pub cpu: f64,
    pub memory_mb: u64,
    pub storage_mb: u64,
    pub gpu: Option<GpuRequirement>,
}

impl TierRequirement {
    const fn cpu_only(cpu: f64, memory_mb: u64, storage_mb: u64) -> Self {
        Self {
            cpu,
            memory_mb,
            storage_mb,
            gpu: None,
        }
    }

    const fn with_gpu(
        cpu: f64,
        memory_mb: u64,
        storage_mb: u64,
        vendor: GpuVendor,
        gpu_count: u32,
        gpu_memory_mb: u64,
    ) -> Self {
        Self {
            cpu,
            memory_mb,
            storage_mb,
            gpu: Some(GpuRequirement {
                vendor,
                count: gpu_count,
                memory_mb: gpu_memory_mb,
            }),
        }
    }
}

const GB: u64 = 1024;

/// The catalog of named tiers a `NodeDef.Tier` may reference. Populated once
/// on first access; never mutated afterwards.
pub static STANDARD_TIER_MAP: LazyLock<HashMap<&'static str, TierRequirement>> = LazyLock::new(|| {
    use GpuVendor::{Amd, Any, Nvidia};

    HashMap::from([
        // CPU-optimized series.
        ("c-nano", TierRequirement::cpu_only(0.25, 512, 1 * GB)),
        ("c-micro", TierRequirement::cpu_only(0.5, 1 * GB, 2 * GB)),
        ("c-small", TierRequirement::cpu_only(1.0, 2 * GB, 4 * GB)),
        ("c-medium", TierRequirement::cpu_only(2.0, 4 * GB, 8 * GB)),
        ("c-large", TierRequirement::cpu_only(4.0, 8 * GB, 16 * GB)),
        ("c-xlarge", TierRequirement::cpu_only(8.0, 16 * GB, 32 * GB)),
        ("c-2xlarge", TierRequirement::cpu_only(16.0, 32 * GB, 64 * GB)),
        ("c-4xlarge", TierRequirement::cpu_only(32.0, 64 * GB, 128 * GB)),
        // Memory-optimized series.
        ("m-small", TierRequirement::cpu_only(1.0, 8 * GB, 8 * GB)),
        ("m-medium", TierRequirement::cpu_only(2.0, 16 * GB, 16 * GB)),
        ("m-large", TierRequirement::cpu_only(4.0, 32 * GB, 32 * GB)),
        ("m-xlarge", TierRequirement::cpu_only(8.0, 64 * GB, 64 * GB)),
        ("m-2xlarge", TierRequirement::cpu_only(16.0, 128 * GB, 64 * GB)),
        ("m-4xlarge", TierRequirement::cpu_only(32.0, 256 * GB, 128 * GB)),
        // Generic-vendor GPU series.
        ("g-micro", TierRequirement::with_gpu(1.0, 4 * GB, 16 * GB, Any, 1, 4 * GB)),
        ("g-small", TierRequirement::with_gpu(2.0, 8 * GB, 32 * GB, Any, 1, 8 * GB)),
        ("g-medium", TierRequirement::with_gpu(4.0, 16 * GB, 64 * GB, Any, 1, 16 * GB)),
        ("g-large", TierRequirement::with_gpu(8.0, 32 * GB, 128 * GB, Any, 1, 24 * GB)),
        ("g-2xlarge", TierRequirement::with_gpu(16.0, 64 * GB, 256 * GB, Any, 2, 24 * GB)),
        // NVIDIA-specific series.
        ("gn-small", TierRequirement::with_gpu(2.0, 8 * GB, 32 * GB, Nvidia, 1, 8 * GB)),
        ("gn-medium", TierRequirement::with_gpu(4.0, 16 * GB, 64 * GB, Nvidia, 1, 16 * GB)),
        ("gn-large", TierRequirement::with_gpu(8.0, 32 * GB, 128 * GB, Nvidia, 1, 24 * GB)),
        ("gn-2xlarge", TierRequirement::with_gpu(16.0, 64 * GB, 256 * GB, Nvidia, 2, 24 * GB)),
        // AMD-specific series.
        ("ga-small", TierRequirement::with_gpu(2.0, 8 * GB, 32 * GB, Amd, 1, 8 * GB)),
        ("ga-medium", TierRequirement::with_gpu(4.0, 16 * GB, 64 * GB, Amd, 1, 16 * GB)),
    ])
});

/// The tier referenced when `NodeDef.Tier` is left unset.
pub const DEFAULT_TIER: &str = "c-small";
