//! Worker resource tier catalog and reservation accounting.
//!
//! - **Catalog** (`tier`): the static `TierName -> TierRequirement` table.
//! - **Manager** (`manager`): a single worker's capacity accounting —
//!   `reserve`/`release` against memory and storage, and the valid-tier
//!   set a worker advertises to the sync plane.

pub mod error;
pub mod manager;
pub mod tier;

pub use error::ResourceError;
pub use manager::{GpuInfo, ResourceManager, ResourceManagerConfig, parse_unit_string_to_mb};
pub use tier::{DEFAULT_TIER, GpuRequirement, GpuVendor, STANDARD_TIER_MAP, TierRequirement};
