//! Device capability (spec §6, §4.8, §4.9, §5).
//!
//! `device_capability()` is an external collaborator (spec §6); this module
//! only defines the shape of what it returns plus a small static table
//! (supplemented, SPEC_FULL §11) of defaults for known SM versions so the
//! matmul scheduler and the resource checks in the lowering passes have
//! something to bound tile/shared-memory/register choices against without
//! inventing a full device query layer.

use std::collections::HashMap;

use once_cell::sync::Lazy;

/// Capability queried from the target GPU (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCapability {
    pub sm_major: u32,
    pub sm_minor: u32,
    pub max_shmem_per_block: usize,
    pub max_regs_per_thread: u32,
    pub warp_size: u32,
    pub max_grid: [u32; 3],
}

impl DeviceCapability {
    pub fn sm(&self) -> u32 {
        self.sm_major * 10 + self.sm_minor
    }

    pub fn supports_cp_async(&self) -> bool {
        self.sm() >= 80
    }

    pub fn supports_cp_async_bulk(&self) -> bool {
        self.sm() >= 90
    }

    pub fn supports_bf16(&self) -> bool {
        self.sm() >= 80
    }

    /// Lookup (falling back to the nearest known predecessor) the default
    /// capability table entry for this SM version (SPEC_FULL §11).
    pub fn lookup_defaults(sm_major: u32, sm_minor: u32) -> DeviceCapability {
        let sm = sm_major * 10 + sm_minor;
        let mut best: Option<&DeviceCapability> = None;
        for cap in SM_CAPABILITY_TABLE.values() {
            if cap.sm() <= sm && best.map_or(true, |b| cap.sm() > b.sm()) {
                best = Some(cap);
            }
        }
        let mut resolved = *best.unwrap_or(&SM_CAPABILITY_TABLE[&70]);
        resolved.sm_major = sm_major;
        resolved.sm_minor = sm_minor;
        resolved
    }
}

static SM_CAPABILITY_TABLE: Lazy<HashMap<u32, DeviceCapability>> = Lazy::new(|| {
    let mut table = HashMap::new();
    table.insert(
        70,
        DeviceCapability {
            sm_major: 7,
            sm_minor: 0,
            max_shmem_per_block: 96 * 1024,
            max_regs_per_thread: 255,
            warp_size: 32,
            max_grid: [2_147_483_647, 65_535, 65_535],
        },
    );
    table.insert(
        75,
        DeviceCapability {
            sm_major: 7,
            sm_minor: 5,
            max_shmem_per_block: 64 * 1024,
            max_regs_per_thread: 255,
            warp_size: 32,
            max_grid: [2_147_483_647, 65_535, 65_535],
        },
    );
    table.insert(
        80,
        DeviceCapability {
            sm_major: 8,
            sm_minor: 0,
            max_shmem_per_block: 163 * 1024,
            max_regs_per_thread: 255,
            warp_size: 32,
            max_grid: [2_147_483_647, 65_535, 65_535],
        },
    );
    table.insert(
        86,
        DeviceCapability {
            sm_major: 8,
            sm_minor: 6,
            max_shmem_per_block: 99 * 1024,
            max_regs_per_thread: 255,
            warp_size: 32,
            max_grid: [2_147_483_647, 65_535, 65_535],
        },
    );
    table.insert(
        89,
        DeviceCapability {
            sm_major: 8,
            sm_minor: 9,
            max_shmem_per_block: 99 * 1024,
            max_regs_per_thread: 255,
            warp_size: 32,
            max_grid: [2_147_483_647, 65_535, 65_535],
        },
    );
    table.insert(
        90,
        DeviceCapability {
            sm_major: 9,
            sm_minor: 0,
            max_shmem_per_block: 227 * 1024,
            max_regs_per_thread: 255,
            warp_size: 32,
            max_grid: [2_147_483_647, 65_535, 65_535],
        },
    );
    table
});
