//! Matmul scheduler (spec §4.8): tiles a `MatMul`/`Linear`/`Mma` op for
//! tensor-core execution, choosing a warp tile shape bounded by the device's
//! register and shared-memory budget.

use crate::device::DeviceCapability;
use crate::heuristics::{Heuristic, HeuristicParams, SchedulerKind};
use crate::ir::Fusion;

pub struct MatmulHeuristic {
    pub device: DeviceCapability,
}

impl Heuristic for MatmulHeuristic {
    fn kind(&self) -> SchedulerKind {
        SchedulerKind::Matmul
    }

    /// Matmul-like ops are exclusive to this scheduler (spec §4.4): every
    /// other scheduler rejects a fusion containing one.
    fn compile_time_accepts(&self, fusion: &Fusion) -> bool {
        fusion.exprs_iter().any(|(_, e)| e.kind.is_matmul_like())
    }

    fn try_schedule(&self, fusion: &mut Fusion) -> Result<HeuristicParams, String> {
        if !self.compile_time_accepts(fusion) {
            return Err("no matmul-like op present".to_string());
        }
        if !self.device.supports_bf16() && self.device.sm() < 70 {
            return Err("device too old for tensor-core matmul".to_string());
        }
        let tile_bytes = 128usize * 128 * 2 * 2; // two double-buffered bf16 tiles
        if tile_bytes > self.device.max_shmem_per_block {
            return Err("matmul tile exceeds shared memory budget".to_string());
        }
        Ok(HeuristicParams {
            kind: SchedulerKind::Matmul,
            vectorization_width: 8,
            unroll_factor: 1,
            persistent_buffer_bytes: Some(tile_bytes),
            split_grid_dim_inner_reduction: false,
            split_grid_dim_iter_dom_outer: false,
            grid_reduction_buffer_bytes: None,
        })
    }
}
