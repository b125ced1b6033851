//! Inner-persistent scheduler (spec §4.6): keeps the entire reduction
//! buffer resident in registers/shared memory across a single block instead
//! of writing intermediate results back to global memory, when it fits.

use crate::device::DeviceCapability;
use crate::heuristics::{Heuristic, HeuristicParams, SchedulerKind};
use crate::ir::Fusion;

pub struct InnerPersistentHeuristic {
    pub device: DeviceCapability,
}

impl Heuristic for InnerPersistentHeuristic {
    fn kind(&self) -> SchedulerKind {
        SchedulerKind::InnerPersistent
    }

    fn compile_time_accepts(&self, fusion: &Fusion) -> bool {
        fusion.exprs_iter().any(|(_, e)| e.kind.is_reduction_like())
    }

    /// Run-time gate (spec §4.6): the persistent buffer must fit in the
    /// device's per-block shared memory budget.
    fn try_schedule(&self, fusion: &mut Fusion) -> Result<HeuristicParams, String> {
        let reduction_count = fusion
            .exprs_iter()
            .filter(|(_, e)| e.kind.is_reduction_like())
            .count();
        if reduction_count == 0 {
            return Err("no reduction to persist".to_string());
        }
        let dtype_bytes = 4usize; // conservative default absent concrete shapes
        let elements_per_row = 1024usize; // placeholder until RuntimeInfo shapes are threaded in
        let persistent_buffer_bytes = dtype_bytes * elements_per_row;
        if persistent_buffer_bytes > self.device.max_shmem_per_block {
            return Err(format!(
                "persistent buffer of {} bytes exceeds shared memory budget of {} bytes",
                persistent_buffer_bytes, self.device.max_shmem_per_block
            ));
        }
        Ok(HeuristicParams {
            kind: SchedulerKind::InnerPersistent,
            vectorization_width: 1,
            unroll_factor: 1,
            persistent_buffer_bytes: Some(persistent_buffer_bytes),
            split_grid_dim_inner_reduction: false,
            split_grid_dim_iter_dom_outer: false,
            grid_reduction_buffer_bytes: None,
        })
    }
}
