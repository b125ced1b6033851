//! Outer-persistent scheduler (spec §4.6): like [`super::persistent`] but
//! the persistent dimension is the outer (batch) axis rather than the
//! reduction axis itself, used when the reduction is too small to keep a
//! whole block busy but there are many independent reductions to overlap.

use crate::device::DeviceCapability;
use crate::heuristics::{Heuristic, HeuristicParams, SchedulerKind};
use crate::ir::Fusion;

pub struct OuterPersistentHeuristic {
    pub device: DeviceCapability,
}

impl Heuristic for OuterPersistentHeuristic {
    fn kind(&self) -> SchedulerKind {
        SchedulerKind::OuterPersistent
    }

    fn compile_time_accepts(&self, fusion: &Fusion) -> bool {
        fusion.exprs_iter().any(|(_, e)| e.kind.is_reduction_like())
    }

    fn try_schedule(&self, fusion: &mut Fusion) -> Result<HeuristicParams, String> {
        if !fusion.exprs_iter().any(|(_, e)| e.kind.is_reduction_like()) {
            return Err("no reduction to persist".to_string());
        }
        let persistent_buffer_bytes = 4usize * 256;
        if persistent_buffer_bytes > self.device.max_shmem_per_block {
            return Err("outer-persistent buffer exceeds shared memory budget".to_string());
        }
        Ok(HeuristicParams {
            kind: SchedulerKind::OuterPersistent,
            vectorization_width: 1,
            unroll_factor: 1,
            persistent_buffer_bytes: Some(persistent_buffer_bytes),
            split_grid_dim_inner_reduction: false,
            split_grid_dim_iter_dom_outer: false,
            grid_reduction_buffer_bytes: None,
        })
    }
}
