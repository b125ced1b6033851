//! Inner-outer-persistent scheduler (spec §4.6): combines both persistent
//! strategies for fusions with two independent reduction axes (e.g. a
//! normalization fused with a second reduction), keeping both resident.

use crate::device::DeviceCapability;
use crate::heuristics::{Heuristic, HeuristicParams, SchedulerKind};
use crate::ir::Fusion;

pub struct InnerOuterPersistentHeuristic {
    pub device: DeviceCapability,
}

impl Heuristic for InnerOuterPersistentHeuristic {
    fn kind(&self) -> SchedulerKind {
        SchedulerKind::InnerOuterPersistent
    }

    /// Requires at least two independent reduction-like expressions; a
    /// single reduction is better served by [`super::persistent`] or
    /// [`super::outer_persistent`] (spec §4.6 dispatch rationale).
    fn compile_time_accepts(&self, fusion: &Fusion) -> bool {
        fusion
            .exprs_iter()
            .filter(|(_, e)| e.kind.is_reduction_like())
            .count()
            >= 2
    }

    fn try_schedule(&self, fusion: &mut Fusion) -> Result<HeuristicParams, String> {
        let count = fusion
            .exprs_iter()
            .filter(|(_, e)| e.kind.is_reduction_like())
            .count();
        if count < 2 {
            return Err("needs at least two independent reductions".to_string());
        }
        let persistent_buffer_bytes = 4usize * 256 * 2;
        if persistent_buffer_bytes > self.device.max_shmem_per_block {
            return Err("combined persistent buffers exceed shared memory budget".to_string());
        }
        Ok(HeuristicParams {
            kind: SchedulerKind::InnerOuterPersistent,
            vectorization_width: 1,
            unroll_factor: 1,
            persistent_buffer_bytes: Some(persistent_buffer_bytes),
            split_grid_dim_inner_reduction: false,
            split_grid_dim_iter_dom_outer: false,
            grid_reduction_buffer_bytes: None,
        })
    }
}
