//! Reduction scheduler (spec §4.6): splits the reduction axis across
//! threads and, when it does not fit in one block, uses `rFactor` plus a
//! grid reduction; also covers the persistent-buffer case (scenario F) when
//! the whole reduction fits resident in shared memory for the run.

use crate::device::DeviceCapability;
use crate::heuristics::{Heuristic, HeuristicParams, SchedulerKind};
use crate::ir::{Fusion, IterDomainId, LiteralValue, ParallelType, ValueData};
use crate::scheduler;

/// Threads-per-block along the reduction axis absent concrete shapes; real
/// deployments derive this from `RuntimeInfo`.
const ELEMENTS_PER_BLOCK: i64 = 1024;
const DTYPE_BYTES: usize = 4;
const GRID_Y_LIMIT: i64 = 65_535;

pub struct ReductionHeuristic {
    pub device: DeviceCapability,
}

impl Heuristic for ReductionHeuristic {
    fn kind(&self) -> SchedulerKind {
        SchedulerKind::Reduction
    }

    fn compile_time_accepts(&self, fusion: &Fusion) -> bool {
        fusion.exprs_iter().any(|(_, e)| e.kind.is_reduction_like())
    }

    fn try_schedule(&self, fusion: &mut Fusion) -> Result<HeuristicParams, String> {
        let reduction_expr = fusion
            .exprs_iter()
            .find(|(_, e)| e.kind.is_reduction_like())
            .map(|(id, _)| id)
            .ok_or_else(|| "no reduction expression found".to_string())?;
        let output = fusion
            .expr(reduction_expr)
            .outputs
            .first()
            .copied()
            .ok_or_else(|| "reduction expr has no output".to_string())?;
        let tv = match fusion.value(output) {
            ValueData::Tensor(tv) => *tv,
            _ => return Err("reduction output is not a tensor".to_string()),
        };

        let reduction_axes: Vec<IterDomainId> = fusion
            .tensor_view(tv)
            .domain
            .loop_domain
            .iter()
            .copied()
            .filter(|&id| fusion.iter_domain(id).is_reduction())
            .collect();
        if reduction_axes.is_empty() {
            return Err("reduction tensor has no reduction axes in its loop domain".to_string());
        }

        let total_reduction_extent: i64 = reduction_axes
            .iter()
            .filter_map(|&axis| fusion.eval_literal_int(fusion.iter_domain(axis).extent))
            .product();

        let mut split_grid_dim_inner_reduction = false;
        let mut split_grid_dim_iter_dom_outer = false;
        let mut grid_reduction_buffer_bytes = None;

        if total_reduction_extent > ELEMENTS_PER_BLOCK {
            // Scenario D: the reduction overflows one block. Split the
            // first reduction axis into a per-block inner piece and a
            // grid-spanning outer piece, then rFactor the inner piece into
            // its own partial-reduction tensor so the outer piece can be
            // finished with a grid reduction.
            let axis = reduction_axes[0];
            let factor_lit = fusion.add_literal(LiteralValue::Int(ELEMENTS_PER_BLOCK));
            let (outer, inner) =
                scheduler::split(fusion, tv, axis, factor_lit, true).map_err(|e| e.to_string())?;
            scheduler::parallelize(fusion, tv, inner, ParallelType::TIDx)
                .map_err(|e| e.to_string())?;
            scheduler::parallelize(fusion, tv, outer, ParallelType::BIDx)
                .map_err(|e| e.to_string())?;
            scheduler::r_factor(fusion, tv, &[inner]).map_err(|e| e.to_string())?;
            split_grid_dim_inner_reduction = true;

            let iter_axes: Vec<IterDomainId> = fusion
                .tensor_view(tv)
                .domain
                .loop_domain
                .iter()
                .copied()
                .filter(|&id| !fusion.iter_domain(id).is_reduction())
                .collect();
            if let Some(&iter_outer) = iter_axes.first() {
                let extent = fusion.iter_domain(iter_outer).extent;
                let overflows = fusion
                    .eval_literal_int(extent)
                    .map_or(true, |e| e > GRID_Y_LIMIT);
                if overflows {
                    let limit_lit = fusion.add_literal(LiteralValue::Int(GRID_Y_LIMIT));
                    let (grid_y, grid_x) = scheduler::split(fusion, tv, iter_outer, limit_lit, true)
                        .map_err(|e| e.to_string())?;
                    scheduler::parallelize(fusion, tv, grid_y, ParallelType::BIDy)
                        .map_err(|e| e.to_string())?;
                    scheduler::parallelize(fusion, tv, grid_x, ParallelType::BIDx)
                        .map_err(|e| e.to_string())?;
                    split_grid_dim_iter_dom_outer = true;
                }
            }

            let num_blocks = (total_reduction_extent + ELEMENTS_PER_BLOCK - 1) / ELEMENTS_PER_BLOCK;
            grid_reduction_buffer_bytes = Some(DTYPE_BYTES * num_blocks.max(1) as usize);
        } else {
            for &axis in &reduction_axes {
                scheduler::parallelize(fusion, tv, axis, ParallelType::TIDx)
                    .map_err(|e| e.to_string())?;
            }
        }

        // Scenario F: the whole reduction stays resident (persistent) in
        // shared memory for the duration of the block; reject if it would
        // not fit.
        let persistent_buffer_bytes = DTYPE_BYTES * ELEMENTS_PER_BLOCK as usize;
        if persistent_buffer_bytes > self.device.max_shmem_per_block {
            return Err(format!(
                "SharedMemoryOverflow: persistent buffer of {} bytes exceeds shared memory budget of {} bytes",
                persistent_buffer_bytes, self.device.max_shmem_per_block
            ));
        }

        Ok(HeuristicParams {
            kind: SchedulerKind::Reduction,
            vectorization_width: 1,
            unroll_factor: 4,
            persistent_buffer_bytes: Some(persistent_buffer_bytes),
            split_grid_dim_inner_reduction,
            split_grid_dim_iter_dom_outer,
            grid_reduction_buffer_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::iter_domain::IterType;
    use crate::ir::{ExprKind, ReductionOp, TensorDomain};

    fn reduction_fusion(fusion: &mut Fusion, extent: i64) -> crate::ir::TensorViewId {
        let zero = fusion.add_literal(LiteralValue::Int(0));
        let ext = fusion.add_literal(LiteralValue::Int(extent));
        let root = fusion.add_root_iter_domain(zero, ext, IterType::Reduction);
        let domain = TensorDomain::from_root(vec![root], fusion);
        let tv = fusion.add_tensor_view(domain, crate::dtype::DataType::Float);
        let out = fusion.add_tensor_value(tv);
        fusion.add_expr(
            ExprKind::Reduction {
                op: ReductionOp::Add,
                reduction_axes: vec![root],
            },
            vec![],
            vec![out],
        );
        tv
    }

    #[test]
    fn rejects_fusion_with_no_reduction() {
        let fusion = Fusion::new();
        let heuristic = ReductionHeuristic {
            device: DeviceCapability::lookup_defaults(8, 0),
        };
        assert!(!heuristic.compile_time_accepts(&fusion));
    }

    #[test]
    fn accepts_fusion_with_reduction_expr() {
        let mut fusion = Fusion::new();
        reduction_fusion(&mut fusion, 256);
        let heuristic = ReductionHeuristic {
            device: DeviceCapability::lookup_defaults(8, 0),
        };
        assert!(heuristic.compile_time_accepts(&fusion));
        let params = heuristic.try_schedule(&mut fusion).unwrap();
        assert!(!params.split_grid_dim_inner_reduction);
    }

    #[test]
    fn oversized_reduction_uses_rfactor_and_grid_reduction() {
        let mut fusion = Fusion::new();
        reduction_fusion(&mut fusion, 1 << 20);
        let heuristic = ReductionHeuristic {
            device: DeviceCapability::lookup_defaults(8, 0),
        };
        let params = heuristic.try_schedule(&mut fusion).unwrap();
        assert!(params.split_grid_dim_inner_reduction);
        assert!(params.grid_reduction_buffer_bytes.is_some());
    }

    #[test]
    fn rejects_when_persistent_buffer_exceeds_shared_memory() {
        let mut fusion = Fusion::new();
        reduction_fusion(&mut fusion, 256);
        let mut device = DeviceCapability::lookup_defaults(8, 0);
        device.max_shmem_per_block = 10;
        let heuristic = ReductionHeuristic { device };
        assert!(heuristic.try_schedule(&mut fusion).is_err());
    }
}
