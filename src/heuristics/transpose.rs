//! Transpose scheduler (spec §4.7): handles fusions whose only non-trivial
//! work is a permutation of axes between a tensor's root and loop domain,
//! using a tiled shared-memory swizzle to keep both the read and the write
//! coalesced.

use crate::heuristics::{Heuristic, HeuristicParams, SchedulerKind};
use crate::ir::Fusion;

const TILE_SIZE: u32 = 32;

pub struct TransposeHeuristic;

impl Heuristic for TransposeHeuristic {
    fn kind(&self) -> SchedulerKind {
        SchedulerKind::Transpose
    }

    /// Accepts fusions where some tensor's allocation domain order differs
    /// from its root domain order (spec §4.7): a permutation, not merely a
    /// reshape.
    fn compile_time_accepts(&self, fusion: &Fusion) -> bool {
        fusion.tensor_views_iter().any(|(_, tv)| {
            tv.domain.allocation.len() == tv.domain.root.len()
                && tv.domain.allocation != tv.domain.root
        })
    }

    fn try_schedule(&self, fusion: &mut Fusion) -> Result<HeuristicParams, String> {
        if !self.compile_time_accepts(fusion) {
            return Err("no permuted tensor view found".to_string());
        }
        Ok(HeuristicParams {
            kind: SchedulerKind::Transpose,
            vectorization_width: 1,
            unroll_factor: 1,
            persistent_buffer_bytes: Some((TILE_SIZE * TILE_SIZE * 4) as usize),
            split_grid_dim_inner_reduction: false,
            split_grid_dim_iter_dom_outer: false,
            grid_reduction_buffer_bytes: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::iter_domain::IterType;
    use crate::ir::{LiteralValue, TensorDomain};

    #[test]
    fn detects_permuted_allocation_domain() {
        let mut fusion = Fusion::new();
        let zero = fusion.add_literal(LiteralValue::Int(0));
        let e0 = fusion.add_literal(LiteralValue::Int(8));
        let e1 = fusion.add_literal(LiteralValue::Int(16));
        let a = fusion.add_root_iter_domain(zero, e0, IterType::Iteration);
        let b = fusion.add_root_iter_domain(zero, e1, IterType::Iteration);
        let mut domain = TensorDomain::from_root(vec![a, b], &fusion);
        domain.allocation = vec![b, a];
        fusion.add_tensor_view(domain, crate::dtype::DataType::Float);
        let heuristic = TransposeHeuristic;
        assert!(heuristic.compile_time_accepts(&fusion));
    }
}
