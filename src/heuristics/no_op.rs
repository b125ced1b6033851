//! NoOp scheduler (spec §4.4): a fusion output that is just an input
//! (an identity fusion, or one where every op is a pure aliasing cast)
//! compiles to a kernel that does nothing.

use crate::heuristics::{Heuristic, HeuristicParams, SchedulerKind};
use crate::ir::{ExprKind, Fusion};

pub struct NoOpHeuristic;

impl Heuristic for NoOpHeuristic {
    fn kind(&self) -> SchedulerKind {
        SchedulerKind::NoOp
    }

    /// Accepts only if every expression in the fusion is a `CacheOp` alias
    /// or the fusion has no expressions at all (spec §4.4).
    fn compile_time_accepts(&self, fusion: &Fusion) -> bool {
        fusion
            .exprs_iter()
            .all(|(_, e)| matches!(e.kind, ExprKind::CacheOp { .. }))
    }

    fn try_schedule(&self, fusion: &mut Fusion) -> Result<HeuristicParams, String> {
        if !self.compile_time_accepts(fusion) {
            return Err("fusion has non-aliasing computation".to_string());
        }
        Ok(HeuristicParams {
            kind: SchedulerKind::NoOp,
            vectorization_width: 1,
            unroll_factor: 1,
            persistent_buffer_bytes: None,
            split_grid_dim_inner_reduction: false,
            split_grid_dim_iter_dom_outer: false,
            grid_reduction_buffer_bytes: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_empty_fusion() {
        let mut fusion = Fusion::new();
        let heuristic = NoOpHeuristic;
        assert!(heuristic.compile_time_accepts(&fusion));
        assert!(heuristic.try_schedule(&mut fusion).is_ok());
    }

    #[test]
    fn rejects_fusion_with_real_computation() {
        let mut fusion = Fusion::new();
        let a = fusion.add_symbolic_scalar(crate::dtype::DataType::Float, None);
        let b = fusion.add_symbolic_scalar(crate::dtype::DataType::Float, None);
        fusion.add_expr(ExprKind::UnaryOp(crate::ir::UnaryOpKind::Neg), vec![a], vec![b]);
        let heuristic = NoOpHeuristic;
        assert!(!heuristic.compile_time_accepts(&fusion));
    }
}
