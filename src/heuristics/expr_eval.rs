//! ExprEval scheduler (spec §4.4): the trivial case where every output can
//! be computed by evaluating scalar expressions directly, with no tensor
//! loop nest at all (e.g. a fusion of only scalar ops on 0-d tensors).

use crate::heuristics::{Heuristic, HeuristicParams, SchedulerKind};
use crate::ir::Fusion;

pub struct ExprEvalHeuristic;

impl Heuristic for ExprEvalHeuristic {
    fn kind(&self) -> SchedulerKind {
        SchedulerKind::ExprEval
    }

    /// Accepts only when every tensor view is rank 0 (spec §4.4: checked
    /// first in dispatch order precisely because it is cheap and narrow).
    fn compile_time_accepts(&self, fusion: &Fusion) -> bool {
        fusion.num_tensor_views() == 0
            || fusion
                .tensor_views_iter()
                .all(|(_, tv)| tv.domain.num_dims() == 0)
    }

    fn try_schedule(&self, fusion: &mut Fusion) -> Result<HeuristicParams, String> {
        if !self.compile_time_accepts(fusion) {
            return Err("fusion has rank > 0 tensor views".to_string());
        }
        Ok(HeuristicParams {
            kind: SchedulerKind::ExprEval,
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
    fn accepts_fusion_with_no_tensor_views() {
        let mut fusion = Fusion::new();
        let heuristic = ExprEvalHeuristic;
        assert!(heuristic.compile_time_accepts(&fusion));
        assert!(heuristic.try_schedule(&mut fusion).is_ok());
    }

    #[test]
    fn rejects_fusion_with_ranked_tensor() {
        let mut fusion = Fusion::new();
        let zero = fusion.add_literal(crate::ir::LiteralValue::Int(0));
        let extent = fusion.add_literal(crate::ir::LiteralValue::Int(4));
        let root =
            fusion.add_root_iter_domain(zero, extent, crate::ir::iter_domain::IterType::Iteration);
        let domain = crate::ir::TensorDomain::from_root(vec![root], &fusion);
        fusion.add_tensor_view(domain, crate::dtype::DataType::Float);
        let heuristic = ExprEvalHeuristic;
        assert!(!heuristic.compile_time_accepts(&fusion));
    }
}
