//! Pass 0 (spec §4.9): builds the KIR loop nest from each tensor's
//! scheduled loop domain before any other lowering pass runs. Every
//! uniquely defined expression gets one `ForLoop` nest wrapping its
//! `Serial`/`Unroll`/`Unswitch` axes outermost-to-innermost around an
//! `Expr(definition)` leaf; thread, block, and vectorize axes are
//! index-only in this IR and are never wrapped in a loop.

use std::collections::BTreeSet;

use crate::dtype::DataType;
use crate::ir::{ExprId, Fusion, IterDomainId, ParallelType};
use crate::kir::{KirArena, KirExpr, KirExprId};
use crate::lowering::{LoweringError, LoweringPass};
use crate::options::CompiledOptions;

pub struct LoopNestGeneration;

impl LoweringPass for LoopNestGeneration {
    fn name(&self) -> &'static str {
        "loop_nest_generation"
    }

    fn run(
        &self,
        fusion: &mut Fusion,
        kir: &mut KirArena,
        mut top_level: Vec<KirExprId>,
        _options: &CompiledOptions,
    ) -> Result<Vec<KirExprId>, LoweringError> {
        let mut seen: BTreeSet<ExprId> = BTreeSet::new();
        let views: Vec<_> = fusion.tensor_views_iter().map(|(id, _)| id).collect();
        for tv in views {
            let view = fusion.tensor_view(tv).clone();
            let Some(definition) = view.definition else {
                continue;
            };
            if !seen.insert(definition) {
                continue;
            }

            let loop_axes: Vec<IterDomainId> = view
                .domain
                .loop_domain
                .iter()
                .copied()
                .filter(|&id| is_loop_worthy(fusion, id))
                .collect();

            let mut node = KirExpr::Expr(definition);
            for &axis in loop_axes.iter().rev() {
                let index_var =
                    fusion.add_symbolic_scalar(DataType::Index, Some(format!("i{}", axis.index())));
                let body_id = kir.push(node);
                node = KirExpr::ForLoop {
                    iter_domain: axis,
                    index_var,
                    body: vec![body_id],
                };
            }
            let id = kir.push(node);
            top_level.push(id);
        }
        Ok(top_level)
    }
}

/// A loop domain axis becomes a real `ForLoop` only if it is scheduled
/// serially; thread/block/vectorize axes are indices the hardware supplies,
/// not iterated over in the IR (spec §4.9).
pub(crate) fn is_loop_worthy(fusion: &Fusion, axis: IterDomainId) -> bool {
    matches!(
        fusion.iter_domain(axis).parallel_type,
        ParallelType::Serial | ParallelType::Unroll | ParallelType::Unswitch
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::iter_domain::IterType;
    use crate::ir::{ExprKind, LiteralValue, TensorDomain, UnaryOpKind};
    use crate::options::Options;

    #[test]
    fn serial_axis_produces_a_for_loop() {
        let mut fusion = Fusion::new();
        let zero = fusion.add_literal(LiteralValue::Int(0));
        let extent = fusion.add_literal(LiteralValue::Int(16));
        let root = fusion.add_root_iter_domain(zero, extent, IterType::Iteration);
        let domain = TensorDomain::from_root(vec![root], &fusion);
        let tv = fusion.add_tensor_view(domain, crate::dtype::DataType::Float);
        let input = fusion.add_symbolic_scalar(crate::dtype::DataType::Float, None);
        let output = fusion.add_tensor_value(tv);
        fusion.add_expr(ExprKind::UnaryOp(UnaryOpKind::Neg), vec![input], vec![output]);

        let pass = LoopNestGeneration;
        let opts = Options::default().validate().unwrap();
        let mut kir = KirArena::new();
        let top_level = pass.run(&mut fusion, &mut kir, vec![], &opts).unwrap();

        assert_eq!(top_level.len(), 1);
        match kir.get(top_level[0]) {
            KirExpr::ForLoop { iter_domain, body, .. } => {
                assert_eq!(*iter_domain, root);
                assert_eq!(body.len(), 1);
                assert!(matches!(kir.get(body[0]), KirExpr::Expr(_)));
            }
            other => panic!("expected a ForLoop, got {:?}", other),
        }
    }

    #[test]
    fn parallelized_axis_produces_no_loop() {
        let mut fusion = Fusion::new();
        let zero = fusion.add_literal(LiteralValue::Int(0));
        let extent = fusion.add_literal(LiteralValue::Int(16));
        let root = fusion.add_root_iter_domain(zero, extent, IterType::Iteration);
        fusion.iter_domain_mut(root).parallel_type = ParallelType::TIDx;
        let domain = TensorDomain::from_root(vec![root], &fusion);
        let tv = fusion.add_tensor_view(domain, crate::dtype::DataType::Float);
        let input = fusion.add_symbolic_scalar(crate::dtype::DataType::Float, None);
        let output = fusion.add_tensor_value(tv);
        fusion.add_expr(ExprKind::UnaryOp(UnaryOpKind::Neg), vec![input], vec![output]);

        let pass = LoopNestGeneration;
        let opts = Options::default().validate().unwrap();
        let mut kir = KirArena::new();
        let top_level = pass.run(&mut fusion, &mut kir, vec![], &opts).unwrap();

        assert_eq!(top_level.len(), 1);
        assert!(matches!(kir.get(top_level[0]), KirExpr::Expr(_)));
    }

    #[test]
    fn fusion_inputs_get_no_loop_nest() {
        let mut fusion = Fusion::new();
        let zero = fusion.add_literal(LiteralValue::Int(0));
        let extent = fusion.add_literal(LiteralValue::Int(16));
        let root = fusion.add_root_iter_domain(zero, extent, IterType::Iteration);
        let domain = TensorDomain::from_root(vec![root], &fusion);
        fusion.add_tensor_view(domain, crate::dtype::DataType::Float);

        let pass = LoopNestGeneration;
        let opts = Options::default().validate().unwrap();
        let mut kir = KirArena::new();
        let top_level = pass.run(&mut fusion, &mut kir, vec![], &opts).unwrap();
        assert!(top_level.is_empty());
    }
}
