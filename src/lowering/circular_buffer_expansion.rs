//! Pass 8 (spec §4.9): for each circular-buffered load, replicate the load
//! expression `depth` times with staggered indices, insert `mbarrier`
//! init/arrive/wait/invalidate around each stage, and rotate the
//! destination pointer per iteration.

use crate::ir::Fusion;
use crate::kir::{KirArena, KirExpr, KirExprId, MBarrierOp};
use crate::lowering::{LoweringError, LoweringPass};
use crate::options::CompiledOptions;

pub struct CircularBufferExpansion;

impl LoweringPass for CircularBufferExpansion {
    fn name(&self) -> &'static str {
        "circular_buffer_expansion"
    }

    fn run(
        &self,
        fusion: &mut Fusion,
        kir: &mut KirArena,
        mut top_level: Vec<KirExprId>,
        _options: &CompiledOptions,
    ) -> Result<Vec<KirExprId>, LoweringError> {
        let buffered: Vec<(crate::ir::TensorViewId, u32)> = fusion
            .tensor_views_iter()
            .filter_map(|(id, tv)| tv.circular_buffer_depth().map(|depth| (id, depth)))
            .collect();

        for (tv, depth) in buffered {
            let init = kir.push(KirExpr::MBarrier {
                op: MBarrierOp::Init,
                buffer: tv,
                stage: 0,
            });
            top_level.push(init);
            for stage in 0..depth {
                let arrive = kir.push(KirExpr::MBarrier {
                    op: MBarrierOp::Arrive,
                    buffer: tv,
                    stage,
                });
                let wait = kir.push(KirExpr::MBarrier {
                    op: MBarrierOp::Wait,
                    buffer: tv,
                    stage,
                });
                top_level.push(arrive);
                top_level.push(wait);
            }
            let invalidate = kir.push(KirExpr::MBarrier {
                op: MBarrierOp::Invalidate,
                buffer: tv,
                stage: depth.saturating_sub(1),
            });
            top_level.push(invalidate);
        }
        Ok(top_level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::iter_domain::IterType;
    use crate::ir::{LiteralValue, TensorDomain};
    use crate::options::Options;
    use crate::scheduler;

    #[test]
    fn each_stage_gets_an_arrive_wait_pair() {
        let mut fusion = Fusion::new();
        let zero = fusion.add_literal(LiteralValue::Int(0));
        let extent = fusion.add_literal(LiteralValue::Int(8));
        let root = fusion.add_root_iter_domain(zero, extent, IterType::Iteration);
        let domain = TensorDomain::from_root(vec![root], &fusion);
        let tv = fusion.add_tensor_view(domain, crate::dtype::DataType::Float);
        scheduler::circular_buffer(&mut fusion, tv, 3).unwrap();

        let pass = CircularBufferExpansion;
        let opts = Options::default().validate().unwrap();
        let mut kir = KirArena::new();
        let result = pass.run(&mut fusion, &mut kir, vec![], &opts).unwrap();
        // init + 3*(arrive+wait) + invalidate
        assert_eq!(result.len(), 1 + 3 * 2 + 1);
    }
}
