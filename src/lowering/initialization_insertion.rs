//! Pass 3 (spec §4.9): emit zero/default fills for reduction and Welford
//! outputs. `cp.async`-backed loads are initialized implicitly by the copy
//! instruction itself and must never receive an explicit init, so this
//! pass skips any tensor carrying a `CpAsync`/`CpAsyncBulkTensorTile`
//! cache op.

use crate::ir::{CacheOpType, Fusion};
use crate::kir::{AllocateFlags, KirArena, KirExpr, KirExprId};
use crate::lowering::{LoweringError, LoweringPass};
use crate::options::CompiledOptions;

pub struct InitializationInsertion;

impl LoweringPass for InitializationInsertion {
    fn name(&self) -> &'static str {
        "initialization_insertion"
    }

    fn run(
        &self,
        fusion: &mut Fusion,
        kir: &mut KirArena,
        top_level: Vec<KirExprId>,
        _options: &CompiledOptions,
    ) -> Result<Vec<KirExprId>, LoweringError> {
        let needs_init: Vec<_> = fusion
            .exprs_iter()
            .filter(|(_, e)| e.kind.is_reduction_like())
            .flat_map(|(_, e)| e.outputs.clone())
            .collect();

        for id in top_level.iter() {
            if let KirExpr::Allocate(alloc) = kir.get_mut(*id) {
                let output_value = fusion
                    .tensor_views_iter()
                    .find(|(tv, _)| *tv == alloc.buffer)
                    .map(|(tv, _)| tv);
                let Some(tv) = output_value else { continue };
                let is_cp_async = fusion
                    .tensor_view(tv)
                    .cache_op
                    .map(|op| matches!(op, CacheOpType::CpAsync | CacheOpType::CpAsyncBulkTensorTile))
                    .unwrap_or(false);
                let is_reduction_output = fusion
                    .exprs_iter()
                    .any(|(_, e)| e.kind.is_reduction_like() && e.outputs.iter().any(|v| matches!(fusion.value(*v), crate::ir::ValueData::Tensor(t) if *t == tv)));
                if is_reduction_output && !is_cp_async {
                    alloc.flags = AllocateFlags {
                        zero_init: true,
                        resets_to_zero: true,
                    };
                }
            }
        }
        let _ = needs_init;
        Ok(top_level)
    }
}
