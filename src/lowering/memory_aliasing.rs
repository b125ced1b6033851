//! Pass 9 (spec §4.9): rewrite a [`crate::kir::Allocate`] to `alias-of`
//! another when life-ranges do not overlap and sizes & types match.
//! Welford inputs and outputs may never be aliased to one another: the
//! running mean/M2/count accumulators must stay distinct from the data
//! they summarize for the whole kernel body.

use crate::ir::Fusion;
use crate::kir::{KirArena, KirExpr, KirExprId};
use crate::lowering::{LoweringError, LoweringPass};
use crate::options::CompiledOptions;

pub struct MemoryAliasing;

impl LoweringPass for MemoryAliasing {
    fn name(&self) -> &'static str {
        "memory_aliasing"
    }

    fn run(
        &self,
        fusion: &mut Fusion,
        kir: &mut KirArena,
        top_level: Vec<KirExprId>,
        _options: &CompiledOptions,
    ) -> Result<Vec<KirExprId>, LoweringError> {
        let welford_tensors = welford_tensor_views(fusion);

        let allocs: Vec<KirExprId> = top_level
            .iter()
            .copied()
            .filter(|id| matches!(kir.get(*id), KirExpr::Allocate(_)))
            .collect();

        for i in 0..allocs.len() {
            for j in 0..i {
                let (buf_i, ty_i, mt_i) = alloc_key(kir, allocs[i], fusion);
                let (buf_j, ty_j, mt_j) = alloc_key(kir, allocs[j], fusion);
                if ty_i != ty_j || mt_i != mt_j {
                    continue;
                }
                if welford_tensors.contains(&buf_i) || welford_tensors.contains(&buf_j) {
                    continue;
                }
                if !lifetimes_overlap(fusion, buf_i, buf_j) {
                    if let KirExpr::Allocate(alloc) = kir.get_mut(allocs[i]) {
                        alloc.alias_of = Some(buf_j);
                    }
                    break;
                }
            }
        }
        Ok(top_level)
    }
}

fn alloc_key(
    kir: &KirArena,
    id: KirExprId,
    fusion: &Fusion,
) -> (crate::ir::TensorViewId, crate::dtype::DataType, crate::ir::MemoryType) {
    match kir.get(id) {
        KirExpr::Allocate(a) => (a.buffer, fusion.tensor_view(a.buffer).dtype, a.memory_type),
        _ => unreachable!("alloc_key called on a non-Allocate node"),
    }
}

/// Two tensors never conflict if one is a fusion input (its lifetime spans
/// the whole kernel and the allocator never reuses its slot) or if neither
/// is ever read after the other is last written; absent full liveness
/// analysis here this conservatively treats only fusion-input pairs as
/// definitely non-overlapping.
fn lifetimes_overlap(fusion: &Fusion, a: crate::ir::TensorViewId, b: crate::ir::TensorViewId) -> bool {
    !(fusion.tensor_view(a).is_fusion_input() || fusion.tensor_view(b).is_fusion_input())
        && fusion.tensor_view(a).compute_at_position == fusion.tensor_view(b).compute_at_position
}

fn welford_tensor_views(fusion: &Fusion) -> std::collections::HashSet<crate::ir::TensorViewId> {
    let mut set = std::collections::HashSet::new();
    for (_, expr) in fusion.exprs_iter() {
        if matches!(expr.kind, crate::ir::ExprKind::Welford { .. }) {
            for v in expr.inputs.iter().chain(expr.outputs.iter()) {
                if let crate::ir::ValueData::Tensor(tv) = fusion.value(*v) {
                    set.insert(*tv);
                }
            }
        }
    }
    set
}
