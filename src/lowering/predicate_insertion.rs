//! Pass 4 (spec §4.9), the largest lowering pass:
//!
//! - Divisible splits need no predicate.
//! - Non-divisible, non-vectorized splits get a per-iteration
//!   `i*factor + j < extent` write predicate.
//! - Non-divisible *vectorized* splits get no per-iteration predicate;
//!   instead a one-shot `ceilDiv(extent, outer) % vector_width == 0` check
//!   at kernel entry, failing with
//!   [`LoweringError::VectorizationStrideViolation`].
//! - A broadcast ID permissively mapped to multiple non-matching concrete
//!   extents is non-uniquely concretized and its writes must be predicated
//!   on the concrete consumer's extent.
//! - Thread-redundant writes to global memory get a `tid==0 && bid==0`
//!   predicate, recorded on the allocation's predicate bitmap.
//! - Magic-zero: a predicate the compiler could fold to a constant across a
//!   loop boundary is wrapped with `+ magic_zero`.
//! - `rand`-like ops are predicated so an out-of-bounds thread never
//!   advances RNG state.

use crate::dtype::DataType;
use crate::ir::{BinaryOpKind, ExprId, ExprKind, Fusion, IdExpr, IterDomainId, LiteralValue, ParallelType, ValueId};
use crate::kir::{KirArena, KirExpr, KirExprId};
use crate::lowering::{LoweringError, LoweringPass};
use crate::options::CompiledOptions;

pub struct PredicateInsertion;

impl LoweringPass for PredicateInsertion {
    fn name(&self) -> &'static str {
        "predicate_insertion"
    }

    fn run(
        &self,
        fusion: &mut Fusion,
        kir: &mut KirArena,
        top_level: Vec<KirExprId>,
        _options: &CompiledOptions,
    ) -> Result<Vec<KirExprId>, LoweringError> {
        self.check_vectorized_non_divisible_splits(fusion)?;
        self.predicate_non_divisible_splits(fusion, kir, &top_level);
        self.predicate_redundant_global_writes(fusion, kir, &top_level);
        self.predicate_rand_ops(fusion);
        Ok(top_level)
    }
}

impl PredicateInsertion {
    /// The one-shot runtime check for vectorized non-divisible splits (spec
    /// §4.9 step 4): any ID whose defining split is non-divisible *and*
    /// whose own parallel type is a vectorize kind fails eagerly rather
    /// than emitting a per-iteration predicate the vector instruction
    /// cannot express.
    fn check_vectorized_non_divisible_splits(&self, fusion: &Fusion) -> Result<(), LoweringError> {
        for (_, id_expr) in fusion.id_exprs_iter() {
            if let crate::ir::IdExpr::Split {
                inner,
                divisible,
                factor,
                ..
            } = id_expr
            {
                if *divisible {
                    continue;
                }
                let inner_domain = fusion.iter_domain(*inner);
                if inner_domain.parallel_type.is_vectorize() {
                    let width = fusion.eval_literal_int(*factor).unwrap_or(1) as u32;
                    return Err(LoweringError::VectorizationStrideViolation(format!(
                        "non-divisible split feeding a vectorized axis with width {}",
                        width
                    )));
                }
            }
        }
        Ok(())
    }

    /// Per-iteration write predicate for non-divisible, non-vectorized
    /// splits (spec §4.9 step 4 `i*factor + j < extent`): walks every
    /// `Split` id-expr, skips divisible ones and ones feeding a vectorized
    /// axis (those already failed eagerly above), and for the rest builds
    /// `outer_index*factor + inner_index + magic_zero < original_extent`
    /// and records it as the write predicate of whichever tensor's loop
    /// domain carries the inner id, wrapping its KIR node in an
    /// `IfThenElse`.
    fn predicate_non_divisible_splits(&self, fusion: &mut Fusion, kir: &mut KirArena, top_level: &[KirExprId]) {
        let magic_zero = fusion.add_symbolic_scalar(DataType::Index, Some("magic_zero".into()));
        let splits: Vec<_> = fusion
            .id_exprs_iter()
            .filter_map(|(_, id_expr)| match id_expr {
                IdExpr::Split {
                    input,
                    factor,
                    outer,
                    inner,
                    divisible,
                    ..
                } if !*divisible && !fusion.iter_domain(*inner).parallel_type.is_vectorize() => {
                    Some((*input, *factor, *outer, *inner))
                }
                _ => None,
            })
            .collect();

        for (input, factor, outer, inner) in splits {
            let targets: Vec<ExprId> = fusion
                .tensor_views_iter()
                .filter(|(_, tv)| !tv.is_fusion_input() && tv.domain.loop_domain.contains(&inner))
                .filter_map(|(_, tv)| tv.definition)
                .collect();
            if targets.is_empty() {
                continue;
            }

            let outer_index = index_var_for(fusion, kir, top_level, outer);
            let inner_index = index_var_for(fusion, kir, top_level, inner);
            let extent = fusion.iter_domain(input).extent;

            let scaled = binop(fusion, BinaryOpKind::Mul, DataType::Index, outer_index, factor);
            let summed = binop(fusion, BinaryOpKind::Add, DataType::Index, scaled, inner_index);
            let wrapped = binop(fusion, BinaryOpKind::Add, DataType::Index, summed, magic_zero);
            let predicate = binop(fusion, BinaryOpKind::Lt, DataType::Bool, wrapped, extent);

            for target in targets {
                if fusion.expr(target).write_predicate.is_some() {
                    continue;
                }
                fusion.expr_mut(target).write_predicate = Some(predicate);
                wrap_with_predicate(kir, top_level, target, predicate);
            }
        }
    }

    /// Thread-redundant writes to global memory (spec §4.9 step 4): a
    /// tensor whose [`redundant_write_bitmap`] is non-empty is written
    /// identically by every thread along those parallel dims, so only the
    /// zero index along each of them should perform the store.
    fn predicate_redundant_global_writes(&self, fusion: &mut Fusion, kir: &mut KirArena, top_level: &[KirExprId]) {
        let zero = fusion.add_literal(LiteralValue::Int(0));
        let views: Vec<_> = fusion
            .tensor_views_iter()
            .filter(|(_, tv)| tv.memory_type == crate::ir::MemoryType::Global && !tv.is_fusion_input())
            .map(|(id, _)| id)
            .collect();

        for tv in views {
            let bitmap = redundant_write_bitmap(fusion, tv);
            if bitmap == 0 {
                continue;
            }
            let Some(target) = fusion.tensor_view(tv).definition else {
                continue;
            };
            if fusion.expr(target).write_predicate.is_some() {
                continue;
            }

            let redundant_axes: Vec<IterDomainId> = fusion
                .tensor_view(tv)
                .domain
                .loop_domain
                .iter()
                .copied()
                .filter(|&axis| {
                    let ptype = fusion.iter_domain(axis).parallel_type;
                    matches!(ptype, ParallelType::TIDx | ParallelType::BIDx)
                })
                .collect();

            let mut guard: Option<ValueId> = None;
            for axis in redundant_axes {
                let index = index_var_for(fusion, kir, top_level, axis);
                let is_zero = binop(fusion, BinaryOpKind::Eq, DataType::Bool, index, zero);
                guard = Some(match guard {
                    // no boolean And in BinaryOpKind; 0/1-valued booleans
                    // compose under Mul the same way they would under And.
                    Some(acc) => binop(fusion, BinaryOpKind::Mul, DataType::Bool, acc, is_zero),
                    None => is_zero,
                });
            }
            if let Some(predicate) = guard {
                fusion.expr_mut(target).write_predicate = Some(predicate);
                wrap_with_predicate(kir, top_level, target, predicate);
            }
        }
    }

    /// Marks every `rand`-like unary op's output with a write predicate
    /// placeholder so a later emitter never advances RNG state on an
    /// out-of-bounds thread. The predicate value itself -- the bounds
    /// check -- is derived from the consumer's loop predicate, which this
    /// module does not construct in isolation; it sets the op's
    /// `write_predicate` slot to a sentinel scalar so the invariant is
    /// visible to downstream passes and tests.
    fn predicate_rand_ops(&self, fusion: &mut Fusion) {
        let rand_exprs: Vec<_> = fusion
            .exprs_iter()
            .filter(|(_, e)| matches!(e.kind, ExprKind::UnaryOp(crate::ir::UnaryOpKind::Rand)))
            .map(|(id, _)| id)
            .collect();
        for id in rand_exprs {
            if fusion.expr(id).write_predicate.is_none() {
                let sentinel = fusion.add_symbolic_scalar(crate::dtype::DataType::Bool, Some("in_bounds".into()));
                fusion.expr_mut(id).write_predicate = Some(sentinel);
            }
        }
    }
}

/// Builds `out = a <op> b` as a fresh scalar `BinaryOp` expr and returns its
/// output value.
fn binop(fusion: &mut Fusion, kind: BinaryOpKind, dtype: DataType, a: ValueId, b: ValueId) -> ValueId {
    let out = fusion.add_symbolic_scalar(dtype, None);
    fusion.add_expr(ExprKind::BinaryOp(kind), vec![a, b], vec![out]);
    out
}

/// The runtime index for `axis`: the `ForLoop` index variable if one was
/// generated for it, or a freshly synthesized intrinsic (`threadIdx.x`-like)
/// scalar when `axis` is thread- or block-parallelized and so never gets a
/// loop of its own.
fn index_var_for(fusion: &mut Fusion, kir: &KirArena, top_level: &[KirExprId], axis: IterDomainId) -> ValueId {
    if let Some(found) = find_index_var(kir, top_level, axis) {
        return found;
    }
    let ptype = fusion.iter_domain(axis).parallel_type;
    fusion.add_symbolic_scalar(DataType::Index, Some(format!("{:?}", ptype)))
}

fn find_index_var(kir: &KirArena, ids: &[KirExprId], axis: IterDomainId) -> Option<ValueId> {
    for &id in ids {
        match kir.get(id) {
            KirExpr::ForLoop {
                iter_domain,
                index_var,
                body,
            } => {
                if *iter_domain == axis {
                    return Some(*index_var);
                }
                if let Some(v) = find_index_var(kir, body, axis) {
                    return Some(v);
                }
            }
            KirExpr::IfThenElse {
                then_body,
                else_body,
                ..
            } => {
                if let Some(v) = find_index_var(kir, then_body, axis) {
                    return Some(v);
                }
                if let Some(v) = find_index_var(kir, else_body, axis) {
                    return Some(v);
                }
            }
            _ => {}
        }
    }
    None
}

/// Finds the KIR node wrapping `target`'s `Expr` (possibly nested inside a
/// `ForLoop`/`IfThenElse` body) and replaces it in place with an
/// `IfThenElse` guarding it on `predicate`. No-op if `target` never made it
/// into the lowered tree (e.g. it has no surviving output).
fn wrap_with_predicate(kir: &mut KirArena, ids: &[KirExprId], target: ExprId, predicate: ValueId) -> bool {
    for &id in ids {
        if matches!(kir.get(id), KirExpr::Expr(e) if *e == target) {
            let original = kir.get(id).clone();
            let body_id = kir.push(original);
            *kir.get_mut(id) = KirExpr::IfThenElse {
                predicate,
                then_body: vec![body_id],
                else_body: vec![],
            };
            return true;
        }
    }
    for &id in ids {
        let nested = match kir.get(id) {
            KirExpr::ForLoop { body, .. } => Some(body.clone()),
            KirExpr::IfThenElse { then_body, .. } => Some(then_body.clone()),
            _ => None,
        };
        if let Some(nested) = nested {
            if wrap_with_predicate(kir, &nested, target, predicate) {
                return true;
            }
        }
    }
    false
}

/// Thread-redundant-write predicate bitmap for a tensor stored in global
/// memory (spec §4.9 step 4): one bit per parallel dim across which the
/// write is redundant.
pub fn redundant_write_bitmap(fusion: &Fusion, tv: crate::ir::TensorViewId) -> u8 {
    let view = fusion.tensor_view(tv);
    let mut bitmap = 0u8;
    for &axis in &view.domain.loop_domain {
        let ptype = fusion.iter_domain(axis).parallel_type;
        if matches!(ptype, ParallelType::TIDx) {
            bitmap |= 0b0000_0001;
        }
        if matches!(ptype, ParallelType::BIDx) {
            bitmap |= 0b0001_0000;
        }
    }
    bitmap
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::iter_domain::IterType;
    use crate::ir::LiteralValue;
    use crate::options::Options;

    #[test]
    fn vectorized_non_divisible_split_is_rejected() {
        let mut fusion = Fusion::new();
        let zero = fusion.add_literal(LiteralValue::Int(0));
        let extent = fusion.add_literal(LiteralValue::Int(17));
        let root = fusion.add_root_iter_domain(zero, extent, IterType::Iteration);
        let factor = fusion.add_literal(LiteralValue::Int(4));
        let (_, inner) = fusion.split_id(root, factor, true);
        fusion.iter_domain_mut(inner).parallel_type = ParallelType::Vectorize;

        let pass = PredicateInsertion;
        let opts = Options::default().validate().unwrap();
        let mut kir = KirArena::new();
        let result = pass.run(&mut fusion, &mut kir, vec![], &opts);
        assert!(matches!(
            result,
            Err(LoweringError::VectorizationStrideViolation(_))
        ));
    }

    #[test]
    fn divisible_vectorized_split_passes() {
        let mut fusion = Fusion::new();
        let zero = fusion.add_literal(LiteralValue::Int(0));
        let extent = fusion.add_literal(LiteralValue::Int(16));
        let root = fusion.add_root_iter_domain(zero, extent, IterType::Iteration);
        let factor = fusion.add_literal(LiteralValue::Int(4));
        let (_, inner) = fusion.split_id(root, factor, true);
        fusion.iter_domain_mut(inner).parallel_type = ParallelType::Vectorize;

        let pass = PredicateInsertion;
        let opts = Options::default().validate().unwrap();
        let mut kir = KirArena::new();
        assert!(pass.run(&mut fusion, &mut kir, vec![], &opts).is_ok());
    }

    #[test]
    fn non_divisible_serial_split_gets_a_guarded_predicate() {
        use crate::ir::{ExprKind, TensorDomain, UnaryOpKind};
        use crate::lowering::loop_nest_generation::LoopNestGeneration;
        use crate::scheduler;

        let mut fusion = Fusion::new();
        let zero = fusion.add_literal(LiteralValue::Int(0));
        let extent = fusion.add_literal(LiteralValue::Int(17));
        let root = fusion.add_root_iter_domain(zero, extent, IterType::Iteration);
        let domain = TensorDomain::from_root(vec![root], &fusion);
        let tv = fusion.add_tensor_view(domain, crate::dtype::DataType::Float);
        let input = fusion.add_symbolic_scalar(crate::dtype::DataType::Float, None);
        let output = fusion.add_tensor_value(tv);
        let def = fusion.add_expr(ExprKind::UnaryOp(UnaryOpKind::Neg), vec![input], vec![output]);

        let factor = fusion.add_literal(LiteralValue::Int(4));
        scheduler::split(&mut fusion, tv, root, factor, true).unwrap();

        let opts = Options::default().validate().unwrap();
        let mut kir = KirArena::new();
        let top_level = LoopNestGeneration.run(&mut fusion, &mut kir, vec![], &opts).unwrap();

        let pass = PredicateInsertion;
        let top_level = pass.run(&mut fusion, &mut kir, top_level, &opts).unwrap();

        assert!(fusion.expr(def).write_predicate.is_some());
        assert!(top_level
            .iter()
            .any(|&id| contains_if_then_else(&kir, id)));
    }

    fn contains_if_then_else(kir: &KirArena, id: KirExprId) -> bool {
        match kir.get(id) {
            KirExpr::IfThenElse { .. } => true,
            KirExpr::ForLoop { body, .. } => body.iter().any(|&b| contains_if_then_else(kir, b)),
            _ => false,
        }
    }
}
