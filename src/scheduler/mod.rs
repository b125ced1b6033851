//! Schedule primitives (spec §4.3): the mutating operations that turn a
//! fresh [`TensorView`] into a scheduled one ready for lowering.
//!
//! Each primitive takes a `&mut Fusion` plus the [`TensorViewId`]s it acts
//! on and mutates `loop_domain`/`memory_type`/`parallel_type` in place,
//! mirroring the source scheduler's direct-mutation style rather than
//! building a separate schedule IR.

use thiserror::Error;

use crate::device::DeviceCapability;
use crate::ir::{
    CacheOpType, ComputeAtMode, ExprKind, Fusion, IdExpr, IterDomainId, MemoryAttr, MemoryType,
    ParallelType, ReductionOp, TensorViewId, ValueId,
};

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("axis {0:?} does not belong to tensor view {1:?}'s loop domain")]
    AxisNotInLoopDomain(IterDomainId, TensorViewId),
    #[error("cannot parallelize a reduction axis of an input tensor view {0:?}")]
    ParallelizeInputReduction(TensorViewId),
    #[error("computeAt position {position} exceeds consumer loop depth {loop_depth}")]
    ComputeAtPositionOutOfRange { position: usize, loop_depth: usize },
    #[error("circular buffering requires depth >= 2, got {0}")]
    CircularBufferDepthTooSmall(u32),
    #[error("vectorization width {width} does not evenly divide axis extent; violates stride contiguity")]
    VectorizationStrideViolation { width: u32 },
    #[error("rFactor axis {0:?} is not a reduction axis")]
    RFactorNotReduction(IterDomainId),
    #[error("{0}")]
    UnsupportedHardware(String),
}

fn loop_position(fusion: &Fusion, tv: TensorViewId, axis: IterDomainId) -> Option<usize> {
    fusion
        .tensor_view(tv)
        .domain
        .loop_domain
        .iter()
        .position(|&id| id == axis)
}

/// `split(tv, axis, factor, inner=true)` (spec §4.3): replaces `axis` in
/// `tv`'s loop domain with `(outer, inner)`.
pub fn split(
    fusion: &mut Fusion,
    tv: TensorViewId,
    axis: IterDomainId,
    factor: ValueId,
    inner_is_first: bool,
) -> Result<(IterDomainId, IterDomainId), ScheduleError> {
    let pos = loop_position(fusion, tv, axis)
        .ok_or(ScheduleError::AxisNotInLoopDomain(axis, tv))?;
    let (outer, inner) = fusion.split_id(axis, factor, inner_is_first);
    let loop_domain = &mut fusion.tensor_view_mut(tv).domain.loop_domain;
    loop_domain.splice(pos..=pos, [outer, inner]);
    Ok((outer, inner))
}

/// `merge(tv, outer, inner)` (spec §4.3): the two loop axes must be
/// adjacent; the merged axis takes the outer axis's position.
pub fn merge(
    fusion: &mut Fusion,
    tv: TensorViewId,
    outer: IterDomainId,
    inner: IterDomainId,
) -> Result<IterDomainId, ScheduleError> {
    let pos_outer =
        loop_position(fusion, tv, outer).ok_or(ScheduleError::AxisNotInLoopDomain(outer, tv))?;
    let pos_inner =
        loop_position(fusion, tv, inner).ok_or(ScheduleError::AxisNotInLoopDomain(inner, tv))?;
    let merged = fusion.merge_id(outer, inner);
    let loop_domain = &mut fusion.tensor_view_mut(tv).domain.loop_domain;
    let (lo, hi) = if pos_outer < pos_inner {
        (pos_outer, pos_inner)
    } else {
        (pos_inner, pos_outer)
    };
    loop_domain.splice(lo..=hi, [merged]);
    Ok(merged)
}

/// `reorder(tv, new_order)` (spec §4.3): `new_order[i]` is the loop-domain
/// position that should occupy position `i`.
pub fn reorder(
    fusion: &mut Fusion,
    tv: TensorViewId,
    new_order: &[usize],
) -> Result<(), ScheduleError> {
    let domain = &mut fusion.tensor_view_mut(tv).domain.loop_domain;
    let reordered: Vec<IterDomainId> = new_order.iter().map(|&i| domain[i]).collect();
    *domain = reordered;
    Ok(())
}

/// `parallelize(tv, axis, ptype)` (spec §4.3): a fusion input tensor's
/// reduction axis may never be parallelized (it has no data to reduce over).
pub fn parallelize(
    fusion: &mut Fusion,
    tv: TensorViewId,
    axis: IterDomainId,
    ptype: ParallelType,
) -> Result<(), ScheduleError> {
    loop_position(fusion, tv, axis).ok_or(ScheduleError::AxisNotInLoopDomain(axis, tv))?;
    if fusion.tensor_view(tv).is_fusion_input() && fusion.iter_domain(axis).is_reduction() {
        return Err(ScheduleError::ParallelizeInputReduction(tv));
    }
    fusion.iter_domain_mut(axis).parallel_type = ptype;
    Ok(())
}

/// `vectorize(tv, axis, width)` (spec §4.3): marks `axis` for vectorized
/// access; the caller must already know `width` divides the axis extent,
/// the responsibility split spec §4.9 gives to predicate insertion for the
/// non-divisible one-shot runtime case. Here we reject only the
/// statically-provable violation.
pub fn vectorize(
    fusion: &mut Fusion,
    tv: TensorViewId,
    axis: IterDomainId,
    width: u32,
) -> Result<(), ScheduleError> {
    loop_position(fusion, tv, axis).ok_or(ScheduleError::AxisNotInLoopDomain(axis, tv))?;
    let extent = fusion.iter_domain(axis).extent;
    if let Some(extent_val) = fusion.eval_literal_int(extent) {
        if width != 0 && extent_val % i64::from(width) != 0 {
            return Err(ScheduleError::VectorizationStrideViolation { width });
        }
    }
    fusion.iter_domain_mut(axis).parallel_type = ParallelType::Vectorize;
    Ok(())
}

/// `swizzle(tv, axis, kind)` (spec §4.3).
pub fn swizzle(
    fusion: &mut Fusion,
    tv: TensorViewId,
    axis: IterDomainId,
    kind: crate::ir::SwizzleType,
) -> Result<IterDomainId, ScheduleError> {
    let pos = loop_position(fusion, tv, axis).ok_or(ScheduleError::AxisNotInLoopDomain(axis, tv))?;
    let output = fusion.swizzle_id(axis, kind);
    fusion.tensor_view_mut(tv).domain.loop_domain[pos] = output;
    Ok(output)
}

/// `rFactor(tv, axes)` (spec §4.6 reduction scheduler): splits a reduction
/// into a local partial-reduction producer and a final-reduction consumer;
/// each axis named must be a reduction axis of `tv`. The producer keeps
/// `tv`'s full domain (and inherits its definition) and accumulates over
/// `axes` in registers/local memory; the consumer's domain drops `axes` and
/// is defined by a new reduction expr over the producer, redistributing the
/// reduction onto two tensors the way a grid reduction needs.
pub fn r_factor(
    fusion: &mut Fusion,
    tv: TensorViewId,
    axes: &[IterDomainId],
) -> Result<(TensorViewId, TensorViewId), ScheduleError> {
    for &axis in axes {
        loop_position(fusion, tv, axis).ok_or(ScheduleError::AxisNotInLoopDomain(axis, tv))?;
        if !fusion.iter_domain(axis).is_reduction() {
            return Err(ScheduleError::RFactorNotReduction(axis));
        }
    }

    let source = fusion.tensor_view(tv).clone();
    let op = match source.definition.map(|id| fusion.expr(id).kind.clone()) {
        Some(ExprKind::Reduction { op, .. }) => op,
        _ => ReductionOp::Add,
    };

    let producer = fusion.add_tensor_view(source.domain.clone(), source.dtype);
    fusion.tensor_view_mut(producer).memory_type = MemoryType::Local;
    fusion.tensor_view_mut(producer).definition = source.definition;

    let mut consumer_domain = source.domain.clone();
    consumer_domain.root.retain(|id| !axes.contains(id));
    consumer_domain.logical.retain(|id| !axes.contains(id));
    consumer_domain.allocation.retain(|id| !axes.contains(id));
    consumer_domain.loop_domain.retain(|id| !axes.contains(id));
    let consumer = fusion.add_tensor_view(consumer_domain, source.dtype);

    let producer_value = fusion.add_tensor_value(producer);
    let consumer_value = fusion.add_tensor_value(consumer);
    fusion.add_expr(
        ExprKind::Reduction {
            op,
            reduction_axes: axes.to_vec(),
        },
        vec![producer_value],
        vec![consumer_value],
    );

    compute_at(fusion, producer, consumer, 0, ComputeAtMode::MostInlined)?;
    Ok((producer, consumer))
}

fn check_hardware_support(op: CacheOpType, device: DeviceCapability) -> Result<(), ScheduleError> {
    match op {
        CacheOpType::CpAsync if !device.supports_cp_async() => {
            Err(ScheduleError::UnsupportedHardware(format!(
                "CpAsync requires SM 8.0+, device is SM {}.{}",
                device.sm_major, device.sm_minor
            )))
        }
        CacheOpType::CpAsyncBulkTensorTile if !device.supports_cp_async_bulk() => {
            Err(ScheduleError::UnsupportedHardware(format!(
                "CpAsyncBulkTensorTile requires SM 9.0+, device is SM {}.{}",
                device.sm_major, device.sm_minor
            )))
        }
        _ => Ok(()),
    }
}

/// `cacheBefore(tv)` (spec §4.3): materializes a cache tensor between `tv`'s
/// producer and `tv` itself. `tv`'s existing definition moves onto the new
/// cache tensor; `tv` is redefined as a `CacheOp` reading the cache back out,
/// so consumers that already reference `tv` see the cached value untouched.
pub fn cache_before(
    fusion: &mut Fusion,
    tv: TensorViewId,
    op: CacheOpType,
    device: DeviceCapability,
) -> Result<TensorViewId, ScheduleError> {
    check_hardware_support(op, device)?;
    let source = fusion.tensor_view(tv).clone();
    let cache = fusion.add_tensor_view(source.domain.clone(), source.dtype);
    fusion.tensor_view_mut(cache).memory_type = MemoryType::Shared;
    fusion.tensor_view_mut(cache).cache_op = Some(op);
    fusion.tensor_view_mut(cache).definition = source.definition;

    let cache_value = fusion.add_tensor_value(cache);
    let tv_value = fusion.add_tensor_value(tv);
    let bulk_async = matches!(op, CacheOpType::CpAsyncBulkTensorTile);
    fusion.add_expr(ExprKind::CacheOp { bulk_async }, vec![cache_value], vec![tv_value]);
    Ok(cache)
}

/// `cacheAfter(tv)` (spec §4.3): materializes a cache tensor between an
/// input `tv` and its first user. Unlike `cacheBefore`, `tv` keeps its own
/// definition (or lack of one, for a fusion input); the cache tensor gets a
/// fresh `CacheOp` definition that reads `tv` directly.
pub fn cache_after(
    fusion: &mut Fusion,
    tv: TensorViewId,
    op: CacheOpType,
    device: DeviceCapability,
) -> Result<TensorViewId, ScheduleError> {
    check_hardware_support(op, device)?;
    let source = fusion.tensor_view(tv).clone();
    let cache = fusion.add_tensor_view(source.domain.clone(), source.dtype);
    fusion.tensor_view_mut(cache).memory_type = MemoryType::Shared;
    fusion.tensor_view_mut(cache).cache_op = Some(op);

    let tv_value = fusion.add_tensor_value(tv);
    let cache_value = fusion.add_tensor_value(cache);
    let bulk_async = matches!(op, CacheOpType::CpAsyncBulkTensorTile);
    fusion.add_expr(ExprKind::CacheOp { bulk_async }, vec![tv_value], vec![cache_value]);
    Ok(cache)
}

/// `computeAt(producer, consumer, position, mode)` (spec §4.3): records the
/// loop depth at which `producer` is inlined into `consumer`.
pub fn compute_at(
    fusion: &mut Fusion,
    producer: TensorViewId,
    consumer: TensorViewId,
    position: usize,
    mode: ComputeAtMode,
) -> Result<(), ScheduleError> {
    let consumer_depth = fusion.tensor_view(consumer).domain.loop_domain.len();
    let resolved = match mode {
        ComputeAtMode::Standard => {
            if position > consumer_depth {
                return Err(ScheduleError::ComputeAtPositionOutOfRange {
                    position,
                    loop_depth: consumer_depth,
                });
            }
            position
        }
        ComputeAtMode::BestEffort => position.min(consumer_depth),
        ComputeAtMode::MostInlined => consumer_depth,
    };
    fusion.tensor_view_mut(producer).compute_at_position = resolved;
    Ok(())
}

/// `inlineAt(tv, position)` (spec §4.3): shorthand for `computeAt` against
/// `tv`'s own loop domain, used by the inliner pass after scheduling.
pub fn inline_at(fusion: &mut Fusion, tv: TensorViewId, position: usize) -> Result<(), ScheduleError> {
    let depth = fusion.tensor_view(tv).domain.loop_domain.len();
    if position > depth {
        return Err(ScheduleError::ComputeAtPositionOutOfRange {
            position,
            loop_depth: depth,
        });
    }
    fusion.tensor_view_mut(tv).compute_at_position = position;
    Ok(())
}

/// `broadcast(tv, axes)` (spec §4.3): adds broadcast placeholder axes to
/// `tv`'s logical and loop domains at `axes`' positions.
pub fn broadcast(fusion: &mut Fusion, tv: TensorViewId, positions: &[usize]) {
    let zero = fusion.add_literal(crate::ir::LiteralValue::Int(0));
    let one = fusion.add_literal(crate::ir::LiteralValue::Int(1));
    let mut sorted = positions.to_vec();
    sorted.sort_unstable();
    for pos in sorted {
        let bcast = fusion.add_broadcast_iter_domain(zero, one);
        let domain = &mut fusion.tensor_view_mut(tv).domain;
        let at = pos.min(domain.logical.len());
        domain.logical.insert(at, bcast);
        domain.loop_domain.insert(at, bcast);
    }
}

/// `squeeze(tv, axes)` (spec §4.3): the inverse of `broadcast`; removes the
/// named broadcast axes from the logical and loop domains.
pub fn squeeze(fusion: &mut Fusion, tv: TensorViewId, axes: &[IterDomainId]) {
    let domain = &mut fusion.tensor_view_mut(tv).domain;
    domain.logical.retain(|id| !axes.contains(id));
    domain.loop_domain.retain(|id| !axes.contains(id));
}

/// `setMemoryType(tv, memory_type)` (spec §4.3).
pub fn set_memory_type(fusion: &mut Fusion, tv: TensorViewId, memory_type: MemoryType) {
    fusion.tensor_view_mut(tv).memory_type = memory_type;
}

/// `circularBuffer(tv, depth)` (spec §4.3, §4.9 step 8): depth must be at
/// least 2 (single-buffered is simply not circular).
pub fn circular_buffer(
    fusion: &mut Fusion,
    tv: TensorViewId,
    depth: u32,
) -> Result<(), ScheduleError> {
    if depth < 2 {
        return Err(ScheduleError::CircularBufferDepthTooSmall(depth));
    }
    fusion.tensor_view_mut(tv).memory_attr = Some(MemoryAttr::CircularBuffer { depth });
    Ok(())
}

/// True if `id_a` and `id_b` were ever produced by the same [`IdExpr`]
/// (used by the pointwise scheduler's maximum-spanning-tree transform
/// propagation, spec §4.5, to decide which reference tensor's schedule to
/// replay onto the others).
pub fn share_transform(fusion: &Fusion, id_a: IterDomainId, id_b: IterDomainId) -> bool {
    match (
        fusion.iter_domain(id_a).definition,
        fusion.iter_domain(id_b).definition,
    ) {
        (Some(da), Some(db)) => da == db,
        _ => false,
    }
}

pub(crate) fn split_outputs(expr: &IdExpr) -> Vec<IterDomainId> {
    expr.outputs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::iter_domain::IterType;
    use crate::ir::{CacheOpType, LiteralValue};

    fn simple_tv(fusion: &mut Fusion) -> (TensorViewId, IterDomainId) {
        let zero = fusion.add_literal(LiteralValue::Int(0));
        let extent = fusion.add_literal(LiteralValue::Int(16));
        let root = fusion.add_root_iter_domain(zero, extent, IterType::Iteration);
        let domain = crate::ir::TensorDomain::from_root(vec![root], fusion);
        let tv = fusion.add_tensor_view(domain, crate::dtype::DataType::Float);
        (tv, root)
    }

    #[test]
    fn split_updates_loop_domain() {
        let mut fusion = Fusion::new();
        let (tv, root) = simple_tv(&mut fusion);
        let factor = fusion.add_literal(LiteralValue::Int(4));
        let (outer, inner) = split(&mut fusion, tv, root, factor, true).unwrap();
        let loop_domain = &fusion.tensor_view(tv).domain.loop_domain;
        assert_eq!(loop_domain, &vec![outer, inner]);
    }

    #[test]
    fn parallelize_input_reduction_rejected() {
        let mut fusion = Fusion::new();
        let zero = fusion.add_literal(LiteralValue::Int(0));
        let extent = fusion.add_literal(LiteralValue::Int(16));
        let root = fusion.add_root_iter_domain(zero, extent, IterType::Reduction);
        let domain = crate::ir::TensorDomain::from_root(vec![root], &fusion);
        let tv = fusion.add_tensor_view(domain, crate::dtype::DataType::Float);
        assert!(matches!(
            parallelize(&mut fusion, tv, root, ParallelType::TIDx),
            Err(ScheduleError::ParallelizeInputReduction(_))
        ));
    }

    #[test]
    fn circular_buffer_depth_one_rejected() {
        let mut fusion = Fusion::new();
        let (tv, _) = simple_tv(&mut fusion);
        assert!(matches!(
            circular_buffer(&mut fusion, tv, 1),
            Err(ScheduleError::CircularBufferDepthTooSmall(1))
        ));
    }

    #[test]
    fn cache_before_produces_shared_tensor() {
        let mut fusion = Fusion::new();
        let (tv, _) = simple_tv(&mut fusion);
        let device = crate::device::DeviceCapability::lookup_defaults(8, 0);
        let cache = cache_before(&mut fusion, tv, CacheOpType::Load, device).unwrap();
        assert_eq!(fusion.tensor_view(cache).memory_type, MemoryType::Shared);
    }

    #[test]
    fn cache_before_rejects_cp_async_below_sm80() {
        let mut fusion = Fusion::new();
        let (tv, _) = simple_tv(&mut fusion);
        let device = crate::device::DeviceCapability::lookup_defaults(7, 0);
        assert!(matches!(
            cache_before(&mut fusion, tv, CacheOpType::CpAsync, device),
            Err(ScheduleError::UnsupportedHardware(_))
        ));
    }

    #[test]
    fn r_factor_splits_reduction_into_producer_and_consumer() {
        let mut fusion = Fusion::new();
        let zero = LiteralValue::Int(0);
        let zero = fusion.add_literal(zero);
        let extent = fusion.add_literal(LiteralValue::Int(16));
        let root = fusion.add_root_iter_domain(zero, extent, IterType::Reduction);
        let domain = crate::ir::TensorDomain::from_root(vec![root], &fusion);
        let tv = fusion.add_tensor_view(domain, crate::dtype::DataType::Float);
        let (producer, consumer) = r_factor(&mut fusion, tv, &[root]).unwrap();
        assert_eq!(fusion.tensor_view(producer).memory_type, MemoryType::Local);
        assert!(fusion.tensor_view(consumer).domain.loop_domain.is_empty());
    }

    #[test]
    fn compute_at_most_inlined_uses_full_depth() {
        let mut fusion = Fusion::new();
        let (producer, _) = simple_tv(&mut fusion);
        let (consumer, _) = simple_tv(&mut fusion);
        compute_at(&mut fusion, producer, consumer, 0, ComputeAtMode::MostInlined).unwrap();
        assert_eq!(fusion.tensor_view(producer).compute_at_position, 1);
    }
}
