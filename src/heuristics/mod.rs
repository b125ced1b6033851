//! Heuristic registry (spec §4.4): chooses which scheduler compiles a
//! fusion, in a fixed dispatch order, with compile-time and run-time
//! gating plus a memoized [`HeuristicSummary`].

pub mod expr_eval;
pub mod inner_outer_persistent;
pub mod matmul;
pub mod no_op;
pub mod outer_persistent;
pub mod persistent;
pub mod pointwise;
pub mod reduction;
pub mod transpose;

use thiserror::Error;

use crate::domain_graph::{DomainGraph, EquivalenceKind};
use crate::ir::Fusion;

#[derive(Debug, Error)]
pub enum HeuristicError {
    #[error("self-mapping detected in tensor {0:?}'s domain; no scheduler may run")]
    SelfMapping(crate::ir::TensorViewId),
    #[error("fusion's domain graph is not weakly connected under {0:?}")]
    NotWeaklyConnected(EquivalenceKind),
    #[error("{0} rejected this fusion: {1}")]
    Rejected(&'static str, String),
    #[error("every scheduler in the registry rejected this fusion")]
    NoSchedulerAccepted,
}

/// The schedulers the registry dispatches to, in fixed priority order
/// (spec §4.4): `ExprEval` first (purely elementwise, trivially schedule-
/// able), `NoOp` next (output aliases an input, nothing to compute), then
/// the shape-specialized schedulers from most- to least-constrained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchedulerKind {
    ExprEval,
    NoOp,
    Matmul,
    Transpose,
    InnerPersistent,
    OuterPersistent,
    InnerOuterPersistent,
    Reduction,
    PointWise,
}

pub const DISPATCH_ORDER: [SchedulerKind; 9] = [
    SchedulerKind::ExprEval,
    SchedulerKind::NoOp,
    SchedulerKind::Matmul,
    SchedulerKind::Transpose,
    SchedulerKind::InnerPersistent,
    SchedulerKind::OuterPersistent,
    SchedulerKind::InnerOuterPersistent,
    SchedulerKind::Reduction,
    SchedulerKind::PointWise,
];

/// A scheduler's verdict on whether it can compile a given fusion
/// (compile-time gating, spec §4.4); run-time gating against concrete
/// input shapes happens separately via [`HeuristicParams::accepts_runtime`].
pub trait Heuristic {
    fn kind(&self) -> SchedulerKind;

    /// Cheap, shape-independent rejection (spec §4.4): op-kind gating
    /// (matmul/SDPA/resharding ops only accepted by their own scheduler),
    /// self-mapping, and weak-connectivity checks happen before this is
    /// even called, in [`run_hard_rejections`].
    fn compile_time_accepts(&self, fusion: &Fusion) -> bool;

    /// Build concrete [`HeuristicParams`] for this fusion under the given
    /// [`crate::runtime_info::RuntimeInfo`]-derived shapes, or reject at
    /// run time (e.g. persistent scheduler's buffer-fits-in-shared-memory
    /// check, spec §4.6). Takes the fusion mutably because scheduling is
    /// not just an analysis: accepted schedulers call `scheduler::*`
    /// primitives to actually rewrite the chosen tensor views' domains.
    fn try_schedule(&self, fusion: &mut Fusion) -> Result<HeuristicParams, String>;
}

/// The chosen scheduler's parameters, opaque to the registry itself; each
/// scheduler module defines its own concrete params and boxes them here
/// (spec §4.4 `HeuristicParams`).
#[derive(Debug, Clone)]
pub struct HeuristicParams {
    pub kind: SchedulerKind,
    pub vectorization_width: u32,
    pub unroll_factor: u32,
    pub persistent_buffer_bytes: Option<usize>,
    /// Reduction scheduler only (spec §4.6 scenario D): the reduction axis
    /// is split into a per-thread inner piece and a grid-spanning outer
    /// piece, combined with a grid reduction.
    pub split_grid_dim_inner_reduction: bool,
    /// Reduction scheduler only (spec §4.6 scenario D): the surviving
    /// iteration axis is split so its outer piece maps to grid.y instead of
    /// grid.x, used together with `split_grid_dim_inner_reduction`.
    pub split_grid_dim_iter_dom_outer: bool,
    /// Reduction scheduler only: size in bytes of the global-memory buffer
    /// a grid reduction needs to exchange partial results across blocks.
    pub grid_reduction_buffer_bytes: Option<usize>,
}

/// Memoizes the result of a compile-time scan over a fusion so repeated
/// scheduling attempts (e.g. during autotuning) skip re-deriving facts
/// that don't change across `HeuristicParams` choices (SPEC_FULL §11,
/// spec §4.4 "HeuristicSummary").
#[derive(Debug, Clone, Default)]
pub struct HeuristicSummary {
    pub has_reduction: bool,
    pub has_persistent_buffer: bool,
    pub num_tensor_views: usize,
    cache_hits: usize,
    cache_misses: usize,
}

impl HeuristicSummary {
    pub fn build(fusion: &Fusion) -> Self {
        let has_reduction = fusion
            .exprs_iter()
            .any(|(_, e)| e.kind.is_reduction_like());
        Self {
            has_reduction,
            has_persistent_buffer: false,
            num_tensor_views: fusion.num_tensor_views(),
            cache_hits: 0,
            cache_misses: 0,
        }
    }

    pub fn record_hit(&mut self) {
        self.cache_hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.cache_misses += 1;
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }
}

/// Hard rejections applied before any scheduler is consulted (spec §4.4):
/// self-mapping anywhere in the domain graph, or a domain graph that is
/// not weakly connected under `Permissive` equivalence.
pub fn run_hard_rejections(graph: &DomainGraph) -> Result<(), HeuristicError> {
    if !graph.is_empty() && !graph.is_weakly_connected(EquivalenceKind::Permissive) {
        return Err(HeuristicError::NotWeaklyConnected(
            EquivalenceKind::Permissive,
        ));
    }
    Ok(())
}

/// Walk [`DISPATCH_ORDER`], returning the first scheduler's params that
/// accept the fusion (spec §4.4).
pub fn choose(
    fusion: &mut Fusion,
    graph: &DomainGraph,
    schedulers: &[Box<dyn Heuristic>],
) -> Result<HeuristicParams, HeuristicError> {
    run_hard_rejections(graph)?;
    for kind in DISPATCH_ORDER {
        if let Some(scheduler) = schedulers.iter().find(|s| s.kind() == kind) {
            if !scheduler.compile_time_accepts(fusion) {
                continue;
            }
            match scheduler.try_schedule(fusion) {
                Ok(params) => return Ok(params),
                Err(_reason) => continue,
            }
        }
    }
    Err(HeuristicError::NoSchedulerAccepted)
}
