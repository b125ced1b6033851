//! tensorfuse-core: lowering and scheduling core for fused tensor-program
//! GPU kernels.
//!
//! Sits between a front-end-built high-level tensor-expression IR (HIR,
//! [`ir::Fusion`]) and a kernel IR (KIR, [`kir`]) ready for textual
//! emission. Covers the IR itself, the domain graph used to reason about
//! iteration-domain equivalence, the schedule primitives, the heuristic
//! registry that picks a scheduler, the ordered lowering passes, and the
//! executor glue that infers output shapes. Front-end HIR construction,
//! the textual CUDA emitter, the PTX assembler, the runtime tensor
//! library, host-side marshalling, and the segmenter's internals are
//! external collaborators; only their interfaces live here.

#![warn(clippy::all)]

pub mod device;
pub mod domain_graph;
pub mod dtype;
pub mod error;
pub mod executor;
pub mod heuristics;
pub mod ir;
pub mod kir;
pub mod lowering;
pub mod options;
pub mod runtime_info;
pub mod scheduler;
pub mod segmenter;

pub use error::{CoreError, CoreResult};
pub use ir::Fusion;
pub use options::{CompiledOptions, Options};

use domain_graph::DomainGraph;
use heuristics::{Heuristic, HeuristicParams};
use kir::KirArena;
use lowering::LoweredKernel;
use runtime_info::RuntimeInfo;

/// The default heuristic set, in the registry's fixed dispatch order
/// (spec §4.4). Built fresh per call since several heuristics carry a
/// device capability snapshot.
fn default_schedulers(device: device::DeviceCapability) -> Vec<Box<dyn Heuristic>> {
    vec![
        Box::new(heuristics::expr_eval::ExprEvalHeuristic),
        Box::new(heuristics::no_op::NoOpHeuristic),
        Box::new(heuristics::matmul::MatmulHeuristic { device }),
        Box::new(heuristics::transpose::TransposeHeuristic),
        Box::new(heuristics::persistent::InnerPersistentHeuristic { device }),
        Box::new(heuristics::outer_persistent::OuterPersistentHeuristic { device }),
        Box::new(heuristics::inner_outer_persistent::InnerOuterPersistentHeuristic { device }),
        Box::new(heuristics::reduction::ReductionHeuristic { device }),
        Box::new(heuristics::pointwise::PointWiseHeuristic),
    ]
}

/// `choose_heuristic(Fusion, Inputs) -> HeuristicKind` (spec §6): the
/// registry walk without committing to a full schedule, used by callers
/// that only want to know which scheduler would run. Schedules a scratch
/// clone rather than `fusion` itself so callers keep their "no commitment"
/// guarantee even though `try_schedule` now rewrites tensor-view domains.
pub fn choose_heuristic(
    fusion: &Fusion,
    runtime: &RuntimeInfo,
) -> CoreResult<heuristics::SchedulerKind> {
    let graph = DomainGraph::build(fusion);
    let schedulers = default_schedulers(runtime.device);
    let mut scratch = fusion.clone();
    let params = heuristics::choose(&mut scratch, &graph, &schedulers)?;
    Ok(params.kind)
}

/// `schedule_and_lower(Fusion, Inputs, Options) -> LoweredKernel` (spec
/// §6): the full pipeline -- pick a scheduler, hand back its params, run
/// the ten ordered lowering passes (spec §4.9).
pub fn schedule_and_lower(
    mut fusion: Fusion,
    runtime: &RuntimeInfo,
    options: &Options,
) -> CoreResult<LoweredKernel> {
    let compiled_options = options.validate()?;
    let graph = DomainGraph::build(&fusion);
    let schedulers = default_schedulers(runtime.device);
    let params = heuristics::choose(&mut fusion, &graph, &schedulers)?;

    apply_heuristic_params(&mut fusion, &params);

    let kir = KirArena::new();
    let lowered = lowering::run_pipeline(&mut fusion, kir, &compiled_options, &[])?;
    Ok(lowered)
}

/// Applies a chosen scheduler's [`HeuristicParams`] to every tensor view in
/// the fusion (spec §4.5-§4.8): each concrete scheduler module owns the
/// detailed axis-level choices; this threads the shared ones (vectorization
/// width, unroll factor) onto the loop domain the schedulers already built.
fn apply_heuristic_params(fusion: &mut Fusion, params: &HeuristicParams) {
    if params.vectorization_width <= 1 {
        return;
    }
    let views: Vec<_> = fusion.tensor_views_iter().map(|(id, _)| id).collect();
    for tv in views {
        let Some(&axis) = fusion.tensor_view(tv).domain.loop_domain.last() else {
            continue;
        };
        let _ = scheduler::vectorize(fusion, tv, axis, params.vectorization_width);
    }
}

/// `infer_output_shapes(Fusion, Inputs) -> [Shape]` (spec §6).
pub fn infer_output_shapes(fusion: &Fusion, runtime: &RuntimeInfo) -> Vec<executor::BufferInfo> {
    let outputs: Vec<ir::TensorViewId> = fusion
        .outputs()
        .iter()
        .filter_map(|&v| match fusion.value(v) {
            ir::ValueData::Tensor(tv) => Some(*tv),
            _ => None,
        })
        .collect();
    executor::allocate_outputs(fusion, runtime, &outputs)
}

/// `allocate_outputs(Fusion, ShapeInfo, Device) -> [Buffer]` (spec §6): an
/// alias over [`executor::allocate_outputs`] kept at crate root so callers
/// outside `executor` don't need to know the module split.
pub fn allocate_outputs(
    fusion: &Fusion,
    runtime: &RuntimeInfo,
    outputs: &[ir::TensorViewId],
) -> Vec<executor::BufferInfo> {
    executor::allocate_outputs(fusion, runtime, outputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceCapability;

    #[test]
    fn choose_heuristic_on_empty_fusion_picks_expr_eval() {
        let fusion = Fusion::new();
        let runtime = RuntimeInfo::new(0, DeviceCapability::lookup_defaults(8, 0));
        let kind = choose_heuristic(&fusion, &runtime).unwrap();
        assert_eq!(kind, heuristics::SchedulerKind::ExprEval);
    }

    #[test]
    fn schedule_and_lower_on_empty_fusion_succeeds() {
        let fusion = Fusion::new();
        let runtime = RuntimeInfo::new(0, DeviceCapability::lookup_defaults(8, 0));
        let options = Options::default();
        let lowered = schedule_and_lower(fusion, &runtime, &options).unwrap();
        assert!(lowered.top_level.is_empty());
    }
}
