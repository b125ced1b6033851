//! Lowering passes (spec §4.9): the ten ordered transformations from a
//! scheduled [`Fusion`] to a [`LoweredKernel`] of [`KirExpr`]s.

pub mod allocation_placement;
pub mod circular_buffer_expansion;
pub mod grid_sync_insertion;
pub mod index_type_lowering;
pub mod initialization_insertion;
pub mod loop_nest_generation;
pub mod memory_aliasing;
pub mod predicate_insertion;
pub mod replace_symbolic_sizes;
pub mod synchronization_insertion;

use thiserror::Error;

use crate::ir::Fusion;
use crate::kir::{KirArena, KirExprId};
use crate::options::CompiledOptions;

#[derive(Debug, Error)]
pub enum LoweringError {
    #[error("index type overflow: maximum byte offset {max_byte_offset} requires int64 but int32 was forced")]
    IndexTypeOverflow { max_byte_offset: u64 },
    #[error("vectorization stride violation: {0}")]
    VectorizationStrideViolation(String),
    #[error("non-uniquely concretized broadcast: {0}")]
    NonUniquelyConcretizedBroadcast(String),
    #[error("resource overflow: {0}")]
    ResourceOverflow(String),
    #[error("pass {pass} failed: {reason}")]
    PassFailed { pass: &'static str, reason: String },
}

/// A single ordered lowering transformation (spec §4.9): receives and
/// returns the top-level KIR expression list, consistent with step 10's
/// "user-registered pass ... receives and returns the top-level expression
/// list" contract, so built-in passes share the same shape as hooks.
pub trait LoweringPass {
    fn name(&self) -> &'static str;

    fn run(
        &self,
        fusion: &mut Fusion,
        kir: &mut KirArena,
        top_level: Vec<KirExprId>,
        options: &CompiledOptions,
    ) -> Result<Vec<KirExprId>, LoweringError>;
}

/// The output of the lowering pipeline (spec §4.11, §6 `LoweredKernel`).
#[derive(Debug, Clone)]
pub struct LoweredKernel {
    pub kir: KirArena,
    pub top_level: Vec<KirExprId>,
    pub index_type: crate::options::IndexTypeOption,
}

/// Runs the nine built-in passes in spec order, then any caller-registered
/// hooks (spec §4.9 step 10), tracing each pass's entry/exit when
/// `options.should_trace(pass_name)` is set.
pub fn run_pipeline(
    fusion: &mut Fusion,
    mut kir: KirArena,
    options: &CompiledOptions,
    hooks: &[Box<dyn LoweringPass>],
) -> Result<LoweredKernel, LoweringError> {
    let passes: Vec<Box<dyn LoweringPass>> = vec![
        Box::new(loop_nest_generation::LoopNestGeneration),
        Box::new(replace_symbolic_sizes::ReplaceSymbolicSizes),
        Box::new(allocation_placement::AllocationPlacement),
        Box::new(initialization_insertion::InitializationInsertion),
        Box::new(predicate_insertion::PredicateInsertion),
        Box::new(index_type_lowering::IndexTypeLowering {
            requested: options.index_type,
        }),
        Box::new(synchronization_insertion::SynchronizationInsertion),
        Box::new(grid_sync_insertion::GridSyncInsertion),
        Box::new(circular_buffer_expansion::CircularBufferExpansion),
        Box::new(memory_aliasing::MemoryAliasing),
    ];

    let mut top_level = kir.top_level.clone();
    for pass in passes.iter().chain(hooks.iter()) {
        if options.should_trace(pass.name()) {
            tracing::debug!(pass = pass.name(), "entering lowering pass");
        }
        top_level = pass.run(fusion, &mut kir, top_level, options)?;
        if options.should_trace(pass.name()) {
            tracing::debug!(pass = pass.name(), "exiting lowering pass");
        }
    }
    kir.top_level = top_level.clone();

    Ok(LoweredKernel {
        kir,
        top_level,
        index_type: options.index_type,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Options;

    #[test]
    fn empty_fusion_lowers_to_empty_kernel() {
        let mut fusion = Fusion::new();
        let kir = KirArena::new();
        let opts = Options::default().validate().unwrap();
        let lowered = run_pipeline(&mut fusion, kir, &opts, &[]).unwrap();
        assert!(lowered.top_level.is_empty());
    }
}
