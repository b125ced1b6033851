//! Kernel IR (KIR, spec §3): the lowered form of [`crate::ir::ExprData`]
//! that the textual emitter (out of scope) consumes. Every KIR node keeps
//! its IR-level `Value`/`IterDomain`/`TensorView` handles so an emitter can
//! still name things the way the original fusion did.

use crate::ir::{ExprId, IterDomainId, ParallelType, TensorViewId, ValueId};

pub type KirExprId = crate::ir::Id<KirExpr>;

/// Whether an `Allocate` must be zero-filled before use, and whether the
/// lowering pipeline proved its contents are always fully overwritten
/// before any read (spec §3 `Allocate`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocateFlags {
    pub zero_init: bool,
    pub resets_to_zero: bool,
}

/// A buffer allocation in the kernel (spec §3 `Allocate`).
#[derive(Debug, Clone)]
pub struct Allocate {
    pub buffer: TensorViewId,
    pub memory_type: crate::ir::MemoryType,
    pub shape: Vec<ValueId>,
    pub alias_of: Option<TensorViewId>,
    pub flags: AllocateFlags,
    pub address_symbol: String,
}

/// `BlockSync` (spec §3, §5): `aligned` is set when every thread in the
/// block is statically known to reach this point, letting the emitter use
/// `barrier.sync.aligned` instead of the general form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSync {
    pub aligned: bool,
    pub war_hazard: bool,
}

/// `GridSync` (spec §3, §5): guards a grid reduction/broadcast with a
/// counter buffer keyed by the synchronized parallel-type bitmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridSync {
    pub parallel_bitmap: u8,
    pub sync_buffer: TensorViewId,
}

/// One stage of an `mbarrier`-guarded circular-buffered load (spec §4.9
/// step 8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MBarrierOp {
    Init,
    Arrive,
    Wait,
    Invalidate,
}

#[derive(Debug, Clone)]
pub struct TensorIndex {
    pub view: TensorViewId,
    pub flat_index: ValueId,
}

/// A grid-wide reduction across an unsynchronized parallel dimension (spec
/// §3, §5); paired with a [`GridSync`] wait/release in the lowered tree.
#[derive(Debug, Clone)]
pub struct GridReduction {
    pub op: crate::ir::ReductionOp,
    pub input: TensorViewId,
    pub output: TensorViewId,
    pub sync: GridSync,
}

#[derive(Debug, Clone)]
pub struct GridBroadcast {
    pub input: TensorViewId,
    pub output: TensorViewId,
    pub sync: GridSync,
}

/// A Welford reduction whose accumulate step is vectorized across a
/// contiguous chunk (spec §3 "vectorized-welford").
#[derive(Debug, Clone)]
pub struct VectorizedWelford {
    pub input: TensorViewId,
    pub mean_output: TensorViewId,
    pub m2_output: TensorViewId,
    pub count_output: TensorViewId,
    pub vector_width: u32,
}

/// A KIR node (spec §3): either an ordinary IR expression lowered as-is, or
/// one of the kernel-only constructs introduced during lowering.
#[derive(Debug, Clone)]
pub enum KirExpr {
    Expr(ExprId),
    ForLoop {
        iter_domain: IterDomainId,
        index_var: ValueId,
        body: Vec<KirExprId>,
    },
    IfThenElse {
        predicate: ValueId,
        then_body: Vec<KirExprId>,
        else_body: Vec<KirExprId>,
    },
    Allocate(Allocate),
    BlockSync(BlockSync),
    GridSync(GridSync),
    TensorIndex(TensorIndex),
    MBarrier {
        op: MBarrierOp,
        buffer: TensorViewId,
        stage: u32,
    },
    GridReduction(GridReduction),
    GridBroadcast(GridBroadcast),
    VectorizedWelford(VectorizedWelford),
}

impl KirExpr {
    pub fn is_sync_point(&self) -> bool {
        matches!(
            self,
            KirExpr::BlockSync(_) | KirExpr::GridSync(_) | KirExpr::MBarrier { .. }
        )
    }

    pub fn parallel_type_of_loop(&self, fusion: &crate::ir::Fusion) -> Option<ParallelType> {
        match self {
            KirExpr::ForLoop { iter_domain, .. } => Some(fusion.iter_domain(*iter_domain).parallel_type),
            _ => None,
        }
    }
}

/// Owns every [`KirExpr`] produced by lowering, addressed by [`KirExprId`]
/// the same way [`crate::ir::Fusion`] owns IR nodes.
#[derive(Debug, Clone, Default)]
pub struct KirArena {
    nodes: crate::ir::Arena<KirExpr>,
    pub top_level: Vec<KirExprId>,
}

impl KirArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, expr: KirExpr) -> KirExprId {
        self.nodes.push(expr)
    }

    pub fn get(&self, id: KirExprId) -> &KirExpr {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: KirExprId) -> &mut KirExpr {
        self.nodes.get_mut(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (KirExprId, &KirExpr)> {
        self.nodes.iter()
    }
}
