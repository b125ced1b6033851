//! IterDomain (ID): one axis of a tensor's loop or logical shape (spec §3).

use crate::ir::arena::Id;
use crate::ir::value::ValueId;

pub type IterDomainId = Id<IterDomain>;
pub type IdExprId = Id<IdExpr>;

/// Parallelization tag (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParallelType {
    Serial,
    TIDx,
    TIDy,
    TIDz,
    BIDx,
    BIDy,
    BIDz,
    Unroll,
    Unswitch,
    Vectorize,
    MisalignedVectorize,
    Group,
}

impl ParallelType {
    pub fn is_thread_dim(&self) -> bool {
        matches!(self, ParallelType::TIDx | ParallelType::TIDy | ParallelType::TIDz)
    }

    pub fn is_block_dim(&self) -> bool {
        matches!(self, ParallelType::BIDx | ParallelType::BIDy | ParallelType::BIDz)
    }

    pub fn is_vectorize(&self) -> bool {
        matches!(self, ParallelType::Vectorize | ParallelType::MisalignedVectorize)
    }

    pub fn is_compile_time_expansion(&self) -> bool {
        matches!(self, ParallelType::Unroll | ParallelType::Unswitch)
    }
}

/// Iteration kind of an axis (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IterType {
    Iteration,
    Reduction,
    Broadcast,
    Symbolic,
    Stride,
    GatherScatter,
    VectorComponent,
}

/// One axis of a tensor domain (spec §3).
#[derive(Debug, Clone)]
pub struct IterDomain {
    pub start: ValueId,
    pub extent: ValueId,
    pub expanded_extent: Option<ValueId>,
    pub parallel_type: ParallelType,
    pub iter_type: IterType,
    pub is_broadcast: bool,
    pub is_padded_to_warp: bool,
    /// The single expression that produced this ID, or `None` for a root ID
    /// (spec §3: "Every ID has exactly one defining expression (or none, for
    /// root IDs).").
    pub definition: Option<IdExprId>,
    /// Set by a non-divisible [`crate::scheduler::Split`] (spec §4.3); read
    /// back by the predicate-insertion pass (spec §4.9 step 4).
    pub is_non_divisible_split: bool,
}

impl IterDomain {
    pub fn new_root(start: ValueId, extent: ValueId, iter_type: IterType) -> Self {
        Self {
            start,
            extent,
            expanded_extent: None,
            parallel_type: ParallelType::Serial,
            iter_type,
            is_broadcast: iter_type == IterType::Broadcast,
            is_padded_to_warp: false,
            definition: None,
            is_non_divisible_split: false,
        }
    }

    pub fn is_reduction(&self) -> bool {
        self.iter_type == IterType::Reduction
    }
}

/// The kind of swizzle inserted by `swizzle`/`swizzle2D` (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwizzleType {
    XOR,
    Transpose,
    CyclicShift,
}

/// Whether a swizzle only changes the indexing expression or also the
/// physical loop iteration order (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwizzleMode {
    DataOnly,
    Loop,
}

/// An expression that produces one or more [`IterDomain`]s from others
/// (spec §3).
#[derive(Debug, Clone)]
pub enum IdExpr {
    Split {
        input: IterDomainId,
        factor: ValueId,
        outer: IterDomainId,
        inner: IterDomainId,
        inner_is_first: bool,
        divisible: bool,
    },
    Merge {
        outer: IterDomainId,
        inner: IterDomainId,
        output: IterDomainId,
    },
    Swizzle {
        input: IterDomainId,
        output: IterDomainId,
        swizzle_type: SwizzleType,
    },
    Swizzle2D {
        input_x: IterDomainId,
        input_y: IterDomainId,
        output_x: IterDomainId,
        output_y: IterDomainId,
        swizzle_type: SwizzleType,
        mode: SwizzleMode,
    },
    Resize {
        input: IterDomainId,
        output: IterDomainId,
        left_expand: ValueId,
        right_expand: ValueId,
    },
}

impl IdExpr {
    pub fn inputs(&self) -> Vec<IterDomainId> {
        match self {
            IdExpr::Split { input, .. } => vec![*input],
            IdExpr::Merge { outer, inner, .. } => vec![*outer, *inner],
            IdExpr::Swizzle { input, .. } => vec![*input],
            IdExpr::Swizzle2D { input_x, input_y, .. } => vec![*input_x, *input_y],
            IdExpr::Resize { input, .. } => vec![*input],
        }
    }

    pub fn outputs(&self) -> Vec<IterDomainId> {
        match self {
            IdExpr::Split { outer, inner, .. } => vec![*outer, *inner],
            IdExpr::Merge { output, .. } => vec![*output],
            IdExpr::Swizzle { output, .. } => vec![*output],
            IdExpr::Swizzle2D { output_x, output_y, .. } => vec![*output_x, *output_y],
            IdExpr::Resize { output, .. } => vec![*output],
        }
    }
}
