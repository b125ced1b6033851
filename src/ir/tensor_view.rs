//! TensorView (spec §3): a [`TensorDomain`] plus dtype, memory type, and
//! schedule-level attributes.

use crate::dtype::DataType;
use crate::ir::arena::Id;
use crate::ir::expr::ExprId;
use crate::ir::tensor_domain::TensorDomain;

pub type TensorViewId = Id<TensorView>;

/// Where a tensor's storage lives (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryType {
    Global,
    Shared,
    Local,
    Tensor,
}

/// Operator a `cacheBefore`/`cacheAfter` used to materialize this tensor
/// (spec §4.3); `None` for ordinary compute outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOpType {
    Load,
    Store,
    CpAsync,
    LdMatrix,
    StMatrix,
    CpAsyncBulkTensorTile,
}

/// Memory-type-specific attribute (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryAttr {
    CircularBuffer { depth: u32 },
}

/// How `computeAt` inlines a tensor into a target (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputeAtMode {
    Standard,
    BestEffort,
    MostInlined,
}

#[derive(Debug, Clone)]
pub struct TensorView {
    pub domain: TensorDomain,
    pub dtype: DataType,
    pub memory_type: MemoryType,
    pub memory_attr: Option<MemoryAttr>,
    /// Loop depth at which this tensor is inlined into its consumers
    /// (spec §3).
    pub compute_at_position: usize,
    /// The expression that defines this tensor, if any (fusion inputs have
    /// none).
    pub definition: Option<ExprId>,
    /// Set by `cacheBefore`/`cacheAfter` (spec §4.3); `None` for ordinary
    /// tensors.
    pub cache_op: Option<CacheOpType>,
}

impl TensorView {
    pub fn new(domain: TensorDomain, dtype: DataType) -> Self {
        Self {
            domain,
            dtype,
            memory_type: MemoryType::Global,
            memory_attr: None,
            compute_at_position: 0,
            definition: None,
            cache_op: None,
        }
    }

    pub fn is_fusion_input(&self) -> bool {
        self.definition.is_none()
    }

    pub fn circular_buffer_depth(&self) -> Option<u32> {
        match self.memory_attr {
            Some(MemoryAttr::CircularBuffer { depth }) => Some(depth),
            None => None,
        }
    }
}
