//! The tensor-program IR (spec §3, §4.1): [`Fusion`] owns arenas of
//! [`Value`](value::ValueData)s, [`ExprData`](expr::ExprData)s,
//! [`IterDomain`](iter_domain::IterDomain)s, [`IdExpr`](iter_domain::IdExpr)s
//! and [`TensorView`](tensor_view::TensorView)s, addressed by the handles in
//! [`arena`].

pub mod arena;
pub mod expr;
pub mod fusion;
pub mod iter_domain;
pub mod tensor_domain;
pub mod tensor_view;
pub mod value;

pub use arena::{Arena, Id};
pub use expr::{BinaryOpKind, ExprData, ExprId, ExprKind, Predicate, ReductionOp, UnaryOpKind};
pub use fusion::{Fusion, IrError};
pub use iter_domain::{
    IdExpr, IdExprId, IterDomain, IterDomainId, IterType, ParallelType, SwizzleMode, SwizzleType,
};
pub use tensor_domain::{Contiguity, TensorDomain};
pub use tensor_view::{CacheOpType, ComputeAtMode, MemoryAttr, MemoryType, TensorView, TensorViewId};
pub use value::{LiteralValue, ScalarData, ScalarKind, ValueData, ValueId};
