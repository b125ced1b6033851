//! Values (spec §3): scalars (literal or symbolic) and tensor-valued
//! [`TensorView`](crate::ir::TensorView) references.

use crate::dtype::DataType;
use crate::ir::arena::Id;
use crate::ir::tensor_view::TensorView;

pub type ValueId = Id<ValueData>;

#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Double(f64),
}

impl LiteralValue {
    pub fn dtype(&self) -> DataType {
        match self {
            LiteralValue::Bool(_) => DataType::Bool,
            LiteralValue::Int(_) => DataType::Int,
            LiteralValue::UInt(_) => DataType::UInt,
            LiteralValue::Double(_) => DataType::Double,
        }
    }
}

/// A scalar value: either a compile-time literal or a symbolic value bound
/// at run time (spec §3).
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarKind {
    Literal(LiteralValue),
    Symbolic { name: Option<String> },
}

#[derive(Debug, Clone)]
pub struct ScalarData {
    pub dtype: DataType,
    pub kind: ScalarKind,
}

/// A value in the fusion: scalar or tensor-valued (spec §3).
#[derive(Debug, Clone)]
pub enum ValueData {
    Scalar(ScalarData),
    Tensor(crate::ir::arena::Id<TensorView>),
}

impl ValueData {
    pub fn dtype(&self, fusion: &crate::ir::Fusion) -> DataType {
        match self {
            ValueData::Scalar(s) => s.dtype,
            ValueData::Tensor(tv_id) => fusion.tensor_view(*tv_id).dtype,
        }
    }

    pub fn is_scalar_literal(&self) -> bool {
        matches!(
            self,
            ValueData::Scalar(ScalarData {
                kind: ScalarKind::Literal(_),
                ..
            })
        )
    }

    pub fn is_tensor(&self) -> bool {
        matches!(self, ValueData::Tensor(_))
    }
}
