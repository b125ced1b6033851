//! Scalar data types and the promotion rules used when combining two
//! numeric [`Value`](crate::ir::Value)s (spec §4.1).

use std::fmt;

/// Data type carried by a [`Value`](crate::ir::Value) (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DataType {
    Bool,
    Int32,
    Int,
    UInt32,
    UInt,
    Half,
    BFloat16,
    Float,
    Double,
    ComplexFloat,
    ComplexDouble,
    Index,
    Pointer,
    Array(Box<DataType>, usize),
    Opaque(&'static str),
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Bool => write!(f, "bool"),
            DataType::Int32 => write!(f, "int32"),
            DataType::Int => write!(f, "int64"),
            DataType::UInt32 => write!(f, "uint32"),
            DataType::UInt => write!(f, "uint64"),
            DataType::Half => write!(f, "half"),
            DataType::BFloat16 => write!(f, "bfloat16"),
            DataType::Float => write!(f, "float"),
            DataType::Double => write!(f, "double"),
            DataType::ComplexFloat => write!(f, "complex<float>"),
            DataType::ComplexDouble => write!(f, "complex<double>"),
            DataType::Index => write!(f, "index"),
            DataType::Pointer => write!(f, "ptr"),
            DataType::Array(inner, n) => write!(f, "[{}; {}]", inner, n),
            DataType::Opaque(name) => write!(f, "opaque<{}>", name),
        }
    }
}

impl DataType {
    pub fn is_floating_point(&self) -> bool {
        matches!(
            self,
            DataType::Half | DataType::BFloat16 | DataType::Float | DataType::Double
        )
    }

    pub fn is_complex(&self) -> bool {
        matches!(self, DataType::ComplexFloat | DataType::ComplexDouble)
    }

    pub fn is_integral(&self) -> bool {
        matches!(
            self,
            DataType::Bool
                | DataType::Int32
                | DataType::Int
                | DataType::UInt32
                | DataType::UInt
        )
    }

    /// True for the unsigned integer types, which have no equivalent in
    /// most validation libraries and spec §9 says require an explicit
    /// bit-cast roundtrip rather than an arithmetic promotion.
    pub fn is_unsigned(&self) -> bool {
        matches!(self, DataType::UInt32 | DataType::UInt)
    }

    /// Rank used by [`promote`] for the total order on non-complex,
    /// non-unsigned types: Bool < Int32 < Int < Half < BFloat16 < Float <
    /// Double (spec §4.1).
    fn rank(&self) -> Option<u8> {
        match self {
            DataType::Bool => Some(0),
            DataType::Int32 => Some(1),
            DataType::Int => Some(2),
            DataType::Half => Some(3),
            DataType::BFloat16 => Some(4),
            DataType::Float => Some(5),
            DataType::Double => Some(6),
            _ => None,
        }
    }

    fn complex_rank(&self) -> Option<u8> {
        match self {
            DataType::ComplexFloat => Some(0),
            DataType::ComplexDouble => Some(1),
            _ => None,
        }
    }
}

/// Promote two scalar types following the same total order PyTorch uses
/// (spec §4.1): `Bool < Int32 < Int < Half < BFloat16 < Float < Double`,
/// with `Complex` variants forming a parallel order, mixing int and float
/// always yields the wider float, and scalar-on-scalar promotion is
/// commutative. Unsigned types require the caller to bit-cast explicitly
/// (spec §9); promoting an unsigned type here is an error rather than a
/// silent choice.
pub fn promote(a: DataType, b: DataType) -> Result<DataType, PromotionError> {
    if a.is_unsigned() || b.is_unsigned() {
        return Err(PromotionError::UnsignedRequiresBitcast { a, b });
    }

    if a.is_complex() || b.is_complex() {
        let complex_rank_of = |t: &DataType| -> Option<u8> {
            t.complex_rank()
                .or_else(|| t.rank().map(|r| if r >= 5 { 1 } else { 0 }))
        };
        let ra = complex_rank_of(&a).ok_or(PromotionError::Incomparable { a, b })?;
        let rb = complex_rank_of(&b).ok_or(PromotionError::Incomparable { a, b })?;
        return Ok(if ra.max(rb) == 0 {
            DataType::ComplexFloat
        } else {
            DataType::ComplexDouble
        });
    }

    let ra = a.rank().ok_or(PromotionError::Incomparable { a, b })?;
    let rb = b.rank().ok_or(PromotionError::Incomparable { a, b })?;
    Ok(if ra >= rb { a } else { b })
}

#[derive(Debug, thiserror::Error)]
pub enum PromotionError {
    #[error("cannot promote {a} and {b}: not on the scalar promotion lattice")]
    Incomparable { a: DataType, b: DataType },
    #[error("promoting {a} with {b} requires an explicit bit-cast roundtrip for the unsigned operand")]
    UnsignedRequiresBitcast { a: DataType, b: DataType },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promotion_is_commutative() {
        assert_eq!(
            promote(DataType::Int32, DataType::Float).unwrap(),
            promote(DataType::Float, DataType::Int32).unwrap()
        );
    }

    #[test]
    fn bool_is_lowest() {
        assert_eq!(
            promote(DataType::Bool, DataType::Int32).unwrap(),
            DataType::Int32
        );
    }

    #[test]
    fn int_and_float_yields_wider_float() {
        assert_eq!(
            promote(DataType::Int, DataType::Half).unwrap(),
            DataType::Half
        );
        assert_eq!(
            promote(DataType::Int, DataType::Double).unwrap(),
            DataType::Double
        );
    }

    #[test]
    fn same_type_promotes_to_itself() {
        assert_eq!(
            promote(DataType::Float, DataType::Float).unwrap(),
            DataType::Float
        );
    }

    #[test]
    fn complex_parallels_real_rank() {
        assert_eq!(
            promote(DataType::ComplexFloat, DataType::ComplexDouble).unwrap(),
            DataType::ComplexDouble
        );
    }

    #[test]
    fn unsigned_rejected() {
        assert!(matches!(
            promote(DataType::UInt32, DataType::Int32),
            Err(PromotionError::UnsignedRequiresBitcast { .. })
        ));
    }
}
