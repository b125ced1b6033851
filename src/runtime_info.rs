//! Runtime info (spec §4.10): built once per kernel invocation from the
//! device capability and a set of bound inputs, then consulted by
//! schedulers and lowering passes instead of re-deriving alignment and
//! contiguity facts from raw shapes every time.

use std::collections::HashMap;

use crate::device::DeviceCapability;
use crate::ir::TensorViewId;

/// Concrete metadata for one bound input tensor (spec §4.10).
#[derive(Debug, Clone)]
pub struct InputMetadata {
    pub sizes: Vec<i64>,
    pub strides: Vec<i64>,
    pub base_address: u64,
}

impl InputMetadata {
    /// Contiguity vector: `true` at dim `i` when `strides[i] == product of
    /// sizes[i+1..]` (spec §4.10 "contiguity vector per input").
    pub fn contiguity(&self) -> Vec<bool> {
        let mut expected = 1i64;
        let mut result = vec![false; self.sizes.len()];
        for i in (0..self.sizes.len()).rev() {
            result[i] = self.strides[i] == expected;
            expected *= self.sizes[i];
        }
        result
    }
}

/// Built once per kernel invocation (spec §4.10).
#[derive(Debug, Clone)]
pub struct RuntimeInfo {
    pub device_id: u32,
    pub device: DeviceCapability,
    inputs: HashMap<TensorViewId, InputMetadata>,
    precomputed_values: HashMap<String, i64>,
    alignment_cache: HashMap<TensorViewId, usize>,
}

impl RuntimeInfo {
    pub fn new(device_id: u32, device: DeviceCapability) -> Self {
        Self {
            device_id,
            device,
            inputs: HashMap::new(),
            precomputed_values: HashMap::new(),
            alignment_cache: HashMap::new(),
        }
    }

    pub fn bind_input(&mut self, tv: TensorViewId, metadata: InputMetadata) {
        self.alignment_cache.remove(&tv);
        self.inputs.insert(tv, metadata);
    }

    pub fn input_metadata(&self, tv: TensorViewId) -> Option<&InputMetadata> {
        self.inputs.get(&tv)
    }

    pub fn cache_precomputed(&mut self, key: impl Into<String>, value: i64) {
        self.precomputed_values.insert(key.into(), value);
    }

    pub fn precomputed(&self, key: &str) -> Option<i64> {
        self.precomputed_values.get(key).copied()
    }

    /// The smallest index type (spec §4.4, §4.10) that can address every
    /// bound input: `Int32` unless some input's byte span exceeds
    /// `i32::MAX`.
    pub fn smallest_index_type(&self) -> crate::options::IndexTypeOption {
        let overflow = self.inputs.values().any(|meta| {
            let elems: i64 = meta.sizes.iter().product();
            elems.saturating_mul(4) > i32::MAX as i64
        });
        if overflow {
            crate::options::IndexTypeOption::Int64
        } else {
            crate::options::IndexTypeOption::Int32
        }
    }

    /// `getAlignmentSize(tv)` (spec §4.10): the largest power-of-two no
    /// greater than the base address's alignment, further constrained by
    /// the smallest GCD among the tensor's discontiguous strides (a stride
    /// that isn't a multiple of the dtype's element size caps how far a
    /// vectorized access can reach regardless of the address itself).
    pub fn get_alignment_size(&mut self, tv: TensorViewId) -> usize {
        if let Some(&cached) = self.alignment_cache.get(&tv) {
            return cached;
        }
        let alignment = match self.inputs.get(&tv) {
            Some(meta) => {
                let address_alignment = largest_pow2_divisor(meta.base_address);
                // Only strides that break contiguity (> 1) can limit how
                // far a vectorized access reaches; a unit stride never
                // constrains alignment on its own.
                let stride_gcd = meta
                    .strides
                    .iter()
                    .filter(|&&s| s.unsigned_abs() > 1)
                    .map(|&s| largest_pow2_divisor(s.unsigned_abs()))
                    .min();
                match stride_gcd {
                    Some(gcd) => address_alignment.min(gcd).max(1),
                    None => address_alignment.max(1),
                }
            }
            None => 1,
        };
        self.alignment_cache.insert(tv, alignment);
        alignment
    }

    /// `ptrOf(tv)` (spec §4.10): the bound base address for an input
    /// tensor, or `None` for an intermediate with no binding yet.
    pub fn ptr_of(&self, tv: TensorViewId) -> Option<u64> {
        self.inputs.get(&tv).map(|meta| meta.base_address)
    }
}

fn largest_pow2_divisor(n: u64) -> usize {
    if n == 0 {
        return usize::MAX;
    }
    1usize << n.trailing_zeros()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Id;

    #[test]
    fn contiguous_metadata_is_fully_contiguous() {
        let meta = InputMetadata {
            sizes: vec![4, 8],
            strides: vec![8, 1],
            base_address: 256,
        };
        assert_eq!(meta.contiguity(), vec![true, true]);
    }

    #[test]
    fn non_contiguous_metadata_flags_mismatched_dim() {
        let meta = InputMetadata {
            sizes: vec![4, 8],
            strides: vec![16, 1],
            base_address: 256,
        };
        assert_eq!(meta.contiguity(), vec![false, true]);
    }

    #[test]
    fn alignment_is_cached() {
        let mut info = RuntimeInfo::new(0, DeviceCapability::lookup_defaults(8, 0));
        let tv: TensorViewId = Id::new(0);
        info.bind_input(
            tv,
            InputMetadata {
                sizes: vec![128],
                strides: vec![1],
                base_address: 1024,
            },
        );
        let first = info.get_alignment_size(tv);
        let second = info.get_alignment_size(tv);
        assert_eq!(first, second);
        assert_eq!(first, 1024);
    }

    #[test]
    fn small_tensors_use_int32() {
        let info = RuntimeInfo::new(0, DeviceCapability::lookup_defaults(8, 0));
        assert_eq!(
            info.smallest_index_type(),
            crate::options::IndexTypeOption::Int32
        );
    }
}
