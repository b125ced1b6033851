//! Error kinds shared across the compiler core.
//!
//! Each subsystem defines its own local error enum (`IrError`,
//! `DomainGraphError`, `ScheduleError`, `LoweringError`, ...) and converts it
//! into [`CoreError`] at the API boundary (spec §6/§7), the same way the
//! teacher composes `AnalyzeError`/`CodeGenError` into one `CompilerError`.

use thiserror::Error;

use crate::domain_graph::DomainGraphError;
use crate::heuristics::HeuristicError;
use crate::ir::IrError;
use crate::lowering::LoweringError;
use crate::scheduler::ScheduleError;

/// Top-level error returned from the external API (spec §6, §7).
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unsupported hardware: {0}")]
    UnsupportedHardware(String),

    #[error("resource overflow: {0}")]
    ResourceOverflow(String),

    #[error("index type overflow: int32 was forced but inputs require int64 (max byte offset {max_byte_offset})")]
    IndexTypeOverflow { max_byte_offset: u64 },

    #[error("vectorization stride violation: {0}")]
    VectorizationStrideViolation(String),

    #[error("non-uniquely concretized broadcast: {0}")]
    NonUniquelyConcretizedBroadcast(String),

    #[error("every scheduler rejected this fusion; it must be segmented and retried")]
    SchedulerRejection,

    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error(transparent)]
    Ir(#[from] IrError),

    #[error(transparent)]
    DomainGraph(#[from] DomainGraphError),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error(transparent)]
    Heuristic(#[from] HeuristicError),

    #[error(transparent)]
    Lowering(#[from] LoweringError),

    #[error("invalid options: {0}")]
    Options(#[from] crate::options::OptionsError),
}

pub type CoreResult<T> = Result<T, CoreError>;
