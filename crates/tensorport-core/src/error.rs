use thiserror::Error;

use crate::dtype::DType;

/// Failures surfaced to the boundary as diagnostics.
///
/// Every variant is operation-fatal and process-safe: a failed call leaves
/// the registry and all other tensors untouched.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum TensorError {
    #[error("invalid shape: {0}")]
    InvalidShape(String),

    #[error("rank mismatch: tensor has {expected} dimensions, got {actual} indices")]
    RankMismatch { expected: usize, actual: usize },

    #[error("index {index} out of range (limit {limit})")]
    IndexOutOfRange { index: i64, limit: usize },

    #[error("dtype mismatch: tensor holds {actual}, access asked for {expected}")]
    DTypeMismatch { expected: DType, actual: DType },

    #[error("unknown dtype tag {0}")]
    UnknownDType(u32),

    #[error("dtype {0} is declared but not implemented")]
    Unimplemented(DType),

    #[error("{0} tensors are not built from a raw byte buffer")]
    UnsupportedRawData(DType),

    #[error("null pointer passed for {0}")]
    NullPointer(&'static str),

    #[error("allocation failure: element count overflows addressable size")]
    AllocationFailure,
}
