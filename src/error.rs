/*!

  Errors returned by circuit construction and evaluation.

*/

use crate::gate::GateId;
use std::collections::TryReserveError;
use thiserror::Error;

/// The reason an evaluation batch could not produce a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EvalFailure {
    /// A gate was reached again while its own inputs were still being evaluated.
    #[error("combinational cycle through gate {gate}")]
    Cycle {
        /// The gate at which the loop closed
        gate: GateId,
    },
    /// A reachable input slot had nothing bound to it.
    #[error("input {input} of gate {gate} is unbound")]
    MissingInput {
        /// The gate owning the unbound slot
        gate: GateId,
        /// Index of the unbound input slot
        input: usize,
    },
    /// A gate already failed earlier in the same batch.
    #[error("gate {gate} failed earlier in this batch")]
    DependencyFailed {
        /// The gate whose failure was memoized
        gate: GateId,
    },
}

/// Errors produced by a [crate::circuit::Circuit].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A stale handle, an out-of-range index or a malformed batch.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Storage for a gate or an output slot could not be obtained.
    #[error("out of memory")]
    OutOfMemory,
    /// Evaluation hit a cycle or an unbound input.
    #[error("evaluation failed: {0}")]
    EvaluationFailed(#[from] EvalFailure),
    /// The graph violates one of its structural invariants.
    #[error("inconsistent circuit: {0}")]
    Inconsistent(String),
}

impl From<TryReserveError> for Error {
    fn from(_: TryReserveError) -> Self {
        Error::OutOfMemory
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_failure_maps_to_oom() {
        let mut v: Vec<u64> = Vec::new();
        let err = v.try_reserve(usize::MAX).unwrap_err();
        assert_eq!(Error::from(err), Error::OutOfMemory);
    }

    #[test]
    fn failure_messages() {
        let gate = GateId::new(3, 0);
        let err: Error = EvalFailure::MissingInput { gate, input: 1 }.into();
        assert_eq!(
            err.to_string(),
            "evaluation failed: input 1 of gate g3 is unbound"
        );
    }
}
