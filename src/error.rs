//! Errors surfaced by the service facade.

use std::time::Duration;

use thiserror::Error;

use crate::sandbox::SandboxError;
use crate::solver::Infeasibility;
use crate::validation::ValidationError;

/// Failure of an optimization call.
///
/// Every failure inside a call, including a panicking solver worker, ends
/// up as one of these variants.
#[derive(Debug, Error)]
pub enum OptimizationError {
    /// The request contains invalid records.
    #[error("invalid input: {}", summarize(.0))]
    Validation(Vec<ValidationError>),

    /// No schedule satisfies the hard constraints.
    #[error("no feasible schedule ({constraint_group}): {message}")]
    Infeasible { constraint_group: String, message: String },

    /// The hard time ceiling passed with nothing to return.
    #[error("optimization exceeded the {}s time limit", .limit.as_secs_f64())]
    TimeoutExceeded { limit: Duration },

    /// Internal fault; `fingerprint` identifies the input in the logs.
    #[error("internal solver error [{fingerprint}]: {message}")]
    InternalSolver { message: String, fingerprint: String },

    #[error(transparent)]
    Sandbox(#[from] SandboxError),
}

impl OptimizationError {
    /// Short kind string the dashboard switches on.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Infeasible { .. } => "infeasible",
            Self::TimeoutExceeded { .. } => "timeout",
            Self::InternalSolver { .. } => "internal",
            Self::Sandbox(_) => "sandbox",
        }
    }
}

impl From<Vec<ValidationError>> for OptimizationError {
    fn from(errors: Vec<ValidationError>) -> Self {
        Self::Validation(errors)
    }
}

impl From<Infeasibility> for OptimizationError {
    fn from(cause: Infeasibility) -> Self {
        Self::Infeasible {
            constraint_group: cause.constraint_group,
            message: cause.message,
        }
    }
}

fn summarize(errors: &[ValidationError]) -> String {
    match errors {
        [] => "no details".to_string(),
        [only] => only.to_string(),
        [first, rest @ ..] => format!("{first} (and {} more)", rest.len()),
    }
}
