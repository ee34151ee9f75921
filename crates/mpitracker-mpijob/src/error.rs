//! Compilation error types

/// Rejected job templates.
///
/// Callers must change the template before retrying.
#[derive(Debug, thiserror::Error)]
pub enum CompilationError {
    #[error("job category required: it specifies the MPI launcher image")]
    MissingJobCategory,

    #[error("slot count required: minSlots or maxSlots specifies the number of workers")]
    MissingSlotCount,

    #[error("invalid slot count {0}: worker replicas must fit in a 32-bit integer")]
    InvalidSlotCount(i64),
}

impl From<CompilationError> for mpitracker_common::Error {
    fn from(err: CompilationError) -> Self {
        let field = match err {
            CompilationError::MissingJobCategory => "jobCategory",
            CompilationError::MissingSlotCount | CompilationError::InvalidSlotCount(_) => {
                "maxSlots"
            }
        };
        mpitracker_common::Error::validation_for_field(field, err.to_string())
    }
}
