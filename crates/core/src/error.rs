use api_shared::DiagnosticCode;
use rx_types::Severity;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid patient profile: {0}")]
    InvalidProfile(String),
    #[error("ambiguous interaction rule for {subject}: severity {first} conflicts with {second}")]
    AmbiguousRule {
        subject: String,
        first: Severity,
        second: Severity,
    },
    #[error("failed to load reference data: {0}")]
    ReferenceLoad(String),
    #[error("failed to read reference file: {0}")]
    FileRead(std::io::Error),

    #[error("reference data error: {0}")]
    Formulary(#[from] formulary::FormularyError),
}

impl EngineError {
    /// Wire code reported to callers for this error.
    pub fn code(&self) -> DiagnosticCode {
        match self {
            EngineError::InvalidInput(_) => DiagnosticCode::InvalidInput,
            EngineError::InvalidProfile(_) => DiagnosticCode::InvalidProfile,
            EngineError::AmbiguousRule { .. } => DiagnosticCode::AmbiguousRule,
            EngineError::ReferenceLoad(_)
            | EngineError::FileRead(_)
            | EngineError::Formulary(_) => DiagnosticCode::ReferenceLoad,
        }
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
