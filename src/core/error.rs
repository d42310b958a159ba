use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("strategy '{0}' not found")]
    UnknownStrategy(String),

    #[error("no portfolio could be assembled")]
    EmptyPortfolio,

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompositionError {
    #[error("composition total {total} is too close to zero to normalize")]
    Degenerate { total: f64 },
}

// A composition that cannot be normalized leaves nothing to invest in.
impl From<CompositionError> for EngineError {
    fn from(_: CompositionError) -> Self {
        EngineError::EmptyPortfolio
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse catalog: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid catalog: {0}")]
    Invalid(String),
}
