//! Domain-level error taxonomy for AgentBench.

/// Errors produced while loading and validating a scenario suite.
///
/// Any of these aborts the load; no partial suite is ever returned.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("suite document is malformed: {0}")]
    Malformed(String),

    #[error("scenario at position {index} has an empty id")]
    EmptyId { index: usize },

    #[error("duplicate scenario id: {id}")]
    DuplicateId { id: String },

    #[error("scenario {id} has non-positive or non-finite weight {weight}")]
    InvalidWeight { id: String, weight: f64 },

    #[error("scenario {id} has no turns")]
    NoTurns { id: String },

    #[error("scenario {id} turn {turn_index} has an empty prompt")]
    EmptyPrompt { id: String, turn_index: usize },

    #[error("scenario {id} turn {turn_index} has a zero timeout")]
    ZeroTimeout { id: String, turn_index: usize },

    #[error("scenario {id} check {check_index} is invalid: {reason}")]
    InvalidCheck {
        id: String,
        check_index: usize,
        reason: String,
    },

    #[error("failed to read suite {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors produced when building or modifying a tunables snapshot.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TunableError {
    #[error("unknown tunable parameter: {0}")]
    UnknownParameter(String),

    #[error("tunable {name} out of range: {value} not in {min}..={max}")]
    OutOfRange {
        name: String,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error("tunable {name} expects a {expected} value")]
    WrongType { name: String, expected: &'static str },

    #[error("too many profile overrides (limit {limit})")]
    TooManyOverrides { limit: usize },
}

/// Errors produced when the quality gate cannot read its input.
///
/// Fatal to the gate step only; never invalidates the recorded run.
#[derive(Debug, thiserror::Error)]
pub enum GateInputError {
    #[error("summary not found: {0}")]
    NotFound(String),

    #[error("failed to read summary {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("summary is malformed: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("summary has no loops")]
    NoLoops,

    /// Parsed, but the numbers cannot come from a real run.
    #[error("summary is inconsistent: {0}")]
    Inconsistent(String),
}

/// AgentBench domain errors.
#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("tunable error: {0}")]
    Tunable(#[from] TunableError),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for AgentBench domain operations.
pub type Result<T> = std::result::Result<T, BenchError>;
