use thiserror::Error;

#[derive(Error, Debug)]
pub enum PoolforgeError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV Parsing Error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON Parsing Error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration Error: {0}")]
    Config(String),

    /// The constraint model was proven unsatisfiable. Callers should
    /// suggest relaxing parameters (fewer peptides per pool, lower
    /// coverage, extra pools) rather than retrying as-is.
    #[error("Solver Infeasible: {0}")]
    Infeasible(String),

    #[error("Solver Model Invalid: {0}")]
    ModelInvalid(String),

    /// The solver exhausted its search budget without a verdict.
    /// Retryable: raise the budget or switch to the heuristic strategy.
    #[error("Solver Unknown: {0}")]
    SolverUnknown(String),

    #[error("Data Validation Error: {0}")]
    Validation(String),
}

pub type PfResult<T> = Result<T, PoolforgeError>;
