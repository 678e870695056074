use thiserror::Error;

/// A result type for driver errors
pub type Result<T> = std::result::Result<T, DriverError>;

/// An error raised while configuring or running an optimization driver
#[derive(Error, Debug)]
pub enum DriverError {
    /// When a design variable has no lower or upper bound
    #[error("Design variable '{0}' has no {1} bound")]
    MissingBounds(String, &'static str),
    /// When a per-element bound does not match the variable size
    #[error("Bound of '{name}' has {got} elements, expected {expected}")]
    BoundSize {
        /// Variable or constraint name
        name: String,
        /// Declared size
        expected: usize,
        /// Bound length
        got: usize,
    },
    /// When more than one objective is registered
    #[error("Multiple objectives are not supported, got {0}")]
    MultipleObjectives(usize),
    /// When no objective is registered
    #[error("No objective registered")]
    NoObjective,
    /// When a constraint kind is not supported by the driver
    #[error("Constraint '{0}' is not supported: {1}")]
    UnsupportedConstraint(String, &'static str),
    /// When a constraint name is unknown
    #[error("Unknown constraint '{0}'")]
    UnknownConstraint(String),
    /// When a constraint element index is out of range
    #[error("Index {index} out of range for constraint '{name}' of size {size}")]
    ConstraintIndex {
        /// Constraint name
        name: String,
        /// Requested element
        index: usize,
        /// Constraint size
        size: usize,
    },
    /// When a design variable name is unknown
    #[error("Unknown design variable '{0}'")]
    UnknownVariable(String),
    /// When a vector does not have the expected length
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Expected length
        expected: usize,
        /// Actual length
        got: usize,
    },
    /// When a callback needs an evaluated point and none is available
    #[error("No model evaluation available yet")]
    NotEvaluated,
    /// When an option is invalid
    #[error("Invalid option: {0}")]
    InvalidOption(String),
    /// When the model fails during evaluation or differentiation
    #[error(transparent)]
    Model(#[from] anyhow::Error),
    /// When EGO fails
    #[error("EGO error")]
    Ego(#[from] egobox_ego::EgoError),
    /// When IO fails
    #[error("IO error")]
    Io(#[from] std::io::Error),
    /// When json (de)serialization fails
    #[error("Json error")]
    Json(#[from] serde_json::Error),
}
