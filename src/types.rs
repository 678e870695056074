use crate::errors::{DriverError, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// A bound on a design variable or a constraint
///
/// Either a single value broadcast over all the elements or one value per element.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Bound {
    /// Same value for every element
    Scalar(f64),
    /// One value per element
    Array(Array1<f64>),
}

impl Bound {
    /// Value of the bound for the `idx`th element
    ///
    /// Scalar bounds are broadcast, array bounds are indexed.
    pub fn at(&self, idx: usize) -> f64 {
        match self {
            Bound::Scalar(v) => *v,
            Bound::Array(values) => values[idx],
        }
    }

    /// Checks the bound is usable for an entity of the given `size`
    pub fn check_size(&self, name: &str, size: usize) -> Result<()> {
        match self {
            Bound::Array(values) if values.len() != size => Err(DriverError::BoundSize {
                name: name.to_string(),
                expected: size,
                got: values.len(),
            }),
            _ => Ok(()),
        }
    }
}

impl From<f64> for Bound {
    fn from(value: f64) -> Self {
        Bound::Scalar(value)
    }
}

impl From<Array1<f64>> for Bound {
    fn from(values: Array1<f64>) -> Self {
        Bound::Array(values)
    }
}

impl From<Vec<f64>> for Bound {
    fn from(values: Vec<f64>) -> Self {
        Bound::Array(Array1::from(values))
    }
}

/// Metadata of a named design variable
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DesignVariable {
    /// Unique name
    pub name: String,
    /// Flat size (>= 1)
    pub size: usize,
    /// Lower bound
    pub lower: Option<Bound>,
    /// Upper bound
    pub upper: Option<Bound>,
}

impl DesignVariable {
    /// A variable of given `size` without bounds
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        DesignVariable {
            name: name.into(),
            size,
            lower: None,
            upper: None,
        }
    }

    /// Sets the lower bound
    pub fn lower(mut self, lower: impl Into<Bound>) -> Self {
        self.lower = Some(lower.into());
        self
    }

    /// Sets the upper bound
    pub fn upper(mut self, upper: impl Into<Bound>) -> Self {
        self.upper = Some(upper.into());
        self
    }
}

/// Kind of a constraint, carrying its active bound(s)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ConstraintKind {
    /// `value == target`
    Equality {
        /// Target value
        target: Bound,
    },
    /// `value >= lower`
    LowerOnly {
        /// Lower bound
        lower: Bound,
    },
    /// `value <= upper`
    UpperOnly {
        /// Upper bound
        upper: Bound,
    },
    /// `lower <= value <= upper`
    ///
    /// Only the upper sense is exposed to optimizers, a lower sense has to be
    /// registered as a separate [`ConstraintKind::LowerOnly`] constraint.
    DoubleSided {
        /// Lower bound
        lower: Bound,
        /// Upper bound
        upper: Bound,
    },
}

impl ConstraintKind {
    /// Returns `(reference, sign)` such that the constraint value in the
    /// "satisfied when non-negative" convention is `sign * (value - reference)`.
    pub fn linearization(&self, idx: usize) -> (f64, f64) {
        match self {
            ConstraintKind::Equality { target } => (target.at(idx), -1.),
            ConstraintKind::LowerOnly { lower } => (lower.at(idx), 1.),
            ConstraintKind::UpperOnly { upper } | ConstraintKind::DoubleSided { upper, .. } => {
                (upper.at(idx), -1.)
            }
        }
    }

    /// Whether this is an equality constraint
    pub fn is_equality(&self) -> bool {
        matches!(self, ConstraintKind::Equality { .. })
    }

    fn bounds(&self) -> Vec<&Bound> {
        match self {
            ConstraintKind::Equality { target } => vec![target],
            ConstraintKind::LowerOnly { lower } => vec![lower],
            ConstraintKind::UpperOnly { upper } => vec![upper],
            ConstraintKind::DoubleSided { lower, upper } => vec![lower, upper],
        }
    }
}

/// Metadata of a named constraint
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    /// Unique name
    pub name: String,
    /// Flat size (>= 1)
    pub size: usize,
    /// Kind and bounds
    pub kind: ConstraintKind,
}

impl Constraint {
    /// Constructor
    pub fn new(name: impl Into<String>, size: usize, kind: ConstraintKind) -> Self {
        Constraint {
            name: name.into(),
            size,
            kind,
        }
    }

    /// `value == target`
    pub fn equality(name: impl Into<String>, size: usize, target: impl Into<Bound>) -> Self {
        Self::new(
            name,
            size,
            ConstraintKind::Equality {
                target: target.into(),
            },
        )
    }

    /// `value >= lower`
    pub fn lower(name: impl Into<String>, size: usize, lower: impl Into<Bound>) -> Self {
        Self::new(
            name,
            size,
            ConstraintKind::LowerOnly {
                lower: lower.into(),
            },
        )
    }

    /// `value <= upper`
    pub fn upper(name: impl Into<String>, size: usize, upper: impl Into<Bound>) -> Self {
        Self::new(
            name,
            size,
            ConstraintKind::UpperOnly {
                upper: upper.into(),
            },
        )
    }

    /// `lower <= value <= upper`
    pub fn double_sided(
        name: impl Into<String>,
        size: usize,
        lower: impl Into<Bound>,
        upper: impl Into<Bound>,
    ) -> Self {
        Self::new(
            name,
            size,
            ConstraintKind::DoubleSided {
                lower: lower.into(),
                upper: upper.into(),
            },
        )
    }

    /// Checks bounds sizes against the constraint size
    pub fn check(&self) -> Result<()> {
        self.kind
            .bounds()
            .iter()
            .try_for_each(|b| b.check_size(&self.name, self.size))
    }
}

/// Capabilities declared by a driver
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Supports {
    /// Inequality constraints handled
    pub inequality_constraints: bool,
    /// Equality constraints handled
    pub equality_constraints: bool,
    /// More than one objective handled
    pub multiple_objectives: bool,
}

impl Default for Supports {
    fn default() -> Self {
        Supports {
            inequality_constraints: true,
            equality_constraints: true,
            multiple_objectives: false,
        }
    }
}

/// Iteration metadata handed to recorders
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetadata {
    /// Name of the driver run
    pub name: String,
    /// Number of model evaluations done so far
    pub iteration: usize,
}

impl RunMetadata {
    /// Metadata at iteration 0
    pub fn new(name: impl Into<String>) -> Self {
        RunMetadata {
            name: name.into(),
            iteration: 0,
        }
    }

    /// Sets the current iteration
    pub fn update(&mut self, iteration: usize) {
        self.iteration = iteration;
    }

    /// Coordinate string identifying the iteration, e.g. `Egor|12`
    pub fn coord(&self) -> String {
        format!("{}|{}", self.name, self.iteration)
    }
}

/// Exit status of an external optimizer run
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitStatus {
    /// Optimizer terminated normally
    Success,
    /// Optimizer reported a failure, the reported point may not be an optimum
    Failure {
        /// Backend specific reason
        reason: String,
    },
}

impl ExitStatus {
    /// Whether the optimizer terminated normally
    pub fn is_success(&self) -> bool {
        matches!(self, ExitStatus::Success)
    }
}

/// Result returned by an external optimizer
#[derive(Clone, Debug)]
pub struct OptimOutcome {
    /// Best objective value found
    pub min_value: f64,
    /// Location of the best value (flat vector)
    pub x_best: Array1<f64>,
    /// Termination status
    pub status: ExitStatus,
}
