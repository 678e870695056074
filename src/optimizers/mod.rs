//! External optimizers the driver delegates to.
//!
//! An [`ExternalOptimizer`] only sees a bounded black-box problem over a flat
//! vector ([`BlackBoxProblem`]). Backend crates working with plain `Fn`
//! callbacks share the problem through [`Callbacks`].
mod cobyla_optimizer;
mod egor_optimizer;
mod slsqp_optimizer;

pub use cobyla_optimizer::CobylaOptimizer;
pub use egor_optimizer::{surrogate_specs, EgorOptimizer};
pub use slsqp_optimizer::SlsqpOptimizer;

use crate::errors::{DriverError, Result};
use crate::options::OptimizerParams;
use crate::types::OptimOutcome;
use ndarray::{Array1, ArrayView1};
use std::cell::RefCell;

/// Objective and constraint values at one point
///
/// Constraint values are satisfied when non-negative, one value per constraint
/// element in [`BlackBoxProblem::constraint_rows`] order.
#[derive(Clone, Debug, PartialEq)]
pub struct Evaluation {
    /// Objective value
    pub objective: f64,
    /// Constraint values
    pub constraints: Array1<f64>,
}

/// One constraint element as seen by an optimizer
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConstraintRow {
    /// Constraint name
    pub name: String,
    /// Element index within the constraint
    pub index: usize,
    /// Whether the element has to be zero instead of non-negative
    pub equality: bool,
}

/// A bounded black-box minimization problem over a flat vector
pub trait BlackBoxProblem {
    /// Dimension of the flat vector
    fn dim(&self) -> usize;

    /// Starting point
    fn x_init(&self) -> Array1<f64>;

    /// Constraint elements in evaluation order
    fn constraint_rows(&self) -> &[ConstraintRow];

    /// Evaluates objective and constraints at `x`
    fn evaluate(&mut self, x: &ArrayView1<f64>) -> Result<Evaluation>;

    /// Gradient of the objective at `x`
    fn objective_gradient(&mut self, x: &ArrayView1<f64>) -> Result<Array1<f64>>;

    /// Gradient at `x` of the `row`th constraint value of [`Evaluation::constraints`]
    fn constraint_gradient(&mut self, x: &ArrayView1<f64>, row: usize) -> Result<Array1<f64>>;
}

/// An optimizer minimizing a [`BlackBoxProblem`] within `[lower, upper]` bounds
pub trait ExternalOptimizer {
    /// Name used in run metadata and logs
    fn name(&self) -> &str;

    /// Runs the optimization, blocking until the optimizer returns
    ///
    /// Optimizer failures which still give a point are reported through
    /// [`OptimOutcome::status`], errors raised by the problem are returned as is.
    fn optimize(
        &self,
        problem: &mut dyn BlackBoxProblem,
        lower: &Array1<f64>,
        upper: &Array1<f64>,
        params: &OptimizerParams,
    ) -> Result<OptimOutcome>;
}

/// A constraint element expressed as an inequality `sign * c[source] + tol >= 0`
///
/// Equality elements give two rows (`|c| <= tol`), inequality elements one.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InequalityRow {
    /// Index in [`Evaluation::constraints`]
    pub source: usize,
    /// Orientation
    pub sign: f64,
    /// Tolerance
    pub tol: f64,
}

impl InequalityRow {
    /// Inequality value, satisfied when non-negative
    pub fn value(&self, constraints: &Array1<f64>) -> f64 {
        self.sign * constraints[self.source] + self.tol
    }
}

/// Expands constraint rows into inequalities only
pub fn inequality_rows(rows: &[ConstraintRow], equality_tol: f64) -> Vec<InequalityRow> {
    rows.iter()
        .enumerate()
        .flat_map(|(source, row)| {
            let senses: &[f64] = if row.equality { &[1., -1.] } else { &[1.] };
            let tol = if row.equality { equality_tol } else { 0. };
            senses
                .iter()
                .map(move |&sign| InequalityRow { source, sign, tol })
        })
        .collect()
}

/// Shares a problem with `Fn` callbacks of a backend crate
///
/// The first error raised by the problem is kept and later calls return the
/// given fallback values without touching the problem.
pub(crate) struct Callbacks<'a> {
    problem: RefCell<&'a mut dyn BlackBoxProblem>,
    error: RefCell<Option<DriverError>>,
    n_cstr: usize,
    dim: usize,
}

impl<'a> Callbacks<'a> {
    pub fn new(problem: &'a mut dyn BlackBoxProblem) -> Self {
        let n_cstr = problem.constraint_rows().len();
        let dim = problem.dim();
        Callbacks {
            problem: RefCell::new(problem),
            error: RefCell::new(None),
            n_cstr,
            dim,
        }
    }

    fn failed(&self) -> bool {
        self.error.borrow().is_some()
    }

    fn keep<T>(&self, res: Result<T>) -> Option<T> {
        match res {
            Ok(v) => Some(v),
            Err(err) => {
                log::warn!("Evaluation failed: {err}");
                self.error.borrow_mut().get_or_insert(err);
                None
            }
        }
    }

    /// Evaluation at `x`, all constraints violated when an error occured
    pub fn evaluate(&self, x: &[f64]) -> Evaluation {
        let fallback = || Evaluation {
            objective: f64::INFINITY,
            constraints: Array1::from_elem(self.n_cstr, -1.),
        };
        if self.failed() {
            return fallback();
        }
        let res = self.problem.borrow_mut().evaluate(&ArrayView1::from(x));
        self.keep(res).unwrap_or_else(fallback)
    }

    /// Objective gradient at `x`, zero when an error occured
    pub fn objective_gradient(&self, x: &[f64]) -> Array1<f64> {
        if self.failed() {
            return Array1::zeros(self.dim);
        }
        let res = self
            .problem
            .borrow_mut()
            .objective_gradient(&ArrayView1::from(x));
        self.keep(res).unwrap_or_else(|| Array1::zeros(self.dim))
    }

    /// Constraint gradient at `x`, zero when an error occured
    pub fn constraint_gradient(&self, x: &[f64], row: usize) -> Array1<f64> {
        if self.failed() {
            return Array1::zeros(self.dim);
        }
        let res = self
            .problem
            .borrow_mut()
            .constraint_gradient(&ArrayView1::from(x), row);
        self.keep(res).unwrap_or_else(|| Array1::zeros(self.dim))
    }

    /// Returns `value` unless an error was captured
    pub fn finish<T>(self, value: T) -> Result<T> {
        match self.error.into_inner() {
            Some(err) => Err(err),
            None => Ok(value),
        }
    }
}

/// Bounds as `(lower, upper)` pairs
pub(crate) fn bound_pairs(lower: &Array1<f64>, upper: &Array1<f64>) -> Vec<(f64, f64)> {
    lower.iter().copied().zip(upper.iter().copied()).collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use ndarray::array;

    /// `f(x) = sum (x_i - 1)^2` with constraints `x_0 >= 0.5` and `x_1 == 2`
    pub struct Quadratic {
        pub rows: Vec<ConstraintRow>,
        pub n_evals: usize,
        pub fail_at: Option<usize>,
    }

    impl Quadratic {
        pub fn new() -> Self {
            Quadratic {
                rows: vec![
                    ConstraintRow {
                        name: "lo".to_string(),
                        index: 0,
                        equality: false,
                    },
                    ConstraintRow {
                        name: "eq".to_string(),
                        index: 0,
                        equality: true,
                    },
                ],
                n_evals: 0,
                fail_at: None,
            }
        }

        pub fn unconstrained() -> Self {
            Quadratic {
                rows: vec![],
                ..Quadratic::new()
            }
        }
    }

    impl BlackBoxProblem for Quadratic {
        fn dim(&self) -> usize {
            2
        }

        fn x_init(&self) -> Array1<f64> {
            array![0., 0.]
        }

        fn constraint_rows(&self) -> &[ConstraintRow] {
            &self.rows
        }

        fn evaluate(&mut self, x: &ArrayView1<f64>) -> Result<Evaluation> {
            self.n_evals += 1;
            if self.fail_at == Some(self.n_evals) {
                return Err(anyhow::anyhow!("solver diverged").into());
            }
            let constraints = if self.rows.is_empty() {
                Array1::zeros(0)
            } else {
                array![x[0] - 0.5, 2. - x[1]]
            };
            Ok(Evaluation {
                objective: x.mapv(|v| (v - 1.) * (v - 1.)).sum(),
                constraints,
            })
        }

        fn objective_gradient(&mut self, x: &ArrayView1<f64>) -> Result<Array1<f64>> {
            Ok(x.mapv(|v| 2. * (v - 1.)))
        }

        fn constraint_gradient(&mut self, _x: &ArrayView1<f64>, row: usize) -> Result<Array1<f64>> {
            Ok(match row {
                0 => array![1., 0.],
                _ => array![0., -1.],
            })
        }
    }

    #[test]
    fn test_inequality_rows() {
        let rows = Quadratic::new().rows;
        let ineqs = inequality_rows(&rows, 1e-3);
        assert_eq!(ineqs.len(), 3);
        assert_eq!(
            ineqs[0],
            InequalityRow {
                source: 0,
                sign: 1.,
                tol: 0.
            }
        );
        assert_eq!(ineqs[2].source, 1);
        assert_eq!(ineqs[2].sign, -1.);

        // equality satisfied within tolerance gives two non-negative values
        let c = array![0.2, 5e-4];
        assert!(ineqs.iter().all(|r| r.value(&c) >= 0.));
        let c = array![0.2, -2e-3];
        assert!(ineqs[2].value(&c) >= 0.);
        assert!(ineqs[1].value(&c) < 0.);
    }

    #[test]
    fn test_callbacks_keep_first_error() {
        let mut problem = Quadratic::new();
        problem.fail_at = Some(2);
        let callbacks = Callbacks::new(&mut problem);
        let ok = callbacks.evaluate(&[1., 2.]);
        assert_eq!(ok.objective, 1.);
        let failed = callbacks.evaluate(&[0., 0.]);
        assert_eq!(failed.objective, f64::INFINITY);
        assert_eq!(failed.constraints, array![-1., -1.]);
        assert_eq!(callbacks.objective_gradient(&[0., 0.]), array![0., 0.]);
        let res = callbacks.finish(());
        assert!(matches!(res, Err(DriverError::Model(_))));
        // no evaluation after the failure
        assert_eq!(problem.n_evals, 2);
    }
}
