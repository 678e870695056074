use super::{
    inequality_rows, BlackBoxProblem, Callbacks, Evaluation, ExternalOptimizer, InequalityRow,
};
use crate::errors::{DriverError, Result};
use crate::options::OptimizerParams;
use crate::types::{ExitStatus, OptimOutcome};
use egobox_ego::{CorrelationSpec, EgorBuilder, RegressionSpec};
use log::{debug, info, warn};
use ndarray::{Array1, Array2, ArrayView2, Zip};

/// Surrogate names understood by [`EgorOptimizer`] with the GP trend and kernel they select
const SURROGATES: [(&str, RegressionSpec, CorrelationSpec); 5] = [
    (
        "sGaussianProcess",
        RegressionSpec::CONSTANT,
        CorrelationSpec::SQUAREDEXPONENTIAL,
    ),
    (
        "sGaussianProcessML",
        RegressionSpec::CONSTANT,
        CorrelationSpec::MATERN52,
    ),
    (
        "sGaussianProcessNormal",
        RegressionSpec::LINEAR,
        CorrelationSpec::SQUAREDEXPONENTIAL,
    ),
    (
        "sStudentTProcessJef",
        RegressionSpec::CONSTANT,
        CorrelationSpec::ABSOLUTEEXPONENTIAL,
    ),
    (
        "sStudentTProcessNIG",
        RegressionSpec::LINEAR,
        CorrelationSpec::MATERN32,
    ),
];

/// Violation above which an Egor constraint output is considered infeasible
const FEASIBILITY_TOL: f64 = 1e-4;

/// Number of inner iterations handled by one multistart of the infill optimization
const INNER_ITERS_PER_START: usize = 25;

/// Returns GP regression and correlation specs for the given surrogate name
pub fn surrogate_specs(surr_name: &str) -> Result<(RegressionSpec, CorrelationSpec)> {
    SURROGATES
        .iter()
        .find(|(name, _, _)| *name == surr_name)
        .map(|&(_, regr, corr)| (regr, corr))
        .ok_or_else(|| {
            DriverError::InvalidOption(format!(
                "unknown surrogate '{surr_name}', expected one of {:?}",
                SURROGATES.iter().map(|s| s.0).collect::<Vec<_>>()
            ))
        })
}

/// Efficient global optimization with the egobox `Egor` optimizer
///
/// Option mapping:
/// * `n_iterations` -> `max_iters`
/// * `n_init_samples` -> `n_doe`
/// * `n_iter_relearn` -> `q_optmod`
/// * `n_inner_iterations` -> `n_start` (one start per 25 inner iterations)
/// * `surr_name` -> GP regression and correlation specs
#[derive(Clone, Debug)]
pub struct EgorOptimizer {
    seed: Option<u64>,
    equality_tol: f64,
    outdir: Option<String>,
}

impl Default for EgorOptimizer {
    fn default() -> Self {
        EgorOptimizer {
            seed: None,
            equality_tol: 1e-4,
            outdir: None,
        }
    }
}

impl EgorOptimizer {
    /// Sets a random seed to get reproducible runs
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Sets the tolerance used to turn equalities into pairs of inequalities
    pub fn equality_tol(mut self, equality_tol: f64) -> Self {
        self.equality_tol = equality_tol;
        self
    }

    /// Sets a directory where egobox saves its intermediate results
    pub fn outdir(mut self, outdir: impl Into<String>) -> Self {
        self.outdir = Some(outdir.into());
        self
    }
}

/// Egor objective and constraints outputs for one point, constraints are
/// satisfied when negative
fn egor_outputs(values: &Evaluation, ineqs: &[InequalityRow]) -> Array1<f64> {
    let mut y = Array1::zeros(1 + ineqs.len());
    y[0] = values.objective;
    for (k, row) in ineqs.iter().enumerate() {
        y[k + 1] = -row.value(&values.constraints);
    }
    y
}

impl ExternalOptimizer for EgorOptimizer {
    fn name(&self) -> &str {
        "Egor"
    }

    fn optimize(
        &self,
        problem: &mut dyn BlackBoxProblem,
        lower: &Array1<f64>,
        upper: &Array1<f64>,
        params: &OptimizerParams,
    ) -> Result<OptimOutcome> {
        let (regr, corr) = surrogate_specs(&params.surr_name)?;
        let ineqs = inequality_rows(problem.constraint_rows(), self.equality_tol);
        let x_init = problem.x_init();

        let mut xlimits = Array2::zeros((lower.len(), 2));
        xlimits.column_mut(0).assign(lower);
        xlimits.column_mut(1).assign(upper);

        let n_start = (params.n_inner_iterations / INNER_ITERS_PER_START).max(1);
        info!(
            "Egor: max_iters={} n_doe={} q_optmod={} n_start={} surrogate={} ({:?}, {:?})",
            params.n_iterations,
            params.n_init_samples,
            params.n_iter_relearn,
            n_start,
            params.surr_name,
            regr,
            corr
        );
        debug!("Noise {} left to GP nugget", params.noise);

        let callbacks = Callbacks::new(problem);
        let res = {
            let cb = &callbacks;
            let ineqs = &ineqs;
            let fobj = move |x: &ArrayView2<f64>| -> Array2<f64> {
                let mut y = Array2::zeros((x.nrows(), 1 + ineqs.len()));
                Zip::from(y.rows_mut())
                    .and(x.rows())
                    .for_each(|mut yi, xi| {
                        let values = cb.evaluate(&xi.to_vec());
                        yi.assign(&egor_outputs(&values, ineqs));
                    });
                y
            };
            let seed = self.seed;
            let outdir = self.outdir.clone();
            let egor = EgorBuilder::optimize(fobj)
                .configure(|config| {
                    let config = config
                        .max_iters(params.n_iterations)
                        .n_doe(params.n_init_samples)
                        .q_optmod(params.n_iter_relearn.max(1))
                        .n_start(n_start)
                        .n_cstr(ineqs.len())
                        .configure_gp(|gp| gp.regression_spec(regr).correlation_spec(corr));
                    let config = match seed {
                        Some(seed) => config.seed(seed),
                        None => config,
                    };
                    match outdir {
                        Some(outdir) => config.outdir(outdir),
                        None => config,
                    }
                })
                .min_within(&xlimits);
            egor.run()
        };

        let outcome = match res {
            Ok(res) => {
                let y_opt = res.y_opt;
                let violated = y_opt
                    .iter()
                    .skip(1)
                    .filter(|&&c| c > FEASIBILITY_TOL)
                    .count();
                let status = if violated > 0 {
                    ExitStatus::Failure {
                        reason: format!("{violated} constraint(s) violated at best point"),
                    }
                } else {
                    ExitStatus::Success
                };
                OptimOutcome {
                    min_value: y_opt[0],
                    x_best: res.x_opt,
                    status,
                }
            }
            Err(err) => {
                warn!("Egor failed: {err}");
                OptimOutcome {
                    min_value: f64::NAN,
                    x_best: x_init,
                    status: ExitStatus::Failure {
                        reason: err.to_string(),
                    },
                }
            }
        };
        debug!(
            "Egor outcome f={} at x={}",
            outcome.min_value, outcome.x_best
        );
        callbacks.finish(outcome)
    }
}
