//! Optimization driver delegating the search to an [`ExternalOptimizer`].
use crate::context::RunContext;
use crate::errors::{DriverError, Result};
use crate::model::Model;
use crate::optimizers::ExternalOptimizer;
use crate::options::{DriverOptions, OptSettings};
use crate::recorder::{Recorder, RecorderList};
use crate::types::{ExitStatus, Supports};
use env_logger::{Builder, Env};
use log::{debug, info, warn};
use ndarray::Array1;

/// Environment variable used to set the driver log level (default `info`)
pub const EGOBOX_DRIVER_LOG: &str = "EGOBOX_DRIVER_LOG";

/// Stages of a driver run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverState {
    /// Not running
    Idle,
    /// Model evaluated once at its initial design variables
    InitialEval,
    /// External optimizer running
    DelegatedOptimization,
    /// Model evaluated at the reported optimum
    FinalEval,
    /// Run completed
    Done,
}

/// Result of a driver run
#[derive(Clone, Debug)]
pub struct RunOutcome {
    /// Minimum objective value reported by the optimizer
    pub min_value: f64,
    /// Location of the minimum (flat vector)
    pub x_opt: Array1<f64>,
    /// Optimizer termination status
    pub status: ExitStatus,
    /// Number of model evaluations, the final one included
    pub n_evaluations: usize,
}

fn enter(state: &mut DriverState, next: DriverState) {
    debug!("Driver {:?} -> {:?}", state, next);
    *state = next;
}

/// A driver minimizing the single objective of a [`Model`] with an [`ExternalOptimizer`]
///
/// ```no_run
/// use egobox_driver::{CobylaOptimizer, DesignVariable, Driver, DriverOptions, ExplicitModel};
/// use ndarray::array;
///
/// let mut model = ExplicitModel::new();
/// model
///     .add_desvar(DesignVariable::new("x", 1).lower(-5.).upper(5.), array![0.])?
///     .add_objective("f", |inputs| (inputs.scalar("x") - 1.).powi(2))?;
///
/// let mut driver = Driver::new(CobylaOptimizer::default())
///     .options(DriverOptions::default().n_iterations(100).disp(false));
/// let res = driver.run(&mut model)?;
/// println!("min f={} at x={}", res.min_value, res.x_opt);
/// # Ok::<(), egobox_driver::DriverError>(())
/// ```
pub struct Driver<O: ExternalOptimizer> {
    optimizer: O,
    options: DriverOptions,
    opt_settings: OptSettings,
    supports: Supports,
    recorders: RecorderList,
    state: DriverState,
    result: Option<f64>,
    exit_status: Option<ExitStatus>,
}

impl<O: ExternalOptimizer> Driver<O> {
    /// Driver with default options delegating to `optimizer`
    pub fn new(optimizer: O) -> Self {
        let env = Env::new().filter_or(EGOBOX_DRIVER_LOG, "info");
        let mut builder = Builder::from_env(env);
        let builder = builder.target(env_logger::Target::Stdout);
        builder.try_init().ok();
        Driver {
            optimizer,
            options: DriverOptions::default(),
            opt_settings: OptSettings::new(),
            supports: Supports::default(),
            recorders: RecorderList::new(),
            state: DriverState::Idle,
            result: None,
            exit_status: None,
        }
    }

    /// Sets the driver options
    pub fn options(mut self, options: DriverOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the declared capabilities
    pub fn supports(mut self, supports: Supports) -> Self {
        self.supports = supports;
        self
    }

    /// Attaches a recorder called after each model evaluation
    pub fn add_recorder<R: Recorder + 'static>(&mut self, recorder: R) -> &mut Self {
        self.recorders.push(recorder);
        self
    }

    /// Driver options
    pub fn get_options(&self) -> &DriverOptions {
        &self.options
    }

    /// Declared capabilities
    pub fn get_supports(&self) -> Supports {
        self.supports
    }

    /// Settings exposed to the framework, filled when a run starts
    pub fn opt_settings(&self) -> &OptSettings {
        &self.opt_settings
    }

    /// Current stage
    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Minimum value of the last completed run
    pub fn result(&self) -> Option<f64> {
        self.result
    }

    /// Exit status of the last completed run
    pub fn exit_status(&self) -> Option<&ExitStatus> {
        self.exit_status.as_ref()
    }

    fn check(&self, model: &dyn Model) -> Result<()> {
        self.options.check()?;
        let n_obj = model.objectives().len();
        if n_obj > 1 && !self.supports.multiple_objectives {
            return Err(DriverError::MultipleObjectives(n_obj));
        }
        for cstr in model.constraint_metadata() {
            cstr.check()?;
            if cstr.kind.is_equality() && !self.supports.equality_constraints {
                return Err(DriverError::UnsupportedConstraint(
                    cstr.name.clone(),
                    "equality constraints not supported",
                ));
            }
            if !cstr.kind.is_equality() && !self.supports.inequality_constraints {
                return Err(DriverError::UnsupportedConstraint(
                    cstr.name.clone(),
                    "inequality constraints not supported",
                ));
            }
        }
        Ok(())
    }

    /// Minimizes the objective of the `model`
    ///
    /// The model is evaluated once before the optimization and once after at
    /// the reported optimum, so that its state reflects the returned result.
    /// Errors raised by the model are returned unmodified. An optimizer failure
    /// is not an error: it is reported in [`RunOutcome::status`].
    pub fn run(&mut self, model: &mut dyn Model) -> Result<RunOutcome> {
        self.state = DriverState::Idle;
        self.result = None;
        self.exit_status = None;
        self.check(&*model)?;

        let disp = serde_json::Value::Bool(self.options.disp);
        self.opt_settings.insert("disp".to_string(), disp);
        let params = self.options.optimizer_params();
        let name = self.optimizer.name().to_string();

        let mut ctx = RunContext::new(&name, model, &mut self.recorders)?;
        enter(&mut self.state, DriverState::InitialEval);
        ctx.initial_evaluation()?;

        let (lower, upper) = ctx.variables().bounds()?;
        info!(
            "{} optimization of {} variables ({})",
            name,
            lower.len(),
            ctx.variables().names().join(", ")
        );
        enter(&mut self.state, DriverState::DelegatedOptimization);
        let outcome = self.optimizer.optimize(&mut ctx, &lower, &upper, &params)?;
        if let ExitStatus::Failure { reason } = &outcome.status {
            warn!("{} failed: {}", name, reason);
        }

        enter(&mut self.state, DriverState::FinalEval);
        let final_value = ctx.objective(&outcome.x_best)?;
        let min_value = if outcome.min_value.is_finite() {
            outcome.min_value
        } else {
            final_value
        };
        let n_evaluations = ctx.n_evaluations();
        drop(ctx);

        self.result = Some(min_value);
        self.exit_status = Some(outcome.status.clone());
        enter(&mut self.state, DriverState::Done);
        info!(
            "{} min f(x)={} at x={} ({} evaluations)",
            name, min_value, outcome.x_best, n_evaluations
        );
        if self.options.disp {
            println!("Optimization Complete");
            println!("{}", "-".repeat(35));
        }
        Ok(RunOutcome {
            min_value,
            x_opt: outcome.x_best,
            status: outcome.status,
            n_evaluations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::explicit_model::ExplicitModel;
    use crate::optimizers::{BlackBoxProblem, CobylaOptimizer, EgorOptimizer, SlsqpOptimizer};
    use crate::options::OptimizerParams;
    use crate::recorder::MemoryRecorder;
    use crate::types::{Constraint, DesignVariable, OptimOutcome, RunMetadata};
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array2, ArrayView1};
    use serial_test::serial;

    fn paraboloid() -> ExplicitModel {
        let mut model = ExplicitModel::new();
        model
            .add_desvar(
                DesignVariable::new("x", 1).lower(-50.).upper(50.),
                array![3.],
            )
            .unwrap()
            .add_desvar(
                DesignVariable::new("y", 1).lower(-50.).upper(50.),
                array![-4.],
            )
            .unwrap()
            .add_objective("f_xy", |inputs| {
                let (x, y) = (inputs.scalar("x"), inputs.scalar("y"));
                (x - 3.).powi(2) + x * y + (y + 4.).powi(2) - 3.
            })
            .unwrap();
        model
    }

    #[test]
    fn test_paraboloid_cobyla() {
        let mut model = paraboloid();
        let recorder = MemoryRecorder::new();
        let mut driver = Driver::new(CobylaOptimizer::default())
            .options(DriverOptions::default().n_iterations(500).disp(false));
        driver.add_recorder(recorder.clone());
        let res = driver.run(&mut model).unwrap();

        assert!(res.status.is_success());
        assert_abs_diff_eq!(res.min_value, -27. - 1. / 3., epsilon = 1e-3);
        assert_abs_diff_eq!(res.x_opt, array![20. / 3., -22. / 3.], epsilon = 1e-2);
        // model left at the reported optimum
        assert_eq!(model.desvar("x").unwrap()[0], res.x_opt[0]);
        assert_eq!(model.desvar("y").unwrap()[0], res.x_opt[1]);
        assert_abs_diff_eq!(model.objectives()[0].1, res.min_value, epsilon = 1e-6);

        assert_eq!(driver.state(), DriverState::Done);
        assert_eq!(driver.result(), Some(res.min_value));
        assert_eq!(driver.exit_status(), Some(&ExitStatus::Success));
        assert_eq!(
            driver.opt_settings()["disp"],
            serde_json::Value::Bool(false)
        );
        assert_eq!(recorder.len(), res.n_evaluations);
        // initial evaluation is not counted
        assert_eq!(model.n_solves(), res.n_evaluations + 1);
    }

    #[test]
    #[serial]
    fn test_paraboloid_egor() {
        let mut model = paraboloid();
        let options = DriverOptions::default()
            .n_iterations(30)
            .n_init_samples(10)
            .disp(false);
        let mut driver = Driver::new(EgorOptimizer::default().seed(42))
            .options(options);
        let res = driver.run(&mut model).unwrap();

        assert_abs_diff_eq!(res.min_value, -27. - 1. / 3., epsilon = 1.);
        assert_eq!(model.desvar("x").unwrap()[0], res.x_opt[0]);
        assert_eq!(model.desvar("y").unwrap()[0], res.x_opt[1]);
    }

    #[test]
    fn test_constrained_paraboloid_slsqp() {
        let mut model = paraboloid();
        model
            .add_constraint(Constraint::upper("con", 1, -15.), |inputs| {
                array![inputs.scalar("y") - inputs.scalar("x")]
            })
            .unwrap();
        let mut driver = Driver::new(SlsqpOptimizer::default())
            .options(DriverOptions::default().n_iterations(100).disp(false));
        let res = driver.run(&mut model).unwrap();

        assert!(res.status.is_success());
        assert_abs_diff_eq!(res.min_value, -27.083333, epsilon = 1e-3);
        assert_abs_diff_eq!(res.x_opt, array![7.166667, -7.833333], epsilon = 1e-2);
    }

    #[test]
    fn test_rosenbrock_layout() {
        let dim = 7;
        let mut model = ExplicitModel::new();
        for i in 0..dim {
            model
                .add_desvar(
                    DesignVariable::new(format!("p{i}.x{i}"), 1)
                        .lower(-5.)
                        .upper(5.),
                    array![0.],
                )
                .unwrap();
        }
        model
            .add_objective("p.f", move |inputs| {
                let x: Vec<f64> = (0..dim)
                    .map(|i| inputs.scalar(&format!("p{i}.x{i}")))
                    .collect();
                argmin_testfunctions::rosenbrock(&x)
            })
            .unwrap();
        let mut recorders = RecorderList::new();
        let ctx = RunContext::new("Layout", &mut model, &mut recorders).unwrap();
        assert_eq!(BlackBoxProblem::x_init(&ctx).len(), dim);
        let (lower, upper) = ctx.variables().bounds().unwrap();
        assert_eq!(lower.len() + upper.len(), 2 * dim);
        assert_eq!(ctx.variables().names()[6], "p6.x6");
    }

    /// Two objectives model failing on demand
    struct MockModel {
        inner: ExplicitModel,
        second_objective: bool,
        fail_at: Option<usize>,
    }

    impl MockModel {
        fn new() -> Self {
            MockModel {
                inner: paraboloid(),
                second_objective: false,
                fail_at: None,
            }
        }
    }

    impl Model for MockModel {
        fn desvar_metadata(&self) -> &[DesignVariable] {
            self.inner.desvar_metadata()
        }

        fn desvar(&self, name: &str) -> Result<Array1<f64>> {
            self.inner.desvar(name)
        }

        fn set_desvar(&mut self, name: &str, value: &ArrayView1<f64>) -> Result<()> {
            self.inner.set_desvar(name, value)
        }

        fn objectives(&self) -> Vec<(String, f64)> {
            let mut objectives = self.inner.objectives();
            if self.second_objective {
                objectives.push(("g".to_string(), 0.));
            }
            objectives
        }

        fn constraint_metadata(&self) -> &[Constraint] {
            self.inner.constraint_metadata()
        }

        fn constraint(&self, name: &str) -> Result<Array1<f64>> {
            self.inner.constraint(name)
        }

        fn solve_nonlinear(&mut self, metadata: &RunMetadata) -> Result<()> {
            if self.fail_at == Some(self.inner.n_solves()) {
                return Err(anyhow::anyhow!("solver diverged").into());
            }
            self.inner.solve_nonlinear(metadata)
        }

        fn calc_gradient(&mut self, params: &[String], outputs: &[String]) -> Result<Array2<f64>> {
            self.inner.calc_gradient(params, outputs)
        }
    }

    #[test]
    fn test_multiple_objectives_rejected() {
        let mut model = MockModel::new();
        model.second_objective = true;
        let mut driver = Driver::new(CobylaOptimizer::default())
            .options(DriverOptions::default().disp(false));
        let res = driver.run(&mut model);
        assert!(matches!(res, Err(DriverError::MultipleObjectives(2))));
        assert_eq!(model.inner.n_solves(), 0);
        assert_eq!(driver.state(), DriverState::Idle);
    }

    #[test]
    fn test_model_error_propagates() {
        let mut model = MockModel::new();
        model.fail_at = Some(7);
        let mut driver = Driver::new(CobylaOptimizer::default())
            .options(DriverOptions::default().disp(false));
        let res = driver.run(&mut model);
        match res {
            Err(DriverError::Model(err)) => assert_eq!(err.to_string(), "solver diverged"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(driver.result(), None);
    }

    #[test]
    fn test_missing_bounds() {
        let mut model = ExplicitModel::new();
        model
            .add_desvar(DesignVariable::new("x", 2).lower(0.), array![1., 1.])
            .unwrap()
            .add_objective("f", |inputs| inputs["x"].sum())
            .unwrap();
        let mut driver = Driver::new(CobylaOptimizer::default())
            .options(DriverOptions::default().disp(false));
        assert!(matches!(
            driver.run(&mut model),
            Err(DriverError::MissingBounds(_, "upper"))
        ));
        // only the initial evaluation happened
        assert_eq!(model.n_solves(), 1);
    }

    #[test]
    fn test_unsupported_equality() {
        let mut model = paraboloid();
        model
            .add_constraint(Constraint::equality("eq", 1, 0.), |inputs| {
                array![inputs.scalar("x")]
            })
            .unwrap();
        let supports = Supports {
            equality_constraints: false,
            ..Supports::default()
        };
        let mut driver = Driver::new(CobylaOptimizer::default())
            .supports(supports)
            .options(DriverOptions::default().disp(false));
        assert!(matches!(
            driver.run(&mut model),
            Err(DriverError::UnsupportedConstraint(name, _)) if name == "eq"
        ));
    }

    #[test]
    fn test_invalid_noise() {
        let mut model = paraboloid();
        let mut driver = Driver::new(CobylaOptimizer::default())
            .options(DriverOptions::default().noise(-1.).disp(false));
        assert!(matches!(
            driver.run(&mut model),
            Err(DriverError::InvalidOption(_))
        ));
    }

    /// Evaluates one point and reports a failure
    struct GiveUp;

    impl ExternalOptimizer for GiveUp {
        fn name(&self) -> &str {
            "GiveUp"
        }

        fn optimize(
            &self,
            problem: &mut dyn BlackBoxProblem,
            lower: &Array1<f64>,
            _upper: &Array1<f64>,
            _params: &OptimizerParams,
        ) -> Result<OptimOutcome> {
            let eval = problem.evaluate(&lower.view())?;
            Ok(OptimOutcome {
                min_value: eval.objective,
                x_best: lower.clone(),
                status: ExitStatus::Failure {
                    reason: "budget exhausted".to_string(),
                },
            })
        }
    }

    #[test]
    fn test_failure_status_surfaced() {
        let mut model = paraboloid();
        let mut driver = Driver::new(GiveUp)
            .options(DriverOptions::default().disp(false));
        let res = driver.run(&mut model).unwrap();
        assert_eq!(
            res.status,
            ExitStatus::Failure {
                reason: "budget exhausted".to_string()
            }
        );
        // (-50 - 3)^2 + 2500 + (-50 + 4)^2 - 3
        assert_eq!(res.min_value, 2809. + 2500. + 2116. - 3.);
        assert_eq!(res.n_evaluations, 2);
        assert_eq!(model.desvar("x").unwrap(), array![-50.]);
        assert!(!driver.exit_status().unwrap().is_success());
    }

    #[test]
    fn test_starting_point_recorded() {
        let mut model = paraboloid();
        let recorder = MemoryRecorder::new();
        let mut driver = Driver::new(CobylaOptimizer::default())
            .options(DriverOptions::default().n_iterations(50).disp(false));
        driver.add_recorder(recorder.clone());
        let res = driver.run(&mut model).unwrap();

        let records = recorder.records();
        assert_eq!(records[0].coord, "Cobyla|1");
        assert_eq!(records[0].desvars["x"], array![3.]);
        assert_eq!(records[0].desvars["y"], array![-4.]);
        assert_eq!(records[0].objectives["f_xy"], -15.);
        assert_eq!(records.len(), res.n_evaluations);
        assert_eq!(model.n_solves(), res.n_evaluations + 1);
    }

    /// Reports a point without a usable minimum value
    struct NoValue;

    impl ExternalOptimizer for NoValue {
        fn name(&self) -> &str {
            "NoValue"
        }

        fn optimize(
            &self,
            _problem: &mut dyn BlackBoxProblem,
            _lower: &Array1<f64>,
            _upper: &Array1<f64>,
            _params: &OptimizerParams,
        ) -> Result<OptimOutcome> {
            Ok(OptimOutcome {
                min_value: f64::NAN,
                x_best: array![6., -7.],
                status: ExitStatus::Success,
            })
        }
    }

    #[test]
    fn test_min_value_from_final_evaluation() {
        let mut model = paraboloid();
        let mut driver = Driver::new(NoValue)
            .options(DriverOptions::default().disp(false));
        let res = driver.run(&mut model).unwrap();
        // 9 - 42 + 9 - 3
        assert_eq!(res.min_value, -27.);
        assert_eq!(driver.result(), Some(-27.));
        assert_eq!(res.n_evaluations, 1);
        assert_eq!(model.objectives()[0].1, -27.);
    }
}
