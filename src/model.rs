//! Contract between the driver and the framework owning the computational model.
use crate::errors::Result;
use crate::types::{Constraint, DesignVariable, RunMetadata};
use ndarray::{Array1, Array2, ArrayView1};

/// A computational model seen from an optimization driver
///
/// The model owns design variables, objectives and constraints. The driver only
/// reads metadata, writes design variable values, triggers evaluations and asks
/// for derivatives. Metadata ordering is the registration order and must stay
/// stable while a driver runs.
pub trait Model {
    /// Design variables metadata in registration order
    fn desvar_metadata(&self) -> &[DesignVariable];

    /// Current value of the design variable `name`
    fn desvar(&self, name: &str) -> Result<Array1<f64>>;

    /// Sets the value of the design variable `name`
    fn set_desvar(&mut self, name: &str, value: &ArrayView1<f64>) -> Result<()>;

    /// Objective names and values in registration order
    fn objectives(&self) -> Vec<(String, f64)>;

    /// Constraints metadata in registration order
    fn constraint_metadata(&self) -> &[Constraint];

    /// Current value of the constraint `name`
    fn constraint(&self, name: &str) -> Result<Array1<f64>>;

    /// Runs the model with the current design variable values
    fn solve_nonlinear(&mut self, metadata: &RunMetadata) -> Result<()>;

    /// Derivatives of `outputs` with respect to `params` at the current point
    ///
    /// Returns a matrix with one row per output element (outputs concatenated in
    /// the given order) and one column per parameter element.
    fn calc_gradient(&mut self, params: &[String], outputs: &[String]) -> Result<Array2<f64>>;
}
