//! Driver options and the parameter bag handed to the external optimizer.
use crate::errors::{DriverError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Settings exposed to the surrounding framework (e.g. the `disp` flag)
pub type OptSettings = BTreeMap<String, serde_json::Value>;

/// User options of the driver
///
/// ```
/// use egobox_driver::DriverOptions;
///
/// let options = DriverOptions::default()
///     .n_iterations(100)
///     .n_init_samples(10)
///     .surr_name("sGaussianProcessML");
/// assert!(options.check().is_ok());
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverOptions {
    /// Number of iterations of the optimizer
    pub n_iterations: usize,
    /// Number of iterations of the inner optimization of the acquisition criterion
    pub n_inner_iterations: usize,
    /// Number of iterations between two relearnings of the surrogate hyperparameters
    pub n_iter_relearn: usize,
    /// Number of initial samples evaluated before the first surrogate fit
    pub n_init_samples: usize,
    /// Name of the surrogate model
    pub surr_name: String,
    /// Observation noise
    pub noise: f64,
    /// Set to false to prevent printing of convergence messages
    pub disp: bool,
}

impl Default for DriverOptions {
    fn default() -> Self {
        DriverOptions {
            n_iterations: 200,
            n_inner_iterations: 500,
            n_iter_relearn: 5,
            n_init_samples: 2,
            surr_name: "sGaussianProcess".to_string(),
            noise: 1e-6,
            disp: true,
        }
    }
}

impl DriverOptions {
    /// Sets the number of iterations
    pub fn n_iterations(mut self, n_iterations: usize) -> Self {
        self.n_iterations = n_iterations;
        self
    }

    /// Sets the number of inner iterations
    pub fn n_inner_iterations(mut self, n_inner_iterations: usize) -> Self {
        self.n_inner_iterations = n_inner_iterations;
        self
    }

    /// Sets the hyperparameters relearning interval
    pub fn n_iter_relearn(mut self, n_iter_relearn: usize) -> Self {
        self.n_iter_relearn = n_iter_relearn;
        self
    }

    /// Sets the number of initial samples
    pub fn n_init_samples(mut self, n_init_samples: usize) -> Self {
        self.n_init_samples = n_init_samples;
        self
    }

    /// Sets the surrogate model name
    pub fn surr_name(mut self, surr_name: impl Into<String>) -> Self {
        self.surr_name = surr_name.into();
        self
    }

    /// Sets the observation noise
    pub fn noise(mut self, noise: f64) -> Self {
        self.noise = noise;
        self
    }

    /// Sets the display flag
    pub fn disp(mut self, disp: bool) -> Self {
        self.disp = disp;
        self
    }

    /// Checks declared lower bounds of the options
    ///
    /// Counts are unsigned hence only the noise has to be checked.
    pub fn check(&self) -> Result<()> {
        if !(self.noise >= 0. && self.noise.is_finite()) {
            return Err(DriverError::InvalidOption(format!(
                "noise should be a finite value >= 0, got {}",
                self.noise
            )));
        }
        Ok(())
    }

    /// Loads options from a json file, missing fields take their default value
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let options: DriverOptions = serde_json::from_str(&content)?;
        options.check()?;
        Ok(options)
    }

    /// Saves options as a json file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Parameters forwarded to the external optimizer
    pub fn optimizer_params(&self) -> OptimizerParams {
        OptimizerParams {
            n_iterations: self.n_iterations,
            n_inner_iterations: self.n_inner_iterations,
            n_iter_relearn: self.n_iter_relearn,
            n_init_samples: self.n_init_samples,
            noise: self.noise,
            surr_name: self.surr_name.clone(),
        }
    }
}

/// Configuration bag understood by the external optimizer
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OptimizerParams {
    /// Number of iterations
    pub n_iterations: usize,
    /// Number of inner iterations
    pub n_inner_iterations: usize,
    /// Relearning interval
    pub n_iter_relearn: usize,
    /// Number of initial samples
    pub n_init_samples: usize,
    /// Observation noise
    pub noise: f64,
    /// Surrogate model name
    pub surr_name: String,
}

impl Default for OptimizerParams {
    fn default() -> Self {
        DriverOptions::default().optimizer_params()
    }
}
