//! This library implements an optimization driver for multidisciplinary design
//! optimization (MDO) models delegating the search to an external optimizer,
//! primarily the efficient global optimization (EGO) algorithm of
//! [egobox](https://github.com/relf/egobox).
//!
//! The model side owns named and sized design variables, a single objective and
//! constraints. Optimizers only see a bounded black-box function of a flat vector.
//! The driver:
//! * flattens design variables and their bounds in registration order and writes
//!   candidate points back into the model,
//! * exposes constraints with a single sign convention: satisfied when non-negative,
//! * caches constraint values and the jacobian per evaluated point so that value and
//!   gradient queries can be issued in any order,
//! * keeps iteration metadata and notifies recorders after each model evaluation.
//!
//! # Example
//!
//! ```no_run
//! use egobox_driver::{DesignVariable, Driver, DriverOptions, EgorOptimizer, ExplicitModel};
//! use ndarray::array;
//!
//! // f(x,y) = (x-3)^2 + xy + (y+4)^2 - 3, min -27.333 at (6.667, -7.333)
//! let mut model = ExplicitModel::new();
//! model
//!     .add_desvar(DesignVariable::new("x", 1).lower(-50.).upper(50.), array![3.])?
//!     .add_desvar(DesignVariable::new("y", 1).lower(-50.).upper(50.), array![-4.])?
//!     .add_objective("f_xy", |inputs| {
//!         let (x, y) = (inputs.scalar("x"), inputs.scalar("y"));
//!         (x - 3.).powi(2) + x * y + (y + 4.).powi(2) - 3.
//!     })?;
//!
//! let options = DriverOptions::default()
//!     .n_iterations(30)
//!     .n_init_samples(10);
//! let mut driver = Driver::new(EgorOptimizer::default().seed(42))
//!     .options(options);
//! let res = driver.run(&mut model)?;
//! println!("Minimum {} found at {}", res.min_value, res.x_opt);
//! # Ok::<(), egobox_driver::DriverError>(())
//! ```
//!
//! # Usage
//!
//! * A computational model implements the [`Model`] trait, [`ExplicitModel`] builds
//!   one from closures.
//! * An optimizer implements [`ExternalOptimizer`], available ones are
//!   [`EgorOptimizer`], [`CobylaOptimizer`] and [`SlsqpOptimizer`].
//! * [`DriverOptions`] can be set with builder methods or loaded from a json file.
//! * Recorders ([`MemoryRecorder`], [`JsonRecorder`], [`LogRecorder`]) are attached
//!   with [`Driver::add_recorder`].
//!
//! Logging is done with the `log` crate, the level is controlled with the
//! `EGOBOX_DRIVER_LOG` environment variable (default `info`).
//!
#![warn(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]

pub mod optimizers;

mod context;
mod driver;
mod errors;
mod explicit_model;
mod layout;
mod model;
mod options;
mod recorder;
mod types;

pub use crate::context::*;
pub use crate::driver::*;
pub use crate::errors::*;
pub use crate::explicit_model::*;
pub use crate::layout::*;
pub use crate::model::*;
pub use crate::optimizers::{
    BlackBoxProblem, CobylaOptimizer, EgorOptimizer, Evaluation, ExternalOptimizer,
    SlsqpOptimizer,
};
pub use crate::options::*;
pub use crate::recorder::*;
pub use crate::types::*;
