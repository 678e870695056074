use egobox_driver::{
    Constraint, DesignVariable, Driver, DriverOptions, EgorOptimizer, ExplicitModel,
};
use ndarray::array;
use std::error::Error;

/// f(x,y) = (x-3)^2 + xy + (y+4)^2 - 3
/// unconstrained min -27.333 at (6.667, -7.333)
/// with y - x <= -15, min -27.083 at (7.167, -7.833)
fn main() -> Result<(), Box<dyn Error>> {
    let mut model = ExplicitModel::new();
    model
        .add_desvar(
            DesignVariable::new("p1.x", 1).lower(-50.).upper(50.),
            array![3.],
        )?
        .add_desvar(
            DesignVariable::new("p2.y", 1).lower(-50.).upper(50.),
            array![-4.],
        )?
        .add_objective("p.f_xy", |inputs| {
            let (x, y) = (inputs.scalar("p1.x"), inputs.scalar("p2.y"));
            (x - 3.).powi(2) + x * y + (y + 4.).powi(2) - 3.
        })?
        .add_constraint(Constraint::upper("con.c", 1, -15.), |inputs| {
            array![inputs.scalar("p2.y") - inputs.scalar("p1.x")]
        })?;

    let options = DriverOptions::default()
        .n_iterations(40)
        .n_init_samples(10)
        .surr_name("sGaussianProcess");
    let mut driver = Driver::new(EgorOptimizer::default().seed(42))
        .options(options);
    let res = driver.run(&mut model)?;

    println!(
        "Minimum of {} found at {} ({:?}, {} evaluations)",
        res.min_value, res.x_opt, res.status, res.n_evaluations
    );
    Ok(())
}
