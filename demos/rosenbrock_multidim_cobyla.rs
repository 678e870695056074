use clap::Parser;
use egobox_driver::{CobylaOptimizer, DesignVariable, Driver, DriverOptions, ExplicitModel};
use ndarray::array;
use std::error::Error;

/// Rosenbrock function over `dim` scalar design variables `p{i}.x{i}`
/// min f(x)=0 at x=(1, 1, ..., 1)
fn rosenbrock_model(dim: usize, bound: f64) -> Result<ExplicitModel, Box<dyn Error>> {
    let mut model = ExplicitModel::new();
    for i in 0..dim {
        model.add_desvar(
            DesignVariable::new(format!("p{i}.x{i}"), 1)
                .lower(-bound)
                .upper(bound),
            array![0.],
        )?;
    }
    model.add_objective("p.f", move |inputs| {
        let x: Vec<f64> = (0..dim)
            .map(|i| inputs.scalar(&format!("p{i}.x{i}")))
            .collect();
        argmin_testfunctions::rosenbrock(&x)
    })?;
    Ok(model)
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value_t = 7)]
    dim: usize,
    #[arg(short, long, default_value_t = 1000)]
    iters: usize,
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let mut model = rosenbrock_model(args.dim, 50.)?;
    let mut driver = Driver::new(CobylaOptimizer::default())
        .options(DriverOptions::default().n_iterations(args.iters));
    let res = driver.run(&mut model)?;

    println!(
        "Minimum of {} found at {} after {} evaluations",
        res.min_value, res.x_opt, res.n_evaluations
    );
    Ok(())
}
