use clap::Parser;
use egobox_driver::{
    CobylaOptimizer, DesignVariable, Driver, DriverOptions, EgorOptimizer, ExplicitModel,
    ExternalOptimizer,
};
use ndarray::array;
use std::error::Error;
use std::time::Instant;

const ITERATION_COUNTS: [usize; 7] = [10, 20, 50, 100, 200, 500, 1000];

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

/// Runs one optimization, returns the minimum found and the elapsed seconds
fn timed_run<O: ExternalOptimizer>(
    optimizer: O,
    options: DriverOptions,
    dim: usize,
    bound: f64,
) -> Result<(f64, f64), Box<dyn Error>> {
    let mut model = rosenbrock_model(dim, bound)?;
    let mut driver = Driver::new(optimizer).options(options.disp(false));
    let start = Instant::now();
    let res = driver.run(&mut model)?;
    Ok((res.min_value, start.elapsed().as_secs_f64()))
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value_t = 4)]
    dim: usize,
    /// Number of Egor runs per iteration count (Egor is not deterministic)
    #[arg(short, long, default_value_t = 10)]
    rep: usize,
    #[arg(short, long, default_value = "results.csv")]
    output: String,
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let mut wtr = csv::Writer::from_path(&args.output)?;
    wtr.write_record(["Method", "Iterations", "Minimum Found", "Time"])?;

    for iters in ITERATION_COUNTS {
        let options = DriverOptions::default().n_iterations(iters);
        let (min, time) = timed_run(CobylaOptimizer::default(), options, args.dim, 50.)?;
        println!("COBYLA {iters} iterations: minimum {min} in {time:.3}s");
        wtr.write_record(&[
            "COBYLA".to_string(),
            iters.to_string(),
            min.to_string(),
            time.to_string(),
        ])?;

        for _ in 0..args.rep {
            let options = DriverOptions::default()
                .n_iterations(iters)
                .n_iter_relearn(20)
                .n_init_samples(40)
                .n_inner_iterations(1000)
                .surr_name("sGaussianProcessML");
            let (min, time) = timed_run(EgorOptimizer::default(), options, args.dim, 5.)?;
            println!("Egor {iters} iterations: minimum {min} in {time:.3}s");
            wtr.write_record(&[
                "Egor".to_string(),
                iters.to_string(),
                min.to_string(),
                time.to_string(),
            ])?;
        }
        wtr.flush()?;
    }
    Ok(())
}
