//! Compare three ways of summing a float vector across input sizes.
//!
//! Run with `cargo run --example array_sum --release`.

use scenebench::{
    report, ParamsDef, RunOptions, Suite, SummaryTable, TimingOptions, ToolchainResult,
};

fn main() -> Result<(), scenebench::RunSuiteError> {
    let suite = Suite::new("array-sum", |scene| {
        let size = match scene.param("size") {
            scenebench::BenchValue::Int(n) => *n as usize,
            other => panic!("unexpected size: {other:?}"),
        };
        let data: Vec<f64> = (0..size).map(|_| rand::random()).collect();

        let values = data.clone();
        scene.bench("index-loop", move || {
            let mut total = 0.0;
            for i in 0..values.len() {
                total += values[i];
            }
            total
        })?;
        let values = data.clone();
        scene.bench("iter-sum", move || values.iter().sum::<f64>())?;
        let values = data;
        scene.bench("fold", move || values.iter().fold(0.0, |acc, v| acc + v))?;
        Ok(())
    })
    .params(ParamsDef::new().param("size", [100usize, 10_000, 1_000_000]))
    .baseline("Name", "iter-sum")
    .timing(TimingOptions {
        iterations: "100ms".parse().expect("static duration"),
        ..TimingOptions::default()
    });

    let result = scenebench::run_suite(suite, RunOptions::default())?;

    let table = SummaryTable::new(&[ToolchainResult::from(result)]);
    println!("\n{}", report::render_table(&table));
    Ok(())
}
