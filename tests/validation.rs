//! Pre-flight validation through the full runner: equality failures abort
//! before any sampling.

use std::cell::RefCell;
use std::error::Error;
use std::rc::Rc;

use scenebench::{ParamsDef, RunOptions, Suite, ValidateOptions};

fn quiet() -> RunOptions {
    RunOptions {
        log: Some(Rc::new(|_, _| {})),
        pattern: None,
    }
}

/// Two cases disagreeing on their return value fail the run before the
/// time profiler measures anything; the error names both cases.
#[test]
fn equality_failure_aborts_before_measurement() {
    let measured = Rc::new(RefCell::new(0u32));
    let observed = Rc::clone(&measured);

    let suite = Suite::new("diverging", move |scene| {
        let counter = Rc::clone(&observed);
        scene.bench("affirms", move || {
            *counter.borrow_mut() += 1;
            true
        })?;
        let counter = Rc::clone(&observed);
        scene.bench("denies", move || {
            *counter.borrow_mut() += 1;
            false
        })?;
        Ok(())
    })
    .validate(ValidateOptions::new().equality());

    let err = scenebench::run_suite(suite, quiet()).unwrap_err();
    let message = err.source().unwrap().to_string();
    assert!(message.contains("affirms"), "{message}");
    assert!(message.contains("denies"), "{message}");

    // One dry-run invocation per case; the profiler never sampled.
    assert_eq!(*measured.borrow(), 2);
}

/// Agreement across all parameter combinations passes and measurement
/// proceeds normally.
#[test]
fn equal_returns_pass_validation() {
    let suite = Suite::new("agreeing", |scene| {
        let size = match scene.param("size") {
            scenebench::BenchValue::Int(n) => *n as u64,
            other => panic!("unexpected param: {other:?}"),
        };
        scene.bench("sum-up", move || (0..size).sum::<u64>())?;
        scene.bench("closed-form", move || size.saturating_sub(1) * size / 2)?;
        Ok(())
    })
    .params(ParamsDef::new().param("size", [0, 10, 1000]))
    .validate(ValidateOptions::new().equality())
    .timing(false);

    let result = scenebench::run_suite(suite, quiet()).unwrap();
    assert_eq!(result.scenes.len(), 3);
}

/// A custom comparator relaxes the check.
#[test]
fn custom_comparator_accepts_tolerance() {
    let suite = Suite::new("approx", |scene| {
        scene.bench("float-sum", || (0..1000).map(f64::from).sum::<f64>())?;
        scene.bench("closed-form", || 999.0 * 1000.0 / 2.0 + 1e-9)?;
        Ok(())
    })
    .validate(ValidateOptions::new().equality_with(|a, b| {
        match (a, b) {
            (scenebench::BenchValue::Float(x), scenebench::BenchValue::Float(y)) => {
                (x - y).abs() < 1e-6
            }
            _ => false,
        }
    }))
    .timing(false);

    scenebench::run_suite(suite, quiet()).unwrap();
}
