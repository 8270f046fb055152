//! # scenebench
//!
//! Parameterised micro-benchmark suites with pluggable profilers.
//!
//! A suite describes its workloads once; the harness materialises one
//! *scene* per combination of the suite's parameters, measures every
//! registered case, and aggregates the samples into a structured result
//! that reporters can sort, group, and diff.
//!
//! The measurement engine calibrates an iteration count against a
//! wall-clock target, warms the workload up, subtracts the harness's own
//! per-call overhead (estimated from a no-op of the same shape), and
//! unrolls the measurement loop so sub-microsecond workloads stay above
//! the clock's resolution.
//!
//! ## Quick start
//!
//! ```no_run
//! use scenebench::{ParamsDef, RunOptions, Suite};
//!
//! let suite = Suite::new("sum", |scene| {
//!     let size = match scene.param("size") {
//!         scenebench::BenchValue::Int(n) => *n as usize,
//!         _ => unreachable!(),
//!     };
//!     let data: Vec<f64> = (0..size).map(|i| i as f64 * 0.7).collect();
//!
//!     let values = data.clone();
//!     scene.bench("iter-sum", move || values.iter().sum::<f64>())?;
//!     let values = data;
//!     scene.bench("loop-sum", move || {
//!         let mut total = 0.0;
//!         for v in &values {
//!             total += v;
//!         }
//!         total
//!     })?;
//!     Ok(())
//! })
//! .params(ParamsDef::new().param("size", [100usize, 10_000]));
//!
//! let result = scenebench::run_suite(suite, RunOptions::default())?;
//! assert_eq!(result.scenes.len(), 2);
//! # Ok::<(), scenebench::RunSuiteError>(())
//! ```
//!
//! ## Asynchronous workloads
//!
//! Whether a workload suspends is declared by registering through
//! [`Scene::bench_async`] instead of [`Scene::bench`]; it is never guessed
//! from the closure. Async workloads are awaited one invocation at a time
//! on a current-thread runtime owned by the run, while synchronous cases
//! keep a tight loop with no await points.
//!
//! ## Profilers
//!
//! Measurement, validation, and logging are all [`Profiler`]s subscribing
//! to the same lifecycle: `on_start`, then `on_scene`/`on_case` in
//! cross-product order, then `on_finish`. Custom profilers contribute
//! their own metrics and notes alongside the built-in time profiler.

#![warn(missing_docs)]
#![warn(clippy::all)]

// Core modules
mod context;
mod params;
mod profiler;
mod runner;
mod suite;
mod summary;
mod time;
mod types;
mod validate;

// Reporter-facing modules
pub mod format;
pub mod messages;
pub mod report;
pub mod stats;

// Re-exports for the public API
pub use context::{
    default_log_handler, LogHandler, LogLevel, Note, NoteKind, ProfilingContext, SceneError,
};
pub use format::{format_duration, format_number, format_value};
pub use messages::{ClientMessage, ErrorObject};
pub use params::{
    format_coordinates, Assignment, Coordinates, CrossProduct, ParamValues, ParamsDef,
    ParamsError, ResolvedParams, RESERVED_VARS,
};
pub use profiler::{
    CaseResult, DefaultEventLogger, MetricAnalysis, MetricDescriptor, MetricValue, Metrics,
    Profiler, SceneResult,
};
pub use runner::{
    run_suite, Baseline, BaselineError, RunOptions, RunSuiteError, RunSuiteResult, SuiteResults,
    ToolchainResult,
};
pub use suite::{
    BenchCase, BoxError, CaseNameError, HookFn, LifecycleFn, Scene, SetupFn, Suite, TimingConfig,
    Workload, WorkloadPanic,
};
pub use summary::{FlatRow, SummaryNote, SummaryTable, UnknownVariable};
pub use time::{
    DurationParseError, Iterations, TimeProfiler, TimingConfigError, TimingOptions,
    THROUGHPUT_METRIC, TIME_METRIC, ZERO_MEASUREMENT_NOTE,
};
pub use types::BenchValue;
pub use validate::{Equality, ExecutionValidator, ValidateOptions, ValidationError};
