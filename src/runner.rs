//! The run entry point: normalise a suite, assemble the default profiler
//! stack, drive the profiling context between `before_all` and `after_all`,
//! and wrap any failure with the offending scene's coordinates.
//!
//! This is the single place where user failures become [`RunSuiteError`];
//! the context below it never suppresses anything.

use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::context::{LogHandler, Note, ProfilingContext};
use crate::params::{format_coordinates, Coordinates, ResolvedParams, RESERVED_VARS};
use crate::profiler::{DefaultEventLogger, MetricDescriptor, Profiler, SceneResult};
use crate::suite::{BoxError, Suite, TimingConfig};
use crate::time::{TimeProfiler, TimingOptions};
use crate::validate::ExecutionValidator;

/// Designates a variable value reporters compute ratios against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Baseline {
    /// `Name`, `Builder`, `Executor`, or a parameter key.
    pub variable: String,
    /// The display name of the baseline value.
    pub value: String,
}

/// A baseline that cannot be resolved against the suite's parameters.
#[derive(Debug, PartialEq, Eq)]
pub enum BaselineError {
    /// The baseline variable is neither reserved nor a parameter key.
    UnknownVariable(String),
    /// The baseline value is not among the variable's display names.
    UnknownValue {
        /// The baseline variable.
        variable: String,
        /// The value that was not found.
        value: String,
    },
}

impl fmt::Display for BaselineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BaselineError::UnknownVariable(variable) => {
                write!(f, "baseline variable {variable:?} is not defined by the suite")
            }
            BaselineError::UnknownValue { variable, value } => write!(
                f,
                "baseline value {value:?} is not a value of parameter {variable:?}"
            ),
        }
    }
}

impl Error for BaselineError {}

/// Options accepted by [`run_suite`].
#[derive(Default)]
pub struct RunOptions {
    /// Replacement log sink; defaults to printing to standard output.
    pub log: Option<LogHandler>,
    /// Include pattern applied to case names at registration.
    pub pattern: Option<Regex>,
}

impl fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunOptions")
            .field("log", &self.log.is_some())
            .field("pattern", &self.pattern)
            .finish()
    }
}

/// The aggregated output of one suite run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSuiteResult {
    /// The suite name.
    pub name: String,
    /// Ordered parameter keys with their display names.
    pub param_def: Vec<(String, Vec<String>)>,
    /// Notes profilers attached during the run.
    pub notes: Vec<Note>,
    /// Metric descriptors, keyed by metric key.
    pub meta: BTreeMap<String, MetricDescriptor>,
    /// One entry per parameter combination, in cross-product order.
    pub scenes: Vec<SceneResult>,
    /// The baseline, validated against `param_def` at normalisation.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub baseline: Option<Baseline>,
}

/// A run result labelled with the toolchain that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolchainResult {
    /// The builder that bundled the suite, if any.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub builder: Option<String>,
    /// The executor that ran it, if any.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub executor: Option<String>,
    /// The run output itself.
    #[serde(flatten)]
    pub result: RunSuiteResult,
}

impl From<RunSuiteResult> for ToolchainResult {
    fn from(result: RunSuiteResult) -> Self {
        Self {
            builder: None,
            executor: None,
            result,
        }
    }
}

/// The externally visible shape: suite key to results per toolchain.
///
/// This is also the persisted-state format hosts serialise between runs.
pub type SuiteResults = BTreeMap<String, Vec<ToolchainResult>>;

/// Any failure of [`run_suite`], carrying the failing scene's display-name
/// coordinates when one was current.
#[derive(Debug)]
pub struct RunSuiteError {
    coords: Option<Coordinates>,
    source: BoxError,
}

impl RunSuiteError {
    fn config<E: Into<BoxError>>(source: E) -> Self {
        Self {
            coords: None,
            source: source.into(),
        }
    }

    fn bare(source: BoxError) -> Self {
        Self {
            coords: None,
            source,
        }
    }

    /// Coordinates of the failing scene, when known.
    pub fn coordinates(&self) -> Option<&Coordinates> {
        self.coords.as_ref()
    }
}

impl fmt::Display for RunSuiteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.coords {
            Some(coords) => write!(
                f,
                "suite failed at scene [{}]",
                format_coordinates(coords)
            ),
            None => write!(f, "suite failed"),
        }
    }
}

impl Error for RunSuiteError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(self.source.as_ref())
    }
}

fn validate_baseline(baseline: &Baseline, resolved: &ResolvedParams) -> Result<(), BaselineError> {
    // Reserved variables get their values from toolchains and case names,
    // which are unknown until after the run.
    if RESERVED_VARS.contains(&baseline.variable.as_str()) {
        return Ok(());
    }
    match resolved
        .display()
        .iter()
        .find(|(key, _)| key == &baseline.variable)
    {
        None => Err(BaselineError::UnknownVariable(baseline.variable.clone())),
        Some((_, names)) if !names.contains(&baseline.value) => Err(BaselineError::UnknownValue {
            variable: baseline.variable.clone(),
            value: baseline.value.clone(),
        }),
        Some(_) => Ok(()),
    }
}

/// Run a suite to completion and return its aggregated result.
///
/// The default profiler stack is the event logger, then the execution
/// validator (when configured), then the time profiler (unless disabled),
/// then the suite's own profilers. `after_all` runs on success and failure
/// alike.
pub fn run_suite(suite: Suite, options: RunOptions) -> Result<RunSuiteResult, RunSuiteError> {
    let Suite {
        name,
        setup,
        params,
        baseline,
        timing,
        validate,
        profilers: user_profilers,
        mut before_all,
        mut after_all,
    } = suite;

    let resolved = params.resolve().map_err(RunSuiteError::config)?;
    if let Some(baseline) = &baseline {
        validate_baseline(baseline, &resolved).map_err(RunSuiteError::config)?;
    }

    let time_profiler = match timing {
        TimingConfig::Defaults => {
            Some(TimeProfiler::new(TimingOptions::default()).map_err(RunSuiteError::config)?)
        }
        TimingConfig::Disabled => None,
        TimingConfig::Options(options) => {
            Some(TimeProfiler::new(options).map_err(RunSuiteError::config)?)
        }
    };

    let mut profilers: Vec<Box<dyn Profiler>> = vec![Box::new(DefaultEventLogger::new())];
    if let Some(validate) = validate {
        profilers.push(Box::new(ExecutionValidator::new(validate)));
    }
    if let Some(time_profiler) = time_profiler {
        profilers.push(Box::new(time_profiler));
    }
    profilers.extend(user_profilers);

    let mut ctx = ProfilingContext::new(setup, resolved.clone(), options.pattern, options.log)
        .map_err(RunSuiteError::config)?;

    let run_result = (|| {
        if let Some(hook) = before_all.as_mut() {
            hook().map_err(RunSuiteError::bare)?;
        }
        ctx.run(&mut profilers).map_err(|scene_error| {
            let (coords, source) = scene_error.into_parts();
            RunSuiteError { coords, source }
        })
    })();

    let after_result = match after_all.as_mut() {
        Some(hook) => hook(),
        None => Ok(()),
    };

    run_result?;
    after_result.map_err(RunSuiteError::bare)?;

    let (scenes, notes, meta) = ctx.take_output();
    Ok(RunSuiteResult {
        name,
        param_def: resolved.display().to_vec(),
        notes,
        meta,
        scenes,
        baseline,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParamsDef;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn quiet() -> RunOptions {
        RunOptions {
            log: Some(Rc::new(|_, _| {})),
            pattern: None,
        }
    }

    #[test]
    fn test_config_error_bad_params() {
        let suite = Suite::new("s", |_| Ok(()))
            .params(ParamsDef::new().param("Name", [1]))
            .timing(false);
        let err = run_suite(suite, quiet()).unwrap_err();
        assert!(err.coordinates().is_none());
        assert!(err.source().unwrap().to_string().contains("reserved"));
    }

    #[test]
    fn test_config_error_bad_timing() {
        let options = TimingOptions {
            iterations: crate::time::Iterations::Count(3),
            unroll_factor: 2,
            ..TimingOptions::default()
        };
        let suite = Suite::new("s", |_| Ok(())).timing(options);
        let err = run_suite(suite, quiet()).unwrap_err();
        assert!(err
            .source()
            .unwrap()
            .to_string()
            .contains("multiple of unroll_factor"));
    }

    #[test]
    fn test_baseline_validation() {
        let suite = Suite::new("s", |_| Ok(()))
            .params(ParamsDef::new().param("size", [10, 20]))
            .baseline("size", "30")
            .timing(false);
        let err = run_suite(suite, quiet()).unwrap_err();
        assert!(err.source().unwrap().to_string().contains("30"));

        let suite = Suite::new("s", |_| Ok(()))
            .params(ParamsDef::new().param("size", [10, 20]))
            .baseline("bogus", "10")
            .timing(false);
        run_suite(suite, quiet()).unwrap_err();

        // Reserved variables are resolvable only after the run; accepted.
        let suite = Suite::new("s", |scene| {
            scene.bench("a", || ())?;
            Ok(())
        })
        .baseline("Name", "a")
        .timing(false);
        let result = run_suite(suite, quiet()).unwrap();
        assert_eq!(result.baseline.unwrap().value, "a");
    }

    #[test]
    fn test_after_all_runs_on_failure() {
        let called = Rc::new(RefCell::new(false));
        let observed = Rc::clone(&called);
        let suite = Suite::new("s", |_| Err("setup exploded".into()))
            .timing(false)
            .after_all(move || {
                *observed.borrow_mut() = true;
                Ok(())
            });
        run_suite(suite, quiet()).unwrap_err();
        assert!(*called.borrow());
    }

    #[test]
    fn test_lifecycle_brackets_run() {
        let log = Rc::new(RefCell::new(Vec::<&'static str>::new()));
        let before_log = Rc::clone(&log);
        let after_log = Rc::clone(&log);
        let setup_log = Rc::clone(&log);
        let suite = Suite::new("s", move |scene| {
            setup_log.borrow_mut().push("setup");
            scene.bench("noop", || ())?;
            Ok(())
        })
        .timing(false)
        .before_all(move || {
            before_log.borrow_mut().push("before_all");
            Ok(())
        })
        .after_all(move || {
            after_log.borrow_mut().push("after_all");
            Ok(())
        });

        run_suite(suite, quiet()).unwrap();
        assert_eq!(*log.borrow(), ["before_all", "setup", "after_all"]);
    }

    #[test]
    fn test_result_shape_without_timing() {
        let suite = Suite::new("shape", |scene| {
            scene.bench("a", || ())?;
            scene.bench("b", || ())?;
            Ok(())
        })
        .params(ParamsDef::new().param("n", [1, 2, 3]))
        .timing(false);

        let result = run_suite(suite, quiet()).unwrap();
        assert_eq!(result.name, "shape");
        assert_eq!(result.scenes.len(), 3);
        for scene in &result.scenes {
            let names: Vec<_> = scene.iter().map(|case| case.name.as_str()).collect();
            assert_eq!(names, ["a", "b"]);
        }
        assert_eq!(
            result.param_def,
            vec![("n".to_string(), vec!["1".into(), "2".into(), "3".into()])]
        );
        assert!(result.meta.is_empty());
    }

    #[test]
    fn test_pattern_filters_cases() {
        let suite = Suite::new("s", |scene| {
            scene.bench("keep-me", || ())?;
            scene.bench("drop-me", || ())?;
            Ok(())
        })
        .timing(false);

        let options = RunOptions {
            log: Some(Rc::new(|_, _| {})),
            pattern: Some(Regex::new("^keep").unwrap()),
        };
        let result = run_suite(suite, options).unwrap();
        assert_eq!(result.scenes[0].len(), 1);
        assert_eq!(result.scenes[0][0].name, "keep-me");
    }

    #[test]
    fn test_toolchain_result_serde_flattens() {
        let result = RunSuiteResult {
            name: "s".into(),
            param_def: Vec::new(),
            notes: Vec::new(),
            meta: BTreeMap::new(),
            scenes: Vec::new(),
            baseline: None,
        };
        let toolchain = ToolchainResult {
            builder: Some("bundler".into()),
            executor: None,
            result,
        };
        let json = serde_json::to_value(&toolchain).unwrap();
        assert_eq!(json["builder"], "bundler");
        assert_eq!(json["name"], "s");
        assert!(json.get("executor").is_none());
        assert!(json.get("result").is_none());
    }
}
