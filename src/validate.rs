//! Pre-flight validation: dry-run every case once before any sampling, and
//! optionally check that all cases of a scene agree on their return value.
//!
//! The validator walks the same parameter combinations the driver will,
//! builds each scene through the suite's `setup`, and invokes every case
//! through [`BenchCase::invoke`](crate::suite::BenchCase::invoke). Any
//! failure aborts the run before the first measurement; the wasted minute
//! this saves on a long suite is the whole point.

use std::error::Error;
use std::fmt;
use std::rc::Rc;

use crate::context::ProfilingContext;
use crate::params::{format_coordinates, Coordinates};
use crate::profiler::Profiler;
use crate::suite::{BoxError, Scene};
use crate::types::BenchValue;

/// How case return values are compared within one scene.
#[derive(Clone, Default)]
pub enum Equality {
    /// Do not compare; the dry run alone is the check.
    #[default]
    Disabled,
    /// Structural equality ([`BenchValue`]'s, which treats `NaN` as equal).
    Structural,
    /// A caller-supplied comparator.
    Custom(Rc<dyn Fn(&BenchValue, &BenchValue) -> bool>),
}

/// Options of the [`ExecutionValidator`].
#[derive(Clone, Default)]
pub struct ValidateOptions {
    equality: Equality,
}

impl ValidateOptions {
    /// Dry-run only, no equality checking.
    pub fn new() -> Self {
        Self::default()
    }

    /// Require all cases of a scene to return structurally equal values.
    pub fn equality(mut self) -> Self {
        self.equality = Equality::Structural;
        self
    }

    /// Require all cases of a scene to agree under a custom comparator.
    pub fn equality_with<F>(mut self, comparator: F) -> Self
    where
        F: Fn(&BenchValue, &BenchValue) -> bool + 'static,
    {
        self.equality = Equality::Custom(Rc::new(comparator));
        self
    }
}

impl fmt::Debug for ValidateOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let equality = match self.equality {
            Equality::Disabled => "disabled",
            Equality::Structural => "structural",
            Equality::Custom(_) => "custom",
        };
        f.debug_struct("ValidateOptions")
            .field("equality", &equality)
            .finish()
    }
}

/// Failures raised by the validator, all before measurement begins.
#[derive(Debug)]
pub enum ValidationError {
    /// The suite's `setup` failed while building a validation scene.
    SetupFailed {
        /// Display coordinates of the failing combination.
        coordinates: String,
        /// The underlying failure.
        source: BoxError,
    },
    /// A case failed its dry run.
    CaseFailed {
        /// Display coordinates of the failing combination.
        coordinates: String,
        /// The failing case.
        name: String,
        /// The underlying failure.
        source: BoxError,
    },
    /// Two cases of one scene returned values that do not match.
    Mismatch {
        /// Display coordinates of the scene.
        coordinates: String,
        /// The case whose value served as the reference.
        first: String,
        /// The diverging case.
        second: String,
    },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::SetupFailed { coordinates, .. } => {
                write!(f, "validation could not build scene [{coordinates}]")
            }
            ValidationError::CaseFailed {
                coordinates, name, ..
            } => write!(f, "case {name:?} failed validation at [{coordinates}]"),
            ValidationError::Mismatch {
                coordinates,
                first,
                second,
            } => write!(
                f,
                "cases {first:?} and {second:?} returned different values at [{coordinates}]"
            ),
        }
    }
}

impl Error for ValidationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ValidationError::SetupFailed { source, .. }
            | ValidationError::CaseFailed { source, .. } => Some(source.as_ref()),
            ValidationError::Mismatch { .. } => None,
        }
    }
}

/// The pre-flight profiler; does all its work in `on_start`.
#[derive(Default)]
pub struct ExecutionValidator {
    options: ValidateOptions,
}

impl ExecutionValidator {
    /// Build the validator from its options.
    pub fn new(options: ValidateOptions) -> Self {
        Self { options }
    }

    fn check_scene(&self, scene: &mut Scene, coords: &Coordinates) -> Result<(), ValidationError> {
        let compare = !matches!(self.options.equality, Equality::Disabled);
        let mut reference: Option<(String, BenchValue)> = None;

        for case in scene.cases.iter_mut() {
            let name = case.name.clone();
            let value = case
                .invoke()
                .map_err(|source| ValidationError::CaseFailed {
                    coordinates: format_coordinates(coords),
                    name: name.clone(),
                    source,
                })?;
            if !compare {
                continue;
            }
            match &reference {
                None => reference = Some((name, value)),
                Some((first, expected)) => {
                    if !self.values_match(expected, &value) {
                        return Err(ValidationError::Mismatch {
                            coordinates: format_coordinates(coords),
                            first: first.clone(),
                            second: name,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    fn values_match(&self, expected: &BenchValue, actual: &BenchValue) -> bool {
        match &self.options.equality {
            Equality::Disabled => true,
            Equality::Structural => expected == actual,
            Equality::Custom(comparator) => comparator(expected, actual),
        }
    }
}

impl Profiler for ExecutionValidator {
    fn on_start(&mut self, ctx: &mut ProfilingContext) -> Result<(), BoxError> {
        ctx.info("Validating benchmark cases before measurement.");
        for (raw, coords) in ctx.assignments() {
            let mut scene =
                ctx.build_scene(raw, coords.clone())
                    .map_err(|source| ValidationError::SetupFailed {
                        coordinates: format_coordinates(&coords),
                        source,
                    })?;
            let outcome = self.check_scene(&mut scene, &coords);
            scene.run_teardown();
            outcome?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::LogHandler;
    use crate::params::ParamsDef;
    use crate::suite::SetupFn;
    use std::cell::RefCell;

    fn context_for(params: ParamsDef, setup: SetupFn) -> ProfilingContext {
        let resolved = params.resolve().unwrap();
        let quiet: LogHandler = Rc::new(|_, _| {});
        ProfilingContext::new(setup, resolved, None, Some(quiet)).unwrap()
    }

    fn validate(ctx: &mut ProfilingContext, options: ValidateOptions) -> Result<(), BoxError> {
        ExecutionValidator::new(options).on_start(ctx)
    }

    #[test]
    fn test_dry_run_passes_healthy_suite() {
        let mut ctx = context_for(
            ParamsDef::new().param("n", [1, 2]),
            Box::new(|scene| {
                scene.bench("ok", || 42)?;
                Ok(())
            }),
        );
        validate(&mut ctx, ValidateOptions::new()).unwrap();
    }

    #[test]
    fn test_equality_mismatch_identifies_pair() {
        let mut ctx = context_for(
            ParamsDef::new(),
            Box::new(|scene| {
                scene.bench("truthy", || true)?;
                scene.bench("falsy", || false)?;
                Ok(())
            }),
        );
        let err = validate(&mut ctx, ValidateOptions::new().equality()).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("truthy"), "{message}");
        assert!(message.contains("falsy"), "{message}");
    }

    #[test]
    fn test_differing_returns_pass_without_equality() {
        let mut ctx = context_for(
            ParamsDef::new(),
            Box::new(|scene| {
                scene.bench("truthy", || true)?;
                scene.bench("falsy", || false)?;
                Ok(())
            }),
        );
        validate(&mut ctx, ValidateOptions::new()).unwrap();
    }

    #[test]
    fn test_nan_returns_compare_equal() {
        let mut ctx = context_for(
            ParamsDef::new(),
            Box::new(|scene| {
                scene.bench("a", || f64::NAN)?;
                scene.bench("b", || f64::NAN)?;
                Ok(())
            }),
        );
        validate(&mut ctx, ValidateOptions::new().equality()).unwrap();
    }

    #[test]
    fn test_custom_comparator() {
        let mut ctx = context_for(
            ParamsDef::new(),
            Box::new(|scene| {
                scene.bench("exact", || 100.0)?;
                scene.bench("close", || 100.4)?;
                Ok(())
            }),
        );
        let approx = |a: &BenchValue, b: &BenchValue| match (a, b) {
            (BenchValue::Float(x), BenchValue::Float(y)) => (x - y).abs() < 1.0,
            _ => false,
        };
        validate(&mut ctx, ValidateOptions::new().equality_with(approx)).unwrap();
    }

    #[test]
    fn test_panicking_case_fails_with_coordinates() {
        let mut ctx = context_for(
            ParamsDef::new().param("mode", ["fine", "bad"]),
            Box::new(|scene| {
                let broken = scene.param("mode") == &BenchValue::from("bad");
                scene.bench("maybe", move || {
                    if broken {
                        panic!("dry run caught this");
                    }
                })?;
                Ok(())
            }),
        );
        let err = validate(&mut ctx, ValidateOptions::new()).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("mode=bad"), "{message}");
        assert!(message.contains("maybe"), "{message}");
    }

    #[test]
    fn test_teardown_runs_per_validated_scene() {
        let count = Rc::new(RefCell::new(0));
        let observed = Rc::clone(&count);
        let mut ctx = context_for(
            ParamsDef::new().param("n", [1, 2, 3]),
            Box::new(move |scene| {
                let counter = Rc::clone(&observed);
                scene.teardown(move || *counter.borrow_mut() += 1);
                scene.bench("noop", || ())?;
                Ok(())
            }),
        );
        validate(&mut ctx, ValidateOptions::new()).unwrap();
        assert_eq!(*count.borrow(), 3);
    }
}
