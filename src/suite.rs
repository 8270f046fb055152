//! Suite definition and the per-combination scene model.
//!
//! A [`Suite`] bundles a `setup` function with parameters, timing options,
//! and lifecycle hooks. At run time the driver materialises one [`Scene`]
//! per parameter combination and calls `setup` on it; `setup` registers
//! workloads with [`Scene::bench`] / [`Scene::bench_async`] and iteration
//! hooks that bracket every workload invocation.
//!
//! Whether a workload is asynchronous is declared by the registration call,
//! never inferred from the function itself: a synchronous closure may well
//! return a future-like value without the harness wanting to await it. The
//! time profiler relies on the declaration to emit tight synchronous loops
//! for sync cases.

use std::any::Any;
use std::cell::RefCell;
use std::error::Error;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::rc::Rc;

use regex::Regex;
use tokio::runtime::Runtime;

use crate::params::{Assignment, Coordinates, ParamsDef};
use crate::profiler::Profiler;
use crate::runner::Baseline;
use crate::time::TimingOptions;
use crate::types::BenchValue;
use crate::validate::ValidateOptions;

/// Boxed error type used across user-supplied fallible callbacks.
pub type BoxError = Box<dyn Error + Send + Sync>;

/// A registered hook closure (iteration or teardown).
pub type HookFn = Box<dyn FnMut()>;

/// Suite `setup`: registers cases and hooks on a freshly built scene.
pub type SetupFn = Box<dyn FnMut(&mut Scene) -> Result<(), BoxError>>;

/// Suite-level lifecycle callback (`before_all` / `after_all`).
pub type LifecycleFn = Box<dyn FnMut() -> Result<(), BoxError>>;

type SyncWorkload = Box<dyn FnMut() -> BenchValue>;
type BoxFuture = Pin<Box<dyn Future<Output = BenchValue>>>;
type AsyncWorkload = Box<dyn FnMut() -> BoxFuture>;

/// A registered workload; the variant is the case's explicit async flag.
pub enum Workload {
    /// Invoked directly on the driver thread.
    Sync(SyncWorkload),
    /// Produces a future awaited on the run's current-thread runtime.
    Async(AsyncWorkload),
}

impl Workload {
    /// Whether invocations must be awaited.
    pub fn is_async(&self) -> bool {
        matches!(self, Workload::Async(_))
    }
}

impl fmt::Debug for Workload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Workload::Sync(_) => f.write_str("Workload::Sync"),
            Workload::Async(_) => f.write_str("Workload::Async"),
        }
    }
}

/// Rejection reasons for case registration.
///
/// These apply before the include pattern: a blank or duplicate name fails
/// even when the pattern would have filtered the case out.
#[derive(Debug, PartialEq, Eq)]
pub enum CaseNameError {
    /// The name was empty or whitespace.
    Blank,
    /// The name was already registered in this scene.
    Duplicate(String),
}

impl fmt::Display for CaseNameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaseNameError::Blank => write!(f, "benchmark case names must not be blank"),
            CaseNameError::Duplicate(name) => {
                write!(f, "duplicate benchmark case name {name:?}")
            }
        }
    }
}

impl Error for CaseNameError {}

/// Error carrying the message of a panic captured during a workload call.
#[derive(Debug)]
pub struct WorkloadPanic {
    message: String,
}

impl fmt::Display for WorkloadPanic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "workload panicked: {}", self.message)
    }
}

impl Error for WorkloadPanic {}

/// Extract a printable message from a panic payload.
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "panic payload of unknown type".to_string()
    }
}

/// Capability record handed to scenes and cases by value.
///
/// Scenes never hold a pointer back to the driver; everything they need
/// (the include pattern and the runtime that awaits async workloads) is
/// carried here and cloned into each case.
#[derive(Clone)]
pub(crate) struct SuiteContext {
    pub(crate) pattern: Option<Regex>,
    pub(crate) runtime: Rc<Runtime>,
}

/// One instantiation of a suite at a specific parameter assignment.
///
/// Created by the driver once per parameter combination, populated by the
/// suite's `setup`, and destroyed after its teardown hooks run.
pub struct Scene {
    params: Assignment,
    coords: Coordinates,
    ctx: SuiteContext,
    before_hooks: Rc<RefCell<Vec<HookFn>>>,
    after_hooks: Rc<RefCell<Vec<HookFn>>>,
    teardown_hooks: Vec<HookFn>,
    pub(crate) cases: Vec<BenchCase>,
}

impl Scene {
    pub(crate) fn new(params: Assignment, coords: Coordinates, ctx: SuiteContext) -> Self {
        Self {
            params,
            coords,
            ctx,
            before_hooks: Rc::new(RefCell::new(Vec::new())),
            after_hooks: Rc::new(RefCell::new(Vec::new())),
            teardown_hooks: Vec::new(),
            cases: Vec::new(),
        }
    }

    /// The raw parameter assignment this scene was built for.
    pub fn params(&self) -> &Assignment {
        &self.params
    }

    /// Look up one parameter's raw value.
    pub fn get(&self, name: &str) -> Option<&BenchValue> {
        self.params.get(name)
    }

    /// Look up one parameter's raw value.
    ///
    /// # Panics
    ///
    /// Panics if the suite does not define a parameter with this name.
    pub fn param(&self, name: &str) -> &BenchValue {
        match self.params.get(name) {
            Some(value) => value,
            None => panic!("suite defines no parameter named {name:?}"),
        }
    }

    /// Display-name coordinates of this scene's assignment.
    pub fn coordinates(&self) -> &Coordinates {
        &self.coords
    }

    /// Register a synchronous benchmark case.
    ///
    /// The name rules (non-blank, unique within the scene) are checked
    /// before the include pattern; a filtered-out case is simply not added.
    pub fn bench<F, R>(&mut self, name: &str, mut workload: F) -> Result<(), CaseNameError>
    where
        F: FnMut() -> R + 'static,
        R: Into<BenchValue>,
    {
        self.register(name, Workload::Sync(Box::new(move || workload().into())))
    }

    /// Register an asynchronous benchmark case.
    ///
    /// The workload is a closure producing a future; each invocation is
    /// awaited on the run's current-thread runtime.
    pub fn bench_async<F, Fut, R>(&mut self, name: &str, mut workload: F) -> Result<(), CaseNameError>
    where
        F: FnMut() -> Fut + 'static,
        Fut: Future<Output = R> + 'static,
        R: Into<BenchValue>,
    {
        self.register(
            name,
            Workload::Async(Box::new(move || {
                let fut = workload();
                Box::pin(async move { fut.await.into() })
            })),
        )
    }

    fn register(&mut self, name: &str, workload: Workload) -> Result<(), CaseNameError> {
        if name.trim().is_empty() {
            return Err(CaseNameError::Blank);
        }
        if self.cases.iter().any(|case| case.name == name) {
            return Err(CaseNameError::Duplicate(name.to_string()));
        }
        if let Some(pattern) = &self.ctx.pattern {
            if !pattern.is_match(name) {
                return Ok(());
            }
        }
        self.cases.push(BenchCase {
            name: name.to_string(),
            id: None,
            workload,
            before: Rc::clone(&self.before_hooks),
            after: Rc::clone(&self.after_hooks),
            ctx: self.ctx.clone(),
        });
        Ok(())
    }

    /// Append a hook run immediately before every workload invocation.
    pub fn before_iteration<F: FnMut() + 'static>(&mut self, hook: F) {
        self.before_hooks.borrow_mut().push(Box::new(hook));
    }

    /// Append a hook run immediately after every workload invocation.
    ///
    /// After-hooks run even when the workload panics.
    pub fn after_iteration<F: FnMut() + 'static>(&mut self, hook: F) {
        self.after_hooks.borrow_mut().push(Box::new(hook));
    }

    /// Append a hook run once when the scene is torn down.
    ///
    /// Teardown hooks run unconditionally, including after a failure.
    pub fn teardown<F: FnMut() + 'static>(&mut self, hook: F) {
        self.teardown_hooks.push(Box::new(hook));
    }

    /// Registered cases, in registration order.
    pub fn case_names(&self) -> Vec<&str> {
        self.cases.iter().map(|case| case.name.as_str()).collect()
    }

    pub(crate) fn run_teardown(&mut self) {
        for hook in &mut self.teardown_hooks {
            hook();
        }
    }
}

impl fmt::Debug for Scene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scene")
            .field("coords", &self.coords)
            .field("cases", &self.cases.len())
            .finish()
    }
}

/// One workload measured under one parameter assignment.
pub struct BenchCase {
    /// The case name; unique within its scene.
    pub name: String,
    id: Option<u32>,
    workload: Workload,
    before: Rc<RefCell<Vec<HookFn>>>,
    after: Rc<RefCell<Vec<HookFn>>>,
    ctx: SuiteContext,
}

impl BenchCase {
    /// The id assigned by the driver at measurement time, used by notes.
    pub fn id(&self) -> Option<u32> {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: u32) {
        self.id = Some(id);
    }

    /// Whether the workload was registered through [`Scene::bench_async`].
    pub fn is_async(&self) -> bool {
        self.workload.is_async()
    }

    /// Whether any iteration hooks apply to this case.
    pub fn has_iteration_hooks(&self) -> bool {
        !self.before.borrow().is_empty() || !self.after.borrow().is_empty()
    }

    /// Run the case once: before-hooks, the workload, then after-hooks.
    ///
    /// After-hooks run even when the workload panics; the panic is captured
    /// and surfaced as an error. Returns the workload's value. This is the
    /// single-shot primitive profilers use outside of measurement loops.
    pub fn invoke(&mut self) -> Result<BenchValue, BoxError> {
        run_hooks(&self.before);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.run_workload()));
        run_hooks(&self.after);
        outcome.map_err(|payload| {
            Box::new(WorkloadPanic {
                message: panic_message(payload),
            }) as BoxError
        })
    }

    fn run_workload(&mut self) -> BenchValue {
        let runtime = Rc::clone(&self.ctx.runtime);
        match &mut self.workload {
            Workload::Sync(workload) => workload(),
            Workload::Async(workload) => runtime.block_on(workload()),
        }
    }

    pub(crate) fn workload_mut(&mut self) -> &mut Workload {
        &mut self.workload
    }

    pub(crate) fn iteration_hooks(&self) -> (Rc<RefCell<Vec<HookFn>>>, Rc<RefCell<Vec<HookFn>>>) {
        (Rc::clone(&self.before), Rc::clone(&self.after))
    }

    pub(crate) fn runtime(&self) -> Rc<Runtime> {
        Rc::clone(&self.ctx.runtime)
    }
}

impl fmt::Debug for BenchCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BenchCase")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("is_async", &self.is_async())
            .finish()
    }
}

pub(crate) fn run_hooks(hooks: &Rc<RefCell<Vec<HookFn>>>) {
    for hook in hooks.borrow_mut().iter_mut() {
        hook();
    }
}

/// How the built-in time profiler is configured for a suite.
#[derive(Debug, Clone, Default)]
pub enum TimingConfig {
    /// Measure with [`TimingOptions::default`].
    #[default]
    Defaults,
    /// Do not measure time at all.
    Disabled,
    /// Measure with explicit options.
    Options(TimingOptions),
}

impl From<bool> for TimingConfig {
    fn from(enabled: bool) -> Self {
        if enabled {
            TimingConfig::Defaults
        } else {
            TimingConfig::Disabled
        }
    }
}

impl From<TimingOptions> for TimingConfig {
    fn from(options: TimingOptions) -> Self {
        TimingConfig::Options(options)
    }
}

/// A user's set of benchmark scenarios sharing one `setup` and parameter
/// definition.
///
/// ```no_run
/// use scenebench::{ParamsDef, RunOptions, Suite};
///
/// let suite = Suite::new("sum", |scene| {
///     let size = scene.param("size").display_name().unwrap().parse::<usize>()?;
///     let data: Vec<f64> = (0..size).map(|i| i as f64).collect();
///     scene.bench("iter-sum", move || data.iter().sum::<f64>())?;
///     Ok(())
/// })
/// .params(ParamsDef::new().param("size", [100usize, 1000]));
///
/// let result = scenebench::run_suite(suite, RunOptions::default()).unwrap();
/// assert_eq!(result.scenes.len(), 2);
/// ```
pub struct Suite {
    pub(crate) name: String,
    pub(crate) setup: SetupFn,
    pub(crate) params: ParamsDef,
    pub(crate) baseline: Option<Baseline>,
    pub(crate) timing: TimingConfig,
    pub(crate) validate: Option<ValidateOptions>,
    pub(crate) profilers: Vec<Box<dyn Profiler>>,
    pub(crate) before_all: Option<LifecycleFn>,
    pub(crate) after_all: Option<LifecycleFn>,
}

impl Suite {
    /// Create a suite from its name and `setup` function.
    pub fn new<N, F>(name: N, setup: F) -> Self
    where
        N: Into<String>,
        F: FnMut(&mut Scene) -> Result<(), BoxError> + 'static,
    {
        Self {
            name: name.into(),
            setup: Box::new(setup),
            params: ParamsDef::new(),
            baseline: None,
            timing: TimingConfig::default(),
            validate: None,
            profilers: Vec::new(),
            before_all: None,
            after_all: None,
        }
    }

    /// Set the parameter definition.
    pub fn params(mut self, params: ParamsDef) -> Self {
        self.params = params;
        self
    }

    /// Designate a variable value as the baseline reporters compare against.
    pub fn baseline<V: Into<String>, D: Into<String>>(mut self, variable: V, value: D) -> Self {
        self.baseline = Some(Baseline {
            variable: variable.into(),
            value: value.into(),
        });
        self
    }

    /// Configure the built-in time profiler.
    ///
    /// Accepts `true` (defaults), `false` (disabled), or [`TimingOptions`].
    pub fn timing(mut self, config: impl Into<TimingConfig>) -> Self {
        self.timing = config.into();
        self
    }

    /// Enable the pre-flight execution validator.
    pub fn validate(mut self, options: ValidateOptions) -> Self {
        self.validate = Some(options);
        self
    }

    /// Append a user profiler, run after the built-in stack.
    pub fn profiler<P: Profiler + 'static>(mut self, profiler: P) -> Self {
        self.profilers.push(Box::new(profiler));
        self
    }

    /// Run once before the profiling context starts.
    pub fn before_all<F>(mut self, hook: F) -> Self
    where
        F: FnMut() -> Result<(), BoxError> + 'static,
    {
        self.before_all = Some(Box::new(hook));
        self
    }

    /// Run once after the profiling context finishes, on success and failure.
    pub fn after_all<F>(mut self, hook: F) -> Self
    where
        F: FnMut() -> Result<(), BoxError> + 'static,
    {
        self.after_all = Some(Box::new(hook));
        self
    }
}

impl fmt::Debug for Suite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Suite")
            .field("name", &self.name)
            .field("timing", &self.timing)
            .field("baseline", &self.baseline)
            .finish()
    }
}
