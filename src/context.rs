//! The profiling driver: walks scenes, dispatches lifecycle events to the
//! profiler stack, and aggregates per-case metrics, notes, and descriptors.
//!
//! The driver is single-threaded and cooperative. Profilers, hooks, and
//! workloads all run sequentially on the driver thread; asynchronous
//! workloads are awaited on the run's own current-thread runtime before the
//! driver advances. The context is the only shared mutable state of a run
//! and every access to it is sequential, so no locking is involved.

use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use colored::Colorize;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::runtime::{Builder as RuntimeBuilder, Runtime};

use crate::params::{format_coordinates, Assignment, Coordinates, ResolvedParams};
use crate::profiler::{CaseResult, MetricDescriptor, Metrics, Profiler, SceneResult};
use crate::suite::{panic_message, BoxError, Scene, SetupFn, SuiteContext};

/// Severity of a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Diagnostic detail (calibration steps, warm-up timings).
    Debug,
    /// Run progress.
    Info,
    /// Something degraded but the run continues.
    Warn,
}

/// Sink for log lines emitted during a run.
pub type LogHandler = Rc<dyn Fn(LogLevel, &str)>;

/// The default handler: prints to standard output, colouring by severity.
pub fn default_log_handler() -> LogHandler {
    Rc::new(|level, message| match level {
        LogLevel::Debug => println!("{}", message.dimmed()),
        LogLevel::Info => println!("{message}"),
        LogLevel::Warn => println!("{}", message.yellow()),
    })
}

/// Kind of a note surfaced in the run result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteKind {
    /// Informational.
    Info,
    /// A degradation worth reviewing.
    Warn,
}

/// A message profilers attach to the run result, optionally bound to a case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    /// Severity.
    pub kind: NoteKind,
    /// The message text.
    pub text: String,
    /// Id of the case this note refers to, if any.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub case_id: Option<u32>,
}

/// A failure wrapped with the coordinates of the scene it occurred in.
///
/// When no scene was current (for example a profiler failing in `on_start`)
/// the coordinates are absent and this is a bare run failure.
#[derive(Debug)]
pub struct SceneError {
    coords: Option<Coordinates>,
    source: BoxError,
}

impl SceneError {
    pub(crate) fn bare(source: BoxError) -> Self {
        Self {
            coords: None,
            source,
        }
    }

    pub(crate) fn at(coords: Coordinates, source: BoxError) -> Self {
        Self {
            coords: Some(coords),
            source,
        }
    }

    /// Display-name coordinates of the failing scene, when known.
    pub fn coordinates(&self) -> Option<&Coordinates> {
        self.coords.as_ref()
    }

    pub(crate) fn into_parts(self) -> (Option<Coordinates>, BoxError) {
        (self.coords, self.source)
    }
}

impl fmt::Display for SceneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.coords {
            Some(coords) => write!(f, "scene [{}] failed", format_coordinates(coords)),
            None => write!(f, "benchmark run failed"),
        }
    }
}

impl Error for SceneError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(self.source.as_ref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Fresh,
    Running,
    Done,
}

/// Error for re-running a context that already ran.
#[derive(Debug)]
struct ContextExhausted;

impl fmt::Display for ContextExhausted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a profiling context runs at most once")
    }
}

impl Error for ContextExhausted {}

/// The state of one suite run, shared by every profiler.
///
/// Owns the scenes and cases for the duration of the run; afterwards only
/// the aggregated output is kept.
pub struct ProfilingContext {
    setup: SetupFn,
    resolved: ResolvedParams,
    pattern: Option<Regex>,
    log: LogHandler,
    runtime: Rc<Runtime>,
    scenes: Vec<SceneResult>,
    notes: Vec<Note>,
    meta: BTreeMap<String, MetricDescriptor>,
    next_case_id: u32,
    state: RunState,
}

impl ProfilingContext {
    /// Build a context over a resolved parameter set.
    ///
    /// Creates the current-thread runtime that awaits async workloads for
    /// the whole run.
    pub fn new(
        setup: SetupFn,
        resolved: ResolvedParams,
        pattern: Option<Regex>,
        log: Option<LogHandler>,
    ) -> Result<Self, std::io::Error> {
        let runtime = RuntimeBuilder::new_current_thread().enable_time().build()?;
        Ok(Self {
            setup,
            resolved,
            pattern,
            log: log.unwrap_or_else(default_log_handler),
            runtime: Rc::new(runtime),
            scenes: Vec::new(),
            notes: Vec::new(),
            meta: BTreeMap::new(),
            next_case_id: 0,
            state: RunState::Fresh,
        })
    }

    /// The include pattern cases were filtered with, if any.
    pub fn pattern(&self) -> Option<&Regex> {
        self.pattern.as_ref()
    }

    /// Number of parameter combinations this run walks.
    pub fn combination_count(&self) -> usize {
        self.resolved.combination_count()
    }

    /// The resolved parameter definition of this run.
    pub fn resolved_params(&self) -> &ResolvedParams {
        &self.resolved
    }

    /// Every parameter combination, in driver order.
    pub fn assignments(&self) -> Vec<(Assignment, Coordinates)> {
        self.resolved.combinations().collect()
    }

    /// Emit a debug-level log line.
    pub fn debug(&self, message: &str) {
        (self.log)(LogLevel::Debug, message);
    }

    /// Emit an info-level log line.
    pub fn info(&self, message: &str) {
        (self.log)(LogLevel::Info, message);
    }

    /// Emit a warn-level log line.
    pub fn warn(&self, message: &str) {
        (self.log)(LogLevel::Warn, message);
    }

    /// Append a note to the run result and log it at the same severity.
    pub fn note(&mut self, kind: NoteKind, text: impl Into<String>, case_id: Option<u32>) {
        let text = text.into();
        match kind {
            NoteKind::Info => self.info(&text),
            NoteKind::Warn => self.warn(&text),
        }
        self.notes.push(Note {
            kind,
            text,
            case_id,
        });
    }

    /// Register a metric descriptor under its key. Last write wins.
    pub fn define_metric(&mut self, descriptor: MetricDescriptor) {
        self.meta.insert(descriptor.key.clone(), descriptor);
    }

    /// Run the suite once over the given profiler stack.
    ///
    /// Profilers are invoked in stack order; scenes in cross-product order;
    /// cases in registration order. Scene teardown hooks run even when the
    /// scene fails. A second call fails.
    pub fn run(&mut self, profilers: &mut [Box<dyn Profiler>]) -> Result<(), SceneError> {
        if self.state != RunState::Fresh {
            return Err(SceneError::bare(Box::new(ContextExhausted)));
        }
        self.state = RunState::Running;
        let result = self.run_inner(profilers);
        self.state = RunState::Done;
        result
    }

    fn run_inner(&mut self, profilers: &mut [Box<dyn Profiler>]) -> Result<(), SceneError> {
        for profiler in profilers.iter_mut() {
            profiler.on_start(self).map_err(SceneError::bare)?;
        }

        for (raw, coords) in self.assignments() {
            self.run_scene(profilers, raw, coords.clone())
                .map_err(|source| SceneError::at(coords, source))?;
        }

        for profiler in profilers.iter_mut() {
            profiler.on_finish(self).map_err(SceneError::bare)?;
        }
        Ok(())
    }

    fn run_scene(
        &mut self,
        profilers: &mut [Box<dyn Profiler>],
        raw: Assignment,
        coords: Coordinates,
    ) -> Result<(), BoxError> {
        let mut scene = self.new_scene(raw, coords);
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            self.run_scene_body(profilers, &mut scene)
        }))
        .unwrap_or_else(|payload| Err(panic_message(payload).into()));
        scene.run_teardown();
        result
    }

    fn run_scene_body(
        &mut self,
        profilers: &mut [Box<dyn Profiler>],
        scene: &mut Scene,
    ) -> Result<(), BoxError> {
        (self.setup)(scene)?;

        for profiler in profilers.iter_mut() {
            profiler.on_scene(self, scene)?;
        }

        let mut results = SceneResult::new();
        for index in 0..scene.cases.len() {
            let id = self.next_case_id;
            self.next_case_id += 1;

            let case = &mut scene.cases[index];
            case.set_id(id);
            let mut metrics = Metrics::new();
            for profiler in profilers.iter_mut() {
                profiler.on_case(self, case, &mut metrics)?;
            }
            let name = scene.cases[index].name.clone();
            results.push(CaseResult { name, metrics });
        }

        self.scenes.push(results);
        Ok(())
    }

    /// Build a scene for one assignment the same way the driver does:
    /// construct it, then run the suite's `setup` on it.
    ///
    /// On failure the scene's teardown hooks run before the error returns.
    /// Used by pre-flight profilers; the caller owns the scene and is
    /// responsible for tearing it down after use.
    pub(crate) fn build_scene(
        &mut self,
        raw: Assignment,
        coords: Coordinates,
    ) -> Result<Scene, BoxError> {
        let mut scene = self.new_scene(raw, coords);
        let result = panic::catch_unwind(AssertUnwindSafe(|| (self.setup)(&mut scene)))
            .unwrap_or_else(|payload| Err(panic_message(payload).into()));
        match result {
            Ok(()) => Ok(scene),
            Err(source) => {
                scene.run_teardown();
                Err(source)
            }
        }
    }

    fn new_scene(&self, raw: Assignment, coords: Coordinates) -> Scene {
        Scene::new(
            raw,
            coords,
            SuiteContext {
                pattern: self.pattern.clone(),
                runtime: Rc::clone(&self.runtime),
            },
        )
    }

    pub(crate) fn take_output(
        &mut self,
    ) -> (Vec<SceneResult>, Vec<Note>, BTreeMap<String, MetricDescriptor>) {
        (
            mem::take(&mut self.scenes),
            mem::take(&mut self.notes),
            mem::take(&mut self.meta),
        )
    }
}

impl fmt::Debug for ProfilingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProfilingContext")
            .field("combinations", &self.combination_count())
            .field("state", &self.state)
            .field("scenes", &self.scenes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParamsDef;
    use std::cell::RefCell;

    fn context_for(params: ParamsDef, setup: SetupFn) -> ProfilingContext {
        let resolved = params.resolve().unwrap();
        let quiet: LogHandler = Rc::new(|_, _| {});
        ProfilingContext::new(setup, resolved, None, Some(quiet)).unwrap()
    }

    /// Records every lifecycle event it sees, in order.
    struct EventRecorder {
        events: Rc<RefCell<Vec<String>>>,
    }

    impl Profiler for EventRecorder {
        fn on_start(&mut self, _ctx: &mut ProfilingContext) -> Result<(), BoxError> {
            self.events.borrow_mut().push("start".into());
            Ok(())
        }

        fn on_scene(&mut self, _ctx: &mut ProfilingContext, scene: &mut Scene) -> Result<(), BoxError> {
            self.events
                .borrow_mut()
                .push(format!("scene[{}]", format_coordinates(scene.coordinates())));
            Ok(())
        }

        fn on_case(
            &mut self,
            _ctx: &mut ProfilingContext,
            case: &mut BenchCase,
            _metrics: &mut Metrics,
        ) -> Result<(), BoxError> {
            self.events
                .borrow_mut()
                .push(format!("case[{}#{}]", case.name, case.id().unwrap()));
            Ok(())
        }

        fn on_finish(&mut self, _ctx: &mut ProfilingContext) -> Result<(), BoxError> {
            self.events.borrow_mut().push("finish".into());
            Ok(())
        }
    }

    use crate::suite::BenchCase;

    #[test]
    fn test_lifecycle_ordering_and_case_ids() {
        let params = ParamsDef::new().param("n", [1, 2]);
        let mut ctx = context_for(
            params,
            Box::new(|scene| {
                scene.bench("a", || ())?;
                scene.bench("b", || ())?;
                Ok(())
            }),
        );

        let events = Rc::new(RefCell::new(Vec::new()));
        let mut profilers: Vec<Box<dyn Profiler>> = vec![Box::new(EventRecorder {
            events: Rc::clone(&events),
        })];
        ctx.run(&mut profilers).unwrap();

        assert_eq!(
            *events.borrow(),
            [
                "start",
                "scene[n=1]",
                "case[a#0]",
                "case[b#1]",
                "scene[n=2]",
                "case[a#2]",
                "case[b#3]",
                "finish",
            ]
        );

        let (scenes, _, _) = ctx.take_output();
        assert_eq!(scenes.len(), 2);
        assert_eq!(scenes[0].len(), 2);
        assert_eq!(scenes[0][0].name, "a");
    }

    #[test]
    fn test_running_twice_fails() {
        let mut ctx = context_for(ParamsDef::new(), Box::new(|_| Ok(())));
        let mut profilers: Vec<Box<dyn Profiler>> = Vec::new();
        ctx.run(&mut profilers).unwrap();
        let err = ctx.run(&mut profilers).unwrap_err();
        assert!(err.source().unwrap().to_string().contains("at most once"));
    }

    #[test]
    fn test_setup_error_carries_coordinates() {
        let params = ParamsDef::new().param("mode", ["ok", "broken"]);
        let mut ctx = context_for(
            params,
            Box::new(|scene| {
                if scene.param("mode") == &crate::types::BenchValue::from("broken") {
                    return Err("cannot prepare data".into());
                }
                scene.bench("noop", || ())?;
                Ok(())
            }),
        );

        let mut profilers: Vec<Box<dyn Profiler>> = Vec::new();
        let err = ctx.run(&mut profilers).unwrap_err();
        let coords = err.coordinates().unwrap();
        assert_eq!(format_coordinates(coords), "mode=broken");
        assert!(err.source().unwrap().to_string().contains("cannot prepare"));
    }

    #[test]
    fn test_teardown_runs_on_workload_panic() {
        let torn_down = Rc::new(RefCell::new(0));
        let observed = Rc::clone(&torn_down);
        let mut ctx = context_for(
            ParamsDef::new(),
            Box::new(move |scene| {
                let counter = Rc::clone(&observed);
                scene.teardown(move || *counter.borrow_mut() += 1);
                scene.bench("explodes", || -> () { panic!("kaboom") })?;
                Ok(())
            }),
        );

        /// Drives each case once, so workload panics surface.
        struct InvokeAll;
        impl Profiler for InvokeAll {
            fn on_case(
                &mut self,
                _ctx: &mut ProfilingContext,
                case: &mut BenchCase,
                _metrics: &mut Metrics,
            ) -> Result<(), BoxError> {
                case.invoke().map(|_| ())
            }
        }

        let mut profilers: Vec<Box<dyn Profiler>> = vec![Box::new(InvokeAll)];
        let err = ctx.run(&mut profilers).unwrap_err();
        assert!(err.coordinates().is_some());
        assert_eq!(*torn_down.borrow(), 1);
    }

    #[test]
    fn test_notes_and_metric_registry() {
        let mut ctx = context_for(ParamsDef::new(), Box::new(|_| Ok(())));
        ctx.note(NoteKind::Warn, "something degraded", Some(3));
        ctx.define_metric(crate::profiler::MetricDescriptor::plain("x", "{number}"));
        ctx.define_metric(crate::profiler::MetricDescriptor::plain("x", "{number} ops"));

        let (_, notes, meta) = ctx.take_output();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].case_id, Some(3));
        // Last write wins.
        assert_eq!(meta["x"].format, "{number} ops");
    }
}
