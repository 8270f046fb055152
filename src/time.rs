//! The time profiler: iteration-count calibration, warm-up, overhead
//! subtraction, loop unrolling for sub-microsecond work, zero-measurement
//! detection, and throughput conversion.
//!
//! All times are `f64` milliseconds from the monotonic [`Instant`] clock.
//! One *sample* times `count x unroll_factor` workload invocations; the
//! per-call figure divides the elapsed time by that product and subtracts
//! the estimated harness overhead. The profiler itself never discards a
//! sample; outlier trimming is a reporter's concern.

use std::cell::RefCell;
use std::error::Error;
use std::fmt;
use std::hint::black_box;
use std::rc::Rc;
use std::str::FromStr;
use std::time::{Duration, Instant};

use tokio::runtime::Runtime;

use crate::context::{NoteKind, ProfilingContext};
use crate::profiler::{MetricAnalysis, MetricDescriptor, MetricValue, Metrics, Profiler};
use crate::suite::{run_hooks, BenchCase, BoxError, HookFn, Workload};
use crate::types::BenchValue;

/// Warn-note text emitted when a workload is indistinguishable from a no-op.
pub const ZERO_MEASUREMENT_NOTE: &str =
    "The function duration is indistinguishable from the empty function duration.";

/// Metric key for per-call times in milliseconds.
pub const TIME_METRIC: &str = "time";

/// Metric key for converted throughput values.
pub const THROUGHPUT_METRIC: &str = "throughput";

fn duration_to_ms(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1e3
}

/// Milliseconds per one unit of the given time-unit suffix.
fn unit_to_ms(unit: &str) -> Option<f64> {
    match unit {
        "ns" => Some(1e-6),
        "us" => Some(1e-3),
        "ms" => Some(1.0),
        "s" => Some(1e3),
        "m" => Some(6e4),
        "h" => Some(3.6e6),
        _ => None,
    }
}

/// How many workload invocations one sample performs.
#[derive(Debug, Clone, PartialEq)]
pub enum Iterations {
    /// An exact inner count; must be a multiple of the unroll factor.
    Count(usize),
    /// A wall-clock target per sample; the count is calibrated at run time.
    Time(Duration),
}

impl Default for Iterations {
    fn default() -> Self {
        Iterations::Time(Duration::from_secs(1))
    }
}

impl From<usize> for Iterations {
    fn from(count: usize) -> Self {
        Iterations::Count(count)
    }
}

impl From<Duration> for Iterations {
    fn from(target: Duration) -> Self {
        Iterations::Time(target)
    }
}

/// Error parsing a duration string such as `"1s"` or `"165ms"`.
#[derive(Debug, PartialEq, Eq)]
pub struct DurationParseError(String);

impl fmt::Display for DurationParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid duration {:?}; expected <number><ns|us|ms|s|m|h>",
            self.0
        )
    }
}

impl Error for DurationParseError {}

impl FromStr for Iterations {
    type Err = DurationParseError;

    /// Parse a duration target like `"1s"`, `"165ms"`, or `"0.5m"`.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let trimmed = text.trim();
        let split = trimmed
            .find(|c: char| c.is_ascii_alphabetic())
            .ok_or_else(|| DurationParseError(text.to_string()))?;
        let (number, unit) = trimmed.split_at(split);
        let value: f64 = number
            .trim()
            .parse()
            .map_err(|_| DurationParseError(text.to_string()))?;
        let unit_ms = unit_to_ms(unit).ok_or_else(|| DurationParseError(text.to_string()))?;
        if !value.is_finite() || value < 0.0 {
            return Err(DurationParseError(text.to_string()));
        }
        Ok(Iterations::Time(Duration::from_secs_f64(value * unit_ms / 1e3)))
    }
}

/// Options of the [`TimeProfiler`].
///
/// Construct with struct-update syntax over the defaults:
///
/// ```
/// use scenebench::{Iterations, TimingOptions};
///
/// let options = TimingOptions {
///     samples: 20,
///     iterations: Iterations::Count(256),
///     ..TimingOptions::default()
/// };
/// assert_eq!(options.warmup, 5);
/// ```
#[derive(Debug, Clone)]
pub struct TimingOptions {
    /// Warm-up samples whose results are discarded (default 5).
    pub warmup: usize,
    /// Measured samples per case (default 10).
    pub samples: usize,
    /// Inner invocation count or wall-clock target (default 1 s).
    pub iterations: Iterations,
    /// Workload calls issued per loop iteration to amortise loop overhead
    /// (default 16). Not applied to cases with iteration hooks.
    pub unroll_factor: usize,
    /// Estimate and subtract the per-call cost of the harness itself
    /// (default true). Skipped for cases with iteration hooks.
    pub evaluate_overhead: bool,
    /// Convert per-call times to operations per this unit (e.g. `"s"`).
    pub throughput: Option<String>,
}

impl Default for TimingOptions {
    fn default() -> Self {
        Self {
            warmup: 5,
            samples: 10,
            iterations: Iterations::default(),
            unroll_factor: 16,
            evaluate_overhead: true,
            throughput: None,
        }
    }
}

/// Rejection reasons for [`TimingOptions`], raised before the run starts.
#[derive(Debug, PartialEq)]
pub enum TimingConfigError {
    /// `unroll_factor` was zero.
    UnrollFactor,
    /// An integer iteration count was zero.
    IterationCount,
    /// An integer iteration count was not divisible by the unroll factor.
    NotMultiple {
        /// The configured count.
        iterations: usize,
        /// The configured unroll factor.
        unroll_factor: usize,
    },
    /// A duration target was zero milliseconds.
    DurationNotPositive,
    /// `samples` was zero.
    Samples,
    /// The throughput unit was not a known time unit.
    ThroughputUnit(String),
}

impl fmt::Display for TimingConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimingConfigError::UnrollFactor => write!(f, "unroll_factor must be at least 1"),
            TimingConfigError::IterationCount => write!(f, "iterations must be at least 1"),
            TimingConfigError::NotMultiple {
                iterations,
                unroll_factor,
            } => write!(
                f,
                "iterations ({iterations}) must be a multiple of unroll_factor ({unroll_factor})"
            ),
            TimingConfigError::DurationNotPositive => {
                write!(f, "the iteration time target must be positive")
            }
            TimingConfigError::Samples => write!(f, "samples must be at least 1"),
            TimingConfigError::ThroughputUnit(unit) => {
                write!(f, "unknown throughput unit {unit:?}")
            }
        }
    }
}

impl Error for TimingConfigError {}

/// Times each sample: `count` loop iterations of `calls_per_iteration()`
/// workload invocations.
///
/// Four dispatch shapes, chosen by (iteration hooks, async flag). Without
/// hooks the inner loop issues `unroll` calls per iteration; with hooks
/// every invocation is bracketed individually and only in-workload time is
/// accumulated, so unrolling does not apply.
struct Invoker<'a> {
    workload: &'a mut Workload,
    hooks: Option<(Rc<RefCell<Vec<HookFn>>>, Rc<RefCell<Vec<HookFn>>>)>,
    unroll: usize,
    runtime: Rc<Runtime>,
}

impl Invoker<'_> {
    fn calls_per_iteration(&self) -> usize {
        if self.hooks.is_some() {
            1
        } else {
            self.unroll
        }
    }

    fn measure(&mut self, count: usize) -> f64 {
        let unroll = self.unroll;
        let runtime = Rc::clone(&self.runtime);
        match (&self.hooks, &mut *self.workload) {
            (None, Workload::Sync(workload)) => {
                let start = Instant::now();
                for _ in 0..count {
                    for _ in 0..unroll {
                        black_box(workload());
                    }
                }
                duration_to_ms(start.elapsed())
            }
            (None, Workload::Async(workload)) => runtime.block_on(async {
                let start = Instant::now();
                for _ in 0..count {
                    for _ in 0..unroll {
                        black_box(workload().await);
                    }
                }
                duration_to_ms(start.elapsed())
            }),
            (Some((before, after)), Workload::Sync(workload)) => {
                let mut in_workload = Duration::ZERO;
                for _ in 0..count {
                    run_hooks(before);
                    let start = Instant::now();
                    black_box(workload());
                    in_workload += start.elapsed();
                    run_hooks(after);
                }
                duration_to_ms(in_workload)
            }
            (Some((before, after)), Workload::Async(workload)) => runtime.block_on(async {
                let mut in_workload = Duration::ZERO;
                for _ in 0..count {
                    run_hooks(before);
                    let start = Instant::now();
                    black_box(workload().await);
                    in_workload += start.elapsed();
                    run_hooks(after);
                }
                duration_to_ms(in_workload)
            }),
        }
    }
}

/// Find the loop count whose sample time reaches a wall-clock target.
///
/// Doubles geometrically from 1 until one sample takes at least
/// `target_ms`, then scales the final count linearly to the target. The
/// count increases monotonically and terminates for any finite workload in
/// a logarithmic number of doublings.
fn calibrate_count(
    measure: &mut dyn FnMut(usize) -> f64,
    target_ms: f64,
    log: &mut dyn FnMut(String),
) -> usize {
    let mut count = 1usize;
    let mut elapsed = measure(count);
    log(format!("Calibration: {count} iterations took {elapsed:.3} ms"));
    while elapsed < target_ms {
        count *= 2;
        elapsed = measure(count);
        log(format!("Calibration: {count} iterations took {elapsed:.3} ms"));
    }
    ((count as f64 * target_ms / elapsed).ceil() as usize).max(1)
}

/// Outcome of the per-call sample sequence after overhead subtraction.
#[derive(Debug, PartialEq)]
enum Published {
    Time(Vec<f64>),
    Throughput(Vec<f64>),
    /// Every sample was at or below the overhead estimate.
    Zero,
}

fn publish_samples(throughput_ms: Option<f64>, samples: Vec<f64>) -> Published {
    if samples.iter().all(|&per_call| per_call <= 0.0) {
        return Published::Zero;
    }
    match throughput_ms {
        Some(unit_ms) => Published::Throughput(
            samples.iter().map(|&per_call| unit_ms / per_call).collect(),
        ),
        None => Published::Time(samples),
    }
}

/// The measurement engine: one metric per case, `time` or `throughput`.
#[derive(Debug)]
pub struct TimeProfiler {
    options: TimingOptions,
    /// Milliseconds per configured throughput unit, resolved at validation.
    throughput_ms: Option<f64>,
}

impl TimeProfiler {
    /// Validate options and build the profiler.
    ///
    /// All configuration rejections happen here, before any run starts.
    pub fn new(options: TimingOptions) -> Result<Self, TimingConfigError> {
        if options.unroll_factor == 0 {
            return Err(TimingConfigError::UnrollFactor);
        }
        if options.samples == 0 {
            return Err(TimingConfigError::Samples);
        }
        match &options.iterations {
            Iterations::Count(0) => return Err(TimingConfigError::IterationCount),
            Iterations::Count(n) if n % options.unroll_factor != 0 => {
                return Err(TimingConfigError::NotMultiple {
                    iterations: *n,
                    unroll_factor: options.unroll_factor,
                })
            }
            Iterations::Time(target) if duration_to_ms(*target) <= 0.0 => {
                return Err(TimingConfigError::DurationNotPositive)
            }
            _ => {}
        }
        let throughput_ms = match &options.throughput {
            Some(unit) => Some(
                unit_to_ms(unit)
                    .ok_or_else(|| TimingConfigError::ThroughputUnit(unit.clone()))?,
            ),
            None => None,
        };
        Ok(Self {
            options,
            throughput_ms,
        })
    }

    /// The profiler with [`TimingOptions::default`].
    pub fn with_defaults() -> Self {
        Self {
            throughput_ms: None,
            options: TimingOptions::default(),
        }
    }

    fn noop_workload(is_async: bool) -> Workload {
        if is_async {
            Workload::Async(Box::new(|| Box::pin(async { BenchValue::Unit })))
        } else {
            Workload::Sync(Box::new(|| BenchValue::Unit))
        }
    }
}

impl Profiler for TimeProfiler {
    fn on_start(&mut self, ctx: &mut ProfilingContext) -> Result<(), BoxError> {
        match &self.options.throughput {
            Some(unit) => ctx.define_metric(MetricDescriptor::analyzed(
                THROUGHPUT_METRIC,
                format!("{{number}} ops/{unit}"),
                MetricAnalysis::Statistics,
                false,
            )),
            None => ctx.define_metric(MetricDescriptor::analyzed(
                TIME_METRIC,
                "{duration.ms}",
                MetricAnalysis::Statistics,
                true,
            )),
        }
        Ok(())
    }

    fn on_case(
        &mut self,
        ctx: &mut ProfilingContext,
        case: &mut BenchCase,
        metrics: &mut Metrics,
    ) -> Result<(), BoxError> {
        let case_id = case.id();
        let is_async = case.is_async();
        let has_hooks = case.has_iteration_hooks();
        let runtime = case.runtime();
        let unroll = self.options.unroll_factor;

        let hooks = if has_hooks {
            Some(case.iteration_hooks())
        } else {
            None
        };
        let mut invoker = Invoker {
            workload: case.workload_mut(),
            hooks,
            unroll,
            runtime: Rc::clone(&runtime),
        };
        let calls_per_iteration = invoker.calls_per_iteration();

        let count = match &self.options.iterations {
            // Exact inner count: loop iterations x calls per iteration
            // always equals the configured number of invocations.
            Iterations::Count(n) => (n / calls_per_iteration).max(1),
            Iterations::Time(target) => {
                let target_ms = duration_to_ms(*target);
                calibrate_count(
                    &mut |count| invoker.measure(count),
                    target_ms,
                    &mut |line| ctx.debug(&line),
                )
            }
        };

        let mut overhead_per_call = 0.0;
        if self.options.evaluate_overhead && !has_hooks {
            ctx.debug("Estimating the overhead of an empty workload.");
            let mut noop = Self::noop_workload(is_async);
            let mut noop_invoker = Invoker {
                workload: &mut noop,
                hooks: None,
                unroll,
                runtime: Rc::clone(&runtime),
            };
            let floor = (0..self.options.samples)
                .map(|_| noop_invoker.measure(count))
                .fold(f64::INFINITY, f64::min);
            // System noise only ever inflates a sample, so the minimum is
            // the best estimate of pure dispatch cost.
            overhead_per_call = floor / (count * calls_per_iteration) as f64;
            ctx.debug(&format!("Overhead per call: {overhead_per_call:.6} ms"));
        }

        for round in 0..self.options.warmup {
            let elapsed = invoker.measure(count);
            ctx.debug(&format!("Warm-up {round}: {elapsed:.3} ms"));
        }

        let mut samples = Vec::with_capacity(self.options.samples);
        for round in 0..self.options.samples {
            let elapsed = invoker.measure(count);
            ctx.debug(&format!("Sample {round}: {elapsed:.3} ms"));
            samples.push(elapsed / (count * calls_per_iteration) as f64 - overhead_per_call);
        }

        match publish_samples(self.throughput_ms, samples) {
            Published::Zero => {
                metrics.insert(TIME_METRIC.to_string(), MetricValue::Samples(vec![0.0]));
                ctx.note(NoteKind::Warn, ZERO_MEASUREMENT_NOTE, case_id);
            }
            Published::Time(samples) => {
                metrics.insert(TIME_METRIC.to_string(), MetricValue::Samples(samples));
            }
            Published::Throughput(values) => {
                metrics.insert(THROUGHPUT_METRIC.to_string(), MetricValue::Samples(values));
            }
        }
        Ok(())
    }
}
