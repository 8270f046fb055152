//! The profiler subscription surface and the metric data model.
//!
//! Profilers subscribe to the lifecycle events emitted by the profiling
//! context and contribute metrics, notes, and metric descriptors. For every
//! run each profiler sees `on_start` exactly once, then a strict
//! interleaving of `on_scene` and `on_case` matching the parameter
//! cross-product order, then `on_finish` exactly once.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::context::ProfilingContext;
use crate::params::format_coordinates;
use crate::suite::{BenchCase, BoxError, Scene};

/// A single metric value attached to a case.
///
/// Absence of a metric is absence of its key from the metrics map. Strings
/// are opaque labels; the core never interprets them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    /// A single number.
    Number(f64),
    /// An ordered sequence of numbers, e.g. raw measurement samples.
    Samples(Vec<f64>),
    /// A string label, passed through to reporters uninterpreted.
    Text(String),
}

/// Metrics recorded for one case, keyed by descriptor key.
pub type Metrics = BTreeMap<String, MetricValue>;

/// Metrics of one measured case, in a scene's registration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseResult {
    /// The case name.
    pub name: String,
    /// The metrics profilers recorded for it.
    pub metrics: Metrics,
}

/// Per-scene results: one entry per measured case, in registration order.
pub type SceneResult = Vec<CaseResult>;

/// How reporters should treat a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricAnalysis {
    /// Display only.
    None,
    /// Comparable across cases (ratios, deltas).
    Compare,
    /// Comparable, and the values are samples suitable for statistics.
    /// Implies [`Compare`](MetricAnalysis::Compare).
    Statistics,
}

/// Describes one metric key: how to format it and how to analyse it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDescriptor {
    /// The key this metric is stored under in case metrics.
    pub key: String,
    /// Format template, e.g. `"{duration.ms}"` or `"{number} ops/s"`.
    pub format: String,
    /// The analysis reporters may apply.
    pub analysis: MetricAnalysis,
    /// Direction of improvement; meaningful whenever analysis is not `None`.
    pub lower_is_better: bool,
}

impl MetricDescriptor {
    /// A display-only descriptor (no comparison direction needed).
    pub fn plain(key: impl Into<String>, format: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            format: format.into(),
            analysis: MetricAnalysis::None,
            lower_is_better: false,
        }
    }

    /// A descriptor with analysis enabled; the direction is mandatory.
    pub fn analyzed(
        key: impl Into<String>,
        format: impl Into<String>,
        analysis: MetricAnalysis,
        lower_is_better: bool,
    ) -> Self {
        Self {
            key: key.into(),
            format: format.into(),
            analysis,
            lower_is_better,
        }
    }
}

/// A subscriber to profiling lifecycle events.
///
/// All methods default to no-ops so a profiler only implements the events
/// it cares about. Any error aborts the run; when a scene is current the
/// error is wrapped with that scene's coordinates.
pub trait Profiler {
    /// Called once before the first scene is built.
    fn on_start(&mut self, ctx: &mut ProfilingContext) -> Result<(), BoxError> {
        let _ = ctx;
        Ok(())
    }

    /// Called for each scene after the suite's `setup` populated it.
    fn on_scene(&mut self, ctx: &mut ProfilingContext, scene: &mut Scene) -> Result<(), BoxError> {
        let _ = (ctx, scene);
        Ok(())
    }

    /// Called for each case; record metrics into `metrics`.
    fn on_case(
        &mut self,
        ctx: &mut ProfilingContext,
        case: &mut BenchCase,
        metrics: &mut Metrics,
    ) -> Result<(), BoxError> {
        let _ = (ctx, case, metrics);
        Ok(())
    }

    /// Called once after the last case.
    fn on_finish(&mut self, ctx: &mut ProfilingContext) -> Result<(), BoxError> {
        let _ = ctx;
        Ok(())
    }
}

/// Built-in profiler that narrates run progress through the log handler.
///
/// Always first in the profiler stack, so its lines precede measurement
/// output for the scene and case they announce.
#[derive(Debug, Default)]
pub struct DefaultEventLogger {
    scenes_seen: usize,
}

impl DefaultEventLogger {
    /// Create the event logger.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Profiler for DefaultEventLogger {
    fn on_scene(&mut self, ctx: &mut ProfilingContext, scene: &mut Scene) -> Result<(), BoxError> {
        self.scenes_seen += 1;
        let total = ctx.combination_count();
        ctx.info(&format!(
            "Scene {}/{}: {}, {} case(s)",
            self.scenes_seen,
            total,
            format_coordinates(scene.coordinates()),
            scene.cases.len(),
        ));
        Ok(())
    }

    fn on_case(
        &mut self,
        ctx: &mut ProfilingContext,
        case: &mut BenchCase,
        _metrics: &mut Metrics,
    ) -> Result<(), BoxError> {
        ctx.info(&format!("  Case {:?}", case.name));
        Ok(())
    }
}
