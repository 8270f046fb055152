//! Flattening of multi-toolchain results into a sortable, groupable table
//! indexed by variable coordinates.
//!
//! Each row carries the display values of every variable (`Name`, then
//! `Builder`/`Executor` when any result has them, then the user parameters
//! in declaration order) plus explicit indices into a metrics arena and the
//! current sort order; nothing rides along in hidden keys. Rows are built
//! by walking every toolchain result in its canonical cross-product order,
//! which is what lets notes re-bind by `toolchain offset + case id`.

use std::collections::HashMap;
use std::error::Error;
use std::fmt;

use crate::context::NoteKind;
use crate::params::Coordinates;
use crate::profiler::{MetricDescriptor, Metrics};
use crate::runner::{Baseline, ToolchainResult};

/// One flattened row: a case measured under one coordinate tuple.
#[derive(Debug, Clone)]
pub struct FlatRow {
    values: HashMap<String, String>,
    metrics_idx: usize,
    index: usize,
}

impl FlatRow {
    /// The display value of one variable.
    pub fn get(&self, variable: &str) -> Option<&str> {
        self.values.get(variable).map(String::as_str)
    }

    /// The case name (the `Name` variable).
    pub fn name(&self) -> &str {
        self.get("Name").unwrap_or("")
    }

    /// The mixed-radix index under the current sort order.
    pub fn index(&self) -> usize {
        self.index
    }
}

/// A note re-bound to its flattened row.
#[derive(Debug, Clone)]
pub struct SummaryNote {
    /// Severity.
    pub kind: NoteKind,
    /// The message text.
    pub text: String,
    /// Position of the referenced row in build order, if the note had a
    /// case id.
    pub row: Option<usize>,
}

/// An unknown variable passed to a summary query.
#[derive(Debug, PartialEq, Eq)]
pub struct UnknownVariable(
    /// The variable name that was not found.
    pub String,
);

impl fmt::Display for UnknownVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown summary variable {:?}", self.0)
    }
}

impl Error for UnknownVariable {}

struct Axis {
    var_idx: usize,
    weight: usize,
}

/// The flattened result table over one suite's toolchain results.
pub struct SummaryTable {
    vars: Vec<(String, Vec<String>)>,
    rows: Vec<FlatRow>,
    metrics: Vec<Metrics>,
    notes: Vec<SummaryNote>,
    meta: HashMap<String, MetricDescriptor>,
    baseline: Option<Baseline>,
    order: Vec<String>,
    axes: Vec<Axis>,
    index_to_row: HashMap<usize, usize>,
}

impl SummaryTable {
    /// Flatten a list of toolchain results for one suite.
    ///
    /// Results are expected to share one parameter definition; rows missing
    /// a variable (for example `Builder` on a result that has none) display
    /// as `"(none)"`.
    pub fn new(results: &[ToolchainResult]) -> Self {
        let mut vars: Vec<(String, Vec<String>)> = vec![("Name".to_string(), Vec::new())];
        let any_builder = results.iter().any(|r| r.builder.is_some());
        let any_executor = results.iter().any(|r| r.executor.is_some());
        if any_builder {
            vars.push(("Builder".to_string(), Vec::new()));
        }
        if any_executor {
            vars.push(("Executor".to_string(), Vec::new()));
        }
        for result in results {
            for (key, names) in &result.result.param_def {
                let position = match vars.iter().position(|(var, _)| var == key) {
                    Some(position) => position,
                    None => {
                        vars.push((key.clone(), Vec::new()));
                        vars.len() - 1
                    }
                };
                let entry = &mut vars[position].1;
                for name in names {
                    if !entry.contains(name) {
                        entry.push(name.clone());
                    }
                }
            }
        }

        let mut rows = Vec::new();
        let mut metrics = Vec::new();
        let mut notes = Vec::new();
        let mut meta = HashMap::new();
        let mut baseline = None;

        for result in results {
            let offset = rows.len();
            let combos = display_combinations(&result.result.param_def);
            for (coords, scene) in combos.iter().zip(&result.result.scenes) {
                for case in scene {
                    let mut values = HashMap::new();
                    values.insert("Name".to_string(), case.name.clone());
                    record_var(&mut vars, "Name", &case.name);
                    if any_builder {
                        let label = result.builder.clone().unwrap_or_else(|| "(none)".into());
                        record_var(&mut vars, "Builder", &label);
                        values.insert("Builder".to_string(), label);
                    }
                    if any_executor {
                        let label = result.executor.clone().unwrap_or_else(|| "(none)".into());
                        record_var(&mut vars, "Executor", &label);
                        values.insert("Executor".to_string(), label);
                    }
                    for (key, value) in coords {
                        values.insert(key.clone(), value.clone());
                    }
                    rows.push(FlatRow {
                        values,
                        metrics_idx: metrics.len(),
                        index: 0,
                    });
                    metrics.push(case.metrics.clone());
                }
            }

            for note in &result.result.notes {
                notes.push(SummaryNote {
                    kind: note.kind,
                    text: note.text.clone(),
                    row: note.case_id.map(|id| offset + id as usize),
                });
            }
            for (key, descriptor) in &result.result.meta {
                meta.insert(key.clone(), descriptor.clone());
            }
            // Later toolchains overwrite earlier baselines; see baseline().
            if result.result.baseline.is_some() {
                baseline = result.result.baseline.clone();
            }
        }

        let order: Vec<String> = vars.iter().map(|(key, _)| key.clone()).collect();
        let mut table = Self {
            vars,
            rows,
            metrics,
            notes,
            meta,
            baseline,
            order: Vec::new(),
            axes: Vec::new(),
            index_to_row: HashMap::new(),
        };
        // Index under the declaration order, but keep rows in build order
        // until sort() is asked for; build order is part of the contract.
        table.reindex(order);
        table
    }

    /// Observed variables and their ordered value sets. `Name` comes first.
    pub fn vars(&self) -> &[(String, Vec<String>)] {
        &self.vars
    }

    /// The rows, in the current sort order.
    pub fn rows(&self) -> &[FlatRow] {
        &self.rows
    }

    /// Merged metric descriptors from every toolchain result.
    pub fn meta(&self) -> &HashMap<String, MetricDescriptor> {
        &self.meta
    }

    /// Notes from every toolchain result, re-bound to rows.
    pub fn notes(&self) -> &[SummaryNote] {
        &self.notes
    }

    /// The baseline to compute ratios against.
    ///
    /// When several toolchain results carry a baseline, the last one wins
    /// and earlier ones are silently overwritten.
    pub fn baseline(&self) -> Option<&Baseline> {
        self.baseline.as_ref()
    }

    /// The variable order the current indexing was computed under.
    pub fn sort_order(&self) -> &[String] {
        &self.order
    }

    /// The metrics behind a row.
    pub fn metrics_of(&self, row: &FlatRow) -> &Metrics {
        &self.metrics[row.metrics_idx]
    }

    /// Resolve a note's row reference.
    pub fn note_row(&self, note: &SummaryNote) -> Option<&FlatRow> {
        let target = note.row?;
        self.rows.iter().find(|row| row.metrics_idx == target)
    }

    /// Sort the table by the given variable order.
    ///
    /// Each row's index becomes a mixed-radix number whose digits are the
    /// positions of the row's values in their variables' value sets, most
    /// significant first in the given order. Every variable must appear
    /// exactly once.
    pub fn sort(&mut self, order: &[&str]) -> Result<(), UnknownVariable> {
        for name in order {
            if !self.vars.iter().any(|(key, _)| key == name) {
                return Err(UnknownVariable((*name).to_string()));
            }
        }
        if let Some(missing) = self
            .vars
            .iter()
            .map(|(key, _)| key.as_str())
            .find(|key| !order.contains(key))
        {
            return Err(UnknownVariable(missing.to_string()));
        }
        if order.len() != self.vars.len() {
            // All names known and none missing, so one must be repeated.
            let mut repeated = "";
            for (i, name) in order.iter().enumerate() {
                if order[..i].contains(name) {
                    repeated = *name;
                    break;
                }
            }
            return Err(UnknownVariable(repeated.to_string()));
        }
        self.reindex(order.iter().map(|s| s.to_string()).collect());
        self.rows.sort_by_key(|row| row.index);
        // Positions changed with the row order.
        self.index_to_row = self
            .rows
            .iter()
            .enumerate()
            .map(|(position, row)| (row.index, position))
            .collect();
        Ok(())
    }

    fn reindex(&mut self, order: Vec<String>) {
        let mut axes: Vec<Axis> = order
            .iter()
            .map(|name| Axis {
                var_idx: self
                    .vars
                    .iter()
                    .position(|(key, _)| key == name)
                    .expect("order was validated against vars"),
                weight: 0,
            })
            .collect();
        let mut weight = 1usize;
        for axis in axes.iter_mut().rev() {
            axis.weight = weight;
            weight *= self.vars[axis.var_idx].1.len().max(1);
        }

        for row in &mut self.rows {
            let mut index = 0usize;
            for axis in &axes {
                let (key, values) = &self.vars[axis.var_idx];
                let digit = row
                    .get(key)
                    .and_then(|value| values.iter().position(|v| v == value))
                    .unwrap_or(0);
                index += digit * axis.weight;
            }
            row.index = index;
        }

        self.index_to_row = self
            .rows
            .iter()
            .enumerate()
            .map(|(position, row)| (row.index, position))
            .collect();
        self.order = order;
        self.axes = axes;
    }

    fn index_for(&self, coords: &[(&str, &str)]) -> Option<usize> {
        let mut index = 0usize;
        for axis in &self.axes {
            let (key, values) = &self.vars[axis.var_idx];
            let (_, value) = coords.iter().find(|(coord, _)| *coord == key.as_str())?;
            let digit = values.iter().position(|v| v == value)?;
            index += digit * axis.weight;
        }
        Some(index)
    }

    /// The row at a full coordinate tuple, if one was observed.
    pub fn find(&self, coords: &[(&str, &str)]) -> Option<&FlatRow> {
        let index = self.index_for(coords)?;
        self.index_to_row.get(&index).map(|&pos| &self.rows[pos])
    }

    /// The row sequence as `axis` sweeps its values, other coordinates fixed.
    pub fn find_all(
        &self,
        coords: &[(&str, &str)],
        axis: &str,
    ) -> Result<Vec<Option<&FlatRow>>, UnknownVariable> {
        let (_, values) = self
            .vars
            .iter()
            .find(|(key, _)| key == axis)
            .ok_or_else(|| UnknownVariable(axis.to_string()))?;
        Ok(values
            .iter()
            .map(|value| {
                let mut swept: Vec<(&str, &str)> = coords
                    .iter()
                    .filter(|(key, _)| *key != axis)
                    .copied()
                    .collect();
                swept.push((axis, value.as_str()));
                self.find(&swept)
            })
            .collect())
    }

    /// Group rows that differ only in the ignored axis.
    ///
    /// The key is the row index with the ignored axis's digit contribution
    /// subtracted, so each group collects one row per value of that axis.
    pub fn group(&self, ignore: &str) -> Result<HashMap<usize, Vec<&FlatRow>>, UnknownVariable> {
        let axis = self
            .axes
            .iter()
            .find(|axis| self.vars[axis.var_idx].0 == ignore)
            .ok_or_else(|| UnknownVariable(ignore.to_string()))?;
        let (key, values) = &self.vars[axis.var_idx];

        let mut groups: HashMap<usize, Vec<&FlatRow>> = HashMap::new();
        for row in &self.rows {
            let digit = row
                .get(key)
                .and_then(|value| values.iter().position(|v| v == value))
                .unwrap_or(0);
            groups
                .entry(row.index - digit * axis.weight)
                .or_default()
                .push(row);
        }
        Ok(groups)
    }
}

impl fmt::Debug for SummaryTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SummaryTable")
            .field("vars", &self.vars.len())
            .field("rows", &self.rows.len())
            .field("notes", &self.notes.len())
            .finish()
    }
}

fn record_var(vars: &mut [(String, Vec<String>)], key: &str, value: &str) {
    if let Some((_, values)) = vars.iter_mut().find(|(var, _)| var.as_str() == key) {
        if !values.iter().any(|v| v == value) {
            values.push(value.to_string());
        }
    }
}

/// Expand a `(key, display names)` definition into coordinate tuples,
/// first key slowest, matching the driver's scene order.
fn display_combinations(param_def: &[(String, Vec<String>)]) -> Vec<Coordinates> {
    let mut combos: Vec<Coordinates> = vec![Vec::new()];
    for (key, values) in param_def {
        let mut expanded = Vec::with_capacity(combos.len() * values.len());
        for combo in &combos {
            for value in values {
                let mut entry = combo.clone();
                entry.push((key.clone(), value.clone()));
                expanded.push(entry);
            }
        }
        combos = expanded;
    }
    combos
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Note;
    use crate::profiler::{CaseResult, MetricValue};
    use crate::runner::RunSuiteResult;
    use std::collections::BTreeMap;

    fn case(name: &str, value: f64) -> CaseResult {
        let mut metrics = Metrics::new();
        metrics.insert("time".into(), MetricValue::Samples(vec![value]));
        CaseResult {
            name: name.into(),
            metrics,
        }
    }

    /// Two cases across sizes 10 and 20; one scene per size.
    fn simple_result() -> RunSuiteResult {
        RunSuiteResult {
            name: "s".into(),
            param_def: vec![("size".into(), vec!["10".into(), "20".into()])],
            notes: vec![Note {
                kind: NoteKind::Warn,
                text: "slow case".into(),
                case_id: Some(3),
            }],
            meta: BTreeMap::new(),
            scenes: vec![
                vec![case("fast", 1.0), case("slow", 2.0)],
                vec![case("fast", 3.0), case("slow", 4.0)],
            ],
            baseline: None,
        }
    }

    #[test]
    fn test_rows_follow_cross_product_order() {
        let table = SummaryTable::new(&[simple_result().into()]);
        assert_eq!(table.rows().len(), 4);
        let names: Vec<_> = table
            .rows()
            .iter()
            .map(|row| format!("{}@{}", row.name(), row.get("size").unwrap()))
            .collect();
        assert_eq!(names, ["fast@10", "slow@10", "fast@20", "slow@20"]);
    }

    #[test]
    fn test_vars_seed_name_first() {
        let table = SummaryTable::new(&[simple_result().into()]);
        let vars: Vec<_> = table.vars().iter().map(|(key, _)| key.as_str()).collect();
        assert_eq!(vars, ["Name", "size"]);
        assert_eq!(table.vars()[0].1, ["fast", "slow"]);
        assert_eq!(table.vars()[1].1, ["10", "20"]);
    }

    #[test]
    fn test_find_by_coordinates() {
        let table = SummaryTable::new(&[simple_result().into()]);
        let row = table.find(&[("Name", "slow"), ("size", "20")]).unwrap();
        assert_eq!(
            table.metrics_of(row)["time"],
            MetricValue::Samples(vec![4.0])
        );
        assert!(table.find(&[("Name", "slow"), ("size", "99")]).is_none());
    }

    #[test]
    fn test_sort_reorders_by_given_axes() {
        let mut table = SummaryTable::new(&[simple_result().into()]);
        table.sort(&["size", "Name"]).unwrap();
        let names: Vec<_> = table
            .rows()
            .iter()
            .map(|row| format!("{}@{}", row.name(), row.get("size").unwrap()))
            .collect();
        assert_eq!(names, ["fast@10", "slow@10", "fast@20", "slow@20"]);

        table.sort(&["Name", "size"]).unwrap();
        let names: Vec<_> = table
            .rows()
            .iter()
            .map(|row| format!("{}@{}", row.name(), row.get("size").unwrap()))
            .collect();
        assert_eq!(names, ["fast@10", "fast@20", "slow@10", "slow@20"]);

        assert!(table.sort(&["Name"]).is_err());
        assert!(table.sort(&["Name", "bogus"]).is_err());
    }

    #[test]
    fn test_find_all_sweeps_axis() {
        let mut table = SummaryTable::new(&[simple_result().into()]);
        table.sort(&["Name", "size"]).unwrap();
        let swept = table
            .find_all(&[("Name", "fast"), ("size", "10")], "size")
            .unwrap();
        let times: Vec<_> = swept
            .iter()
            .map(|row| table.metrics_of(row.unwrap())["time"].clone())
            .collect();
        assert_eq!(
            times,
            [
                MetricValue::Samples(vec![1.0]),
                MetricValue::Samples(vec![3.0])
            ]
        );
    }

    #[test]
    fn test_group_collapses_ignored_axis() {
        let table = SummaryTable::new(&[simple_result().into()]);
        let groups = table.group("Name").unwrap();
        assert_eq!(groups.len(), 2);
        for rows in groups.values() {
            assert_eq!(rows.len(), 2);
            let size = rows[0].get("size");
            assert!(rows.iter().all(|row| row.get("size") == size));
        }
    }

    #[test]
    fn test_note_binds_to_offset_plus_case_id() {
        let table = SummaryTable::new(&[simple_result().into()]);
        let note = &table.notes()[0];
        let row = table.note_row(note).unwrap();
        // case_id 3 is the fourth measured case: slow@20.
        assert_eq!(row.name(), "slow");
        assert_eq!(row.get("size"), Some("20"));
    }

    #[test]
    fn test_multiple_toolchains_offset_notes_and_builder_var() {
        let mut first = ToolchainResult::from(simple_result());
        first.builder = Some("bundler-a".into());
        let mut second = ToolchainResult::from(simple_result());
        second.builder = Some("bundler-b".into());

        let table = SummaryTable::new(&[first, second]);
        assert_eq!(table.rows().len(), 8);
        let vars: Vec<_> = table.vars().iter().map(|(key, _)| key.as_str()).collect();
        assert_eq!(vars, ["Name", "Builder", "size"]);

        // The second toolchain's note lands in its own row range.
        let note = &table.notes()[1];
        let row = table.note_row(note).unwrap();
        assert_eq!(row.get("Builder"), Some("bundler-b"));
        assert_eq!(row.name(), "slow");
    }

    #[test]
    fn test_baseline_last_writer_wins() {
        let mut first = simple_result();
        first.baseline = Some(Baseline {
            variable: "size".into(),
            value: "10".into(),
        });
        let mut second = simple_result();
        second.baseline = Some(Baseline {
            variable: "size".into(),
            value: "20".into(),
        });
        let table = SummaryTable::new(&[first.into(), second.into()]);
        assert_eq!(table.baseline().unwrap().value, "20");
    }
}
