//! Reference plain-text reporter over a [`SummaryTable`].
//!
//! One column per variable, one per analysable metric (sample metrics
//! condense to `mean ± deviation`), and a ratio column against the
//! baseline row when the summary carries one. Attached notes print below
//! the table. Richer statistics belong to external reporters; this one
//! exists so a run is readable without any.

use colored::Colorize;

use crate::context::NoteKind;
use crate::format::format_value;
use crate::profiler::{MetricAnalysis, MetricDescriptor, MetricValue};
use crate::stats::{mean, std_dev};
use crate::summary::{FlatRow, SummaryTable};

/// Render the summary as an aligned text table with notes below.
pub fn render_table(table: &SummaryTable) -> String {
    let metric_columns = metric_columns(table);

    let mut header: Vec<String> = table
        .vars()
        .iter()
        .map(|(name, _)| name.clone())
        .collect();
    header.extend(metric_columns.iter().map(|d| d.key.clone()));
    let baseline_column = table.baseline().is_some() && !metric_columns.is_empty();
    if baseline_column {
        header.push("ratio".to_string());
    }

    let mut grid = vec![header];
    for row in table.rows() {
        let mut cells: Vec<String> = table
            .vars()
            .iter()
            .map(|(name, _)| row.get(name).unwrap_or("(none)").to_string())
            .collect();
        for descriptor in &metric_columns {
            cells.push(metric_cell(table, row, descriptor));
        }
        if baseline_column {
            cells.push(ratio_cell(table, row, &metric_columns[0]));
        }
        grid.push(cells);
    }

    let mut output = render_grid(&grid);
    for note in table.notes() {
        let prefix = match note.kind {
            NoteKind::Info => "[info]".cyan(),
            NoteKind::Warn => "[warn]".yellow(),
        };
        let target = table
            .note_row(note)
            .map(|row| format!(" ({})", row.name()))
            .unwrap_or_default();
        output.push_str(&format!("{} {}{}\n", prefix, note.text, target));
    }
    output
}

/// Analysable metrics, `time`/`throughput` first, then by key.
fn metric_columns(table: &SummaryTable) -> Vec<MetricDescriptor> {
    let mut columns: Vec<MetricDescriptor> = table
        .meta()
        .values()
        .filter(|d| d.analysis != MetricAnalysis::None)
        .cloned()
        .collect();
    columns.sort_by_key(|d| (d.analysis != MetricAnalysis::Statistics, d.key.clone()));
    columns
}

fn metric_cell(table: &SummaryTable, row: &FlatRow, descriptor: &MetricDescriptor) -> String {
    match table.metrics_of(row).get(&descriptor.key) {
        None => "-".to_string(),
        Some(MetricValue::Text(text)) => text.clone(),
        Some(MetricValue::Number(value)) => format_value(&descriptor.format, *value),
        Some(MetricValue::Samples(samples)) => {
            let center = format_value(&descriptor.format, mean(samples));
            if samples.len() < 2 {
                center
            } else {
                format!("{center} ± {}", format_value(&descriptor.format, std_dev(samples)))
            }
        }
    }
}

fn metric_mean(table: &SummaryTable, row: &FlatRow, key: &str) -> Option<f64> {
    match table.metrics_of(row).get(key)? {
        MetricValue::Number(value) => Some(*value),
        MetricValue::Samples(samples) if !samples.is_empty() => Some(mean(samples)),
        _ => None,
    }
}

fn ratio_cell(table: &SummaryTable, row: &FlatRow, descriptor: &MetricDescriptor) -> String {
    let Some(baseline) = table.baseline() else {
        return String::new();
    };
    let coords: Vec<(&str, &str)> = table
        .vars()
        .iter()
        .map(|(name, _)| {
            let value = if name == &baseline.variable {
                baseline.value.as_str()
            } else {
                row.get(name).unwrap_or("")
            };
            (name.as_str(), value)
        })
        .collect();

    let reference = table
        .find(&coords)
        .and_then(|base| metric_mean(table, base, &descriptor.key));
    let own = metric_mean(table, row, &descriptor.key);
    match (own, reference) {
        (Some(own), Some(reference)) if reference != 0.0 => {
            format!("{:.2}x", own / reference)
        }
        _ => "-".to_string(),
    }
}

fn render_grid(grid: &[Vec<String>]) -> String {
    let columns = grid.iter().map(Vec::len).max().unwrap_or(0);
    let mut widths = vec![0usize; columns];
    for row in grid {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let mut output = String::new();
    for (line, row) in grid.iter().enumerate() {
        let mut rendered = String::new();
        for (i, cell) in row.iter().enumerate() {
            rendered.push_str(cell);
            if i + 1 < row.len() {
                let pad = widths[i].saturating_sub(cell.chars().count()) + 2;
                rendered.extend(std::iter::repeat(' ').take(pad));
            }
        }
        output.push_str(rendered.trim_end());
        output.push('\n');
        if line == 0 {
            let total: usize = widths.iter().sum::<usize>() + 2 * widths.len().saturating_sub(1);
            output.push_str(&"-".repeat(total));
            output.push('\n');
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Note;
    use crate::profiler::{CaseResult, Metrics};
    use crate::runner::{Baseline, RunSuiteResult, ToolchainResult};
    use std::collections::BTreeMap;

    fn result_with_times() -> RunSuiteResult {
        let case = |name: &str, ms: f64| {
            let mut metrics = Metrics::new();
            metrics.insert("time".into(), MetricValue::Samples(vec![ms, ms]));
            CaseResult {
                name: name.into(),
                metrics,
            }
        };
        let mut meta = BTreeMap::new();
        meta.insert(
            "time".to_string(),
            MetricDescriptor::analyzed("time", "{duration.ms}", MetricAnalysis::Statistics, true),
        );
        RunSuiteResult {
            name: "s".into(),
            param_def: vec![("size".into(), vec!["10".into(), "20".into()])],
            notes: vec![Note {
                kind: NoteKind::Warn,
                text: "zero-ish".into(),
                case_id: Some(0),
            }],
            meta,
            scenes: vec![
                vec![case("for", 1.0), case("reduce", 2.0)],
                vec![case("for", 3.0), case("reduce", 6.0)],
            ],
            baseline: Some(Baseline {
                variable: "Name".into(),
                value: "for".into(),
            }),
        }
    }

    #[test]
    fn test_render_contains_rows_and_notes() {
        colored::control::set_override(false);
        let table = SummaryTable::new(&[ToolchainResult::from(result_with_times())]);
        let rendered = render_table(&table);

        assert!(rendered.contains("Name"), "{rendered}");
        assert!(rendered.contains("size"), "{rendered}");
        assert!(rendered.contains("reduce"), "{rendered}");
        assert!(rendered.contains("1 ms"), "{rendered}");
        assert!(rendered.contains("[warn] zero-ish (for)"), "{rendered}");
    }

    #[test]
    fn test_ratio_against_baseline_row() {
        colored::control::set_override(false);
        let table = SummaryTable::new(&[ToolchainResult::from(result_with_times())]);
        let rendered = render_table(&table);

        // reduce is 2x for at both sizes; the baseline rows read 1.00x.
        assert!(rendered.contains("2.00x"), "{rendered}");
        assert!(rendered.contains("1.00x"), "{rendered}");
    }
}
