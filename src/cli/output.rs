//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying plans, run
//! reports, state, and outputs in text or JSON form.

use colored::Colorize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::graph::DependencyGraph;
use crate::planner::{ActionOutcome, ActionType, ApplyReport, Plan};
use crate::state::{DeploymentUnitState, RunStatus};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Plan action row for table display.
#[derive(Tabled)]
struct PlanActionRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Reason")]
    reason: String,
}

/// Resource record row for table display.
#[derive(Tabled)]
struct RecordRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Physical ID")]
    physical_id: String,
    #[tabled(rename = "Updated")]
    updated: String,
}

/// Output attribute row for table display.
#[derive(Tabled)]
struct OutputRow {
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Attribute")]
    attribute: String,
    #[tabled(rename = "Value")]
    value: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a provisioning plan for display.
    #[must_use]
    pub fn format_plan(&self, plan: &Plan, detailed: bool) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(plan).unwrap_or_default(),
            OutputFormat::Text => Self::format_plan_text(plan, detailed),
        }
    }

    /// Formats a plan as text.
    fn format_plan_text(plan: &Plan, detailed: bool) -> String {
        if plan.is_empty() {
            return format!(
                "{} No changes required - state matches the configuration.\n",
                "\u{2713}".green()
            );
        }

        let mut output = String::new();

        let _ = write!(output, "\nProvisioning plan\n");
        let _ = write!(
            output,
            "   Config hash: {}\n\n",
            &plan.config_hash[..8.min(plan.config_hash.len())]
        );

        let rows: Vec<PlanActionRow> = plan
            .actions
            .iter()
            .enumerate()
            .map(|(i, a)| PlanActionRow {
                index: i + 1,
                action: Self::format_action_type(a.action_type, a.part_of_replacement),
                resource: a.name.clone(),
                kind: a.kind.clone(),
                reason: Self::truncate(&a.reason, 40),
            })
            .collect();

        let table = Table::new(rows).to_string();
        output.push_str(&table);
        output.push('\n');

        let _ = write!(
            output,
            "\nPlan: {} to create, {} to update, {} to delete, {} unchanged\n",
            plan.create_count().to_string().green(),
            plan.update_count().to_string().yellow(),
            plan.delete_count().to_string().red(),
            plan.unchanged.len()
        );

        if detailed {
            for action in &plan.actions {
                if action.changes.is_empty() {
                    continue;
                }
                let _ = write!(output, "\n{}:\n", action.description());
                for change in &action.changes {
                    let _ = writeln!(
                        output,
                        "   {} {} -> {}",
                        change.key,
                        Self::value_text(change.old.as_ref()),
                        Self::value_text(change.new.as_ref())
                    );
                }
            }
        }

        output
    }

    /// Formats a run report for display.
    #[must_use]
    pub fn format_report(&self, report: &ApplyReport) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Text => Self::format_report_text(report),
        }
    }

    /// Formats a run report as text.
    fn format_report_text(report: &ApplyReport) -> String {
        let mut output = String::new();

        for result in &report.results {
            let line = match &result.outcome {
                ActionOutcome::Succeeded => {
                    format!("{} {}", "\u{2713}".green(), result.action.description())
                }
                ActionOutcome::Failed { message } => format!(
                    "{} {}: {message}",
                    "\u{2717}".red(),
                    result.action.description()
                ),
                ActionOutcome::Skipped { reason } => format!(
                    "{} {} (skipped: {reason})",
                    "\u{26a0}".yellow(),
                    result.action.description()
                ),
            };
            let _ = writeln!(output, "   {line}");
        }

        let status = match report.status {
            RunStatus::FullyApplied => "fully applied".green().to_string(),
            RunStatus::PartiallyApplied => "partially applied".yellow().to_string(),
            RunStatus::Failed => "failed".red().to_string(),
            RunStatus::NoOp => "nothing to do".dimmed().to_string(),
        };

        let _ = write!(
            output,
            "\nRun {status}: {} applied, {} failed, {} skipped\n",
            report.succeeded_count(),
            report.failed_count(),
            report.skipped_count()
        );

        output
    }

    /// Formats deployment unit state for display.
    #[must_use]
    pub fn format_state(&self, state: &DeploymentUnitState) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(state).unwrap_or_default(),
            OutputFormat::Text => Self::format_state_text(state),
        }
    }

    /// Formats state as text.
    fn format_state_text(state: &DeploymentUnitState) -> String {
        let mut output = String::new();

        let _ = write!(output, "\nState: {}/{}\n\n", state.project, state.environment);
        let _ = writeln!(output, "   Version: {}", state.version);
        let _ = writeln!(
            output,
            "   Config hash: {}",
            &state.config_hash[..8.min(state.config_hash.len())]
        );
        let _ = writeln!(output, "   Last updated: {}", state.last_updated);
        let _ = writeln!(output, "   Resources: {}", state.records.len());

        if !state.records.is_empty() {
            let rows: Vec<RecordRow> = state
                .records
                .values()
                .map(|r| RecordRow {
                    name: r.name.clone(),
                    kind: r.kind.clone(),
                    physical_id: Self::truncate(&r.physical_id, 24),
                    updated: r.updated_at.format("%Y-%m-%d %H:%M").to_string(),
                })
                .collect();

            output.push('\n');
            output.push_str(&Table::new(rows).to_string());
            output.push('\n');
        }

        if !state.history.is_empty() {
            let _ = writeln!(output, "\n   Recent runs:");
            for entry in state.history.iter().rev().take(5) {
                let mark = match entry.status {
                    RunStatus::FullyApplied | RunStatus::NoOp => "\u{2713}",
                    RunStatus::PartiallyApplied => "\u{26a0}",
                    RunStatus::Failed => "\u{2717}",
                };
                let _ = writeln!(
                    output,
                    "     {mark} {} - {} ({} resources)",
                    entry.timestamp.format("%Y-%m-%d %H:%M"),
                    entry.status,
                    entry.resources.len()
                );
            }
        }

        output
    }

    /// Formats output attributes for display, optionally restricted to one
    /// resource.
    #[must_use]
    pub fn format_outputs(&self, state: &DeploymentUnitState, name: Option<&str>) -> String {
        let records: Vec<_> = state
            .records
            .values()
            .filter(|r| name.is_none_or(|n| r.name == n))
            .collect();

        match self.format {
            OutputFormat::Json => {
                let mut map = serde_json::Map::new();
                for record in records {
                    let mut outputs = record.outputs.clone();
                    outputs.insert(
                        String::from("id"),
                        serde_json::Value::String(record.physical_id.clone()),
                    );
                    map.insert(record.name.clone(), serde_json::Value::Object(outputs));
                }
                serde_json::to_string_pretty(&map).unwrap_or_default()
            }
            OutputFormat::Text => {
                if records.is_empty() {
                    return String::from("No outputs available.\n");
                }

                let mut rows = Vec::new();
                for record in records {
                    rows.push(OutputRow {
                        resource: record.name.clone(),
                        attribute: String::from("id"),
                        value: record.physical_id.clone(),
                    });
                    for (attribute, value) in &record.outputs {
                        rows.push(OutputRow {
                            resource: record.name.clone(),
                            attribute: attribute.clone(),
                            value: Self::value_text(Some(value)),
                        });
                    }
                }

                let mut output = Table::new(rows).to_string();
                output.push('\n');
                output
            }
        }
    }

    /// Formats the dependency graph for display.
    #[must_use]
    pub fn format_graph(&self, graph: &DependencyGraph) -> String {
        match self.format {
            OutputFormat::Json => {
                let mut map = serde_json::Map::new();
                for name in graph.topo_order() {
                    let deps: Vec<serde_json::Value> = graph
                        .dependencies_of(name)
                        .into_iter()
                        .map(|d| serde_json::Value::String(d.to_string()))
                        .collect();
                    map.insert(name.clone(), serde_json::Value::Array(deps));
                }
                serde_json::to_string_pretty(&map).unwrap_or_default()
            }
            OutputFormat::Text => {
                let mut output = String::from("\nDependency order:\n");
                for (i, name) in graph.topo_order().iter().enumerate() {
                    let deps = graph.dependencies_of(name);
                    if deps.is_empty() {
                        let _ = writeln!(output, "   {}. {name}", i + 1);
                    } else {
                        let _ = writeln!(
                            output,
                            "   {}. {name} (after {})",
                            i + 1,
                            deps.join(", ")
                        );
                    }
                }
                output
            }
        }
    }

    /// Formats an action type with color.
    fn format_action_type(action_type: ActionType, part_of_replacement: bool) -> String {
        match action_type {
            ActionType::Create if part_of_replacement => "+create (replace)".green().to_string(),
            ActionType::Create => "+create".green().to_string(),
            ActionType::Update => "~update".yellow().to_string(),
            ActionType::Delete if part_of_replacement => "-delete (replace)".red().to_string(),
            ActionType::Delete => "-delete".red().to_string(),
        }
    }

    /// Renders a JSON value compactly.
    fn value_text(value: Option<&serde_json::Value>) -> String {
        match value {
            None => String::from("(none)"),
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }

    /// Truncates a string to a maximum number of characters, cutting only
    /// on character boundaries.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            return s.to_string();
        }
        let keep = max_len.saturating_sub(3);
        let cut = s.char_indices().nth(keep).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..cut])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::PlanAction;

    fn sample_plan() -> Plan {
        Plan {
            created_at: chrono::Utc::now(),
            config_hash: String::from("abcdef1234567890"),
            actions: vec![PlanAction {
                action_type: ActionType::Create,
                name: String::from("vpc"),
                kind: String::from("network"),
                reason: String::from("not yet provisioned"),
                physical_id: None,
                changes: vec![],
                part_of_replacement: false,
            }],
            unchanged: vec![],
        }
    }

    #[test]
    fn test_empty_plan_text() {
        let formatter = OutputFormatter::new(OutputFormat::Text);
        let text = formatter.format_plan(&Plan::empty("hash"), false);
        assert!(text.contains("No changes required"));
    }

    #[test]
    fn test_plan_text_contains_actions_and_summary() {
        let formatter = OutputFormatter::new(OutputFormat::Text);
        let text = formatter.format_plan(&sample_plan(), false);
        assert!(text.contains("vpc"));
        assert!(text.contains("to create"));
    }

    #[test]
    fn test_truncate_cuts_on_char_boundaries() {
        let id = "r\u{e9}seau-d\u{e9}ploy\u{e9}-\u{e0}-paris-tr\u{e8}s-long";
        let out = OutputFormatter::truncate(id, 10);
        assert!(out.ends_with("..."));
        assert_eq!(out.chars().count(), 10);

        assert_eq!(OutputFormatter::truncate("\u{e9}t\u{e9}", 10), "\u{e9}t\u{e9}");
    }

    #[test]
    fn test_plan_json_is_valid() {
        let formatter = OutputFormatter::new(OutputFormat::Json);
        let json = formatter.format_plan(&sample_plan(), false);
        let parsed: serde_json::Value = serde_json::from_str(&json).expect("valid json");
        assert_eq!(parsed["actions"][0]["name"], "vpc");
    }
}
