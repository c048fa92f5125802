//! `circuit check`: validate a configuration file.

use std::path::Path;
use std::process;

use serde::Serialize;

use crate::settings::read_settings;
use crate::{report_error, OutputFormat};

#[derive(Debug, Serialize)]
struct CheckReport {
    valid: bool,
    port: u16,
    actors: usize,
    actions: usize,
    circuits: Vec<CircuitSummary>,
}

#[derive(Debug, Serialize)]
struct CircuitSummary {
    id: String,
    title: String,
    active: bool,
    ordered_flow: bool,
    allow_backtrack: bool,
    steps: Vec<String>,
    statuses: usize,
}

pub(crate) fn cmd_check(file: &Path, output: OutputFormat, quiet: bool) {
    let settings = match read_settings(file) {
        Ok(s) => s,
        Err(e) => {
            report_error(&e, output, quiet);
            process::exit(1);
        }
    };

    let registry = match settings.workflow.build_registry() {
        Ok(r) => r,
        Err(e) => {
            report_error(&format!("invalid configuration: {e}"), output, quiet);
            process::exit(1);
        }
    };

    let report = CheckReport {
        valid: true,
        port: settings.server.port,
        actors: settings.workflow.actors.len(),
        actions: registry.actions().count(),
        circuits: registry
            .circuits()
            .map(|c| CircuitSummary {
                id: c.id.clone(),
                title: c.title.clone(),
                active: c.is_active,
                ordered_flow: c.has_ordered_flow,
                allow_backtrack: c.allow_backtrack,
                steps: c.steps.iter().map(|s| s.id.clone()).collect(),
                statuses: c.steps.iter().map(|s| s.statuses.len()).sum(),
            })
            .collect(),
    };
    tracing::debug!(
        path = %file.display(),
        circuits = report.circuits.len(),
        "configuration checked"
    );

    if quiet {
        return;
    }
    match output {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&report)
                .unwrap_or_else(|e| format!("{{\"error\": \"serialization: {}\"}}", e));
            println!("{}", json);
        }
        OutputFormat::Text => {
            println!("{}: ok", file.display());
            println!(
                "  {} circuits, {} actions, {} actors",
                report.circuits.len(),
                report.actions,
                report.actors
            );
            for c in &report.circuits {
                let flow = if c.ordered_flow { "ordered" } else { "free" };
                let state = if c.active { "active" } else { "inactive" };
                println!(
                    "  - {} ({}): {} flow, {}, {} steps, {} statuses",
                    c.id,
                    c.title,
                    flow,
                    state,
                    c.steps.len(),
                    c.statuses
                );
            }
        }
    }
}
