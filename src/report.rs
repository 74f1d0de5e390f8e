//! Text and JSON rendering of diagnosis reports

use crate::results::{InvocationRef, ProblemOccurrence};
use crate::service::DiagnosisReport;
use anyhow::Result;
use serde::Serialize;

/// Output format for diagnosis reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ReportFormat {
    /// Human-readable text (default)
    Text,
    /// JSON for machine parsing
    Json,
}

/// Render `reports` in the requested format
pub fn render(reports: &[DiagnosisReport], format: ReportFormat) -> Result<String> {
    match format {
        ReportFormat::Text => Ok(render_text(reports)),
        ReportFormat::Json => render_json(reports),
    }
}

fn describe(invocation: &InvocationRef) -> String {
    format!(
        "{} at {} ({:.1} ms)",
        invocation.method_ident, invocation.node, invocation.duration
    )
}

/// Multi-line summary of one occurrence
pub fn occurrence_summary(occurrence: &ProblemOccurrence) -> String {
    let structure = occurrence.cause_structure;
    let mut out = format!(
        "{} x{} (id {:016x})\n",
        structure.cause_type,
        structure.element_count,
        occurrence.id()
    );
    out.push_str(&format!(
        "   request root:    {}\n",
        describe(&occurrence.request_root)
    ));
    out.push_str(&format!(
        "   global context:  {}\n",
        describe(&occurrence.global_context)
    ));
    out.push_str(&format!(
        "   problem context: {}\n",
        describe(&occurrence.problem_context)
    ));
    match &occurrence.root_cause {
        Some(cause) => out.push_str(&format!(
            "   root cause:      {}, {} calls, {:.1} ms exclusive\n",
            cause.method_ident,
            cause.size(),
            cause.exclusive_time
        )),
        None => out.push_str("   root cause:      (none)\n"),
    }
    out
}

pub fn render_text(reports: &[DiagnosisReport]) -> String {
    let mut out = String::new();

    for report in reports {
        out.push_str(&format!("=== {} ===\n", report.label));
        match &report.outcome {
            Err(err) => out.push_str(&format!("FAILED: {}\n", err)),
            Ok(occurrences) if occurrences.is_empty() => {
                out.push_str("No performance problem found\n");
            }
            Ok(occurrences) => {
                out.push_str(&format!(
                    "{} problem occurrence(s)\n",
                    occurrences.len()
                ));
                for (i, occurrence) in occurrences.iter().enumerate() {
                    out.push_str(&format!("[{}] {}", i + 1, occurrence_summary(occurrence)));
                }
            }
        }
        out.push('\n');
    }

    out
}

#[derive(Debug, Serialize)]
struct JsonOccurrence<'a> {
    id: String,
    #[serde(flatten)]
    occurrence: &'a ProblemOccurrence,
}

#[derive(Debug, Serialize)]
struct JsonTraceReport<'a> {
    trace: &'a str,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    occurrences: Vec<JsonOccurrence<'a>>,
}

#[derive(Debug, Serialize)]
struct JsonReport<'a> {
    traces: Vec<JsonTraceReport<'a>>,
}

pub fn render_json(reports: &[DiagnosisReport]) -> Result<String> {
    let traces = reports
        .iter()
        .map(|report| match &report.outcome {
            Ok(occurrences) => JsonTraceReport {
                trace: &report.label,
                status: "ok",
                error: None,
                occurrences: occurrences
                    .iter()
                    .map(|occurrence| JsonOccurrence {
                        id: format!("{:016x}", occurrence.id()),
                        occurrence,
                    })
                    .collect(),
            },
            Err(err) => JsonTraceReport {
                trace: &report.label,
                status: "failed",
                error: Some(err.to_string()),
                occurrences: Vec::new(),
            },
        })
        .collect();

    Ok(serde_json::to_string_pretty(&JsonReport { traces })?)
}
