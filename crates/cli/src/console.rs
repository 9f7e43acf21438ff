//! Console rendering for verbose runs.
//!
//! Progress is driven entirely by coordinator events. Concurrent analysts
//! finish in any order, so each result block is tagged with its company.

use scrivener_core::swarm::{SwarmEvent, SwarmEventKind};
use scrivener_core::usage::UsageSummary;
use std::path::Path;

const WIDE: usize = 80;
const NARROW: usize = 60;

pub fn header() -> String {
    let rule = "=".repeat(WIDE);
    format!(
        "\n{rule}\nMULTI-AGENT RESEARCH SYSTEM\nAI Investment Analysis: Talk vs Walk\n{rule}"
    )
}

pub fn completion(report_path: &Path, elapsed_secs: f64) -> String {
    let rule = "=".repeat(WIDE);
    format!(
        "\n{rule}\nANALYSIS COMPLETE\n{rule}\n\n✓ Report saved to: {}\n✓ Time elapsed: {:.1} seconds",
        report_path.display(),
        elapsed_secs
    )
}

/// CapEx text cut to 60 characters for the progress line
pub fn capex_preview(capex: &str) -> String {
    if capex.chars().count() > 60 {
        let cut: String = capex.chars().take(60).collect();
        format!("{}...", cut)
    } else {
        capex.to_string()
    }
}

/// `1234567` -> `1,234,567`
pub fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Console line(s) for an event, if it has any
pub fn render_event(event: &SwarmEvent) -> Option<String> {
    let data = event.data.as_ref();
    match event.kind {
        SwarmEventKind::PhaseStarted => {
            let data = data?;
            Some(format!(
                "\n[PHASE {}] {}\n{}",
                data["phase"].as_u64()?,
                data["title"].as_str()?,
                "-".repeat(WIDE)
            ))
        }
        SwarmEventKind::PhaseCompleted => {
            let data = data?;
            match data["phase"].as_u64()? {
                1 => Some(format!(
                    "  ✓ Located documents for {} companies",
                    data["count"].as_u64()?
                )),
                2 => match data["failed"].as_u64() {
                    Some(failed) if failed > 0 => Some(format!(
                        "\n  ⚠ {} of {} analyses failed",
                        failed,
                        data["count"].as_u64()?
                    )),
                    _ => None,
                },
                3 => Some("  ✓ Report synthesis complete".to_string()),
                _ => None,
            }
        }
        SwarmEventKind::AgentStarted => {
            let company = event.company.as_deref()?;
            let data = data?;
            Some(format!(
                "\n  [{}/{}] Analyzing {}...",
                data["index"].as_u64()?,
                data["total"].as_u64()?,
                company
            ))
        }
        SwarmEventKind::AgentCompleted | SwarmEventKind::AgentFailed => {
            let company = event.company.as_deref()?;
            let data = data?;
            let mut lines = vec![
                format!(
                    "      • [{}] Gen AI mentions: {}",
                    company,
                    data["gen_ai_mentions"].as_u64()?
                ),
                format!("      • ML mentions: {}", data["ml_mentions"].as_u64()?),
                format!(
                    "      • AI CapEx: {}",
                    capex_preview(data["capex_ai"].as_str().unwrap_or_default())
                ),
            ];
            if let Some(error) = data["error"].as_str() {
                lines.push(format!("      ✗ {} analysis failed: {}", company, error));
            }
            Some(lines.join("\n"))
        }
        _ => None,
    }
}

pub fn usage_summary(summary: &UsageSummary) -> String {
    let rule = "=".repeat(NARROW);
    let mut out = vec![
        format!("\n{rule}"),
        "TOKEN USAGE SUMMARY".to_string(),
        rule.clone(),
        format!("\nTotal Tokens: {}", group_thousands(summary.total_tokens)),
        format!("  Input:  {}", group_thousands(summary.total_input_tokens)),
        format!("  Output: {}", group_thousands(summary.total_output_tokens)),
        "\nBy Agent:".to_string(),
    ];
    for agent in &summary.agents {
        out.push(format!("  {}:", agent.agent));
        out.push(format!("    Input:  {}", group_thousands(agent.usage.input_tokens)));
        out.push(format!("    Output: {}", group_thousands(agent.usage.output_tokens)));
        out.push(format!("    Total:  {}", group_thousands(agent.usage.total_tokens)));
    }
    out.push(format!("\nEstimated Cost: ${:.4}", summary.estimated_cost));
    out.push(format!("{rule}\n"));
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use scrivener_core::swarm::PipelineStage;
    use scrivener_core::usage::UsageLedger;
    use serde_json::json;

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1000), "1,000");
        assert_eq!(group_thousands(1234567), "1,234,567");
    }

    #[test]
    fn test_capex_preview() {
        assert_eq!(capex_preview("$7B"), "$7B");
        let long = "x".repeat(75);
        assert_eq!(capex_preview(&long), format!("{}...", "x".repeat(60)));
    }

    #[test]
    fn test_phase_header() {
        let event = SwarmEvent::phase(SwarmEventKind::PhaseStarted, PipelineStage::Locating);
        let line = render_event(&event).unwrap();
        assert!(line.starts_with("\n[PHASE 1] Document Location\n---"));
    }

    #[test]
    fn test_located_line() {
        let mut event = SwarmEvent::phase(SwarmEventKind::PhaseCompleted, PipelineStage::Locating);
        if let Some(serde_json::Value::Object(map)) = event.data.as_mut() {
            map.insert("count".into(), json!(6));
        }
        assert_eq!(
            render_event(&event).as_deref(),
            Some("  ✓ Located documents for 6 companies")
        );
    }

    #[test]
    fn test_company_lines() {
        let started = SwarmEvent::new(SwarmEventKind::AgentStarted, "IBMAnalyst")
            .with_company("IBM")
            .with_data(json!({"index": 2, "total": 6}));
        assert_eq!(render_event(&started).as_deref(), Some("\n  [2/6] Analyzing IBM..."));

        let done = SwarmEvent::new(SwarmEventKind::AgentCompleted, "IBMAnalyst")
            .with_company("IBM")
            .with_data(json!({"gen_ai_mentions": 4, "ml_mentions": 9, "capex_ai": "Not disclosed"}));
        assert_eq!(
            render_event(&done).as_deref(),
            Some("      • [IBM] Gen AI mentions: 4\n      • ML mentions: 9\n      • AI CapEx: Not disclosed")
        );
    }

    #[test]
    fn test_coordinator_level_agent_events_are_silent() {
        let event = SwarmEvent::new(SwarmEventKind::AgentStarted, "LeadDocumentLocator");
        assert!(render_event(&event).is_none());
    }

    #[test]
    fn test_usage_summary() {
        let ledger = UsageLedger::new();
        ledger.track("SynthesisAgent", "claude-sonnet-4-5-20250929", 1_000, 2_000);
        let text = usage_summary(&ledger.summary());
        assert!(text.contains("Total Tokens: 3,000"));
        assert!(text.contains("  SynthesisAgent:\n    Input:  1,000"));
        assert!(text.contains("Estimated Cost: $0.0330"));
    }

    #[test]
    fn test_interleaved_results_name_their_company() {
        let failed = SwarmEvent::new(SwarmEventKind::AgentFailed, "SAPAnalyst")
            .with_company("SAP")
            .with_data(json!({
                "gen_ai_mentions": 0,
                "ml_mentions": 0,
                "capex_ai": "Error in analysis",
                "error": "internal server error"
            }));
        let done = SwarmEvent::new(SwarmEventKind::AgentCompleted, "CiscoAnalyst")
            .with_company("Cisco")
            .with_data(json!({"gen_ai_mentions": 7, "ml_mentions": 2, "capex_ai": "$1B"}));

        let sap = render_event(&failed).unwrap();
        let cisco = render_event(&done).unwrap();
        assert!(sap.starts_with("      • [SAP] Gen AI mentions: 0"));
        assert!(sap.ends_with("      ✗ SAP analysis failed: internal server error"));
        assert!(cisco.starts_with("      • [Cisco] Gen AI mentions: 7"));
    }
}
