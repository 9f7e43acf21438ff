//! # Report Persistence
//!
//! Writes the synthesized markdown report (with front matter) and the usage
//! summary that goes alongside it.

use crate::usage::UsageSummary;
use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone};
use std::fmt::Display;
use std::path::{Path, PathBuf};

pub const REPORT_TITLE: &str = "AI Investment Analysis - Talk vs Walk";

/// `ai_investment_analysis_<YYYYmmdd_HHMMSS>.md`
pub fn default_filename<Tz: TimeZone>(now: &DateTime<Tz>) -> String
where
    Tz::Offset: Display,
{
    format!("ai_investment_analysis_{}.md", now.format("%Y%m%d_%H%M%S"))
}

/// Prefix `report` with its YAML front matter
pub fn with_front_matter<Tz: TimeZone>(report: &str, now: &DateTime<Tz>) -> String
where
    Tz::Offset: Display,
{
    format!(
        "---\ntitle: {}\ngenerated: {}\nanalysis_type: Multi-Agent Research System\n---\n\n{}",
        REPORT_TITLE,
        now.format("%Y-%m-%d %H:%M:%S"),
        report
    )
}

/// Save `report` under `output_dir`, creating the directory if needed.
/// Returns the written path.
pub async fn save_report<Tz: TimeZone>(
    output_dir: &Path,
    report: &str,
    filename: Option<&str>,
    now: &DateTime<Tz>,
) -> Result<PathBuf>
where
    Tz::Offset: Display,
{
    tokio::fs::create_dir_all(output_dir)
        .await
        .with_context(|| format!("Failed to create output directory {}", output_dir.display()))?;

    let name = match filename {
        Some(name) => name.to_string(),
        None => default_filename(now),
    };
    let path = output_dir.join(name);

    tokio::fs::write(&path, with_front_matter(report, now))
        .await
        .with_context(|| format!("Failed to write report to {}", path.display()))?;

    tracing::info!("Report saved to: {}", path.display());
    Ok(path)
}

/// Path of the usage summary written next to `report_path`
pub fn summary_path(report_path: &Path) -> PathBuf {
    report_path.with_extension("usage.json")
}

pub async fn save_summary(report_path: &Path, summary: &UsageSummary) -> Result<PathBuf> {
    let path = summary_path(report_path);
    let json = serde_json::to_string_pretty(summary).context("Failed to serialize usage summary")?;
    tokio::fs::write(&path, json)
        .await
        .with_context(|| format!("Failed to write usage summary to {}", path.display()))?;
    Ok(path)
}
