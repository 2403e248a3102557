// Run reports: plain text for the terminal, JSON for files

use crate::pipeline::RunSummary;
use std::fs::File;
use std::io::Write;
use std::path::Path;

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Text,
    Json,
}

impl ReportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Some(ReportFormat::Text),
            "json" => Some(ReportFormat::Json),
            _ => None,
        }
    }

    /// Pick a format from a report path's extension, defaulting to text.
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_str)
            .unwrap_or(ReportFormat::Text)
    }
}

pub fn generate_report(summaries: &[RunSummary], format: ReportFormat) -> Result<String, serde_json::Error> {
    match format {
        ReportFormat::Text => Ok(generate_text_report(summaries)),
        ReportFormat::Json => generate_json_report(summaries),
    }
}

pub fn generate_text_report(summaries: &[RunSummary]) -> String {
    let mut report = String::new();

    report.push_str(RULE);
    report.push_str("\n                              EASEL ARCHIVE REPORT\n");
    report.push_str(RULE);
    report.push_str("\n\n");

    report.push_str(&format!(
        "Generated:    {}\n",
        chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    ));
    report.push_str(&format!("Inputs:       {}\n", summaries.len()));
    report.push_str(&format!(
        "Saved:        {}\n",
        summaries.iter().map(RunSummary::saved).sum::<usize>()
    ));
    report.push_str(&format!(
        "Skipped:      {}\n",
        summaries.iter().map(RunSummary::skipped).sum::<usize>()
    ));
    report.push_str(&format!(
        "Failed:       {}\n\n",
        summaries
            .iter()
            .map(|s| s.resolve_failed() + s.fetch_failed())
            .sum::<usize>()
    ));

    for summary in summaries {
        report.push_str(RULE);
        report.push('\n');
        report.push_str(&format!("## {}\n", summary.input_url));

        if let Some(ref error) = summary.error {
            report.push_str(&format!("  Error:       {}\n\n", error));
            continue;
        }

        if let Some(page_type) = summary.page_type {
            report.push_str(&format!("  Page type:   {}\n", page_type));
        }
        if let Some(ref folder) = summary.folder {
            report.push_str(&format!("  Folder:      {}\n", folder));
        }
        let source = if summary.from_cache { " (cached listing)" } else { "" };
        report.push_str(&format!("  Discovered:  {}{}\n", summary.discovered, source));
        if let Some(ref stop) = summary.walk_stop {
            report.push_str(&format!("  Walk ended:  {} on page {}\n", stop.reason, stop.page));
        }
        report.push_str(&format!(
            "  Outcome:     {} saved, {} skipped, {} resolve failed, {} fetch failed\n",
            summary.saved(),
            summary.skipped(),
            summary.resolve_failed(),
            summary.fetch_failed()
        ));
        report.push_str(&format!("  Duration:    {:.1}s\n\n", summary.elapsed_ms as f64 / 1000.0));

        for item in &summary.reports {
            report.push_str(&format!(
                "  [{:<14}] {} {}: {}\n",
                item.result.label(),
                item.record.id,
                item.record.title,
                item.result
            ));
        }
        if !summary.reports.is_empty() {
            report.push('\n');
        }
    }

    report.push_str(RULE);
    report.push_str("\n                                 End of Report\n");
    report.push_str(RULE);
    report.push('\n');

    report
}

pub fn generate_json_report(summaries: &[RunSummary]) -> Result<String, serde_json::Error> {
    let json_report = serde_json::json!({
        "report": {
            "metadata": {
                "generator": "Easel",
                "version": env!("CARGO_PKG_VERSION"),
                "generated_at": chrono::Utc::now().to_rfc3339(),
                "format": "json"
            },
            "summary": {
                "inputs": summaries.len(),
                "discovered": summaries.iter().map(|s| s.discovered).sum::<usize>(),
                "saved": summaries.iter().map(RunSummary::saved).sum::<usize>(),
                "skipped": summaries.iter().map(RunSummary::skipped).sum::<usize>(),
                "resolve_failed": summaries.iter().map(RunSummary::resolve_failed).sum::<usize>(),
                "fetch_failed": summaries.iter().map(RunSummary::fetch_failed).sum::<usize>(),
                "errors": summaries.iter().filter(|s| s.is_error()).count()
            },
            "runs": summaries
        }
    });

    serde_json::to_string_pretty(&json_report)
}

pub fn save_report(content: &str, path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}
