//! Markdown report generation
//!
//! Human-readable report of a crawl run: run metadata, statistics, and a
//! per-page table with the provenance of each extraction.

use crate::crawler::CrawlRunResult;
use crate::output::stats::CrawlStatistics;
use std::fs::File;
use std::io::Write;
use std::path::Path;

const MAX_LISTED_DOMAINS: usize = 50;

/// Writes the markdown report of `run` to `output_path`
pub fn generate_markdown_report(run: &CrawlRunResult, output_path: &Path) -> std::io::Result<()> {
    let markdown = format_markdown_report(run);

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Formats a crawl run as markdown
pub fn format_markdown_report(run: &CrawlRunResult) -> String {
    let stats = CrawlStatistics::from_run(run);
    let mut md = String::new();

    md.push_str("# Sumi-Harvest Crawl Report\n\n");

    md.push_str("## Run Information\n\n");
    md.push_str(&format!("- **Start URL**: {}\n", run.start_url));
    md.push_str(&format!("- **Started**: {}\n", run.start_time.to_rfc3339()));
    if let Some(end) = run.end_time {
        md.push_str(&format!("- **Finished**: {}\n", end.to_rfc3339()));
    }
    md.push_str(&format!(
        "- **Duration**: {:.2} seconds\n",
        run.elapsed_ms as f64 / 1000.0
    ));
    md.push_str(&format!("- **Status**: {}\n\n", run.status.as_str()));

    md.push_str("## Overall Statistics\n\n");
    md.push_str(&format!("- **Pages Visited**: {}\n", stats.pages_visited));
    md.push_str(&format!("- **Succeeded**: {}\n", stats.pages_succeeded));
    md.push_str(&format!("- **Failed**: {}\n", stats.pages_failed));
    md.push_str(&format!("- **Links Found**: {}\n", stats.total_links));
    md.push_str(&format!("- **Degraded Pages**: {}\n", stats.degraded_pages));
    md.push_str(&format!(
        "- **Success Rate**: {:.2}%\n\n",
        stats.success_rate()
    ));

    if !stats.depth_breakdown.is_empty() {
        md.push_str("## Depth Breakdown\n\n");
        md.push_str("| Depth | Pages |\n");
        md.push_str("|-------|-------|\n");
        for (depth, count) in &stats.depth_breakdown {
            md.push_str(&format!("| {} | {} |\n", depth, count));
        }
        md.push('\n');
    }

    if !stats.method_breakdown.is_empty() {
        md.push_str("## Extraction Methods\n\n");
        md.push_str("| Method | Pages |\n");
        md.push_str("|--------|-------|\n");
        for (method, count) in &stats.method_breakdown {
            md.push_str(&format!("| {} | {} |\n", method, count));
        }
        md.push('\n');
    }

    if !stats.error_summary.is_empty() {
        md.push_str("## Error Summary\n\n");
        md.push_str("| Error Kind | Count |\n");
        md.push_str("|------------|-------|\n");
        for (kind, count) in &stats.error_summary {
            md.push_str(&format!("| {} | {} |\n", kind, count));
        }
        md.push('\n');
    }

    if !run.pages.is_empty() {
        md.push_str("## Pages\n\n");
        md.push_str("| URL | Depth | Result | Source | Links |\n");
        md.push_str("|-----|-------|--------|--------|-------|\n");
        for page in &run.pages {
            let result = if page.extraction.success { "ok" } else { "failed" };
            md.push_str(&format!(
                "| {} | {} | {} | {} | {} |\n",
                page.url,
                page.depth,
                result,
                escape_cell(&page.extraction.source),
                page.outbound_links.len()
            ));
        }
        md.push('\n');
    }

    if !stats.discovered_domains.is_empty() {
        md.push_str("## Discovered Domains\n\n");
        for domain in stats.discovered_domains.iter().take(MAX_LISTED_DOMAINS) {
            md.push_str(&format!("- {}\n", domain));
        }
        if stats.discovered_domains.len() > MAX_LISTED_DOMAINS {
            md.push_str(&format!(
                "\n... and {} more\n",
                stats.discovered_domains.len() - MAX_LISTED_DOMAINS
            ));
        }
        md.push('\n');
    }

    md
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|")
}
