use console::{style, Emoji};

use crate::services::aggregate::{FileStat, LargestReport};
use crate::services::dispatch::{ExecutionResult, RunSummary};
use crate::utils::bytes::format_bytes;

pub struct Symbols;
impl Symbols {
    pub const SUCCESS: Emoji<'static, 'static> = Emoji("✔", "+");
    pub const ERROR: Emoji<'static, 'static> = Emoji("✖", "x");
    pub const WARNING: Emoji<'static, 'static> = Emoji("⚠", "!");
}

/// Echo of one finished host: name in green and its output, or the failure in red.
pub fn print_host_result(result: &ExecutionResult) {
    if result.succeeded {
        println!("{}", style(result.host.as_str()).green().bold());
        if !result.output.is_empty() {
            println!("{}", result.output);
        }
        return;
    }
    let detail = result
        .error_detail()
        .unwrap_or_else(|| "unknown failure".to_string());
    println!(
        "{} {}",
        style(Symbols::ERROR).red(),
        style(format!("{}: {}", result.host, detail)).red().bold()
    );
}

pub fn print_results(results: &[ExecutionResult]) {
    for result in results {
        let status = if result.succeeded {
            style(Symbols::SUCCESS).green()
        } else {
            style(Symbols::ERROR).red()
        };
        println!("{} {} ({}ms)", status, result.host, result.duration_ms);
        if result.succeeded {
            for line in result.output.lines() {
                println!("    {}", line);
            }
        } else if let Some(detail) = result.error_detail() {
            for line in detail.lines() {
                println!("    {}", style(line).red());
            }
        }
    }
}

pub fn format_largest_line(entry: &FileStat) -> String {
    let hosts: Vec<&str> = entry
        .contributing_hosts
        .iter()
        .map(|host| host.as_str())
        .collect();
    format!(
        "{}\t{}\t[{}]",
        format_bytes(entry.size_bytes),
        entry.path,
        hosts.join(" ")
    )
}

pub fn print_largest(report: &LargestReport) {
    for entry in &report.entries {
        let line = format_largest_line(entry);
        if entry.size_mismatch {
            println!("{} {}", line, style("(sizes differ)").yellow());
        } else {
            println!("{}", line);
        }
    }
    for warning in &report.warnings {
        println!(
            "{} {}",
            style(Symbols::WARNING).yellow(),
            style(format!(
                "{}: skipped line {} ({}): {}",
                warning.host, warning.line_number, warning.reason, warning.line
            ))
            .yellow()
        );
    }
}

pub fn print_summary(summary: &RunSummary) {
    let line = format!(
        "{} hosts: {} succeeded, {} failed",
        summary.total, summary.succeeded, summary.failed
    );
    if summary.failed == 0 {
        println!("{} {}", style(Symbols::SUCCESS).green(), line);
    } else {
        println!("{} {}", style(Symbols::WARNING).yellow(), style(line).yellow());
    }
}
