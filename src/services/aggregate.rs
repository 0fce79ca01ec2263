use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::errors::FleetErrorKind;
use crate::services::dispatch::ExecutionResult;
use crate::services::hosts::Host;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ListingLineError {
    #[error("missing path after size field")]
    MissingPath,
    #[error("size field {0:?} is not an unsigned integer")]
    InvalidSize(String),
}

/// How to settle a path whose size differs between hosts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SizePolicy {
    First,
    Min,
    #[default]
    Max,
}

impl SizePolicy {
    fn settle(self, current: u64, reported: u64) -> u64 {
        match self {
            SizePolicy::First => current,
            SizePolicy::Min => current.min(reported),
            SizePolicy::Max => current.max(reported),
        }
    }
}

impl FromStr for SizePolicy {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_lowercase().as_str() {
            "first" => Ok(SizePolicy::First),
            "min" => Ok(SizePolicy::Min),
            "max" => Ok(SizePolicy::Max),
            other => Err(format!(
                "unknown size policy '{}' (expected first, min or max)",
                other
            )),
        }
    }
}

impl fmt::Display for SizePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SizePolicy::First => "first",
            SizePolicy::Min => "min",
            SizePolicy::Max => "max",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileStat {
    pub path: String,
    pub size_bytes: u64,
    pub contributing_hosts: Vec<Host>,
    /// Set when contributing hosts reported different sizes.
    pub size_mismatch: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseWarning {
    /// Always [`FleetErrorKind::Parse`]; a bad line never fails the host.
    pub kind: FleetErrorKind,
    pub host: Host,
    pub line_number: usize,
    pub line: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LargestReport {
    pub entries: Vec<FileStat>,
    pub warnings: Vec<ParseWarning>,
    pub hosts_considered: usize,
    pub hosts_skipped: usize,
}

/// Parses one `<size> <path>` line. Blank lines yield `Ok(None)`.
/// The path is everything after the size field, so embedded spaces survive.
pub fn parse_listing_line(line: &str) -> Result<Option<(u64, &str)>, ListingLineError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let (size, rest) = trimmed
        .split_once(char::is_whitespace)
        .ok_or(ListingLineError::MissingPath)?;
    let path = rest.trim_start();
    if path.is_empty() {
        return Err(ListingLineError::MissingPath);
    }
    let size = size
        .parse::<u64>()
        .map_err(|_| ListingLineError::InvalidSize(size.to_string()))?;
    Ok(Some((size, path)))
}

/// Merges per-host listings by path and sorts by size descending, path
/// ascending on ties. Failed results are skipped; malformed lines become
/// warnings.
pub fn aggregate_largest(results: &[ExecutionResult], policy: SizePolicy) -> LargestReport {
    let mut by_path: HashMap<String, FileStat> = HashMap::new();
    let mut warnings = Vec::new();
    let mut hosts_considered = 0;
    let mut hosts_skipped = 0;

    for result in results {
        if !result.succeeded {
            hosts_skipped += 1;
            continue;
        }
        hosts_considered += 1;
        for (index, line) in result.output.lines().enumerate() {
            let (size, path) = match parse_listing_line(line) {
                Ok(Some(parsed)) => parsed,
                Ok(None) => continue,
                Err(err) => {
                    warnings.push(ParseWarning {
                        kind: FleetErrorKind::Parse,
                        host: result.host.clone(),
                        line_number: index + 1,
                        line: line.to_string(),
                        reason: err.to_string(),
                    });
                    continue;
                }
            };
            match by_path.get_mut(path) {
                Some(stat) => {
                    if stat.size_bytes != size {
                        stat.size_mismatch = true;
                    }
                    stat.size_bytes = policy.settle(stat.size_bytes, size);
                    if !stat.contributing_hosts.contains(&result.host) {
                        stat.contributing_hosts.push(result.host.clone());
                    }
                }
                None => {
                    by_path.insert(
                        path.to_string(),
                        FileStat {
                            path: path.to_string(),
                            size_bytes: size,
                            contributing_hosts: vec![result.host.clone()],
                            size_mismatch: false,
                        },
                    );
                }
            }
        }
    }

    let mut entries: Vec<FileStat> = by_path.into_values().collect();
    entries.sort_by(compare_entries);
    LargestReport {
        entries,
        warnings,
        hosts_considered,
        hosts_skipped,
    }
}

fn compare_entries(a: &FileStat, b: &FileStat) -> Ordering {
    b.size_bytes
        .cmp(&a.size_bytes)
        .then_with(|| a.path.cmp(&b.path))
}
