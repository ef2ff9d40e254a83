//! Run artifacts and terminal summary

use std::fmt::Write as _;
use std::path::Path;

use eyre::WrapErr;

use proxyfleet_core::{FleetOutcome, FleetReport};

/// Write `alias: link` lines, one per succeeded host
///
/// # Errors
/// Returns error if the file cannot be written
pub fn write_subscriptions(path: &Path, report: &FleetReport) -> eyre::Result<()> {
    let mut content = String::new();
    for line in report.subscription_lines() {
        content.push_str(&line);
        content.push('\n');
    }
    std::fs::write(path, content).wrap_err_with(|| format!("failed to write {}", path.display()))
}

/// Parse a subscriptions file back into `(alias, link)` pairs
///
/// Blank lines are ignored; lines without `: ` are skipped with a warning.
#[must_use]
pub fn parse_subscriptions(content: &str) -> Vec<(String, String)> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(index, line)| match line.split_once(": ") {
            Some((alias, link)) if !alias.trim().is_empty() => {
                Some((alias.trim().to_string(), link.trim().to_string()))
            }
            _ => {
                tracing::warn!(line = index + 1, "malformed subscription line skipped");
                None
            }
        })
        .collect()
}

/// Human-readable run summary
#[must_use]
pub fn summary(outcome: &FleetOutcome) -> String {
    let report = &outcome.report;
    let mut out = String::new();

    let _ = writeln!(
        out,
        "{} of {} hosts provisioned",
        report.succeeded.len(),
        report.total()
    );
    for result in &report.succeeded {
        let _ = writeln!(out, "  ok    {}", result.host.alias);
        for warning in &result.warnings {
            let _ = writeln!(out, "        warning: {warning}");
        }
    }
    for result in &report.failed {
        let reason = result.failure_reason().unwrap_or_default();
        let _ = writeln!(out, "  FAIL  {}: {reason}", result.host.alias);
    }
    for alias in &outcome.skipped_links {
        let _ = writeln!(out, "  skipped link of {alias}: unsupported or malformed");
    }

    let _ = writeln!(out, "{} proxies in routing config", outcome.routing.proxies.len());
    match &outcome.subscription_url {
        Some(url) => {
            let _ = writeln!(out, "subscription: {url}");
        }
        None if outcome.routing.proxies.is_empty() => {
            let _ = writeln!(out, "no usable links, published subscription left unchanged");
        }
        None => {
            let _ = writeln!(out, "subscription not published");
        }
    }
    out
}
