//! Output renderers and formatting helpers for CLI commands.
//!
//! Results go to stdout; logs and diagnostics stay on stderr.

use std::fmt::Write as _;

use anyhow::anyhow;
use serde::Serialize;
use swc_core::tools::{
    HashComparison, HitKind, RemovalPlan, RemovalReport, SearchHit, SizeComparison,
};
use swc_core::PoolReport;
use swc_telemetry::MetricsSnapshot;
use tracing::warn;

use crate::cli::OutputFormat;
use crate::client::{CliError, CliResult};

#[derive(Serialize)]
struct RunSummary<'a> {
    command: &'a str,
    report: &'a PoolReport,
    metrics: &'a MetricsSnapshot,
}

pub(crate) fn emit_json<T: Serialize + ?Sized>(value: &T) -> CliResult<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|err| CliError::failure(anyhow!("failed to format JSON: {err}")))?;
    println!("{text}");
    Ok(())
}

/// End-of-run summary: jobs processed and bytes moved.
pub(crate) fn render_run_summary(
    command: &str,
    report: &PoolReport,
    metrics: &MetricsSnapshot,
    format: OutputFormat,
) -> CliResult<()> {
    match format {
        OutputFormat::Json => emit_json(&RunSummary {
            command,
            report,
            metrics,
        }),
        OutputFormat::Table => {
            print!("{}", summary_table(command, report, metrics));
            Ok(())
        }
    }
}

fn summary_table(command: &str, report: &PoolReport, metrics: &MetricsSnapshot) -> String {
    let mut text = String::new();
    let _ = writeln!(text, "{command}: {} completed, {} failed", report.completed, report.failed);
    let _ = writeln!(
        text,
        "bytes transferred: {} (up {}, down {})",
        format_bytes(metrics.bytes_transferred()),
        format_bytes(metrics.bytes_uploaded),
        format_bytes(metrics.bytes_downloaded)
    );
    if metrics.walk_errors > 0 {
        let _ = writeln!(text, "unreadable directories: {}", metrics.walk_errors);
    }
    text
}

pub(crate) fn render_size_comparison(
    comparison: &SizeComparison,
    format: OutputFormat,
) -> CliResult<()> {
    match format {
        OutputFormat::Json => emit_json(comparison),
        OutputFormat::Table => {
            println!(
                "local: {} ({} bytes)",
                format_bytes(comparison.local_bytes),
                comparison.local_bytes
            );
            println!(
                "store: {} ({} bytes in {} objects)",
                format_bytes(comparison.store_bytes),
                comparison.store_bytes,
                comparison.object_count
            );
            if comparison.local_errors > 0 {
                println!("unreadable local entries: {}", comparison.local_errors);
            }
            println!(
                "{}",
                if comparison.identical() {
                    "sizes are identical"
                } else {
                    "sizes differ"
                }
            );
            Ok(())
        }
    }
}

pub(crate) fn render_removal_plan(plan: &RemovalPlan, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => emit_json(plan),
        OutputFormat::Table => {
            println!("{:>12} NAME", "BYTES");
            for entry in &plan.objects {
                println!("{:>12} {}", entry.bytes, entry.name);
            }
            println!(
                "{} objects, {} in {}",
                plan.objects.len(),
                format_bytes(plan.total_bytes()),
                plan.container
            );
            if plan.delete_container {
                println!("container {} would be deleted", plan.container);
            }
            Ok(())
        }
    }
}

pub(crate) fn render_removal_report(
    plan: &RemovalPlan,
    report: &RemovalReport,
    format: OutputFormat,
) -> CliResult<()> {
    match format {
        OutputFormat::Json => emit_json(report),
        OutputFormat::Table => {
            println!(
                "deleted {} objects ({}), {} failed",
                report.objects.completed,
                format_bytes(report.objects.bytes),
                report.objects.failed
            );
            if report.container_deleted {
                println!("container {} deleted", plan.container);
            }
            Ok(())
        }
    }
}

pub(crate) fn render_hash_comparison(
    comparison: &HashComparison,
    format: OutputFormat,
) -> CliResult<()> {
    match format {
        OutputFormat::Json => emit_json(comparison),
        OutputFormat::Table => {
            print!("{}", hash_table(comparison));
            Ok(())
        }
    }
}

fn hash_table(comparison: &HashComparison) -> String {
    let mut text = String::new();
    let layout = if comparison.segmented {
        "segmented"
    } else {
        "single"
    };
    let _ = writeln!(text, "object: {} ({layout})", comparison.object);
    for check in &comparison.segments {
        let _ = writeln!(
            text,
            "{} {} {}",
            if check.matches() { "ok  " } else { "DIFF" },
            check.actual,
            check.segment
        );
    }
    if let Some(local) = &comparison.local_md5 {
        let _ = writeln!(text, "local md5: {local}");
    }
    if let Some(stored) = &comparison.store_md5 {
        let _ = writeln!(text, "store md5: {stored}");
    }
    if !comparison.size_matches {
        let _ = writeln!(text, "sizes differ");
    }
    let _ = writeln!(
        text,
        "{}",
        if comparison.matches() {
            "checksums match"
        } else {
            "checksums differ"
        }
    );
    text
}

/// Print one search hit as it arrives.
pub(crate) fn render_search_hit(hit: &SearchHit, format: OutputFormat) {
    match format {
        OutputFormat::Json => match serde_json::to_string(hit) {
            Ok(line) => println!("{line}"),
            Err(err) => warn!(object = %hit.object, error = %err, "failed to format search hit"),
        },
        OutputFormat::Table => println!("{}", hit_line(hit)),
    }
}

fn hit_line(hit: &SearchHit) -> String {
    match hit.kind {
        HitKind::Name => format!("{} (name)", hit.object),
        HitKind::Body => format!(
            "{}:{}: {}",
            hit.object,
            hit.offset.unwrap_or_default(),
            hit.excerpt.as_deref().unwrap_or_default()
        ),
    }
}

#[must_use]
pub(crate) fn format_bytes(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    const MIB: f64 = KIB * 1024.0;
    const GIB: f64 = MIB * 1024.0;
    const TIB: f64 = GIB * 1024.0;
    let value = bytes_to_f64(bytes);
    if value >= TIB {
        format!("{:.2} TiB", value / TIB)
    } else if value >= GIB {
        format!("{:.2} GiB", value / GIB)
    } else if value >= MIB {
        format!("{:.2} MiB", value / MIB)
    } else if value >= KIB {
        format!("{:.2} KiB", value / KIB)
    } else {
        format!("{bytes} B")
    }
}

fn bytes_to_f64(value: u64) -> f64 {
    let high = u32::try_from(value >> 32).unwrap_or(u32::MAX);
    let low = u32::try_from(value & 0xFFFF_FFFF).unwrap_or(u32::MAX);
    f64::from(high) * 4_294_967_296.0 + f64::from(low)
}
