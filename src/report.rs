use std::collections::BTreeMap;
use std::fmt::Write;
use std::path::PathBuf;

use crate::planner::DistributionPlan;
use crate::types::{Dataset, DistributionResult, PlatformKey, PlatformSummary};
use crate::utils::{NumberFormatOptions, format_number};

/// Assemble the caller-facing result from a plan and the files written for it.
pub fn build_result(
    plan: &DistributionPlan,
    archive_path: Option<PathBuf>,
    leftover_paths: &BTreeMap<PlatformKey, PathBuf>,
) -> DistributionResult {
    let platforms = plan
        .totals
        .iter()
        .map(|(platform, &total)| {
            let distributed = plan.pointers.get(platform).copied().unwrap_or(0);
            (
                platform.clone(),
                PlatformSummary {
                    total,
                    distributed,
                    remaining: total - distributed,
                    leftover_path: leftover_paths.get(platform).cloned(),
                },
            )
        })
        .collect();

    DistributionResult {
        start_date: plan.params.start_date,
        accounts: plan.params.accounts,
        rows_per_account: plan.params.rows_per_account,
        days_distributed: plan.days_to_distribute,
        archive_path,
        platforms,
        daily_counts: plan.daily_counts.clone(),
    }
}

pub fn merged_summary(merged: &BTreeMap<PlatformKey, Dataset>) -> BTreeMap<PlatformKey, usize> {
    merged
        .iter()
        .map(|(platform, dataset)| (platform.clone(), dataset.len()))
        .collect()
}

pub fn render_merged_summary(
    counts: &BTreeMap<PlatformKey, usize>,
    options: &NumberFormatOptions,
) -> String {
    if counts.is_empty() {
        return "No merged data yet.\n".to_string();
    }

    let width = name_width(counts.keys());
    let mut out = String::new();
    let _ = writeln!(out, "{:<width$}  {:>10}", "Platform", "Rows");
    for (platform, rows) in counts {
        let _ = writeln!(
            out,
            "{:<width$}  {:>10}",
            platform.as_str(),
            format_number(*rows, options)
        );
    }
    out
}

pub fn render_distribution(result: &DistributionResult, options: &NumberFormatOptions) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Days distributed: {} (from {}, {} accounts × {} rows)",
        result.days_distributed, result.start_date, result.accounts, result.rows_per_account
    );
    match &result.archive_path {
        Some(path) => {
            let _ = writeln!(out, "Archive: {}", path.display());
        }
        None => {
            let _ = writeln!(out, "Archive: none (nothing to distribute)");
        }
    }
    let _ = writeln!(out);

    let width = name_width(result.platforms.keys());
    let _ = writeln!(
        out,
        "{:<width$}  {:>10}  {:>12}  {:>14}",
        "Platform", "Total", "Distributed", "Undistributed"
    );
    for (platform, summary) in &result.platforms {
        let _ = writeln!(
            out,
            "{:<width$}  {:>10}  {:>12}  {:>14}",
            platform.as_str(),
            format_number(summary.total, options),
            format_number(summary.distributed, options),
            format_number(summary.remaining, options),
        );
    }
    for (platform, summary) in &result.platforms {
        if let Some(path) = &summary.leftover_path {
            let _ = writeln!(out, "Leftover {platform}: {}", path.display());
        }
    }

    if !result.daily_counts.is_empty() {
        let _ = writeln!(out);
        let _ = write!(out, "{:<10}", "Date");
        for platform in result.platforms.keys() {
            let _ = write!(out, "  {:>w$}", platform.as_str(), w = platform.as_str().len().max(6));
        }
        let _ = writeln!(out);
        for (date, per_platform) in &result.daily_counts {
            let _ = write!(out, "{date}");
            for platform in result.platforms.keys() {
                let rows = per_platform.get(platform).copied().unwrap_or(0);
                let _ = write!(
                    out,
                    "  {:>w$}",
                    format_number(rows, options),
                    w = platform.as_str().len().max(6)
                );
            }
            let _ = writeln!(out);
        }
    }

    out
}

fn name_width<'a>(platforms: impl Iterator<Item = &'a PlatformKey>) -> usize {
    platforms
        .map(|p| p.as_str().len())
        .max()
        .unwrap_or(0)
        .max("Platform".len())
}
