//! Carves merged datasets into a day × account grid.
//!
//! Planning is a pure function of its inputs: the same datasets, start date
//! and quotas always produce the same chunks, pointers and leftovers.

use std::collections::BTreeMap;
use std::ops::Range;

use chrono::{Datelike, Days, NaiveDate};

use crate::debug_log;
use crate::error::PipelineError;
use crate::types::{DailyCounts, Dataset, PlatformKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DistributionParams {
    pub start_date: NaiveDate,
    pub accounts: usize,
    pub rows_per_account: usize,
}

/// A contiguous slice of one platform's merged rows assigned to a
/// `(date, account)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub date: NaiveDate,
    /// 1-based.
    pub account: usize,
    pub platform: PlatformKey,
    pub rows: Range<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionPlan {
    pub params: DistributionParams,
    pub days_to_distribute: usize,
    pub totals: BTreeMap<PlatformKey, usize>,
    /// Next unconsumed row per platform.
    pub pointers: BTreeMap<PlatformKey, usize>,
    /// Ordered by day, then account, then platform.
    pub chunks: Vec<Chunk>,
    pub daily_counts: DailyCounts,
}

impl DistributionPlan {
    /// Unconsumed suffix of `platform`'s dataset, empty when fully consumed.
    pub fn leftover(&self, platform: &PlatformKey, dataset: &Dataset) -> Dataset {
        let pointer = self.pointers.get(platform).copied().unwrap_or(0);
        dataset.slice(pointer..dataset.len())
    }
}

pub fn days_in_month(date: NaiveDate) -> u32 {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|first_of_next| first_of_next.pred_opt())
        .map(|last| last.day())
        .unwrap_or(31)
}

/// Days from `date` through the end of its month, inclusive.
pub fn days_remaining_in_month(date: NaiveDate) -> u32 {
    days_in_month(date) - date.day() + 1
}

/// Partition `merged` into complete days of `accounts * rows_per_account`
/// rows per platform, starting at `start_date` and never crossing into the
/// next month.
///
/// A day is only emitted when every platform can fill every account, so the
/// scarcest platform bounds the plan; a platform with no rows yields zero
/// days. Zero days is a successful, empty plan.
pub fn plan(
    merged: &BTreeMap<PlatformKey, Dataset>,
    params: DistributionParams,
) -> Result<DistributionPlan, PipelineError> {
    if merged.is_empty() {
        return Err(PipelineError::NoMergedData);
    }
    if params.accounts == 0 {
        return Err(PipelineError::InvalidConfiguration(
            "accounts must be at least 1".to_string(),
        ));
    }
    if params.rows_per_account == 0 {
        return Err(PipelineError::InvalidConfiguration(
            "rows per account must be at least 1".to_string(),
        ));
    }

    let rows_per_day = params
        .accounts
        .checked_mul(params.rows_per_account)
        .ok_or_else(|| {
            PipelineError::InvalidConfiguration(
                "accounts * rows per account overflows".to_string(),
            )
        })?;

    let totals: BTreeMap<PlatformKey, usize> = merged
        .iter()
        .map(|(platform, dataset)| (platform.clone(), dataset.len()))
        .collect();
    let days_by_data = totals
        .values()
        .map(|total| total / rows_per_day)
        .min()
        .unwrap_or(0);
    let month_days = days_remaining_in_month(params.start_date) as usize;
    let days_to_distribute = days_by_data.min(month_days);

    debug_log::step("PLAN", "BOUNDS", || {
        format!(
            "rows_per_day={rows_per_day} days_by_data={days_by_data} month_days={month_days} days={days_to_distribute}"
        )
    });

    let mut pointers: BTreeMap<PlatformKey, usize> =
        totals.keys().map(|platform| (platform.clone(), 0)).collect();
    let mut chunks = Vec::with_capacity(days_to_distribute * params.accounts * merged.len());
    let mut daily_counts = DailyCounts::new();

    for offset in 0..days_to_distribute {
        let date = params
            .start_date
            .checked_add_days(Days::new(offset as u64))
            .ok_or_else(|| {
                PipelineError::InvalidConfiguration(format!(
                    "start date {} is out of range",
                    params.start_date
                ))
            })?;
        let day = daily_counts.entry(date).or_default();

        for account in 1..=params.accounts {
            for (platform, pointer) in pointers.iter_mut() {
                let start = *pointer;
                let end = start + params.rows_per_account;
                debug_assert!(end <= totals[platform]);
                *pointer = end;
                *day.entry(platform.clone()).or_default() += end - start;
                chunks.push(Chunk {
                    date,
                    account,
                    platform: platform.clone(),
                    rows: start..end,
                });
            }
        }
    }

    Ok(DistributionPlan {
        params,
        days_to_distribute,
        totals,
        pointers,
        chunks,
        daily_counts,
    })
}
