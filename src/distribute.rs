use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::archive;
use crate::config::DataPaths;
use crate::debug_log;
use crate::error::PipelineError;
use crate::planner::{self, DistributionParams, DistributionPlan};
use crate::report;
use crate::table;
use crate::types::{Dataset, DistributionResult, PlatformKey};
use crate::utils::warn_once;

/// The suffix becomes part of a folder and file name directly under
/// `distributed/`, so it may not contain path separators or `..`.
pub fn check_archive_suffix(suffix: &str) -> Result<(), PipelineError> {
    if suffix.contains(['/', '\\', '\0']) || suffix.contains("..") {
        return Err(PipelineError::InvalidConfiguration(format!(
            "archive suffix `{suffix}` must not contain path separators or `..`"
        )));
    }
    Ok(())
}

/// Materializes a plan as `<month><suffix>/<date>/account_<n>/<platform>_<MM-DD>.csv`,
/// zips it, and writes per-platform leftovers.
pub struct Distributor<'a> {
    paths: &'a DataPaths,
    archive_suffix: &'a str,
}

impl<'a> Distributor<'a> {
    pub fn new(paths: &'a DataPaths, archive_suffix: &'a str) -> Self {
        Self {
            paths,
            archive_suffix,
        }
    }

    fn base_name(&self, params: &DistributionParams) -> String {
        format!(
            "{}{}",
            params.start_date.format("%Y-%m"),
            self.archive_suffix
        )
    }

    pub fn staging_dir(&self, params: &DistributionParams) -> PathBuf {
        self.paths.distributed_dir.join(self.base_name(params))
    }

    pub fn archive_path(&self, params: &DistributionParams) -> PathBuf {
        self.paths
            .distributed_dir
            .join(format!("{}.zip", self.base_name(params)))
    }

    pub fn leftover_path(&self, platform: &PlatformKey) -> PathBuf {
        self.paths
            .leftover_dir
            .join(format!("undistributed_{platform}.csv"))
    }

    /// Plan, write and archive the day/account tree, then write leftovers.
    ///
    /// Parameters are validated before anything touches the filesystem. When
    /// no whole day can be distributed, no archive is produced but leftovers
    /// are still written.
    pub fn distribute(
        &self,
        merged: &BTreeMap<PlatformKey, Dataset>,
        params: DistributionParams,
    ) -> Result<DistributionResult, PipelineError> {
        let plan = planner::plan(merged, params)?;
        check_archive_suffix(self.archive_suffix)?;

        let archive_path = if plan.days_to_distribute > 0 {
            let staging = self.staging_dir(&params);
            self.materialize(&plan, merged, &staging)?;
            let destination = self.archive_path(&params);
            archive::archive(&staging, &destination)?;
            Some(destination)
        } else {
            debug_log::log("DISTRIBUTE", "SKIP_ARCHIVE", "no whole day to distribute");
            None
        };

        let leftover_paths = self.write_leftovers(&plan, merged)?;

        Ok(report::build_result(&plan, archive_path, &leftover_paths))
    }

    fn materialize(
        &self,
        plan: &DistributionPlan,
        merged: &BTreeMap<PlatformKey, Dataset>,
        staging: &Path,
    ) -> Result<(), PipelineError> {
        if staging.exists() {
            warn_once(format!(
                "⚠️  Removing stale distribution folder {}",
                staging.display()
            ));
            fs::remove_dir_all(staging)?;
        }

        for chunk in &plan.chunks {
            let Some(dataset) = merged.get(&chunk.platform) else {
                continue;
            };
            let dir = staging
                .join(chunk.date.format("%Y-%m-%d").to_string())
                .join(format!("account_{}", chunk.account));
            fs::create_dir_all(&dir)?;

            let file_name = format!("{}_{}.csv", chunk.platform, chunk.date.format("%m-%d"));
            let file = fs::File::create(dir.join(file_name))?;
            table::write_csv(io::BufWriter::new(file), &dataset.slice(chunk.rows.clone()))
                .map_err(|e| io::Error::other(format!("{e:#}")))?;
        }

        debug_log::step("DISTRIBUTE", "MATERIALIZED", || {
            format!("{} chunk file(s) under {}", plan.chunks.len(), staging.display())
        });
        Ok(())
    }

    /// Write `undistributed_<platform>.csv` for every platform with rows left,
    /// removing stale ones for platforms that were fully consumed.
    fn write_leftovers(
        &self,
        plan: &DistributionPlan,
        merged: &BTreeMap<PlatformKey, Dataset>,
    ) -> Result<BTreeMap<PlatformKey, PathBuf>, PipelineError> {
        let mut written = BTreeMap::new();

        for (platform, dataset) in merged {
            let path = self.leftover_path(platform);
            let leftover = plan.leftover(platform, dataset);

            if leftover.is_empty() {
                if path.exists() {
                    fs::remove_file(&path)?;
                }
                continue;
            }

            table::write_csv_file(&path, &leftover)
                .map_err(|e| io::Error::other(format!("{e:#}")))?;
            written.insert(platform.clone(), path);
        }

        Ok(written)
    }
}
