use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::config::MergePolicy;
use crate::debug_log;
use crate::error::PipelineError;
use crate::platform::PlatformMatcher;
use crate::table;
use crate::types::{Dataset, PlatformKey, Upload};

/// What a merge invocation did, platform by platform.
#[derive(Debug, Default)]
pub struct MergeOutcome {
    /// Uploads that matched a platform and parsed cleanly.
    pub total_files: usize,
    /// Post-merge row count of every platform written in this invocation.
    pub row_counts: BTreeMap<PlatformKey, usize>,
    pub saved_paths: BTreeMap<PlatformKey, PathBuf>,
    /// Upload names that matched no platform.
    pub skipped: Vec<String>,
    /// Per-file or per-platform failures; the affected platform was left untouched.
    pub failures: Vec<PipelineError>,
}

impl MergeOutcome {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Accumulates uploads into one merged CSV per platform under `merged_dir`.
pub struct MergeAccumulator<'a> {
    matcher: &'a PlatformMatcher,
    merged_dir: PathBuf,
    policy: MergePolicy,
}

impl<'a> MergeAccumulator<'a> {
    pub fn new(
        matcher: &'a PlatformMatcher,
        merged_dir: impl AsRef<Path>,
        policy: MergePolicy,
    ) -> Self {
        Self {
            matcher,
            merged_dir: merged_dir.as_ref().to_path_buf(),
            policy,
        }
    }

    pub fn merged_path(&self, platform: &PlatformKey) -> PathBuf {
        self.merged_dir.join(format!("{platform}.csv"))
    }

    /// Merge `uploads` platform by platform, in configured priority order.
    ///
    /// Unmatched uploads are skipped. A file that fails to parse, a column
    /// mismatch, or a failed write aborts that platform only; every other
    /// platform is still merged and reported.
    pub fn merge(&self, uploads: &[Upload]) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();
        let mut groups: BTreeMap<usize, (PlatformKey, Vec<&Upload>)> = BTreeMap::new();

        for upload in uploads {
            match self.matcher.match_name(&upload.name) {
                Some(key) => {
                    let priority = self
                        .matcher
                        .keys()
                        .iter()
                        .position(|k| k == key)
                        .unwrap_or(usize::MAX);
                    groups
                        .entry(priority)
                        .or_insert_with(|| (key.clone(), Vec::new()))
                        .1
                        .push(upload);
                }
                None => {
                    debug_log::step("MERGE", "SKIP", || upload.name.clone());
                    outcome.skipped.push(upload.name.clone());
                }
            }
        }

        for (platform, group) in groups.into_values() {
            let batch = match self.parse_group(&platform, &group) {
                Ok(batch) => batch,
                Err(failures) => {
                    debug_log::step("MERGE", "ABORT", || {
                        format!("{platform}: {} failed file(s)", failures.len())
                    });
                    outcome.failures.extend(failures);
                    continue;
                }
            };

            let path = self.merged_path(&platform);
            let names: Vec<&str> = group.iter().map(|u| u.name.as_str()).collect();
            let merged =
                match self.combine_with_existing(&platform, &path, &names.join(", "), batch) {
                    Ok(merged) => merged,
                    Err(failure) => {
                        outcome.failures.push(failure);
                        continue;
                    }
                };

            if let Err(e) = table::write_csv_file(&path, &merged) {
                debug_log::step("MERGE", "WRITE_FAILED", || format!("{platform}: {e:#}"));
                outcome.failures.push(PipelineError::WriteFailure {
                    platform,
                    path,
                    reason: format!("{e:#}"),
                });
                continue;
            }
            debug_log::step("MERGE", "WRITE", || {
                format!("{platform}: {} rows -> {}", merged.len(), path.display())
            });

            outcome.total_files += group.len();
            outcome.row_counts.insert(platform.clone(), merged.len());
            outcome.saved_paths.insert(platform, path);
        }

        outcome
    }

    /// Parse every upload of one platform and concatenate them in upload order.
    fn parse_group(
        &self,
        platform: &PlatformKey,
        group: &[&Upload],
    ) -> std::result::Result<Dataset, Vec<PipelineError>> {
        let mut failures = Vec::new();
        let mut batch: Option<Dataset> = None;

        for upload in group {
            let parsed = match table::parse_csv(&upload.bytes) {
                Ok(parsed) => parsed,
                Err(e) => {
                    failures.push(PipelineError::unparseable(&upload.name, format!("{e:#}")));
                    continue;
                }
            };

            match batch.as_mut() {
                None => batch = Some(parsed),
                Some(acc) => {
                    let found = parsed.headers.clone();
                    match parsed.aligned_to(&acc.headers) {
                        Some(aligned) => acc.append(aligned),
                        None => failures.push(PipelineError::SchemaMismatch {
                            file: upload.name.clone(),
                            platform: platform.clone(),
                            expected: acc.headers.clone(),
                            found,
                        }),
                    }
                }
            }
        }

        match batch {
            Some(batch) if failures.is_empty() => Ok(batch),
            _ => Err(failures),
        }
    }

    fn combine_with_existing(
        &self,
        platform: &PlatformKey,
        path: &Path,
        source: &str,
        batch: Dataset,
    ) -> std::result::Result<Dataset, PipelineError> {
        if self.policy == MergePolicy::Overwrite || !path.exists() {
            return Ok(batch);
        }

        let mut existing = table::read_csv_file(path).map_err(|e| {
            PipelineError::unparseable(path.display().to_string(), format!("{e:#}"))
        })?;
        let found = batch.headers.clone();
        let aligned = batch
            .aligned_to(&existing.headers)
            .ok_or_else(|| PipelineError::SchemaMismatch {
                file: source.to_string(),
                platform: platform.clone(),
                expected: existing.headers.clone(),
                found,
            })?;
        existing.append(aligned);
        Ok(existing)
    }

    /// Every merged dataset currently on disk, keyed by platform.
    pub fn load_all(&self) -> Result<BTreeMap<PlatformKey, Dataset>> {
        let mut merged = BTreeMap::new();
        for platform in self.matcher.keys() {
            let path = self.merged_path(platform);
            if !path.exists() {
                continue;
            }
            let dataset = table::read_csv_file(&path)
                .with_context(|| format!("Failed to load merged dataset for {platform}"))?;
            merged.insert(platform.clone(), dataset);
        }
        Ok(merged)
    }
}
