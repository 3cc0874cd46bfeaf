use std::fs::{self, File};
use std::io;
use std::path::Path;

use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::debug_log;
use crate::error::PipelineError;
use crate::table::partial_path;
use crate::utils::warn_once;

/// Zip every file under `root` into `destination`, with entry names relative
/// to `root`'s parent, then delete `root`.
///
/// The archive is written to a `.partial` sibling, re-opened to check its
/// entry count, and only then renamed into place. On any failure the partial
/// file is removed and `root` is left untouched. Returns the number of files
/// archived.
pub fn archive(root: &Path, destination: &Path) -> Result<usize, PipelineError> {
    let partial = partial_path(destination);
    let written = write_and_verify(root, destination, &partial).map_err(|source| {
        let _ = fs::remove_file(&partial);
        debug_log::step("ARCHIVE", "FAILED", || format!("{}: {source}", destination.display()));
        PipelineError::ArchiveWriteFailure {
            path: destination.to_path_buf(),
            source,
        }
    })?;
    debug_log::step("ARCHIVE", "WRITTEN", || {
        format!("{written} file(s) -> {}", destination.display())
    });

    if let Err(e) = fs::remove_dir_all(root) {
        warn_once(format!(
            "⚠️  Archive written, but could not remove {}: {e}",
            root.display()
        ));
    }

    Ok(written)
}

fn write_and_verify(root: &Path, destination: &Path, partial: &Path) -> io::Result<usize> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)?;
    }

    let written = write_zip(root, partial)?;

    let archived = ZipArchive::new(File::open(partial)?).map_err(io::Error::other)?;
    if archived.len() != written {
        return Err(io::Error::other(format!(
            "archive holds {} entries, expected {written}",
            archived.len()
        )));
    }

    fs::rename(partial, destination)?;
    Ok(written)
}

fn write_zip(root: &Path, target: &Path) -> io::Result<usize> {
    if !root.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} is not a directory", root.display()),
        ));
    }
    let base = root.parent().unwrap_or(root);

    let mut zip = ZipWriter::new(File::create(target)?);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut written = 0;

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(base)
            .map_err(io::Error::other)?;
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        zip.start_file(name, options).map_err(io::Error::other)?;
        io::copy(&mut File::open(entry.path())?, &mut zip)?;
        written += 1;
    }

    let file = zip.finish().map_err(io::Error::other)?;
    file.sync_all()?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn build_tree(root: &Path) {
        for account in 1..=2 {
            let dir = root.join("2025-06-05").join(format!("account_{account}"));
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("ebay_06-05.csv"), "Keywords\na\n").unwrap();
        }
    }

    #[test]
    fn archives_relative_to_parent_and_removes_tree() {
        let dir = TempDir::new().expect("tempdir");
        let root = dir.path().join("2025-06_distribution");
        build_tree(&root);
        let destination = dir.path().join("2025-06_distribution.zip");

        let written = archive(&root, &destination).expect("archive");

        assert_eq!(written, 2);
        assert!(!root.exists());
        assert!(!partial_path(&destination).exists());

        let mut zip = ZipArchive::new(File::open(&destination).unwrap()).unwrap();
        let mut names: Vec<String> = (0..zip.len())
            .map(|i| zip.by_index(i).unwrap().name().to_string())
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "2025-06_distribution/2025-06-05/account_1/ebay_06-05.csv",
                "2025-06_distribution/2025-06-05/account_2/ebay_06-05.csv",
            ]
        );

        let mut content = String::new();
        io::Read::read_to_string(&mut zip.by_index(0).unwrap(), &mut content).unwrap();
        assert_eq!(content, "Keywords\na\n");
    }

    #[test]
    fn failed_write_keeps_source_tree() {
        let dir = TempDir::new().expect("tempdir");
        let root = dir.path().join("2025-06_distribution");
        build_tree(&root);

        let blocker = dir.path().join("not_a_dir");
        fs::write(&blocker, "x").unwrap();
        let destination = blocker.join("out.zip");

        let err = archive(&root, &destination).unwrap_err();
        assert!(matches!(err, PipelineError::ArchiveWriteFailure { .. }));
        assert!(root.join("2025-06-05/account_1/ebay_06-05.csv").exists());
        assert!(!destination.exists());
    }

    #[test]
    fn missing_root_is_a_failure() {
        let dir = TempDir::new().expect("tempdir");
        let destination = dir.path().join("out.zip");

        let err = archive(&dir.path().join("missing"), &destination).unwrap_err();
        assert!(matches!(err, PipelineError::ArchiveWriteFailure { .. }));
        assert!(!destination.exists());
        assert!(!partial_path(&destination).exists());
    }
}
