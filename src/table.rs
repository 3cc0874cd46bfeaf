//! CSV reading and writing for [`Dataset`]s.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::types::Dataset;

/// Parse header + data rows. Ragged rows, invalid UTF-8, repeated column
/// names and input without a header row are errors.
pub fn parse_csv(bytes: &[u8]) -> Result<Dataset> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(bytes);

    let headers: Vec<String> = reader
        .headers()
        .context("Failed to read header row")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    if headers.is_empty() || headers.iter().all(String::is_empty) {
        anyhow::bail!("No header row found");
    }
    for (i, header) in headers.iter().enumerate() {
        if headers[..i].contains(header) {
            anyhow::bail!("Duplicate column `{header}`");
        }
    }

    let mut dataset = Dataset::new(headers);
    for (i, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Malformed data row {}", i + 1))?;
        dataset.rows.push(record.iter().map(str::to_string).collect());
    }

    Ok(dataset)
}

pub fn read_csv_file(path: &Path) -> Result<Dataset> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    parse_csv(&bytes).with_context(|| format!("Failed to parse {}", path.display()))
}

pub fn write_csv<W: Write>(writer: W, dataset: &Dataset) -> Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record(&dataset.headers)?;
    for row in &dataset.rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Write to a temporary sibling first and rename it over `path`, so readers
/// never observe a half-written file.
pub fn write_csv_file(path: &Path, dataset: &Dataset) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let tmp = partial_path(path);
    let result = fs::File::create(&tmp)
        .with_context(|| format!("Failed to create {}", tmp.display()))
        .and_then(|file| write_csv(std::io::BufWriter::new(file), dataset))
        .and_then(|_| {
            fs::rename(&tmp, path)
                .with_context(|| format!("Failed to move {} into place", tmp.display()))
        });

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

/// `<path>.partial`, used for write-then-rename.
pub fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".partial");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn parses_header_and_rows() {
        let data = parse_csv(b"Keywords,Links\nred shoes,http://a\nblue hat,http://b\n").unwrap();
        assert_eq!(data.headers, vec!["Keywords", "Links"]);
        assert_eq!(data.len(), 2);
        assert_eq!(data.rows[1], vec!["blue hat", "http://b"]);
    }

    #[test]
    fn header_only_is_an_empty_dataset() {
        let data = parse_csv(b"Keywords\n").unwrap();
        assert_eq!(data.headers, vec!["Keywords"]);
        assert!(data.is_empty());
    }

    #[test]
    fn rejects_empty_and_ragged_input() {
        assert!(parse_csv(b"").is_err());
        assert!(parse_csv(b"a,b\n1,2\n3\n").is_err());
        assert!(parse_csv(&[0xff, 0xfe, b',', b'\n']).is_err());
    }

    #[test]
    fn rejects_repeated_column_names() {
        let err = parse_csv(b"a,b, a\n1,2,3\n").unwrap_err();
        assert!(format!("{err}").contains("Duplicate column `a`"));
    }

    #[test]
    fn quoted_cells_survive_a_write_read_cycle() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("nested").join("out.csv");
        let data = Dataset {
            headers: vec!["Keywords".into(), "Links".into()],
            rows: vec![vec!["shoes, red".into(), "say \"hi\"".into()]],
        };

        write_csv_file(&path, &data).unwrap();
        assert!(!partial_path(&path).exists());
        assert_eq!(read_csv_file(&path).unwrap(), data);
    }
}
