//! The Run Sandbox (C2): materialise a model into a fresh working
//! directory, rewrite swept input columns, invoke the model binary, and
//! package the resulting files back into an archive.

use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tempfile::TempDir;
use tokio::process::Command;
use zip::write::FileOptions;
use zip::ZipArchive;

use crate::error::SandboxError;
use crate::sweep::permutation::Permutation;

/// Extracts `archive_bytes` into a fresh, uniquely-prefixed directory and
/// overwrites every swept input file's named column with the
/// permutation's value. Returns the directory, kept alive for the
/// duration of the run by the caller holding onto the `TempDir`.
pub fn prepare(
    archive_bytes: &[u8],
    permutation: &Permutation,
    prefix: &str,
) -> Result<TempDir, SandboxError> {
    let run_dir = tempfile::Builder::new().prefix(prefix).tempdir()?;
    extract_zip(archive_bytes, run_dir.path())?;

    for assignment in &permutation.assignments {
        let path = run_dir.path().join(&assignment.file_name);
        rewrite_input_file(&path, &assignment.col_name, assignment.value)?;
    }

    Ok(run_dir)
}

fn extract_zip(bytes: &[u8], dest: &Path) -> Result<(), SandboxError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(name) = entry.enclosed_name() else { continue };
        let out_path = dest.join(name);
        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)?;
        } else {
            if let Some(parent) = out_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut out = std::fs::File::create(&out_path)?;
            std::io::copy(&mut entry, &mut out)?;
        }
    }
    Ok(())
}

/// Copies the first two lines of `path` verbatim (header/meta lines the
/// sandbox never interprets), then rewrites the remainder as CSV, dict-
/// style, overwriting `col_name` on every data row with `value`.
fn rewrite_input_file(path: &Path, col_name: &str, value: f64) -> Result<(), SandboxError> {
    let contents = std::fs::read_to_string(path)?;
    let mut lines = contents.lines();

    let line1 = lines
        .next()
        .ok_or_else(|| SandboxError::MissingHeaderLines(path.display().to_string()))?;
    let line2 = lines
        .next()
        .ok_or_else(|| SandboxError::MissingHeaderLines(path.display().to_string()))?;
    let rest: String = lines.collect::<Vec<_>>().join("\n");

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::Fields)
        .from_reader(rest.as_bytes());
    let headers = reader.headers()?.clone();
    let col_idx = headers
        .iter()
        .position(|h| h == col_name)
        .ok_or_else(|| SandboxError::ColumnNotFound {
            file: path.display().to_string(),
            column: col_name.to_string(),
        })?;

    let mut out = Vec::new();
    {
        let mut writer = csv::WriterBuilder::new().from_writer(&mut out);
        writer.write_record(headers.iter())?;
        for record in reader.records() {
            let mut record = record?;
            record = rebuild_with_value(&record, col_idx, value);
            writer.write_record(record.iter())?;
        }
        writer.flush()?;
    }

    let mut file = std::fs::File::create(path)?;
    writeln!(file, "{line1}")?;
    writeln!(file, "{line2}")?;
    file.write_all(&out)?;
    Ok(())
}

fn rebuild_with_value(record: &csv::StringRecord, col_idx: usize, value: f64) -> csv::StringRecord {
    record
        .iter()
        .enumerate()
        .map(|(i, field)| if i == col_idx { value.to_string() } else { field.to_string() })
        .collect()
}

/// Invokes `$WQDSS_MODEL_EXE run_dir` with all standard streams detached.
/// Exit status is not interpreted; a failing binary simply produces no
/// usable output downstream.
pub async fn exec(run_dir: &Path, model_exe: &Path) -> Result<(), SandboxError> {
    let mut child = Command::new(model_exe)
        .arg(run_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;
    child.wait().await?;
    Ok(())
}

/// Packages the listed files (input files plus the output file) from
/// `run_dir` into an in-memory archive, each stored at the archive root.
pub fn package(run_dir: &Path, files: &[String]) -> Result<Vec<u8>, SandboxError> {
    let mut buf = Vec::new();
    {
        let cursor = Cursor::new(&mut buf);
        let mut writer = zip::ZipWriter::new(cursor);
        let options = FileOptions::<()>::default();
        for file in files {
            let path = run_dir.join(file);
            writer.start_file(file, options)?;
            let mut contents = Vec::new();
            std::fs::File::open(&path)?.read_to_end(&mut contents)?;
            writer.write_all(&contents)?;
        }
        writer.finish()?;
    }
    Ok(buf)
}

/// Extracts `output_file` from a run archive and returns its lines.
pub fn parse_output(archive_bytes: &[u8], output_file: &str) -> Result<Vec<String>, SandboxError> {
    let mut archive = ZipArchive::new(Cursor::new(archive_bytes))?;
    let mut entry = archive
        .by_name(output_file)
        .map_err(|_| SandboxError::MissingOutputFile(output_file.to_string()))?;
    let mut contents = String::new();
    entry.read_to_string(&mut contents)?;
    Ok(contents.lines().map(|l| l.to_string()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sweep::permutation::{FileAssignment, Permutation};

    #[test]
    fn rewrite_preserves_header_lines_and_overwrites_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hangq01.csv");
        std::fs::write(&path, "meta line one\nmeta line two\ndate, v_hangq\n2020-01-01,1.0\n2020-01-02,1.0\n").unwrap();

        rewrite_input_file(&path, "v_hangq", 1.5).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let mut lines = contents.lines();
        assert_eq!(lines.next().unwrap(), "meta line one");
        assert_eq!(lines.next().unwrap(), "meta line two");
        assert_eq!(lines.next().unwrap(), "date,v_hangq");
        assert!(lines.all(|l| l.ends_with("1.5")));
    }

    #[test]
    fn rewrite_errors_on_unknown_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.csv");
        std::fs::write(&path, "m1\nm2\ndate, other\n2020-01-01,1.0\n").unwrap();
        let err = rewrite_input_file(&path, "missing", 1.0).unwrap_err();
        assert!(matches!(err, SandboxError::ColumnNotFound { .. }));
    }

    #[test]
    fn package_then_parse_round_trips_output_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("out.csv"), "NO3,NH4,DO\n3.7,2.4,8.0\n").unwrap();

        let bytes = package(dir.path(), &["out.csv".to_string()]).unwrap();
        let lines = parse_output(&bytes, "out.csv").unwrap();
        assert_eq!(lines, vec!["NO3,NH4,DO".to_string(), "3.7,2.4,8.0".to_string()]);
    }

    #[test]
    fn prepare_extracts_and_rewrites_swept_files() {
        let mut archive_bytes = Vec::new();
        {
            let cursor = Cursor::new(&mut archive_bytes);
            let mut writer = zip::ZipWriter::new(cursor);
            let options = FileOptions::<()>::default();
            writer.start_file("hangq01.csv", options).unwrap();
            writer.write_all(b"m1\nm2\ndate, v_hangq\n2020-01-01,0.0\n").unwrap();
            writer.finish().unwrap();
        }

        let permutation = Permutation {
            assignments: vec![FileAssignment {
                file_name: "hangq01.csv".to_string(),
                col_name: "v_hangq".to_string(),
                value: 2.0,
            }],
        };

        let run_dir = prepare(&archive_bytes, &permutation, "wqdss-test-").unwrap();
        let contents = std::fs::read_to_string(run_dir.path().join("hangq01.csv")).unwrap();
        assert!(contents.ends_with("2.0\n") || contents.ends_with("2.0"));
    }
}
