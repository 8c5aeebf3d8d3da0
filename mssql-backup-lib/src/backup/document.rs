//! Reading and writing the small JSON documents of a run (schema snapshot, manifest).

use super::error::{BackupError, IoContext};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;

const LOG_TARGET: &str = "  document";

/// Load a document from a file.
pub fn load<T>(path: impl AsRef<Path>) -> Result<T, BackupError>
where
    T: for<'de> Deserialize<'de>,
{
    let path = path.as_ref();

    let file = File::open(path).io_context(|| format!("opening '{}'", path.display()))?;
    let reader = BufReader::new(file);
    serde_json::from_reader(reader)
        .map_err(io::Error::from)
        .io_context(|| format!("parsing '{}'", path.display()))
}

/// Save a document, pretty printed.
///
/// The content goes to a sibling temporary file that is renamed over `path` once fully written, so
/// readers never observe a half-written document.
pub fn save<T>(data: &T, path: impl AsRef<Path>) -> Result<u64, BackupError>
where
    T: Serialize,
{
    let path = path.as_ref();
    let tmp_path = path.with_extension("json.tmp");

    let file = File::create(&tmp_path).io_context(|| format!("creating '{}'", tmp_path.display()))?;
    let mut writer = BufWriter::new(file);

    serde_json::to_writer_pretty(&mut writer, data)
        .map_err(io::Error::from)
        .io_context(|| format!("writing '{}'", tmp_path.display()))?;
    writer.write_all(b"\n").io_context(|| format!("writing '{}'", tmp_path.display()))?;

    let file = writer
        .into_inner()
        .map_err(io::IntoInnerError::into_error)
        .io_context(|| format!("flushing '{}'", tmp_path.display()))?;
    file.sync_all().io_context(|| format!("syncing '{}'", tmp_path.display()))?;
    let size = file.metadata().io_context(|| format!("reading metadata of '{}'", tmp_path.display()))?.len();
    drop(file);

    fs::rename(&tmp_path, path).io_context(|| format!("renaming '{}' to '{}'", tmp_path.display(), path.display()))?;

    log::debug!(target: LOG_TARGET, "Wrote {} ({size} bytes)", path.display());
    Ok(size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct TestData {
        name: String,
        value: u64,
    }

    #[test]
    fn test_save_and_load_json() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("data.json");

        let original = TestData {
            name: "test".to_string(),
            value: 42,
        };

        let size = save(&original, &file_path).unwrap();
        assert_eq!(size, fs::metadata(&file_path).unwrap().len());
        assert!(!file_path.with_extension("json.tmp").exists());

        let loaded: TestData = load(&file_path).unwrap();
        assert_eq!(original, loaded);
    }

    #[test]
    fn test_save_is_pretty_printed() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("data.json");

        let _ = save(&TestData { name: "x".into(), value: 1 }, &file_path).unwrap();
        let text = fs::read_to_string(&file_path).unwrap();
        assert_eq!(text, "{\n  \"name\": \"x\",\n  \"value\": 1\n}\n");
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result: Result<TestData, _> = load("/nonexistent/path/file.json");
        let err = result.unwrap_err();
        assert!(err.is_io());
        assert!(err.to_string().contains("opening"));
    }

    #[test]
    fn test_load_invalid_json() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("invalid.json");
        fs::write(&file_path, "not valid json").unwrap();

        let result: Result<TestData, _> = load(&file_path);
        assert!(result.unwrap_err().to_string().contains("parsing"));
    }

    #[test]
    fn test_save_into_missing_directory_fails() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("missing").join("data.json");

        let result = save(&TestData { name: "x".into(), value: 1 }, &file_path);
        assert!(result.unwrap_err().is_io());
    }

    #[test]
    fn test_save_overwrites_existing_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("overwrite.json");

        let _ = save(&TestData { name: "first".into(), value: 1 }, &file_path).unwrap();
        let _ = save(&TestData { name: "second".into(), value: 2 }, &file_path).unwrap();

        let loaded: TestData = load(&file_path).unwrap();
        assert_eq!(loaded.name, "second");
        assert_eq!(loaded.value, 2);
    }
}
