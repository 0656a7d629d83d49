//! Flat JSON files used as the studio's persistence layer.
//!
//! Every file is pretty-printed with four-space indentation so existing admin
//! tooling and hand edits keep working. Writers replace the file through a temp
//! file in the same directory and hold a process-wide lock per path for the whole
//! read-modify-write.

use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};
use tempfile::NamedTempFile;

type LockTable = Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>;

fn lock_table() -> &'static LockTable {
    static TABLE: OnceLock<LockTable> = OnceLock::new();
    TABLE.get_or_init(|| Mutex::new(HashMap::new()))
}

fn file_lock(path: &Path) -> Result<Arc<Mutex<()>>> {
    let mut table = lock_table()
        .lock()
        .map_err(|_| anyhow!("file lock table poisoned"))?;
    Ok(table
        .entry(path.to_path_buf())
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone())
}

/// Runs `op` while holding the in-process lock for `path`.
///
/// Only writers inside this process are serialized; a second process editing the
/// same file is not coordinated.
pub fn with_file_lock<R>(path: &Path, op: impl FnOnce() -> Result<R>) -> Result<R> {
    let lock = file_lock(path)?;
    let _guard = lock
        .lock()
        .map_err(|_| anyhow!("store lock poisoned for {}", path.display()))?;
    op()
}

/// Reads a JSON array file. Missing, blank and `null` files read as empty.
pub fn read_json_array<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let Some(raw) = read_optional(path)? else {
        return Ok(Vec::new());
    };
    let parsed: Option<Vec<T>> = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a JSON array of records", path.display()))?;
    Ok(parsed.unwrap_or_default())
}

/// Reads a JSON object file into `T`, falling back to `T::default()` when the file
/// is missing or blank.
pub fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    let Some(raw) = read_optional(path)? else {
        return Ok(T::default());
    };
    serde_json::from_str(&raw).with_context(|| format!("{} holds invalid JSON", path.display()))
}

pub fn to_pretty_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut serializer = Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(b"    "));
    value.serialize(&mut serializer)?;
    Ok(out)
}

pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)
        .with_context(|| format!("failed to create {}", parent.display()))?;
    let payload = to_pretty_json(value)?;
    let mut temp = NamedTempFile::new_in(parent)
        .with_context(|| format!("failed to stage a write in {}", parent.display()))?;
    temp.write_all(&payload)?;
    temp.write_all(b"\n")?;
    temp.as_file().sync_all()?;
    temp.persist(path)
        .map_err(|err| err.error)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => Ok(Some(raw)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err).with_context(|| format!("failed reading {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::{read_json_array, read_json_or_default, write_json_atomic};

    #[test]
    fn missing_and_blank_files_read_as_empty() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("logo_designs.json");
        assert!(read_json_array::<Value>(&path)?.is_empty());

        std::fs::write(&path, "  \n")?;
        assert!(read_json_array::<Value>(&path)?.is_empty());

        std::fs::write(&path, "null")?;
        assert!(read_json_array::<Value>(&path)?.is_empty());
        Ok(())
    }

    #[test]
    fn non_array_store_is_an_error() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("poster_designs.json");
        std::fs::write(&path, "{\"oops\": true}")?;
        assert!(read_json_array::<Value>(&path).is_err());
        Ok(())
    }

    #[test]
    fn writes_four_space_indent_and_unescaped_slashes() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("nested").join("store.json");
        write_json_atomic(&path, &json!([{"file": "a/b.png"}]))?;

        let raw = std::fs::read_to_string(&path)?;
        assert_eq!(raw, "[\n    {\n        \"file\": \"a/b.png\"\n    }\n]\n");
        Ok(())
    }

    #[test]
    fn default_used_for_missing_object_file() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let value: std::collections::BTreeMap<String, String> =
            read_json_or_default(&temp.path().join("config.json"))?;
        assert!(value.is_empty());
        Ok(())
    }
}
