use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use image::ImageFormat;
use merch_contracts::errors::{StudioError, StudioResult};
use uuid::Uuid;

pub const ASSETS_DIR: &str = "assets";

const MAX_NAME_ATTEMPTS: usize = 3;

/// Flat directory of generated and uploaded images.
#[derive(Debug, Clone)]
pub struct AssetStore {
    dir: PathBuf,
}

impl AssetStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes `bytes` under a fresh `{prefix}_{millis}_{hex}.{ext}` name and returns
    /// the file name. Never overwrites an existing asset.
    pub fn save(&self, bytes: &[u8], mime_type: &str, prefix: &str) -> StudioResult<String> {
        self.write_new(bytes, mime_type, prefix, write_and_sync)
            .map_err(|err| StudioError::storage("Failed to save image", &err))
    }

    /// A failed write removes the partly written file.
    fn write_new(
        &self,
        bytes: &[u8],
        mime_type: &str,
        prefix: &str,
        write: impl Fn(&mut File, &[u8]) -> io::Result<()>,
    ) -> Result<String> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;
        let ext = extension_for_mime(&effective_mime(bytes, mime_type));
        let mut last_err = None;
        for _ in 0..MAX_NAME_ATTEMPTS {
            let name = asset_file_name(prefix, ext);
            let path = self.dir.join(&name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    if let Err(err) = write(&mut file, bytes) {
                        drop(file);
                        if let Err(cleanup) = fs::remove_file(&path) {
                            tracing::warn!(path = %path.display(), "failed to remove partial asset: {cleanup}");
                        }
                        return Err(err)
                            .with_context(|| format!("failed to write {}", path.display()));
                    }
                    return Ok(name);
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => last_err = Some(err),
                Err(err) => {
                    return Err(err).with_context(|| format!("failed to create {}", path.display()))
                }
            }
        }
        Err(anyhow::anyhow!(
            "no free asset name after {MAX_NAME_ATTEMPTS} attempts ({})",
            last_err.map(|err| err.to_string()).unwrap_or_default()
        ))
    }

    /// Whether `file` names an existing asset directly inside the directory.
    pub fn exists(&self, file: &str) -> bool {
        self.resolve(file).map(|path| path.is_file()).unwrap_or(false)
    }

    pub fn resolve(&self, file: &str) -> Option<PathBuf> {
        let mut components = Path::new(file).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(name)), None) => Some(self.dir.join(name)),
            _ => None,
        }
    }

    /// Best effort; used to drop an image whose design record could not be stored.
    pub fn remove(&self, file: &str) {
        if let Some(path) = self.resolve(file) {
            if let Err(err) = fs::remove_file(&path) {
                tracing::warn!(path = %path.display(), "failed to remove orphaned asset: {err}");
            }
        }
    }
}

/// Fixed MIME to extension table; anything unlisted is stored as `png`.
pub fn extension_for_mime(mime_type: &str) -> &'static str {
    match mime_type.trim().to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        _ => "png",
    }
}

/// The sniffed format wins over the declared MIME type for png, jpeg and webp.
pub fn effective_mime(bytes: &[u8], declared: &str) -> String {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Png) => "image/png".to_string(),
        Ok(ImageFormat::Jpeg) => "image/jpeg".to_string(),
        Ok(ImageFormat::WebP) => "image/webp".to_string(),
        _ => declared.trim().to_ascii_lowercase(),
    }
}

fn write_and_sync(file: &mut File, bytes: &[u8]) -> io::Result<()> {
    file.write_all(bytes)?;
    file.sync_all()
}

fn asset_file_name(prefix: &str, ext: &str) -> String {
    let millis = Utc::now().timestamp_millis().max(0);
    let random = Uuid::new_v4();
    format!("{prefix}_{millis}_{}.{ext}", hex::encode(&random.as_bytes()[..6]))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::io::{self, Write};
    use std::sync::Arc;
    use std::thread;

    use super::{effective_mime, extension_for_mime, AssetStore};

    const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

    #[test]
    fn extension_table_defaults_to_png() {
        assert_eq!(extension_for_mime("image/jpeg"), "jpg");
        assert_eq!(extension_for_mime("image/png"), "png");
        assert_eq!(extension_for_mime("image/webp"), "webp");
        assert_eq!(extension_for_mime("image/gif"), "png");
        assert_eq!(extension_for_mime(""), "png");
    }

    #[test]
    fn sniffed_bytes_override_declared_type() {
        assert_eq!(effective_mime(&PNG_MAGIC, "image/jpeg"), "image/png");
        assert_eq!(effective_mime(b"not an image", "image/webp"), "image/webp");
    }

    #[test]
    fn save_writes_prefixed_file_in_asset_dir() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = AssetStore::new(temp.path().join("assets"));
        let name = store.save(b"jpeg-ish", "image/jpeg", "flyer")?;

        assert!(name.starts_with("flyer_"));
        assert!(name.ends_with(".jpg"));
        let parts: Vec<&str> = name.trim_end_matches(".jpg").split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[2].len(), 12);
        assert_eq!(std::fs::read(temp.path().join("assets").join(&name))?, b"jpeg-ish");
        assert!(store.exists(&name));
        Ok(())
    }

    #[test]
    fn concurrent_saves_never_collide() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = Arc::new(AssetStore::new(temp.path()));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    (0..16)
                        .map(|_| store.save(&PNG_MAGIC, "image/png", "tshirt"))
                        .collect::<Result<Vec<_>, _>>()
                })
            })
            .collect();
        let mut names = HashSet::new();
        for handle in handles {
            let saved = handle
                .join()
                .map_err(|_| anyhow::anyhow!("save worker panicked"))??;
            names.extend(saved);
        }
        assert_eq!(names.len(), 128);
        Ok(())
    }

    #[test]
    fn failed_write_leaves_no_partial_file() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = AssetStore::new(temp.path().join("assets"));
        let result = store.write_new(&PNG_MAGIC, "image/png", "flyer", |file, bytes| {
            file.write_all(&bytes[..4])?;
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        });

        let err = result.err().map(|err| format!("{err:#}")).unwrap_or_default();
        assert!(err.contains("disk full"), "{err}");
        assert_eq!(std::fs::read_dir(store.dir())?.count(), 0);
        Ok(())
    }

    #[test]
    fn traversal_names_are_not_assets() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        std::fs::write(temp.path().join("secret.png"), b"x")?;
        let store = AssetStore::new(temp.path().join("assets"));
        assert!(!store.exists("../secret.png"));
        assert!(!store.exists("/etc/passwd"));
        assert!(!store.exists(""));
        assert!(store.resolve("a/b.png").is_none());
        Ok(())
    }
}
