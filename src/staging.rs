//! Local staging of uploaded files before they are pushed to the media host.
//!
//! Every staged file lives directly inside one fixed directory. Deletion never
//! trusts the path it is handed: the file name is re-resolved inside the
//! staging root and anything that canonicalizes outside of it is refused.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

#[derive(Clone, Debug)]
pub struct StagingArea {
    root: Arc<PathBuf>,
}

impl StagingArea {
    /// Create the directory if needed and pin its canonical location.
    pub fn new(dir: impl AsRef<Path>) -> io::Result<Self> {
        std::fs::create_dir_all(dir.as_ref())?;
        let root = dir.as_ref().canonicalize()?;
        Ok(Self { root: Arc::new(root) })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write `bytes` to a fresh `<field>-<millis>-<random>` file.
    pub async fn stage(&self, field: &str, original_name: Option<String>, bytes: &[u8]) -> io::Result<StagedFile> {
        let path = self.root.join(staged_name(field));
        write_new(&path, bytes).await?;
        debug!(path = %path.display(), size = bytes.len(), "staged upload");
        Ok(StagedFile {
            path,
            original_name,
            size: bytes.len(),
            area: self.clone(),
        })
    }

    /// Delete a staged file. `Ok(false)` when it is already gone.
    pub fn remove(&self, path: &Path) -> io::Result<bool> {
        let name = path.file_name().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "staged path has no file name")
        })?;
        let resolved = match self.root.join(name).canonicalize() {
            Ok(p) => p,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e),
        };
        if resolved == *self.root || !resolved.starts_with(self.root.as_path()) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("{} resolves outside the staging directory", path.display()),
            ));
        }
        std::fs::remove_file(&resolved)?;
        Ok(true)
    }
}

/// Create `path` and write `bytes`, failing if the file already exists.
async fn write_new(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(bytes).await?;
    file.flush().await
}

fn staged_name(field: &str) -> String {
    let field: String = field.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000_000);
    format!("{field}-{millis}-{suffix}")
}

/// A request-scoped staged file. Dropping it deletes the file, so every exit
/// path of a request cleans up after itself.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
    original_name: Option<String>,
    size: usize,
    area: StagingArea,
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn original_name(&self) -> Option<&str> {
        self.original_name.as_deref()
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Delete now rather than at end of scope.
    pub fn discard(self) {}
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if let Err(e) = self.area.remove(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to remove staged upload");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn area() -> (tempfile::TempDir, StagingArea) {
        let tmp = tempfile::tempdir().unwrap();
        let area = StagingArea::new(tmp.path().join("temp")).unwrap();
        (tmp, area)
    }

    #[tokio::test]
    async fn stage_writes_inside_root_and_drop_removes() {
        let (_tmp, area) = area();
        let staged = area.stage("avatar", Some("me.png".into()), b"png").await.unwrap();
        let path = staged.path().to_path_buf();
        assert!(path.starts_with(area.root()));
        assert!(path.file_name().unwrap().to_str().unwrap().starts_with("avatar-"));
        assert_eq!(std::fs::read(&path).unwrap(), b"png");
        assert_eq!(staged.size(), 3);
        assert_eq!(staged.original_name(), Some("me.png"));
        staged.discard();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn names_are_unique_per_stage() {
        let (_tmp, area) = area();
        let a = area.stage("avatar", None, b"1").await.unwrap();
        let b = area.stage("avatar", None, b"2").await.unwrap();
        assert_ne!(a.path(), b.path());
    }

    #[tokio::test]
    async fn staging_never_overwrites_an_existing_file() {
        let (_tmp, area) = area();
        let taken = area.root().join("avatar-1-1");
        std::fs::write(&taken, b"first").unwrap();
        let err = write_new(&taken, b"second").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(std::fs::read(&taken).unwrap(), b"first");
    }

    #[test]
    fn remove_missing_is_not_an_error() {
        let (_tmp, area) = area();
        assert!(!area.remove(&area.root().join("nope")).unwrap());
    }

    #[test]
    fn traversal_cannot_reach_outside_files() {
        let (tmp, area) = area();
        let outside = tmp.path().join("secret.txt");
        std::fs::write(&outside, b"keep").unwrap();
        let sneaky = area.root().join("..").join("secret.txt");
        assert!(!area.remove(&sneaky).unwrap());
        assert!(outside.exists());
        assert!(!area.remove(&outside).unwrap());
        assert!(outside.exists());
    }

    #[cfg(unix)]
    #[test]
    fn symlink_escaping_root_is_refused() {
        let (tmp, area) = area();
        let outside = tmp.path().join("secret.txt");
        std::fs::write(&outside, b"keep").unwrap();
        let link = area.root().join("avatar-1-1");
        std::os::unix::fs::symlink(&outside, &link).unwrap();
        let err = area.remove(&link).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
        assert!(outside.exists());
    }

    #[test]
    fn parent_component_has_no_file_name() {
        let (_tmp, area) = area();
        let err = area.remove(Path::new("..")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
