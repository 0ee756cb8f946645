// Temporary files created while rendering

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const PREFIX_STEM: &str = "dotr";
const MAX_CREATE_ATTEMPTS: usize = 16;

/// Base path for the files of one pipeline invocation: `<dir>/dotr<8 hex digits>`.
///
/// The suffix only has to avoid collisions inside one temp directory, so a
/// plain random `u32` is enough; [`TempArtifact::create_unique`] skips names
/// that are already taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempPrefix {
    base: PathBuf,
}

impl TempPrefix {
    fn with_suffix(dir: &Path, suffix: u32) -> Self {
        Self {
            base: dir.join(format!("{}{:08x}", PREFIX_STEM, suffix)),
        }
    }

    /// `<prefix>.<extension>`
    pub fn with_extension(&self, extension: &str) -> PathBuf {
        let mut name = self.base.clone().into_os_string();
        name.push(".");
        name.push(extension);
        PathBuf::from(name)
    }

    pub fn as_path(&self) -> &Path {
        &self.base
    }
}

/// A file owned by a single pipeline invocation.
///
/// When dropped with cleanup enabled the file is removed, whichever way the
/// invocation ended. With cleanup disabled it is left in place.
#[derive(Debug)]
pub struct TempArtifact {
    path: PathBuf,
    cleanup: bool,
}

impl TempArtifact {
    pub fn new(path: PathBuf, cleanup: bool) -> Self {
        Self { path, cleanup }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Create a new, empty `<prefix>.<extension>` in `dir` under a fresh random
    /// prefix. A name that already exists is never reused; another prefix is
    /// drawn instead.
    pub fn create_unique(
        dir: &Path,
        extension: &str,
        cleanup: bool,
    ) -> io::Result<(TempPrefix, TempArtifact)> {
        Self::create_with_suffixes(dir, extension, cleanup, std::iter::repeat_with(rand::random::<u32>))
    }

    fn create_with_suffixes(
        dir: &Path,
        extension: &str,
        cleanup: bool,
        suffixes: impl Iterator<Item = u32>,
    ) -> io::Result<(TempPrefix, TempArtifact)> {
        for suffix in suffixes.take(MAX_CREATE_ATTEMPTS) {
            let prefix = TempPrefix::with_suffix(dir, suffix);
            let path = prefix.with_extension(extension);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => return Ok((prefix, TempArtifact::new(path, cleanup))),
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                    debug!("Temp file {} already exists, picking another name", path.display());
                }
                Err(err) => return Err(err),
            }
        }

        Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("no free temp file name in {}", dir.display()),
        ))
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        if self.cleanup {
            cleanup([&self.path]);
        }
    }
}

/// Best-effort removal of the given files.
///
/// A file that is already gone counts as removed. Failures are logged and
/// otherwise ignored. Returns whether every path is now absent.
pub fn cleanup<I, P>(paths: I) -> bool
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    paths
        .into_iter()
        .fold(true, |all_clean, path| remove_file(path.as_ref()) && all_clean)
}

fn remove_file(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!("Deleted {}", path.display());
            true
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => true,
        Err(err) => {
            warn!("Failed to delete {}: {}", path.display(), err);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_prefix_layout() {
        let dir = Path::new("/tmp/render");
        let prefix = TempPrefix::with_suffix(dir, 0xab);
        assert_eq!(prefix.as_path(), dir.join("dotr000000ab"));
        assert_eq!(prefix.with_extension("dot"), dir.join("dotr000000ab.dot"));
    }

    #[test]
    fn test_prefixes_distinct() {
        let dir = tempfile::tempdir().unwrap();
        let created: Vec<(TempPrefix, TempArtifact)> = (0..256)
            .map(|_| TempArtifact::create_unique(dir.path(), "dot", true).unwrap())
            .collect();
        let prefixes: HashSet<PathBuf> = created
            .iter()
            .map(|(prefix, _)| prefix.as_path().to_path_buf())
            .collect();
        assert_eq!(prefixes.len(), 256);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 256);
    }

    #[test]
    fn test_cleanup_missing_is_clean() {
        let dir = tempfile::tempdir().unwrap();
        assert!(cleanup([dir.path().join("never-created.png")]));
    }

    #[test]
    fn test_cleanup_removes_files() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.dot");
        let b = dir.path().join("b.png");
        fs::write(&a, "digraph {}").unwrap();
        fs::write(&b, [0u8; 4]).unwrap();

        assert!(cleanup([&a, &b]));
        assert!(!a.exists());
        assert!(!b.exists());
    }

    #[test]
    fn test_cleanup_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        // a directory cannot be removed with remove_file
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        assert!(!cleanup([&sub]));
        assert!(sub.exists());
    }

    #[test]
    fn test_artifact_dropped_with_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.dot");
        fs::write(&path, "graph {}").unwrap();
        {
            let artifact = TempArtifact::new(path.clone(), true);
            assert!(artifact.exists());
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_artifact_kept_without_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.dot");
        fs::write(&path, "graph {}").unwrap();
        drop(TempArtifact::new(path.clone(), false));
        assert!(path.exists());
    }

    #[test]
    fn test_create_unique_makes_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let (prefix, artifact) = TempArtifact::create_unique(dir.path(), "dot", true).unwrap();
        assert_eq!(artifact.path(), prefix.with_extension("dot"));
        assert_eq!(fs::metadata(artifact.path()).unwrap().len(), 0);

        let path = artifact.path().to_path_buf();
        drop(artifact);
        assert!(!path.exists());
    }

    #[test]
    fn test_create_skips_taken_names() {
        let dir = tempfile::tempdir().unwrap();
        let taken = TempPrefix::with_suffix(dir.path(), 1).with_extension("dot");
        fs::write(&taken, "digraph other {}").unwrap();

        let (prefix, artifact) =
            TempArtifact::create_with_suffixes(dir.path(), "dot", true, [1, 2].into_iter())
                .unwrap();
        assert_eq!(prefix, TempPrefix::with_suffix(dir.path(), 2));
        assert_ne!(artifact.path(), taken);
        assert_eq!(fs::read_to_string(&taken).unwrap(), "digraph other {}");

        drop(artifact);
        assert!(taken.exists());
    }

    #[test]
    fn test_create_gives_up_when_all_names_taken() {
        let dir = tempfile::tempdir().unwrap();
        let taken = TempPrefix::with_suffix(dir.path(), 7).with_extension("dot");
        fs::write(&taken, "").unwrap();

        let err = TempArtifact::create_with_suffixes(
            dir.path(),
            "dot",
            true,
            std::iter::repeat(7),
        )
        .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert!(taken.exists());
    }

    #[test]
    fn test_create_in_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = TempArtifact::create_unique(&dir.path().join("missing"), "dot", true).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
