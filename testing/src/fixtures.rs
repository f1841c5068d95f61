use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Once;
use std::sync::atomic::{AtomicU32, Ordering};
use tempfile::TempDir;

static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);
static TRACING: Once = Once::new();

pub fn unique_id(prefix: &str) -> String {
    let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("{}-{}", prefix, id)
}

/// Install a subscriber that writes through the test harness. Honors
/// `RUST_LOG`; defaults to `warn`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Temporary base directory handed to `BoundConfig::load`.
pub struct DataDir {
    dir: TempDir
}

impl DataDir {
    pub fn new() -> io::Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(&unique_id("binding-data"))
            .tempdir()?;
        tracing::debug!(path = %dir.path().display(), "Created data directory");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn file(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.dir.path().join(relative)
    }

    /// Write `contents` to `relative`, creating parent directories.
    pub fn write(&self, relative: impl AsRef<Path>, contents: &str) -> io::Result<PathBuf> {
        let path = self.file(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, contents)?;
        Ok(path)
    }

    pub fn read(&self, relative: impl AsRef<Path>) -> io::Result<String> {
        fs::read_to_string(self.file(relative))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_id_increments() {
        let a = unique_id("cfg");
        let b = unique_id("cfg");
        assert_ne!(a, b);
        assert!(a.starts_with("cfg-"));
    }

    #[test]
    fn test_data_dir_write_and_read() {
        let data = DataDir::new().unwrap();
        let path = data.write("nested/dir/app.yml", "key: 1\n").unwrap();

        assert!(path.starts_with(data.path()));
        assert_eq!(data.read("nested/dir/app.yml").unwrap(), "key: 1\n");
    }

    #[test]
    fn test_data_dir_removed_on_drop() {
        let data = DataDir::new().unwrap();
        let path = data.path().to_path_buf();
        drop(data);
        assert!(!path.exists());
    }
}
