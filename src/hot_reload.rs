use std::{
    path::{Path, PathBuf},
    time::SystemTime,
};

/// A file whose modification time is polled once per frame.
#[derive(Debug, Clone)]
pub struct WatchedFile {
    path: PathBuf,
    modified: Option<SystemTime>,
}

impl WatchedFile {
    /// Records the current modification time, if the file exists.
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            modified: modified_time(path),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-stats the file and returns true if it is newer than the last
    /// recorded time. The new time is recorded either way.
    pub fn poll(&mut self) -> bool {
        let current = modified_time(&self.path);
        let changed = match (current, self.modified) {
            (Some(current), Some(last)) => current > last,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if changed {
            self.modified = current;
        }
        changed
    }

    pub fn mark_current(&mut self) {
        self.modified = modified_time(&self.path);
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

#[cfg(test)]
mod tests {
    use std::{
        fs::File,
        time::{Duration, UNIX_EPOCH},
    };

    use super::*;

    fn touch(path: &Path, secs: u64) {
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(UNIX_EPOCH + Duration::from_secs(1_000_000 + secs))
            .unwrap();
    }

    #[test]
    fn reports_each_change_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene.lua");
        std::fs::write(&path, "").unwrap();
        touch(&path, 0);

        let mut file = WatchedFile::new(&path);
        assert!(!file.poll());

        touch(&path, 5);
        assert!(file.poll());
        assert!(!file.poll());

        // Older timestamps are not changes.
        touch(&path, 1);
        assert!(!file.poll());
    }

    #[test]
    fn file_created_later_changes_on_first_poll() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene.lua");

        let mut file = WatchedFile::new(&path);
        assert!(!file.poll());

        std::fs::write(&path, "").unwrap();
        assert!(file.poll());
        assert!(!file.poll());
    }

    #[test]
    fn missing_file_never_changes() {
        let mut file = WatchedFile::new(Path::new("does/not/exist.lua"));
        assert!(!file.poll());
    }
}
