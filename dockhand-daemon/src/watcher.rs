//! Downloads-directory watcher core: listing, filtering, dedup.
//!
//! The file-system event source only says "something in the directory
//! changed"; every signal triggers a full re-listing here. One
//! [`DownloadsWatcher`] is a watch session: its seen-set guarantees each
//! disk image is dispatched at most once until the session is reset.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// File extension that marks a directory entry as a disk image.
pub const IMAGE_EXTENSION: &str = "dmg";

/// Listing and dedup state for one watch session.
#[derive(Debug)]
pub struct DownloadsWatcher {
    dir: PathBuf,
    seen: HashSet<PathBuf>,
}

impl DownloadsWatcher {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            seen: HashSet::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Images dispatched so far in this session.
    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    /// Forget everything seen. Files still present in the directory get
    /// dispatched again on the next scan, including ones already handled.
    pub fn reset(&mut self) {
        self.seen.clear();
    }

    /// One watcher tick: list the directory and return unseen disk images,
    /// sorted by path.
    ///
    /// Every returned path is inserted into the seen-set before this
    /// returns, so a concurrent-looking second tick can never hand out the
    /// same image again. A listing failure yields nothing; the watcher has
    /// to outlive transient read errors.
    pub fn scan_for_new_images(&mut self) -> Vec<PathBuf> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!(dir = %self.dir.display(), error = %err, "could not list watched directory");
                return Vec::new();
            }
        };

        let mut fresh = Vec::new();
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            if !is_disk_image(&path) {
                continue;
            }
            if self.seen.insert(path.clone()) {
                fresh.push(path);
            }
        }
        fresh.sort();
        fresh
    }
}

/// `.dmg` check on the extension, case-insensitive to match how browsers
/// actually name downloads.
pub fn is_disk_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(IMAGE_EXTENSION))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn only_disk_images_are_picked_up() {
        let dir = TempDir::new().expect("tempdir");
        fs::write(dir.path().join("App.dmg"), b"x").unwrap();
        fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        fs::write(dir.path().join("archive.dmg.part"), b"x").unwrap();

        let mut session = DownloadsWatcher::new(dir.path());
        let fresh = session.scan_for_new_images();
        assert_eq!(fresh, vec![dir.path().join("App.dmg")]);
    }

    #[test]
    fn extension_match_is_case_insensitive() {
        assert!(is_disk_image(Path::new("/dl/Upper.DMG")));
        assert!(is_disk_image(Path::new("/dl/Mixed.Dmg")));
        assert!(!is_disk_image(Path::new("/dl/none")));
        assert!(!is_disk_image(Path::new("/dl/trailing.dmg.download")));
    }

    #[test]
    fn second_scan_returns_nothing_for_the_same_files() {
        let dir = TempDir::new().expect("tempdir");
        fs::write(dir.path().join("Once.dmg"), b"x").unwrap();

        let mut session = DownloadsWatcher::new(dir.path());
        assert_eq!(session.scan_for_new_images().len(), 1);
        assert!(session.scan_for_new_images().is_empty());
        assert_eq!(session.seen_count(), 1);
    }

    #[test]
    fn new_files_between_scans_are_the_only_fresh_ones() {
        let dir = TempDir::new().expect("tempdir");
        fs::write(dir.path().join("First.dmg"), b"x").unwrap();

        let mut session = DownloadsWatcher::new(dir.path());
        session.scan_for_new_images();

        fs::write(dir.path().join("Second.dmg"), b"x").unwrap();
        let fresh = session.scan_for_new_images();
        assert_eq!(fresh, vec![dir.path().join("Second.dmg")]);
    }

    #[test]
    fn reset_makes_present_files_fresh_again() {
        let dir = TempDir::new().expect("tempdir");
        fs::write(dir.path().join("Keep.dmg"), b"x").unwrap();

        let mut session = DownloadsWatcher::new(dir.path());
        assert_eq!(session.scan_for_new_images().len(), 1);

        session.reset();
        assert_eq!(session.seen_count(), 0);
        assert_eq!(session.scan_for_new_images(), vec![dir.path().join("Keep.dmg")]);
    }

    #[test]
    fn unreadable_directory_yields_nothing() {
        let dir = TempDir::new().expect("tempdir");
        let gone = dir.path().join("missing");
        let mut session = DownloadsWatcher::new(&gone);
        assert!(session.scan_for_new_images().is_empty());
    }
}
