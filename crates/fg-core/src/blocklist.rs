//! Hosts-file block list management.
//!
//! Blocked sites live in a single delimited region of the hosts file:
//!
//! ```text
//! <unrelated existing content, untouched>
//! # FocusGuard START
//! # Updated: 2024-01-01T09:00:00Z
//! 127.0.0.1 example.com
//! # FocusGuard END
//! ```
//!
//! Every update reads the whole file, removes the old region (markers
//! inclusive), appends a freshly rendered one when there is anything to block,
//! and writes the result back. Content outside the region is never modified.
//! Malformed markers are reported as [`BlockListError::CorruptState`] and the
//! file is left exactly as found.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, SecondsFormat, Utc};
use fs2::FileExt;
use thiserror::Error;

/// Address every blocked site is redirected to.
pub const REDIRECT_IP: &str = "127.0.0.1";

/// First line of the block region.
pub const START_MARKER: &str = "# FocusGuard START";

/// Last line of the block region.
pub const END_MARKER: &str = "# FocusGuard END";

const UPDATED_PREFIX: &str = "# Updated: ";

/// Block list errors.
#[derive(Debug, Error)]
pub enum BlockListError {
    /// The hosts file cannot be opened for writing.
    #[error(
        "permission denied writing {}; re-run with sudo (or as Administrator on Windows)",
        .path.display()
    )]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The region markers are malformed; nothing was written.
    #[error("block list in {} is corrupt ({reason}); inspect the file manually", .path.display())]
    CorruptState { path: PathBuf, reason: String },
    /// Any other read or write failure.
    #[error("failed to update {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Exclusive owner of the hosts-file block region.
///
/// Updates are serialized in-process by a mutex and across processes by an
/// exclusive advisory lock held for the whole read-patch-write cycle.
#[derive(Debug)]
pub struct BlockList {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl BlockList {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Makes the block region list exactly `sites`.
    ///
    /// An empty set removes the region. Blank entries are skipped and
    /// duplicates collapsed, keeping first-seen order. Re-applying the set the
    /// region already lists leaves the file byte-for-byte unchanged.
    pub fn apply<S: AsRef<str>>(&self, sites: &[S]) -> Result<(), BlockListError> {
        let sites = normalize_sites(sites);
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(|source| self.io_error(source))?;
        file.lock_exclusive()
            .map_err(|source| self.io_error(source))?;

        let changed = self.rewrite_locked(&mut file, &sites)?;
        if changed {
            tracing::info!(path = %self.path.display(), sites = sites.len(), "block list updated");
        } else {
            tracing::debug!(path = %self.path.display(), "block list already up to date");
        }
        Ok(())
    }

    /// Removes the block region, if present.
    pub fn clear(&self) -> Result<(), BlockListError> {
        self.apply::<&str>(&[])
    }

    /// Sites listed in the block region, or `None` when there is no region.
    ///
    /// Reads the file once.
    pub fn region_sites(&self) -> Result<Option<Vec<String>>, BlockListError> {
        let content = self.read()?;
        let region = find_region(&content).map_err(|reason| self.corrupt(reason))?;
        Ok(region.map(|r| listed_sites(&content[r.start..r.end])))
    }

    /// Sites listed in the current block region; empty when there is none.
    pub fn blocked_sites(&self) -> Result<Vec<String>, BlockListError> {
        Ok(self.region_sites()?.unwrap_or_default())
    }

    /// Whether the hosts file currently carries a block region.
    pub fn is_blocking(&self) -> Result<bool, BlockListError> {
        Ok(self.region_sites()?.is_some())
    }

    fn read(&self) -> Result<String, BlockListError> {
        std::fs::read_to_string(&self.path).map_err(|source| self.io_error(source))
    }

    /// Returns whether the file content changed.
    fn rewrite_locked(&self, file: &mut File, sites: &[String]) -> Result<bool, BlockListError> {
        let mut content = String::new();
        file.read_to_string(&mut content)
            .map_err(|source| self.io_error(source))?;

        let patched = patch(&content, sites, Utc::now()).map_err(|reason| self.corrupt(reason))?;
        if patched == content {
            return Ok(false);
        }

        let write = |file: &mut File| -> io::Result<()> {
            file.seek(SeekFrom::Start(0))?;
            file.set_len(0)?;
            file.write_all(patched.as_bytes())?;
            file.sync_all()
        };
        write(file).map_err(|source| self.io_error(source))?;
        Ok(true)
    }

    fn io_error(&self, source: io::Error) -> BlockListError {
        let path = self.path.clone();
        if source.kind() == io::ErrorKind::PermissionDenied {
            BlockListError::PermissionDenied { path, source }
        } else {
            BlockListError::Io { path, source }
        }
    }

    fn corrupt(&self, reason: &'static str) -> BlockListError {
        tracing::warn!(path = %self.path.display(), reason, "refusing to patch malformed block list");
        BlockListError::CorruptState {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }
}

/// Byte range of the block region, end exclusive and including the end
/// marker's line break.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Region {
    start: usize,
    end: usize,
}

fn find_region(content: &str) -> Result<Option<Region>, &'static str> {
    let mut start = None;
    let mut end = None;
    let mut offset = 0;

    for line in content.split_inclusive('\n') {
        let text = line.trim_end_matches(['\r', '\n']);
        if text == START_MARKER {
            if start.is_some() {
                return Err("duplicate start marker");
            }
            start = Some(offset);
        } else if text == END_MARKER {
            if end.is_some() {
                return Err("duplicate end marker");
            }
            if start.is_none() {
                return Err("end marker without a preceding start marker");
            }
            end = Some(offset + line.len());
        }
        offset += line.len();
    }

    // An end marker is only ever recorded after a start marker.
    match (start, end) {
        (Some(start), Some(end)) => Ok(Some(Region { start, end })),
        (Some(_), None) => Err("start marker without an end marker"),
        (None, _) => Ok(None),
    }
}

fn listed_sites(region: &str) -> Vec<String> {
    region
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_whitespace().nth(1))
        .map(str::to_string)
        .collect()
}

fn normalize_sites<S: AsRef<str>>(sites: &[S]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    sites
        .iter()
        .map(|site| site.as_ref().trim())
        .filter(|site| !site.is_empty() && seen.insert(*site))
        .map(str::to_string)
        .collect()
}

fn render_region(sites: &[String], updated: DateTime<Utc>) -> String {
    let mut region = String::new();
    region.push_str(START_MARKER);
    region.push('\n');
    region.push_str(UPDATED_PREFIX);
    region.push_str(&updated.to_rfc3339_opts(SecondsFormat::Secs, true));
    region.push('\n');
    for site in sites {
        region.push_str(REDIRECT_IP);
        region.push(' ');
        region.push_str(site);
        region.push('\n');
    }
    region.push_str(END_MARKER);
    region.push('\n');
    region
}

/// Computes the new file content for `sites`.
fn patch(content: &str, sites: &[String], now: DateTime<Utc>) -> Result<String, &'static str> {
    let region = find_region(content)?;

    if let Some(r) = region {
        if !sites.is_empty() && listed_sites(&content[r.start..r.end]) == sites {
            return Ok(content.to_string());
        }
    }

    let mut patched = match region {
        Some(r) => format!("{}{}", &content[..r.start], &content[r.end..]),
        None => content.to_string(),
    };
    if !sites.is_empty() {
        if !patched.is_empty() && !patched.ends_with('\n') {
            patched.push('\n');
        }
        patched.push_str(&render_region(sites, now));
    }
    Ok(patched)
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::TimeZone;
    use insta::assert_snapshot;

    const HOSTS: &str = "127.0.0.1 localhost\n::1 localhost\n";

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap()
    }

    fn sites(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    fn hosts_file(content: &str) -> (tempfile::TempDir, BlockList) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hosts");
        std::fs::write(&path, content).unwrap();
        (dir, BlockList::new(path))
    }

    fn read(list: &BlockList) -> String {
        std::fs::read_to_string(list.path()).unwrap()
    }

    #[test]
    fn patch_appends_region_after_existing_content() {
        let patched = patch(HOSTS, &sites(&["facebook.com", "x.com"]), fixed_now()).unwrap();
        assert_snapshot!(patched, @r"
        127.0.0.1 localhost
        ::1 localhost
        # FocusGuard START
        # Updated: 2024-01-01T09:00:00Z
        127.0.0.1 facebook.com
        127.0.0.1 x.com
        # FocusGuard END
        ");
    }

    #[test]
    fn patch_replaces_region_with_new_set() {
        let first = patch(HOSTS, &sites(&["facebook.com"]), fixed_now()).unwrap();
        let second = patch(&first, &sites(&["reddit.com"]), fixed_now()).unwrap();
        assert_eq!(listed_sites(&second), vec!["localhost", "localhost", "reddit.com"]);
        assert_eq!(second.matches(START_MARKER).count(), 1);
        assert_eq!(second.matches(END_MARKER).count(), 1);
        assert!(second.starts_with(HOSTS));
    }

    #[test]
    fn patch_with_empty_set_removes_region() {
        let blocked = patch(HOSTS, &sites(&["facebook.com"]), fixed_now()).unwrap();
        assert_eq!(patch(&blocked, &[], fixed_now()).unwrap(), HOSTS);
        assert_eq!(patch(HOSTS, &[], fixed_now()).unwrap(), HOSTS);
    }

    #[test]
    fn patch_keeps_content_after_region() {
        let content = format!(
            "{HOSTS}{START_MARKER}\n# Updated: x\n127.0.0.1 a.com\n{END_MARKER}\n10.0.0.1 nas.local\n"
        );
        let cleared = patch(&content, &[], fixed_now()).unwrap();
        assert_eq!(cleared, format!("{HOSTS}10.0.0.1 nas.local\n"));
    }

    #[test]
    fn patch_same_set_is_unchanged() {
        let once = patch(HOSTS, &sites(&["a.com", "b.com"]), fixed_now()).unwrap();
        let later = Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap();
        let twice = patch(&once, &sites(&["a.com", "b.com"]), later).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn patch_adds_line_break_before_region() {
        let patched = patch("127.0.0.1 localhost", &sites(&["a.com"]), fixed_now()).unwrap();
        assert!(patched.starts_with("127.0.0.1 localhost\n# FocusGuard START\n"));
    }

    #[test]
    fn patch_handles_crlf_line_endings() {
        let content = format!(
            "127.0.0.1 localhost\r\n{START_MARKER}\r\n# Updated: x\r\n127.0.0.1 a.com\r\n{END_MARKER}\r\n"
        );
        let cleared = patch(&content, &[], fixed_now()).unwrap();
        assert_eq!(cleared, "127.0.0.1 localhost\r\n");
    }

    #[test]
    fn malformed_markers_are_rejected() {
        let missing_end = format!("{HOSTS}{START_MARKER}\n127.0.0.1 a.com\n");
        assert_eq!(
            find_region(&missing_end),
            Err("start marker without an end marker")
        );

        let reversed = format!("{HOSTS}{END_MARKER}\n127.0.0.1 a.com\n{START_MARKER}\n");
        assert_eq!(
            find_region(&reversed),
            Err("end marker without a preceding start marker")
        );

        let duplicated = format!(
            "{START_MARKER}\n{END_MARKER}\n{START_MARKER}\n{END_MARKER}\n"
        );
        assert_eq!(find_region(&duplicated), Err("duplicate start marker"));
    }

    #[test]
    fn markers_must_match_whole_lines() {
        let content = format!("{HOSTS}## {START_MARKER} (old)\n");
        assert_eq!(find_region(&content), Ok(None));
    }

    #[test]
    fn normalize_sites_dedups_and_skips_blanks() {
        let normalized = normalize_sites(&["a.com", " ", "b.com", "a.com", " c.com "]);
        assert_eq!(normalized, vec!["a.com", "b.com", "c.com"]);
    }

    #[test]
    fn apply_twice_is_idempotent() {
        let (_dir, list) = hosts_file(HOSTS);
        list.apply(&["facebook.com", "youtube.com"]).unwrap();
        let once = read(&list);
        list.apply(&["facebook.com", "youtube.com"]).unwrap();
        assert_eq!(read(&list), once);
        assert_eq!(list.blocked_sites().unwrap(), vec!["facebook.com", "youtube.com"]);
    }

    #[test]
    fn clear_restores_original_content() {
        let (_dir, list) = hosts_file(HOSTS);
        list.apply(&["facebook.com"]).unwrap();
        assert!(list.is_blocking().unwrap());

        list.clear().unwrap();
        assert_eq!(read(&list), HOSTS);
        assert!(!list.is_blocking().unwrap());
        assert!(list.blocked_sites().unwrap().is_empty());
    }

    #[test]
    fn apply_empty_set_matches_clear() {
        let (_dir, list) = hosts_file(HOSTS);
        list.apply(&["facebook.com"]).unwrap();
        list.apply::<String>(&[]).unwrap();
        assert_eq!(read(&list), HOSTS);
    }

    #[test]
    fn corrupt_file_is_left_untouched() {
        let content = format!("{HOSTS}{START_MARKER}\n127.0.0.1 a.com\n");
        let (_dir, list) = hosts_file(&content);

        let err = list.apply(&["b.com"]).unwrap_err();
        assert!(matches!(err, BlockListError::CorruptState { .. }));
        assert!(matches!(
            list.clear().unwrap_err(),
            BlockListError::CorruptState { .. }
        ));
        assert_eq!(read(&list), content);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let list = BlockList::new(dir.path().join("missing"));
        let err = list.apply(&["a.com"]).unwrap_err();
        assert!(matches!(err, BlockListError::Io { .. }));
    }

    #[test]
    fn permission_errors_are_classified() {
        let list = BlockList::new("/etc/hosts");
        let err = list.io_error(io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(err, BlockListError::PermissionDenied { .. }));
        assert!(err.to_string().contains("sudo"));

        let err = list.io_error(io::Error::from(io::ErrorKind::Interrupted));
        assert!(matches!(err, BlockListError::Io { .. }));
    }

    #[test]
    fn concurrent_applies_never_duplicate_region() {
        let (_dir, list) = hosts_file(HOSTS);
        let list = std::sync::Arc::new(list);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let list = std::sync::Arc::clone(&list);
                std::thread::spawn(move || {
                    let site = format!("site{}.com", i % 2);
                    list.apply(&[site]).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let content = read(&list);
        assert_eq!(content.matches(START_MARKER).count(), 1);
        assert_eq!(content.matches(END_MARKER).count(), 1);
        assert!(content.starts_with(HOSTS));
    }

    #[test]
    fn region_sites_distinguishes_empty_region_from_none() {
        let (_dir, list) = hosts_file(HOSTS);
        assert_eq!(list.region_sites().unwrap(), None);

        list.apply(&["reddit.com"]).unwrap();
        assert_eq!(list.region_sites().unwrap(), Some(sites(&["reddit.com"])));

        let empty = format!("{HOSTS}{START_MARKER}\n{END_MARKER}\n");
        std::fs::write(list.path(), empty).unwrap();
        assert_eq!(list.region_sites().unwrap(), Some(Vec::new()));
        assert!(list.is_blocking().unwrap());
        assert!(list.blocked_sites().unwrap().is_empty());
    }
}
