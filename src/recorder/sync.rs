// src/recorder/sync.rs

//! Sync orchestration: reconciling one package list against the database
//!
//! `update_package_list` is the per-file state machine (record new,
//! refresh changed, skip unchanged, remove stale); `fill_db_from_cache`
//! is the bulk population pass over an already-built cache.

use crate::control;
use crate::db::models::{Details, Package};
use crate::error::Result;
use crate::recorder::{self, relations};
use rusqlite::Connection;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

/// Outcome counters for one sync pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub recorded: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub removed: usize,
    pub failed: usize,
}

impl SyncReport {
    /// Fold another report's counters into this one
    pub fn merge(&mut self, other: &Self) {
        self.recorded += other.recorded;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
        self.removed += other.removed;
        self.failed += other.failed;
    }

    /// Total number of paragraphs this pass looked at
    pub fn total(&self) -> usize {
        self.recorded + self.updated + self.unchanged + self.failed
    }
}

/// Reconcile one package-list file against the database
///
/// Each paragraph is recorded if unseen, refreshed if its declared
/// md5sum changed, and skipped otherwise. Packages present in the
/// database for this (branch, architecture) but absent from the file are
/// stale: their details are pruned and deleted, and a package left with
/// no details at all is removed entirely.
pub fn update_package_list(
    conn: &Connection,
    path: &Path,
    branch: &str,
    architecture: &str,
) -> Result<SyncReport> {
    info!(
        "Syncing {} into '{}' ({})",
        path.display(),
        branch,
        architecture
    );

    let paragraphs = control::read_paragraphs(path)?;
    let mut report = SyncReport::default();
    let mut seen = HashSet::new();

    for paragraph in &paragraphs {
        seen.insert(paragraph.package.clone());

        let existing = match Package::find_by_name(conn, &paragraph.package)? {
            Some(package) => match package.id {
                Some(id) => Details::find_by_key(
                    conn,
                    id,
                    paragraph.architecture.as_deref().unwrap_or_default(),
                    branch,
                )?,
                None => None,
            },
            None => None,
        };

        match existing {
            Some(details) if details.md5sum == paragraph.md5sum => {
                debug!("Package '{}' is unchanged", paragraph.package);
                report.unchanged += 1;
            }
            Some(details) => {
                info!(
                    "Package '{}' changed: {} -> {}",
                    paragraph.package,
                    details.md5sum.as_deref().unwrap_or("none"),
                    paragraph.md5sum.as_deref().unwrap_or("none")
                );
                match recorder::update_paragraph(conn, paragraph, branch) {
                    Ok(()) => report.updated += 1,
                    Err(e) => {
                        error!("Could not update {}: {}", paragraph.package, e);
                        report.failed += 1;
                    }
                }
            }
            None => {
                info!("Adding new details for '{}'", paragraph.package);
                match recorder::record_paragraph(conn, paragraph, branch) {
                    Ok(()) => report.recorded += 1,
                    Err(_) => report.failed += 1,
                }
            }
        }
    }

    report.removed = remove_stale(conn, branch, architecture, &seen)?;

    info!(
        "Sync of {} done: {} recorded, {} updated, {} unchanged, {} removed, {} failed",
        path.display(),
        report.recorded,
        report.updated,
        report.unchanged,
        report.removed,
        report.failed
    );
    Ok(report)
}

/// Remove details (and emptied packages) no longer present in a freshly
/// parsed package list
fn remove_stale(
    conn: &Connection,
    branch: &str,
    architecture: &str,
    seen: &HashSet<String>,
) -> Result<usize> {
    let mut removed = 0;

    for package in Package::find_in_branch_arch(conn, branch, architecture)? {
        if seen.contains(&package.name) {
            continue;
        }

        for details in package.details(conn)? {
            if details.distribution != branch
                || (details.architecture != architecture && details.architecture != "all")
            {
                continue;
            }

            info!(
                "Removing '{}' ({}) from '{}'",
                package.name, details.architecture, branch
            );
            relations::prune_relations(conn, &details)?;
            if let Some(id) = details.id {
                Details::delete(conn, id)?;
                removed += 1;
            }
        }

        if package.details(conn)?.is_empty() {
            info!("Package '{}' has no details left, removing", package.name);
            if let Some(id) = package.id {
                Package::delete(conn, id)?;
            }
        }
    }

    Ok(removed)
}

/// Record every paragraph of every package list found under a cache
/// directory
///
/// The cache's first level is branch directories; below that, every
/// `Packages.gz` at any depth is parsed and recorded. Unreadable files
/// are logged and skipped. No diffing or stale removal happens here.
pub fn fill_db_from_cache(conn: &Connection, cache_dir: &Path) -> Result<SyncReport> {
    let mut report = SyncReport::default();

    for entry in fs::read_dir(cache_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let branch = entry.file_name().to_string_lossy().to_string();
        info!("Filling database from cached branch '{}'", branch);

        for file in WalkDir::new(entry.path())
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && e.file_name() == "Packages.gz")
        {
            let paragraphs = match control::read_paragraphs(file.path()) {
                Ok(paragraphs) => paragraphs,
                Err(e) => {
                    warn!("Skipping unreadable {}: {}", file.path().display(), e);
                    continue;
                }
            };

            for paragraph in &paragraphs {
                match recorder::record_paragraph(conn, paragraph, &branch) {
                    Ok(()) => report.recorded += 1,
                    Err(_) => report.failed += 1,
                }
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use rusqlite::Connection;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    fn create_test_db() -> (NamedTempFile, Connection) {
        let temp_file = NamedTempFile::new().unwrap();
        let conn = Connection::open(temp_file.path()).unwrap();
        conn.execute("PRAGMA foreign_keys = ON", []).unwrap();
        schema::migrate(&conn).unwrap();
        (temp_file, conn)
    }

    fn write_gz(path: &Path, content: &str) {
        let file = fs::File::create(path).unwrap();
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(content.as_bytes()).unwrap();
        encoder.finish().unwrap();
    }

    const LIST_V1: &str = "\
Package: 0ad
Version: 0.0.26-1
Architecture: amd64
Maintainer: Jane Doe <jane@example.org>
Depends: 0ad-data (>= 0.0.26)
MD5sum: 1104e3879e3e3a6c44fe4d2a6081d42c
Description: Real-time strategy game of ancient warfare

Package: acl
Version: 2.3.1-1
Architecture: amd64
Maintainer: John Roe <john@example.org>
MD5sum: 084b5e2d7e84e84a62cb60e4e96a6ddf
Description: access control list utilities
";

    // acl gains a new build; 0ad disappears
    const LIST_V2: &str = "\
Package: acl
Version: 2.3.2-1
Architecture: amd64
Maintainer: John Roe <john@example.org>
MD5sum: ffffffffffffffffffffffffffffffff
Description: access control list utilities
";

    #[test]
    fn test_update_package_list_records_then_skips() {
        let (_temp, conn) = create_test_db();
        let dir = TempDir::new().unwrap();
        let list = dir.path().join("Packages.gz");
        write_gz(&list, LIST_V1);

        let first = update_package_list(&conn, &list, "auyantepui", "amd64").unwrap();
        assert_eq!(first.recorded, 2);
        assert_eq!(first.failed, 0);

        let second = update_package_list(&conn, &list, "auyantepui", "amd64").unwrap();
        assert_eq!(second.recorded, 0);
        assert_eq!(second.unchanged, 2);
        assert_eq!(second.removed, 0);
    }

    #[test]
    fn test_update_package_list_updates_and_removes() {
        let (_temp, conn) = create_test_db();
        let dir = TempDir::new().unwrap();
        let list = dir.path().join("Packages.gz");

        write_gz(&list, LIST_V1);
        update_package_list(&conn, &list, "auyantepui", "amd64").unwrap();

        write_gz(&list, LIST_V2);
        let report = update_package_list(&conn, &list, "auyantepui", "amd64").unwrap();
        assert_eq!(report.updated, 1);
        assert_eq!(report.removed, 1);

        // 0ad is gone; its bare relation target 0ad-data lingers until a
        // paragraph of its own shows up or never, which is harmless
        assert!(Package::find_by_name(&conn, "0ad").unwrap().is_none());

        let acl = Package::find_by_name(&conn, "acl").unwrap().unwrap();
        let details = Details::find_by_key(&conn, acl.id.unwrap(), "amd64", "auyantepui")
            .unwrap()
            .unwrap();
        assert_eq!(details.version.as_deref(), Some("2.3.2-1"));
        assert_eq!(
            details.md5sum.as_deref(),
            Some("ffffffffffffffffffffffffffffffff")
        );
    }

    #[test]
    fn test_stale_pass_covers_arch_all() {
        let (_temp, conn) = create_test_db();
        let dir = TempDir::new().unwrap();
        let list = dir.path().join("Packages.gz");

        let with_all = "\
Package: fonts-dejavu
Version: 2.37-1
Architecture: all
Maintainer: Jane Doe <jane@example.org>
MD5sum: 0123456789abcdef0123456789abcdef
Description: metapackage of DejaVu fonts
";
        write_gz(&list, with_all);
        update_package_list(&conn, &list, "auyantepui", "amd64").unwrap();
        assert!(Package::find_by_name(&conn, "fonts-dejavu")
            .unwrap()
            .is_some());

        write_gz(&list, LIST_V2);
        let report = update_package_list(&conn, &list, "auyantepui", "amd64").unwrap();
        assert_eq!(report.removed, 1);
        assert!(Package::find_by_name(&conn, "fonts-dejavu")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_stale_pass_keeps_other_branch() {
        let (_temp, conn) = create_test_db();
        let dir = TempDir::new().unwrap();
        let list = dir.path().join("Packages.gz");

        write_gz(&list, LIST_V1);
        update_package_list(&conn, &list, "auyantepui", "amd64").unwrap();
        update_package_list(&conn, &list, "kukenan", "amd64").unwrap();

        // 0ad leaves auyantepui but stays in kukenan
        write_gz(&list, LIST_V2);
        update_package_list(&conn, &list, "auyantepui", "amd64").unwrap();

        let package = Package::find_by_name(&conn, "0ad").unwrap().unwrap();
        let details = package.details(&conn).unwrap();
        assert_eq!(details.len(), 1);
        assert_eq!(details[0].distribution, "kukenan");
    }

    #[test]
    fn test_malformed_paragraph_is_counted_not_fatal() {
        let (_temp, conn) = create_test_db();
        let dir = TempDir::new().unwrap();
        let list = dir.path().join("Packages.gz");

        // The second paragraph has no Architecture field, which the
        // recorder rejects
        let mixed = "\
Package: acl
Version: 2.3.1-1
Architecture: amd64
Maintainer: John Roe <john@example.org>
MD5sum: 084b5e2d7e84e84a62cb60e4e96a6ddf
Description: access control list utilities

Package: broken
Version: 1.0-1
Maintainer: John Roe <john@example.org>
MD5sum: 00000000000000000000000000000000
Description: no architecture declared
";
        write_gz(&list, mixed);
        let report = update_package_list(&conn, &list, "auyantepui", "amd64").unwrap();
        assert_eq!(report.recorded, 1);
        assert_eq!(report.failed, 1);
    }

    #[test]
    fn test_fill_db_from_cache() {
        let (_temp, conn) = create_test_db();
        let cache = TempDir::new().unwrap();

        let arch_dir = cache.path().join("auyantepui").join("main").join("amd64");
        fs::create_dir_all(&arch_dir).unwrap();
        write_gz(&arch_dir.join("Packages.gz"), LIST_V1);

        let other = cache.path().join("kukenan").join("main").join("i386");
        fs::create_dir_all(&other).unwrap();
        write_gz(&other.join("Packages.gz"), LIST_V2);

        let report = fill_db_from_cache(&conn, cache.path()).unwrap();
        assert_eq!(report.recorded, 3);
        assert_eq!(report.failed, 0);

        let acl = Package::find_by_name(&conn, "acl").unwrap().unwrap();
        assert_eq!(acl.details(&conn).unwrap().len(), 2);
    }

    #[test]
    fn test_report_merge() {
        let mut report = SyncReport {
            recorded: 1,
            updated: 2,
            unchanged: 3,
            removed: 0,
            failed: 1,
        };
        report.merge(&SyncReport {
            recorded: 1,
            removed: 2,
            ..Default::default()
        });
        assert_eq!(report.recorded, 2);
        assert_eq!(report.removed, 2);
        assert_eq!(report.total(), 8);
    }
}
