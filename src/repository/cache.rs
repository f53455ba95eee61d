// src/repository/cache.rs

//! Local cache of package-list files, keyed by declared checksum
//!
//! The cache mirrors every branch's `Packages.gz` files under
//! `<cache>/<branch>/<component>/<arch>/Packages.gz`. A file is only
//! re-fetched when its md5sum no longer matches what the branch's
//! Release manifest declares.

use crate::error::Result;
use crate::recorder::sync::{self, SyncReport};
use crate::repository::{
    join_url, md5_checksum, parse_packages_path, read_distributions, ReleaseManifest,
    RepositoryClient,
};
use rusqlite::Connection;
use std::fs;
use std::path::Path;
use tracing::{error, info, warn};

/// Local verdict for one declared checksum entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// Local file matches the declared checksum
    Fresh,
    /// Local file exists but its content diverged (or is unreadable)
    Stale,
    /// No local file yet
    Missing,
}

/// Compare a cached file against its declared md5sum
///
/// An unreadable file counts as stale so the walk can refetch it instead
/// of aborting.
pub fn check_cached(local: &Path, declared_md5: &str) -> CacheState {
    if !local.is_file() {
        return CacheState::Missing;
    }
    match md5_checksum(local) {
        Ok(sum) if sum == declared_md5 => CacheState::Fresh,
        Ok(_) => CacheState::Stale,
        Err(e) => {
            warn!("Could not checksum {}: {}", local.display(), e);
            CacheState::Stale
        }
    }
}

/// Populate a cache directory from scratch
///
/// Per branch, the Release manifest is fetched and every matching
/// package-list entry is downloaded. A missing or corrupt local file is
/// (re-)fetched; a file whose checksum matches is left alone. Branch and
/// file failures are logged and skipped so one bad branch cannot stall
/// the rest.
pub fn create_cache(
    client: &RepositoryClient,
    repository_root: &str,
    cache_dir: &Path,
) -> Result<()> {
    let branches = read_distributions(client, repository_root)?;

    for (branch, release_path) in branches {
        info!("Caching branch '{}'", branch);

        let release = match client.fetch_text(&join_url(repository_root, &release_path)) {
            Ok(content) => content,
            Err(e) => {
                warn!("Skipping branch '{}': {}", branch, e);
                continue;
            }
        };
        let manifest = match ReleaseManifest::parse(&release) {
            Ok(manifest) => manifest,
            Err(e) => {
                warn!("Release file for '{}' is not valid: {}", branch, e);
                continue;
            }
        };

        for entry in &manifest.checksums {
            let Some((component, arch)) = parse_packages_path(&entry.path) else {
                continue;
            };

            let local = cache_dir
                .join(&branch)
                .join(&component)
                .join(&arch)
                .join("Packages.gz");
            let remote = join_url(
                repository_root,
                &format!("dists/{}/{}", branch, entry.path),
            );

            match check_cached(&local, &entry.md5sum) {
                CacheState::Fresh => continue,
                CacheState::Stale => {
                    info!("Checksum mismatch for {}, refetching", local.display());
                    if let Err(e) = fs::remove_file(&local) {
                        error!("Could not remove {}: {}", local.display(), e);
                        continue;
                    }
                }
                CacheState::Missing => {}
            }

            if let Err(e) = client.download_file(&remote, &local) {
                error!("Could not download {}: {}", remote, e);
            }
        }
    }

    Ok(())
}

/// Refresh the cache and record every changed package list
///
/// Same walk as [`create_cache`], but each entry whose checksum changed
/// (or whose local file is missing) is re-fetched and then fed through
/// the sync pass for its (branch, architecture). Unchanged files are
/// neither fetched nor parsed.
pub fn update_cache(
    conn: &Connection,
    client: &RepositoryClient,
    repository_root: &str,
    cache_dir: &Path,
) -> Result<SyncReport> {
    let branches = read_distributions(client, repository_root)?;
    let mut report = SyncReport::default();

    for (branch, release_path) in branches {
        info!("Updating branch '{}'", branch);

        let release = match client.fetch_text(&join_url(repository_root, &release_path)) {
            Ok(content) => content,
            Err(e) => {
                warn!("Skipping branch '{}': {}", branch, e);
                continue;
            }
        };
        let manifest = match ReleaseManifest::parse(&release) {
            Ok(manifest) => manifest,
            Err(e) => {
                warn!("Release file for '{}' is not valid: {}", branch, e);
                continue;
            }
        };

        for entry in &manifest.checksums {
            let Some((component, arch)) = parse_packages_path(&entry.path) else {
                continue;
            };

            let local = cache_dir
                .join(&branch)
                .join(&component)
                .join(&arch)
                .join("Packages.gz");

            match check_cached(&local, &entry.md5sum) {
                CacheState::Fresh => {
                    info!("There are no changes in {}", local.display());
                    continue;
                }
                CacheState::Stale => {
                    if let Err(e) = fs::remove_file(&local) {
                        error!("Could not remove {}: {}", local.display(), e);
                        continue;
                    }
                }
                CacheState::Missing => {}
            }

            let remote = join_url(
                repository_root,
                &format!("dists/{}/{}", branch, entry.path),
            );
            if let Err(e) = client.download_file(&remote, &local) {
                error!("Could not download {}: {}", remote, e);
                continue;
            }

            record_list(conn, &local, &branch, &arch, &mut report);
        }
    }

    Ok(report)
}

/// Sync one freshly downloaded package list, containing its failure
///
/// A list the recorder cannot read counts as one failed entry; the walk
/// moves on to the next one.
fn record_list(
    conn: &Connection,
    local: &Path,
    branch: &str,
    arch: &str,
    report: &mut SyncReport,
) {
    match sync::update_package_list(conn, local, branch, arch) {
        Ok(list_report) => report.merge(&list_report),
        Err(e) => {
            error!("Could not sync {}: {}", local.display(), e);
            report.failed += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema;
    use tempfile::TempDir;

    #[test]
    fn test_check_cached_missing() {
        let dir = TempDir::new().unwrap();
        let local = dir.path().join("Packages.gz");
        assert_eq!(
            check_cached(&local, "900150983cd24fb0d6963f7d28e17f72"),
            CacheState::Missing
        );
    }

    #[test]
    fn test_check_cached_fresh_skips_refetch() {
        let dir = TempDir::new().unwrap();
        let local = dir.path().join("Packages.gz");
        fs::write(&local, b"abc").unwrap();

        // md5("abc"), as a Release manifest would declare it
        assert_eq!(
            check_cached(&local, "900150983cd24fb0d6963f7d28e17f72"),
            CacheState::Fresh
        );
    }

    #[test]
    fn test_check_cached_mismatch_is_stale() {
        let dir = TempDir::new().unwrap();
        let local = dir.path().join("Packages.gz");
        fs::write(&local, b"abc").unwrap();

        assert_eq!(
            check_cached(&local, "d41d8cd98f00b204e9800998ecf8427e"),
            CacheState::Stale
        );
    }

    #[test]
    fn test_record_list_contains_sync_failure() {
        let db_file = tempfile::NamedTempFile::new().unwrap();
        let conn = Connection::open(db_file.path()).unwrap();
        conn.execute("PRAGMA foreign_keys = ON", []).unwrap();
        schema::migrate(&conn).unwrap();

        let dir = TempDir::new().unwrap();
        let local = dir.path().join("Packages.gz");
        fs::write(&local, b"not a gzip stream").unwrap();

        let mut report = SyncReport::default();
        record_list(&conn, &local, "auyantepui", "amd64", &mut report);

        // The corrupt list is counted, not propagated
        assert_eq!(report.failed, 1);
        assert_eq!(report.recorded, 0);
    }

    #[test]
    fn test_cache_layout_path() {
        let cache = Path::new("/var/cache/debrec");
        let (component, arch) = parse_packages_path("main/binary-amd64/Packages.gz").unwrap();
        let local = cache
            .join("auyantepui")
            .join(&component)
            .join(&arch)
            .join("Packages.gz");
        assert_eq!(
            local,
            Path::new("/var/cache/debrec/auyantepui/main/amd64/Packages.gz")
        );
    }
}
