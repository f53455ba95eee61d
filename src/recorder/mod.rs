// src/recorder/mod.rs

//! Package recording: resolves control-file paragraphs into normalized
//! database entities
//!
//! The recorder maps one paragraph onto a Package row, its per-branch
//! Details row, the owning Maintainer and the package's tags/labels.
//! All resolution is get-or-create on natural keys so re-recording the
//! same paragraph is a no-op.

pub mod relations;
pub mod sync;

use crate::control::Paragraph;
use crate::db::models::{Details, Label, Maintainer, Package, Tag};
use crate::error::{Error, Result};
use rusqlite::Connection;
use tracing::{debug, error, info};

/// Split a `"Display Name <email>"` maintainer field into (name, email)
///
/// A bare address yields an empty name; a bare name an empty email.
pub fn parse_maintainer(raw: &str) -> (String, String) {
    if let (Some(start), Some(end)) = (raw.find('<'), raw.rfind('>')) {
        if start < end {
            let name = raw[..start].trim().to_string();
            let email = raw[start + 1..end].trim().to_string();
            return (name, email);
        }
    }

    let raw = raw.trim();
    if raw.contains('@') {
        (String::new(), raw.to_string())
    } else {
        (raw.to_string(), String::new())
    }
}

/// Resolve a maintainer field to its database identity (get-or-create)
pub fn record_maintainer(conn: &Connection, raw: &str) -> Result<Maintainer> {
    let (name, email) = parse_maintainer(raw);
    let (maintainer, _) = Maintainer::get_or_create(conn, &name, &email)?;
    Ok(maintainer)
}

/// Copy a paragraph field onto an entity field, leaving the entity value
/// untouched when the paragraph does not carry the field
fn assign(dst: &mut Option<String>, src: &Option<String>) {
    if src.is_some() {
        dst.clone_from(src);
    }
}

/// Project the package-level fields of a paragraph onto a Package
fn apply_package_fields(package: &mut Package, paragraph: &Paragraph) {
    assign(&mut package.description, &paragraph.description);
    assign(&mut package.homepage, &paragraph.homepage);
    assign(&mut package.section, &paragraph.section);
    assign(&mut package.priority, &paragraph.priority);
    assign(&mut package.essential, &paragraph.essential);
    assign(&mut package.bugs, &paragraph.bugs);
    assign(&mut package.multi_arch, &paragraph.multi_arch);
}

/// Project the build-level fields of a paragraph onto a Details row
fn apply_detail_fields(details: &mut Details, paragraph: &Paragraph) {
    assign(&mut details.version, &paragraph.version);
    assign(&mut details.size, &paragraph.size);
    assign(&mut details.md5sum, &paragraph.md5sum);
    assign(&mut details.filename, &paragraph.filename);
    assign(&mut details.installed_size, &paragraph.installed_size);
}

/// Record a package from a paragraph
///
/// An existing package that already has a maintainer is returned
/// unchanged. An existing package without one gets its fields refreshed
/// and a maintainer attached. A new package is created fully, including
/// its tag list.
pub fn record_package(conn: &Connection, paragraph: &Paragraph) -> Result<Package> {
    if let Some(mut package) = Package::find_by_name(conn, &paragraph.package)? {
        if package.maintainer_id.is_some() {
            return Ok(package);
        }

        apply_package_fields(&mut package, paragraph);
        package.update(conn)?;

        // Work from the post-update row before attaching the maintainer
        let mut package = Package::find_by_name(conn, &paragraph.package)?.ok_or_else(|| {
            Error::Internal(format!("Package '{}' vanished mid-update", paragraph.package))
        })?;
        if let Some(raw) = &paragraph.maintainer {
            package.maintainer_id = record_maintainer(conn, raw)?.id;
            package.update(conn)?;
        }
        return Ok(package);
    }

    let mut package = Package::new(paragraph.package.clone());
    apply_package_fields(&mut package, paragraph);
    if let Some(raw) = &paragraph.maintainer {
        package.maintainer_id = record_maintainer(conn, raw)?.id;
    }
    package.insert(conn)?;
    record_tags(conn, paragraph, &package)?;
    Ok(package)
}

/// Record the details row for a (package, architecture, branch)
///
/// An existing row is returned as-is; refreshing fields is the update
/// path's responsibility.
pub fn record_details(
    conn: &Connection,
    paragraph: &Paragraph,
    package: &Package,
    branch: &str,
) -> Result<Details> {
    let package_id = package
        .id
        .ok_or_else(|| Error::Internal("Cannot record details without package ID".to_string()))?;
    let architecture = paragraph.architecture.as_deref().ok_or_else(|| {
        Error::Parse(format!(
            "Paragraph for '{}' has no Architecture field",
            paragraph.package
        ))
    })?;

    if let Some(existing) = Details::find_by_key(conn, package_id, architecture, branch)? {
        return Ok(existing);
    }

    let mut details = Details {
        id: None,
        package_id,
        version: None,
        architecture: architecture.to_string(),
        distribution: branch.to_string(),
        size: None,
        md5sum: None,
        filename: None,
        installed_size: None,
    };
    apply_detail_fields(&mut details, paragraph);
    details.insert(conn)?;
    Ok(details)
}

/// Record the `Tag` field of a paragraph as labels on the package
///
/// Entries are separated by `", "`, each of the form `facet::value`.
/// Entries without a `::` separator are skipped.
pub fn record_tags(conn: &Connection, paragraph: &Paragraph, package: &Package) -> Result<()> {
    let Some(raw) = &paragraph.tag else {
        return Ok(());
    };

    for entry in raw.replace('\n', "").split(", ") {
        let Some((facet, value)) = entry.split_once("::") else {
            debug!("Skipping malformed tag entry '{}'", entry);
            continue;
        };

        let (tag, _) = Tag::get_or_create(conn, value.trim())?;
        let tag_id = tag
            .id
            .ok_or_else(|| Error::Internal("Tag row has no ID".to_string()))?;
        let (label, _) = Label::get_or_create(conn, facet.trim(), tag_id)?;
        let label_id = label
            .id
            .ok_or_else(|| Error::Internal("Label row has no ID".to_string()))?;
        package.add_label(conn, label_id)?;
    }

    Ok(())
}

/// Record one paragraph's full content (the create path)
///
/// Any failure is logged with the package name and surfaced as a
/// non-fatal [`Error::Record`] so the caller can count it without
/// aborting the batch.
pub fn record_paragraph(conn: &Connection, paragraph: &Paragraph, branch: &str) -> Result<()> {
    info!(
        "Recording package '{}' into '{}' branch...",
        paragraph.package, branch
    );

    let result = (|| -> Result<()> {
        let package = record_package(conn, paragraph)?;
        let details = record_details(conn, paragraph, &package, branch)?;
        relations::record_relations(conn, &details, &paragraph.relations())?;
        Ok(())
    })();

    result.map_err(|e| {
        error!("Could not record {}: {}", paragraph.package, e);
        Error::Record {
            package: paragraph.package.clone(),
            reason: e.to_string(),
        }
    })
}

/// Refresh a package's fields from a paragraph, replacing the maintainer
/// if the name/email drifted from the raw field
pub fn update_package(conn: &Connection, paragraph: &Paragraph) -> Result<Package> {
    let mut package = Package::find_by_name(conn, &paragraph.package)?.ok_or_else(|| {
        Error::Parse(format!(
            "Cannot update unknown package '{}'",
            paragraph.package
        ))
    })?;

    apply_package_fields(&mut package, paragraph);

    if let Some(raw) = &paragraph.maintainer {
        let current = match package.maintainer_id {
            Some(id) => Maintainer::find_by_id(conn, id)?,
            None => None,
        };
        let drifted = match current {
            Some(m) => !raw.contains(&m.name) || !raw.contains(&m.email),
            None => true,
        };
        if drifted {
            package.maintainer_id = record_maintainer(conn, raw)?.id;
        }
    }

    package.update(conn)?;
    Ok(package)
}

/// Refresh a details row's fields from a paragraph
pub fn update_details(
    conn: &Connection,
    paragraph: &Paragraph,
    package: &Package,
    branch: &str,
) -> Result<Details> {
    let package_id = package
        .id
        .ok_or_else(|| Error::Internal("Cannot update details without package ID".to_string()))?;
    let architecture = paragraph.architecture.as_deref().ok_or_else(|| {
        Error::Parse(format!(
            "Paragraph for '{}' has no Architecture field",
            paragraph.package
        ))
    })?;

    let mut details = Details::find_by_key(conn, package_id, architecture, branch)?.ok_or_else(
        || {
            Error::Parse(format!(
                "No details for '{}' ({}, {})",
                paragraph.package, architecture, branch
            ))
        },
    )?;

    apply_detail_fields(&mut details, paragraph);
    details.update(conn)?;
    Ok(details)
}

/// Full refresh of one package from a paragraph: fields, maintainer,
/// details, and relations (prune + re-record)
pub fn update_paragraph(conn: &Connection, paragraph: &Paragraph, branch: &str) -> Result<()> {
    info!("Updating package '{}'", paragraph.package);

    let package = update_package(conn, paragraph)?;
    let details = update_details(conn, paragraph, &package, branch)?;
    relations::prune_relations(conn, &details)?;
    relations::record_relations(conn, &details, &paragraph.relations())?;

    info!("Package '{}' successfully updated", paragraph.package);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::parse_paragraphs;
    use crate::db::schema;
    use rusqlite::Connection;
    use tempfile::NamedTempFile;

    fn create_test_db() -> (NamedTempFile, Connection) {
        let temp_file = NamedTempFile::new().unwrap();
        let conn = Connection::open(temp_file.path()).unwrap();
        conn.execute("PRAGMA foreign_keys = ON", []).unwrap();
        schema::migrate(&conn).unwrap();
        (temp_file, conn)
    }

    fn sample_paragraph() -> Paragraph {
        let text = "\
Package: 0ad
Version: 0.0.26-1
Architecture: amd64
Maintainer: Jane Doe <jane@example.org>
Section: games
Priority: optional
Depends: 0ad-data (>= 0.0.26), libgl1-mesa-glx | libgl1
Tag: game::strategy, role::program
Size: 7891488
MD5sum: 1104e3879e3e3a6c44fe4d2a6081d42c
Filename: pool/main/0/0ad/0ad_0.0.26-1_amd64.deb
Description: Real-time strategy game of ancient warfare
";
        parse_paragraphs(text).unwrap().remove(0)
    }

    #[test]
    fn test_parse_maintainer() {
        assert_eq!(
            parse_maintainer("Jane Doe <jane@example.org>"),
            ("Jane Doe".to_string(), "jane@example.org".to_string())
        );
        assert_eq!(
            parse_maintainer("jane@example.org"),
            (String::new(), "jane@example.org".to_string())
        );
        assert_eq!(
            parse_maintainer("Jane Doe"),
            ("Jane Doe".to_string(), String::new())
        );
    }

    #[test]
    fn test_record_maintainer_identity_is_stable() {
        let (_temp, conn) = create_test_db();

        let first = record_maintainer(&conn, "Jane Doe <jane@example.org>").unwrap();
        let second = record_maintainer(&conn, "Jane Doe <jane@example.org>").unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.name, "Jane Doe");
        assert_eq!(first.email, "jane@example.org");
    }

    #[test]
    fn test_record_package_creates_fully() {
        let (_temp, conn) = create_test_db();
        let paragraph = sample_paragraph();

        let package = record_package(&conn, &paragraph).unwrap();
        assert_eq!(package.name, "0ad");
        assert_eq!(package.section.as_deref(), Some("games"));
        assert!(package.maintainer_id.is_some());

        // Tags were recorded on the create path
        let labels = package.labels(&conn).unwrap();
        assert_eq!(labels.len(), 2);
    }

    #[test]
    fn test_record_package_short_circuits_when_maintainer_present() {
        let (_temp, conn) = create_test_db();
        let mut paragraph = sample_paragraph();

        let first = record_package(&conn, &paragraph).unwrap();

        // A changed description must not be written by the record path
        paragraph.description = Some("Something else".to_string());
        let second = record_package(&conn, &paragraph).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(
            second.description.as_deref(),
            Some("Real-time strategy game of ancient warfare")
        );
    }

    #[test]
    fn test_record_package_completes_bare_package() {
        let (_temp, conn) = create_test_db();

        // A name-only package, as created when resolving a relation target
        let (bare, _) = Package::get_or_create(&conn, "0ad").unwrap();
        assert!(bare.maintainer_id.is_none());

        let paragraph = sample_paragraph();
        let package = record_package(&conn, &paragraph).unwrap();
        assert_eq!(package.id, bare.id);
        assert!(package.maintainer_id.is_some());
        assert_eq!(package.section.as_deref(), Some("games"));
    }

    #[test]
    fn test_record_details_is_get_or_create() {
        let (_temp, conn) = create_test_db();
        let mut paragraph = sample_paragraph();

        let package = record_package(&conn, &paragraph).unwrap();
        let first = record_details(&conn, &paragraph, &package, "auyantepui").unwrap();
        assert_eq!(
            first.md5sum.as_deref(),
            Some("1104e3879e3e3a6c44fe4d2a6081d42c")
        );

        // The record path does not refresh an existing row
        paragraph.md5sum = Some("ffffffffffffffffffffffffffffffff".to_string());
        let second = record_details(&conn, &paragraph, &package, "auyantepui").unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.md5sum, first.md5sum);
    }

    #[test]
    fn test_record_tags_round_trip() {
        let (_temp, conn) = create_test_db();
        let mut paragraph = sample_paragraph();
        paragraph.tag = Some("role::desktop, role::server".to_string());

        let (package, _) = Package::get_or_create(&conn, "0ad").unwrap();
        record_tags(&conn, &paragraph, &package).unwrap();

        let labels = package.labels(&conn).unwrap();
        assert_eq!(labels.len(), 2);

        // Re-processing the same value does not duplicate rows
        record_tags(&conn, &paragraph, &package).unwrap();
        assert_eq!(package.labels(&conn).unwrap().len(), 2);

        let tag_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM tags", [], |row| row.get(0))
            .unwrap();
        assert_eq!(tag_count, 2);
    }

    #[test]
    fn test_record_paragraph_is_idempotent() {
        let (_temp, conn) = create_test_db();
        let paragraph = sample_paragraph();

        record_paragraph(&conn, &paragraph, "auyantepui").unwrap();
        record_paragraph(&conn, &paragraph, "auyantepui").unwrap();

        let packages: i64 = conn
            .query_row("SELECT COUNT(*) FROM packages", [], |row| row.get(0))
            .unwrap();
        // 0ad plus the three relation targets
        assert_eq!(packages, 4);

        let details: i64 = conn
            .query_row("SELECT COUNT(*) FROM details", [], |row| row.get(0))
            .unwrap();
        assert_eq!(details, 1);

        let relations: i64 = conn
            .query_row("SELECT COUNT(*) FROM relations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(relations, 3);
    }

    #[test]
    fn test_update_package_replaces_drifted_maintainer() {
        let (_temp, conn) = create_test_db();
        let mut paragraph = sample_paragraph();

        let before = record_package(&conn, &paragraph).unwrap();

        paragraph.maintainer = Some("New Maintainer <new@example.org>".to_string());
        let after = update_package(&conn, &paragraph).unwrap();
        assert_eq!(before.id, after.id);
        assert_ne!(before.maintainer_id, after.maintainer_id);

        let maintainer = Maintainer::find_by_id(&conn, after.maintainer_id.unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(maintainer.name, "New Maintainer");
    }

    #[test]
    fn test_update_package_keeps_matching_maintainer() {
        let (_temp, conn) = create_test_db();
        let paragraph = sample_paragraph();

        let before = record_package(&conn, &paragraph).unwrap();
        let after = update_package(&conn, &paragraph).unwrap();
        assert_eq!(before.maintainer_id, after.maintainer_id);
    }

    #[test]
    fn test_update_details_refreshes_fields() {
        let (_temp, conn) = create_test_db();
        let mut paragraph = sample_paragraph();

        let package = record_package(&conn, &paragraph).unwrap();
        record_details(&conn, &paragraph, &package, "auyantepui").unwrap();

        paragraph.version = Some("0.0.27-1".to_string());
        paragraph.md5sum = Some("ffffffffffffffffffffffffffffffff".to_string());
        let updated = update_details(&conn, &paragraph, &package, "auyantepui").unwrap();
        assert_eq!(updated.version.as_deref(), Some("0.0.27-1"));
        assert_eq!(
            updated.md5sum.as_deref(),
            Some("ffffffffffffffffffffffffffffffff")
        );
    }

    #[test]
    fn test_update_paragraph_rerecords_relations() {
        let (_temp, conn) = create_test_db();
        let mut paragraph = sample_paragraph();

        record_paragraph(&conn, &paragraph, "auyantepui").unwrap();

        // Drop the alternatives, keep only the data dependency
        paragraph.depends = Some("0ad-data (>= 0.0.27)".to_string());
        paragraph.md5sum = Some("ffffffffffffffffffffffffffffffff".to_string());
        update_paragraph(&conn, &paragraph, "auyantepui").unwrap();

        let package = Package::find_by_name(&conn, "0ad").unwrap().unwrap();
        let details = Details::find_by_key(&conn, package.id.unwrap(), "amd64", "auyantepui")
            .unwrap()
            .unwrap();
        let relations = details.relations(&conn).unwrap();
        assert_eq!(relations.len(), 1);

        // Orphaned rows from the old relation set were deleted
        let total: i64 = conn
            .query_row("SELECT COUNT(*) FROM relations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(total, 1);
    }
}
