// src/db/models.rs

//! Data models for debrec database entities
//!
//! This module defines Rust structs that correspond to database tables
//! and provides methods for creating, reading, updating, and deleting
//! records. Every entity follows get-or-create semantics on its natural
//! key so a sync pass never duplicates rows.

use crate::error::Result;
use rusqlite::{params, Connection, OptionalExtension, Row};

/// A Maintainer identity parsed from a control file's free-text field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Maintainer {
    pub id: Option<i64>,
    pub name: String,
    pub email: String,
}

impl Maintainer {
    /// Find a maintainer by (name, email), creating it if absent
    ///
    /// Returns the maintainer and whether a new row was created.
    pub fn get_or_create(conn: &Connection, name: &str, email: &str) -> Result<(Self, bool)> {
        let existing = conn
            .prepare("SELECT id, name, email FROM maintainers WHERE name = ?1 AND email = ?2")?
            .query_row([name, email], Self::from_row)
            .optional()?;

        if let Some(maintainer) = existing {
            return Ok((maintainer, false));
        }

        conn.execute(
            "INSERT INTO maintainers (name, email) VALUES (?1, ?2)",
            [name, email],
        )?;

        Ok((
            Self {
                id: Some(conn.last_insert_rowid()),
                name: name.to_string(),
                email: email.to_string(),
            },
            true,
        ))
    }

    /// Find a maintainer by ID
    pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<Self>> {
        let maintainer = conn
            .prepare("SELECT id, name, email FROM maintainers WHERE id = ?1")?
            .query_row([id], Self::from_row)
            .optional()?;
        Ok(maintainer)
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            name: row.get(1)?,
            email: row.get(2)?,
        })
    }
}

/// A Package identified by its unique name
///
/// Descriptive fields stay NULL until the first full record; a package
/// whose maintainer is set is considered fully recorded.
#[derive(Debug, Clone, Default)]
pub struct Package {
    pub id: Option<i64>,
    pub name: String,
    pub description: Option<String>,
    pub homepage: Option<String>,
    pub section: Option<String>,
    pub priority: Option<String>,
    pub essential: Option<String>,
    pub bugs: Option<String>,
    pub multi_arch: Option<String>,
    pub maintainer_id: Option<i64>,
}

const PACKAGE_COLUMNS: &str = "id, name, description, homepage, section, priority, essential, bugs, multi_arch, maintainer_id";

impl Package {
    /// Create a new Package with only its name set
    pub fn new(name: String) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }

    /// Insert this package into the database
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO packages (name, description, homepage, section, priority, essential, bugs, multi_arch, maintainer_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                &self.name,
                &self.description,
                &self.homepage,
                &self.section,
                &self.priority,
                &self.essential,
                &self.bugs,
                &self.multi_arch,
                &self.maintainer_id,
            ],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    /// Find a package by name, creating a name-only row if absent
    pub fn get_or_create(conn: &Connection, name: &str) -> Result<(Self, bool)> {
        if let Some(package) = Self::find_by_name(conn, name)? {
            return Ok((package, false));
        }

        let mut package = Self::new(name.to_string());
        package.insert(conn)?;
        Ok((package, true))
    }

    /// Find a package by name
    pub fn find_by_name(conn: &Connection, name: &str) -> Result<Option<Self>> {
        let package = conn
            .prepare(&format!(
                "SELECT {} FROM packages WHERE name = ?1",
                PACKAGE_COLUMNS
            ))?
            .query_row([name], Self::from_row)
            .optional()?;
        Ok(package)
    }

    /// Find a package by ID
    pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<Self>> {
        let package = conn
            .prepare(&format!(
                "SELECT {} FROM packages WHERE id = ?1",
                PACKAGE_COLUMNS
            ))?
            .query_row([id], Self::from_row)
            .optional()?;
        Ok(package)
    }

    /// List all packages ordered by name
    pub fn list_all(conn: &Connection) -> Result<Vec<Self>> {
        let packages = conn
            .prepare(&format!(
                "SELECT {} FROM packages ORDER BY name",
                PACKAGE_COLUMNS
            ))?
            .query_map([], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(packages)
    }

    /// Packages that have a details row for the given distribution and
    /// architecture (or architecture "all")
    ///
    /// Used by the stale pass after a control file has been processed.
    pub fn find_in_branch_arch(
        conn: &Connection,
        distribution: &str,
        architecture: &str,
    ) -> Result<Vec<Self>> {
        let packages = conn
            .prepare(&format!(
                "SELECT DISTINCT p.{} FROM packages p
                 JOIN details d ON d.package_id = p.id
                 WHERE d.distribution = ?1
                   AND (d.architecture = ?2 OR d.architecture = 'all')",
                PACKAGE_COLUMNS.replace(", ", ", p.")
            ))?
            .query_map([distribution, architecture], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(packages)
    }

    /// Update all mutable fields of this package
    pub fn update(&self, conn: &Connection) -> Result<()> {
        let id = self.id.ok_or_else(|| {
            crate::error::Error::Internal("Cannot update package without ID".to_string())
        })?;

        conn.execute(
            "UPDATE packages SET description = ?1, homepage = ?2, section = ?3, priority = ?4,
             essential = ?5, bugs = ?6, multi_arch = ?7, maintainer_id = ?8 WHERE id = ?9",
            params![
                &self.description,
                &self.homepage,
                &self.section,
                &self.priority,
                &self.essential,
                &self.bugs,
                &self.multi_arch,
                &self.maintainer_id,
                id,
            ],
        )?;

        Ok(())
    }

    /// Delete a package by ID
    pub fn delete(conn: &Connection, id: i64) -> Result<()> {
        conn.execute("DELETE FROM packages WHERE id = ?1", [id])?;
        Ok(())
    }

    /// Attach a label to this package (no-op if already attached)
    pub fn add_label(&self, conn: &Connection, label_id: i64) -> Result<()> {
        conn.execute(
            "INSERT OR IGNORE INTO package_labels (package_id, label_id) VALUES (?1, ?2)",
            params![self.id, label_id],
        )?;
        Ok(())
    }

    /// Labels attached to this package
    pub fn labels(&self, conn: &Connection) -> Result<Vec<Label>> {
        let labels = conn
            .prepare(
                "SELECT l.id, l.name, l.tag_id FROM labels l
                 JOIN package_labels pl ON pl.label_id = l.id
                 WHERE pl.package_id = ?1 ORDER BY l.name",
            )?
            .query_map([self.id], Label::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(labels)
    }

    /// All details rows owned by this package
    pub fn details(&self, conn: &Connection) -> Result<Vec<Details>> {
        let id = self.id.ok_or_else(|| {
            crate::error::Error::Internal("Cannot query details without package ID".to_string())
        })?;
        Details::find_by_package(conn, id)
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            name: row.get(1)?,
            description: row.get(2)?,
            homepage: row.get(3)?,
            section: row.get(4)?,
            priority: row.get(5)?,
            essential: row.get(6)?,
            bugs: row.get(7)?,
            multi_arch: row.get(8)?,
            maintainer_id: row.get(9)?,
        })
    }
}

/// A Tag is a leaf value, e.g. "desktop" from "role::desktop"
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub id: Option<i64>,
    pub value: String,
}

impl Tag {
    /// Find a tag by value, creating it if absent
    pub fn get_or_create(conn: &Connection, value: &str) -> Result<(Self, bool)> {
        let existing = conn
            .prepare("SELECT id, value FROM tags WHERE value = ?1")?
            .query_row([value], Self::from_row)
            .optional()?;

        if let Some(tag) = existing {
            return Ok((tag, false));
        }

        conn.execute("INSERT INTO tags (value) VALUES (?1)", [value])?;

        Ok((
            Self {
                id: Some(conn.last_insert_rowid()),
                value: value.to_string(),
            },
            true,
        ))
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            value: row.get(1)?,
        })
    }
}

/// A Label binds a facet name to a tag, e.g. "role" -> "desktop"
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub id: Option<i64>,
    pub name: String,
    pub tag_id: i64,
}

impl Label {
    /// Find a label by (name, tag), creating it if absent
    pub fn get_or_create(conn: &Connection, name: &str, tag_id: i64) -> Result<(Self, bool)> {
        let existing = conn
            .prepare("SELECT id, name, tag_id FROM labels WHERE name = ?1 AND tag_id = ?2")?
            .query_row(params![name, tag_id], Self::from_row)
            .optional()?;

        if let Some(label) = existing {
            return Ok((label, false));
        }

        conn.execute(
            "INSERT INTO labels (name, tag_id) VALUES (?1, ?2)",
            params![name, tag_id],
        )?;

        Ok((
            Self {
                id: Some(conn.last_insert_rowid()),
                name: name.to_string(),
                tag_id,
            },
            true,
        ))
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            name: row.get(1)?,
            tag_id: row.get(2)?,
        })
    }
}

/// A Details row: one (package, architecture, distribution) build record
#[derive(Debug, Clone, Default)]
pub struct Details {
    pub id: Option<i64>,
    pub package_id: i64,
    pub version: Option<String>,
    pub architecture: String,
    pub distribution: String,
    pub size: Option<String>,
    pub md5sum: Option<String>,
    pub filename: Option<String>,
    pub installed_size: Option<String>,
}

const DETAILS_COLUMNS: &str =
    "id, package_id, version, architecture, distribution, size, md5sum, filename, installed_size";

impl Details {
    /// Insert this details row into the database
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO details (package_id, version, architecture, distribution, size, md5sum, filename, installed_size)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                &self.package_id,
                &self.version,
                &self.architecture,
                &self.distribution,
                &self.size,
                &self.md5sum,
                &self.filename,
                &self.installed_size,
            ],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    /// Find a details row by its natural key
    pub fn find_by_key(
        conn: &Connection,
        package_id: i64,
        architecture: &str,
        distribution: &str,
    ) -> Result<Option<Self>> {
        let details = conn
            .prepare(&format!(
                "SELECT {} FROM details WHERE package_id = ?1 AND architecture = ?2 AND distribution = ?3",
                DETAILS_COLUMNS
            ))?
            .query_row(
                params![package_id, architecture, distribution],
                Self::from_row,
            )
            .optional()?;
        Ok(details)
    }

    /// All details rows for a package
    pub fn find_by_package(conn: &Connection, package_id: i64) -> Result<Vec<Self>> {
        let details = conn
            .prepare(&format!(
                "SELECT {} FROM details WHERE package_id = ?1 ORDER BY distribution, architecture",
                DETAILS_COLUMNS
            ))?
            .query_map([package_id], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(details)
    }

    /// Update all mutable fields of this details row
    pub fn update(&self, conn: &Connection) -> Result<()> {
        let id = self.id.ok_or_else(|| {
            crate::error::Error::Internal("Cannot update details without ID".to_string())
        })?;

        conn.execute(
            "UPDATE details SET version = ?1, size = ?2, md5sum = ?3, filename = ?4,
             installed_size = ?5 WHERE id = ?6",
            params![
                &self.version,
                &self.size,
                &self.md5sum,
                &self.filename,
                &self.installed_size,
                id,
            ],
        )?;

        Ok(())
    }

    /// Delete a details row by ID
    pub fn delete(conn: &Connection, id: i64) -> Result<()> {
        conn.execute("DELETE FROM details_relations WHERE details_id = ?1", [id])?;
        conn.execute("DELETE FROM details WHERE id = ?1", [id])?;
        Ok(())
    }

    /// Attach a relation to this details row (no-op if already attached)
    pub fn add_relation(&self, conn: &Connection, relation_id: i64) -> Result<()> {
        conn.execute(
            "INSERT OR IGNORE INTO details_relations (details_id, relation_id) VALUES (?1, ?2)",
            params![self.id, relation_id],
        )?;
        Ok(())
    }

    /// Detach a relation from this details row
    pub fn remove_relation(&self, conn: &Connection, relation_id: i64) -> Result<()> {
        conn.execute(
            "DELETE FROM details_relations WHERE details_id = ?1 AND relation_id = ?2",
            params![self.id, relation_id],
        )?;
        Ok(())
    }

    /// Relations currently attached to this details row
    pub fn relations(&self, conn: &Connection) -> Result<Vec<Relation>> {
        let relations = conn
            .prepare(
                "SELECT r.id, r.related_package_id, r.kind, r.operator, r.version, r.alt_id
                 FROM relations r
                 JOIN details_relations dr ON dr.relation_id = r.id
                 WHERE dr.details_id = ?1 ORDER BY r.id",
            )?
            .query_map([self.id], Relation::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(relations)
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            package_id: row.get(1)?,
            version: row.get(2)?,
            architecture: row.get(3)?,
            distribution: row.get(4)?,
            size: row.get(5)?,
            md5sum: row.get(6)?,
            filename: row.get(7)?,
            installed_size: row.get(8)?,
        })
    }
}

/// A Relation: one dependency/conflict/suggestion edge
///
/// Relation rows are shared between details records via the
/// `details_relations` link table and are only deleted once nothing
/// references them anymore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub id: Option<i64>,
    pub related_package_id: i64,
    pub kind: String,
    pub operator: Option<String>,
    pub version: Option<String>,
    pub alt_id: i64,
}

impl Relation {
    /// Find a relation row matching all five fields, creating it if absent
    ///
    /// NULL operator/version are matched with IS so the natural key is
    /// exact, not merely "both non-NULL and equal".
    pub fn get_or_create(
        conn: &Connection,
        related_package_id: i64,
        kind: &str,
        operator: Option<&str>,
        version: Option<&str>,
        alt_id: i64,
    ) -> Result<(Self, bool)> {
        let existing = conn
            .prepare(
                "SELECT id, related_package_id, kind, operator, version, alt_id FROM relations
                 WHERE related_package_id = ?1 AND kind = ?2
                   AND operator IS ?3 AND version IS ?4 AND alt_id = ?5",
            )?
            .query_row(
                params![related_package_id, kind, operator, version, alt_id],
                Self::from_row,
            )
            .optional()?;

        if let Some(relation) = existing {
            return Ok((relation, false));
        }

        conn.execute(
            "INSERT INTO relations (related_package_id, kind, operator, version, alt_id)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![related_package_id, kind, operator, version, alt_id],
        )?;

        Ok((
            Self {
                id: Some(conn.last_insert_rowid()),
                related_package_id,
                kind: kind.to_string(),
                operator: operator.map(str::to_string),
                version: version.map(str::to_string),
                alt_id,
            },
            true,
        ))
    }

    /// Whether any details row still references this relation
    pub fn is_referenced(&self, conn: &Connection) -> Result<bool> {
        let referenced: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM details_relations WHERE relation_id = ?1)",
            [self.id],
            |row| row.get(0),
        )?;
        Ok(referenced)
    }

    /// Delete a relation row by ID
    pub fn delete(conn: &Connection, id: i64) -> Result<()> {
        conn.execute("DELETE FROM relations WHERE id = ?1", [id])?;
        Ok(())
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            related_package_id: row.get(1)?,
            kind: row.get(2)?,
            operator: row.get(3)?,
            version: row.get(4)?,
            alt_id: row.get(5)?,
        })
    }
}
