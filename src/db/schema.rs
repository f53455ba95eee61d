// src/db/schema.rs

//! Database schema definitions and migrations for debrec
//!
//! This module defines the SQLite schema for all core tables and provides
//! a migration system to evolve the schema over time.

use crate::error::Result;
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the schema version tracking table
fn init_schema_version(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;
    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> Result<i32> {
    init_schema_version(conn)?;

    let version = conn
        .query_row(
            "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    Ok(version)
}

/// Set the schema version
fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

/// Apply all pending migrations to bring the database up to date
pub fn migrate(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;
    debug!("Current schema version: {}", current_version);

    if current_version >= SCHEMA_VERSION {
        debug!("Schema is up to date");
        return Ok(());
    }

    // Apply migrations in order
    for version in (current_version + 1)..=SCHEMA_VERSION {
        info!("Applying migration to version {}", version);
        apply_migration(conn, version)?;
        set_schema_version(conn, version)?;
    }

    info!(
        "Schema migration complete. Now at version {}",
        SCHEMA_VERSION
    );
    Ok(())
}

/// Apply a specific migration version
fn apply_migration(conn: &Connection, version: i32) -> Result<()> {
    match version {
        1 => migrate_v1(conn),
        _ => panic!("Unknown migration version: {}", version),
    }
}

/// Initial schema - Version 1
///
/// Creates all core tables:
/// - maintainers: (name, email) identities parsed from control files
/// - packages: one row per package name, with descriptive fields
/// - tags: leaf tag values
/// - labels: facet name bound to a tag
/// - package_labels: many-to-many between packages and labels
/// - details: per (package, architecture, distribution) build record
/// - relations: shared dependency/conflict/suggestion edges
/// - details_relations: many-to-many between details and relations
fn migrate_v1(conn: &Connection) -> Result<()> {
    debug!("Creating schema version 1");

    conn.execute_batch(
        "
        -- Maintainers: get-or-create identities, never updated in place
        CREATE TABLE maintainers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            email TEXT NOT NULL,
            UNIQUE(name, email)
        );

        -- Packages: name is the sole natural key
        CREATE TABLE packages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            description TEXT,
            homepage TEXT,
            section TEXT,
            priority TEXT,
            essential TEXT,
            bugs TEXT,
            multi_arch TEXT,
            maintainer_id INTEGER,
            FOREIGN KEY (maintainer_id) REFERENCES maintainers(id)
        );

        CREATE INDEX idx_packages_name ON packages(name);
        CREATE INDEX idx_packages_maintainer ON packages(maintainer_id);

        -- Tags: leaf values (the part after '::' in 'facet::value')
        CREATE TABLE tags (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            value TEXT NOT NULL UNIQUE
        );

        -- Labels: a facet name bound to a tag, shared across packages
        CREATE TABLE labels (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            tag_id INTEGER NOT NULL,
            UNIQUE(name, tag_id),
            FOREIGN KEY (tag_id) REFERENCES tags(id)
        );

        CREATE TABLE package_labels (
            package_id INTEGER NOT NULL,
            label_id INTEGER NOT NULL,
            PRIMARY KEY (package_id, label_id),
            FOREIGN KEY (package_id) REFERENCES packages(id) ON DELETE CASCADE,
            FOREIGN KEY (label_id) REFERENCES labels(id)
        ) WITHOUT ROWID;

        -- Details: one (package, architecture, distribution) build
        CREATE TABLE details (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            package_id INTEGER NOT NULL,
            version TEXT,
            architecture TEXT NOT NULL,
            distribution TEXT NOT NULL,
            size TEXT,
            md5sum TEXT,
            filename TEXT,
            installed_size TEXT,
            UNIQUE(package_id, architecture, distribution),
            FOREIGN KEY (package_id) REFERENCES packages(id) ON DELETE CASCADE
        );

        CREATE INDEX idx_details_package ON details(package_id);
        CREATE INDEX idx_details_dist_arch ON details(distribution, architecture);

        -- Relations: shared rows, attached to details via details_relations.
        -- Rows sharing a non-zero alt_id are alternatives of one another.
        -- Deleting a target package cascades into the edges pointing at it.
        CREATE TABLE relations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            related_package_id INTEGER NOT NULL,
            kind TEXT NOT NULL,
            operator TEXT,
            version TEXT,
            alt_id INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY (related_package_id) REFERENCES packages(id) ON DELETE CASCADE
        );

        CREATE INDEX idx_relations_target ON relations(related_package_id);
        CREATE INDEX idx_relations_kind ON relations(kind);

        CREATE TABLE details_relations (
            details_id INTEGER NOT NULL,
            relation_id INTEGER NOT NULL,
            PRIMARY KEY (details_id, relation_id),
            FOREIGN KEY (details_id) REFERENCES details(id) ON DELETE CASCADE,
            FOREIGN KEY (relation_id) REFERENCES relations(id) ON DELETE CASCADE
        ) WITHOUT ROWID;

        CREATE INDEX idx_details_relations_relation ON details_relations(relation_id);
        ",
    )?;

    info!("Schema version 1 created successfully");
    Ok(())
}
