// src/recorder/relations.rs

//! Relationship reconciliation between details rows and relation rows
//!
//! Relation rows are shared: two packages depending on `libc6 (>= 2.36)`
//! point at the same row through the link table. Recording attaches,
//! pruning detaches and deletes rows nothing references anymore.

use crate::control::{RelationDescriptor, RelationGroups, RelationKind};
use crate::db::models::{Details, Package, Relation};
use crate::error::{Error, Result};
use rusqlite::Connection;
use tracing::debug;

/// Record a single relation entry against a details row
///
/// The target package is resolved by name and created as a bare row if
/// unknown; it gets its descriptive fields whenever its own paragraph is
/// recorded.
pub fn record_relationship(
    conn: &Connection,
    details: &Details,
    kind: RelationKind,
    descriptor: &RelationDescriptor,
    alt_id: i64,
) -> Result<()> {
    let (target, created) = Package::get_or_create(conn, &descriptor.name)?;
    if created {
        debug!("Created bare package '{}' as relation target", descriptor.name);
    }
    let target_id = target
        .id
        .ok_or_else(|| Error::Internal("Relation target package has no ID".to_string()))?;

    let (operator, version) = match &descriptor.version {
        Some((op, ver)) => (Some(op.as_str()), Some(ver.as_str())),
        None => (None, None),
    };

    let (relation, _) =
        Relation::get_or_create(conn, target_id, kind.as_str(), operator, version, alt_id)?;
    let relation_id = relation
        .id
        .ok_or_else(|| Error::Internal("Relation row has no ID".to_string()))?;

    details.add_relation(conn, relation_id)?;
    Ok(())
}

/// Record every relation group of a paragraph against a details row
///
/// Groups with a single entry carry alt_id 0. Groups with alternatives
/// share one non-zero alt_id per relation kind, counting up from 1 in
/// declaration order.
pub fn record_relations(
    conn: &Connection,
    details: &Details,
    groups: &[(RelationKind, RelationGroups)],
) -> Result<()> {
    for (kind, kind_groups) in groups {
        let mut alt_id = 1;
        for group in kind_groups {
            if group.len() > 1 {
                for descriptor in group {
                    record_relationship(conn, details, *kind, descriptor, alt_id)?;
                }
                alt_id += 1;
            } else if let Some(descriptor) = group.first() {
                record_relationship(conn, details, *kind, descriptor, 0)?;
            }
        }
    }
    Ok(())
}

/// Detach every relation from a details row, deleting rows no other
/// details still references
pub fn prune_relations(conn: &Connection, details: &Details) -> Result<()> {
    for relation in details.relations(conn)? {
        let relation_id = relation
            .id
            .ok_or_else(|| Error::Internal("Relation row has no ID".to_string()))?;
        details.remove_relation(conn, relation_id)?;
        if !relation.is_referenced(conn)? {
            Relation::delete(conn, relation_id)?;
        }
    }
    Ok(())
}
