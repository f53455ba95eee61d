// src/control/mod.rs

//! Control-file reader
//!
//! Turns a (possibly gzip-compressed) Debian control file into a sequence
//! of typed paragraphs. Grammar parsing is delegated to `rfc822-like`;
//! this module adds the structured view of the relation fields
//! (`Depends`, `Suggests`, ...) as ordered alternative-groups.

use crate::error::{Error, Result};
use flate2::read::GzDecoder;
use serde::Deserialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

/// One package's metadata record as found in a control file
///
/// Hyphenated upstream field names map onto hyphen-stripped attribute
/// names ("Multi-Arch" -> `multi_arch`, "Installed-Size" ->
/// `installed_size`); unknown fields are ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Paragraph {
    pub package: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub architecture: Option<String>,
    #[serde(default)]
    pub maintainer: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub homepage: Option<String>,
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub essential: Option<String>,
    #[serde(default)]
    pub bugs: Option<String>,
    #[serde(rename = "Multi-Arch", default)]
    pub multi_arch: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(rename = "MD5sum", default)]
    pub md5sum: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(rename = "Installed-Size", default)]
    pub installed_size: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub depends: Option<String>,
    #[serde(rename = "Pre-Depends", default)]
    pub pre_depends: Option<String>,
    #[serde(default)]
    pub recommends: Option<String>,
    #[serde(default)]
    pub suggests: Option<String>,
    #[serde(default)]
    pub conflicts: Option<String>,
    #[serde(default)]
    pub breaks: Option<String>,
    #[serde(default)]
    pub replaces: Option<String>,
    #[serde(default)]
    pub provides: Option<String>,
    #[serde(default)]
    pub enhances: Option<String>,
}

/// Kind of inter-package relation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    Depends,
    PreDepends,
    Recommends,
    Suggests,
    Conflicts,
    Breaks,
    Replaces,
    Provides,
    Enhances,
}

impl RelationKind {
    pub fn as_str(&self) -> &str {
        match self {
            RelationKind::Depends => "depends",
            RelationKind::PreDepends => "pre-depends",
            RelationKind::Recommends => "recommends",
            RelationKind::Suggests => "suggests",
            RelationKind::Conflicts => "conflicts",
            RelationKind::Breaks => "breaks",
            RelationKind::Replaces => "replaces",
            RelationKind::Provides => "provides",
            RelationKind::Enhances => "enhances",
        }
    }
}

impl FromStr for RelationKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "depends" => Ok(RelationKind::Depends),
            "pre-depends" => Ok(RelationKind::PreDepends),
            "recommends" => Ok(RelationKind::Recommends),
            "suggests" => Ok(RelationKind::Suggests),
            "conflicts" => Ok(RelationKind::Conflicts),
            "breaks" => Ok(RelationKind::Breaks),
            "replaces" => Ok(RelationKind::Replaces),
            "provides" => Ok(RelationKind::Provides),
            "enhances" => Ok(RelationKind::Enhances),
            _ => Err(format!("Invalid relation kind: {}", s)),
        }
    }
}

/// A single relation entry within an alternative group
///
/// `version` holds the comparison operator and version number from a
/// constraint like `(>= 0~r11863)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDescriptor {
    pub name: String,
    pub version: Option<(String, String)>,
    pub arch: Option<String>,
}

/// Groups of alternatives for one relation kind
pub type RelationGroups = Vec<Vec<RelationDescriptor>>;

impl Paragraph {
    /// The structured relation view: for each relation field present in
    /// the paragraph, the ordered alternative-groups it declares
    ///
    /// `"a | b, c (>= 1.0)"` yields two groups: `[a, b]` and `[c >= 1.0]`.
    pub fn relations(&self) -> Vec<(RelationKind, RelationGroups)> {
        let fields = [
            (RelationKind::Depends, &self.depends),
            (RelationKind::PreDepends, &self.pre_depends),
            (RelationKind::Recommends, &self.recommends),
            (RelationKind::Suggests, &self.suggests),
            (RelationKind::Conflicts, &self.conflicts),
            (RelationKind::Breaks, &self.breaks),
            (RelationKind::Replaces, &self.replaces),
            (RelationKind::Provides, &self.provides),
            (RelationKind::Enhances, &self.enhances),
        ];

        fields
            .into_iter()
            .filter_map(|(kind, raw)| {
                raw.as_deref()
                    .map(|raw| (kind, parse_relation_field(raw)))
            })
            .collect()
    }
}

/// Parse one relation field value into ordered alternative-groups
///
/// Groups are separated by `,`, alternatives within a group by `|`.
pub fn parse_relation_field(raw: &str) -> RelationGroups {
    raw.split(',')
        .map(|group| {
            group
                .split('|')
                .filter_map(parse_relation_entry)
                .collect::<Vec<_>>()
        })
        .filter(|group| !group.is_empty())
        .collect()
}

/// Parse a single entry like `0ad-data (>= 0~r11863) [amd64]`
fn parse_relation_entry(entry: &str) -> Option<RelationDescriptor> {
    let entry = entry.trim();
    if entry.is_empty() {
        return None;
    }

    let name_end = entry
        .find(|c: char| c.is_whitespace() || c == '(' || c == '[')
        .unwrap_or(entry.len());
    let mut name = &entry[..name_end];
    if name.is_empty() {
        return None;
    }

    // Strip a multiarch qualifier such as `foo:any`
    if let Some(colon) = name.find(':') {
        name = &name[..colon];
    }

    let version = entry.find('(').and_then(|start| {
        let rest = &entry[start + 1..];
        let end = rest.find(')')?;
        parse_version_constraint(&rest[..end])
    });

    let arch = entry.find('[').and_then(|start| {
        let rest = &entry[start + 1..];
        let end = rest.find(']')?;
        let arch = rest[..end].trim();
        (!arch.is_empty()).then(|| arch.to_string())
    });

    Some(RelationDescriptor {
        name: name.to_string(),
        version,
        arch,
    })
}

/// Split `>= 0~r11863` into its operator and version number
fn parse_version_constraint(constraint: &str) -> Option<(String, String)> {
    let constraint = constraint.trim();
    let op_end = constraint
        .find(|c: char| !matches!(c, '<' | '>' | '='))
        .unwrap_or(constraint.len());

    let operator = constraint[..op_end].trim();
    let number = constraint[op_end..].trim();
    if operator.is_empty() || number.is_empty() {
        return None;
    }

    Some((operator.to_string(), number.to_string()))
}

/// Read all paragraphs from a control file
///
/// A `.gz` suffix is transparently decompressed; anything else is read
/// as plain text.
pub fn read_paragraphs(path: &Path) -> Result<Vec<Paragraph>> {
    debug!("Reading control file: {}", path.display());

    let mut content = String::new();
    if path.extension().is_some_and(|ext| ext == "gz") {
        let file = File::open(path)?;
        GzDecoder::new(file).read_to_string(&mut content)?;
    } else {
        File::open(path)?.read_to_string(&mut content)?;
    }

    parse_paragraphs(&content)
}

/// Parse paragraphs from control-file text
pub fn parse_paragraphs(content: &str) -> Result<Vec<Paragraph>> {
    let paragraphs: Vec<Paragraph> = rfc822_like::from_str(content)
        .map_err(|e| Error::Parse(format!("Failed to parse control file: {}", e)))?;

    debug!("Parsed {} paragraphs", paragraphs.len());
    Ok(paragraphs)
}
