//! Data models for scan records and the component overlay

use crate::{Error, Result};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Record type as reported by the scanner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    File,
    Directory,
}

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::File => "file",
            FileType::Directory => "directory",
        }
    }

    /// Parse the stored column value back into the enum
    pub fn parse(s: &str) -> Result<FileType> {
        match s {
            "file" => Ok(FileType::File),
            "directory" => Ok(FileType::Directory),
            other => Err(Error::Internal(format!(
                "unexpected file type '{}' in record store",
                other
            ))),
        }
    }
}

/// Closed enumeration of finding kinds, with an explicit bucket for
/// kinds this version does not know about
///
/// The `Unknown` bucket keeps forward compatibility with newer scanners:
/// their finding arrays survive ingest, aggregation, and export unchanged.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FindingKind {
    License,
    Copyright,
    Email,
    Url,
    Package,
    Unknown(String),
}

impl FindingKind {
    /// Field name this kind uses in scanner documents
    pub fn wire_name(&self) -> &str {
        match self {
            FindingKind::License => "licenses",
            FindingKind::Copyright => "copyrights",
            FindingKind::Email => "emails",
            FindingKind::Url => "urls",
            FindingKind::Package => "packages",
            FindingKind::Unknown(name) => name,
        }
    }

    /// Map a scanner document field name to a kind
    pub fn from_wire(name: &str) -> FindingKind {
        match name {
            "licenses" => FindingKind::License,
            "copyrights" => FindingKind::Copyright,
            "emails" => FindingKind::Email,
            "urls" => FindingKind::Url,
            "packages" => FindingKind::Package,
            other => FindingKind::Unknown(other.to_string()),
        }
    }

    /// The kinds every file is summarized over, even when undetected
    pub fn known() -> [FindingKind; 5] {
        [
            FindingKind::License,
            FindingKind::Copyright,
            FindingKind::Email,
            FindingKind::Url,
            FindingKind::Package,
        ]
    }
}

impl fmt::Display for FindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Findings detected for one record: kind → ordered value sequence
///
/// Value order is insertion order as produced by the scanner and is
/// preserved through storage and export. Kind order is fixed by the enum so
/// serialized output is stable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindingSet {
    entries: BTreeMap<FindingKind, Vec<String>>,
}

impl FindingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the value sequence for a kind
    pub fn insert(&mut self, kind: FindingKind, values: Vec<String>) {
        self.entries.insert(kind, values);
    }

    /// Values for a kind; empty slice when the kind was never detected
    pub fn values(&self, kind: &FindingKind) -> &[String] {
        self.entries.get(kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FindingKind, &Vec<String>)> {
        self.entries.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build from the non-reserved fields of a raw scanner record
    ///
    /// Array-valued fields become findings; scalar fields are not findings
    /// and are left to the caller. Non-string array elements are kept as
    /// their compact JSON rendering.
    pub fn from_raw_fields(extra: &serde_json::Map<String, serde_json::Value>) -> FindingSet {
        let mut set = FindingSet::new();
        for (key, value) in extra {
            if let serde_json::Value::Array(items) = value {
                let values = items.iter().map(finding_value_to_string).collect();
                set.insert(FindingKind::from_wire(key), values);
            }
        }
        set
    }
}

/// Canonical string form of one finding value
pub(crate) fn finding_value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl Serialize for FindingSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (kind, values) in &self.entries {
            map.serialize_entry(kind.wire_name(), values)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for FindingSet {
    fn deserialize<D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        struct FindingSetVisitor;

        impl<'de> Visitor<'de> for FindingSetVisitor {
            type Value = FindingSet;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of finding kind to value array")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut map: A,
            ) -> std::result::Result<FindingSet, A::Error> {
                let mut set = FindingSet::new();
                while let Some((key, values)) = map.next_entry::<String, Vec<String>>()? {
                    set.insert(FindingKind::from_wire(&key), values);
                }
                Ok(set)
            }
        }

        deserializer.deserialize_map(FindingSetVisitor)
    }
}

/// One scanned path with its detected findings
///
/// `path` is the unique key: normalized, slash-separated, relative.
/// Bookkeeping (row guid, timestamps) lives only in the store and is never
/// part of this struct, so serializing a record is already export-shaped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanRecord {
    pub path: String,
    #[serde(rename = "type")]
    pub file_type: FileType,
    #[serde(flatten)]
    pub findings: FindingSet,
}

impl ScanRecord {
    pub fn new(path: String, file_type: FileType) -> Self {
        Self {
            path,
            file_type,
            findings: FindingSet::new(),
        }
    }
}

/// Minimal projection used by the tree builder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathRecord {
    pub path: String,
    pub file_type: FileType,
}

/// Reviewer-assigned status for a path
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ReviewStatus {
    Analyzed,
    Attention,
    Original,
    #[serde(rename = "NR")]
    Nr,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Analyzed => "Analyzed",
            ReviewStatus::Attention => "Attention",
            ReviewStatus::Original => "Original",
            ReviewStatus::Nr => "NR",
        }
    }

    /// Parse the stored column value; empty means no status assigned
    pub fn parse(s: &str) -> Result<Option<ReviewStatus>> {
        match s {
            "" => Ok(None),
            "Analyzed" => Ok(Some(ReviewStatus::Analyzed)),
            "Attention" => Ok(Some(ReviewStatus::Attention)),
            "Original" => Ok(Some(ReviewStatus::Original)),
            "NR" => Ok(Some(ReviewStatus::Nr)),
            other => Err(Error::Internal(format!(
                "unexpected review status '{}' in overlay store",
                other
            ))),
        }
    }

    /// The four assignable statuses
    pub fn all() -> [ReviewStatus; 4] {
        [
            ReviewStatus::Analyzed,
            ReviewStatus::Attention,
            ReviewStatus::Original,
            ReviewStatus::Nr,
        ]
    }
}

/// User-authored annotation for one path
///
/// Path-addressed, not record-addressed: a component may reference a path
/// that no scan record carries. Like [`ScanRecord`], this struct carries no
/// bookkeeping fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_status: Option<ReviewStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_expression: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copyright: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Component {
    pub fn new(path: String) -> Self {
        Self {
            path,
            ..Default::default()
        }
    }
}
