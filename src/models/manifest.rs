//! Manifest entry model.
//!
//! An entry describes one logical asset of an uploaded package. The quality and
//! geometry metrics are opaque to the service and round-trip unchanged through
//! `metrics`; only the reference and provenance fields below are interpreted.
//! Uploaded manifests spell those field names in any letter case
//! (`Image_file_names`, `Parent_Package_Name`), so uploads are decoded through
//! [`ManifestEntry::from_upload`], which folds them onto the canonical names.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// One item of an uploaded manifest, as persisted in the document store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    #[serde(default)]
    pub file_name: String,
    /// Image references; rewritten to the request-prefixed names on ingest.
    #[serde(default)]
    pub image_file_names: Vec<String>,
    /// Preset reference; rewritten to the content-addressed name on ingest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub psf_file_name: Option<String>,
    /// Request id of the ingestion that created this entry.
    #[serde(default)]
    pub universal_uuid: String,
    /// Logical package identity used for duplicate detection.
    #[serde(default)]
    pub parent_package_name: String,
    #[serde(default)]
    pub version: i32,
    #[serde(default)]
    pub vendor: String,
    #[serde(default)]
    pub user: String,
    /// Every other field of the uploaded entry.
    #[serde(flatten)]
    pub metrics: Map<String, JsonValue>,
}

/// Canonical names of the interpreted fields.
const INTERPRETED_FIELDS: [&str; 8] = [
    "file_name",
    "image_file_names",
    "psf_file_name",
    "universal_uuid",
    "parent_package_name",
    "version",
    "vendor",
    "user",
];

/// Fields a manifest lookup may filter on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestField {
    ParentPackageName,
    UniversalUuid,
    FileName,
}

impl ManifestField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ParentPackageName => "parent_package_name",
            Self::UniversalUuid => "universal_uuid",
            Self::FileName => "file_name",
        }
    }
}

impl std::fmt::Display for ManifestField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl ManifestEntry {
    /// Decode one uploaded entry, matching interpreted field names without
    /// regard to case. An exact spelling wins over a case variant; other
    /// variants of the same field are dropped rather than kept as metrics.
    pub fn from_upload(value: JsonValue) -> Result<Self, serde_json::Error> {
        let value = match value {
            JsonValue::Object(map) => JsonValue::Object(fold_field_names(map)),
            other => other,
        };
        serde_json::from_value(value)
    }

    /// Value of a searchable field.
    pub fn field(&self, field: ManifestField) -> &str {
        match field {
            ManifestField::ParentPackageName => &self.parent_package_name,
            ManifestField::UniversalUuid => &self.universal_uuid,
            ManifestField::FileName => &self.file_name,
        }
    }
}

fn fold_field_names(map: Map<String, JsonValue>) -> Map<String, JsonValue> {
    let mut folded = Map::new();
    let mut variants = Vec::new();

    for (key, value) in map {
        match INTERPRETED_FIELDS
            .iter()
            .find(|field| field.eq_ignore_ascii_case(&key))
        {
            Some(field) if *field == key => {
                folded.insert(key, value);
            }
            Some(field) => variants.push((*field, value)),
            None => {
                folded.insert(key, value);
            }
        }
    }

    for (field, value) in variants {
        if !folded.contains_key(field) {
            folded.insert(field.to_string(), value);
        }
    }

    folded
}
