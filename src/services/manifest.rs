//! Manifest parsing and transformation.
//!
//! The manifest is a JSON array of entries. Each entry is stamped with the
//! request identity and provenance, and its asset references are rewritten to
//! the names the extractor gave the files on disk.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use uuid::Uuid;

use crate::error::IngestError;
use crate::models::ManifestEntry;

/// First-ingestion marker.
pub const INITIAL_VERSION: i32 = 1;

/// Per-request values the transformer stamps and resolves against.
#[derive(Debug)]
pub struct TransformContext<'a> {
    pub request_id: Uuid,
    pub package_name: &'a str,
    pub vendor: &'a str,
    pub user: &'a str,
    /// Request-prefixed image names present in the working directory
    pub image_files: &'a HashSet<String>,
    /// Original preset name to content-addressed name
    pub preset_names: &'a HashMap<String, String>,
}

/// Logical package name: the uploaded file's base name without extension.
pub fn package_name(upload_file_name: &str) -> String {
    Path::new(upload_file_name)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Parse manifest bytes into entries. An empty manifest is rejected.
pub fn parse_manifest(bytes: &[u8]) -> Result<Vec<ManifestEntry>, IngestError> {
    let raw: Vec<serde_json::Value> =
        serde_json::from_slice(bytes).map_err(|e| IngestError::InvalidManifest(e.to_string()))?;
    let entries = raw
        .into_iter()
        .enumerate()
        .map(|(index, value)| {
            ManifestEntry::from_upload(value)
                .map_err(|e| IngestError::InvalidManifest(format!("entry {}: {}", index, e)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    if entries.is_empty() {
        return Err(IngestError::InvalidManifest(
            "manifest contains no entries".to_string(),
        ));
    }

    Ok(entries)
}

/// Stamp and rewrite every entry, failing on the first dangling reference.
pub fn transform_entries(
    entries: Vec<ManifestEntry>,
    ctx: &TransformContext<'_>,
) -> Result<Vec<ManifestEntry>, IngestError> {
    entries
        .into_iter()
        .map(|entry| transform_entry(entry, ctx))
        .collect()
}

fn transform_entry(
    mut entry: ManifestEntry,
    ctx: &TransformContext<'_>,
) -> Result<ManifestEntry, IngestError> {
    entry.universal_uuid = ctx.request_id.to_string();
    entry.parent_package_name = ctx.package_name.to_string();
    entry.version = INITIAL_VERSION;

    for image in entry.image_file_names.iter_mut() {
        let renamed = format!("{}{}", ctx.request_id, image);
        if !ctx.image_files.contains(&renamed) {
            return Err(IngestError::DanglingAssetReference(image.clone()));
        }
        *image = renamed;
    }

    if let Some(preset) = entry.psf_file_name.as_mut().filter(|name| !name.is_empty()) {
        let lookup = Path::new(preset.as_str())
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let hashed = ctx
            .preset_names
            .get(&lookup)
            .ok_or_else(|| IngestError::DanglingAssetReference(preset.clone()))?;
        *preset = hashed.clone();
    }

    entry.vendor = ctx.vendor.to_string();
    entry.user = ctx.user.to_string();

    Ok(entry)
}
