//! Archive validation and extraction.
//!
//! The whole entry list is validated before anything touches the disk: path
//! safety, the uncompressed size budget, presence of the required asset groups
//! and a single manifest. Extraction then writes into `<work_dir>/<request_id>`
//! and renames assets so they are unique across requests:
//! - files under the image group become `<request_id><name>`
//! - files under the preset group become `<sha256 of parameters>.<ext>`
//!
//! Every extracted asset is reported with the storage category implied by
//! the group it came from, so upload routing never guesses from extensions.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::{self, Cursor, Read, Write};
use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;
use zip::ZipArchive;

use crate::config::IngestSettings;
use crate::error::IngestError;
use crate::services::content_hash;
use crate::services::dispatcher::WorkItem;
use crate::services::storage::AssetCategory;

/// Result of a successful extraction.
#[derive(Debug)]
pub struct ExtractedArchive {
    /// Request working directory
    pub root: PathBuf,
    /// The single manifest file inside `root`
    pub manifest_path: PathBuf,
    /// Extracted image file names, already request-prefixed
    pub image_files: HashSet<String>,
    /// Original preset file name to content-addressed name
    pub preset_names: HashMap<String, String>,
    /// Every non-manifest file to upload, sorted by path
    pub assets: Vec<WorkItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum EntryGroup {
    Image,
    Preset,
    Other,
}

#[derive(Debug)]
struct ArchiveEntry {
    index: usize,
    path: PathBuf,
    is_dir: bool,
}

impl ArchiveEntry {
    /// Directory components that contain this entry (the entry itself for directories).
    fn directories(&self) -> impl Iterator<Item = &std::ffi::OsStr> {
        let take = if self.is_dir {
            self.path.components().count()
        } else {
            self.path.components().count().saturating_sub(1)
        };
        self.path
            .components()
            .take(take)
            .filter_map(|component| match component {
                Component::Normal(name) => Some(name),
                _ => None,
            })
    }

    fn in_directory(&self, name: &str) -> bool {
        self.directories().any(|dir| dir == name)
    }

    fn group(&self, settings: &IngestSettings) -> EntryGroup {
        if self.in_directory(&settings.image_group) {
            EntryGroup::Image
        } else if self.in_directory(&settings.preset_group) {
            EntryGroup::Preset
        } else {
            EntryGroup::Other
        }
    }

    fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    fn has_extension(&self, extension: &str) -> bool {
        self.path
            .extension()
            .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case(extension))
    }
}

/// Validate and extract a plaintext archive into the request's working directory.
///
/// Nothing is written unless the entry list passes validation. If extraction
/// fails midway the partially written directory is left for the caller to remove.
pub fn extract_archive(
    archive_bytes: &[u8],
    request_id: Uuid,
    settings: &IngestSettings,
) -> Result<ExtractedArchive, IngestError> {
    let mut archive = ZipArchive::new(Cursor::new(archive_bytes))?;
    let entries = list_entries(&mut archive, request_id, settings)?;

    for group in [&settings.image_group, &settings.preset_group] {
        if !entries.iter().any(|entry| entry.in_directory(group)) {
            return Err(IngestError::MissingRequiredAssetGroup(group.clone()));
        }
    }

    let manifest_index = find_manifest(&entries, settings)?;
    check_unique_names(&entries, settings)?;

    let root = settings.request_dir(&request_id);
    fs::create_dir_all(&root)?;

    let mut budget = settings.max_extracted_size;
    let mut image_files = HashSet::new();
    let mut preset_names = HashMap::new();
    let mut assets = Vec::new();
    let mut manifest_path = PathBuf::new();

    for entry in &entries {
        let target = root.join(&entry.path);
        if entry.is_dir {
            fs::create_dir_all(&target)?;
            continue;
        }

        let parent = target.parent().unwrap_or(&root).to_path_buf();
        fs::create_dir_all(&parent)?;

        let mut file = archive.by_index(entry.index)?;
        let original = entry.file_name();

        match entry.group(settings) {
            EntryGroup::Image => {
                let renamed = format!("{}{}", request_id, original);
                let path = parent.join(&renamed);
                let mut out = fs::File::create(&path)?;
                copy_bounded(&mut file, &mut out, &mut budget, settings.max_extracted_size)?;
                image_files.insert(renamed);
                assets.push(WorkItem {
                    path,
                    category: AssetCategory::Image,
                });
            }
            EntryGroup::Preset => {
                let mut bytes = Vec::new();
                copy_bounded(&mut file, &mut bytes, &mut budget, settings.max_extracted_size)?;

                let digest = content_hash::preset_digest(&bytes).map_err(|reason| {
                    IngestError::InvalidPreset {
                        file: original.clone(),
                        reason,
                    }
                })?;
                let extension = entry
                    .path
                    .extension()
                    .map(|ext| ext.to_string_lossy().into_owned())
                    .unwrap_or_else(|| settings.preset_group.clone());
                let hashed = format!("{}.{}", digest, extension);

                let hashed_path = parent.join(&hashed);
                // Same parameters hash to the same name; the first copy is kept
                if !hashed_path.exists() {
                    fs::write(&hashed_path, &bytes)?;
                    assets.push(WorkItem {
                        path: hashed_path,
                        category: AssetCategory::Auxiliary,
                    });
                }
                debug!(request_id = %request_id, file = %original, hashed = %hashed, "Preset content-addressed");
                preset_names.insert(original, hashed);
            }
            EntryGroup::Other => {
                let mut out = fs::File::create(&target)?;
                copy_bounded(&mut file, &mut out, &mut budget, settings.max_extracted_size)?;
                if entry.index == manifest_index {
                    manifest_path = target;
                } else {
                    assets.push(WorkItem {
                        path: target,
                        category: AssetCategory::Unrecognized,
                    });
                }
            }
        }
    }

    assets.sort_by(|a, b| a.path.cmp(&b.path));

    Ok(ExtractedArchive {
        root,
        manifest_path,
        image_files,
        preset_names,
        assets,
    })
}

/// Read the entry list, rejecting unsafe paths and oversized archives.
fn list_entries<R: Read + io::Seek>(
    archive: &mut ZipArchive<R>,
    request_id: Uuid,
    settings: &IngestSettings,
) -> Result<Vec<ArchiveEntry>, IngestError> {
    let mut entries = Vec::with_capacity(archive.len());
    let mut declared_size: u64 = 0;

    for index in 0..archive.len() {
        let file = archive.by_index(index)?;
        let raw_name = file.name().to_string();

        let path = match file.enclosed_name() {
            Some(path) if is_contained(&path) => path,
            _ => {
                warn!(
                    target: "security",
                    request_id = %request_id,
                    entry = %raw_name,
                    "Archive entry escapes the extraction root, rejecting upload"
                );
                return Err(IngestError::PathTraversal(raw_name));
            }
        };

        declared_size = declared_size.saturating_add(file.size());
        entries.push(ArchiveEntry {
            index,
            path,
            is_dir: file.is_dir(),
        });
    }

    if declared_size > settings.max_extracted_size {
        return Err(IngestError::MalformedArchive(format!(
            "uncompressed size {} exceeds limit of {} bytes",
            declared_size, settings.max_extracted_size
        )));
    }

    Ok(entries)
}

/// Relative path made only of normal components.
fn is_contained(path: &Path) -> bool {
    path.components()
        .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
        && path.components().any(|c| matches!(c, Component::Normal(_)))
}

/// Exactly one manifest file outside the asset groups.
fn find_manifest(entries: &[ArchiveEntry], settings: &IngestSettings) -> Result<usize, IngestError> {
    let candidates: Vec<&ArchiveEntry> = entries
        .iter()
        .filter(|entry| {
            !entry.is_dir
                && entry.group(settings) == EntryGroup::Other
                && entry.has_extension(&settings.manifest_extension)
        })
        .collect();

    match candidates.as_slice() {
        [] => Err(IngestError::ManifestNotFound),
        [manifest] => Ok(manifest.index),
        many => Err(IngestError::AmbiguousManifest(
            many.iter()
                .map(|entry| entry.path.to_string_lossy().into_owned())
                .collect(),
        )),
    }
}

/// Stored names are flat per group, so two files sharing a base name would collide.
fn check_unique_names(entries: &[ArchiveEntry], settings: &IngestSettings) -> Result<(), IngestError> {
    let mut seen: HashSet<(EntryGroup, String)> = HashSet::new();

    for entry in entries.iter().filter(|entry| !entry.is_dir) {
        let group = entry.group(settings);
        let name = entry.file_name();
        if !seen.insert((group, name.clone())) {
            return Err(IngestError::MalformedArchive(format!(
                "more than one file named '{}' in the {} group",
                name,
                match group {
                    EntryGroup::Image => settings.image_group.as_str(),
                    EntryGroup::Preset => settings.preset_group.as_str(),
                    EntryGroup::Other => "top-level",
                }
            )));
        }
    }

    Ok(())
}

/// Copy an entry while enforcing the remaining uncompressed budget.
///
/// Declared sizes can lie, so the budget is checked against actual bytes.
fn copy_bounded<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    budget: &mut u64,
    limit: u64,
) -> Result<(), IngestError> {
    let written = io::copy(&mut reader.by_ref().take(budget.saturating_add(1)), writer)?;
    if written > *budget {
        return Err(IngestError::MalformedArchive(format!(
            "uncompressed size exceeds limit of {} bytes",
            limit
        )));
    }
    *budget -= written;
    Ok(())
}

/// Remove a request working directory; a missing directory is not an error.
pub async fn remove_work_dir(root: &Path) -> io::Result<()> {
    match tokio::fs::remove_dir_all(root).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
