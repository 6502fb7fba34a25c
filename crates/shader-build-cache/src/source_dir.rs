//! Enumeration of the shader sources in a directory.

use std::{fs, io, path::Path};

use chrono::{DateTime, Utc};

use crate::artifact::ArtifactName;

/// A source file found in the source directory.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct SourceArtifact {
    /// File name of the source.
    pub name: ArtifactName,
    /// Last modification time reported by the filesystem.
    pub modified: DateTime<Utc>,
}

impl SourceArtifact {
    /// Creates a source artifact from its parts.
    #[inline]
    #[must_use]
    pub const fn new(name: ArtifactName, modified: DateTime<Utc>) -> Self {
        Self { name, modified }
    }
}

/// Lists every regular file directly inside `dir`, sorted by name.
///
/// Symlinks are followed. Subdirectories are ignored, and so are files whose names
/// are not valid [artifact names](ArtifactName), since those could never be recorded.
/// Only directory entries and modification times are read, never file contents.
///
/// # Errors
///
/// Returns an error if the directory could not be read or an entry could not be inspected.
#[inline]
pub fn list_source_artifacts(dir: &Path) -> io::Result<Vec<SourceArtifact>> {
    log::debug!("listing shader sources in {}", dir.display());
    let mut artifacts = Vec::new();
    for maybe_entry in fs::read_dir(dir)? {
        let entry = maybe_entry?;
        let path = entry.path();
        let metadata = match fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                log::warn!("skipping {}, it is a dangling link", path.display());
                continue;
            }
            Err(error) => return Err(error),
        };
        if !metadata.is_file() {
            log::trace!("skipping {}, not a file", path.display());
            continue;
        }

        let Ok(file_name) = entry.file_name().into_string() else {
            log::warn!("skipping {}, its name is not valid UTF-8", path.display());
            continue;
        };
        let name = match ArtifactName::new(file_name) {
            Ok(name) => name,
            Err(error) => {
                log::warn!("skipping {}: {error}", path.display());
                continue;
            }
        };

        let modified = DateTime::<Utc>::from(metadata.modified()?);
        artifacts.push(SourceArtifact::new(name, modified));
    }
    artifacts.sort_by(|left, right| left.name.cmp(&right.name));
    log::debug!("found {} shader sources", artifacts.len());
    Ok(artifacts)
}
